use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use genvault_repo::{CancelToken, Config, FsckReport, GenerationSpec, Repository};
use genvault_vfs::{LocalFs, Vfs};
use serde_json::json;

use crate::cli::*;
use crate::format;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let json = cli.format == OutputFormat::Json;
    match cli.command {
        Command::Init => cmd_init(&config, json),
        Command::Backup(args) => cmd_backup(&config, args, json),
        Command::Hosts => cmd_hosts(&config, json),
        Command::Generations(args) => cmd_generations(&config, args, json),
        Command::Show(args) => cmd_show(&config, args, json),
        Command::Fsck(args) => cmd_fsck(&config, args, json),
        Command::Forget(args) => cmd_forget(&config, args, json),
        Command::ForceLock => cmd_force_lock(&config, json),
    }
}

/// Config file first, then command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(repository) = &cli.repository {
        config.repository = Some(repository.clone());
    }
    if let Some(name) = &cli.client_name {
        config.client_name = name.clone();
    }
    if let Some(secs) = cli.lock_timeout {
        config.lock_timeout_secs = secs;
    }
    config.validate()?;
    Ok(config)
}

fn open_repository(config: &Config, create: bool) -> anyhow::Result<Repository> {
    let root = config
        .repository
        .clone()
        .context("no repository given; pass --repository or set `repository` in the config file")?;
    let vfs: Arc<dyn Vfs> = if create {
        Arc::new(LocalFs::create(root))
    } else {
        Arc::new(LocalFs::new(root))
    };
    Ok(Repository::open(vfs, config.clone())?)
}

fn parse_spec(text: &str) -> anyhow::Result<GenerationSpec> {
    text.parse()
        .with_context(|| format!("invalid generation {text:?}"))
}

fn cmd_init(config: &Config, json: bool) -> anyhow::Result<()> {
    let repo = open_repository(config, true)?;
    repo.init()?;
    let path = config
        .repository
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    if json {
        println!("{}", json!({ "initialized": path }));
    } else {
        println!("{} Initialized repository in {}", "✓".green().bold(), path.bold());
    }
    repo.close()?;
    Ok(())
}

fn cmd_backup(config: &Config, args: BackupArgs, json: bool) -> anyhow::Result<()> {
    let repo = open_repository(config, false)?;
    let (generation, stats) = repo.backup_path(&args.path, &CancelToken::new())?;
    if json {
        println!(
            "{}",
            json!({
                "host": config.client_name,
                "generation": generation.id.as_str(),
                "started": generation.started.to_rfc3339(),
                "stats": stats,
            })
        );
    } else {
        println!(
            "{} Generation {} of {}",
            "✓".green().bold(),
            generation.id.as_str().yellow(),
            config.client_name.bold()
        );
        println!(
            "  {} directories, {} files in {} groups",
            stats.dirs, stats.files, stats.file_groups
        );
        if stats.skipped > 0 {
            println!("  {} {} entries skipped", "!".yellow(), stats.skipped);
        }
    }
    repo.close()?;
    Ok(())
}

fn cmd_hosts(config: &Config, json: bool) -> anyhow::Result<()> {
    let repo = open_repository(config, false)?;
    let hosts = repo.hosts()?;
    if json {
        println!("{}", json!(hosts));
    } else if hosts.is_empty() {
        println!("No hosts.");
    } else {
        for host in &hosts {
            println!("{host}");
        }
    }
    repo.close()?;
    Ok(())
}

fn cmd_generations(config: &Config, args: HostArgs, json: bool) -> anyhow::Result<()> {
    let repo = open_repository(config, false)?;
    let host = args.host.unwrap_or_else(|| config.client_name.clone());
    let generations = repo.generations(&host)?;
    if json {
        let rows: Vec<_> = generations
            .iter()
            .map(|g| {
                json!({
                    "id": g.id.as_str(),
                    "started": g.started.to_rfc3339(),
                    "ended": g.ended.map(|t| t.to_rfc3339()),
                })
            })
            .collect();
        println!("{}", json!(rows));
    } else {
        for g in &generations {
            let ended = g
                .ended
                .map(|t| format::timestamp(&t))
                .unwrap_or_else(|| "-".into());
            println!(
                "{}  {}  {}",
                g.id.as_str().yellow(),
                format::timestamp(&g.started),
                ended.dimmed()
            );
        }
    }
    repo.close()?;
    Ok(())
}

fn cmd_show(config: &Config, args: ShowArgs, json: bool) -> anyhow::Result<()> {
    let repo = open_repository(config, false)?;
    let host = args.host.unwrap_or_else(|| config.client_name.clone());
    let mut shown = Vec::new();

    for text in &args.generations {
        let generation = repo.generation(&host, &parse_spec(text)?)?;
        if !json {
            println!(
                "Generation {} ({})",
                generation.id.as_str().yellow().bold(),
                format::timestamp(&generation.started)
            );
        }
        let mut dirs = Vec::new();
        for entry in repo.walk(&generation) {
            let entry = entry?;
            if json {
                let files: Vec<_> = entry
                    .files
                    .iter()
                    .map(|f| {
                        json!({
                            "name": f.name,
                            "mode": format::permissions(f.mode),
                            "size": f.size,
                            "mtime": f.mtime,
                            "uid": f.uid,
                            "gid": f.gid,
                            "target": f.target,
                        })
                    })
                    .collect();
                dirs.push(json!({
                    "path": entry.path,
                    "subdirs": entry.subdirs,
                    "files": files,
                }));
                continue;
            }
            println!("{}:", entry.path.blue().bold());
            for f in &entry.files {
                let mut line = format!(
                    "  {} {:>5} {:>5} {:>10} {} {}",
                    format::permissions(f.mode),
                    f.uid,
                    f.gid,
                    f.size,
                    format::mtime(f.mtime),
                    f.name
                );
                if let Some(target) = &f.target {
                    line.push_str(&format!(" -> {target}"));
                }
                println!("{line}");
            }
        }
        if json {
            shown.push(json!({
                "generation": generation.id.as_str(),
                "started": generation.started.to_rfc3339(),
                "dirs": dirs,
            }));
        }
    }
    if json {
        println!("{}", json!(shown));
    }
    repo.close()?;
    Ok(())
}

fn cmd_fsck(config: &Config, args: FsckArgs, json: bool) -> anyhow::Result<()> {
    let repo = open_repository(config, false)?;
    let verbose = !args.quiet && !json;
    let checker = repo.checker().with_observer(|message: &str| {
        if verbose {
            println!("{}", message.dimmed());
        }
    });
    let report = match &args.host {
        Some(host) => checker.check_single_host(host)?,
        None => checker.check()?,
    };
    print_report(&report, json)?;
    repo.close()?;
    if !report.is_clean() {
        bail!("repository is inconsistent: {} problems", report.problems.len());
    }
    Ok(())
}

fn print_report(report: &FsckReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for problem in &report.problems {
        println!("{} {}", "✗".red().bold(), problem);
    }
    let summary = format!(
        "{} hosts, {} generations, {} directories, {} file groups, {} files",
        report.hosts_checked,
        report.generations_checked,
        report.dirs_checked,
        report.file_groups_checked,
        report.files_seen
    );
    if report.is_clean() {
        println!("{} No issues. Checked {summary}.", "✓".green().bold());
    } else {
        println!("Checked {summary}.");
    }
    Ok(())
}

fn cmd_forget(config: &Config, args: ForgetArgs, json: bool) -> anyhow::Result<()> {
    let repo = open_repository(config, false)?;
    let host = args.host.unwrap_or_else(|| config.client_name.clone());
    let id = repo.forget(&host, &parse_spec(&args.generation)?)?;
    if json {
        println!("{}", json!({ "host": host, "forgotten": id.as_str() }));
    } else {
        println!("Forgot generation {} of {}", id.as_str().yellow(), host.bold());
    }
    repo.close()?;
    Ok(())
}

fn cmd_force_lock(config: &Config, json: bool) -> anyhow::Result<()> {
    let repo = open_repository(config, false)?;
    let removed = repo.force_unlock()?;
    if json {
        println!("{}", json!({ "removed": removed }));
    } else if removed {
        println!("{} Removed repository lock", "✓".green().bold());
    } else {
        println!("Repository was not locked.");
    }
    repo.close()?;
    Ok(())
}
