use std::fmt;
use std::str::FromStr;

use genvault_store::Host;
use genvault_types::{ObjectId, TypeError};

use crate::error::{RepoError, RepoResult};

/// How a user names a generation: `latest` or an explicit identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationSpec {
    Latest,
    Id(ObjectId),
}

impl GenerationSpec {
    /// Pick the generation this spec names from a host's list.
    pub fn resolve(&self, host: &Host) -> RepoResult<ObjectId> {
        match self {
            Self::Latest => host
                .generations
                .last()
                .cloned()
                .ok_or_else(|| RepoError::NoGenerations(host.hostname.clone())),
            Self::Id(id) => {
                if host.generations.contains(id) {
                    Ok(id.clone())
                } else {
                    Err(RepoError::GenerationNotFound {
                        host: host.hostname.clone(),
                        spec: id.to_string(),
                    })
                }
            }
        }
    }
}

impl FromStr for GenerationSpec {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("latest") {
            Ok(Self::Latest)
        } else {
            ObjectId::new(s).map(Self::Id)
        }
    }
}

impl fmt::Display for GenerationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(gens: &[&str]) -> Host {
        Host {
            hostname: "web".into(),
            generations: gens.iter().map(|g| ObjectId::new(*g).unwrap()).collect(),
        }
    }

    #[test]
    fn parses_latest_and_ids() {
        assert_eq!("latest".parse::<GenerationSpec>().unwrap(), GenerationSpec::Latest);
        assert_eq!("LATEST".parse::<GenerationSpec>().unwrap(), GenerationSpec::Latest);
        assert_eq!(
            "g1".parse::<GenerationSpec>().unwrap(),
            GenerationSpec::Id(ObjectId::new("g1").unwrap())
        );
        assert!("a/b".parse::<GenerationSpec>().is_err());
    }

    #[test]
    fn latest_is_last_in_list() {
        let h = host(&["g1", "g2", "g3"]);
        assert_eq!(GenerationSpec::Latest.resolve(&h).unwrap().as_str(), "g3");
    }

    #[test]
    fn latest_of_empty_host_fails() {
        assert!(matches!(
            GenerationSpec::Latest.resolve(&host(&[])),
            Err(RepoError::NoGenerations(_))
        ));
    }

    #[test]
    fn explicit_id_must_belong_to_host() {
        let h = host(&["g1"]);
        let spec: GenerationSpec = "g1".parse().unwrap();
        assert_eq!(spec.resolve(&h).unwrap().as_str(), "g1");
        let spec: GenerationSpec = "g9".parse().unwrap();
        assert!(matches!(
            spec.resolve(&h),
            Err(RepoError::GenerationNotFound { .. })
        ));
    }
}
