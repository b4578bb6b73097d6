//! Where things live inside a repository.
//!
//! ```text
//! root                 host list (atomic overwrite, .bak kept)
//! hosts/<hostname>     generation list per host (atomic overwrite, .bak kept)
//! objects/<xx>/<id>    generations, directories, file groups (write-once)
//! lock                 repository lock
//! ```
//!
//! `<xx>` is the low byte of the CRC32 of the identifier, in hex, which keeps
//! any one directory from growing too large.

use genvault_types::ObjectId;

pub const ROOT_PATH: &str = "root";
pub const HOSTS_DIR: &str = "hosts";
pub const OBJECTS_DIR: &str = "objects";
pub const LOCK_PATH: &str = "lock";

pub fn host_path(hostname: &str) -> String {
    format!("{HOSTS_DIR}/{hostname}")
}

pub fn object_dir(id: &ObjectId) -> String {
    let bucket = crc32fast::hash(id.as_str().as_bytes()) & 0xff;
    format!("{OBJECTS_DIR}/{bucket:02x}")
}

pub fn object_path(id: &ObjectId) -> String {
    format!("{}/{}", object_dir(id), id)
}
