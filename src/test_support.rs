use anyhow::Result;
use std::fs::{self, File};
use std::path::Path;
use std::time::SystemTime;

pub const MB: u64 = 1_000_000;

/// Creates a sparse file of `len` bytes, making parent directories.
pub fn write_sized(path: &Path, len: u64) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(path)?.set_len(len)?;
    Ok(())
}

pub fn write_aged(path: &Path, len: u64, modified: SystemTime) -> Result<()> {
    write_sized(path, len)?;
    File::options().write(true).open(path)?.set_modified(modified)?;
    Ok(())
}
