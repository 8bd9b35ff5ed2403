//! Secure Deletion Module
//!
//! Overwrites entry files with zero bytes before unlinking them so plaintext
//! is not left behind in the file's blocks.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

const ZERO_CHUNK: [u8; 8192] = [0u8; 8192];

/// Overwrites the full length of `path` with zeros and flushes to disk.
///
/// Returns the number of bytes overwritten.
pub fn overwrite_with_zeros(path: &Path) -> io::Result<u64> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();

    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(ZERO_CHUNK.len() as u64) as usize;
        file.write_all(&ZERO_CHUNK[..n])?;
        remaining -= n as u64;
    }
    file.sync_all()?;
    Ok(len)
}

/// Zero-fills then removes `path`.
///
/// Returns `Ok(None)` if the file was already gone, otherwise the number of
/// bytes the file held.
pub fn secure_delete(path: &Path) -> io::Result<Option<u64>> {
    let len = match overwrite_with_zeros(path) {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    match fs::remove_file(path) {
        Ok(()) => Ok(Some(len)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Some(len)),
        Err(e) => Err(e),
    }
}
