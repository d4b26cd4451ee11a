//! Checksum verification of local files.

use crate::error::{ErrorKind, Result};
use crate::file::Checksum;
use exn::ResultExt;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::instrument;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Verify that the whole file at `path` hashes to `expected`.
///
/// # Errors
///
/// - [`Unreadable`](ErrorKind::Unreadable) if the file can't be opened or
///   read to the end.
/// - [`Integrity`](ErrorKind::Integrity) if the checksums differ.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn verify(path: &Path, expected: Checksum) -> Result<()> {
    let actual = checksum_file(path).await.or_raise(|| ErrorKind::Unreadable(path.to_path_buf()))?;
    if actual != expected {
        exn::bail!(ErrorKind::Integrity {
            subject: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}

async fn checksum_file(path: &Path) -> std::io::Result<Checksum> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().into())
}
