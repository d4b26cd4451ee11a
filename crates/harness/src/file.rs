//! File identities.
//!
//! A [`LocalFile`] is a file on disk together with the checksum its contents
//! are supposed to have; a [`RemoteFile`] is an entry tracked by the storage
//! service, carrying the checksum of the local file it was uploaded from.
//! Checksums are computed once, from the bytes that were written, and only
//! recomputed to [verify](crate::verify) a file.

use crate::error::{ErrorKind, Result};
use crate::integrity;
use derive_more::Display;
use exn::ResultExt;
use rand::RngCore;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// BLAKE3 hash of a file's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub struct Checksum(blake3::Hash);
impl Checksum {
    pub fn of(data: &[u8]) -> Self {
        Self(blake3::hash(data))
    }

    pub fn as_bytes(&self) -> &[u8; blake3::OUT_LEN] {
        self.0.as_bytes()
    }
}
impl From<blake3::Hash> for Checksum {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash)
    }
}

/// A file on local disk and the checksum its contents should hash to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    path: PathBuf,
    checksum: Checksum,
}
impl LocalFile {
    pub fn new(path: impl Into<PathBuf>, checksum: Checksum) -> Self {
        Self { path: path.into(), checksum }
    }

    /// Write `size` random bytes to a new, randomly named file in `dir`.
    ///
    /// The directory is created if it doesn't exist. Never overwrites an
    /// existing file.
    pub async fn create(dir: &Path, size: usize) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await.or_raise(|| ErrorKind::LocalIo(dir.to_path_buf()))?;
        let mut data = vec![0u8; size];
        rand::rng().fill_bytes(&mut data);
        let path = dir.join(random_file_name());
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .or_raise(|| ErrorKind::LocalIo(path.clone()))?;
        file.write_all(&data).await.or_raise(|| ErrorKind::LocalIo(path.clone()))?;
        // Flush so the file is complete before anyone is told it exists.
        file.flush().await.or_raise(|| ErrorKind::LocalIo(path.clone()))?;
        tracing::debug!(path = %path.display(), bytes = size, "Created local file");
        Ok(Self {
            path,
            checksum: Checksum::of(&data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Verify the file on disk still hashes to the expected checksum.
    pub async fn check_integrity(&self) -> Result<()> {
        integrity::verify(&self.path, self.checksum).await
    }
}

/// A file tracked by the storage service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    path: PathBuf,
    checksum: Checksum,
}
impl RemoteFile {
    pub fn new(path: impl Into<PathBuf>, checksum: Checksum) -> Self {
        Self { path: path.into(), checksum }
    }

    /// Path relative to the service root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checksum(&self) -> Checksum {
        self.checksum
    }
}

/// A fresh file name for scratch files and download destinations.
pub(crate) fn random_file_name() -> String {
    rand::random::<u32>().to_string()
}
