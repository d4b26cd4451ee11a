//! Upload monitoring.
//!
//! An upload is submitted once and then observed through the tracked-file
//! listing until its progress and redundancy reach their targets.

use crate::error::{ErrorKind, Result, Shortfall};
use crate::file::{LocalFile, RemoteFile};
use crate::node::Node;
use converge_client::{FileTrackingInfo, validate_path};
use exn::{OptionExt, ResultExt};
use std::path::Path;
use tracing::instrument;

/// Redundancy of a fully uploaded file: all pieces over the data pieces.
///
/// # Errors
///
/// [`ErasureCoding`](ErrorKind::ErasureCoding) if `data_pieces` is zero.
pub fn target_redundancy(data_pieces: u64, parity_pieces: u64) -> Result<f64> {
    if data_pieces == 0 {
        exn::bail!(ErrorKind::ErasureCoding { data_pieces, parity_pieces });
    }
    Ok((data_pieces + parity_pieces) as f64 / data_pieces as f64)
}

#[derive(Debug, Clone, Copy)]
enum Metric {
    Progress,
    Redundancy,
}
impl Metric {
    fn observe(self, info: &FileTrackingInfo) -> f64 {
        match self {
            Self::Progress => info.upload_progress,
            Self::Redundancy => info.redundancy,
        }
    }

    fn shortfall(self, target: f64, observed: f64) -> Shortfall {
        match self {
            Self::Progress => Shortfall::Progress { target, observed },
            Self::Redundancy => Shortfall::Redundancy { target, observed },
        }
    }
}

impl Node {
    /// Submit `local` for upload and confirm the service tracks it.
    ///
    /// The remote path is the local file's name. On
    /// [`Untracked`](ErrorKind::Untracked) the error carries the remote
    /// identity, so the caller can keep inspecting the service.
    #[instrument(skip_all, fields(local = %local.path().display(), data = data_pieces, parity = parity_pieces))]
    pub async fn upload(&self, local: &LocalFile, data_pieces: u64, parity_pieces: u64) -> Result<RemoteFile> {
        let name = local
            .path()
            .file_name()
            .ok_or_raise(|| ErrorKind::InvalidRemotePath(local.path().to_path_buf()))?;
        let remote_path = validate_path(Path::new(name)).or_raise(|| ErrorKind::InvalidRemotePath(name.into()))?;
        self.client
            .submit_upload(local.path(), &remote_path, data_pieces, parity_pieces)
            .await
            .or_raise(|| ErrorKind::Transport)?;
        tracing::info!(service = self.client.name(), remote = %remote_path.display(), "Submitted upload");
        let remote = RemoteFile::new(remote_path, local.checksum());
        self.file_info(&remote).await?;
        Ok(remote)
    }

    /// Create a file of `size` random bytes in the scratch directory and
    /// submit it for upload, without waiting for it to finish.
    pub async fn upload_new_file(&self, size: usize, data_pieces: u64, parity_pieces: u64) -> Result<RemoteFile> {
        let local = LocalFile::create(self.scratch_dir(), size).await?;
        self.upload(&local, data_pieces, parity_pieces).await
    }

    /// [Upload a new file](Self::upload_new_file) and wait until it is fully
    /// uploaded and has reached its full redundancy.
    pub async fn upload_new_file_blocking(&self, size: usize, data_pieces: u64, parity_pieces: u64) -> Result<RemoteFile> {
        let redundancy = target_redundancy(data_pieces, parity_pieces)?;
        let remote = self.upload_new_file(size, data_pieces, parity_pieces).await?;
        self.wait_for_upload_progress(&remote, 1.0).await?;
        self.wait_for_upload_redundancy(&remote, redundancy).await?;
        Ok(remote)
    }

    /// Poll until the reported upload progress of `remote` reaches `target`.
    ///
    /// Fails straight away with [`Untracked`](ErrorKind::Untracked) if the
    /// service doesn't track the file. When the budget runs out, the error
    /// carries the last observed progress.
    #[instrument(skip_all, fields(remote = %remote.path().display(), threshold = target))]
    pub async fn wait_for_upload_progress(&self, remote: &RemoteFile, target: f64) -> Result<()> {
        self.wait_for_upload(remote, Metric::Progress, target).await
    }

    /// Poll until the reported redundancy of `remote` reaches `target`.
    ///
    /// Same polling shape as [`wait_for_upload_progress`](Self::wait_for_upload_progress).
    #[instrument(skip_all, fields(remote = %remote.path().display(), threshold = target))]
    pub async fn wait_for_upload_redundancy(&self, remote: &RemoteFile, target: f64) -> Result<()> {
        self.wait_for_upload(remote, Metric::Redundancy, target).await
    }

    async fn wait_for_upload(&self, remote: &RemoteFile, metric: Metric, target: f64) -> Result<()> {
        self.file_info(remote).await?;
        self.poll.retry(move || self.check_upload(remote, metric, target)).await
    }

    async fn check_upload(&self, remote: &RemoteFile, metric: Metric, target: f64) -> Result<()> {
        let info = self.file_info(remote).await?;
        let observed = metric.observe(&info);
        if observed < target {
            exn::bail!(ErrorKind::ThresholdNotMet(metric.shortfall(target, observed)));
        }
        Ok(())
    }
}
