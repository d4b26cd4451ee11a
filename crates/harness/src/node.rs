use crate::error::{ErrorKind, Result};
use crate::file::{RemoteFile, random_file_name};
use crate::retry::RetryPolicy;
use converge_client::{ClientHandle, FileTrackingInfo};
use converge_config::Config;
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};

/// A storage service as seen by the harness.
///
/// Bundles the client used to talk to the service with the settings every
/// monitor shares: where local files are created, and how long waits poll.
/// Upload and download operations are implemented on this type.
pub struct Node {
    pub(crate) client: ClientHandle,
    scratch_dir: PathBuf,
    pub(crate) poll: RetryPolicy,
    pub(crate) require_observed_completion: bool,
}

impl Node {
    pub fn new(client: ClientHandle, config: &Config) -> Self {
        Self {
            client,
            scratch_dir: config.scratch_dir.clone(),
            poll: RetryPolicy::from(config.poll),
            require_observed_completion: config.downloads.require_observed_completion,
        }
    }

    /// Replace the polling budget of every wait operation.
    pub fn with_poll(mut self, poll: RetryPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn client(&self) -> &ClientHandle {
        &self.client
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn poll(&self) -> RetryPolicy {
        self.poll
    }

    /// Every file the service currently tracks.
    pub async fn files(&self) -> Result<Vec<FileTrackingInfo>> {
        self.client.tracked_files().await.or_raise(|| ErrorKind::Transport)
    }

    /// Fresh tracking info for `remote`.
    ///
    /// # Errors
    ///
    /// - [`Transport`](ErrorKind::Transport) if the listing request failed.
    /// - [`Untracked`](ErrorKind::Untracked) if the service doesn't list it.
    pub async fn file_info(&self, remote: &RemoteFile) -> Result<FileTrackingInfo> {
        self.files()
            .await?
            .into_iter()
            .find(|info| info.path.as_path() == remote.path())
            .ok_or_raise(|| ErrorKind::Untracked(remote.clone()))
    }

    /// A path in the scratch directory that nothing uses yet.
    pub(crate) async fn scratch_path(&self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .or_raise(|| ErrorKind::LocalIo(self.scratch_dir.clone()))?;
        Ok(self.scratch_dir.join(random_file_name()))
    }
}
