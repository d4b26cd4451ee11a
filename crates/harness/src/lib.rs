//! Convergence checks for an asynchronous, eventually-consistent storage
//! service.
//!
//! Uploads and downloads are submitted through a
//! [`StorageClient`](converge_client::StorageClient) and completed by the
//! service in the background. A [`Node`] polls what the service reports until
//! the awaited condition holds (upload progress, redundancy, download
//! completion), checks every download record it sees for consistency, and
//! verifies transferred content against the checksum it was created with.
//!
//! ```no_run
//! use converge_harness::{Config, Node};
//! use converge_client::DownloadMode;
//! # async fn run(client: converge_client::ClientHandle) -> converge_harness::error::Result<()> {
//! let node = Node::new(client, &Config::default());
//! let remote = node.upload_new_file_blocking(4096, 2, 2).await?;
//! let local = node.download_to_disk(&remote, DownloadMode::Async).await?;
//! node.wait_for_download(&local, &remote).await?;
//! # Ok(())
//! # }
//! ```

mod download;
pub mod error;
mod file;
mod integrity;
mod node;
pub mod retry;
mod upload;

pub use crate::download::{DownloadInfo, DownloadOutcome, Violation, Violations};
pub use crate::file::{Checksum, LocalFile, RemoteFile};
pub use crate::integrity::verify;
pub use crate::node::Node;
pub use crate::retry::{RetryPolicy, retry};
pub use crate::upload::target_redundancy;
pub use converge_config::Config;
