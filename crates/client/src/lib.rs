pub mod error;
mod models;
mod path;
pub mod service;

pub use crate::models::{DownloadMode, DownloadRecord, FileTrackingInfo};
pub use crate::path::validate as validate_path;
pub use crate::service::StorageClient;
use std::sync::Arc;

pub type ClientHandle = Arc<dyn StorageClient + Send + Sync>;
