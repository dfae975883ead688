//! Publishing inspection artifacts.

mod fs;
mod storage;
mod traits;

pub use fs::FsUploader;
pub use storage::StorageUploader;
pub use traits::{object_name, UploadError, Uploader};
