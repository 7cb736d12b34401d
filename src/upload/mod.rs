mod orchestrator;
mod renew;
pub mod retry;

pub use orchestrator::{UploadParams, Uploader};
pub use retry::{RetryError, RetryPolicy};
