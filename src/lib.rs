pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handler;
pub mod host;
pub mod logger;
pub mod network;
pub mod packets;
pub mod session;
pub mod settlement;
pub mod upload;

pub use error::{Result, UploadError};
