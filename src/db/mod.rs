mod db;
pub mod keys;
pub mod records;
mod tables;

pub use db::{BatchOp, KvStore, NodeStore, StoreError};
pub use records::RecordBatch;
