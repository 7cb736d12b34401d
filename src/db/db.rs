use std::path::PathBuf;
use std::sync::Arc;

use redb::{Database, Error, ReadableTable};
use thiserror::Error as ThisError;

use super::tables::RECORDS_TABLE;

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("store backend failure: {0}")]
    Backend(String),

    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<Error> for StoreError {
    fn from(err: Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

/// Durable key-value capability every higher component persists through.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Entries whose key starts with `prefix`, in key order.
    fn query_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    /// Applies every op or none of them.
    fn batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct NodeStore {
    db: Arc<Database>,
    pub path: String,
}

impl NodeStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db_file = PathBuf::from(path).join("db");

        let db = Database::create(db_file).map_err(Error::from)?;
        {
            let write_txn = db.begin_write().map_err(Error::from)?;
            {
                write_txn.open_table(RECORDS_TABLE).map_err(Error::from)?;
            }
            write_txn.commit().map_err(Error::from)?;
        }

        Ok(Self {
            db: Arc::new(db),
            path: path.to_string(),
        })
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(RECORDS_TABLE)?;
        let value = table.get(key)?.map(|data| data.value().to_vec());
        Ok(value)
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, Error> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(RECORDS_TABLE)?;

        let mut result = Vec::new();
        for item in table.range(prefix..)? {
            let (key, value) = item?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            result.push((key.to_string(), value.value().to_vec()));
        }
        Ok(result)
    }

    fn write(&self, ops: Vec<BatchOp>) -> Result<(), Error> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(RECORDS_TABLE)?;
            for op in &ops {
                match op {
                    BatchOp::Put { key, value } => {
                        table.insert(key.as_str(), value.as_slice())?;
                    }
                    BatchOp::Delete { key } => {
                        table.remove(key.as_str())?;
                    }
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl KvStore for NodeStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.read(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        Ok(self.write(vec![BatchOp::Put {
            key: key.to_string(),
            value: value.to_vec(),
        }])?)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        Ok(self.write(vec![BatchOp::Delete {
            key: key.to_string(),
        }])?)
    }

    fn query_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        Ok(self.scan(prefix)?)
    }

    fn batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        if ops.is_empty() {
            return Ok(());
        }
        Ok(self.write(ops)?)
    }
}
