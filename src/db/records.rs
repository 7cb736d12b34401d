use serde::de::DeserializeOwned;
use serde::Serialize;

use super::db::{BatchOp, KvStore, StoreError};

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(key: &str, data: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(data).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

pub fn get_record<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<T, StoreError> {
    let data = store.get(key)?;
    decode(key, &data)
}

/// Like [`get_record`] but maps a missing key to `None`.
pub fn get_optional<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match get_record(store, key) {
        Ok(record) => Ok(Some(record)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn put_record<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> Result<(), StoreError> {
    let data = encode(key, value)?;
    store.put(key, &data)
}

pub fn delete_record(store: &dyn KvStore, key: &str) -> Result<(), StoreError> {
    store.delete(key)
}

pub fn list_records<T: DeserializeOwned>(
    store: &dyn KvStore,
    prefix: &str,
) -> Result<Vec<T>, StoreError> {
    store
        .query_prefix(prefix)?
        .iter()
        .map(|(key, value)| decode(key, value))
        .collect()
}

pub fn list_keys(store: &dyn KvStore, prefix: &str) -> Result<Vec<String>, StoreError> {
    Ok(store
        .query_prefix(prefix)?
        .into_iter()
        .map(|(key, _)| key)
        .collect())
}

/// Records under `prefix` whose key also contains `needle`.
pub fn list_records_matching<T: DeserializeOwned>(
    store: &dyn KvStore,
    prefix: &str,
    needle: &str,
) -> Result<Vec<(String, T)>, StoreError> {
    let mut result = Vec::new();
    for (key, value) in store.query_prefix(prefix)? {
        if key.contains(needle) {
            let record = decode(&key, &value)?;
            result.push((key, record));
        }
    }
    Ok(result)
}

/// Collects puts and deletes and commits them in one store transaction.
#[derive(Debug, Default)]
pub struct RecordBatch {
    ops: Vec<BatchOp>,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Serialize>(mut self, key: String, value: &T) -> Result<Self, StoreError> {
        let data = encode(&key, value)?;
        self.ops.push(BatchOp::Put { key, value: data });
        Ok(self)
    }

    pub fn put_raw(mut self, key: String, value: Vec<u8>) -> Self {
        self.ops.push(BatchOp::Put { key, value });
        self
    }

    pub fn delete(mut self, key: String) -> Self {
        self.ops.push(BatchOp::Delete { key });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn commit(self, store: &dyn KvStore) -> Result<(), StoreError> {
        store.batch(self.ops)
    }
}
