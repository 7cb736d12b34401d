use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::cache::ObjectCache;
use super::records::{
    self, now, AdditionalInfoRecord, OfflineMetaRecord, OfflineSigningRecord, SessionStatusRecord,
};
use super::renter_shard::RenterShard;
use super::states::{apply_session_event, progress_message, SessionEvent, SessionState};
use crate::crypto::signature::{file_meta_payload, payload_digest, verify_file_meta};
use crate::db::records::{get_optional, get_record, put_record};
use crate::db::{keys, KvStore, RecordBatch, StoreError};
use crate::error::{Result, UploadError};
use crate::logger::LOGGER;
use crate::packets::FileMeta;
use crate::session::states::RenterShardState;

struct SessionInner {
    state: SessionState,
    message: String,
}

/// Renter-side tracking of one whole-file upload across all of its shards.
pub struct RenterSession {
    store: Arc<dyn KvStore>,
    owner: String,
    id: String,
    file_hash: String,
    shard_hashes: Vec<String>,
    inner: Mutex<SessionInner>,
    scope: CancellationToken,
    pending_signature: Mutex<Option<oneshot::Sender<Vec<u8>>>>,
}

impl RenterSession {
    /// Returns the live session for `(owner, session_id)`, hydrating it from the
    /// store on first use. Empty `file_hash`/`shard_hashes` are filled from the
    /// stored record.
    pub fn obtain(
        cache: &ObjectCache,
        store: Arc<dyn KvStore>,
        parent: &CancellationToken,
        owner: &str,
        session_id: &str,
        file_hash: &str,
        shard_hashes: &[String],
    ) -> Result<Arc<Self>> {
        cache
            .sessions
            .get_or_try_insert_with(ObjectCache::key(owner, session_id), || {
                Self::hydrate(store, parent, owner, session_id, file_hash, shard_hashes)
            })
    }

    fn hydrate(
        store: Arc<dyn KvStore>,
        parent: &CancellationToken,
        owner: &str,
        session_id: &str,
        file_hash: &str,
        shard_hashes: &[String],
    ) -> Result<Self> {
        let status_key = keys::session_key(owner, session_id, keys::STATUS);
        let stored: Option<SessionStatusRecord> = get_optional(&*store, &status_key)?;

        let (state, message, file_hash, shard_hashes, fresh) = match stored {
            None => (
                SessionState::Init,
                progress_message(SessionState::Init).to_string(),
                file_hash.to_string(),
                shard_hashes.to_vec(),
                true,
            ),
            Some(record) => {
                let state =
                    SessionState::parse(&record.state).ok_or_else(|| StoreError::Corrupt {
                        key: status_key.clone(),
                        reason: format!("unknown session state {}", record.state),
                    })?;
                let file_hash = if file_hash.is_empty() {
                    record.file_hash
                } else {
                    file_hash.to_string()
                };
                // The shard list is fixed once the session left init.
                let shard_hashes = if shard_hashes.is_empty() || state != SessionState::Init {
                    record.shard_hashes
                } else {
                    shard_hashes.to_vec()
                };
                (state, record.message, file_hash, shard_hashes, false)
            }
        };

        let scope = parent.child_token();
        if state.is_terminal() {
            scope.cancel();
        }

        let session = Self {
            store,
            owner: owner.to_string(),
            id: session_id.to_string(),
            file_hash,
            shard_hashes,
            inner: Mutex::new(SessionInner {
                state,
                message: message.clone(),
            }),
            scope,
            pending_signature: Mutex::new(None),
        };

        if fresh {
            put_record(
                &*session.store,
                &status_key,
                &session.status_record(state, &message),
            )?;
        }
        LOGGER.session(&format!(
            "Session {} loaded in state {} ({} shards)",
            session.id,
            state,
            session.shard_hashes.len()
        ));
        Ok(session)
    }

    fn status_record(&self, state: SessionState, message: &str) -> SessionStatusRecord {
        SessionStatusRecord {
            state: state.as_str().to_string(),
            message: message.to_string(),
            file_hash: self.file_hash.clone(),
            shard_hashes: self.shard_hashes.clone(),
            last_updated: now(),
        }
    }

    /// Applies `event`, persisting status and additional info in one batch.
    /// A failed persist raises the session's own error event before returning.
    fn fire(&self, event: SessionEvent, info: &str) -> Result<()> {
        let outcome = {
            let mut inner = self.inner.lock();
            let transition = apply_session_event(inner.state, event)?;
            let message = if transition.to == SessionState::Error {
                info.to_string()
            } else {
                progress_message(transition.to).to_string()
            };

            let persisted = RecordBatch::new()
                .put(
                    keys::session_key(&self.owner, &self.id, keys::STATUS),
                    &self.status_record(transition.to, &message),
                )
                .and_then(|batch| {
                    batch.put(
                        keys::session_key(&self.owner, &self.id, keys::ADDITIONAL_INFO),
                        &AdditionalInfoRecord {
                            info: info.to_string(),
                            last_updated: now(),
                        },
                    )
                })
                .and_then(|batch| batch.commit(&*self.store));

            match persisted {
                Ok(()) => {
                    inner.state = transition.to;
                    inner.message = message;
                    Ok(transition)
                }
                Err(e) => Err(e),
            }
        };

        match outcome {
            Ok(transition) => {
                LOGGER.session(&format!(
                    "Session {}: {} -> {}",
                    self.id, transition.from, transition.to
                ));
                if transition.cancel_scope {
                    self.scope.cancel();
                }
                Ok(())
            }
            Err(e) if event == SessionEvent::ToError => {
                self.force_error(&format!("{} (status not persisted: {})", info, e));
                Err(e.into())
            }
            Err(e) => {
                LOGGER.error(&format!(
                    "Session {}: failed to persist {}: {}",
                    self.id, event, e
                ));
                let _ = self.fire(
                    SessionEvent::ToError,
                    &format!("failed to persist session status: {}", e),
                );
                Err(e.into())
            }
        }
    }

    /// Last resort when even the error status can't be written.
    fn force_error(&self, message: &str) {
        {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return;
            }
            inner.state = SessionState::Error;
            inner.message = message.to_string();
        }
        LOGGER.error(&format!("Session {}: {}", self.id, message));
        self.scope.cancel();
    }

    pub fn submit(&self) -> Result<()> {
        self.fire(SessionEvent::ToSubmit, "")
    }

    pub fn to_contract(&self, info: &str) -> Result<()> {
        self.fire(SessionEvent::ToContract, info)
    }

    pub fn file_meta_signed(&self) -> Result<()> {
        self.fire(SessionEvent::ToFileMetaSigned, "")
    }

    pub fn file_meta_added(&self) -> Result<()> {
        self.fire(SessionEvent::ToFileMetaAdded, "")
    }

    pub fn wait_upload(&self) -> Result<()> {
        self.fire(SessionEvent::ToWaitUpload, "")
    }

    pub fn wait_upload_req_signed(&self) -> Result<()> {
        self.fire(SessionEvent::ToWaitUploadReqSigned, "")
    }

    pub fn pay(&self) -> Result<()> {
        self.fire(SessionEvent::ToPay, "")
    }

    pub fn complete(&self) -> Result<()> {
        self.fire(SessionEvent::ToComplete, "")
    }

    /// Moves the session to `error` carrying `reason` as the status message.
    /// Rejected (and harmless) once the session is already terminal.
    pub fn error(&self, reason: &str) -> Result<()> {
        self.fire(SessionEvent::ToError, reason)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file_hash(&self) -> &str {
        &self.file_hash
    }

    pub fn shard_hashes(&self) -> &[String] {
        &self.shard_hashes
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn message(&self) -> String {
        self.inner.lock().message.clone()
    }

    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    pub fn get_status(&self) -> Result<SessionStatusRecord> {
        match get_record(&*self.store, &keys::session_key(&self.owner, &self.id, keys::STATUS)) {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound(_)) => Err(UploadError::SessionNotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_additional_info(&self) -> Result<String> {
        records::read_additional_info(
            &*self.store,
            &keys::session_key(&self.owner, &self.id, keys::ADDITIONAL_INFO),
        )
    }

    pub fn update_additional_info(&self, info: &str) -> Result<()> {
        records::write_additional_info(
            &*self.store,
            &keys::session_key(&self.owner, &self.id, keys::ADDITIONAL_INFO),
            info,
        )
    }

    /// `(completed, errored)` over every shard of the session.
    pub fn count_completed_and_errored_shards(&self) -> Result<(usize, usize)> {
        let all: Vec<usize> = (0..self.shard_hashes.len()).collect();
        self.count_shards(&all)
    }

    /// `(completed, errored)` over the given shard indexes.
    pub fn count_shards(&self, indexes: &[usize]) -> Result<(usize, usize)> {
        let mut completed = 0;
        let mut errored = 0;
        for &index in indexes {
            let Some(hash) = self.shard_hashes.get(index) else {
                continue;
            };
            let shard_id = keys::shard_id(&self.id, hash, index);
            match RenterShard::stored_state(&*self.store, &self.owner, &shard_id)? {
                Some(RenterShardState::Contract) => completed += 1,
                Some(RenterShardState::Error) => errored += 1,
                _ => {}
            }
        }
        Ok((completed, errored))
    }

    /// Registers the channel the submission phase blocks on for the file-meta
    /// signature. A newer registration replaces an older one.
    pub fn expect_signature(&self) -> oneshot::Receiver<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        *self.pending_signature.lock() = Some(tx);
        rx
    }

    pub fn deliver_signature(&self, signature: Vec<u8>) -> Result<()> {
        let sender = self
            .pending_signature
            .lock()
            .take()
            .ok_or_else(|| UploadError::NoPendingSignature(self.id.clone()))?;
        sender.send(signature).map_err(|_| UploadError::Cancelled)
    }

    pub fn save_offline_meta(&self, meta: &FileMeta) -> Result<OfflineMetaRecord> {
        let record = OfflineMetaRecord {
            meta: meta.clone(),
            digest: payload_digest(&file_meta_payload(meta)?),
            created_at: now(),
        };
        put_record(
            &*self.store,
            &keys::session_key(&self.owner, &self.id, keys::OFFLINE_META),
            &record,
        )?;
        Ok(record)
    }

    pub fn offline_meta(&self) -> Result<Option<OfflineMetaRecord>> {
        Ok(get_optional(
            &*self.store,
            &keys::session_key(&self.owner, &self.id, keys::OFFLINE_META),
        )?)
    }

    pub fn offline_signature(&self) -> Result<Option<OfflineSigningRecord>> {
        Ok(get_optional(
            &*self.store,
            &keys::session_key(&self.owner, &self.id, keys::OFFLINE_SIGNING),
        )?)
    }

    /// Entry point for an external signer: checks the signature against the
    /// parked file metadata, persists it, and wakes the waiting submission.
    pub fn submit_offline_signature(&self, signature: Vec<u8>) -> Result<()> {
        let record = self
            .offline_meta()?
            .ok_or_else(|| UploadError::NoPendingSignature(self.id.clone()))?;
        verify_file_meta(&record.meta, &signature)?;
        put_record(
            &*self.store,
            &keys::session_key(&self.owner, &self.id, keys::OFFLINE_SIGNING),
            &OfflineSigningRecord {
                signature: hex::encode(&signature),
                signed_at: now(),
            },
        )?;
        self.deliver_signature(signature)
    }
}

impl fmt::Debug for RenterSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenterSession")
            .field("owner", &self.owner)
            .field("id", &self.id)
            .field("file_hash", &self.file_hash)
            .field("shards", &self.shard_hashes.len())
            .field("state", &self.state())
            .finish()
    }
}
