use sha2::{Digest, Sha256};

use super::identity::{verify, NodeIdentity};
use crate::error::{Result, UploadError};
use crate::packets::{ContractMetadata, ContractStatus, FileMeta, SignedContract, StatusQuery};

/// Bytes both parties sign. The settlement status is excluded so later status
/// updates don't invalidate the agreement.
pub fn contract_payload(meta: &ContractMetadata) -> Result<Vec<u8>> {
    let unsigned = ContractMetadata {
        status: ContractStatus::Init,
        ..meta.clone()
    };
    Ok(serde_json::to_vec(&unsigned)?)
}

pub fn sign_contract(renter: &NodeIdentity, meta: ContractMetadata) -> Result<SignedContract> {
    if meta.renter_peer_id != renter.peer_id() {
        return Err(UploadError::Signature(
            "contract creator does not match signing identity".to_string(),
        ));
    }
    let renter_signature = renter.sign(&contract_payload(&meta)?);
    Ok(SignedContract {
        meta,
        renter_signature,
        host_signature: Vec::new(),
    })
}

pub fn countersign_contract(host: &NodeIdentity, contract: &mut SignedContract) -> Result<()> {
    if contract.meta.host_peer_id != host.peer_id() {
        return Err(UploadError::Signature(
            "contract provider does not match signing identity".to_string(),
        ));
    }
    contract.host_signature = host.sign(&contract_payload(&contract.meta)?);
    Ok(())
}

pub fn verify_renter_signature(contract: &SignedContract) -> Result<()> {
    verify(
        &contract.meta.renter_peer_id,
        &contract_payload(&contract.meta)?,
        &contract.renter_signature,
    )
}

pub fn verify_host_signature(contract: &SignedContract) -> Result<()> {
    verify(
        &contract.meta.host_peer_id,
        &contract_payload(&contract.meta)?,
        &contract.host_signature,
    )
}

pub fn file_meta_payload(meta: &FileMeta) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(meta)?)
}

pub fn sign_file_meta(owner: &NodeIdentity, meta: &FileMeta) -> Result<Vec<u8>> {
    Ok(owner.sign(&file_meta_payload(meta)?))
}

pub fn verify_file_meta(meta: &FileMeta, signature: &[u8]) -> Result<()> {
    verify(&meta.owner_peer_id, &file_meta_payload(meta)?, signature)
}

pub fn sign_status_query(renter: &NodeIdentity, file_hash: &str, timestamp: i64) -> StatusQuery {
    let payload = format!("{}:{}", file_hash, timestamp);
    StatusQuery {
        file_hash: file_hash.to_string(),
        renter_peer_id: renter.peer_id().to_string(),
        timestamp,
        signature: renter.sign(payload.as_bytes()),
    }
}

pub fn payload_digest(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}
