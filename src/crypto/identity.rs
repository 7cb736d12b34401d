use std::fmt;

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};

use crate::error::{Result, UploadError};

/// A node's secp256k1 key pair. The peer id is the hex of the compressed
/// SEC1 public key, so any peer can verify signatures from the id alone.
#[derive(Clone)]
pub struct NodeIdentity {
    peer_id: String,
    signing_key: SigningKey,
}

impl NodeIdentity {
    pub fn generate() -> Result<Self> {
        let secret: [u8; 32] = rand::random();
        Self::from_secret_bytes(&secret)
    }

    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|e| UploadError::Signature(e.to_string()))?;
        let peer_id = hex::encode(signing_key.verifying_key().to_sec1_bytes());
        Ok(Self {
            peer_id,
            signing_key,
        })
    }

    pub fn from_secret_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret).map_err(|e| UploadError::Signature(e.to_string()))?;
        Self::from_secret_bytes(&bytes)
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(data);
        signature.to_bytes().to_vec()
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("peer_id", &self.peer_id)
            .finish()
    }
}

pub fn verify(peer_id: &str, data: &[u8], signature: &[u8]) -> Result<()> {
    let pub_bytes = hex::decode(peer_id).map_err(|e| UploadError::Signature(e.to_string()))?;
    let verifying_key = VerifyingKey::from_sec1_bytes(&pub_bytes)
        .map_err(|e| UploadError::Signature(e.to_string()))?;
    let signature =
        Signature::from_slice(signature).map_err(|e| UploadError::Signature(e.to_string()))?;
    verifying_key
        .verify(data, &signature)
        .map_err(|e| UploadError::Signature(format!("verification failed: {}", e)))
}
