//! Ed25519 message signing
//!
//! Operators sign the signing root of each consensus message with their
//! Ed25519 operator key; the committee's public keys live in the [`Share`].

use crate::domain::SignedMessage;
use crate::ports::{MessageSigner, SignatureVerifier};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use shared_types::{Hash, OperatorId, Share};

pub struct Ed25519Signer {
    operator_id: OperatorId,
    signing_key: SigningKey,
}

impl Ed25519Signer {
    pub fn from_seed(operator_id: OperatorId, seed: [u8; 32]) -> Self {
        Self {
            operator_id,
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("operator_id", &self.operator_id)
            .finish_non_exhaustive()
    }
}

impl MessageSigner for Ed25519Signer {
    fn operator_id(&self) -> OperatorId {
        self.operator_id
    }

    fn sign_root(&self, root: &Hash) -> Result<Vec<u8>, String> {
        Ok(self.signing_key.sign(root).to_bytes().to_vec())
    }
}

/// Verifies single-signer messages against the committee's operator keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, msg: &SignedMessage, share: &Share) -> bool {
        let Some(signer) = msg.signer() else {
            return false;
        };
        let Some(operator) = share.operator(signer) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&operator.public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&msg.signature) else {
            return false;
        };
        key.verify(&msg.message.signing_root(), &signature).is_ok()
    }
}
