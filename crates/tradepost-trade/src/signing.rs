//! Order signing collaborator.

use crate::order::Order;
use sha2::{Digest, Sha256};

pub trait OrderSigner: Send + Sync {
    /// Opaque signature over the order payload
    fn sign(&self, order: &Order) -> String;
}

/// SHA-256 over a session key and the canonical order payload
pub struct DigestSigner {
    key: Vec<u8>,
}

impl DigestSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        DigestSigner { key: key.into() }
    }
}

impl OrderSigner for DigestSigner {
    fn sign(&self, order: &Order) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.key);
        hasher.update(order.signing_payload());
        hex::encode(hasher.finalize())
    }
}
