//! Deterministic GUIDs derived from names.
//!
//! Kibana expects stable IDs for saved-object style metadata (index
//! patterns, hits). We derive them by hashing the name and laying the
//! digest out as a v4-shaped UUID; determinism is what matters here, not
//! unpredictability.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Build a stable UUID from an arbitrary name.
pub fn guid_from_name(name: &str) -> Uuid {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}
