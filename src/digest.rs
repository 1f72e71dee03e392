//! Content digest helper shared by [`crate::hasher`].
//!
//! A "digest" per the glossary: a cryptographic hash of concatenated
//! inputs, such that digest equality implies input equality with
//! overwhelming probability.

use sha2::{Digest as _, Sha256};

/// Opaque content hash. `None`-ness is represented one level up (a locator
/// that is not a readable `file://` text module has *no* hash at all, per
/// spec.md §4.4) - this type is only ever the `Some` case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash([u8; 32]);

impl Hash {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Hash(hasher.finalize().into())
    }

    pub fn as_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// `digest(source_hash, ...child_hashes)` from spec.md §4.4: a sentinel
/// byte distinguishes "no hash" children from absent children, and the
/// children are folded in the order given by the caller (source order,
/// per the reference behavior - see spec.md §4.4 Tie-breaks and
/// SPEC_FULL.md §13 Open Question 1).
pub fn digest(source_hash: Hash, children: impl IntoIterator<Item = Option<Hash>>) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(source_hash.0);
    for child in children {
        match child {
            Some(h) => {
                hasher.update([1u8]);
                hasher.update(h.0);
            }
            None => hasher.update([0u8]),
        }
    }
    Hash(hasher.finalize().into())
}
