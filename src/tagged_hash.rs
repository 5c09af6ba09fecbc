//! # Tagged Hash Engine
//!
//! Domain-separated SHA256 used by the Elements Taproot commitments. A tagged
//! hash of `msg` under `tag` is `SHA256(SHA256(tag) || SHA256(tag) || msg)`;
//! the 64-byte prefix is computed once per tag and reused.
//!
//! The covenant script embeds the leaf and tweak prefixes verbatim so the
//! script interpreter can rebuild both hashes with `OP_CAT` and `OP_SHA256`.

use lazy_static::lazy_static;
use sha2::{Digest, Sha256};
use std::fmt;

/// Tag for tapscript leaf hashes on Elements
pub const TAP_LEAF_TAG: &str = "TapLeaf/elements";

/// Tag for the internal key tweak on Elements
pub const TAP_TWEAK_TAG: &str = "TapTweak/elements";

/// Tag for Merkle branch nodes on Elements
pub const TAP_BRANCH_TAG: &str = "TapBranch/elements";

lazy_static! {
    /// Prefix for leaf hashes
    pub static ref TAP_LEAF: TaggedHashPrefix = TaggedHashPrefix::new(TAP_LEAF_TAG);
    /// Prefix for the output key tweak
    pub static ref TAP_TWEAK: TaggedHashPrefix = TaggedHashPrefix::new(TAP_TWEAK_TAG);
    /// Prefix for branch hashes in multi-leaf trees
    pub static ref TAP_BRANCH: TaggedHashPrefix = TaggedHashPrefix::new(TAP_BRANCH_TAG);
}

/// `SHA256(tag) || SHA256(tag)` for one tag
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TaggedHashPrefix([u8; 64]);

impl TaggedHashPrefix {
    pub fn new(tag: &str) -> Self {
        let tag_hash = Sha256::digest(tag.as_bytes());
        let mut prefix = [0u8; 64];
        prefix[..32].copy_from_slice(&tag_hash);
        prefix[32..].copy_from_slice(&tag_hash);
        Self(prefix)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Hash the concatenation of `parts` under this tag
    pub fn hash(&self, parts: &[&[u8]]) -> [u8; 32] {
        let mut engine = Sha256::new();
        engine.update(self.0);
        for part in parts {
            engine.update(part);
        }
        engine.finalize().into()
    }
}

impl fmt::Debug for TaggedHashPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaggedHashPrefix({})", self.to_hex())
    }
}

/// Compute the 64-byte prefix for an arbitrary tag
pub fn tag_prefix(tag: &str) -> [u8; 64] {
    *TaggedHashPrefix::new(tag).as_bytes()
}
