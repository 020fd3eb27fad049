//! Content-addressed query identity.
//!
//! A [`Fingerprint`] is the sha256 digest of a node's kind tag, its
//! canonicalized parameters, and the fingerprints of its children in
//! order. Two graphs that describe the same result rows produce the same
//! fingerprint, which is what lets the cache share work between
//! structurally identical queries built independently.
//!
//! Canonicalization rules:
//! - JSON object keys are emitted in sorted order, recursively.
//! - Set-like parameters (e.g. subscriber subsets) are sorted at node
//!   construction, before they ever reach the digest.
//! - Cosmetic attributes (labels) are stored on the graph record, not in
//!   the node parameters, and so never reach the digest.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex-encoded sha256 identity of a query node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Fingerprint(String);

/// Number of fingerprint hex characters used in materialized table names.
pub const TABLE_SUFFIX_LEN: usize = 32;

impl Fingerprint {
    /// Digest a node from its kind tag, canonical parameters and child
    /// fingerprints.
    pub fn digest(kind_tag: &str, params: &Value, children: &[&Fingerprint]) -> Self {
        let mut canonical = String::new();
        canonical_json(params, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(kind_tag.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(canonical.as_bytes());
        for child in children {
            hasher.update(b"\x1f");
            hasher.update(child.0.as_bytes());
        }
        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading hex characters used to derive the cache table name.
    pub fn table_suffix(&self) -> &str {
        &self.0[..TABLE_SUFFIX_LEN]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize a JSON value with object keys in sorted order at every
/// nesting level. Scalars and array order pass through unchanged.
fn canonical_json(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                canonical_json(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonical_json(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
