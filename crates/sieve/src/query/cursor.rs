//! Opaque keyset cursors.
//!
//! The controller never looks inside a cursor; it only stores the token taken
//! from an edge row and hands it back on the next request. Executors that
//! have no token format of their own can use [`Cursor::from_values`], which
//! packs the row's sort-key values as base64url-encoded JSON.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Opaque pagination token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap an executor-provided token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode edge-row sort values as a cursor.
    pub fn from_values(values: &[serde_json::Value]) -> Self {
        // A slice of JSON values always serializes.
        let json = serde_json::to_vec(values).unwrap_or_default();
        Self(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode a cursor produced by [`Cursor::from_values`].
    ///
    /// Returns `None` for tokens in any other format.
    pub fn values(&self) -> Option<Vec<serde_json::Value>> {
        let bytes = URL_SAFE_NO_PAD.decode(self.0.as_bytes()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
