//! Type-safe newtypes for toolgate.
//!
//! These newtypes provide compile-time safety and semantic clarity
//! for core domain concepts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single tool invocation within one workflow run.
///
/// The canonical form is `<tool_name>#<k>` where `k` is the 0-based
/// count of prior invocations of that tool in the run. Ids are minted
/// in proxy-entry order and never reused within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    #[must_use]
    pub fn new(tool_name: &str, k: u64) -> Self {
        Self(format!("{tool_name}#{k}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the id back into `(tool_name, k)`.
    ///
    /// Returns `None` for strings that are not in canonical form.
    #[must_use]
    pub fn parts(&self) -> Option<(&str, u64)> {
        let (name, k) = self.0.rsplit_once('#')?;
        Some((name, k.parse().ok()?))
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of one workflow run, used to key audit artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generates a fresh random run id (32 hex chars).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the current wall-clock time as fractional unix seconds.
///
/// Provenance records carry float timestamps so the serialized audit
/// trail stays language-neutral.
#[must_use]
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// Compile-time assertions for thread safety.
#[cfg(test)]
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}

    assert_send_sync::<CallId>();
    assert_send_sync::<RunId>();
};
