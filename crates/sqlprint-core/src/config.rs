//! Fingerprinting options
//!
//! Bounds for hostile input. Defaults leave output for ordinary queries
//! untouched; the length cap is off unless a caller opts in.
//!
//! ```toml
//! max_query_bytes = 1048576
//! max_asc_passes = 1024
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default cap on ORDER BY ASC stripping passes
pub const DEFAULT_MAX_ASC_PASSES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Reject queries longer than this many bytes. `None` means unlimited.
    pub max_query_bytes: Option<usize>,
    /// Upper bound on passes of the ORDER BY ASC fixpoint loop
    pub max_asc_passes: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            max_query_bytes: None,
            max_asc_passes: DEFAULT_MAX_ASC_PASSES,
        }
    }
}

impl Options {
    /// Parse options from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Read and parse an options file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Fail with `InputTooLarge` when `query` exceeds the configured cap
    pub fn check_length(&self, query: &str) -> Result<()> {
        match self.max_query_bytes {
            Some(limit) if query.len() > limit => Err(Error::InputTooLarge {
                len: query.len(),
                limit,
            }),
            _ => Ok(()),
        }
    }
}
