//! sqlprint Core - MySQL query fingerprinting
//!
//! Reduces raw query text to a canonical fingerprint: the shape of the query
//! with literal values, whitespace, case, IN-list arity, batched rows and
//! repeated UNION branches folded away. Fingerprints are grouping keys for
//! query logs and live traffic.
//!
//! # Architecture
//!
//! ```text
//! Query Text → Short-circuits ─────────────────────┐
//!                   ↓                               ↓
//!              Normalizer stages → Union Collapser → Fingerprint → SHA-256
//!                                                        ↓
//!                                                     Digest (grouping)
//! ```
//!
//! # Guarantees
//!
//! - **Deterministic**: Same input always produces identical output
//! - **Stateless**: No shared mutable state; safe to call from any thread
//! - **Best-effort**: Malformed SQL still fingerprints; only a UNION
//!   accounting defect is an error
//!
//! This is not a SQL parser and does not validate syntax.

pub mod config;
pub mod digest;
pub mod error;
pub mod normalizer;
pub mod union;

pub use config::Options;
pub use digest::{Digest, QueryClass};
pub use error::{Error, Result};
pub use normalizer::fingerprint;

use sha2::{Digest as _, Sha256};

/// Which path produced a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// `mysqldump` table scan, labelled without normalization
    Mysqldump,
    /// Query carrying a Percona Toolkit marker comment
    PerconaToolkit,
    /// `administrator command: ...`, passed through verbatim
    AdministratorCommand,
    /// `CALL proc(...)`, reduced to the procedure name
    StoredProcedure,
    /// Ran the full normalization pipeline
    Normalized,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Origin::Mysqldump => "mysqldump",
            Origin::PerconaToolkit => "percona_toolkit",
            Origin::AdministratorCommand => "administrator_command",
            Origin::StoredProcedure => "stored_procedure",
            Origin::Normalized => "normalized",
        };
        f.write_str(name)
    }
}

/// A classified query
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fingerprint {
    pub origin: Origin,
    pub text: String,
    /// Lower-hex SHA-256 of `text`
    pub hash: String,
}

/// Fingerprint a query and attach its origin and hash
///
/// # Errors
/// `StructuralError` from UNION collapsing, or `InputTooLarge` when
/// `opts.max_query_bytes` is set and exceeded.
pub fn classify(query: &str, opts: &Options) -> Result<Fingerprint> {
    let (origin, text) = normalizer::fingerprint_with(query, opts)?;
    let hash = fingerprint_hash(&text);
    Ok(Fingerprint { origin, text, hash })
}

/// SHA-256 of a fingerprint, hex encoded
pub fn fingerprint_hash(fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    format!("{:x}", hasher.finalize())
}
