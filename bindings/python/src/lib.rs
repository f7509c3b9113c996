//! Python bindings for sqlprint
//!
//! Thin wrapper around `sqlprint-core` — ZERO logic here.
//! All behavior comes from the canonical Rust implementation.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use sqlprint_core::Options;

/// Fingerprint a SQL query.
///
/// Guarantees:
///   - Deterministic: same input → same output
///   - Literal values, whitespace, case, IN-list arity, batched rows and
///     repeated UNION branches do not affect the result
///
/// Args:
///     query: raw SQL text
///
/// Returns:
///     The normalized fingerprint string
///
/// Raises:
///     ValueError: If UNION collapsing hits a structural error
#[pyfunction]
fn fingerprint(query: &str) -> PyResult<String> {
    sqlprint_core::fingerprint(query).map_err(|e| PyValueError::new_err(e.to_string()))
}

/// Classify a SQL query.
///
/// Args:
///     query: raw SQL text
///     max_query_bytes: optional length cap; longer queries raise
///
/// Returns:
///     JSON string: {"origin": "...", "text": "...", "hash": "..."}
///
/// Raises:
///     ValueError: On a structural error or when the length cap is exceeded
#[pyfunction]
#[pyo3(signature = (query, max_query_bytes=None))]
fn classify(query: &str, max_query_bytes: Option<usize>) -> PyResult<String> {
    let opts = Options {
        max_query_bytes,
        ..Options::default()
    };
    let fp =
        sqlprint_core::classify(query, &opts).map_err(|e| PyValueError::new_err(e.to_string()))?;

    serde_json::to_string_pretty(&fp)
        .map_err(|e| PyValueError::new_err(format!("Serialization error: {}", e)))
}

/// SHA-256 hash of an already computed fingerprint.
///
/// Args:
///     fingerprint: output of `fingerprint()`
///
/// Returns:
///     Hex-encoded SHA-256 hash string
#[pyfunction]
fn fingerprint_hash(fingerprint: &str) -> String {
    sqlprint_core::fingerprint_hash(fingerprint)
}

/// sqlprint Python module — MySQL query fingerprinting
#[pymodule]
fn sqlprint(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(fingerprint, m)?)?;
    m.add_function(wrap_pyfunction!(classify, m)?)?;
    m.add_function(wrap_pyfunction!(fingerprint_hash, m)?)?;
    Ok(())
}
