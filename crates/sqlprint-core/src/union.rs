//! Union collapser — folds runs of identical UNION branches
//!
//! `select a from t union select a from t union select b from t` becomes
//! `select a from t /*repeatunion*/ union select b from t`.
//!
//! Works on already-normalized text: single spaces, lower case, no comments.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Error, Result};

static UNION_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\t\n\f\r ](union all|union)[\t\n\f\r ]").unwrap());

/// Collapse consecutive identical branches of a UNION chain.
///
/// Queries without a UNION are returned unchanged.
pub fn collapse_union(query: &str) -> Result<String> {
    let branches: Vec<&str> = UNION_SEPARATOR.split(query).collect();
    if branches.len() == 1 {
        return Ok(query.to_string());
    }
    let separators: Vec<&str> = UNION_SEPARATOR
        .find_iter(query)
        .map(|m| m.as_str())
        .collect();
    collapse_runs(&branches, &separators)
}

/// Rebuild a UNION chain from its branches and the separators between them,
/// replacing each run of identical branches with its first branch and a
/// `/*repeat<keyword>*/` marker.
///
/// `separators[i]` is the text between `branches[i]` and `branches[i + 1]`.
///
/// # Errors
/// `StructuralError` unless `branches.len() == separators.len() + 1`.
pub fn collapse_runs(branches: &[&str], separators: &[&str]) -> Result<String> {
    if branches.len() != separators.len() + 1 {
        return Err(Error::StructuralError {
            branches: branches.len(),
            separators: separators.len(),
        });
    }

    // `None` is the sentinel: unequal to every branch, it flushes the last run.
    let nodes: Vec<Option<&str>> = branches
        .iter()
        .copied()
        .map(Some)
        .chain(std::iter::once(None))
        .collect();

    let mut out = String::with_capacity(branches.iter().map(|b| b.len()).sum());
    out.push_str(branches[0]);

    let mut start = 0;
    for (i, node) in nodes.iter().enumerate().skip(1) {
        if *node == nodes[start] {
            continue;
        }
        if i - start > 1 {
            out.push_str(" /*repeat");
            out.push_str(separators[i - 2].trim());
            out.push_str("*/");
        }
        if let Some(branch) = node {
            out.push_str(separators[i - 1]);
            out.push_str(branch);
        }
        start = i;
    }

    Ok(out)
}
