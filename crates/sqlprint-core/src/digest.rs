//! Digest — groups a stream of queries by fingerprint
//!
//! Answers "how many distinct query shapes did we see, and how often".
//! A query that fails to fingerprint is logged and counted as skipped;
//! it never aborts the rest of the stream.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{classify, Options, Origin};

/// One distinct query shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryClass {
    pub fingerprint: String,
    pub origin: Origin,
    pub hash: String,
    pub count: u64,
    /// First query seen with this fingerprint
    pub sample: String,
}

/// Running aggregation of classified queries
#[derive(Debug, Clone, Default)]
pub struct Digest {
    opts: Options,
    classes: HashMap<String, QueryClass>,
    total: u64,
    skipped: u64,
}

impl Digest {
    pub fn new(opts: Options) -> Self {
        Digest {
            opts,
            ..Digest::default()
        }
    }

    /// Classify `query` and fold it into its class.
    ///
    /// Returns `false` when the query could not be fingerprinted and was
    /// skipped.
    pub fn add(&mut self, query: &str) -> bool {
        self.total += 1;
        let fp = match classify(query, &self.opts) {
            Ok(fp) => fp,
            Err(e) => {
                self.skipped += 1;
                warn!(error = %e, record = self.total, "skipping query");
                return false;
            }
        };

        self.classes
            .entry(fp.text.clone())
            .and_modify(|class| class.count += 1)
            .or_insert_with(|| QueryClass {
                fingerprint: fp.text,
                origin: fp.origin,
                hash: fp.hash,
                count: 1,
                sample: query.to_string(),
            });
        true
    }

    /// Queries offered to [`Digest::add`], including skipped ones
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn distinct(&self) -> usize {
        self.classes.len()
    }

    pub fn get(&self, fingerprint: &str) -> Option<&QueryClass> {
        self.classes.get(fingerprint)
    }

    /// Classes ordered by count (descending), ties broken by fingerprint
    pub fn classes(&self) -> Vec<&QueryClass> {
        let mut classes: Vec<_> = self.classes.values().collect();
        classes.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        classes
    }
}

impl<'a> Extend<&'a str> for Digest {
    fn extend<I: IntoIterator<Item = &'a str>>(&mut self, queries: I) {
        for query in queries {
            self.add(query);
        }
    }
}
