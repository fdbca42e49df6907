//! Run artifacts and their identities
//!
//! Objectives and candidates are identified by BLAKE3 digests. A
//! [`TestSuite`] remembers the digest of the exact candidate text it was
//! generated against, so a suite can never silently travel with a
//! different candidate.

use serde::{Deserialize, Serialize};

/// Hex BLAKE3 digest of arbitrary text.
pub fn digest(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Registry key for an objective: the digest of its exact bytes.
pub fn fingerprint(objective: &str) -> String {
    digest(objective)
}

/// Generated tests, paired with one candidate version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuite {
    pub text: String,
    /// Digest of the candidate this suite was generated against
    pub candidate_digest: String,
}

impl TestSuite {
    pub fn for_candidate(text: impl Into<String>, candidate: &str) -> Self {
        Self {
            text: text.into(),
            candidate_digest: digest(candidate),
        }
    }

    /// Whether this suite was generated against exactly `candidate`.
    pub fn matches(&self, candidate: &str) -> bool {
        self.candidate_digest == digest(candidate)
    }
}
