//! Wire types shared with the front-end and the cluster result parser.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Result of a single test within a set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    pub name: String,
    pub status: String,
    pub time_real: f64,
    pub time_cpu: f64,
    pub runtime_memory: i64,
}

/// Aggregated result of one test set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetResult {
    pub name: String,
    pub tests: HashMap<String, TestResult>,
}

/// Successful submission report posted to the front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerToBaca {
    pub pass_hash: String,
    pub submit_id: String,
    pub results: HashMap<String, SetResult>,
}

/// Structured error report posted to the front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerToBacaError {
    pub pass_hash: String,
    pub submit_id: String,
    pub error: String,
}

/// Deterministic hash binding a shared secret to a submission id.
///
/// Only needs to be recomputable on the receiving side; treated as an
/// internal implementation detail of this broker, not a contract owned
/// by any other repository.
pub fn make_hash(password: &str, submit_id: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(b":");
    hasher.update(submit_id.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = make_hash("secret", "submit-1");
        let b = make_hash("secret", "submit-1");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_differs_per_submit_id() {
        let a = make_hash("secret", "submit-1");
        let b = make_hash("secret", "submit-2");
        assert_ne!(a, b);
    }
}
