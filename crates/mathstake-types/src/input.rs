use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The realized evaluation input for a problem.
///
/// Captured once per problem; every solution in an evaluation pass is judged
/// against the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestInput {
    /// Number, list of numbers, or a structured record for data-source problems.
    pub value: Value,
    /// Which generator produced it (`range`, `stock`, `crypto`, `weather`, `custom`, `numeric`).
    pub source: String,
    pub generated_at: DateTime<Utc>,
}

impl TestInput {
    pub fn new(value: Value, source: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            value,
            source: source.into(),
            generated_at,
        }
    }

    /// Stable fingerprint of the input value, for audit log fields.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(&self.value).unwrap_or_default();
        hex::encode(&blake3::hash(&bytes).as_bytes()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_value_based() {
        let now = Utc::now();
        let a = TestInput::new(json!([1.5, 2.5]), "range", now);
        let b = TestInput::new(json!([1.5, 2.5]), "range", now + chrono::Duration::seconds(5));
        let c = TestInput::new(json!([1.5, 2.6]), "range", now);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
