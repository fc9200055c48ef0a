//! Payload validation contract.

use serde_json::Value;

/// Result of validating a payload against a service's declared shape.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    /// The payload conforms.
    Valid,
    /// The payload violates one or more constraints.
    Invalid {
        /// Human-readable descriptions of each violation, surfaced to the
        /// caller joined into the failure reason.
        errors: Vec<String>,
    },
}

impl ValidationOutcome {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Joins the violation texts into one reason string; empty when valid.
    #[must_use]
    pub fn error_text(&self) -> String {
        match self {
            Self::Valid => String::new(),
            Self::Invalid { errors } => errors.join("; "),
        }
    }
}

/// Validates parsed payloads before a service is invoked.
///
/// Implementations live outside the core: a service that declares a
/// validator gets it called once per request, between body parsing and
/// rate-limit acquisition.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value) -> ValidationOutcome;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct RequireField(&'static str);

    impl Validator for RequireField {
        fn validate(&self, value: &Value) -> ValidationOutcome {
            if value.get(self.0).is_some() {
                ValidationOutcome::Valid
            } else {
                ValidationOutcome::Invalid {
                    errors: vec![format!("missing required field ({})", self.0)],
                }
            }
        }
    }

    #[test]
    fn valid_outcome_has_empty_error_text() {
        let outcome = RequireField("name").validate(&json!({"name": "x"}));
        assert!(outcome.is_valid());
        assert_eq!(outcome.error_text(), "");
    }

    #[test]
    fn invalid_outcome_joins_errors() {
        let outcome = ValidationOutcome::Invalid {
            errors: vec!["a".to_string(), "b".to_string()],
        };
        assert!(!outcome.is_valid());
        assert_eq!(outcome.error_text(), "a; b");
    }
}
