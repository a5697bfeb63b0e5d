use serde::Serialize;
use thiserror::Error;

/// One structured rule violation, anchored at a field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub reason: ViolationReason,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationReason {
    /// The write would break a budget or policy rule.
    Forbidden,
    /// A field the tenant mandates is missing.
    Required,
    /// An immutable field was changed.
    Immutable,
}

/// Every violation found for one object, returned as a single rejection
/// so the writer sees the complete set of problems in one round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind} {name:?} is invalid: {}", summarize(.violations))]
pub struct ValidationErrors {
    pub kind: &'static str,
    pub name: String,
    pub violations: Vec<Violation>,
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Outcome classes of an admission check that did not pass.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The write violates policy. Never retried automatically.
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),
    /// The ledger could not answer within the admission deadline (or a
    /// referenced tenant could not be read). The write is rejected
    /// rather than left hanging: fail closed.
    #[error("admission check unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_all_violations() {
        let err = ValidationErrors {
            kind: "ResourceQuota",
            name: "default".to_string(),
            violations: vec![
                Violation {
                    field: "spec.hard.limits.cpu".to_string(),
                    reason: ViolationReason::Forbidden,
                    message: "over budget".to_string(),
                },
                Violation {
                    field: "spec.hard.limits.memory".to_string(),
                    reason: ViolationReason::Required,
                    message: "missing".to_string(),
                },
            ],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("spec.hard.limits.cpu: over budget"));
        assert!(rendered.contains("spec.hard.limits.memory: missing"));
    }
}
