use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label selector over namespaces, in the usual Kubernetes shape:
/// exact-match labels plus set-based expressions, ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: Operator,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("selector requirement has an empty key")]
    EmptyKey,
    #[error("operator {0} requires at least one value")]
    NeedsValues(&'static str),
    #[error("operator {0} must not carry values")]
    ForbidsValues(&'static str),
}

impl Operator {
    fn name(self) -> &'static str {
        match self {
            Operator::In => "In",
            Operator::NotIn => "NotIn",
            Operator::Exists => "Exists",
            Operator::DoesNotExist => "DoesNotExist",
        }
    }
}

impl LabelSelector {
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    /// Reject malformed requirements before any matching is attempted.
    fn validate(&self) -> Result<(), SelectorError> {
        for req in &self.match_expressions {
            if req.key.is_empty() {
                return Err(SelectorError::EmptyKey);
            }
            match req.operator {
                Operator::In | Operator::NotIn => {
                    if req.values.is_empty() {
                        return Err(SelectorError::NeedsValues(req.operator.name()));
                    }
                }
                Operator::Exists | Operator::DoesNotExist => {
                    if !req.values.is_empty() {
                        return Err(SelectorError::ForbidsValues(req.operator.name()));
                    }
                }
            }
        }
        Ok(())
    }

    fn matches(&self, labels: &HashMap<String, String>) -> bool {
        for (key, value) in &self.match_labels {
            if labels.get(key) != Some(value) {
                return false;
            }
        }
        for req in &self.match_expressions {
            let found = labels.get(&req.key);
            let ok = match req.operator {
                Operator::In => found.is_some_and(|v| req.values.contains(v)),
                Operator::NotIn => found.is_none_or(|v| !req.values.contains(v)),
                Operator::Exists => found.is_some(),
                Operator::DoesNotExist => found.is_none(),
            };
            if !ok {
                return false;
            }
        }
        true
    }
}

/// Does `selector` select an object with these labels?
///
/// An absent selector matches nothing, and so does a present-but-empty
/// one. Tenants opt namespaces in explicitly; a tenant created without
/// a selector governs nothing.
pub fn selects(
    selector: Option<&LabelSelector>,
    labels: &HashMap<String, String>,
) -> Result<bool, SelectorError> {
    let Some(selector) = selector else {
        return Ok(false);
    };
    if selector.is_empty() {
        return Ok(false);
    }
    selector.validate()?;
    Ok(selector.matches(labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn team_selector(team: &str) -> LabelSelector {
        LabelSelector {
            match_labels: BTreeMap::from([("team".to_string(), team.to_string())]),
            ..Default::default()
        }
    }

    #[test]
    fn absent_and_empty_selectors_match_nothing() {
        let ns = labels(&[("team", "a")]);
        assert_eq!(selects(None, &ns), Ok(false));
        assert_eq!(selects(Some(&LabelSelector::default()), &ns), Ok(false));
    }

    #[test]
    fn match_labels_requires_all_pairs() {
        let sel = LabelSelector {
            match_labels: BTreeMap::from([
                ("team".to_string(), "a".to_string()),
                ("env".to_string(), "prod".to_string()),
            ]),
            ..Default::default()
        };
        assert_eq!(
            selects(Some(&sel), &labels(&[("team", "a"), ("env", "prod")])),
            Ok(true)
        );
        assert_eq!(selects(Some(&sel), &labels(&[("team", "a")])), Ok(false));
        assert_eq!(
            selects(Some(&team_selector("a")), &labels(&[("team", "b")])),
            Ok(false)
        );
    }

    #[test]
    fn set_based_operators() {
        let req = |op, values: &[&str]| LabelSelectorRequirement {
            key: "team".to_string(),
            operator: op,
            values: values.iter().map(|v| v.to_string()).collect(),
        };
        let sel = |r| LabelSelector {
            match_expressions: vec![r],
            ..Default::default()
        };

        let a = labels(&[("team", "a")]);
        let none = labels(&[]);

        assert_eq!(selects(Some(&sel(req(Operator::In, &["a", "b"]))), &a), Ok(true));
        // In does not match a missing key, NotIn does.
        assert_eq!(
            selects(Some(&sel(req(Operator::In, &["a"]))), &none),
            Ok(false)
        );
        assert_eq!(
            selects(Some(&sel(req(Operator::NotIn, &["a"]))), &none),
            Ok(true)
        );
        assert_eq!(
            selects(Some(&sel(req(Operator::NotIn, &["a"]))), &a),
            Ok(false)
        );
        assert_eq!(selects(Some(&sel(req(Operator::Exists, &[]))), &a), Ok(true));
        assert_eq!(
            selects(Some(&sel(req(Operator::Exists, &[]))), &none),
            Ok(false)
        );
        assert_eq!(
            selects(Some(&sel(req(Operator::DoesNotExist, &[]))), &none),
            Ok(true)
        );
    }

    #[test]
    fn malformed_requirements_error() {
        let bad_in = LabelSelector {
            match_expressions: vec![LabelSelectorRequirement {
                key: "team".to_string(),
                operator: Operator::In,
                values: vec![],
            }],
            ..Default::default()
        };
        assert_eq!(
            selects(Some(&bad_in), &labels(&[])),
            Err(SelectorError::NeedsValues("In"))
        );

        let bad_exists = LabelSelector {
            match_expressions: vec![LabelSelectorRequirement {
                key: "team".to_string(),
                operator: Operator::Exists,
                values: vec!["a".to_string()],
            }],
            ..Default::default()
        };
        assert_eq!(
            selects(Some(&bad_exists), &labels(&[])),
            Err(SelectorError::ForbidsValues("Exists"))
        );

        let empty_key = LabelSelector {
            match_expressions: vec![LabelSelectorRequirement {
                key: String::new(),
                operator: Operator::Exists,
                values: vec![],
            }],
            ..Default::default()
        };
        assert_eq!(selects(Some(&empty_key), &labels(&[])), Err(SelectorError::EmptyKey));
    }

    #[test]
    fn selector_serde_uses_kubernetes_field_names() {
        let json = r#"{
            "matchLabels": {"team": "a"},
            "matchExpressions": [{"key": "env", "operator": "NotIn", "values": ["dev"]}]
        }"#;
        let sel: LabelSelector = serde_json::from_str(json).unwrap();
        assert_eq!(sel.match_labels.get("team").map(String::as_str), Some("a"));
        assert_eq!(sel.match_expressions[0].operator, Operator::NotIn);
        assert_eq!(
            selects(Some(&sel), &labels(&[("team", "a"), ("env", "prod")])),
            Ok(true)
        );
        assert_eq!(
            selects(Some(&sel), &labels(&[("team", "a"), ("env", "dev")])),
            Ok(false)
        );
    }
}
