use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A namespace as this system sees it: a name plus the label set tenant
/// selectors are evaluated against. Namespaces are external inputs and
/// are never mutated by the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Namespace {
    pub fn new(name: &str, labels: HashMap<String, String>) -> Namespace {
        Namespace {
            name: name.to_string(),
            labels,
            created_at: Utc::now(),
        }
    }
}
