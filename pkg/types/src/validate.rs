use std::collections::BTreeMap;

use anyhow::{Result, bail};

use crate::quantity::Quantity;

/// Validate a Kubernetes-style resource name.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 63 {
        bail!("name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Validate a `hard` resource map: keys non-empty, quantities non-negative.
pub fn validate_resource_list(hard: &BTreeMap<String, Quantity>) -> Result<()> {
    for (key, value) in hard {
        if key.trim().is_empty() {
            bail!("resource key must not be empty");
        }
        if value.is_negative() {
            bail!("resource '{}' must be non-negative (got {})", key, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_name("team-a").is_ok());
        assert!(validate_name("my-tenant").is_ok());
        assert!(validate_name("tenant-123").is_ok());
        assert!(validate_name("a").is_ok());
        assert!(validate_name("a-b-c-d").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("Team-A").is_err());
        assert!(validate_name("team_a").is_err());
        assert!(validate_name("-leading").is_err());
        assert!(validate_name("trailing-").is_err());
        assert!(validate_name("special!char").is_err());
        assert!(validate_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn resource_lists_must_be_non_negative() {
        let ok = BTreeMap::from([
            ("limits.cpu".to_string(), "500m".parse::<Quantity>().unwrap()),
            ("limits.memory".to_string(), Quantity::zero()),
        ]);
        assert!(validate_resource_list(&ok).is_ok());

        let negative = BTreeMap::from([(
            "limits.cpu".to_string(),
            "-1".parse::<Quantity>().unwrap(),
        )]);
        assert!(validate_resource_list(&negative).is_err());

        let empty_key = BTreeMap::from([(" ".to_string(), Quantity::zero())]);
        assert!(validate_resource_list(&empty_key).is_err());
    }
}
