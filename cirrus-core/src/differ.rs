//! Differ - Compare desired configuration with observed state
//!
//! Compares the caller's desired attributes with the last observed state and
//! decides whether the object must be created, updated in place, replaced,
//! or left alone.

use std::collections::HashMap;

use crate::resource::{Resource, State, Value};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Object does not exist -> needs creation
    Create,
    /// Object exists with in-place updatable differences
    Update { changed: Vec<String> },
    /// A replacement-forcing attribute changed -> delete then create
    Replace {
        changed: Vec<String>,
        forced_by: Vec<String>,
    },
    /// Object matches desired configuration
    NoChange,
}

/// Compare desired configuration with observed state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: &ResourceSchema) -> Diff {
    if !current.exists {
        return Diff::Create;
    }

    let changed = changed_attributes(&desired.attributes, &current.attributes, schema);
    if changed.is_empty() {
        return Diff::NoChange;
    }

    let forced_by: Vec<String> = changed
        .iter()
        .filter(|name| schema.forces_replacement(name))
        .cloned()
        .collect();

    if forced_by.is_empty() {
        Diff::Update { changed }
    } else {
        Diff::Replace { changed, forced_by }
    }
}

/// Attributes whose desired value differs from the observed one, sorted by name.
///
/// Unset attributes take their schema default. Unset attributes without a
/// default are ignored when the vendor computes them and count as a removal
/// otherwise. Output-only attributes and attributes unknown to the schema
/// never count as changes.
pub fn changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: &ResourceSchema,
) -> Vec<String> {
    let mut changed: Vec<String> = schema
        .attributes
        .values()
        .filter(|attr| !attr.read_only)
        .filter(|attr| {
            let wanted = desired.get(&attr.name).or(attr.default.as_ref());
            match (wanted, current.get(&attr.name)) {
                (Some(w), Some(c)) => w != c,
                (Some(_), None) => true,
                (None, Some(_)) => !attr.computed,
                (None, None) => false,
            }
        })
        .map(|attr| attr.name.clone())
        .collect();

    changed.sort();
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceId;
    use crate::schema::{AttributeSchema, AttributeType};

    fn schema() -> ResourceSchema {
        ResourceSchema::new("ssm_maintenance_window")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("schedule", AttributeType::String))
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool).with_default(true))
            .attribute(AttributeSchema::new("description", AttributeType::String))
            .attribute(AttributeSchema::new("schedule_timezone", AttributeType::String).computed())
            .attribute(AttributeSchema::new("kms_key_id", AttributeType::String).force_new())
            .attribute(AttributeSchema::new("id", AttributeType::String).read_only())
    }

    fn observed(attrs: &[(&str, Value)]) -> State {
        let attrs = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        State::existing(ResourceId::new("ssm_maintenance_window", "w"), attrs)
    }

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("ssm_maintenance_window", "w");
        let current = State::not_found(ResourceId::new("ssm_maintenance_window", "w"));

        assert_eq!(diff(&desired, &current, &schema()), Diff::Create);
    }

    #[test]
    fn diff_no_change_when_same() {
        let desired = Resource::new("ssm_maintenance_window", "w")
            .with_attribute("name", "patching")
            .with_attribute("schedule", "cron(0 2 ? * SUN *)");
        let current = observed(&[
            ("name", Value::from("patching")),
            ("schedule", Value::from("cron(0 2 ? * SUN *)")),
            ("enabled", Value::from(true)),
            ("schedule_timezone", Value::from("UTC")),
            ("id", Value::from("mw-0c50858d01EXAMPLE")),
        ]);

        let result = diff(&desired, &current, &schema());
        assert_eq!(result, Diff::NoChange);
    }

    #[test]
    fn diff_update_when_different() {
        let desired = Resource::new("ssm_maintenance_window", "w")
            .with_attribute("name", "patching")
            .with_attribute("schedule", "rate(7 days)");
        let current = observed(&[
            ("name", Value::from("patching")),
            ("schedule", Value::from("cron(0 2 ? * SUN *)")),
            ("enabled", Value::from(true)),
        ]);

        assert_eq!(
            diff(&desired, &current, &schema()),
            Diff::Update {
                changed: vec!["schedule".to_string()]
            }
        );
    }

    #[test]
    fn default_is_compared_when_unset() {
        let desired = Resource::new("ssm_maintenance_window", "w").with_attribute("name", "p");
        let current = observed(&[("name", Value::from("p")), ("enabled", Value::from(false))]);

        assert_eq!(
            changed_attributes(&desired.attributes, &current.attributes, &schema()),
            vec!["enabled".to_string()]
        );
    }

    #[test]
    fn removed_attribute_is_a_change() {
        let desired = Resource::new("ssm_maintenance_window", "w").with_attribute("name", "p");
        let current = observed(&[
            ("name", Value::from("p")),
            ("enabled", Value::from(true)),
            ("description", Value::from("nightly")),
        ]);

        assert_eq!(
            changed_attributes(&desired.attributes, &current.attributes, &schema()),
            vec!["description".to_string()]
        );
    }

    #[test]
    fn diff_replace_when_force_new_changes() {
        let desired = Resource::new("ssm_maintenance_window", "w")
            .with_attribute("name", "p")
            .with_attribute("kms_key_id", "key-2")
            .with_attribute("description", "new");
        let current = observed(&[
            ("name", Value::from("p")),
            ("enabled", Value::from(true)),
            ("kms_key_id", Value::from("key-1")),
        ]);

        assert_eq!(
            diff(&desired, &current, &schema()),
            Diff::Replace {
                changed: vec!["description".to_string(), "kms_key_id".to_string()],
                forced_by: vec!["kms_key_id".to_string()],
            }
        );
    }

    #[test]
    fn unknown_attributes_are_ignored() {
        let desired = Resource::new("ssm_maintenance_window", "w")
            .with_attribute("name", "p")
            .with_attribute("timeouts", Value::Map(HashMap::new()));
        let current = observed(&[("name", Value::from("p")), ("enabled", Value::from(true))]);

        assert_eq!(diff(&desired, &current, &schema()), Diff::NoChange);
    }
}
