//! Attribute schema of the `pteraform_apply` resource.

use serde::Serialize;

use super::model::{ATTR_ARGS, ATTR_ID, ATTR_WORKING_DIR};

/// Provider type name. Resource type names are prefixed with it.
pub const PROVIDER_TYPE_NAME: &str = "pteraform";

/// Suffix appended to the provider type name for the apply resource.
pub const RESOURCE_TYPE_SUFFIX: &str = "_apply";

/// Value type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// A string.
    String,
    /// A list of strings.
    ListOfString,
}

/// Who sets an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeMode {
    /// Must be set in configuration.
    Required,
    /// May be set in configuration.
    Optional,
    /// Set by the provider only.
    Computed,
}

/// Plan-time behaviour attached to an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanModifier {
    /// Keep the prior state value while the new one is unknown.
    UseStateForUnknown,
}

/// Declaration of one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeSchema {
    /// Attribute name.
    pub name: &'static str,
    /// Value type.
    pub kind: AttributeKind,
    /// Who sets it.
    pub mode: AttributeMode,
    /// Markdown description.
    pub description: &'static str,
    /// Plan modifiers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plan_modifiers: Vec<PlanModifier>,
}

/// Declaration of a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSchema {
    /// Full resource type name.
    pub type_name: String,
    /// Markdown description.
    pub description: &'static str,
    /// Provider version serving this schema.
    pub version: &'static str,
    /// Attributes.
    pub attributes: Vec<AttributeSchema>,
}

impl ResourceSchema {
    /// Looks up an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Schema of `pteraform_apply`.
#[must_use]
pub fn apply_resource_schema() -> ResourceSchema {
    ResourceSchema {
        type_name: format!("{PROVIDER_TYPE_NAME}{RESOURCE_TYPE_SUFFIX}"),
        description: "Terraform Apply resource",
        version: env!("CARGO_PKG_VERSION"),
        attributes: vec![
            AttributeSchema {
                name: ATTR_WORKING_DIR,
                kind: AttributeKind::String,
                mode: AttributeMode::Required,
                description: "What directory to run `terraform apply` in.",
                plan_modifiers: vec![],
            },
            AttributeSchema {
                name: ATTR_ARGS,
                kind: AttributeKind::ListOfString,
                mode: AttributeMode::Optional,
                description: "Arguments to pass to `terraform apply`.",
                plan_modifiers: vec![],
            },
            AttributeSchema {
                name: ATTR_ID,
                kind: AttributeKind::String,
                mode: AttributeMode::Computed,
                description: "Identifier of the resource.",
                plan_modifiers: vec![PlanModifier::UseStateForUnknown],
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_name() {
        assert_eq!(apply_resource_schema().type_name, "pteraform_apply");
    }

    #[test]
    fn test_attribute_modes() {
        let schema = apply_resource_schema();
        let mode = |name| schema.attribute(name).map(|a| a.mode);

        assert_eq!(mode(ATTR_WORKING_DIR), Some(AttributeMode::Required));
        assert_eq!(mode(ATTR_ARGS), Some(AttributeMode::Optional));
        assert_eq!(mode(ATTR_ID), Some(AttributeMode::Computed));
        assert!(schema.attribute("nope").is_none());
    }

    #[test]
    fn test_id_keeps_prior_state() {
        let schema = apply_resource_schema();
        let id = schema.attribute(ATTR_ID).expect("id attribute");
        assert_eq!(id.plan_modifiers, vec![PlanModifier::UseStateForUnknown]);
    }
}
