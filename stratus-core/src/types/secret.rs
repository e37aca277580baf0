//! Declarative credential generation.
//!
//! A [`SecretSpec`] describes a secret as a template of literal fields plus
//! one field whose value is generated at realization time. Downstream nodes
//! reference individual fields by name, never the assembled document.

use crate::error::{Result, StratusError};
use crate::types::resource::AttrValue;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ASCII_PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Template for a generated credential secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretSpec {
    /// Secret name in the provider's secret store.
    pub name: String,

    /// Human-readable description.
    pub description: Option<String>,

    /// Literal fields carried alongside the generated one.
    pub template: BTreeMap<String, String>,

    /// Name of the field whose value is generated.
    pub generate_field: String,

    /// Exclude ASCII punctuation from the generated value.
    pub exclude_punctuation: bool,

    /// Allow spaces in the generated value.
    pub include_space: bool,

    /// Length of the generated value.
    pub length: usize,
}

impl SecretSpec {
    /// Reconstruct a spec from a secret-store node's attributes.
    pub fn from_attrs(id: &str, attrs: &BTreeMap<String, AttrValue>) -> Result<Self> {
        let name = attrs
            .get("name")
            .and_then(AttrValue::as_str)
            .ok_or_else(|| StratusError::InvalidConfig {
                id: id.to_string(),
                reason: "secret store requires a 'name' attribute".to_string(),
            })?
            .to_string();

        let generate_field = attrs
            .get("generate_field")
            .and_then(AttrValue::as_str)
            .ok_or_else(|| StratusError::InvalidConfig {
                id: id.to_string(),
                reason: "secret store requires a 'generate_field' attribute".to_string(),
            })?
            .to_string();

        let mut template = BTreeMap::new();
        if let Some(map) = attrs.get("template").and_then(AttrValue::as_map) {
            for (field, value) in map {
                let rendered = value.render().ok_or_else(|| StratusError::InvalidConfig {
                    id: id.to_string(),
                    reason: format!("secret template field '{}' must be a literal", field),
                })?;
                template.insert(field.clone(), rendered);
            }
        }

        Ok(Self {
            name,
            description: attrs
                .get("description")
                .and_then(AttrValue::as_str)
                .map(str::to_string),
            template,
            generate_field,
            exclude_punctuation: attrs
                .get("exclude_punctuation")
                .and_then(AttrValue::as_bool)
                .unwrap_or(true),
            include_space: attrs
                .get("include_space")
                .and_then(AttrValue::as_bool)
                .unwrap_or(false),
            length: attrs
                .get("length")
                .and_then(AttrValue::as_int)
                .map(|n| n as usize)
                .unwrap_or(32),
        })
    }

    /// Generate the field map for this secret: all template fields plus the
    /// generated one.
    pub fn generate(&self) -> Result<BTreeMap<String, String>> {
        if self.template.contains_key(&self.generate_field) {
            return Err(StratusError::SecretGeneration {
                reason: format!(
                    "generated field '{}' collides with a template field",
                    self.generate_field
                ),
            });
        }
        if self.length == 0 {
            return Err(StratusError::SecretGeneration {
                reason: "generated value length must be non-zero".to_string(),
            });
        }

        let charset = self.charset();
        let mut rng = rand::thread_rng();
        let value: String = (0..self.length)
            .map(|_| *charset.choose(&mut rng).expect("charset is never empty"))
            .collect();

        let mut fields = self.template.clone();
        fields.insert(self.generate_field.clone(), value);
        Ok(fields)
    }

    fn charset(&self) -> Vec<char> {
        let mut chars: Vec<char> = ('a'..='z').chain('A'..='Z').chain('0'..='9').collect();
        if !self.exclude_punctuation {
            chars.extend(ASCII_PUNCTUATION.chars());
        }
        if self.include_space {
            chars.push(' ');
        }
        chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pgadmin_spec() -> SecretSpec {
        SecretSpec {
            name: "pgadmin-secret".to_string(),
            description: Some("Pgadmin Credentials".to_string()),
            template: BTreeMap::from([("email".to_string(), "hello@myorg.lab".to_string())]),
            generate_field: "password".to_string(),
            exclude_punctuation: true,
            include_space: false,
            length: 32,
        }
    }

    #[test]
    fn test_generated_field_honors_exclusions() {
        let fields = pgadmin_spec().generate().unwrap();
        let password = &fields["password"];

        assert_eq!(password.len(), 32);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(password, "hello@myorg.lab");
        assert_eq!(fields["email"], "hello@myorg.lab");
    }

    #[test]
    fn test_field_collision_rejected() {
        let mut spec = pgadmin_spec();
        spec.template.insert("password".to_string(), "fixed".to_string());

        let result = spec.generate();
        assert!(matches!(result, Err(StratusError::SecretGeneration { .. })));
    }

    #[test]
    fn test_punctuation_allowed_when_not_excluded() {
        let mut spec = pgadmin_spec();
        spec.exclude_punctuation = false;
        spec.length = 4096;

        // With a long enough sample the expanded charset shows up.
        let fields = spec.generate().unwrap();
        let password = &fields["password"];
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric() || c.is_ascii_punctuation()));
    }

    #[test]
    fn test_from_attrs() {
        let mut attrs = BTreeMap::new();
        attrs.insert("name".to_string(), AttrValue::from("pgadmin-secret"));
        attrs.insert("generate_field".to_string(), AttrValue::from("password"));
        attrs.insert(
            "template".to_string(),
            AttrValue::Map(BTreeMap::from([(
                "email".to_string(),
                AttrValue::from("hello@myorg.lab"),
            )])),
        );

        let spec = SecretSpec::from_attrs("creds", &attrs).unwrap();
        assert_eq!(spec.name, "pgadmin-secret");
        assert_eq!(spec.generate_field, "password");
        assert_eq!(spec.template["email"], "hello@myorg.lab");
        assert!(spec.exclude_punctuation);
        assert!(!spec.include_space);
        assert_eq!(spec.length, 32);
    }
}
