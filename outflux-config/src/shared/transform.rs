use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Default name of the JSON column holding folded tags.
pub const DEFAULT_TAGS_COLUMN: &str = "tags";

/// Default name of the JSON column holding folded fields.
pub const DEFAULT_FIELDS_COLUMN: &str = "fields";

/// Optional reshaping applied between extraction and ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TransformConfig {
    /// Fold every tag column into one JSON column.
    #[serde(default)]
    pub tags_as_json: bool,
    #[serde(default = "default_tags_column")]
    pub tags_column: String,
    /// Fold every field column into one JSON column.
    #[serde(default)]
    pub fields_as_json: bool,
    #[serde(default = "default_fields_column")]
    pub fields_column: String,
    /// Destination schema the tables are created in. Defaults to `public`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<String>,
}

fn default_tags_column() -> String {
    DEFAULT_TAGS_COLUMN.to_string()
}

fn default_fields_column() -> String {
    DEFAULT_FIELDS_COLUMN.to_string()
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            tags_as_json: false,
            tags_column: default_tags_column(),
            fields_as_json: false,
            fields_column: default_fields_column(),
            output_schema: None,
        }
    }
}

impl TransformConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tags_as_json && self.tags_column.trim().is_empty() {
            return Err(ValidationError::EmptyName("transform.tags_column"));
        }

        if self.fields_as_json && self.fields_column.trim().is_empty() {
            return Err(ValidationError::EmptyName("transform.fields_column"));
        }

        if self.tags_as_json && self.fields_as_json && self.tags_column == self.fields_column {
            return Err(ValidationError::DuplicateJsonColumn(self.tags_column.clone()));
        }

        if matches!(&self.output_schema, Some(schema) if schema.trim().is_empty()) {
            return Err(ValidationError::EmptyName("transform.output_schema"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_json_column_for_tags_and_fields_is_rejected() {
        let config = TransformConfig {
            tags_as_json: true,
            fields_as_json: true,
            tags_column: "data".to_string(),
            fields_column: "data".to_string(),
            output_schema: None,
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::DuplicateJsonColumn(name)) if name == "data"
        ));
    }

    #[test]
    fn column_names_only_matter_when_folding() {
        let config = TransformConfig {
            tags_column: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
