//! Command (input) record layout.

use std::collections::HashSet;

use crate::error::{SchemaError, SchemaResult};

/// Maximum number of input fields in a command record.
pub const MAX_COMMAND_FIELDS: usize = 32;

/// Names of the `i32` input fields carried by one command record, in wire
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommandLayout {
    pub name: String,
    pub fields: Vec<String>,
}

impl CommandLayout {
    /// Creates a validated layout.
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> SchemaResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let layout = Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Validates field names and count.
    pub fn validate(&self) -> SchemaResult<()> {
        if self.name.is_empty() {
            return Err(SchemaError::EmptyName);
        }
        if self.fields.len() > MAX_COMMAND_FIELDS {
            return Err(SchemaError::TooManyCommandFields {
                count: self.fields.len(),
                max: MAX_COMMAND_FIELDS,
            });
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.is_empty() {
                return Err(SchemaError::EmptyName);
            }
            if !seen.insert(field.as_str()) {
                return Err(SchemaError::DuplicateCommandField {
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Looks up a field index by name.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field == name)
    }
}
