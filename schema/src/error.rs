//! Collection validation errors.

use std::fmt;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur when building or validating a ghost collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A type or field name is empty.
    EmptyName,

    /// Two ghost types share a name.
    DuplicateTypeName { name: String },

    /// Two fields of one ghost type share a name.
    DuplicateFieldName { ty: String, field: String },

    /// A quantized or rotation field has a zero scale.
    InvalidScale { ty: String, field: String },

    /// Importance must be non-zero so staleness can raise priority.
    InvalidImportance { ty: String },

    /// Change-mask groups must start at 0 and grow by at most one per field.
    InvalidGroup {
        ty: String,
        field: String,
        group: u8,
        expected_at_most: u8,
    },

    /// A ghost type declares more change-mask groups than fit in the mask.
    TooManyGroups { ty: String, groups: usize, max: usize },

    /// A ghost type declares more fields than supported.
    TooManyFields { ty: String, count: usize, max: usize },

    /// The collection has more types than a type id can address.
    TooManyTypes { count: usize, max: usize },

    /// Two command fields share a name.
    DuplicateCommandField { field: String },

    /// A command layout declares more fields than supported.
    TooManyCommandFields { count: usize, max: usize },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "names must not be empty"),
            Self::DuplicateTypeName { name } => write!(f, "duplicate ghost type '{name}'"),
            Self::DuplicateFieldName { ty, field } => {
                write!(f, "duplicate field '{field}' in ghost type '{ty}'")
            }
            Self::InvalidScale { ty, field } => {
                write!(f, "field '{ty}.{field}' has a zero quantization scale")
            }
            Self::InvalidImportance { ty } => {
                write!(f, "ghost type '{ty}' has zero importance")
            }
            Self::InvalidGroup {
                ty,
                field,
                group,
                expected_at_most,
            } => write!(
                f,
                "field '{ty}.{field}' uses group {group}, expected at most {expected_at_most}"
            ),
            Self::TooManyGroups { ty, groups, max } => {
                write!(f, "ghost type '{ty}' has {groups} groups (max {max})")
            }
            Self::TooManyFields { ty, count, max } => {
                write!(f, "ghost type '{ty}' has {count} fields (max {max})")
            }
            Self::TooManyTypes { count, max } => {
                write!(f, "collection has {count} ghost types (max {max})")
            }
            Self::DuplicateCommandField { field } => {
                write!(f, "duplicate command field '{field}'")
            }
            Self::TooManyCommandFields { count, max } => {
                write!(f, "command layout has {count} fields (max {max})")
            }
        }
    }
}

impl std::error::Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_field() {
        let err = SchemaError::InvalidScale {
            ty: "Ship".to_owned(),
            field: "translation_x".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "field 'Ship.translation_x' has a zero quantization scale"
        );
    }

    #[test]
    fn display_group_error() {
        let err = SchemaError::InvalidGroup {
            ty: "Ship".to_owned(),
            field: "state".to_owned(),
            group: 4,
            expected_at_most: 2,
        };
        assert!(err.to_string().contains("group 4"));
    }
}
