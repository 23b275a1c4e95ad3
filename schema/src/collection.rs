//! Ghost type definitions and the validated collection.

use std::collections::{HashMap, HashSet};

use crate::error::{SchemaError, SchemaResult};
use crate::FieldDef;

/// Maximum number of fields per ghost type.
pub const MAX_FIELDS: usize = 64;

/// Maximum number of change-mask groups per ghost type (one mask bit each).
pub const MAX_GROUPS: usize = 32;

/// Dense ghost type index, assigned in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GhostTypeId(pub u16);

impl GhostTypeId {
    /// Returns the id as an array index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

/// Layout and send policy of one ghost type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GhostTypeDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    /// Base priority weight; multiplied by ticks since last sent.
    pub importance: u32,
    /// Use the three-baseline predictor when three baselines are acked.
    pub predict_delta: bool,
    /// Do not stream this ghost to the connection that owns it.
    pub skip_owner: bool,
}

impl GhostTypeDef {
    /// Creates a ghost type with no fields, importance 1 and prediction on.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            importance: 1,
            predict_delta: true,
            skip_owner: false,
        }
    }

    /// Adds a field in a new change-mask group.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        let group = self.fields.last().map_or(0, |last| last.group.saturating_add(1));
        self.fields.push(field.in_group(group));
        self
    }

    /// Adds a field sharing the previous field's change-mask group.
    #[must_use]
    pub fn grouped(mut self, field: FieldDef) -> Self {
        let group = self.fields.last().map_or(0, |last| last.group);
        self.fields.push(field.in_group(group));
        self
    }

    /// Sets the importance weight.
    #[must_use]
    pub const fn importance(mut self, importance: u32) -> Self {
        self.importance = importance;
        self
    }

    /// Enables or disables three-baseline prediction.
    #[must_use]
    pub const fn predict_delta(mut self, enabled: bool) -> Self {
        self.predict_delta = enabled;
        self
    }

    /// Skips this ghost for its owning connection.
    #[must_use]
    pub const fn skip_owner(mut self, skip: bool) -> Self {
        self.skip_owner = skip;
        self
    }

    /// Number of quantized slots in a snapshot of this type.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Number of change-mask groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.fields
            .last()
            .map_or(0, |last| usize::from(last.group) + 1)
    }

    /// Looks up a field index by name.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    fn validate(&self) -> SchemaResult<()> {
        if self.name.is_empty() {
            return Err(SchemaError::EmptyName);
        }
        if self.importance == 0 {
            return Err(SchemaError::InvalidImportance {
                ty: self.name.clone(),
            });
        }
        if self.fields.len() > MAX_FIELDS {
            return Err(SchemaError::TooManyFields {
                ty: self.name.clone(),
                count: self.fields.len(),
                max: MAX_FIELDS,
            });
        }

        let mut names = HashSet::new();
        let mut next_group = 0u8;
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(SchemaError::EmptyName);
            }
            if !names.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateFieldName {
                    ty: self.name.clone(),
                    field: field.name.clone(),
                });
            }
            if field.codec.scale() == Some(0) {
                return Err(SchemaError::InvalidScale {
                    ty: self.name.clone(),
                    field: field.name.clone(),
                });
            }
            // The first field opens group 0; later fields stay or advance by one.
            let allowed_low = next_group.saturating_sub(1);
            if field.group < allowed_low || field.group > next_group {
                return Err(SchemaError::InvalidGroup {
                    ty: self.name.clone(),
                    field: field.name.clone(),
                    group: field.group,
                    expected_at_most: next_group,
                });
            }
            next_group = field.group.saturating_add(1);
        }

        if self.group_count() > MAX_GROUPS {
            return Err(SchemaError::TooManyGroups {
                ty: self.name.clone(),
                groups: self.group_count(),
                max: MAX_GROUPS,
            });
        }
        Ok(())
    }
}

/// The validated, immutable set of ghost types for a session.
///
/// Type ids are dense indices in declaration order, so lookups by id are
/// a bounds-checked slice index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostCollection {
    types: Vec<GhostTypeDef>,
    by_name: HashMap<String, GhostTypeId>,
}

impl GhostCollection {
    /// Validates the definitions and assigns type ids.
    pub fn new(types: Vec<GhostTypeDef>) -> SchemaResult<Self> {
        let max = usize::from(u16::MAX);
        if types.len() > max {
            return Err(SchemaError::TooManyTypes {
                count: types.len(),
                max,
            });
        }

        let mut by_name = HashMap::with_capacity(types.len());
        for (index, ty) in types.iter().enumerate() {
            ty.validate()?;
            if by_name
                .insert(ty.name.clone(), GhostTypeId(index as u16))
                .is_some()
            {
                return Err(SchemaError::DuplicateTypeName {
                    name: ty.name.clone(),
                });
            }
        }
        Ok(Self { types, by_name })
    }

    /// Creates a collection builder.
    #[must_use]
    pub fn builder() -> CollectionBuilder {
        CollectionBuilder::default()
    }

    /// Returns the definition for `id`.
    #[must_use]
    pub fn get(&self, id: GhostTypeId) -> Option<&GhostTypeDef> {
        self.types.get(id.index())
    }

    /// Returns the id of the type called `name`.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<GhostTypeId> {
        self.by_name.get(name).copied()
    }

    /// Number of ghost types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterates over `(id, definition)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (GhostTypeId, &GhostTypeDef)> {
        self.types
            .iter()
            .enumerate()
            .map(|(index, ty)| (GhostTypeId(index as u16), ty))
    }

    /// Returns the definitions in id order.
    #[must_use]
    pub fn types(&self) -> &[GhostTypeDef] {
        &self.types
    }
}

/// Builder for [`GhostCollection`].
#[derive(Debug, Default)]
pub struct CollectionBuilder {
    types: Vec<GhostTypeDef>,
}

impl CollectionBuilder {
    /// Adds a ghost type.
    #[must_use]
    pub fn ghost(mut self, ty: GhostTypeDef) -> Self {
        self.types.push(ty);
        self
    }

    /// Builds the collection after validation.
    pub fn build(self) -> SchemaResult<GhostCollection> {
        GhostCollection::new(self.types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ship() -> GhostTypeDef {
        GhostTypeDef::new("Ship")
            .field(FieldDef::int("player_id"))
            .field(FieldDef::axis_rotation("rotation", 1000))
            .field(FieldDef::quantized("translation_x", 100))
            .grouped(FieldDef::quantized("translation_y", 100))
    }

    #[test]
    fn builder_assigns_groups() {
        let ty = ship();
        let groups: Vec<u8> = ty.fields.iter().map(|field| field.group).collect();
        assert_eq!(groups, vec![0, 1, 2, 2]);
        assert_eq!(ty.group_count(), 3);
        assert_eq!(ty.field_count(), 4);
        assert_eq!(ty.field_index("translation_y"), Some(3));
    }

    #[test]
    fn collection_assigns_dense_ids() {
        let collection = GhostCollection::builder()
            .ghost(ship())
            .ghost(GhostTypeDef::new("Asteroid").field(FieldDef::quantized("x", 100)))
            .build()
            .unwrap();
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.id_of("Asteroid"), Some(GhostTypeId(1)));
        assert_eq!(collection.get(GhostTypeId(0)).unwrap().name, "Ship");
        assert!(collection.get(GhostTypeId(2)).is_none());
        let ids: Vec<_> = collection.iter().map(|(id, _)| id.get()).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn rejects_duplicate_type_names() {
        let err = GhostCollection::new(vec![ship(), ship()]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTypeName { .. }));
    }

    #[test]
    fn rejects_duplicate_field_names() {
        let ty = GhostTypeDef::new("A")
            .field(FieldDef::int("x"))
            .field(FieldDef::int("x"));
        let err = GhostCollection::new(vec![ty]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateFieldName { .. }));
    }

    #[test]
    fn rejects_zero_scale() {
        let ty = GhostTypeDef::new("A").field(FieldDef::quantized("x", 0));
        let err = GhostCollection::new(vec![ty]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidScale { .. }));
    }

    #[test]
    fn rejects_zero_importance() {
        let ty = GhostTypeDef::new("A").importance(0);
        let err = GhostCollection::new(vec![ty]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidImportance { .. }));
    }

    #[test]
    fn rejects_group_gap() {
        let mut ty = GhostTypeDef::new("A")
            .field(FieldDef::int("a"))
            .field(FieldDef::int("b"));
        ty.fields[1].group = 5;
        let err = GhostCollection::new(vec![ty]).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::InvalidGroup {
                group: 5,
                expected_at_most: 1,
                ..
            }
        ));
    }

    #[test]
    fn rejects_first_group_not_zero() {
        let ty = GhostTypeDef {
            fields: vec![FieldDef::int("a").in_group(1)],
            ..GhostTypeDef::new("A")
        };
        let err = GhostCollection::new(vec![ty]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidGroup { group: 1, .. }));
    }

    #[test]
    fn rejects_decreasing_group() {
        let mut ty = GhostTypeDef::new("A")
            .field(FieldDef::int("a"))
            .field(FieldDef::int("b"))
            .field(FieldDef::int("c"));
        ty.fields[2].group = 0;
        assert!(GhostCollection::new(vec![ty]).is_err());
    }

    #[test]
    fn rejects_too_many_groups() {
        let mut ty = GhostTypeDef::new("A");
        for index in 0..33 {
            ty = ty.field(FieldDef::int(format!("f{index}")));
        }
        let err = GhostCollection::new(vec![ty]).unwrap_err();
        assert!(matches!(err, SchemaError::TooManyGroups { groups: 33, .. }));
    }

    #[test]
    fn sixty_four_fields_in_shared_groups() {
        let mut ty = GhostTypeDef::new("A").field(FieldDef::int("f0"));
        for index in 1..MAX_FIELDS {
            ty = ty.grouped(FieldDef::int(format!("f{index}")));
        }
        assert!(GhostCollection::new(vec![ty.clone()]).is_ok());

        let ty = ty.grouped(FieldDef::int("extra"));
        let err = GhostCollection::new(vec![ty]).unwrap_err();
        assert!(matches!(err, SchemaError::TooManyFields { count: 65, .. }));
    }
}
