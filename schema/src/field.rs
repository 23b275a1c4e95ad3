//! Field codec and field definitions.

/// How a live value maps to its quantized snapshot slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldCodec {
    /// Plain integer, stored as-is. Interpolates as a step.
    Int,

    /// Float multiplied by `scale` and rounded. Interpolates linearly.
    Quantized { scale: u32 },

    /// Rotation about a single fixed axis, stored as the quaternion's `w`
    /// component multiplied by `scale`. Interpolates spherically.
    AxisRotation { scale: u32 },
}

impl FieldCodec {
    /// Creates an integer codec.
    #[must_use]
    pub const fn int() -> Self {
        Self::Int
    }

    /// Creates a quantized float codec (`scale` units per 1.0).
    #[must_use]
    pub const fn quantized(scale: u32) -> Self {
        Self::Quantized { scale }
    }

    /// Creates a single-axis rotation codec.
    #[must_use]
    pub const fn axis_rotation(scale: u32) -> Self {
        Self::AxisRotation { scale }
    }

    /// Returns the quantization scale, or `None` for plain integers.
    #[must_use]
    pub const fn scale(self) -> Option<u32> {
        match self {
            Self::Int => None,
            Self::Quantized { scale } | Self::AxisRotation { scale } => Some(scale),
        }
    }
}

/// One replicated field of a ghost type.
///
/// `group` is the change-mask bit this field shares with its neighbours;
/// fields that always change together (the components of a position) sit
/// in one group and cost a single mask bit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDef {
    pub name: String,
    pub codec: FieldCodec,
    pub group: u8,
}

impl FieldDef {
    /// Creates a field definition in group 0.
    ///
    /// [`crate::GhostTypeDef::field`] reassigns the group when the field is
    /// added through the builder.
    #[must_use]
    pub fn new(name: impl Into<String>, codec: FieldCodec) -> Self {
        Self {
            name: name.into(),
            codec,
            group: 0,
        }
    }

    /// Creates an integer field.
    #[must_use]
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldCodec::int())
    }

    /// Creates a quantized float field.
    #[must_use]
    pub fn quantized(name: impl Into<String>, scale: u32) -> Self {
        Self::new(name, FieldCodec::quantized(scale))
    }

    /// Creates a single-axis rotation field.
    ///
    /// Only the quaternion `w` is stored, so resolution near zero rotation
    /// is about `sqrt(8 / scale)` radians: roughly 5 degrees at 1000. Use a
    /// scale of 100_000 or more when small headings matter.
    #[must_use]
    pub fn axis_rotation(name: impl Into<String>, scale: u32) -> Self {
        Self::new(name, FieldCodec::axis_rotation(scale))
    }

    /// Sets the change-mask group.
    #[must_use]
    pub fn in_group(mut self, group: u8) -> Self {
        self.group = group;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_scale() {
        assert_eq!(FieldCodec::int().scale(), None);
        assert_eq!(FieldCodec::quantized(100).scale(), Some(100));
        assert_eq!(FieldCodec::axis_rotation(1000).scale(), Some(1000));
    }

    #[test]
    fn field_constructors() {
        let field = FieldDef::quantized("translation_x", 100).in_group(3);
        assert_eq!(field.name, "translation_x");
        assert_eq!(field.codec, FieldCodec::Quantized { scale: 100 });
        assert_eq!(field.group, 3);

        assert_eq!(FieldDef::int("state").codec, FieldCodec::Int);
        assert_eq!(FieldDef::int("state").group, 0);
    }
}
