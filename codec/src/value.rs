//! Live field values and their quantized representation.

use schema::FieldCodec;

/// A unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `radians` about the z axis.
    #[must_use]
    pub fn from_rotation_z(radians: f32) -> Self {
        let half = radians * 0.5;
        Self::new(0.0, 0.0, half.sin(), half.cos())
    }

    /// Angle about the z axis, in `(-pi, pi]`.
    #[must_use]
    pub fn rotation_z(self) -> f32 {
        2.0 * self.z.atan2(self.w)
    }

    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.dot(self).sqrt();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Spherical interpolation along the shortest arc.
    #[must_use]
    pub fn slerp(self, target: Self, factor: f32) -> Self {
        let mut end = target;
        let mut cos = self.dot(target);
        if cos < 0.0 {
            cos = -cos;
            end = Self::new(-end.x, -end.y, -end.z, -end.w);
        }

        let (from_weight, to_weight) = if cos > 0.9995 {
            (1.0 - factor, factor)
        } else {
            let angle = cos.clamp(-1.0, 1.0).acos();
            let sin = angle.sin();
            (
                ((1.0 - factor) * angle).sin() / sin,
                (factor * angle).sin() / sin,
            )
        };

        Self::new(
            self.x * from_weight + end.x * to_weight,
            self.y * from_weight + end.y * to_weight,
            self.z * from_weight + end.z * to_weight,
            self.w * from_weight + end.w * to_weight,
        )
        .normalize()
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A live (unquantized) field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Int(i32),
    Float(f32),
    Rotation(Quat),
}

impl FieldValue {
    #[must_use]
    pub const fn as_int(self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_float(self) -> Option<f32> {
        match self {
            Self::Float(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_rotation(self) -> Option<Quat> {
        match self {
            Self::Rotation(value) => Some(value),
            _ => None,
        }
    }
}

/// Quantizes a float with round-to-nearest, saturating at the `i32` range.
#[must_use]
pub fn quantize(value: f32, scale: u32) -> i32 {
    (f64::from(value) * f64::from(scale)).round() as i32
}

#[must_use]
pub fn dequantize(value: i32, scale: u32) -> f32 {
    (f64::from(value) / f64::from(scale)) as f32
}

/// Encodes a z-axis rotation as its `w` component, sign-flipped so the
/// reconstructed `z` is non-negative.
///
/// Resolution is coarsest near zero rotation, where one step of `w` spans
/// about `sqrt(8 / scale)` radians (roughly 5 degrees at scale 1000).
#[must_use]
pub fn encode_rotation(rotation: Quat, scale: u32) -> i32 {
    let w = if rotation.z >= 0.0 {
        rotation.w
    } else {
        -rotation.w
    };
    quantize(w, scale)
}

/// Rebuilds a z-axis rotation from its quantized `w` component.
#[must_use]
pub fn decode_rotation(value: i32, scale: u32) -> Quat {
    let w = f64::from(value) / f64::from(scale);
    let z = if w.abs() > 1.0 - 1e-9 {
        0.0
    } else {
        (1.0 - w * w).sqrt()
    };
    Quat::new(0.0, 0.0, z as f32, w as f32)
}

/// Quantizes one live value for `codec`, or `None` on a kind mismatch.
#[must_use]
pub fn quantize_value(codec: FieldCodec, value: FieldValue) -> Option<i32> {
    match (codec, value) {
        (FieldCodec::Int, FieldValue::Int(value)) => Some(value),
        (FieldCodec::Quantized { scale }, FieldValue::Float(value)) => Some(quantize(value, scale)),
        (FieldCodec::AxisRotation { scale }, FieldValue::Rotation(value)) => {
            Some(encode_rotation(value, scale))
        }
        _ => None,
    }
}

/// Turns a quantized slot back into a live value.
#[must_use]
pub fn dequantize_value(codec: FieldCodec, value: i32) -> FieldValue {
    match codec {
        FieldCodec::Int => FieldValue::Int(value),
        FieldCodec::Quantized { scale } => FieldValue::Float(dequantize(value, scale)),
        FieldCodec::AxisRotation { scale } => FieldValue::Rotation(decode_rotation(value, scale)),
    }
}
