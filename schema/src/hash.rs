//! Deterministic collection hashing.

use blake3::Hasher;

use crate::{CommandLayout, FieldCodec, GhostCollection};

/// Computes a stable hash of the ghost collection and command layout.
///
/// Peers exchange this value on connect; a mismatch means their snapshot
/// layouts differ and no snapshot between them can be decoded.
#[must_use]
pub fn collection_hash(collection: &GhostCollection, command: Option<&CommandLayout>) -> u64 {
    let mut hasher = Hasher::new();
    write_u32(&mut hasher, collection.len() as u32);

    for (id, ty) in collection.iter() {
        write_u16(&mut hasher, id.get());
        write_str(&mut hasher, &ty.name);
        write_u32(&mut hasher, ty.importance);
        write_u8(&mut hasher, u8::from(ty.predict_delta));
        write_u8(&mut hasher, u8::from(ty.skip_owner));
        write_u32(&mut hasher, ty.fields.len() as u32);

        for field in &ty.fields {
            write_str(&mut hasher, &field.name);
            write_codec(&mut hasher, field.codec);
            write_u8(&mut hasher, field.group);
        }
    }

    match command {
        Some(layout) => {
            write_u8(&mut hasher, 1);
            write_str(&mut hasher, &layout.name);
            write_u32(&mut hasher, layout.fields.len() as u32);
            for field in &layout.fields {
                write_str(&mut hasher, field);
            }
        }
        None => write_u8(&mut hasher, 0),
    }

    let hash = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

fn write_codec(hasher: &mut Hasher, codec: FieldCodec) {
    match codec {
        FieldCodec::Int => write_u8(hasher, 0),
        FieldCodec::Quantized { scale } => {
            write_u8(hasher, 1);
            write_u32(hasher, scale);
        }
        FieldCodec::AxisRotation { scale } => {
            write_u8(hasher, 2);
            write_u32(hasher, scale);
        }
    }
}

fn write_str(hasher: &mut Hasher, value: &str) {
    write_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}

fn write_u8(hasher: &mut Hasher, value: u8) {
    hasher.update(&[value]);
}

fn write_u16(hasher: &mut Hasher, value: u16) {
    hasher.update(&value.to_le_bytes());
}

fn write_u32(hasher: &mut Hasher, value: u32) {
    hasher.update(&value.to_le_bytes());
}
