//! Utility functions

use crate::error::{BarrelError, Result};
use crate::types::{Element, Vec3};

/// Decode little-endian bytes into voxels
pub fn bytes_to_elements<T: Element>(bytes: &[u8]) -> Result<Vec<T>> {
    let size = T::DATA_TYPE.size_in_bytes();
    if bytes.len() % size != 0 {
        return Err(BarrelError::InvalidDimensions(
            "Byte length not aligned with data type size".to_string(),
        ));
    }

    Ok(bytes.chunks_exact(size).map(T::read_le).collect())
}

/// Encode voxels as little-endian bytes
pub fn elements_to_bytes<T: Element>(data: &[T]) -> Vec<u8> {
    let size = T::DATA_TYPE.size_in_bytes();
    let mut bytes = vec![0u8; data.len() * size];

    for (voxel, out) in data.iter().zip(bytes.chunks_exact_mut(size)) {
        voxel.write_le(out);
    }

    bytes
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// File name of the cube at file index `idx`
pub fn cube_file_name(prefix: &str, mag: u32, idx: Vec3) -> String {
    format!(
        "{}_mag{}_x{:06}_y{:06}_z{:06}.brl",
        prefix, mag, idx.x, idx.y, idx.z
    )
}

/// Whether a name looks like a barrel file
pub fn is_barrel_file(name: &str) -> bool {
    name.ends_with(".brl")
}
