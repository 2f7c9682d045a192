//! Integer-status entry point for callers that cannot take a `Result`

use crate::access::{AccessOptions, BarrelFile};
use crate::error::{BarrelError, Result};
use crate::io::{FileSystemIOManager, IOManager};
use crate::types::Vec3;
use log::debug;
use std::path::Path;
use std::sync::Arc;

/// Read the `clen^3` cube of `u8` voxels at `(x, y, z)` of the barrel file at `path`
/// into `buf` in Fortran order.
///
/// Returns 0 on success, otherwise the [`BarrelError::status`] of the failure. The
/// file must use the standard 1024^3 layout.
pub async fn read_raw_data(
    path: &str,
    x: i64,
    y: i64,
    z: i64,
    clen: i32,
    buf: &mut [u8],
) -> i32 {
    match try_read_raw_data(path, x, y, z, clen, buf).await {
        Ok(()) => 0,
        Err(err) => {
            debug!("Reading {} failed: {}", path, err);
            err.status()
        }
    }
}

async fn try_read_raw_data(
    path: &str,
    x: i64,
    y: i64,
    z: i64,
    raw_clen: i32,
    buf: &mut [u8],
) -> Result<()> {
    let options = AccessOptions::default();
    let clen = u32::try_from(raw_clen).unwrap_or(0);
    if clen == 0 || !clen.is_power_of_two() || clen > options.layout.file_clen() {
        return Err(BarrelError::InvalidCubeLength(raw_clen.unsigned_abs() as u64));
    }
    let pos = Vec3::new(coordinate(x)?, coordinate(y)?, coordinate(z)?);

    // the buffer check comes before any I/O
    let numel = (clen as usize).pow(3);
    if buf.len() < numel {
        return Err(BarrelError::BufferTooSmall {
            needed: numel,
            actual: buf.len(),
        });
    }

    let path = Path::new(path);
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| BarrelError::NotFound(path.display().to_string()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let io: Arc<dyn IOManager> = Arc::new(FileSystemIOManager::new(dir));
    let file = BarrelFile::open(io, name, options).await?;
    file.read_cube_into::<u8>(pos, clen, buf).await
}

fn coordinate(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        BarrelError::OutOfBounds(format!("Coordinate {} is not a voxel position", value))
    })
}
