//! barrel - reader and writer for barrel (.brl) voxel cube files
//!
//! A barrel file stores a 1024^3 cube of voxels as Morton-ordered 32^3 blocks, either
//! raw or LZ4 compressed behind a jump table of block offsets.
//!
//! # Features
//!
//! - Aligned cube reads of any power-of-two side length, returned in Fortran order
//! - Raw, LZ4 and LZ4HC block types; raw files are writable
//! - Datasets of many files addressed by global voxel position
//! - Local filesystem and in-memory backends (implement `IOManager` for others)
//! - Async I/O throughout
//!
//! # Example
//!
//! ```rust,ignore
//! use barrel::{AccessOptions, BarrelFile, FileSystemIOManager, Vec3};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let io = Arc::new(FileSystemIOManager::new("/data/k0563/mag1"));
//! let name = "k0563_mag1_x000000_y000000_z000000.brl";
//! let file = BarrelFile::open(io, name, AccessOptions::default()).await?;
//!
//! // 32^3 voxels at (128, 0, 512)
//! let cube: Vec<u8> = file.read_cube(Vec3::new(128, 0, 512), 32).await?;
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod compression;
pub mod dataset;
pub mod error;
pub mod header;
pub mod io;
pub mod layout;
pub mod metadata;
pub mod morton;
pub mod status;
pub mod types;
pub mod utils;

// Re-exports
pub use access::{AccessOptions, BarrelFile, FileStats};
pub use compression::{CompressionLevel, Compressor};
pub use dataset::Dataset;
pub use error::{BarrelError, Result};
pub use header::{Header, HEADER_MAGIC};
pub use io::{FileSystemIOManager, IOManager, MemoryIOManager, StorageBackend};
pub use layout::{CubeRequest, FileLayout};
pub use metadata::DatasetMetadata;
pub use status::read_raw_data;
pub use types::{BlockType, DataType, Element, Vec3};

/// Version of the barrel crate
pub const BARREL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!BARREL_VERSION.is_empty());
    }
}
