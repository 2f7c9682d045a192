//! File layout - how a barrel cube is divided into Morton-ordered blocks

use crate::error::{BarrelError, Result};
use crate::header::HEADER_LEN;
use crate::morton::{self, MAX_BITS_PER_AXIS};
use crate::types::{BlockType, DataType, Vec3};
use serde::{Deserialize, Serialize};

/// Geometry of a barrel file.
///
/// The file header does not record its geometry, so readers and writers must agree
/// on it out of band. Every barrel file in the wild uses [`FileLayout::BARREL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLayout {
    file_clen_log2: u8,
    block_clen_log2: u8,
}

impl FileLayout {
    /// 1024^3 voxels per file in blocks of 32^3
    pub const BARREL: Self = Self {
        file_clen_log2: 10,
        block_clen_log2: 5,
    };

    /// Create a custom layout
    pub fn new(file_clen_log2: u8, block_clen_log2: u8) -> Result<Self> {
        if file_clen_log2 as u32 > MAX_BITS_PER_AXIS {
            return Err(BarrelError::Configuration(format!(
                "File cube length 2^{} exceeds Morton index range",
                file_clen_log2
            )));
        }

        if block_clen_log2 > file_clen_log2 {
            return Err(BarrelError::Configuration(
                "Block cube length must not exceed file cube length".to_string(),
            ));
        }

        Ok(Self {
            file_clen_log2,
            block_clen_log2,
        })
    }

    pub fn file_clen_log2(&self) -> u32 {
        self.file_clen_log2 as u32
    }

    pub fn block_clen_log2(&self) -> u32 {
        self.block_clen_log2 as u32
    }

    /// Side length of the whole file cube
    pub fn file_clen(&self) -> u32 {
        1 << self.file_clen_log2
    }

    /// Side length of a block
    pub fn block_clen(&self) -> u32 {
        1 << self.block_clen_log2
    }

    /// Voxels per file
    pub fn file_numel(&self) -> u64 {
        1 << (3 * self.file_clen_log2 as u64)
    }

    /// Voxels per block
    pub fn block_numel(&self) -> u64 {
        1 << (3 * self.block_clen_log2 as u64)
    }

    /// Blocks per file
    pub fn block_count(&self) -> u64 {
        self.file_numel() / self.block_numel()
    }

    /// Size in bytes of the jump table of a compressed file
    pub fn jump_table_len(&self) -> u64 {
        self.block_count() * std::mem::size_of::<u64>() as u64
    }

    /// Byte offset of the first block
    pub fn data_offset(&self, block_type: BlockType) -> u64 {
        if block_type.is_compressed() {
            HEADER_LEN as u64 + self.jump_table_len()
        } else {
            HEADER_LEN as u64
        }
    }

    /// Length in bytes of a raw file holding `data_type` voxels
    pub fn raw_file_len(&self, data_type: DataType) -> u64 {
        HEADER_LEN as u64 + self.file_numel() * data_type.size_in_bytes() as u64
    }

    /// Validate a cube request relative to the file origin
    pub fn validate_cube(&self, pos: Vec3, clen: u32) -> Result<CubeRequest> {
        if clen == 0 || !clen.is_power_of_two() || clen > self.file_clen() {
            return Err(BarrelError::InvalidCubeLength(clen as u64));
        }

        if !pos.is_multiple_of(clen) {
            return Err(BarrelError::MisalignedOffset(format!(
                "Position {} is not a multiple of cube length {}",
                pos, clen
            )));
        }

        // aligned and clen <= file_clen, so pos < file_clen implies pos + clen <= file_clen
        if pos.max_component() >= self.file_clen() {
            return Err(BarrelError::OutOfBounds(format!(
                "Position {} lies outside the {}^3 file cube",
                pos,
                self.file_clen()
            )));
        }

        Ok(CubeRequest {
            pos,
            clen_log2: clen.trailing_zeros(),
        })
    }

    /// Get a summary string of the layout
    pub fn summary(&self) -> String {
        format!(
            "{}^3 voxels in {} blocks of {}^3",
            self.file_clen(),
            self.block_count(),
            self.block_clen()
        )
    }
}

impl Default for FileLayout {
    fn default() -> Self {
        Self::BARREL
    }
}

/// A validated, aligned cube inside one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CubeRequest {
    pos: Vec3,
    clen_log2: u32,
}

impl CubeRequest {
    pub fn pos(&self) -> Vec3 {
        self.pos
    }

    pub fn clen(&self) -> u32 {
        1 << self.clen_log2
    }

    pub fn clen_log2(&self) -> u32 {
        self.clen_log2
    }

    /// Number of voxels in the cube
    pub fn numel(&self) -> usize {
        1 << (3 * self.clen_log2)
    }

    /// Voxel offset of the cube's contiguous Morton run
    pub fn morton_offset(&self) -> u64 {
        morton::encode(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barrel_layout() {
        let layout = FileLayout::BARREL;
        assert_eq!(layout.file_clen(), 1024);
        assert_eq!(layout.block_clen(), 32);
        assert_eq!(layout.file_numel(), 1 << 30);
        assert_eq!(layout.block_numel(), 32768);
        assert_eq!(layout.block_count(), 32768);
        assert_eq!(layout.jump_table_len(), 32768 * 8);
        assert_eq!(layout.data_offset(BlockType::Raw), 8);
        assert_eq!(layout.data_offset(BlockType::Lz4Hc), 8 + 32768 * 8);
        assert_eq!(layout.raw_file_len(DataType::U16), 8 + (2 << 30));
    }

    #[test]
    fn test_custom_layout() {
        let layout = FileLayout::new(6, 3).unwrap();
        assert_eq!(layout.file_clen(), 64);
        assert_eq!(layout.block_count(), 512);

        assert!(FileLayout::new(3, 4).is_err());
        assert!(FileLayout::new(22, 5).is_err());
    }

    #[test]
    fn test_validate_cube() {
        let layout = FileLayout::BARREL;

        let req = layout.validate_cube(Vec3::new(128, 0, 512), 32).unwrap();
        assert_eq!(req.numel(), 32768);
        assert_eq!(req.clen(), 32);
        assert_eq!(req.morton_offset(), morton::encode(Vec3::new(128, 0, 512)));

        assert!(matches!(
            layout.validate_cube(Vec3::new(0, 0, 0), 0),
            Err(BarrelError::InvalidCubeLength(0))
        ));
        assert!(matches!(
            layout.validate_cube(Vec3::new(0, 0, 0), 48),
            Err(BarrelError::InvalidCubeLength(48))
        ));
        assert!(matches!(
            layout.validate_cube(Vec3::new(0, 0, 0), 2048),
            Err(BarrelError::InvalidCubeLength(2048))
        ));
        assert!(matches!(
            layout.validate_cube(Vec3::new(16, 0, 0), 32),
            Err(BarrelError::MisalignedOffset(_))
        ));
        assert!(matches!(
            layout.validate_cube(Vec3::new(0, 1024, 0), 32),
            Err(BarrelError::OutOfBounds(_))
        ));

        // whole file
        let whole = layout.validate_cube(Vec3::default(), 1024).unwrap();
        assert_eq!(whole.morton_offset(), 0);
    }
}
