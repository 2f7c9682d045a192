//! On-disk header and jump table of barrel files

use crate::error::{BarrelError, Result};
use crate::layout::FileLayout;
use crate::types::{BlockType, DataType};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::ops::Range;

/// Magic bytes at the start of every barrel file
pub const HEADER_MAGIC: &[u8; 5] = b"MPIBR";

/// Length of the fixed header in bytes
pub const HEADER_LEN: usize = 8;

/// The only on-disk version
pub const CURRENT_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct RawHeader {
    magic: [u8; 5],
    version: u8,
    data_type: u8,
    block_type: u8,
}

/// Parsed file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub data_type: DataType,
    pub block_type: BlockType,
}

impl Header {
    /// Create a header of the current version
    pub fn new(data_type: DataType, block_type: BlockType) -> Self {
        Self {
            version: CURRENT_VERSION,
            data_type,
            block_type,
        }
    }

    /// Same header with a different block type
    pub fn with_block_type(mut self, block_type: BlockType) -> Self {
        self.block_type = block_type;
        self
    }

    /// Parse and validate a header
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(BarrelError::TruncatedHeader {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let raw: RawHeader = bincode::deserialize(&bytes[..HEADER_LEN])?;

        if &raw.magic != HEADER_MAGIC {
            return Err(BarrelError::InvalidMagic);
        }

        if raw.version != CURRENT_VERSION {
            return Err(BarrelError::UnsupportedVersion(raw.version));
        }

        let data_type =
            DataType::from_code(raw.data_type).ok_or(BarrelError::InvalidDataType(raw.data_type))?;
        let block_type = BlockType::from_code(raw.block_type)
            .ok_or(BarrelError::InvalidBlockType(raw.block_type))?;

        Ok(Self {
            version: raw.version,
            data_type,
            block_type,
        })
    }

    /// Encode the header
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let raw = RawHeader {
            magic: *HEADER_MAGIC,
            version: self.version,
            data_type: self.data_type.code(),
            block_type: self.block_type.code(),
        };

        let bytes = bincode::serialize(&raw)?;
        debug_assert_eq!(bytes.len(), HEADER_LEN);
        Ok(bytes)
    }
}

/// Decode a little-endian jump table of `block_count` entries
pub fn parse_jump_table(bytes: &[u8], block_count: usize) -> Result<Vec<u64>> {
    let expected = block_count * std::mem::size_of::<u64>();
    if bytes.len() < expected {
        return Err(BarrelError::CorruptJumpTable(format!(
            "Expected {} bytes, got {}",
            expected,
            bytes.len()
        )));
    }

    let mut table = vec![0u64; block_count];
    Cursor::new(&bytes[..expected]).read_u64_into::<LittleEndian>(&mut table)?;

    if let Some(pos) = table.windows(2).position(|w| w[1] < w[0]) {
        return Err(BarrelError::CorruptJumpTable(format!(
            "Entry {} decreases ({} < {})",
            pos + 1,
            table[pos + 1],
            table[pos]
        )));
    }

    Ok(table)
}

/// Encode a jump table
pub fn encode_jump_table(table: &[u64]) -> Vec<u8> {
    let mut bytes = vec![0u8; table.len() * std::mem::size_of::<u64>()];
    LittleEndian::write_u64_into(table, &mut bytes);
    bytes
}

/// Everything an opened file keeps in memory to locate its blocks
#[derive(Debug, Clone)]
pub struct FileIndex {
    pub header: Header,
    pub layout: FileLayout,
    /// Cumulative block end offsets, relative to the data segment. Only present for
    /// compressed files.
    pub jump_table: Option<Vec<u64>>,
}

impl FileIndex {
    pub fn new(header: Header, layout: FileLayout, jump_table: Option<Vec<u64>>) -> Result<Self> {
        match (&jump_table, header.block_type.is_compressed()) {
            (Some(table), true) if table.len() as u64 != layout.block_count() => {
                return Err(BarrelError::CorruptJumpTable(format!(
                    "Expected {} entries, got {}",
                    layout.block_count(),
                    table.len()
                )))
            }
            (None, true) => {
                return Err(BarrelError::CorruptJumpTable(
                    "Compressed file without jump table".to_string(),
                ))
            }
            (Some(_), false) => {
                return Err(BarrelError::CorruptJumpTable(
                    "Raw file with jump table".to_string(),
                ))
            }
            _ => {}
        }

        let index = Self {
            header,
            layout,
            jump_table,
        };
        if let Some(table) = &index.jump_table {
            index.check_block_lens(table)?;
        }
        Ok(index)
    }

    /// Every compressed block must fit the LZ4 bound of one uncompressed block, so
    /// block ranges and the file length stay far from `u64::MAX`.
    fn check_block_lens(&self, table: &[u64]) -> Result<()> {
        let max_len = self.max_compressed_block_len();
        let mut start = 0u64;

        for (idx, &end) in table.iter().enumerate() {
            let len = end.checked_sub(start).ok_or_else(|| {
                BarrelError::CorruptJumpTable(format!(
                    "Entry {} decreases ({} < {})",
                    idx, end, start
                ))
            })?;
            if len > max_len {
                return Err(BarrelError::CorruptJumpTable(format!(
                    "Block {} spans {} bytes, at most {} expected",
                    idx, len, max_len
                )));
            }
            start = end;
        }

        Ok(())
    }

    /// LZ4_COMPRESSBOUND of one block
    pub fn max_compressed_block_len(&self) -> u64 {
        let block_len = self.block_len() as u64;
        block_len + block_len / 255 + 16
    }

    /// Size in bytes of one uncompressed block
    pub fn block_len(&self) -> usize {
        self.layout.block_numel() as usize * self.header.data_type.size_in_bytes()
    }

    /// Absolute byte range of block `block_idx` on disk
    pub fn block_range(&self, block_idx: u64) -> Result<Range<u64>> {
        if block_idx >= self.layout.block_count() {
            return Err(BarrelError::OutOfBounds(format!(
                "Block index {} exceeds block count {}",
                block_idx,
                self.layout.block_count()
            )));
        }

        let data_offset = self.layout.data_offset(self.header.block_type);

        match &self.jump_table {
            Some(table) => {
                let idx = block_idx as usize;
                let start = if idx == 0 { 0 } else { table[idx - 1] };
                let end = table[idx];
                match (data_offset.checked_add(start), data_offset.checked_add(end)) {
                    (Some(start), Some(end)) if start <= end => Ok(start..end),
                    _ => Err(BarrelError::CorruptJumpTable(format!(
                        "Block {} has invalid extent {}..{}",
                        block_idx, start, end
                    ))),
                }
            }
            None => {
                let block_len = self.block_len() as u64;
                let start = data_offset + block_idx * block_len;
                Ok(start..start + block_len)
            }
        }
    }

    /// Total bytes occupied by blocks on disk
    pub fn data_len(&self) -> u64 {
        match &self.jump_table {
            Some(table) => table.last().copied().unwrap_or(0),
            None => self.layout.file_numel() * self.header.data_type.size_in_bytes() as u64,
        }
    }

    /// Expected length of the whole file
    pub fn file_len(&self) -> u64 {
        self.layout
            .data_offset(self.header.block_type)
            .saturating_add(self.data_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bytes() {
        let header = Header::new(DataType::U8, BlockType::Lz4Hc);
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes, b"MPIBR\x01\x01\x03".to_vec());
        assert_eq!(Header::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_validation() {
        assert!(matches!(
            Header::from_bytes(b"MPIB"),
            Err(BarrelError::TruncatedHeader { actual: 4, .. })
        ));
        assert!(matches!(
            Header::from_bytes(b"WKW\x01\x01\x01\x01\x01"),
            Err(BarrelError::InvalidMagic)
        ));
        assert!(matches!(
            Header::from_bytes(b"MPIBR\x02\x01\x01"),
            Err(BarrelError::UnsupportedVersion(2))
        ));
        assert!(matches!(
            Header::from_bytes(b"MPIBR\x01\x00\x01"),
            Err(BarrelError::InvalidDataType(0))
        ));
        assert!(matches!(
            Header::from_bytes(b"MPIBR\x01\x07\x01"),
            Err(BarrelError::InvalidDataType(7))
        ));
        assert!(matches!(
            Header::from_bytes(b"MPIBR\x01\x01\x04"),
            Err(BarrelError::InvalidBlockType(4))
        ));
    }

    #[test]
    fn test_jump_table() {
        let table = vec![10u64, 25, 25, 40];
        let bytes = encode_jump_table(&table);
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[..8], &10u64.to_le_bytes());
        assert_eq!(parse_jump_table(&bytes, 4).unwrap(), table);

        let bad = encode_jump_table(&[10, 5]);
        assert!(matches!(
            parse_jump_table(&bad, 2),
            Err(BarrelError::CorruptJumpTable(_))
        ));
        assert!(parse_jump_table(&bytes[..16], 4).is_err());
    }

    #[test]
    fn test_block_ranges() {
        let layout = FileLayout::new(2, 1).unwrap(); // 8 blocks of 8 voxels

        let raw = FileIndex::new(Header::new(DataType::U16, BlockType::Raw), layout, None).unwrap();
        assert_eq!(raw.block_range(0).unwrap(), 8..24);
        assert_eq!(raw.block_range(3).unwrap(), 56..72);
        assert_eq!(raw.file_len(), 8 + 128);
        assert!(raw.block_range(8).is_err());

        let table = vec![5, 9, 12, 20, 21, 22, 30, 31];
        let lz4 = FileIndex::new(
            Header::new(DataType::U16, BlockType::Lz4),
            layout,
            Some(table),
        )
        .unwrap();
        let data_offset = 8 + 64;
        assert_eq!(lz4.block_range(0).unwrap(), data_offset..data_offset + 5);
        assert_eq!(lz4.block_range(3).unwrap(), data_offset + 12..data_offset + 20);
        assert_eq!(lz4.file_len(), data_offset + 31);

        assert!(FileIndex::new(Header::new(DataType::U8, BlockType::Lz4), layout, None).is_err());

        // 8 voxels of u16 compress to at most 16 + 0 + 16 bytes
        let oversized = vec![5, 9, 12, 20, 21, 22, 30, 30 + 33];
        assert!(matches!(
            FileIndex::new(Header::new(DataType::U16, BlockType::Lz4), layout, Some(oversized)),
            Err(BarrelError::CorruptJumpTable(_))
        ));
        let huge = vec![5, 9, 12, 20, 21, 22, 30, u64::MAX - 100];
        assert!(matches!(
            FileIndex::new(Header::new(DataType::U16, BlockType::Lz4), layout, Some(huge)),
            Err(BarrelError::CorruptJumpTable(_))
        ));
        assert!(FileIndex::new(
            Header::new(DataType::U8, BlockType::Lz4),
            layout,
            Some(vec![1, 2])
        )
        .is_err());
    }
}
