//! Block compression and decompression

use crate::error::{BarrelError, Result};
use crate::types::BlockType;
use lz4::block::{self, CompressionMode};

/// Compression level for LZ4HC (1-12, where 12 is maximum)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub fn new(level: u8) -> Self {
        Self(level.clamp(1, 12))
    }

    pub fn fast() -> Self {
        Self(1)
    }

    pub fn best() -> Self {
        Self(12)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        // LZ4HC_CLEVEL_DEFAULT
        Self(9)
    }
}

/// Trait for block compression/decompression
pub trait Compressor: Send + Sync {
    /// Compress one uncompressed block
    fn compress(&self, block: &[u8], level: CompressionLevel) -> Result<Vec<u8>>;

    /// Decompress one block, which must expand to exactly `block_len` bytes
    fn decompress(&self, data: &[u8], block_len: usize) -> Result<Vec<u8>>;

    /// Block type written by this compressor
    fn block_type(&self) -> BlockType;
}

/// Raw blocks
#[derive(Debug, Default)]
pub struct RawCompressor;

impl Compressor for RawCompressor {
    fn compress(&self, block: &[u8], _level: CompressionLevel) -> Result<Vec<u8>> {
        Ok(block.to_vec())
    }

    fn decompress(&self, data: &[u8], block_len: usize) -> Result<Vec<u8>> {
        if data.len() != block_len {
            return Err(BarrelError::Decompression(format!(
                "Raw block has {} bytes, expected {}",
                data.len(),
                block_len
            )));
        }
        Ok(data.to_vec())
    }

    fn block_type(&self) -> BlockType {
        BlockType::Raw
    }
}

fn lz4_decompress(data: &[u8], block_len: usize) -> Result<Vec<u8>> {
    let size = i32::try_from(block_len)
        .map_err(|_| BarrelError::Decompression(format!("Block of {} bytes", block_len)))?;
    let decompressed =
        block::decompress(data, Some(size)).map_err(|e| BarrelError::Decompression(e.to_string()))?;

    if decompressed.len() != block_len {
        return Err(BarrelError::Decompression(format!(
            "Block expanded to {} bytes, expected {}",
            decompressed.len(),
            block_len
        )));
    }

    Ok(decompressed)
}

/// LZ4 blocks with the default encoder
#[derive(Debug, Default)]
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn compress(&self, block: &[u8], _level: CompressionLevel) -> Result<Vec<u8>> {
        block::compress(block, Some(CompressionMode::DEFAULT), false)
            .map_err(|e| BarrelError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8], block_len: usize) -> Result<Vec<u8>> {
        lz4_decompress(data, block_len)
    }

    fn block_type(&self) -> BlockType {
        BlockType::Lz4
    }
}

/// LZ4 blocks with the high-compression encoder
#[derive(Debug, Default)]
pub struct Lz4HcCompressor;

impl Compressor for Lz4HcCompressor {
    fn compress(&self, block: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
        let mode = CompressionMode::HIGHCOMPRESSION(level.value() as i32);
        block::compress(block, Some(mode), false)
            .map_err(|e| BarrelError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8], block_len: usize) -> Result<Vec<u8>> {
        lz4_decompress(data, block_len)
    }

    fn block_type(&self) -> BlockType {
        BlockType::Lz4Hc
    }
}

/// Get a compressor for a given block type
pub fn get_compressor(block_type: BlockType) -> Box<dyn Compressor> {
    match block_type {
        BlockType::Raw => Box::new(RawCompressor),
        BlockType::Lz4 => Box::new(Lz4Compressor),
        BlockType::Lz4Hc => Box::new(Lz4HcCompressor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Vec<u8> {
        // smooth ramp like typical EM data, compresses well
        (0..32768u32).map(|i| (i / 256) as u8).collect()
    }

    #[test]
    fn test_level_clamping() {
        assert_eq!(CompressionLevel::new(0).value(), 1);
        assert_eq!(CompressionLevel::new(40).value(), 12);
        assert_eq!(CompressionLevel::default().value(), 9);
    }

    #[test]
    fn test_raw() {
        let compressor = RawCompressor;
        let block = sample_block();
        let compressed = compressor
            .compress(&block, CompressionLevel::default())
            .unwrap();
        assert_eq!(compressed, block);
        assert_eq!(compressor.decompress(&compressed, block.len()).unwrap(), block);
        assert!(compressor.decompress(&compressed[1..], block.len()).is_err());
    }

    #[test]
    fn test_lz4() {
        let compressor = Lz4Compressor;
        let block = sample_block();
        let compressed = compressor
            .compress(&block, CompressionLevel::default())
            .unwrap();
        assert!(compressed.len() < block.len());
        assert_eq!(compressor.decompress(&compressed, block.len()).unwrap(), block);
    }

    #[test]
    fn test_lz4hc_readable_by_lz4() {
        let block = sample_block();
        let compressed = Lz4HcCompressor
            .compress(&block, CompressionLevel::best())
            .unwrap();
        assert!(compressed.len() < block.len());

        // both block types share the LZ4 block format
        assert_eq!(Lz4Compressor.decompress(&compressed, block.len()).unwrap(), block);
    }

    #[test]
    fn test_wrong_block_len() {
        let block = sample_block();
        let compressed = Lz4Compressor
            .compress(&block, CompressionLevel::default())
            .unwrap();
        assert!(matches!(
            Lz4Compressor.decompress(&compressed, block.len() / 2),
            Err(BarrelError::Decompression(_))
        ));
    }

    #[test]
    fn test_get_compressor() {
        for block_type in [BlockType::Raw, BlockType::Lz4, BlockType::Lz4Hc] {
            assert_eq!(get_compressor(block_type).block_type(), block_type);
        }
    }
}
