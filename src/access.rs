//! Barrel file access - main API for reading/writing single barrel files

use crate::compression::{
    get_compressor, CompressionLevel, Compressor, Lz4HcCompressor, RawCompressor,
};
use crate::error::{BarrelError, Result};
use crate::header::{encode_jump_table, parse_jump_table, FileIndex, Header, HEADER_LEN};
use crate::io::IOManager;
use crate::layout::{CubeRequest, FileLayout};
use crate::morton;
use crate::types::{BlockType, DataType, Element, Vec3};
use crate::utils::{bytes_to_elements, elements_to_bytes, format_bytes};
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, trace, warn};
use ndarray::{Array3, ShapeBuilder};
use std::sync::Arc;

/// Pending compressed output is flushed once it grows past this many bytes
const COMPRESS_FLUSH_LEN: usize = 8 << 20;

/// Runtime configuration for file access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessOptions {
    /// Geometry of the files
    pub layout: FileLayout,

    /// Upper bound on block reads in flight
    pub max_concurrent_reads: usize,

    /// LZ4HC level used by [`BarrelFile::compress`]
    pub compression_level: CompressionLevel,
}

impl AccessOptions {
    /// Set the file layout
    pub fn with_layout(mut self, layout: FileLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the read concurrency (at least one)
    pub fn with_max_concurrent_reads(mut self, max_concurrent_reads: usize) -> Self {
        self.max_concurrent_reads = max_concurrent_reads.max(1);
        self
    }

    /// Set the compression level
    pub fn with_compression_level(mut self, level: CompressionLevel) -> Self {
        self.compression_level = level;
        self
    }
}

impl Default for AccessOptions {
    fn default() -> Self {
        Self {
            layout: FileLayout::BARREL,
            max_concurrent_reads: 16,
            compression_level: CompressionLevel::default(),
        }
    }
}

/// An opened barrel file
#[derive(Clone)]
pub struct BarrelFile {
    io: Arc<dyn IOManager>,
    path: String,
    index: Arc<FileIndex>,
    options: AccessOptions,
}

impl BarrelFile {
    /// Open an existing barrel file
    pub async fn open(
        io: Arc<dyn IOManager>,
        path: impl Into<String>,
        options: AccessOptions,
    ) -> Result<Self> {
        let path = path.into();
        let layout = options.layout;

        let size = io.size(&path).await?;
        let header_bytes = io
            .read_range(&path, 0, (size as usize).min(HEADER_LEN))
            .await?;
        let header = Header::from_bytes(&header_bytes)?;

        let jump_table = if header.block_type.is_compressed() {
            let data_offset = layout.data_offset(header.block_type);
            if size < data_offset {
                return Err(BarrelError::CorruptJumpTable(format!(
                    "{} has {} bytes, jump table ends at {}",
                    path, size, data_offset
                )));
            }

            let bytes = io
                .read_range(&path, HEADER_LEN as u64, layout.jump_table_len() as usize)
                .await?;
            Some(parse_jump_table(&bytes, layout.block_count() as usize)?)
        } else {
            None
        };

        let index = FileIndex::new(header, layout, jump_table)?;
        if size < index.file_len() {
            if header.block_type.is_compressed() {
                return Err(BarrelError::CorruptJumpTable(format!(
                    "{} has {} bytes, blocks end at {}",
                    path,
                    size,
                    index.file_len()
                )));
            }
            warn!(
                "{} is shorter than a full raw cube ({} < {})",
                path,
                size,
                index.file_len()
            );
        }

        debug!(
            "Opened {} ({}, {}, {})",
            path,
            header.data_type,
            header.block_type,
            format_bytes(size)
        );

        Ok(Self {
            io,
            path,
            index: Arc::new(index),
            options,
        })
    }

    /// Open a file for writing, creating a raw file if it is missing or empty.
    ///
    /// Returns whether the file was created.
    pub async fn open_or_create(
        io: Arc<dyn IOManager>,
        path: impl Into<String>,
        data_type: DataType,
        options: AccessOptions,
    ) -> Result<(bool, Self)> {
        let path = path.into();

        let empty = !io.exists(&path).await? || io.size(&path).await? == 0;
        if empty {
            let layout = options.layout;
            let header = Header::new(data_type, BlockType::Raw);

            io.write(&path, &header.to_bytes()?).await?;
            io.set_len(&path, layout.raw_file_len(data_type)).await?;
            debug!("Created raw {} file {}", data_type, path);

            let index = FileIndex::new(header, layout, None)?;
            let file = Self {
                io,
                path,
                index: Arc::new(index),
                options,
            };
            return Ok((true, file));
        }

        let file = Self::open(io, path, options).await?;
        if file.header().data_type != data_type {
            return Err(BarrelError::DataTypeMismatch {
                file: file.header().data_type.to_string(),
                requested: data_type.to_string(),
            });
        }

        Ok((false, file))
    }

    /// Compress a raw file into a new LZ4HC file at `dst` on the same storage
    pub async fn compress(
        io: Arc<dyn IOManager>,
        src: &str,
        dst: &str,
        options: AccessOptions,
    ) -> Result<Self> {
        let src_file = Self::open(Arc::clone(&io), src, options).await?;
        src_file.compress_to(io, dst).await
    }

    /// Compress this raw file into a new LZ4HC file at `dst` on `dst_io`
    pub async fn compress_to(&self, dst_io: Arc<dyn IOManager>, dst: &str) -> Result<Self> {
        if self.header().block_type.is_compressed() {
            return Err(BarrelError::BlockTypeMismatch(format!(
                "{} is already {} compressed",
                self.path,
                self.header().block_type
            )));
        }

        if dst_io.exists(dst).await? {
            return Err(BarrelError::AlreadyExists(dst.to_string()));
        }

        if let Err(err) = self.write_compressed(dst_io.as_ref(), dst).await {
            // a partial file has a zeroed jump table and would block a retry
            if let Err(delete_err) = dst_io.delete(dst).await {
                warn!("Failed to remove partial {}: {}", dst, delete_err);
            }
            return Err(err);
        }

        Self::open(dst_io, dst, self.options).await
    }

    async fn write_compressed(&self, dst_io: &dyn IOManager, dst: &str) -> Result<()> {
        let options = self.options;
        let layout = options.layout;
        let header = self.header().with_block_type(BlockType::Lz4Hc);
        let data_offset = layout.data_offset(header.block_type);

        // header and a zeroed jump table, patched once all blocks are written
        let mut prefix = header.to_bytes()?;
        prefix.resize(data_offset as usize, 0);
        dst_io.write(dst, &prefix).await?;

        let raw = RawCompressor;
        let encoder = Lz4HcCompressor;
        let level = options.compression_level;

        let mut blocks = stream::iter(0..layout.block_count())
            .map(|block_idx| self.read_block(block_idx, &raw))
            .buffered(options.max_concurrent_reads);

        let mut jump_table = Vec::with_capacity(layout.block_count() as usize);
        let mut pending = Vec::new();
        let mut flushed = 0u64;

        while let Some(block) = blocks.try_next().await? {
            let encoded = encoder.compress(&block, level)?;
            pending.extend_from_slice(&encoded);
            jump_table.push(flushed + pending.len() as u64);

            if pending.len() >= COMPRESS_FLUSH_LEN {
                dst_io.write_at(dst, data_offset + flushed, &pending).await?;
                flushed += pending.len() as u64;
                pending.clear();
            }
        }

        if !pending.is_empty() {
            dst_io.write_at(dst, data_offset + flushed, &pending).await?;
            flushed += pending.len() as u64;
        }

        dst_io
            .write_at(dst, HEADER_LEN as u64, &encode_jump_table(&jump_table))
            .await?;

        debug!(
            "Compressed {} into {}: {} -> {}",
            self.path,
            dst,
            format_bytes(self.index.data_len()),
            format_bytes(flushed)
        );

        Ok(())
    }

    /// File header
    pub fn header(&self) -> &Header {
        &self.index.header
    }

    /// Block index of the file
    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn layout(&self) -> FileLayout {
        self.options.layout
    }

    /// Read the aligned cube of side `clen` at `pos` in Fortran order
    pub async fn read_cube<T: Element>(&self, pos: Vec3, clen: u32) -> Result<Vec<T>> {
        let req = self.options.layout.validate_cube(pos, clen)?;
        let mut out = vec![T::zero(); req.numel()];
        self.read_request(req, &mut out).await?;
        Ok(out)
    }

    /// Read the aligned cube of side `clen` at `pos` into the first `clen^3` voxels
    /// of `out`
    pub async fn read_cube_into<T: Element>(
        &self,
        pos: Vec3,
        clen: u32,
        out: &mut [T],
    ) -> Result<()> {
        let req = self.options.layout.validate_cube(pos, clen)?;
        if out.len() < req.numel() {
            return Err(BarrelError::BufferTooSmall {
                needed: req.numel(),
                actual: out.len(),
            });
        }

        self.read_request(req, &mut out[..req.numel()]).await
    }

    /// Read the aligned cube of side `clen` at `pos`, indexed `[x, y, z]`
    pub async fn read_array<T: Element>(&self, pos: Vec3, clen: u32) -> Result<Array3<T>> {
        let data = self.read_cube::<T>(pos, clen).await?;
        let side = clen as usize;
        Array3::from_shape_vec((side, side, side).f(), data)
            .map_err(|e| BarrelError::InvalidDimensions(e.to_string()))
    }

    async fn read_request<T: Element>(&self, req: CubeRequest, out: &mut [T]) -> Result<()> {
        self.check_data_type::<T>()?;

        if self.header().block_type.is_compressed() {
            self.read_compressed(req, out).await
        } else {
            self.read_raw(req, out).await
        }
    }

    async fn read_raw<T: Element>(&self, req: CubeRequest, out: &mut [T]) -> Result<()> {
        let size = self.header().data_type.size_in_bytes();
        let offset =
            self.options.layout.data_offset(BlockType::Raw) + req.morton_offset() * size as u64;

        // an aligned cube is one contiguous Morton run
        let bytes = self
            .io
            .read_range(&self.path, offset, req.numel() * size)
            .await?;
        let run = bytes_to_elements::<T>(&bytes)?;

        morton::scatter_cube(&run, req.clen_log2(), Vec3::default(), out, req.clen_log2());
        Ok(())
    }

    async fn read_compressed<T: Element>(&self, req: CubeRequest, out: &mut [T]) -> Result<()> {
        let layout = self.options.layout;
        let block_numel = layout.block_numel();
        let block_log2 = layout.block_clen_log2();
        let compressor = get_compressor(self.header().block_type);
        let first_block = req.morton_offset() / block_numel;

        if req.clen_log2() <= block_log2 {
            // the cube is a sub-run of a single block
            let block = self.read_block(first_block, compressor.as_ref()).await?;
            let size = self.header().data_type.size_in_bytes();
            let start = (req.morton_offset() % block_numel) as usize * size;
            let run = bytes_to_elements::<T>(&block[start..start + req.numel() * size])?;

            morton::scatter_cube(&run, req.clen_log2(), Vec3::default(), out, req.clen_log2());
            return Ok(());
        }

        let block_count = req.numel() as u64 / block_numel;
        let mut blocks = stream::iter(0..block_count)
            .map(|rel_idx| self.read_block(first_block + rel_idx, compressor.as_ref()))
            .buffered(self.options.max_concurrent_reads);

        let mut rel_idx = 0u64;
        while let Some(block) = blocks.try_next().await? {
            let seg = bytes_to_elements::<T>(&block)?;
            let origin = morton::decode(rel_idx * block_numel);
            morton::scatter_cube(&seg, block_log2, origin, out, req.clen_log2());
            rel_idx += 1;
        }

        Ok(())
    }

    /// Read and decode block `block_idx`
    async fn read_block(&self, block_idx: u64, compressor: &dyn Compressor) -> Result<Vec<u8>> {
        let range = self.index.block_range(block_idx)?;
        let len = range
            .end
            .checked_sub(range.start)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| {
                BarrelError::CorruptJumpTable(format!("Block {} of {}", block_idx, self.path))
            })?;
        trace!("Reading block {} of {} ({} bytes)", block_idx, self.path, len);

        let data = self.io.read_range(&self.path, range.start, len).await?;
        compressor.decompress(&data, self.index.block_len())
    }

    /// Write the aligned cube of side `clen` at `pos` from Fortran-ordered `data`.
    ///
    /// Only raw files can be written.
    pub async fn write_cube<T: Element>(&self, pos: Vec3, clen: u32, data: &[T]) -> Result<()> {
        if self.header().block_type.is_compressed() {
            return Err(BarrelError::BlockTypeMismatch(format!(
                "Cannot write into {} file {}",
                self.header().block_type,
                self.path
            )));
        }
        self.check_data_type::<T>()?;

        let req = self.options.layout.validate_cube(pos, clen)?;
        if data.len() < req.numel() {
            return Err(BarrelError::BufferTooSmall {
                needed: req.numel(),
                actual: data.len(),
            });
        }
        if data.len() > req.numel() {
            return Err(BarrelError::InvalidDimensions(format!(
                "Expected {} voxels for a {}^3 cube, got {}",
                req.numel(),
                clen,
                data.len()
            )));
        }

        let mut run = vec![T::zero(); req.numel()];
        morton::gather_cube(data, req.clen_log2(), Vec3::default(), &mut run, req.clen_log2());

        let size = self.header().data_type.size_in_bytes();
        let offset =
            self.options.layout.data_offset(BlockType::Raw) + req.morton_offset() * size as u64;
        trace!("Writing {}^3 cube at {} of {}", clen, pos, self.path);

        self.io
            .write_at(&self.path, offset, &elements_to_bytes(&run))
            .await
    }

    fn check_data_type<T: Element>(&self) -> Result<()> {
        if self.header().data_type != T::DATA_TYPE {
            return Err(BarrelError::DataTypeMismatch {
                file: self.header().data_type.to_string(),
                requested: T::DATA_TYPE.to_string(),
            });
        }
        Ok(())
    }

    /// Get statistics about the file
    pub fn stats(&self) -> FileStats {
        let header = self.header();
        FileStats {
            data_type: header.data_type,
            block_type: header.block_type,
            layout: self.options.layout,
            uncompressed_size: self.options.layout.file_numel()
                * header.data_type.size_in_bytes() as u64,
            size_on_disk: self.index.file_len(),
        }
    }
}

/// File statistics
#[derive(Debug, Clone)]
pub struct FileStats {
    pub data_type: DataType,
    pub block_type: BlockType,
    pub layout: FileLayout,
    pub uncompressed_size: u64,
    pub size_on_disk: u64,
}

impl FileStats {
    pub fn compression_ratio(&self) -> f64 {
        if self.size_on_disk == 0 {
            0.0
        } else {
            self.uncompressed_size as f64 / self.size_on_disk as f64
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} {} file, {}: {} on disk, {} uncompressed (ratio {:.2})",
            self.data_type,
            self.block_type,
            self.layout.summary(),
            format_bytes(self.size_on_disk),
            format_bytes(self.uncompressed_size),
            self.compression_ratio(),
        )
    }
}
