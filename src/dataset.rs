//! Datasets - directories of barrel files addressed by global voxel position

use crate::access::{AccessOptions, BarrelFile};
use crate::error::{BarrelError, Result};
use crate::io::{create_io_manager, IOManager};
use crate::layout::FileLayout;
use crate::metadata::{DatasetMetadata, METADATA_FILE_NAME};
use crate::types::{BlockType, Element, Vec3};
use crate::utils::is_barrel_file;
use chrono::Utc;
use log::{debug, trace, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default bound on opened files kept by a [`Dataset`]
pub const DEFAULT_MAX_CACHED_FILES: usize = 256;

/// A dataset of equally shaped barrel files.
///
/// File `(i, j, k)` holds the voxels starting at `(i, j, k) * file_clen`. Files that
/// were never written read as zeros.
pub struct Dataset {
    metadata: DatasetMetadata,
    io: Arc<dyn IOManager>,
    options: AccessOptions,
    /// Opened files by name. An opened file holds its header and jump table but no OS
    /// handle; once `max_cached_files` are held an arbitrary entry is evicted.
    cache: RwLock<HashMap<String, BarrelFile>>,
    max_cached_files: usize,
    /// Serializes opening and creating files
    open_lock: Mutex<()>,
}

impl Dataset {
    /// Open an existing dataset
    pub async fn open(url: &str) -> Result<Self> {
        let io: Arc<dyn IOManager> = Arc::from(create_io_manager(url).await?);
        Self::open_with_io(io, AccessOptions::default()).await
    }

    /// Open an existing dataset on a given storage. The layout in `options` is
    /// replaced by the one recorded in the metadata.
    pub async fn open_with_io(io: Arc<dyn IOManager>, options: AccessOptions) -> Result<Self> {
        let metadata_bytes = io.read(METADATA_FILE_NAME).await?;
        let metadata: DatasetMetadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| BarrelError::Metadata(e.to_string()))?;

        // serde does not enforce the layout constraints
        let layout = FileLayout::new(
            metadata.layout.file_clen_log2() as u8,
            metadata.layout.block_clen_log2() as u8,
        )?;

        debug!(
            "Opened dataset {} (mag {}, {}, {})",
            metadata.prefix, metadata.mag, metadata.data_type, metadata.block_type
        );

        Ok(Self {
            metadata,
            io,
            options: options.with_layout(layout),
            cache: RwLock::new(HashMap::new()),
            max_cached_files: DEFAULT_MAX_CACHED_FILES,
            open_lock: Mutex::new(()),
        })
    }

    /// Create a new dataset
    pub async fn create(url: &str, metadata: DatasetMetadata) -> Result<Self> {
        let io: Arc<dyn IOManager> = Arc::from(create_io_manager(url).await?);
        Self::create_with_io(io, metadata, AccessOptions::default()).await
    }

    /// Create a new dataset on a given storage
    pub async fn create_with_io(
        io: Arc<dyn IOManager>,
        metadata: DatasetMetadata,
        options: AccessOptions,
    ) -> Result<Self> {
        if io.exists(METADATA_FILE_NAME).await? {
            return Err(BarrelError::AlreadyExists(METADATA_FILE_NAME.to_string()));
        }

        let metadata_json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| BarrelError::Metadata(e.to_string()))?;
        io.write(METADATA_FILE_NAME, &metadata_json).await?;

        Ok(Self {
            options: options.with_layout(metadata.layout),
            metadata,
            io,
            cache: RwLock::new(HashMap::new()),
            max_cached_files: DEFAULT_MAX_CACHED_FILES,
            open_lock: Mutex::new(()),
        })
    }

    /// Bound the number of opened files kept in memory (at least one)
    pub fn with_max_cached_files(mut self, max_cached_files: usize) -> Self {
        self.max_cached_files = max_cached_files.max(1);
        self
    }

    /// Number of opened files currently cached
    pub fn cached_files(&self) -> usize {
        self.cache.read().len()
    }

    /// Get the dataset metadata
    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// Names of all barrel files in the dataset
    pub async fn files(&self) -> Result<Vec<String>> {
        let mut names = self.io.list("").await?;
        names.retain(|name| is_barrel_file(name));
        Ok(names)
    }

    /// Split a global position into file index and position inside that file
    fn locate(&self, pos: Vec3, clen: u32) -> Result<(Vec3, Vec3)> {
        let layout = self.options.layout;
        if clen == 0 || !clen.is_power_of_two() || clen > layout.file_clen() {
            return Err(BarrelError::InvalidCubeLength(clen as u64));
        }

        let file_log2 = layout.file_clen_log2();
        let file_idx = pos >> file_log2;
        Ok((file_idx, pos - (file_idx << file_log2)))
    }

    fn check_data_type<T: Element>(&self) -> Result<()> {
        if T::DATA_TYPE != self.metadata.data_type {
            return Err(BarrelError::DataTypeMismatch {
                file: self.metadata.data_type.to_string(),
                requested: T::DATA_TYPE.to_string(),
            });
        }
        Ok(())
    }

    /// Get an opened file from the cache, opening it if it exists. With `create`, a
    /// missing file is created as a raw file of the dataset's data type.
    async fn cached_file(&self, name: &str, create: bool) -> Result<Option<BarrelFile>> {
        let cached = self.cache.read().get(name).cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        // a file being created must not be seen half-written
        let _guard = self.open_lock.lock().await;
        let cached = self.cache.read().get(name).cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        let file = if self.io.exists(name).await? {
            let file = BarrelFile::open(Arc::clone(&self.io), name, self.options).await?;
            self.check_file(&file)?;
            file
        } else if create {
            let (_, file) = BarrelFile::open_or_create(
                Arc::clone(&self.io),
                name,
                self.metadata.data_type,
                self.options,
            )
            .await?;
            file
        } else {
            return Ok(None);
        };

        let mut cache = self.cache.write();
        if cache.len() >= self.max_cached_files {
            if let Some(evicted) = cache.keys().next().cloned() {
                trace!("Evicting {} from the file cache", evicted);
                cache.remove(&evicted);
            }
        }
        cache.insert(name.to_string(), file.clone());

        Ok(Some(file))
    }

    fn check_file(&self, file: &BarrelFile) -> Result<()> {
        let header = file.header();
        if header.data_type != self.metadata.data_type {
            return Err(BarrelError::DataTypeMismatch {
                file: header.data_type.to_string(),
                requested: self.metadata.data_type.to_string(),
            });
        }
        if header.block_type != self.metadata.block_type {
            return Err(BarrelError::BlockTypeMismatch(format!(
                "{} is {}, dataset is {}",
                file.path(),
                header.block_type,
                self.metadata.block_type
            )));
        }
        Ok(())
    }

    /// Read the aligned cube of side `clen` at global position `pos`
    pub async fn read_cube<T: Element>(&self, pos: Vec3, clen: u32) -> Result<Vec<T>> {
        self.check_data_type::<T>()?;
        let (file_idx, local) = self.locate(pos, clen)?;
        let name = self.metadata.file_name(file_idx);

        match self.cached_file(&name, false).await? {
            Some(file) => file.read_cube(local, clen).await,
            None => {
                let req = self.options.layout.validate_cube(local, clen)?;
                debug!("{} does not exist, reading zeros", name);
                Ok(vec![T::zero(); req.numel()])
            }
        }
    }

    /// Write the aligned cube of side `clen` at global position `pos`
    pub async fn write_cube<T: Element>(&self, pos: Vec3, clen: u32, data: &[T]) -> Result<()> {
        if self.metadata.block_type.is_compressed() {
            return Err(BarrelError::BlockTypeMismatch(format!(
                "Cannot write into {} dataset",
                self.metadata.block_type
            )));
        }
        self.check_data_type::<T>()?;

        let (file_idx, local) = self.locate(pos, clen)?;
        let name = self.metadata.file_name(file_idx);

        match self.cached_file(&name, true).await? {
            Some(file) => file.write_cube(local, clen, data).await,
            None => Err(BarrelError::NotFound(name)),
        }
    }

    /// Compress every file into a new LZ4HC dataset at `dst_url`
    pub async fn compress(&self, dst_url: &str) -> Result<Dataset> {
        let dst_io: Arc<dyn IOManager> = Arc::from(create_io_manager(dst_url).await?);
        self.compress_into(dst_io).await
    }

    /// Compress every file into a new LZ4HC dataset on `dst_io`
    pub async fn compress_into(&self, dst_io: Arc<dyn IOManager>) -> Result<Dataset> {
        if self.metadata.block_type.is_compressed() {
            return Err(BarrelError::BlockTypeMismatch(format!(
                "Dataset {} is already {} compressed",
                self.metadata.prefix, self.metadata.block_type
            )));
        }

        let mut dst_metadata = self.metadata.clone().with_block_type(BlockType::Lz4Hc);
        dst_metadata.created_at = Utc::now();
        let dst = Dataset::create_with_io(Arc::clone(&dst_io), dst_metadata, self.options).await?;

        for name in self.files().await? {
            let src = BarrelFile::open(Arc::clone(&self.io), name.as_str(), self.options).await?;
            src.compress_to(Arc::clone(&dst_io), &name).await?;
        }

        Ok(dst)
    }

    /// Check that every file agrees with the dataset metadata
    pub async fn verify_headers(&self) -> Result<bool> {
        for name in self.files().await? {
            let file = BarrelFile::open(Arc::clone(&self.io), name.as_str(), self.options).await?;
            if let Err(err) = self.check_file(&file) {
                warn!("{}: {}", name, err);
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryIOManager;
    use crate::types::DataType;

    async fn small_dataset(io: Arc<dyn IOManager>) -> Dataset {
        let metadata = DatasetMetadata::new("test", DataType::U8)
            .with_layout(FileLayout::new(5, 2).unwrap());
        Dataset::create_with_io(io, metadata, AccessOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_open_dataset() {
        let io: Arc<dyn IOManager> = Arc::new(MemoryIOManager::new());
        small_dataset(Arc::clone(&io)).await;

        let dataset = Dataset::open_with_io(Arc::clone(&io), AccessOptions::default())
            .await
            .unwrap();
        assert_eq!(dataset.metadata().prefix, "test");
        assert_eq!(dataset.options.layout.file_clen(), 32);

        let metadata = DatasetMetadata::new("again", DataType::U8);
        assert!(matches!(
            Dataset::create_with_io(io, metadata, AccessOptions::default()).await,
            Err(BarrelError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_write_read_across_files() {
        let io: Arc<dyn IOManager> = Arc::new(MemoryIOManager::new());
        let dataset = small_dataset(Arc::clone(&io)).await;

        let data: Vec<u8> = (0..16 * 16 * 16).map(|i| (i % 251) as u8).collect();
        dataset.write_cube(Vec3::new(48, 0, 16), 16, &data).await.unwrap();

        // lands in file (1, 0, 0)
        assert_eq!(
            dataset.files().await.unwrap(),
            vec!["test_mag1_x000001_y000000_z000000.brl".to_string()]
        );

        let back: Vec<u8> = dataset.read_cube(Vec3::new(48, 0, 16), 16).await.unwrap();
        assert_eq!(back, data);

        // unwritten file reads as zeros
        let empty: Vec<u8> = dataset.read_cube(Vec3::new(0, 64, 0), 32).await.unwrap();
        assert_eq!(empty.len(), 32 * 32 * 32);
        assert!(empty.iter().all(|&v| v == 0));

        assert!(matches!(
            dataset.read_cube::<u8>(Vec3::new(0, 0, 0), 64).await,
            Err(BarrelError::InvalidCubeLength(64))
        ));
        assert!(matches!(
            dataset.read_cube::<u16>(Vec3::new(0, 0, 0), 16).await,
            Err(BarrelError::DataTypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_compress_dataset() {
        let io: Arc<dyn IOManager> = Arc::new(MemoryIOManager::new());
        let dataset = small_dataset(Arc::clone(&io)).await;

        let data: Vec<u8> = (0..32 * 32 * 32).map(|i| (i / 128) as u8).collect();
        dataset.write_cube(Vec3::new(0, 0, 0), 32, &data).await.unwrap();
        dataset.write_cube(Vec3::new(32, 32, 32), 32, &data).await.unwrap();
        assert!(dataset.verify_headers().await.unwrap());

        let dst_io: Arc<dyn IOManager> = Arc::new(MemoryIOManager::new());
        let compressed = dataset.compress_into(Arc::clone(&dst_io)).await.unwrap();
        assert_eq!(compressed.metadata().block_type, BlockType::Lz4Hc);
        assert_eq!(compressed.files().await.unwrap().len(), 2);
        assert!(compressed.verify_headers().await.unwrap());

        let back: Vec<u8> = compressed.read_cube(Vec3::new(32, 32, 32), 32).await.unwrap();
        assert_eq!(back, data);

        assert!(matches!(
            compressed.write_cube(Vec3::new(0, 0, 0), 32, &data).await,
            Err(BarrelError::BlockTypeMismatch(_))
        ));

        // the compressed dataset can be reopened from its metadata
        let reopened = Dataset::open_with_io(dst_io, AccessOptions::default())
            .await
            .unwrap();
        let back: Vec<u8> = reopened.read_cube(Vec3::new(0, 0, 0), 32).await.unwrap();
        assert_eq!(back, data);
    }

    #[tokio::test]
    async fn test_verify_headers_detects_foreign_file() {
        let io: Arc<dyn IOManager> = Arc::new(MemoryIOManager::new());
        let dataset = small_dataset(Arc::clone(&io)).await;
        dataset
            .write_cube(Vec3::new(0, 0, 0), 8, &vec![1u8; 512])
            .await
            .unwrap();
        assert!(dataset.verify_headers().await.unwrap());

        let options = AccessOptions::default().with_layout(FileLayout::new(5, 2).unwrap());
        BarrelFile::open_or_create(
            Arc::clone(&io),
            "test_mag1_x000002_y000000_z000000.brl",
            DataType::U16,
            options,
        )
        .await
        .unwrap();
        assert!(!dataset.verify_headers().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_writes_to_one_file() {
        let io: Arc<dyn IOManager> = Arc::new(MemoryIOManager::new());
        let dataset = Arc::new(small_dataset(io).await);

        for round in 0..20u32 {
            // both cubes land in the not yet existing file (round, 0, 0)
            let base = Vec3::new(round * 32, 0, 0);
            let first = Vec3::new(base.x, 0, 0);
            let second = Vec3::new(base.x + 16, 16, 16);

            let writers: Vec<_> = [(first, 1u8), (second, 2u8)]
                .into_iter()
                .map(|(pos, value)| {
                    let dataset = Arc::clone(&dataset);
                    tokio::spawn(async move {
                        dataset.write_cube(pos, 16, &vec![value; 16 * 16 * 16]).await
                    })
                })
                .collect();
            for writer in writers {
                writer.await.unwrap().unwrap();
            }

            let back: Vec<u8> = dataset.read_cube(first, 16).await.unwrap();
            assert!(back.iter().all(|&v| v == 1), "round {}", round);
            let back: Vec<u8> = dataset.read_cube(second, 16).await.unwrap();
            assert!(back.iter().all(|&v| v == 2), "round {}", round);
        }
    }

    #[tokio::test]
    async fn test_file_cache_is_bounded() {
        let io: Arc<dyn IOManager> = Arc::new(MemoryIOManager::new());
        let dataset = small_dataset(io).await.with_max_cached_files(2);

        for x in 0..4u32 {
            let pos = Vec3::new(x * 32, 0, 0);
            dataset.write_cube(pos, 8, &vec![x as u8 + 1; 512]).await.unwrap();
            assert!(dataset.cached_files() <= 2);
        }

        // evicted files are reopened from storage
        for x in 0..4u32 {
            let back: Vec<u8> = dataset.read_cube(Vec3::new(x * 32, 0, 0), 8).await.unwrap();
            assert!(back.iter().all(|&v| v == x as u8 + 1));
            assert!(dataset.cached_files() <= 2);
        }
        assert_eq!(dataset.files().await.unwrap().len(), 4);
    }
}
