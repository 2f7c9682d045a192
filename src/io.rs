//! I/O managers for different storage backends

use crate::error::{BarrelError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

/// Storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Local file system
    FileSystem,
    /// Process memory
    Memory,
}

impl StorageBackend {
    /// Parse storage backend from URL scheme
    pub fn from_url(url: &str) -> Result<Self> {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..scheme_end];
            match scheme {
                "file" => Ok(StorageBackend::FileSystem),
                "mem" => Ok(StorageBackend::Memory),
                _ => Err(BarrelError::InvalidUrl(format!("Unknown scheme: {}", scheme))),
            }
        } else {
            // Assume file system if no scheme
            Ok(StorageBackend::FileSystem)
        }
    }
}

/// Trait for byte-addressed storage of barrel files
#[async_trait]
pub trait IOManager: Send + Sync {
    /// Read a whole object
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Read `len` bytes starting at `offset`
    async fn read_range(&self, path: &str, offset: u64, len: usize) -> Result<Bytes>;

    /// Create or replace an object
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Write `data` at `offset`, creating the object if needed. Never truncates.
    async fn write_at(&self, path: &str, offset: u64, data: &[u8]) -> Result<()>;

    /// Truncate or extend an object to `len` bytes. Extension fills with zeros.
    async fn set_len(&self, path: &str, len: u64) -> Result<()>;

    /// Check if a path exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Get the size of data at a path
    async fn size(&self, path: &str) -> Result<u64>;

    /// List items with a given prefix
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete data at a path
    async fn delete(&self, path: &str) -> Result<()>;

    /// Get the backend type
    fn backend(&self) -> StorageBackend;
}

fn map_io_error(err: std::io::Error, path: &Path) -> BarrelError {
    match err.kind() {
        std::io::ErrorKind::NotFound => BarrelError::NotFound(path.display().to_string()),
        _ => BarrelError::Io(err),
    }
}

/// File system I/O manager
pub struct FileSystemIOManager {
    base_path: PathBuf,
}

impl FileSystemIOManager {
    /// Create a new file system I/O manager
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Get the full path for a relative path
    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    async fn create_parent(full_path: &Path) -> Result<()> {
        if let Some(parent) = full_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IOManager for FileSystemIOManager {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let full_path = self.full_path(path);
        let data = fs::read(&full_path)
            .await
            .map_err(|e| map_io_error(e, &full_path))?;
        Ok(Bytes::from(data))
    }

    async fn read_range(&self, path: &str, offset: u64, len: usize) -> Result<Bytes> {
        let full_path = self.full_path(path);
        let mut file = fs::File::open(&full_path)
            .await
            .map_err(|e| map_io_error(e, &full_path))?;

        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        Self::create_parent(&full_path).await?;

        let mut file = fs::File::create(&full_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn write_at(&self, path: &str, offset: u64, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        Self::create_parent(&full_path).await?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&full_path)
            .await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn set_len(&self, path: &str, len: u64) -> Result<()> {
        let full_path = self.full_path(path);
        let file = fs::OpenOptions::new()
            .write(true)
            .open(&full_path)
            .await
            .map_err(|e| map_io_error(e, &full_path))?;
        file.set_len(len).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        Ok(fs::try_exists(&full_path).await?)
    }

    async fn size(&self, path: &str) -> Result<u64> {
        let full_path = self.full_path(path);
        let metadata = fs::metadata(&full_path)
            .await
            .map_err(|e| map_io_error(e, &full_path))?;
        Ok(metadata.len())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full_path = self.full_path(prefix);
        let mut entries = Vec::new();

        if full_path.is_dir() {
            let mut read_dir = fs::read_dir(&full_path).await?;

            while let Some(entry) = read_dir.next_entry().await? {
                if let Some(name) = entry.file_name().to_str() {
                    entries.push(name.to_string());
                }
            }
        }

        entries.sort();
        Ok(entries)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        fs::remove_file(&full_path)
            .await
            .map_err(|e| map_io_error(e, &full_path))?;
        Ok(())
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::FileSystem
    }
}

/// In-memory I/O manager
#[derive(Default)]
pub struct MemoryIOManager {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryIOManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IOManager for MemoryIOManager {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read();
        let data = objects
            .get(path)
            .ok_or_else(|| BarrelError::NotFound(path.to_string()))?;
        Ok(Bytes::copy_from_slice(data))
    }

    async fn read_range(&self, path: &str, offset: u64, len: usize) -> Result<Bytes> {
        let objects = self.objects.read();
        let data = objects
            .get(path)
            .ok_or_else(|| BarrelError::NotFound(path.to_string()))?;

        let start = offset as usize;
        let end = start.checked_add(len).filter(|&end| end <= data.len()).ok_or_else(|| {
            BarrelError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("{}: range {}+{} past end {}", path, offset, len, data.len()),
            ))
        })?;

        Ok(Bytes::copy_from_slice(&data[start..end]))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.objects.write().insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn write_at(&self, path: &str, offset: u64, data: &[u8]) -> Result<()> {
        let mut objects = self.objects.write();
        let object = objects.entry(path.to_string()).or_default();

        let start = offset as usize;
        let end = start + data.len();
        if object.len() < end {
            object.resize(end, 0);
        }
        object[start..end].copy_from_slice(data);
        Ok(())
    }

    async fn set_len(&self, path: &str, len: u64) -> Result<()> {
        let mut objects = self.objects.write();
        let object = objects
            .get_mut(path)
            .ok_or_else(|| BarrelError::NotFound(path.to_string()))?;
        object.resize(len as usize, 0);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(path))
    }

    async fn size(&self, path: &str) -> Result<u64> {
        self.objects
            .read()
            .get(path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| BarrelError::NotFound(path.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut entries: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter_map(|key| key.strip_prefix(prefix))
            .map(|name| name.trim_start_matches('/').to_string())
            .collect();
        entries.sort();
        Ok(entries)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| BarrelError::NotFound(path.to_string()))
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

/// Parse URL and create appropriate I/O manager
///
/// `mem://` URLs create a fresh, empty in-memory store.
pub async fn create_io_manager(url: &str) -> Result<Box<dyn IOManager>> {
    match StorageBackend::from_url(url)? {
        StorageBackend::FileSystem => {
            // Extract path from file:// URL or use as-is
            let path = url.strip_prefix("file://").unwrap_or(url);
            Ok(Box::new(FileSystemIOManager::new(path)))
        }
        StorageBackend::Memory => Ok(Box::new(MemoryIOManager::new())),
    }
}
