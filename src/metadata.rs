//! Dataset metadata structures

use crate::layout::FileLayout;
use crate::types::{BlockType, DataType, Vec3};
use crate::utils::cube_file_name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the metadata object in a dataset root
pub const METADATA_FILE_NAME: &str = "dataset.json";

/// Metadata format version
pub const METADATA_VERSION: u16 = 1;

/// Complete metadata for a dataset of barrel files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Metadata format version
    pub format_version: u16,

    /// File name prefix shared by all cubes
    pub prefix: String,

    /// Magnification level of this dataset
    pub mag: u32,

    /// Voxel data type of every file
    pub data_type: DataType,

    /// Block type of every file
    pub block_type: BlockType,

    /// Geometry of every file
    #[serde(default)]
    pub layout: FileLayout,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Custom metadata key-value pairs
    #[serde(default)]
    pub custom_metadata: HashMap<String, String>,
}

impl DatasetMetadata {
    /// Create new metadata for raw files at mag 1
    pub fn new(prefix: impl Into<String>, data_type: DataType) -> Self {
        Self {
            format_version: METADATA_VERSION,
            prefix: prefix.into(),
            mag: 1,
            data_type,
            block_type: BlockType::Raw,
            layout: FileLayout::BARREL,
            created_at: Utc::now(),
            custom_metadata: HashMap::new(),
        }
    }

    /// Set magnification
    pub fn with_mag(mut self, mag: u32) -> Self {
        self.mag = mag;
        self
    }

    /// Set block type
    pub fn with_block_type(mut self, block_type: BlockType) -> Self {
        self.block_type = block_type;
        self
    }

    /// Set file layout
    pub fn with_layout(mut self, layout: FileLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Add custom metadata
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom_metadata.insert(key.into(), value.into());
    }

    /// Get custom metadata
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.custom_metadata.get(key).map(|s| s.as_str())
    }

    /// Name of the file holding file index `idx`
    pub fn file_name(&self, idx: Vec3) -> String {
        cube_file_name(&self.prefix, self.mag, idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_creation() {
        let prefix = "2012-09-28_ex145_07x2_ROI2016_corrected";
        let mut metadata = DatasetMetadata::new(prefix, DataType::U8)
            .with_mag(1)
            .with_block_type(BlockType::Lz4Hc);

        metadata.add_metadata("layer", "color");
        assert_eq!(metadata.get_metadata("layer"), Some("color"));
        assert_eq!(metadata.get_metadata("missing"), None);
        assert_eq!(
            metadata.file_name(Vec3::new(0, 0, 0)),
            "2012-09-28_ex145_07x2_ROI2016_corrected_mag1_x000000_y000000_z000000.brl"
        );
    }

    #[test]
    fn test_metadata_json() {
        let metadata = DatasetMetadata::new("k0563", DataType::F32)
            .with_mag(2)
            .with_layout(FileLayout::new(6, 3).unwrap());

        let json = serde_json::to_string_pretty(&metadata).unwrap();
        let parsed: DatasetMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.prefix, "k0563");
        assert_eq!(parsed.mag, 2);
        assert_eq!(parsed.data_type, DataType::F32);
        assert_eq!(parsed.block_type, BlockType::Raw);
        assert_eq!(parsed.layout.file_clen(), 64);
        assert_eq!(parsed.created_at, metadata.created_at);
    }

    #[test]
    fn test_layout_defaults_when_absent() {
        let json = r#"{
            "format_version": 1,
            "prefix": "old",
            "mag": 1,
            "data_type": "U8",
            "block_type": "Raw",
            "created_at": "2017-03-01T12:00:00Z"
        }"#;

        let parsed: DatasetMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.layout, FileLayout::BARREL);
        assert!(parsed.custom_metadata.is_empty());
    }
}
