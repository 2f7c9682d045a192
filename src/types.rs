//! Core data types for barrel files

use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Shl, Shr, Sub};

/// Voxel data types supported by barrel files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    /// Unsigned 8-bit integer
    U8 = 1,
    /// Unsigned 16-bit integer
    U16 = 2,
    /// Unsigned 32-bit integer
    U32 = 3,
    /// Unsigned 64-bit integer
    U64 = 4,
    /// 32-bit floating point
    F32 = 5,
    /// 64-bit floating point
    F64 = 6,
}

impl DataType {
    /// Parse the on-disk code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(DataType::U8),
            2 => Some(DataType::U16),
            3 => Some(DataType::U32),
            4 => Some(DataType::U64),
            5 => Some(DataType::F32),
            6 => Some(DataType::F64),
            _ => None,
        }
    }

    /// On-disk code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::U16 => 2,
            DataType::U32 | DataType::F32 => 4,
            DataType::U64 | DataType::F64 => 8,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How the blocks of a file are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockType {
    /// Uncompressed blocks, addressable without a jump table
    Raw = 1,
    /// LZ4 compressed blocks
    Lz4 = 2,
    /// LZ4 compressed blocks, written by the high-compression encoder
    Lz4Hc = 3,
}

impl BlockType {
    /// Parse the on-disk code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(BlockType::Raw),
            2 => Some(BlockType::Lz4),
            3 => Some(BlockType::Lz4Hc),
            _ => None,
        }
    }

    /// On-disk code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Whether blocks are located through a jump table
    pub fn is_compressed(&self) -> bool {
        !matches!(self, BlockType::Raw)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Rust scalar types that can be stored in a barrel file.
///
/// Voxels are stored little-endian on disk.
pub trait Element: Copy + Zero + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Data type recorded in the file header
    const DATA_TYPE: DataType;

    /// Decode one voxel from the first `size_in_bytes` bytes of `bytes`
    fn read_le(bytes: &[u8]) -> Self;

    /// Encode one voxel into the first `size_in_bytes` bytes of `out`
    fn write_le(self, out: &mut [u8]);
}

macro_rules! impl_element {
    ($ty:ty, $data_type:expr) => {
        impl Element for $ty {
            const DATA_TYPE: DataType = $data_type;

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(raw)
            }

            fn write_le(self, out: &mut [u8]) {
                out[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_element!(u8, DataType::U8);
impl_element!(u16, DataType::U16);
impl_element!(u32, DataType::U32);
impl_element!(u64, DataType::U64);
impl_element!(f32, DataType::F32);
impl_element!(f64, DataType::F64);

/// Voxel position or extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Vec3 {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Same value on every axis
    pub const fn splat(v: u32) -> Self {
        Self { x: v, y: v, z: v }
    }

    /// Check whether every component is a multiple of `n`
    pub fn is_multiple_of(&self, n: u32) -> bool {
        n != 0 && self.x % n == 0 && self.y % n == 0 && self.z % n == 0
    }

    pub fn max_component(&self) -> u32 {
        self.x.max(self.y).max(self.z)
    }

    pub fn to_array(self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Shl<u32> for Vec3 {
    type Output = Vec3;

    fn shl(self, rhs: u32) -> Vec3 {
        Vec3::new(self.x << rhs, self.y << rhs, self.z << rhs)
    }
}

impl Shr<u32> for Vec3 {
    type Output = Vec3;

    fn shr(self, rhs: u32) -> Vec3 {
        Vec3::new(self.x >> rhs, self.y >> rhs, self.z >> rhs)
    }
}
