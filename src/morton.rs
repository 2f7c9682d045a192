//! Morton (Z-order) indexing of 3D voxel coordinates
//!
//! Barrel files store blocks, and voxels inside blocks, in Morton order: the bits of
//! x, y and z are interleaved with x in the least significant position. An aligned
//! cube of side `2^k` therefore occupies one contiguous run of `2^(3k)` indices.

use crate::types::Vec3;

/// Bits per axis that fit into a 64-bit Morton index
pub const MAX_BITS_PER_AXIS: u32 = 21;

fn shuffle(v: u64) -> u64 {
    let mut z = v & 0x0000_0000_001f_ffff;
    z = (z | (z << 32)) & 0x001f_0000_0000_ffff;
    z = (z | (z << 16)) & 0x001f_0000_ff00_00ff;
    z = (z | (z << 8)) & 0x100f_00f0_0f00_f00f;
    z = (z | (z << 4)) & 0x10c3_0c30_c30c_30c3;
    z = (z | (z << 2)) & 0x1249_2492_4924_9249;
    z
}

fn unshuffle(z: u64) -> u64 {
    let mut v = z & 0x1249_2492_4924_9249;
    v = (v ^ (v >> 2)) & 0x10c3_0c30_c30c_30c3;
    v = (v ^ (v >> 4)) & 0x100f_00f0_0f00_f00f;
    v = (v ^ (v >> 8)) & 0x001f_0000_ff00_00ff;
    v = (v ^ (v >> 16)) & 0x001f_0000_0000_ffff;
    v = (v ^ (v >> 32)) & 0x0000_0000_001f_ffff;
    v
}

/// Morton index of a position
pub fn encode(pos: Vec3) -> u64 {
    shuffle(pos.x as u64) | (shuffle(pos.y as u64) << 1) | (shuffle(pos.z as u64) << 2)
}

/// Position of a Morton index
pub fn decode(idx: u64) -> Vec3 {
    Vec3 {
        x: unshuffle(idx) as u32,
        y: unshuffle(idx >> 1) as u32,
        z: unshuffle(idx >> 2) as u32,
    }
}

/// Fortran-order (x fastest) offset of `pos` in a cube of side `2^clen_log2`
#[inline]
pub fn fortran_offset(pos: Vec3, clen_log2: u32) -> usize {
    pos.x as usize
        + ((pos.y as usize + ((pos.z as usize) << clen_log2)) << clen_log2)
}

/// Copy a Morton-ordered cube of side `2^seg_log2` into a Fortran-ordered cube of
/// side `2^out_log2`, placing its first voxel at `origin`.
pub fn scatter_cube<T: Copy>(
    seg: &[T],
    seg_log2: u32,
    origin: Vec3,
    out: &mut [T],
    out_log2: u32,
) {
    let seg_clen = 1u32 << seg_log2;
    debug_assert_eq!(seg.len(), 1usize << (3 * seg_log2));

    for rel_z in 0..seg_clen {
        for rel_y in 0..seg_clen {
            let row = Vec3::new(origin.x, origin.y + rel_y, origin.z + rel_z);
            let row_start = fortran_offset(row, out_log2);
            let row_out = &mut out[row_start..row_start + seg_clen as usize];

            for (rel_x, voxel) in row_out.iter_mut().enumerate() {
                *voxel = seg[encode(Vec3::new(rel_x as u32, rel_y, rel_z)) as usize];
            }
        }
    }
}

/// Inverse of [`scatter_cube`]: collect the Fortran-ordered sub-cube at `origin`
/// into a Morton-ordered cube of side `2^seg_log2`.
pub fn gather_cube<T: Copy>(
    input: &[T],
    in_log2: u32,
    origin: Vec3,
    seg: &mut [T],
    seg_log2: u32,
) {
    let seg_clen = 1u32 << seg_log2;
    debug_assert_eq!(seg.len(), 1usize << (3 * seg_log2));

    for rel_z in 0..seg_clen {
        for rel_y in 0..seg_clen {
            let row = Vec3::new(origin.x, origin.y + rel_y, origin.z + rel_z);
            let row_start = fortran_offset(row, in_log2);
            let row_in = &input[row_start..row_start + seg_clen as usize];

            for (rel_x, voxel) in row_in.iter().enumerate() {
                seg[encode(Vec3::new(rel_x as u32, rel_y, rel_z)) as usize] = *voxel;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding() {
        assert_eq!(encode(Vec3::new(0, 0, 0)), 0);
        assert_eq!(encode(Vec3::new(1, 0, 0)), 1);
        assert_eq!(encode(Vec3::new(0, 1, 0)), 2);
        assert_eq!(encode(Vec3::new(1, 1, 0)), 3);
        assert_eq!(encode(Vec3::new(0, 0, 1)), 4);
        assert_eq!(encode(Vec3::new(1, 1, 1)), 7);
        assert_eq!(encode(Vec3::new(2, 0, 0)), 8);
        assert_eq!(encode(Vec3::new(0, 2, 0)), 16);
        assert_eq!(encode(Vec3::new(0, 0, 2)), 32);
    }

    #[test]
    fn test_decoding() {
        for idx in [0u64, 1, 7, 8, 63, 4096, 32767, (1 << 30) - 1] {
            assert_eq!(encode(decode(idx)), idx);
        }
        assert_eq!(decode(32), Vec3::new(0, 0, 2));
        let far = Vec3::new(1023, 512, 7);
        assert_eq!(decode(encode(far)), far);
    }

    #[test]
    fn test_aligned_cube_is_contiguous() {
        // cube of side 4 at (8, 4, 0) covers indices [encode(origin), +64)
        let origin = Vec3::new(8, 4, 0);
        let start = encode(origin);
        for idx in start..start + 64 {
            let pos = decode(idx);
            assert!(pos.x >= 8 && pos.x < 12);
            assert!(pos.y >= 4 && pos.y < 8);
            assert!(pos.z < 4);
        }
    }

    #[test]
    fn test_scatter_gather() {
        // 4^3 Fortran cube with values equal to their offset
        let input: Vec<u32> = (0..64).collect();

        let mut seg = vec![0u32; 8];
        gather_cube(&input, 2, Vec3::new(2, 0, 2), &mut seg, 1);
        assert_eq!(seg[0], fortran_offset(Vec3::new(2, 0, 2), 2) as u32);
        assert_eq!(seg[1], fortran_offset(Vec3::new(3, 0, 2), 2) as u32);
        assert_eq!(seg[7], fortran_offset(Vec3::new(3, 1, 3), 2) as u32);

        let mut out = vec![0u32; 64];
        scatter_cube(&seg, 1, Vec3::new(2, 0, 2), &mut out, 2);
        for (offset, value) in out.iter().enumerate() {
            let pos = Vec3::new(offset as u32 % 4, (offset as u32 / 4) % 4, offset as u32 / 16);
            if pos.x >= 2 && pos.y < 2 && pos.z >= 2 {
                assert_eq!(*value, offset as u32);
            } else {
                assert_eq!(*value, 0);
            }
        }
    }
}
