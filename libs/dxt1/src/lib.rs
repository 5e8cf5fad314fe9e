// This file is part of a SpringRTS map archive parser.
//
// Licensed under the GNU General Public License, version 3 or later.

//! DXT1 (S3TC) block decompression. Each 8-byte block covers a 4x4 pixel
//! region: two RGB565 endpoints followed by 16 2-bit palette indices.

use raster::Raster;
use springmap_error::{Error, Result};

const BLOCK_BYTES: usize = 8;

/// Unpack a little-endian RGB565 value into 8-bit channels. Low bits are
/// zero-padded rather than bit-replicated, matching this family's existing
/// texture-unpacking convention.
fn unpack_565(v: u16) -> (u8, u8, u8) {
    let r = ((v & 0xF800) >> 8) as u8;
    let g = ((v & 0x07E0) >> 3) as u8;
    let b = ((v & 0x001F) << 3) as u8;
    (r, g, b)
}

/// The 4-entry palette for one block, plus whether index 3 is transparent.
fn block_palette(c0: u16, c1: u16) -> ([[u8; 4]; 4], bool) {
    let (r0, g0, b0) = unpack_565(c0);
    let (r1, g1, b1) = unpack_565(c1);
    if c0 > c1 {
        let r2 = ((2 * r0 as u16 + r1 as u16) / 3) as u8;
        let g2 = ((2 * g0 as u16 + g1 as u16) / 3) as u8;
        let b2 = ((2 * b0 as u16 + b1 as u16) / 3) as u8;
        let r3 = ((r0 as u16 + 2 * r1 as u16) / 3) as u8;
        let g3 = ((g0 as u16 + 2 * g1 as u16) / 3) as u8;
        let b3 = ((b0 as u16 + 2 * b1 as u16) / 3) as u8;
        (
            [
                [r0, g0, b0, 255],
                [r1, g1, b1, 255],
                [r2, g2, b2, 255],
                [r3, g3, b3, 255],
            ],
            false,
        )
    } else {
        let r2 = ((r0 as u16 + r1 as u16) / 2) as u8;
        let g2 = ((g0 as u16 + g1 as u16) / 2) as u8;
        let b2 = ((b0 as u16 + b1 as u16) / 2) as u8;
        (
            [
                [r0, g0, b0, 255],
                [r1, g1, b1, 255],
                [r2, g2, b2, 255],
                [0, 0, 0, 0],
            ],
            true,
        )
    }
}

/// Decode a single 8-byte DXT1 block into a 4x4 array of RGBA pixels, row
/// major top to bottom, left to right.
pub fn decode_block(block: &[u8; 8]) -> [[u8; 4]; 16] {
    let c0 = u16::from_le_bytes([block[0], block[1]]);
    let c1 = u16::from_le_bytes([block[2], block[3]]);
    let (palette, _has_alpha) = block_palette(c0, c1);
    let mut out = [[0u8; 4]; 16];
    for row in 0..4 {
        let byte = block[4 + row];
        for col in 0..4 {
            let idx = (byte >> (2 * col)) & 0x3;
            out[row * 4 + col] = palette[idx as usize];
        }
    }
    out
}

/// Decompress a full DXT1 block stream into an RGBA raster. `width` and
/// `height` must each be at least 4 and a multiple of 4.
pub fn decompress(data: &[u8], width: u32, height: u32) -> Result<Raster> {
    assert!(width >= 4 && width % 4 == 0);
    assert!(height >= 4 && height % 4 == 0);
    let block_cols = (width / 4) as usize;
    let block_rows = (height / 4) as usize;
    let needed = block_cols * block_rows * BLOCK_BYTES;
    if data.len() < needed {
        return Err(Error::InputTruncated {
            offset: 0,
            needed,
            available: data.len(),
        });
    }

    let mut pixels = vec![0u8; width as usize * height as usize * 4];
    for by in 0..block_rows {
        for bx in 0..block_cols {
            let block_idx = by * block_cols + bx;
            let off = block_idx * BLOCK_BYTES;
            let block: &[u8; 8] = data[off..off + BLOCK_BYTES].try_into().unwrap();
            let decoded = decode_block(block);
            for py in 0..4 {
                for px in 0..4 {
                    let x = bx * 4 + px;
                    let y = by * 4 + py;
                    let dst = (y * width as usize + x) * 4;
                    pixels[dst..dst + 4].copy_from_slice(&decoded[py * 4 + px]);
                }
            }
        }
    }
    Ok(Raster::new(width, height, pixels))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pure_red_opaque_block() {
        // c0 == c1 == 0xF800, indices all zero.
        let mut block = [0u8; 8];
        block[0..2].copy_from_slice(&0xF800u16.to_le_bytes());
        block[2..4].copy_from_slice(&0xF800u16.to_le_bytes());
        let decoded = decode_block(&block);
        for px in decoded {
            assert_eq!(px, [248, 0, 0, 255]);
        }
    }

    #[test]
    fn white_to_blue_ramp_opaque_mode() {
        let mut block = [0u8; 8];
        block[0..2].copy_from_slice(&0xFFFFu16.to_le_bytes());
        block[2..4].copy_from_slice(&0x001Fu16.to_le_bytes());
        // indices 0,1,2,3 across the first row.
        block[4] = 0b11_10_01_00;
        let decoded = decode_block(&block);
        assert_eq!(decoded[0], [248, 252, 248, 255]);
        assert_eq!(decoded[1], [0, 0, 248, 255]);
        assert_eq!(decoded[2], [165, 168, 248, 255]);
        assert_eq!(decoded[3], [82, 84, 248, 255]);
    }

    #[test]
    fn one_bit_alpha_mode_when_c0_not_greater_than_c1() {
        let mut block = [0u8; 8];
        block[0..2].copy_from_slice(&0x001Fu16.to_le_bytes());
        block[2..4].copy_from_slice(&0x001Fu16.to_le_bytes());
        block[4] = 0b11_11_11_11;
        let decoded = decode_block(&block);
        assert_eq!(decoded[0], [0, 0, 0, 0]);
    }

    #[test]
    fn decompress_produces_correctly_sized_buffer() {
        let data = vec![0u8; 2 * 8]; // two 4x4 blocks, 8x4 image
        let r = decompress(&data, 8, 4).unwrap();
        assert_eq!(r.data().len(), 8 * 4 * 4);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let data = vec![0u8; 4];
        assert!(decompress(&data, 4, 4).is_err());
    }
}
