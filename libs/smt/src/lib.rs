// This file is part of a SpringRTS map archive parser.
//
// Licensed under the GNU General Public License, version 3 or later.

//! SMT (Spring Map Tile) catalogue decoding and mosaic assembly.

use byte_reader::ByteReader;
use dxt1::decompress as dxt1_decompress;
use log::warn;
use raster::Raster;
use rayon::prelude::*;
use springmap_error::{Error, Result};

pub const MAGIC: &str = "spring tilefile";
pub const HEADER_LEN: usize = 32;

#[derive(Clone, Copy, Debug)]
pub struct SmtHeader {
    pub version: i32,
    pub num_of_tiles: i32,
    pub tile_size: i32,
    pub compression_type: i32,
}

pub fn parse_header(data: &[u8]) -> Result<SmtHeader> {
    let mut r = ByteReader::new(data);
    let magic = r.read_string(16)?;
    if magic != MAGIC {
        return Err(Error::NotASpringMap);
    }
    let version = r.read_i32()?;
    let num_of_tiles = r.read_i32()?;
    let tile_size = r.read_i32()?;
    let compression_type = r.read_i32()?;
    Ok(SmtHeader {
        version,
        num_of_tiles,
        tile_size,
        compression_type,
    })
}

#[derive(Clone, Copy, Debug)]
enum Layout {
    /// The classic 680-byte block: a full 32->16->8->4 mip pyramid at
    /// fixed internal offsets.
    Pyramid,
    /// Tightly packed single-mip tiles of the given native side length.
    Native(u32),
}

fn dxt1_byte_len(side: u32) -> usize {
    (side / 4) as usize * (side / 4) as usize * 8
}

fn infer_layout(stride: usize) -> Option<Layout> {
    if stride >= 512 {
        Some(Layout::Pyramid)
    } else if stride >= 128 {
        Some(Layout::Native(16))
    } else if stride >= 32 {
        Some(Layout::Native(8))
    } else if stride >= dxt1_byte_len(4) {
        Some(Layout::Native(4))
    } else {
        None
    }
}

fn pyramid_offset(mipmap_size: u32) -> Option<(usize, u32)> {
    match mipmap_size {
        32 => Some((0, 32)),
        16 => Some((512, 16)),
        8 => Some((640, 8)),
        4 => Some((672, 4)),
        _ => None,
    }
}

fn resample_nearest(src: &Raster, new_size: u32) -> Raster {
    if src.width() == new_size && src.height() == new_size {
        return src.clone();
    }
    let mut out = Raster::black(new_size, new_size);
    for y in 0..new_size {
        for x in 0..new_size {
            let sx = x * src.width() / new_size;
            let sy = y * src.height() / new_size;
            out.set_pixel(x, y, src.pixel(sx, sy));
        }
    }
    out
}

fn decode_one_tile(tile_bytes: &[u8], layout: Layout, mipmap_size: u32, index: usize) -> Raster {
    let attempt = (|| -> Result<Raster> {
        match layout {
            Layout::Pyramid => {
                let (off, native) = pyramid_offset(mipmap_size.max(4).min(32))
                    .unwrap_or((672, 4));
                let size = dxt1_byte_len(native);
                if off + size > tile_bytes.len() {
                    return Err(Error::TileDecodeFailed {
                        index,
                        reason: "pyramid slice out of range".to_string(),
                    });
                }
                let decoded = dxt1_decompress(&tile_bytes[off..off + size], native, native)?;
                Ok(if native == mipmap_size {
                    decoded
                } else {
                    resample_nearest(&decoded, mipmap_size)
                })
            }
            Layout::Native(native) => {
                let size = dxt1_byte_len(native);
                if size > tile_bytes.len() {
                    return Err(Error::TileDecodeFailed {
                        index,
                        reason: "native slice out of range".to_string(),
                    });
                }
                let decoded = dxt1_decompress(&tile_bytes[..size], native, native)?;
                Ok(if native == mipmap_size {
                    decoded
                } else {
                    resample_nearest(&decoded, mipmap_size)
                })
            }
        }
    })();

    match attempt {
        Ok(r) => r,
        Err(e) => {
            warn!("tile {index} failed to decode, using opaque black: {e}");
            Raster::black(mipmap_size, mipmap_size)
        }
    }
}

/// Decode every tile in the file's catalogue at the requested mipmap size.
/// `body` is the tile-data region following the 32-byte header.
pub fn build_catalog(body: &[u8], header: &SmtHeader, mipmap_size: u32) -> Vec<Raster> {
    let num_tiles = header.num_of_tiles.max(0) as usize;
    if num_tiles == 0 {
        warn!("SMT declares zero tiles; catalog will be empty");
        return Vec::new();
    }
    let stride = body.len() / num_tiles;
    let layout = match infer_layout(stride) {
        Some(l) => l,
        None => {
            warn!("SMT tile stride {stride} too small for any supported layout; using all-black catalog");
            return (0..num_tiles)
                .map(|_| Raster::black(mipmap_size, mipmap_size))
                .collect();
        }
    };

    (0..num_tiles)
        .into_par_iter()
        .map(|i| {
            let start = i * stride;
            let end = (start + stride).min(body.len());
            decode_one_tile(&body[start..end], layout, mipmap_size, i)
        })
        .collect()
}

/// Assemble the full map texture from the tile catalogue and the SMF
/// tile-index array. Out-of-range indices are filled with opaque black.
pub fn assemble_mosaic(
    catalog: &[Raster],
    tile_indices: &[i32],
    map_width_units: i32,
    map_height_units: i32,
    mipmap_size: u32,
) -> Raster {
    let tiles_wide = (map_width_units.max(0) as u32) * 32;
    let tiles_tall = (map_height_units.max(0) as u32) * 32;
    let out_w = mipmap_size * tiles_wide;
    let out_h = mipmap_size * tiles_tall;
    let mut out = Raster::black(out_w.max(1), out_h.max(1));

    for y in 0..tiles_tall {
        for x in 0..tiles_wide {
            let pos = (y * tiles_wide + x) as usize;
            let tile = tile_indices
                .get(pos)
                .and_then(|&idx| {
                    if idx >= 0 {
                        catalog.get(idx as usize)
                    } else {
                        None
                    }
                });
            match tile {
                Some(t) => out.blit(t, x * mipmap_size, y * mipmap_size),
                None => {
                    let black = Raster::black(mipmap_size, mipmap_size);
                    out.blit(&black, x * mipmap_size, y * mipmap_size);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn synth_smt_pyramid(num_tiles: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(&num_tiles.to_le_bytes());
        buf.extend_from_slice(&32i32.to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());
        for _ in 0..num_tiles {
            buf.extend_from_slice(&vec![0u8; 680]);
        }
        buf
    }

    #[test]
    fn parses_header() {
        let buf = synth_smt_pyramid(4);
        let hdr = parse_header(&buf).unwrap();
        assert_eq!(hdr.num_of_tiles, 4);
    }

    #[test]
    fn builds_catalog_at_requested_mip_size() {
        let buf = synth_smt_pyramid(2);
        let hdr = parse_header(&buf).unwrap();
        let body = &buf[HEADER_LEN..];
        let catalog = build_catalog(body, &hdr, 8);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].width(), 8);
    }

    #[test]
    fn zero_tiles_yields_empty_catalog() {
        let buf = synth_smt_pyramid(0);
        let hdr = parse_header(&buf).unwrap();
        let body = &buf[HEADER_LEN..];
        assert!(build_catalog(body, &hdr, 4).is_empty());
    }

    #[test]
    fn mosaic_has_correct_dimensions() {
        let catalog = vec![Raster::black(4, 4); 4];
        let indices = vec![0, 1, 2, 3];
        let mosaic = assemble_mosaic(&catalog, &indices, 1, 1, 4);
        assert_eq!(mosaic.width(), 4 * 32);
        assert_eq!(mosaic.height(), 4 * 32);
    }

    #[test]
    fn out_of_range_tile_index_falls_back_to_black() {
        let catalog = vec![Raster::black(4, 4); 1];
        // map is 1x1 tile units => 32*32 tile positions but we only
        // supply one index, the rest should resolve to None.
        let mut indices = vec![-1; 32 * 32];
        indices[0] = 0;
        let mosaic = assemble_mosaic(&catalog, &indices, 1, 1, 4);
        assert_eq!(mosaic.pixel(20, 20), [0, 0, 0, 255]);
    }
}
