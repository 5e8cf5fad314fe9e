// This file is part of a SpringRTS map archive parser.
//
// Licensed under the GNU General Public License, version 3 or later.

//! SMF (Spring Map File) header parsing and layer extraction.

use byte_reader::ByteReader;
use dxt1::decompress as dxt1_decompress;
use log::trace;
use raster::Raster;
use springmap_error::{Error, Result};

pub const MAGIC: &str = "spring map file";
const MINIMAP_SIDE: u32 = 1024;

#[derive(Clone, Debug)]
pub struct SmfHeader {
    pub version: i32,
    pub id: u32,
    pub map_width: i32,
    pub map_height: i32,
    pub square_size: i32,
    pub texels_per_square: i32,
    pub tile_size: i32,
    pub min_depth: f32,
    pub max_depth: f32,
    pub height_map_index: i32,
    pub type_map_index: i32,
    pub tile_index_map_index: i32,
    pub mini_map_index: i32,
    pub metal_map_index: i32,
    pub feature_map_index: i32,
    /// `(kind, offset)` pairs for any extra header beyond the ones this
    /// parser understands (grass map, etc). Their internal layout is out
    /// of scope; this just records that they exist.
    pub reserved_headers: Vec<(i32, i32)>,
}

impl SmfHeader {
    pub fn map_width_units(&self) -> i32 {
        self.map_width / 128
    }

    pub fn map_height_units(&self) -> i32 {
        self.map_height / 128
    }
}

#[derive(Clone, Debug)]
pub struct TileIndexHeader {
    pub num_tile_files: i32,
    pub num_tiles_in_all_files: i32,
    pub num_tiles_in_this_file: i32,
    pub smt_file_name: String,
}

#[derive(Clone, Debug)]
pub struct SmfMap {
    pub header: SmfHeader,
    pub tile_index_header: TileIndexHeader,
    pub tile_indices: Vec<i32>,
    /// Normalized height values in [0, 1], (w+1)*(h+1) of them.
    pub height_values: Vec<f32>,
    pub height_raster: Raster,
    pub type_raster: Raster,
    pub metal_raster: Raster,
    pub mini_raster: Raster,
}

fn seek(r: &mut ByteReader, offset: i32, len: usize) -> Result<()> {
    if offset < 0 || offset as usize > len {
        return Err(Error::BadOffset {
            offset: offset.max(0) as usize,
            len,
        });
    }
    r.seek(offset as usize).map_err(|_| Error::BadOffset {
        offset: offset as usize,
        len,
    })
}

pub fn parse(data: &[u8]) -> Result<SmfMap> {
    let len = data.len();
    let mut r = ByteReader::new(data);

    let magic = r.read_string(16)?;
    if magic != MAGIC {
        return Err(Error::NotASpringMap);
    }

    let version = r.read_i32()?;
    let id = r.read_u32()?;
    let map_width = r.read_i32()?;
    let map_height = r.read_i32()?;
    let square_size = r.read_i32()?;
    let texels_per_square = r.read_i32()?;
    let tile_size = r.read_i32()?;
    let min_depth = r.read_f32()?;
    let max_depth = r.read_f32()?;
    let height_map_index = r.read_i32()?;
    let type_map_index = r.read_i32()?;
    let tile_index_map_index = r.read_i32()?;
    let mini_map_index = r.read_i32()?;
    let metal_map_index = r.read_i32()?;
    let feature_map_index = r.read_i32()?;
    let num_extra_headers = r.read_i32()?;

    if num_extra_headers > 0 {
        trace!("smf declares {num_extra_headers} extra header(s) beyond height/type/tile-index/mini/metal/feature");
    }
    let mut reserved_headers = Vec::new();
    for _ in 0..num_extra_headers.max(0) {
        let size = r.read_i32()?;
        let kind = r.read_i32()?;
        reserved_headers.push((kind, r.position() as i32));
        let skip = (size - 8).max(0) as usize;
        r.read(skip)?;
    }

    let header = SmfHeader {
        version,
        id,
        map_width,
        map_height,
        square_size,
        texels_per_square,
        tile_size,
        min_depth,
        max_depth,
        height_map_index,
        type_map_index,
        tile_index_map_index,
        mini_map_index,
        metal_map_index,
        feature_map_index,
        reserved_headers,
    };

    let w = header.map_width as u32;
    let h = header.map_height as u32;

    // Height layer: (w+1)*(h+1) u16 values, normalized to [0,1].
    seek(&mut r, header.height_map_index, len)?;
    let count = (w as usize + 1) * (h as usize + 1);
    let raw = r.read_ints(count, 2, true)?;
    let height_values: Vec<f32> = raw.iter().map(|&v| v as f32 / 65536.0).collect();
    let height_bytes: Vec<u8> = height_values
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    let height_raster = Raster::from_grayscale(w + 1, h + 1, &height_bytes);

    // Type layer: (w/2)*(h/2) single bytes, broadcast to RGBA.
    seek(&mut r, header.type_map_index, len)?;
    let type_w = w / 2;
    let type_h = h / 2;
    let type_bytes = r.read(type_w as usize * type_h as usize)?;
    let type_raster = Raster::from_grayscale(type_w, type_h, type_bytes);

    // Metal layer: (w/2)*(h/2) single bytes, broadcast to RGBA.
    seek(&mut r, header.metal_map_index, len)?;
    let metal_bytes = r.read(type_w as usize * type_h as usize)?;
    let metal_raster = Raster::from_grayscale(type_w, type_h, metal_bytes);

    // Minimap: always a 1024x1024 DXT1-compressed image. Its on-disk byte
    // span varies (some SMFs carry only the base level, others the whole
    // mip pyramid), so the region length is the distance to whichever
    // declared region follows it rather than a hard-coded constant like the
    // historical 699048 — that number only ever held for one mip layout.
    seek(&mut r, header.mini_map_index, len)?;
    let mini_span = [
        header.metal_map_index,
        header.tile_index_map_index,
        header.feature_map_index,
    ]
    .into_iter()
    .filter(|&off| off > header.mini_map_index)
    .min()
    .map(|off| (off - header.mini_map_index) as usize)
    .unwrap_or(len - header.mini_map_index as usize);
    let mini_region = r.read(mini_span)?;
    let mini_blocks = (MINIMAP_SIDE / 4) as usize * (MINIMAP_SIDE / 4) as usize;
    let mini_needed = mini_blocks * 8;
    if mini_region.len() < mini_needed {
        return Err(Error::InputTruncated {
            offset: header.mini_map_index as usize,
            needed: mini_needed,
            available: mini_region.len(),
        });
    }
    let mini_raster = dxt1_decompress(&mini_region[..mini_needed], MINIMAP_SIDE, MINIMAP_SIDE)?;

    // Tile-index map: sub-header followed by (w/4)*(h/4) i32 tile indices.
    seek(&mut r, header.tile_index_map_index, len)?;
    let num_tile_files = r.read_i32()?;
    let num_tiles_in_all_files = r.read_i32()?;
    let num_tiles_in_this_file = r.read_i32()?;
    let smt_file_name = r.read_until_null()?;
    let tile_index_header = TileIndexHeader {
        num_tile_files,
        num_tiles_in_all_files,
        num_tiles_in_this_file,
        smt_file_name,
    };
    let tiles_per_map = (w / 4) as usize * (h / 4) as usize;
    let tile_indices: Vec<i32> = r
        .read_ints(tiles_per_map, 4, false)?
        .into_iter()
        .map(|v| v as i32)
        .collect();

    Ok(SmfMap {
        header,
        tile_index_header,
        tile_indices,
        height_values,
        height_raster,
        type_raster,
        metal_raster,
        mini_raster,
    })
}
