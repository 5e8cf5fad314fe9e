// This file is part of a SpringRTS map archive parser.
//
// Licensed under the GNU General Public License, version 3 or later.

//! DDS container parsing: the fixed 124-byte header, the optional DX10
//! extension, and mip/face byte-size bookkeeping. Decompression itself is
//! left to the `dxt1` crate; this module only describes layout.

use byte_reader::ByteReader;
use springmap_error::{Error, Result};

pub const MAGIC: &[u8; 4] = b"DDS ";

const DDPF_FOURCC: u32 = 0x4;
const DDSCAPS2_CUBEMAP: u32 = 0x200;
const CUBEMAP_FACE_FLAGS: [u32; 6] = [
    0x400, // positive x
    0x800, // negative x
    0x1000, // positive y
    0x2000, // negative y
    0x4000, // positive z
    0x8000, // negative z
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    Dxt1,
    Dxt3,
    Dxt5,
    Uncompressed { bit_count: u32 },
}

impl Compression {
    pub fn block_size(&self) -> usize {
        match self {
            Compression::Dxt1 => 8,
            Compression::Dxt3 | Compression::Dxt5 => 16,
            Compression::Uncompressed { .. } => 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PixelFormat {
    pub flags: u32,
    pub four_cc: String,
    pub bit_count: u32,
}

#[derive(Clone, Debug)]
pub struct DdsHeader {
    pub flags: u32,
    pub height: u32,
    pub width: u32,
    pub pitch_or_linear_size: u32,
    pub depth: u32,
    pub mipmap_count: u32,
    pub pixel_format: PixelFormat,
    pub caps: u32,
    pub caps2: u32,
    pub dx10_skipped: bool,
}

impl DdsHeader {
    pub fn compression(&self) -> Result<Compression> {
        if self.pixel_format.flags & DDPF_FOURCC != 0 {
            match self.pixel_format.four_cc.as_str() {
                "DXT1" => Ok(Compression::Dxt1),
                "DXT3" => Ok(Compression::Dxt3),
                "DXT5" => Ok(Compression::Dxt5),
                other => Err(Error::UnsupportedDds(format!(
                    "unsupported fourCC {other:?}"
                ))),
            }
        } else {
            Ok(Compression::Uncompressed {
                bit_count: self.pixel_format.bit_count,
            })
        }
    }

    pub fn is_cubemap(&self) -> bool {
        self.caps2 & DDSCAPS2_CUBEMAP != 0
    }

    /// Faces present on this cubemap, in the fixed +X,-X,+Y,-Y,+Z,-Z order.
    pub fn cubemap_faces_present(&self) -> [bool; 6] {
        let mut present = [false; 6];
        for (i, flag) in CUBEMAP_FACE_FLAGS.iter().enumerate() {
            present[i] = self.caps2 & flag != 0;
        }
        present
    }
}

/// Byte size of mip level `level` (0 = full size) for the given compression.
pub fn mip_level_size(width: u32, height: u32, level: u32, compression: Compression) -> usize {
    let w = (width >> level).max(1) as usize;
    let h = (height >> level).max(1) as usize;
    match compression {
        Compression::Uncompressed { bit_count } => {
            let bpp = (bit_count / 8).max(1) as usize;
            w * h * bpp
        }
        other => {
            let blocks_x = (w + 3) / 4;
            let blocks_y = (h + 3) / 4;
            blocks_x.max(1) * blocks_y.max(1) * other.block_size()
        }
    }
}

/// Byte ranges (offset, length) of the mip-level-0 data for each present
/// cubemap face, in the fixed +X,-X,+Y,-Y,+Z,-Z order. `data_start` is the
/// absolute offset where face data begins (just past the header / DX10
/// extension). Each face's full mip chain is skipped over to find the
/// start of the next face.
pub fn cubemap_face_ranges(header: &DdsHeader, data_start: usize) -> Result<Vec<(usize, usize)>> {
    let compression = header.compression()?;
    let levels = header.mipmap_count.max(1);
    let face_stride: usize = (0..levels)
        .map(|l| mip_level_size(header.width, header.height, l, compression))
        .sum();
    let mip0_len = mip_level_size(header.width, header.height, 0, compression);

    let mut ranges = Vec::new();
    let mut offset = data_start;
    for present in header.cubemap_faces_present() {
        if present {
            ranges.push((offset, mip0_len));
            offset += face_stride;
        }
    }
    if ranges.len() != 6 {
        return Err(Error::UnsupportedDds(format!(
            "cubemap has {} of 6 faces present",
            ranges.len()
        )));
    }
    Ok(ranges)
}

pub fn parse_header(data: &[u8]) -> Result<(DdsHeader, usize)> {
    let mut r = ByteReader::new(data);
    let magic = r.read(4)?;
    if magic != MAGIC {
        return Err(Error::UnsupportedDds("bad DDS magic".to_string()));
    }
    let _size = r.read_u32()?;
    let flags = r.read_u32()?;
    let height = r.read_u32()?;
    let width = r.read_u32()?;
    let pitch_or_linear_size = r.read_u32()?;
    let depth = r.read_u32()?;
    let mipmap_count = r.read_u32()?;
    r.read(44)?; // reserved1

    let _pf_size = r.read_u32()?;
    let pf_flags = r.read_u32()?;
    let four_cc = r.read_string(4)?;
    let bit_count = r.read_u32()?;
    r.read(16)?; // four channel masks

    let caps = r.read_u32()?;
    let caps2 = r.read_u32()?;
    let _caps3 = r.read_u32()?;
    let _caps4 = r.read_u32()?;
    let _reserved2 = r.read_u32()?;

    let mut dx10_skipped = false;
    if pf_flags & DDPF_FOURCC != 0 && four_cc == "DX10" {
        r.read(20)?;
        dx10_skipped = true;
    }

    let header = DdsHeader {
        flags,
        height,
        width,
        pitch_or_linear_size,
        depth,
        mipmap_count,
        pixel_format: PixelFormat {
            flags: pf_flags,
            four_cc,
            bit_count,
        },
        caps,
        caps2,
        dx10_skipped,
    };
    Ok((header, r.position()))
}

#[cfg(test)]
mod test {
    use super::*;

    fn synth_header(four_cc: &[u8; 4], width: u32, height: u32, caps2: u32) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(MAGIC);
        v.extend_from_slice(&124u32.to_le_bytes()); // size
        v.extend_from_slice(&0u32.to_le_bytes()); // flags
        v.extend_from_slice(&height.to_le_bytes());
        v.extend_from_slice(&width.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes()); // pitch
        v.extend_from_slice(&0u32.to_le_bytes()); // depth
        v.extend_from_slice(&0u32.to_le_bytes()); // mipmap count
        v.extend_from_slice(&[0u8; 44]);
        v.extend_from_slice(&32u32.to_le_bytes()); // pf size
        v.extend_from_slice(&DDPF_FOURCC.to_le_bytes()); // pf flags
        v.extend_from_slice(four_cc);
        v.extend_from_slice(&0u32.to_le_bytes()); // bit count
        v.extend_from_slice(&[0u8; 16]); // masks
        v.extend_from_slice(&0u32.to_le_bytes()); // caps
        v.extend_from_slice(&caps2.to_le_bytes()); // caps2
        v.extend_from_slice(&0u32.to_le_bytes()); // caps3
        v.extend_from_slice(&0u32.to_le_bytes()); // caps4
        v.extend_from_slice(&0u32.to_le_bytes()); // reserved2
        v
    }

    #[test]
    fn parses_dxt1_header() {
        let buf = synth_header(b"DXT1", 256, 256, 0);
        let (hdr, consumed) = parse_header(&buf).unwrap();
        assert_eq!(hdr.width, 256);
        assert_eq!(hdr.height, 256);
        assert_eq!(consumed, 128); // 4 magic + 124 header
        assert_eq!(hdr.compression().unwrap(), Compression::Dxt1);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = synth_header(b"DXT1", 4, 4, 0);
        buf[0] = b'X';
        assert!(parse_header(&buf).is_err());
    }

    #[test]
    fn detects_cubemap_faces() {
        let all_faces = 0x200 | 0x400 | 0x800 | 0x1000 | 0x2000 | 0x4000 | 0x8000;
        let buf = synth_header(b"DXT1", 64, 64, all_faces);
        let (hdr, _) = parse_header(&buf).unwrap();
        assert!(hdr.is_cubemap());
        assert_eq!(hdr.cubemap_faces_present(), [true; 6]);
    }

    #[test]
    fn mip_level_size_for_dxt1() {
        assert_eq!(mip_level_size(256, 256, 0, Compression::Dxt1), 64 * 64 * 8);
        assert_eq!(mip_level_size(256, 256, 1, Compression::Dxt1), 32 * 32 * 8);
    }

    #[test]
    fn cubemap_face_ranges_are_spaced_by_full_mip_chain() {
        let all_faces = 0x200 | 0x400 | 0x800 | 0x1000 | 0x2000 | 0x4000 | 0x8000;
        let mut buf = synth_header(b"DXT1", 32, 32, all_faces);
        // mipmap_count lives at byte offset 4(magic)+4(size)+4(flags)+4(height)+4(width)+4(pitch)+4(depth)=28
        buf[28..32].copy_from_slice(&1u32.to_le_bytes());
        let (hdr, consumed) = parse_header(&buf).unwrap();
        let ranges = cubemap_face_ranges(&hdr, consumed).unwrap();
        assert_eq!(ranges.len(), 6);
        let face_size = mip_level_size(32, 32, 0, Compression::Dxt1);
        assert_eq!(ranges[0], (consumed, face_size));
        assert_eq!(ranges[1], (consumed + face_size, face_size));
    }

    #[test]
    fn partial_cubemap_is_unsupported() {
        let positive_x_only = 0x200 | 0x400;
        let buf = synth_header(b"DXT1", 32, 32, positive_x_only);
        let (hdr, consumed) = parse_header(&buf).unwrap();
        assert!(cubemap_face_ranges(&hdr, consumed).is_err());
    }
}
