// This file is part of a SpringRTS map archive parser.
//
// Licensed under the GNU General Public License, version 3 or later.

//! Top-level pipeline: given a `.sd7`/`.sdz` archive path and a set of
//! `ParseOptions`, orchestrates extraction, SMF/SMT decoding, metadata
//! parsing, water overlay, and skybox reprojection into one `Map` value.

use dds::Compression;
use log::{info, trace, warn};
use metadata::MetadataValue;
use raster::Raster;
use smf::SmfHeader;
use springmap_error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub use springmap_error::Error as SpringMapError;

/// Tunable knobs for a single `Pipeline::parse` call. See the crate's
/// design documentation for the meaning and default of each field.
#[derive(Clone, Debug)]
pub struct ParseOptions {
    pub verbose: bool,
    pub mipmap_size: u32,
    pub skip_smt: bool,
    pub water: bool,
    pub parse_resources: bool,
    pub resources: Option<Vec<String>>,
    pub parse_skybox: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            mipmap_size: 4,
            skip_smt: false,
            water: true,
            parse_resources: false,
            resources: None,
            parse_skybox: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Map {
    pub file_stem: String,
    pub script_name: String,
    pub min_depth: f32,
    pub max_depth: f32,
    pub metadata: Option<MetadataValue>,
    pub legacy_metadata: Option<metadata::SmdMetadata>,
    pub header: SmfHeader,
    pub height: Raster,
    pub type_layer: Raster,
    pub metal: Raster,
    pub mini: Raster,
    pub texture: Option<Raster>,
    pub resources: Option<BTreeMap<String, Raster>>,
    pub skybox: Option<Raster>,
}

fn derive_script_name(metadata: Option<&MetadataValue>, smf_stem: &str) -> String {
    let Some(meta) = metadata else {
        return smf_stem.to_string();
    };
    let name = meta.get("name").and_then(MetadataValue::as_str);
    let version = meta.get("version").and_then(MetadataValue::as_str);
    match (name, version) {
        (Some(name), Some(version)) if name.contains(version) => name.to_string(),
        (Some(name), Some(version)) => format!("{name} {version}"),
        (Some(name), None) => name.to_string(),
        (None, _) => smf_stem.to_string(),
    }
}

fn decode_resource_bytes(name: &str, bytes: &[u8]) -> Result<Raster> {
    if name.to_ascii_lowercase().ends_with(".dds") {
        let (header, consumed) = dds::parse_header(bytes)?;
        let compression = header.compression()?;
        match compression {
            Compression::Dxt1 => {
                let blocks_x = (header.width + 3) / 4;
                let blocks_y = (header.height + 3) / 4;
                let len = blocks_x as usize * blocks_y as usize * 8;
                let data = &bytes[consumed..consumed + len];
                dxt1::decompress(data, header.width.max(4), header.height.max(4))
            }
            other => Err(Error::UnsupportedDds(format!(
                "resource decode only supports DXT1 dds resources, found {other:?}"
            ))),
        }
    } else {
        let img = image::load_from_memory(bytes)
            .map_err(|e| Error::UnsupportedDds(format!("failed to decode image resource: {e}")))?
            .to_rgba8();
        Ok(Raster::from_rgba_image(img))
    }
}

fn decode_skybox(bytes: &[u8]) -> Result<Option<Raster>> {
    let (header, consumed) = dds::parse_header(bytes)?;
    if !header.is_cubemap() || header.compression()? != Compression::Dxt1 {
        return Ok(None);
    }
    let ranges = dds::cubemap_face_ranges(&header, consumed)?;
    let side = header.width.max(4);
    let mut faces: Vec<Raster> = Vec::with_capacity(6);
    for (offset, len) in ranges {
        let data = &bytes[offset..offset + len];
        faces.push(dxt1::decompress(data, side, side)?);
    }
    let faces: [Raster; 6] = faces.try_into().expect("exactly six faces checked above");
    let panorama = cubemap::to_equirectangular(&faces, side * 4)?;
    Ok(Some(panorama))
}

pub struct Pipeline;

impl Pipeline {
    pub fn parse(path: &Path, options: &ParseOptions) -> Result<Map> {
        if options.verbose {
            trace!("parsing {:?} with options {:?}", path, options);
        } else {
            info!("parsing {:?}", path);
        }

        let extracted = archive::ExtractedArchive::extract(path)?;

        let smf_path = extracted.smf()?;
        let smf_bytes = fs::read(&smf_path).map_err(|e| Error::ArchiveExtractionFailed {
            path: smf_path.clone(),
            source: anyhow::Error::new(e),
        })?;
        let smf_map = smf::parse(&smf_bytes)?;

        let metadata_value = if let Some(mapinfo_path) = extracted.mapinfo() {
            fs::read_to_string(&mapinfo_path)
                .ok()
                .map(|text| metadata::parse_mapinfo(&text))
        } else {
            None
        };
        let legacy_metadata = if metadata_value.is_none() {
            extracted
                .smd()
                .and_then(|p| fs::read_to_string(p).ok())
                .map(|text| metadata::parse_smd(&text))
        } else {
            None
        };

        let mut texture = None;
        if !options.skip_smt {
            let smt_path = extracted.smt()?;
            let smt_bytes = fs::read(&smt_path).map_err(|e| Error::ArchiveExtractionFailed {
                path: smt_path.clone(),
                source: anyhow::Error::new(e),
            })?;
            let smt_header = smt::parse_header(&smt_bytes)?;
            let body = &smt_bytes[smt::HEADER_LEN..];
            let catalog = smt::build_catalog(body, &smt_header, options.mipmap_size);
            let mut mosaic = smt::assemble_mosaic(
                &catalog,
                &smf_map.tile_indices,
                smf_map.header.map_width_units(),
                smf_map.header.map_height_units(),
                options.mipmap_size,
            );

            if options.water && smf_map.header.min_depth < 0.0 {
                water::apply(
                    &mut mosaic,
                    &smf_map.height_values,
                    smf_map.header.map_width as u32 + 1,
                    smf_map.header.map_height as u32 + 1,
                    options.mipmap_size,
                    smf_map.header.min_depth,
                    smf_map.header.max_depth,
                    &water::WaterOptions::default(),
                );
            }
            texture = Some(mosaic);
        }

        let skybox = if options.parse_skybox {
            let mut found = None;
            for resource_path in extracted.resources() {
                if resource_path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("dds"))
                    .unwrap_or(false)
                {
                    if let Ok(bytes) = fs::read(&resource_path) {
                        if let Ok(Some(pano)) = decode_skybox(&bytes) {
                            found = Some(pano);
                            break;
                        }
                    }
                }
            }
            found
        } else {
            None
        };

        let resources = if options.parse_resources {
            let mut map = BTreeMap::new();
            for resource_path in extracted.resources() {
                let name = resource_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if let Some(allow) = &options.resources {
                    if !allow.iter().any(|a| a == &name) {
                        continue;
                    }
                }
                match fs::read(&resource_path)
                    .map_err(anyhow::Error::new)
                    .and_then(|bytes| decode_resource_bytes(&name, &bytes).map_err(anyhow::Error::new))
                {
                    Ok(raster) => {
                        map.insert(name, raster);
                    }
                    Err(e) => warn!("skipping unreadable resource {name:?}: {e}"),
                }
            }
            Some(map)
        } else {
            None
        };

        let smf_stem = smf_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let script_name = derive_script_name(metadata_value.as_ref(), &smf_stem);

        Ok(Map {
            file_stem: smf_stem,
            script_name,
            min_depth: smf_map.header.min_depth,
            max_depth: smf_map.header.max_depth,
            metadata: metadata_value,
            legacy_metadata,
            header: smf_map.header,
            height: smf_map.height_raster,
            type_layer: smf_map.type_raster,
            metal: smf_map.metal_raster,
            mini: smf_map.mini_raster,
            texture,
            resources,
            skybox,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn script_name_prefers_name_containing_version() {
        let mut table = BTreeMap::new();
        table.insert("name".to_string(), MetadataValue::Str("Red Comet 1.3.1".to_string()));
        table.insert("version".to_string(), MetadataValue::Str("1.3.1".to_string()));
        let meta = MetadataValue::Table(table);
        assert_eq!(derive_script_name(Some(&meta), "red_comet"), "Red Comet 1.3.1");
    }

    #[test]
    fn script_name_appends_version_when_not_contained() {
        let mut table = BTreeMap::new();
        table.insert("name".to_string(), MetadataValue::Str("Red Comet".to_string()));
        table.insert("version".to_string(), MetadataValue::Str("1.0".to_string()));
        let meta = MetadataValue::Table(table);
        assert_eq!(derive_script_name(Some(&meta), "red_comet"), "Red Comet 1.0");
    }

    #[test]
    fn script_name_falls_back_to_smf_stem() {
        assert_eq!(derive_script_name(None, "red_comet"), "red_comet");
    }

    fn synth_smf_bytes(map_width: i32, map_height: i32, min_depth: f32) -> Vec<u8> {
        let w = map_width as usize;
        let h = map_height as usize;
        let mut buf = Vec::new();
        buf.extend_from_slice(b"spring map file");
        buf.push(0);
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(&42u32.to_le_bytes());
        buf.extend_from_slice(&map_width.to_le_bytes());
        buf.extend_from_slice(&map_height.to_le_bytes());
        buf.extend_from_slice(&8i32.to_le_bytes());
        buf.extend_from_slice(&8i32.to_le_bytes());
        buf.extend_from_slice(&32i32.to_le_bytes());
        buf.extend_from_slice(&min_depth.to_le_bytes());
        buf.extend_from_slice(&100f32.to_le_bytes());

        let offsets_pos = buf.len();
        buf.extend_from_slice(&[0u8; 4 * 7]);

        let height_off = buf.len() as i32;
        for _ in 0..((w + 1) * (h + 1)) {
            buf.extend_from_slice(&16384u16.to_le_bytes());
        }
        let type_off = buf.len() as i32;
        buf.extend_from_slice(&vec![1u8; (w / 2) * (h / 2)]);
        let metal_off = buf.len() as i32;
        buf.extend_from_slice(&vec![0u8; (w / 2) * (h / 2)]);
        let mini_off = buf.len() as i32;
        buf.extend_from_slice(&vec![0u8; 256 * 256 * 8]);
        let tile_index_off = buf.len() as i32;
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(b"test.smt\0");
        for _ in 0..((w / 4) * (h / 4)) {
            buf.extend_from_slice(&0i32.to_le_bytes());
        }

        buf[offsets_pos..offsets_pos + 4].copy_from_slice(&height_off.to_le_bytes());
        buf[offsets_pos + 4..offsets_pos + 8].copy_from_slice(&type_off.to_le_bytes());
        buf[offsets_pos + 8..offsets_pos + 12].copy_from_slice(&tile_index_off.to_le_bytes());
        buf[offsets_pos + 12..offsets_pos + 16].copy_from_slice(&mini_off.to_le_bytes());
        buf[offsets_pos + 16..offsets_pos + 20].copy_from_slice(&metal_off.to_le_bytes());
        buf[offsets_pos + 20..offsets_pos + 24].copy_from_slice(&0i32.to_le_bytes());
        buf[offsets_pos + 24..offsets_pos + 28].copy_from_slice(&0i32.to_le_bytes());

        buf
    }

    fn synth_smt_bytes(num_tiles: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"spring tilefile");
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

    fn write_sdz(dir: &std::path::Path, name: &str, smf: &[u8], smt: &[u8]) -> std::path::PathBuf {
        use std::io::Write;
        let path = dir.join(name);
        let file = fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file::<_, ()>("map.smf", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(smf).unwrap();
        writer
            .start_file::<_, ()>("map.smt", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(smt).unwrap();
        writer.finish().unwrap();
        path
    }

    // S1: full parse with a texture mosaic produces correctly sized layers.
    #[test]
    fn end_to_end_parse_produces_sized_layers() {
        let _ = env_logger::try_init();
        let dir = tempfile::tempdir().unwrap();
        let smf = synth_smf_bytes(128, 128, 10.0);
        let smt = synth_smt_bytes(1);
        let archive_path = write_sdz(dir.path(), "test.sdz", &smf, &smt);

        let map = Pipeline::parse(
            &archive_path,
            &ParseOptions {
                verbose: true,
                ..ParseOptions::default()
            },
        )
        .unwrap();
        assert_eq!(map.height.width(), 129);
        assert_eq!(map.type_layer.width(), 64);
        assert!(!map.script_name.is_empty());
        let tex = map.texture.unwrap();
        assert_eq!(tex.data().len(), tex.width() as usize * tex.height() as usize * 4);
    }

    // S2: skip_smt avoids touching SMT bytes entirely.
    #[test]
    fn skip_smt_option_omits_texture() {
        let dir = tempfile::tempdir().unwrap();
        let smf = synth_smf_bytes(128, 128, 10.0);
        let smt = synth_smt_bytes(1);
        let archive_path = write_sdz(dir.path(), "test.sdz", &smf, &smt);

        let options = ParseOptions {
            skip_smt: true,
            ..ParseOptions::default()
        };
        let map = Pipeline::parse(&archive_path, &options).unwrap();
        assert!(map.texture.is_none());
    }

    // S5: a truncated SMF fails with InputTruncated.
    #[test]
    fn truncated_smf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let smf = synth_smf_bytes(128, 128, 10.0);
        let truncated = &smf[..100];
        let smt = synth_smt_bytes(1);
        let archive_path = write_sdz(dir.path(), "test.sdz", truncated, &smt);

        let err = Pipeline::parse(&archive_path, &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InputTruncated { .. }));
    }

    #[test]
    fn non_archive_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-an-archive.zip");
        fs::write(&path, b"hello").unwrap();
        let err = Pipeline::parse(&path, &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, Error::NotASpringArchive(_)));
    }
}
