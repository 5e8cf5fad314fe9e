// This file is part of a SpringRTS map archive parser.
//
// Licensed under the GNU General Public License, version 3 or later.

//! Archive extraction: the external-collaborator boundary. Given an
//! `.sd7`/`.sdz` path, this produces a scoped temp directory of extracted
//! member files. This is intentionally thin — a boundary, not where the
//! engineering value of this crate lives.

use glob::glob;
use log::{trace, warn};
use springmap_error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct ExtractedArchive {
    dir: TempDir,
}

impl ExtractedArchive {
    /// Extract `path` (must end in `.sd7` or `.sdz`, case-insensitive) into
    /// a freshly created temp directory scoped to the returned value.
    pub fn extract(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let dir = TempDir::new().map_err(|e| Error::ArchiveExtractionFailed {
            path: path.to_path_buf(),
            source: anyhow::Error::new(e),
        })?;

        match ext.as_deref() {
            Some("sd7") => extract_7z(path, dir.path())?,
            Some("sdz") => extract_zip(path, dir.path())?,
            _ => return Err(Error::NotASpringArchive(path.to_path_buf())),
        }

        trace!("extracted {:?} into {:?}", path, dir.path());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Glob relative to the extracted root, case-sensitively matching the
    /// pattern as given.
    pub fn find(&self, pattern: &str) -> Vec<PathBuf> {
        let full_pattern = self.dir.path().join(pattern);
        let full_pattern = full_pattern.to_string_lossy().into_owned();
        match glob(&full_pattern) {
            Ok(paths) => paths.filter_map(|p| p.ok()).collect(),
            Err(e) => {
                warn!("bad glob pattern {full_pattern:?}: {e}");
                Vec::new()
            }
        }
    }

    /// Case-insensitive search by extension across the whole extracted
    /// tree (members inside archives are not reliably lower-cased).
    fn find_by_ext(&self, ext: &str) -> Vec<PathBuf> {
        let mut out = Vec::new();
        visit_files(self.dir.path(), &mut |p| {
            if p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(ext))
                .unwrap_or(false)
            {
                out.push(p.to_path_buf());
            }
        });
        out
    }

    pub fn smf(&self) -> Result<PathBuf> {
        self.find_by_ext("smf").into_iter().next().ok_or(Error::MissingSmf)
    }

    pub fn smt(&self) -> Result<PathBuf> {
        self.find_by_ext("smt").into_iter().next().ok_or(Error::MissingSmt)
    }

    pub fn smd(&self) -> Option<PathBuf> {
        self.find_by_ext("smd").into_iter().next()
    }

    pub fn mapinfo(&self) -> Option<PathBuf> {
        let mut out = Vec::new();
        visit_files(self.dir.path(), &mut |p| {
            if p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.eq_ignore_ascii_case("mapinfo.lua"))
                .unwrap_or(false)
            {
                out.push(p.to_path_buf());
            }
        });
        out.into_iter().next()
    }

    /// DDS/PNG/JPG/JPEG/TGA resource files anywhere under the extracted
    /// tree, not only the conventional `maps/` subdirectory (real archives
    /// place them inconsistently).
    pub fn resources(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        const RESOURCE_EXTS: [&str; 5] = ["dds", "png", "jpg", "jpeg", "tga"];
        visit_files(self.dir.path(), &mut |p| {
            if let Some(ext) = p.extension().and_then(|e| e.to_str()) {
                if RESOURCE_EXTS.iter().any(|e| ext.eq_ignore_ascii_case(e)) {
                    out.push(p.to_path_buf());
                }
            }
        });
        out
    }
}

fn visit_files(dir: &Path, f: &mut dyn FnMut(&Path)) {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            visit_files(&path, f);
        } else {
            f(&path);
        }
    }
}

fn extract_7z(path: &Path, dest: &Path) -> Result<()> {
    sevenz_rust::decompress_file(path, dest).map_err(|e| Error::ArchiveExtractionFailed {
        path: path.to_path_buf(),
        source: anyhow::anyhow!("{e}"),
    })
}

fn extract_zip(path: &Path, dest: &Path) -> Result<()> {
    let to_err = |e: anyhow::Error| Error::ArchiveExtractionFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let file = fs::File::open(path).map_err(|e| to_err(e.into()))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| to_err(e.into()))?;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| to_err(e.into()))?;
        let out_path = match entry.enclosed_name() {
            Some(n) => dest.join(n),
            None => continue,
        };
        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| to_err(e.into()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| to_err(e.into()))?;
        }
        let mut out_file = fs::File::create(&out_path).map_err(|e| to_err(e.into()))?;
        io::copy(&mut entry, &mut out_file).map_err(|e| to_err(e.into()))?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn non_archive_suffix_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_an_archive.txt");
        fs::write(&path, b"hello").unwrap();
        let err = ExtractedArchive::extract(&path).unwrap_err();
        assert!(matches!(err, Error::NotASpringArchive(_)));
    }

    #[test]
    fn extracts_sdz_zip_members() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("test.sdz");
        {
            let file = fs::File::create(&zip_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            writer
                .start_file::<_, ()>("map.smf", zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(b"fake smf bytes").unwrap();
            writer
                .start_file::<_, ()>("mapinfo.lua", zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(b"return {}").unwrap();
            writer.finish().unwrap();
        }
        let extracted = ExtractedArchive::extract(&zip_path).unwrap();
        assert!(extracted.smf().is_ok());
        assert!(extracted.mapinfo().is_some());
    }
}
