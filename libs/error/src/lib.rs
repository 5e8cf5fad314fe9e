// This file is part of a SpringRTS map archive parser.
//
// Licensed under the GNU General Public License, version 3 or later.

//! The one error currency shared by every crate in this workspace. No
//! stringly-typed error escapes a public function; everything terminates
//! here or is recovered locally (see `TileDecodeFailed`/`MetadataParseFailed`,
//! which are constructed for logging purposes but never returned).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not a spring archive (expected .sd7 or .sdz): {0}")]
    NotASpringArchive(PathBuf),

    #[error("failed to extract archive {path}: {source}")]
    ArchiveExtractionFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("archive is missing an .smf file")]
    MissingSmf,

    #[error("archive is missing an .smt file")]
    MissingSmt,

    #[error("not a spring map file (bad magic)")]
    NotASpringMap,

    #[error("input truncated at offset {offset}: need {needed} more bytes, have {available}")]
    InputTruncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("declared offset {offset} is outside a buffer of length {len}")]
    BadOffset { offset: usize, len: usize },

    #[error("unsupported dds content: {0}")]
    UnsupportedDds(String),

    /// Recovered locally in the SMT mosaic builder; never returned to a
    /// caller, only logged at `warn`.
    #[error("failed to decode tile {index}: {reason}")]
    TileDecodeFailed { index: usize, reason: String },

    /// Recovered locally in the metadata decoders; never returned to a
    /// caller, only logged at `warn`.
    #[error("failed to parse metadata: {0}")]
    MetadataParseFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
