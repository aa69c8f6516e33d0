//! Configuration for image parsing and reference extraction.
//!
//! Every knob has a default matching the behaviour of a stock PE
//! disassembler; callers only need options to tighten limits or switch off
//! individual rel32 heuristics.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Top-level options handed to `make_with_options` / `parse_with_options`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Images larger than this many bytes are rejected. Offsets are 32-bit,
    /// so values above `u32::MAX` are clamped to it.
    pub max_image_size: u64,
    /// Rel32 scanning heuristics.
    pub rel32: Rel32Options,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_image_size: u32::MAX as u64,
            rel32: Rel32Options::default(),
        }
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective size limit in bytes.
    pub fn image_size_limit(&self) -> u64 {
        self.max_image_size.min(u32::MAX as u64)
    }

    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Knobs for the rel32 heuristics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rel32Options {
    /// Conditional branch targets must stay inside the scanned section.
    pub restrict_jcc_to_section: bool,
    /// Recognise x64 RIP-relative memory operands.
    pub rip_relative: bool,
    /// Skip byte ranges covered by relocation targets.
    pub avoid_abs32: bool,
}

impl Default for Rel32Options {
    fn default() -> Self {
        Self {
            restrict_jcc_to_section: true,
            rip_relative: true,
            avoid_abs32: true,
        }
    }
}
