//! Bounded image loading.
//!
//! `ImageFile` memory-maps an executable read-only and enforces a size limit
//! before any byte is parsed. Disassemblers borrow the mapping; writers need
//! an owned copy obtained with [`ImageFile::to_vec`].

pub mod error;

use crate::config::ParseOptions;
use crate::disasm::{make_disassembler_with_options, AnyDisassembler};
use crate::io::error::{IoError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Defines the resource limits for loading images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IOLimits {
    /// The absolute maximum file size that can be opened.
    pub max_file_size: u64,
}

impl Default for IOLimits {
    fn default() -> Self {
        Self {
            max_file_size: 512 * 1024 * 1024, // 512MB
        }
    }
}

/// A read-only, memory-mapped executable image.
pub struct ImageFile {
    path: PathBuf,
    // None when the file size is zero; memmap cannot map empty files.
    mmap: Option<Mmap>,
    file_size: u64,
}

impl ImageFile {
    /// Opens and maps `path`, failing if it exceeds `limits.max_file_size`.
    pub fn open<P: AsRef<Path>>(path: P, limits: &IOLimits) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limits.max_file_size = limits.max_file_size,
            "Opening image"
        );

        if file_size > limits.max_file_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = limits.max_file_size,
                "Image is too large"
            );
            return Err(IoError::FileTooLarge {
                limit: limits.max_file_size,
                found: file_size,
            });
        }

        let mmap = if file_size == 0 {
            None
        } else {
            // Safety: read-only map of a regular file; the mapping is never
            // handed out mutably.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            file_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the total size of the underlying file in bytes.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Owned, mutable copy of the image for reference writers.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Runs executable detection over the mapped bytes.
    pub fn disassemble(
        &self,
        options: &ParseOptions,
    ) -> crate::error::Result<AnyDisassembler<'_>> {
        make_disassembler_with_options(self.as_bytes(), options)
            .ok_or(crate::error::Error::UnsupportedFormat)
    }
}

impl AsRef<[u8]> for ImageFile {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
