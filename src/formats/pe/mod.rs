//! Windows Portable Executable format support
//!
//! Only the structures needed to locate code and relocations are parsed:
//! DOS and NT headers, data directories, the section table, and base
//! relocation blocks.

pub mod headers;
pub mod reloc;
pub mod sections;
pub mod types;

pub use types::*;
