//! Reference extraction from Windows PE executables.
//!
//! Given a raw image, `pexref` confirms that it is a PE32 or PE32+ file,
//! then locates every byte range that encodes an address: base-relocation
//! targets and rel32 displacements in code. Each kind is exposed through an
//! ordered reader, and a matching writer re-encodes updated targets into a
//! copy of the image.
//!
//! ```no_run
//! use pexref::disasm::{make_disassembler, Disassembler};
//! use pexref::core::reference::ReferenceKind;
//!
//! let bytes = std::fs::read("app.exe").unwrap();
//! if let Some(disasm) = make_disassembler(&bytes) {
//!     for r in disasm.make_reader(ReferenceKind::Rel32, 0, u32::MAX) {
//!         println!("{:#x} -> {:#x}", r.location, r.target);
//!     }
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod core;
pub mod disasm;
pub mod error;
pub mod formats;
pub mod io;
pub mod logging;

pub use crate::config::{ParseOptions, Rel32Options};
pub use crate::core::exe_type::ExecutableType;
pub use crate::core::reference::{Reference, ReferenceKind, ReferenceReader, ReferenceWriter};
pub use crate::disasm::{make_disassembler, AnyDisassembler, Disassembler, ParseState};
pub use crate::error::{Error, Result};
