//! Executable disassemblers that locate address-bearing references.
//!
//! Supported executable types:
//! - Windows PE32 (x86): base relocations of type `HIGHLOW`, rel32 branches
//! - Windows PE32+ (x64): base relocations of type `DIR64`, rel32 branches
//!   and RIP-relative operands

pub mod refs;
pub mod rel32_finder;
pub mod traits;
pub mod win32;

use tracing::debug;

use crate::buffer::Offset;
use crate::config::ParseOptions;
use crate::core::exe_type::ExecutableType;
use crate::core::reference::{ReferenceKind, ReferenceReader, ReferenceTypeTraits, ReferenceWriter};

pub use win32::{DisassemblerWin32, DisassemblerWin32X64, DisassemblerWin32X86, ParseState};

/// Common interface over executable-type specific disassemblers.
pub trait Disassembler {
    fn exe_type(&self) -> ExecutableType;

    fn exe_type_string(&self) -> &'static str {
        self.exe_type().as_str()
    }

    /// Number of leading image bytes covered by headers and sections.
    fn size(&self) -> usize;

    fn image(&self) -> &[u8];

    /// Traits of every reference kind this disassembler produces.
    fn reference_traits(&self) -> Vec<ReferenceTypeTraits>;

    /// References of `kind` whose location lies in `[lo, hi)`.
    fn make_reader(
        &self,
        kind: ReferenceKind,
        lo: Offset,
        hi: Offset,
    ) -> Box<dyn ReferenceReader + '_>;

    fn make_writer<'b>(
        &'b self,
        kind: ReferenceKind,
        image: &'b mut [u8],
    ) -> Box<dyn ReferenceWriter + 'b>;
}

impl<T: traits::Win32Traits> Disassembler for DisassemblerWin32<'_, T> {
    fn exe_type(&self) -> ExecutableType {
        DisassemblerWin32::exe_type(self)
    }

    fn size(&self) -> usize {
        DisassemblerWin32::size(self)
    }

    fn image(&self) -> &[u8] {
        DisassemblerWin32::image(self)
    }

    fn reference_traits(&self) -> Vec<ReferenceTypeTraits> {
        Self::reference_traits().to_vec()
    }

    fn make_reader(
        &self,
        kind: ReferenceKind,
        lo: Offset,
        hi: Offset,
    ) -> Box<dyn ReferenceReader + '_> {
        match kind {
            ReferenceKind::Reloc => Box::new(self.make_read_relocs(lo, hi)),
            ReferenceKind::Rel32 => Box::new(self.make_read_rel32(lo, hi)),
        }
    }

    fn make_writer<'b>(
        &'b self,
        kind: ReferenceKind,
        image: &'b mut [u8],
    ) -> Box<dyn ReferenceWriter + 'b> {
        match kind {
            ReferenceKind::Reloc => Box::new(self.make_write_relocs(image)),
            ReferenceKind::Rel32 => Box::new(self.make_write_rel32(image)),
        }
    }
}

/// A disassembler for whichever executable type matched.
#[derive(Debug)]
pub enum AnyDisassembler<'a> {
    Win32X86(DisassemblerWin32X86<'a>),
    Win32X64(DisassemblerWin32X64<'a>),
}

impl Disassembler for AnyDisassembler<'_> {
    fn exe_type(&self) -> ExecutableType {
        match self {
            AnyDisassembler::Win32X86(d) => Disassembler::exe_type(d),
            AnyDisassembler::Win32X64(d) => Disassembler::exe_type(d),
        }
    }

    fn size(&self) -> usize {
        match self {
            AnyDisassembler::Win32X86(d) => Disassembler::size(d),
            AnyDisassembler::Win32X64(d) => Disassembler::size(d),
        }
    }

    fn image(&self) -> &[u8] {
        match self {
            AnyDisassembler::Win32X86(d) => Disassembler::image(d),
            AnyDisassembler::Win32X64(d) => Disassembler::image(d),
        }
    }

    fn reference_traits(&self) -> Vec<ReferenceTypeTraits> {
        match self {
            AnyDisassembler::Win32X86(d) => Disassembler::reference_traits(d),
            AnyDisassembler::Win32X64(d) => Disassembler::reference_traits(d),
        }
    }

    fn make_reader(
        &self,
        kind: ReferenceKind,
        lo: Offset,
        hi: Offset,
    ) -> Box<dyn ReferenceReader + '_> {
        match self {
            AnyDisassembler::Win32X86(d) => d.make_reader(kind, lo, hi),
            AnyDisassembler::Win32X64(d) => d.make_reader(kind, lo, hi),
        }
    }

    fn make_writer<'b>(
        &'b self,
        kind: ReferenceKind,
        image: &'b mut [u8],
    ) -> Box<dyn ReferenceWriter + 'b> {
        match self {
            AnyDisassembler::Win32X86(d) => d.make_writer(kind, image),
            AnyDisassembler::Win32X64(d) => d.make_writer(kind, image),
        }
    }
}

/// Executable type of `image` by header inspection alone.
pub fn detect_exe_type(image: &[u8]) -> Option<ExecutableType> {
    if DisassemblerWin32X86::quick_detect(image) {
        Some(ExecutableType::Win32X86)
    } else if DisassemblerWin32X64::quick_detect(image) {
        Some(ExecutableType::Win32X64)
    } else {
        None
    }
}

/// Tries each supported executable type in turn: x86 first, then x64.
pub fn make_disassembler(image: &[u8]) -> Option<AnyDisassembler<'_>> {
    make_disassembler_with_options(image, &ParseOptions::default())
}

pub fn make_disassembler_with_options<'a>(
    image: &'a [u8],
    options: &ParseOptions,
) -> Option<AnyDisassembler<'a>> {
    let disasm = DisassemblerWin32X86::make_with_options(image, options.clone())
        .map(AnyDisassembler::Win32X86)
        .or_else(|| {
            DisassemblerWin32X64::make_with_options(image, options.clone())
                .map(AnyDisassembler::Win32X64)
        });
    if disasm.is_none() {
        debug!(size = image.len(), "No disassembler matched image");
    }
    disasm
}
