//! Per-width constants for Win32 disassemblers.

use std::fmt;

use crate::buffer::{ReadExt, WriteExt};
use crate::core::exe_type::ExecutableType;
use crate::disasm::rel32_finder::{Rel32Finder, Rel32FinderX64, Rel32FinderX86};
use crate::formats::pe::{
    IMAGE_REL_BASED_DIR64, IMAGE_REL_BASED_HIGHLOW, PE32PLUS_MAGIC, PE32_MAGIC,
};

/// Integer type of an absolute address stored in the image.
pub trait AddressWord: Copy + Eq + Ord + fmt::Debug + Into<u64> + 'static {
    /// Size in bytes of the encoded address
    const WIDTH: usize;
    /// Low `WIDTH * 8` bits set
    const MASK: u64;

    fn read_le(data: &[u8], offset: usize) -> Option<Self>;

    /// Writes `self` at `offset`; `None` if the field does not fit.
    fn write_le(self, data: &mut [u8], offset: usize) -> Option<()>;

    /// Keeps the low `WIDTH` bytes of `value`.
    fn truncate_from(value: u64) -> Self;
}

impl AddressWord for u32 {
    const WIDTH: usize = 4;
    const MASK: u64 = u32::MAX as u64;

    #[inline]
    fn read_le(data: &[u8], offset: usize) -> Option<Self> {
        data.read_u32_le_at(offset)
    }

    #[inline]
    fn write_le(self, data: &mut [u8], offset: usize) -> Option<()> {
        data.write_u32_le_at(offset, self)
    }

    #[inline]
    fn truncate_from(value: u64) -> Self {
        value as u32
    }
}

impl AddressWord for u64 {
    const WIDTH: usize = 8;
    const MASK: u64 = u64::MAX;

    #[inline]
    fn read_le(data: &[u8], offset: usize) -> Option<Self> {
        data.read_u64_le_at(offset)
    }

    #[inline]
    fn write_le(self, data: &mut [u8], offset: usize) -> Option<()> {
        data.write_u64_le_at(offset, self)
    }

    #[inline]
    fn truncate_from(value: u64) -> Self {
        value
    }
}

/// Format constants selecting between PE32/x86 and PE32+/x64.
pub trait Win32Traits: 'static {
    const EXE_TYPE: ExecutableType;
    /// Optional header magic
    const MAGIC: u16;
    /// Base relocation type that patches a full-width address
    const RELOC_TYPE: u16;
    /// Width in bytes of an absolute address
    const VA_WIDTH: usize = <Self::Address as AddressWord>::WIDTH;

    type Address: AddressWord;
    type RelFinder: Rel32Finder;
}

#[derive(Debug, Clone, Copy)]
pub struct Win32X86Traits;

impl Win32Traits for Win32X86Traits {
    const EXE_TYPE: ExecutableType = ExecutableType::Win32X86;
    const MAGIC: u16 = PE32_MAGIC;
    const RELOC_TYPE: u16 = IMAGE_REL_BASED_HIGHLOW;

    type Address = u32;
    type RelFinder = Rel32FinderX86;
}

#[derive(Debug, Clone, Copy)]
pub struct Win32X64Traits;

impl Win32Traits for Win32X64Traits {
    const EXE_TYPE: ExecutableType = ExecutableType::Win32X64;
    const MAGIC: u16 = PE32PLUS_MAGIC;
    const RELOC_TYPE: u16 = IMAGE_REL_BASED_DIR64;

    type Address = u64;
    type RelFinder = Rel32FinderX64;
}
