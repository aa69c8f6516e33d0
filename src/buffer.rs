//! Bounds-checked views over image bytes.
//!
//! Every read and write the disassembler performs goes through these helpers,
//! so adversarial headers can only ever produce `None`, never a panic or an
//! out-of-bounds access.

/// File offset into an image. Images are limited to 32-bit offsets.
pub type Offset = u32;

/// Relative virtual address.
pub type Rva = u32;

/// Extension trait for reading little-endian primitives from byte slices
pub trait ReadExt {
    fn read_u16_le_at(&self, offset: usize) -> Option<u16>;
    fn read_u32_le_at(&self, offset: usize) -> Option<u32>;
    fn read_u64_le_at(&self, offset: usize) -> Option<u64>;
    fn read_slice_at(&self, offset: usize, len: usize) -> Option<&[u8]>;
}

impl ReadExt for [u8] {
    #[inline(always)]
    fn read_u16_le_at(&self, offset: usize) -> Option<u16> {
        self.get(offset..offset.checked_add(2)?)
            .and_then(|b| b.try_into().ok())
            .map(u16::from_le_bytes)
    }

    #[inline(always)]
    fn read_u32_le_at(&self, offset: usize) -> Option<u32> {
        self.get(offset..offset.checked_add(4)?)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
    }

    #[inline(always)]
    fn read_u64_le_at(&self, offset: usize) -> Option<u64> {
        self.get(offset..offset.checked_add(8)?)
            .and_then(|b| b.try_into().ok())
            .map(u64::from_le_bytes)
    }

    #[inline(always)]
    fn read_slice_at(&self, offset: usize, len: usize) -> Option<&[u8]> {
        self.get(offset..offset.checked_add(len)?)
    }
}

/// Extension trait for writing little-endian primitives into byte slices.
///
/// Writes return `None` and leave the buffer untouched when the field does
/// not fit.
pub trait WriteExt {
    fn write_u32_le_at(&mut self, offset: usize, value: u32) -> Option<()>;
    fn write_u64_le_at(&mut self, offset: usize, value: u64) -> Option<()>;
}

impl WriteExt for [u8] {
    #[inline(always)]
    fn write_u32_le_at(&mut self, offset: usize, value: u32) -> Option<()> {
        self.get_mut(offset..offset.checked_add(4)?)?
            .copy_from_slice(&value.to_le_bytes());
        Some(())
    }

    #[inline(always)]
    fn write_u64_le_at(&mut self, offset: usize, value: u64) -> Option<()> {
        self.get_mut(offset..offset.checked_add(8)?)?
            .copy_from_slice(&value.to_le_bytes());
        Some(())
    }
}

/// A half-open byte range `[offset, offset + size)` within an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferRegion {
    pub offset: usize,
    pub size: usize,
}

impl BufferRegion {
    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// Exclusive end, or `None` if it overflows.
    #[inline]
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.size)
    }

    /// Whether the whole region lies inside a buffer of `len` bytes.
    #[inline]
    pub fn fits_in(&self, len: usize) -> bool {
        self.end().is_some_and(|end| end <= len)
    }

    /// The slice of `data` covered by this region.
    pub fn slice<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        data.read_slice_at(self.offset, self.size)
    }
}

/// Check if a range is within bounds
#[inline(always)]
pub fn check_bounds(offset: usize, size: usize, data_len: usize) -> bool {
    BufferRegion::new(offset, size).fits_in(data_len)
}
