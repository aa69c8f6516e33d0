//! Translation between file offsets, RVAs and absolute virtual addresses.
//!
//! The translator is built once from the section table. Each section
//! contributes a [`Unit`] pairing a file-offset range with an RVA range.
//! Lookups walk the units in insertion order and the first unit whose range
//! contains the queried value decides the answer, so overlapping or unsorted
//! sections never cause a crash, only a deterministic choice.

use thiserror::Error;

use crate::buffer::{Offset, Rva};

/// Errors raised while building an [`AddressTranslator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslatorError {
    #[error("Unit {index} overflows the 32-bit offset space")]
    OffsetOverflow { index: usize },

    #[error("Unit {index} overflows the 32-bit RVA space")]
    RvaOverflow { index: usize },
}

pub type Result<T> = std::result::Result<T, TranslatorError>;

/// One contiguous mapping between file bytes and their loaded RVAs.
///
/// `offset_size` may differ from `rva_size`: raw data past the virtual size
/// is not mapped, and RVAs past the raw data (zero-filled tail) are valid
/// RVAs without a backing file offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub offset_begin: Offset,
    pub offset_size: Offset,
    pub rva_begin: Rva,
    pub rva_size: Rva,
}

impl Unit {
    /// Number of leading bytes that have both an offset and an RVA.
    #[inline]
    fn mapped_size(&self) -> u32 {
        self.offset_size.min(self.rva_size)
    }

    #[inline]
    fn covers_offset(&self, offset: Offset) -> bool {
        offset >= self.offset_begin && offset - self.offset_begin < self.mapped_size()
    }

    #[inline]
    fn covers_rva(&self, rva: Rva) -> bool {
        rva >= self.rva_begin && rva - self.rva_begin < self.rva_size
    }
}

/// Bidirectional offset <-> RVA mapping.
#[derive(Debug, Clone, Default)]
pub struct AddressTranslator {
    units: Vec<Unit>,
}

impl AddressTranslator {
    /// Builds a translator, rejecting units whose end does not fit in 32 bits.
    pub fn new(units: Vec<Unit>) -> Result<Self> {
        for (index, unit) in units.iter().enumerate() {
            if unit.offset_begin.checked_add(unit.offset_size).is_none() {
                return Err(TranslatorError::OffsetOverflow { index });
            }
            if unit.rva_begin.checked_add(unit.rva_size).is_none() {
                return Err(TranslatorError::RvaOverflow { index });
            }
        }
        Ok(Self { units })
    }

    /// Converts a file offset to an RVA, or `None` if no unit maps it.
    #[inline]
    pub fn offset_to_rva(&self, offset: Offset) -> Option<Rva> {
        self.units
            .iter()
            .find(|u| u.covers_offset(offset))
            .map(|u| u.rva_begin + (offset - u.offset_begin))
    }

    /// Converts an RVA to a file offset.
    ///
    /// Fails when no unit contains `rva`, and also when the first containing
    /// unit has no file bytes behind it (zero-filled tail).
    #[inline]
    pub fn rva_to_offset(&self, rva: Rva) -> Option<Offset> {
        let unit = self.units.iter().find(|u| u.covers_rva(rva))?;
        let delta = rva - unit.rva_begin;
        (delta < unit.mapped_size()).then(|| unit.offset_begin + delta)
    }

    /// Whether `rva` lies in some unit's RVA range, backed by file data or not.
    #[inline]
    pub fn is_valid_rva(&self, rva: Rva) -> bool {
        self.units.iter().any(|u| u.covers_rva(rva))
    }

    #[inline]
    pub fn is_valid_offset(&self, offset: Offset) -> bool {
        self.units.iter().any(|u| u.covers_offset(offset))
    }
}
