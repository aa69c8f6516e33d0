//! Reference readers and writers for Win32 images.
//!
//! Readers borrow the location tables owned by a disassembler and decode each
//! field on the fly. Writers re-encode targets into a separate, mutable copy
//! of the image and must be fed locations in the order a reader produced
//! them.

use std::marker::PhantomData;
use std::slice;

use tracing::trace;

use crate::buffer::{Offset, ReadExt, Rva, WriteExt};
use crate::core::address_translator::AddressTranslator;
use crate::core::reference::{Reference, ReferenceWriter};
use crate::disasm::traits::{AddressWord, Win32Traits};

/// Size of a rel32 displacement field.
pub const REL32_WIDTH: usize = 4;

/// RVA <-> VA conversion for one image, in the address width `W`.
///
/// Both directions wrap modulo `2^(8 * W::WIDTH)`, so an image whose base
/// sits near the top of the address space maps its high RVAs to low
/// addresses and back.
#[derive(Debug, Clone, Copy)]
pub struct AddressMap<'a, W: AddressWord> {
    translator: &'a AddressTranslator,
    image_base: u64,
    _word: PhantomData<W>,
}

impl<'a, W: AddressWord> AddressMap<'a, W> {
    pub fn new(translator: &'a AddressTranslator, image_base: u64) -> Self {
        Self {
            translator,
            image_base: image_base & W::MASK,
            _word: PhantomData,
        }
    }

    pub fn translator(&self) -> &'a AddressTranslator {
        self.translator
    }

    /// RVA of an absolute address; `None` if the address does not fit in `W`
    /// or lies more than 4GB above the image base.
    #[inline]
    pub fn address_to_rva(&self, address: u64) -> Option<Rva> {
        if address & !W::MASK != 0 {
            return None;
        }
        let rva = address.wrapping_sub(self.image_base) & W::MASK;
        Rva::try_from(rva).ok()
    }

    #[inline]
    pub fn rva_to_address(&self, rva: Rva) -> u64 {
        self.image_base.wrapping_add(rva as u64) & W::MASK
    }

    /// Target RVA of a rel32 field at `location` holding `disp`.
    #[inline]
    pub fn rel32_target_rva(&self, location: Offset, disp: i32) -> Option<Rva> {
        let field_rva = self.translator.offset_to_rva(location)?;
        let target = field_rva as i64 + REL32_WIDTH as i64 + disp as i64;
        Rva::try_from(target).ok()
    }
}

/// Yields relocation references over a sorted slice of field locations.
pub struct RelocReaderWin32<'a, T: Win32Traits> {
    image: &'a [u8],
    map: AddressMap<'a, T::Address>,
    locations: slice::Iter<'a, Offset>,
    _traits: PhantomData<T>,
}

impl<'a, T: Win32Traits> RelocReaderWin32<'a, T> {
    pub fn new(
        image: &'a [u8],
        map: AddressMap<'a, T::Address>,
        locations: &'a [Offset],
    ) -> Self {
        Self {
            image,
            map,
            locations: locations.iter(),
            _traits: PhantomData,
        }
    }
}

impl<T: Win32Traits> Iterator for RelocReaderWin32<'_, T> {
    type Item = Reference;

    fn next(&mut self) -> Option<Reference> {
        for &location in self.locations.by_ref() {
            let Some(address) = T::Address::read_le(self.image, location as usize) else {
                continue;
            };
            let target: u64 = address.into();
            match self.map.address_to_rva(target) {
                Some(rva) if self.map.translator().is_valid_rva(rva) => {
                    return Some(Reference::new(location, target));
                }
                _ => trace!(location, target, "Skipping reloc with untranslatable target"),
            }
        }
        None
    }
}

/// Yields rel32 references over a sorted slice of displacement locations.
pub struct Rel32ReaderWin32<'a, T: Win32Traits> {
    image: &'a [u8],
    map: AddressMap<'a, T::Address>,
    locations: slice::Iter<'a, Offset>,
}

impl<'a, T: Win32Traits> Rel32ReaderWin32<'a, T> {
    pub fn new(
        image: &'a [u8],
        map: AddressMap<'a, T::Address>,
        locations: &'a [Offset],
    ) -> Self {
        Self {
            image,
            map,
            locations: locations.iter(),
        }
    }
}

impl<T: Win32Traits> Iterator for Rel32ReaderWin32<'_, T> {
    type Item = Reference;

    fn next(&mut self) -> Option<Reference> {
        for &location in self.locations.by_ref() {
            let Some(disp) = self.image.read_u32_le_at(location as usize) else {
                continue;
            };
            match self.map.rel32_target_rva(location, disp as i32) {
                Some(rva) if self.map.translator().is_valid_rva(rva) => {
                    return Some(Reference::new(location, self.map.rva_to_address(rva)));
                }
                _ => trace!(location, "Skipping rel32 with untranslatable target"),
            }
        }
        None
    }
}

#[inline]
fn check_order(last: &mut Option<Offset>, location: Offset) {
    debug_assert!(
        last.map_or(true, |prev| location > prev),
        "references must be written in ascending location order ({location:#x} after {last:#x?})"
    );
    *last = Some(location);
}

/// Re-encodes absolute addresses into relocation fields.
pub struct RelocWriterWin32<'a, T: Win32Traits> {
    image: &'a mut [u8],
    last: Option<Offset>,
    _traits: PhantomData<T>,
}

impl<'a, T: Win32Traits> RelocWriterWin32<'a, T> {
    pub fn new(image: &'a mut [u8]) -> Self {
        Self {
            image,
            last: None,
            _traits: PhantomData,
        }
    }
}

impl<T: Win32Traits> ReferenceWriter for RelocWriterWin32<'_, T> {
    fn put_next(&mut self, reference: Reference) {
        check_order(&mut self.last, reference.location);
        let written = T::Address::truncate_from(reference.target)
            .write_le(self.image, reference.location as usize);
        debug_assert!(written.is_some(), "reloc field out of bounds: {reference:?}");
    }
}

/// Re-encodes absolute targets into rel32 displacement fields.
pub struct Rel32WriterWin32<'a, T: Win32Traits> {
    image: &'a mut [u8],
    map: AddressMap<'a, T::Address>,
    last: Option<Offset>,
}

impl<'a, T: Win32Traits> Rel32WriterWin32<'a, T> {
    pub fn new(image: &'a mut [u8], map: AddressMap<'a, T::Address>) -> Self {
        Self {
            image,
            map,
            last: None,
        }
    }
}

impl<T: Win32Traits> ReferenceWriter for Rel32WriterWin32<'_, T> {
    fn put_next(&mut self, reference: Reference) {
        check_order(&mut self.last, reference.location);
        let field_rva = self.map.translator().offset_to_rva(reference.location);
        let target_rva = self.map.address_to_rva(reference.target);
        debug_assert!(
            field_rva.is_some() && target_rva.is_some(),
            "rel32 reference cannot be translated: {reference:?}"
        );
        let (Some(field_rva), Some(target_rva)) = (field_rva, target_rva) else {
            return;
        };
        let disp = target_rva as i64 - (field_rva as i64 + REL32_WIDTH as i64);
        let written = self
            .image
            .write_u32_le_at(reference.location as usize, disp as i32 as u32);
        debug_assert!(written.is_some(), "rel32 field out of bounds: {reference:?}");
    }
}
