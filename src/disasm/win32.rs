//! Disassembler for Windows PE images.
//!
//! Headers and the section table are parsed eagerly. Relocation and rel32
//! locations are computed on first use and cached for the lifetime of the
//! disassembler; readers and writers borrow those tables.

use std::cell::OnceCell;
use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, trace, warn};

use crate::buffer::{BufferRegion, Offset, ReadExt, Rva};
use crate::config::ParseOptions;
use crate::core::address_translator::AddressTranslator;
use crate::core::exe_type::ExecutableType;
use crate::core::reference::{
    ReferenceGroup, ReferenceKind, ReferenceReader, ReferenceTypeTraits, ReferenceWriter,
};
use crate::disasm::refs::{
    AddressMap, Rel32ReaderWin32, Rel32WriterWin32, RelocReaderWin32, RelocWriterWin32,
    REL32_WIDTH,
};
use crate::disasm::rel32_finder::{Abs32GapFinder, Rel32Finder, Rel32Scanner};
use crate::disasm::traits::{Win32Traits, Win32X64Traits, Win32X86Traits};
use crate::formats::pe::headers::{parse_dos_header, parse_nt_headers, probe_optional_magic};
use crate::formats::pe::reloc::{parse_reloc_blocks, RelocBlock};
use crate::formats::pe::sections::{parse_section_headers, validate_sections};
use crate::formats::pe::{
    DataDirectory, PeError, Result, SectionHeader, IMAGE_DIRECTORY_ENTRY_BASERELOC,
    SECTION_HEADER_SIZE,
};

/// Progress of a lazily parsed reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseState {
    NotParsed,
    /// The whole table was read
    Parsed,
    /// Malformed input stopped parsing early; the locations found before
    /// that point are kept
    ParsedPartial,
}

#[derive(Debug, Default)]
struct RelocTable {
    blocks: Vec<RelocBlock>,
    locations: Vec<Offset>,
    partial: bool,
}

#[derive(Debug, Default)]
struct Rel32Table {
    locations: Vec<Offset>,
}

/// Extracts reloc and rel32 references from a PE image of width `T`.
pub struct DisassemblerWin32<'a, T: Win32Traits> {
    image: &'a [u8],
    options: ParseOptions,
    sections: Vec<SectionHeader>,
    image_base: u64,
    base_relocation_table: Option<DataDirectory>,
    translator: AddressTranslator,
    relocs: OnceCell<RelocTable>,
    rel32: OnceCell<Rel32Table>,
    _traits: PhantomData<T>,
}

pub type DisassemblerWin32X86<'a> = DisassemblerWin32<'a, Win32X86Traits>;
pub type DisassemblerWin32X64<'a> = DisassemblerWin32<'a, Win32X64Traits>;

impl<'a, T: Win32Traits> DisassemblerWin32<'a, T> {
    /// Cheap header check: DOS and PE signatures present and the optional
    /// header magic matches `T`.
    pub fn quick_detect(image: &[u8]) -> bool {
        probe_optional_magic(image) == Some(T::MAGIC)
    }

    /// Detects and parses `image`, or `None` if it is not a PE of width `T`.
    pub fn make(image: &'a [u8]) -> Option<Self> {
        Self::make_with_options(image, ParseOptions::default())
    }

    pub fn make_with_options(image: &'a [u8], options: ParseOptions) -> Option<Self> {
        if !Self::quick_detect(image) {
            trace!(exe_type = %T::EXE_TYPE, "Quick detection failed");
            return None;
        }
        match Self::parse_with_options(image, options) {
            Ok(disasm) => Some(disasm),
            Err(e) => {
                debug!(exe_type = %T::EXE_TYPE, error = %e, "Rejected image");
                None
            }
        }
    }

    pub fn parse(image: &'a [u8]) -> Result<Self> {
        Self::parse_with_options(image, ParseOptions::default())
    }

    /// Reads the headers and the section table and builds the address
    /// translator. The image is truncated to the bytes headers and sections
    /// claim.
    pub fn parse_with_options(image: &'a [u8], options: ParseOptions) -> Result<Self> {
        let limit = options.image_size_limit();
        if image.len() as u64 > limit {
            return Err(PeError::ImageTooLarge {
                size: image.len(),
                limit,
            });
        }

        let dos = parse_dos_header(image)?;
        let nt = parse_nt_headers(image, dos.e_lfanew as usize)?;
        if nt.optional_header.magic != T::MAGIC {
            return Err(PeError::InvalidMagic(nt.optional_header.magic));
        }

        let section_count = nt.file_header.number_of_sections;
        let sections = parse_section_headers(image, nt.section_table_offset, section_count)?;
        let (units, section_bound) =
            validate_sections(&sections, image.len(), nt.optional_header.size_of_image)?;
        let translator = AddressTranslator::new(units)?;

        let headers_end = nt.section_table_offset + section_count as usize * SECTION_HEADER_SIZE;
        let size = headers_end.max(section_bound);
        let image = image.get(..size).unwrap_or(image);

        if !sections.iter().any(SectionHeader::is_code) {
            debug!(exe_type = %T::EXE_TYPE, "Image has no code section");
        }

        let base_relocation_table = nt
            .data_directory(IMAGE_DIRECTORY_ENTRY_BASERELOC)
            .filter(|dir| dir.is_present())
            .copied();

        debug!(
            exe_type = %T::EXE_TYPE,
            image_base = nt.optional_header.image_base,
            sections = sections.len(),
            size,
            has_relocs = base_relocation_table.is_some(),
            "Parsed PE headers"
        );

        Ok(Self {
            image,
            options,
            sections,
            image_base: nt.optional_header.image_base,
            base_relocation_table,
            translator,
            relocs: OnceCell::new(),
            rel32: OnceCell::new(),
            _traits: PhantomData,
        })
    }

    pub fn exe_type(&self) -> ExecutableType {
        T::EXE_TYPE
    }

    pub fn exe_type_string(&self) -> &'static str {
        T::EXE_TYPE.as_str()
    }

    /// The image, truncated to the bytes claimed by headers and sections.
    pub fn image(&self) -> &'a [u8] {
        self.image
    }

    pub fn size(&self) -> usize {
        self.image.len()
    }

    pub fn sections(&self) -> &[SectionHeader] {
        &self.sections
    }

    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    pub fn translator(&self) -> &AddressTranslator {
        &self.translator
    }

    fn address_map(&self) -> AddressMap<'_, T::Address> {
        AddressMap::new(&self.translator, self.image_base)
    }

    pub fn address_to_rva(&self, address: u64) -> Option<Rva> {
        self.address_map().address_to_rva(address)
    }

    pub fn rva_to_address(&self, rva: Rva) -> u64 {
        self.address_map().rva_to_address(rva)
    }

    pub fn reference_traits() -> [ReferenceTypeTraits; ReferenceKind::COUNT] {
        [
            ReferenceTypeTraits {
                width: T::VA_WIDTH as u32,
                kind: ReferenceKind::Reloc,
            },
            ReferenceTypeTraits {
                width: REL32_WIDTH as u32,
                kind: ReferenceKind::Rel32,
            },
        ]
    }

    /// One group per reference kind, in `ReferenceKind` order.
    pub fn make_reference_groups(&self) -> Vec<ReferenceGroup<Self>> {
        let [reloc, rel32] = Self::reference_traits();
        vec![
            ReferenceGroup::new(reloc, Self::boxed_read_relocs, Self::boxed_write_relocs),
            ReferenceGroup::new(rel32, Self::boxed_read_rel32, Self::boxed_write_rel32),
        ]
    }

    /// Relocation references with location in `[lo, hi)`, ascending.
    pub fn make_read_relocs(&self, lo: Offset, hi: Offset) -> RelocReaderWin32<'_, T> {
        let locations = select_range(&self.reloc_table().locations, lo, hi);
        RelocReaderWin32::new(self.image, self.address_map(), locations)
    }

    /// Rel32 references with location in `[lo, hi)`, ascending.
    pub fn make_read_rel32(&self, lo: Offset, hi: Offset) -> Rel32ReaderWin32<'_, T> {
        let locations = select_range(&self.rel32_table().locations, lo, hi);
        Rel32ReaderWin32::new(self.image, self.address_map(), locations)
    }

    pub fn make_write_relocs<'b>(&self, image: &'b mut [u8]) -> RelocWriterWin32<'b, T> {
        RelocWriterWin32::new(image)
    }

    pub fn make_write_rel32<'b>(&'b self, image: &'b mut [u8]) -> Rel32WriterWin32<'b, T> {
        Rel32WriterWin32::new(image, self.address_map())
    }

    pub fn reloc_state(&self) -> ParseState {
        match self.relocs.get() {
            None => ParseState::NotParsed,
            Some(table) if table.partial => ParseState::ParsedPartial,
            Some(_) => ParseState::Parsed,
        }
    }

    pub fn rel32_state(&self) -> ParseState {
        match self.rel32.get() {
            None => ParseState::NotParsed,
            Some(_) => ParseState::Parsed,
        }
    }

    /// Parsed relocation blocks, entries of every type included.
    pub fn reloc_blocks(&self) -> &[RelocBlock] {
        &self.reloc_table().blocks
    }

    /// File offsets of relocation fields of type `T::RELOC_TYPE`, sorted.
    pub fn reloc_locations(&self) -> &[Offset] {
        &self.reloc_table().locations
    }

    /// File offsets of accepted rel32 displacements, sorted.
    pub fn rel32_locations(&self) -> &[Offset] {
        &self.rel32_table().locations
    }

    fn boxed_read_relocs<'b>(&'b self, lo: Offset, hi: Offset) -> Box<dyn ReferenceReader + 'b> {
        Box::new(self.make_read_relocs(lo, hi))
    }

    fn boxed_read_rel32<'b>(&'b self, lo: Offset, hi: Offset) -> Box<dyn ReferenceReader + 'b> {
        Box::new(self.make_read_rel32(lo, hi))
    }

    fn boxed_write_relocs<'b>(&'b self, image: &'b mut [u8]) -> Box<dyn ReferenceWriter + 'b> {
        Box::new(self.make_write_relocs(image))
    }

    fn boxed_write_rel32<'b>(&'b self, image: &'b mut [u8]) -> Box<dyn ReferenceWriter + 'b> {
        Box::new(self.make_write_rel32(image))
    }

    fn reloc_table(&self) -> &RelocTable {
        self.relocs.get_or_init(|| self.parse_and_store_relocs())
    }

    fn rel32_table(&self) -> &Rel32Table {
        self.rel32.get_or_init(|| self.parse_and_store_rel32())
    }

    fn parse_and_store_relocs(&self) -> RelocTable {
        let _span = crate::span_trace!("parse_relocs", exe_type = %T::EXE_TYPE).entered();
        let Some(dir) = self.base_relocation_table else {
            debug!("No base relocation directory");
            return RelocTable::default();
        };
        let Some(offset) = self.translator.rva_to_offset(dir.virtual_address) else {
            warn!(
                rva = dir.virtual_address,
                "Base relocation directory has no file offset"
            );
            return RelocTable {
                partial: true,
                ..RelocTable::default()
            };
        };

        let region = BufferRegion::new(offset as usize, dir.size as usize);
        let parsed = parse_reloc_blocks(self.image, region);
        let mut locations: Vec<Offset> = parsed
            .blocks
            .iter()
            .flat_map(|block| {
                block
                    .entries
                    .iter()
                    .filter(|entry| entry.kind == T::RELOC_TYPE)
                    .filter_map(move |entry| block.target_rva(entry))
            })
            .filter_map(|rva| self.translator.rva_to_offset(rva))
            .filter(|&location| {
                self.image
                    .read_slice_at(location as usize, T::VA_WIDTH)
                    .is_some()
            })
            .collect();
        locations.sort_unstable();
        locations.dedup();

        debug!(
            blocks = parsed.blocks.len(),
            count = locations.len(),
            complete = parsed.complete,
            "Parsed relocations"
        );
        RelocTable {
            blocks: parsed.blocks,
            locations,
            partial: !parsed.complete,
        }
    }

    fn parse_and_store_rel32(&self) -> Rel32Table {
        let _span = crate::span_trace!("parse_rel32", exe_type = %T::EXE_TYPE).entered();
        let rel32_options = &self.options.rel32;
        let abs32_locations: &[Offset] = if rel32_options.avoid_abs32 {
            &self.reloc_table().locations
        } else {
            &[]
        };
        let finder = T::RelFinder::with_options(rel32_options);
        let map = self.address_map();
        let mut locations = Vec::new();

        for section in self.sections.iter().filter(|s| s.is_code()) {
            let region = BufferRegion::new(
                section.pointer_to_raw_data as usize,
                section.virtual_size.min(section.size_of_raw_data) as usize,
            );
            let before = locations.len();
            for gap in Abs32GapFinder::new(region, abs32_locations, T::VA_WIDTH) {
                let mut scanner = Rel32Scanner::new(self.image, &finder, gap);
                while let Some(candidate) = scanner.find_next() {
                    let location = candidate.location as Offset;
                    let disp = self
                        .image
                        .read_u32_le_at(candidate.location)
                        .unwrap_or_default() as i32;
                    let target = map.rel32_target_rva(location, disp);
                    let unrestricted = candidate.can_point_outside_section
                        || !rel32_options.restrict_jcc_to_section;
                    let accepted = target.is_some_and(|rva| {
                        if unrestricted {
                            self.translator.is_valid_rva(rva)
                        } else {
                            section.contains_rva(rva)
                        }
                    });
                    if accepted {
                        locations.push(location);
                        scanner.accept();
                    } else {
                        trace!(location, ?target, "Discarded rel32 candidate");
                    }
                }
            }
            debug!(
                section = %section.name(),
                count = locations.len() - before,
                "Scanned code section"
            );
        }

        // Overlapping sections can be scanned twice.
        locations.sort_unstable();
        let mut kept: Vec<Offset> = Vec::with_capacity(locations.len());
        for location in locations {
            if kept
                .last()
                .map_or(true, |&prev| location >= prev + REL32_WIDTH as Offset)
            {
                kept.push(location);
            }
        }

        debug!(count = kept.len(), "Parsed rel32 references");
        Rel32Table { locations: kept }
    }
}

/// Sub-slice of a sorted slice holding the values in `[lo, hi)`.
fn select_range(locations: &[Offset], lo: Offset, hi: Offset) -> &[Offset] {
    let begin = locations.partition_point(|&l| l < lo);
    let end = locations.partition_point(|&l| l < hi).max(begin);
    &locations[begin..end]
}

impl<T: Win32Traits> fmt::Debug for DisassemblerWin32<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisassemblerWin32")
            .field("exe_type", &T::EXE_TYPE)
            .field("size", &self.image.len())
            .field("image_base", &format_args!("{:#x}", self.image_base))
            .field("sections", &self.sections.len())
            .field("reloc_state", &self.reloc_state())
            .field("rel32_state", &self.rel32_state())
            .finish_non_exhaustive()
    }
}
