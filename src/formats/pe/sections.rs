//! Section table parsing and validation

use tracing::warn;

use crate::buffer::{check_bounds, ReadExt};
use crate::core::address_translator::Unit;
use crate::formats::pe::types::*;

/// Parse `count` section headers starting at `offset`
pub fn parse_section_headers(data: &[u8], offset: usize, count: u16) -> Result<Vec<SectionHeader>> {
    let table_size = count as usize * SECTION_HEADER_SIZE;
    let table = data.read_slice_at(offset, table_size).ok_or(PeError::TruncatedHeader {
        expected: offset.saturating_add(table_size),
        actual: data.len(),
    })?;

    let sections = table
        .chunks_exact(SECTION_HEADER_SIZE)
        .map(|entry| {
            let mut name = [0u8; 8];
            name.copy_from_slice(&entry[..8]);
            let u32_at = |at: usize| entry.read_u32_le_at(at).unwrap_or_default();
            SectionHeader {
                name,
                virtual_size: u32_at(8),
                virtual_address: u32_at(12),
                size_of_raw_data: u32_at(16),
                pointer_to_raw_data: u32_at(20),
                characteristics: SectionCharacteristics::from_bits_retain(u32_at(36)),
            }
        })
        .collect();

    Ok(sections)
}

/// Validate sections against the image and build translation units.
///
/// Every section's raw data must lie inside `image_len` bytes and its RVA
/// range must end at or before `size_of_image`. Sections out of RVA order are
/// accepted. Returns the units together with the exclusive upper bound of all
/// file offsets the sections claim.
pub fn validate_sections(
    sections: &[SectionHeader],
    image_len: usize,
    size_of_image: u32,
) -> Result<(Vec<Unit>, usize)> {
    let mut units = Vec::with_capacity(sections.len());
    let mut offset_bound = 0usize;
    let mut prev_virtual_address = 0u32;

    for (index, section) in sections.iter().enumerate() {
        let raw_offset = section.pointer_to_raw_data;
        let raw_size = section.size_of_raw_data;
        if !check_bounds(raw_offset as usize, raw_size as usize, image_len) {
            return Err(PeError::SectionOutOfBounds {
                index,
                offset: raw_offset,
                size: raw_size,
            });
        }

        let rva_end = section.virtual_address.checked_add(section.virtual_size);
        if !rva_end.is_some_and(|end| end <= size_of_image) {
            return Err(PeError::SectionRvaOutOfBounds {
                index,
                rva: section.virtual_address,
                size: section.virtual_size,
                bound: size_of_image,
            });
        }

        if prev_virtual_address > section.virtual_address {
            warn!(
                section = index,
                name = %section.name(),
                rva = section.virtual_address,
                "Section RVAs are not sorted"
            );
        }
        prev_virtual_address = section.virtual_address;

        units.push(Unit {
            offset_begin: raw_offset,
            offset_size: raw_size,
            rva_begin: section.virtual_address,
            rva_size: section.virtual_size,
        });
        offset_bound = offset_bound.max(raw_offset as usize + raw_size as usize);
    }

    Ok((units, offset_bound))
}
