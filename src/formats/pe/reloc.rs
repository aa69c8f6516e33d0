//! Base relocation table parsing
//!
//! The table is a sequence of blocks, each a `(page_rva: u32, size: u32)`
//! header followed by `(size - 8) / 2` little-endian 16-bit entries. The high
//! nibble of an entry is the relocation type and the low 12 bits the offset
//! within the page. Entries of every type are kept here; callers filter.

use tracing::{debug, warn};

use crate::buffer::{BufferRegion, Offset, ReadExt, Rva};

pub const RELOC_BLOCK_HEADER_SIZE: usize = 8;
pub const RELOC_ENTRY_SIZE: usize = 2;

/// One 16-bit relocation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocEntry {
    pub kind: u16,
    pub page_offset: u16,
}

impl RelocEntry {
    #[inline]
    pub fn from_raw(raw: u16) -> Self {
        Self {
            kind: raw >> 12,
            page_offset: raw & 0x0FFF,
        }
    }
}

/// One `IMAGE_BASE_RELOCATION` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocBlock {
    /// File offset of the block header
    pub offset: Offset,
    pub page_rva: Rva,
    pub entries: Vec<RelocEntry>,
}

impl RelocBlock {
    /// RVA of the field patched by `entry`, if it does not overflow.
    #[inline]
    pub fn target_rva(&self, entry: &RelocEntry) -> Option<Rva> {
        self.page_rva.checked_add(entry.page_offset as u32)
    }
}

/// Result of walking a relocation region
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocBlocks {
    pub blocks: Vec<RelocBlock>,
    /// False when a malformed block stopped the walk early
    pub complete: bool,
}

/// Walk consecutive relocation blocks in `region` of `data`.
///
/// A block whose declared size is below the header size, odd, or runs past
/// the end of the region is dropped and the walk stops there; blocks already
/// read are kept.
pub fn parse_reloc_blocks(data: &[u8], region: BufferRegion) -> RelocBlocks {
    let Some(bytes) = region.slice(data) else {
        warn!(
            offset = region.offset,
            size = region.size,
            "Relocation region lies outside the image"
        );
        return RelocBlocks::default();
    };

    let mut blocks = Vec::new();
    let mut cursor = 0usize;
    let mut complete = true;

    while cursor < bytes.len() {
        let remaining = bytes.len() - cursor;
        let header = (
            bytes.read_u32_le_at(cursor),
            bytes.read_u32_le_at(cursor + 4),
        );
        let (Some(page_rva), Some(block_size)) = header else {
            warn!(
                offset = region.offset + cursor,
                remaining, "Truncated relocation block header"
            );
            complete = false;
            break;
        };

        let block_size = block_size as usize;
        if block_size < RELOC_BLOCK_HEADER_SIZE
            || block_size % RELOC_ENTRY_SIZE != 0
            || block_size > remaining
        {
            warn!(
                offset = region.offset + cursor,
                block_size, remaining, "Malformed relocation block, stopping"
            );
            complete = false;
            break;
        }

        let entries = bytes[cursor + RELOC_BLOCK_HEADER_SIZE..cursor + block_size]
            .chunks_exact(RELOC_ENTRY_SIZE)
            .map(|raw| RelocEntry::from_raw(u16::from_le_bytes([raw[0], raw[1]])))
            .collect();

        blocks.push(RelocBlock {
            offset: (region.offset + cursor) as Offset,
            page_rva,
            entries,
        });
        cursor += block_size;
    }

    debug!(
        blocks = blocks.len(),
        complete, "Parsed relocation blocks"
    );
    RelocBlocks { blocks, complete }
}
