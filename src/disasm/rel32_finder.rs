//! Heuristic detection of rel32 operands in x86/x64 code.
//!
//! This does NOT attempt disassembly. A finder recognises a fixed set of
//! opcodes that carry a trailing 32-bit displacement:
//!
//! - `E8 disp32` (call) and `E9 disp32` (jmp)
//! - `0F 80..8F disp32` (jcc, long form)
//! - x64 only, when enabled: `FF 15`/`FF 25` (call/jmp `[rip+disp32]`) and
//!   `89`/`8B`/`8D` with a RIP-relative ModR/M byte, optionally behind a
//!   `48` or `4C` REX prefix.
//!
//! Every recognised form ends with its displacement, so the target RVA is
//! always `field_rva + 4 + disp`. Validating that target is the caller's job;
//! the scanner only proposes candidates. Once a candidate is accepted the
//! scan resumes after its instruction, otherwise at the next byte.

use memchr::memchr3;

use crate::buffer::{BufferRegion, Offset};
use crate::config::Rel32Options;

/// Opcode-level match at the start of a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rel32Match {
    /// Position of the displacement relative to the instruction start
    pub disp_offset: usize,
    /// Full instruction length
    pub length: usize,
    /// False for conditional branches, whose targets are expected to stay
    /// within the enclosing section
    pub can_point_outside_section: bool,
}

impl Rel32Match {
    const fn new(disp_offset: usize, length: usize, can_point_outside_section: bool) -> Self {
        Self {
            disp_offset,
            length,
            can_point_outside_section,
        }
    }
}

/// Width-specific opcode recogniser.
pub trait Rel32Finder {
    fn with_options(options: &Rel32Options) -> Self;

    /// Matches an instruction starting at `bytes[0]`. `bytes` ends where the
    /// scanned region ends, so a match implies the instruction fits.
    fn match_at(&self, bytes: &[u8]) -> Option<Rel32Match>;

    /// Index of the first byte that might start a match.
    fn next_candidate(&self, bytes: &[u8]) -> Option<usize> {
        (!bytes.is_empty()).then_some(0)
    }
}

#[inline]
fn match_x86(bytes: &[u8]) -> Option<Rel32Match> {
    match bytes {
        [0xE8 | 0xE9, _, _, _, _, ..] => Some(Rel32Match::new(1, 5, true)),
        [0x0F, op, _, _, _, _, ..] if op & 0xF0 == 0x80 => Some(Rel32Match::new(2, 6, false)),
        _ => None,
    }
}

#[inline]
fn is_rip_relative_modrm(modrm: u8) -> bool {
    modrm & 0xC7 == 0x05
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Rel32FinderX86;

impl Rel32Finder for Rel32FinderX86 {
    fn with_options(_options: &Rel32Options) -> Self {
        Self
    }

    #[inline]
    fn match_at(&self, bytes: &[u8]) -> Option<Rel32Match> {
        match_x86(bytes)
    }

    #[inline]
    fn next_candidate(&self, bytes: &[u8]) -> Option<usize> {
        memchr3(0xE8, 0xE9, 0x0F, bytes)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Rel32FinderX64 {
    rip_relative: bool,
}

impl Rel32Finder for Rel32FinderX64 {
    fn with_options(options: &Rel32Options) -> Self {
        Self {
            rip_relative: options.rip_relative,
        }
    }

    #[inline]
    fn match_at(&self, bytes: &[u8]) -> Option<Rel32Match> {
        if let Some(m) = match_x86(bytes) {
            return Some(m);
        }
        if !self.rip_relative {
            return None;
        }
        match bytes {
            [0xFF, 0x15 | 0x25, _, _, _, _, ..] => Some(Rel32Match::new(2, 6, true)),
            [0x89 | 0x8B | 0x8D, modrm, _, _, _, _, ..] if is_rip_relative_modrm(*modrm) => {
                Some(Rel32Match::new(2, 6, true))
            }
            [0x48 | 0x4C, 0x89 | 0x8B | 0x8D, modrm, _, _, _, _, ..]
                if is_rip_relative_modrm(*modrm) =>
            {
                Some(Rel32Match::new(3, 7, true))
            }
            _ => None,
        }
    }

    #[inline]
    fn next_candidate(&self, bytes: &[u8]) -> Option<usize> {
        if self.rip_relative {
            bytes.iter().position(|b| {
                matches!(b, 0xE8 | 0xE9 | 0x0F | 0xFF | 0x89 | 0x8B | 0x8D | 0x48 | 0x4C)
            })
        } else {
            memchr3(0xE8, 0xE9, 0x0F, bytes)
        }
    }
}

/// A proposed rel32 reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rel32Candidate {
    /// Image offset of the instruction
    pub start: usize,
    /// Image offset of the 4-byte displacement
    pub location: usize,
    /// Image offset one past the instruction
    pub end: usize,
    pub can_point_outside_section: bool,
}

/// Stateful scan of one region of an image.
pub struct Rel32Scanner<'a, F> {
    image: &'a [u8],
    finder: &'a F,
    cursor: usize,
    end: usize,
    pending: Option<Rel32Candidate>,
}

impl<'a, F: Rel32Finder> Rel32Scanner<'a, F> {
    /// Scans `region` of `image`; the region is clamped to the image.
    pub fn new(image: &'a [u8], finder: &'a F, region: BufferRegion) -> Self {
        let end = region.end().unwrap_or(usize::MAX).min(image.len());
        Self {
            image,
            finder,
            cursor: region.offset.min(end),
            end,
            pending: None,
        }
    }

    /// Next candidate. A candidate not [`accept`](Self::accept)ed before this
    /// call is treated as rejected.
    pub fn find_next(&mut self) -> Option<Rel32Candidate> {
        if let Some(rejected) = self.pending.take() {
            self.cursor = rejected.start + 1;
        }
        while self.cursor < self.end {
            let window = &self.image[self.cursor..self.end];
            let start = self.cursor + self.finder.next_candidate(window)?;
            if let Some(m) = self.finder.match_at(&self.image[start..self.end]) {
                let candidate = Rel32Candidate {
                    start,
                    location: start + m.disp_offset,
                    end: start + m.length,
                    can_point_outside_section: m.can_point_outside_section,
                };
                self.pending = Some(candidate);
                return Some(candidate);
            }
            self.cursor = start + 1;
        }
        None
    }

    /// Accepts the last candidate; scanning resumes after its instruction.
    pub fn accept(&mut self) {
        if let Some(accepted) = self.pending.take() {
            self.cursor = accepted.end;
        }
    }
}

/// Splits a region into the gaps between absolute-address fields.
///
/// `locations` must be sorted. Each location occupies `width` bytes; the
/// yielded regions never overlap any of them.
pub struct Abs32GapFinder<'a> {
    locations: &'a [Offset],
    width: usize,
    cursor: usize,
    end: usize,
}

impl<'a> Abs32GapFinder<'a> {
    pub fn new(region: BufferRegion, locations: &'a [Offset], width: usize) -> Self {
        let begin = region.offset;
        let first = locations.partition_point(|&loc| loc as usize + width <= begin);
        Self {
            locations: &locations[first..],
            width,
            cursor: begin,
            end: region.end().unwrap_or(usize::MAX),
        }
    }
}

impl Iterator for Abs32GapFinder<'_> {
    type Item = BufferRegion;

    fn next(&mut self) -> Option<BufferRegion> {
        while self.cursor < self.end {
            let gap_start = self.cursor;
            match self.locations.split_first() {
                Some((&loc, rest)) if (loc as usize) < self.end => {
                    self.locations = rest;
                    let loc = loc as usize;
                    self.cursor = self.cursor.max(loc + self.width);
                    if loc > gap_start {
                        return Some(BufferRegion::new(gap_start, loc - gap_start));
                    }
                }
                _ => {
                    self.cursor = self.end;
                    return Some(BufferRegion::new(gap_start, self.end - gap_start));
                }
            }
        }
        None
    }
}
