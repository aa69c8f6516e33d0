//! References and the reader/writer interfaces handed to the differencing
//! engine.
//!
//! A reference is a byte range in the image that encodes an address. Readers
//! yield references of one kind in ascending location order; writers consume
//! a parallel stream of corrected targets and re-encode them in place.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::buffer::Offset;

/// The kinds of references a Win32 disassembler extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// Absolute address field targeted by a base relocation
    Reloc,
    /// 32-bit displacement of a relative call/jump/branch
    Rel32,
}

impl ReferenceKind {
    pub const COUNT: usize = 2;
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Reloc => write!(f, "reloc"),
            ReferenceKind::Rel32 => write!(f, "rel32"),
        }
    }
}

/// A single reference: where it is stored and the absolute address it encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// File offset of the encoded field
    pub location: Offset,
    /// Absolute virtual address the field points at
    pub target: u64,
}

impl Reference {
    pub fn new(location: Offset, target: u64) -> Self {
        Self { location, target }
    }
}

/// Static description of a reference kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTypeTraits {
    /// Size in bytes of the encoded field
    pub width: u32,
    pub kind: ReferenceKind,
}

/// Produces references of one kind in ascending `location` order.
pub trait ReferenceReader: Iterator<Item = Reference> {}

impl<I: Iterator<Item = Reference>> ReferenceReader for I {}

/// Consumes `(location, new_target)` pairs in the order a reader produced
/// them and patches the encoded fields.
pub trait ReferenceWriter {
    fn put_next(&mut self, reference: Reference);
}

pub type ReaderFactory<D> = for<'a> fn(&'a D, Offset, Offset) -> Box<dyn ReferenceReader + 'a>;
pub type WriterFactory<D> = for<'a> fn(&'a D, &'a mut [u8]) -> Box<dyn ReferenceWriter + 'a>;

/// Binds a reference kind to the factories that build its reader and writer
/// for a disassembler of type `D`.
pub struct ReferenceGroup<D> {
    traits: ReferenceTypeTraits,
    reader_factory: ReaderFactory<D>,
    writer_factory: WriterFactory<D>,
}

impl<D> ReferenceGroup<D> {
    pub fn new(
        traits: ReferenceTypeTraits,
        reader_factory: ReaderFactory<D>,
        writer_factory: WriterFactory<D>,
    ) -> Self {
        Self {
            traits,
            reader_factory,
            writer_factory,
        }
    }

    pub fn traits(&self) -> ReferenceTypeTraits {
        self.traits
    }

    pub fn kind(&self) -> ReferenceKind {
        self.traits.kind
    }

    pub fn width(&self) -> u32 {
        self.traits.width
    }

    /// Reader over references whose location lies in `[lo, hi)`.
    pub fn make_reader<'a>(
        &self,
        disasm: &'a D,
        lo: Offset,
        hi: Offset,
    ) -> Box<dyn ReferenceReader + 'a> {
        (self.reader_factory)(disasm, lo, hi)
    }

    pub fn make_writer<'a>(
        &self,
        disasm: &'a D,
        image: &'a mut [u8],
    ) -> Box<dyn ReferenceWriter + 'a> {
        (self.writer_factory)(disasm, image)
    }
}

impl<D> Clone for ReferenceGroup<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for ReferenceGroup<D> {}

impl<D> fmt::Debug for ReferenceGroup<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceGroup")
            .field("traits", &self.traits)
            .finish_non_exhaustive()
    }
}
