//! Core PE data types and structures

use bitflags::bitflags;
use thiserror::Error;

use crate::core::address_translator::TranslatorError;

// PE constants
pub const DOS_SIGNATURE: u16 = 0x5A4D; // MZ
pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";
pub const PE32_MAGIC: u16 = 0x10B;
pub const PE32PLUS_MAGIC: u16 = 0x20B;

// Fixed structure sizes
pub const DOS_HEADER_SIZE: usize = 64;
pub const E_LFANEW_OFFSET: usize = 0x3C;
pub const COFF_HEADER_SIZE: usize = 20;
pub const NT_SIGNATURE_SIZE: usize = 4;
pub const SECTION_HEADER_SIZE: usize = 40;
pub const DATA_DIRECTORY_SIZE: usize = 8;

/// Offset of the data directory array inside a PE32 optional header
pub const OPTIONAL_HEADER32_SIZE: usize = 96;
/// Offset of the data directory array inside a PE32+ optional header
pub const OPTIONAL_HEADER64_SIZE: usize = 112;

// Data directory indices
pub const IMAGE_DIRECTORY_ENTRY_BASERELOC: usize = 5;
pub const IMAGE_NUMBEROF_DIRECTORY_ENTRIES: usize = 16;

// Base relocation types
pub const IMAGE_REL_BASED_HIGHLOW: u16 = 3;
pub const IMAGE_REL_BASED_DIR64: u16 = 10;

bitflags! {
    /// Section characteristics consulted by the disassembler
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionCharacteristics: u32 {
        const CNT_CODE = 0x0000_0020;
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        const MEM_EXECUTE = 0x2000_0000;
        const MEM_READ = 0x4000_0000;
        const MEM_WRITE = 0x8000_0000;

        const _ = !0;
    }
}

/// PE parsing error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeError {
    #[error("Invalid DOS signature")]
    InvalidDosSignature,

    #[error("Invalid PE signature")]
    InvalidPeSignature,

    #[error("Invalid optional header magic: 0x{0:04x}")]
    InvalidMagic(u16),

    #[error("Truncated header: expected {expected} bytes, got {actual}")]
    TruncatedHeader { expected: usize, actual: usize },

    #[error("Optional header too small: {size} bytes")]
    OptionalHeaderTooSmall { size: u16 },

    #[error("Data directory count {count} exceeds optional header capacity {capacity}")]
    TooManyDataDirectories { count: u32, capacity: usize },

    #[error("Section {index} raw data 0x{offset:x}+0x{size:x} lies outside the image")]
    SectionOutOfBounds { index: usize, offset: u32, size: u32 },

    #[error("Section {index} RVA range 0x{rva:x}+0x{size:x} exceeds SizeOfImage 0x{bound:x}")]
    SectionRvaOutOfBounds {
        index: usize,
        rva: u32,
        size: u32,
        bound: u32,
    },

    #[error("Image of {size} bytes exceeds limit of {limit} bytes")]
    ImageTooLarge { size: usize, limit: u64 },

    #[error("Address translation setup failed: {0}")]
    Translator(#[from] TranslatorError),
}

pub type Result<T> = std::result::Result<T, PeError>;

/// Machine types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    Unknown,
    I386,   // 0x014c
    X86_64, // 0x8664
    Other(u16),
}

impl From<u16> for Machine {
    fn from(value: u16) -> Self {
        match value {
            0x014c => Self::I386,
            0x8664 => Self::X86_64,
            0 => Self::Unknown,
            other => Self::Other(other),
        }
    }
}

/// The two DOS header fields that matter for locating the PE header
#[derive(Debug, Clone, Copy)]
pub struct DosHeader {
    pub e_magic: u16,  // Magic number (MZ)
    pub e_lfanew: u32, // File address of PE header
}

/// COFF header (20 bytes)
#[derive(Debug, Clone, Copy)]
pub struct CoffHeader {
    pub machine: Machine,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

/// Data directory entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0 && self.size > 0
    }
}

/// Width-independent view of the optional header fields the disassembler uses
#[derive(Debug, Clone)]
pub struct OptionalHeader {
    pub magic: u16,
    pub address_of_entry_point: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub number_of_rva_and_sizes: u32,
}

impl OptionalHeader {
    pub fn is_64bit(&self) -> bool {
        self.magic == PE32PLUS_MAGIC
    }

    /// Size of the fixed part preceding the data directory array
    pub fn fixed_size(&self) -> usize {
        if self.is_64bit() {
            OPTIONAL_HEADER64_SIZE
        } else {
            OPTIONAL_HEADER32_SIZE
        }
    }
}

/// NT headers (PE signature + COFF + Optional)
#[derive(Debug, Clone)]
pub struct NtHeaders {
    pub file_header: CoffHeader,
    pub optional_header: OptionalHeader,
    pub data_directories: Vec<DataDirectory>,
    /// File offset of the first section header
    pub section_table_offset: usize,
}

impl NtHeaders {
    pub fn data_directory(&self, index: usize) -> Option<&DataDirectory> {
        self.data_directories.get(index)
    }
}

/// Section header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub characteristics: SectionCharacteristics,
}

impl SectionHeader {
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).to_string()
    }

    pub fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.virtual_address && rva - self.virtual_address < self.virtual_size
    }

    /// Sections scanned for rel32 references: flagged as code and executable
    pub fn is_code(&self) -> bool {
        self.characteristics
            .contains(SectionCharacteristics::CNT_CODE | SectionCharacteristics::MEM_EXECUTE)
    }
}
