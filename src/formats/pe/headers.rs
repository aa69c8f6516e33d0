//! PE header parsing

use crate::buffer::ReadExt;
use crate::formats::pe::types::*;

fn truncated(expected: usize, actual: usize) -> PeError {
    PeError::TruncatedHeader { expected, actual }
}

/// Parse DOS header from data
pub fn parse_dos_header(data: &[u8]) -> Result<DosHeader> {
    if data.len() < DOS_HEADER_SIZE {
        return Err(truncated(DOS_HEADER_SIZE, data.len()));
    }

    let e_magic = data
        .read_u16_le_at(0)
        .ok_or_else(|| truncated(2, data.len()))?;
    if e_magic != DOS_SIGNATURE {
        return Err(PeError::InvalidDosSignature);
    }

    Ok(DosHeader {
        e_magic,
        e_lfanew: data
            .read_u32_le_at(E_LFANEW_OFFSET)
            .ok_or_else(|| truncated(DOS_HEADER_SIZE, data.len()))?,
    })
}

/// Parse COFF header from data at offset
pub fn parse_coff_header(data: &[u8], offset: usize) -> Result<CoffHeader> {
    let end = offset.saturating_add(COFF_HEADER_SIZE);
    let bytes = data
        .read_slice_at(offset, COFF_HEADER_SIZE)
        .ok_or_else(|| truncated(end, data.len()))?;

    // In-bounds by construction of `bytes`.
    let u16_at = |at: usize| bytes.read_u16_le_at(at).unwrap_or_default();
    let u32_at = |at: usize| bytes.read_u32_le_at(at).unwrap_or_default();

    Ok(CoffHeader {
        machine: Machine::from(u16_at(0)),
        number_of_sections: u16_at(2),
        time_date_stamp: u32_at(4),
        size_of_optional_header: u16_at(16),
        characteristics: u16_at(18),
    })
}

/// Parse the optional header, dispatching on its magic.
///
/// `size` is the COFF `SizeOfOptionalHeader`; the whole declared header must
/// lie inside `data`.
pub fn parse_optional_header(data: &[u8], offset: usize, size: u16) -> Result<OptionalHeader> {
    let end = offset.saturating_add(size as usize);
    if size < 2 {
        return Err(PeError::OptionalHeaderTooSmall { size });
    }
    let bytes = data
        .read_slice_at(offset, size as usize)
        .ok_or_else(|| truncated(end, data.len()))?;

    let magic = bytes.read_u16_le_at(0).unwrap_or_default();
    let fixed = match magic {
        PE32_MAGIC => OPTIONAL_HEADER32_SIZE,
        PE32PLUS_MAGIC => OPTIONAL_HEADER64_SIZE,
        _ => return Err(PeError::InvalidMagic(magic)),
    };
    if (size as usize) < fixed {
        return Err(PeError::OptionalHeaderTooSmall { size });
    }

    let u32_at = |at: usize| bytes.read_u32_le_at(at).unwrap_or_default();
    let image_base = if magic == PE32PLUS_MAGIC {
        bytes.read_u64_le_at(24).unwrap_or_default()
    } else {
        u32_at(28) as u64
    };

    Ok(OptionalHeader {
        magic,
        address_of_entry_point: u32_at(16),
        image_base,
        section_alignment: u32_at(32),
        file_alignment: u32_at(36),
        size_of_image: u32_at(56),
        size_of_headers: u32_at(60),
        number_of_rva_and_sizes: u32_at(fixed - 4),
    })
}

/// Parse data directories from data at offset
///
/// Directories past the sixteenth are ignored, missing ones are reported as
/// empty.
pub fn parse_data_directories(
    data: &[u8],
    offset: usize,
    count: u32,
) -> Result<Vec<DataDirectory>> {
    let count = (count as usize).min(IMAGE_NUMBEROF_DIRECTORY_ENTRIES);
    let mut directories = Vec::with_capacity(IMAGE_NUMBEROF_DIRECTORY_ENTRIES);

    for i in 0..count {
        let dir_offset = offset + i * DATA_DIRECTORY_SIZE;
        let (Some(virtual_address), Some(size)) = (
            data.read_u32_le_at(dir_offset),
            data.read_u32_le_at(dir_offset + 4),
        ) else {
            return Err(truncated(dir_offset + DATA_DIRECTORY_SIZE, data.len()));
        };
        directories.push(DataDirectory {
            virtual_address,
            size,
        });
    }

    Ok(directories)
}

/// Parse NT headers (PE signature + COFF + Optional + data directories)
pub fn parse_nt_headers(data: &[u8], offset: usize) -> Result<NtHeaders> {
    let signature = data
        .read_slice_at(offset, NT_SIGNATURE_SIZE)
        .ok_or_else(|| truncated(offset.saturating_add(NT_SIGNATURE_SIZE), data.len()))?;
    if signature != PE_SIGNATURE {
        return Err(PeError::InvalidPeSignature);
    }

    let coff_offset = offset + NT_SIGNATURE_SIZE;
    let file_header = parse_coff_header(data, coff_offset)?;

    let opt_offset = coff_offset + COFF_HEADER_SIZE;
    let optional_header =
        parse_optional_header(data, opt_offset, file_header.size_of_optional_header)?;

    let fixed = optional_header.fixed_size();
    let capacity = (file_header.size_of_optional_header as usize - fixed) / DATA_DIRECTORY_SIZE;
    if optional_header.number_of_rva_and_sizes as usize > capacity {
        return Err(PeError::TooManyDataDirectories {
            count: optional_header.number_of_rva_and_sizes,
            capacity,
        });
    }
    let data_directories =
        parse_data_directories(data, opt_offset + fixed, optional_header.number_of_rva_and_sizes)?;

    Ok(NtHeaders {
        file_header,
        optional_header,
        data_directories,
        section_table_offset: opt_offset + file_header.size_of_optional_header as usize,
    })
}

/// Cheap probe for the optional header magic of a PE image.
///
/// Checks the `MZ` and `PE\0\0` signatures and that the image is long enough
/// to hold the fixed part of the optional header the magic announces.
/// Returns the magic on success.
pub fn probe_optional_magic(data: &[u8]) -> Option<u16> {
    if data.read_u16_le_at(0)? != DOS_SIGNATURE || data.len() < DOS_HEADER_SIZE {
        return None;
    }
    let nt_offset = data.read_u32_le_at(E_LFANEW_OFFSET)? as usize;
    if data.read_slice_at(nt_offset, NT_SIGNATURE_SIZE)? != PE_SIGNATURE {
        return None;
    }
    let opt_offset = nt_offset.checked_add(NT_SIGNATURE_SIZE + COFF_HEADER_SIZE)?;
    let magic = data.read_u16_le_at(opt_offset)?;
    let fixed = match magic {
        PE32_MAGIC => OPTIONAL_HEADER32_SIZE,
        PE32PLUS_MAGIC => OPTIONAL_HEADER64_SIZE,
        _ => return Some(magic),
    };
    data.read_slice_at(opt_offset, fixed).map(|_| magic)
}
