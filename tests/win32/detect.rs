use pexref::disasm::{
    detect_exe_type, make_disassembler, AnyDisassembler, Disassembler, DisassemblerWin32X64,
    DisassemblerWin32X86, ParseState,
};
use pexref::formats::pe::PeError;
use pexref::{ExecutableType, ParseOptions};

use crate::common::*;

#[test]
fn quick_detect_accepts_minimal_pe32() {
    let image = sample_x86();
    assert!(DisassemblerWin32X86::quick_detect(&image));
    assert!(!DisassemblerWin32X64::quick_detect(&image));
}

#[test]
fn quick_detect_rejects_empty_and_truncated() {
    let image = sample_x86();
    assert!(!DisassemblerWin32X86::quick_detect(&[]));
    // "MZ" but cut before the COFF header
    assert!(!DisassemblerWin32X86::quick_detect(&image[..0x82]));
    // Cut inside the optional header
    assert!(!DisassemblerWin32X86::quick_detect(&image[..0xB0]));
}

#[test]
fn quick_detect_rejects_mismatched_magic() {
    let image = sample_x64();
    assert!(!DisassemblerWin32X86::quick_detect(&image));
    assert!(DisassemblerWin32X64::quick_detect(&image));
    assert!(DisassemblerWin32X86::make(&image).is_none());
    assert_eq!(
        DisassemblerWin32X86::parse(&image).unwrap_err(),
        PeError::InvalidMagic(0x20B)
    );
}

#[test]
fn parse_reads_headers_and_sections() {
    let image = sample_x86();
    let disasm = DisassemblerWin32X86::make(&image).expect("x86 image");

    assert_eq!(disasm.exe_type(), ExecutableType::Win32X86);
    assert_eq!(disasm.exe_type_string(), "Windows PE x86");
    assert_eq!(disasm.image_base(), IMAGE_BASE_X86);
    let names: Vec<_> = disasm.sections().iter().map(|s| s.name()).collect();
    assert_eq!(names, vec![".text", ".data", ".reloc"]);
    assert_eq!(disasm.size(), 0xA00);

    // Reference tables are parsed on demand only
    assert_eq!(disasm.reloc_state(), ParseState::NotParsed);
    assert_eq!(disasm.rel32_state(), ParseState::NotParsed);
}

#[test]
fn size_excludes_overlay() {
    let mut image = sample_x86();
    image.extend_from_slice(&[0xAB; 0x123]);
    let disasm = DisassemblerWin32X86::make(&image).unwrap();
    assert_eq!(disasm.size(), 0xA00);
    assert_eq!(disasm.image().len(), 0xA00);
}

#[test]
fn parse_rejects_truncated_section_data() {
    let image = sample_x86();
    let truncated = &image[..0x900];
    assert!(matches!(
        DisassemblerWin32X86::parse(truncated),
        Err(PeError::SectionOutOfBounds { index: 2, .. })
    ));
    assert!(DisassemblerWin32X86::make(truncated).is_none());
}

#[test]
fn parse_rejects_section_beyond_size_of_image() {
    let image = PeBuilder::x86()
        .section(".text", 0x1000, vec![0xC3; 0x10], CODE)
        .build();
    let mut broken = image.clone();
    // SizeOfImage at optional header + 56
    broken[0x98 + 56..0x98 + 60].copy_from_slice(&0x1008u32.to_le_bytes());
    assert!(DisassemblerWin32X86::make(&image).is_some());
    assert!(matches!(
        DisassemblerWin32X86::parse(&broken),
        Err(PeError::SectionRvaOutOfBounds { index: 0, .. })
    ));
}

#[test]
fn parse_enforces_size_limit() {
    let image = sample_x86();
    let options = ParseOptions {
        max_image_size: 0x800,
        ..ParseOptions::default()
    };
    assert!(matches!(
        DisassemblerWin32X86::parse_with_options(&image, options.clone()),
        Err(PeError::ImageTooLarge { size: 0xA00, limit: 0x800 })
    ));
    assert!(DisassemblerWin32X86::make_with_options(&image, options).is_none());
}

#[test]
fn translator_round_trips_section_offsets() {
    let image = sample_x86();
    let disasm = DisassemblerWin32X86::make(&image).unwrap();
    let translator = disasm.translator();

    for offset in TEXT_OFFSET..TEXT_OFFSET + 0x200 {
        let rva = translator.offset_to_rva(offset).expect("mapped offset");
        assert_eq!(translator.rva_to_offset(rva), Some(offset));
    }
    assert_eq!(translator.offset_to_rva(TEXT_OFFSET), Some(0x1000));
    assert_eq!(translator.offset_to_rva(DATA_OFFSET + 0x10), Some(0x2010));

    // Headers, raw padding past the virtual size and unmapped RVAs
    assert_eq!(translator.offset_to_rva(0x100), None);
    assert_eq!(translator.offset_to_rva(DATA_OFFSET + 0x40), None);
    assert_eq!(translator.rva_to_offset(0x0800), None);
    assert_eq!(translator.rva_to_offset(0x5000), None);

    assert_eq!(disasm.address_to_rva(0x40_2010), Some(0x2010));
    assert_eq!(disasm.rva_to_address(0x2010), 0x40_2010);
    // Addresses below the base wrap within 32 bits
    assert_eq!(disasm.address_to_rva(0x10), Some(0xFFC0_0010));
    assert!(!translator.is_valid_rva(0xFFC0_0010));
    assert_eq!(disasm.address_to_rva(0x1_0040_2010), None);
}

#[test]
fn fallback_chain_picks_matching_width() {
    let x86 = sample_x86();
    let x64 = sample_x64();

    assert_eq!(detect_exe_type(&x86), Some(ExecutableType::Win32X86));
    assert_eq!(detect_exe_type(&x64), Some(ExecutableType::Win32X64));

    let disasm = make_disassembler(&x86).unwrap();
    assert!(matches!(disasm, AnyDisassembler::Win32X86(_)));
    assert_eq!(disasm.exe_type_string(), "Windows PE x86");

    let disasm = make_disassembler(&x64).unwrap();
    assert!(matches!(disasm, AnyDisassembler::Win32X64(_)));
    assert_eq!(disasm.exe_type(), ExecutableType::Win32X64);
    assert_eq!(disasm.size(), 0xA00);

    assert!(make_disassembler(&x86[..0x82]).is_none());
}
