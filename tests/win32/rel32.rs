use iced_x86::{Decoder, DecoderOptions};
use pexref::disasm::{DisassemblerWin32X86, ParseState};
use pexref::{ParseOptions, Reference};

use crate::common::*;

fn decode_branch_target(image: &[u8], start: u32, bitness: u32) -> u64 {
    let ip = IMAGE_BASE_X86 + 0x1000 + (start - TEXT_OFFSET) as u64;
    let mut decoder = Decoder::with_ip(bitness, &image[start as usize..], ip, DecoderOptions::NONE);
    decoder.decode().near_branch_target()
}

#[test]
fn finds_call_jmp_and_jcc_targets() {
    let image = sample_x86();
    let disasm = DisassemblerWin32X86::make(&image).unwrap();

    let refs: Vec<_> = disasm.make_read_rel32(0, u32::MAX).collect();
    assert_eq!(
        refs,
        vec![
            Reference::new(0x411, 0x40_1100),
            Reference::new(0x442, 0x40_1000),
            Reference::new(0x461, 0x40_2004),
        ]
    );
    assert_eq!(disasm.rel32_state(), ParseState::Parsed);
    // Abs32 avoidance needs the relocation table
    assert_eq!(disasm.reloc_state(), ParseState::Parsed);
}

#[test]
fn targets_agree_with_iced_decoder() {
    let image = sample_x86();
    let disasm = DisassemblerWin32X86::make(&image).unwrap();

    let starts = [(0x411, 0x410), (0x442, 0x440), (0x461, 0x460)];
    let refs: Vec<_> = disasm.make_read_rel32(0, u32::MAX).collect();
    assert_eq!(refs.len(), starts.len());
    for (reference, (location, start)) in refs.iter().zip(starts) {
        assert_eq!(reference.location, location);
        assert_eq!(reference.target, decode_branch_target(&image, start, 32));
    }
}

#[test]
fn jcc_leaving_section_is_configurable() {
    let image = sample_x86();
    let mut options = ParseOptions::default();
    options.rel32.restrict_jcc_to_section = false;
    let disasm = DisassemblerWin32X86::make_with_options(&image, options).unwrap();

    let locations: Vec<_> = disasm.make_read_rel32(0, u32::MAX).map(|r| r.location).collect();
    assert_eq!(locations, vec![0x411, 0x442, 0x452, 0x461]);
    let jne: Vec<_> = disasm.make_read_rel32(0x452, 0x453).collect();
    assert_eq!(jne, vec![Reference::new(0x452, 0x40_2000)]);
}

#[test]
fn reader_respects_range() {
    let image = sample_x86();
    let disasm = DisassemblerWin32X86::make(&image).unwrap();
    let locations: Vec<_> = disasm.make_read_rel32(0x412, 0x462).map(|r| r.location).collect();
    assert_eq!(locations, vec![0x442, 0x461]);
    assert_eq!(disasm.rel32_locations(), &[0x411, 0x442, 0x461]);
}

fn overlap_image() -> Vec<u8> {
    // E8 directly followed by a relocated field: the field bytes double as a
    // plausible displacement.
    let mut text = vec![0xCC; 0x200];
    put(&mut text, 0x80, &[0xE8, 0x10, 0x10, 0x00, 0x00]);
    let relocs = reloc_block(0x1000, &[0x3081]);
    let reloc_size = relocs.len() as u32;
    PeBuilder::x86()
        .image_base(0)
        .section_sized(".text", 0x1000, 0x2000, text, CODE)
        .section(".reloc", 0x3000, relocs, RELOC)
        .base_relocs(0x3000, reloc_size)
        .build()
}

#[test]
fn rel32_skips_relocated_fields() {
    let image = overlap_image();
    let disasm = DisassemblerWin32X86::make(&image).unwrap();
    let relocs: Vec<_> = disasm.make_read_relocs(0, u32::MAX).collect();
    assert_eq!(relocs, vec![Reference::new(0x481, 0x1010)]);
    assert_eq!(disasm.make_read_rel32(0, u32::MAX).count(), 0);

    let mut options = ParseOptions::default();
    options.rel32.avoid_abs32 = false;
    let disasm = DisassemblerWin32X86::make_with_options(&image, options).unwrap();
    let rel32: Vec<_> = disasm.make_read_rel32(0, u32::MAX).collect();
    assert_eq!(rel32, vec![Reference::new(0x481, 0x2095)]);
}

#[test]
fn non_code_sections_are_not_scanned() {
    let call = vec![0xE8, 0x00, 0x00, 0x00, 0x00, 0xC3];
    let image = PeBuilder::x86()
        .section(".text", 0x1000, call.clone(), CODE)
        .section(".rdata", 0x2000, call, DATA)
        .build();
    let disasm = DisassemblerWin32X86::make(&image).unwrap();
    let refs: Vec<_> = disasm.make_read_rel32(0, u32::MAX).collect();
    assert_eq!(refs, vec![Reference::new(0x401, 0x40_1005)]);
}

#[test]
fn scan_stops_at_virtual_size() {
    // Raw data is padded to 0x200 but only 4 bytes are part of the section,
    // so the call straddling the end is not a candidate.
    let mut text = vec![0xCC; 0x10];
    put(&mut text, 0x2, &[0xE8, 0x00, 0x00, 0x00, 0x00]);
    let image = PeBuilder::x86()
        .section_sized(".text", 0x1000, 0x4, text, CODE)
        .build();
    let disasm = DisassemblerWin32X86::make(&image).unwrap();
    assert_eq!(disasm.make_read_rel32(0, u32::MAX).count(), 0);
}
