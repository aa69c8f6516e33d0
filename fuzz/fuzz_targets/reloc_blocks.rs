#![no_main]
use libfuzzer_sys::fuzz_target;
use pexref::buffer::BufferRegion;
use pexref::formats::pe::reloc::parse_reloc_blocks;

fuzz_target!(|data: &[u8]| {
    let _ = parse_reloc_blocks(data, BufferRegion::new(0, data.len()));
});
