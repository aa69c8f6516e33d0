#![no_main]
use libfuzzer_sys::fuzz_target;
use pexref::disasm::{make_disassembler, Disassembler};

fuzz_target!(|data: &[u8]| {
    if let Some(disasm) = make_disassembler(data) {
        let mut copy = data.to_vec();
        for traits in disasm.reference_traits() {
            let refs: Vec<_> = disasm.make_reader(traits.kind, 0, u32::MAX).collect();
            assert!(refs.windows(2).all(|w| w[0].location < w[1].location));
            let mut writer = disasm.make_writer(traits.kind, &mut copy);
            for r in refs {
                writer.put_next(r);
            }
        }
    }
});
