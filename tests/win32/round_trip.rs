use pexref::disasm::{make_disassembler, Disassembler, DisassemblerWin32X86};
use pexref::{Reference, ReferenceKind};

use crate::common::*;

#[test]
fn unchanged_targets_write_back_identically() {
    for image in [sample_x86(), sample_x64()] {
        let disasm = make_disassembler(&image).unwrap();
        let mut copy = image.clone();

        for traits in disasm.reference_traits() {
            let refs: Vec<_> = disasm.make_reader(traits.kind, 0, u32::MAX).collect();
            assert!(!refs.is_empty(), "{} has {} references", disasm.exe_type(), traits.kind);
            let mut writer = disasm.make_writer(traits.kind, &mut copy);
            for reference in refs {
                writer.put_next(reference);
            }
        }
        assert_eq!(copy, image, "{}", disasm.exe_type());
    }
}

#[test]
fn group_writers_re_encode_new_targets() {
    let image = sample_x86();
    let disasm = DisassemblerWin32X86::make(&image).unwrap();
    let groups = disasm.make_reference_groups();
    let mut copy = image.clone();

    // Shift every target by 0x10 bytes
    for group in &groups {
        let refs: Vec<_> = group.make_reader(&disasm, 0, u32::MAX).collect();
        let mut writer = group.make_writer(&disasm, &mut copy);
        for r in refs {
            writer.put_next(Reference::new(r.location, r.target + 0x10));
        }
    }

    let patched = DisassemblerWin32X86::make(&copy).unwrap();
    let relocs: Vec<_> = patched.make_read_relocs(0, u32::MAX).collect();
    assert_eq!(
        relocs,
        vec![
            Reference::new(0x421, 0x40_2010),
            Reference::new(0x610, 0x40_1020),
        ]
    );
    let rel32: Vec<_> = patched
        .make_read_rel32(0, u32::MAX)
        .map(|r| r.target)
        .collect();
    assert_eq!(rel32, vec![0x40_1110, 0x40_1010, 0x40_2014]);
}

#[test]
fn writer_only_touches_reference_fields() {
    let image = sample_x86();
    let disasm = DisassemblerWin32X86::make(&image).unwrap();
    let mut copy = image.clone();
    {
        let mut writer = disasm.make_writer(ReferenceKind::Rel32, &mut copy);
        writer.put_next(Reference::new(0x411, 0x40_1000));
    }
    let changed: Vec<_> = (0..image.len()).filter(|&i| image[i] != copy[i]).collect();
    assert!(changed.iter().all(|&i| (0x411..0x415).contains(&i)));
    // call at RVA 0x1010 back to 0x1000: disp = 0x1000 - 0x1015
    assert_eq!(&copy[0x411..0x415], &(-0x15i32).to_le_bytes());
}
