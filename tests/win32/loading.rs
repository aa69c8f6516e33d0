use std::io::Write;

use pexref::disasm::Disassembler;
use pexref::io::error::IoError;
use pexref::io::{IOLimits, ImageFile};
use pexref::{Error, ExecutableType, ParseOptions, ReferenceKind};
use tempfile::NamedTempFile;

use crate::common::*;

fn write_temp(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file
}

#[test]
fn disassembles_mapped_file() {
    let file = write_temp(&sample_x64());
    let image = ImageFile::open(file.path(), &IOLimits::default()).unwrap();
    let disasm = image.disassemble(&ParseOptions::default()).unwrap();

    assert_eq!(disasm.exe_type(), ExecutableType::Win32X64);
    assert_eq!(disasm.make_reader(ReferenceKind::Reloc, 0, u32::MAX).count(), 3);
    assert_eq!(disasm.make_reader(ReferenceKind::Rel32, 0, u32::MAX).count(), 4);

    let mut copy = image.to_vec();
    let refs: Vec<_> = disasm.make_reader(ReferenceKind::Rel32, 0, u32::MAX).collect();
    let mut writer = disasm.make_writer(ReferenceKind::Rel32, &mut copy);
    for r in refs {
        writer.put_next(r);
    }
    drop(writer);
    assert_eq!(copy.as_slice(), image.as_bytes());
}

#[test]
fn rejects_oversized_file() {
    let file = write_temp(&sample_x86());
    let limits = IOLimits { max_file_size: 0x100 };
    assert!(matches!(
        ImageFile::open(file.path(), &limits),
        Err(IoError::FileTooLarge { limit: 0x100, found: 0xA00 })
    ));
}

#[test]
fn options_from_json_file() {
    let file =
        write_temp(br#"{"max_image_size": 4096, "rel32": {"restrict_jcc_to_section": false}}"#);
    let options = ParseOptions::from_json_file(file.path()).unwrap();
    assert_eq!(options.max_image_size, 4096);
    assert!(!options.rel32.restrict_jcc_to_section);
    assert!(options.rel32.rip_relative);

    let image_file = write_temp(&sample_x86());
    let image = ImageFile::open(image_file.path(), &IOLimits::default()).unwrap();
    let disasm = image.disassemble(&options).unwrap();
    assert_eq!(disasm.make_reader(ReferenceKind::Rel32, 0, u32::MAX).count(), 4);

    let tight = ParseOptions {
        max_image_size: 0x200,
        ..options
    };
    assert!(matches!(image.disassemble(&tight), Err(Error::UnsupportedFormat)));
}

#[test]
fn missing_options_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ParseOptions::from_json_file(dir.path().join("missing.json"));
    assert!(matches!(result, Err(Error::Config(_))));
}
