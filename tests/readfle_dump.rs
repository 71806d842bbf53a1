mod common;

use common::*;
use fle::format::RelocKind;
use fle::linker::{link, LinkOptions};
use fle::readfle;
use rstest::rstest;

#[rstest]
fn dumps_relocatable_objects() {
    let obj = ObjBuilder::new("demo.o")
        .section(".text", &[0x55, 0, 0, 0, 0, 0xc3])
        .global("main", ".text", 0)
        .undef("puts")
        .reloc(".text", 1, RelocKind::Pc32, "puts", -4)
        .build();
    let dump = readfle::render(&obj);

    assert!(dump.starts_with("File: demo.o\nType: .obj\n"));
    assert!(dump.contains("Symbols:"));
    assert!(dump.contains("main"));
    assert!(dump.contains("UNDEF"));
    assert!(dump.contains("Relocations:"));
    assert!(dump.contains("R_X86_64_PC32"));
}

#[rstest]
fn dumps_linked_executables_with_program_headers() {
    let obj = ObjBuilder::new("a.o")
        .section(".text", &[0x90, 0xc3])
        .section(".data", &[1, 2, 3, 4])
        .global("_start", ".text", 0)
        .build();
    let exe = link(&[obj], &LinkOptions::default()).unwrap();
    let dump = readfle::render(&exe);

    assert!(dump.contains("Type: .exe"));
    assert!(dump.contains("Sections:"));
    assert!(dump.contains("ALLOC|EXEC"));
    assert!(dump.contains("Program Headers:"));
    assert!(dump.contains("R|X"));
    assert!(dump.contains("R|W"));
    assert!(dump.contains("0x00400000"));
}
