mod common;

use common::*;
use fle::format::SecFlags;
use fle::linker::{link, LinkOptions};
use fle::PAGE_SIZE;
use rstest::rstest;

const BASE: u64 = 0x40_0000;

#[rstest]
fn bins_start_on_page_boundaries() {
    let obj = ObjBuilder::new("a.o")
        .section(".text", &vec![0x90; 100])
        .section(".rodata", &vec![0x41; 50])
        .global("_start", ".text", 0)
        .build();
    let exe = link(&[obj], &LinkOptions::default()).unwrap();

    assert_eq!(phdr(&exe, ".text").vaddr, BASE);
    assert_eq!(phdr(&exe, ".rodata").vaddr, BASE + 0x1000);
}

#[rstest]
fn program_headers_are_disjoint_and_aligned() {
    let obj = ObjBuilder::new("a.o")
        .section(".text", &vec![0x90; 5000])
        .section(".rodata", &vec![0x41; 100])
        .section(".data", &vec![0x42; 100])
        .bss(".bss", 64)
        .global("_start", ".text", 0)
        .build();
    let exe = link(&[obj], &LinkOptions::default()).unwrap();

    for phdr in &exe.phdrs {
        assert_eq!(phdr.vaddr % PAGE_SIZE, 0, "{} misaligned", phdr.name);
    }
    for (i, a) in exe.phdrs.iter().enumerate() {
        for b in exe.phdrs.iter().skip(i + 1) {
            let disjoint = a.vaddr + a.size <= b.vaddr || b.vaddr + b.size <= a.vaddr;
            assert!(disjoint, "{} overlaps {}", a.name, b.name);
        }
    }
    // A 5000-byte .text pushes .rodata past the second page.
    assert_eq!(phdr(&exe, ".rodata").vaddr, BASE + 0x2000);
}

#[rstest]
fn section_prefixes_share_a_bin() {
    let obj = ObjBuilder::new("a.o")
        .section(".text", &[0x90, 0xc3])
        .section(".text.startup", &[0xc3])
        .section(".rodata.str1", &[0x41])
        .section("custom", &[0x01])
        .global("_start", ".text", 0)
        .global("boot", ".text.startup", 0)
        .build();
    let exe = link(&[obj], &LinkOptions::default()).unwrap();

    // .text.startup merges behind .text; custom names default to .data.
    assert_eq!(phdr(&exe, ".text").size, 3);
    assert_eq!(phdr(&exe, ".data").size, 1);
    assert_eq!(phdr(&exe, ".rodata").size, 1);
    assert_eq!(exe.sections.get(".text").unwrap().payload[2], 0xc3);
}

#[rstest]
fn bss_occupies_address_space_without_bytes() {
    let a = ObjBuilder::new("a.o")
        .section(".text", &[0xc3])
        .bss(".bss", 4096 + 16)
        .global("_start", ".text", 0)
        .global("buffer", ".bss", 0)
        .build();
    let b = ObjBuilder::new("b.o")
        .section(".text", &[0u8; 8])
        .bss(".bss", 32)
        .global("tail", ".bss", 8)
        .reloc(".text", 0, fle::format::RelocKind::Abs64, "tail", 0)
        .build();
    let exe = link(&[a, b], &LinkOptions::default()).unwrap();

    let bss = phdr(&exe, ".bss");
    assert_eq!(bss.size, 4096 + 16 + 32);
    // No payload bytes, and the section header says NOBITS.
    assert!(payload(&exe, ".bss").is_empty());
    let shdr = exe.shdr(".bss").unwrap();
    assert!(shdr.flags.contains(SecFlags::NOBITS));
    assert!(shdr.flags.contains(SecFlags::WRITE));

    // b.o's tail sits behind a.o's block: bss_base + 4112 + 8.
    let expected = bss.vaddr + 4112 + 8;
    assert_eq!(read_u64(payload(&exe, ".text"), 1), expected);
}

#[rstest]
fn file_offsets_are_cumulative() {
    let obj = ObjBuilder::new("a.o")
        .section(".text", &vec![0x90; 10])
        .section(".data", &vec![0x42; 6])
        .bss(".bss", 8)
        .global("_start", ".text", 0)
        .build();
    let exe = link(&[obj], &LinkOptions::default()).unwrap();

    assert_eq!(exe.shdr(".text").unwrap().offset, 0);
    assert_eq!(exe.shdr(".data").unwrap().offset, 10);
    // .bss contributes no file bytes; its offset equals the running total.
    assert_eq!(exe.shdr(".bss").unwrap().offset, 16);
    assert_eq!(exe.shdr(".bss").unwrap().size, 8);
}

/// Every exported symbol of a shared output falls inside exactly one bin.
#[rstest]
fn exports_fall_inside_one_bin() {
    let obj = ObjBuilder::new("a.o")
        .section(".text", &[0xc3; 32])
        .section(".data", &[0u8; 16])
        .global("f", ".text", 4)
        .global("g", ".text", 30)
        .weak("v", ".data", 15)
        .build();
    let options = LinkOptions {
        shared: true,
        ..LinkOptions::default()
    };
    let so = link(&[obj], &options).unwrap();

    for sym in &so.symbols {
        let shdr = so.shdr(&sym.section).unwrap();
        let vaddr = shdr.addr + sym.offset;
        let hosting: Vec<_> = so
            .phdrs
            .iter()
            .filter(|phdr| vaddr >= phdr.vaddr && vaddr < phdr.vaddr + phdr.size)
            .collect();
        assert_eq!(hosting.len(), 1, "{} hosted by {} bins", sym.name, hosting.len());
    }
}
