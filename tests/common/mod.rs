#![allow(dead_code)]

use fle::format::{
    FleObject, ObjectKind, ProgramHeader, RelocKind, Relocation, SecFlags, Section, SectionHeader,
    Symbol, SymbolBinding,
};

/// Builds relocatable test objects without going through the JSON reader.
pub struct ObjBuilder {
    obj: FleObject,
}

impl ObjBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            obj: FleObject::new(ObjectKind::Relocatable, name),
        }
    }

    pub fn section(mut self, name: &str, payload: &[u8]) -> Self {
        self.obj.sections.insert(
            name.to_string(),
            Section {
                payload: payload.to_vec(),
                relocs: Vec::new(),
            },
        );
        self
    }

    /// A `.bss`-class section: no payload, size carried by a NOBITS header.
    pub fn bss(mut self, name: &str, size: u64) -> Self {
        self.obj
            .sections
            .insert(name.to_string(), Section::default());
        self.obj.shdrs.push(SectionHeader {
            name: name.to_string(),
            size,
            flags: SecFlags::ALLOC | SecFlags::WRITE | SecFlags::NOBITS,
            addr: 0,
            offset: 0,
        });
        self
    }

    pub fn symbol(
        mut self,
        name: &str,
        binding: SymbolBinding,
        section: &str,
        offset: u64,
        size: u64,
    ) -> Self {
        self.obj.symbols.push(Symbol {
            name: name.to_string(),
            binding,
            section: section.to_string(),
            offset,
            size,
        });
        self
    }

    pub fn global(self, name: &str, section: &str, offset: u64) -> Self {
        self.symbol(name, SymbolBinding::Global, section, offset, 0)
    }

    pub fn weak(self, name: &str, section: &str, offset: u64) -> Self {
        self.symbol(name, SymbolBinding::Weak, section, offset, 0)
    }

    pub fn local(self, name: &str, section: &str, offset: u64) -> Self {
        self.symbol(name, SymbolBinding::Local, section, offset, 0)
    }

    pub fn undef(self, name: &str) -> Self {
        self.symbol(name, SymbolBinding::Undefined, "", 0, 0)
    }

    pub fn reloc(
        mut self,
        section: &str,
        offset: u64,
        kind: RelocKind,
        symbol: &str,
        addend: i64,
    ) -> Self {
        self.obj
            .sections
            .get_mut(section)
            .expect("relocation names a section added earlier")
            .relocs
            .push(Relocation {
                offset,
                kind,
                symbol: symbol.to_string(),
                addend,
            });
        self
    }

    pub fn build(self) -> FleObject {
        self.obj
    }
}

pub fn archive(name: &str, members: Vec<FleObject>) -> FleObject {
    let mut ar = FleObject::new(ObjectKind::Archive, name);
    ar.members = members;
    ar
}

/// A shared object exporting `names` as functions at spaced `.text`
/// offsets, shaped the way the linker itself emits shared outputs.
pub fn shared_lib(name: &str, names: &[&str]) -> FleObject {
    let mut lib = FleObject::new(ObjectKind::Shared, name);
    let size = (names.len().max(1) * 16) as u64;
    lib.sections.insert(
        ".text".to_string(),
        Section {
            payload: vec![0xc3; size as usize],
            relocs: Vec::new(),
        },
    );
    lib.shdrs.push(SectionHeader {
        name: ".text".to_string(),
        size,
        flags: SecFlags::ALLOC | SecFlags::EXEC,
        addr: 0,
        offset: 0,
    });
    lib.phdrs.push(ProgramHeader {
        name: ".text".to_string(),
        vaddr: 0,
        size,
        flags: fle::format::SegFlags::R | fle::format::SegFlags::X,
    });
    for (i, sym) in names.iter().enumerate() {
        lib.symbols.push(Symbol {
            name: sym.to_string(),
            binding: SymbolBinding::Global,
            section: ".text".to_string(),
            offset: (i * 16) as u64,
            size: 0,
        });
    }
    lib
}

pub fn phdr<'a>(obj: &'a FleObject, name: &str) -> &'a ProgramHeader {
    obj.phdrs
        .iter()
        .find(|phdr| phdr.name == name)
        .unwrap_or_else(|| panic!("no program header {name}"))
}

pub fn payload<'a>(obj: &'a FleObject, name: &str) -> &'a [u8] {
    &obj.sections
        .get(name)
        .unwrap_or_else(|| panic!("no section {name}"))
        .payload
}

pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}
