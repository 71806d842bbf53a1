//! The FLE data model.
//!
//! Every tool in this crate operates on [`FleObject`]: the parsed form of a
//! relocatable object (`.obj`), an executable (`.exe`), a shared object
//! (`.so`), or an archive bundle (`.ar`). The model mirrors the on-disk JSON
//! container one-to-one except for section bodies, which the reader lowers
//! from annotated line lists into raw payload bytes plus relocation and
//! symbol records.

use bitflags::bitflags;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The kind of an FLE object, spelled `".obj"`/`".exe"`/`".so"`/`".ar"` on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    #[serde(rename = ".obj")]
    Relocatable,
    #[serde(rename = ".exe")]
    Executable,
    #[serde(rename = ".so")]
    Shared,
    #[serde(rename = ".ar")]
    Archive,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Relocatable => ".obj",
            ObjectKind::Executable => ".exe",
            ObjectKind::Shared => ".so",
            ObjectKind::Archive => ".ar",
        }
    }
}

/// Symbol binding, governing resolution precedence and visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolBinding {
    #[serde(rename = "LOCAL")]
    Local,
    #[serde(rename = "GLOBAL")]
    Global,
    #[serde(rename = "WEAK")]
    Weak,
    #[serde(rename = "UNDEFINED")]
    Undefined,
}

/// The supported x86-64 relocation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelocKind {
    #[serde(rename = "R_X86_64_32")]
    Abs32,
    #[serde(rename = "R_X86_64_32S")]
    Abs32S,
    #[serde(rename = "R_X86_64_64")]
    Abs64,
    #[serde(rename = "R_X86_64_PC32")]
    Pc32,
    #[serde(rename = "R_X86_64_GOTPCREL")]
    GotPcRel,
}

impl RelocKind {
    /// Width in bytes of the patched field.
    pub fn width(self) -> usize {
        match self {
            RelocKind::Abs64 => 8,
            _ => 4,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            RelocKind::Abs32 => "R_X86_64_32",
            RelocKind::Abs32S => "R_X86_64_32S",
            RelocKind::Abs64 => "R_X86_64_64",
            RelocKind::Pc32 => "R_X86_64_PC32",
            RelocKind::GotPcRel => "R_X86_64_GOTPCREL",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Some(match s {
            "R_X86_64_32" => RelocKind::Abs32,
            "R_X86_64_32S" => RelocKind::Abs32S,
            "R_X86_64_64" => RelocKind::Abs64,
            "R_X86_64_PC32" => RelocKind::Pc32,
            "R_X86_64_GOTPCREL" => RelocKind::GotPcRel,
            _ => return None,
        })
    }
}

bitflags! {
    /// Section header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SecFlags: u32 {
        const WRITE = 1;
        const ALLOC = 2;
        const EXEC = 4;
        /// The section occupies address space but carries no payload bytes.
        const NOBITS = 8;
    }
}

bitflags! {
    /// Program header permission flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SegFlags: u32 {
        const R = 1;
        const W = 2;
        const X = 4;
    }
}

impl SecFlags {
    /// Flag names joined with `|`, as printed by `readfle`.
    pub fn names(self) -> String {
        let mut parts = Vec::new();
        if self.contains(SecFlags::ALLOC) {
            parts.push("ALLOC");
        }
        if self.contains(SecFlags::WRITE) {
            parts.push("WRITE");
        }
        if self.contains(SecFlags::EXEC) {
            parts.push("EXEC");
        }
        if self.contains(SecFlags::NOBITS) {
            parts.push("NOBITS");
        }
        parts.join("|")
    }
}

impl SegFlags {
    /// Flag names joined with `|`, as printed by `readfle`.
    pub fn names(self) -> String {
        let mut parts = Vec::new();
        if self.contains(SegFlags::R) {
            parts.push("R");
        }
        if self.contains(SegFlags::W) {
            parts.push("W");
        }
        if self.contains(SegFlags::X) {
            parts.push("X");
        }
        parts.join("|")
    }
}

// Flag sets travel as plain integers on the wire.
macro_rules! impl_flags_serde {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.bits().serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let bits = u32::deserialize(deserializer)?;
                $ty::from_bits(bits).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        concat!("unknown ", stringify!($ty), " bits: {:#x}"),
                        bits
                    ))
                })
            }
        }
    };
}

impl_flags_serde!(SecFlags);
impl_flags_serde!(SegFlags);

/// A named point in some section, or an undefined reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub binding: SymbolBinding,
    /// Owning section name; empty iff the symbol is undefined.
    #[serde(default)]
    pub section: String,
    /// Byte offset within the owning section.
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub size: u64,
}

impl Symbol {
    /// A symbol with a real definition: a binding other than UNDEFINED and a
    /// named owning section.
    pub fn is_defined(&self) -> bool {
        self.binding != SymbolBinding::Undefined && !self.section.is_empty()
    }
}

/// A relocation anchored at a byte offset.
///
/// Inside a relocatable input the offset is relative to the owning section;
/// in an output's `dyn_relocs` list it is an absolute virtual address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relocation {
    pub offset: u64,
    #[serde(rename = "type")]
    pub kind: RelocKind,
    pub symbol: String,
    #[serde(default)]
    pub addend: i64,
}

/// A section body: raw payload plus the relocations anchored in it.
#[derive(Debug, Clone, Default)]
pub struct Section {
    pub payload: Vec<u8>,
    pub relocs: Vec<Relocation>,
}

/// Authoritative name/size/flags/addr/file-offset record for a section.
///
/// Consulted when a section's in-memory size differs from its on-disk
/// payload, notably for `.bss`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionHeader {
    pub name: String,
    pub size: u64,
    pub flags: SecFlags,
    #[serde(default)]
    pub addr: u64,
    #[serde(default)]
    pub offset: u64,
}

/// A loadable region of an output object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramHeader {
    pub name: String,
    pub vaddr: u64,
    pub size: u64,
    pub flags: SegFlags,
}

/// A parsed FLE object of any kind.
#[derive(Debug, Clone)]
pub struct FleObject {
    pub kind: ObjectKind,
    pub name: String,
    /// Entry virtual address; meaningful for executables only.
    pub entry: u64,
    pub shdrs: Vec<SectionHeader>,
    /// Section bodies in declaration order. Insertion order is significant:
    /// it drives merge order in the linker.
    pub sections: IndexMap<String, Section>,
    pub symbols: Vec<Symbol>,
    pub phdrs: Vec<ProgramHeader>,
    /// Archive members, in declaration order (`.ar` only).
    pub members: Vec<FleObject>,
    /// Names of required shared objects (dynamic outputs only).
    pub needed: Vec<String>,
    /// Load-time relocation records (dynamic outputs only).
    pub dyn_relocs: Vec<Relocation>,
}

impl FleObject {
    pub fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            entry: 0,
            shdrs: Vec::new(),
            sections: IndexMap::new(),
            symbols: Vec::new(),
            phdrs: Vec::new(),
            members: Vec::new(),
            needed: Vec::new(),
            dyn_relocs: Vec::new(),
        }
    }

    /// In-memory size of a section: the section header's `size` when one is
    /// present, else the payload length.
    pub fn section_size(&self, name: &str) -> u64 {
        self.shdrs
            .iter()
            .find(|shdr| shdr.name == name)
            .map(|shdr| shdr.size)
            .unwrap_or_else(|| {
                self.sections
                    .get(name)
                    .map(|sec| sec.payload.len() as u64)
                    .unwrap_or(0)
            })
    }

    pub fn shdr(&self, name: &str) -> Option<&SectionHeader> {
        self.shdrs.iter().find(|shdr| shdr.name == name)
    }
}
