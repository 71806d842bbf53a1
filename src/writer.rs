//! FLE container writing.
//!
//! The writer is the inverse of [`reader`](crate::reader): it re-encodes
//! section bodies as annotated line lists. Relocatable objects keep their
//! relocations and defined symbols inline (`❓`/`📤`/`📎`/`🏷️` lines at
//! their recorded offsets); linked outputs carry pure byte lines plus the
//! structured `symbols` table.

use crate::error::parse_error;
use crate::format::{
    FleObject, ObjectKind, ProgramHeader, Relocation, Section, SectionHeader, Symbol,
    SymbolBinding,
};
use crate::Result;
use indexmap::IndexMap;
use serde::Serialize;
use std::fs;
use std::path::Path;

const BYTES_PER_LINE: usize = 16;

#[derive(Serialize)]
struct RawObject {
    #[serde(rename = "type")]
    kind: ObjectKind,
    name: String,
    #[serde(skip_serializing_if = "is_zero")]
    entry: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    shdrs: Vec<SectionHeader>,
    sections: IndexMap<String, RawSection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    symbols: Vec<Symbol>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    phdrs: Vec<ProgramHeader>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    members: Vec<RawObject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    needed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dyn_relocs: Vec<Relocation>,
}

#[derive(Serialize)]
struct RawSection {
    data: Vec<String>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Serializes an FLE object to pretty-printed JSON.
pub fn to_string(obj: &FleObject) -> Result<String> {
    serde_json::to_string_pretty(&raise(obj)).map_err(|err| parse_error(err.to_string()))
}

/// Writes an FLE object to a file.
pub fn to_path(obj: &FleObject, path: impl AsRef<Path>) -> Result<()> {
    let text = to_string(obj)?;
    fs::write(path.as_ref(), text)?;
    Ok(())
}

fn raise(obj: &FleObject) -> RawObject {
    // Inline markers can only express defined symbols; an object that also
    // lists undefined ones gets the authoritative structured table instead.
    let inline = obj.kind == ObjectKind::Relocatable
        && obj.symbols.iter().all(|sym| sym.is_defined());
    let mut sections = IndexMap::new();
    for (name, section) in &obj.sections {
        let symbols: &[Symbol] = if inline { &obj.symbols } else { &[] };
        sections.insert(
            name.clone(),
            RawSection {
                data: encode_section(name, section, symbols),
            },
        );
    }
    RawObject {
        kind: obj.kind,
        name: obj.name.clone(),
        entry: obj.entry,
        shdrs: obj.shdrs.clone(),
        sections,
        symbols: if inline { Vec::new() } else { obj.symbols.clone() },
        phdrs: obj.phdrs.clone(),
        members: obj.members.iter().map(raise).collect(),
        needed: obj.needed.clone(),
        dyn_relocs: obj.dyn_relocs.clone(),
    }
}

enum Event<'a> {
    Marker(&'a Symbol),
    Reloc(&'a Relocation),
}

impl Event<'_> {
    fn offset(&self) -> u64 {
        match self {
            Event::Marker(sym) => sym.offset,
            Event::Reloc(reloc) => reloc.offset,
        }
    }

    // Markers sort before relocations at the same offset.
    fn rank(&self) -> u8 {
        match self {
            Event::Marker(_) => 0,
            Event::Reloc(_) => 1,
        }
    }
}

fn encode_section(name: &str, section: &Section, symbols: &[Symbol]) -> Vec<String> {
    let mut events: Vec<Event> = section.relocs.iter().map(Event::Reloc).collect();
    events.extend(
        symbols
            .iter()
            .filter(|sym| sym.section == name)
            .map(Event::Marker),
    );
    events.sort_by_key(|ev| (ev.offset(), ev.rank()));

    let mut lines = Vec::new();
    let mut cursor = 0usize;
    for event in events {
        emit_bytes(&section.payload[cursor..event.offset() as usize], &mut lines);
        cursor = event.offset() as usize;
        match event {
            Event::Marker(sym) => {
                let tag = match sym.binding {
                    SymbolBinding::Global => "📤",
                    SymbolBinding::Weak => "📎",
                    _ => "🏷️",
                };
                if sym.size != 0 {
                    lines.push(format!("{tag}: {} {}", sym.name, sym.size));
                } else {
                    lines.push(format!("{tag}: {}", sym.name));
                }
            }
            Event::Reloc(reloc) => {
                if reloc.addend != 0 {
                    lines.push(format!(
                        "❓: {} {} {}",
                        reloc.kind.as_wire(),
                        reloc.symbol,
                        reloc.addend
                    ));
                } else {
                    lines.push(format!("❓: {} {}", reloc.kind.as_wire(), reloc.symbol));
                }
                // The line stands for the patched field's placeholder bytes.
                cursor += reloc.kind.width();
            }
        }
    }
    emit_bytes(&section.payload[cursor..], &mut lines);
    lines
}

fn emit_bytes(bytes: &[u8], lines: &mut Vec<String>) {
    for chunk in bytes.chunks(BYTES_PER_LINE) {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        lines.push(format!("🔢: {}", hex.join(" ")));
    }
}
