//! FLE container reading.
//!
//! An FLE file is a JSON document. Scalar fields and tables deserialize
//! directly into the [`format`](crate::format) model; section bodies are
//! stored as lists of annotated lines and are lowered here:
//!
//! * `🔢: 55 48 89 e5`: raw payload bytes in hex.
//! * `❓: R_X86_64_PC32 sym -4`: a relocation anchored at the current
//!   offset. The line stands for `width(kind)` placeholder zero bytes.
//! * `📤: name [size]`: a GLOBAL symbol defined at the current offset.
//! * `📎: name [size]`: a WEAK symbol defined at the current offset.
//! * `🏷️: name [size]`: a LOCAL symbol defined at the current offset.
//!
//! An explicit top-level `symbols` array (as written for linked outputs)
//! overrides symbols collected from inline markers.

use crate::error::parse_error;
use crate::format::{
    FleObject, ObjectKind, ProgramHeader, RelocKind, Relocation, Section, SectionHeader, Symbol,
    SymbolBinding,
};
use crate::Result;
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;

const TAG_BYTES: &str = "🔢";
const TAG_RELOC: &str = "❓";
const TAG_GLOBAL: &str = "📤";
const TAG_WEAK: &str = "📎";
// Compared after stripping the optional variation selector.
const TAG_LOCAL: &str = "🏷";

/// The raw JSON shape of an FLE container, before section lowering.
#[derive(Deserialize)]
struct RawObject {
    #[serde(rename = "type")]
    kind: ObjectKind,
    name: String,
    #[serde(default)]
    entry: u64,
    #[serde(default)]
    shdrs: Vec<SectionHeader>,
    #[serde(default)]
    sections: IndexMap<String, RawSection>,
    #[serde(default)]
    symbols: Vec<Symbol>,
    #[serde(default)]
    phdrs: Vec<ProgramHeader>,
    #[serde(default)]
    members: Vec<RawObject>,
    #[serde(default)]
    needed: Vec<String>,
    #[serde(default)]
    dyn_relocs: Vec<Relocation>,
}

#[derive(Deserialize)]
struct RawSection {
    #[serde(default)]
    data: Vec<String>,
}

/// Reads an FLE object from a file.
pub fn from_path(path: impl AsRef<Path>) -> Result<FleObject> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|err| parse_error(format!("{}: {err}", path.display())))?;
    from_str(&text)
}

/// Parses an FLE object from JSON text.
pub fn from_str(text: &str) -> Result<FleObject> {
    let raw: RawObject =
        serde_json::from_str(text).map_err(|err| parse_error(err.to_string()))?;
    lower(raw)
}

fn lower(raw: RawObject) -> Result<FleObject> {
    let mut obj = FleObject::new(raw.kind, raw.name);
    obj.entry = raw.entry;
    obj.shdrs = raw.shdrs;
    obj.phdrs = raw.phdrs;
    obj.needed = raw.needed;
    obj.dyn_relocs = raw.dyn_relocs;

    let mut inline_symbols = Vec::new();
    for (name, body) in raw.sections {
        let section = lower_section(&name, &body.data, &mut inline_symbols)?;
        obj.sections.insert(name, section);
    }
    obj.symbols = if raw.symbols.is_empty() {
        inline_symbols
    } else {
        raw.symbols
    };

    for member in raw.members {
        if member.kind != ObjectKind::Relocatable {
            return Err(parse_error(format!(
                "archive member {} is not a relocatable object",
                member.name
            )));
        }
        obj.members.push(lower(member)?);
    }
    Ok(obj)
}

/// Lowers one section's annotated lines into payload bytes plus relocation
/// records, appending symbols defined by inline markers to `symbols`.
fn lower_section(name: &str, lines: &[String], symbols: &mut Vec<Symbol>) -> Result<Section> {
    let mut section = Section::default();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (tag, rest) = line
            .split_once(':')
            .ok_or_else(|| parse_error(format!("{name}: malformed line: {line}")))?;
        // The label marker may carry a variation selector; strip it.
        let tag = tag.trim().trim_end_matches('\u{fe0f}');
        let rest = rest.trim();
        match tag {
            TAG_BYTES => parse_hex_bytes(name, rest, &mut section.payload)?,
            TAG_RELOC => {
                let reloc = parse_reloc(name, rest, section.payload.len() as u64)?;
                // The relocation line stands for the patched field itself.
                section
                    .payload
                    .extend(std::iter::repeat_n(0u8, reloc.kind.width()));
                section.relocs.push(reloc);
            }
            TAG_GLOBAL => {
                symbols.push(parse_marker(name, rest, SymbolBinding::Global, &section)?)
            }
            TAG_WEAK => symbols.push(parse_marker(name, rest, SymbolBinding::Weak, &section)?),
            TAG_LOCAL => symbols.push(parse_marker(name, rest, SymbolBinding::Local, &section)?),
            _ => return Err(parse_error(format!("{name}: unknown line tag: {tag}"))),
        }
    }
    Ok(section)
}

fn parse_hex_bytes(section: &str, rest: &str, payload: &mut Vec<u8>) -> Result<()> {
    for tok in rest.split_whitespace() {
        let byte = u8::from_str_radix(tok, 16)
            .map_err(|_| parse_error(format!("{section}: bad hex byte: {tok}")))?;
        payload.push(byte);
    }
    Ok(())
}

/// `R_X86_64_PC32 sym -4`: kind, symbol, optional signed decimal addend.
fn parse_reloc(section: &str, rest: &str, offset: u64) -> Result<Relocation> {
    let mut toks = rest.split_whitespace();
    let kind_tok = toks
        .next()
        .ok_or_else(|| parse_error(format!("{section}: relocation missing kind")))?;
    let kind = RelocKind::from_wire(kind_tok).ok_or_else(|| {
        crate::error::unsupported_relocation(format!("unknown relocation kind: {kind_tok}"))
    })?;
    let symbol = toks
        .next()
        .ok_or_else(|| parse_error(format!("{section}: relocation missing symbol")))?
        .to_string();
    let addend = match toks.next() {
        Some(tok) => tok
            .parse::<i64>()
            .map_err(|_| parse_error(format!("{section}: bad relocation addend: {tok}")))?,
        None => 0,
    };
    if toks.next().is_some() {
        return Err(parse_error(format!(
            "{section}: trailing tokens in relocation: {rest}"
        )));
    }
    Ok(Relocation {
        offset,
        kind,
        symbol,
        addend,
    })
}

/// `name [size]`: a symbol defined at the current end of the payload.
fn parse_marker(
    section: &str,
    rest: &str,
    binding: SymbolBinding,
    body: &Section,
) -> Result<Symbol> {
    let mut toks = rest.split_whitespace();
    let name = toks
        .next()
        .ok_or_else(|| parse_error(format!("{section}: symbol marker missing name")))?
        .to_string();
    let size = match toks.next() {
        Some(tok) => tok
            .parse::<u64>()
            .map_err(|_| parse_error(format!("{section}: bad symbol size: {tok}")))?,
        None => 0,
    };
    if toks.next().is_some() {
        return Err(parse_error(format!(
            "{section}: trailing tokens in symbol marker: {rest}"
        )));
    }
    Ok(Symbol {
        name,
        binding,
        section: section.to_string(),
        offset: body.payload.len() as u64,
        size,
    })
}
