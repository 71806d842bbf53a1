//! Human-readable dump of an FLE object.

use crate::format::{FleObject, SymbolBinding};
use std::fmt::Write;

fn binding_str(binding: SymbolBinding) -> &'static str {
    match binding {
        SymbolBinding::Local => "LOCAL",
        SymbolBinding::Weak => "WEAK",
        SymbolBinding::Global => "GLOBAL",
        SymbolBinding::Undefined => "UNDEF",
    }
}

/// Renders the full dump: sections, symbols, relocations, and (when
/// present) program headers.
pub fn render(obj: &FleObject) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "File: {}", obj.name);
    let _ = writeln!(out, "Type: {}", obj.kind.as_str());
    let _ = writeln!(out);

    let sec_w = obj
        .shdrs
        .iter()
        .map(|shdr| shdr.name.len())
        .max()
        .unwrap_or(4)
        .max(4);
    let _ = writeln!(out, "Sections:");
    let _ = writeln!(
        out,
        "{:<sec_w$}  {:<10}  {:<20}  {:<10}  Offset",
        "Name", "Size", "Flags", "Addr"
    );
    let _ = writeln!(out, "{}", "-".repeat(sec_w + 55));
    for shdr in &obj.shdrs {
        let _ = writeln!(
            out,
            "{:<sec_w$}  {:<10}  {:<20}  {:<10}  {:#04x}",
            shdr.name,
            format!("{:#06x}", shdr.size),
            shdr.flags.names(),
            format!("{:#06x}", shdr.addr),
            shdr.offset
        );
    }
    let _ = writeln!(out);

    let sym_w = obj
        .symbols
        .iter()
        .map(|sym| sym.name.len())
        .max()
        .unwrap_or(4)
        .max(4);
    let _ = writeln!(out, "Symbols:");
    let _ = writeln!(
        out,
        "{:<sym_w$} {:<7} {:<sec_w$} {:<10} Size",
        "Name", "Type", "Section", "Offset"
    );
    let _ = writeln!(out, "{}", "-".repeat(sym_w + sec_w + 40));
    for sym in &obj.symbols {
        let _ = writeln!(
            out,
            "{:<sym_w$} {:<7} {:<sec_w$} {:<10} {:#06x}",
            sym.name,
            binding_str(sym.binding),
            sym.section,
            format!("{:#06x}", sym.offset),
            sym.size
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Relocations:");
    for (name, section) in &obj.sections {
        if section.relocs.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{name}:");
        let _ = writeln!(
            out,
            "  {:<10}{:<18}{:<sym_w$} Addend",
            "Offset", "Type", "Symbol"
        );
        let _ = writeln!(out, "{}", "-".repeat(sym_w + 35));
        for reloc in &section.relocs {
            let _ = writeln!(
                out,
                "  {:<10}{:<18}{:<sym_w$} {:#010x}",
                format!("{:#04x}", reloc.offset),
                reloc.kind.as_wire(),
                reloc.symbol,
                reloc.addend
            );
        }
        let _ = writeln!(out);
    }

    if !obj.phdrs.is_empty() {
        let _ = writeln!(out, "Program Headers:");
        let _ = writeln!(
            out,
            "  {:<20}{:<18}{:<10}Flags",
            "Name", "Virtual Address", "Size"
        );
        let _ = writeln!(out, "{}", "-".repeat(65));
        for phdr in &obj.phdrs {
            let _ = writeln!(
                out,
                "  {:<20}{:<18}{:<10} {}",
                phdr.name,
                format!("{:#010x}", phdr.vaddr),
                format!("{:#06x}", phdr.size),
                phdr.flags.names()
            );
        }
    }
    out
}
