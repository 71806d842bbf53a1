//! Symbol listing in the style of `nm(1)`.

use crate::format::{FleObject, Symbol, SymbolBinding};
use std::fmt::Write;

/// The listing letter for one symbol, or `None` when the symbol is not
/// listed (undefined, or without an owning section).
///
/// The base letter follows the owning section: `.text` code is `T`,
/// `.data` is `D`, `.bss` is `B`, `.rodata` is `R`, anything else counts
/// as data. Weak symbols print `W` in code and `V` elsewhere; local
/// symbols lowercase the base letter.
pub fn classify(sym: &Symbol) -> Option<char> {
    if !sym.is_defined() {
        return None;
    }
    let (base, is_code) = if sym.section.starts_with(".text") {
        ('T', true)
    } else if sym.section.starts_with(".data") {
        ('D', false)
    } else if sym.section.starts_with(".bss") {
        ('B', false)
    } else if sym.section.starts_with(".rodata") {
        ('R', false)
    } else {
        ('D', false)
    };
    Some(match sym.binding {
        SymbolBinding::Weak => {
            if is_code {
                'W'
            } else {
                'V'
            }
        }
        SymbolBinding::Local => base.to_ascii_lowercase(),
        _ => base,
    })
}

/// Renders the symbol listing, one `offset letter name` line per listed
/// symbol, preserving the object's symbol order.
pub fn render(obj: &FleObject) -> String {
    let mut out = String::new();
    for sym in &obj.symbols {
        if let Some(letter) = classify(sym) {
            let _ = writeln!(out, "{:016x} {} {}", sym.offset, letter, sym.name);
        }
    }
    out
}
