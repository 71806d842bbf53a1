//! Symbol resolution: final addresses and strong/weak precedence.

use crate::error::{multiple_definition, parse_error};
use crate::format::{FleObject, SymbolBinding};
use crate::linker::bins::{OutputBin, OutputBins, PlacementMap};
use crate::Result;
use std::collections::HashMap;

/// A symbol that won resolution, with enough context to rewrite it into the
/// output's export table.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedSymbol {
    pub(crate) vaddr: u64,
    pub(crate) binding: SymbolBinding,
    pub(crate) bin: OutputBin,
    /// Byte offset within the output bin.
    pub(crate) offset: u64,
    pub(crate) size: u64,
}

/// Per-input local tables plus the single global table.
///
/// LOCAL symbols are only ever visible to relocations in their own input;
/// a relocation consults `locals[i]` first, then `globals`.
#[derive(Debug, Default)]
pub(crate) struct SymbolTables {
    pub(crate) locals: Vec<HashMap<String, u64>>,
    pub(crate) globals: HashMap<String, ResolvedSymbol>,
}

impl SymbolTables {
    /// Resolves a name as seen from input `index`.
    pub(crate) fn lookup(&self, index: usize, name: &str) -> Option<u64> {
        self.locals[index]
            .get(name)
            .copied()
            .or_else(|| self.globals.get(name).map(|sym| sym.vaddr))
    }

    /// Resolves a name without a referencing input: global table first,
    /// then any local table. Used by the GOT backfill.
    pub(crate) fn lookup_any(&self, name: &str) -> Option<u64> {
        self.globals
            .get(name)
            .map(|sym| sym.vaddr)
            .or_else(|| self.locals.iter().find_map(|table| table.get(name).copied()))
    }
}

/// Computes the final virtual address of every defined symbol and applies
/// the strong/weak precedence rules:
///
/// | existing →   | none   | WEAK      | GLOBAL    |
/// |--------------|--------|-----------|-----------|
/// | new = WEAK   | insert | keep      | keep      |
/// | new = GLOBAL | insert | overwrite | **error** |
pub(crate) fn resolve(
    objects: &[&FleObject],
    placements: &PlacementMap,
    bins: &OutputBins,
) -> Result<SymbolTables> {
    let mut tables = SymbolTables {
        locals: vec![HashMap::new(); objects.len()],
        ..SymbolTables::default()
    };

    for (index, obj) in objects.iter().enumerate() {
        for sym in &obj.symbols {
            if !sym.is_defined() {
                continue;
            }
            let place = placements
                .get(&(index, sym.section.clone()))
                .ok_or_else(|| {
                    parse_error(format!(
                        "{}: symbol {} references unknown section {}",
                        obj.name, sym.name, sym.section
                    ))
                })?;
            let vaddr = bins.base(place.bin) + place.offset + sym.offset;
            log::trace!(
                "binding file [{}]: symbol [{}] at {:#x}",
                obj.name,
                sym.name,
                vaddr
            );
            match sym.binding {
                SymbolBinding::Local => {
                    tables.locals[index].insert(sym.name.clone(), vaddr);
                }
                SymbolBinding::Global | SymbolBinding::Weak => {
                    let resolved = ResolvedSymbol {
                        vaddr,
                        binding: sym.binding,
                        bin: place.bin,
                        offset: place.offset + sym.offset,
                        size: sym.size,
                    };
                    match tables.globals.get(&sym.name) {
                        None => {
                            tables.globals.insert(sym.name.clone(), resolved);
                        }
                        Some(existing) => match (sym.binding, existing.binding) {
                            (SymbolBinding::Global, SymbolBinding::Global) => {
                                return Err(multiple_definition(&sym.name));
                            }
                            (SymbolBinding::Global, SymbolBinding::Weak) => {
                                tables.globals.insert(sym.name.clone(), resolved);
                            }
                            // Weak never displaces an existing definition.
                            _ => {}
                        },
                    }
                }
                SymbolBinding::Undefined => unreachable!(),
            }
        }
    }
    Ok(tables)
}
