//! Output object assembly.

use crate::error::missing_entry;
use crate::format::{
    FleObject, ObjectKind, ProgramHeader, Relocation, Section, SectionHeader, Symbol,
};
use crate::linker::bins::{OutputBin, OutputBins};
use crate::linker::symbols::SymbolTables;
use crate::linker::LinkOptions;
use crate::Result;

/// Materializes the linked object: one section and one program header per
/// non-empty output bin, the entry address, and (for shared outputs) the
/// exported symbol table rewritten into output-section coordinates.
pub(crate) fn assemble(
    options: &LinkOptions,
    bins: OutputBins,
    tables: &SymbolTables,
    needed: Vec<String>,
    dyn_relocs: Vec<Relocation>,
) -> Result<FleObject> {
    let kind = if options.shared {
        ObjectKind::Shared
    } else {
        ObjectKind::Executable
    };
    let mut out = FleObject::new(kind, options.output.clone());

    let mut file_offset = 0u64;
    for bin in OutputBin::LAYOUT {
        let state = &bins[bin];
        if state.is_empty() {
            continue;
        }
        let base = bins.base(bin);
        out.shdrs.push(SectionHeader {
            name: bin.name().to_string(),
            size: state.mem_size,
            flags: bin.sec_flags(),
            addr: base,
            offset: file_offset,
        });
        out.phdrs.push(ProgramHeader {
            name: bin.name().to_string(),
            vaddr: base,
            size: state.mem_size,
            flags: bin.seg_flags(),
        });
        let payload = if bin.is_bss() {
            Vec::new()
        } else {
            file_offset += state.bytes.len() as u64;
            state.bytes.clone()
        };
        out.sections.insert(
            bin.name().to_string(),
            Section {
                payload,
                relocs: Vec::new(),
            },
        );
    }

    match tables.globals.get(&options.entry) {
        Some(sym) => out.entry = sym.vaddr,
        None if !options.shared => return Err(missing_entry(&options.entry)),
        None => {}
    }

    if options.shared {
        let mut winners: Vec<_> = tables.globals.iter().collect();
        winners.sort_by(|a, b| (a.1.vaddr, a.0.as_str()).cmp(&(b.1.vaddr, b.0.as_str())));
        out.symbols = winners
            .into_iter()
            .map(|(name, sym)| Symbol {
                name: name.clone(),
                binding: sym.binding,
                section: sym.bin.name().to_string(),
                offset: sym.offset,
                size: sym.size,
            })
            .collect();
    }

    out.needed = needed;
    out.dyn_relocs = dyn_relocs;
    Ok(out)
}
