//! The linker pipeline.
//!
//! [`link`] is a pure function from parsed inputs and options to one output
//! object. It runs a fixed sequence of stages, all operating on state owned
//! by the current invocation:
//!
//! 1. gather inputs and select archive members (`gather`),
//! 2. concatenate input sections into output bins (`bins`),
//! 3. allocate GOT/PLT slots for dynamic references (`pltgot`),
//! 4. assign page-aligned bin base addresses,
//! 5. resolve symbols with strong/weak precedence (`symbols`),
//! 6. apply relocations and emit dynamic records (`relocate`),
//! 7. fill GOT slots and PLT stubs,
//! 8. assemble the output object (`output`).

mod bins;
mod gather;
mod output;
mod pltgot;
mod relocate;
mod symbols;

use crate::format::{FleObject, RelocKind, SymbolBinding};
use crate::Result;
use pltgot::PltGotTable;
use std::collections::HashSet;

/// Options controlling one `link()` invocation.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Name recorded in the output object.
    pub output: String,
    /// Symbol whose address becomes the output's entry point.
    pub entry: String,
    /// Produce a position-independent shared object instead of an
    /// executable.
    pub shared: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            output: "a.out".to_string(),
            entry: "_start".to_string(),
            shared: false,
        }
    }
}

/// Links the given FLE objects into an executable or shared object.
///
/// Inputs must be relocatable objects, archives, or shared objects; the
/// inputs themselves are not modified. On error no output exists at all:
/// the linker never produces a half-linked object.
pub fn link(inputs: &[FleObject], options: &LinkOptions) -> Result<FleObject> {
    let gathered = gather::gather(inputs, &options.entry)?;
    log::debug!(
        "[Link] {} objects selected, {} shared dependencies",
        gathered.objects.len(),
        gathered.needed.len()
    );

    let (mut bins, placements) = bins::OutputBins::merge(&gathered.objects);

    let pltgot = synthesize(&gathered.objects, &gathered.dynamic_exports, options.shared);
    bins.reserve_pltgot(pltgot.plt_size(), pltgot.got_size());

    bins.layout(options.shared);

    let tables = symbols::resolve(&gathered.objects, &placements, &bins)?;

    let mut dyn_relocs = relocate::apply(
        &gathered.objects,
        &placements,
        &mut bins,
        &tables,
        &pltgot,
        options.shared,
    )?;
    relocate::fill_pltgot(&mut bins, &tables, &pltgot, options.shared, &mut dyn_relocs)?;

    output::assemble(options, bins, &tables, gathered.needed, dyn_relocs)
}

/// Stage S3: scans every relocation and allocates GOT/PLT slots.
///
/// A reference is dynamic when its target is not defined by any selected
/// object and either a shared object exports the name or the output itself
/// is shared. Dynamic references get a GOT slot; dynamic `PC32` calls also
/// get a PLT stub. Resolvable `GOTPCREL` references go through a GOT slot
/// even for internally defined targets; a `GOTPCREL` whose target is
/// neither internal nor dynamic gets no slot, so it surfaces as an
/// undefined symbol when relocations are applied.
fn synthesize(
    objects: &[&FleObject],
    dynamic_exports: &HashSet<String>,
    shared: bool,
) -> PltGotTable {
    let mut global_defs = HashSet::new();
    let mut local_defs: Vec<HashSet<&str>> = Vec::with_capacity(objects.len());
    for obj in objects {
        let mut locals = HashSet::new();
        for sym in &obj.symbols {
            if !sym.is_defined() {
                continue;
            }
            if sym.binding == SymbolBinding::Local {
                locals.insert(sym.name.as_str());
            } else {
                global_defs.insert(sym.name.as_str());
            }
        }
        local_defs.push(locals);
    }

    let mut pltgot = PltGotTable::default();
    for (index, obj) in objects.iter().enumerate() {
        for section in obj.sections.values() {
            for reloc in &section.relocs {
                let name = reloc.symbol.as_str();
                let internal =
                    local_defs[index].contains(name) || global_defs.contains(name);
                let dynamic = dynamic_exports.contains(name) || shared;
                if reloc.kind == RelocKind::GotPcRel {
                    if internal || dynamic {
                        pltgot.ensure_got(name);
                    }
                    continue;
                }
                if internal {
                    continue;
                }
                if dynamic {
                    if reloc.kind == RelocKind::Pc32 {
                        pltgot.ensure_plt(name);
                    } else {
                        pltgot.ensure_got(name);
                    }
                }
            }
        }
    }
    pltgot
}
