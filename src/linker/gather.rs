//! Input gathering and archive member selection.

use crate::error::parse_error;
use crate::format::{FleObject, ObjectKind, SymbolBinding};
use crate::Result;
use std::collections::HashSet;

/// The outcome of stage S1: the objects whose sections enter the output,
/// plus what must be satisfied at load time.
pub(crate) struct Gathered<'a> {
    /// Selected relocatable objects, in selection order.
    pub(crate) objects: Vec<&'a FleObject>,
    /// Names of shared objects the output depends on, in input order.
    pub(crate) needed: Vec<String>,
    /// Symbols exported by those shared objects; references to them are
    /// dynamically satisfiable.
    pub(crate) dynamic_exports: HashSet<String>,
}

/// Tracks which names have a real definition in the selected set and which
/// are referenced but not yet defined. Drives archive member selection.
struct SymbolState {
    defined: HashSet<String>,
    undefined: HashSet<String>,
}

impl SymbolState {
    fn new(entry: &str) -> Self {
        let mut undefined = HashSet::new();
        undefined.insert(entry.to_string());
        Self {
            defined: HashSet::new(),
            undefined,
        }
    }

    /// Whether `obj` defines any currently-undefined name.
    fn wants(&self, obj: &FleObject) -> bool {
        obj.symbols
            .iter()
            .any(|sym| sym.is_defined() && self.undefined.contains(&sym.name))
    }

    /// Merges a selected object's definitions and references.
    fn merge(&mut self, obj: &FleObject) {
        for sym in &obj.symbols {
            if sym.is_defined() {
                self.undefined.remove(&sym.name);
                self.defined.insert(sym.name.clone());
            }
        }
        for sym in &obj.symbols {
            if sym.binding == SymbolBinding::Undefined && !self.defined.contains(&sym.name) {
                self.undefined.insert(sym.name.clone());
            }
        }
        // Relocation targets count as references even without a symbol entry.
        for section in obj.sections.values() {
            for reloc in &section.relocs {
                if !self.defined.contains(&reloc.symbol) {
                    self.undefined.insert(reloc.symbol.clone());
                }
            }
        }
    }
}

/// Selects the inputs that participate in the link.
///
/// Relocatable objects are selected unconditionally in input order. Shared
/// objects contribute their name and exported symbol set but no sections.
/// Archive members are pulled in by a worklist fixpoint: a full pass over
/// all archives repeats until no member newly defines an undefined name.
/// Members of earlier archives win within one pass.
pub(crate) fn gather<'a>(inputs: &'a [FleObject], entry: &str) -> Result<Gathered<'a>> {
    let mut objects = Vec::new();
    let mut needed = Vec::new();
    let mut dynamic_exports = HashSet::new();
    let mut archives = Vec::new();
    let mut state = SymbolState::new(entry);

    for input in inputs {
        match input.kind {
            ObjectKind::Relocatable => {
                state.merge(input);
                objects.push(input);
            }
            ObjectKind::Shared => {
                needed.push(input.name.clone());
                for sym in &input.symbols {
                    if sym.binding != SymbolBinding::Undefined {
                        dynamic_exports.insert(sym.name.clone());
                    }
                }
            }
            ObjectKind::Archive => archives.push(input),
            ObjectKind::Executable => {
                return Err(parse_error(format!(
                    "{}: input is not a relocatable object, archive, or shared object",
                    input.name
                )));
            }
        }
    }

    let mut included: HashSet<(usize, usize)> = HashSet::new();
    loop {
        let mut changed = false;
        for (ai, archive) in archives.iter().enumerate() {
            for (mi, member) in archive.members.iter().enumerate() {
                if included.contains(&(ai, mi)) || !state.wants(member) {
                    continue;
                }
                log::trace!(
                    "[Gather] pulling member [{}] from archive [{}]",
                    member.name,
                    archive.name
                );
                state.merge(member);
                objects.push(member);
                included.insert((ai, mi));
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    Ok(Gathered {
        objects,
        needed,
        dynamic_exports,
    })
}
