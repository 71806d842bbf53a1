//! Output bins: section binning, byte merge, and address layout.

use crate::format::{FleObject, SecFlags, SegFlags};
use crate::{roundup, EXEC_BASE, PAGE_SIZE};
use std::collections::HashMap;
use std::ops::{Index, IndexMut};

/// The fixed output section categories. Four carry merged input bytes;
/// `.plt` and `.got` are synthesized by the linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum OutputBin {
    Text,
    Plt,
    Rodata,
    Data,
    Got,
    Bss,
}

impl OutputBin {
    /// Address-assignment order.
    pub(crate) const LAYOUT: [OutputBin; 6] = [
        OutputBin::Text,
        OutputBin::Plt,
        OutputBin::Rodata,
        OutputBin::Data,
        OutputBin::Got,
        OutputBin::Bss,
    ];

    pub(crate) fn name(self) -> &'static str {
        match self {
            OutputBin::Text => ".text",
            OutputBin::Plt => ".plt",
            OutputBin::Rodata => ".rodata",
            OutputBin::Data => ".data",
            OutputBin::Got => ".got",
            OutputBin::Bss => ".bss",
        }
    }

    /// `.bss` occupies address space but never contributes payload bytes.
    pub(crate) fn is_bss(self) -> bool {
        self == OutputBin::Bss
    }

    pub(crate) fn seg_flags(self) -> SegFlags {
        match self {
            OutputBin::Text | OutputBin::Plt => SegFlags::R | SegFlags::X,
            OutputBin::Rodata => SegFlags::R,
            OutputBin::Data | OutputBin::Got | OutputBin::Bss => SegFlags::R | SegFlags::W,
        }
    }

    pub(crate) fn sec_flags(self) -> SecFlags {
        let mut flags = SecFlags::ALLOC;
        if self.seg_flags().contains(SegFlags::W) {
            flags |= SecFlags::WRITE;
        }
        if self.seg_flags().contains(SegFlags::X) {
            flags |= SecFlags::EXEC;
        }
        if self.is_bss() {
            flags |= SecFlags::NOBITS;
        }
        flags
    }

    fn idx(self) -> usize {
        self as usize
    }
}

/// Maps an input section name to its output bin: longest-prefix match
/// against the four mergeable bin names, defaulting to `.data`.
pub(crate) fn classify(name: &str) -> OutputBin {
    // No bin name is a prefix of another, so first match is longest match.
    if name.starts_with(".text") {
        OutputBin::Text
    } else if name.starts_with(".rodata") {
        OutputBin::Rodata
    } else if name.starts_with(".bss") {
        OutputBin::Bss
    } else {
        OutputBin::Data
    }
}

/// Where an input section landed: its output bin and byte offset within it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Placement {
    pub(crate) bin: OutputBin,
    pub(crate) offset: u64,
}

/// The `(selected_object_index, section_name)` pair is the stable identity
/// for input sections throughout the pipeline.
pub(crate) type PlacementMap = HashMap<(usize, String), Placement>;

#[derive(Debug, Default)]
pub(crate) struct BinState {
    pub(crate) bytes: Vec<u8>,
    /// Virtual size; exceeds `bytes.len()` only for `.bss`.
    pub(crate) mem_size: u64,
    /// Assigned base address; `None` until layout, and forever for empty bins.
    pub(crate) base: Option<u64>,
}

impl BinState {
    pub(crate) fn is_empty(&self) -> bool {
        self.mem_size == 0
    }
}

/// The six output bins plus the layout that places them.
#[derive(Debug)]
pub(crate) struct OutputBins {
    bins: [BinState; 6],
}

impl Default for OutputBins {
    fn default() -> Self {
        Self {
            bins: core::array::from_fn(|_| BinState::default()),
        }
    }
}

impl Index<OutputBin> for OutputBins {
    type Output = BinState;

    fn index(&self, bin: OutputBin) -> &BinState {
        &self.bins[bin.idx()]
    }
}

impl IndexMut<OutputBin> for OutputBins {
    fn index_mut(&mut self, bin: OutputBin) -> &mut BinState {
        &mut self.bins[bin.idx()]
    }
}

impl OutputBins {
    /// Concatenates every input section into its output bin, in
    /// (object index, section declaration) order. The append offset at the
    /// moment of merge becomes the section's offset within the bin.
    pub(crate) fn merge(objects: &[&FleObject]) -> (OutputBins, PlacementMap) {
        let mut bins = OutputBins::default();
        let mut placements = PlacementMap::new();
        for (index, obj) in objects.iter().enumerate() {
            for (name, section) in &obj.sections {
                let bin = classify(name);
                let declared = obj.section_size(name);
                let state = &mut bins[bin];
                let offset = if bin.is_bss() {
                    let offset = state.mem_size;
                    state.mem_size += declared;
                    offset
                } else {
                    let offset = state.bytes.len() as u64;
                    state.bytes.extend_from_slice(&section.payload);
                    if declared > section.payload.len() as u64 {
                        state.bytes.resize((offset + declared) as usize, 0);
                    }
                    state.mem_size = state.bytes.len() as u64;
                    offset
                };
                log::trace!(
                    "[Merge] {}:{} -> {} + {:#x} ({} bytes)",
                    obj.name,
                    name,
                    bin.name(),
                    offset,
                    declared
                );
                placements.insert((index, name.clone()), Placement { bin, offset });
            }
        }
        (bins, placements)
    }

    /// Pre-sizes the synthesized `.plt` and `.got` bins with zero-filled
    /// bytes so relocation and stub writes can patch them in place.
    pub(crate) fn reserve_pltgot(&mut self, plt_size: u64, got_size: u64) {
        self[OutputBin::Plt].bytes = vec![0; plt_size as usize];
        self[OutputBin::Plt].mem_size = plt_size;
        self[OutputBin::Got].bytes = vec![0; got_size as usize];
        self[OutputBin::Got].mem_size = got_size;
    }

    /// Assigns each non-empty bin a page-aligned base address, in the fixed
    /// bin order, starting from the executable or shared-object load base.
    pub(crate) fn layout(&mut self, shared: bool) {
        let mut vaddr = if shared { 0 } else { EXEC_BASE };
        for bin in OutputBin::LAYOUT {
            let state = &mut self[bin];
            if state.is_empty() {
                continue;
            }
            vaddr = roundup(vaddr, PAGE_SIZE);
            state.base = Some(vaddr);
            log::trace!(
                "[Layout] {} at {:#x}, size {:#x}",
                bin.name(),
                vaddr,
                state.mem_size
            );
            vaddr += state.mem_size;
        }
    }

    /// Base address of a bin that received one during layout.
    pub(crate) fn base(&self, bin: OutputBin) -> u64 {
        debug_assert!(self[bin].base.is_some(), "bin {} has no base", bin.name());
        self[bin].base.unwrap_or(0)
    }
}
