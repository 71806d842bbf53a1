//! GOT and PLT slot accounting and stub encoding.
//!
//! Slots are handed out in first-reference order; a symbol's slot index is
//! stable for the rest of the link. The PLT produced here binds eagerly:
//! each stub is an indirect jump through a GOT slot that the loader fills
//! at process start.

use byteorder::{ByteOrder, LittleEndian};
use indexmap::IndexSet;

/// Size of one PLT stub: `ff 25 disp32`.
pub(crate) const PLT_ENTRY_SIZE: u64 = 6;
/// Size of one GOT slot: an absolute 64-bit address.
pub(crate) const GOT_ENTRY_SIZE: u64 = 8;

/// Slot indices for every symbol routed through the GOT or PLT.
#[derive(Debug, Default)]
pub(crate) struct PltGotTable {
    got: IndexSet<String>,
    plt: IndexSet<String>,
}

impl PltGotTable {
    /// Allocates a GOT slot for `name` if it does not have one yet.
    pub(crate) fn ensure_got(&mut self, name: &str) -> usize {
        if let Some(index) = self.got.get_index_of(name) {
            return index;
        }
        let (index, _) = self.got.insert_full(name.to_string());
        log::trace!("[PltGot] got slot {index} for symbol [{name}]");
        index
    }

    /// Allocates a PLT slot (and the GOT slot it jumps through) for `name`.
    pub(crate) fn ensure_plt(&mut self, name: &str) -> usize {
        self.ensure_got(name);
        if let Some(index) = self.plt.get_index_of(name) {
            return index;
        }
        let (index, _) = self.plt.insert_full(name.to_string());
        log::trace!("[PltGot] plt slot {index} for symbol [{name}]");
        index
    }

    pub(crate) fn got_index(&self, name: &str) -> Option<usize> {
        self.got.get_index_of(name)
    }

    pub(crate) fn plt_index(&self, name: &str) -> Option<usize> {
        self.plt.get_index_of(name)
    }

    pub(crate) fn got_size(&self) -> u64 {
        self.got.len() as u64 * GOT_ENTRY_SIZE
    }

    pub(crate) fn plt_size(&self) -> u64 {
        self.plt.len() as u64 * PLT_ENTRY_SIZE
    }

    /// GOT slot symbols in slot order.
    pub(crate) fn got_symbols(&self) -> impl Iterator<Item = (usize, &str)> {
        self.got.iter().enumerate().map(|(i, name)| (i, name.as_str()))
    }

    /// PLT slot symbols in slot order.
    pub(crate) fn plt_symbols(&self) -> impl Iterator<Item = (usize, &str)> {
        self.plt.iter().enumerate().map(|(i, name)| (i, name.as_str()))
    }
}

/// Encodes one 6-byte PLT stub: an indirect `jmp` through the GOT slot at
/// the given displacement from the end of the stub.
pub(crate) fn plt_stub(disp: i32) -> [u8; 6] {
    let mut stub = [0xff, 0x25, 0, 0, 0, 0];
    LittleEndian::write_i32(&mut stub[2..], disp);
    stub
}
