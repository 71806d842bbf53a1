//! A linker and loader for the FLE object format.
//!
//! FLE is a simplified, x86-64-style relocatable object format stored as a
//! JSON container. This crate implements the toolchain around it:
//!
//! * [`reader`] / [`writer`] parse and emit FLE containers.
//! * [`linker`] turns relocatable objects, archives, and shared objects into
//!   a statically linked executable or a position-independent shared object,
//!   including PLT/GOT synthesis and dynamic relocation records.
//! * [`loader`] maps a linked executable into the current process, fills GOT
//!   slots from its dynamic relocations, and transfers control to the entry.
//! * [`nm`] and [`readfle`] render symbol listings and human-readable dumps.
//!
//! # Example
//! ```no_run
//! use fle::linker::{LinkOptions, link};
//!
//! let a = fle::reader::from_path("a.fo")?;
//! let b = fle::reader::from_path("b.fo")?;
//! let exe = link(&[a, b], &LinkOptions::default())?;
//! fle::writer::to_path(&exe, "a.out")?;
//! # Ok::<(), fle::Error>(())
//! ```

mod error;
pub mod format;
pub mod linker;
#[cfg(unix)]
pub mod loader;
#[cfg(unix)]
pub mod mmap;
pub mod nm;
pub mod reader;
pub mod readfle;
pub mod writer;

pub use error::Error;
pub use format::FleObject;

/// Page granularity used for segment layout and mapping.
pub const PAGE_SIZE: u64 = 4096;

/// Default load base of executable outputs. Shared objects are based at 0.
pub const EXEC_BASE: u64 = 0x40_0000;

pub type Result<T> = core::result::Result<T, Error>;

pub(crate) fn roundup(x: u64, align: u64) -> u64 {
    (x + align - 1) & !(align - 1)
}
