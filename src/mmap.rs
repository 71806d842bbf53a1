//! Map memory to address space.

use crate::error::mmap_error;
use crate::Result;
use bitflags::bitflags;
use core::ffi::{c_int, c_void};
use core::ptr::NonNull;

bitflags! {
    /// Desired memory protection of a memory mapping.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ProtFlags: c_int {
        /// Pages cannot be accessed.
        const PROT_NONE = 0;
        /// Pages can be read.
        const PROT_READ = 1;
        /// Pages can be written.
        const PROT_WRITE = 2;
        /// Pages can be executed.
        const PROT_EXEC = 4;
    }
}

bitflags! {
    /// Additional parameters for [`Mmap::mmap_anonymous`].
    #[derive(Clone, Copy, Debug)]
    pub struct MapFlags: c_int {
        /// Create a private copy-on-write mapping.
        const MAP_PRIVATE = 2;
        /// Place the mapping at exactly the specified address.
        const MAP_FIXED = 16;
        /// The mapping is not backed by any file.
        const MAP_ANONYMOUS = 32;
    }
}

/// Low-level memory mapping operations used by the loader.
///
/// FLE payloads arrive as decoded bytes rather than file-backed pages, so
/// the loader only ever needs anonymous mappings that it fills itself.
pub trait Mmap {
    /// Creates an anonymous mapping at the given address.
    ///
    /// # Safety
    /// `addr`/`len` must describe address space this process may claim;
    /// with [`MapFlags::MAP_FIXED`] an existing mapping there is replaced.
    unsafe fn mmap_anonymous(
        addr: usize,
        len: usize,
        prot: ProtFlags,
        flags: MapFlags,
    ) -> Result<NonNull<c_void>>;

    /// Changes the protection of an existing mapping.
    ///
    /// # Safety
    /// The range must have been produced by [`Mmap::mmap_anonymous`].
    unsafe fn mprotect(addr: NonNull<c_void>, len: usize, prot: ProtFlags) -> Result<()>;

    /// Removes a mapping.
    ///
    /// # Safety
    /// The range must have been produced by [`Mmap::mmap_anonymous`] and
    /// must no longer be in use.
    unsafe fn munmap(addr: NonNull<c_void>, len: usize) -> Result<()>;
}

/// The default [`Mmap`] implementation, backed by libc.
pub struct MmapImpl;

impl Mmap for MmapImpl {
    unsafe fn mmap_anonymous(
        addr: usize,
        len: usize,
        prot: ProtFlags,
        flags: MapFlags,
    ) -> Result<NonNull<c_void>> {
        let ptr = unsafe {
            libc::mmap(
                addr as *mut c_void,
                len,
                prot.bits(),
                flags.bits(),
                -1,
                0,
            )
        };
        if core::ptr::eq(ptr, libc::MAP_FAILED) {
            return Err(mmap_error(format!("mmap failed at {addr:#x}")));
        }
        NonNull::new(ptr).ok_or_else(|| mmap_error("mmap returned a null mapping"))
    }

    unsafe fn mprotect(addr: NonNull<c_void>, len: usize, prot: ProtFlags) -> Result<()> {
        let res = unsafe { libc::mprotect(addr.as_ptr(), len, prot.bits()) };
        if res != 0 {
            return Err(mmap_error(format!(
                "mprotect failed at {:#x}",
                addr.as_ptr() as usize
            )));
        }
        Ok(())
    }

    unsafe fn munmap(addr: NonNull<c_void>, len: usize) -> Result<()> {
        let res = unsafe { libc::munmap(addr.as_ptr(), len) };
        if res != 0 {
            return Err(mmap_error(format!(
                "munmap failed at {:#x}",
                addr.as_ptr() as usize
            )));
        }
        Ok(())
    }
}
