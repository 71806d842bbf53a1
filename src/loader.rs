//! Maps a linked FLE executable into the current process and runs it.
//!
//! Loading is eager: every program header of the executable and of each
//! `needed` shared object is mapped `PRIVATE|FIXED|ANONYMOUS`, payload
//! bytes are copied in (`.bss`-class sections are left zeroed), dynamic
//! relocations fill GOT slots and absolute fields, and only then is every
//! region transitioned to its final permission bits. Control transfer to
//! the entry never returns.
//!
//! Shared objects are linked at base 0 and rebased here to the next free
//! page-aligned address. Only position-independent references and
//! loader-filled slots survive rebasing; link-time-patched absolute fields
//! in a shared object are valid at base 0 only.

use crate::error::{mmap_error, parse_error, section_missing, undefined_symbol, unsupported_relocation};
use crate::format::{FleObject, ObjectKind, RelocKind, SecFlags, SegFlags};
use crate::mmap::{MapFlags, Mmap, MmapImpl, ProtFlags};
use crate::{roundup, Result, PAGE_SIZE};
use core::ffi::c_void;
use core::marker::PhantomData;
use core::ptr::NonNull;
use std::collections::HashMap;

/// Loads FLE executables, parameterized over the mapping backend.
pub struct Loader<M: Mmap = MmapImpl> {
    _marker: PhantomData<M>,
}

impl<M: Mmap> Loader<M> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M: Mmap> Default for Loader<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// One mapped region and the permissions it ends up with.
#[derive(Debug)]
struct Region {
    addr: usize,
    len: usize,
    prot: ProtFlags,
}

/// A fully loaded image, ready to run.
pub struct LoadedImage<M: Mmap = MmapImpl> {
    entry: u64,
    regions: Vec<Region>,
    _marker: PhantomData<M>,
}

impl<M: Mmap> LoadedImage<M> {
    pub fn entry(&self) -> u64 {
        self.entry
    }

    /// Jumps to the entry point.
    ///
    /// # Safety
    /// The image must contain valid machine code at its entry address. The
    /// call does not return; observing a return aborts the process.
    pub unsafe fn run(&self) -> ! {
        let entry: extern "C" fn() -> ! = unsafe { core::mem::transmute(self.entry as usize) };
        entry();
    }
}

impl<M: Mmap> std::fmt::Debug for LoadedImage<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedImage")
            .field("entry", &self.entry)
            .field("regions", &self.regions)
            .finish()
    }
}

impl<M: Mmap> Drop for LoadedImage<M> {
    fn drop(&mut self) {
        for region in &self.regions {
            if let Some(addr) = NonNull::new(region.addr as *mut c_void) {
                let _ = unsafe { M::munmap(addr, region.len) };
            }
        }
    }
}

impl<M: Mmap> Loader<M> {
    /// Maps `exe` and its `needed` shared objects, applies dynamic
    /// relocations, and seals permissions.
    ///
    /// `libs` supplies the parsed shared objects; each name in the
    /// executable's `needed` list must match one of them. On failure every
    /// region mapped so far is unmapped again.
    pub fn load(&mut self, exe: &FleObject, libs: &[FleObject]) -> Result<LoadedImage<M>> {
        let mut regions = Vec::new();
        match self.load_inner(exe, libs, &mut regions) {
            Ok(entry) => Ok(LoadedImage {
                entry,
                regions,
                _marker: PhantomData,
            }),
            Err(err) => {
                for region in &regions {
                    if let Some(addr) = NonNull::new(region.addr as *mut c_void) {
                        let _ = unsafe { M::munmap(addr, region.len) };
                    }
                }
                Err(err)
            }
        }
    }

    fn load_inner(
        &mut self,
        exe: &FleObject,
        libs: &[FleObject],
        regions: &mut Vec<Region>,
    ) -> Result<u64> {
        if exe.kind != ObjectKind::Executable {
            return Err(parse_error(format!("{}: not an executable FLE", exe.name)));
        }

        let mut top = 0u64;
        map_object::<M>(exe, 0, regions, &mut top)?;

        // Map dependencies and record their exported symbol addresses in
        // needed order; earlier libraries win name clashes.
        let mut scope: HashMap<&str, u64> = HashMap::new();
        let mut slides = Vec::new();
        for name in &exe.needed {
            let lib = libs
                .iter()
                .find(|lib| &lib.name == name)
                .ok_or_else(|| mmap_error(format!("needed library not found: {name}")))?;
            if lib.kind != ObjectKind::Shared {
                return Err(parse_error(format!("{name}: not a shared object")));
            }
            let slide = roundup(top, PAGE_SIZE);
            map_object::<M>(lib, slide, regions, &mut top)?;
            slides.push((lib, slide));
            for sym in &lib.symbols {
                if !sym.is_defined() {
                    continue;
                }
                let shdr = lib.shdr(&sym.section).ok_or_else(|| {
                    section_missing(sym.section.clone())
                })?;
                scope
                    .entry(sym.name.as_str())
                    .or_insert(slide + shdr.addr + sym.offset);
            }
        }

        for (lib, slide) in &slides {
            apply_dyn_relocs(lib, *slide, &scope)?;
        }
        apply_dyn_relocs(exe, 0, &scope)?;

        for region in regions.iter() {
            if let Some(addr) = NonNull::new(region.addr as *mut c_void) {
                unsafe { M::mprotect(addr, region.len, region.prot) }?;
            }
        }

        Ok(exe.entry)
    }
}

fn seg_prot(flags: SegFlags) -> ProtFlags {
    let mut prot = ProtFlags::PROT_NONE;
    if flags.contains(SegFlags::R) {
        prot |= ProtFlags::PROT_READ;
    }
    if flags.contains(SegFlags::W) {
        prot |= ProtFlags::PROT_WRITE;
    }
    if flags.contains(SegFlags::X) {
        prot |= ProtFlags::PROT_EXEC;
    }
    prot
}

/// Maps every program header of `obj` at `slide` and copies payloads.
/// Regions stay writable until relocations are applied.
fn map_object<M: Mmap>(
    obj: &FleObject,
    slide: u64,
    regions: &mut Vec<Region>,
    top: &mut u64,
) -> Result<()> {
    for phdr in &obj.phdrs {
        if phdr.size == 0 {
            log::warn!("section {} has size 0, skipping", phdr.name);
            continue;
        }
        let section = obj
            .sections
            .get(&phdr.name)
            .ok_or_else(|| section_missing(phdr.name.clone()))?;
        let addr = (phdr.vaddr + slide) as usize;
        let len = roundup(phdr.size, PAGE_SIZE) as usize;
        let ptr = unsafe {
            M::mmap_anonymous(
                addr,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE | MapFlags::MAP_FIXED | MapFlags::MAP_ANONYMOUS,
            )
        }?;
        log::trace!(
            "[Mmap] {} at {:#x}, length {:#x}, prot {:?}",
            phdr.name,
            addr,
            len,
            seg_prot(phdr.flags)
        );
        let nobits = obj
            .shdr(&phdr.name)
            .is_some_and(|shdr| shdr.flags.contains(SecFlags::NOBITS));
        if !nobits && !section.payload.is_empty() {
            let count = section.payload.len().min(phdr.size as usize);
            unsafe {
                core::ptr::copy_nonoverlapping(
                    section.payload.as_ptr(),
                    ptr.as_ptr().cast::<u8>(),
                    count,
                );
            }
        }
        regions.push(Region {
            addr,
            len,
            prot: seg_prot(phdr.flags),
        });
        *top = (*top).max(phdr.vaddr + slide + len as u64);
    }
    Ok(())
}

/// Stores resolved addresses at the sites recorded in `obj.dyn_relocs`.
fn apply_dyn_relocs(obj: &FleObject, slide: u64, scope: &HashMap<&str, u64>) -> Result<()> {
    for reloc in &obj.dyn_relocs {
        let value = scope
            .get(reloc.symbol.as_str())
            .copied()
            .ok_or_else(|| undefined_symbol(reloc.symbol.clone()))?
            .wrapping_add_signed(reloc.addend);
        let site = (reloc.offset + slide) as usize as *mut u8;
        log::trace!(
            "binding file [{}]: symbol [{}] -> {value:#x}",
            obj.name,
            reloc.symbol
        );
        match reloc.kind {
            RelocKind::Abs64 => unsafe {
                core::ptr::copy_nonoverlapping(value.to_le_bytes().as_ptr(), site, 8);
            },
            RelocKind::Abs32 => {
                let value = u32::try_from(value).map_err(|_| {
                    unsupported_relocation(format!(
                        "R_X86_64_32 against {} does not fit at load time",
                        reloc.symbol
                    ))
                })?;
                unsafe {
                    core::ptr::copy_nonoverlapping(value.to_le_bytes().as_ptr(), site, 4);
                }
            }
            RelocKind::Abs32S => {
                let value = i32::try_from(value as i64).map_err(|_| {
                    unsupported_relocation(format!(
                        "R_X86_64_32S against {} does not fit at load time",
                        reloc.symbol
                    ))
                })?;
                unsafe {
                    core::ptr::copy_nonoverlapping(value.to_le_bytes().as_ptr(), site, 4);
                }
            }
            kind => {
                return Err(unsupported_relocation(format!(
                    "{} in dynamic relocation table",
                    kind.as_wire()
                )));
            }
        }
    }
    Ok(())
}
