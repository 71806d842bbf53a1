//! Relocation application, dynamic relocation emission, and PLT/GOT fill.
//!
//! For a relocation `(offset, kind, symbol, addend)` in an input section
//! placed at `Sv` within output bin `B` based at `Bv`:
//!
//! * `P = Bv + Sv + offset`: patch site virtual address,
//! * `A`: the addend,
//! * `S`: resolved target virtual address,
//!
//! and the patch location is byte `Sv + offset` of `B`'s buffer. All writes
//! are little-endian regardless of host endianness, and never touch `.bss`.

use byteorder::{ByteOrder, LittleEndian};
use crate::error::{undefined_symbol, unsupported_relocation};
use crate::format::{FleObject, RelocKind, Relocation};
use crate::linker::bins::{OutputBin, OutputBins, PlacementMap};
use crate::linker::pltgot::{self, PltGotTable, GOT_ENTRY_SIZE, PLT_ENTRY_SIZE};
use crate::linker::symbols::SymbolTables;
use crate::Result;

/// Applies every input relocation, collecting the dynamic relocation
/// records that the loader must process.
pub(crate) fn apply(
    objects: &[&FleObject],
    placements: &PlacementMap,
    bins: &mut OutputBins,
    tables: &SymbolTables,
    pltgot: &PltGotTable,
    shared: bool,
) -> Result<Vec<Relocation>> {
    let mut dyn_relocs = Vec::new();
    for (index, obj) in objects.iter().enumerate() {
        for (sec_name, section) in &obj.sections {
            if section.relocs.is_empty() {
                continue;
            }
            let place = placements[&(index, sec_name.clone())];
            for reloc in &section.relocs {
                apply_one(
                    obj, reloc, place.bin, place.offset, index, bins, tables, pltgot, shared,
                    &mut dyn_relocs,
                )?;
            }
        }
    }
    Ok(dyn_relocs)
}

#[allow(clippy::too_many_arguments)]
fn apply_one(
    obj: &FleObject,
    reloc: &Relocation,
    bin: OutputBin,
    sec_offset: u64,
    index: usize,
    bins: &mut OutputBins,
    tables: &SymbolTables,
    pltgot: &PltGotTable,
    shared: bool,
    dyn_relocs: &mut Vec<Relocation>,
) -> Result<()> {
    let site = sec_offset + reloc.offset;
    let p = bins.base(bin) + site;
    let a = reloc.addend;

    if let Some(s) = tables.lookup(index, &reloc.symbol) {
        let value = match reloc.kind {
            RelocKind::Abs32 => {
                let v = s.wrapping_add_signed(a);
                u32::try_from(v).map_err(|_| overflow(reloc, v as i64))? as u64
            }
            RelocKind::Abs32S => {
                let v = s.wrapping_add_signed(a) as i64;
                i32::try_from(v).map_err(|_| overflow(reloc, v))? as u32 as u64
            }
            RelocKind::Abs64 => s.wrapping_add_signed(a),
            RelocKind::Pc32 => {
                let v = s.wrapping_add_signed(a).wrapping_sub(p) as i64;
                i32::try_from(v).map_err(|_| overflow(reloc, v))? as u32 as u64
            }
            // The only patch formula for GOTPCREL is GOT-relative, so the
            // slot exists even for internally resolved targets.
            RelocKind::GotPcRel => got_relative(reloc, p, pltgot, bins)?,
        };
        log::trace!(
            "[Reloc] {} {} in [{}]: P={p:#x} S={s:#x} A={a}",
            reloc.kind.as_wire(),
            reloc.symbol,
            obj.name
        );
        write_patch(bins, bin, site, reloc.kind.width(), value, reloc)?;
        return Ok(());
    }

    // Not internal: dynamic iff the synthesis pass allocated a GOT slot.
    if pltgot.got_index(&reloc.symbol).is_some() {
        match reloc.kind {
            RelocKind::Pc32 => {
                let plt_index = pltgot.plt_index(&reloc.symbol).ok_or_else(|| {
                    unsupported_relocation(format!("no PLT slot for {}", reloc.symbol))
                })?;
                let slot = bins.base(OutputBin::Plt) + plt_index as u64 * PLT_ENTRY_SIZE;
                let v = slot.wrapping_add_signed(a).wrapping_sub(p) as i64;
                let value = i32::try_from(v).map_err(|_| overflow(reloc, v))? as u32 as u64;
                write_patch(bins, bin, site, 4, value, reloc)?;
            }
            RelocKind::GotPcRel => {
                let value = got_relative(reloc, p, pltgot, bins)?;
                write_patch(bins, bin, site, 4, value, reloc)?;
            }
            // Absolute references to dynamic names stay zero in the image;
            // the loader patches them at the recorded virtual address.
            RelocKind::Abs32 | RelocKind::Abs32S | RelocKind::Abs64 => {
                dyn_relocs.push(Relocation {
                    offset: p,
                    kind: reloc.kind,
                    symbol: reloc.symbol.clone(),
                    addend: a,
                });
            }
        }
        log::trace!(
            "[Reloc] {} {} in [{}]: dynamic, P={p:#x}",
            reloc.kind.as_wire(),
            reloc.symbol,
            obj.name
        );
        return Ok(());
    }

    // In a shared output every non-internal reference was routed through
    // the GOT by the synthesis pass, so reaching here means the name has no
    // definition anywhere.
    debug_assert!(!shared);
    Err(undefined_symbol(&reloc.symbol))
}

fn got_relative(
    reloc: &Relocation,
    p: u64,
    pltgot: &PltGotTable,
    bins: &OutputBins,
) -> Result<u64> {
    let got_index = pltgot
        .got_index(&reloc.symbol)
        .ok_or_else(|| unsupported_relocation(format!("no GOT slot for {}", reloc.symbol)))?;
    let slot = bins.base(OutputBin::Got) + got_index as u64 * GOT_ENTRY_SIZE;
    let v = slot.wrapping_add_signed(reloc.addend).wrapping_sub(p) as i64;
    Ok(i32::try_from(v).map_err(|_| overflow(reloc, v))? as u32 as u64)
}

fn write_patch(
    bins: &mut OutputBins,
    bin: OutputBin,
    site: u64,
    width: usize,
    value: u64,
    reloc: &Relocation,
) -> Result<()> {
    // `.bss` carries no bytes; only loader-applied records may point there.
    if bin.is_bss() {
        return Err(unsupported_relocation(format!(
            "{} against {}: patch site in .bss",
            reloc.kind.as_wire(),
            reloc.symbol
        )));
    }
    let site = site as usize;
    let buf = &mut bins[bin].bytes[site..site + width];
    match width {
        4 => LittleEndian::write_u32(buf, value as u32),
        8 => LittleEndian::write_u64(buf, value),
        _ => unreachable!(),
    }
    Ok(())
}

#[cold]
fn overflow(reloc: &Relocation, value: i64) -> crate::Error {
    unsupported_relocation(format!(
        "{} against {}: value {value:#x} does not fit",
        reloc.kind.as_wire(),
        reloc.symbol
    ))
}

/// Fills GOT slots and PLT stubs once every site relocation is applied.
///
/// GOT slots whose symbol resolved internally are filled with the symbol
/// address for an executable output; every other slot receives an
/// `R_X86_64_64` dynamic relocation so the loader can fill it at process
/// start. Each PLT stub is `ff 25 disp32` with
/// `disp = got_slot - (plt_slot + 6)`.
pub(crate) fn fill_pltgot(
    bins: &mut OutputBins,
    tables: &SymbolTables,
    pltgot: &PltGotTable,
    shared: bool,
    dyn_relocs: &mut Vec<Relocation>,
) -> Result<()> {
    if pltgot.got_size() == 0 {
        return Ok(());
    }
    let got_base = bins.base(OutputBin::Got);
    for (index, name) in pltgot.got_symbols() {
        let slot = got_base + index as u64 * GOT_ENTRY_SIZE;
        match tables.lookup_any(name) {
            Some(vaddr) if !shared => {
                let offset = (index as u64 * GOT_ENTRY_SIZE) as usize;
                LittleEndian::write_u64(
                    &mut bins[OutputBin::Got].bytes[offset..offset + 8],
                    vaddr,
                );
            }
            _ => {
                dyn_relocs.push(Relocation {
                    offset: slot,
                    kind: RelocKind::Abs64,
                    symbol: name.to_string(),
                    addend: 0,
                });
            }
        }
    }

    if pltgot.plt_size() == 0 {
        return Ok(());
    }
    let plt_base = bins.base(OutputBin::Plt);
    for (index, name) in pltgot.plt_symbols() {
        let plt_slot = plt_base + index as u64 * PLT_ENTRY_SIZE;
        let got_index = pltgot
            .got_index(name)
            .ok_or_else(|| unsupported_relocation(format!("no GOT slot for {name}")))?;
        let got_slot = got_base + got_index as u64 * GOT_ENTRY_SIZE;
        let disp = got_slot as i64 - (plt_slot + PLT_ENTRY_SIZE) as i64;
        let disp = i32::try_from(disp).map_err(|_| {
            unsupported_relocation(format!("PLT displacement for {name} does not fit"))
        })?;
        let offset = (index as u64 * PLT_ENTRY_SIZE) as usize;
        bins[OutputBin::Plt].bytes[offset..offset + PLT_ENTRY_SIZE as usize]
            .copy_from_slice(&pltgot::plt_stub(disp));
        log::trace!("[Plt] stub {index} for [{name}]: disp {disp:#x}");
    }
    Ok(())
}
