//! Program encoding: section layout, branch resolution, constant islands
//! and the final word stream.
//!
//! Two passes.  The first walks every section assigning byte addresses,
//! deciding where constant islands land: normally at the end of the
//! section, but a pool load drifting towards the edge of its pc-relative
//! range forces an island out early, behind the next unconditional
//! branch where the processor cannot fall into it.  The second pass
//! emits words with every label, pool offset and cross-section link
//! resolved, appends the data pools, and patches the heap base word.

use crate::{Error, Result};
use itertools::Itertools;
use std::collections::HashMap;
use subtilis_asm::{
    encode_instr, ArmProgram, ArmSection, BrTarget, Cond, DataInstr, DataOp, Directive, FpKind,
    FpaPrecision, FpaStranInstr, FpaStranOp, Instr, Op2, OpIdx, OpKind, Reg, SectionConstant,
    StranInstr, StranOp, VfpStranInstr, VfpStranOp,
};
use tracing::debug;

// How far a pending constant may drift from its load before the encoder
// starts hunting for an island site.  Words for the integer pool loads,
// tighter for the coprocessor transfers.
const INT_REACH: u32 = 3600;
const REAL_REACH: u32 = 900;

#[derive(Debug)]
struct Layout {
    size: u32,
    label_addr: HashMap<usize, u32>,
    op_addr: HashMap<OpIdx, u32>,
    slot_addr: HashMap<OpIdx, u32>,
    // Islands keyed by the op they follow; the end island uses `None`.
    islands: HashMap<Option<OpIdx>, Vec<usize>>,
}

fn constant_size(c: &SectionConstant) -> u32 {
    match c {
        SectionConstant::U32(_) | SectionConstant::ProgRef(_) => 4,
        SectionConstant::Double(_) => 8,
    }
}

fn op_size(section: &ArmSection, idx: OpIdx) -> u32 {
    match &section.op(idx).kind {
        OpKind::Label(_) => 0,
        OpKind::Instr(_) => 4,
        OpKind::Directive(Directive::Word(_)) => 4,
        // Alignment is resolved against the running address in the
        // layout walk itself.
        OpKind::Directive(Directive::Align(_)) => 0,
        OpKind::Directive(Directive::Bytes(b)) => ((b.len() as u32) + 3) & !3,
    }
}

fn layout_section(section: &ArmSection) -> Layout {
    let mut layout = Layout {
        size: 0,
        label_addr: HashMap::new(),
        op_addr: HashMap::new(),
        slot_addr: HashMap::new(),
        islands: HashMap::new(),
    };
    let mut addr = 0u32;
    // constant id -> (earliest unresolved load address, needs tight
    // reach, loads waiting)
    let mut pending: HashMap<usize, (u32, bool, Vec<OpIdx>)> = HashMap::new();

    let place_island = |layout: &mut Layout,
                        pending: &mut HashMap<usize, (u32, bool, Vec<OpIdx>)>,
                        after: Option<OpIdx>,
                        addr: &mut u32| {
        if pending.is_empty() {
            return;
        }
        let ids: Vec<usize> = pending.keys().copied().sorted_unstable().collect();
        for &id in &ids {
            let (_, _, loads) = pending.remove(&id).unwrap();
            for load in loads {
                layout.slot_addr.insert(load, *addr);
            }
            layout
                .islands
                .entry(after)
                .or_default()
                .push(id);
            *addr += constant_size(&section.constants[id]);
        }
    };

    for idx in section.indices() {
        match &section.op(idx).kind {
            OpKind::Label(label) => {
                layout.label_addr.insert(*label, addr);
                layout.op_addr.insert(idx, addr);
            }
            OpKind::Directive(Directive::Align(n)) => {
                layout.op_addr.insert(idx, addr);
                if *n > 0 {
                    addr = (addr + n - 1) / n * n;
                }
            }
            kind => {
                layout.op_addr.insert(idx, addr);
                match kind {
                    OpKind::Instr(Instr::Ldrc(i)) => {
                        let entry = pending.entry(i.constant).or_insert((addr, false, Vec::new()));
                        entry.2.push(idx);
                    }
                    OpKind::Instr(Instr::FpaLdrc(i)) => {
                        let entry = pending.entry(i.constant).or_insert((addr, true, Vec::new()));
                        entry.1 = true;
                        entry.2.push(idx);
                    }
                    OpKind::Instr(Instr::VfpLdrc(i)) => {
                        let entry = pending.entry(i.constant).or_insert((addr, true, Vec::new()));
                        entry.1 = true;
                        entry.2.push(idx);
                    }
                    _ => {}
                }
                addr += op_size(section, idx);

                // A safe island site: fallthrough cannot reach past an
                // unconditional branch.
                if let OpKind::Instr(Instr::B(br)) = kind {
                    if !br.link && br.ccode == Cond::Al {
                        let urgent = pending.values().any(|(first, tight, _)| {
                            let reach = if *tight { REAL_REACH } else { INT_REACH };
                            addr - first > reach
                        });
                        if urgent {
                            place_island(&mut layout, &mut pending, Some(idx), &mut addr);
                        }
                    }
                }
            }
        }
    }

    place_island(&mut layout, &mut pending, None, &mut addr);
    layout.size = addr;
    layout
}

fn pc_offset(slot: u32, op: u32) -> i32 {
    slot as i32 - (op as i32 + 8)
}

fn emit_constant(
    words: &mut Vec<u32>,
    constant: &SectionConstant,
    fp_kind: FpKind,
    blob_addr: &HashMap<usize, u32>,
) -> Result<()> {
    match constant {
        SectionConstant::U32(v) => words.push(*v),
        SectionConstant::ProgRef(id) => {
            let addr = blob_addr
                .get(id)
                .ok_or(Error::Assertion("reference to a missing pool blob"))?;
            words.push(*addr);
        }
        SectionConstant::Double(v) => {
            let bits = v.to_bits();
            let lo = bits as u32;
            let hi = (bits >> 32) as u32;
            match fp_kind {
                // The FPA stores the exponent word first.
                FpKind::Fpa => {
                    words.push(hi);
                    words.push(lo);
                }
                FpKind::Vfp => {
                    words.push(lo);
                    words.push(hi);
                }
            }
        }
    }
    Ok(())
}

fn resolve_instr(
    instr: &Instr,
    addr: u32,
    idx: OpIdx,
    layout: &Layout,
    section_bases: &[u32],
    base: u32,
) -> Result<Instr> {
    let resolved = match instr {
        Instr::B(br) => {
            let target = match br.target {
                BrTarget::Offset(_) => return Ok(*instr),
                BrTarget::Label(label) => {
                    if br.link {
                        *section_bases
                            .get(label)
                            .ok_or(Error::Assertion("call to a missing section"))?
                    } else {
                        base + layout
                            .label_addr
                            .get(&label)
                            .copied()
                            .ok_or(Error::Assertion("branch to an undefined label"))?
                    }
                }
            };
            let delta = target as i32 - (addr as i32 + 8);
            let mut out = *br;
            out.target = BrTarget::Offset(delta / 4);
            Instr::B(out)
        }
        Instr::Ldrc(i) => {
            let slot = *layout
                .slot_addr
                .get(&idx)
                .ok_or(Error::Assertion("pool load with no island slot"))?;
            let delta = pc_offset(base + slot, addr);
            if delta.abs() > 4095 {
                return Err(Error::ConstantTooFar {
                    constant: i.constant,
                    distance: delta,
                });
            }
            Instr::Stran {
                op: StranOp::Ldr,
                instr: StranInstr {
                    ccode: i.ccode,
                    dest: i.dest,
                    base: Reg::PC,
                    offset: Op2::Imm(delta.unsigned_abs()),
                    pre_indexed: true,
                    write_back: false,
                    subtract: delta < 0,
                },
            }
        }
        Instr::FpaLdrc(i) => {
            let slot = *layout
                .slot_addr
                .get(&idx)
                .ok_or(Error::Assertion("pool load with no island slot"))?;
            let delta = pc_offset(base + slot, addr);
            if delta.abs() > 1020 {
                return Err(Error::ConstantTooFar {
                    constant: i.constant,
                    distance: delta,
                });
            }
            Instr::FpaStran {
                op: FpaStranOp::Ldf,
                instr: FpaStranInstr {
                    ccode: i.ccode,
                    size: FpaPrecision::Double,
                    dest: i.dest,
                    base: Reg::PC,
                    offset: delta.abs(),
                    pre_indexed: true,
                    write_back: false,
                    subtract: delta < 0,
                },
            }
        }
        Instr::VfpLdrc(i) => {
            let slot = *layout
                .slot_addr
                .get(&idx)
                .ok_or(Error::Assertion("pool load with no island slot"))?;
            let delta = pc_offset(base + slot, addr);
            if delta.abs() > 1020 {
                return Err(Error::ConstantTooFar {
                    constant: i.constant,
                    distance: delta,
                });
            }
            Instr::VfpStran {
                op: VfpStranOp::Fldd,
                instr: VfpStranInstr {
                    ccode: i.ccode,
                    dest: i.dest,
                    base: Reg::PC,
                    offset: delta.abs(),
                    pre_indexed: true,
                    write_back: false,
                    subtract: delta < 0,
                },
            }
        }
        Instr::Adr(i) => {
            let target = base
                + layout
                    .label_addr
                    .get(&i.label)
                    .copied()
                    .ok_or(Error::Assertion("address of an undefined label"))?;
            let delta = target as i32 - (addr as i32 + 8);
            let (op, magnitude) = if delta < 0 {
                (DataOp::Sub, (-delta) as u32)
            } else {
                (DataOp::Add, delta as u32)
            };
            if !subtilis_asm::can_encode_imm(magnitude) {
                return Err(Error::Encode(subtilis_asm::EncodeError::BadImmediate(
                    magnitude,
                )));
            }
            Instr::Data {
                op,
                instr: DataInstr {
                    ccode: i.ccode,
                    status: false,
                    dest: i.dest,
                    op1: Reg::PC,
                    op2: Op2::Imm(magnitude),
                },
            }
        }
        other => *other,
    };
    Ok(resolved)
}

/// Encodes a finished program to its word stream, laid out from the
/// program's start address.
pub fn encode_program(prog: &ArmProgram) -> Result<Vec<u32>> {
    let layouts: Vec<Layout> = prog.sections.iter().map(layout_section).collect();

    let mut section_bases = Vec::with_capacity(layouts.len());
    let mut addr = prog.start_address;
    for layout in &layouts {
        section_bases.push(addr);
        addr += layout.size;
    }

    // Data pools follow the code: first the front end's binary blobs,
    // then the interned strings.
    let mut blob_addr = HashMap::new();
    for (id, blob) in prog.constant_data.iter().enumerate() {
        blob_addr.insert(id, addr);
        addr += ((blob.len() as u32) + 3) & !3;
    }
    for string in &prog.strings {
        addr += ((string.len() as u32) + 3) & !3;
    }
    let heap_base = addr;

    let mut words = Vec::with_capacity(((heap_base - prog.start_address) / 4) as usize);
    for ((section, layout), &base) in prog
        .sections
        .iter()
        .zip(layouts.iter())
        .zip(section_bases.iter())
    {
        debug!(base, size = layout.size, "encoding section");
        for idx in section.indices() {
            let at = base + layout.op_addr[&idx];
            match &section.op(idx).kind {
                OpKind::Label(_) => {}
                OpKind::Directive(Directive::Word(w)) => words.push(*w),
                OpKind::Directive(Directive::Align(n)) => {
                    let mut here = at;
                    if *n > 0 {
                        while here % n != 0 {
                            words.push(0);
                            here += 4;
                        }
                    }
                }
                OpKind::Directive(Directive::Bytes(bytes)) => push_bytes(&mut words, bytes),
                OpKind::Instr(instr) => {
                    let resolved =
                        resolve_instr(instr, at, idx, layout, &section_bases, base)?;
                    words.push(encode_instr(&resolved)?);
                }
            }
            if let Some(ids) = layout.islands.get(&Some(idx)) {
                for &id in ids {
                    emit_constant(&mut words, &section.constants[id], prog.fp_kind, &blob_addr)?;
                }
            }
        }
        if let Some(ids) = layout.islands.get(&None) {
            for &id in ids {
                emit_constant(&mut words, &section.constants[id], prog.fp_kind, &blob_addr)?;
            }
        }
    }

    for blob in &prog.constant_data {
        push_bytes(&mut words, blob);
    }
    for string in &prog.strings {
        push_bytes(&mut words, string);
    }

    // The second word of the image is the heap base, read by the
    // preamble and the allocation built-ins.
    if words.len() > 1 {
        words[1] = heap_base;
    }
    Ok(words)
}

fn push_bytes(words: &mut Vec<u32>, bytes: &[u8]) {
    for chunk in bytes.chunks(4) {
        let mut b = [0u8; 4];
        b[..chunk.len()].copy_from_slice(chunk);
        words.push(u32::from_le_bytes(b));
    }
}

/// The absolute image as bytes, little endian words, ready to be saved
/// with a `,ff8` suffix.
pub fn program_bytes(prog: &ArmProgram) -> Result<Vec<u8>> {
    Ok(encode_program(prog)?
        .into_iter()
        .flat_map(u32::to_le_bytes)
        .collect())
}
