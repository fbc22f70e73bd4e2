//! The backtrackable `setarg/3` (and `nb_setarg/3`) primitive, and
//! constraint-list extraction for attributed variables (spec §4.7).

use crate::choice_trail::SetArgMode;
use crate::emu::Worker;
use crate::error::{EngineError, EngineResult};
use crate::tagged::{Tag, Word};

/// `setarg(Index, Term, Value)`. `backtrackable` selects between the two
/// `setarg/3` and `nb_setarg/3` library predicates, both built on the same
/// choice/trail primitive (spec §4.2, §4.7).
pub fn setarg(worker: &mut Worker, term_addr: usize, index: usize, new: Word, backtrackable: bool) {
    let mode = if backtrackable { SetArgMode::On } else { SetArgMode::True };
    worker.choice_trail.setarg(&mut worker.areas, term_addr, index, new, mode);
}

/// Collect the attributed-variable cells still live around `var`, scanning
/// choicepoints youngest-to-oldest (spec §4.7, grounded on
/// `find_constraints`/`constraint_list` at
/// `examples/original_source/core/engine/internals.c:1990`).
///
/// Each choicepoint owns the heap segment between its own `heap_top` and its
/// (older) predecessor's, and `find_constraints` walks that segment looking
/// for a self-referential `CVA` cell (`v == Tagp(CVA, h-1)`): a cell that is
/// still its own unbound attributed variable. The scan stops once a
/// choicepoint's segment no longer reaches above `var`'s own address, since
/// anything older cannot have been created after `var`. Before returning,
/// the heap must have room for the result's cons cells; `explicit_heap_overflow`'s
/// power-of-two growth loop is modeled by doubling the configured pad and
/// reserving until the capacity check passes.
pub fn constraint_list(worker: &mut Worker, var: Word) -> EngineResult<Vec<Word>> {
    if var.tag() != Tag::Cva {
        return Ok(Vec::new());
    }
    let limit = var
        .address()
        .ok_or_else(|| EngineError::Serious("CVA cell has no address".into()))?;

    let found = collect_cva_cells(worker, limit);

    let mut needed = found.len() * 2; // each result cons cell costs 2 heap words
    while worker.areas.heap.len() + needed > worker.areas.heap.capacity() {
        let mut pad = worker.areas.pad.max(1);
        pad <<= 1;
        worker.areas.pad = pad;
        worker.areas.heap.reserve(needed.max(pad));
        worker.areas.shift_usage.heap_shifts += 1;
        needed = found.len() * 2;
    }

    Ok(found)
}

/// Scan every choicepoint's heap segment, youngest first, for self-reference
/// `CVA` cells, clipping the oldest qualifying segment's lower bound to
/// `limit` (spec's `h<limit => h=limit`).
fn collect_cva_cells(worker: &Worker, limit: usize) -> Vec<Word> {
    let mut out = Vec::new();
    let cps = &worker.choice_trail.choicepoints;
    for i in (0..cps.len()).rev() {
        let upper = cps[i].marks.heap_top;
        if upper <= limit {
            break;
        }
        let lower = if i == 0 { 0 } else { cps[i - 1].marks.heap_top }.max(limit);
        for addr in lower..upper {
            if let Some(cell) = worker.areas.heap.get(addr) {
                if cell.tag() == Tag::Cva && cell.is_self_ref_at(addr) {
                    out.push(*cell);
                }
            }
        }
    }
    out
}
