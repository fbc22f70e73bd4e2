//! The bytecode emulator's entry/exit contract (spec §4.4, §6.2).
//!
//! The bytecode *compiler* is out of scope (spec §1); what's specified here
//! is the contract between the scheduler and the emulator loop: the WAM
//! registers, the `wam()` call, its exit codes, and the minimal op set
//! needed to drive a clause's head unification and body dispatch through
//! the try-chain CDB hands back. Op naming is grounded in
//! `examples/other_examples/..._eignnx-pentagwam__src-instr.rs.rs`, a
//! from-scratch WAM instruction set in Rust.

use std::sync::Arc;

use crate::atom::AtomId;
use crate::cdb::{ClauseDatabase, TryChain};
use crate::choice_trail::ChoiceTrail;
use crate::error::{EngineError, EngineResult};
use crate::mem::MemoryAreas;
use crate::tagged::{Functor, Word};

/// One bytecode operation. Head ("get") instructions unify an argument
/// register against a pattern; body ("put"/"call") instructions build the
/// next goal's arguments and dispatch.
#[derive(Debug, Clone)]
pub enum ByteOp {
    /// Unify `X[arg]` with the atom `atom`.
    GetAtom { arg: usize, atom: AtomId },
    /// Unify `X[arg]` with the small integer `val`.
    GetSmall { arg: usize, val: i64 },
    /// `X[arg]` is an unbound variable in the clause head — always
    /// succeeds, binding the caller's argument to the register `dst`
    /// (a fresh copy, analogous to WAM `get_variable`).
    GetVariable { arg: usize, dst: usize },
    /// Build an atom into `X[dst]` for the next call (`put_atom`/`put_const`).
    PutAtom { dst: usize, atom: AtomId },
    PutSmall { dst: usize, val: i64 },
    /// Copy `X[src]` into `X[dst]` for the next call (`put_value`).
    PutValue { dst: usize, src: usize },
    /// Call `pred` with the first `arity` X-registers as arguments,
    /// continuing at the next op on return (`call`, spec's EMU contract).
    Call { pred: Functor, arity: usize },
    /// Tail call: like `Call` but does not expect to return here.
    Execute { pred: Functor, arity: usize },
    /// Successful exit of the current clause.
    Proceed,
    /// Reserve an environment frame on the local stack (spec §3.3).
    Allocate,
    /// Pop the current environment frame.
    Deallocate,
}

/// A saved continuation for an interrupted or trapped computation (spec
/// §3.5's "trapped frame", §7's interrupted-I/O re-entry).
#[derive(Debug, Clone)]
pub struct TrapFrame {
    pub clause: Arc<CompiledClause>,
    pub pc: usize,
}

/// One clause's compiled bytecode block (spec §3.4: "doubly-terminated
/// linked list of clauses"; here each node just carries its ops plus the
/// clause number CDB assigns it).
#[derive(Debug, Clone)]
pub struct CompiledClause {
    pub number: u64,
    pub ops: Vec<ByteOp>,
}

/// The emulator's exit codes (spec §4.4).
#[derive(Debug, Clone, PartialEq)]
pub enum ExitCode {
    /// A solution was produced; choicepoints may remain.
    Success,
    /// The ghost initial choicepoint was hit: no (more) solutions.
    Failure,
    /// Unrecoverable; the scheduler's abort loop takes over.
    Abort(String),
    /// A signal arrived during I/O; the scheduler patches the resume point
    /// and re-enters.
    Interrupted,
}

/// One worker's registers and private memory areas (spec §4.4, §5: workers
/// are never shared across threads).
pub struct Worker {
    pub x: Vec<Word>,
    pub areas: MemoryAreas,
    pub choice_trail: ChoiceTrail,
    /// The emulator's exit status, written to a "well-known slot of the
    /// worker's misc block" per spec §6.2.
    pub misc_exit_status: Option<ExitCode>,
    /// One entry per live choicepoint, so backtracking into it knows which
    /// try-chain to resume (spec §3.3's `next_alt`, §4.4's try-chain
    /// contract). Pushed in lockstep with `choice_trail.choicepoints`.
    pending_retries: Vec<PendingRetry>,
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

impl Worker {
    pub fn new() -> Self {
        Worker {
            x: Vec::new(),
            areas: MemoryAreas::default(),
            choice_trail: ChoiceTrail::new(),
            misc_exit_status: None,
            pending_retries: Vec::new(),
        }
    }

    fn ensure_reg(&mut self, idx: usize) {
        if self.x.len() <= idx {
            self.x.resize(idx + 1, Word::new_small(0).unwrap());
        }
    }

    /// Materialize a goal's call arguments onto this worker's own heap
    /// before the first call (spec §6.2's entry ABI: the caller allocates
    /// argument variables on the callee's heap). A freshly submitted goal
    /// carries no heap of its own to point into, so any unbound variable
    /// argument is replaced with a fresh self-referential cell pushed here;
    /// already-bound arguments (atoms, numbers, or variables already live on
    /// this heap) pass through unchanged.
    pub fn globalize_args(&mut self, args: Vec<Word>) -> Vec<Word> {
        args.into_iter()
            .map(|w| {
                if w.is_variable() && !self.is_own_heap_var(w) {
                    let addr = self.areas.heap.len();
                    self.areas.heap.push(Word::new_hva(addr));
                    Word::new_hva(addr)
                } else {
                    w
                }
            })
            .collect()
    }

    fn is_own_heap_var(&self, w: Word) -> bool {
        match w.address() {
            Some(addr) => self.areas.heap.get(addr).is_some_and(|cell| cell.is_self_ref_at(addr)),
            None => false,
        }
    }
}

/// Dereference a tagged word through the heap/local-stack chain until a
/// non-variable or a self-reference is found (spec §3.1, invariant 1:
/// bounded by the number of cells allocated so far).
pub fn deref(areas: &MemoryAreas, mut w: Word) -> EngineResult<Word> {
    let bound = areas.heap.len() + areas.local_stack.len() + 1;
    for _ in 0..bound {
        let addr = match w.address() {
            Some(addr) if w.is_variable() => addr,
            _ => return Ok(w),
        };
        use crate::tagged::Tag;
        let cell = match w.tag() {
            Tag::Sva => *areas
                .local_stack
                .get(addr)
                .ok_or_else(|| EngineError::Serious("dangling SVA".into()))?,
            _ => *areas
                .heap
                .get(addr)
                .ok_or_else(|| EngineError::Serious("dangling HVA/CVA".into()))?,
        };
        if cell == w {
            return Ok(w); // self-reference: unbound
        }
        w = cell;
    }
    Err(EngineError::Serious("dereference chain did not terminate".into()))
}

/// Run one clause's ops against the worker's current X-registers. Returns
/// `Ok(true)` on a head-unification mismatch (the clause simply doesn't
/// apply — caller should try the next alternative), `Ok(false)` with
/// `Proceed` reached meaning success, or propagates a real error.
fn run_clause(
    worker: &mut Worker,
    cdb: &ClauseDatabase,
    clause: &CompiledClause,
) -> EngineResult<ClauseOutcome> {
    let mut pc = 0;
    while pc < clause.ops.len() {
        match &clause.ops[pc] {
            ByteOp::GetAtom { arg, atom } => {
                worker.ensure_reg(*arg);
                let d = deref(&worker.areas, worker.x[*arg])?;
                if d.is_variable() {
                    let addr = d.address().unwrap();
                    worker.choice_trail.bind(&mut worker.areas, addr, Word::new_atom(*atom));
                } else if d.atom_id() != Some(*atom) {
                    return Ok(ClauseOutcome::Mismatch);
                }
            }
            ByteOp::GetSmall { arg, val } => {
                worker.ensure_reg(*arg);
                let d = deref(&worker.areas, worker.x[*arg])?;
                if d.is_variable() {
                    let addr = d.address().unwrap();
                    let w = Word::new_small(*val)
                        .ok_or_else(|| EngineError::Representation { which: crate::error::Representation::CharacterCode })?;
                    worker.choice_trail.bind(&mut worker.areas, addr, w);
                } else if d.small_value_checked() != Some(*val) {
                    return Ok(ClauseOutcome::Mismatch);
                }
            }
            ByteOp::GetVariable { arg, dst } => {
                worker.ensure_reg(*arg);
                worker.ensure_reg(*dst);
                worker.x[*dst] = worker.x[*arg];
            }
            ByteOp::PutAtom { dst, atom } => {
                worker.ensure_reg(*dst);
                worker.x[*dst] = Word::new_atom(*atom);
            }
            ByteOp::PutSmall { dst, val } => {
                worker.ensure_reg(*dst);
                worker.x[*dst] = Word::new_small(*val)
                    .ok_or_else(|| EngineError::Representation { which: crate::error::Representation::CharacterCode })?;
            }
            ByteOp::PutValue { dst, src } => {
                worker.ensure_reg(*src);
                worker.ensure_reg(*dst);
                worker.x[*dst] = worker.x[*src];
            }
            ByteOp::Allocate | ByteOp::Deallocate => {
                // Environment-frame bookkeeping; out-of-scope compiler
                // detail beyond marking the local-stack watermark moves.
            }
            ByteOp::Call { pred, arity } | ByteOp::Execute { pred, arity } => {
                let args = worker.x[..*arity].to_vec();
                match call_predicate(worker, cdb, *pred, args)? {
                    ExitCode::Success => {}
                    ExitCode::Failure => return Ok(ClauseOutcome::Mismatch),
                    other => return Ok(ClauseOutcome::Exit(other)),
                }
            }
            ByteOp::Proceed => return Ok(ClauseOutcome::Proceed),
        }
        pc += 1;
    }
    Ok(ClauseOutcome::Proceed)
}

enum ClauseOutcome {
    Proceed,
    Mismatch,
    Exit(ExitCode),
}

/// Call `pred` with `args` as the new argument registers, trying `pred`'s
/// try-chain in order and pushing a choicepoint if more than one
/// alternative remains (spec §4.4: "EMU picks head alternative; on
/// backtracking, consumes the next").
pub fn call_predicate(
    worker: &mut Worker,
    cdb: &ClauseDatabase,
    pred: Functor,
    args: Vec<Word>,
) -> EngineResult<ExitCode> {
    let chain = match cdb.try_chain_for_call(pred, args.first().copied()) {
        Some(chain) => chain,
        None => {
            return Err(EngineError::existence("procedure", format!("{:?}/{}", pred.name, pred.arity)));
        }
    };
    try_from(worker, cdb, pred, args, chain, 0)
}

fn try_from(
    worker: &mut Worker,
    cdb: &ClauseDatabase,
    pred: Functor,
    args: Vec<Word>,
    chain: TryChain,
    start: usize,
) -> EngineResult<ExitCode> {
    let mut idx = start;
    while idx < chain.alternatives.len() {
        let remaining = chain.alternatives.len() - idx - 1;
        if remaining > 0 {
            worker.choice_trail.push_choicepoint(&mut worker.areas, args.clone(), idx + 1, None);
            // Stash enough to resume this exact try-chain on backtrack.
            worker.pending_retries.push(PendingRetry {
                pred,
                args: args.clone(),
                chain: chain.clone(),
            });
        }
        let saved_x = std::mem::replace(&mut worker.x, args.clone());
        let outcome = run_clause(worker, cdb, &chain.alternatives[idx]);
        match outcome {
            Ok(ClauseOutcome::Proceed) => return Ok(ExitCode::Success),
            Ok(ClauseOutcome::Mismatch) => {
                worker.x = saved_x;
                idx += 1;
                continue;
            }
            Ok(ClauseOutcome::Exit(code)) => return Ok(code),
            Err(e) => return Err(e),
        }
    }
    Ok(ExitCode::Failure)
}

/// A resumable record of "the try-chain we were part-way through", so that
/// backtracking into a choicepoint created by `try_from` can pick up the
/// next alternative (spec §3.3's `next_alt` field, generalised across the
/// simplified single-call-site emulator this crate implements).
#[derive(Clone)]
pub struct PendingRetry {
    pub pred: Functor,
    pub args: Vec<Word>,
    pub chain: TryChain,
}

/// Resume execution after backtracking into the youngest choicepoint:
/// unwind its trail, then retry from its saved `next_alt`.
pub fn make_backtracking(worker: &mut Worker, cdb: &ClauseDatabase) -> EngineResult<ExitCode> {
    let retry = match worker.pending_retries.pop() {
        Some(r) => r,
        None => return Ok(ExitCode::Failure),
    };
    let cp = match worker.choice_trail.backtrack(&mut worker.areas) {
        Some(cp) => cp,
        None => return Ok(ExitCode::Failure),
    };
    try_from(worker, cdb, retry.pred, retry.args, retry.chain, cp.next_alt)
}

impl Word {
    /// `small_value` without the debug assertion, for use where the tag is
    /// not already known to be `Num`.
    fn small_value_checked(self) -> Option<i64> {
        use crate::tagged::Tag;
        (self.tag() == Tag::Num).then(|| self.small_value())
    }
}
