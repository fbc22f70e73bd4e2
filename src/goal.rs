//! A single schedulable unit of work (spec §5, WGS): a goal call, its
//! private worker, and the state machine the scheduler drives it through.

use std::sync::Mutex;
use std::thread::JoinHandle;

use crate::emu::{ExitCode, Worker};
use crate::tagged::{Functor, Word};

/// The goal's life-cycle state (spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalState {
    /// On the free ring, no worker attached.
    Idle,
    /// Running on its own thread.
    Working,
    /// `wam()` returned `Success`; a solution is waiting and the goal can
    /// be asked for more (backtrack) or released.
    PendingSols,
    /// `wam()` returned `Failure` or `Abort`; no more solutions.
    Failed,
}

/// What the scheduler must do with a goal once its thread returns (spec
/// §5's action-flag vocabulary).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionFlags {
    /// Don't truncate the worker's memory areas on release — a subsequent
    /// call will reuse them (e.g. `findall`-style re-entry).
    pub keep_stacks: bool,
    /// A fresh OS thread must be spawned for the next activation (always
    /// true the first time a descriptor is used for a new call).
    pub create_thread: bool,
    /// The descriptor's worker must be dropped before returning it to the
    /// idle ring.
    pub needs_freeing: bool,
}

/// One entry in the scheduler's goal ring (spec §5).
pub struct GoalDescriptor {
    pub number: u64,
    pub state: GoalState,
    pub pred: Functor,
    pub args: Vec<Word>,
    pub action: ActionFlags,
    pub worker: Option<Worker>,
    pub thread: Option<JoinHandle<ExitCode>>,
    pub last_exit: Option<ExitCode>,
    /// Serializes access to this one descriptor; the scheduler's own lock
    /// only ever guards ring membership, never a goal's own state (spec
    /// §5: "a per-goal lock, not the global scheduler lock, guards
    /// goal-local state transitions").
    pub lock: Mutex<()>,
    pub(crate) next: Option<usize>,
    pub(crate) prev: Option<usize>,
}

impl GoalDescriptor {
    pub fn new(number: u64) -> Self {
        GoalDescriptor {
            number,
            state: GoalState::Idle,
            pred: Functor::new(crate::atom::AtomId(0), 0),
            args: Vec::new(),
            action: ActionFlags::default(),
            worker: None,
            thread: None,
            last_exit: None,
            lock: Mutex::new(()),
            next: None,
            prev: None,
        }
    }

    /// Reset this descriptor to a reusable idle state, dropping its worker
    /// unless `KEEP_STACKS` was requested.
    pub fn recycle(&mut self) {
        if !self.action.keep_stacks {
            self.worker = None;
        }
        self.state = GoalState::Idle;
        self.action = ActionFlags { create_thread: true, ..ActionFlags::default() };
        self.thread = None;
    }
}
