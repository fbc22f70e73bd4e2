//! The worker/goal scheduler (spec §5, WGS): a ring of goal descriptors,
//! each activated on its own OS thread. Per spec §5, goals are scheduled
//! as OS threads coordinated with `Mutex`/`Condvar`, not async tasks — the
//! one place this crate departs from the teacher's `tokio` actor-mailbox
//! model, because the spec is explicit that workers must be real threads
//! with private, non-shared memory areas.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use crate::cdb::ClauseDatabase;
use crate::emu::{self, ExitCode};
use crate::event_log::{EventKind, EventLog};
use crate::goal::{ActionFlags, GoalDescriptor, GoalState};
use crate::tagged::{Functor, Word};

struct Ring {
    descriptors: Vec<GoalDescriptor>,
    idle: VecDeque<usize>,
}

impl Ring {
    fn new() -> Self {
        Ring { descriptors: Vec::new(), idle: VecDeque::new() }
    }
}

/// `gimme_a_new_gd` / activation / release, all in one place (spec §5).
pub struct WorkerGoalScheduler {
    ring: Arc<Mutex<Ring>>,
    cdb: Arc<ClauseDatabase>,
    events: Arc<EventLog>,
    reap_tx: mpsc::Sender<usize>,
}

impl WorkerGoalScheduler {
    pub fn new(cdb: Arc<ClauseDatabase>, events: Arc<EventLog>) -> Self {
        let ring = Arc::new(Mutex::new(Ring::new()));
        let (reap_tx, reap_rx) = mpsc::channel::<usize>();

        // The thread reaper: joins each goal's OS thread once it signals
        // completion, so finished threads never accumulate unjoined.
        let reaper_ring = ring.clone();
        std::thread::spawn(move || {
            while let Ok(idx) = reap_rx.recv() {
                let handle = {
                    let mut ring = reaper_ring.lock().unwrap();
                    ring.descriptors[idx].thread.take()
                };
                if let Some(h) = handle {
                    let _ = h.join();
                }
            }
        });

        WorkerGoalScheduler { ring, cdb, events, reap_tx }
    }

    /// `gimme_a_new_gd`: pop a recycled descriptor off the idle ring, or
    /// grow the ring with a fresh one.
    fn gimme_a_new_gd(&self) -> usize {
        let mut ring = self.ring.lock().unwrap();
        if let Some(idx) = ring.idle.pop_front() {
            return idx;
        }
        let number = ring.descriptors.len() as u64;
        ring.descriptors.push(GoalDescriptor::new(number));
        ring.descriptors.len() - 1
    }

    /// Submit a new goal call, spawning a dedicated thread to run it to
    /// its first solution (or failure). Returns the descriptor index.
    pub fn submit(&self, pred: Functor, args: Vec<Word>) -> usize {
        let idx = self.gimme_a_new_gd();
        let mut worker = {
            let mut ring = self.ring.lock().unwrap();
            let gd = &mut ring.descriptors[idx];
            gd.pred = pred;
            gd.state = GoalState::Working;
            gd.action = ActionFlags { create_thread: true, ..ActionFlags::default() };
            gd.worker.take().unwrap_or_default()
        };
        // A submitted goal carries no heap of its own to point into, so any
        // unbound argument must be materialized on this worker's heap
        // before the call (spec §6.2's entry ABI).
        let args = worker.globalize_args(args);
        {
            let mut ring = self.ring.lock().unwrap();
            ring.descriptors[idx].args = args.clone();
        }

        let cdb = self.cdb.clone();
        let events = self.events.clone();
        let ring = self.ring.clone();
        let reap_tx = self.reap_tx.clone();
        let handle = std::thread::spawn(move || {
            let outcome = emu::call_predicate(&mut worker, &cdb, pred, args);
            let exit = match outcome {
                Ok(code) => code,
                Err(e) => {
                    events.publish(EventKind::Abort, e.to_string());
                    let drained = cdb.empty_gcdef_bin();
                    events.publish(EventKind::PredicateAbolished, format!("gcdef bin drained: {drained} entries"));
                    ExitCode::Abort(e.to_string())
                }
            };
            Self::complete(&ring, idx, worker, exit.clone());
            let _ = reap_tx.send(idx);
            exit
        });

        self.ring.lock().unwrap().descriptors[idx].thread = Some(handle);
        idx
    }

    /// Resume the youngest choicepoint of an already-`PendingSols` goal,
    /// looking for the next solution. Spawns a fresh thread, as a real
    /// re-entry into `wam()` would (spec §4.4, §5).
    pub fn request_more(&self, idx: usize) {
        let (cdb, events, ring, reap_tx) = (self.cdb.clone(), self.events.clone(), self.ring.clone(), self.reap_tx.clone());
        let mut worker = {
            let mut ring = self.ring.lock().unwrap();
            let gd = &mut ring.descriptors[idx];
            gd.state = GoalState::Working;
            gd.worker.take().expect("request_more on a goal with no worker")
        };
        let handle = std::thread::spawn(move || {
            let outcome = emu::make_backtracking(&mut worker, &cdb);
            let exit = match outcome {
                Ok(code) => code,
                Err(e) => {
                    events.publish(EventKind::Abort, e.to_string());
                    ExitCode::Abort(e.to_string())
                }
            };
            Self::complete(&ring, idx, worker, exit.clone());
            let _ = reap_tx.send(idx);
            exit
        });
        self.ring.lock().unwrap().descriptors[idx].thread = Some(handle);
    }

    fn complete(ring: &Arc<Mutex<Ring>>, idx: usize, worker: crate::emu::Worker, exit: ExitCode) {
        let mut ring = ring.lock().unwrap();
        let gd = &mut ring.descriptors[idx];
        gd.worker = Some(worker);
        gd.last_exit = Some(exit.clone());
        gd.state = match exit {
            ExitCode::Success => GoalState::PendingSols,
            _ => GoalState::Failed,
        };
    }

    /// Release a goal descriptor back to the idle ring (spec §5). The
    /// descriptor's worker is dropped unless `KEEP_STACKS` is set.
    pub fn release(&self, idx: usize) {
        let mut ring = self.ring.lock().unwrap();
        ring.descriptors[idx].recycle();
        ring.idle.push_back(idx);
    }

    pub fn state_of(&self, idx: usize) -> GoalState {
        self.ring.lock().unwrap().descriptors[idx].state
    }

    pub fn last_exit_of(&self, idx: usize) -> Option<ExitCode> {
        self.ring.lock().unwrap().descriptors[idx].last_exit.clone()
    }

    pub fn idle_count(&self) -> usize {
        self.ring.lock().unwrap().idle.len()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().unwrap().descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomId;
    use crate::cdb::{DefineMode, FirstArgShape, OtherKey};
    use crate::emu::ByteOp;

    fn fact_pred(sched: &WorkerGoalScheduler) -> Functor {
        let key = Functor::new(AtomId(10), 1);
        sched.cdb.define_predicate(key, DefineMode::Unprofiled);
        let def = sched.cdb.find_definition(key, false).unwrap();
        sched.cdb.compiled_clause(&def, vec![ByteOp::GetSmall { arg: 0, val: 1 }, ByteOp::Proceed], FirstArgShape::Other(OtherKey::Small(1)));
        sched.cdb.compiled_clause(&def, vec![ByteOp::GetSmall { arg: 0, val: 2 }, ByteOp::Proceed], FirstArgShape::Other(OtherKey::Small(2)));
        key
    }

    #[test]
    fn submit_runs_to_first_solution() {
        let cdb = Arc::new(ClauseDatabase::new());
        let events = Arc::new(EventLog::new(10));
        let sched = WorkerGoalScheduler::new(cdb, events);
        let pred = fact_pred(&sched);

        let idx = sched.submit(pred, vec![Word::new_hva(0)]);
        while sched.state_of(idx) == GoalState::Working {
            std::thread::yield_now();
        }
        assert_eq!(sched.state_of(idx), GoalState::PendingSols);
    }

    #[test]
    fn release_recycles_descriptor() {
        let cdb = Arc::new(ClauseDatabase::new());
        let events = Arc::new(EventLog::new(10));
        let sched = WorkerGoalScheduler::new(cdb, events);
        let pred = fact_pred(&sched);

        let idx = sched.submit(pred, vec![Word::new_hva(0)]);
        while sched.state_of(idx) == GoalState::Working {
            std::thread::yield_now();
        }
        sched.release(idx);
        assert_eq!(sched.state_of(idx), GoalState::Idle);
        assert_eq!(sched.idle_count(), 1);

        let idx2 = sched.submit(pred, vec![Word::new_hva(0)]);
        assert_eq!(idx, idx2, "recycled descriptor should be reused before growing the ring");
    }
}
