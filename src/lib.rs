//! A WAM-style tagged-memory logic engine core: clause database,
//! choicepoint/trail machinery, bytecode emulator contract, and a
//! goal/worker scheduler (spec §1).
//!
//! Global mutable state is never ambient: callers construct an [`Engine`],
//! an explicit context bundling the atom table, predicate database, engine
//! flags and event log, and thread it through every call. This replaces
//! the teacher's `lazy_static!` global instance pattern with the
//! explicitly-constructed-context style spec design notes call for.

pub mod atom;
pub mod builtins;
pub mod cdb;
pub mod choice_trail;
pub mod config;
pub mod emu;
pub mod error;
pub mod event_log;
pub mod goal;
pub mod mem;
pub mod scheduler;
pub mod tagged;

use std::sync::Arc;

use atom::AtomTable;
use cdb::ClauseDatabase;
use config::EngineFlags;
use event_log::EventLog;
use scheduler::WorkerGoalScheduler;

/// The engine's explicit context: everything shared across workers, bundled
/// so a process can run more than one independently-configured engine
/// (spec Design Notes §9).
pub struct Engine {
    pub atoms: Arc<AtomTable>,
    pub cdb: Arc<ClauseDatabase>,
    pub flags: EngineFlags,
    pub events: Arc<EventLog>,
    pub scheduler: WorkerGoalScheduler,
}

impl Engine {
    pub fn new(flags: EngineFlags) -> Self {
        let atoms = Arc::new(AtomTable::new());
        let cdb = Arc::new(ClauseDatabase::new());
        let events = Arc::new(EventLog::default());
        let scheduler = WorkerGoalScheduler::new(cdb.clone(), events.clone());
        Engine { atoms, cdb, flags, events, scheduler }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineFlags::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdb::{DefineMode, FirstArgShape, OtherKey};
    use crate::emu::ByteOp;
    use crate::goal::GoalState;
    use crate::tagged::{Functor, Word};

    #[test]
    fn engine_runs_a_call_end_to_end() {
        let engine = Engine::default();
        let name = engine.atoms.intern("one");
        let key = Functor::new(name, 1);
        engine.cdb.define_predicate(key, DefineMode::Unprofiled);
        let def = engine.cdb.find_definition(key, false).unwrap();
        engine.cdb.compiled_clause(
            &def,
            vec![ByteOp::GetSmall { arg: 0, val: 1 }, ByteOp::Proceed],
            FirstArgShape::Other(OtherKey::Small(1)),
        );

        let idx = engine.scheduler.submit(key, vec![Word::new_small(1).unwrap()]);
        while engine.scheduler.state_of(idx) == GoalState::Working {
            std::thread::yield_now();
        }
        assert_eq!(engine.scheduler.state_of(idx), GoalState::PendingSols);
    }
}
