//! Clause database: per-predicate storage, indexing, incremental insertion
//! and deferred reclamation (spec §4.1).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::atom::AtomId;
use crate::emu::{ByteOp, CompiledClause};
use crate::tagged::{Functor, Word};

/// `define_predicate`'s compilation mode (spec §3.4, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineMode {
    Unprofiled,
    Profiled,
    Interpreted,
}

/// The classification of a clause's first head argument, used to decide
/// which index try-chains it joins (spec §4.1 "Indexing policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirstArgShape {
    /// The head's first argument is itself an unbound variable: this clause
    /// can unify with anything and must join every index.
    Var,
    List,
    Other(OtherKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtherKey {
    Atom(AtomId),
    Small(i64),
    Functor(Functor),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefProperties {
    pub dynamic: bool,
    pub concurrent: bool,
    pub multifile: bool,
    pub wait: bool,
    pub spy: bool,
    pub breakpoint: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Undefined,
    Compact,
    CompactIndexed,
    Profiled,
    ProfiledIndexed,
    Interpreted,
    NativeC,
}

/// A hash table keyed on `OtherKey`, growing (doubling) once its load
/// factor exceeds 1/2 (spec §4.1). Each bucket also carries the
/// var-headed "default" clauses so a lookup that misses the specific key
/// still finds them, matching the spec's "varcase copied into othercase's
/// default" promotion rule.
#[derive(Debug, Default)]
pub struct OtherCase {
    /// Clauses whose head's first argument is an unbound variable; these
    /// match any call key and seed every bucket, including ones created
    /// later.
    default: Vec<Arc<CompiledClause>>,
    buckets: HashMap<OtherKey, Vec<Arc<CompiledClause>>>,
    capacity: usize,
}

impl OtherCase {
    fn seeded(default: Vec<Arc<CompiledClause>>) -> Self {
        OtherCase { default, buckets: HashMap::new(), capacity: 8 }
    }

    fn lookup(&self, key: OtherKey) -> Vec<Arc<CompiledClause>> {
        match self.buckets.get(&key) {
            Some(v) => v.clone(),
            None => self.default.clone(),
        }
    }

    fn maybe_grow(&mut self) {
        if self.buckets.len() * 2 > self.capacity {
            self.capacity *= 2;
            // "expansion rehashes in place into a fresh table twice the
            // size" — reinsert every bucket into a freshly sized map.
            let old = std::mem::replace(&mut self.buckets, HashMap::with_capacity(self.capacity));
            for (k, v) in old {
                self.buckets.insert(k, v);
            }
        }
    }

    fn insert_other(&mut self, key: OtherKey, clause: Arc<CompiledClause>) {
        let entry = self
            .buckets
            .entry(key)
            .or_insert_with(|| self.default.clone());
        entry.push(clause);
        self.maybe_grow();
    }

    /// A var-headed clause joins every existing bucket plus the default,
    /// so future buckets (created lazily) also pick it up.
    fn insert_var(&mut self, clause: Arc<CompiledClause>) {
        for bucket in self.buckets.values_mut() {
            bucket.push(clause.clone());
        }
        self.default.push(clause);
    }
}

/// Storage for a compiled (non-dynamic) predicate.
#[derive(Debug, Default)]
pub struct CompiledStorage {
    /// Every clause ever inserted, in insertion order — the "doubly
    /// terminated linked list" of spec §3.4, represented as a flat vector
    /// since arena/index-based storage needs no pointer-chasing here.
    pub all_clauses: Vec<Arc<CompiledClause>>,
    indexed: bool,
    /// `varcase` is never stored separately: a call whose first argument
    /// is an unbound variable unifies against *any* clause head, so its
    /// try-chain is always `all_clauses` (spec §4.1's indexing policy read
    /// literally: "varcase iff its head-arg-1 unifies with a variable" is
    /// true for every clause, since anything unifies with a free variable).
    lstcase: Option<Vec<Arc<CompiledClause>>>,
    othercase: Option<OtherCase>,
    next_clause_number: u64,
    /// One-slot cache of the last inserted position (spec §3.4: "a
    /// one-slot cache of the last inserted position to keep incremental
    /// compilation near-linear"). Holds the clause number most recently
    /// appended; §9(b)'s invariant (no clause erased between cached
    /// insertions) is asserted in `CachedInsertion`.
    last_inserted: Option<u64>,
}

#[derive(Debug, Default)]
pub struct InterpretedStorage {
    pub instances: Vec<Arc<CompiledClause>>,
    index: HashMap<OtherKey, Vec<Arc<CompiledClause>>>,
    next_clause_number: u64,
}

pub enum DefStorage {
    Undefined,
    Compiled(CompiledStorage),
    Interpreted(InterpretedStorage),
}

pub struct Definition {
    pub key: Functor,
    pub kind: EntryKind,
    pub storage: DefStorage,
    pub properties: DefProperties,
}

impl Definition {
    fn undefined(key: Functor) -> Self {
        Definition { key, kind: EntryKind::Undefined, storage: DefStorage::Undefined, properties: DefProperties::default() }
    }
}

/// The chain of alternatives EMU is handed for one call (spec §4.4).
#[derive(Clone, Default)]
pub struct TryChain {
    pub alternatives: Vec<Arc<CompiledClause>>,
}

/// A predicate specification accepted by `parse_definition` (spec §4.1):
/// either a plain `Name/Arity`, or a compiler-generated auxiliary nested as
/// `(Parent - ClauseNo) - SubNo / Arity`.
#[derive(Debug, Clone)]
pub enum DefSpec {
    Plain(Functor),
    SubDefinition { parent: Functor, clause_no: u64, sub_no: u64, arity: u16 },
}

/// Storage evicted by `abolish`, waiting for a quiescent point (spec §4.1
/// "Deferred reclamation"). Never freed while any worker might still be
/// executing it — that's why this is a bin, not an immediate drop.
struct GcDefBin {
    pending: Vec<DefStorage>,
}

pub struct ClauseDatabase {
    /// Writers hold this for the whole mutation; readers take it only long
    /// enough to clone the `Arc<Definition>` they want, then walk its
    /// try-chains without holding any lock (spec §4.1 "Thread-safety":
    /// append-only chains, release-ordered publication).
    table: Mutex<HashMap<Functor, Arc<Mutex<Definition>>>>,
    sub_definitions: Mutex<HashMap<(Functor, u64, u64), Functor>>,
    next_sub_id: Mutex<u32>,
    gcdef_bin: Mutex<GcDefBin>,
    num_predicates: Mutex<i64>,
}

impl Default for ClauseDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl ClauseDatabase {
    pub fn new() -> Self {
        ClauseDatabase {
            table: Mutex::new(HashMap::new()),
            sub_definitions: Mutex::new(HashMap::new()),
            next_sub_id: Mutex::new(0),
            gcdef_bin: Mutex::new(GcDefBin { pending: Vec::new() }),
            num_predicates: Mutex::new(0),
        }
    }

    /// `find_definition(table, term, insert?)` (spec §4.1). `term` is
    /// already resolved to a `Functor` key by the caller (term inspection
    /// — extracting arity for atoms/lists/structures — belongs to the
    /// reader front-end, out of scope here).
    pub fn find_definition(&self, key: Functor, insert: bool) -> Option<Arc<Mutex<Definition>>> {
        let mut table = self.table.lock().unwrap();
        if let Some(def) = table.get(&key) {
            return Some(def.clone());
        }
        if !insert {
            return None;
        }
        // Build the whole definition body before publishing it, so a
        // concurrent reader who misses the lock on this exact call either
        // sees nothing or sees a complete, undefined-kind definition —
        // never a half-built one (spec §5 ordering guarantee).
        let def = Arc::new(Mutex::new(Definition::undefined(key)));
        table.insert(key, def.clone());
        Some(def)
    }

    /// `parse_definition(term)` (spec §4.1): resolves a `DefSpec` to a
    /// `Definition`, creating sub-definition chains on demand.
    pub fn parse_definition(&self, spec: &DefSpec) -> Arc<Mutex<Definition>> {
        match spec {
            DefSpec::Plain(key) => self.find_definition(*key, true).unwrap(),
            DefSpec::SubDefinition { parent, clause_no, sub_no, arity } => {
                let cache_key = (*parent, *clause_no, *sub_no);
                let mut subs = self.sub_definitions.lock().unwrap();
                if let Some(key) = subs.get(&cache_key) {
                    return self.find_definition(*key, true).unwrap();
                }
                let mut next_id = self.next_sub_id.lock().unwrap();
                let id = *next_id;
                *next_id += 1;
                // Anonymous auxiliaries use a synthetic atom id range far
                // above any interned atom; here we encode the synthetic
                // name as an out-of-band atom id derived from the counter.
                let synthetic = Functor::new(crate::atom::AtomId(u32::MAX - id), *arity);
                subs.insert(cache_key, synthetic);
                self.find_definition(synthetic, true).unwrap()
            }
        }
    }

    /// `define_predicate(name/arity, mode)` (spec §4.1). No-op (silently
    /// preserves existing clauses) for multifile predicates.
    pub fn define_predicate(&self, key: Functor, mode: DefineMode) {
        let def_arc = self.find_definition(key, true).unwrap();
        let mut def = def_arc.lock().unwrap();
        if def.properties.multifile {
            return;
        }
        if !matches!(def.kind, EntryKind::Undefined) {
            self.make_undefined_locked(&mut def);
        }
        *self.num_predicates.lock().unwrap() += 1;
        match mode {
            DefineMode::Interpreted => {
                def.kind = EntryKind::Interpreted;
                def.storage = DefStorage::Interpreted(InterpretedStorage::default());
            }
            DefineMode::Unprofiled | DefineMode::Profiled => {
                def.kind = if mode == DefineMode::Profiled { EntryKind::Profiled } else { EntryKind::Compact };
                def.storage = DefStorage::Compiled(CompiledStorage::default());
            }
        }
    }

    fn make_undefined_locked(&self, def: &mut Definition) {
        if !matches!(def.kind, EntryKind::Undefined) {
            def.properties.spy = false;
            def.properties.breakpoint = false;
            let old = std::mem::replace(&mut def.storage, DefStorage::Undefined);
            def.kind = EntryKind::Undefined;
            self.gcdef_bin.lock().unwrap().pending.push(old);
            *self.num_predicates.lock().unwrap() -= 1;
        }
    }

    /// `compiled_clause(def, bc, mode, {type, key})` (spec §4.1). Appends
    /// `ops` as a new clause, applying the promotion rule the first time a
    /// clause narrows the indexable shape.
    pub fn compiled_clause(&self, def_arc: &Arc<Mutex<Definition>>, ops: Vec<ByteOp>, shape: FirstArgShape) {
        let mut def = def_arc.lock().unwrap();
        let storage = match &mut def.storage {
            DefStorage::Compiled(s) => s,
            _ => panic!("compiled_clause called on a non-compiled definition"),
        };

        let number = storage.next_clause_number;
        storage.next_clause_number += 1;
        let clause = Arc::new(CompiledClause { number, ops });
        storage.all_clauses.push(clause.clone());

        if let Some(last) = storage.last_inserted {
            // §9(b): the cache assumes no intermediate clause was erased
            // between cached insertions.
            debug_assert_eq!(
                last + 1,
                number,
                "CACHE_INCREMENTAL_CLAUSE_INSERTION invariant violated: a clause was erased between insertions"
            );
        }
        storage.last_inserted = Some(number);

        let mut just_promoted = false;
        if !storage.indexed {
            if !matches!(shape, FirstArgShape::Var) {
                // Promote using the all-clauses snapshot *before* this
                // clause (it narrows, so it does not belong in every
                // index), then fall through to indexed-mode insertion.
                let before = storage.all_clauses[..storage.all_clauses.len() - 1].to_vec();
                storage.lstcase = Some(before.clone());
                storage.othercase = Some(OtherCase::seeded(before));
                storage.indexed = true;
                just_promoted = true;
                insert_indexed(storage, shape, clause);
            }
            // A var-headed clause while non-indexed needs no extra work:
            // `all_clauses` already serves as its own try-chain.
        } else {
            insert_indexed(storage, shape, clause);
        }

        if just_promoted {
            def.kind = match def.kind {
                EntryKind::Profiled => EntryKind::ProfiledIndexed,
                _ => EntryKind::CompactIndexed,
            };
        }
    }

    /// `abolish(def)` (spec §4.1). Succeeds as a no-op on an
    /// already-undefined predicate.
    pub fn abolish(&self, def_arc: &Arc<Mutex<Definition>>) {
        let mut def = def_arc.lock().unwrap();
        self.make_undefined_locked(&mut def);
    }

    /// `empty_gcdef_bin()` (spec §4.1): actually frees everything
    /// deferred by `abolish`. Call only at a safe/quiescent point.
    pub fn empty_gcdef_bin(&self) -> usize {
        let mut bin = self.gcdef_bin.lock().unwrap();
        let n = bin.pending.len();
        bin.pending.clear();
        n
    }

    pub fn num_predicates(&self) -> i64 {
        *self.num_predicates.lock().unwrap()
    }

    /// Assert a clause into a dynamic (interpreted) predicate, at the front
    /// or back (spec §4.1's interpreted storage; `assertz`/`asserta` are
    /// load-bearing for the dynamic-database scenario in spec §8).
    pub fn assert_clause(&self, def_arc: &Arc<Mutex<Definition>>, ops: Vec<ByteOp>, key: OtherKey, at_end: bool) {
        let mut def = def_arc.lock().unwrap();
        let storage = match &mut def.storage {
            DefStorage::Interpreted(s) => s,
            _ => panic!("assert_clause called on a non-interpreted definition"),
        };
        let number = storage.next_clause_number;
        storage.next_clause_number += 1;
        let clause = Arc::new(CompiledClause { number, ops });
        if at_end {
            storage.instances.push(clause.clone());
        } else {
            storage.instances.insert(0, clause.clone());
        }
        let bucket = storage.index.entry(key).or_default();
        if at_end {
            bucket.push(clause);
        } else {
            bucket.insert(0, clause);
        }
    }

    /// Retract the first instance keyed by `key`. Returns whether one was
    /// found and removed.
    pub fn retract_clause(&self, def_arc: &Arc<Mutex<Definition>>, key: OtherKey) -> bool {
        let mut def = def_arc.lock().unwrap();
        let storage = match &mut def.storage {
            DefStorage::Interpreted(s) => s,
            _ => panic!("retract_clause called on a non-interpreted definition"),
        };
        let removed = if let Some(bucket) = storage.index.get_mut(&key) {
            if bucket.is_empty() {
                None
            } else {
                Some(bucket.remove(0))
            }
        } else {
            None
        };
        if let Some(clause) = removed {
            if let Some(pos) = storage.instances.iter().position(|c| Arc::ptr_eq(c, &clause)) {
                storage.instances.remove(pos);
            }
            true
        } else {
            false
        }
    }

    /// Count every clause a definition holds, by direct traversal of its
    /// storage — the "final scan" spec §8 scenario 6 verifies corruption
    /// with.
    pub fn clause_count(&self, def_arc: &Arc<Mutex<Definition>>) -> usize {
        let def = def_arc.lock().unwrap();
        match &def.storage {
            DefStorage::Compiled(s) => s.all_clauses.len(),
            DefStorage::Interpreted(s) => s.instances.len(),
            DefStorage::Undefined => 0,
        }
    }

    pub fn interpreted_instances(&self, def_arc: &Arc<Mutex<Definition>>) -> Vec<Arc<CompiledClause>> {
        let def = def_arc.lock().unwrap();
        match &def.storage {
            DefStorage::Interpreted(s) => s.instances.clone(),
            _ => Vec::new(),
        }
    }

    /// Build the try-chain EMU should use for a call whose dereferenced
    /// first argument is `first_arg` (spec §4.4: "Inputs from CDB to
    /// EMU: a try-node chain").
    pub fn try_chain_for_call(&self, key: Functor, first_arg: Option<Word>) -> Option<TryChain> {
        let def_arc = self.find_definition(key, false)?;
        let def = def_arc.lock().unwrap();
        match &def.storage {
            DefStorage::Compiled(s) => Some(TryChain { alternatives: Self::dispatch_compiled(s, first_arg) }),
            DefStorage::Interpreted(s) => Some(TryChain { alternatives: Self::dispatch_interpreted(s, first_arg) }),
            DefStorage::Undefined => None,
        }
    }

    fn dispatch_compiled(storage: &CompiledStorage, first_arg: Option<Word>) -> Vec<Arc<CompiledClause>> {
        // An unbound (or absent) call argument unifies with every clause
        // head, indexed or not: its try-chain is always the full list.
        if !storage.indexed || matches!(classify_call_arg(first_arg), None | Some(FirstArgShape::Var)) {
            return storage.all_clauses.clone();
        }
        match classify_call_arg(first_arg) {
            Some(FirstArgShape::List) => storage.lstcase.clone().unwrap_or_default(),
            Some(FirstArgShape::Other(key)) => storage.othercase.as_ref().map(|o| o.lookup(key)).unwrap_or_default(),
            _ => unreachable!(),
        }
    }

    fn dispatch_interpreted(storage: &InterpretedStorage, first_arg: Option<Word>) -> Vec<Arc<CompiledClause>> {
        match classify_call_arg(first_arg) {
            Some(FirstArgShape::Other(key)) => storage
                .index
                .get(&key)
                .cloned()
                .unwrap_or_else(|| storage.instances.clone()),
            _ => storage.instances.clone(),
        }
    }
}

fn insert_indexed(storage: &mut CompiledStorage, shape: FirstArgShape, clause: Arc<CompiledClause>) {
    match shape {
        FirstArgShape::Var => {
            // Already in `all_clauses`; a var-headed clause also matches
            // every list/other-keyed call, so it joins those indexes too.
            storage.lstcase.as_mut().unwrap().push(clause.clone());
            storage.othercase.as_mut().unwrap().insert_var(clause);
        }
        FirstArgShape::List => {
            storage.lstcase.as_mut().unwrap().push(clause);
        }
        FirstArgShape::Other(key) => {
            storage.othercase.as_mut().unwrap().insert_other(key, clause);
        }
    }
}

/// Classify a call's (already dereferenced) first argument into the same
/// shape space clause heads are indexed by. `None` (no argument, i.e. an
/// arity-0 call) behaves like a variable: try everything.
fn classify_call_arg(arg: Option<Word>) -> Option<FirstArgShape> {
    use crate::tagged::Tag;
    let w = arg?;
    Some(match w.tag() {
        Tag::Hva | Tag::Cva | Tag::Sva => FirstArgShape::Var,
        Tag::Lst => FirstArgShape::List,
        Tag::Atm => FirstArgShape::Other(OtherKey::Atom(w.atom_id().unwrap())),
        Tag::Num => FirstArgShape::Other(OtherKey::Small(w.small_value())),
        Tag::Str => FirstArgShape::Other(OtherKey::Small(w.payload() as i64)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::ByteOp;

    fn fact(val: i64) -> Vec<ByteOp> {
        vec![ByteOp::GetSmall { arg: 0, val }, ByteOp::Proceed]
    }

    #[test]
    fn clauses_try_in_insertion_order() {
        let cdb = ClauseDatabase::new();
        let key = Functor::new(AtomId(1), 1);
        cdb.define_predicate(key, DefineMode::Unprofiled);
        let def = cdb.find_definition(key, false).unwrap();
        cdb.compiled_clause(&def, fact(1), FirstArgShape::Other(OtherKey::Small(1)));
        cdb.compiled_clause(&def, fact(2), FirstArgShape::Other(OtherKey::Small(2)));

        let chain = cdb.try_chain_for_call(key, None).unwrap();
        assert_eq!(chain.alternatives.len(), 2);
        assert_eq!(chain.alternatives[0].number, 0);
        assert_eq!(chain.alternatives[1].number, 1);
    }

    #[test]
    fn abolish_is_idempotent() {
        let cdb = ClauseDatabase::new();
        let key = Functor::new(AtomId(2), 0);
        cdb.define_predicate(key, DefineMode::Unprofiled);
        let def = cdb.find_definition(key, false).unwrap();
        cdb.abolish(&def);
        cdb.abolish(&def); // second call is a no-op, must not panic or underflow
        assert!(matches!(def.lock().unwrap().kind, EntryKind::Undefined));
    }

    #[test]
    fn abolish_undefined_predicate_is_noop() {
        let cdb = ClauseDatabase::new();
        let key = Functor::new(AtomId(3), 0);
        // find_definition(insert=true) creates it in Undefined state.
        let def = cdb.find_definition(key, true).unwrap();
        cdb.abolish(&def);
        assert_eq!(cdb.num_predicates(), 0);
    }

    #[test]
    fn indexing_promotes_on_first_narrowing_clause() {
        let cdb = ClauseDatabase::new();
        let key = Functor::new(AtomId(4), 1);
        cdb.define_predicate(key, DefineMode::Unprofiled);
        let def = cdb.find_definition(key, false).unwrap();

        // First clause is var-headed: stays non-indexed.
        cdb.compiled_clause(&def, vec![ByteOp::Proceed], FirstArgShape::Var);
        {
            let d = def.lock().unwrap();
            match &d.storage {
                DefStorage::Compiled(s) => assert!(!s.indexed),
                _ => unreachable!(),
            }
        }

        // Second clause narrows on `1`: promotes.
        cdb.compiled_clause(&def, fact(1), FirstArgShape::Other(OtherKey::Small(1)));
        {
            let d = def.lock().unwrap();
            match &d.storage {
                DefStorage::Compiled(s) => assert!(s.indexed),
                _ => unreachable!(),
            }
        }

        // A call with first arg == 1 must see both the var-headed clause
        // and the clause keyed on 1.
        let chain = cdb.try_chain_for_call(key, Some(Word::new_small(1).unwrap())).unwrap();
        assert_eq!(chain.alternatives.len(), 2);

        // A call keyed on an unseen value sees only the var-headed default.
        let chain2 = cdb.try_chain_for_call(key, Some(Word::new_small(99).unwrap())).unwrap();
        assert_eq!(chain2.alternatives.len(), 1);
    }

    #[test]
    fn dynamic_assert_retract_findall_scenario() {
        // spec §8 end-to-end scenario 5.
        let cdb = ClauseDatabase::new();
        let key = Functor::new(AtomId(5), 1);
        cdb.define_predicate(key, DefineMode::Interpreted);
        let def = cdb.find_definition(key, false).unwrap();

        cdb.assert_clause(&def, fact(1), OtherKey::Small(1), true);
        cdb.assert_clause(&def, fact(2), OtherKey::Small(2), true);
        cdb.assert_clause(&def, fact(3), OtherKey::Small(3), true);

        cdb.assert_clause(&def, fact(4), OtherKey::Small(4), true);
        assert!(cdb.retract_clause(&def, OtherKey::Small(2)));

        let values: Vec<i64> = cdb
            .interpreted_instances(&def)
            .iter()
            .map(|c| match c.ops[0] {
                ByteOp::GetSmall { val, .. } => val,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(values, vec![1, 3, 4]);
    }

    #[test]
    fn concurrent_insertion_across_distinct_predicates_is_safe() {
        // spec §8 end-to-end scenario 6 (scaled down for test speed).
        let cdb = Arc::new(ClauseDatabase::new());
        let mut handles = Vec::new();
        for t in 0..4u32 {
            let cdb = cdb.clone();
            handles.push(std::thread::spawn(move || {
                let key = Functor::new(AtomId(1000 + t), 1);
                cdb.define_predicate(key, DefineMode::Unprofiled);
                let def = cdb.find_definition(key, false).unwrap();
                for i in 0..250 {
                    cdb.compiled_clause(&def, fact(i), FirstArgShape::Other(OtherKey::Small(i)));
                }
                key
            }));
        }
        let keys: Vec<Functor> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for key in keys {
            let def = cdb.find_definition(key, false).unwrap();
            let d = def.lock().unwrap();
            match &d.storage {
                DefStorage::Compiled(s) => assert_eq!(s.all_clauses.len(), 250),
                _ => unreachable!(),
            }
        }
    }
}
