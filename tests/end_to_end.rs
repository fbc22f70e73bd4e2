//! Cross-module scenarios from §8 "End-to-end scenarios" 1-6.

use std::sync::Arc;

use wam_engine::atom::AtomId;
use wam_engine::builtins::atoms::{atom_concat_splits, sub_atom};
use wam_engine::builtins::codec::{atom_to_codes, codes_to_atom, string_to_number, NumberValue};
use wam_engine::cdb::{ClauseDatabase, DefineMode, FirstArgShape, OtherKey};
use wam_engine::emu::ByteOp;
use wam_engine::tagged::Functor;

#[test]
fn scenario_1_atom_codes() {
    let codes = atom_to_codes("hello");
    assert_eq!(codes, vec![104, 101, 108, 108, 111]);
    assert_eq!(codes_to_atom(&codes).unwrap(), "hello");
}

#[test]
fn scenario_2_number_codes_inf_and_nan() {
    let n = string_to_number("0.Inf", 10).unwrap();
    assert_eq!(n, NumberValue::Float(f64::INFINITY));

    let m = string_to_number("-0.Nan", 10).unwrap();
    match m {
        NumberValue::Float(v) => assert!(v.is_nan()),
        _ => panic!("expected a float"),
    }
}

#[test]
fn scenario_3_atom_concat_nondet_enumeration_order() {
    let pairs = atom_concat_splits("abc");
    assert_eq!(
        pairs,
        vec![
            ("".to_string(), "abc".to_string()),
            ("a".to_string(), "bc".to_string()),
            ("ab".to_string(), "c".to_string()),
            ("abc".to_string(), "".to_string()),
        ]
    );
}

#[test]
fn scenario_4_sub_atom() {
    assert_eq!(sub_atom("hello", 1, 3), Some("ell".to_string()));
}

#[test]
fn scenario_5_dynamic_assert_retract_findall() {
    let cdb = ClauseDatabase::new();
    let key = Functor::new(AtomId(1), 1);
    cdb.define_predicate(key, DefineMode::Interpreted);
    let def = cdb.find_definition(key, false).unwrap();

    let fact = |v: i64| vec![ByteOp::GetSmall { arg: 0, val: v }, ByteOp::Proceed];
    cdb.assert_clause(&def, fact(1), OtherKey::Small(1), true);
    cdb.assert_clause(&def, fact(2), OtherKey::Small(2), true);
    cdb.assert_clause(&def, fact(3), OtherKey::Small(3), true);

    cdb.assert_clause(&def, fact(4), OtherKey::Small(4), true);
    assert!(cdb.retract_clause(&def, OtherKey::Small(2)));

    let xs: Vec<i64> = cdb
        .interpreted_instances(&def)
        .iter()
        .map(|c| match c.ops[0] {
            ByteOp::GetSmall { val, .. } => val,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(xs, vec![1, 3, 4]);
}

#[test]
fn scenario_6_concurrent_clause_insertion_across_two_workers() {
    let cdb = Arc::new(ClauseDatabase::new());
    let mut handles = Vec::new();
    for worker in 0..2u32 {
        let cdb = cdb.clone();
        handles.push(std::thread::spawn(move || {
            let key = Functor::new(AtomId(100 + worker), 1);
            cdb.define_predicate(key, DefineMode::Unprofiled);
            let def = cdb.find_definition(key, false).unwrap();
            for i in 0..10_000i64 {
                cdb.compiled_clause(
                    &def,
                    vec![ByteOp::GetSmall { arg: 0, val: i }, ByteOp::Proceed],
                    FirstArgShape::Other(OtherKey::Small(i)),
                );
            }
            key
        }));
    }
    let keys: Vec<Functor> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let mut total = 0usize;
    for key in keys {
        let def = cdb.find_definition(key, false).unwrap();
        total += cdb.clause_count(&def);
    }
    assert_eq!(total, 20_000);
}
