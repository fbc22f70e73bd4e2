//! Built-in kernel primitives (spec §4.7). Per spec §1, only the handful
//! of primitives load-bearing for the runtime's own invariants are
//! implemented here; the general predicate library is out of scope.

pub mod atoms;
pub mod codec;
pub mod setarg;
