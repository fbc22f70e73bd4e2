//! Tagged-word representation (spec §3.1, §6.1).
//!
//! A `Word` is one host machine word: a 3-bit tag in the top bits, payload in
//! the rest. This crate targets 64-bit hosts only; the 32-bit inline-float
//! layout spec §6.1 allows is documented but not implemented (see
//! DESIGN.md's Open Question decisions).

use crate::atom::AtomId;

/// Number of bits reserved for the tag at the top of the word.
const TAG_BITS: u32 = 3;
const TAG_SHIFT: u32 = (usize::BITS) - TAG_BITS;
const PAYLOAD_MASK: usize = (1usize << TAG_SHIFT) - 1;

/// Small-integer range: signed, fits in the payload (one bit reserved for
/// sign doubling via the tag's absence from the value space).
pub const SMALL_INT_BITS: u32 = TAG_SHIFT - 1;
pub const SMALL_INT_MAX: i64 = (1i64 << SMALL_INT_BITS) - 1;
pub const SMALL_INT_MIN: i64 = -(1i64 << SMALL_INT_BITS);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// Unbound heap variable; payload is its own heap address.
    Hva = 0,
    /// Constrained heap variable; payload is a heap address whose cell
    /// stores a link to a suspension/goal list.
    Cva = 1,
    /// Unbound stack variable; payload is a local-stack address.
    Sva = 2,
    /// Small integer, fits in the payload.
    Num = 3,
    /// Atom; payload is an atom-table index.
    Atm = 4,
    /// List cell; payload is the heap address of a 2-word cons cell.
    Lst = 5,
    /// Structure/blob; payload is the heap address of a functor-headed cell.
    Str = 6,
}

impl Tag {
    fn from_bits(bits: usize) -> Self {
        match bits {
            0 => Tag::Hva,
            1 => Tag::Cva,
            2 => Tag::Sva,
            3 => Tag::Num,
            4 => Tag::Atm,
            5 => Tag::Lst,
            6 => Tag::Str,
            other => panic!("corrupt tagged word: unknown tag bits {other}"),
        }
    }
}

/// A single tagged machine word (spec §3.1).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Word(usize);

impl std::fmt::Debug for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.tag() {
            Tag::Hva => write!(f, "Hva({})", self.payload()),
            Tag::Cva => write!(f, "Cva({})", self.payload()),
            Tag::Sva => write!(f, "Sva({})", self.payload()),
            Tag::Num => write!(f, "Num({})", self.small_value()),
            Tag::Atm => write!(f, "Atm({})", self.payload()),
            Tag::Lst => write!(f, "Lst({})", self.payload()),
            Tag::Str => write!(f, "Str({})", self.payload()),
        }
    }
}

impl Word {
    fn pack(tag: Tag, payload: usize) -> Self {
        debug_assert!(payload & !PAYLOAD_MASK == 0, "payload overflows tag field");
        Word(((tag as usize) << TAG_SHIFT) | payload)
    }

    pub fn tag(self) -> Tag {
        Tag::from_bits(self.0 >> TAG_SHIFT)
    }

    /// Raw payload bits, unsigned.
    pub fn payload(self) -> usize {
        self.0 & PAYLOAD_MASK
    }

    /// A self-referential unbound heap variable at address `addr`.
    pub fn new_hva(addr: usize) -> Self {
        Word::pack(Tag::Hva, addr)
    }

    pub fn new_cva(addr: usize) -> Self {
        Word::pack(Tag::Cva, addr)
    }

    pub fn new_sva(addr: usize) -> Self {
        Word::pack(Tag::Sva, addr)
    }

    pub fn new_lst(addr: usize) -> Self {
        Word::pack(Tag::Lst, addr)
    }

    pub fn new_str(addr: usize) -> Self {
        Word::pack(Tag::Str, addr)
    }

    pub fn new_atom(id: AtomId) -> Self {
        Word::pack(Tag::Atm, id.0 as usize)
    }

    pub fn atom_id(self) -> Option<AtomId> {
        matches!(self.tag(), Tag::Atm).then(|| AtomId(self.payload() as u32))
    }

    /// Fails (returns `None`) when `v` does not fit the small-integer range.
    pub fn new_small(v: i64) -> Option<Self> {
        if v < SMALL_INT_MIN || v > SMALL_INT_MAX {
            return None;
        }
        // Store as an offset from the minimum so the payload stays unsigned.
        let biased = (v - SMALL_INT_MIN) as usize;
        Some(Word::pack(Tag::Num, biased))
    }

    pub fn small_value(self) -> i64 {
        debug_assert!(matches!(self.tag(), Tag::Num));
        self.payload() as i64 + SMALL_INT_MIN
    }

    pub fn is_variable(self) -> bool {
        matches!(self.tag(), Tag::Hva | Tag::Cva | Tag::Sva)
    }

    pub fn is_atomic(self) -> bool {
        matches!(self.tag(), Tag::Num | Tag::Atm)
    }

    pub fn address(self) -> Option<usize> {
        matches!(self.tag(), Tag::Hva | Tag::Cva | Tag::Sva | Tag::Lst | Tag::Str)
            .then(|| self.payload())
    }

    /// True iff the tagged word is a self-reference to `addr`, i.e. an
    /// unbound variable living exactly at `addr`.
    pub fn is_self_ref_at(self, addr: usize) -> bool {
        self.is_variable() && self.payload() == addr
    }
}

/// A functor: an (atom, arity) pair (spec §3.2). Also used as the predicate
/// database key; atoms are functors of arity 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Functor {
    pub name: AtomId,
    pub arity: u16,
}

impl Functor {
    pub fn new(name: AtomId, arity: u16) -> Self {
        Functor { name, arity }
    }
}

pub type PredKey = Functor;

/// Heap representation of a blob (bignum or float): a functor header word,
/// a length-encoded magnitude/payload, and a trailing copy of the functor
/// header so backward scans work (spec §3.1, §6.1).
#[derive(Debug, Clone, PartialEq)]
pub enum Blob {
    Float(f64),
    /// A bignum too large for `Word::new_small`; stored as sign-magnitude
    /// bytes. Arbitrary-precision arithmetic itself is out of scope (spec
    /// §1); only this boxed representation is specified.
    BigInt { negative: bool, magnitude: Vec<u8> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_int_roundtrip() {
        for v in [-1i64, 0, 1, SMALL_INT_MAX, SMALL_INT_MIN, 42, -42] {
            let w = Word::new_small(v).unwrap();
            assert_eq!(w.tag(), Tag::Num);
            assert_eq!(w.small_value(), v);
        }
    }

    #[test]
    fn small_int_out_of_range_fails() {
        assert!(Word::new_small(SMALL_INT_MAX + 1).is_none());
        assert!(Word::new_small(SMALL_INT_MIN - 1).is_none());
    }

    #[test]
    fn self_referential_hva_is_variable() {
        let w = Word::new_hva(100);
        assert!(w.is_variable());
        assert!(w.is_self_ref_at(100));
        assert!(!w.is_self_ref_at(101));
    }

    #[test]
    fn atom_word_roundtrip() {
        let id = AtomId(7);
        let w = Word::new_atom(id);
        assert_eq!(w.tag(), Tag::Atm);
        assert_eq!(w.atom_id(), Some(id));
    }

    #[test]
    fn functor_is_hashable_key() {
        use std::collections::HashMap;
        let mut m: HashMap<Functor, i32> = HashMap::new();
        m.insert(Functor::new(AtomId(1), 2), 10);
        assert_eq!(m.get(&Functor::new(AtomId(1), 2)), Some(&10));
    }
}
