//! `atom_concat/3` (nondeterministic split) and `sub_atom/4` (spec §8's
//! end-to-end scenarios 3 and 4). Both operate directly on interned text;
//! neither touches the heap or choicepoint stack, so they're plain string
//! functions rather than `ByteOp`s, same as the codec in `codec.rs`.

/// All ways to split `whole` into a prefix/suffix pair, in left-to-right
/// order (spec §8 scenario 3: `atom_concat(X, Y, abc)` enumerates
/// `('', abc), (a, bc), (ab, c), (abc, '')`).
pub fn atom_concat_splits(whole: &str) -> Vec<(String, String)> {
    let chars: Vec<char> = whole.chars().collect();
    (0..=chars.len())
        .map(|i| (chars[..i].iter().collect(), chars[i..].iter().collect()))
        .collect()
}

/// `sub_atom(Atom, Before, Length, Sub)` with `Before`/`Length` already
/// bound. Fails silently (returns `None`, not an error) when out of range
/// (spec §8 boundary case).
pub fn sub_atom(whole: &str, before: i64, length: i64) -> Option<String> {
    if before < 0 || length < 0 {
        return None;
    }
    let chars: Vec<char> = whole.chars().collect();
    let (before, length) = (before as usize, length as usize);
    if before + length > chars.len() {
        return None;
    }
    Some(chars[before..before + length].iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_concat_enumerates_all_splits_in_order() {
        assert_eq!(
            atom_concat_splits("abc"),
            vec![
                ("".to_string(), "abc".to_string()),
                ("a".to_string(), "bc".to_string()),
                ("ab".to_string(), "c".to_string()),
                ("abc".to_string(), "".to_string()),
            ]
        );
    }

    #[test]
    fn sub_atom_extracts_requested_slice() {
        assert_eq!(sub_atom("hello", 1, 3), Some("ell".to_string()));
    }

    #[test]
    fn sub_atom_out_of_range_fails_without_error() {
        assert_eq!(sub_atom("hello", -1, 2), None);
        assert_eq!(sub_atom("hello", 2, -1), None);
        assert_eq!(sub_atom("hello", 3, 10), None);
    }
}
