// src/util.rs
//
// String substitution primitives shared by the template expansion passes.
//
// `replace_id` is the workhorse: it replaces occurrences of `pattern` only
// when they stand alone as an identifier, so substituting `T -> int` in
// "Less<(T)>" rewrites the argument but leaves "Tuple" untouched. `$` counts
// as an identifier character because partial-specialization placeholders are
// spelled `$1`, `$2`, ...

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Replace identifier-bounded occurrences of `pattern` in `s` with
/// `replacement`, returning the number of substitutions made.
///
/// An occurrence matches only if the characters adjacent to it could not
/// extend it into a longer identifier. A pattern that starts or ends with a
/// non-identifier character (such as the stringize form `#T`) relaxes the
/// corresponding boundary check. Scanning resumes after each replacement, so
/// a replacement containing the pattern is not rescanned.
pub fn replace_id(s: &mut String, pattern: &str, replacement: &str) -> usize {
    if pattern.is_empty() {
        return 0;
    }
    let pat_first_ident = is_ident_byte(pattern.as_bytes()[0]);
    let pat_last_ident = is_ident_byte(*pattern.as_bytes().last().unwrap());

    let mut out = String::with_capacity(s.len());
    let mut count = 0;
    let mut i = 0;
    while let Some(off) = s[i..].find(pattern) {
        let start = i + off;
        let end = start + pattern.len();
        let left_ok = !pat_first_ident || start == 0 || !is_ident_byte(s.as_bytes()[start - 1]);
        let right_ok = !pat_last_ident || end == s.len() || !is_ident_byte(s.as_bytes()[end]);
        if left_ok && right_ok {
            out.push_str(&s[i..start]);
            out.push_str(replacement);
            count += 1;
            i = end;
        } else {
            // Skip just past the failed match position and keep scanning.
            out.push_str(&s[i..start + 1]);
            i = start + 1;
        }
    }
    if count > 0 {
        out.push_str(&s[i..]);
        *s = out;
    }
    count
}

/// Replace the first plain-substring occurrence of `pattern`.
pub fn replace_first(s: &mut String, pattern: &str, replacement: &str) -> bool {
    if let Some(pos) = s.find(pattern) {
        s.replace_range(pos..pos + pattern.len(), replacement);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(s: &str, pat: &str, rep: &str) -> (String, usize) {
        let mut owned = s.to_string();
        let n = replace_id(&mut owned, pat, rep);
        (owned, n)
    }

    #[test]
    fn replace_id_respects_boundaries() {
        assert_eq!(apply("r.T", "T", "int"), ("r.int".to_string(), 1));
        assert_eq!(apply("Less<(K)>", "K", "int"), ("Less<(int)>".to_string(), 1));
        assert_eq!(apply("Tuple", "T", "int"), ("Tuple".to_string(), 0));
        assert_eq!(apply("T x; TT y; T", "T", "U"), ("U x; TT y; U".to_string(), 2));
    }

    #[test]
    fn replace_id_placeholder_tokens() {
        assert_eq!(apply("p.$1", "$1", "int"), ("p.int".to_string(), 1));
        assert_eq!(apply("p.$1", "$2", "int"), ("p.$1".to_string(), 0));
        // Removing the placeholder entirely is how deduction prefixes are built.
        assert_eq!(apply("q(const).p.$1", "$1", ""), ("q(const).p.".to_string(), 1));
    }

    #[test]
    fn replace_id_stringize_pattern() {
        assert_eq!(
            apply("x = #T;", "#T", "\"int\""),
            ("x = \"int\";".to_string(), 1)
        );
    }

    #[test]
    fn replace_id_does_not_rescan_replacement() {
        assert_eq!(apply("T", "T", "p.T"), ("p.T".to_string(), 1));
    }

    #[test]
    fn replace_first_is_plain_substring() {
        let mut s = "~Box".to_string();
        assert!(replace_first(&mut s, "Box", "IntBox"));
        assert_eq!(s, "~IntBox");
    }
}
