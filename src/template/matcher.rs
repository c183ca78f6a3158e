// src/template/matcher.rs
//
// Template argument deduction against partially specialized parameter
// types, and selection of the best partial specialization out of several
// surviving candidates via a per-parameter priority matrix.

use smallvec::SmallVec;

use crate::ast::{NodeArena, NodeId, Parm};
use crate::symbols::{ScopeId, SymbolTable};
use crate::typestr;
use crate::util::replace_id;

/// Exact matches outrank any deduced match; deduced matches rank by the
/// length of the matched specialization prefix. The sentinel is larger than
/// the length of any conceivable type.
pub const EXACT_MATCH_PRIORITY: i32 = 99999;

/// Outcome of matching one concrete type against one partially specialized
/// parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParmMatch {
    ExactNoMatch,
    PartiallySpecializedNoMatch,
    PartiallySpecializedMatch,
    ExactMatch,
}

impl ParmMatch {
    pub fn is_match(self) -> bool {
        matches!(
            self,
            ParmMatch::PartiallySpecializedMatch | ParmMatch::ExactMatch
        )
    }
}

/// Check whether `ty` matches `partial_parm_type`, a parameter type of a
/// partial specialization carrying the deduction placeholder
/// `placeholder` (`$1`, `$2`, ...).
///
/// With no placeholder substitution the comparison is exact. With exactly
/// one substitution the candidate deduces: the placeholder is removed and
/// the remaining prefix must lead the reduced concrete type, e.g. matching
/// "r.q(const).p.int" against "r.q(const).$1" succeeds with priority
/// len("r.q(const).").
///
/// Returns the match kind and the specialization priority (meaningful only
/// for matches).
pub fn does_parm_match(
    arena: &NodeArena,
    symbols: &SymbolTable,
    ty: &str,
    partial_parm_type: &str,
    placeholder: &str,
    tscope: ScopeId,
) -> (ParmMatch, i32) {
    let reduced = symbols.typedef_reduce(arena, ty, tscope);
    let base = typestr::base(&reduced).to_string();

    let mut substituted = partial_parm_type.to_string();
    let substitutions = replace_id(&mut substituted, placeholder, &base);
    let matches = reduced == substituted;

    let (m, priority) = if substitutions == 1 {
        let mut tt = partial_parm_type.to_string();
        replace_id(&mut tt, placeholder, "");
        if reduced.starts_with(&tt) {
            (ParmMatch::PartiallySpecializedMatch, tt.len() as i32)
        } else {
            (ParmMatch::PartiallySpecializedNoMatch, -1)
        }
    } else if matches {
        (ParmMatch::ExactMatch, EXACT_MATCH_PRIORITY)
    } else {
        (ParmMatch::ExactNoMatch, -1)
    };

    tracing::trace!(
        ?m,
        priority,
        ty,
        partial_parm_type,
        "partial specialization parameter match"
    );
    (m, priority)
}

type PriorityRow = SmallVec<[i32; 4]>;

/// The selected partial specialization, by index into the candidate list,
/// plus any candidates that tied with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSelection {
    pub chosen: usize,
    pub ambiguous: Vec<usize>,
}

/// Rank every candidate partial specialization against the instantiation
/// arguments and pick the unambiguous column-best candidate.
///
/// Candidates whose arity differs, or with any non-matching parameter, are
/// discarded. When several survive, each argument position is scored and a
/// candidate wins outright only by being best on every position; failing
/// that, the survivors are ambiguous and the first in declaration order is
/// used.
pub fn select_partial(
    arena: &NodeArena,
    symbols: &SymbolTable,
    partials: &[NodeId],
    parms: &[Parm],
    tscope: ScopeId,
) -> Option<PartialSelection> {
    let parms_len = parms.len();
    let mut survivors: Vec<usize> = Vec::new();
    let mut priorities: Vec<PriorityRow> = Vec::new();

    for (ci, &candidate) in partials.iter().enumerate() {
        let node = &arena[candidate];
        let Some(partialparms) = node.partialparms.as_ref() else {
            continue;
        };
        if partialparms.len() != parms_len {
            continue;
        }
        tracing::debug!(
            candidate = node.templcsymname.as_deref().unwrap_or(""),
            "checking partial specialization"
        );

        let mut row: PriorityRow = SmallVec::with_capacity(parms_len);
        let mut all_match = true;
        for (i, (p, pp)) in parms.iter().zip(partialparms.iter()).enumerate() {
            let placeholder = format!("${}", i + 1);
            let Some(t) = p.ty.as_deref().or(p.value.as_deref()) else {
                row.push(-1);
                continue;
            };
            let (m, priority) = does_parm_match(
                arena,
                symbols,
                t,
                pp.ty.as_deref().unwrap_or(""),
                &placeholder,
                tscope,
            );
            if !m.is_match() {
                all_match = false;
                break;
            }
            row.push(priority);
        }
        if all_match {
            survivors.push(ci);
            priorities.push(row);
        }
    }

    if survivors.is_empty() {
        return None;
    }
    if survivors.len() == 1 {
        return Some(PartialSelection {
            chosen: survivors[0],
            ambiguous: Vec::new(),
        });
    }

    // Flag each matrix entry that equals its column maximum, then look for
    // rows that are best on every column.
    let mut flags = priorities.clone();
    for col in 0..parms_len {
        let max = priorities.iter().map(|row| row[col]).max().unwrap_or(-1);
        for (row, frow) in priorities.iter().zip(flags.iter_mut()) {
            frow[col] = i32::from(row[col] >= max);
        }
    }
    let best: Vec<usize> = survivors
        .iter()
        .copied()
        .zip(flags.iter())
        .filter(|(_, frow)| frow.iter().sum::<i32>() as usize == parms_len)
        .map(|(ci, _)| ci)
        .collect();

    let final_set = if best.is_empty() { survivors } else { best };
    Some(PartialSelection {
        chosen: final_set[0],
        ambiguous: final_set[1..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Node, NodeKind, Parm};

    fn partial(arena: &mut NodeArena, symname: &str, parm_types: &[&str]) -> NodeId {
        let mut n = Node::new(NodeKind::Template);
        n.templcsymname = Some(symname.to_string());
        n.partialparms = Some(parm_types.iter().map(|t| Parm::with_type(*t)).collect());
        arena.alloc(n)
    }

    fn fixture() -> (NodeArena, SymbolTable, ScopeId) {
        let arena = NodeArena::new();
        let symbols = SymbolTable::new();
        let scope = symbols.global();
        (arena, symbols, scope)
    }

    #[test]
    fn exact_match_gets_sentinel_priority() {
        let (arena, symbols, scope) = fixture();
        let (m, priority) = does_parm_match(&arena, &symbols, "p.double", "p.double", "$2", scope);
        assert_eq!(m, ParmMatch::ExactMatch);
        assert_eq!(priority, EXACT_MATCH_PRIORITY);
    }

    #[test]
    fn deduced_match_priority_is_prefix_length() {
        let (arena, symbols, scope) = fixture();
        let (m, priority) =
            does_parm_match(&arena, &symbols, "r.q(const).p.int", "r.q(const).p.$1", "$1", scope);
        assert_eq!(m, ParmMatch::PartiallySpecializedMatch);
        assert_eq!(priority, "r.q(const).p.".len() as i32);

        let (m, priority) = does_parm_match(&arena, &symbols, "r.q(const).p.int", "r.$1", "$1", scope);
        assert_eq!(m, ParmMatch::PartiallySpecializedMatch);
        assert_eq!(priority, "r.".len() as i32);
    }

    #[test]
    fn deduced_mismatch_is_rejected() {
        let (arena, symbols, scope) = fixture();
        let (m, _) = does_parm_match(&arena, &symbols, "r.int", "p.$1", "$1", scope);
        assert_eq!(m, ParmMatch::PartiallySpecializedNoMatch);

        let (m, _) = does_parm_match(&arena, &symbols, "int", "double", "$1", scope);
        assert_eq!(m, ParmMatch::ExactNoMatch);
    }

    #[test]
    fn match_reduces_typedefs_first() {
        let (mut arena, mut symbols, scope) = fixture();
        let mut td = Node::new(NodeKind::CDecl);
        td.name = Some("intp".to_string());
        td.storage = Some("typedef".to_string());
        td.ty = Some("int".to_string());
        td.decl = Some("p.".to_string());
        let td = arena.alloc(td);
        symbols.add_symbol(&mut arena, scope, "intp", td);

        let (m, _) = does_parm_match(&arena, &symbols, "intp", "p.$1", "$1", scope);
        assert_eq!(m, ParmMatch::PartiallySpecializedMatch);
    }

    #[test]
    fn more_specialized_candidate_wins() {
        let (mut arena, symbols, scope) = fixture();
        // X<T*> vs X<const T*> matched against X<const int*>.
        let a = partial(&mut arena, "X<(p.$1)>", &["p.$1"]);
        let b = partial(&mut arena, "X<(p.q(const).$1)>", &["p.q(const).$1"]);
        let parms = vec![Parm::with_type("p.q(const).int")];

        let sel = select_partial(&arena, &symbols, &[a, b], &parms, scope).unwrap();
        assert_eq!(sel.chosen, 1);
        assert!(sel.ambiguous.is_empty());

        // Permuting the candidates must not change which one wins.
        let sel = select_partial(&arena, &symbols, &[b, a], &parms, scope).unwrap();
        assert_eq!(sel.chosen, 0);
        assert!(sel.ambiguous.is_empty());
    }

    #[test]
    fn cross_wise_candidates_are_ambiguous() {
        let (mut arena, symbols, scope) = fixture();
        // X<T1, double*> vs X<int*, T2> matched against X<int*, double*>.
        let a = partial(&mut arena, "X<($1,p.double)>", &["$1", "p.double"]);
        let b = partial(&mut arena, "X<(p.int,$2)>", &["p.int", "$2"]);
        let parms = vec![Parm::with_type("p.int"), Parm::with_type("p.double")];

        let sel = select_partial(&arena, &symbols, &[a, b], &parms, scope).unwrap();
        assert_eq!(sel.chosen, 0);
        assert_eq!(sel.ambiguous, vec![1]);
    }

    #[test]
    fn arity_mismatch_discards_candidate() {
        let (mut arena, symbols, scope) = fixture();
        let a = partial(&mut arena, "X<($1)>", &["$1"]);
        let parms = vec![Parm::with_type("int"), Parm::with_type("double")];
        assert!(select_partial(&arena, &symbols, &[a], &parms, scope).is_none());
    }
}
