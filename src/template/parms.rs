// src/template/parms.rs
//
// Prepares the concrete argument list of an instantiation against the
// primary template's parameter list: copies parameter names across, fills
// in missing types for non-type parameters, appends defaulted parameters,
// and realizes back-references between default values.

use crate::ast::{variadic_parm, NodeArena, NodeId, NodeKind, Parm, ParmList};
use crate::util::replace_id;

/// Copy names (and missing types) from the primary's parameter list onto the
/// instantiation arguments, position by position. Returns true if the
/// primary is variadic.
fn merge_parameters(expanded: &mut ParmList, templateparms: &[Parm]) -> bool {
    for (p, tp) in expanded.iter_mut().zip(templateparms.iter()) {
        p.name = tp.name.clone();
        if p.ty.is_none() {
            p.ty = tp.ty.clone();
        }
    }
    variadic_parm(templateparms).is_some()
}

/// Flag every parameter that was filled in from a primary default.
fn mark_defaults(defaults: &mut [Parm]) {
    for p in defaults {
        p.is_default = true;
    }
}

/// Replace parameter names inside default values with the concrete
/// arguments, so `class C = Less<(K)>` becomes `Less<(int)>` once `K` is
/// bound to `int`.
fn expand_defaults(expanded: &mut ParmList) {
    for i in 0..expanded.len() {
        // Bindings are re-read on every pass so a default referencing an
        // earlier default sees its already-substituted value.
        let bindings: Vec<(String, String)> = expanded
            .iter()
            .filter_map(|p| Some((p.name.clone()?, p.value_or_type()?.to_string())))
            .collect();
        let tp = &mut expanded[i];
        let tv = match tp.value.as_mut() {
            Some(v) => v,
            None => match tp.ty.as_mut() {
                Some(t) => t,
                None => continue,
            },
        };
        for (name, value) in &bindings {
            replace_id(tv, name, value);
        }
    }
}

/// Expand the arguments passed to an instantiation request into a full
/// parameter list for the primary template, with defaults filled in where
/// necessary.
pub fn template_parms_expand(
    arena: &NodeArena,
    instantiated_parms: &[Parm],
    primary: NodeId,
) -> ParmList {
    let node = &arena[primary];
    let templateparms = node.templateparms.clone().unwrap_or_default();
    let mut expanded: ParmList = instantiated_parms.to_vec();

    if node.templatetype == Some(NodeKind::Class) {
        let variadic = merge_parameters(&mut expanded, &templateparms);
        if !variadic && instantiated_parms.len() < templateparms.len() {
            let mut defaults: ParmList = templateparms[instantiated_parms.len()..].to_vec();
            mark_defaults(&mut defaults);
            expanded.append(&mut defaults);
            expand_defaults(&mut expanded);
        }
    } else {
        // Templated function: no default template parameter support.
        merge_parameters(&mut expanded, &templateparms);
    }

    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;

    fn class_primary(arena: &mut NodeArena, templateparms: ParmList) -> NodeId {
        let mut n = Node::new(NodeKind::Template);
        n.templatetype = Some(NodeKind::Class);
        n.templateparms = Some(templateparms);
        arena.alloc(n)
    }

    #[test]
    fn merge_copies_names_and_missing_types() {
        let mut arena = NodeArena::new();
        let primary = class_primary(
            &mut arena,
            vec![Parm::named("T", "typename"), Parm::named("N", "int")],
        );
        // Non-type argument passed by value only.
        let mut size = Parm::default();
        size.value = Some("16".to_string());
        let args = vec![Parm::with_type("double"), size];

        let expanded = template_parms_expand(&arena, &args, primary);
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].name.as_deref(), Some("T"));
        assert_eq!(expanded[0].ty.as_deref(), Some("double"));
        assert_eq!(expanded[1].name.as_deref(), Some("N"));
        assert_eq!(expanded[1].ty.as_deref(), Some("int"));
        assert_eq!(expanded[1].value.as_deref(), Some("16"));
    }

    #[test]
    fn defaults_are_appended_and_marked() {
        let mut arena = NodeArena::new();
        let mut comparator = Parm::named("C", "typename");
        comparator.value = Some("Less<(K)>".to_string());
        let primary = class_primary(
            &mut arena,
            vec![Parm::named("K", "typename"), comparator],
        );

        let expanded = template_parms_expand(&arena, &[Parm::with_type("int")], primary);
        assert_eq!(expanded.len(), 2);
        assert!(!expanded[0].is_default);
        assert!(expanded[1].is_default);
        assert_eq!(expanded[1].value.as_deref(), Some("Less<(int)>"));
    }

    #[test]
    fn default_back_references_are_fully_resolved() {
        // int K, int T, class C = Less<(K)> -- the default references an
        // earlier parameter by name.
        let mut arena = NodeArena::new();
        let mut c = Parm::named("C", "typename");
        c.value = Some("Less<(K)>".to_string());
        let primary = class_primary(
            &mut arena,
            vec![Parm::named("K", "int"), Parm::named("T", "int"), c],
        );

        let mut k = Parm::default();
        k.value = Some("4".to_string());
        let mut t = Parm::default();
        t.value = Some("8".to_string());
        let expanded = template_parms_expand(&arena, &[k, t], primary);

        assert_eq!(expanded[2].value.as_deref(), Some("Less<(4)>"));
        // No free occurrence of the referenced parameter name remains.
        assert!(!expanded[2].value.as_deref().unwrap().contains('K'));
    }

    #[test]
    fn variadic_primary_gets_no_defaults() {
        let mut arena = NodeArena::new();
        let primary = class_primary(&mut arena, vec![Parm::named("T", "v.typename")]);
        let expanded = template_parms_expand(
            &arena,
            &[Parm::with_type("A"), Parm::with_type("B")],
            primary,
        );
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].name.as_deref(), Some("T"));
        assert!(expanded[1].name.is_none());
    }

    #[test]
    fn function_template_merge_only() {
        let mut arena = NodeArena::new();
        let mut n = Node::new(NodeKind::Template);
        n.templatetype = Some(NodeKind::CDecl);
        let mut u = Parm::named("U", "typename");
        u.value = Some("int".to_string());
        n.templateparms = Some(vec![Parm::named("T", "typename"), u]);
        let primary = arena.alloc(n);

        let expanded = template_parms_expand(&arena, &[Parm::with_type("double")], primary);
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].name.as_deref(), Some("T"));
    }
}
