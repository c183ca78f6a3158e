// src/template/locate.rs
//
// Finds the template declaration an instantiation request should expand:
// an explicit specialization when one is registered, otherwise the best
// matching partial specialization, otherwise the primary template. Class
// templates get arity validation and duplicate-instantiation handling;
// function templates instead flag every overload with a matching template
// parameter count.

use crate::ast::{num_required, variadic_parm, Loc, NodeArena, NodeId, NodeKind, Parm, ParmList};
use crate::errors::{Diagnostics, TemplateError, TemplateWarning};
use crate::symbols::{ScopeId, SymbolTable};
use crate::template::matcher::select_partial;
use crate::typestr;

/// A located template, together with the instantiation's registered name
/// ("Box<(int)>") used for later duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Located {
    pub node: NodeId,
    pub primary: NodeId,
    pub tname: String,
}

/// Search for the template matching `name` with the given parameters.
/// Returns Ok(None) when the request should be silently dropped (duplicate
/// instantiation); fatal conditions are errors.
pub(crate) fn locate(
    arena: &NodeArena,
    symbols: &SymbolTable,
    diags: &mut Diagnostics,
    name: &str,
    instantiated_parms: &[Parm],
    symname: Option<&str>,
    tscope: ScopeId,
    loc: &Loc,
) -> Result<Option<Located>, TemplateError> {
    // Specializations only exist if there is a primary template.
    let Some(primary) = symbols.clookup(name, tscope) else {
        return Err(TemplateError::TemplateUndefined {
            name: name.to_string(),
            loc: loc.into(),
        });
    };
    tracing::debug!(name, primary = primary.index(), "found primary template");

    let primary_scope = arena[primary].sym_scope.unwrap_or_else(|| symbols.global());
    let mut parms: ParmList = instantiated_parms.to_vec();
    if let Some(targs) = arena[primary].templateparms.clone() {
        symbols.template_defargs(arena, &mut parms, &targs, tscope, primary_scope);
    }
    for p in &mut parms {
        if let Some(ty) = p.ty.take() {
            p.ty = Some(symbols.type_qualify(arena, &ty, tscope));
        }
    }
    let mut tname = name.to_string();
    typestr::add_template(&mut tname, &parms);

    // Explicit (exact) specialization, e.g. template<> class name<int>.
    let mut found = symbols.clookup_local(&tname, primary_scope);
    if found.is_none() {
        let reduced = symbols.typedef_reduce(arena, &tname, tscope);
        if reduced != tname {
            tracing::debug!(%reduced, "searching explicit specialization after typedef reduction");
            found = symbols.clookup_local(&reduced, primary_scope);
        }
    }
    if let Some(n) = found {
        let node = &arena[n];
        if node.kind() == NodeKind::Template {
            tracing::debug!(name = node.name.as_deref().unwrap_or(""), "explicit specialization found");
            return Ok(Some(Located {
                node: n,
                primary,
                tname,
            }));
        }
        if let Some(template) = node.template {
            // Previously wrapped by a template instantiation.
            let previous_named = if node.hidden {
                node.csym_next_sibling
            } else {
                Some(n)
            };
            let Some(symname) = symname else {
                // Quietly ignore empty instantiations after any previous one.
                tracing::debug!(
                    name = node.name.as_deref().unwrap_or(""),
                    "duplicate empty template instantiation ignored"
                );
                return Ok(None);
            };
            if let Some(prev) = previous_named {
                let prev_node = &arena[prev];
                let mut unprocessed = name.to_string();
                typestr::add_template(&mut unprocessed, instantiated_parms);
                diags.warn(TemplateWarning::TypeRedefined {
                    name: typestr::namestr(&unprocessed),
                    symname: symname.to_string(),
                    previous_name: typestr::namestr(prev_node.name.as_deref().unwrap_or("")),
                    previous_symname: prev_node.sym_name.clone().unwrap_or_default(),
                    loc: loc.into(),
                    previous_loc: (&prev_node.loc).into(),
                });
                return Ok(None);
            }
            // A named instantiation supersedes a previous empty one.
            tracing::debug!("named instantiation overrides previous empty instantiation");
            return Ok(Some(Located {
                node: template,
                primary,
                tname,
            }));
        }
        return Err(TemplateError::NotATemplate {
            name: name.to_string(),
            kind: node.kind().as_str().to_string(),
            loc: loc.into(),
        });
    }

    // Partial specializations, e.g. template<typename T> class name<T *>.
    let mut chosen = None;
    if let Some(sel) = select_partial(arena, symbols, &arena[primary].partials, &parms, tscope) {
        let chosen_node = arena[primary].partials[sel.chosen];
        let key = arena[chosen_node].templcsymname.as_deref().unwrap_or("");
        chosen = symbols.clookup_local(key, primary_scope);
        if let Some(n) = chosen {
            if !sel.ambiguous.is_empty() {
                let ignored = sel
                    .ambiguous
                    .iter()
                    .map(|&i| {
                        let id = arena[primary].partials[i];
                        let key = arena[id].templcsymname.as_deref().unwrap_or("");
                        let ignored_node = symbols.clookup_local(key, primary_scope).unwrap_or(id);
                        format!(
                            "'{}'",
                            typestr::namestr(arena[ignored_node].name.as_deref().unwrap_or(""))
                        )
                    })
                    .collect();
                diags.warn(TemplateWarning::TemplateAmbiguous {
                    name: typestr::namestr(&tname),
                    chosen: typestr::namestr(arena[n].name.as_deref().unwrap_or("")),
                    ignored,
                    loc: loc.into(),
                });
            }
        }
    }

    let n = match chosen {
        Some(n) => n,
        None => {
            tracing::debug!(name = arena[primary].name.as_deref().unwrap_or(""), "chosen primary template");
            primary
        }
    };

    if arena[n].kind() != NodeKind::Template {
        return Err(TemplateError::NotATemplate {
            name: name.to_string(),
            kind: arena[n].kind().as_str().to_string(),
            loc: loc.into(),
        });
    }
    Ok(Some(Located {
        node: n,
        primary,
        tname,
    }))
}

/// Search for a template matching `name` and mark it for instantiation.
///
/// For class templates the single best match is marked (explicit
/// specialization, partial specialization, or primary) after arity
/// validation against the primary's parameter list. For function templates
/// every sibling overload with a matching template parameter count is
/// marked; variadic overloads are considered only when no non-variadic
/// overload matched.
#[allow(clippy::too_many_arguments)]
pub fn template_locate(
    arena: &mut NodeArena,
    symbols: &SymbolTable,
    diags: &mut Diagnostics,
    name: &str,
    instantiated_parms: &[Parm],
    symname: Option<&str>,
    tscope: ScopeId,
    loc: &Loc,
) -> Result<Option<NodeId>, TemplateError> {
    Ok(locate_marked(
        arena,
        symbols,
        diags,
        name,
        instantiated_parms,
        symname,
        tscope,
        loc,
    )?
    .map(|l| l.node))
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn locate_marked(
    arena: &mut NodeArena,
    symbols: &SymbolTable,
    diags: &mut Diagnostics,
    name: &str,
    instantiated_parms: &[Parm],
    symname: Option<&str>,
    tscope: ScopeId,
    loc: &Loc,
) -> Result<Option<Located>, TemplateError> {
    let Some(located) = locate(
        arena,
        symbols,
        diags,
        name,
        instantiated_parms,
        symname,
        tscope,
        loc,
    )?
    else {
        return Ok(None);
    };

    let is_class = arena[located.node].templatetype == Some(NodeKind::Class);
    if is_class {
        // Arity is validated against the primary; explicit specializations
        // carry no template parameters of their own.
        if arena[located.node].templateparms.is_some() {
            if let Some(tparms) = arena[located.primary].templateparms.as_ref() {
                let variadic = variadic_parm(tparms).is_some();
                if !variadic && instantiated_parms.len() > tparms.len() {
                    return Err(TemplateError::TooManyTemplateParameters {
                        maximum: tparms.len(),
                        loc: loc.into(),
                    });
                }
                // The variadic parameter itself is optional.
                let required = num_required(tparms).saturating_sub(usize::from(variadic));
                if instantiated_parms.len() < required {
                    return Err(TemplateError::NotEnoughTemplateParameters {
                        required,
                        loc: loc.into(),
                    });
                }
            }
        }
        arena[located.node].instantiate = true;
        return Ok(Some(located));
    }

    // Templated function: ignore specializations, mark every unspecialized
    // overload whose template parameter count fits.
    tracing::debug!(name, "not a templated class, seeking primary templated functions");
    let first = symbols.clookup(name, tscope);
    let mut matched = None;

    let mut n = first;
    while let Some(id) = n {
        if arena[id].kind() == NodeKind::Template {
            if let Some(tparms) = arena[id].templateparms.as_ref() {
                if variadic_parm(tparms).is_none() && tparms.len() == instantiated_parms.len() {
                    arena[id].instantiate = true;
                    matched.get_or_insert(id);
                }
            }
        }
        n = arena[id].sym_next_sibling;
    }

    // Only consider variadic overloads if nothing else matched.
    if matched.is_none() {
        let mut n = first;
        while let Some(id) = n {
            if arena[id].kind() == NodeKind::Template {
                if let Some(tparms) = arena[id].templateparms.as_ref() {
                    if variadic_parm(tparms).is_some()
                        && instantiated_parms.len() + 1 >= tparms.len()
                    {
                        arena[id].instantiate = true;
                        matched.get_or_insert(id);
                    }
                }
            }
            n = arena[id].sym_next_sibling;
        }
    }

    match matched {
        Some(node) => Ok(Some(Located {
            node,
            primary: located.primary,
            tname: located.tname,
        })),
        None => Err(TemplateError::TemplateUndefined {
            name: name.to_string(),
            loc: loc.into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;

    struct Fixture {
        arena: NodeArena,
        symbols: SymbolTable,
        diags: Diagnostics,
        scope: ScopeId,
    }

    impl Fixture {
        fn new() -> Self {
            let symbols = SymbolTable::new();
            let scope = symbols.global();
            Fixture {
                arena: NodeArena::new(),
                symbols,
                diags: Diagnostics::new(),
                scope,
            }
        }

        fn class_template(&mut self, name: &str, templateparms: ParmList) -> NodeId {
            let mut n = Node::new(NodeKind::Template);
            n.name = Some(name.to_string());
            n.sym_name = Some(name.to_string());
            n.templatetype = Some(NodeKind::Class);
            n.templateparms = Some(templateparms);
            let id = self.arena.alloc(n);
            self.symbols.add_symbol(&mut self.arena, self.scope, name, id);
            id
        }

        fn locate(
            &mut self,
            name: &str,
            parms: &[Parm],
            symname: Option<&str>,
        ) -> Result<Option<NodeId>, TemplateError> {
            template_locate(
                &mut self.arena,
                &self.symbols,
                &mut self.diags,
                name,
                parms,
                symname,
                self.scope,
                &Loc::new("test.i", 1),
            )
        }
    }

    #[test]
    fn missing_primary_is_fatal() {
        let mut fx = Fixture::new();
        let err = fx.locate("Box", &[Parm::with_type("int")], Some("IntBox"));
        assert!(matches!(err, Err(TemplateError::TemplateUndefined { .. })));
    }

    #[test]
    fn primary_is_chosen_and_marked() {
        let mut fx = Fixture::new();
        let primary = fx.class_template("Box", vec![Parm::named("T", "typename")]);
        let found = fx.locate("Box", &[Parm::with_type("int")], Some("IntBox")).unwrap();
        assert_eq!(found, Some(primary));
        assert!(fx.arena[primary].instantiate);
    }

    #[test]
    fn non_template_name_is_rejected() {
        let mut fx = Fixture::new();
        let mut n = Node::new(NodeKind::Class);
        n.name = Some("Box".to_string());
        let id = fx.arena.alloc(n);
        fx.symbols.add_symbol(&mut fx.arena, fx.scope, "Box", id);

        let err = fx.locate("Box", &[Parm::with_type("int")], Some("IntBox"));
        assert!(matches!(err, Err(TemplateError::NotATemplate { .. })));
    }

    #[test]
    fn arity_law() {
        // k required, n total: accepted iff k <= len(args) <= n.
        let mut fx = Fixture::new();
        let mut c = Parm::named("C", "typename");
        c.value = Some("Less<(K)>".to_string());
        fx.class_template("Map", vec![Parm::named("K", "typename"), c]);

        assert!(fx.locate("Map", &[Parm::with_type("int")], None).unwrap().is_some());
        assert!(fx
            .locate(
                "Map",
                &[Parm::with_type("int"), Parm::with_type("MyCmp")],
                None
            )
            .unwrap()
            .is_some());
        let too_many = fx.locate(
            "Map",
            &[
                Parm::with_type("int"),
                Parm::with_type("MyCmp"),
                Parm::with_type("int"),
            ],
            None,
        );
        assert!(matches!(
            too_many,
            Err(TemplateError::TooManyTemplateParameters { maximum: 2, .. })
        ));
        let too_few = fx.locate("Map", &[], None);
        assert!(matches!(
            too_few,
            Err(TemplateError::NotEnoughTemplateParameters { required: 1, .. })
        ));
    }

    #[test]
    fn variadic_arity_lower_bound_is_relaxed() {
        let mut fx = Fixture::new();
        fx.class_template("Tup", vec![Parm::named("T", "v.typename")]);
        assert!(fx.locate("Tup", &[], None).unwrap().is_some());
        assert!(fx
            .locate("Tup", &[Parm::with_type("A"), Parm::with_type("B")], None)
            .unwrap()
            .is_some());
    }

    #[test]
    fn explicit_specialization_wins_over_primary() {
        let mut fx = Fixture::new();
        fx.class_template("Box", vec![Parm::named("T", "typename")]);
        // template<> class Box<int>: registered under its full name, no
        // template parameters of its own.
        let mut spec = Node::new(NodeKind::Template);
        spec.name = Some("Box<(int)>".to_string());
        spec.templatetype = Some(NodeKind::Class);
        let spec = fx.arena.alloc(spec);
        fx.symbols
            .add_symbol(&mut fx.arena, fx.scope, "Box<(int)>", spec);

        let found = fx.locate("Box", &[Parm::with_type("int")], Some("IntBox")).unwrap();
        assert_eq!(found, Some(spec));
    }

    #[test]
    fn explicit_specialization_found_through_typedef_reduction() {
        let mut fx = Fixture::new();
        fx.class_template("Box", vec![Parm::named("T", "typename")]);
        let mut td = Node::new(NodeKind::CDecl);
        td.name = Some("size_t".to_string());
        td.storage = Some("typedef".to_string());
        td.ty = Some("unsigned long".to_string());
        let td = fx.arena.alloc(td);
        fx.symbols.add_symbol(&mut fx.arena, fx.scope, "size_t", td);

        let mut spec = Node::new(NodeKind::Template);
        spec.name = Some("Box<(unsigned long)>".to_string());
        spec.templatetype = Some(NodeKind::Class);
        let spec = fx.arena.alloc(spec);
        fx.symbols
            .add_symbol(&mut fx.arena, fx.scope, "Box<(unsigned long)>", spec);

        let found = fx
            .locate("Box", &[Parm::with_type("size_t")], Some("SBox"))
            .unwrap();
        assert_eq!(found, Some(spec));
    }

    #[test]
    fn duplicate_named_instantiation_warns_and_drops() {
        let mut fx = Fixture::new();
        let primary = fx.class_template("Box", vec![Parm::named("T", "typename")]);
        // Simulate a previous %template(IntBox) Box<int>.
        let mut inst = Node::new(NodeKind::Class);
        inst.name = Some("Box<(int)>".to_string());
        inst.sym_name = Some("IntBox".to_string());
        inst.template = Some(primary);
        let inst = fx.arena.alloc(inst);
        fx.symbols
            .add_symbol(&mut fx.arena, fx.scope, "Box<(int)>", inst);

        let found = fx
            .locate("Box", &[Parm::with_type("int")], Some("IntBox2"))
            .unwrap();
        assert_eq!(found, None);
        assert_eq!(fx.diags.warnings().len(), 1);
        assert!(matches!(
            fx.diags.warnings()[0],
            TemplateWarning::TypeRedefined { .. }
        ));
    }

    #[test]
    fn duplicate_empty_instantiation_is_silently_ignored() {
        let mut fx = Fixture::new();
        let primary = fx.class_template("Box", vec![Parm::named("T", "typename")]);
        let mut inst = Node::new(NodeKind::Class);
        inst.name = Some("Box<(int)>".to_string());
        inst.sym_name = Some("IntBox".to_string());
        inst.template = Some(primary);
        let inst = fx.arena.alloc(inst);
        fx.symbols
            .add_symbol(&mut fx.arena, fx.scope, "Box<(int)>", inst);

        let found = fx.locate("Box", &[Parm::with_type("int")], None).unwrap();
        assert_eq!(found, None);
        assert!(fx.diags.is_empty());
    }

    #[test]
    fn named_instantiation_supersedes_empty_one() {
        let mut fx = Fixture::new();
        let primary = fx.class_template("Box", vec![Parm::named("T", "typename")]);
        let mut inst = Node::new(NodeKind::Class);
        inst.name = Some("Box<(int)>".to_string());
        inst.sym_name = Some("__dummy_0__".to_string());
        inst.template = Some(primary);
        inst.hidden = true;
        let inst = fx.arena.alloc(inst);
        fx.symbols
            .add_symbol(&mut fx.arena, fx.scope, "Box<(int)>", inst);

        let found = fx
            .locate("Box", &[Parm::with_type("int")], Some("IntBox"))
            .unwrap();
        assert_eq!(found, Some(primary));
        assert!(fx.diags.is_empty());
    }

    #[test]
    fn function_template_marks_all_matching_overloads() {
        let mut fx = Fixture::new();
        let mut a = Node::new(NodeKind::Template);
        a.name = Some("min".to_string());
        a.templatetype = Some(NodeKind::CDecl);
        a.templateparms = Some(vec![Parm::named("T", "typename")]);
        let a = fx.arena.alloc(a);
        fx.symbols.add_symbol(&mut fx.arena, fx.scope, "min", a);

        let mut b = Node::new(NodeKind::Template);
        b.name = Some("min".to_string());
        b.templatetype = Some(NodeKind::CDecl);
        b.templateparms = Some(vec![Parm::named("T", "typename")]);
        let b = fx.arena.alloc(b);
        fx.symbols.add_symbol(&mut fx.arena, fx.scope, "min", b);

        let mut c = Node::new(NodeKind::Template);
        c.name = Some("min".to_string());
        c.templatetype = Some(NodeKind::CDecl);
        c.templateparms = Some(vec![Parm::named("T", "typename"), Parm::named("U", "typename")]);
        let c = fx.arena.alloc(c);
        fx.symbols.add_symbol(&mut fx.arena, fx.scope, "min", c);

        let found = fx.locate("min", &[Parm::with_type("int")], Some("minint")).unwrap();
        assert_eq!(found, Some(a));
        assert!(fx.arena[a].instantiate);
        assert!(fx.arena[b].instantiate);
        assert!(!fx.arena[c].instantiate);
    }

    #[test]
    fn variadic_function_template_is_a_fallback() {
        let mut fx = Fixture::new();
        let mut a = Node::new(NodeKind::Template);
        a.name = Some("f".to_string());
        a.templatetype = Some(NodeKind::CDecl);
        a.templateparms = Some(vec![Parm::named("T", "typename"), Parm::named("V", "v.typename")]);
        let a = fx.arena.alloc(a);
        fx.symbols.add_symbol(&mut fx.arena, fx.scope, "f", a);

        let found = fx
            .locate("f", &[Parm::with_type("int"), Parm::with_type("char")], Some("fic"))
            .unwrap();
        assert_eq!(found, Some(a));
        assert!(fx.arena[a].instantiate);
    }
}
