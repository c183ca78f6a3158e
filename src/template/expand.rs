// src/template/expand.rs
//
// Rewrites a (cloned) template node into its specialized form. A single
// recursive walk expands variadic parameter packs and collects three patch
// lists with different substitution semantics:
//
//   patchlist  - name/value strings, identifier-replaced by argument types
//   cpatchlist - code fragments, stringize (#T -> "value") plus identifier
//                replace with the display form of the argument
//   typelist   - encoded types, variadic-replaced and typename-replaced
//                (guarded by a symbol-table collision check)
//
// Patches are recorded as (node, slot) pairs and resolved against the arena
// at apply time, so rewrites earlier in the pass are visible to later ones.

use crate::ast::{
    variadic_parm, BaseListKey, NodeArena, NodeId, NodeKind, Parm, ParmList, ParmListKey,
    BASE_LIST_KEYS,
};
use crate::errors::TemplateError;
use crate::symbols::{scopename_last, ScopeId, SymbolTable};
use crate::template::postprocess::postprocess;
use crate::typestr;
use crate::util::{replace_first, replace_id};

/// A mutable string attribute scheduled for substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Name(NodeId),
    SymName(NodeId),
    Value(NodeId),
    Code(NodeId),
    Decl(NodeId),
    Type(NodeId),
    UName(NodeId),
    ParmType(NodeId, ParmListKey, usize),
    ParmValue(NodeId, ParmListKey, usize),
    ParmName(NodeId, ParmListKey, usize),
    Base(NodeId, BaseListKey, usize),
}

impl Slot {
    fn get(self, arena: &NodeArena) -> Option<&str> {
        match self {
            Slot::Name(n) => arena[n].name.as_deref(),
            Slot::SymName(n) => arena[n].sym_name.as_deref(),
            Slot::Value(n) => arena[n].value.as_deref(),
            Slot::Code(n) => arena[n].code.as_deref(),
            Slot::Decl(n) => arena[n].decl.as_deref(),
            Slot::Type(n) => arena[n].ty.as_deref(),
            Slot::UName(n) => arena[n].uname.as_deref(),
            Slot::ParmType(n, key, i) => arena[n].parm_list(key)?.get(i)?.ty.as_deref(),
            Slot::ParmValue(n, key, i) => arena[n].parm_list(key)?.get(i)?.value.as_deref(),
            Slot::ParmName(n, key, i) => arena[n].parm_list(key)?.get(i)?.name.as_deref(),
            Slot::Base(n, key, i) => arena[n].base_list(key).get(i).map(String::as_str),
        }
    }

    fn resolve(self, arena: &mut NodeArena) -> Option<&mut String> {
        match self {
            Slot::Name(n) => arena[n].name.as_mut(),
            Slot::SymName(n) => arena[n].sym_name.as_mut(),
            Slot::Value(n) => arena[n].value.as_mut(),
            Slot::Code(n) => arena[n].code.as_mut(),
            Slot::Decl(n) => arena[n].decl.as_mut(),
            Slot::Type(n) => arena[n].ty.as_mut(),
            Slot::UName(n) => arena[n].uname.as_mut(),
            Slot::ParmType(n, key, i) => arena[n].parm_list_mut(key)?.get_mut(i)?.ty.as_mut(),
            Slot::ParmValue(n, key, i) => arena[n].parm_list_mut(key)?.get_mut(i)?.value.as_mut(),
            Slot::ParmName(n, key, i) => arena[n].parm_list_mut(key)?.get_mut(i)?.name.as_mut(),
            Slot::Base(n, key, i) => arena[n].base_list_mut(key).get_mut(i),
        }
    }
}

struct ExpandCtx {
    templnode: NodeId,
    tname: String,
    rname: String,
    templateargs: String,
    unexpanded_variadic: Option<Parm>,
    expanded_variadic: ParmList,
    patchlist: Vec<Slot>,
    cpatchlist: Vec<Slot>,
    typelist: Vec<Slot>,
}

/// Rewrite the trailing variadic parameter of `n`'s `key` list into one
/// parameter per pack argument, with the pack name substituted by each
/// argument type. For `template <typename... T> struct X { X(T&... tt); }`
/// instantiated with `<A,B,C>` the constructor list `v.r.T tt` becomes
/// `r.A,r.B,r.C`.
fn expand_variadic_parms(ctx: &ExpandCtx, arena: &mut NodeArena, n: NodeId, key: ParmListKey) {
    let Some(pack_name) = ctx
        .unexpanded_variadic
        .as_ref()
        .and_then(|p| p.name.clone())
    else {
        return;
    };
    let Some(list) = arena[n].parm_list(key) else {
        return;
    };
    if variadic_parm(list).is_none() {
        return;
    }
    let variadic_ty = list.last().and_then(|p| p.ty.clone()).unwrap_or_default();

    let mut expanded = ctx.expanded_variadic.clone();
    for ep in &mut expanded {
        let mut newtype = variadic_ty.clone();
        typestr::del_variadic(&mut newtype);
        if let Some(ep_ty) = ep.ty.as_deref() {
            replace_id(&mut newtype, &pack_name, ep_ty);
        }
        ep.ty = Some(newtype);
    }

    let list = arena[n].parm_list_mut(key).unwrap();
    list.pop();
    list.append(&mut expanded);
}

/// Record the type and value of each parameter for later substitution.
fn add_parms(ctx: &mut ExpandCtx, arena: &NodeArena, n: NodeId, key: ParmListKey, is_pattern: bool) {
    let Some(list) = arena[n].parm_list(key) else {
        return;
    };
    for i in 0..list.len() {
        ctx.typelist.push(Slot::ParmType(n, key, i));
        ctx.typelist.push(Slot::ParmValue(n, key, i));
        if is_pattern {
            // Pattern names can be qualified and so may need expansion too.
            ctx.typelist.push(Slot::ParmName(n, key, i));
        }
        ctx.cpatchlist.push(Slot::ParmValue(n, key, i));
    }
}

fn expand_parms(
    ctx: &mut ExpandCtx,
    arena: &mut NodeArena,
    n: NodeId,
    key: ParmListKey,
    is_pattern: bool,
) {
    expand_variadic_parms(ctx, arena, n, key);
    add_parms(ctx, arena, n, key, is_pattern);
}

/// Expand a variadic base class entry in place, appending the expanded
/// types to the list at position `i`. Returns how many entries replaced it.
fn expand_variadic_base(
    ctx: &mut ExpandCtx,
    arena: &mut NodeArena,
    n: NodeId,
    key: BaseListKey,
    i: usize,
) -> usize {
    let name = arena[n].base_list(key)[i].clone();
    let pack_name = ctx
        .unexpanded_variadic
        .as_ref()
        .and_then(|p| p.name.clone())
        .unwrap_or_default();

    let mut expanded: Vec<String> = Vec::with_capacity(ctx.expanded_variadic.len());
    for ep in &ctx.expanded_variadic {
        let mut newtype = name.clone();
        typestr::del_variadic(&mut newtype);
        if let Some(ep_ty) = ep.ty.as_deref() {
            replace_id(&mut newtype, &pack_name, ep_ty);
        }
        expanded.push(newtype);
    }
    let count = expanded.len();
    let list = arena[n].base_list_mut(key);
    list.splice(i..=i, expanded);
    for j in i..i + count {
        ctx.typelist.push(Slot::Base(n, key, j));
    }
    count
}

/// Rewrite a constructor's `name`/`sym:name` from the template base name to
/// the instantiated form.
fn rewrite_constructor_names(ctx: &mut ExpandCtx, arena: &mut NodeArena, n: NodeId) {
    if let Some(name) = arena[n].name.as_mut() {
        let stripped = typestr::template_prefix(name).to_string();
        if ctx.tname.contains(&stripped) {
            replace_id(name, &stripped, &ctx.tname);
        }
    }
    if let Some(symname) = arena[n].sym_name.as_mut() {
        let stripped = typestr::template_prefix(symname).to_string();
        if ctx.tname.contains(&stripped) {
            replace_id(symname, &stripped, &ctx.tname);
        }
    }
    if let Some(name) = arena[n].name.as_mut() {
        if name.contains('<') {
            ctx.patchlist.push(Slot::Name(n));
        } else {
            name.push_str(&ctx.templateargs);
        }
    }
    if let Some(symname) = arena[n].sym_name.as_mut() {
        if symname.contains('<') {
            *symname = ctx.rname.clone();
        } else {
            *symname = symname.replace(&ctx.tname, &ctx.rname);
        }
    }
}

/// One recursive descent over the template body, collecting patches per
/// node kind. `outer_seen` distinguishes the outermost template node from
/// member templates, which are re-tagged only for the duration of the walk.
fn walk(ctx: &mut ExpandCtx, arena: &mut NodeArena, n: NodeId, outer_seen: bool) {
    if arena[n].error {
        return;
    }
    match arena[n].kind() {
        NodeKind::Template => {
            let Some(tt) = arena[n].templatetype else {
                return;
            };
            arena[n].kind = Some(tt);
            walk(ctx, arena, n, true);
            if outer_seen {
                // Member template: restore the tag once its body is done.
                arena[n].kind = Some(NodeKind::Template);
            }
        }
        NodeKind::CDecl => {
            ctx.typelist.push(Slot::Type(n));
            ctx.typelist.push(Slot::Decl(n));
            ctx.patchlist.push(Slot::Value(n));
            ctx.cpatchlist.push(Slot::Code(n));

            if arena[n].conversion_operator {
                ctx.cpatchlist.push(Slot::Name(n));
                if arena[n].sym_name.is_some() {
                    ctx.cpatchlist.push(Slot::SymName(n));
                }
            }
            if arena[n].storage.as_deref() == Some("friend") {
                if let Some(symname) = arena[n].sym_name.as_ref() {
                    let stripped = typestr::template_prefix(symname).to_string();
                    arena[n].sym_name = Some(stripped);
                }
                ctx.typelist.push(Slot::Name(n));
            }

            expand_parms(ctx, arena, n, ParmListKey::Parms, false);
            expand_parms(ctx, arena, n, ParmListKey::Throws, false);
        }
        NodeKind::Class => {
            for key in BASE_LIST_KEYS {
                let mut i = 0;
                while i < arena[n].base_list(key).len() {
                    let name = &arena[n].base_list(key)[i];
                    if typestr::is_variadic(name) {
                        // The pack must be the trailing base.
                        debug_assert_eq!(i, arena[n].base_list(key).len() - 1);
                        i += expand_variadic_base(ctx, arena, n, key, i);
                    } else {
                        ctx.typelist.push(Slot::Base(n, key, i));
                        i += 1;
                    }
                }
            }
            for child in arena[n].children.clone() {
                walk(ctx, arena, child, outer_seen);
            }
        }
        NodeKind::Constructor => {
            if arena[n].templatetype.is_none() {
                rewrite_constructor_names(ctx, arena, n);
            }
            ctx.cpatchlist.push(Slot::Code(n));
            ctx.typelist.push(Slot::Decl(n));
            expand_parms(ctx, arena, n, ParmListKey::Parms, false);
            expand_parms(ctx, arena, n, ParmListKey::Throws, false);
        }
        NodeKind::Destructor => {
            // Only the template's own destructor is renamed, with a single
            // intermediate node allowed for methods added through %extend.
            let parent = arena[n].parent;
            let direct = parent == Some(ctx.templnode);
            let through_extend = parent.is_some_and(|p| {
                arena[p].kind() == NodeKind::Extend && arena[p].parent == Some(ctx.templnode)
            });
            if direct || through_extend {
                if let Some(name) = arena[n].name.as_mut() {
                    if name.contains('<') {
                        ctx.patchlist.push(Slot::Name(n));
                    } else {
                        name.push_str(&ctx.templateargs);
                    }
                }
                if let Some(symname) = arena[n].sym_name.as_mut() {
                    if symname.contains('<') {
                        *symname = ctx.tname.clone();
                    } else {
                        let replaced = symname.replace(&ctx.tname, &ctx.rname);
                        *symname = replaced;
                    }
                }
                ctx.cpatchlist.push(Slot::Code(n));
            }
        }
        NodeKind::Using => {
            if arena[n].uname.as_deref().is_some_and(|u| u.contains('<')) {
                ctx.patchlist.push(Slot::UName(n));
            }
        }
        _ => {
            // Look for obvious parameters.
            ctx.cpatchlist.push(Slot::Code(n));
            ctx.typelist.push(Slot::Type(n));
            ctx.typelist.push(Slot::Decl(n));
            expand_parms(ctx, arena, n, ParmListKey::Parms, false);
            expand_parms(ctx, arena, n, ParmListKey::Kwargs, false);
            expand_parms(ctx, arena, n, ParmListKey::Pattern, true);
            expand_parms(ctx, arena, n, ParmListKey::Throws, false);
            for child in arena[n].children.clone() {
                walk(ctx, arena, child, outer_seen);
            }
        }
    }
}

/// Strip the non-placeholder prefix of a partial-specialization pattern
/// from a concrete argument: partial_arg("p.int", "p.$1") deduces "int".
fn partial_arg(s: &str, pattern: &str) -> String {
    let Some(dollar) = pattern.find('$') else {
        return s.to_string();
    };
    let prefix = &pattern[..dollar];
    let mut out = s.to_string();
    replace_first(&mut out, prefix, "");
    out
}

/// Expand the template `node` (already cloned by the caller) in place into
/// the specialization described by `tparms`, giving it the symbol name
/// `rname`. `tparms` is mutated: partial-specialization patterns deduce
/// argument types and later defaults absorb earlier substitutions.
pub fn template_expand(
    arena: &mut NodeArena,
    symbols: &SymbolTable,
    node: NodeId,
    rname: &str,
    tparms: &mut ParmList,
    tscope: ScopeId,
) -> Result<(), TemplateError> {
    let mut templateargs = String::new();
    typestr::add_template(&mut templateargs, tparms);

    let tname = arena[node].name.clone().unwrap_or_default();
    let tbase = scopename_last(&tname).to_string();

    // Partial specialization: deduce the real argument types by stripping
    // the specialization pattern prefix, e.g. X<int*> against X<T*> binds
    // T to int.
    if let Some(partialargs) = arena[node].partialargs.clone() {
        if let Some(ptargs) = typestr::function_parms(&partialargs) {
            debug_assert_eq!(ptargs.len(), tparms.len());
            for (tp, p) in tparms.iter_mut().zip(ptargs.iter()) {
                if let (Some(tptype), Some(ptype)) = (tp.ty.as_deref(), p.ty.as_deref()) {
                    tp.ty = Some(partial_arg(tptype, ptype));
                }
            }
        }
    }

    let templateparms = arena[node].templateparms.clone().unwrap_or_default();
    let unexpanded_variadic = variadic_parm(&templateparms).cloned();
    let expanded_variadic: ParmList = if unexpanded_variadic.is_some() {
        let start = templateparms.len() - 1;
        if start <= tparms.len() {
            tparms[start..].to_vec()
        } else {
            Vec::new()
        }
    } else {
        Vec::new()
    };

    tracing::debug!(
        %tname,
        rname,
        %templateargs,
        "expanding template"
    );

    let mut ctx = ExpandCtx {
        templnode: node,
        tname: tname.clone(),
        rname: rname.to_string(),
        templateargs: templateargs.clone(),
        unexpanded_variadic,
        expanded_variadic,
        patchlist: Vec::new(),
        cpatchlist: Vec::new(),
        typelist: Vec::new(),
    };
    walk(&mut ctx, arena, node, false);

    // The node takes its instantiated name.
    if let Some(name) = arena[node].name.as_mut() {
        name.push_str(&templateargs);
    }
    let iname = arena[node].name.clone().unwrap_or_default();

    apply_patches(arena, symbols, node, &ctx, &templateparms, tparms, &tbase, &iname, tscope);

    postprocess(arena, node);

    // Base classes are resolved in the scope of the instantiation.
    for i in 0..arena[node].baselist.len() {
        let qualified = symbols.type_qualify(arena, &arena[node].baselist[i], tscope);
        arena[node].baselist[i] = qualified;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn apply_patches(
    arena: &mut NodeArena,
    symbols: &SymbolTable,
    node: NodeId,
    ctx: &ExpandCtx,
    templateparms: &[Parm],
    tparms: &mut ParmList,
    tbase: &str,
    iname: &str,
    tscope: ScopeId,
) {
    let unexpanded = ctx.unexpanded_variadic.as_ref();
    let expanded = &ctx.expanded_variadic;

    if templateparms.is_empty() || tparms.is_empty() {
        // No template parameters at all: an explicit specialization. Only
        // the self-references need rewriting.
        for slot in &ctx.typelist {
            if let Some(s) = slot.resolve(arena) {
                debug_assert!(!typestr::is_variadic(s));
                typestr::variadic_replace(s, unexpanded, expanded);
                typestr::typename_replace(s, tbase, iname);
            }
        }
        return;
    }

    let tsdecl = arena[node].sym_scope.unwrap_or_else(|| symbols.global());
    let tsname = arena[node].sym_name.clone();

    for ti in 0..templateparms.len() {
        let Some(name) = templateparms[ti].name.clone() else {
            continue;
        };
        // Once the supplied arguments run out the primary's own defaulted
        // parameters stand in for them.
        let arg = if ti < tparms.len() {
            tparms[ti].clone()
        } else {
            templateparms[ti].clone()
        };
        let Some(value) = arg.value_or_type() else {
            continue;
        };

        let qvalue = symbols.typedef_reduce(arena, value, tsdecl);
        let mut dvalue = symbols.type_qualify(arena, &qvalue, tsdecl);
        if typestr::is_template(&dvalue) {
            dvalue = symbols.template_deftype(arena, &dvalue, tscope);
        }
        let valuestr = typestr::cpp_str(&dvalue);

        // Arguments may appear inside later default values.
        for rp in tparms.iter_mut().skip(ti + 1) {
            if let Some(rvalue) = rp.value.as_mut() {
                replace_id(rvalue, &name, &dvalue);
            }
        }

        for slot in &ctx.patchlist {
            if let Some(s) = slot.resolve(arena) {
                replace_id(s, &name, &dvalue);
            }
        }

        for slot in &ctx.typelist {
            if let Some(s) = slot.resolve(arena) {
                // Parameter-list expansion has run; only nested variadic
                // fragments such as f(v.p.V) can remain.
                debug_assert!(!typestr::is_variadic(s));
                typestr::variadic_replace(s, unexpanded, expanded);
            }
            // Trivially replacing template arguments is fragile when a
            // same-named non-template exists in another namespace; skip the
            // replacement for such collisions.
            let Some(current) = slot.get(arena).map(str::to_string) else {
                continue;
            };
            let tyname = symbols
                .clookup(&current, tscope)
                .and_then(|tynode| match arena[tynode].templatetype {
                    Some(_) => None,
                    None => arena[tynode].sym_name.clone(),
                });
            let collides = matches!((&tyname, &tsname), (Some(a), Some(b)) if a == b);
            if !collides {
                if let Some(s) = slot.resolve(arena) {
                    typestr::typename_replace(s, &name, &dvalue);
                    typestr::typename_replace(s, tbase, iname);
                }
            }
        }

        let stringized = format!("#{}", name);
        let quoted = format!("\"{}\"", valuestr);
        for slot in &ctx.cpatchlist {
            if let Some(s) = slot.resolve(arena) {
                replace_id(s, &stringized, &quoted);
                replace_id(s, &name, &valuestr);
            }
        }
    }
}
