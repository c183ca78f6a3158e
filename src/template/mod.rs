// src/template/mod.rs
//
// Template instantiation: locate the declaration a request should expand
// (primary, explicit specialization, or partial specialization), then
// rewrite a clone of it into the concrete specialized form.

mod expand;
mod locate;
mod matcher;
mod parms;
mod postprocess;

pub use expand::template_expand;
pub use locate::template_locate;
pub use matcher::{
    does_parm_match, select_partial, ParmMatch, PartialSelection, EXACT_MATCH_PRIORITY,
};
pub use parms::template_parms_expand;

use crate::ast::{Loc, NodeArena, NodeId, NodeKind, ParmList};
use crate::errors::{Diagnostics, TemplateError};
use crate::symbols::{ScopeId, SymbolTable};

/// Carry out an instantiation request end to end: prepare the argument
/// list, locate the template, expand a clone of it, and register the result
/// for duplicate detection. Returns the expanded node(s) - several for
/// overloaded function templates, none when the request was dropped as a
/// duplicate.
#[allow(clippy::too_many_arguments)]
pub fn instantiate(
    arena: &mut NodeArena,
    symbols: &mut SymbolTable,
    diags: &mut Diagnostics,
    name: &str,
    instantiated_parms: &ParmList,
    symname: Option<&str>,
    tscope: ScopeId,
    loc: &Loc,
) -> Result<Vec<NodeId>, TemplateError> {
    let Some(primary) = symbols.clookup(name, tscope) else {
        return Err(TemplateError::TemplateUndefined {
            name: name.to_string(),
            loc: loc.into(),
        });
    };
    let parms = template_parms_expand(arena, instantiated_parms, primary);

    let Some(located) = locate::locate_marked(
        arena,
        symbols,
        diags,
        name,
        &parms,
        symname,
        tscope,
        loc,
    )?
    else {
        return Ok(Vec::new());
    };

    let rname = match symname {
        Some(s) => s.to_string(),
        None => symbols.next_dummy_symname(),
    };
    let hidden = symname.is_none();
    let primary_scope = arena[located.primary]
        .sym_scope
        .unwrap_or_else(|| symbols.global());

    if arena[located.node].templatetype == Some(NodeKind::Class) {
        arena[located.node].instantiate = false;
        let copy = arena.deep_copy(located.node);
        let mut tparms = parms.clone();
        template_expand(arena, symbols, copy, &rname, &mut tparms, tscope)?;
        if located.node != located.primary {
            // Explicit and partial specializations carry their pattern as
            // their own name; the expanded copy takes the instantiation
            // name instead.
            arena[copy].name = Some(located.tname.clone());
        }
        arena[copy].sym_name = Some(rname);
        arena[copy].hidden = hidden;
        arena[copy].template = Some(located.node);
        arena[copy].loc = loc.clone();

        // Register under the instantiation name for duplicate detection. A
        // previous (empty) instantiation keeps its symbol slot and links
        // forward to the new node instead.
        if let Some(previous) = symbols.clookup_local(&located.tname, primary_scope) {
            arena[previous].csym_next_sibling = Some(copy);
            arena[copy].sym_scope = Some(primary_scope);
        } else {
            symbols.add_symbol(arena, primary_scope, &located.tname, copy);
        }
        return Ok(vec![copy]);
    }

    // Function templates: expand every overload the locator flagged.
    let mut out = Vec::new();
    let mut cur = symbols.clookup(name, tscope);
    while let Some(id) = cur {
        if arena[id].instantiate && arena[id].kind() == NodeKind::Template {
            arena[id].instantiate = false;
            let copy = arena.deep_copy(id);
            let mut tparms = parms.clone();
            template_expand(arena, symbols, copy, &rname, &mut tparms, tscope)?;
            arena[copy].sym_name = Some(rname.clone());
            arena[copy].hidden = hidden;
            arena[copy].template = Some(id);
            arena[copy].loc = loc.clone();
            out.push(copy);
        }
        cur = arena[id].sym_next_sibling;
    }
    Ok(out)
}
