// src/template/postprocess.rs
//
// After substitution a function cdecl may carry pointer or reference layers
// on its `type` attribute that belong at the end of its declarator. This
// pass moves the movable prefix of `type` to the tail of `decl`, keeping
// qualifier and array layers behind:
//
//   decl="f().",  type="p.q(const).char"   =>  decl="f().p.",           type="q(const).char"
//   decl="f().p.", type="p.SomeClass"      =>  decl="f().p.p.",         type="SomeClass"
//   decl="f().",  type="r.q(const).p.int"  =>  decl="f().r.q(const).p.", type="int"

use crate::ast::{NodeArena, NodeId, NodeKind};
use crate::typestr;

/// Move the non-qualifier, non-array prefix of `ty` to the end of `decl`.
pub(crate) fn fix_function_decl(name: &str, decl: &mut String, ty: &mut String) {
    let mut prefix = typestr::prefix(ty).to_string();

    // Qualifier and array layers stay on the type.
    while let Some(last) = typestr::last(&prefix) {
        if typestr::is_qualifier(last) || typestr::is_array(last) {
            let cut = prefix.len() - last.len();
            prefix.truncate(cut);
        } else {
            break;
        }
    }

    if !prefix.is_empty() {
        decl.push_str(&prefix);
        ty.replace_range(..prefix.len(), "");
        tracing::debug!(name, %ty, %decl, "fixed function declarator");
    }
}

/// Walk the expanded tree and normalize every function cdecl.
pub(crate) fn postprocess(arena: &mut NodeArena, n: NodeId) {
    if arena[n].error {
        return;
    }
    if arena[n].kind() == NodeKind::CDecl {
        let is_function = arena[n].decl.as_deref().is_some_and(typestr::is_function);
        if is_function && arena[n].ty.is_some() {
            let mut decl = arena[n].decl.take().unwrap();
            let mut ty = arena[n].ty.take().unwrap();
            let name = arena[n].name.clone().unwrap_or_default();
            fix_function_decl(&name, &mut decl, &mut ty);
            arena[n].decl = Some(decl);
            arena[n].ty = Some(ty);
        }
    } else {
        for child in arena[n].children.clone() {
            postprocess(arena, child);
        }
    }
}
