// src/symbols.rs
//
// Scope-chained symbol tables for the declaration tree, plus the type-level
// name services the template core depends on: typedef reduction, name
// qualification, and default-argument completion for template types.
//
// Scopes form a tree mirroring namespaces and class bodies. Lookup accepts
// qualified names ("A::B::C"); a leading "::" anchors resolution at the
// global scope.

use rustc_hash::FxHashMap;

use crate::ast::{variadic_parm, NodeArena, NodeId, NodeKind, Parm, ParmList};
use crate::typestr;
use crate::util::replace_id;

/// Unique identifier for scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Default)]
struct ScopeData {
    name: Option<String>,
    parent: Option<ScopeId>,
    symbols: FxHashMap<String, NodeId>,
    children: FxHashMap<String, ScopeId>,
}

/// Symbol tables for every scope in a translation unit.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<ScopeData>,
    dummy_counter: u32,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![ScopeData::default()],
            dummy_counter: 0,
        }
    }

    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Open a child scope. Named scopes are reachable through qualified
    /// lookup from their parent.
    pub fn new_scope(&mut self, name: Option<&str>, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeData {
            name: name.map(str::to_string),
            parent: Some(parent),
            ..ScopeData::default()
        });
        if let Some(n) = name {
            self.scope_mut(parent).children.insert(n.to_string(), id);
        }
        id
    }

    fn scope(&self, id: ScopeId) -> &ScopeData {
        &self.scopes[id.0 as usize]
    }

    fn scope_mut(&mut self, id: ScopeId) -> &mut ScopeData {
        &mut self.scopes[id.0 as usize]
    }

    /// Register `node` under `name`. A name collision chains the node onto
    /// the existing symbol's sibling list (overloads, repeated templates).
    pub fn add_symbol(&mut self, arena: &mut NodeArena, scope: ScopeId, name: &str, node: NodeId) {
        arena[node].sym_scope = Some(scope);
        if let Some(&existing) = self.scope(scope).symbols.get(name) {
            let mut tail = existing;
            while let Some(next) = arena[tail].sym_next_sibling {
                tail = next;
            }
            arena[tail].sym_next_sibling = Some(node);
        } else {
            self.scope_mut(scope).symbols.insert(name.to_string(), node);
        }
    }

    /// Qualified lookup confined to `scope` (no parent-scope walk).
    pub fn clookup_local(&self, name: &str, scope: ScopeId) -> Option<NodeId> {
        if let Some(rest) = name.strip_prefix("::") {
            return self.clookup_local(rest, self.global());
        }
        match split_first_scope(name) {
            Some((first, rest)) => {
                let child = *self.scope(scope).children.get(first)?;
                self.clookup_local(rest, child)
            }
            None => self.scope(scope).symbols.get(name).copied(),
        }
    }

    /// Qualified lookup walking the scope chain outward from `scope`.
    pub fn clookup(&self, name: &str, scope: ScopeId) -> Option<NodeId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            if let Some(n) = self.clookup_local(name, s) {
                return Some(n);
            }
            current = self.scope(s).parent;
        }
        None
    }

    fn find_symbol_scope(&self, name: &str, scope: ScopeId) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            if self.scope(s).symbols.contains_key(name) {
                return Some(s);
            }
            current = self.scope(s).parent;
        }
        None
    }

    fn scope_path(&self, scope: ScopeId) -> String {
        let mut names = Vec::new();
        let mut current = Some(scope);
        while let Some(s) = current {
            if let Some(n) = &self.scope(s).name {
                names.push(n.as_str());
            }
            current = self.scope(s).parent;
        }
        names.reverse();
        names.join("::")
    }

    /// Unfold typedef aliases in `ty` to a canonical form, one level at a
    /// time until a fixed point. Template arguments are reduced as well.
    pub fn typedef_reduce(&self, arena: &NodeArena, ty: &str, scope: ScopeId) -> String {
        let mut t = ty.to_string();
        // Bounded in case of a typedef cycle in a malformed input tree.
        for _ in 0..64 {
            let pfx_len = typestr::prefix(&t).len();
            let b = &t[pfx_len..];
            let mut nb = b.to_string();
            let mut changed = false;

            if typestr::is_template(&nb) {
                if let Some(args) = typestr::template_args(&nb) {
                    let reduced: Vec<String> = args
                        .iter()
                        .map(|a| self.typedef_reduce(arena, a, scope))
                        .collect();
                    if reduced != args {
                        nb = format!("{}<({})>", typestr::template_prefix(&nb), reduced.join(","));
                        changed = true;
                    }
                }
            }

            if let Some(nid) = self.clookup(&nb, scope) {
                let node = &arena[nid];
                if node.kind() == NodeKind::CDecl && node.storage.as_deref() == Some("typedef") {
                    let mut repl = node.decl.clone().unwrap_or_default();
                    repl.push_str(node.ty.as_deref().unwrap_or(""));
                    nb = repl;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
            t = format!("{}{}", &t[..pfx_len], nb);
        }
        t
    }

    fn qualify_base(&self, name: &str, scope: ScopeId) -> String {
        if name.contains("::") {
            return name.to_string();
        }
        match self.find_symbol_scope(name, scope) {
            Some(s) => {
                let path = self.scope_path(s);
                if path.is_empty() {
                    name.to_string()
                } else {
                    format!("{}::{}", path, name)
                }
            }
            None => name.to_string(),
        }
    }

    /// Expand unqualified names in `ty` to fully qualified form, recursing
    /// into template arguments and function parameter types.
    pub fn type_qualify(&self, arena: &NodeArena, ty: &str, scope: ScopeId) -> String {
        let pfx = typestr::prefix(ty);
        let b = &ty[pfx.len()..];

        let qualified_base = if let Some(args) = typestr::template_args(b) {
            let qargs: Vec<String> = args
                .iter()
                .map(|a| self.type_qualify(arena, a, scope))
                .collect();
            format!(
                "{}<({})>",
                self.qualify_base(typestr::template_prefix(b), scope),
                qargs.join(",")
            )
        } else {
            self.qualify_base(b, scope)
        };

        let mut out = String::with_capacity(ty.len());
        let mut rest = pfx;
        while !rest.is_empty() {
            let n = typestr::element_span(rest);
            let el = &rest[..n];
            if let Some(parms) = typestr::function_parms(el) {
                let args: Vec<String> = parms
                    .iter()
                    .map(|p| self.type_qualify(arena, p.ty.as_deref().unwrap_or(""), scope))
                    .collect();
                out.push_str(&format!("f({}).", args.join(",")));
            } else {
                out.push_str(el);
            }
            rest = &rest[n..];
        }
        out.push_str(&qualified_base);
        out
    }

    /// Fill in defaulted template arguments inside an encoded template type:
    /// "Map<(int)>" becomes "Map<(int,Less<(int)>)>" when `Map` declares a
    /// defaulted comparator parameter.
    pub fn template_deftype(&self, arena: &NodeArena, ty: &str, tscope: ScopeId) -> String {
        let pfx = typestr::prefix(ty);
        let b = &ty[pfx.len()..];
        let Some(args) = typestr::template_args(b) else {
            return ty.to_string();
        };

        let mut parms: ParmList = args
            .iter()
            .map(|a| Parm::with_type(self.template_deftype(arena, a, tscope)))
            .collect();

        let pn = typestr::template_prefix(b);
        if let Some(primary) = self.clookup(pn, tscope) {
            let node = &arena[primary];
            if node.kind() == NodeKind::Template {
                if let Some(tparms) = node.templateparms.clone() {
                    let primary_scope = node.sym_scope.unwrap_or_else(|| self.global());
                    self.template_defargs(arena, &mut parms, &tparms, tscope, primary_scope);
                }
            }
        }

        let rebuilt: Vec<&str> = parms.iter().filter_map(Parm::value_or_type).collect();
        format!("{}{}<({})>", pfx, pn, rebuilt.join(","))
    }

    /// Append defaulted parameters from `templateparms` until `parms` covers
    /// the full parameter count. Earlier parameter names occurring in a
    /// default are substituted with the corresponding concrete arguments.
    pub fn template_defargs(
        &self,
        arena: &NodeArena,
        parms: &mut ParmList,
        templateparms: &[Parm],
        tscope: ScopeId,
        _primary_scope: ScopeId,
    ) {
        if variadic_parm(templateparms).is_some() {
            return;
        }
        while parms.len() < templateparms.len() {
            let tp = &templateparms[parms.len()];
            let Some(def) = tp.value.clone() else {
                break;
            };
            let mut v = def;
            for (j, p) in parms.iter().enumerate() {
                if let Some(n) = templateparms[j].name.as_deref() {
                    if let Some(val) = p.value_or_type() {
                        replace_id(&mut v, n, val);
                    }
                }
            }
            let v = self.type_qualify(arena, &v, tscope);
            parms.push(Parm {
                name: tp.name.clone(),
                ty: tp.ty.clone(),
                value: Some(v),
                is_default: true,
            });
        }
    }

    /// Fresh placeholder symbol name for an instantiation requested without
    /// a target name.
    pub fn next_dummy_symname(&mut self) -> String {
        let n = self.dummy_counter;
        self.dummy_counter += 1;
        format!("__dummy_{}__", n)
    }
}

/// Split a qualified name at its first "::" outside any bracketed region.
fn split_first_scope(name: &str) -> Option<(&str, &str)> {
    let bytes = name.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match bytes[i] {
            b'(' | b'<' => depth += 1,
            b')' | b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes[i + 1] == b':' => {
                return Some((&name[..i], &name[i + 2..]));
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Terminal segment of a qualified name: "A::B::C" -> "C".
pub fn scopename_last(name: &str) -> &str {
    let mut rest = name;
    while let Some((_, tail)) = split_first_scope(rest) {
        rest = tail;
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;

    fn typedef(arena: &mut NodeArena, name: &str, ty: &str, decl: &str) -> NodeId {
        let mut n = Node::new(NodeKind::CDecl);
        n.name = Some(name.to_string());
        n.storage = Some("typedef".to_string());
        n.ty = Some(ty.to_string());
        if !decl.is_empty() {
            n.decl = Some(decl.to_string());
        }
        arena.alloc(n)
    }

    #[test]
    fn scopename_last_handles_qualification() {
        assert_eq!(scopename_last("A::B::C"), "C");
        assert_eq!(scopename_last("Box"), "Box");
        assert_eq!(scopename_last("NS::Box<(X::Y)>"), "Box<(X::Y)>");
    }

    #[test]
    fn clookup_walks_scope_chain() {
        let mut arena = NodeArena::new();
        let mut syms = SymbolTable::new();
        let global = syms.global();
        let ns = syms.new_scope(Some("NS"), global);
        let node = arena.alloc(Node::new(NodeKind::Class));
        syms.add_symbol(&mut arena, ns, "Box", node);

        assert_eq!(syms.clookup("Box", ns), Some(node));
        assert_eq!(syms.clookup_local("Box", global), None);
        assert_eq!(syms.clookup("NS::Box", global), Some(node));
        assert_eq!(syms.clookup("::NS::Box", ns), Some(node));
    }

    #[test]
    fn duplicate_symbols_chain_as_siblings() {
        let mut arena = NodeArena::new();
        let mut syms = SymbolTable::new();
        let global = syms.global();
        let a = arena.alloc(Node::new(NodeKind::Template));
        let b = arena.alloc(Node::new(NodeKind::Template));
        syms.add_symbol(&mut arena, global, "min", a);
        syms.add_symbol(&mut arena, global, "min", b);

        assert_eq!(syms.clookup("min", global), Some(a));
        assert_eq!(arena[a].sym_next_sibling, Some(b));
    }

    #[test]
    fn typedef_reduce_unfolds_aliases() {
        let mut arena = NodeArena::new();
        let mut syms = SymbolTable::new();
        let global = syms.global();
        let td = typedef(&mut arena, "size_t", "unsigned long", "");
        syms.add_symbol(&mut arena, global, "size_t", td);

        assert_eq!(syms.typedef_reduce(&arena, "size_t", global), "unsigned long");
        assert_eq!(syms.typedef_reduce(&arena, "p.size_t", global), "p.unsigned long");
        assert_eq!(
            syms.typedef_reduce(&arena, "Box<(size_t)>", global),
            "Box<(unsigned long)>"
        );
    }

    #[test]
    fn typedef_reduce_applies_alias_declarators() {
        let mut arena = NodeArena::new();
        let mut syms = SymbolTable::new();
        let global = syms.global();
        let td = typedef(&mut arena, "intp", "int", "p.");
        syms.add_symbol(&mut arena, global, "intp", td);

        assert_eq!(syms.typedef_reduce(&arena, "intp", global), "p.int");
        assert_eq!(syms.typedef_reduce(&arena, "r.intp", global), "r.p.int");
    }

    #[test]
    fn type_qualify_prefixes_defining_scope() {
        let mut arena = NodeArena::new();
        let mut syms = SymbolTable::new();
        let global = syms.global();
        let ns = syms.new_scope(Some("NS"), global);
        let node = arena.alloc(Node::new(NodeKind::Class));
        syms.add_symbol(&mut arena, ns, "Box", node);

        assert_eq!(syms.type_qualify(&arena, "Box", ns), "NS::Box");
        assert_eq!(syms.type_qualify(&arena, "p.Box", ns), "p.NS::Box");
        assert_eq!(syms.type_qualify(&arena, "int", ns), "int");
        assert_eq!(syms.type_qualify(&arena, "NS::Box", ns), "NS::Box");
    }

    #[test]
    fn template_deftype_completes_default_arguments() {
        let mut arena = NodeArena::new();
        let mut syms = SymbolTable::new();
        let global = syms.global();
        let mut primary = Node::new(NodeKind::Template);
        primary.templatetype = Some(NodeKind::Class);
        let mut comparator = Parm::named("C", "typename");
        comparator.value = Some("Less<(K)>".to_string());
        primary.templateparms = Some(vec![Parm::named("K", "typename"), comparator]);
        let primary = arena.alloc(primary);
        syms.add_symbol(&mut arena, global, "Map", primary);

        assert_eq!(
            syms.template_deftype(&arena, "Map<(int)>", global),
            "Map<(int,Less<(int)>)>"
        );
        // Already complete: unchanged.
        assert_eq!(
            syms.template_deftype(&arena, "Map<(int,MyCmp)>", global),
            "Map<(int,MyCmp)>"
        );
    }
}
