// src/ast.rs
//
// The declaration tree produced by the parser front end. Nodes live in an
// arena and are addressed by `NodeId` handles; tree links (parent, children,
// symbol-table sibling chains) are stored as handles so subtrees can be
// cloned and rewritten without reference juggling.

use crate::symbols::ScopeId;
use crate::typestr;

/// Unique identifier for declaration nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Get the raw index (for debugging/serialization)
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Declaration kind tag. Template nodes are re-tagged to their
/// `templatetype` while they are being instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Template,
    CDecl,
    Class,
    Constructor,
    Destructor,
    Using,
    Extend,
    Namespace,
    Other,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Template => "template",
            NodeKind::CDecl => "cdecl",
            NodeKind::Class => "class",
            NodeKind::Constructor => "constructor",
            NodeKind::Destructor => "destructor",
            NodeKind::Using => "using",
            NodeKind::Extend => "extend",
            NodeKind::Namespace => "namespace",
            NodeKind::Other => "node",
        }
    }
}

/// Source location carried by every node and reported in diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Loc {
    pub file: String,
    pub line: u32,
}

impl Loc {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// A single parameter: a declared parameter of a template or function, or a
/// concrete argument of an instantiation. Template parameter defaults are
/// stored in `value`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parm {
    pub name: Option<String>,
    pub ty: Option<String>,
    pub value: Option<String>,
    /// Set on parameters that were filled in from a primary template default.
    pub is_default: bool,
}

impl Parm {
    pub fn with_type(ty: impl Into<String>) -> Self {
        Parm {
            ty: Some(ty.into()),
            ..Parm::default()
        }
    }

    pub fn named(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Parm {
            name: Some(name.into()),
            ty: Some(ty.into()),
            ..Parm::default()
        }
    }

    /// Substitution display value: an explicit value wins over the type.
    pub fn value_or_type(&self) -> Option<&str> {
        self.value.as_deref().or(self.ty.as_deref())
    }
}

pub type ParmList = Vec<Parm>;

/// The trailing parameter, if it is a variadic pack.
pub fn variadic_parm(parms: &[Parm]) -> Option<&Parm> {
    parms
        .last()
        .filter(|p| p.ty.as_deref().is_some_and(typestr::is_variadic))
}

/// Number of parameters without a default value. Defaults are only permitted
/// as a suffix, so this is the length of the leading run lacking `value`.
pub fn num_required(parms: &[Parm]) -> usize {
    parms.iter().take_while(|p| p.value.is_none()).count()
}

/// Which parameter-bearing attribute of a node is being addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParmListKey {
    Parms,
    Throws,
    Kwargs,
    Pattern,
}

/// Which base-class list of a class node is being addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseListKey {
    Public,
    Protected,
    Private,
}

pub const BASE_LIST_KEYS: [BaseListKey; 3] = [
    BaseListKey::Public,
    BaseListKey::Protected,
    BaseListKey::Private,
];

/// A declaration node: kind tag plus the attribute set shared across kinds.
/// Unused attributes stay `None`/empty; which attributes matter for which
/// kind is decided by the expansion walker.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub kind: Option<NodeKind>,
    pub loc: Loc,

    // Names
    pub name: Option<String>,
    pub sym_name: Option<String>,

    // String attributes rewritten during instantiation
    pub ty: Option<String>,
    pub decl: Option<String>,
    pub value: Option<String>,
    pub code: Option<String>,
    pub uname: Option<String>,
    pub storage: Option<String>,
    pub namespace: Option<String>,

    // Parameter lists
    pub parms: Option<ParmList>,
    pub throws: Option<ParmList>,
    pub kwargs: Option<ParmList>,
    pub pattern: Option<ParmList>,

    // Template metadata
    pub templateparms: Option<ParmList>,
    pub templatetype: Option<NodeKind>,
    pub partials: Vec<NodeId>,
    pub partialparms: Option<ParmList>,
    pub partialargs: Option<String>,
    pub templcsymname: Option<String>,
    /// On an instantiated node: the template it was expanded from.
    pub template: Option<NodeId>,
    pub instantiate: bool,

    // Class attributes
    pub baselist: Vec<String>,
    pub protectedbaselist: Vec<String>,
    pub privatebaselist: Vec<String>,

    // Flags
    pub conversion_operator: bool,
    pub hidden: bool,
    pub error: bool,

    // Tree and symbol links
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub sym_next_sibling: Option<NodeId>,
    pub csym_next_sibling: Option<NodeId>,
    pub sym_scope: Option<ScopeId>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Node {
            kind: Some(kind),
            ..Node::default()
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind.unwrap_or(NodeKind::Other)
    }

    pub fn parm_list(&self, key: ParmListKey) -> Option<&ParmList> {
        match key {
            ParmListKey::Parms => self.parms.as_ref(),
            ParmListKey::Throws => self.throws.as_ref(),
            ParmListKey::Kwargs => self.kwargs.as_ref(),
            ParmListKey::Pattern => self.pattern.as_ref(),
        }
    }

    pub fn parm_list_mut(&mut self, key: ParmListKey) -> Option<&mut ParmList> {
        match key {
            ParmListKey::Parms => self.parms.as_mut(),
            ParmListKey::Throws => self.throws.as_mut(),
            ParmListKey::Kwargs => self.kwargs.as_mut(),
            ParmListKey::Pattern => self.pattern.as_mut(),
        }
    }

    pub fn base_list(&self, key: BaseListKey) -> &Vec<String> {
        match key {
            BaseListKey::Public => &self.baselist,
            BaseListKey::Protected => &self.protectedbaselist,
            BaseListKey::Private => &self.privatebaselist,
        }
    }

    pub fn base_list_mut(&mut self, key: BaseListKey) -> &mut Vec<String> {
        match key {
            BaseListKey::Public => &mut self.baselist,
            BaseListKey::Protected => &mut self.protectedbaselist,
            BaseListKey::Private => &mut self.privatebaselist,
        }
    }
}

/// Arena storage for declaration nodes.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Append `child` under `parent`, fixing the parent link.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
    }

    /// Deep-copy the subtree rooted at `id`. Symbol-table sibling links and
    /// the scope handle are not carried over; the copy has not been
    /// registered anywhere yet.
    pub fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let mut copy = self.node(id).clone();
        copy.sym_next_sibling = None;
        copy.csym_next_sibling = None;
        copy.sym_scope = None;
        copy.parent = None;
        let children = std::mem::take(&mut copy.children);
        let new_id = self.alloc(copy);
        for child in children {
            let new_child = self.deep_copy(child);
            self.append_child(new_id, new_child);
        }
        new_id
    }
}

impl std::ops::Index<NodeId> for NodeArena {
    type Output = Node;
    fn index(&self, id: NodeId) -> &Node {
        self.node(id)
    }
}

impl std::ops::IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        self.node_mut(id)
    }
}
