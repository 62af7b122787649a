use crate::error::CompileError;
use crate::frontend::Location;
use crate::frontend::Node;
use anyhow::Result;
use std::collections::HashMap;
use std::collections::HashSet;

/// Index of a statement in a [StatementTree].
///
/// Ids stay valid for the lifetime of the tree, also after the statement is
/// moved or detached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(usize);

impl StmtId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Index of a variable descriptor in a [StatementTree].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Root,
    Block,
    Empty,
    Declaration,
    Expression,
    If,
    ElseIf,
    Else,
    For,
    While,
    DoWhile,
    Switch,
    /// A `case X` or `default` label.
    Case,
    /// `return`, `break`, `continue` or `goto`.
    Flow,
    Function,
    FunctionPrototype,
    TypeDefinition,
    Pragma,
    Barrier,
}

impl StatementKind {
    /// Whether statements of this kind own child statements and a scope.
    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            StatementKind::Root
                | StatementKind::Block
                | StatementKind::If
                | StatementKind::ElseIf
                | StatementKind::Else
                | StatementKind::For
                | StatementKind::While
                | StatementKind::DoWhile
                | StatementKind::Switch
                | StatementKind::Function
        )
    }
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            StatementKind::If
                | StatementKind::ElseIf
                | StatementKind::Else
                | StatementKind::While
                | StatementKind::DoWhile
                | StatementKind::Switch
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoopRole {
    Outer,
    Inner,
    Global,
}

impl LoopRole {
    pub fn name(&self) -> &'static str {
        match self {
            LoopRole::Outer => "outer",
            LoopRole::Inner => "inner",
            LoopRole::Global => "global",
        }
    }
}

/// The parallel role of a `for` loop, such as `inner1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoopTag {
    pub role: LoopRole,
    pub dim: usize,
}

impl LoopTag {
    pub fn new(role: LoopRole, dim: usize) -> Self {
        LoopTag { role, dim }
    }
    /// Parse a tag such as `outer0`.
    pub fn parse(text: &str) -> Option<LoopTag> {
        for role in [LoopRole::Outer, LoopRole::Inner, LoopRole::Global] {
            if let Some(dim) = text.strip_prefix(role.name()) {
                return match dim {
                    "0" => Some(LoopTag::new(role, 0)),
                    "1" => Some(LoopTag::new(role, 1)),
                    "2" => Some(LoopTag::new(role, 2)),
                    _ => None,
                };
            }
        }
        None
    }
}

impl std::fmt::Display for LoopTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.role.name(), self.dim)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopHint {
    Unroll(Option<u32>),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Qualifiers {
    pub exclusive: bool,
    pub shared: bool,
    pub constant: bool,
    pub restrict: bool,
    pub volatile: bool,
    pub is_static: bool,
    pub is_extern: bool,
    /// Qualifiers without special meaning, such as `register`.
    pub other: Vec<String>,
    /// Backend memory space such as `__global`.
    pub address_space: Option<String>,
}

/// A variable or parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Var {
    pub name: String,
    /// Type text without qualifiers or pointers, for example `unsigned int`.
    pub typ: String,
    pub qualifiers: Qualifiers,
    /// Number of `*` in the declarator.
    pub pointer: usize,
    /// Array dimensions, outermost first.
    pub dims: Vec<Vec<Node>>,
    pub init: Option<Vec<Node>>,
    /// Declaration or function statement that declares the variable.
    pub declared_in: StmtId,
    pub location: Location,
}

impl Var {
    pub fn new(name: &str, typ: &str) -> Self {
        Var {
            name: name.to_string(),
            typ: typ.to_string(),
            qualifiers: Qualifiers::default(),
            pointer: 0,
            dims: vec![],
            init: None,
            declared_in: StmtId(0),
            location: Location::default(),
        }
    }
    pub fn is_array(&self) -> bool {
        !self.dims.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FunctionSig {
    pub name: String,
    /// Leading qualifiers other than `kernel`, such as `static` or `__device__`.
    pub qualifiers: Vec<String>,
    pub return_type: String,
    pub params: Vec<VarId>,
    pub is_kernel: bool,
    /// Written directly in backend syntax; skipped by the passes.
    pub native: bool,
    /// Host-side launcher of split kernels.
    pub launcher: bool,
}

#[derive(Clone, Debug)]
pub struct Statement {
    pub kind: StatementKind,
    pub parent: Option<StmtId>,
    pub children: Vec<StmtId>,
    /// Tokens of a leaf statement, or the header of a control statement.
    pub nodes: Vec<Node>,
    /// Variables declared in this scope by name.
    pub scope: HashMap<String, VarId>,
    /// Variables declared by this statement, in declaration order.
    pub vars: Vec<VarId>,
    pub function: Option<FunctionSig>,
    pub loop_tag: Option<LoopTag>,
    pub hint: Option<LoopHint>,
    pub location: Location,
}

impl Statement {
    fn new(kind: StatementKind, nodes: Vec<Node>, location: Location) -> Self {
        Statement {
            kind,
            parent: None,
            children: vec![],
            nodes,
            scope: HashMap::new(),
            vars: vec![],
            function: None,
            loop_tag: None,
            hint: None,
            location,
        }
    }
    pub fn is_kernel(&self) -> bool {
        self.function.as_ref().is_some_and(|f| f.is_kernel)
    }
    pub fn is_loop(&self, role: LoopRole) -> bool {
        self.loop_tag.is_some_and(|tag| tag.role == role)
    }
}

/// Arena of statements and variable descriptors.
///
/// A statement owns its children through the `children` indices; `parent`
/// and `declared_in` are plain back-references.
#[derive(Clone, Debug)]
pub struct StatementTree {
    statements: Vec<Statement>,
    vars: Vec<Var>,
    /// Names introduced by `typedef`, `struct`, `union` and `enum`.
    types: HashSet<String>,
}

impl Default for StatementTree {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementTree {
    pub fn new() -> Self {
        let root = Statement::new(StatementKind::Root, vec![], Location::default());
        StatementTree {
            statements: vec![root],
            vars: vec![],
            types: HashSet::new(),
        }
    }
    pub fn root(&self) -> StmtId {
        StmtId(0)
    }
    pub fn get(&self, id: StmtId) -> &Statement {
        &self.statements[id.0]
    }
    pub fn get_mut(&mut self, id: StmtId) -> &mut Statement {
        &mut self.statements[id.0]
    }
    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.0]
    }
    pub fn var_mut(&mut self, id: VarId) -> &mut Var {
        &mut self.vars[id.0]
    }
    pub fn kind(&self, id: StmtId) -> StatementKind {
        self.get(id).kind
    }
    pub fn parent(&self, id: StmtId) -> Option<StmtId> {
        self.get(id).parent
    }
    pub fn children(&self, id: StmtId) -> &[StmtId] {
        &self.get(id).children
    }
    /// Create a statement that is not attached to the tree yet.
    pub fn alloc(&mut self, kind: StatementKind, nodes: Vec<Node>, location: Location) -> StmtId {
        let id = StmtId(self.statements.len());
        self.statements.push(Statement::new(kind, nodes, location));
        id
    }
    /// Create a statement as the last child of `parent`.
    pub fn push(
        &mut self,
        parent: StmtId,
        kind: StatementKind,
        nodes: Vec<Node>,
        location: Location,
    ) -> StmtId {
        let id = self.alloc(kind, nodes, location);
        self.attach(parent, id);
        id
    }
    pub fn attach(&mut self, parent: StmtId, child: StmtId) {
        let index = self.get(parent).children.len();
        self.insert(parent, index, child);
    }
    pub fn insert(&mut self, parent: StmtId, index: usize, child: StmtId) {
        self.statements[parent.0].children.insert(index, child);
        self.statements[child.0].parent = Some(parent);
    }
    /// Remove `id` from its parent. Returns the former position.
    pub fn detach(&mut self, id: StmtId) -> Option<usize> {
        let parent = self.get(id).parent?;
        let index = self.index_in_parent(id)?;
        self.statements[parent.0].children.remove(index);
        self.statements[id.0].parent = None;
        Some(index)
    }
    pub fn index_in_parent(&self, id: StmtId) -> Option<usize> {
        let parent = self.get(id).parent?;
        self.get(parent).children.iter().position(|c| *c == id)
    }
    pub fn insert_before(&mut self, anchor: StmtId, new: StmtId) {
        if let (Some(parent), Some(index)) = (self.parent(anchor), self.index_in_parent(anchor)) {
            self.insert(parent, index, new);
        }
    }
    pub fn insert_after(&mut self, anchor: StmtId, new: StmtId) {
        if let (Some(parent), Some(index)) = (self.parent(anchor), self.index_in_parent(anchor)) {
            self.insert(parent, index + 1, new);
        }
    }
    /// Replace `old` by `new` at the same position.
    pub fn replace(&mut self, old: StmtId, new: StmtId) {
        if let Some(parent) = self.parent(old) {
            if let Some(index) = self.detach(old) {
                self.insert(parent, index, new);
            }
        }
    }
    pub fn add_var(&mut self, var: Var) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(var);
        id
    }
    /// Register `var` in the scope of `owner`.
    ///
    /// A second declaration of the same name in one scope is an error.
    pub fn declare(&mut self, owner: StmtId, var: VarId) -> Result<()> {
        let name = self.var(var).name.clone();
        if self.get(owner).scope.contains_key(&name) {
            let location = self.var(var).location;
            let msg = format!("redeclaration of `{name}`");
            return Err(CompileError::parse(location, msg));
        }
        self.get_mut(owner).scope.insert(name, var);
        Ok(())
    }
    pub fn undeclare(&mut self, owner: StmtId, name: &str) -> Option<VarId> {
        self.get_mut(owner).scope.remove(name)
    }
    /// Look `name` up from the scope of `from` outwards.
    pub fn resolve(&self, from: StmtId, name: &str) -> Option<VarId> {
        let mut current = Some(from);
        while let Some(id) = current {
            if let Some(var) = self.get(id).scope.get(name) {
                return Some(*var);
            }
            current = self.get(id).parent;
        }
        None
    }
    /// Parents of `id`, nearest first.
    pub fn ancestors(&self, id: StmtId) -> Vec<StmtId> {
        let mut result = vec![];
        let mut current = self.get(id).parent;
        while let Some(parent) = current {
            result.push(parent);
            current = self.get(parent).parent;
        }
        result
    }
    /// All statements below `id` in source order.
    pub fn descendants(&self, id: StmtId) -> Vec<StmtId> {
        let mut result = vec![];
        let mut stack: Vec<StmtId> = self.get(id).children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            result.push(next);
            stack.extend(self.get(next).children.iter().rev());
        }
        result
    }
    pub fn is_ancestor(&self, ancestor: StmtId, id: StmtId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }
    /// Top-level function definitions.
    pub fn functions(&self) -> Vec<StmtId> {
        self.children(self.root())
            .iter()
            .copied()
            .filter(|id| self.kind(*id) == StatementKind::Function)
            .collect()
    }
    pub fn kernels(&self) -> Vec<StmtId> {
        self.functions()
            .into_iter()
            .filter(|id| self.get(*id).is_kernel())
            .collect()
    }
    pub fn function_named(&self, name: &str) -> Option<StmtId> {
        self.functions().into_iter().find(|id| {
            let sig = self.get(*id).function.as_ref();
            sig.is_some_and(|sig| sig.name == name)
        })
    }
    /// The enclosing function definition.
    pub fn function_of(&self, id: StmtId) -> Option<StmtId> {
        self.ancestors(id)
            .into_iter()
            .find(|a| self.kind(*a) == StatementKind::Function)
    }
    /// Enclosing loops with the given role, nearest first.
    pub fn enclosing_loops(&self, id: StmtId, role: LoopRole) -> Vec<StmtId> {
        self.ancestors(id)
            .into_iter()
            .filter(|a| self.get(*a).is_loop(role))
            .collect()
    }
    /// The body block of a function definition.
    pub fn body(&self, function: StmtId) -> Option<StmtId> {
        self.children(function).first().copied()
    }
    pub fn add_type_name(&mut self, name: &str) {
        self.types.insert(name.to_string());
    }
    pub fn is_type_name(&self, name: &str) -> bool {
        self.types.contains(name)
    }
}
