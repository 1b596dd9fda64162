//! Scope tree and symbol resolution.
//!
//! Entries live in a flat arena keyed by stable integer IDs so that
//! later stages (type checker, IR generator) can hold onto a resolved
//! reference without borrowing the scope stack. Frames only ever
//! reference their parent by index, never the reverse, so the tree
//! never needs anything cycle-aware.

use dashmap::DashMap;
use ks_ast::*;

pub type EntryId = u32;

#[derive(Debug, Clone)]
pub enum Entry {
    Map(MapDecl),
    GlobalVar(GlobalVarDecl),
    Config(ConfigDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    TypeAlias(TypeAliasDecl),
    Function {
        decl: FunctionDecl,
        attribute: Option<Attribute>,
    },
    Local {
        name: String,
        ty: Type,
    },
    /// A BTF type or constant injected by `include` resolution, before
    /// any user declaration is resolved (see [`crate::builtins`]).
    Builtin { name: String, ty: Option<Type> },
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Map(m) => &m.name,
            Entry::GlobalVar(g) => &g.name,
            Entry::Config(c) => &c.name,
            Entry::Struct(s) => &s.name,
            Entry::Enum(e) => &e.name,
            Entry::TypeAlias(t) => &t.name,
            Entry::Function { decl, .. } => &decl.name,
            Entry::Local { name, .. } => name,
            Entry::Builtin { name, .. } => name,
        }
    }

    pub fn pos(&self) -> Position {
        match self {
            Entry::Map(m) => m.pos.clone(),
            Entry::GlobalVar(g) => g.pos.clone(),
            Entry::Config(c) => c.pos.clone(),
            Entry::Struct(s) => s.pos.clone(),
            Entry::Enum(e) => e.pos.clone(),
            Entry::TypeAlias(t) => t.pos.clone(),
            Entry::Function { decl, .. } => decl.pos.clone(),
            Entry::Local { .. } | Entry::Builtin { .. } => Position::unknown(),
        }
    }
}

struct Frame {
    parent: Option<usize>,
    names: std::collections::HashMap<String, EntryId>,
}

/// Owns the arena of resolved entries plus a stack of scope frames.
/// The root frame (index 0) holds every top-level declaration and is
/// never popped.
pub struct SymbolTable {
    arena: DashMap<EntryId, Entry>,
    next_id: EntryId,
    frames: Vec<Frame>,
    current: usize,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            arena: DashMap::new(),
            next_id: 0,
            frames: vec![Frame {
                parent: None,
                names: Default::default(),
            }],
            current: 0,
        }
    }

    /// Pushes a child scope; returns the prior frame so callers can
    /// restore it via [`Self::pop_to`]. Block entry/exit must be
    /// balanced by the caller.
    pub fn push_scope(&mut self) -> usize {
        let prior = self.current;
        self.frames.push(Frame {
            parent: Some(prior),
            names: Default::default(),
        });
        self.current = self.frames.len() - 1;
        prior
    }

    pub fn pop_to(&mut self, prior: usize) {
        self.current = prior;
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn current_scope(&self) -> usize {
        self.current
    }

    /// Declares `entry` in the given frame, returning `DuplicateSymbol`
    /// if a binding with the same name already exists in *that* frame
    /// (shadowing an outer name is always fine).
    pub fn declare(
        &mut self,
        scope: usize,
        entry: Entry,
    ) -> Result<EntryId, ks_diagnostics::CompileError> {
        let name = entry.name().to_string();
        let pos = entry.pos();
        if self.frames[scope].names.contains_key(&name) {
            return Err(ks_diagnostics::CompileError::DuplicateSymbol {
                pos: pos.into(),
                name,
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.arena.insert(id, entry);
        self.frames[scope].names.insert(name, id);
        Ok(id)
    }

    /// Walks inner -> outer -> root starting at `scope`.
    pub fn resolve(&self, scope: usize, name: &str) -> Option<EntryId> {
        let mut frame = scope;
        loop {
            if let Some(id) = self.frames[frame].names.get(name) {
                return Some(*id);
            }
            match self.frames[frame].parent {
                Some(parent) => frame = parent,
                None => return None,
            }
        }
    }

    pub fn get(&self, id: EntryId) -> Entry {
        self.arena.get(&id).expect("entry id always valid").clone()
    }

    pub fn root_names(&self) -> Vec<String> {
        self.frames[0].names.keys().cloned().collect()
    }

    pub fn names_visible_from(&self, scope: usize) -> Vec<String> {
        let mut names = Vec::new();
        let mut frame = scope;
        loop {
            names.extend(self.frames[frame].names.keys().cloned());
            match self.frames[frame].parent {
                Some(parent) => frame = parent,
                None => break,
            }
        }
        names
    }
}

impl From<Position> for ks_diagnostics::PosInfo {
    fn from(pos: Position) -> Self {
        ks_diagnostics::PosInfo::new(pos.file, pos.line, pos.column)
    }
}
