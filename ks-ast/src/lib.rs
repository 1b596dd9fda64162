//! Abstract syntax tree for KernelScript.
//!
//! The tree is untyped: the parser only establishes shape and source
//! position, never semantics. Every node that can be the target of a
//! diagnostic carries a [`Position`]. Semantic information (inferred
//! types, constant folding, visibility) is layered on top by the
//! symbol table and type checker in `ks-compiler`, which produce a
//! parallel typed tree rather than mutating this one in place.

use serde::{Deserialize, Serialize};

pub mod intlit;
pub use intlit::{IntLit, IntWidth};

/// Source location of a single AST node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A parsed source file: the declarations in source order plus the
/// `include` directives that were encountered among them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub includes: Vec<IncludeDecl>,
    pub decls: Vec<Decl>,
}

/// `include "x.kh";`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeDecl {
    pub header_name: String,
    pub pos: Position,
}

/// Top-level declaration. Every variant the symbol table promotes to
/// root scope (see `MapDecl`) lives here rather than nested inside a
/// function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    Map(MapDecl),
    GlobalVar(GlobalVarDecl),
    Config(ConfigDecl),
    Struct(StructDecl),
    TypeAlias(TypeAliasDecl),
    Enum(EnumDecl),
    Function(FunctionDecl),
    AttributedFunction(AttributedFunctionDecl),
}

/// eBPF map kinds recognized by the surface syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapKind {
    Hash,
    LruHash,
    Array,
    PercpuHash,
    PercpuArray,
    RingBuf,
    PerfEventArray,
}

impl MapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapKind::Hash => "hash",
            MapKind::LruHash => "lru_hash",
            MapKind::Array => "array",
            MapKind::PercpuHash => "percpu_hash",
            MapKind::PercpuArray => "percpu_array",
            MapKind::RingBuf => "ringbuf",
            MapKind::PerfEventArray => "perf_event_array",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "hash" => MapKind::Hash,
            "lru_hash" => MapKind::LruHash,
            "array" => MapKind::Array,
            "percpu_hash" => MapKind::PercpuHash,
            "percpu_array" => MapKind::PercpuArray,
            "ringbuf" => MapKind::RingBuf,
            "perf_event_array" => MapKind::PerfEventArray,
            _ => return None,
        })
    }
}

/// Additional, mostly-optional map sizing knobs beyond `max_entries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MapConfig {
    pub max_entries: u64,
    pub key_size: Option<u64>,
    pub value_size: Option<u64>,
    pub flags: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDecl {
    pub name: String,
    pub key_type: Type,
    pub value_type: Type,
    pub map_kind: MapKind,
    pub config: MapConfig,
    pub pinned: bool,
    pub pos: Position,
}

/// A root-scope `var` binding. Promoted to a `MapDecl` during
/// normalization if `ty` resolves to `Type::Map`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVarDecl {
    pub name: String,
    pub ty: Option<Type>,
    pub initializer: Option<Expr>,
    pub pinned: bool,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    pub name: String,
    pub ty: Type,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDecl {
    pub name: String,
    pub fields: Vec<ConfigField>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<StructField>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAliasDecl {
    pub name: String,
    pub aliased: Type,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumVariant {
    pub name: String,
    pub value: Option<IntLit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<EnumVariant>,
    pub pos: Position,
}

/// Types as they appear in the surface syntax, before resolution of
/// named references against the symbol table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Bool,
    /// Fixed-capacity string: `str(N)`.
    Str(u64),
    /// Fixed-size array: `T[N]`.
    Array(Box<Type>, u64),
    /// Reference to a struct, enum, alias, or an include-provided
    /// BTF type (`xdp_md`, `__sk_buff`, ...).
    Named(String),
    /// `*T`
    Pointer(Box<Type>),
    /// `MapKind<K,V>(N)`.
    Map {
        key: Box<Type>,
        value: Box<Type>,
        kind: MapKind,
        config: MapConfig,
    },
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::U8 => write!(f, "u8"),
            Type::U16 => write!(f, "u16"),
            Type::U32 => write!(f, "u32"),
            Type::U64 => write!(f, "u64"),
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::Bool => write!(f, "bool"),
            Type::Str(n) => write!(f, "str({n})"),
            Type::Array(inner, n) => write!(f, "{inner}[{n}]"),
            Type::Named(name) => write!(f, "{name}"),
            Type::Pointer(inner) => write!(f, "*{inner}"),
            Type::Map {
                key, value, kind, ..
            } => write!(f, "{}<{key},{value}>", kind.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<Type>,
    pub body: Block,
    pub pos: Position,
}

/// The attribute carried by a kernel-side (or visibility-restricted)
/// function. `Tc`'s payload is the raw direction string so the type
/// checker can reject anything other than `"ingress"`/`"egress"`
/// with a precise message rather than failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribute {
    Xdp,
    Tc(String),
    Kprobe(String),
    Kfunc,
    Helper,
    Private,
    /// Syntactically well-formed but not in the recognized set; kept
    /// as a value rather than a parse error so the type checker can
    /// surface it as `UnknownAttribute` with the offending name.
    Unknown(String),
}

impl Attribute {
    /// Whether a function carrying this attribute is a kernel-side
    /// (eBPF) entry point rather than a user-space-callable helper.
    pub fn is_kernel_entry(&self) -> bool {
        matches!(self, Attribute::Xdp | Attribute::Tc(_) | Attribute::Kprobe(_))
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attribute::Xdp => write!(f, "@xdp"),
            Attribute::Tc(dir) => write!(f, "@tc(\"{dir}\")"),
            Attribute::Kprobe(sym) => write!(f, "@kprobe(\"{sym}\")"),
            Attribute::Kfunc => write!(f, "@kfunc"),
            Attribute::Helper => write!(f, "@helper"),
            Attribute::Private => write!(f, "@private"),
            Attribute::Unknown(name) => write!(f, "@{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributedFunctionDecl {
    pub attribute: Attribute,
    pub function: FunctionDecl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Let {
        name: String,
        ty: Option<Type>,
        value: Expr,
        pos: Position,
    },
    Assign {
        target: Expr,
        value: Expr,
        pos: Position,
    },
    CompoundAssign {
        target: Expr,
        op: CompoundOp,
        value: Expr,
        pos: Position,
    },
    /// `delete m[k];`
    MapDelete {
        map: Expr,
        key: Expr,
        pos: Position,
    },
    Expr(Expr),
    Return(Option<Expr>, Position),
    Break(Position),
    Continue(Position),
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
        pos: Position,
    },
    /// `for name in start..end { body }` — a C-style counted loop,
    /// the only loop shape that can ever fold to `Bounded`.
    ForRange {
        var: String,
        start: Expr,
        end: Expr,
        body: Block,
        pos: Position,
    },
    /// `for name in iter { body }` — iterator form, always `Unbounded`.
    ForIn {
        var: String,
        iter: Expr,
        body: Block,
        pos: Position,
    },
    Block(Block),
}

impl Statement {
    pub fn pos(&self) -> &Position {
        match self {
            Statement::Let { pos, .. }
            | Statement::Assign { pos, .. }
            | Statement::CompoundAssign { pos, .. }
            | Statement::MapDelete { pos, .. }
            | Statement::Return(_, pos)
            | Statement::Break(pos)
            | Statement::Continue(pos)
            | Statement::If { pos, .. }
            | Statement::ForRange { pos, .. }
            | Statement::ForIn { pos, .. } => pos,
            Statement::Expr(e) => e.pos(),
            Statement::Block(b) => b
                .statements
                .first()
                .map(Statement::pos)
                .unwrap_or(&POS_UNKNOWN),
        }
    }
}

// A `'static` fallback so `pos()` can return a reference for the rare
// empty-block case without allocating.
static POS_UNKNOWN: Position = Position {
    file: String::new(),
    line: 0,
    column: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Int(IntLit, Position),
    Bool(bool, Position),
    Str(String, Position),
    /// The `none` sentinel used for a missing map lookup result.
    None(Position),
    Ident(String, Position),
    /// `a.b`
    Field {
        base: Box<Expr>,
        field: String,
        pos: Position,
    },
    /// `p->b`
    Arrow {
        base: Box<Expr>,
        field: String,
        pos: Position,
    },
    /// `m[k]`
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        pos: Position,
    },
    /// Function call, including the built-ins `load`, `attach`,
    /// `detach`, `print`, which are resolved by name rather than by a
    /// distinct AST node so that ordinary call-site validation
    /// (arity, visibility) applies uniformly.
    Call {
        callee: String,
        args: Vec<Expr>,
        pos: Position,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        pos: Position,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        pos: Position,
    },
}

impl Expr {
    pub fn pos(&self) -> &Position {
        match self {
            Expr::Int(_, pos)
            | Expr::Bool(_, pos)
            | Expr::Str(_, pos)
            | Expr::None(pos)
            | Expr::Ident(_, pos)
            | Expr::Field { pos, .. }
            | Expr::Arrow { pos, .. }
            | Expr::Index { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::Unary { pos, .. }
            | Expr::Binary { pos, .. } => pos,
        }
    }
}
