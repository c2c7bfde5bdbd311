use std::rc::Rc;

use rust_decimal::Decimal;

use crate::{diagnostics::SourceSpan, scope::Accessibility};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Bool(bool),
    String(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
}

/// A parameter or catch annotation: one class name, or a `|`-separated union.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FunctionParam {
    pub name: String,
    pub annotation: Option<TypeExpr>,
    pub default: Option<Expr>,
    pub variadic: bool,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub accessibility: Option<Accessibility>,
    pub is_static: bool,
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<FunctionParam>,
    pub body: Rc<[Stmt]>,
    pub modifiers: Modifiers,
    pub span: SourceSpan,
}

#[derive(Debug)]
pub struct ClassDecl {
    pub name: String,
    pub supers: Vec<String>,
    pub body: Vec<Stmt>,
    pub modifiers: Modifiers,
    pub span: SourceSpan,
}

#[derive(Debug)]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<(String, Option<Expr>)>,
    pub modifiers: Modifiers,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct Argument {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub enum InterpolationPart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Interpolated(Vec<InterpolationPart>),
    Variable(String),
    This,
    Super(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        op: Option<BinaryOp>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Argument>,
    },
    ListLiteral(Vec<Expr>),
    DictLiteral(Vec<(Expr, Expr)>),
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
    },
    Group(Box<Expr>),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        target: Box<Expr>,
        name: String,
    },
    Lambda(Rc<FunctionDecl>),
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub values: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub binding: Option<String>,
    pub class: Option<TypeExpr>,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportForm {
    Whole { alias: Option<String> },
    Names(Vec<String>),
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    VarDecl {
        name: String,
        is_const: bool,
        annotation: Option<TypeExpr>,
        initializer: Option<Expr>,
        modifiers: Modifiers,
    },
    Function(Rc<FunctionDecl>),
    Class(Rc<ClassDecl>),
    Enum(Rc<EnumDecl>),
    Property {
        name: String,
        getter: Option<Rc<[Stmt]>>,
        setter: Option<Rc<[Stmt]>>,
        modifiers: Modifiers,
    },
    Import {
        path: String,
        form: ImportForm,
    },
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    For {
        binding: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Stmt>>,
    },
    Try {
        body: Vec<Stmt>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Throw(Expr),
    Return(Option<Expr>),
    Break,
    Continue,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub items: Vec<Stmt>,
}
