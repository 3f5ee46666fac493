use std::fmt;

/// Syntax tree produced by the formula parser.
///
/// The parser recognises a wider surface than the formula language permits so that the
/// checker can report every offending construct individually instead of stopping at the
/// first unexpected token. Only [`Expr::Number`], [`Expr::Name`], [`Expr::Unary`],
/// [`Expr::Binary`] and [`Expr::Call`] can ever be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<(String, Expr)>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Unsupported {
        element: SyntaxElement,
        operands: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinaryOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }
}

/// Constructs the parser understands but the formula language rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyntaxElement {
    AttributeAccess,
    Subscript,
    StringLiteral,
    Comparison,
    BooleanOperator,
    FloorDivision,
    MatrixMultiplication,
    BitwiseOperator,
    BitwiseInversion,
    List,
    Tuple,
    Dict,
    Set,
}

impl fmt::Display for SyntaxElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AttributeAccess => "attribute access",
            Self::Subscript => "subscript",
            Self::StringLiteral => "string literal",
            Self::Comparison => "comparison",
            Self::BooleanOperator => "boolean operator",
            Self::FloorDivision => "floor division",
            Self::MatrixMultiplication => "matrix multiplication",
            Self::BitwiseOperator => "bitwise operator",
            Self::BitwiseInversion => "bitwise inversion",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Dict => "dict",
            Self::Set => "set",
        };
        f.write_str(name)
    }
}

impl Expr {
    pub(crate) fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub(crate) fn unsupported(element: SyntaxElement, operands: Vec<Expr>) -> Self {
        Self::Unsupported { element, operands }
    }

    /// Human-readable description of a call target, used in diagnostics.
    pub fn describe_target(&self) -> String {
        match self {
            Self::Name(name) => name.clone(),
            Self::Attribute { value, attr } => format!("{}.{}", value.describe_target(), attr),
            _ => "<expression>".to_string(),
        }
    }
}
