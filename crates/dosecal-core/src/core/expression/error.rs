use super::ast::SyntaxElement;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} at position {position}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// A single reason a formula expression is not acceptable.
///
/// Issues are ordered and hashable so a validation pass can collect them into a sorted,
/// duplicate-free list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExpressionIssue {
    Syntax(String),
    UnsupportedElement(SyntaxElement),
    DisallowedCall(String),
    KeywordArguments,
    UndeclaredVariable(String),
}

impl fmt::Display for ExpressionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(message) => write!(f, "Invalid formula syntax: {}", message),
            Self::UnsupportedElement(element) => {
                write!(f, "Unsupported expression element: {}", element)
            }
            Self::DisallowedCall(target) => write!(
                f,
                "Call to '{}' is not allowed; only abs, min, max and round may be called",
                target
            ),
            Self::KeywordArguments => f.write_str("Keyword arguments are not allowed in formulas"),
            Self::UndeclaredVariable(name) => {
                write!(f, "Variable '{}' is not declared in the variables list", name)
            }
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticFault {
    #[error("division by zero")]
    DivisionByZero,
    #[error("modulo by zero")]
    ModuloByZero,
    #[error("zero cannot be raised to a negative power")]
    ZeroToNegativePower,
    #[error("result is not a real number")]
    NonReal,
    #[error("result overflows")]
    Overflow,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Invalid formula syntax: {0}")]
    Syntax(#[from] ParseError),

    #[error("Formula contains disallowed constructs: {}", join_issues(.0))]
    Disallowed(Vec<ExpressionIssue>),

    #[error("Missing formula variable: {0}")]
    MissingVariable(String),

    #[error("'{0}' is a function and cannot be used as a value")]
    FunctionAsValue(String),

    #[error("{function}() expects {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("Invalid argument to {function}(): {reason}")]
    InvalidArgument {
        function: &'static str,
        reason: &'static str,
    },

    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticFault),
}

fn join_issues(issues: &[ExpressionIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
