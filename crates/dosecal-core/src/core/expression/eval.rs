use super::ast::{BinaryOp, Expr, SyntaxElement, UnaryOp};
use super::error::{ArithmeticFault, ExpressionError, ExpressionIssue};
use super::functions::Builtin;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

/// Read access to the variable values a formula is evaluated against.
pub trait VariableScope {
    fn lookup(&self, name: &str) -> Option<f64>;
}

impl<S: BuildHasher> VariableScope for HashMap<String, f64, S> {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl VariableScope for BTreeMap<String, f64> {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

pub(crate) fn eval<S: VariableScope + ?Sized>(
    expr: &Expr,
    scope: &S,
) -> Result<f64, ExpressionError> {
    let value = match expr {
        Expr::Number(value) => *value,
        Expr::Name(name) => match scope.lookup(name) {
            Some(value) => value,
            None if Builtin::is_builtin(name) => {
                return Err(ExpressionError::FunctionAsValue(name.clone()));
            }
            None => return Err(ExpressionError::MissingVariable(name.clone())),
        },
        Expr::Unary { op, operand } => {
            let operand = eval(operand, scope)?;
            match op {
                UnaryOp::Plus => operand,
                UnaryOp::Minus => -operand,
            }
        }
        Expr::Binary { op, left, right } => {
            let left = eval(left, scope)?;
            let right = eval(right, scope)?;
            apply_binary(*op, left, right)?
        }
        Expr::Call {
            func,
            args,
            keywords,
        } => {
            if !keywords.is_empty() {
                return Err(disallowed(ExpressionIssue::KeywordArguments));
            }
            let builtin = match func.as_ref() {
                Expr::Name(name) => Builtin::lookup(name),
                _ => None,
            }
            .ok_or_else(|| disallowed(ExpressionIssue::DisallowedCall(func.describe_target())))?;

            let values = args
                .iter()
                .map(|arg| eval(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            builtin.apply(&values)?
        }
        Expr::Attribute { .. } => {
            return Err(disallowed(ExpressionIssue::UnsupportedElement(
                SyntaxElement::AttributeAccess,
            )));
        }
        Expr::Unsupported { element, .. } => {
            return Err(disallowed(ExpressionIssue::UnsupportedElement(*element)));
        }
    };

    if value.is_nan() {
        Err(ArithmeticFault::NonReal.into())
    } else if value.is_infinite() {
        Err(ArithmeticFault::Overflow.into())
    } else {
        Ok(value)
    }
}

fn disallowed(issue: ExpressionIssue) -> ExpressionError {
    ExpressionError::Disallowed(vec![issue])
}

fn apply_binary(op: BinaryOp, left: f64, right: f64) -> Result<f64, ArithmeticFault> {
    match op {
        BinaryOp::Add => Ok(left + right),
        BinaryOp::Sub => Ok(left - right),
        BinaryOp::Mul => Ok(left * right),
        BinaryOp::Div if right == 0.0 => Err(ArithmeticFault::DivisionByZero),
        BinaryOp::Div => Ok(left / right),
        BinaryOp::Mod if right == 0.0 => Err(ArithmeticFault::ModuloByZero),
        BinaryOp::Mod => Ok(floored_mod(left, right)),
        BinaryOp::Pow if left == 0.0 && right < 0.0 => Err(ArithmeticFault::ZeroToNegativePower),
        BinaryOp::Pow => Ok(left.powf(right)),
    }
}

/// Remainder whose sign follows the divisor.
fn floored_mod(left: f64, right: f64) -> f64 {
    let remainder = left % right;
    if remainder != 0.0 && (remainder < 0.0) != (right < 0.0) {
        remainder + right
    } else {
        remainder
    }
}
