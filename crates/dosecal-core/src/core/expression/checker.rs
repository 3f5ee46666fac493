use super::ast::{Expr, SyntaxElement};
use super::error::ExpressionIssue;
use super::functions::Builtin;
use std::collections::BTreeSet;

/// Walks a syntax tree and records every construct outside the formula allow-list.
///
/// Names are resolved through `is_known`; builtin function names always resolve. Walking
/// continues below an offending node so one pass reports every problem in the expression.
pub(crate) fn check(expr: &Expr, is_known: &dyn Fn(&str) -> bool) -> BTreeSet<ExpressionIssue> {
    let mut issues = BTreeSet::new();
    visit(expr, is_known, &mut issues);
    issues
}

fn visit(expr: &Expr, is_known: &dyn Fn(&str) -> bool, issues: &mut BTreeSet<ExpressionIssue>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Name(name) => {
            if !is_known(name) && !Builtin::is_builtin(name) {
                issues.insert(ExpressionIssue::UndeclaredVariable(name.clone()));
            }
        }
        Expr::Unary { operand, .. } => visit(operand, is_known, issues),
        Expr::Binary { left, right, .. } => {
            visit(left, is_known, issues);
            visit(right, is_known, issues);
        }
        Expr::Call {
            func,
            args,
            keywords,
        } => {
            match func.as_ref() {
                Expr::Name(name) if Builtin::is_builtin(name) => {}
                other => {
                    issues.insert(ExpressionIssue::DisallowedCall(other.describe_target()));
                    visit(other, is_known, issues);
                }
            }
            if !keywords.is_empty() {
                issues.insert(ExpressionIssue::KeywordArguments);
            }
            for arg in args.iter().chain(keywords.iter().map(|(_, value)| value)) {
                visit(arg, is_known, issues);
            }
        }
        Expr::Attribute { value, .. } => {
            issues.insert(ExpressionIssue::UnsupportedElement(
                SyntaxElement::AttributeAccess,
            ));
            visit(value, is_known, issues);
        }
        Expr::Unsupported { element, operands } => {
            issues.insert(ExpressionIssue::UnsupportedElement(*element));
            for operand in operands {
                visit(operand, is_known, issues);
            }
        }
    }
}
