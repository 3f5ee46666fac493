//! Restricted arithmetic language for dose formulas.
//!
//! Formulas may use numeric literals, variables, the binary operators `+ - * / % **`, unary
//! `+ -`, and positional calls to `abs`, `min`, `max` and `round`. Nothing else is reachable:
//! expressions are parsed by a dedicated parser and walked by an evaluator whose scope holds
//! only those four functions and the caller's variable values.
//!
//! Evaluation never relies on an earlier [`validate`] call; [`evaluate`] repeats the structural
//! allow-list check on every invocation.

mod ast;
mod checker;
mod error;
mod eval;
mod functions;
mod lexer;
mod parser;

pub use ast::{BinaryOp, Expr, SyntaxElement, UnaryOp};
pub use error::{ArithmeticFault, ExpressionError, ExpressionIssue, ParseError};
pub use eval::VariableScope;
pub use functions::Builtin;
pub use parser::parse;

use std::collections::HashSet;

/// Checks an expression against the allow-list and a set of declared variable names.
///
/// Returns every problem found, sorted and without duplicates. An empty list means the
/// expression is safe and every name it references is either declared or a builtin.
pub fn validate<I, S>(expression: &str, declared_variables: I) -> Vec<ExpressionIssue>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let tree = match parse(expression) {
        Ok(tree) => tree,
        Err(err) => return vec![ExpressionIssue::Syntax(err.to_string())],
    };

    let declared: HashSet<String> = declared_variables
        .into_iter()
        .map(|name| name.as_ref().to_string())
        .collect();

    checker::check(&tree, &|name: &str| declared.contains(name))
        .into_iter()
        .collect()
}

/// Evaluates an expression against the supplied variable values.
///
/// The structural check runs first; any disallowed construct fails the call before a single
/// operation is performed. Variables absent from `variables` fail with
/// [`ExpressionError::MissingVariable`].
pub fn evaluate<S>(expression: &str, variables: &S) -> Result<f64, ExpressionError>
where
    S: VariableScope + ?Sized,
{
    let tree = parse(expression)?;

    let (missing, structural): (Vec<_>, Vec<_>) = checker::check(&tree, &|name: &str| {
        variables.lookup(name).is_some()
    })
    .into_iter()
    .partition(|issue| matches!(issue, ExpressionIssue::UndeclaredVariable(_)));

    if !structural.is_empty() {
        return Err(ExpressionError::Disallowed(structural));
    }
    if let Some(ExpressionIssue::UndeclaredVariable(name)) = missing.into_iter().next() {
        return Err(ExpressionError::MissingVariable(name));
    }

    eval::eval(&tree, variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn scope(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn f64_approx_equal(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() < tolerance
    }

    #[test]
    fn evaluates_dose_product() {
        let values = scope(&[("M_Q", 1e-8), ("N", 5.233e7), ("k", 0.973)]);
        let result = evaluate("M_Q * N * k", &values).unwrap();
        assert!(f64_approx_equal(result, 0.5091709, 5e-7));
    }

    #[test]
    fn evaluates_operator_precedence_and_power() {
        let values = scope(&[("x", 3.0)]);
        assert_eq!(evaluate("1 + 2 * x ** 2", &values).unwrap(), 19.0);
        assert_eq!(evaluate("-2 ** 2", &values).unwrap(), -4.0);
        assert_eq!(evaluate("2 ** -1", &values).unwrap(), 0.5);
        assert_eq!(evaluate("(1 + 2) * x", &values).unwrap(), 9.0);
        assert_eq!(evaluate("-7 % x", &values).unwrap(), 2.0);
    }

    #[test]
    fn evaluates_allowed_function_calls() {
        let values = scope(&[("a", -1.5), ("b", 2.0)]);
        assert_eq!(evaluate("abs(a) + max(a, b)", &values).unwrap(), 3.5);
        assert_eq!(evaluate("min(a, b, 0)", &values).unwrap(), -1.5);
        assert_eq!(evaluate("round(b / 3, 2)", &values).unwrap(), 0.67);
    }

    #[test]
    fn validate_accepts_safe_declared_expression() {
        let issues = validate("M_Q * N_Dw_60Co * round(k_Q, 3)", ["M_Q", "N_Dw_60Co", "k_Q"]);
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn validate_reports_distinct_issue_for_each_violation() {
        let undeclared = validate("M_Q * unknown", ["M_Q"]);
        let attribute = validate("M_Q.real", ["M_Q"]);
        let call = validate("eval(M_Q)", ["M_Q"]);

        assert_eq!(
            undeclared,
            vec![ExpressionIssue::UndeclaredVariable("unknown".to_string())]
        );
        assert_eq!(
            attribute,
            vec![ExpressionIssue::UnsupportedElement(
                SyntaxElement::AttributeAccess
            )]
        );
        assert_eq!(
            call,
            vec![
                ExpressionIssue::DisallowedCall("eval".to_string()),
                ExpressionIssue::UndeclaredVariable("eval".to_string()),
            ]
        );
        assert_ne!(undeclared, attribute);
        assert_ne!(attribute, call);
    }

    #[test]
    fn validate_deduplicates_repeated_issues() {
        let issues = validate("x + x * x", Vec::<String>::new());
        assert_eq!(
            issues,
            vec![ExpressionIssue::UndeclaredVariable("x".to_string())]
        );
    }

    #[test]
    fn validate_reports_every_offending_construct() {
        let issues = validate("os.system(1) + f(x=1) // [2]", ["f"]);
        assert!(issues.contains(&ExpressionIssue::DisallowedCall("os.system".to_string())));
        assert!(issues.contains(&ExpressionIssue::UnsupportedElement(
            SyntaxElement::AttributeAccess
        )));
        assert!(issues.contains(&ExpressionIssue::UndeclaredVariable("os".to_string())));
        assert!(issues.contains(&ExpressionIssue::DisallowedCall("f".to_string())));
        assert!(issues.contains(&ExpressionIssue::KeywordArguments));
        assert!(issues.contains(&ExpressionIssue::UnsupportedElement(
            SyntaxElement::FloorDivision
        )));
        assert!(issues.contains(&ExpressionIssue::UnsupportedElement(SyntaxElement::List)));
    }

    #[test]
    fn validate_reports_syntax_errors() {
        let issues = validate("M_Q *", ["M_Q"]);
        assert!(matches!(issues.as_slice(), [ExpressionIssue::Syntax(_)]));
    }

    #[test]
    fn deeply_nested_formula_is_rejected_without_exhausting_the_stack() {
        let expression = format!("{}M_Q{}", "(".repeat(10_000), ")".repeat(10_000));
        let issues = validate(&expression, ["M_Q"]);
        assert!(matches!(issues.as_slice(), [ExpressionIssue::Syntax(_)]));

        let values = scope(&[("M_Q", 1.0)]);
        assert!(matches!(
            evaluate(&expression, &values),
            Err(ExpressionError::Syntax(_))
        ));
        assert!(matches!(
            evaluate(&format!("{}M_Q", "-".repeat(10_000)), &values),
            Err(ExpressionError::Syntax(_))
        ));
    }

    #[test]
    fn evaluate_rejects_disallowed_constructs_regardless_of_values() {
        let values = scope(&[("x", 1.0)]);
        for expression in ["x.real", "x < 2", "sum(x, x)", "round(x, ndigits=1)", "'a'"] {
            assert!(
                matches!(
                    evaluate(expression, &values),
                    Err(ExpressionError::Disallowed(_))
                ),
                "{}",
                expression
            );
        }
    }

    #[test]
    fn evaluate_reports_missing_variables() {
        let values = scope(&[("x", 1.0)]);
        assert_eq!(
            evaluate("x * y", &values),
            Err(ExpressionError::MissingVariable("y".to_string()))
        );
    }

    #[test]
    fn evaluate_rejects_functions_used_as_values() {
        let values = scope(&[]);
        assert_eq!(
            evaluate("abs + 1", &values),
            Err(ExpressionError::FunctionAsValue("abs".to_string()))
        );
    }

    #[test]
    fn evaluate_surfaces_arithmetic_faults() {
        let values = scope(&[("x", 0.0), ("n", -8.0)]);
        assert_eq!(
            evaluate("1 / x", &values),
            Err(ExpressionError::Arithmetic(ArithmeticFault::DivisionByZero))
        );
        assert_eq!(
            evaluate("x ** -2", &values),
            Err(ExpressionError::Arithmetic(
                ArithmeticFault::ZeroToNegativePower
            ))
        );
        assert_eq!(
            evaluate("n ** 0.5", &values),
            Err(ExpressionError::Arithmetic(ArithmeticFault::NonReal))
        );
        assert_eq!(
            evaluate("10 ** 400", &values),
            Err(ExpressionError::Arithmetic(ArithmeticFault::Overflow))
        );
    }

    #[test]
    fn evaluate_accepts_btree_scope() {
        let values: std::collections::BTreeMap<String, f64> =
            [("a".to_string(), 2.0)].into_iter().collect();
        assert_eq!(evaluate("a * a", &values).unwrap(), 4.0);
    }
}
