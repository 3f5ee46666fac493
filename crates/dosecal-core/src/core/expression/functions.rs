use super::error::ExpressionError;
use phf::phf_map;

/// The only callables reachable from a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    Min,
    Max,
    Round,
}

static BUILTINS: phf::Map<&'static str, Builtin> = phf_map! {
    "abs" => Builtin::Abs,
    "min" => Builtin::Min,
    "max" => Builtin::Max,
    "round" => Builtin::Round,
};

// Beyond this many decimals every finite f64 is already exact.
const MAX_ROUNDING_DIGITS: i32 = 17;
const MIN_ROUNDING_DIGITS: i32 = -308;

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        BUILTINS.get(name).copied()
    }

    pub fn is_builtin(name: &str) -> bool {
        BUILTINS.contains_key(name)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Round => "round",
        }
    }

    pub fn apply(self, args: &[f64]) -> Result<f64, ExpressionError> {
        match self {
            Self::Abs => match args {
                [x] => Ok(x.abs()),
                _ => Err(self.arity("exactly 1", args.len())),
            },
            Self::Min | Self::Max if args.len() < 2 => Err(self.arity("at least 2", args.len())),
            Self::Min => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
            Self::Max => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            Self::Round => match args {
                [x] => Ok(x.round_ties_even()),
                [x, digits] => round_to_digits(*x, *digits),
                _ => Err(self.arity("1 or 2", args.len())),
            },
        }
    }

    fn arity(self, expected: &'static str, found: usize) -> ExpressionError {
        ExpressionError::Arity {
            function: self.name(),
            expected,
            found,
        }
    }
}

fn round_to_digits(x: f64, digits: f64) -> Result<f64, ExpressionError> {
    if !digits.is_finite() || digits.fract() != 0.0 {
        return Err(ExpressionError::InvalidArgument {
            function: "round",
            reason: "number of digits must be an integer",
        });
    }
    if digits >= f64::from(MAX_ROUNDING_DIGITS) || !x.is_finite() {
        return Ok(x);
    }
    if digits < f64::from(MIN_ROUNDING_DIGITS) {
        return Ok(0.0);
    }

    let factor = 10f64.powi(digits as i32);
    let scaled = x * factor;
    if !scaled.is_finite() {
        return Ok(x);
    }
    Ok(scaled.round_ties_even() / factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_four_functions_are_registered() {
        for name in ["abs", "min", "max", "round"] {
            assert!(Builtin::is_builtin(name));
        }
        for name in ["eval", "exec", "open", "pow", "__import__", "sum"] {
            assert!(!Builtin::is_builtin(name));
        }
    }

    #[test]
    fn round_uses_half_to_even() {
        assert_eq!(Builtin::Round.apply(&[2.5]).unwrap(), 2.0);
        assert_eq!(Builtin::Round.apply(&[3.5]).unwrap(), 4.0);
        assert_eq!(Builtin::Round.apply(&[-2.5]).unwrap(), -2.0);
    }

    #[test]
    fn round_with_digits_rounds_to_decimal_places() {
        assert_eq!(Builtin::Round.apply(&[1.23456, 2.0]).unwrap(), 1.23);
        assert_eq!(Builtin::Round.apply(&[1234.5, -2.0]).unwrap(), 1200.0);
    }

    #[test]
    fn round_rejects_fractional_digit_count() {
        assert!(matches!(
            Builtin::Round.apply(&[1.0, 1.5]),
            Err(ExpressionError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn min_and_max_require_two_arguments() {
        assert!(matches!(
            Builtin::Min.apply(&[1.0]),
            Err(ExpressionError::Arity { function: "min", .. })
        ));
        assert_eq!(Builtin::Max.apply(&[1.0, 3.0, 2.0]).unwrap(), 3.0);
        assert_eq!(Builtin::Min.apply(&[1.0, -3.0, 2.0]).unwrap(), -3.0);
    }

    #[test]
    fn abs_takes_exactly_one_argument() {
        assert_eq!(Builtin::Abs.apply(&[-4.0]).unwrap(), 4.0);
        assert!(Builtin::Abs.apply(&[1.0, 2.0]).is_err());
        assert!(Builtin::Abs.apply(&[]).is_err());
    }
}
