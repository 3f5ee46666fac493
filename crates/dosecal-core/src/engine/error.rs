use super::config::ConfigError;
use super::environment::EnvironmentError;
use crate::core::corrections::CorrectionError;
use crate::core::expression::{ArithmeticFault, ExpressionError};
use crate::core::interpolation::LookupError;
use crate::core::tables::DatasetType;
use crate::core::units::BeamType;
use crate::storage::RegistryError;
use thiserror::Error;

/// Something the calculation needs is not configured in the registries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MissingConfiguration {
    #[error("No active formula for beam type '{0}'")]
    Formula(BeamType),

    #[error("An active {0} dataset is required")]
    Dataset(DatasetType),

    #[error(
        "Calibration constant for chamber '{0}' must be provided or available in chamber defaults"
    )]
    CalibrationConstant(String),

    #[error(transparent)]
    TableRows(LookupError),
}

/// Undefined arithmetic while resolving factors or evaluating the formula.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ArithmeticError {
    #[error("Failed to compute {factor}: {source}")]
    Correction {
        factor: &'static str,
        source: CorrectionError,
    },

    #[error("Failed to compute depth_factor: {0}")]
    DepthFactor(LookupError),

    #[error("Formula arithmetic failed: {0}")]
    Formula(ArithmeticFault),
}

#[derive(Debug, Error)]
pub enum CalculationError {
    #[error("Invalid calculation input: {0}")]
    InvalidInput(#[from] ConfigError),

    #[error("{0}")]
    Range(LookupError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] MissingConfiguration),

    #[error("Formula error: {0}")]
    Expression(ExpressionError),

    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),

    #[error("Environmental conditions unavailable: {0}")]
    Environment(#[from] EnvironmentError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl From<LookupError> for CalculationError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::BeamQualityOutOfRange { .. } | LookupError::DepthOutOfRange { .. } => {
                Self::Range(err)
            }
            LookupError::NoRowsForChamber(_) => {
                Self::Configuration(MissingConfiguration::TableRows(err))
            }
            LookupError::ZeroReferenceValue => Self::Arithmetic(ArithmeticError::DepthFactor(err)),
        }
    }
}

impl From<ExpressionError> for CalculationError {
    fn from(err: ExpressionError) -> Self {
        match err {
            ExpressionError::Arithmetic(fault) => {
                Self::Arithmetic(ArithmeticError::Formula(fault))
            }
            other => Self::Expression(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_lookups_are_range_errors() {
        let err = CalculationError::from(LookupError::DepthOutOfRange {
            value: 40.0,
            min: 0.0,
            max: 30.0,
        });
        assert!(matches!(err, CalculationError::Range(_)));
    }

    #[test]
    fn missing_chamber_rows_are_configuration_errors() {
        let err = CalculationError::from(LookupError::NoRowsForChamber("X".into()));
        assert!(matches!(
            err,
            CalculationError::Configuration(MissingConfiguration::TableRows(_))
        ));
    }

    #[test]
    fn formula_arithmetic_faults_are_arithmetic_errors() {
        let err = CalculationError::from(ExpressionError::Arithmetic(
            ArithmeticFault::DivisionByZero,
        ));
        assert!(matches!(
            err,
            CalculationError::Arithmetic(ArithmeticError::Formula(
                ArithmeticFault::DivisionByZero
            ))
        ));

        let err = CalculationError::from(ExpressionError::MissingVariable("x".into()));
        assert!(matches!(err, CalculationError::Expression(_)));
    }
}
