//! # Engine Module
//!
//! The dose-calculation orchestrator and everything it needs to run a single calculation.
//!
//! ## Overview
//!
//! A calculation turns a raw chamber reading into absorbed dose. Each correction factor is
//! resolved exactly once, either from a caller-supplied override or by computing it, before the
//! active formula for the beam type is evaluated in the expression sandbox. The result carries
//! every intermediate value and the dataset and formula versions used, so it can be recorded
//! as an audit row by the caller.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Calculation inputs, the `Manual`/`Computed` factor
//!   variants and a validating builder
//! - **Environment** ([`environment`]) - Providers of ambient temperature and pressure
//! - **Calculator** ([`calculator`]) - The orchestrator and its result record
//! - **Error Handling** ([`error`]) - Range, configuration, expression and arithmetic failures

pub mod calculator;
pub mod config;
pub mod environment;
pub mod error;

pub use calculator::{CalculationResult, Calculator, DoseOutputs};
pub use config::{CalculationInputs, CalculationInputsBuilder, ConfigError, Factor};
pub use environment::{
    DatasetEnvironment, EnvironmentError, EnvironmentProvider, EnvironmentReading,
    FixedEnvironment, NoEnvironment,
};
pub use error::CalculationError;
