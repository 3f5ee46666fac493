//! # Core Module
//!
//! This module provides the stateless building blocks of the dose-calculation engine. Nothing
//! in here touches the backing store; every function is a pure transformation of its inputs.
//!
//! ## Architecture
//!
//! - **Formula Language** ([`expression`]) - Lexer, parser, allow-list checker and closed-scope
//!   evaluator for the restricted arithmetic language used by dose formulas
//! - **Physics Corrections** ([`corrections`]) - Pressure-temperature, ion recombination and
//!   polarity corrections for ionization-chamber readings
//! - **Interpolation** ([`interpolation`]) - Beam-quality and depth-dose lookups over reference
//!   tables, with extrapolation disabled
//! - **Reference Tables** ([`tables`]) - Dataset types, their required schemas, the tabular
//!   payload representation and validation
//! - **Units** ([`units`]) - Charge units, beam types and measurement geometry
//!
//! ## Scientific Foundation
//!
//! The correction chain follows reference-dosimetry protocols in which the fully corrected
//! chamber reading `M_Q = M_raw · P_TP · P_ion · P_pol · P_elec` is converted to absorbed dose
//! to water with a chamber calibration coefficient and a beam-quality conversion factor.

pub mod corrections;
pub mod expression;
pub mod interpolation;
pub mod tables;
pub mod units;
