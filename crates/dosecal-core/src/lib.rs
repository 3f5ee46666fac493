//! # dosecal Core Library
//!
//! An absorbed-dose calculation engine for ionization-chamber dosimetry. A raw chamber reading
//! is turned into dose through a chain of correction factors and a versioned, user-editable
//! arithmetic formula, and every calculation can be traced back to the exact formula and
//! reference-table versions it used.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict layering so that the numerical parts stay pure and testable
//! while persistence and orchestration stay thin.
//!
//! - **[`core`]: The Foundation.** Stateless building blocks: the sandboxed formula language
//!   (`expression`), closed-form physics corrections (`corrections`), table interpolation
//!   (`interpolation`), tabular reference data and its validation (`tables`), and units.
//!
//! - **[`storage`]: The Registries.** A relational store plus the versioned dataset and formula
//!   registries (single active version per type), the calculation audit log and settings.
//!
//! - **[`engine`]: The Orchestrator.** Resolves every correction factor (manual override or
//!   computed), fetches the active formula, evaluates it and returns an auditable result.
//!
//! - **[`workflows`]: The Public API.** High-level procedures such as bootstrapping a fresh
//!   store with default settings, seed datasets and default formulas.

pub mod core;
pub mod engine;
pub mod storage;
pub mod workflows;
