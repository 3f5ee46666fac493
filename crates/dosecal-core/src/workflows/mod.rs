//! # Workflows Module
//!
//! High-level procedures built on top of the registries and the calculation engine.
//!
//! - **Bootstrap Workflow** ([`bootstrap`]) - Prepares a fresh or existing store: schema
//!   migration, default settings, seed reference datasets and default formulas. Idempotent, so
//!   it is safe to run on every start-up.

pub mod bootstrap;
