//! # Storage Module
//!
//! Persistence for everything the calculation engine reads or writes: versioned reference
//! datasets, versioned dose formulas, the append-only calculation log and free-form settings.
//!
//! ## Architecture
//!
//! - **Store** ([`store`]) - A single SQLite connection with schema migration; all registries
//!   borrow it
//! - **Dataset Registry** ([`datasets`]) - Content-addressed, validated reference tables with
//!   one active version per dataset type
//! - **Formula Registry** ([`formulas`]) - Sandbox-validated formulas with one active version per
//!   beam type
//! - **Run Log** ([`runs`]) - Immutable audit rows of completed calculations
//! - **Settings** ([`settings`]) - Key/value configuration, including environment-source choice
//!
//! Activation in both registries demotes the current active row and promotes the target inside
//! one immediate transaction. A partial unique index additionally rejects any second active row.

pub mod datasets;
pub mod error;
pub mod formulas;
pub mod runs;
pub mod settings;
pub mod store;

pub use datasets::{
    ActiveDatasets, ChamberDefaults, DatasetRecord, DatasetRegistration, DatasetRegistry,
};
pub use error::{RegistryError, StoreError};
pub use formulas::{FormulaRecord, FormulaRegistration, FormulaRegistry, NewFormula};
pub use runs::{NewRun, RunLog, RunRecord};
pub use settings::{EnvironmentSettings, EnvironmentSource, SettingsStore};
pub use store::{RecordStatus, Store, ValidationStatus};
