use super::error::RegistryError;
use super::store::{RecordStatus, Store, json_column, parsed_column, to_json};
use crate::core::expression;
use crate::core::units::BeamType;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A stored formula version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormulaRecord {
    pub id: i64,
    pub name: String,
    pub beam_type: BeamType,
    pub expression: String,
    pub variables: Vec<String>,
    pub units: BTreeMap<String, String>,
    pub status: RecordStatus,
    pub validation_errors: Vec<String>,
    pub version: u32,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Content of a formula submitted for registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFormula {
    pub name: String,
    pub beam_type: BeamType,
    pub expression: String,
    pub variables: Vec<String>,
    #[serde(default)]
    pub units: BTreeMap<String, String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaRegistration {
    pub id: i64,
    pub version: u32,
    pub errors: Vec<String>,
}

impl FormulaRegistration {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

const SYSTEM_USER: &str = "system";

/// The formulas installed when a beam type has no active formula.
pub fn default_formulas() -> Vec<NewFormula> {
    let units = BTreeMap::from([("output".to_string(), "Gy per measurement".to_string())]);
    vec![
        NewFormula {
            name: "dw_photon_default".to_string(),
            beam_type: BeamType::Photon,
            expression: "M_Q * N_Dw_60Co * k_Q * depth_factor".to_string(),
            variables: ["M_Q", "N_Dw_60Co", "k_Q", "depth_factor"]
                .map(String::from)
                .to_vec(),
            units: units.clone(),
            notes: Some("Default photon formula".to_string()),
            created_by: SYSTEM_USER.to_string(),
        },
        NewFormula {
            name: "dw_electron_default".to_string(),
            beam_type: BeamType::Electron,
            expression: "M_Q * N_Dw_60Co * k_ecal * k_R50 * P_Q_gr".to_string(),
            variables: ["M_Q", "N_Dw_60Co", "k_ecal", "k_R50", "P_Q_gr"]
                .map(String::from)
                .to_vec(),
            units,
            notes: Some("Default electron formula".to_string()),
            created_by: SYSTEM_USER.to_string(),
        },
    ]
}

/// Trims names, drops blanks and keeps the first occurrence of each name.
fn normalize_variables(variables: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(variables.len());
    for name in variables.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if !normalized.iter().any(|existing| existing == name) {
            normalized.push(name.to_string());
        }
    }
    normalized
}

const SELECT_FORMULA: &str = "SELECT id, name, beam_type, expression, variables_json, units_json,
    status, validation_errors_json, version, notes, created_by, created_at
    FROM formulas";

fn map_formula_row(row: &Row<'_>) -> rusqlite::Result<FormulaRecord> {
    Ok(FormulaRecord {
        id: row.get("id")?,
        name: row.get("name")?,
        beam_type: parsed_column(row, "beam_type")?,
        expression: row.get("expression")?,
        variables: json_column(row, "variables_json")?,
        units: json_column(row, "units_json")?,
        status: parsed_column(row, "status")?,
        validation_errors: json_column(row, "validation_errors_json")?,
        version: row.get("version")?,
        notes: row.get("notes")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
    })
}

/// Versioned storage of dose formulas with a single active formula per beam type.
#[derive(Debug, Clone, Copy)]
pub struct FormulaRegistry<'a> {
    store: &'a Store,
}

impl<'a> FormulaRegistry<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Validates the expression against its declared variables and stores a new version of
    /// `(name, beam_type)`. Failing formulas are stored as `invalid`; none is activated here.
    pub fn create(&self, formula: &NewFormula) -> Result<FormulaRegistration, RegistryError> {
        let name = formula.name.trim();
        let variables = normalize_variables(&formula.variables);
        let errors: Vec<String> = expression::validate(&formula.expression, &variables)
            .iter()
            .map(ToString::to_string)
            .collect();
        let status = if errors.is_empty() {
            RecordStatus::Inactive
        } else {
            RecordStatus::Invalid
        };

        let mut connection = self.store.lock()?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let version: u32 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM formulas
             WHERE name = ?1 AND beam_type = ?2",
            params![name, formula.beam_type.as_str()],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO formulas (
                name, beam_type, expression, variables_json, units_json, status,
                validation_errors_json, version, notes, created_by, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                name,
                formula.beam_type.as_str(),
                formula.expression.trim(),
                to_json(&variables, "formula variables")?,
                to_json(&formula.units, "formula units")?,
                status.as_str(),
                to_json(&errors, "validation errors")?,
                version,
                formula.notes,
                formula.created_by,
                Utc::now(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        if errors.is_empty() {
            info!(name, beam_type = %formula.beam_type, id, version, "Created formula.");
        } else {
            warn!(
                name,
                beam_type = %formula.beam_type,
                id,
                version,
                errors = errors.len(),
                "Created formula failed validation."
            );
        }

        Ok(FormulaRegistration {
            id,
            version,
            errors,
        })
    }

    /// Makes `id` the single active formula of its beam type.
    pub fn activate(&self, id: i64) -> Result<FormulaRecord, RegistryError> {
        let mut connection = self.store.lock()?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let record = tx
            .query_row(
                &format!("{SELECT_FORMULA} WHERE id = ?1"),
                params![id],
                map_formula_row,
            )
            .optional()?
            .ok_or(RegistryError::FormulaNotFound(id))?;
        if record.status == RecordStatus::Invalid {
            return Err(RegistryError::FormulaInvalid(id));
        }

        tx.execute(
            "UPDATE formulas SET status = 'inactive' WHERE beam_type = ?1 AND status = 'active'",
            params![record.beam_type.as_str()],
        )?;
        tx.execute(
            "UPDATE formulas SET status = 'active' WHERE id = ?1",
            params![id],
        )?;
        tx.commit()?;

        info!(
            name = %record.name,
            beam_type = %record.beam_type,
            version = record.version,
            "Activated formula."
        );
        Ok(FormulaRecord {
            status: RecordStatus::Active,
            ..record
        })
    }

    pub fn get_active(&self, beam_type: BeamType) -> Result<Option<FormulaRecord>, RegistryError> {
        let connection = self.store.lock()?;
        Ok(connection
            .query_row(
                &format!(
                    "{SELECT_FORMULA} WHERE beam_type = ?1 AND status = 'active'
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                params![beam_type.as_str()],
                map_formula_row,
            )
            .optional()?)
    }

    pub fn get(&self, id: i64) -> Result<Option<FormulaRecord>, RegistryError> {
        let connection = self.store.lock()?;
        Ok(connection
            .query_row(
                &format!("{SELECT_FORMULA} WHERE id = ?1"),
                params![id],
                map_formula_row,
            )
            .optional()?)
    }

    /// All versions ordered by beam type, then name, newest version first.
    pub fn list(&self, beam_type: Option<BeamType>) -> Result<Vec<FormulaRecord>, RegistryError> {
        let connection = self.store.lock()?;
        let mut stmt = connection.prepare(&format!(
            "{SELECT_FORMULA} WHERE (?1 IS NULL OR beam_type = ?1)
             ORDER BY beam_type, name, version DESC"
        ))?;
        let records = stmt
            .query_map(params![beam_type.map(BeamType::as_str)], map_formula_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Installs and activates the default formula of every beam type lacking an active one.
    ///
    /// Returns the ids of the formulas created.
    pub fn seed_defaults(&self) -> Result<Vec<i64>, RegistryError> {
        let mut created = Vec::new();
        for formula in default_formulas() {
            if self.get_active(formula.beam_type)?.is_some() {
                continue;
            }
            let registration = self.create(&formula)?;
            if registration.is_valid() {
                self.activate(registration.id)?;
            }
            created.push(registration.id);
        }
        Ok(created)
    }
}
