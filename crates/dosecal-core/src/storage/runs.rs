use super::error::StoreError;
use super::store::{Store, json_column, parsed_column, to_json};
use crate::core::tables::DatasetType;
use crate::core::units::BeamType;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

/// An audit row to append to the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRun {
    pub user_id: Option<i64>,
    pub username: String,
    pub beam_type: BeamType,
    pub inputs: Value,
    pub outputs: Value,
    pub formula_name: String,
    pub formula_version: u32,
    pub dataset_versions: BTreeMap<DatasetType, u32>,
}

/// An immutable audit row of one successful calculation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<i64>,
    pub username: String,
    pub beam_type: BeamType,
    pub inputs: Value,
    pub outputs: Value,
    pub formula_name: String,
    pub formula_version: u32,
    pub dataset_versions: BTreeMap<DatasetType, u32>,
}

const SELECT_RUN: &str = "SELECT id, run_ts, user_id, username, beam_type, inputs_json,
    outputs_json, formula_name, formula_version, dataset_versions_json
    FROM calculation_runs";

fn map_run_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get("id")?,
        timestamp: row.get("run_ts")?,
        user_id: row.get("user_id")?,
        username: row.get("username")?,
        beam_type: parsed_column(row, "beam_type")?,
        inputs: json_column(row, "inputs_json")?,
        outputs: json_column(row, "outputs_json")?,
        formula_name: row.get("formula_name")?,
        formula_version: row.get("formula_version")?,
        dataset_versions: json_column(row, "dataset_versions_json")?,
    })
}

/// Append-only log of calculation runs. Rows are never updated or deleted.
#[derive(Debug, Clone, Copy)]
pub struct RunLog<'a> {
    store: &'a Store,
}

impl<'a> RunLog<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn record(&self, run: &NewRun) -> Result<i64, StoreError> {
        let connection = self.store.lock()?;
        connection.execute(
            "INSERT INTO calculation_runs (
                run_ts, user_id, username, beam_type, inputs_json, outputs_json,
                formula_name, formula_version, dataset_versions_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                Utc::now(),
                run.user_id,
                run.username,
                run.beam_type.as_str(),
                to_json(&run.inputs, "run inputs")?,
                to_json(&run.outputs, "run outputs")?,
                run.formula_name,
                run.formula_version,
                to_json(&run.dataset_versions, "dataset versions")?,
            ],
        )?;
        let id = connection.last_insert_rowid();
        info!(
            id,
            username = %run.username,
            beam_type = %run.beam_type,
            formula = %run.formula_name,
            "Recorded calculation run."
        );
        Ok(id)
    }

    /// Most recent runs first.
    pub fn list(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let connection = self.store.lock()?;
        let mut stmt = connection.prepare(&format!(
            "{SELECT_RUN} ORDER BY run_ts DESC, id DESC LIMIT ?1"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let runs = stmt
            .query_map(params![limit], map_run_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    pub fn get(&self, id: i64) -> Result<Option<RunRecord>, StoreError> {
        let connection = self.store.lock()?;
        Ok(connection
            .query_row(
                &format!("{SELECT_RUN} WHERE id = ?1"),
                params![id],
                map_run_row,
            )
            .optional()?)
    }
}
