use super::error::RegistryError;
use super::store::{RecordStatus, Store, ValidationStatus, json_column, parsed_column, to_json};
use crate::core::tables::{DatasetType, Table, TableSource, validate_table};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, Transaction, TransactionBehavior, params};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Metadata of one stored dataset version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetRecord {
    pub id: i64,
    pub dataset_type: DatasetType,
    pub version: u32,
    pub status: RecordStatus,
    pub validation_status: ValidationStatus,
    pub validation_errors: Vec<String>,
    /// Opaque handle to the stored payload.
    pub content_ref: i64,
    pub checksum: String,
    pub notes: Option<String>,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Outcome of a registration. A non-empty `errors` list means the version was stored as invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRegistration {
    pub id: i64,
    pub version: u32,
    pub errors: Vec<String>,
}

impl DatasetRegistration {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One row of the active chamber-defaults table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChamberDefaults {
    pub chamber_type: String,
    pub calibration_constant: f64,
    pub cavity_radius: f64,
    pub reference_polarity: String,
}

fn find_chamber_defaults(table: &Table, chamber_type: &str) -> Option<ChamberDefaults> {
    let chamber_type = chamber_type.trim();
    table
        .records()
        .filter(|record| record.text("chamber_type") == Some(chamber_type))
        .find_map(|record| {
            Some(ChamberDefaults {
                chamber_type: chamber_type.to_string(),
                calibration_constant: record.number("calibration_constant")?,
                cavity_radius: record.number("cavity_radius")?,
                reference_polarity: record.text("reference_polarity")?.to_string(),
            })
        })
}

/// Every active dataset with its payload, read in a single transaction.
///
/// A calculation works from one snapshot so the versions it reports are the versions of the
/// tables it actually read, even if another writer activates a version meanwhile.
#[derive(Debug, Clone, Default)]
pub struct ActiveDatasets {
    entries: BTreeMap<DatasetType, (DatasetRecord, Table)>,
}

impl ActiveDatasets {
    pub fn record(&self, dataset_type: DatasetType) -> Option<&DatasetRecord> {
        self.entries.get(&dataset_type).map(|(record, _)| record)
    }

    pub fn table(&self, dataset_type: DatasetType) -> Option<&Table> {
        self.entries.get(&dataset_type).map(|(_, table)| table)
    }

    pub fn versions(&self) -> BTreeMap<DatasetType, u32> {
        self.entries
            .iter()
            .map(|(dataset_type, (record, _))| (*dataset_type, record.version))
            .collect()
    }

    pub fn chamber_defaults(&self, chamber_type: &str) -> Option<ChamberDefaults> {
        find_chamber_defaults(self.table(DatasetType::ChamberDefaults)?, chamber_type)
    }
}

/// Hex-encoded SHA-256 of a payload.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

const SELECT_DATASET: &str = "SELECT id, dataset_type, version, status, validation_status,
    validation_errors_json, payload_id, checksum, notes, uploaded_by, uploaded_at
    FROM datasets";

fn map_dataset_row(row: &Row<'_>) -> rusqlite::Result<DatasetRecord> {
    Ok(DatasetRecord {
        id: row.get("id")?,
        dataset_type: parsed_column(row, "dataset_type")?,
        version: row.get("version")?,
        status: parsed_column(row, "status")?,
        validation_status: parsed_column(row, "validation_status")?,
        validation_errors: json_column(row, "validation_errors_json")?,
        content_ref: row.get("payload_id")?,
        checksum: row.get("checksum")?,
        notes: row.get("notes")?,
        uploaded_by: row.get("uploaded_by")?,
        uploaded_at: row.get("uploaded_at")?,
    })
}

/// Versioned storage of reference tables with a single active version per dataset type.
#[derive(Debug, Clone, Copy)]
pub struct DatasetRegistry<'a> {
    store: &'a Store,
}

impl<'a> DatasetRegistry<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Validates and stores a new version of `dataset_type`.
    ///
    /// The payload is persisted whatever the validation outcome; a failing table is recorded
    /// as `invalid`. With `activate` set, a passing table becomes the active version in the
    /// same transaction.
    pub fn register(
        &self,
        dataset_type: DatasetType,
        table: &Table,
        uploaded_by: &str,
        notes: Option<&str>,
        activate: bool,
    ) -> Result<DatasetRegistration, RegistryError> {
        let errors: Vec<String> = validate_table(dataset_type, table)
            .iter()
            .map(ToString::to_string)
            .collect();
        let bytes = table.to_csv_bytes().map_err(RegistryError::Encode)?;
        let digest = checksum(&bytes);
        let now = Utc::now();

        let (status, validation_status) = match (errors.is_empty(), activate) {
            (false, _) => (RecordStatus::Invalid, ValidationStatus::Failed),
            (true, true) => (RecordStatus::Active, ValidationStatus::Passed),
            (true, false) => (RecordStatus::Inactive, ValidationStatus::Passed),
        };

        let mut connection = self.store.lock()?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let version: u32 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM datasets WHERE dataset_type = ?1",
            params![dataset_type.as_str()],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT OR IGNORE INTO dataset_payloads (checksum, content, size_bytes, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![digest, bytes, bytes.len() as i64, now],
        )?;
        let payload_id: i64 = tx.query_row(
            "SELECT id FROM dataset_payloads WHERE checksum = ?1",
            params![digest],
            |row| row.get(0),
        )?;

        if status == RecordStatus::Active {
            demote_active_datasets(&tx, dataset_type)?;
        }

        tx.execute(
            "INSERT INTO datasets (
                dataset_type, version, status, validation_status, validation_errors_json,
                payload_id, checksum, notes, uploaded_by, uploaded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                dataset_type.as_str(),
                version,
                status.as_str(),
                validation_status.as_str(),
                to_json(&errors, "validation errors")?,
                payload_id,
                digest,
                notes,
                uploaded_by,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        if errors.is_empty() {
            info!(
                dataset_type = %dataset_type,
                id,
                version,
                status = %status,
                "Registered dataset."
            );
        } else {
            warn!(
                dataset_type = %dataset_type,
                id,
                version,
                errors = errors.len(),
                "Registered dataset failed validation."
            );
        }

        Ok(DatasetRegistration {
            id,
            version,
            errors,
        })
    }

    /// Makes `id` the single active version of its dataset type.
    pub fn activate(&self, id: i64) -> Result<DatasetRecord, RegistryError> {
        let mut connection = self.store.lock()?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let record = tx
            .query_row(
                &format!("{SELECT_DATASET} WHERE id = ?1"),
                params![id],
                map_dataset_row,
            )
            .optional()?
            .ok_or(RegistryError::DatasetNotFound(id))?;
        if record.validation_status != ValidationStatus::Passed {
            return Err(RegistryError::DatasetNotValidated(id));
        }

        demote_active_datasets(&tx, record.dataset_type)?;
        tx.execute(
            "UPDATE datasets SET status = 'active' WHERE id = ?1",
            params![id],
        )?;
        tx.commit()?;

        info!(
            dataset_type = %record.dataset_type,
            id,
            version = record.version,
            "Activated dataset."
        );
        Ok(DatasetRecord {
            status: RecordStatus::Active,
            ..record
        })
    }

    /// The active version of `dataset_type` with its payload, if one is active.
    pub fn get_active(
        &self,
        dataset_type: DatasetType,
    ) -> Result<Option<(DatasetRecord, Table)>, RegistryError> {
        let connection = self.store.lock()?;
        let active = connection
            .query_row(
                &format!(
                    "{SELECT_DATASET} WHERE dataset_type = ?1 AND status = 'active'
                     ORDER BY version DESC LIMIT 1"
                ),
                params![dataset_type.as_str()],
                map_dataset_row,
            )
            .optional()?;

        let Some(record) = active else {
            return Ok(None);
        };
        let table = load_payload(&connection, &record)?;
        Ok(Some((record, table)))
    }

    /// Loads every active dataset inside one read transaction.
    pub fn active_snapshot(&self) -> Result<ActiveDatasets, RegistryError> {
        let mut connection = self.store.lock()?;
        let tx = connection.transaction()?;
        let records = {
            let mut stmt = tx.prepare(&format!("{SELECT_DATASET} WHERE status = 'active'"))?;
            stmt.query_map([], map_dataset_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        let mut entries = BTreeMap::new();
        for record in records {
            let table = load_payload(&tx, &record)?;
            entries.insert(record.dataset_type, (record, table));
        }
        tx.commit()?;
        Ok(ActiveDatasets { entries })
    }

    pub fn get(&self, id: i64) -> Result<Option<DatasetRecord>, RegistryError> {
        let connection = self.store.lock()?;
        Ok(connection
            .query_row(
                &format!("{SELECT_DATASET} WHERE id = ?1"),
                params![id],
                map_dataset_row,
            )
            .optional()?)
    }

    /// The stored payload of any version, active or not.
    pub fn payload(&self, record: &DatasetRecord) -> Result<Table, RegistryError> {
        let connection = self.store.lock()?;
        load_payload(&connection, record)
    }

    /// All versions, grouped by dataset type with the newest version first.
    pub fn list(
        &self,
        dataset_type: Option<DatasetType>,
    ) -> Result<Vec<DatasetRecord>, RegistryError> {
        let connection = self.store.lock()?;
        let mut stmt = connection.prepare(&format!(
            "{SELECT_DATASET} WHERE (?1 IS NULL OR dataset_type = ?1)
             ORDER BY dataset_type, version DESC"
        ))?;
        let records = stmt
            .query_map(params![dataset_type.map(DatasetType::as_str)], map_dataset_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Version of the active dataset for every type that has one.
    pub fn active_versions(&self) -> Result<BTreeMap<DatasetType, u32>, RegistryError> {
        let connection = self.store.lock()?;
        let mut stmt =
            connection.prepare("SELECT dataset_type, version FROM datasets WHERE status = 'active'")?;
        let versions: BTreeMap<DatasetType, u32> = stmt
            .query_map([], |row| {
                Ok((
                    parsed_column::<DatasetType>(row, "dataset_type")?,
                    row.get::<_, u32>("version")?,
                ))
            })?
            .collect::<Result<_, _>>()?;
        Ok(versions)
    }

    /// Defaults for `chamber_type` from the active chamber-defaults table.
    pub fn chamber_defaults(
        &self,
        chamber_type: &str,
    ) -> Result<Option<ChamberDefaults>, RegistryError> {
        Ok(self
            .get_active(DatasetType::ChamberDefaults)?
            .and_then(|(_, table)| find_chamber_defaults(&table, chamber_type)))
    }

    /// Sorted, de-duplicated chamber identifiers of the active chamber-defaults table.
    pub fn list_chambers(&self) -> Result<Vec<String>, RegistryError> {
        let Some((_, table)) = self.get_active(DatasetType::ChamberDefaults)? else {
            return Ok(Vec::new());
        };
        let mut chambers: Vec<String> = table
            .records()
            .filter_map(|record| record.text("chamber_type"))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        chambers.sort();
        chambers.dedup();
        Ok(chambers)
    }
}

impl TableSource for DatasetRegistry<'_> {
    type Error = RegistryError;

    fn active_table(&self, dataset_type: DatasetType) -> Result<Option<Table>, Self::Error> {
        Ok(self.get_active(dataset_type)?.map(|(_, table)| table))
    }
}

fn demote_active_datasets(
    tx: &Transaction<'_>,
    dataset_type: DatasetType,
) -> Result<(), RegistryError> {
    tx.execute(
        "UPDATE datasets SET status = 'inactive' WHERE dataset_type = ?1 AND status = 'active'",
        params![dataset_type.as_str()],
    )?;
    Ok(())
}

fn load_payload(
    connection: &rusqlite::Connection,
    record: &DatasetRecord,
) -> Result<Table, RegistryError> {
    let content: Vec<u8> = connection.query_row(
        "SELECT content FROM dataset_payloads WHERE id = ?1",
        params![record.content_ref],
        |row| row.get(0),
    )?;
    Table::from_csv_bytes(&content).map_err(|source| RegistryError::Payload {
        id: record.id,
        source,
    })
}
