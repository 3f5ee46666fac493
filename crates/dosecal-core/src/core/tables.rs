use phf::phf_map;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    BeamQualityTable,
    DepthDoseSsd,
    DepthDoseSad,
    ChamberDefaults,
    EnvironmentalData,
}

impl DatasetType {
    pub const ALL: [DatasetType; 5] = [
        DatasetType::BeamQualityTable,
        DatasetType::DepthDoseSsd,
        DatasetType::DepthDoseSad,
        DatasetType::ChamberDefaults,
        DatasetType::EnvironmentalData,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeamQualityTable => "beam_quality_table",
            Self::DepthDoseSsd => "depth_dose_ssd",
            Self::DepthDoseSad => "depth_dose_sad",
            Self::ChamberDefaults => "chamber_defaults",
            Self::EnvironmentalData => "environmental_data",
        }
    }

    pub fn schema(self) -> &'static TableSchema {
        // Every variant has an entry in SCHEMAS.
        &SCHEMAS[self.as_str()]
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("Unsupported dataset type '{0}'")]
pub struct UnknownDatasetType(pub String);

impl FromStr for DatasetType {
    type Err = UnknownDatasetType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == trimmed)
            .ok_or_else(|| UnknownDatasetType(s.to_string()))
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column constraints a dataset of a given type must satisfy.
#[derive(Debug)]
pub struct TableSchema {
    pub required_columns: &'static [&'static str],
    pub numeric_columns: &'static [&'static str],
    /// Column whose parsed values must be strictly positive, with the label used in messages.
    pub positive_column: (&'static str, &'static str),
}

static SCHEMAS: phf::Map<&'static str, TableSchema> = phf_map! {
    "beam_quality_table" => TableSchema {
        required_columns: &["chamber_type", "beam_quality", "value"],
        numeric_columns: &["beam_quality", "value"],
        positive_column: ("value", "Beam-quality correction"),
    },
    "depth_dose_ssd" => TableSchema {
        required_columns: &["energy", "field_size", "depth", "value"],
        numeric_columns: &["energy", "field_size", "depth", "value"],
        positive_column: ("value", "Depth-table"),
    },
    "depth_dose_sad" => TableSchema {
        required_columns: &["energy", "field_size", "depth", "value"],
        numeric_columns: &["energy", "field_size", "depth", "value"],
        positive_column: ("value", "Depth-table"),
    },
    "chamber_defaults" => TableSchema {
        required_columns: &["chamber_type", "calibration_constant", "cavity_radius", "reference_polarity"],
        numeric_columns: &["calibration_constant", "cavity_radius"],
        positive_column: ("calibration_constant", "calibration_constant"),
    },
    "environmental_data" => TableSchema {
        required_columns: &["location", "temperature_c", "pressure_kpa"],
        numeric_columns: &["temperature_c", "pressure_kpa"],
        positive_column: ("pressure_kpa", "pressure_kpa"),
    },
};

#[derive(Debug, Error)]
pub enum TableError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("CSV parsing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("Failed to encode table as CSV: {0}")]
    Encode(String),
}

/// A tabular payload: a header row plus string cells, as read from CSV.
///
/// Cells are kept verbatim; numeric interpretation happens per column at validation and
/// lookup time so unparsable cells can be reported or skipped rather than rejected on read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let headers = headers.into_iter().map(|h| h.trim().to_string()).collect();
        Self { headers, rows }
    }

    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self, TableError> {
        Self::read_csv(bytes, "<memory>")
    }

    pub fn from_path(path: &Path) -> Result<Self, TableError> {
        let bytes = std::fs::read(path).map_err(|e| TableError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::read_csv(&bytes, &path.to_string_lossy())
    }

    fn read_csv(bytes: &[u8], origin: &str) -> Result<Self, TableError> {
        let csv_error = |source: csv::Error| TableError::Csv {
            path: origin.to_string(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(bytes);

        let headers = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self::new(headers, rows))
    }

    /// Canonical CSV encoding of the table. The registry hashes and stores these bytes.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, TableError> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .map_err(|e| TableError::Encode(e.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| TableError::Encode(e.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|e| TableError::Encode(e.to_string()))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |values| Record {
            table: self,
            values,
        })
    }
}

/// A borrowed row of a [`Table`] with by-name cell access.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    table: &'a Table,
    values: &'a [String],
}

impl<'a> Record<'a> {
    /// Trimmed cell text, or `None` if the column is absent or the row is short.
    pub fn text(&self, column: &str) -> Option<&'a str> {
        let index = self.table.column_index(column)?;
        self.values.get(index).map(|v| v.trim())
    }

    /// Cell parsed as a finite number; blank or unparsable cells yield `None`.
    pub fn number(&self, column: &str) -> Option<f64> {
        parse_number(self.text(column)?)
    }
}

pub fn parse_number(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// A reason an uploaded table does not satisfy its dataset type's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingColumns(Vec<&'static str>),
    NonNumeric(&'static str),
    NonPositive(&'static str),
    Empty,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingColumns(columns) => {
                write!(f, "Missing required columns: {}", columns.join(", "))
            }
            Self::NonNumeric(column) => write!(f, "Column '{}' contains non-numeric values", column),
            Self::NonPositive(label) => write!(f, "{} values must be > 0", label),
            Self::Empty => f.write_str("Dataset cannot be empty"),
        }
    }
}

/// Checks a table against the schema of `dataset_type`.
///
/// Missing columns short-circuit the remaining checks. Otherwise every numeric column is
/// checked for unparsable cells, the type's positivity constraint is applied to the cells that
/// did parse, and an empty table is reported last.
pub fn validate_table(dataset_type: DatasetType, table: &Table) -> Vec<ValidationIssue> {
    let schema = dataset_type.schema();

    let missing: Vec<&'static str> = schema
        .required_columns
        .iter()
        .copied()
        .filter(|column| !table.has_column(column))
        .collect();
    if !missing.is_empty() {
        return vec![ValidationIssue::MissingColumns(missing)];
    }

    let mut issues = Vec::new();
    for &column in schema.numeric_columns {
        if table.records().any(|record| record.number(column).is_none()) {
            issues.push(ValidationIssue::NonNumeric(column));
        }
    }

    let (positive_column, label) = schema.positive_column;
    if table
        .records()
        .filter_map(|record| record.number(positive_column))
        .any(|value| value <= 0.0)
    {
        issues.push(ValidationIssue::NonPositive(label));
    }

    if table.is_empty() {
        issues.push(ValidationIssue::Empty);
    }

    issues
}

/// Read access to the currently active table of each dataset type.
///
/// Lookups and environment resolution depend on this seam rather than on the registry so they
/// can run against in-memory tables.
pub trait TableSource {
    type Error;

    fn active_table(&self, dataset_type: DatasetType) -> Result<Option<Table>, Self::Error>;
}
