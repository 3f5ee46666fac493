use crate::core::tables::{DatasetType, Record, TableSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error as StdError;
use thiserror::Error;
use tracing::debug;

/// Location preferred when no location is configured.
pub const DEFAULT_LOCATION: &str = "Harare, Zimbabwe";

/// Resolved ambient conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReading {
    pub temperature_c: f64,
    pub pressure_kpa: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("{0}")]
    Unavailable(String),

    #[error("Location '{location}' not found in the active environmental dataset. Available: {}", .available.join(", "))]
    LocationNotFound {
        location: String,
        available: Vec<String>,
    },

    #[error("Failed to read environmental dataset: {0}")]
    Source(#[source] Box<dyn StdError + Send + Sync>),
}

/// Supplies ambient temperature and pressure for the pressure-temperature correction.
pub trait EnvironmentProvider {
    fn current_conditions(&self) -> Result<EnvironmentReading, EnvironmentError>;
}

/// Always returns the same reading, e.g. manually entered conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedEnvironment {
    reading: EnvironmentReading,
}

impl FixedEnvironment {
    pub fn new(temperature_c: f64, pressure_kpa: f64) -> Self {
        Self {
            reading: EnvironmentReading {
                temperature_c,
                pressure_kpa,
                location: None,
            },
        }
    }

    pub fn from_reading(reading: EnvironmentReading) -> Self {
        Self { reading }
    }
}

impl EnvironmentProvider for FixedEnvironment {
    fn current_conditions(&self) -> Result<EnvironmentReading, EnvironmentError> {
        Ok(self.reading.clone())
    }
}

/// Provider for callers that have no source of ambient conditions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnvironment;

impl EnvironmentProvider for NoEnvironment {
    fn current_conditions(&self) -> Result<EnvironmentReading, EnvironmentError> {
        Err(EnvironmentError::Unavailable(
            "no environment source is configured".to_string(),
        ))
    }
}

/// Reads conditions for a location from the active environmental dataset.
///
/// A requested location is matched case-insensitively first, then after normalising
/// punctuation and spacing, then as a substring of a normalised location. Without a requested
/// location the [`DEFAULT_LOCATION`] row is used when present, otherwise the first row.
pub struct DatasetEnvironment<'a, S> {
    source: &'a S,
    location: Option<String>,
}

impl<'a, S> DatasetEnvironment<'a, S>
where
    S: TableSource,
    S::Error: StdError + Send + Sync + 'static,
{
    pub fn new(source: &'a S, location: Option<&str>) -> Self {
        Self {
            source,
            location: location
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        }
    }

    fn rows(&self) -> Result<Vec<LocationRow>, EnvironmentError> {
        let table = self
            .source
            .active_table(DatasetType::EnvironmentalData)
            .map_err(|e| EnvironmentError::Source(Box::new(e)))?
            .ok_or_else(|| {
                EnvironmentError::Unavailable(
                    "no active environmental dataset is available".to_string(),
                )
            })?;
        let rows: Vec<LocationRow> = table.records().filter_map(LocationRow::from_record).collect();
        if rows.is_empty() {
            return Err(EnvironmentError::Unavailable(
                "the active environmental dataset has no usable rows".to_string(),
            ));
        }
        Ok(rows)
    }
}

impl<S> EnvironmentProvider for DatasetEnvironment<'_, S>
where
    S: TableSource,
    S::Error: StdError + Send + Sync + 'static,
{
    fn current_conditions(&self) -> Result<EnvironmentReading, EnvironmentError> {
        let rows = self.rows()?;
        let selected = match &self.location {
            Some(location) => match_location(&rows, location).ok_or_else(|| {
                EnvironmentError::LocationNotFound {
                    location: location.clone(),
                    available: unique_locations(&rows).into_iter().take(12).collect(),
                }
            })?,
            None => {
                let default = normalize_location(DEFAULT_LOCATION);
                rows.iter()
                    .find(|row| row.normalized == default)
                    .unwrap_or(&rows[0])
            }
        };
        debug!(location = %selected.name, "Resolved environmental conditions from dataset.");
        Ok(EnvironmentReading {
            temperature_c: selected.temperature_c,
            pressure_kpa: selected.pressure_kpa,
            location: Some(selected.name.clone()),
        })
    }
}

/// Unique locations of the active environmental dataset, sorted case-insensitively with
/// [`DEFAULT_LOCATION`] first when present.
pub fn list_environment_locations<S: TableSource>(source: &S) -> Result<Vec<String>, S::Error> {
    let Some(table) = source.active_table(DatasetType::EnvironmentalData)? else {
        return Ok(Vec::new());
    };
    let rows: Vec<LocationRow> = table.records().filter_map(LocationRow::from_record).collect();
    Ok(unique_locations(&rows))
}

struct LocationRow {
    name: String,
    normalized: String,
    temperature_c: f64,
    pressure_kpa: f64,
}

impl LocationRow {
    fn from_record(record: Record<'_>) -> Option<Self> {
        let name = record.text("location").filter(|n| !n.is_empty())?;
        Some(Self {
            name: name.to_string(),
            normalized: normalize_location(name),
            temperature_c: record.number("temperature_c")?,
            pressure_kpa: record.number("pressure_kpa")?,
        })
    }
}

/// Lowercases and collapses every run of non-alphanumeric characters into a single space.
fn normalize_location(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn match_location<'r>(rows: &'r [LocationRow], location: &str) -> Option<&'r LocationRow> {
    let wanted = location.to_lowercase();
    let normalized = normalize_location(location);
    rows.iter()
        .find(|row| row.name.to_lowercase() == wanted)
        .or_else(|| rows.iter().find(|row| row.normalized == normalized))
        .or_else(|| {
            rows.iter()
                .find(|row| row.normalized.contains(normalized.as_str()))
        })
}

fn unique_locations(rows: &[LocationRow]) -> Vec<String> {
    let unique: BTreeSet<&str> = rows.iter().map(|row| row.name.as_str()).collect();
    let mut names: Vec<&str> = unique.into_iter().collect();
    names.sort_by_key(|name| name.to_lowercase());

    let default = normalize_location(DEFAULT_LOCATION);
    if let Some(position) = names.iter().position(|name| normalize_location(name) == default) {
        let preferred = names.remove(position);
        names.insert(0, preferred);
    }
    names.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tables::Table;
    use std::convert::Infallible;

    struct InMemory(Option<Table>);

    impl TableSource for InMemory {
        type Error = Infallible;

        fn active_table(&self, dataset_type: DatasetType) -> Result<Option<Table>, Infallible> {
            assert_eq!(dataset_type, DatasetType::EnvironmentalData);
            Ok(self.0.clone())
        }
    }

    fn source() -> InMemory {
        let csv = "location,temperature_c,pressure_kpa\n\
                   \"Lusaka, Zambia\",24.1,87.6\n\
                   \"Harare, Zimbabwe\",21.5,85.9\n\
                   \"Cape Town, South Africa\",18.2,101.2\n\
                   bulawayo,22.0,86.3\n";
        InMemory(Some(Table::from_csv_bytes(csv.as_bytes()).unwrap()))
    }

    fn conditions(source: &InMemory, location: Option<&str>) -> EnvironmentReading {
        DatasetEnvironment::new(source, location)
            .current_conditions()
            .unwrap()
    }

    #[test]
    fn fixed_environment_returns_its_reading() {
        let reading = FixedEnvironment::new(20.6, 98.18).current_conditions().unwrap();
        assert_eq!(reading.temperature_c, 20.6);
        assert_eq!(reading.pressure_kpa, 98.18);
    }

    #[test]
    fn no_environment_is_unavailable() {
        assert!(matches!(
            NoEnvironment.current_conditions(),
            Err(EnvironmentError::Unavailable(_))
        ));
    }

    #[test]
    fn default_location_is_used_when_none_requested() {
        let reading = conditions(&source(), None);
        assert_eq!(reading.location.as_deref(), Some("Harare, Zimbabwe"));
        assert_eq!(reading.pressure_kpa, 85.9);
    }

    #[test]
    fn location_matching_is_case_insensitive_then_normalized_then_partial() {
        let source = source();
        assert_eq!(
            conditions(&source, Some("LUSAKA, ZAMBIA")).location.as_deref(),
            Some("Lusaka, Zambia")
        );
        assert_eq!(
            conditions(&source, Some("cape-town south   africa")).location.as_deref(),
            Some("Cape Town, South Africa")
        );
        assert_eq!(
            conditions(&source, Some("Cape Town")).location.as_deref(),
            Some("Cape Town, South Africa")
        );
    }

    #[test]
    fn unknown_location_lists_available_locations() {
        let err = DatasetEnvironment::new(&source(), Some("Nairobi"))
            .current_conditions()
            .unwrap_err();
        match err {
            EnvironmentError::LocationNotFound { available, .. } => {
                assert_eq!(available[0], "Harare, Zimbabwe");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_dataset_is_unavailable() {
        let err = DatasetEnvironment::new(&InMemory(None), None)
            .current_conditions()
            .unwrap_err();
        assert!(matches!(err, EnvironmentError::Unavailable(_)));
    }

    #[test]
    fn locations_are_sorted_with_default_first() {
        let locations = list_environment_locations(&source()).unwrap();
        assert_eq!(
            locations,
            vec![
                "Harare, Zimbabwe",
                "bulawayo",
                "Cape Town, South Africa",
                "Lusaka, Zambia"
            ]
        );
    }
}
