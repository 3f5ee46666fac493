use dosecal::core::corrections::{REFERENCE_PRESSURE_KPA, REFERENCE_TEMPERATURE_C};
use dosecal::core::units::{ChargeUnit, GeometryMode};

pub struct DefaultsConfig {
    pub database_file_name: &'static str,
    pub username: String,
    pub reading_unit: ChargeUnit,
    pub geometry: GeometryMode,
    pub reference_temperature_c: f64,
    pub reference_pressure_kpa: f64,
    pub history_limit: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_file_name: "dosecal.db",
            username: "local".to_string(),
            reading_unit: ChargeUnit::Nanocoulomb,
            geometry: GeometryMode::Ssd,
            reference_temperature_c: REFERENCE_TEMPERATURE_C,
            reference_pressure_kpa: REFERENCE_PRESSURE_KPA,
            history_limit: 20,
        }
    }
}
