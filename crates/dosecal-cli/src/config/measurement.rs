use super::AppConfig;
use crate::cli::CalculateArgs;
use crate::error::{CliError, Result};
use dosecal::core::interpolation::DepthQuery;
use dosecal::core::units::{BeamType, ChargeUnit, GeometryMode};
use dosecal::engine::config::{
    AmbientSource, ElectronFactors, PolarityReadings, PressureTemperatureParams,
    TwoVoltageReadings,
};
use dosecal::engine::{CalculationInputs, Factor};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialPressureTemperature {
    factor: Option<f64>,
    temperature_c: Option<f64>,
    pressure_kpa: Option<f64>,
    reference_temperature_c: Option<f64>,
    reference_pressure_kpa: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialIonRecombination {
    factor: Option<f64>,
    m_high: Option<f64>,
    m_low: Option<f64>,
    v_high: Option<f64>,
    v_low: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialPolarity {
    factor: Option<f64>,
    m_pos: Option<f64>,
    m_neg: Option<f64>,
    m_ref: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialBeamQuality {
    factor: Option<f64>,
    quality: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialDepthDose {
    factor: Option<f64>,
    depth_cm: Option<f64>,
    reference_depth_cm: Option<f64>,
    energy_mv: Option<f64>,
    field_size_cm: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialElectron {
    k_ecal: Option<f64>,
    k_r50: Option<f64>,
    p_q_gr: Option<f64>,
}

/// A measurement file as written by the user. Missing values are filled from the application
/// configuration and the calculation defaults.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PartialMeasurement {
    beam_type: Option<String>,
    chamber_type: Option<String>,
    reading: Option<f64>,
    reading_unit: Option<String>,
    monitor_units: Option<f64>,
    geometry: Option<String>,
    p_elec: Option<f64>,
    calibration_constant: Option<f64>,
    pressure_temperature: Option<PartialPressureTemperature>,
    ion_recombination: Option<PartialIonRecombination>,
    polarity: Option<PartialPolarity>,
    beam_quality: Option<PartialBeamQuality>,
    depth_dose: Option<PartialDepthDose>,
    electron: Option<PartialElectron>,
    constants: Option<BTreeMap<String, f64>>,
}

impl PartialMeasurement {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading measurement from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn merge_with_cli(
        mut self,
        args: &CalculateArgs,
        app: &AppConfig,
    ) -> Result<CalculationInputs> {
        self.apply_set_values(&args.set_values)?;

        let mut builder = CalculationInputs::builder();

        if let Some(beam_type) = &self.beam_type {
            builder = builder.beam_type(parse_named::<BeamType>("beam-type", beam_type)?);
        }
        if let Some(chamber_type) = self.chamber_type.take() {
            builder = builder.chamber_type(chamber_type);
        }
        if let Some(reading) = self.reading {
            let unit = match &self.reading_unit {
                Some(unit) => parse_named::<ChargeUnit>("reading-unit", unit)?,
                None => app.reading_unit,
            };
            builder = builder.reading(reading, unit);
        }
        if let Some(monitor_units) = self.monitor_units {
            builder = builder.monitor_units(monitor_units);
        }
        let geometry = match &self.geometry {
            Some(geometry) => parse_named::<GeometryMode>("geometry", geometry)?,
            None => app.geometry,
        };
        builder = builder.geometry(geometry);
        if let Some(p_elec) = self.p_elec {
            builder = builder.p_elec(p_elec);
        }
        if let Some(constant) = self.calibration_constant {
            builder = builder.calibration_constant(constant);
        }

        builder = builder.pressure_temperature(pressure_temperature_factor(
            self.pressure_temperature.take().unwrap_or_default(),
            app,
        )?);

        if let Some(factor) = ion_recombination_factor(self.ion_recombination.take())? {
            builder = builder.ion_recombination(factor);
        }
        if let Some(factor) = polarity_factor(self.polarity.take())? {
            builder = builder.polarity(factor);
        }
        if let Some(section) = self.beam_quality.take() {
            let factor = manual_or("beam-quality", section.factor, section.quality.is_some())
                .or(section.quality.map(Factor::Computed));
            if let Some(factor) = factor {
                builder = builder.beam_quality(factor);
            }
        }
        if let Some(factor) = depth_dose_factor(self.depth_dose.take()) {
            builder = builder.depth_dose(factor);
        }
        if let Some(section) = self.electron.take() {
            let defaults = ElectronFactors::default();
            builder = builder.electron(ElectronFactors {
                k_ecal: section.k_ecal.unwrap_or(defaults.k_ecal),
                k_r50: section.k_r50.unwrap_or(defaults.k_r50),
                p_q_gr: section.p_q_gr.unwrap_or(defaults.p_q_gr),
            });
        }
        for (name, value) in self.constants.take().unwrap_or_default() {
            builder = builder.extra_constant(name, value);
        }

        Ok(builder.build()?)
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let parts: Vec<_> = kv_pair.splitn(2, '=').collect();
            if parts.len() != 2 {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            }
            let key = parts[0].trim();
            let value_str = parts[1].trim();
            let number = || -> Result<f64> {
                value_str.parse().map_err(|_| {
                    CliError::Config(format!("Invalid float value for {}: {}", key, value_str))
                })
            };

            match key {
                "beam-type" => self.beam_type = Some(value_str.to_string()),
                "chamber-type" => self.chamber_type = Some(value_str.to_string()),
                "reading-unit" => self.reading_unit = Some(value_str.to_string()),
                "geometry" => self.geometry = Some(value_str.to_string()),
                "reading" => self.reading = Some(number()?),
                "monitor-units" => self.monitor_units = Some(number()?),
                "p-elec" => self.p_elec = Some(number()?),
                "calibration-constant" => self.calibration_constant = Some(number()?),
                "pressure-temperature.factor" => {
                    section(&mut self.pressure_temperature).factor = Some(number()?)
                }
                "pressure-temperature.temperature-c" => {
                    section(&mut self.pressure_temperature).temperature_c = Some(number()?)
                }
                "pressure-temperature.pressure-kpa" => {
                    section(&mut self.pressure_temperature).pressure_kpa = Some(number()?)
                }
                "pressure-temperature.reference-temperature-c" => {
                    section(&mut self.pressure_temperature).reference_temperature_c = Some(number()?)
                }
                "pressure-temperature.reference-pressure-kpa" => {
                    section(&mut self.pressure_temperature).reference_pressure_kpa = Some(number()?)
                }
                "ion-recombination.factor" => {
                    section(&mut self.ion_recombination).factor = Some(number()?)
                }
                "ion-recombination.m-high" => {
                    section(&mut self.ion_recombination).m_high = Some(number()?)
                }
                "ion-recombination.m-low" => {
                    section(&mut self.ion_recombination).m_low = Some(number()?)
                }
                "ion-recombination.v-high" => {
                    section(&mut self.ion_recombination).v_high = Some(number()?)
                }
                "ion-recombination.v-low" => {
                    section(&mut self.ion_recombination).v_low = Some(number()?)
                }
                "polarity.factor" => section(&mut self.polarity).factor = Some(number()?),
                "polarity.m-pos" => section(&mut self.polarity).m_pos = Some(number()?),
                "polarity.m-neg" => section(&mut self.polarity).m_neg = Some(number()?),
                "polarity.m-ref" => section(&mut self.polarity).m_ref = Some(number()?),
                "beam-quality.factor" => section(&mut self.beam_quality).factor = Some(number()?),
                "beam-quality.quality" => section(&mut self.beam_quality).quality = Some(number()?),
                "depth-dose.factor" => section(&mut self.depth_dose).factor = Some(number()?),
                "depth-dose.depth-cm" => section(&mut self.depth_dose).depth_cm = Some(number()?),
                "depth-dose.reference-depth-cm" => {
                    section(&mut self.depth_dose).reference_depth_cm = Some(number()?)
                }
                "depth-dose.energy-mv" => section(&mut self.depth_dose).energy_mv = Some(number()?),
                "depth-dose.field-size-cm" => {
                    section(&mut self.depth_dose).field_size_cm = Some(number()?)
                }
                "electron.k-ecal" => section(&mut self.electron).k_ecal = Some(number()?),
                "electron.k-r50" => section(&mut self.electron).k_r50 = Some(number()?),
                "electron.p-q-gr" => section(&mut self.electron).p_q_gr = Some(number()?),
                _ => match key.strip_prefix("constants.") {
                    Some(name) if !name.is_empty() => {
                        let value = number()?;
                        section(&mut self.constants).insert(name.to_string(), value);
                    }
                    _ => {
                        return Err(CliError::Config(format!(
                            "Unsupported configuration key for --set: '{}'",
                            key
                        )));
                    }
                },
            }
        }
        Ok(())
    }
}

fn section<T: Default>(slot: &mut Option<T>) -> &mut T {
    slot.get_or_insert_with(Default::default)
}

fn parse_named<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| CliError::Config(format!("{}: {}", key, e)))
}

/// The manual override of a section, if any. Computed parameters given alongside it are ignored.
fn manual_or<P>(name: &str, factor: Option<f64>, has_parameters: bool) -> Option<Factor<P>> {
    let value = factor?;
    if has_parameters {
        warn!(
            section = name,
            factor = value,
            "Both a manual factor and measurement parameters were given; using the manual factor."
        );
    }
    Some(Factor::Manual(value))
}

/// `Some` when every field is present, `None` when none is, an error when only some are.
fn all_or_none<const N: usize>(
    name: &str,
    fields: [(&'static str, Option<f64>); N],
) -> Result<Option<[f64; N]>> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(key, _)| *key)
        .collect();
    if missing.len() == N {
        return Ok(None);
    }
    if !missing.is_empty() {
        return Err(CliError::Config(format!(
            "[{}] is incomplete, missing: {}",
            name,
            missing.join(", ")
        )));
    }
    Ok(Some(fields.map(|(_, value)| value.unwrap_or_default())))
}

fn pressure_temperature_factor(
    section: PartialPressureTemperature,
    app: &AppConfig,
) -> Result<Factor<PressureTemperatureParams>> {
    let measured = all_or_none(
        "pressure-temperature",
        [
            ("temperature-c", section.temperature_c),
            ("pressure-kpa", section.pressure_kpa),
        ],
    )?;
    if let Some(manual) = manual_or("pressure-temperature", section.factor, measured.is_some()) {
        return Ok(manual);
    }
    let ambient = match measured {
        Some([temperature_c, pressure_kpa]) => AmbientSource::Measured {
            temperature_c,
            pressure_kpa,
        },
        None => AmbientSource::Environment,
    };
    Ok(Factor::Computed(PressureTemperatureParams {
        ambient,
        reference_temperature_c: section
            .reference_temperature_c
            .unwrap_or(app.reference_temperature_c),
        reference_pressure_kpa: section
            .reference_pressure_kpa
            .unwrap_or(app.reference_pressure_kpa),
    }))
}

fn ion_recombination_factor(
    section: Option<PartialIonRecombination>,
) -> Result<Option<Factor<TwoVoltageReadings>>> {
    let Some(section) = section else {
        return Ok(None);
    };
    let readings = all_or_none(
        "ion-recombination",
        [
            ("m-high", section.m_high),
            ("m-low", section.m_low),
            ("v-high", section.v_high),
            ("v-low", section.v_low),
        ],
    )?;
    if let Some(manual) = manual_or("ion-recombination", section.factor, readings.is_some()) {
        return Ok(Some(manual));
    }
    Ok(readings.map(|[m_high, m_low, v_high, v_low]| {
        Factor::Computed(TwoVoltageReadings {
            m_high,
            m_low,
            v_high,
            v_low,
        })
    }))
}

fn polarity_factor(section: Option<PartialPolarity>) -> Result<Option<Factor<PolarityReadings>>> {
    let Some(section) = section else {
        return Ok(None);
    };
    let readings = all_or_none(
        "polarity",
        [("m-pos", section.m_pos), ("m-neg", section.m_neg)],
    )?;
    if let Some(manual) = manual_or("polarity", section.factor, readings.is_some()) {
        return Ok(Some(manual));
    }
    Ok(readings.map(|[m_pos, m_neg]| {
        Factor::Computed(PolarityReadings {
            m_pos,
            m_neg,
            m_ref: section.m_ref,
        })
    }))
}

fn depth_dose_factor(section: Option<PartialDepthDose>) -> Option<Factor<DepthQuery>> {
    let section = section?;
    let has_parameters = section.depth_cm.is_some()
        || section.reference_depth_cm.is_some()
        || section.energy_mv.is_some()
        || section.field_size_cm.is_some();
    if let Some(manual) = manual_or("depth-dose", section.factor, has_parameters) {
        return Some(manual);
    }
    let defaults = DepthQuery::default();
    Some(Factor::Computed(DepthQuery {
        depth_cm: section.depth_cm.unwrap_or(defaults.depth_cm),
        reference_depth_cm: section
            .reference_depth_cm
            .unwrap_or(defaults.reference_depth_cm),
        energy_mv: section.energy_mv.unwrap_or(defaults.energy_mv),
        field_size_cm: section.field_size_cm.unwrap_or(defaults.field_size_cm),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use dosecal::engine::ConfigError;
    use once_cell::sync::Lazy;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| tempdir().expect("Failed to create temp dir"));

    const PHOTON_MEASUREMENT: &str = r#"
        beam-type = "photon"
        chamber-type = "FC65-G"
        reading = 10.0
        monitor-units = 200

        [pressure-temperature]
        temperature-c = 20.6
        pressure-kpa = 98.18

        [ion-recombination]
        m-high = 10.0
        m-low = 9.95
        v-high = 300
        v-low = 150

        [beam-quality]
        quality = 0.68

        [depth-dose]
        depth-cm = 5

        [constants]
        k_TG = 1.02
    "#;

    fn app_config() -> AppConfig {
        AppConfig::with_database(PathBuf::from("dosecal.db"))
    }

    fn write_measurement(name: &str, content: &str) -> PathBuf {
        let file_path = TEST_DIR.path().join(name);
        fs::write(&file_path, content).unwrap();
        file_path
    }

    fn calculate_args(path: &Path, extra: &[&str]) -> CalculateArgs {
        let mut argv = vec![
            "dosecal".to_string(),
            "calculate".to_string(),
            "-i".to_string(),
            path.to_str().unwrap().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        match Cli::parse_from(argv).command {
            Commands::Calculate(args) => args,
            other => panic!("Expected 'calculate' subcommand, got {:?}", other),
        }
    }

    fn merge(name: &str, content: &str, extra: &[&str]) -> Result<CalculationInputs> {
        let path = write_measurement(name, content);
        let args = calculate_args(&path, extra);
        PartialMeasurement::from_file(&path)?.merge_with_cli(&args, &app_config())
    }

    #[test]
    fn measurement_file_maps_to_computed_factors() {
        let inputs = merge("photon.toml", PHOTON_MEASUREMENT, &[]).unwrap();

        assert_eq!(inputs.beam_type, BeamType::Photon);
        assert_eq!(inputs.reading_unit, ChargeUnit::Nanocoulomb);
        assert_eq!(inputs.geometry, GeometryMode::Ssd);
        assert_eq!(
            inputs.pressure_temperature,
            Factor::Computed(PressureTemperatureParams {
                ambient: AmbientSource::Measured {
                    temperature_c: 20.6,
                    pressure_kpa: 98.18
                },
                reference_temperature_c: 20.0,
                reference_pressure_kpa: 101.325,
            })
        );
        assert_eq!(inputs.beam_quality, Factor::Computed(0.68));
        assert_eq!(
            inputs.depth_dose,
            Factor::Computed(DepthQuery {
                depth_cm: 5.0,
                ..DepthQuery::default()
            })
        );
        assert_eq!(inputs.extra_constants["k_TG"], 1.02);
    }

    #[test]
    fn set_values_override_file_values() {
        let inputs = merge(
            "photon_set.toml",
            PHOTON_MEASUREMENT,
            &[
                "-S",
                "reading=12.5",
                "-S",
                "reading-unit=pC",
                "-S",
                "beam-quality.factor=0.99",
                "-S",
                "constants.k_TG=1.5",
            ],
        )
        .unwrap();

        assert_eq!(inputs.reading, 12.5);
        assert_eq!(inputs.reading_unit, ChargeUnit::Picocoulomb);
        assert_eq!(inputs.beam_quality, Factor::Manual(0.99));
        assert_eq!(inputs.extra_constants["k_TG"], 1.5);
    }

    #[test]
    fn missing_ambient_conditions_defer_to_environment() {
        let content = r#"
            beam-type = "electron"
            chamber-type = "FC65-G"
            reading = 8.1
            monitor-units = 100
            [ion-recombination]
            factor = 1.002
            [beam-quality]
            factor = 1.0
            [electron]
            k-ecal = 0.897
        "#;
        let inputs = merge("electron.toml", content, &[]).unwrap();

        assert_eq!(
            inputs.pressure_temperature,
            Factor::Computed(PressureTemperatureParams::new(AmbientSource::Environment))
        );
        assert_eq!(inputs.ion_recombination, Factor::Manual(1.002));
        assert_eq!(inputs.electron.k_ecal, 0.897);
        assert_eq!(inputs.electron.k_r50, 1.0);
    }

    #[test]
    fn incomplete_section_is_a_config_error() {
        let content = PHOTON_MEASUREMENT.replace("v-low = 150", "");
        let result = merge("incomplete.toml", &content, &[]);
        match result {
            Err(CliError::Config(msg)) => assert!(msg.contains("v-low")),
            other => panic!("Expected config error, got {:?}", other),
        }
    }

    #[test]
    fn reserved_constant_name_is_rejected_by_the_builder() {
        let result = merge(
            "reserved.toml",
            PHOTON_MEASUREMENT,
            &["-S", "constants.k_Q=1.0"],
        );
        assert!(matches!(
            result,
            Err(CliError::Inputs(ConfigError::ReservedVariable(name))) if name == "k_Q"
        ));
    }

    #[test]
    fn invalid_set_format_and_unknown_keys_are_rejected() {
        let path = write_measurement("set_errors.toml", PHOTON_MEASUREMENT);
        let mut partial = PartialMeasurement::from_file(&path).unwrap();
        assert!(matches!(
            partial.apply_set_values(&["reading".to_string()]),
            Err(CliError::Config(msg)) if msg.contains("Invalid --set format")
        ));
        assert!(matches!(
            partial.apply_set_values(&["dose=1".to_string()]),
            Err(CliError::Config(msg)) if msg.contains("Unsupported configuration key")
        ));
        assert!(matches!(
            partial.apply_set_values(&["reading=abc".to_string()]),
            Err(CliError::Config(msg)) if msg.contains("Invalid float value")
        ));
    }

    #[test]
    fn unknown_measurement_keys_fail_to_parse() {
        let path = write_measurement("typo.toml", "beam-typ = \"photon\"\n");
        assert!(matches!(
            PartialMeasurement::from_file(&path),
            Err(CliError::FileParsing { .. })
        ));
    }
}
