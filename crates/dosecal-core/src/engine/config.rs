use crate::core::corrections::{REFERENCE_PRESSURE_KPA, REFERENCE_TEMPERATURE_C};
use crate::core::expression::Builtin;
use crate::core::interpolation::DepthQuery;
use crate::core::units::{BeamType, ChargeUnit, GeometryMode};
use phf::phf_set;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Names the calculator binds in every formula scope. Extra constants may not reuse them.
pub static RESERVED_VARIABLES: phf::Set<&'static str> = phf_set! {
    "M_raw_C",
    "M_Q",
    "P_TP",
    "P_ion",
    "P_pol",
    "P_elec",
    "N_Dw_60Co",
    "k_Q",
    "depth_factor",
    "k_ecal",
    "k_R50",
    "P_Q_gr",
    "MU_meas",
};

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for {parameter}: {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: &'static str,
    },

    #[error("Extra constant '{0}' collides with a name bound by the calculator")]
    ReservedVariable(String),
}

/// A correction factor that is either supplied by the caller or computed from parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor<P> {
    Computed(P),
    Manual(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbientSource {
    Measured {
        temperature_c: f64,
        pressure_kpa: f64,
    },
    /// Ask the calculator's environment provider.
    Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureTemperatureParams {
    pub ambient: AmbientSource,
    pub reference_temperature_c: f64,
    pub reference_pressure_kpa: f64,
}

impl PressureTemperatureParams {
    pub fn new(ambient: AmbientSource) -> Self {
        Self {
            ambient,
            reference_temperature_c: REFERENCE_TEMPERATURE_C,
            reference_pressure_kpa: REFERENCE_PRESSURE_KPA,
        }
    }
}

/// Two-voltage readings for the ion recombination correction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwoVoltageReadings {
    pub m_high: f64,
    pub m_low: f64,
    pub v_high: f64,
    pub v_low: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarityReadings {
    pub m_pos: f64,
    pub m_neg: f64,
    pub m_ref: Option<f64>,
}

/// Electron-beam factors that are always caller supplied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElectronFactors {
    pub k_ecal: f64,
    pub k_r50: f64,
    pub p_q_gr: f64,
}

impl Default for ElectronFactors {
    fn default() -> Self {
        Self {
            k_ecal: 1.0,
            k_r50: 1.0,
            p_q_gr: 1.0,
        }
    }
}

/// Validated inputs of one dose calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationInputs {
    pub beam_type: BeamType,
    pub chamber_type: String,
    pub reading: f64,
    pub reading_unit: ChargeUnit,
    pub monitor_units: f64,
    pub geometry: GeometryMode,
    pub pressure_temperature: Factor<PressureTemperatureParams>,
    pub ion_recombination: Factor<TwoVoltageReadings>,
    pub polarity: Factor<PolarityReadings>,
    pub p_elec: f64,
    /// Overrides the chamber-defaults calibration constant when set.
    pub calibration_constant: Option<f64>,
    /// `Computed` carries the beam-quality metric.
    pub beam_quality: Factor<f64>,
    pub depth_dose: Factor<DepthQuery>,
    pub electron: ElectronFactors,
    pub extra_constants: BTreeMap<String, f64>,
}

impl CalculationInputs {
    pub fn builder() -> CalculationInputsBuilder {
        CalculationInputsBuilder::new()
    }
}

#[derive(Default)]
pub struct CalculationInputsBuilder {
    beam_type: Option<BeamType>,
    chamber_type: Option<String>,
    reading: Option<f64>,
    reading_unit: Option<ChargeUnit>,
    monitor_units: Option<f64>,
    geometry: Option<GeometryMode>,
    pressure_temperature: Option<Factor<PressureTemperatureParams>>,
    ion_recombination: Option<Factor<TwoVoltageReadings>>,
    polarity: Option<Factor<PolarityReadings>>,
    p_elec: Option<f64>,
    calibration_constant: Option<f64>,
    beam_quality: Option<Factor<f64>>,
    depth_dose: Option<Factor<DepthQuery>>,
    electron: Option<ElectronFactors>,
    extra_constants: BTreeMap<String, f64>,
}

impl CalculationInputsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beam_type(mut self, beam_type: BeamType) -> Self {
        self.beam_type = Some(beam_type);
        self
    }
    pub fn chamber_type(mut self, chamber_type: impl Into<String>) -> Self {
        self.chamber_type = Some(chamber_type.into());
        self
    }
    pub fn reading(mut self, reading: f64, unit: ChargeUnit) -> Self {
        self.reading = Some(reading);
        self.reading_unit = Some(unit);
        self
    }
    pub fn monitor_units(mut self, monitor_units: f64) -> Self {
        self.monitor_units = Some(monitor_units);
        self
    }
    pub fn geometry(mut self, geometry: GeometryMode) -> Self {
        self.geometry = Some(geometry);
        self
    }
    pub fn pressure_temperature(mut self, factor: Factor<PressureTemperatureParams>) -> Self {
        self.pressure_temperature = Some(factor);
        self
    }
    pub fn ion_recombination(mut self, factor: Factor<TwoVoltageReadings>) -> Self {
        self.ion_recombination = Some(factor);
        self
    }
    pub fn polarity(mut self, factor: Factor<PolarityReadings>) -> Self {
        self.polarity = Some(factor);
        self
    }
    pub fn p_elec(mut self, p_elec: f64) -> Self {
        self.p_elec = Some(p_elec);
        self
    }
    pub fn calibration_constant(mut self, value: f64) -> Self {
        self.calibration_constant = Some(value);
        self
    }
    pub fn beam_quality(mut self, factor: Factor<f64>) -> Self {
        self.beam_quality = Some(factor);
        self
    }
    pub fn depth_dose(mut self, factor: Factor<DepthQuery>) -> Self {
        self.depth_dose = Some(factor);
        self
    }
    pub fn electron(mut self, factors: ElectronFactors) -> Self {
        self.electron = Some(factors);
        self
    }
    pub fn extra_constant(mut self, name: impl Into<String>, value: f64) -> Self {
        self.extra_constants.insert(name.into(), value);
        self
    }

    /// Builds the inputs.
    ///
    /// Reading unit, geometry, `P_elec`, depth conditions and electron factors have defaults.
    /// Polarity defaults to computing from the raw reading for both polarities, which gives a
    /// correction of exactly one.
    pub fn build(self) -> Result<CalculationInputs, ConfigError> {
        let beam_type = self
            .beam_type
            .ok_or(ConfigError::MissingParameter("beam_type"))?;
        let chamber_type = self
            .chamber_type
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(ConfigError::MissingParameter("chamber_type"))?;
        let reading = finite(
            "reading",
            self.reading.ok_or(ConfigError::MissingParameter("reading"))?,
        )?;
        let monitor_units = self
            .monitor_units
            .ok_or(ConfigError::MissingParameter("monitor_units"))?;
        if !(monitor_units.is_finite() && monitor_units > 0.0) {
            return Err(ConfigError::InvalidValue {
                parameter: "monitor_units",
                reason: "must be a finite number > 0",
            });
        }

        let pressure_temperature = self
            .pressure_temperature
            .ok_or(ConfigError::MissingParameter("pressure_temperature"))?;
        check_factor("P_TP", &pressure_temperature)?;
        let ion_recombination = self
            .ion_recombination
            .ok_or(ConfigError::MissingParameter("ion_recombination"))?;
        check_factor("P_ion", &ion_recombination)?;
        let polarity = self.polarity.unwrap_or(Factor::Computed(PolarityReadings {
            m_pos: reading,
            m_neg: reading,
            m_ref: None,
        }));
        check_factor("P_pol", &polarity)?;
        let beam_quality = self
            .beam_quality
            .ok_or(ConfigError::MissingParameter("beam_quality"))?;
        check_factor("k_Q", &beam_quality)?;
        let depth_dose = self
            .depth_dose
            .unwrap_or(Factor::Computed(DepthQuery::default()));
        check_factor("depth_factor", &depth_dose)?;

        if self
            .calibration_constant
            .is_some_and(|constant| !(constant.is_finite() && constant > 0.0))
        {
            return Err(ConfigError::InvalidValue {
                parameter: "calibration_constant",
                reason: "must be a finite number > 0",
            });
        }

        let electron = self.electron.unwrap_or_default();
        let p_elec = finite("P_elec", self.p_elec.unwrap_or(1.0))?;
        finite("k_ecal", electron.k_ecal)?;
        finite("k_R50", electron.k_r50)?;
        finite("P_Q_gr", electron.p_q_gr)?;

        for (name, value) in &self.extra_constants {
            if RESERVED_VARIABLES.contains(name.as_str()) || Builtin::is_builtin(name) {
                return Err(ConfigError::ReservedVariable(name.clone()));
            }
            finite("extra constant", *value)?;
        }

        Ok(CalculationInputs {
            beam_type,
            chamber_type,
            reading,
            reading_unit: self.reading_unit.unwrap_or_default(),
            monitor_units,
            geometry: self.geometry.unwrap_or_default(),
            pressure_temperature,
            ion_recombination,
            polarity,
            p_elec,
            calibration_constant: self.calibration_constant,
            beam_quality,
            depth_dose,
            electron,
            extra_constants: self.extra_constants,
        })
    }
}

fn finite(parameter: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            parameter,
            reason: "must be a finite number",
        })
    }
}

/// Named numeric inputs of a computed factor, checked before any arithmetic runs.
trait FactorParameters {
    fn parameters(&self) -> Vec<(&'static str, f64)>;
}

impl FactorParameters for f64 {
    fn parameters(&self) -> Vec<(&'static str, f64)> {
        vec![("beam_quality", *self)]
    }
}

impl FactorParameters for PressureTemperatureParams {
    fn parameters(&self) -> Vec<(&'static str, f64)> {
        let mut parameters = vec![
            ("reference_temperature_c", self.reference_temperature_c),
            ("reference_pressure_kpa", self.reference_pressure_kpa),
        ];
        if let AmbientSource::Measured {
            temperature_c,
            pressure_kpa,
        } = self.ambient
        {
            parameters.push(("temperature_c", temperature_c));
            parameters.push(("pressure_kpa", pressure_kpa));
        }
        parameters
    }
}

impl FactorParameters for TwoVoltageReadings {
    fn parameters(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("m_high", self.m_high),
            ("m_low", self.m_low),
            ("v_high", self.v_high),
            ("v_low", self.v_low),
        ]
    }
}

impl FactorParameters for PolarityReadings {
    fn parameters(&self) -> Vec<(&'static str, f64)> {
        let mut parameters = vec![("m_pos", self.m_pos), ("m_neg", self.m_neg)];
        parameters.extend(self.m_ref.map(|m_ref| ("m_ref", m_ref)));
        parameters
    }
}

impl FactorParameters for DepthQuery {
    fn parameters(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("depth_cm", self.depth_cm),
            ("reference_depth_cm", self.reference_depth_cm),
            ("energy_mv", self.energy_mv),
            ("field_size_cm", self.field_size_cm),
        ]
    }
}

fn check_factor<P: FactorParameters>(
    parameter: &'static str,
    factor: &Factor<P>,
) -> Result<(), ConfigError> {
    match factor {
        Factor::Manual(value) => finite(parameter, *value).map(|_| ()),
        Factor::Computed(params) => params
            .parameters()
            .into_iter()
            .try_for_each(|(name, value)| finite(name, value).map(|_| ())),
    }
}
