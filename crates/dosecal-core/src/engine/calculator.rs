use super::config::{
    AmbientSource, CalculationInputs, Factor, PolarityReadings, PressureTemperatureParams,
    TwoVoltageReadings,
};
use super::environment::{EnvironmentProvider, EnvironmentReading};
use super::error::{ArithmeticError, CalculationError, MissingConfiguration};
use crate::core::corrections::{self, CorrectionError};
use crate::core::expression;
use crate::core::interpolation::{self, DepthQuery};
use crate::core::tables::DatasetType;
use crate::core::units::{BeamType, GeometryMode};
use crate::storage::{ActiveDatasets, NewRun, Store, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoseOutputs {
    pub dose_per_measurement_gy: f64,
    pub dose_per_100mu_gy: f64,
}

/// Everything needed to audit one calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub beam_type: BeamType,
    pub geometry: GeometryMode,
    pub formula_name: String,
    pub formula_version: u32,
    pub formula_expression: String,
    /// Active version of every dataset type at calculation time.
    pub dataset_versions: BTreeMap<DatasetType, u32>,
    /// Ambient conditions obtained from the environment provider, if it was consulted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentReading>,
    pub intermediate: BTreeMap<String, f64>,
    pub outputs: DoseOutputs,
}

impl CalculationResult {
    /// The audit row for this result. Recording it is left to the caller.
    pub fn to_new_run(
        &self,
        inputs: &CalculationInputs,
        username: &str,
        user_id: Option<i64>,
    ) -> Result<NewRun, StoreError> {
        let encode = |value: serde_json::Result<serde_json::Value>, context: &'static str| {
            value.map_err(|source| StoreError::Json { context, source })
        };
        Ok(NewRun {
            user_id,
            username: username.to_string(),
            beam_type: self.beam_type,
            inputs: encode(serde_json::to_value(inputs), "calculation inputs")?,
            outputs: encode(serde_json::to_value(self.outputs), "calculation outputs")?,
            formula_name: self.formula_name.clone(),
            formula_version: self.formula_version,
            dataset_versions: self.dataset_versions.clone(),
        })
    }

    /// Pretty JSON rendering of the whole result.
    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(self).map_err(|source| StoreError::Json {
            context: "calculation result",
            source,
        })
    }
}

/// The dose-calculation orchestrator.
///
/// Holds no state of its own: every call re-reads the active formula and datasets, so
/// concurrent calculations each see a consistent point-in-time view of the registries.
pub struct Calculator<'a> {
    store: &'a Store,
    environment: &'a dyn EnvironmentProvider,
}

impl<'a> Calculator<'a> {
    pub fn new(store: &'a Store, environment: &'a dyn EnvironmentProvider) -> Self {
        Self { store, environment }
    }

    #[instrument(skip_all, name = "calculate", fields(beam_type = %inputs.beam_type, chamber = %inputs.chamber_type))]
    pub fn calculate(&self, inputs: &CalculationInputs) -> Result<CalculationResult, CalculationError> {
        let datasets = self.store.datasets().active_snapshot()?;

        // === Phase 1: Correct the chamber reading ===
        let m_raw_c = inputs.reading_unit.to_coulomb(inputs.reading);
        let (p_tp, environment) = self.resolve_pressure_temperature(&inputs.pressure_temperature)?;
        let p_ion = resolve_ion_recombination(&inputs.ion_recombination)?;
        let p_pol = resolve_polarity(&inputs.polarity)?;
        let m_q = m_raw_c * p_tp * p_ion * p_pol * inputs.p_elec;
        debug!(m_raw_c, p_tp, p_ion, p_pol, m_q, "Resolved reading corrections.");

        // === Phase 2: Chamber and beam factors ===
        let calibration_constant = match inputs.calibration_constant {
            Some(value) => value,
            None => datasets
                .chamber_defaults(&inputs.chamber_type)
                .map(|defaults| defaults.calibration_constant)
                .filter(|value| *value > 0.0)
                .ok_or_else(|| {
                    MissingConfiguration::CalibrationConstant(inputs.chamber_type.clone())
                })?,
        };
        let k_q = resolve_beam_quality(&datasets, &inputs.chamber_type, &inputs.beam_quality)?;
        let depth_factor = resolve_depth_dose(&datasets, inputs.geometry, &inputs.depth_dose)?;
        debug!(calibration_constant, k_q, depth_factor, "Resolved beam factors.");

        // === Phase 3: Evaluate the active formula ===
        let formula = self
            .store
            .formulas()
            .get_active(inputs.beam_type)?
            .ok_or(MissingConfiguration::Formula(inputs.beam_type))?;

        let intermediate = BTreeMap::from([
            ("M_raw_C".to_string(), m_raw_c),
            ("P_TP".to_string(), p_tp),
            ("P_ion".to_string(), p_ion),
            ("P_pol".to_string(), p_pol),
            ("P_elec".to_string(), inputs.p_elec),
            ("M_Q".to_string(), m_q),
            ("N_Dw_60Co".to_string(), calibration_constant),
            ("k_Q".to_string(), k_q),
            ("depth_factor".to_string(), depth_factor),
        ]);

        let mut scope = intermediate.clone();
        scope.extend([
            ("k_ecal".to_string(), inputs.electron.k_ecal),
            ("k_R50".to_string(), inputs.electron.k_r50),
            ("P_Q_gr".to_string(), inputs.electron.p_q_gr),
            ("MU_meas".to_string(), inputs.monitor_units),
        ]);
        for (name, value) in &inputs.extra_constants {
            scope.entry(name.clone()).or_insert(*value);
        }

        let dose_per_measurement_gy = expression::evaluate(&formula.expression, &scope)?;
        let dose_per_100mu_gy = dose_per_measurement_gy * (100.0 / inputs.monitor_units);

        // === Phase 4: Report the dataset versions of the snapshot ===
        let dataset_versions = datasets.versions();

        info!(
            formula = %formula.name,
            version = formula.version,
            dose_per_measurement_gy,
            dose_per_100mu_gy,
            "Calculation complete."
        );

        Ok(CalculationResult {
            beam_type: inputs.beam_type,
            geometry: inputs.geometry,
            formula_name: formula.name,
            formula_version: formula.version,
            formula_expression: formula.expression,
            dataset_versions,
            environment,
            intermediate,
            outputs: DoseOutputs {
                dose_per_measurement_gy,
                dose_per_100mu_gy,
            },
        })
    }

    fn resolve_pressure_temperature(
        &self,
        factor: &Factor<PressureTemperatureParams>,
    ) -> Result<(f64, Option<EnvironmentReading>), CalculationError> {
        let params = match factor {
            Factor::Manual(value) => return Ok((*value, None)),
            Factor::Computed(params) => params,
        };
        let (temperature_c, pressure_kpa, reading) = match params.ambient {
            AmbientSource::Measured {
                temperature_c,
                pressure_kpa,
            } => (temperature_c, pressure_kpa, None),
            AmbientSource::Environment => {
                let reading = self.environment.current_conditions()?;
                debug!(
                    temperature_c = reading.temperature_c,
                    pressure_kpa = reading.pressure_kpa,
                    location = reading.location.as_deref().unwrap_or("-"),
                    "Using environmental conditions from provider."
                );
                (reading.temperature_c, reading.pressure_kpa, Some(reading))
            }
        };
        let p_tp = corrections::pressure_temperature(
            temperature_c,
            pressure_kpa,
            params.reference_temperature_c,
            params.reference_pressure_kpa,
        )
        .map_err(arithmetic("P_TP"))?;
        Ok((p_tp, reading))
    }
}

fn arithmetic(factor: &'static str) -> impl Fn(CorrectionError) -> CalculationError {
    move |source| CalculationError::Arithmetic(ArithmeticError::Correction { factor, source })
}

fn resolve_ion_recombination(factor: &Factor<TwoVoltageReadings>) -> Result<f64, CalculationError> {
    match factor {
        Factor::Manual(value) => Ok(*value),
        Factor::Computed(r) => corrections::ion_recombination(r.m_high, r.m_low, r.v_high, r.v_low)
            .map_err(arithmetic("P_ion")),
    }
}

fn resolve_polarity(factor: &Factor<PolarityReadings>) -> Result<f64, CalculationError> {
    match factor {
        Factor::Manual(value) => Ok(*value),
        Factor::Computed(r) => {
            corrections::polarity(r.m_pos, r.m_neg, r.m_ref).map_err(arithmetic("P_pol"))
        }
    }
}

fn resolve_beam_quality(
    datasets: &ActiveDatasets,
    chamber_type: &str,
    factor: &Factor<f64>,
) -> Result<f64, CalculationError> {
    // An active table is required even when k_Q is overridden.
    let table = datasets
        .table(DatasetType::BeamQualityTable)
        .ok_or(MissingConfiguration::Dataset(DatasetType::BeamQualityTable))?;
    match factor {
        Factor::Manual(value) => Ok(*value),
        Factor::Computed(beam_quality) => Ok(interpolation::beam_quality_correction(
            table,
            chamber_type,
            *beam_quality,
        )?),
    }
}

fn resolve_depth_dose(
    datasets: &ActiveDatasets,
    geometry: GeometryMode,
    factor: &Factor<DepthQuery>,
) -> Result<f64, CalculationError> {
    match factor {
        Factor::Manual(value) => Ok(*value),
        Factor::Computed(query) => {
            let table = datasets.table(geometry.depth_dose_dataset());
            Ok(interpolation::depth_dose_factor(table, query)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tables::Table;
    use crate::core::units::ChargeUnit;
    use crate::engine::config::ElectronFactors;
    use crate::engine::environment::{EnvironmentError, FixedEnvironment, NoEnvironment};
    use crate::storage::NewFormula;

    const CHAMBERS: &str = "chamber_type,calibration_constant,cavity_radius,reference_polarity\n\
                            FC65-G,5.233e7,0.31,positive\n";
    const BEAM_QUALITY: &str = "chamber_type,beam_quality,value\n\
                                FC65-G,0.60,0.990\n\
                                FC65-G,0.70,0.980\n\
                                FC65-G,0.80,0.960\n";
    const DEPTH_DOSE: &str = "energy,field_size,depth,value\n\
                              6,10,5,86.9\n\
                              6,10,10,67.0\n\
                              6,10,20,38.3\n";

    fn register(store: &Store, dataset_type: DatasetType, csv: &str) {
        let table = Table::from_csv_bytes(csv.as_bytes()).unwrap();
        let registration = store
            .datasets()
            .register(dataset_type, &table, "tester", None, true)
            .unwrap();
        assert!(registration.is_valid());
    }

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        register(&store, DatasetType::ChamberDefaults, CHAMBERS);
        register(&store, DatasetType::BeamQualityTable, BEAM_QUALITY);
        store.formulas().seed_defaults().unwrap();
        store
    }

    fn photon_inputs() -> CalculationInputs {
        CalculationInputs::builder()
            .beam_type(BeamType::Photon)
            .chamber_type("FC65-G")
            .reading(10.0, ChargeUnit::Nanocoulomb)
            .monitor_units(200.0)
            .pressure_temperature(Factor::Manual(1.0))
            .ion_recombination(Factor::Manual(1.0))
            .beam_quality(Factor::Computed(0.65))
            .build()
            .unwrap()
    }

    #[test]
    fn photon_calculation_combines_all_factors() {
        let store = seeded_store();
        let calculator = Calculator::new(&store, &NoEnvironment);
        let result = calculator.calculate(&photon_inputs()).unwrap();

        // k_Q halfway between 0.990 and 0.980; no depth table so depth_factor is 1.
        let expected = 10.0e-9 * 5.233e7 * 0.985;
        assert!((result.outputs.dose_per_measurement_gy - expected).abs() < 1e-12);
        assert!((result.outputs.dose_per_100mu_gy - expected / 2.0).abs() < 1e-12);
        assert_eq!(result.intermediate["depth_factor"], 1.0);
        assert_eq!(result.formula_name, "dw_photon_default");
        assert_eq!(
            result.dataset_versions,
            BTreeMap::from([
                (DatasetType::BeamQualityTable, 1),
                (DatasetType::ChamberDefaults, 1)
            ])
        );
        assert!(result.environment.is_none());
    }

    #[test]
    fn depth_dose_table_for_geometry_is_used() {
        let store = seeded_store();
        register(&store, DatasetType::DepthDoseSsd, DEPTH_DOSE);
        let calculator = Calculator::new(&store, &NoEnvironment);

        let mut inputs = photon_inputs();
        inputs.depth_dose = Factor::Computed(DepthQuery {
            depth_cm: 5.0,
            ..DepthQuery::default()
        });
        let result = calculator.calculate(&inputs).unwrap();
        assert!((result.intermediate["depth_factor"] - 86.9 / 67.0).abs() < 1e-12);

        inputs.geometry = GeometryMode::Sad;
        let result = calculator.calculate(&inputs).unwrap();
        assert_eq!(result.intermediate["depth_factor"], 1.0);
    }

    #[test]
    fn environment_provider_supplies_ambient_conditions() {
        let store = seeded_store();
        let environment = FixedEnvironment::new(20.6, 98.18);
        let calculator = Calculator::new(&store, &environment);

        let mut inputs = photon_inputs();
        inputs.pressure_temperature =
            Factor::Computed(PressureTemperatureParams::new(AmbientSource::Environment));
        let result = calculator.calculate(&inputs).unwrap();

        assert!((result.intermediate["P_TP"] - 1.034145).abs() < 5e-7);
        assert_eq!(result.environment.unwrap().pressure_kpa, 98.18);
    }

    #[test]
    fn unavailable_environment_fails_the_calculation() {
        let store = seeded_store();
        let calculator = Calculator::new(&store, &NoEnvironment);
        let mut inputs = photon_inputs();
        inputs.pressure_temperature =
            Factor::Computed(PressureTemperatureParams::new(AmbientSource::Environment));

        assert!(matches!(
            calculator.calculate(&inputs),
            Err(CalculationError::Environment(EnvironmentError::Unavailable(_)))
        ));
    }

    #[test]
    fn beam_quality_outside_table_is_a_range_error() {
        let store = seeded_store();
        let calculator = Calculator::new(&store, &NoEnvironment);
        let mut inputs = photon_inputs();
        inputs.beam_quality = Factor::Computed(0.85);

        assert!(matches!(
            calculator.calculate(&inputs),
            Err(CalculationError::Range(_))
        ));
    }

    #[test]
    fn beam_quality_requires_an_active_table_even_when_overridden() {
        let store = Store::open_in_memory().unwrap();
        register(&store, DatasetType::ChamberDefaults, CHAMBERS);
        store.formulas().seed_defaults().unwrap();
        let calculator = Calculator::new(&store, &NoEnvironment);

        let mut manual = photon_inputs();
        manual.beam_quality = Factor::Manual(0.99);
        for inputs in [photon_inputs(), manual.clone()] {
            assert!(matches!(
                calculator.calculate(&inputs),
                Err(CalculationError::Configuration(
                    MissingConfiguration::Dataset(DatasetType::BeamQualityTable)
                ))
            ));
        }

        register(&store, DatasetType::BeamQualityTable, BEAM_QUALITY);
        let result = calculator.calculate(&manual).unwrap();
        assert_eq!(result.intermediate["k_Q"], 0.99);
    }

    #[test]
    fn unknown_chamber_without_override_is_a_configuration_error() {
        let store = seeded_store();
        let calculator = Calculator::new(&store, &NoEnvironment);
        let mut inputs = photon_inputs();
        inputs.chamber_type = "NE2571".to_string();

        assert!(matches!(
            calculator.calculate(&inputs),
            Err(CalculationError::Configuration(
                MissingConfiguration::CalibrationConstant(_)
            ))
        ));
    }

    #[test]
    fn missing_active_formula_is_a_configuration_error() {
        let store = Store::open_in_memory().unwrap();
        register(&store, DatasetType::ChamberDefaults, CHAMBERS);
        register(&store, DatasetType::BeamQualityTable, BEAM_QUALITY);
        let calculator = Calculator::new(&store, &NoEnvironment);

        assert!(matches!(
            calculator.calculate(&photon_inputs()),
            Err(CalculationError::Configuration(MissingConfiguration::Formula(
                BeamType::Photon
            )))
        ));
    }

    #[test]
    fn electron_formula_uses_electron_factors_and_extra_constants() {
        let store = seeded_store();
        let formulas = store.formulas();
        let created = formulas
            .create(&NewFormula {
                name: "dw_electron_custom".to_string(),
                beam_type: BeamType::Electron,
                expression: "M_Q * N_Dw_60Co * k_ecal * k_R50 * P_Q_gr * k_TG".to_string(),
                variables: vec![
                    "M_Q".into(),
                    "N_Dw_60Co".into(),
                    "k_ecal".into(),
                    "k_R50".into(),
                    "P_Q_gr".into(),
                    "k_TG".into(),
                ],
                units: BTreeMap::new(),
                notes: None,
                created_by: "tester".to_string(),
            })
            .unwrap();
        formulas.activate(created.id).unwrap();

        let calculator = Calculator::new(&store, &NoEnvironment);
        let mut inputs = photon_inputs();
        inputs.beam_type = BeamType::Electron;
        inputs.beam_quality = Factor::Manual(1.0);
        inputs.electron = ElectronFactors {
            k_ecal: 0.9,
            k_r50: 1.1,
            p_q_gr: 1.0,
        };
        inputs.extra_constants.insert("k_TG".to_string(), 2.0);

        let result = calculator.calculate(&inputs).unwrap();
        let expected = 10.0e-9 * 5.233e7 * 0.9 * 1.1 * 2.0;
        assert!((result.outputs.dose_per_measurement_gy - expected).abs() < 1e-12);
        assert_eq!(result.formula_name, "dw_electron_custom");
    }

    #[test]
    fn invalid_two_voltage_readings_are_arithmetic_errors() {
        let store = seeded_store();
        let calculator = Calculator::new(&store, &NoEnvironment);
        let mut inputs = photon_inputs();
        inputs.ion_recombination = Factor::Computed(TwoVoltageReadings {
            m_high: 2.0,
            m_low: 1.0,
            v_high: 300.0,
            v_low: 150.0,
        });

        assert!(matches!(
            calculator.calculate(&inputs),
            Err(CalculationError::Arithmetic(ArithmeticError::Correction {
                factor: "P_ion",
                ..
            }))
        ));
    }

    #[test]
    fn result_converts_to_audit_row() {
        let store = seeded_store();
        let calculator = Calculator::new(&store, &NoEnvironment);
        let inputs = photon_inputs();
        let result = calculator.calculate(&inputs).unwrap();

        let run = result.to_new_run(&inputs, "alice", Some(3)).unwrap();
        assert_eq!(run.formula_version, result.formula_version);
        assert_eq!(run.inputs["chamber_type"], "FC65-G");
        assert_eq!(
            run.outputs["dose_per_100mu_gy"],
            result.outputs.dose_per_100mu_gy
        );
        store.runs().record(&run).unwrap();
    }
}
