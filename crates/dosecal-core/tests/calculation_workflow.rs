use dosecal::core::interpolation::DepthQuery;
use dosecal::core::tables::{DatasetType, Table};
use dosecal::core::units::{BeamType, ChargeUnit, GeometryMode};
use dosecal::engine::config::{AmbientSource, PressureTemperatureParams, TwoVoltageReadings};
use dosecal::engine::{
    CalculationError, CalculationInputs, Calculator, DatasetEnvironment, Factor,
};
use dosecal::storage::{NewFormula, RecordStatus, Store};
use dosecal::workflows::bootstrap;
use std::collections::BTreeMap;
use std::fs;
use tempfile::tempdir;

const CHAMBERS: &str = "chamber_type,calibration_constant,cavity_radius,reference_polarity\n\
                        FC65-G,5.233e7,0.31,positive\n\
                        NE2571,4.5e7,0.32,positive\n";
const BEAM_QUALITY: &str = "chamber_type,beam_quality,value\n\
                            FC65-G,0.60,0.990\n\
                            FC65-G,0.70,0.980\n\
                            NE2571,0.60,0.992\n\
                            NE2571,0.70,0.982\n";
const DEPTH_DOSE_SSD: &str = "energy,field_size,depth,value\n\
                              6,10,5,86.9\n\
                              6,10,10,67.0\n";
const ENVIRONMENT: &str = "location,temperature_c,pressure_kpa\n\
                           \"Harare, Zimbabwe\",20.6,98.18\n\
                           \"Lusaka, Zambia\",24.1,87.6\n";

fn prepared_store() -> (Store, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let seed = dir.path().join("seed");
    fs::create_dir_all(&seed).unwrap();
    fs::write(seed.join("chamber_defaults.csv"), CHAMBERS).unwrap();
    fs::write(seed.join("beam_quality_table.csv"), BEAM_QUALITY).unwrap();
    fs::write(seed.join("environmental_data.csv"), ENVIRONMENT).unwrap();

    let store = Store::open(&dir.path().join("dosecal.db")).unwrap();
    let report = bootstrap::initialize(&store, Some(&seed)).unwrap();
    assert_eq!(report.datasets_imported.len(), 3);
    assert_eq!(report.formulas_created.len(), 2);
    (store, dir)
}

fn photon_inputs() -> CalculationInputs {
    CalculationInputs::builder()
        .beam_type(BeamType::Photon)
        .chamber_type("FC65-G")
        .reading(10.0, ChargeUnit::Nanocoulomb)
        .monitor_units(100.0)
        .geometry(GeometryMode::Ssd)
        .pressure_temperature(Factor::Computed(PressureTemperatureParams::new(
            AmbientSource::Environment,
        )))
        .ion_recombination(Factor::Computed(TwoVoltageReadings {
            m_high: 10.0,
            m_low: 9.95,
            v_high: 300.0,
            v_low: 150.0,
        }))
        .beam_quality(Factor::Computed(0.65))
        .depth_dose(Factor::Computed(DepthQuery {
            depth_cm: 5.0,
            ..DepthQuery::default()
        }))
        .build()
        .unwrap()
}

#[test]
fn bootstrapped_store_calculates_and_records_an_auditable_run() {
    let (store, _dir) = prepared_store();
    let registration = store
        .datasets()
        .register(
            DatasetType::DepthDoseSsd,
            &Table::from_csv_bytes(DEPTH_DOSE_SSD.as_bytes()).unwrap(),
            "physicist",
            Some("Commissioning PDD"),
            false,
        )
        .unwrap();
    assert!(registration.is_valid());
    store.datasets().activate(registration.id).unwrap();

    let datasets = store.datasets();
    let environment = DatasetEnvironment::new(&datasets, None);
    let calculator = Calculator::new(&store, &environment);
    let inputs = photon_inputs();
    let result = calculator.calculate(&inputs).unwrap();

    let p_tp = result.intermediate["P_TP"];
    let p_ion = result.intermediate["P_ion"];
    assert!((p_tp - 1.034145).abs() < 5e-7);
    assert!(p_ion > 1.0);
    let expected = 10.0e-9 * p_tp * p_ion * 5.233e7 * 0.985 * (86.9 / 67.0);
    assert!((result.outputs.dose_per_measurement_gy - expected).abs() < 1e-12);
    assert_eq!(
        result.outputs.dose_per_100mu_gy,
        result.outputs.dose_per_measurement_gy
    );
    assert_eq!(
        result.environment.as_ref().and_then(|e| e.location.as_deref()),
        Some("Harare, Zimbabwe")
    );
    assert_eq!(result.dataset_versions.len(), 4);

    let run = result.to_new_run(&inputs, "physicist", None).unwrap();
    let id = store.runs().record(&run).unwrap();
    let recorded = store.runs().get(id).unwrap().unwrap();
    assert_eq!(recorded.formula_name, "dw_photon_default");
    assert_eq!(recorded.dataset_versions[&DatasetType::DepthDoseSsd], 1);
    assert_eq!(store.runs().list(10).unwrap().len(), 1);
}

#[test]
fn activating_a_new_formula_version_changes_subsequent_results_only() {
    let (store, _dir) = prepared_store();
    let mut inputs = photon_inputs();
    inputs.pressure_temperature = Factor::Manual(1.0);
    inputs.ion_recombination = Factor::Manual(1.0);

    let calculator = Calculator::new(&store, &dosecal::engine::NoEnvironment);
    let before = calculator.calculate(&inputs).unwrap();

    let formulas = store.formulas();
    let created = formulas
        .create(&NewFormula {
            name: "dw_photon_default".to_string(),
            beam_type: BeamType::Photon,
            expression: "M_Q * N_Dw_60Co * k_Q * depth_factor * 0.5".to_string(),
            variables: vec![
                "M_Q".into(),
                "N_Dw_60Co".into(),
                "k_Q".into(),
                "depth_factor".into(),
            ],
            units: BTreeMap::new(),
            notes: Some("Halved for testing".to_string()),
            created_by: "physicist".to_string(),
        })
        .unwrap();
    assert_eq!(created.version, 2);
    formulas.activate(created.id).unwrap();

    let after = calculator.calculate(&inputs).unwrap();
    assert_eq!(after.formula_version, 2);
    assert_eq!(before.formula_version, 1);
    assert!(
        (after.outputs.dose_per_measurement_gy * 2.0 - before.outputs.dose_per_measurement_gy)
            .abs()
            < 1e-12
    );

    let history = formulas.list(Some(BeamType::Photon)).unwrap();
    let statuses: Vec<_> = history.iter().map(|f| (f.version, f.status)).collect();
    assert_eq!(
        statuses,
        vec![(2, RecordStatus::Active), (1, RecordStatus::Inactive)]
    );
}

#[test]
fn invalid_dataset_upload_leaves_the_active_version_in_place() {
    let (store, _dir) = prepared_store();
    let bad = Table::from_csv_bytes(b"chamber_type,beam_quality,value\nFC65-G,0.60,-1\n").unwrap();
    let registration = store
        .datasets()
        .register(DatasetType::BeamQualityTable, &bad, "physicist", None, true)
        .unwrap();
    assert!(!registration.is_valid());
    assert!(store.datasets().activate(registration.id).is_err());

    let (active, _) = store
        .datasets()
        .get_active(DatasetType::BeamQualityTable)
        .unwrap()
        .unwrap();
    assert_eq!(active.version, 1);

    let mut inputs = photon_inputs();
    inputs.pressure_temperature = Factor::Manual(1.0);
    inputs.beam_quality = Factor::Computed(0.75);
    let calculator = Calculator::new(&store, &dosecal::engine::NoEnvironment);
    assert!(matches!(
        calculator.calculate(&inputs),
        Err(CalculationError::Range(_))
    ));
}
