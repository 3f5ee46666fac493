use crate::utils::progress::Spinner;
use crate::weather::WeatherClient;
use dosecal::engine::config::{AmbientSource, PressureTemperatureParams};
use dosecal::engine::{
    CalculationInputs, DatasetEnvironment, EnvironmentError, EnvironmentProvider,
    EnvironmentReading, Factor, FixedEnvironment,
};
use dosecal::storage::{DatasetRegistry, EnvironmentSettings, EnvironmentSource};
use tracing::{info, warn};

/// The environment provider chosen from the stored settings for one calculation.
pub enum ResolvedEnvironment<'a> {
    Fixed(FixedEnvironment),
    Dataset(DatasetEnvironment<'a, DatasetRegistry<'a>>),
    Unavailable(String),
}

impl EnvironmentProvider for ResolvedEnvironment<'_> {
    fn current_conditions(&self) -> Result<EnvironmentReading, EnvironmentError> {
        match self {
            Self::Fixed(provider) => provider.current_conditions(),
            Self::Dataset(provider) => provider.current_conditions(),
            Self::Unavailable(reason) => Err(EnvironmentError::Unavailable(reason.clone())),
        }
    }
}

/// Whether the calculation will ask the environment provider for ambient conditions.
pub fn needs_environment(inputs: &CalculationInputs) -> bool {
    matches!(
        inputs.pressure_temperature,
        Factor::Computed(PressureTemperatureParams {
            ambient: AmbientSource::Environment,
            ..
        })
    )
}

/// Builds the provider for `settings`.
///
/// The live weather lookup of the `auto` source only runs when `needed` is set. A failed lookup
/// is not an error here; the calculation fails when it asks for the conditions.
pub async fn resolve<'a>(
    datasets: &'a DatasetRegistry<'a>,
    settings: &EnvironmentSettings,
    needed: bool,
) -> ResolvedEnvironment<'a> {
    let location = Some(settings.dataset_location.as_str()).filter(|l| !l.trim().is_empty());
    match settings.source {
        EnvironmentSource::Manual => ResolvedEnvironment::Fixed(FixedEnvironment::new(
            settings.manual_temperature_c,
            settings.manual_pressure_kpa,
        )),
        EnvironmentSource::Dataset => {
            ResolvedEnvironment::Dataset(DatasetEnvironment::new(datasets, location))
        }
        EnvironmentSource::Auto if !needed => ResolvedEnvironment::Unavailable(
            "live environmental data was not requested".to_string(),
        ),
        EnvironmentSource::Auto => fetch_live(location).await,
    }
}

async fn fetch_live<'a>(location: Option<&str>) -> ResolvedEnvironment<'a> {
    let spinner = Spinner::start("Fetching live weather data...");
    let result = match WeatherClient::new() {
        Ok(client) => client.current_conditions(location).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(reading) => {
            spinner.succeed(format!(
                "{}: {:.1} °C, {:.2} kPa",
                reading.location.as_deref().unwrap_or("Current location"),
                reading.temperature_c,
                reading.pressure_kpa
            ));
            info!("Using live environmental conditions.");
            ResolvedEnvironment::Fixed(FixedEnvironment::from_reading(reading))
        }
        Err(e) => {
            spinner.fail("Live weather lookup failed.");
            warn!("Live weather lookup failed: {}", e);
            ResolvedEnvironment::Unavailable(format!(
                "Live environmental data is unavailable ({}). Measure ambient conditions or change the environment source.",
                e
            ))
        }
    }
}
