use crate::error::{CliError, Result};
use dosecal::core::units::hpa_to_kpa;
use dosecal::engine::EnvironmentReading;
use phf::phf_set;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const IP_GEO_ENDPOINT: &str = "https://ipapi.co/json/";
const GEOCODE_ENDPOINT: &str = "https://geocoding-api.open-meteo.com/v1/search";
const FORECAST_ENDPOINT: &str = "https://api.open-meteo.com/v1/forecast";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("dosecal-cli/", env!("CARGO_PKG_VERSION"));

/// Geocoding results in these countries are preferred over the provider's first hit.
static PREFERRED_COUNTRY_CODES: phf::Set<&'static str> = phf_set! {
    "DZ", "AO", "BJ", "BW", "BF", "BI", "CM", "CV", "CF", "TD", "KM", "CG", "CD", "DJ",
    "EG", "GQ", "ER", "SZ", "ET", "GA", "GM", "GH", "GN", "GW", "CI", "KE", "LS", "LR",
    "LY", "MG", "MW", "ML", "MR", "MU", "MA", "MZ", "NA", "NE", "NG", "RW", "ST", "SN",
    "SC", "SL", "SO", "ZA", "SS", "SD", "TZ", "TG", "TN", "UG", "ZM", "ZW",
};

#[derive(Deserialize, Debug, Default)]
struct IpLocation {
    latitude: Option<f64>,
    longitude: Option<f64>,
    city: Option<String>,
    region: Option<String>,
    country_name: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize, Debug, Default, Clone)]
struct GeocodeResult {
    name: Option<String>,
    admin1: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
struct ForecastResponse {
    current: Option<CurrentConditions>,
}

#[derive(Deserialize, Debug, Default)]
struct CurrentConditions {
    temperature_2m: Option<f64>,
    surface_pressure: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
struct Coordinates {
    label: String,
    latitude: f64,
    longitude: f64,
}

fn label_from_parts(parts: [Option<&str>; 3], fallback: &str) -> String {
    let parts: Vec<&str> = parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        fallback.to_string()
    } else {
        parts.join(", ")
    }
}

impl IpLocation {
    fn into_coordinates(self) -> Result<Coordinates> {
        let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) else {
            return Err(CliError::Data(
                "Could not determine latitude/longitude from IP geolocation provider.".to_string(),
            ));
        };
        Ok(Coordinates {
            label: label_from_parts(
                [
                    self.city.as_deref(),
                    self.region.as_deref(),
                    self.country_name.as_deref(),
                ],
                "Unknown Location",
            ),
            latitude,
            longitude,
        })
    }
}

impl GeocodeResponse {
    fn select(self, query: &str) -> Result<Coordinates> {
        let preferred = self.results.iter().find(|result| {
            result
                .country_code
                .as_deref()
                .is_some_and(|code| PREFERRED_COUNTRY_CODES.contains(code.to_uppercase().as_str()))
        });
        let selected = preferred
            .or_else(|| self.results.first())
            .ok_or_else(|| CliError::Data(format!("No geocoding results for '{}'.", query)))?;

        let (Some(latitude), Some(longitude)) = (selected.latitude, selected.longitude) else {
            return Err(CliError::Data(
                "Geocoding result missing latitude/longitude.".to_string(),
            ));
        };
        Ok(Coordinates {
            label: label_from_parts(
                [
                    selected.name.as_deref(),
                    selected.admin1.as_deref(),
                    selected.country.as_deref(),
                ],
                query,
            ),
            latitude,
            longitude,
        })
    }
}

impl ForecastResponse {
    /// Temperature in °C and surface pressure converted from hPa to kPa.
    fn conditions(self) -> Result<(f64, f64)> {
        let current = self.current.unwrap_or_default();
        match (current.temperature_2m, current.surface_pressure) {
            (Some(temperature_c), Some(pressure_hpa)) => Ok((temperature_c, hpa_to_kpa(pressure_hpa))),
            _ => Err(CliError::Data(
                "Weather provider did not return temperature and surface pressure.".to_string(),
            )),
        }
    }
}

/// Fetches live ambient conditions for the current or a named location.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
}

impl WeatherClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Geocodes `preferred_location` when given, otherwise locates the machine by its public IP,
    /// then reads the current temperature and surface pressure there.
    pub async fn current_conditions(
        &self,
        preferred_location: Option<&str>,
    ) -> Result<EnvironmentReading> {
        let coordinates = match preferred_location.map(str::trim).filter(|l| !l.is_empty()) {
            Some(location) => self.geocode(location).await?,
            None => self.locate_by_ip().await?,
        };
        debug!(
            location = %coordinates.label,
            latitude = coordinates.latitude,
            longitude = coordinates.longitude,
            "Resolved coordinates for live weather."
        );

        let (temperature_c, pressure_kpa) = self
            .get_json::<ForecastResponse>(
                FORECAST_ENDPOINT,
                &[
                    ("latitude", coordinates.latitude.to_string()),
                    ("longitude", coordinates.longitude.to_string()),
                    ("current", "temperature_2m,surface_pressure".to_string()),
                    ("timezone", "auto".to_string()),
                ],
            )
            .await?
            .conditions()?;

        info!(
            location = %coordinates.label,
            temperature_c,
            pressure_kpa,
            "Fetched live environmental conditions."
        );
        Ok(EnvironmentReading {
            temperature_c,
            pressure_kpa,
            location: Some(coordinates.label),
        })
    }

    async fn locate_by_ip(&self) -> Result<Coordinates> {
        self.get_json::<IpLocation>(IP_GEO_ENDPOINT, &[])
            .await?
            .into_coordinates()
    }

    async fn geocode(&self, query: &str) -> Result<Coordinates> {
        self.get_json::<GeocodeResponse>(
            GEOCODE_ENDPOINT,
            &[
                ("name", query.to_string()),
                ("count", "10".to_string()),
                ("language", "en".to_string()),
                ("format", "json".to_string()),
            ],
        )
        .await?
        .select(query)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!("Sending request to {}", url);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_location_builds_label_from_available_parts() {
        let location: IpLocation = serde_json::from_str(
            r#"{"latitude": -17.83, "longitude": 31.05, "city": "Harare", "region": "", "country_name": "Zimbabwe"}"#,
        )
        .unwrap();
        let coordinates = location.into_coordinates().unwrap();
        assert_eq!(coordinates.label, "Harare, Zimbabwe");
        assert_eq!(coordinates.latitude, -17.83);
    }

    #[test]
    fn ip_location_without_coordinates_is_an_error() {
        let location: IpLocation = serde_json::from_str(r#"{"city": "Harare"}"#).unwrap();
        assert!(matches!(location.into_coordinates(), Err(CliError::Data(_))));
    }

    #[test]
    fn geocoding_prefers_results_in_preferred_countries() {
        let response: GeocodeResponse = serde_json::from_str(
            r#"{"results": [
                {"name": "Victoria", "admin1": "British Columbia", "country": "Canada", "country_code": "CA", "latitude": 48.4, "longitude": -123.4},
                {"name": "Victoria", "admin1": "Mahe", "country": "Seychelles", "country_code": "sc", "latitude": -4.6, "longitude": 55.5}
            ]}"#,
        )
        .unwrap();
        let coordinates = response.select("Victoria").unwrap();
        assert_eq!(coordinates.label, "Victoria, Mahe, Seychelles");
        assert_eq!(coordinates.longitude, 55.5);
    }

    #[test]
    fn geocoding_falls_back_to_first_result() {
        let response: GeocodeResponse = serde_json::from_str(
            r#"{"results": [{"name": "Oslo", "country": "Norway", "country_code": "NO", "latitude": 59.9, "longitude": 10.7}]}"#,
        )
        .unwrap();
        assert_eq!(response.select("Oslo").unwrap().label, "Oslo, Norway");
    }

    #[test]
    fn geocoding_without_results_is_an_error() {
        let response: GeocodeResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(response.select("Atlantis"), Err(CliError::Data(msg)) if msg.contains("Atlantis")));
    }

    #[test]
    fn forecast_pressure_is_converted_to_kpa() {
        let response: ForecastResponse = serde_json::from_str(
            r#"{"current": {"time": "2025-01-01T10:00", "temperature_2m": 23.4, "surface_pressure": 859.2}}"#,
        )
        .unwrap();
        let (temperature_c, pressure_kpa) = response.conditions().unwrap();
        assert_eq!(temperature_c, 23.4);
        assert!((pressure_kpa - 85.92).abs() < 1e-9);
    }

    #[test]
    fn forecast_without_pressure_is_an_error() {
        let response: ForecastResponse =
            serde_json::from_str(r#"{"current": {"temperature_2m": 23.4}}"#).unwrap();
        assert!(response.conditions().is_err());
    }
}
