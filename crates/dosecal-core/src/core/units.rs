use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum UnitParseError {
    #[error("Unknown charge unit '{0}'. Expected one of: C, nC, pC")]
    ChargeUnit(String),
    #[error("Unknown beam type '{0}'. Expected 'photon' or 'electron'")]
    BeamType(String),
    #[error("Unknown geometry mode '{0}'. Expected 'SSD' or 'SAD'")]
    GeometryMode(String),
}

/// Unit of a raw electrometer charge reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ChargeUnit {
    #[serde(rename = "C")]
    Coulomb,
    #[default]
    #[serde(rename = "nC")]
    Nanocoulomb,
    #[serde(rename = "pC")]
    Picocoulomb,
}

impl ChargeUnit {
    /// Multiplier that converts a reading in this unit to coulombs.
    #[inline]
    pub const fn scale_to_coulomb(self) -> f64 {
        match self {
            Self::Coulomb => 1.0,
            Self::Nanocoulomb => 1e-9,
            Self::Picocoulomb => 1e-12,
        }
    }

    #[inline]
    pub fn to_coulomb(self, reading: f64) -> f64 {
        reading * self.scale_to_coulomb()
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Coulomb => "C",
            Self::Nanocoulomb => "nC",
            Self::Picocoulomb => "pC",
        }
    }
}

impl FromStr for ChargeUnit {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "C" | "c" => Ok(Self::Coulomb),
            "nC" | "nc" => Ok(Self::Nanocoulomb),
            "pC" | "pc" => Ok(Self::Picocoulomb),
            other => Err(UnitParseError::ChargeUnit(other.to_string())),
        }
    }
}

impl fmt::Display for ChargeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeamType {
    Photon,
    Electron,
}

impl BeamType {
    pub const ALL: [BeamType; 2] = [BeamType::Photon, BeamType::Electron];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Photon => "photon",
            Self::Electron => "electron",
        }
    }
}

impl FromStr for BeamType {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "photon" => Ok(Self::Photon),
            "electron" => Ok(Self::Electron),
            _ => Err(UnitParseError::BeamType(s.to_string())),
        }
    }
}

impl fmt::Display for BeamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measurement geometry, which selects the depth-dose table variant.
///
/// Source-to-surface distance setups use percentage-depth-dose tables, source-to-axis
/// distance setups use tissue-phantom-ratio tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GeometryMode {
    #[default]
    #[serde(rename = "SSD")]
    Ssd,
    #[serde(rename = "SAD")]
    Sad,
}

impl GeometryMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ssd => "SSD",
            Self::Sad => "SAD",
        }
    }
}

impl FromStr for GeometryMode {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SSD" => Ok(Self::Ssd),
            "SAD" => Ok(Self::Sad),
            _ => Err(UnitParseError::GeometryMode(s.to_string())),
        }
    }
}

impl fmt::Display for GeometryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts a hectopascal pressure (as reported by weather providers) to kilopascal.
#[inline]
pub fn hpa_to_kpa(pressure_hpa: f64) -> f64 {
    pressure_hpa / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_units_scale_to_coulomb() {
        assert_eq!(ChargeUnit::Coulomb.to_coulomb(2.0), 2.0);
        assert!((ChargeUnit::Nanocoulomb.to_coulomb(7.674) - 7.674e-9).abs() < 1e-20);
        assert!((ChargeUnit::Picocoulomb.to_coulomb(5.0) - 5e-12).abs() < 1e-24);
    }

    #[test]
    fn charge_unit_parses_symbols() {
        assert_eq!("nC".parse::<ChargeUnit>().unwrap(), ChargeUnit::Nanocoulomb);
        assert_eq!("pC".parse::<ChargeUnit>().unwrap(), ChargeUnit::Picocoulomb);
        assert_eq!("C".parse::<ChargeUnit>().unwrap(), ChargeUnit::Coulomb);
        assert!(matches!(
            "mC".parse::<ChargeUnit>(),
            Err(UnitParseError::ChargeUnit(_))
        ));
    }

    #[test]
    fn beam_type_parsing_is_case_insensitive() {
        assert_eq!("Photon".parse::<BeamType>().unwrap(), BeamType::Photon);
        assert_eq!("ELECTRON".parse::<BeamType>().unwrap(), BeamType::Electron);
        assert!("proton".parse::<BeamType>().is_err());
    }

    #[test]
    fn geometry_mode_round_trips_through_display() {
        for mode in [GeometryMode::Ssd, GeometryMode::Sad] {
            assert_eq!(mode.to_string().parse::<GeometryMode>().unwrap(), mode);
        }
    }

    #[test]
    fn hpa_converts_to_kpa() {
        assert_eq!(hpa_to_kpa(1013.25), 101.325);
    }
}
