use super::tables::{DatasetType, Table};
use super::units::GeometryMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum LookupError {
    #[error("No beam-quality rows found for chamber '{0}'")]
    NoRowsForChamber(String),

    #[error(
        "Beam quality {value} is outside the table range [{min}, {max}]; extrapolation is disabled"
    )]
    BeamQualityOutOfRange { value: f64, min: f64, max: f64 },

    #[error("Depth {value} cm is outside the table range [{min}, {max}]; extrapolation is disabled")]
    DepthOutOfRange { value: f64, min: f64, max: f64 },

    #[error("Reference depth value is zero; cannot compute depth factor")]
    ZeroReferenceValue,
}

impl GeometryMode {
    /// Dataset type holding the depth-dose curves for this geometry.
    pub const fn depth_dose_dataset(self) -> DatasetType {
        match self {
            Self::Ssd => DatasetType::DepthDoseSsd,
            Self::Sad => DatasetType::DepthDoseSad,
        }
    }
}

/// Piecewise-linear interpolation over points sorted by abscissa.
///
/// Returns `None` when `x` lies outside `[first.x, last.x]` or there are no points. With
/// repeated abscissae the first matching point wins.
pub fn interpolate(points: &[(f64, f64)], x: f64) -> Option<f64> {
    let (first, last) = (points.first()?, points.last()?);
    if x < first.0 || x > last.0 {
        return None;
    }

    let upper = points.iter().position(|&(px, _)| px >= x)?;
    let (x1, y1) = points[upper];
    if x1 == x || upper == 0 {
        return Some(y1);
    }
    let (x0, y0) = points[upper - 1];
    Some(y0 + (y1 - y0) * (x - x0) / (x1 - x0))
}

fn sorted_by_abscissa(mut points: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    points
}

/// Beam-quality correction `k_Q` for a chamber at the given beam-quality metric.
///
/// Rows for other chambers and rows whose quality or value do not parse are ignored.
pub fn beam_quality_correction(
    table: &Table,
    chamber_type: &str,
    beam_quality: f64,
) -> Result<f64, LookupError> {
    let chamber_type = chamber_type.trim();
    let points: Vec<(f64, f64)> = table
        .records()
        .filter(|record| record.text("chamber_type") == Some(chamber_type))
        .filter_map(|record| Some((record.number("beam_quality")?, record.number("value")?)))
        .collect();

    if points.is_empty() {
        return Err(LookupError::NoRowsForChamber(chamber_type.to_string()));
    }

    let points = sorted_by_abscissa(points);
    let (min, max) = (points[0].0, points[points.len() - 1].0);
    interpolate(&points, beam_quality).ok_or(LookupError::BeamQualityOutOfRange {
        value: beam_quality,
        min,
        max,
    })
}

/// Measurement conditions for a depth-dose correction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthQuery {
    pub depth_cm: f64,
    pub reference_depth_cm: f64,
    pub energy_mv: f64,
    pub field_size_cm: f64,
}

impl Default for DepthQuery {
    /// 10 cm depth and reference depth, 6 MV, 10 cm field.
    fn default() -> Self {
        Self {
            depth_cm: 10.0,
            reference_depth_cm: 10.0,
            energy_mv: 6.0,
            field_size_cm: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DepthRow {
    energy: f64,
    field_size: f64,
    depth: f64,
    value: f64,
}

/// Nearest candidate to `target`; exact ties resolve to the smaller candidate.
fn nearest(candidates: impl Iterator<Item = f64>, target: f64) -> Option<f64> {
    let mut unique: Vec<f64> = candidates.collect();
    unique.sort_by(f64::total_cmp);
    unique.dedup();
    // `min_by` keeps the first of equal elements, and `unique` is ascending.
    unique
        .into_iter()
        .min_by(|a, b| (a - target).abs().total_cmp(&(b - target).abs()))
}

/// Depth-dose correction: the ratio of the table value at the measurement depth to the value
/// at the reference depth.
///
/// The curve is taken from the nearest energy, then the nearest field size within that
/// energy. With no table, or no usable rows in it, the correction is `1.0`.
pub fn depth_dose_factor(table: Option<&Table>, query: &DepthQuery) -> Result<f64, LookupError> {
    let Some(table) = table else {
        debug!("No active depth-dose table; using neutral depth factor.");
        return Ok(1.0);
    };

    let rows: Vec<DepthRow> = table
        .records()
        .filter_map(|record| {
            Some(DepthRow {
                energy: record.number("energy")?,
                field_size: record.number("field_size")?,
                depth: record.number("depth")?,
                value: record.number("value")?,
            })
        })
        .collect();

    let Some(energy) = nearest(rows.iter().map(|r| r.energy), query.energy_mv) else {
        debug!("Depth-dose table has no usable rows; using neutral depth factor.");
        return Ok(1.0);
    };
    let energy_slice: Vec<&DepthRow> = rows.iter().filter(|r| r.energy == energy).collect();

    let Some(field_size) = nearest(
        energy_slice.iter().map(|r| r.field_size),
        query.field_size_cm,
    ) else {
        return Ok(1.0);
    };

    let curve = sorted_by_abscissa(
        energy_slice
            .iter()
            .filter(|r| r.field_size == field_size)
            .map(|r| (r.depth, r.value))
            .collect(),
    );
    debug!(
        energy,
        field_size,
        points = curve.len(),
        "Selected depth-dose curve."
    );

    let at_depth = interpolate_depth(&curve, query.depth_cm)?;
    let at_reference = interpolate_depth(&curve, query.reference_depth_cm)?;
    if at_reference == 0.0 {
        return Err(LookupError::ZeroReferenceValue);
    }
    Ok(at_depth / at_reference)
}

fn interpolate_depth(curve: &[(f64, f64)], depth: f64) -> Result<f64, LookupError> {
    interpolate(curve, depth).ok_or_else(|| LookupError::DepthOutOfRange {
        value: depth,
        min: curve.first().map_or(f64::NAN, |p| p.0),
        max: curve.last().map_or(f64::NAN, |p| p.0),
    })
}
