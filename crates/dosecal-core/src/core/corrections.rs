use thiserror::Error;

pub const ZERO_CELSIUS_IN_KELVIN: f64 = 273.15;
pub const REFERENCE_TEMPERATURE_C: f64 = 20.0;
pub const REFERENCE_PRESSURE_KPA: f64 = 101.325;

const RELATIVE_TOLERANCE: f64 = 1e-9;
const DENOMINATOR_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum CorrectionError {
    #[error("Pressure values must be > 0 (measured: {measured} kPa, reference: {reference} kPa)")]
    NonPositivePressure { measured: f64, reference: f64 },

    #[error("Two-voltage inputs must be > 0")]
    NonPositiveTwoVoltageInput,

    #[error("High and low collection voltages cannot be equal ({0} V)")]
    EqualVoltages(f64),

    #[error("Invalid two-voltage readings: denominator is zero")]
    ZeroDenominator,

    #[error("Reference polarity reading must be > 0")]
    NonPositiveReference,
}

#[inline]
fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= RELATIVE_TOLERANCE * a.abs().max(b.abs())
}

/// Pressure-temperature correction `P_TP` for a vented chamber.
///
/// Scales the reading to the reference air density:
/// `((273.15 + t_meas) · p0) / ((273.15 + t0) · p_meas)`.
pub fn pressure_temperature(
    t_meas_c: f64,
    p_meas_kpa: f64,
    t0_c: f64,
    p0_kpa: f64,
) -> Result<f64, CorrectionError> {
    if p_meas_kpa <= 0.0 || p0_kpa <= 0.0 {
        return Err(CorrectionError::NonPositivePressure {
            measured: p_meas_kpa,
            reference: p0_kpa,
        });
    }
    let numerator = (ZERO_CELSIUS_IN_KELVIN + t_meas_c) * p0_kpa;
    let denominator = (ZERO_CELSIUS_IN_KELVIN + t0_c) * p_meas_kpa;
    Ok(numerator / denominator)
}

/// Pressure-temperature correction against the standard reference conditions
/// (20 °C, 101.325 kPa).
#[inline]
pub fn pressure_temperature_at_reference(
    t_meas_c: f64,
    p_meas_kpa: f64,
) -> Result<f64, CorrectionError> {
    pressure_temperature(
        t_meas_c,
        p_meas_kpa,
        REFERENCE_TEMPERATURE_C,
        REFERENCE_PRESSURE_KPA,
    )
}

/// Ion recombination correction `P_ion` from the two-voltage technique.
///
/// The pairs `(v_high, m_high)` and `(v_low, m_low)` may be supplied in either order; they are
/// normalised so the higher voltage is treated as "high" while keeping each reading attached
/// to its own voltage.
pub fn ion_recombination(
    m_high: f64,
    m_low: f64,
    v_high: f64,
    v_low: f64,
) -> Result<f64, CorrectionError> {
    if [m_high, m_low, v_high, v_low].iter().any(|&v| v <= 0.0) {
        return Err(CorrectionError::NonPositiveTwoVoltageInput);
    }
    if is_close(v_high, v_low) {
        return Err(CorrectionError::EqualVoltages(v_high));
    }

    let (m_high, m_low, v_high, v_low) = if v_high < v_low {
        (m_low, m_high, v_low, v_high)
    } else {
        (m_high, m_low, v_high, v_low)
    };

    let voltage_ratio = v_high / v_low;
    let reading_ratio = m_high / m_low;
    let denominator = reading_ratio - voltage_ratio;
    if denominator.abs() <= DENOMINATOR_TOLERANCE {
        return Err(CorrectionError::ZeroDenominator);
    }
    Ok((1.0 - voltage_ratio) / denominator)
}

/// Polarity correction `P_pol`.
///
/// The reference reading is `|m_ref|` when supplied, otherwise `|m_pos|`.
pub fn polarity(m_pos: f64, m_neg: f64, m_ref: Option<f64>) -> Result<f64, CorrectionError> {
    let reference = m_ref.unwrap_or(m_pos).abs();
    if reference <= 0.0 || reference.is_nan() {
        return Err(CorrectionError::NonPositiveReference);
    }
    Ok((m_pos.abs() + m_neg.abs()) / (2.0 * reference))
}
