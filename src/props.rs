//! Thermophysical properties of water and humid air
//!
//! Pure correlation functions over a validated [`FilmState`]: the combination
//! of pressure `p` in Pa, temperature `t` in K, and water-vapor mole fraction
//! `x1`. Every function here is deterministic and side-effect free; identical
//! inputs always yield identical outputs. Out-of-range inputs are rejected at
//! [`FilmState`] construction (or by [`saturation_pressure`] for raw
//! temperatures) with [`Error::Domain`] naming the violated bound.
//!
//! Correlation sources:
//! - Latent heat of vaporization: cubic fit to IAPWS-95 saturation data over
//!   0-100 C, within 0.01% of the tabulated values across the range.
//! - Saturation pressure: Buck (1996) over liquid water, within 0.05% of
//!   Wexler over 0-100 C.
//! - Mixture heat capacity and density: ideal-gas mixing of vapor and dry
//!   air with cubic molar-cp polynomials (Reid, Prausnitz & Poling), within
//!   1% of tabulated humid-air data near ambient conditions.
//! - Binary species diffusivity: Mills & Coimbra, *Mass Transfer* 3rd ed.

use crate::{Error, Result};

/// Molecular weight of H2O (species 1) in kg/kmol.
pub const M1: f64 = 18.015;

/// Molecular weight of dry air (species 2) in kg/kmol.
pub const M2: f64 = 28.964;

/// Lower bound of the correlation validity range in K (0 C).
pub const T_MIN: f64 = 273.15;

/// Upper bound of the correlation validity range in K (100 C).
pub const T_MAX: f64 = 373.15;

/// Universal gas constant in J/(kmol K).
const R_BAR: f64 = 8_314.462_618;

/// Latent-heat cubic coefficients, t in C, h in J/kg. Fit to IAPWS-95
/// saturation anchors at 0, 26.85, 50, and 100 C.
const H_FG_COEFFS: [f64; 4] = [2_500_938.0, -2_377.476_043, 0.599_781_296, -0.012_717_209];

/// The humid-air/vapor mixture state at an evaporating interface.
///
/// Invalid states are unrepresentable: both constructors validate the
/// physical range, so the correlation functions below take `&FilmState` and
/// cannot fail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilmState {
    pressure: f64,
    temperature: f64,
    vapor_mole_fraction: f64,
}

impl FilmState {
    /// Create a film state from pressure in Pa, temperature in K, and vapor
    /// mole fraction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Domain`] if pressure is not positive, temperature is
    /// outside [`T_MIN`]..=[`T_MAX`], or the mole fraction is outside [0, 1].
    pub fn new(pressure: f64, temperature: f64, vapor_mole_fraction: f64) -> Result<Self> {
        if !pressure.is_finite() || pressure <= 0.0 {
            return Err(Error::Domain(format!(
                "pressure must be positive, got {pressure} Pa"
            )));
        }
        check_temperature(temperature)?;
        if !(0.0..=1.0).contains(&vapor_mole_fraction) {
            return Err(Error::Domain(format!(
                "vapor mole fraction must be within [0, 1], got {vapor_mole_fraction}"
            )));
        }
        Ok(Self {
            pressure,
            temperature,
            vapor_mole_fraction,
        })
    }

    /// Create a film state from a dew-point reading, deriving the vapor mole
    /// fraction as `p_sat(t_dp) / p`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Domain`] if either temperature is out of range, the
    /// dew point exceeds the dry-bulb temperature, or the implied vapor
    /// partial pressure exceeds the total pressure.
    pub fn from_dew_point(pressure: f64, temperature: f64, dew_point: f64) -> Result<Self> {
        check_temperature(temperature)?;
        if dew_point > temperature {
            return Err(Error::Domain(format!(
                "dew point {dew_point} K exceeds dry-bulb temperature {temperature} K"
            )));
        }
        let x_1 = saturation_pressure(dew_point)? / pressure;
        Self::new(pressure, temperature, x_1)
    }

    /// Create a saturated film state (100% relative humidity) at the given
    /// pressure and temperature, as found at an evaporating liquid surface.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Domain`] on out-of-range pressure or temperature.
    pub fn saturated(pressure: f64, temperature: f64) -> Result<Self> {
        let x_1 = saturation_pressure(temperature)? / pressure;
        Self::new(pressure, temperature, x_1)
    }

    /// Total pressure in Pa.
    #[must_use]
    pub const fn pressure(&self) -> f64 {
        self.pressure
    }

    /// Dry-bulb temperature in K.
    #[must_use]
    pub const fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Water-vapor mole fraction.
    #[must_use]
    pub const fn vapor_mole_fraction(&self) -> f64 {
        self.vapor_mole_fraction
    }
}

/// Saturation vapor pressure over liquid water in Pa (Buck 1996).
///
/// # Errors
///
/// Returns [`Error::Domain`] if `temperature` is outside
/// [`T_MIN`]..=[`T_MAX`].
pub fn saturation_pressure(temperature: f64) -> Result<f64> {
    let t = check_temperature(temperature)? - 273.15;
    Ok(611.21 * ((18.678 - t / 234.5) * (t / (257.14 + t))).exp())
}

/// Specific enthalpy of vaporization of water in J/kg at the film
/// temperature.
///
/// Monotonically decreasing over the valid range: 2 500 938 J/kg at
/// 273.15 K down to 2 256 471 J/kg at 373.15 K.
#[must_use]
pub fn latent_heat(state: &FilmState) -> f64 {
    let t = state.temperature - 273.15;
    let [c0, c1, c2, c3] = H_FG_COEFFS;
    c0 + t * (c1 + t * (c2 + t * c3))
}

/// Mole-fraction-weighted molar mass of the mixture in kg/kmol.
#[must_use]
pub fn mixture_molar_mass(state: &FilmState) -> f64 {
    let x_1 = state.vapor_mole_fraction;
    x_1 * M1 + (1.0 - x_1) * M2
}

/// Water-vapor mass fraction `m1` of the mixture.
#[must_use]
pub fn vapor_mass_fraction(state: &FilmState) -> f64 {
    let x_1 = state.vapor_mole_fraction;
    x_1 * M1 / (x_1 * M1 + (1.0 - x_1) * M2)
}

/// Specific heat of the vapor mixture in J/(kg K).
///
/// Mass-fraction-weighted ideal-gas mixture; component molar cp from cubic
/// polynomials in temperature.
#[must_use]
pub fn mixture_specific_heat(state: &FilmState) -> f64 {
    let t = state.temperature;
    // Molar cp in J/(mol K), converted to J/(kg K) by the molar mass in
    // kg/mol.
    let c_pv = (32.24 + 1.924e-3 * t + 1.055e-5 * t * t - 3.596e-9 * t.powi(3)) / (M1 * 1e-3);
    let c_pa = (28.11 + 1.967e-3 * t + 4.802e-6 * t * t - 1.966e-9 * t.powi(3)) / (M2 * 1e-3);
    let m_1 = vapor_mass_fraction(state);
    m_1 * c_pv + (1.0 - m_1) * c_pa
}

/// Specific mass of the vapor mixture in kg/m^3 (ideal-gas mixture).
#[must_use]
pub fn mixture_density(state: &FilmState) -> f64 {
    state.pressure * mixture_molar_mass(state) / (R_BAR * state.temperature)
}

/// Binary species diffusivity of water vapor in air in m^2/s
/// (Mills & Coimbra).
#[must_use]
pub fn diffusivity(state: &FilmState) -> f64 {
    let p_norm = state.pressure / 101_325.0;
    1.97e-5 * (1.0 / p_norm) * (state.temperature / 256.0).powf(1.685)
}

fn check_temperature(temperature: f64) -> Result<f64> {
    if !temperature.is_finite() || !(T_MIN..=T_MAX).contains(&temperature) {
        return Err(Error::Domain(format!(
            "temperature must be within [{T_MIN}, {T_MAX}] K, got {temperature} K"
        )));
    }
    Ok(temperature)
}
