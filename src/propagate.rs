//! First-order (linearized) measurement-uncertainty propagation
//!
//! Every derived quantity in the crate routes through this module instead of
//! hand-rolling uncertainty math, so the error model stays uniform and
//! auditable. The output variance is the quadratic form of the Jacobian row
//! vector against the input covariance matrix; independent inputs reduce it
//! to the familiar root-sum-square of `(df/dx_i * u_i)`.
//!
//! Partial derivatives come from one of two places:
//! - [`propagate`] / [`propagate_correlated`] estimate them by central finite
//!   differences with step `h_i = cbrt(eps) * |x_i|` (falling back to
//!   `cbrt(eps)` at `x_i = 0`); the truncation error is O(h^2), small against
//!   any realistic instrument uncertainty but nonzero — callers needing an
//!   exact Jacobian use the analytic form.
//! - [`propagate_analytic`] takes caller-supplied exact partials.

use crate::{Error, Result};

/// A measured value with its standard uncertainty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    value: f64,
    std_uncertainty: f64,
}

impl Measurement {
    /// Create a measurement from a nominal value and standard uncertainty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Propagation`] if either input is non-finite or the
    /// uncertainty is negative.
    pub fn new(value: f64, std_uncertainty: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(Error::Propagation(format!(
                "nominal value must be finite, got {value}"
            )));
        }
        if !std_uncertainty.is_finite() || std_uncertainty < 0.0 {
            return Err(Error::Propagation(format!(
                "standard uncertainty must be finite and non-negative, got {std_uncertainty}"
            )));
        }
        Ok(Self {
            value,
            std_uncertainty,
        })
    }

    /// An exactly-known value (zero uncertainty).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Propagation`] if the value is non-finite.
    pub fn exact(value: f64) -> Result<Self> {
        Self::new(value, 0.0)
    }

    /// Nominal value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Standard uncertainty.
    #[must_use]
    pub const fn std_uncertainty(&self) -> f64 {
        self.std_uncertainty
    }
}

/// Input covariance matrix for correlated measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct Covariance {
    n: usize,
    elements: Vec<f64>,
}

impl Covariance {
    /// Build an `n x n` covariance matrix from row-major elements.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Propagation`] if the element count is not `n * n`,
    /// the matrix is not symmetric, or any diagonal element is negative.
    pub fn new(n: usize, elements: Vec<f64>) -> Result<Self> {
        if elements.len() != n * n {
            return Err(Error::Propagation(format!(
                "covariance must have {} elements for {n} inputs, got {}",
                n * n,
                elements.len()
            )));
        }
        for i in 0..n {
            if elements[i * n + i] < 0.0 {
                return Err(Error::Propagation(format!(
                    "covariance diagonal element {i} is negative"
                )));
            }
            for j in (i + 1)..n {
                let upper = elements[i * n + j];
                let lower = elements[j * n + i];
                if (upper - lower).abs() > 1e-12 * upper.abs().max(lower.abs()).max(1.0) {
                    return Err(Error::Propagation(format!(
                        "covariance is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }
        Ok(Self { n, elements })
    }

    /// Diagonal covariance of independent inputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Propagation`] if any variance is negative.
    pub fn independent(variances: &[f64]) -> Result<Self> {
        let n = variances.len();
        let mut elements = vec![0.0; n * n];
        for (i, &var) in variances.iter().enumerate() {
            elements[i * n + i] = var;
        }
        Self::new(n, elements)
    }

    fn at(&self, i: usize, j: usize) -> f64 {
        self.elements[i * self.n + j]
    }
}

/// Propagate independent measurements through `f` using a central
/// finite-difference Jacobian.
///
/// # Errors
///
/// Returns [`Error::Propagation`] if `f` fails or returns a non-finite value
/// at or near the operating point (the Jacobian cannot be evaluated), or
/// propagates any error from `f` itself.
pub fn propagate<F>(f: F, inputs: &[Measurement]) -> Result<Measurement>
where
    F: Fn(&[f64]) -> Result<f64>,
{
    let variances: Vec<f64> = inputs
        .iter()
        .map(|m| m.std_uncertainty * m.std_uncertainty)
        .collect();
    propagate_correlated(f, inputs, &Covariance::independent(&variances)?)
}

/// Propagate correlated measurements through `f` against a full covariance
/// matrix using a central finite-difference Jacobian.
///
/// # Errors
///
/// Returns [`Error::Propagation`] on a covariance/input length mismatch, or
/// if the Jacobian cannot be evaluated (see [`propagate`]).
pub fn propagate_correlated<F>(
    f: F,
    inputs: &[Measurement],
    covariance: &Covariance,
) -> Result<Measurement>
where
    F: Fn(&[f64]) -> Result<f64>,
{
    if covariance.n != inputs.len() {
        return Err(Error::Propagation(format!(
            "covariance is for {} inputs but {} were supplied",
            covariance.n,
            inputs.len()
        )));
    }
    let x: Vec<f64> = inputs.iter().map(|m| m.value).collect();
    let nominal = eval(&f, &x)?;
    let jacobian = central_jacobian(&f, &x)?;
    quadratic_form(nominal, &jacobian, covariance)
}

/// Propagate with caller-supplied exact partial derivatives, one per input.
///
/// No truncation error: use this when a closed-form Jacobian exists.
///
/// # Errors
///
/// Returns [`Error::Propagation`] on a Jacobian/input length mismatch or a
/// non-finite nominal value or partial derivative.
pub fn propagate_analytic(
    nominal: f64,
    jacobian: &[f64],
    inputs: &[Measurement],
) -> Result<Measurement> {
    if jacobian.len() != inputs.len() {
        return Err(Error::Propagation(format!(
            "jacobian has {} entries but {} inputs were supplied",
            jacobian.len(),
            inputs.len()
        )));
    }
    if !nominal.is_finite() {
        return Err(Error::Propagation(format!(
            "nominal value must be finite, got {nominal}"
        )));
    }
    let variances: Vec<f64> = inputs
        .iter()
        .map(|m| m.std_uncertainty * m.std_uncertainty)
        .collect();
    quadratic_form(nominal, jacobian, &Covariance::independent(&variances)?)
}

fn eval<F>(f: &F, x: &[f64]) -> Result<f64>
where
    F: Fn(&[f64]) -> Result<f64>,
{
    let y = f(x)?;
    if !y.is_finite() {
        return Err(Error::Propagation(format!(
            "function returned a non-finite value ({y}) at the operating point"
        )));
    }
    Ok(y)
}

fn central_jacobian<F>(f: &F, x: &[f64]) -> Result<Vec<f64>>
where
    F: Fn(&[f64]) -> Result<f64>,
{
    let step_scale = f64::EPSILON.cbrt();
    let mut jacobian = Vec::with_capacity(x.len());
    let mut probe = x.to_vec();
    for i in 0..x.len() {
        // Step scales with the operating point so small-magnitude inputs
        // (a 1e-7 kg/s mass rate) keep an accurate derivative.
        let h = if x[i] == 0.0 {
            step_scale
        } else {
            step_scale * x[i].abs()
        };
        probe[i] = x[i] + h;
        let ahead = eval(f, &probe);
        probe[i] = x[i] - h;
        let behind = eval(f, &probe);
        probe[i] = x[i];
        let (ahead, behind) = match (ahead, behind) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                return Err(Error::Propagation(format!(
                    "jacobian could not be evaluated for input {i}: {e}"
                )))
            }
        };
        let derivative = (ahead - behind) / (2.0 * h);
        if !derivative.is_finite() {
            return Err(Error::Propagation(format!(
                "partial derivative for input {i} is not finite"
            )));
        }
        jacobian.push(derivative);
    }
    Ok(jacobian)
}

fn quadratic_form(nominal: f64, jacobian: &[f64], covariance: &Covariance) -> Result<Measurement> {
    let mut variance = 0.0;
    for i in 0..jacobian.len() {
        for j in 0..jacobian.len() {
            variance += jacobian[i] * covariance.at(i, j) * jacobian[j];
        }
    }
    // Negative values only arise from rounding in a near-singular quadratic
    // form; clamp before the square root.
    Measurement::new(nominal, variance.max(0.0).sqrt())
}
