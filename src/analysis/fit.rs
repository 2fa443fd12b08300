//! Chi-squared linear regression with constant measurement sigma
//!
//! Straight-line fit `y = a + b*x` per Numerical Recipes 15.2, for series
//! whose points share one known measurement uncertainty. The goodness-of-fit
//! probability `q` is the chi-squared survival function, evaluated through
//! the regularized incomplete gamma function (series expansion below
//! `a + 1`, modified Lentz continued fraction above).

use crate::{Error, Result};

const MAX_ITERATIONS: usize = 200;
const EPS: f64 = 3.0e-12;
const FPMIN: f64 = 1.0e-300;

/// A straight-line fit `y = a + b*x` with parameter standard errors and
/// goodness-of-fit statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    /// Intercept.
    pub a: f64,
    /// Standard error of the intercept.
    pub sig_a: f64,
    /// Slope.
    pub b: f64,
    /// Standard error of the slope.
    pub sig_b: f64,
    /// Chi-squared statistic.
    pub chi2: f64,
    /// Probability that chi-squared exceeds the observed value by chance;
    /// 1.0 for an exact two-point fit (zero degrees of freedom).
    pub q: f64,
    /// Degrees of freedom, `n - 2`.
    pub nu: usize,
}

/// Fit `y = a + b*x` to points sharing the measurement uncertainty `sigma`.
///
/// # Errors
///
/// Returns [`Error::InsufficientData`] for fewer than two points or a
/// degenerate abscissa (all `x` identical), and [`Error::Propagation`] for
/// a non-positive `sigma` or mismatched series lengths.
pub fn chi2_fit(x: &[f64], y: &[f64], sigma: f64) -> Result<LinearFit> {
    if x.len() != y.len() {
        return Err(Error::Propagation(format!(
            "series lengths differ: {} x values, {} y values",
            x.len(),
            y.len()
        )));
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(Error::Propagation(format!(
            "measurement sigma must be positive, got {sigma}"
        )));
    }
    if x.len() < 2 {
        return Err(Error::InsufficientData(format!(
            "regression requires at least 2 points, got {}",
            x.len()
        )));
    }

    // Numerical Recipes 15.2.4 sums with constant sigma.
    let n = x.len() as f64;
    let var = sigma * sigma;
    let s = n / var;
    let sx: f64 = x.iter().map(|xi| xi / var).sum();
    let sy: f64 = y.iter().map(|yi| yi / var).sum();
    let sxx: f64 = x.iter().map(|xi| xi * xi / var).sum();
    let sxy: f64 = x.iter().zip(y).map(|(xi, yi)| xi * yi / var).sum();

    // Cauchy-Schwarz: delta >= 0, zero exactly when all x coincide.
    let delta = s * sxx - sx * sx;
    if delta <= f64::EPSILON * s * sxx {
        return Err(Error::InsufficientData(
            "regression requires at least two distinct x values".to_string(),
        ));
    }

    let a = (sxx * sy - sx * sxy) / delta;
    let b = (s * sxy - sx * sy) / delta;
    let sig_a = (sxx / delta).sqrt();
    let sig_b = (s / delta).sqrt();
    let chi2: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| {
            let r = (yi - a - b * xi) / sigma;
            r * r
        })
        .sum();
    let nu = x.len() - 2;
    let q = if nu == 0 {
        1.0
    } else {
        gamma_q(0.5 * nu as f64, 0.5 * chi2)?
    };

    Ok(LinearFit {
        a,
        sig_a,
        b,
        sig_b,
        chi2,
        q,
        nu,
    })
}

/// Regularized upper incomplete gamma function `Q(a, x)`.
///
/// # Errors
///
/// Returns [`Error::Propagation`] for invalid arguments or if the expansion
/// fails to converge.
pub fn gamma_q(a: f64, x: f64) -> Result<f64> {
    if a <= 0.0 || x < 0.0 {
        return Err(Error::Propagation(format!(
            "gamma_q requires a > 0 and x >= 0, got a = {a}, x = {x}"
        )));
    }
    if x == 0.0 {
        return Ok(1.0);
    }
    if x < a + 1.0 {
        Ok(1.0 - gamma_p_series(a, x)?)
    } else {
        gamma_q_continued_fraction(a, x)
    }
}

/// Series expansion of `P(a, x)`, convergent for `x < a + 1`.
fn gamma_p_series(a: f64, x: f64) -> Result<f64> {
    let mut ap = a;
    let mut sum = 1.0 / a;
    let mut del = sum;
    for _ in 0..MAX_ITERATIONS {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * EPS {
            return Ok(sum * (-x + a * x.ln() - ln_gamma(a)).exp());
        }
    }
    Err(Error::Propagation(format!(
        "incomplete gamma series failed to converge for a = {a}, x = {x}"
    )))
}

/// Modified Lentz continued fraction for `Q(a, x)`, convergent for
/// `x >= a + 1`.
fn gamma_q_continued_fraction(a: f64, x: f64) -> Result<f64> {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / FPMIN;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=MAX_ITERATIONS {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an.mul_add(d, b);
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = b + an / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            return Ok((-x + a * x.ln() - ln_gamma(a)).exp() * h);
        }
    }
    Err(Error::Propagation(format!(
        "incomplete gamma continued fraction failed to converge for a = {a}, x = {x}"
    )))
}

/// Lanczos approximation of `ln(Gamma(x))` for `x > 0`.
fn ln_gamma(x: f64) -> f64 {
    const COF: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000_000_000_190_015;
    for c in COF {
        y += 1.0;
        ser += c / y;
    }
    -tmp + (2.506_628_274_631_000_5 * ser / x).ln()
}
