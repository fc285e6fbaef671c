//! Standard-normal CDF and inverse-CDF approximations.
//!
//! RULE: This is the only place the approximations live. The Vasicek
//! transformer (and anything else needing Φ or Φ⁻¹) imports from here —
//! never a local copy.
//!
//! Error bounds:
//!   * `norm_cdf`     — Zelen & Severo polynomial, |err| < 7.5e-8
//!   * `norm_inv_cdf` — Acklam rational approximation, |rel err| < 1.15e-9
//!
//! The two are consistent inverses: `norm_cdf(norm_inv_cdf(p))` recovers
//! `p` to better than 1e-6 over the interior of (0, 1).

use crate::error::{EclError, EclResult};

const SQRT_2PI: f64 = 2.506628274631000502;

fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / SQRT_2PI
}

/// Standard normal CDF Φ(x) (Abramowitz & Stegun 26.2.17).
pub fn norm_cdf(x: f64) -> f64 {
    const P:  f64 = 0.2316419;
    const B1: f64 = 0.319381530;
    const B2: f64 = -0.356563782;
    const B3: f64 = 1.781477937;
    const B4: f64 = -1.821255978;
    const B5: f64 = 1.330274429;

    let abs_x = x.abs();
    let t = 1.0 / (1.0 + P * abs_x);
    let poly = t * (B1 + t * (B2 + t * (B3 + t * (B4 + t * B5))));
    let tail = norm_pdf(abs_x) * poly;

    if x >= 0.0 { 1.0 - tail } else { tail }
}

/// Inverse standard normal CDF Φ⁻¹(p) (Acklam's rational approximation).
///
/// Fails with a domain error for p ≤ 0 or p ≥ 1 (NaN included).
pub fn norm_inv_cdf(p: f64) -> EclResult<f64> {
    if !(p > 0.0 && p < 1.0) {
        return Err(EclError::Domain { p });
    }

    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];

    const P_LOW:  f64 = 0.02425;
    const P_HIGH: f64 = 1.0 - P_LOW;

    let z = if p < P_LOW {
        // Lower tail
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= P_HIGH {
        // Central region
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        // Upper tail, by symmetry
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -((((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0))
    };

    Ok(z)
}
