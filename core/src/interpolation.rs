//! PD term-structure interpolation.
//!
//! Expands one through-the-cycle PD into a full periodic curve of marginal
//! and cumulative default probabilities, `periods_per_year × projection
//! cap` buckets per structure. Four selectable methods, one shared by the
//! whole run. Curves are persisted all-or-nothing per structure.

use crate::{
    config::EclConfig,
    error::{EclError, EclResult},
    stage::{PipelineStage, StageOutput},
    store::EclStore,
    types::RunKey,
};
use chrono::{Datelike, Months, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Clamp bound applied to the TTC PD before period adjustment, keeping
/// `(1 - pd)^(1/n)` inside its real domain.
pub const PD_EPSILON: f64 = 1e-9;

/// Independent structures are computed in fixed-size concurrent batches;
/// writes stay sequential, one transaction per structure.
const CURVE_BATCH_SIZE: usize = 16;

// ── Periodicity ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Periodicity {
    Month,
    Quarter,
    HalfYear,
    Year,
}

impl Periodicity {
    pub fn periods_per_year(self) -> u32 {
        match self {
            Periodicity::Month    => 12,
            Periodicity::Quarter  => 4,
            Periodicity::HalfYear => 2,
            Periodicity::Year     => 1,
        }
    }

    pub fn months_per_period(self) -> u32 {
        match self {
            Periodicity::Month    => 1,
            Periodicity::Quarter  => 3,
            Periodicity::HalfYear => 6,
            Periodicity::Year     => 12,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Periodicity::Month    => "M",
            Periodicity::Quarter  => "Q",
            Periodicity::HalfYear => "H",
            Periodicity::Year     => "Y",
        }
    }

    pub fn from_code(code: &str) -> EclResult<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "M" => Ok(Periodicity::Month),
            "Q" => Ok(Periodicity::Quarter),
            "H" => Ok(Periodicity::HalfYear),
            "Y" => Ok(Periodicity::Year),
            other => Err(EclError::computation(format!(
                "unknown periodicity unit '{other}' (expected M, Q, H or Y)"
            ))),
        }
    }
}

// ── Interpolation methods ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMethod {
    Poisson,
    Geometric,
    Arithmetic,
    ExponentialDecay,
}

impl InterpolationMethod {
    /// Parse the configured method name. Unknown names are a
    /// configuration defect.
    pub fn parse(name: &str) -> EclResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "poisson"           => Ok(InterpolationMethod::Poisson),
            "geometric"         => Ok(InterpolationMethod::Geometric),
            "arithmetic"        => Ok(InterpolationMethod::Arithmetic),
            "exponential_decay" => Ok(InterpolationMethod::ExponentialDecay),
            other => Err(EclError::computation(format!(
                "unknown interpolation method '{other}'"
            ))),
        }
    }
}

/// One interpolated bucket before persistence.
#[derive(Debug, Clone)]
pub struct CurvePoint {
    pub bucket:          u32,
    pub projection_year: i32,
    pub marginal_pd:     f64,
    pub cumulative_pd:   f64,
}

fn clamp_pd(pd: f64) -> f64 {
    pd.clamp(PD_EPSILON, 1.0 - PD_EPSILON)
}

/// Annual PD converted to a per-period marginal: `1 - (1-pd)^(1/n)`.
fn period_adjust(pd: f64, periods_per_year: u32) -> f64 {
    1.0 - (1.0 - clamp_pd(pd)).powf(1.0 / f64::from(periods_per_year))
}

fn projection_year(
    calc_date: NaiveDate,
    periodicity: Periodicity,
    bucket: u32,
) -> EclResult<i32> {
    let months = bucket * periodicity.months_per_period();
    calc_date
        .checked_add_months(Months::new(months))
        .map(|d| d.year())
        .ok_or_else(|| {
            EclError::computation(format!(
                "projection date overflow at bucket {bucket} from {calc_date}"
            ))
        })
}

/// Expand one TTC PD into the full curve for a structure.
pub fn build_curve(
    base_pd: f64,
    periodicity: Periodicity,
    method: InterpolationMethod,
    projection_cap_years: u32,
    calc_date: NaiveDate,
) -> EclResult<Vec<CurvePoint>> {
    let ppy = periodicity.periods_per_year();
    let total = ppy * projection_cap_years;
    let mut points = Vec::with_capacity(total as usize);

    match method {
        InterpolationMethod::Poisson => {
            let marginal = period_adjust(base_pd, ppy);
            let mut cumulative = 0.0;
            for bucket in 1..=total {
                cumulative = 1.0 - (1.0 - cumulative) * (1.0 - marginal);
                points.push(CurvePoint {
                    bucket,
                    projection_year: projection_year(calc_date, periodicity, bucket)?,
                    marginal_pd: marginal,
                    cumulative_pd: cumulative,
                });
            }
        }
        InterpolationMethod::Geometric => {
            let marginal = (1.0 + base_pd).powf(1.0 / f64::from(ppy)) - 1.0;
            let mut cumulative = 0.0;
            for bucket in 1..=total {
                cumulative = 1.0 - (1.0 - cumulative) * (1.0 - marginal);
                points.push(CurvePoint {
                    bucket,
                    projection_year: projection_year(calc_date, periodicity, bucket)?,
                    marginal_pd: marginal,
                    cumulative_pd: cumulative,
                });
            }
        }
        InterpolationMethod::Arithmetic => {
            let marginal = base_pd / f64::from(ppy);
            let mut cumulative = 0.0;
            for bucket in 1..=total {
                cumulative = 1.0 - (1.0 - cumulative) * (1.0 - marginal);
                points.push(CurvePoint {
                    bucket,
                    projection_year: projection_year(calc_date, periodicity, bucket)?,
                    marginal_pd: marginal,
                    cumulative_pd: cumulative,
                });
            }
        }
        InterpolationMethod::ExponentialDecay => {
            // Period-adjusted PD applied to a shrinking surviving pool.
            let adjusted = period_adjust(base_pd, ppy);
            let mut remaining = 1.0;
            let mut cumulative = 0.0;
            for bucket in 1..=total {
                let marginal = remaining * adjusted;
                remaining -= marginal;
                cumulative += marginal;
                points.push(CurvePoint {
                    bucket,
                    projection_year: projection_year(calc_date, periodicity, bucket)?,
                    marginal_pd: marginal,
                    cumulative_pd: cumulative.min(1.0),
                });
                if remaining <= 0.0 {
                    break;
                }
            }
        }
    }

    Ok(points)
}

// ── Pipeline stage ───────────────────────────────────────────────────────────

/// Expands every term structure configured for the calculation date.
pub struct PdInterpolationStage;

impl PipelineStage for PdInterpolationStage {
    fn name(&self) -> &'static str {
        "pd_interpolation"
    }

    fn run(
        &self,
        store: &EclStore,
        config: &EclConfig,
        calc_date: NaiveDate,
        _run_key: RunKey,
    ) -> EclResult<StageOutput> {
        let method = InterpolationMethod::parse(&config.interpolation_method)?;
        let structures = store.term_structures_for_date(calc_date)?;
        if structures.is_empty() {
            return Ok(StageOutput::ok("no term structures configured"));
        }

        let mut buckets_written = 0usize;
        for batch in structures.chunks(CURVE_BATCH_SIZE) {
            let curves: Vec<EclResult<Vec<CurvePoint>>> = batch
                .par_iter()
                .map(|s| {
                    build_curve(
                        s.base_pd,
                        s.periodicity,
                        method,
                        config.projection_cap_years,
                        calc_date,
                    )
                })
                .collect();

            for (structure, curve) in batch.iter().zip(curves) {
                let points = curve?;
                store.replace_curve(
                    &structure.structure_id,
                    calc_date,
                    structure.periodicity,
                    &points,
                )?;
                log::debug!(
                    "structure {}: {} buckets ({:?})",
                    structure.structure_id,
                    points.len(),
                    method
                );
                buckets_written += points.len();
            }
        }

        Ok(StageOutput::ok(format!(
            "interpolated {} structures, {} buckets ({:?})",
            structures.len(),
            buckets_written,
            method
        )))
    }
}
