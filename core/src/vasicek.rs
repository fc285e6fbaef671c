//! Vasicek single-factor point-in-time transformation.
//!
//! One systematic risk factor z is derived per segment as a weighted sum
//! of macro-variable values for the selected (period, scenario), using
//! segment-scoped sensitivity weights with a global fallback. Each
//! through-the-cycle PD is then conditioned on z:
//!
//! ```text
//! pit = Φ( Φ⁻¹(ttc) − √(ρ/(1−ρ)) · z )
//! ```
//!
//! The loading is applied to z alone so a neutral economy (z = 0) leaves
//! the TTC PD unchanged; the transform is strictly decreasing in z.

use crate::{
    config::EclConfig,
    error::{EclError, EclResult},
    interpolation::PD_EPSILON,
    stage::{PipelineStage, StageOutput},
    stats::{norm_cdf, norm_inv_cdf},
    store::EclStore,
    types::RunKey,
};
use chrono::NaiveDate;

/// Condition one TTC PD on the systematic factor. Result clamped to [0,1].
pub fn pit_pd(ttc_pd: f64, rho: f64, z: f64) -> EclResult<f64> {
    if !(rho > 0.0 && rho < 1.0) {
        return Err(EclError::computation(format!(
            "asset correlation {rho} outside (0, 1)"
        )));
    }
    let p = ttc_pd.clamp(PD_EPSILON, 1.0 - PD_EPSILON);
    let loading = (rho / (1.0 - rho)).sqrt();
    let shifted = norm_inv_cdf(p)? - loading * z;
    Ok(norm_cdf(shifted).clamp(0.0, 1.0))
}

/// The systematic factor for one segment:
/// `z = Σ weight[variable] × value[variable]` over the scenario's
/// observations. Variables with no configured weight contribute nothing.
pub fn systematic_factor(
    store: &EclStore,
    observations: &[(String, f64)],
    segment: &str,
) -> EclResult<f64> {
    let mut z = 0.0;
    for (variable, value) in observations {
        match store.coefficient_for(variable, segment)? {
            Some(weight) => z += weight * value,
            None => {
                log::debug!("no sensitivity weight for macro variable '{variable}'");
            }
        }
    }
    Ok(z)
}

// ── Pipeline stage ───────────────────────────────────────────────────────────

/// Conditions every interpolated curve on the configured macro scenario
/// and refreshes each account's PD from its segment curve.
pub struct VasicekStage;

impl PipelineStage for VasicekStage {
    fn name(&self) -> &'static str {
        "vasicek_pit"
    }

    fn run(
        &self,
        store: &EclStore,
        config: &EclConfig,
        calc_date: NaiveDate,
        run_key: RunKey,
    ) -> EclResult<StageOutput> {
        let rho = config.asset_correlation;
        if !(rho > 0.0 && rho < 1.0) {
            return Err(EclError::computation(format!(
                "asset correlation {rho} outside (0, 1)"
            )));
        }

        let observations =
            store.macro_values(&config.scenario_period, &config.scenario_name)?;
        if observations.is_empty() {
            return Ok(StageOutput::failed(format!(
                "no macro scenario rows for period '{}' scenario '{}'",
                config.scenario_period, config.scenario_name
            )));
        }

        let structures = store.term_structures_for_date(calc_date)?;
        let mut adjusted_structures = 0usize;
        for structure in &structures {
            let z = systematic_factor(store, &observations, &structure.segment)?;
            let points = store.curve_points(&structure.structure_id, calc_date)?;
            if points.is_empty() {
                continue;
            }

            let mut cumulative = 0.0;
            let mut adjusted = Vec::with_capacity(points.len());
            for point in &points {
                let marginal = pit_pd(point.marginal_pd, rho, z)?;
                cumulative = 1.0 - (1.0 - cumulative) * (1.0 - marginal);
                adjusted.push((point.bucket, marginal, cumulative.clamp(0.0, 1.0)));
            }
            store.write_pit_curve(&structure.structure_id, calc_date, &adjusted)?;
            log::debug!(
                "structure {} (segment {}): z = {z:.4}, {} buckets conditioned",
                structure.structure_id,
                structure.segment,
                adjusted.len()
            );
            adjusted_structures += 1;
        }

        let accounts = store.update_pd_from_curves(calc_date, run_key)?;
        Ok(StageOutput::ok(format!(
            "conditioned {adjusted_structures} curves on scenario '{}', refreshed {accounts} account PDs",
            config.scenario_name
        )))
    }
}
