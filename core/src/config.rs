//! Run configuration and JSON reference-data catalogs.
//!
//! Reference data (term structures, delinquency bands, rating→stage map,
//! macro scenarios, segment coefficients, LGD table, portfolio seed) is
//! loaded from a data directory of JSON catalog files and seeded into the
//! store before the pipeline runs. The pipeline itself only ever reads
//! reference data back out of the store.

use crate::error::EclResult;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration shared by one whole pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EclConfig {
    /// Interpolation method name, parsed by the interpolator
    /// ("poisson" | "geometric" | "arithmetic" | "exponential_decay").
    pub interpolation_method: String,
    /// Projection horizon in years; every structure is expanded to
    /// `periods_per_year × projection_cap_years` buckets.
    pub projection_cap_years: u32,
    /// Vasicek asset correlation ρ, required in (0, 1).
    pub asset_correlation: f64,
    /// Macro scenario selection for the point-in-time adjustment.
    pub scenario_period: String,
    pub scenario_name:   String,
    /// Enables the collateral-coverage LGD pass.
    pub collateral_lgd_enabled: bool,
}

impl Default for EclConfig {
    fn default() -> Self {
        Self {
            interpolation_method:   "poisson".to_string(),
            projection_cap_years:   5,
            asset_correlation:      0.15,
            scenario_period:        String::new(),
            scenario_name:          "baseline".to_string(),
            collateral_lgd_enabled: true,
        }
    }
}

impl EclConfig {
    pub fn load(path: &Path) -> EclResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }
}

// ── Catalog records ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermStructureSeed {
    pub structure_id:    String,
    pub segment:         String,
    /// 'M' | 'Q' | 'H' | 'Y'
    pub periodicity:     String,
    pub base_pd:         f64,
    /// 'R' (rating-based) | 'D' (delinquency-based)
    pub structure_type:  String,
    #[serde(default)]
    pub risk_basis_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelinquencyBandSeed {
    pub lower_bound: i64,
    pub upper_bound: i64,
    pub term_unit:   String,
    pub band_code:   String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingStageSeed {
    pub rating_code: String,
    pub stage:       i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroScenarioSeed {
    pub period:   String,
    pub scenario: String,
    pub variable: String,
    pub value:    f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentCoefficientSeed {
    pub variable: String,
    /// None scopes the weight globally (the fallback row).
    #[serde(default)]
    pub segment:  Option<String>,
    pub weight:   f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LgdSeed {
    pub structure_id:   String,
    pub segment:        String,
    pub structure_type: String,
    pub match_code:     String,
    pub lgd_pct:        f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSeed {
    pub account_id:        String,
    pub segment:           String,
    #[serde(default)]
    pub delinquency_days:  Option<i64>,
    #[serde(default)]
    pub term_unit:         Option<String>,
    #[serde(default)]
    pub rating_code:       Option<String>,
    #[serde(default)]
    pub collateral_amount: Option<f64>,
    #[serde(default)]
    pub exposure_amount:   Option<f64>,
}

// ── Catalog files ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TermStructureFile {
    structures: Vec<TermStructureSeed>,
}

#[derive(Debug, Deserialize)]
struct BandFile {
    bands: Vec<DelinquencyBandSeed>,
}

#[derive(Debug, Deserialize)]
struct RatingMapFile {
    ratings: Vec<RatingStageSeed>,
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    observations: Vec<MacroScenarioSeed>,
}

#[derive(Debug, Deserialize)]
struct CoefficientFile {
    coefficients: Vec<SegmentCoefficientSeed>,
}

#[derive(Debug, Deserialize)]
struct LgdFile {
    entries: Vec<LgdSeed>,
}

#[derive(Debug, Deserialize)]
struct PortfolioFile {
    accounts: Vec<AccountSeed>,
}

/// Everything the runner seeds into the store before a pipeline run.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub structures:   Vec<TermStructureSeed>,
    pub bands:        Vec<DelinquencyBandSeed>,
    pub ratings:      Vec<RatingStageSeed>,
    pub observations: Vec<MacroScenarioSeed>,
    pub coefficients: Vec<SegmentCoefficientSeed>,
    pub lgd_entries:  Vec<LgdSeed>,
    pub accounts:     Vec<AccountSeed>,
}

fn load_file<T: serde::de::DeserializeOwned>(dir: &Path, name: &str) -> EclResult<T> {
    let path = dir.join(name);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading catalog {}", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}

impl ReferenceData {
    /// Load all catalogs from a data directory. Every file must exist —
    /// a run with a missing catalog is a configuration defect, not a
    /// silently-empty table.
    pub fn load(dir: &Path) -> EclResult<Self> {
        let structures: TermStructureFile = load_file(dir, "term_structures.json")?;
        let bands: BandFile = load_file(dir, "delinquency_bands.json")?;
        let ratings: RatingMapFile = load_file(dir, "rating_stage_map.json")?;
        let observations: ScenarioFile = load_file(dir, "macro_scenarios.json")?;
        let coefficients: CoefficientFile = load_file(dir, "segment_coefficients.json")?;
        let lgd: LgdFile = load_file(dir, "lgd_term_structures.json")?;
        let portfolio: PortfolioFile = load_file(dir, "portfolio.json")?;
        Ok(Self {
            structures:   structures.structures,
            bands:        bands.bands,
            ratings:      ratings.ratings,
            observations: observations.observations,
            coefficients: coefficients.coefficients,
            lgd_entries:  lgd.entries,
            accounts:     portfolio.accounts,
        })
    }
}
