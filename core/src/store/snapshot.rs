//! Account-snapshot persistence: seeding, set-based stage/band/LGD/PD
//! mutations, and row reads for tests and tooling.
//!
//! Every UPDATE here is filtered by (calc_date, run_key) and executes as
//! one statement — one atomic mutation per operation, never per row.

use super::EclStore;
use crate::{
    config::{AccountSeed, DelinquencyBandSeed, LgdSeed, RatingStageSeed},
    error::EclResult,
    types::{AccountId, RunKey},
};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

/// A full account-snapshot row as the pipeline sees it.
#[derive(Debug, Clone)]
pub struct AccountRow {
    pub account_id:        AccountId,
    pub segment:           String,
    pub delinquency_days:  Option<i64>,
    pub term_unit:         Option<String>,
    pub rating_code:       Option<String>,
    pub stage:             Option<i64>,
    pub prev_stage:        Option<i64>,
    pub stage_basis:       Option<String>,
    pub band_code:         Option<String>,
    pub collateral_amount: Option<f64>,
    pub exposure_amount:   Option<f64>,
    pub pd_pct:            Option<f64>,
    pub lgd_pct:           Option<f64>,
}

impl EclStore {
    // ── Seeding ────────────────────────────────────────────────

    pub fn insert_snapshot(
        &self,
        calc_date: NaiveDate,
        run_key: RunKey,
        seed: &AccountSeed,
    ) -> EclResult<()> {
        self.conn.execute(
            "INSERT INTO account_snapshot
             (calc_date, run_key, account_id, segment, delinquency_days,
              term_unit, rating_code, collateral_amount, exposure_amount)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                calc_date.to_string(),
                run_key,
                seed.account_id,
                seed.segment,
                seed.delinquency_days,
                seed.term_unit,
                seed.rating_code,
                seed.collateral_amount,
                seed.exposure_amount,
            ],
        )?;
        Ok(())
    }

    pub fn seed_bands(
        &self,
        calc_date: NaiveDate,
        bands: &[DelinquencyBandSeed],
    ) -> EclResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for band in bands {
            tx.execute(
                "INSERT INTO delinquency_band
                 (calc_date, lower_bound, upper_bound, term_unit, band_code)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    calc_date.to_string(),
                    band.lower_bound,
                    band.upper_bound,
                    band.term_unit,
                    band.band_code,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn seed_rating_map(&self, ratings: &[RatingStageSeed]) -> EclResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for r in ratings {
            tx.execute(
                "INSERT OR REPLACE INTO rating_stage_map (rating_code, stage)
                 VALUES (?1, ?2)",
                params![r.rating_code, r.stage],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn seed_lgd_entries(&self, calc_date: NaiveDate, entries: &[LgdSeed]) -> EclResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for e in entries {
            tx.execute(
                "INSERT INTO lgd_term_structure
                 (structure_id, calc_date, segment, structure_type, match_code, lgd_pct)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    e.structure_id,
                    calc_date.to_string(),
                    e.segment,
                    e.structure_type,
                    e.match_code,
                    e.lgd_pct,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ── Delinquency band mapping ───────────────────────────────

    pub fn bands_for_date(&self, calc_date: NaiveDate) -> EclResult<Vec<DelinquencyBandSeed>> {
        let mut stmt = self.conn.prepare(
            "SELECT lower_bound, upper_bound, term_unit, band_code
             FROM delinquency_band WHERE calc_date = ?1
             ORDER BY term_unit, lower_bound",
        )?;
        let bands = stmt
            .query_map(params![calc_date.to_string()], |row| {
                Ok(DelinquencyBandSeed {
                    lower_bound: row.get(0)?,
                    upper_bound: row.get(1)?,
                    term_unit:   row.get(2)?,
                    band_code:   row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bands)
    }

    /// Write one band's code onto every matching snapshot. The term-unit
    /// match is exact, or on the leading unit character when the source
    /// representation is inconsistent in length or case.
    pub fn apply_band(
        &self,
        calc_date: NaiveDate,
        run_key: RunKey,
        band: &DelinquencyBandSeed,
    ) -> EclResult<usize> {
        let changed = self.conn.execute(
            "UPDATE account_snapshot
                SET band_code = ?1
              WHERE calc_date = ?2 AND run_key = ?3
                AND delinquency_days IS NOT NULL
                AND delinquency_days BETWEEN ?4 AND ?5
                AND term_unit IS NOT NULL
                AND (upper(term_unit) = upper(?6)
                     OR substr(upper(term_unit), 1, 1) = substr(upper(?6), 1, 1))",
            params![
                band.band_code,
                calc_date.to_string(),
                run_key,
                band.lower_bound,
                band.upper_bound,
                band.term_unit,
            ],
        )?;
        Ok(changed)
    }

    // ── Stage classification ───────────────────────────────────

    /// Assign stages from the rating→stage lookup. Runs before the
    /// delinquency pass; rating-based classification takes precedence.
    pub fn assign_stage_by_rating(
        &self,
        calc_date: NaiveDate,
        run_key: RunKey,
    ) -> EclResult<usize> {
        let changed = self.conn.execute(
            "UPDATE account_snapshot
                SET stage = (SELECT m.stage FROM rating_stage_map m
                              WHERE m.rating_code = account_snapshot.rating_code),
                    stage_basis = 'rating'
              WHERE calc_date = ?1 AND run_key = ?2
                AND rating_code IS NOT NULL
                AND EXISTS (SELECT 1 FROM rating_stage_map m
                             WHERE m.rating_code = account_snapshot.rating_code)",
            params![calc_date.to_string(), run_key],
        )?;
        Ok(changed)
    }

    /// Assign stages from delinquency days for rows the rating pass did
    /// not classify. Rows with no delinquency value keep their stage.
    pub fn assign_stage_by_delinquency(
        &self,
        calc_date: NaiveDate,
        run_key: RunKey,
    ) -> EclResult<usize> {
        let changed = self.conn.execute(
            "UPDATE account_snapshot
                SET stage = CASE
                              WHEN delinquency_days <= 30 THEN 1
                              WHEN delinquency_days <= 90 THEN 2
                              ELSE 3
                            END,
                    stage_basis = 'delinquency'
              WHERE calc_date = ?1 AND run_key = ?2
                AND delinquency_days IS NOT NULL
                AND (stage_basis IS NULL OR stage_basis <> 'rating')",
            params![calc_date.to_string(), run_key],
        )?;
        Ok(changed)
    }

    /// Copy each account's stage from the most recent strictly-earlier
    /// run, ordered by (calc_date, run_key). NULL when no prior run exists.
    pub fn copy_prev_stage(&self, calc_date: NaiveDate, run_key: RunKey) -> EclResult<usize> {
        let changed = self.conn.execute(
            "UPDATE account_snapshot
                SET prev_stage = (
                    SELECT s2.stage FROM account_snapshot s2
                     WHERE s2.account_id = account_snapshot.account_id
                       AND (s2.calc_date < account_snapshot.calc_date
                            OR (s2.calc_date = account_snapshot.calc_date
                                AND s2.run_key < account_snapshot.run_key))
                     ORDER BY s2.calc_date DESC, s2.run_key DESC
                     LIMIT 1)
              WHERE calc_date = ?1 AND run_key = ?2",
            params![calc_date.to_string(), run_key],
        )?;
        Ok(changed)
    }

    /// Record stage transitions. A row is written only when a prior run
    /// exists (prev_stage is set) and the stage actually changed.
    pub fn append_stage_history(
        &self,
        calc_date: NaiveDate,
        run_key: RunKey,
    ) -> EclResult<usize> {
        let changed = self.conn.execute(
            "INSERT INTO stage_history
             (calc_date, run_key, account_id, prev_stage, new_stage, basis)
             SELECT calc_date, run_key, account_id, prev_stage, stage, stage_basis
               FROM account_snapshot
              WHERE calc_date = ?1 AND run_key = ?2
                AND prev_stage IS NOT NULL
                AND stage IS NOT NULL
                AND stage <> prev_stage",
            params![calc_date.to_string(), run_key],
        )?;
        Ok(changed)
    }

    // ── PD and LGD attachment ──────────────────────────────────

    /// Set each account's PD to the one-year cumulative point-in-time PD
    /// of its segment's term structure, where a complete curve exists.
    pub fn update_pd_from_curves(
        &self,
        calc_date: NaiveDate,
        run_key: RunKey,
    ) -> EclResult<usize> {
        let changed = self.conn.execute(
            "UPDATE account_snapshot
                SET pd_pct = (
                    SELECT p.pit_cumulative
                      FROM interpolated_point p
                      JOIN term_structure_detail t
                        ON t.structure_id = p.structure_id
                       AND t.calc_date = p.calc_date
                     WHERE t.calc_date = account_snapshot.calc_date
                       AND t.segment = account_snapshot.segment
                       AND p.pit_cumulative IS NOT NULL
                       AND p.bucket = (CASE t.periodicity
                                         WHEN 'M' THEN 12
                                         WHEN 'Q' THEN 4
                                         WHEN 'H' THEN 2
                                         ELSE 1 END)
                     LIMIT 1)
              WHERE calc_date = ?1 AND run_key = ?2
                AND EXISTS (
                    SELECT 1
                      FROM interpolated_point p
                      JOIN term_structure_detail t
                        ON t.structure_id = p.structure_id
                       AND t.calc_date = p.calc_date
                     WHERE t.calc_date = account_snapshot.calc_date
                       AND t.segment = account_snapshot.segment
                       AND p.pit_cumulative IS NOT NULL)",
            params![calc_date.to_string(), run_key],
        )?;
        Ok(changed)
    }

    /// Term-structure LGD pass: fills only unset LGD values, matching on
    /// rating code for 'R' structures and band code for 'D' structures.
    pub fn fill_lgd_from_term_structure(
        &self,
        calc_date: NaiveDate,
        run_key: RunKey,
    ) -> EclResult<usize> {
        let changed = self.conn.execute(
            "UPDATE account_snapshot
                SET lgd_pct = (
                    SELECT l.lgd_pct FROM lgd_term_structure l
                     WHERE l.calc_date = account_snapshot.calc_date
                       AND l.segment = account_snapshot.segment
                       AND ((l.structure_type = 'R'
                             AND l.match_code = account_snapshot.rating_code)
                         OR (l.structure_type = 'D'
                             AND l.match_code = account_snapshot.band_code))
                     LIMIT 1)
              WHERE calc_date = ?1 AND run_key = ?2
                AND lgd_pct IS NULL
                AND EXISTS (
                    SELECT 1 FROM lgd_term_structure l
                     WHERE l.calc_date = account_snapshot.calc_date
                       AND l.segment = account_snapshot.segment
                       AND ((l.structure_type = 'R'
                             AND l.match_code = account_snapshot.rating_code)
                         OR (l.structure_type = 'D'
                             AND l.match_code = account_snapshot.band_code)))",
            params![calc_date.to_string(), run_key],
        )?;
        Ok(changed)
    }

    /// Collateral-coverage LGD pass: severity capped at 65%, floored at
    /// 0%; zero or unset exposure is skipped. Fills only unset values.
    pub fn fill_lgd_from_collateral(
        &self,
        calc_date: NaiveDate,
        run_key: RunKey,
    ) -> EclResult<usize> {
        let changed = self.conn.execute(
            "UPDATE account_snapshot
                SET lgd_pct = min(0.65, max(0.0,
                        1.0 - collateral_amount / exposure_amount))
              WHERE calc_date = ?1 AND run_key = ?2
                AND lgd_pct IS NULL
                AND collateral_amount IS NOT NULL
                AND exposure_amount IS NOT NULL
                AND exposure_amount > 0.0",
            params![calc_date.to_string(), run_key],
        )?;
        Ok(changed)
    }

    // ── Reads ──────────────────────────────────────────────────

    pub fn snapshot_count(&self, calc_date: NaiveDate, run_key: RunKey) -> EclResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM account_snapshot
              WHERE calc_date = ?1 AND run_key = ?2",
            params![calc_date.to_string(), run_key],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn get_snapshot(
        &self,
        calc_date: NaiveDate,
        run_key: RunKey,
        account_id: &str,
    ) -> EclResult<Option<AccountRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT account_id, segment, delinquency_days, term_unit,
                        rating_code, stage, prev_stage, stage_basis, band_code,
                        collateral_amount, exposure_amount, pd_pct, lgd_pct
                   FROM account_snapshot
                  WHERE calc_date = ?1 AND run_key = ?2 AND account_id = ?3",
                params![calc_date.to_string(), run_key, account_id],
                |row| {
                    Ok(AccountRow {
                        account_id:        row.get(0)?,
                        segment:           row.get(1)?,
                        delinquency_days:  row.get(2)?,
                        term_unit:         row.get(3)?,
                        rating_code:       row.get(4)?,
                        stage:             row.get(5)?,
                        prev_stage:        row.get(6)?,
                        stage_basis:       row.get(7)?,
                        band_code:         row.get(8)?,
                        collateral_amount: row.get(9)?,
                        exposure_amount:   row.get(10)?,
                        pd_pct:            row.get(11)?,
                        lgd_pct:           row.get(12)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn stage_history_count(&self, calc_date: NaiveDate, run_key: RunKey) -> EclResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM stage_history
              WHERE calc_date = ?1 AND run_key = ?2",
            params![calc_date.to_string(), run_key],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
