//! Term-structure definitions and interpolated-curve persistence.
//!
//! A curve is written as one unit: prior rows for the (structure, date)
//! key are cleared and the full bucket set inserted inside a single
//! transaction. Readers therefore only ever see complete curves.

use super::EclStore;
use crate::{
    config::TermStructureSeed,
    error::EclResult,
    interpolation::{CurvePoint, Periodicity},
    types::StructureId,
};
use chrono::NaiveDate;
use rusqlite::params;

/// A term-structure definition read back from the store.
#[derive(Debug, Clone)]
pub struct TermStructureRow {
    pub structure_id:    StructureId,
    pub segment:         String,
    pub periodicity:     Periodicity,
    pub base_pd:         f64,
    pub structure_type:  String,
    pub risk_basis_code: Option<String>,
}

/// One interpolated bucket, including any point-in-time adjustment.
#[derive(Debug, Clone)]
pub struct InterpolatedRow {
    pub bucket:          u32,
    pub projection_year: i32,
    pub marginal_pd:     f64,
    pub cumulative_pd:   f64,
    pub pit_pd:          Option<f64>,
    pub pit_cumulative:  Option<f64>,
}

impl EclStore {
    pub fn seed_term_structures(
        &self,
        calc_date: NaiveDate,
        structures: &[TermStructureSeed],
    ) -> EclResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for s in structures {
            tx.execute(
                "INSERT OR REPLACE INTO term_structure_detail
                 (structure_id, calc_date, segment, periodicity, base_pd,
                  structure_type, risk_basis_code)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    s.structure_id,
                    calc_date.to_string(),
                    s.segment,
                    s.periodicity,
                    s.base_pd,
                    s.structure_type,
                    s.risk_basis_code,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn term_structures_for_date(
        &self,
        calc_date: NaiveDate,
    ) -> EclResult<Vec<TermStructureRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT structure_id, segment, periodicity, base_pd,
                    structure_type, risk_basis_code
             FROM term_structure_detail WHERE calc_date = ?1
             ORDER BY structure_id",
        )?;
        let raw = stmt
            .query_map(params![calc_date.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, segment, unit, base_pd, structure_type, risk_basis_code)| {
                Ok(TermStructureRow {
                    structure_id: id,
                    segment,
                    periodicity: Periodicity::from_code(&unit)?,
                    base_pd,
                    structure_type,
                    risk_basis_code,
                })
            })
            .collect()
    }

    /// Replace a structure's curve: clear prior rows for the key, insert
    /// every bucket, commit as one unit.
    pub fn replace_curve(
        &self,
        structure_id: &str,
        calc_date: NaiveDate,
        periodicity: Periodicity,
        points: &[CurvePoint],
    ) -> EclResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM interpolated_point
              WHERE structure_id = ?1 AND calc_date = ?2",
            params![structure_id, calc_date.to_string()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO interpolated_point
                 (structure_id, calc_date, bucket, periodicity,
                  projection_year, marginal_pd, cumulative_pd)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for p in points {
                stmt.execute(params![
                    structure_id,
                    calc_date.to_string(),
                    p.bucket,
                    periodicity.code(),
                    p.projection_year,
                    p.marginal_pd,
                    p.cumulative_pd,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn curve_points(
        &self,
        structure_id: &str,
        calc_date: NaiveDate,
    ) -> EclResult<Vec<InterpolatedRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT bucket, projection_year, marginal_pd, cumulative_pd,
                    pit_pd, pit_cumulative
             FROM interpolated_point
             WHERE structure_id = ?1 AND calc_date = ?2
             ORDER BY bucket ASC",
        )?;
        let rows = stmt
            .query_map(params![structure_id, calc_date.to_string()], |row| {
                Ok(InterpolatedRow {
                    bucket:          row.get::<_, i64>(0)? as u32,
                    projection_year: row.get(1)?,
                    marginal_pd:     row.get(2)?,
                    cumulative_pd:   row.get(3)?,
                    pit_pd:          row.get(4)?,
                    pit_cumulative:  row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Attach point-in-time values to an existing curve, one transaction
    /// per structure.
    pub fn write_pit_curve(
        &self,
        structure_id: &str,
        calc_date: NaiveDate,
        adjusted: &[(u32, f64, f64)], // (bucket, pit_pd, pit_cumulative)
    ) -> EclResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE interpolated_point
                    SET pit_pd = ?1, pit_cumulative = ?2
                  WHERE structure_id = ?3 AND calc_date = ?4 AND bucket = ?5",
            )?;
            for (bucket, pit_pd, pit_cumulative) in adjusted {
                stmt.execute(params![
                    pit_pd,
                    pit_cumulative,
                    structure_id,
                    calc_date.to_string(),
                    bucket,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn curve_bucket_count(
        &self,
        structure_id: &str,
        calc_date: NaiveDate,
    ) -> EclResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM interpolated_point
              WHERE structure_id = ?1 AND calc_date = ?2",
            params![structure_id, calc_date.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
