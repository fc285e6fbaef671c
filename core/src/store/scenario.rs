//! Macro scenarios and systematic-factor sensitivity weights.

use super::EclStore;
use crate::{
    config::{MacroScenarioSeed, SegmentCoefficientSeed},
    error::EclResult,
};
use rusqlite::{params, OptionalExtension};

impl EclStore {
    pub fn seed_scenarios(&self, observations: &[MacroScenarioSeed]) -> EclResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for o in observations {
            tx.execute(
                "INSERT OR REPLACE INTO macro_scenario (period, scenario, variable, value)
                 VALUES (?1, ?2, ?3, ?4)",
                params![o.period, o.scenario, o.variable, o.value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn seed_coefficients(&self, coefficients: &[SegmentCoefficientSeed]) -> EclResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for c in coefficients {
            tx.execute(
                "INSERT INTO segment_coefficient (variable, segment, weight)
                 VALUES (?1, ?2, ?3)",
                params![c.variable, c.segment, c.weight],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// All (variable, value) observations for one (period, scenario).
    pub fn macro_values(&self, period: &str, scenario: &str) -> EclResult<Vec<(String, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT variable, value FROM macro_scenario
              WHERE period = ?1 AND scenario = ?2
              ORDER BY variable",
        )?;
        let rows = stmt
            .query_map(params![period, scenario], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The sensitivity weight for a variable: the segment-scoped row wins,
    /// the global (NULL-segment) row is the fallback.
    pub fn coefficient_for(&self, variable: &str, segment: &str) -> EclResult<Option<f64>> {
        let scoped: Option<f64> = self
            .conn
            .query_row(
                "SELECT weight FROM segment_coefficient
                  WHERE variable = ?1 AND segment = ?2",
                params![variable, segment],
                |row| row.get(0),
            )
            .optional()?;
        if scoped.is_some() {
            return Ok(scoped);
        }
        let global: Option<f64> = self
            .conn
            .query_row(
                "SELECT weight FROM segment_coefficient
                  WHERE variable = ?1 AND segment IS NULL",
                params![variable],
                |row| row.get(0),
            )
            .optional()?;
        Ok(global)
    }
}
