//! Shared primitive types used across the entire pipeline.

/// The canonical run identifier: a monotonically increasing integer
/// scoped to one calculation date. Issued by the Run Registry.
pub type RunKey = i64;

/// A stable account identifier.
pub type AccountId = String;

/// A PD term-structure identifier.
pub type StructureId = String;
