//! Column layout of a partitioned table: which columns stay on the primary
//! table and how the rest are packed into extension tables.

use tessera_configs::watermark_capacity;
use thiserror::Error;

use crate::error::RewriteError;

/// One declared column, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanColumn {
    pub name: String,
    /// May be moved to an extension table
    pub eligible: bool,
}

impl PlanColumn {
    pub fn new(name: impl Into<String>, eligible: bool) -> Self {
        Self {
            name: name.into(),
            eligible,
        }
    }
}

/// Result of [`plan`]. Neither list contains the link column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnLayout {
    pub primary: Vec<String>,
    pub extensions: Vec<Vec<String>>,
}

impl ColumnLayout {
    /// Table holding `column`: 0 for the primary table, `i + 1` for
    /// extension table `i`.
    pub fn table_of(&self, column: &str) -> Option<usize> {
        if self.primary.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            return Some(0);
        }
        self.extensions
            .iter()
            .position(|ext| ext.iter().any(|c| c.eq_ignore_ascii_case(column)))
            .map(|idx| idx + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("no extension-eligible columns")]
    NoEligibleColumns,

    #[error("invalid partition capacity (max_columns_per_table={max}, watermark={watermark})")]
    InvalidCapacity { max: usize, watermark: f64 },

    #[error("primary table would have {columns} columns, the limit is {max}")]
    PrimaryTooWide { columns: usize, max: usize },

    #[error("constraint {0} references columns of more than one partition table")]
    SpanningConstraint(String),

    #[error("column '{0}' named in PARTITION(...) does not exist")]
    UnknownColumn(String),

    #[error("column '{0}' collides with the partition link column")]
    LinkColumnCollision(String),

    #[error("{0}")]
    Unsupported(String),
}

impl From<PlanError> for RewriteError {
    fn from(err: PlanError) -> Self {
        RewriteError::partition_config(err.to_string())
    }
}

/// Data columns one extension table holds: `floor(max * watermark)`, less
/// one if needed to leave room for the link column.
pub fn extension_capacity(max_columns_per_table: usize, watermark: f64) -> Result<usize, PlanError> {
    let invalid = || PlanError::InvalidCapacity {
        max: max_columns_per_table,
        watermark,
    };
    if max_columns_per_table < 2 || !(watermark > 0.0 && watermark <= 1.0) {
        return Err(invalid());
    }
    let capacity = watermark_capacity(max_columns_per_table, watermark).min(max_columns_per_table - 1);
    if capacity == 0 {
        return Err(invalid());
    }
    Ok(capacity)
}

/// Packs eligible columns greedily, in declaration order, into extension
/// tables; everything else stays on the primary table.
pub fn plan(
    columns: &[PlanColumn],
    max_columns_per_table: usize,
    watermark: f64,
) -> Result<ColumnLayout, PlanError> {
    let capacity = extension_capacity(max_columns_per_table, watermark)?;

    let mut layout = ColumnLayout::default();
    let mut current: Vec<String> = Vec::new();
    for column in columns {
        if !column.eligible {
            layout.primary.push(column.name.clone());
            continue;
        }
        if current.len() == capacity {
            layout.extensions.push(std::mem::take(&mut current));
        }
        current.push(column.name.clone());
    }
    if !current.is_empty() {
        layout.extensions.push(current);
    }

    if layout.extensions.is_empty() {
        return Err(PlanError::NoEligibleColumns);
    }
    // The primary table also carries the link column
    let primary_width = layout.primary.len() + 1;
    if primary_width > max_columns_per_table {
        return Err(PlanError::PrimaryTooWide {
            columns: primary_width,
            max: max_columns_per_table,
        });
    }
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn columns(spec: &[(&str, bool)]) -> Vec<PlanColumn> {
        spec.iter().map(|(n, e)| PlanColumn::new(*n, *e)).collect()
    }

    #[test]
    fn test_greedy_packing_in_declaration_order() {
        let cols = columns(&[
            ("id", false),
            ("a", true),
            ("b", true),
            ("name", false),
            ("c", true),
            ("d", true),
            ("e", true),
        ]);
        let layout = plan(&cols, 4, 0.5).unwrap();
        assert_eq!(layout.primary, vec!["id", "name"]);
        assert_eq!(
            layout.extensions,
            vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]
        );
        assert_eq!(layout.table_of("D"), Some(2));
        assert_eq!(layout.table_of("id"), Some(0));
        assert_eq!(layout.table_of("missing"), None);
    }

    #[test]
    fn test_no_eligible_columns() {
        let cols = columns(&[("id", false), ("a", false)]);
        assert_eq!(plan(&cols, 10, 0.8), Err(PlanError::NoEligibleColumns));
    }

    #[test]
    fn test_capacity_leaves_room_for_link_column() {
        assert_eq!(extension_capacity(10, 1.0).unwrap(), 9);
        assert_eq!(extension_capacity(1017, 0.8).unwrap(), 813);
        assert!(extension_capacity(1, 0.5).is_err());
        assert!(extension_capacity(10, 0.0).is_err());
        assert!(extension_capacity(10, 1.5).is_err());
        assert!(extension_capacity(3, 0.2).is_err());
    }

    #[test]
    fn test_capacity_is_not_lost_to_float_rounding() {
        // 100 * 0.29 is 28.999999999999996 in f64
        assert_eq!(extension_capacity(100, 0.29).unwrap(), 29);
        assert_eq!(extension_capacity(100, 0.57).unwrap(), 57);
        assert_eq!(extension_capacity(7, 0.5).unwrap(), 3);
    }

    #[test]
    fn test_primary_too_wide() {
        let cols = columns(&[("a", false), ("b", false), ("c", false), ("d", true)]);
        assert_eq!(
            plan(&cols, 3, 0.5),
            Err(PlanError::PrimaryTooWide { columns: 4, max: 3 })
        );
    }

    proptest! {
        #[test]
        fn prop_plan_preserves_columns(
            flags in proptest::collection::vec(any::<bool>(), 0..120),
            max in 2usize..64,
            watermark in 0.05f64..=1.0,
        ) {
            let cols: Vec<PlanColumn> = flags
                .iter()
                .enumerate()
                .map(|(i, eligible)| PlanColumn::new(format!("c{i}"), *eligible))
                .collect();
            let capacity = watermark_capacity(max, watermark);

            match plan(&cols, max, watermark) {
                Ok(layout) => {
                    for ext in &layout.extensions {
                        prop_assert!(!ext.is_empty());
                        prop_assert!(ext.len() <= capacity);
                    }
                    let mut seen: Vec<String> = layout.primary.clone();
                    seen.extend(layout.extensions.iter().flatten().cloned());
                    seen.sort();
                    let mut expected: Vec<String> = cols.iter().map(|c| c.name.clone()).collect();
                    expected.sort();
                    prop_assert_eq!(seen, expected);

                    let primary: Vec<String> = cols.iter().filter(|c| !c.eligible).map(|c| c.name.clone()).collect();
                    prop_assert_eq!(layout.primary, primary);
                }
                Err(PlanError::NoEligibleColumns) => {
                    prop_assert!(cols.iter().all(|c| !c.eligible));
                }
                Err(PlanError::PrimaryTooWide { columns, .. }) => {
                    prop_assert!(columns > max);
                }
                Err(PlanError::InvalidCapacity { .. }) => {
                    prop_assert!(capacity == 0);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }
    }
}
