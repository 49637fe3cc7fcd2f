//! Grouped tabular data with column-role metadata.
//!
//! A [`RecipeTable`] wraps a polars `DataFrame` together with a role for
//! each column ("predictor", "outcome", "group", ...) and an optional
//! grouping column (e.g. an ICU stay id). Group-aware steps operate within
//! each group's rows; everything else sees the flattened table.

use std::collections::{BTreeMap, HashMap};

use polars::prelude::*;

use crate::error::{Result, VitalError};

/// Default role assigned to feature columns.
pub const ROLE_PREDICTOR: &str = "predictor";
/// Role of the grouping column.
pub const ROLE_GROUP: &str = "group";
/// Role of the prediction target.
pub const ROLE_OUTCOME: &str = "outcome";

/// A data frame plus column roles and optional grouping.
#[derive(Debug, Clone)]
pub struct RecipeTable {
    df: DataFrame,
    roles: BTreeMap<String, String>,
    group_col: Option<String>,
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

impl RecipeTable {
    /// Wrap a data frame; every column starts as a predictor.
    pub fn new(df: DataFrame) -> Self {
        let roles = df
            .get_column_names()
            .into_iter()
            .map(|name| (name.to_string(), ROLE_PREDICTOR.to_string()))
            .collect();
        Self {
            df,
            roles,
            group_col: None,
        }
    }

    /// Assign a role to an existing column.
    pub fn with_role(mut self, column: &str, role: &str) -> Result<Self> {
        self.check_column(column)?;
        self.roles.insert(column.to_string(), role.to_string());
        Ok(self)
    }

    /// Declare the grouping column; it also receives the "group" role.
    pub fn with_group(mut self, column: &str) -> Result<Self> {
        self.check_column(column)?;
        self.roles
            .insert(column.to_string(), ROLE_GROUP.to_string());
        self.group_col = Some(column.to_string());
        Ok(self)
    }

    /// Declare the outcome column.
    pub fn with_outcome(self, column: &str) -> Result<Self> {
        self.with_role(column, ROLE_OUTCOME)
    }

    fn check_column(&self, column: &str) -> Result<()> {
        if self.df.column(column).is_err() {
            return Err(VitalError::ColumnNotFound(column.to_string()));
        }
        Ok(())
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_df(self) -> DataFrame {
        self.df
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn group_column(&self) -> Option<&str> {
        self.group_col.as_deref()
    }

    /// Column names in frame order.
    pub fn columns(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    /// The role of a column, if it has one.
    pub fn role_of(&self, column: &str) -> Option<&str> {
        self.roles.get(column).map(|s| s.as_str())
    }

    /// Tag a column with a role (used by steps that derive new columns).
    pub fn add_role(&mut self, column: &str, role: &str) {
        self.roles.insert(column.to_string(), role.to_string());
    }

    /// Predictor columns in frame order.
    pub fn predictors(&self) -> Vec<String> {
        self.columns_with_role(ROLE_PREDICTOR)
    }

    /// Columns carrying the given role, in frame order.
    pub fn columns_with_role(&self, role: &str) -> Vec<String> {
        self.columns()
            .into_iter()
            .filter(|name| self.role_of(name) == Some(role))
            .collect()
    }

    /// Numeric predictor columns in frame order.
    pub fn numeric_predictors(&self) -> Vec<String> {
        self.columns()
            .into_iter()
            .filter(|name| {
                self.role_of(name) == Some(ROLE_PREDICTOR)
                    && self
                        .df
                        .column(name)
                        .map(|c| is_numeric(c.dtype()))
                        .unwrap_or(false)
            })
            .collect()
    }

    /// Row indices partitioned by group, in order of first appearance. A
    /// table without a grouping column is one implicit group.
    pub fn group_rows(&self) -> Result<Vec<Vec<usize>>> {
        let Some(group_col) = &self.group_col else {
            return Ok(vec![(0..self.height()).collect()]);
        };

        let series = self
            .df
            .column(group_col)
            .map_err(|_| VitalError::ColumnNotFound(group_col.clone()))?
            .as_materialized_series()
            .cast(&DataType::String)?;
        let keys = series.str()?;

        let mut order: Vec<Vec<usize>> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for i in 0..self.height() {
            let key = keys.get(i).unwrap_or("").to_string();
            match seen.get(&key) {
                Some(&slot) => order[slot].push(i),
                None => {
                    seen.insert(key, order.len());
                    order.push(vec![i]);
                }
            }
        }
        Ok(order)
    }

    /// Extract a column as nullable floats.
    pub fn column_f64(&self, column: &str) -> Result<Vec<Option<f64>>> {
        let series = self
            .df
            .column(column)
            .map_err(|_| VitalError::ColumnNotFound(column.to_string()))?
            .as_materialized_series()
            .cast(&DataType::Float64)?;
        Ok(series.f64()?.into_iter().collect())
    }

    /// Write a float column back (adding it if new), keeping roles of
    /// existing columns intact.
    pub fn set_column_f64(&mut self, column: &str, values: Vec<Option<f64>>) -> Result<()> {
        if values.len() != self.height() {
            return Err(VitalError::ShapeError {
                expected: format!("{} values for column {column}", self.height()),
                actual: format!("{}", values.len()),
            });
        }
        let chunked: Float64Chunked = values.into_iter().collect();
        let series = chunked.with_name(column.into()).into_series();
        let is_new = self.df.column(column).is_err();
        self.df.with_column(series)?;
        if is_new && !self.roles.contains_key(column) {
            self.roles
                .insert(column.to_string(), ROLE_PREDICTOR.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grouped_table() -> RecipeTable {
        let df = df!(
            "stay_id" => &[1i64, 1, 1, 2, 2],
            "hr" => &[80.0, 82.0, 85.0, 60.0, 61.0],
            "outcome" => &[0.0, 0.0, 1.0, 0.0, 0.0]
        )
        .unwrap();
        RecipeTable::new(df)
            .with_group("stay_id")
            .unwrap()
            .with_outcome("outcome")
            .unwrap()
    }

    #[test]
    fn test_predictor_roles_after_tagging() {
        let table = grouped_table();
        assert_eq!(table.predictors(), vec!["hr".to_string()]);
        assert_eq!(table.role_of("stay_id"), Some(ROLE_GROUP));
        assert_eq!(table.role_of("outcome"), Some(ROLE_OUTCOME));
    }

    #[test]
    fn test_group_rows_partition_in_order() {
        let table = grouped_table();
        let groups = table.group_rows().unwrap();
        assert_eq!(groups, vec![vec![0, 1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_ungrouped_table_is_one_group() {
        let df = df!("a" => &[1.0, 2.0]).unwrap();
        let table = RecipeTable::new(df);
        assert_eq!(table.group_rows().unwrap(), vec![vec![0, 1]]);
    }

    #[test]
    fn test_column_roundtrip_preserves_nulls() {
        let df = df!("a" => &[1.0, 2.0, 3.0]).unwrap();
        let mut table = RecipeTable::new(df);
        table
            .set_column_f64("a", vec![Some(1.0), None, Some(3.0)])
            .unwrap();
        assert_eq!(
            table.column_f64("a").unwrap(),
            vec![Some(1.0), None, Some(3.0)]
        );
    }

    #[test]
    fn test_new_column_defaults_to_predictor_role() {
        let df = df!("a" => &[1.0, 2.0]).unwrap();
        let mut table = RecipeTable::new(df);
        table
            .set_column_f64("a_max", vec![Some(1.0), Some(2.0)])
            .unwrap();
        assert_eq!(table.role_of("a_max"), Some(ROLE_PREDICTOR));
    }

    #[test]
    fn test_missing_column_errors() {
        let df = df!("a" => &[1.0]).unwrap();
        let table = RecipeTable::new(df);
        assert!(matches!(
            table.column_f64("missing"),
            Err(VitalError::ColumnNotFound(_))
        ));
    }
}
