//! Named column predicates.
//!
//! A selector resolves to an ordered column list against a concrete table.
//! Steps resolve their selector once, at fit time, and freeze the result.

use crate::recipe::table::RecipeTable;

#[derive(Debug, Clone, PartialEq)]
enum SelectorKind {
    AllPredictors,
    NumericPredictors,
    HasRole(String),
    StartsWith(String),
    Columns(Vec<String>),
}

/// A named predicate over column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    description: String,
    kind: SelectorKind,
}

impl Selector {
    /// Every predictor column.
    pub fn all_predictors() -> Self {
        Self {
            description: "all predictors".to_string(),
            kind: SelectorKind::AllPredictors,
        }
    }

    /// Every numeric predictor column.
    pub fn all_numeric_predictors() -> Self {
        Self {
            description: "all numeric predictors".to_string(),
            kind: SelectorKind::NumericPredictors,
        }
    }

    /// Columns carrying the given role.
    pub fn has_role(role: impl Into<String>) -> Self {
        let role = role.into();
        Self {
            description: format!("columns with role '{role}'"),
            kind: SelectorKind::HasRole(role),
        }
    }

    /// Columns whose name starts with the given prefix.
    pub fn starts_with(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            description: format!("columns starting with '{prefix}'"),
            kind: SelectorKind::StartsWith(prefix),
        }
    }

    /// Exactly the named columns (those present in the table, in the given
    /// order).
    pub fn columns(names: Vec<String>) -> Self {
        Self {
            description: format!("columns {names:?}"),
            kind: SelectorKind::Columns(names),
        }
    }

    /// Human-readable description, used by step representations.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Resolve against a table into an ordered column list.
    pub fn select(&self, table: &RecipeTable) -> Vec<String> {
        match &self.kind {
            SelectorKind::AllPredictors => table.predictors(),
            SelectorKind::NumericPredictors => table.numeric_predictors(),
            SelectorKind::HasRole(role) => table.columns_with_role(role),
            SelectorKind::StartsWith(prefix) => table
                .columns()
                .into_iter()
                .filter(|name| name.starts_with(prefix.as_str()))
                .collect(),
            SelectorKind::Columns(names) => names
                .iter()
                .filter(|name| table.columns().contains(name))
                .cloned()
                .collect(),
        }
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::all_predictors()
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn table() -> RecipeTable {
        let df = df!(
            "stay_id" => &[1i64, 2],
            "hr" => &[80.0, 60.0],
            "hr_max" => &[85.0, 61.0],
            "ward" => &["icu", "er"]
        )
        .unwrap();
        RecipeTable::new(df).with_group("stay_id").unwrap()
    }

    #[test]
    fn test_all_predictors_skips_group() {
        let selected = Selector::all_predictors().select(&table());
        assert_eq!(selected, vec!["hr", "hr_max", "ward"]);
    }

    #[test]
    fn test_numeric_predictors_skips_strings() {
        let selected = Selector::all_numeric_predictors().select(&table());
        assert_eq!(selected, vec!["hr", "hr_max"]);
    }

    #[test]
    fn test_starts_with() {
        let selected = Selector::starts_with("hr").select(&table());
        assert_eq!(selected, vec!["hr", "hr_max"]);
    }

    #[test]
    fn test_explicit_columns_keep_order_and_drop_missing() {
        let selector =
            Selector::columns(vec!["hr_max".to_string(), "nope".to_string(), "hr".to_string()]);
        assert_eq!(selector.select(&table()), vec!["hr_max", "hr"]);
    }

    #[test]
    fn test_description() {
        assert_eq!(Selector::all_predictors().description(), "all predictors");
        assert!(Selector::has_role("outcome")
            .description()
            .contains("outcome"));
    }
}
