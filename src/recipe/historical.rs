//! Running historical aggregates within each group.

use crate::error::{Result, VitalError};
use crate::recipe::selector::Selector;
use crate::recipe::step::Step;
use crate::recipe::table::RecipeTable;

/// The cumulative aggregate to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoricalFun {
    Max,
    Min,
}

impl HistoricalFun {
    fn label(&self) -> &'static str {
        match self {
            HistoricalFun::Max => "max",
            HistoricalFun::Min => "min",
        }
    }

    fn combine(&self, acc: f64, value: f64) -> f64 {
        match self {
            HistoricalFun::Max => acc.max(value),
            HistoricalFun::Min => acc.min(value),
        }
    }
}

/// Compute a running cumulative max/min per resolved column within each
/// group, skipping missing values, and write it to new `{col}_{suffix}`
/// columns tagged with the declared role.
#[derive(Debug, Clone)]
pub struct StepHistorical {
    selector: Selector,
    fun: HistoricalFun,
    suffix: String,
    role: String,
    columns: Vec<String>,
    trained: bool,
}

impl StepHistorical {
    pub fn new(selector: Selector, fun: HistoricalFun) -> Self {
        Self {
            selector,
            fun,
            suffix: fun.label().to_string(),
            role: "predictor".to_string(),
            columns: Vec::new(),
            trained: false,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }
}

impl Step for StepHistorical {
    fn desc(&self) -> String {
        format!("Create historical {}", self.fun.label())
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }

    fn trained(&self) -> bool {
        self.trained
    }

    fn resolved_columns(&self) -> &[String] {
        &self.columns
    }

    fn fit(&mut self, table: &RecipeTable) -> Result<()> {
        self.columns = self.selector.select(table);
        self.trained = true;
        Ok(())
    }

    fn transform(&self, table: &RecipeTable) -> Result<RecipeTable> {
        if !self.trained {
            return Err(VitalError::StepNotTrained);
        }

        let groups = table.group_rows()?;
        let mut out = table.clone();
        for column in &self.columns {
            let values = out.column_f64(column)?;
            let mut aggregated = vec![None; values.len()];

            for rows in &groups {
                let mut acc: Option<f64> = None;
                for &row in rows {
                    match values[row] {
                        // Missing values stay missing but do not reset the
                        // running aggregate
                        None => aggregated[row] = None,
                        Some(v) => {
                            let next = match acc {
                                None => v,
                                Some(current) => self.fun.combine(current, v),
                            };
                            acc = Some(next);
                            aggregated[row] = acc;
                        }
                    }
                }
            }

            let new_column = format!("{column}_{}", self.suffix);
            out.set_column_f64(&new_column, aggregated)?;
            out.add_role(&new_column, &self.role);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_running_max() {
        let df = df!(
            "stay_id" => &[1i64, 1, 1, 1, 1],
            "hr" => &[3.0, 1.0, 4.0, 1.0, 5.0]
        )
        .unwrap();
        let table = RecipeTable::new(df).with_group("stay_id").unwrap();

        let mut step = StepHistorical::new(Selector::all_predictors(), HistoricalFun::Max);
        let out = step.fit_transform(&table).unwrap();
        assert_eq!(
            out.column_f64("hr_max").unwrap(),
            vec![Some(3.0), Some(3.0), Some(4.0), Some(4.0), Some(5.0)]
        );
    }

    #[test]
    fn test_running_min_resets_between_groups() {
        let df = df!(
            "stay_id" => &[1i64, 1, 2, 2],
            "hr" => &[5.0, 3.0, 9.0, 7.0]
        )
        .unwrap();
        let table = RecipeTable::new(df).with_group("stay_id").unwrap();

        let mut step = StepHistorical::new(Selector::all_predictors(), HistoricalFun::Min);
        let out = step.fit_transform(&table).unwrap();
        assert_eq!(
            out.column_f64("hr_min").unwrap(),
            vec![Some(5.0), Some(3.0), Some(9.0), Some(7.0)]
        );
    }

    #[test]
    fn test_missing_values_are_skipped_not_reset() {
        let df = df!(
            "stay_id" => &[1i64, 1, 1],
            "hr" => &[Some(4.0), None, Some(2.0)]
        )
        .unwrap();
        let table = RecipeTable::new(df).with_group("stay_id").unwrap();

        let mut step = StepHistorical::new(Selector::all_predictors(), HistoricalFun::Max);
        let out = step.fit_transform(&table).unwrap();
        assert_eq!(
            out.column_f64("hr_max").unwrap(),
            vec![Some(4.0), None, Some(4.0)]
        );
    }

    #[test]
    fn test_derived_column_role_and_suffix() {
        let df = df!(
            "stay_id" => &[1i64, 1],
            "hr" => &[1.0, 2.0]
        )
        .unwrap();
        let table = RecipeTable::new(df).with_group("stay_id").unwrap();

        let mut step = StepHistorical::new(Selector::all_predictors(), HistoricalFun::Max)
            .with_suffix("peak")
            .with_role("descriptor");
        let out = step.fit_transform(&table).unwrap();
        assert_eq!(out.role_of("hr_peak"), Some("descriptor"));
    }

    #[test]
    fn test_transform_before_fit_is_hard_error() {
        let df = df!("hr" => &[1.0]).unwrap();
        let step = StepHistorical::new(Selector::all_predictors(), HistoricalFun::Max);
        assert!(matches!(
            step.transform(&RecipeTable::new(df)),
            Err(VitalError::StepNotTrained)
        ));
    }
}
