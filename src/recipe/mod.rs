//! Declarative, order-sensitive feature preprocessing.
//!
//! A [`Recipe`] holds an ordered sequence of [`Step`]s applied to grouped
//! tabular data. Steps are stateful: fitting a recipe resolves and freezes
//! each step's columns and per-column state, after which the recipe can be
//! applied to new tables of the same schema.

pub mod adapter;
pub mod historical;
pub mod impute;
pub mod scale;
pub mod selector;
pub mod step;
pub mod table;

pub use adapter::{CenterTransform, ColumnTransform, StepTransform};
pub use historical::{HistoricalFun, StepHistorical};
pub use impute::{FillStrategy, StepImputeFill};
pub use scale::StepScale;
pub use selector::Selector;
pub use step::Step;
pub use table::{RecipeTable, ROLE_GROUP, ROLE_OUTCOME, ROLE_PREDICTOR};

use crate::error::{Result, VitalError};

/// Ordered sequence of preprocessing steps.
#[derive(Default)]
pub struct Recipe {
    steps: Vec<Box<dyn Step>>,
}

impl Recipe {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step; order is significant.
    pub fn add_step(mut self, step: Box<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Fit every step in order, feeding each step the previous step's
    /// output, and return the fully transformed table.
    pub fn fit(&mut self, table: &RecipeTable) -> Result<RecipeTable> {
        let mut current = table.clone();
        for step in &mut self.steps {
            current = step.fit_transform(&current)?;
        }
        Ok(current)
    }

    /// Apply the fitted steps in order to a new table.
    pub fn transform(&self, table: &RecipeTable) -> Result<RecipeTable> {
        if let Some(step) = self.steps.iter().find(|s| !s.trained()) {
            return Err(VitalError::RecipeError(format!(
                "recipe applied before fit: step '{}' is untrained",
                step.desc()
            )));
        }
        let mut current = table.clone();
        for step in &self.steps {
            current = step.transform(&current)?;
        }
        Ok(current)
    }

    /// Step representations, in application order.
    pub fn describe(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.describe()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn table() -> RecipeTable {
        let df = df!(
            "stay_id" => &[1i64, 1, 1, 2, 2],
            "hr" => &[Some(3.0), None, Some(4.0), Some(1.0), Some(5.0)]
        )
        .unwrap();
        RecipeTable::new(df).with_group("stay_id").unwrap()
    }

    #[test]
    fn test_steps_apply_in_order() {
        let mut recipe = Recipe::new()
            .add_step(Box::new(StepImputeFill::new(
                Selector::all_predictors(),
                FillStrategy::Forward,
            )))
            .add_step(Box::new(StepHistorical::new(
                Selector::columns(vec!["hr".to_string()]),
                HistoricalFun::Max,
            )));

        let out = recipe.fit(&table()).unwrap();
        // Imputation ran before the historical aggregate: row 1 is filled,
        // so the running max sees it
        assert_eq!(
            out.column_f64("hr_max").unwrap(),
            vec![Some(3.0), Some(3.0), Some(4.0), Some(1.0), Some(5.0)]
        );
    }

    #[test]
    fn test_transform_before_fit_errors() {
        let recipe = Recipe::new().add_step(Box::new(StepScale::new(Selector::all_predictors())));
        let err = recipe.transform(&table()).unwrap_err();
        assert!(matches!(err, VitalError::RecipeError(_)));
    }

    #[test]
    fn test_fitted_recipe_applies_to_new_table() {
        let mut recipe = Recipe::new().add_step(Box::new(StepScale::new(Selector::columns(
            vec!["hr".to_string()],
        ))));
        recipe.fit(&table()).unwrap();

        let fresh = table();
        let out = recipe.transform(&fresh).unwrap();
        // Same fitted parameters reapplied
        assert_eq!(out.height(), fresh.height());
    }

    #[test]
    fn test_describe_lists_steps() {
        let recipe = Recipe::new()
            .add_step(Box::new(StepImputeFill::new(
                Selector::all_predictors(),
                FillStrategy::Value(0.0),
            )))
            .add_step(Box::new(StepScale::new(Selector::all_predictors())));
        let descriptions = recipe.describe();
        assert_eq!(descriptions.len(), 2);
        assert!(descriptions[0].starts_with("Impute with 0"));
    }
}
