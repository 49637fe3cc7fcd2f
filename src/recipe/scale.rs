//! Per-column centering and scaling step.

use std::collections::BTreeMap;

use crate::error::{Result, VitalError};
use crate::recipe::selector::Selector;
use crate::recipe::step::Step;
use crate::recipe::table::RecipeTable;

/// Parameters of one fitted column scaler.
#[derive(Debug, Clone, Copy)]
struct ScaleParams {
    center: f64,
    scale: f64,
}

/// Fit one independent mean/std scaler per resolved column.
///
/// Applies globally across the flattened table even when the data is
/// grouped; scaling statistics are population-level, not per-stay.
#[derive(Debug, Clone)]
pub struct StepScale {
    selector: Selector,
    with_mean: bool,
    with_std: bool,
    scalers: BTreeMap<String, ScaleParams>,
    columns: Vec<String>,
    trained: bool,
}

impl StepScale {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            with_mean: true,
            with_std: true,
            scalers: BTreeMap::new(),
            columns: Vec::new(),
            trained: false,
        }
    }

    pub fn with_mean(mut self, with_mean: bool) -> Self {
        self.with_mean = with_mean;
        self
    }

    pub fn with_std(mut self, with_std: bool) -> Self {
        self.with_std = with_std;
        self
    }

    fn fit_column(&self, values: &[Option<f64>]) -> ScaleParams {
        let observed: Vec<f64> = values.iter().copied().flatten().collect();
        let n = observed.len();
        if n == 0 {
            return ScaleParams {
                center: 0.0,
                scale: 1.0,
            };
        }

        let mean = observed.iter().sum::<f64>() / n as f64;
        let center = if self.with_mean { mean } else { 0.0 };

        let scale = if self.with_std && n > 1 {
            let var =
                observed.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1) as f64;
            let std = var.sqrt();
            if std == 0.0 {
                1.0
            } else {
                std
            }
        } else {
            1.0
        };

        ScaleParams { center, scale }
    }
}

impl Step for StepScale {
    fn desc(&self) -> String {
        format!(
            "Scale with mean ({}) and std ({})",
            self.with_mean, self.with_std
        )
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }

    fn trained(&self) -> bool {
        self.trained
    }

    fn group_aware(&self) -> bool {
        false
    }

    fn resolved_columns(&self) -> &[String] {
        &self.columns
    }

    fn fit(&mut self, table: &RecipeTable) -> Result<()> {
        self.columns = self.selector.select(table);
        self.scalers.clear();
        for column in &self.columns {
            let values = table.column_f64(column)?;
            self.scalers
                .insert(column.clone(), self.fit_column(&values));
        }
        self.trained = true;
        Ok(())
    }

    fn transform(&self, table: &RecipeTable) -> Result<RecipeTable> {
        if !self.trained {
            return Err(VitalError::StepNotTrained);
        }

        let mut out = table.clone();
        for column in &self.columns {
            let params = self.scalers[column];
            let values = out
                .column_f64(column)?
                .into_iter()
                .map(|v| v.map(|v| (v - params.center) / params.scale))
                .collect();
            out.set_column_f64(column, values)?;
        }
        Ok(out)
    }
}
