//! Missing-value imputation step.

use crate::error::{Result, VitalError};
use crate::recipe::selector::Selector;
use crate::recipe::step::Step;
use crate::recipe::table::RecipeTable;

/// How missing values are filled.
#[derive(Debug, Clone, PartialEq)]
pub enum FillStrategy {
    /// Replace with a fixed value.
    Value(f64),
    /// Propagate the last valid observation forward.
    Forward,
    /// Propagate the next valid observation backward.
    Backward,
}

impl FillStrategy {
    fn label(&self) -> String {
        match self {
            FillStrategy::Value(v) => format!("{v}"),
            FillStrategy::Forward => "forward fill".to_string(),
            FillStrategy::Backward => "backward fill".to_string(),
        }
    }
}

/// Fill missing values per resolved column, within each group.
///
/// `limit` bounds the fill: for propagation strategies it is the maximum
/// run of consecutive missing values filled from one observation, for value
/// fills the maximum number of fills per column and group.
#[derive(Debug, Clone)]
pub struct StepImputeFill {
    selector: Selector,
    strategy: FillStrategy,
    limit: Option<usize>,
    columns: Vec<String>,
    trained: bool,
}

impl StepImputeFill {
    pub fn new(selector: Selector, strategy: FillStrategy) -> Self {
        Self {
            selector,
            strategy,
            limit: None,
            columns: Vec::new(),
            trained: false,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn fill_run(&self, values: &mut [Option<f64>], rows: &[usize]) {
        match &self.strategy {
            FillStrategy::Value(fill) => {
                let mut filled = 0usize;
                for &row in rows {
                    if values[row].is_none() {
                        if let Some(limit) = self.limit {
                            if filled >= limit {
                                break;
                            }
                        }
                        values[row] = Some(*fill);
                        filled += 1;
                    }
                }
            }
            FillStrategy::Forward => {
                let mut last_valid: Option<f64> = None;
                let mut run = 0usize;
                for &row in rows {
                    match values[row] {
                        Some(v) => {
                            last_valid = Some(v);
                            run = 0;
                        }
                        None => {
                            run += 1;
                            let within_limit =
                                self.limit.map(|limit| run <= limit).unwrap_or(true);
                            if within_limit {
                                values[row] = last_valid;
                            }
                        }
                    }
                }
            }
            FillStrategy::Backward => {
                let mut next_valid: Option<f64> = None;
                let mut run = 0usize;
                for &row in rows.iter().rev() {
                    match values[row] {
                        Some(v) => {
                            next_valid = Some(v);
                            run = 0;
                        }
                        None => {
                            run += 1;
                            let within_limit =
                                self.limit.map(|limit| run <= limit).unwrap_or(true);
                            if within_limit {
                                values[row] = next_valid;
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Step for StepImputeFill {
    fn desc(&self) -> String {
        format!("Impute with {}", self.strategy.label())
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

        let groups = if self.group_aware() {
            table.group_rows()?
        } else {
            vec![(0..table.height()).collect()]
        };

        let mut out = table.clone();
        for column in &self.columns {
            let mut values = out.column_f64(column)?;
            for rows in &groups {
                self.fill_run(&mut values, rows);
            }
            out.set_column_f64(column, values)?;
        }
        Ok(out)
    }
}
