//! Generic adapter step wrapping an external fit/transform object.

use ndarray::Array2;

use crate::error::{Result, VitalError};
use crate::recipe::selector::Selector;
use crate::recipe::step::Step;
use crate::recipe::table::RecipeTable;

/// External columnwise/bulk transform plugged into the pipeline.
///
/// Works on dense blocks; missing table values arrive as NaN and NaN
/// outputs are written back as missing.
pub trait ColumnTransform: Send {
    /// Class-style name used when generating output column names.
    fn name(&self) -> &str;

    fn fit(&mut self, block: &Array2<f64>) -> Result<()>;

    fn transform(&self, block: &Array2<f64>) -> Result<Array2<f64>>;

    /// Deep copy, so columnwise fits keep distinct per-column state.
    fn clone_box(&self) -> Box<dyn ColumnTransform>;
}

impl Clone for Box<dyn ColumnTransform> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Clone)]
enum FittedTransforms {
    Joint(Box<dyn ColumnTransform>),
    Columnwise(Vec<(String, Box<dyn ColumnTransform>)>),
}

/// Wrap an arbitrary external transform.
///
/// In columnwise mode every resolved column gets its own deep-copied fit;
/// otherwise one transform is fit jointly across all resolved columns. In
/// in-place mode outputs overwrite the source columns; otherwise new
/// columns are emitted, named by the transform name and output index.
pub struct StepTransform {
    selector: Selector,
    prototype: Box<dyn ColumnTransform>,
    columnwise: bool,
    in_place: bool,
    fitted: Option<FittedTransforms>,
    columns: Vec<String>,
    trained: bool,
}

impl StepTransform {
    pub fn new(selector: Selector, transform: Box<dyn ColumnTransform>) -> Self {
        Self {
            selector,
            prototype: transform,
            columnwise: false,
            in_place: true,
            fitted: None,
            columns: Vec::new(),
            trained: false,
        }
    }

    pub fn columnwise(mut self, columnwise: bool) -> Self {
        self.columnwise = columnwise;
        self
    }

    pub fn in_place(mut self, in_place: bool) -> Self {
        self.in_place = in_place;
        self
    }

    fn block(table: &RecipeTable, columns: &[String]) -> Result<Array2<f64>> {
        let mut block = Array2::zeros((table.height(), columns.len()));
        for (j, column) in columns.iter().enumerate() {
            for (i, value) in table.column_f64(column)?.into_iter().enumerate() {
                block[[i, j]] = value.unwrap_or(f64::NAN);
            }
        }
        Ok(block)
    }

    fn write_output(
        out: &mut RecipeTable,
        output: &Array2<f64>,
        names: &[String],
    ) -> Result<()> {
        if output.ncols() != names.len() {
            return Err(VitalError::ShapeError {
                expected: format!("{} output columns", names.len()),
                actual: format!("{}", output.ncols()),
            });
        }
        for (j, name) in names.iter().enumerate() {
            let values: Vec<Option<f64>> = output
                .column(j)
                .iter()
                .map(|&v| if v.is_nan() { None } else { Some(v) })
                .collect();
            out.set_column_f64(name, values)?;
        }
        Ok(())
    }
}

impl Step for StepTransform {
    fn desc(&self) -> String {
        format!("Use transform {}", self.prototype.name())
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

        if self.columnwise {
            let mut fitted = Vec::new();
            for column in &self.columns {
                let block = Self::block(table, std::slice::from_ref(column))?;
                let mut transform = self.prototype.clone_box();
                transform.fit(&block)?;
                fitted.push((column.clone(), transform));
            }
            self.fitted = Some(FittedTransforms::Columnwise(fitted));
        } else {
            let block = Self::block(table, &self.columns)?;
            let mut transform = self.prototype.clone_box();
            transform.fit(&block)?;
            self.fitted = Some(FittedTransforms::Joint(transform));
        }

        self.trained = true;
        Ok(())
    }

    fn transform(&self, table: &RecipeTable) -> Result<RecipeTable> {
        let Some(fitted) = (self.trained).then_some(self.fitted.as_ref()).flatten() else {
            return Err(VitalError::StepNotTrained);
        };

        let mut out = table.clone();
        match fitted {
            FittedTransforms::Columnwise(transforms) => {
                for (column, transform) in transforms {
                    let block = Self::block(table, std::slice::from_ref(column))?;
                    let output = transform.transform(&block)?;
                    let names: Vec<String> = if self.in_place {
                        if output.ncols() != 1 {
                            return Err(VitalError::RecipeError(format!(
                                "in-place columnwise transform produced {} columns for {column}",
                                output.ncols()
                            )));
                        }
                        vec![column.clone()]
                    } else {
                        (0..output.ncols())
                            .map(|i| format!("{}_{column}_{}", transform.name(), i + 1))
                            .collect()
                    };
                    Self::write_output(&mut out, &output, &names)?;
                }
            }
            FittedTransforms::Joint(transform) => {
                let block = Self::block(table, &self.columns)?;
                let output = transform.transform(&block)?;
                let names: Vec<String> = if self.in_place {
                    if output.ncols() != self.columns.len() {
                        return Err(VitalError::RecipeError(format!(
                            "in-place transform produced {} columns for {} inputs",
                            output.ncols(),
                            self.columns.len()
                        )));
                    }
                    self.columns.clone()
                } else {
                    (0..output.ncols())
                        .map(|i| format!("{}_{}", transform.name(), i + 1))
                        .collect()
                };
                Self::write_output(&mut out, &output, &names)?;
            }
        }
        Ok(out)
    }
}

/// Column-mean centering; the crate's default external transform.
#[derive(Debug, Clone, Default)]
pub struct CenterTransform {
    means: Option<Vec<f64>>,
}

impl CenterTransform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ColumnTransform for CenterTransform {
    fn name(&self) -> &str {
        "Center"
    }

    fn fit(&mut self, block: &Array2<f64>) -> Result<()> {
        let means = block
            .columns()
            .into_iter()
            .map(|col| {
                let observed: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
                if observed.is_empty() {
                    0.0
                } else {
                    observed.iter().sum::<f64>() / observed.len() as f64
                }
            })
            .collect();
        self.means = Some(means);
        Ok(())
    }

    fn transform(&self, block: &Array2<f64>) -> Result<Array2<f64>> {
        let means = self
            .means
            .as_ref()
            .ok_or(VitalError::ModelNotFitted)?;
        if means.len() != block.ncols() {
            return Err(VitalError::ShapeError {
                expected: format!("{} columns", means.len()),
                actual: format!("{}", block.ncols()),
            });
        }
        let mut out = block.clone();
        for (j, mean) in means.iter().enumerate() {
            for v in out.column_mut(j) {
                *v -= mean;
            }
        }
        Ok(out)
    }

    fn clone_box(&self) -> Box<dyn ColumnTransform> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn table() -> RecipeTable {
        let df = df!(
            "a" => &[1.0, 2.0, 3.0],
            "b" => &[10.0, 20.0, 30.0]
        )
        .unwrap();
        RecipeTable::new(df)
    }

    #[test]
    fn test_joint_in_place_overwrites_columns() {
        let mut step = StepTransform::new(
            Selector::all_predictors(),
            Box::new(CenterTransform::new()),
        );
        let out = step.fit_transform(&table()).unwrap();
        assert_eq!(
            out.column_f64("a").unwrap(),
            vec![Some(-1.0), Some(0.0), Some(1.0)]
        );
        assert_eq!(
            out.column_f64("b").unwrap(),
            vec![Some(-10.0), Some(0.0), Some(10.0)]
        );
    }

    #[test]
    fn test_joint_generated_names() {
        let mut step = StepTransform::new(
            Selector::all_predictors(),
            Box::new(CenterTransform::new()),
        )
        .in_place(false);
        let out = step.fit_transform(&table()).unwrap();
        assert_eq!(
            out.column_f64("Center_1").unwrap(),
            vec![Some(-1.0), Some(0.0), Some(1.0)]
        );
        assert!(out.column_f64("Center_2").is_ok());
        // Source columns untouched
        assert_eq!(
            out.column_f64("a").unwrap(),
            vec![Some(1.0), Some(2.0), Some(3.0)]
        );
    }

    #[test]
    fn test_columnwise_generated_names() {
        let mut step = StepTransform::new(
            Selector::all_predictors(),
            Box::new(CenterTransform::new()),
        )
        .columnwise(true)
        .in_place(false);
        let out = step.fit_transform(&table()).unwrap();
        assert_eq!(
            out.column_f64("Center_a_1").unwrap(),
            vec![Some(-1.0), Some(0.0), Some(1.0)]
        );
        assert!(out.column_f64("Center_b_1").is_ok());
    }

    #[test]
    fn test_columnwise_fits_are_independent() {
        let mut step = StepTransform::new(
            Selector::all_predictors(),
            Box::new(CenterTransform::new()),
        )
        .columnwise(true);
        let out = step.fit_transform(&table()).unwrap();
        // Each column centered by its own mean
        assert_eq!(
            out.column_f64("a").unwrap(),
            vec![Some(-1.0), Some(0.0), Some(1.0)]
        );
        assert_eq!(
            out.column_f64("b").unwrap(),
            vec![Some(-10.0), Some(0.0), Some(10.0)]
        );
    }

    #[test]
    fn test_transform_before_fit_is_hard_error() {
        let step = StepTransform::new(
            Selector::all_predictors(),
            Box::new(CenterTransform::new()),
        );
        assert!(matches!(
            step.transform(&table()),
            Err(VitalError::StepNotTrained)
        ));
    }

    #[test]
    fn test_describe_truncates_columns() {
        let df = df!(
            "a" => &[1.0],
            "b" => &[1.0],
            "c" => &[1.0]
        )
        .unwrap();
        let table = RecipeTable::new(df);
        let mut step = StepTransform::new(
            Selector::all_predictors(),
            Box::new(CenterTransform::new()),
        );
        step.fit(&table).unwrap();
        assert_eq!(
            step.describe(),
            "Use transform Center for [a, b, ...] [trained]"
        );
    }
}
