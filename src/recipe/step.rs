//! The step contract: fit once, apply many times.

use crate::error::Result;
use crate::recipe::selector::Selector;
use crate::recipe::table::RecipeTable;

/// One stateful unit of a preprocessing pipeline.
///
/// A step starts untrained, resolves its selector into a frozen column list
/// during `fit`, and only then supports `transform`. Calling `transform`
/// before `fit` completes is a contract violation and fails with
/// [`crate::error::VitalError::StepNotTrained`]. Resolved columns are reused
/// verbatim at transform time regardless of later schema changes.
pub trait Step: Send {
    /// Short semantic description, e.g. `"Impute with forward fill"`.
    fn desc(&self) -> String;

    /// The selector this step resolves at fit time.
    fn selector(&self) -> &Selector;

    /// Whether `fit` has completed.
    fn trained(&self) -> bool;

    /// Whether `transform` operates within each group rather than over the
    /// flattened table.
    fn group_aware(&self) -> bool {
        true
    }

    /// Columns resolved at fit time (empty before `fit`).
    fn resolved_columns(&self) -> &[String];

    /// Resolve columns and compute any per-column state.
    fn fit(&mut self, table: &RecipeTable) -> Result<()>;

    /// Apply the fitted transformation, returning the transformed table.
    fn transform(&self, table: &RecipeTable) -> Result<RecipeTable>;

    /// Fit, then transform, unconditionally.
    fn fit_transform(&mut self, table: &RecipeTable) -> Result<RecipeTable> {
        self.fit(table)?;
        self.transform(table)
    }

    /// Textual representation: description, then either the selector
    /// description (untrained) or the resolved columns (truncated to two
    /// entries), then a trained marker.
    fn describe(&self) -> String {
        let mut repr = format!("{} for ", self.desc());
        if !self.trained() {
            repr.push_str(self.selector().description());
        } else {
            let columns = self.resolved_columns();
            if columns.len() > 2 {
                repr.push_str(&format!("[{}, {}, ...]", columns[0], columns[1]));
            } else {
                repr.push_str(&format!("{columns:?}"));
            }
            repr.push_str(" [trained]");
        }
        repr
    }
}
