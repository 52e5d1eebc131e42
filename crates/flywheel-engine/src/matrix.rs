//! Matrix expansion into legs.

use flywheel_core::spec::{Leg, MatrixSpec};
use flywheel_core::{Error, Result};
use std::collections::BTreeMap;

/// Expand a matrix declaration into the full ordered set of legs.
///
/// No matrix means a single implicit leg with empty bindings. The cross
/// product follows declaration order: the first-declared axis varies
/// slowest, so run order is deterministic across repeated executions.
/// Explicit `include` legs are appended after the product, deduplicated.
pub fn expand(matrix: Option<&MatrixSpec>) -> Result<Vec<Leg>> {
    let Some(matrix) = matrix else {
        return Ok(vec![Leg::new(0, BTreeMap::new())]);
    };

    matrix.validate()?;

    let mut combinations: Vec<BTreeMap<String, String>> = vec![BTreeMap::new()];
    for axis in &matrix.axes {
        if axis.values.is_empty() {
            // validate() already rejects this; kept as a guard so expansion
            // can never silently produce zero legs.
            return Err(Error::Spec(format!(
                "matrix axis {} has no values",
                axis.name
            )));
        }

        let mut next = Vec::with_capacity(combinations.len() * axis.values.len());
        for combo in combinations {
            for value in &axis.values {
                let mut expanded = combo.clone();
                expanded.insert(axis.name.clone(), value.clone());
                next.push(expanded);
            }
        }
        combinations = next;
    }

    // With no declared axes the product above is one empty combination;
    // drop it when explicit include legs carry the bindings instead.
    if matrix.axes.is_empty() && !matrix.include.is_empty() {
        combinations.clear();
    }

    for include in &matrix.include {
        if !combinations.contains(include) {
            combinations.push(include.clone());
        }
    }

    Ok(combinations
        .into_iter()
        .enumerate()
        .map(|(index, bindings)| Leg::new(index, bindings))
        .collect())
}
