//! Dimension filters carried by scan queries
//!
//! The merge layer never evaluates filters; the underlying runner does. It
//! only rewrites them into a simpler, equivalent form before dispatch.

use serde::{Deserialize, Serialize};

/// A row filter over string dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Filter {
    /// dimension = value (`None` matches null)
    Selector {
        dimension: String,
        value: Option<String>,
    },
    /// dimension in values
    In {
        dimension: String,
        values: Vec<String>,
    },
    /// Lexicographic range on a dimension
    #[serde(rename_all = "camelCase")]
    Bound {
        dimension: String,
        #[serde(default)]
        lower: Option<String>,
        #[serde(default)]
        upper: Option<String>,
        #[serde(default)]
        lower_strict: bool,
        #[serde(default)]
        upper_strict: bool,
    },
    /// All children match
    And { fields: Vec<Filter> },
    /// Any child matches
    Or { fields: Vec<Filter> },
    /// Child does not match
    Not { field: Box<Filter> },
}

impl Filter {
    /// Creates a selector filter
    pub fn selector(dimension: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Selector {
            dimension: dimension.into(),
            value: Some(value.into()),
        }
    }

    /// Creates an in filter
    pub fn in_values(
        dimension: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Filter::In {
            dimension: dimension.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates an and filter
    pub fn and(fields: Vec<Filter>) -> Self {
        Filter::And { fields }
    }

    /// Creates an or filter
    pub fn or(fields: Vec<Filter>) -> Self {
        Filter::Or { fields }
    }

    /// Creates a not filter
    pub fn not(field: Filter) -> Self {
        Filter::Not {
            field: Box::new(field),
        }
    }

    /// Returns an equivalent, simplified filter.
    ///
    /// Rewrites applied bottom-up:
    /// - `in` values are sorted and deduplicated; a single value becomes a selector
    /// - nested `and` inside `and` (and `or` inside `or`) are flattened
    /// - `and`/`or` with exactly one child collapse to that child
    /// - `not(not(x))` becomes `x`
    ///
    /// Optimizing an optimized filter returns it unchanged.
    pub fn optimize(&self) -> Filter {
        match self {
            Filter::In { dimension, values } => {
                let mut values = values.clone();
                values.sort();
                values.dedup();
                if values.len() == 1 {
                    Filter::Selector {
                        dimension: dimension.clone(),
                        value: values.pop(),
                    }
                } else {
                    Filter::In {
                        dimension: dimension.clone(),
                        values,
                    }
                }
            }
            Filter::And { fields } => {
                let flat = flatten(fields, |f| match f {
                    Filter::And { fields } => Ok(fields),
                    other => Err(other),
                });
                collapse(flat, Filter::and)
            }
            Filter::Or { fields } => {
                let flat = flatten(fields, |f| match f {
                    Filter::Or { fields } => Ok(fields),
                    other => Err(other),
                });
                collapse(flat, Filter::or)
            }
            Filter::Not { field } => match field.optimize() {
                Filter::Not { field: inner } => *inner,
                other => Filter::not(other),
            },
            Filter::Selector { .. } | Filter::Bound { .. } => self.clone(),
        }
    }
}

/// Optimizes each child and splices in the children of same-kind nodes.
fn flatten(
    fields: &[Filter],
    same_kind: impl Fn(Filter) -> Result<Vec<Filter>, Filter>,
) -> Vec<Filter> {
    let mut flat = Vec::with_capacity(fields.len());
    for field in fields {
        match same_kind(field.optimize()) {
            Ok(children) => flat.extend(children),
            Err(other) => flat.push(other),
        }
    }
    flat
}

fn collapse(mut fields: Vec<Filter>, rebuild: fn(Vec<Filter>) -> Filter) -> Filter {
    if fields.len() == 1 {
        if let Some(only) = fields.pop() {
            return only;
        }
    }
    rebuild(fields)
}
