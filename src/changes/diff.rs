//! Structural field-level diff between two flag definitions.

use crate::error::RenderError;
use serde_json::Value;
use std::collections::BTreeSet;

/// Deepest nesting the diff walker descends into.
pub const MAX_DIFF_DEPTH: usize = 64;

const ROOT_PATH: &str = "(root)";
const ABSENT: &str = "<none>";

/// One changed leaf field of an updated flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    /// Dotted path of the field, array elements as `[i]`
    pub path: String,
    /// Rendered value before the change, `<none>` when absent
    pub before: String,
    /// Rendered value after the change, `<none>` when absent
    pub after: String,
}

impl FieldChange {
    /// Render as `old => new`.
    pub fn summary(&self) -> String {
        format!("{} => {}", self.before, self.after)
    }
}

/// Compute the changed fields between two definitions of `flag`, sorted by path.
///
/// Fields that are identical on both sides are omitted, so structurally equal
/// definitions produce an empty list.
///
/// # Errors
///
/// Returns [`RenderError::TooDeep`] when either side nests deeper than
/// [`MAX_DIFF_DEPTH`].
///
/// # Examples
///
/// ```rust
/// use flag_relay::changes::field_diff;
/// use serde_json::json;
///
/// let before = json!({"disable": false, "rollout": {"percentage": 10}});
/// let after = json!({"disable": false, "rollout": {"percentage": 50}});
///
/// let fields = field_diff("checkout", &before, &after).unwrap();
/// assert_eq!(fields.len(), 1);
/// assert_eq!(fields[0].path, "rollout.percentage");
/// assert_eq!(fields[0].summary(), "10 => 50");
/// ```
pub fn field_diff(flag: &str, before: &Value, after: &Value) -> Result<Vec<FieldChange>, RenderError> {
    let mut out = Vec::new();
    walk("", Some(before), Some(after), 0, &mut out).map_err(|()| RenderError::TooDeep {
        flag: flag.to_string(),
        limit: MAX_DIFF_DEPTH,
    })?;
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

fn walk(
    path: &str,
    before: Option<&Value>,
    after: Option<&Value>,
    depth: usize,
    out: &mut Vec<FieldChange>,
) -> Result<(), ()> {
    if depth > MAX_DIFF_DEPTH {
        return Err(());
    }

    match (before, after) {
        (Some(Value::Object(old)), Some(Value::Object(new))) => {
            let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
            for key in keys {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                walk(&child, old.get(key), new.get(key), depth + 1, out)?;
            }
        }
        (Some(Value::Array(old)), Some(Value::Array(new))) => {
            for index in 0..old.len().max(new.len()) {
                let child = format!("{}[{}]", path, index);
                walk(&child, old.get(index), new.get(index), depth + 1, out)?;
            }
        }
        (old, new) if old != new => {
            check_depth(old, depth)?;
            check_depth(new, depth)?;
            out.push(FieldChange {
                path: if path.is_empty() {
                    ROOT_PATH.to_string()
                } else {
                    path.to_string()
                },
                before: render(old),
                after: render(new),
            });
        }
        _ => {}
    }

    Ok(())
}

/// Reject leaves that would be rendered whole but nest past the limit.
fn check_depth(value: Option<&Value>, depth: usize) -> Result<(), ()> {
    fn nesting(value: &Value, budget: usize) -> bool {
        if budget == 0 {
            return false;
        }
        match value {
            Value::Object(map) => map.values().all(|v| nesting(v, budget - 1)),
            Value::Array(items) => items.iter().all(|v| nesting(v, budget - 1)),
            _ => true,
        }
    }

    match value {
        Some(value) if !nesting(value, MAX_DIFF_DEPTH + 1 - depth) => Err(()),
        _ => Ok(()),
    }
}

fn render(value: Option<&Value>) -> String {
    match value {
        None => ABSENT.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
