//! Placeholder resolver (spec.md §4.1).
//!
//! Replaces `{{Key}}` / `{{Ns.Key}}` tokens in strings, recursing through
//! sequences and mappings. Pure function of `(value, ctx)`: no I/O, no
//! mutation, deterministic, reentrant. Tokens inside a substituted value are
//! never re-expanded (one pass per cell).

use serde_json::Value;

/// Merge context layers, highest precedence first. Each layer is a JSON
/// object; later layers fill in keys the earlier ones didn't set. Non-object
/// layers are ignored.
#[must_use]
pub fn merge_contexts(layers: &[&Value]) -> Value {
    let mut merged = serde_json::Map::new();
    // Iterate in reverse so earlier (higher-precedence) layers overwrite.
    for layer in layers.iter().rev() {
        if let Value::Object(obj) = layer {
            for (k, v) in obj {
                merged.insert(k.clone(), v.clone());
            }
        }
    }
    Value::Object(merged)
}

/// Look up a dotted path (`a.b.c`) in a nested JSON object context.
fn lookup<'a>(ctx: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = ctx;
    for segment in path.split('.') {
        match current {
            Value::Object(obj) => current = obj.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Culture-invariant string representation of a resolved value.
fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

const TOKEN_OPEN: &str = "{{";
const TOKEN_CLOSE: &str = "}}";

/// Replace every maximal, non-overlapping `{{Key}}` token in `s`.
/// Unresolved tokens (including their braces) are left untouched.
fn resolve_string(s: &str, ctx: &Value) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find(TOKEN_OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + TOKEN_OPEN.len()..];
        match after_open.find(TOKEN_CLOSE) {
            Some(end) => {
                let key = &after_open[..end];
                // A key must look like a dotted identifier; otherwise treat
                // the `{{` as literal text and keep scanning past it.
                if is_valid_key(key) {
                    match lookup(ctx, key) {
                        Some(v) => out.push_str(&stringify(v)),
                        None => {
                            out.push_str(TOKEN_OPEN);
                            out.push_str(key);
                            out.push_str(TOKEN_CLOSE);
                        }
                    }
                    rest = &after_open[end + TOKEN_CLOSE.len()..];
                } else {
                    out.push_str(TOKEN_OPEN);
                    rest = after_open;
                }
            }
            None => {
                // No closing braces left in the string at all.
                out.push_str(TOKEN_OPEN);
                rest = after_open;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// Recursively resolve placeholders in a string, sequence, or mapping.
#[must_use]
pub fn resolve(value: &Value, ctx: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_string(s, ctx)),
        Value::Array(arr) => Value::Array(arr.iter().map(|v| resolve(v, ctx)).collect()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), resolve(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_nested_key() {
        let ctx = json!({"User": {"Name": "Bart"}});
        let out = resolve(&json!("hello {{User.Name}}"), &ctx);
        assert_eq!(out, json!("hello Bart"));
    }

    #[test]
    fn leaves_unresolved_token_literal() {
        let ctx = json!({});
        let out = resolve(&json!("hi {{missing}}"), &ctx);
        assert_eq!(out, json!("hi {{missing}}"));
    }

    #[test]
    fn resolves_sequences_and_mappings() {
        let ctx = json!({"Out": "/tmp"});
        let out = resolve(&json!(["{{Out}}/a", {"path": "{{Out}}/b"}]), &ctx);
        assert_eq!(out, json!(["/tmp/a", {"path": "/tmp/b"}]));
    }

    #[test]
    fn non_string_scalars_pass_through() {
        let ctx = json!({});
        assert_eq!(resolve(&json!(42), &ctx), json!(42));
        assert_eq!(resolve(&json!(true), &ctx), json!(true));
        assert_eq!(resolve(&Value::Null, &ctx), Value::Null);
    }

    #[test]
    fn substituted_text_is_not_re_expanded() {
        // Context value itself contains a token-looking string; it must be
        // inserted verbatim, not recursively resolved.
        let ctx = json!({"A": "{{B}}", "B": "real"});
        let out = resolve(&json!("{{A}}"), &ctx);
        assert_eq!(out, json!("{{B}}"));
    }

    #[test]
    fn full_resolution_is_idempotent() {
        let ctx = json!({"User": {"Name": "Bart"}, "Out": "/tmp"});
        let input = json!("hello {{User.Name}} at {{Out}}");
        let once = resolve(&input, &ctx);
        let twice = resolve(&once, &ctx);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_contexts_precedence() {
        let high = json!({"a": 1, "b": 2});
        let low = json!({"b": 99, "c": 3});
        let merged = merge_contexts(&[&high, &low]);
        assert_eq!(merged, json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn is_deterministic() {
        let ctx = json!({"k": "v"});
        let input = json!("{{k}}-{{k}}");
        assert_eq!(resolve(&input, &ctx), resolve(&input, &ctx));
    }
}
