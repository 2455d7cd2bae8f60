//! Message template rendering
//!
//! A `{name}` token whose name is a context key is replaced with
//! `<span data-prop="name">value</span>` and the key is removed from the
//! context. Tokens naming no context key are left as written. Values are
//! inserted without escaping.

use std::collections::BTreeSet;

use insight_core::{Context, display_value};

/// Render placeholders in `message` from `context`
///
/// Returns the rendered message and the context keys no placeholder used.
/// The message is scanned once from left to right, so text produced by a
/// substitution is never scanned again.
pub fn render_template(message: &str, mut context: Context) -> (String, Context) {
    let mut rendered = String::with_capacity(message.len());
    let mut consumed: BTreeSet<String> = BTreeSet::new();
    let mut rest = message;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let token = after
            .find(['{', '}'])
            .filter(|&end| after.as_bytes()[end] == b'}')
            .map(|end| &after[..end]);

        match token.and_then(|name| context.get(name).map(|value| (name, value))) {
            Some((name, value)) => {
                rendered.push_str(&span(name, &display_value(value)));
                consumed.insert(name.to_string());
                rest = &after[name.len() + 1..];
            }
            None => {
                rendered.push('{');
                rest = after;
            }
        }
    }
    rendered.push_str(rest);

    for name in &consumed {
        context.remove(name);
    }

    (rendered, context)
}

fn span(name: &str, value: &str) -> String {
    format!(r#"<span data-prop="{name}">{value}</span>"#)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: serde_json::Value) -> Context {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("context must be an object"),
        }
    }

    #[test]
    fn test_renders_and_strips_used_keys() {
        let (message, rest) = render_template(
            "Failed to send email from {from} to {to}",
            ctx(json!({"from": "a@x.com", "to": "b@x.com", "extra": true})),
        );
        assert_eq!(
            message,
            r#"Failed to send email from <span data-prop="from">a@x.com</span> to <span data-prop="to">b@x.com</span>"#
        );
        assert_eq!(rest, ctx(json!({"extra": true})));
    }

    #[test]
    fn test_repeated_token() {
        let (message, rest) = render_template("{n} and {n}", ctx(json!({"n": 3})));
        assert_eq!(
            message,
            r#"<span data-prop="n">3</span> and <span data-prop="n">3</span>"#
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn test_unknown_tokens_are_kept() {
        let (message, rest) = render_template("Hello {name}, {missing}", ctx(json!({"name": "Ana"})));
        assert_eq!(message, r#"Hello <span data-prop="name">Ana</span>, {missing}"#);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_substituted_text_is_not_rescanned() {
        let (message, rest) = render_template("{a} {b}", ctx(json!({"a": "{b}", "b": "x"})));
        assert_eq!(
            message,
            r#"<span data-prop="a">{b}</span> <span data-prop="b">x</span>"#
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn test_exact_token_match() {
        let (message, rest) = render_template("{user_id} {user}", ctx(json!({"user": "u"})));
        assert_eq!(message, r#"{user_id} <span data-prop="user">u</span>"#);
        assert!(rest.is_empty());

        let (message, rest) = render_template("{user_id}", ctx(json!({"user": "u"})));
        assert_eq!(message, "{user_id}");
        assert_eq!(rest, ctx(json!({"user": "u"})));
    }

    #[test]
    fn test_unbalanced_braces() {
        let (message, _) = render_template("{{a} {", ctx(json!({"a": 1})));
        assert_eq!(message, r#"{<span data-prop="a">1</span> {"#);

        let (message, _) = render_template("}{a", ctx(json!({"a": 1})));
        assert_eq!(message, "}{a");
    }

    #[test]
    fn test_value_display() {
        let (message, _) = render_template(
            "{s}|{n}|{b}|{z}|{l}",
            ctx(json!({"s": "text", "n": 1.5, "b": false, "z": null, "l": [1, 2]})),
        );
        assert_eq!(
            message,
            concat!(
                r#"<span data-prop="s">text</span>|"#,
                r#"<span data-prop="n">1.5</span>|"#,
                r#"<span data-prop="b">false</span>|"#,
                r#"<span data-prop="z"></span>|"#,
                r#"<span data-prop="l">[1,2]</span>"#
            )
        );
    }

    #[test]
    fn test_multibyte_text() {
        let (message, _) = render_template("ž {k} ž", ctx(json!({"k": "č"})));
        assert_eq!(message, r#"ž <span data-prop="k">č</span> ž"#);
    }
}
