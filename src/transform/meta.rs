//! Meta-tag injection for HTML documents.

use html_escape::encode_double_quoted_attribute;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::env::EnvironmentStore;

/// First opening head tag; `<header>` and `<heading>` do not match.
static HEAD_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").expect("head tag pattern"));

/// One previously injected tag at the start of the remaining input.
static INJECTED_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*<meta name="([^"]*)" content="[^"]*">"#).expect("meta tag pattern")
});

const INDENT: &str = "\n    ";

/// Insert one `<meta name="KEY" content="VALUE">` per store entry right after the
/// first `<head>` tag, in store order.
///
/// A run of meta tags directly after `<head>` whose names are store keys is
/// treated as an earlier injection and replaced, so applying this twice yields a
/// single block. The run ends at the first tag whose name is not a current key:
/// a tag left by a key that has since been removed from the store, and anything
/// after it, stays in the document. Documents without a head tag, or an empty
/// store, are returned unchanged.
pub fn inject_meta_tags(html: &str, env: &EnvironmentStore) -> String {
    if env.is_empty() {
        return html.to_string();
    }
    let Some(head) = HEAD_TAG.find(html) else {
        return html.to_string();
    };

    let names: Vec<_> = env.keys().map(encode_double_quoted_attribute).collect();

    let mut resume = head.end();
    while let Some(caps) = INJECTED_META.captures(&html[resume..]) {
        let name = caps.get(1).map_or("", |m| m.as_str());
        if !names.iter().any(|n| n.as_ref() == name) {
            break;
        }
        resume += caps.get(0).map_or(0, |m| m.end());
    }

    let mut out = String::with_capacity(html.len() + env.len() * 64);
    out.push_str(&html[..head.end()]);
    for (key, value) in env.iter() {
        out.push_str(INDENT);
        out.push_str(&meta_tag(key, value));
    }
    out.push_str(&html[resume..]);
    out
}

fn meta_tag(key: &str, value: &str) -> String {
    format!(
        r#"<meta name="{}" content="{}">"#,
        encode_double_quoted_attribute(key),
        encode_double_quoted_attribute(value)
    )
}
