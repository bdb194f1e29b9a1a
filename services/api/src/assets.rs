//! Browser assets served by the API: the embed script and the hosted widget page.

use serde_json::{Value, json};
use voicepulse_core::{
    embed::{
        CLOSE_ID, CLOSE_LABEL, CONTAINER_ID, DEFAULT_BUTTON_LABEL, DEFAULT_HEIGHT, DEFAULT_WIDTH,
        FRAME_ID, LAUNCHER_ID, PANEL_ID,
    },
    protocol::{DEFAULT_AGENT_CONFIG, DEFAULT_TITLE, WidgetQuery},
};

const EMBED_SCRIPT: &str = include_str!("../assets/embed.js");
const WIDGET_PAGE: &str = include_str!("../assets/widget.html");

/// The embed script with element ids and defaults filled in.
pub fn embed_script() -> String {
    let defaults = json!({
        "containerId": CONTAINER_ID,
        "launcherId": LAUNCHER_ID,
        "panelId": PANEL_ID,
        "closeId": CLOSE_ID,
        "closeLabel": CLOSE_LABEL,
        "frameId": FRAME_ID,
        "width": DEFAULT_WIDTH,
        "height": DEFAULT_HEIGHT,
        "buttonLabel": DEFAULT_BUTTON_LABEL,
        "agentConfig": DEFAULT_AGENT_CONFIG,
        "title": DEFAULT_TITLE,
    });
    fill_template(
        EMBED_SCRIPT,
        &[("__VOICEPULSE_DEFAULTS__", &script_json(&defaults))],
    )
}

pub fn widget_page(query: &WidgetQuery) -> String {
    let widget = json!({
        "agentConfig": query.agent_config,
        "agentName": query.agent_name,
        "title": query.title,
    });
    fill_template(
        WIDGET_PAGE,
        &[
            ("{{title}}", &escape_html(&query.title)),
            ("__VOICEPULSE_WIDGET__", &script_json(&widget)),
        ],
    )
}

/// Substitutes placeholders in a single left-to-right pass. Inserted values
/// are never scanned again, so a value containing a placeholder stays literal.
fn fill_template(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let next = substitutions
            .iter()
            .filter_map(|(placeholder, value)| {
                rest.find(placeholder).map(|at| (at, *placeholder, *value))
            })
            .min_by_key(|(at, _, _)| *at);
        match next {
            Some((at, placeholder, value)) => {
                out.push_str(&rest[..at]);
                out.push_str(value);
                rest = &rest[at + placeholder.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

/// JSON that is safe to inline in a `<script>` element. `<` only occurs inside
/// JSON strings, where `\u003c` is an equivalent escape.
fn script_json(value: &Value) -> String {
    value.to_string().replace('<', "\\u003c")
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
