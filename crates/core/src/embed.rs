//! Host-page embed model.
//!
//! This is the behavior of the embed script that host pages include: it reads
//! its configuration from the script tag, injects a launcher and a panel that
//! hosts the widget iframe, and turns open/close clicks into cross-frame
//! signals. The browser script served at `/embed.js` implements the same
//! contract; this module is the reference the server and tests work from.

use crate::protocol::{DEFAULT_AGENT_CONFIG, DEFAULT_TITLE, FrameMessage};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

/// Reserved id of the injected container. Its presence means the widget is installed.
pub const CONTAINER_ID: &str = "voicepulse-widget-root";
pub const LAUNCHER_ID: &str = "voicepulse-launcher";
pub const PANEL_ID: &str = "voicepulse-panel";
pub const CLOSE_ID: &str = "voicepulse-close";
pub const FRAME_ID: &str = "voicepulse-frame";

pub const DEFAULT_WIDTH: u32 = 360;
pub const DEFAULT_HEIGHT: u32 = 520;
pub const DEFAULT_BUTTON_LABEL: &str = "Talk to us";
pub const CLOSE_LABEL: &str = "\u{d7}";

const CLOSE_STYLE: &str =
    "align-self:flex-end;border:none;background:none;font-size:20px;cursor:pointer;";
const FRAME_STYLE: &str = "flex:1;border:none;width:100%;";

/// Attributes read from the invoking script tag.
///
/// Names are accepted with or without the `data-` prefix.
#[derive(Debug, Clone, Default)]
pub struct ScriptAttributes {
    src: Option<String>,
    values: HashMap<String, String>,
}

impl ScriptAttributes {
    pub fn new(src: Option<&str>) -> Self {
        Self {
            src: src.map(str::to_string),
            values: HashMap::new(),
        }
    }

    pub fn from_pairs<'a>(
        src: Option<&str>,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        pairs
            .into_iter()
            .fold(Self::new(src), |attrs, (name, value)| attrs.with(name, value))
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        let name = name.strip_prefix("data-").unwrap_or(&name).to_string();
        self.values.insert(name, value.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn src(&self) -> Option<&str> {
        self.src.as_deref()
    }
}

/// Fixed-corner anchor for the overlay layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    BottomRight,
    BottomLeft,
}

impl Position {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bottom-left" => Self::BottomLeft,
            _ => Self::BottomRight,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BottomRight => "bottom-right",
            Self::BottomLeft => "bottom-left",
        }
    }

    fn side(self) -> &'static str {
        match self {
            Self::BottomRight => "right",
            Self::BottomLeft => "left",
        }
    }
}

/// Embed configuration, fixed once the script has read its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetConfig {
    pub host: String,
    pub agent_config_key: String,
    pub agent_name: Option<String>,
    pub title: String,
    pub position: Position,
    pub inline: bool,
    pub width: u32,
    pub height: u32,
    pub button_label: String,
}

impl WidgetConfig {
    pub fn from_attributes(attrs: &ScriptAttributes) -> Self {
        let text = |name: &str, default: &str| {
            attrs
                .get(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        let pixels = |name: &str, default: u32| {
            attrs
                .get(name)
                .and_then(leading_int)
                .filter(|v| *v > 0)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(default)
        };

        Self {
            host: resolve_host(attrs.get("host"), attrs.src()),
            agent_config_key: text("agent-config", DEFAULT_AGENT_CONFIG),
            agent_name: attrs
                .get("agent-name")
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            title: text("title", DEFAULT_TITLE),
            position: attrs.get("position").map(Position::parse).unwrap_or_default(),
            inline: attrs.get("inline").is_some_and(parse_flag),
            width: pixels("width", DEFAULT_WIDTH),
            height: pixels("height", DEFAULT_HEIGHT),
            button_label: text("button-label", DEFAULT_BUTTON_LABEL),
        }
    }

    /// URL the panel iframe loads: `{host}/widget?agentConfig=..&title=..[&agentName=..]`.
    pub fn frame_url(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("agentConfig", &self.agent_config_key);
        query.append_pair("title", &self.title);
        if let Some(agent_name) = &self.agent_name {
            query.append_pair("agentName", agent_name);
        }
        format!("{}/widget?{}", self.host, query.finish())
    }

    pub fn layout(&self) -> PanelLayout {
        PanelLayout::new(self.position, self.inline, self.width, self.height)
    }
}

/// The leading decimal integer of `raw`, read the way the browser's
/// `parseInt(raw, 10)` reads it: `"400px"` is 400 and `"12.5"` is 12.
fn leading_int(raw: &str) -> Option<i64> {
    let raw = raw.trim_start();
    let (sign, digits) = match raw.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "" | "true" | "1" | "yes" | "inline"
    )
}

/// Resolves the hosted widget origin.
///
/// An explicit host wins. Otherwise the origin of the script's own URL is used.
/// When neither is usable the result is empty, so the iframe request fails
/// visibly instead of guessing.
pub fn resolve_host(explicit: Option<&str>, script_src: Option<&str>) -> String {
    if let Some(host) = explicit.map(str::trim).filter(|h| !h.is_empty()) {
        return host.trim_end_matches('/').to_string();
    }
    script_src
        .and_then(|src| Url::parse(src).ok())
        .map(|url| url.origin())
        .filter(|origin| origin.is_tuple())
        .map(|origin| origin.ascii_serialization())
        .unwrap_or_default()
}

/// Inline CSS for the injected elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelLayout {
    pub container: String,
    pub launcher: String,
    pub panel: String,
}

impl PanelLayout {
    pub fn new(position: Position, inline: bool, width: u32, height: u32) -> Self {
        let side = position.side();
        let container = if inline {
            "position:relative;display:inline-block;".to_string()
        } else {
            format!("position:fixed;bottom:20px;{side}:20px;z-index:2147483000;")
        };
        let panel_anchor = if inline {
            "top:calc(100% + 8px);left:0;".to_string()
        } else {
            format!("bottom:64px;{side}:0;")
        };
        Self {
            container,
            launcher: "border:none;border-radius:24px;padding:12px 20px;cursor:pointer;"
                .to_string(),
            panel: format!(
                "position:absolute;{panel_anchor}width:{width}px;height:{height}px;display:none;\
                 flex-direction:column;border-radius:12px;overflow:hidden;background:#fff;\
                 box-shadow:0 8px 24px rgba(0,0,0,.2);"
            ),
        }
    }
}

/// A node the embed injects into the host page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub id: String,
    pub tag: &'static str,
    pub parent: Option<String>,
    pub style: String,
    pub text: Option<String>,
    pub src: Option<String>,
}

impl Element {
    fn new(id: &str, tag: &'static str, parent: Option<&str>, style: &str) -> Self {
        Self {
            id: id.to_string(),
            tag,
            parent: parent.map(str::to_string),
            style: style.to_string(),
            text: None,
            src: None,
        }
    }
}

/// The slice of the host document the embed touches.
pub trait HostPage {
    fn contains_element(&self, id: &str) -> bool;
    fn append_element(&mut self, element: Element);
}

/// Installs the launcher and panel. Returns `None` when the page already has
/// a widget container, so including the script twice is harmless.
pub fn install<P: HostPage + ?Sized>(page: &mut P, attrs: &ScriptAttributes) -> Option<EmbedWidget> {
    if page.contains_element(CONTAINER_ID) {
        debug!("Widget container already present, skipping install");
        return None;
    }

    let config = WidgetConfig::from_attributes(attrs);
    let layout = config.layout();

    page.append_element(Element::new(CONTAINER_ID, "div", None, &layout.container));

    let mut launcher = Element::new(LAUNCHER_ID, "button", Some(CONTAINER_ID), &layout.launcher);
    launcher.text = Some(config.button_label.clone());
    page.append_element(launcher);

    page.append_element(Element::new(PANEL_ID, "div", Some(CONTAINER_ID), &layout.panel));

    let mut close = Element::new(CLOSE_ID, "button", Some(PANEL_ID), CLOSE_STYLE);
    close.text = Some(CLOSE_LABEL.to_string());
    page.append_element(close);

    let mut frame = Element::new(FRAME_ID, "iframe", Some(PANEL_ID), FRAME_STYLE);
    frame.src = Some(config.frame_url());
    page.append_element(frame);

    Some(EmbedWidget { config, open: false })
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("widget frame is not loaded yet")]
    NotLoaded,
    #[error("widget frame rejected the message: {0}")]
    Rejected(String),
}

/// Where the embed posts frame messages (the iframe's content window).
pub trait FrameTarget {
    fn post(&mut self, message: FrameMessage) -> Result<(), DeliveryError>;
}

/// An installed embed: panel visibility plus signaling.
#[derive(Debug, Clone)]
pub struct EmbedWidget {
    config: WidgetConfig,
    open: bool,
}

impl EmbedWidget {
    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Launcher click: opens a closed panel (connect) or closes an open one (disconnect).
    pub fn toggle<F: FrameTarget + ?Sized>(&mut self, frame: &mut F) {
        if self.open {
            self.close(frame);
        } else {
            self.open = true;
            signal(frame, FrameMessage::Connect);
        }
    }

    /// Header close control. Never opens the panel.
    pub fn close<F: FrameTarget + ?Sized>(&mut self, frame: &mut F) {
        self.open = false;
        signal(frame, FrameMessage::Disconnect);
    }
}

// Delivery is best-effort. A frame that is not loaded yet simply misses the
// signal and the user re-toggles.
fn signal<F: FrameTarget + ?Sized>(frame: &mut F, message: FrameMessage) {
    if let Err(e) = frame.post(message) {
        debug!(?message, error = %e, "Dropping undeliverable frame message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TestPage {
        elements: Vec<Element>,
    }

    impl HostPage for TestPage {
        fn contains_element(&self, id: &str) -> bool {
            self.elements.iter().any(|e| e.id == id)
        }

        fn append_element(&mut self, element: Element) {
            self.elements.push(element);
        }
    }

    #[derive(Default)]
    struct RecordingFrame {
        loaded: bool,
        posted: Vec<FrameMessage>,
    }

    impl FrameTarget for RecordingFrame {
        fn post(&mut self, message: FrameMessage) -> Result<(), DeliveryError> {
            if !self.loaded {
                return Err(DeliveryError::NotLoaded);
            }
            self.posted.push(message);
            Ok(())
        }
    }

    fn query_pairs(frame_url: &str) -> Vec<(String, String)> {
        Url::parse(frame_url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let attrs = ScriptAttributes::new(Some("https://widget.example.org/embed.js"));
        let config = WidgetConfig::from_attributes(&attrs);

        assert_eq!(config.host, "https://widget.example.org");
        assert_eq!(config.agent_config_key, "chatSupervisor");
        assert_eq!(config.agent_name, None);
        assert_eq!(config.title, "Voice Assistant");
        assert_eq!(config.position, Position::BottomRight);
        assert!(!config.inline);
        assert_eq!((config.width, config.height), (360, 520));
        assert_eq!(config.button_label, "Talk to us");
    }

    #[test]
    fn test_attributes_override_defaults_and_unknown_are_ignored() {
        let attrs = ScriptAttributes::from_pairs(
            None,
            [
                ("data-host", "https://voice.example.net/"),
                ("data-agent-config", "feedbackSurvey"),
                ("data-agent-name", "surveyAgent"),
                ("data-width", "400px"),
                ("data-height", "tall"),
                ("data-theme", "dark"),
                ("inline", "true"),
            ],
        );
        let config = WidgetConfig::from_attributes(&attrs);

        assert_eq!(config.host, "https://voice.example.net");
        assert_eq!(config.agent_config_key, "feedbackSurvey");
        assert_eq!(config.agent_name.as_deref(), Some("surveyAgent"));
        assert_eq!(config.width, 400);
        assert_eq!(config.height, DEFAULT_HEIGHT);
        assert!(config.inline);
    }

    #[test]
    fn test_sizes_read_leading_integer() {
        let size = |raw: &str| {
            WidgetConfig::from_attributes(&ScriptAttributes::from_pairs(None, [("width", raw)]))
                .width
        };
        assert_eq!(size("12.5"), 12);
        assert_eq!(size(" 300 "), 300);
        assert_eq!(size("+280px"), 280);
        assert_eq!(size("-5"), DEFAULT_WIDTH);
        assert_eq!(size("0"), DEFAULT_WIDTH);
        assert_eq!(size("px400"), DEFAULT_WIDTH);
        assert_eq!(size("99999999999"), DEFAULT_WIDTH);
    }

    #[test]
    fn test_close_control_is_a_cross_not_the_title() {
        let mut page = TestPage::default();
        let attrs = ScriptAttributes::from_pairs(
            Some("https://example.com/embed.js"),
            [("title", "Billing Help")],
        );
        install(&mut page, &attrs).unwrap();

        let close = page.elements.iter().find(|e| e.id == CLOSE_ID).unwrap();
        assert_eq!(close.parent.as_deref(), Some(PANEL_ID));
        assert_eq!(close.text.as_deref(), Some("\u{d7}"));
    }

    #[test]
    fn test_host_falls_back_to_empty_on_bad_src() {
        assert_eq!(resolve_host(None, Some("::not a url::")), "");
        assert_eq!(resolve_host(None, None), "");
        assert_eq!(resolve_host(Some("  "), Some("data:text/javascript,1")), "");
    }

    #[test]
    fn test_frame_url_encodes_params() {
        let attrs = ScriptAttributes::from_pairs(
            Some("https://example.com/embed.js"),
            [("title", "Help & Support"), ("agent-config", "chat supervisor")],
        );
        let url = WidgetConfig::from_attributes(&attrs).frame_url();

        assert!(url.starts_with("https://example.com/widget?"));
        assert!(!url.contains("Help & Support"));
        assert_eq!(
            query_pairs(&url),
            vec![
                ("agentConfig".to_string(), "chat supervisor".to_string()),
                ("title".to_string(), "Help & Support".to_string()),
            ]
        );
    }

    #[test]
    fn test_frame_url_agent_name_only_when_supplied() {
        let without = ScriptAttributes::from_pairs(
            Some("https://example.com/embed.js"),
            [("agent-name", "")],
        );
        let url = WidgetConfig::from_attributes(&without).frame_url();
        assert!(!url.contains("agentName"));

        let with = ScriptAttributes::from_pairs(
            Some("https://example.com/embed.js"),
            [("agent-name", "haikuWriter")],
        );
        let url = WidgetConfig::from_attributes(&with).frame_url();
        assert!(
            query_pairs(&url).contains(&("agentName".to_string(), "haikuWriter".to_string()))
        );
    }

    #[test]
    fn test_bottom_left_scenario() {
        let mut page = TestPage::default();
        let attrs = ScriptAttributes::from_pairs(
            Some("https://example.com/static/embed.js"),
            [("data-position", "bottom-left")],
        );
        let widget = install(&mut page, &attrs).expect("first install succeeds");

        assert_eq!(widget.config().position, Position::BottomLeft);
        let container = page.elements.iter().find(|e| e.id == CONTAINER_ID).unwrap();
        assert!(container.style.contains("position:fixed"));
        assert!(container.style.contains("left:20px"));
        let frame = page.elements.iter().find(|e| e.id == FRAME_ID).unwrap();
        assert!(
            frame
                .src
                .as_deref()
                .unwrap()
                .starts_with("https://example.com/widget?")
        );
    }

    #[test]
    fn test_inline_layout_is_not_fixed() {
        let layout = PanelLayout::new(Position::BottomRight, true, 300, 400);
        assert!(!layout.container.contains("fixed"));
        assert!(layout.panel.contains("width:300px"));
        assert!(layout.panel.contains("height:400px"));
    }

    #[test]
    fn test_install_is_idempotent() {
        let mut page = TestPage::default();
        let attrs = ScriptAttributes::new(Some("https://example.com/embed.js"));

        assert!(install(&mut page, &attrs).is_some());
        assert!(install(&mut page, &attrs).is_none());
        let containers = page.elements.iter().filter(|e| e.id == CONTAINER_ID).count();
        assert_eq!(containers, 1);
    }

    #[test]
    fn test_toggle_sends_connect_then_disconnect() {
        let mut page = TestPage::default();
        let mut widget =
            install(&mut page, &ScriptAttributes::new(Some("https://example.com/a.js"))).unwrap();
        let mut frame = RecordingFrame {
            loaded: true,
            ..Default::default()
        };

        widget.toggle(&mut frame);
        assert!(widget.is_open());
        widget.toggle(&mut frame);
        assert!(!widget.is_open());

        assert_eq!(frame.posted, vec![FrameMessage::Connect, FrameMessage::Disconnect]);
    }

    #[test]
    fn test_close_control_never_opens() {
        let mut page = TestPage::default();
        let mut widget =
            install(&mut page, &ScriptAttributes::new(Some("https://example.com/a.js"))).unwrap();
        let mut frame = RecordingFrame {
            loaded: true,
            ..Default::default()
        };

        widget.close(&mut frame);
        assert!(!widget.is_open());
        assert_eq!(frame.posted, vec![FrameMessage::Disconnect]);
    }

    #[test]
    fn test_undelivered_signal_still_toggles_panel() {
        let mut page = TestPage::default();
        let mut widget =
            install(&mut page, &ScriptAttributes::new(Some("https://example.com/a.js"))).unwrap();
        let mut frame = RecordingFrame::default();

        widget.toggle(&mut frame);
        assert!(widget.is_open());
        assert!(frame.posted.is_empty());

        frame.loaded = true;
        widget.toggle(&mut frame);
        widget.toggle(&mut frame);
        assert_eq!(frame.posted, vec![FrameMessage::Disconnect, FrameMessage::Connect]);
    }
}
