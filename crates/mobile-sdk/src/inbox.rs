//! Parsing of in-app content delivered by the poll endpoint and the realtime
//! socket into items the display layer can route.

use pushapp_core::types::{Delivery, InAppPayload, TooltipStyle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::lenient;

const DEFAULT_ALIGN: &str = "flex-end";
const DEFAULT_TYPE: &str = "roadblock";
const DEFAULT_TOOLTIP_TARGET: &str = "default";

/// One routable unit of in-app content.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundItem {
    /// Goes through the display queue.
    Overlay(InAppPayload),
    /// HTML for a registered placeholder (or tooltip target) id.
    Placeholder {
        placeholder_id: String,
        message_id: String,
        html: String,
    },
    /// Styled tooltip for a registered target id.
    Tooltip(TooltipItem),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TooltipItem {
    pub target: String,
    pub message_id: String,
    pub filter_id: String,
    pub style: TooltipStyle,
}

/// Broadcast for tooltips no registered target claimed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TooltipEvent {
    pub target: String,
    pub style: TooltipStyle,
}

#[derive(Debug, Default, Deserialize)]
struct PollResponse {
    #[serde(default, deserialize_with = "lenient::flag")]
    success: bool,
    /// Kept raw so one malformed result cannot sink its siblings.
    #[serde(default, deserialize_with = "lenient::list")]
    results: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollResult {
    #[serde(default, deserialize_with = "lenient::text")]
    message_id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    filter_id: String,
    #[serde(default)]
    template: Option<Template>,
    #[serde(default)]
    event: Option<TriggerEvent>,
}

#[derive(Debug, Default, Deserialize)]
struct Template {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    code: Option<String>,
    #[serde(default)]
    style: Option<Style>,
}

#[derive(Debug, Default, Deserialize)]
struct TriggerEvent {
    #[serde(default)]
    event_data: Option<EventData>,
}

#[derive(Debug, Default, Deserialize)]
struct EventData {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    compare: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Style {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    code: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    html: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient::opt_string")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    vertical_align: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    horizontal_align: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    draggable: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    line_1: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    line_2: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    line1_icon: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    bg_color: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    width: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    line1_font_size: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    line2_font_size: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    line1_font_color: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    line2_font_color: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Style {
    /// Layout code, falling back to the declared type.
    fn layout_code(&self) -> String {
        non_blank(self.code.clone())
            .or_else(|| non_blank(self.kind.clone()))
            .unwrap_or_else(|| DEFAULT_TYPE.to_string())
    }

    fn tooltip_style(self) -> TooltipStyle {
        let defaults = TooltipStyle::default();
        TooltipStyle {
            title: self.line_1.unwrap_or_default(),
            message: self.line_2.unwrap_or_default(),
            icon: self
                .line1_icon
                .map(|raw| decode_html_text(&raw))
                .filter(|icon| !icon.is_empty()),
            bg_color: non_blank(self.bg_color),
            width_percent: self.width.unwrap_or(defaults.width_percent),
            line1_font_size: self.line1_font_size.unwrap_or(defaults.line1_font_size),
            line2_font_size: self.line2_font_size.unwrap_or(defaults.line2_font_size),
            line1_font_color: non_blank(self.line1_font_color),
            line2_font_color: non_blank(self.line2_font_color),
        }
    }
}

/// Parse a poll response body. Anything unusable yields no items.
pub fn parse_poll_response(raw: &str) -> Vec<InboundItem> {
    if raw.trim().is_empty() {
        warn!("Empty poll in-app response body");
        return Vec::new();
    }
    let response: PollResponse = match serde_json::from_str(raw) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Error parsing poll in-app response");
            return Vec::new();
        }
    };
    if !response.success {
        warn!("Poll in-app returned success=false");
        return Vec::new();
    }

    let items: Vec<InboundItem> = response
        .results
        .into_iter()
        .enumerate()
        .filter_map(|(index, raw)| match serde_json::from_value::<PollResult>(raw) {
            Ok(result) => poll_result_item(result),
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed poll result");
                None
            }
        })
        .collect();
    debug!(count = items.len(), "Parsed poll response");
    items
}

fn poll_result_item(result: PollResult) -> Option<InboundItem> {
    let template = result.template.unwrap_or_default();
    let style = template.style?;
    let code = style.code.clone()?;
    let compare = non_blank(
        result
            .event
            .and_then(|e| e.event_data)
            .and_then(|d| d.compare),
    );

    if code.eq_ignore_ascii_case("tooltip") {
        let target = compare
            .or_else(|| non_blank(template.code))
            .unwrap_or_else(|| DEFAULT_TOOLTIP_TARGET.to_string());
        return Some(InboundItem::Tooltip(TooltipItem {
            target,
            message_id: result.message_id,
            filter_id: result.filter_id,
            style: style.tooltip_style(),
        }));
    }

    let html = style.html.clone().unwrap_or_default();
    if let Some(placeholder_id) = compare {
        return Some(InboundItem::Placeholder {
            placeholder_id,
            message_id: result.message_id,
            html,
        });
    }

    Some(InboundItem::Overlay(InAppPayload {
        message_id: result.message_id,
        filter_id: result.filter_id,
        layout_code: style.layout_code(),
        html,
        vertical_align: Some(
            style
                .vertical_align
                .unwrap_or_else(|| DEFAULT_ALIGN.to_string()),
        ),
        horizontal_align: Some(
            style
                .horizontal_align
                .unwrap_or_else(|| DEFAULT_ALIGN.to_string()),
        ),
        draggable: style.draggable.unwrap_or(false),
        placeholder_id: None,
        delivery: Delivery::Polled,
    }))
}

/// Parse a socket notification frame of `type == "in_app"`.
///
/// `data` is either a JSON string or an object holding `results[]` of
/// templates, or a single `{code, html, type}` object.
pub fn parse_socket_notification(frame: &Value) -> Vec<InAppPayload> {
    if frame.get("type").and_then(Value::as_str) != Some("in_app") {
        debug!("Socket notification is not in-app");
        return Vec::new();
    }
    let data = match frame.get("data") {
        Some(Value::String(raw)) if !raw.is_empty() => match serde_json::from_str::<Value>(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to parse in-app socket data");
                return Vec::new();
            }
        },
        Some(v @ Value::Object(_)) => v.clone(),
        _ => {
            debug!("Socket notification has no data");
            return Vec::new();
        }
    };

    let results = data
        .get("results")
        .and_then(Value::as_array)
        .filter(|r| !r.is_empty());
    let payloads: Vec<InAppPayload> = match results {
        Some(results) => results
            .iter()
            .filter_map(|item| {
                let style = item.get("template")?.get("style")?;
                socket_payload(item, style)
            })
            .collect(),
        None => socket_payload(&data, &data).into_iter().collect(),
    };

    if payloads.is_empty() {
        warn!("No valid in-app items found in socket notification");
    }
    payloads
}

fn socket_payload(item: &Value, style: &Value) -> Option<InAppPayload> {
    let text = |v: &Value, key: &str| {
        v.get(key)
            .and_then(lenient::scalar_string)
            .unwrap_or_default()
    };
    let html = text(style, "html");
    if html.is_empty() {
        return None;
    }
    let code = text(style, "code");
    let kind = text(style, "type");
    let layout_code = [code, kind]
        .into_iter()
        .find(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TYPE.to_string());

    Some(InAppPayload {
        message_id: text(item, "messageId"),
        filter_id: text(item, "filterId"),
        layout_code,
        html,
        vertical_align: style
            .get("vertical_align")
            .and_then(lenient::scalar_string),
        horizontal_align: style
            .get("horizontal_align")
            .and_then(lenient::scalar_string),
        draggable: style
            .get("draggable")
            .and_then(lenient::scalar_bool)
            .unwrap_or(false),
        placeholder_id: None,
        delivery: Delivery::Socket,
    })
}

/// Reduce an HTML fragment to its text: tags dropped, entities decoded.
pub fn decode_html_text(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find(';').and_then(|end| {
            decode_entity(&tail[1..end]).map(|decoded| (decoded, end))
        }) {
            Some((decoded, end)) => {
                out.push(decoded);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" | "#39" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_poll_overlay_defaults() {
        let raw = json!({
            "success": true,
            "results": [{
                "messageId": "m1",
                "filterId": "f1",
                "template": {"code": "promo", "style": {"code": "banner_top", "html": "<b>hi</b>"}}
            }]
        })
        .to_string();

        let items = parse_poll_response(&raw);
        assert_eq!(items.len(), 1);
        let InboundItem::Overlay(p) = &items[0] else {
            panic!("expected overlay, got {:?}", items[0]);
        };
        assert_eq!(p.layout_code, "banner_top");
        assert_eq!(p.vertical_align.as_deref(), Some("flex-end"));
        assert_eq!(p.horizontal_align.as_deref(), Some("flex-end"));
        assert!(!p.draggable);
        assert_eq!(p.delivery, Delivery::Polled);
    }

    #[test]
    fn test_poll_placeholder_and_tooltip() {
        let raw = json!({
            "success": true,
            "results": [
                {
                    "messageId": "m2", "filterId": "f2",
                    "template": {"style": {"code": "inline", "html": "<div/>"}},
                    "event": {"event_data": {"compare": "home_slot"}}
                },
                {
                    "messageId": "m3", "filterId": "f3",
                    "template": {"code": "cart_button", "style": {
                        "code": "Tooltip", "line_1": "New", "line_2": "Try it",
                        "line1_icon": "&#128293;", "width": 80, "line1_font_color": ""
                    }}
                }
            ]
        })
        .to_string();

        let items = parse_poll_response(&raw);
        assert_eq!(
            items[0],
            InboundItem::Placeholder {
                placeholder_id: "home_slot".into(),
                message_id: "m2".into(),
                html: "<div/>".into()
            }
        );
        let InboundItem::Tooltip(tip) = &items[1] else {
            panic!("expected tooltip");
        };
        assert_eq!(tip.target, "cart_button");
        assert_eq!(tip.style.title, "New");
        assert_eq!(tip.style.icon.as_deref(), Some("\u{1F525}"));
        assert_eq!(tip.style.width_percent, 80);
        assert_eq!(tip.style.line2_font_size, 12);
        assert!(tip.style.line1_font_color.is_none());
    }

    #[test]
    fn test_tooltip_target_falls_back_to_default() {
        let raw = json!({
            "success": true,
            "results": [{"messageId": "m", "filterId": "f", "template": {"style": {"code": "tooltip"}}}]
        })
        .to_string();
        let items = parse_poll_response(&raw);
        assert!(matches!(&items[0], InboundItem::Tooltip(t) if t.target == "default"));
    }

    #[test]
    fn test_loose_results_do_not_sink_siblings() {
        let raw = json!({
            "success": true,
            "results": [
                {"messageId": 42, "filterId": 7, "template": {"style": {"code": "banner", "html": "<p/>", "draggable": "true"}}},
                {"messageId": "t", "filterId": "f", "template": {"code": "fab", "style": {"code": "tooltip", "width": "60"}}},
                {"messageId": "bad", "template": "not an object"},
                "garbage",
                {"messageId": "ok", "filterId": "f", "template": {"style": {"code": "roadblock", "html": "<p/>"}}}
            ]
        })
        .to_string();

        let items = parse_poll_response(&raw);
        assert_eq!(items.len(), 3);
        let InboundItem::Overlay(first) = &items[0] else {
            panic!("expected overlay");
        };
        assert_eq!((first.message_id.as_str(), first.filter_id.as_str()), ("42", "7"));
        assert!(first.draggable);
        assert!(matches!(&items[1], InboundItem::Tooltip(t) if t.style.width_percent == 60));
        assert!(matches!(&items[2], InboundItem::Overlay(p) if p.message_id == "ok"));
    }

    #[test]
    fn test_poll_rejects_unusable_bodies() {
        assert!(parse_poll_response("").is_empty());
        assert!(parse_poll_response("{oops").is_empty());
        assert!(parse_poll_response(r#"{"success": false, "results": []}"#).is_empty());
        // Results without a style code are dropped.
        let raw = json!({"success": true, "results": [{"messageId": "m", "template": {}}]}).to_string();
        assert!(parse_poll_response(&raw).is_empty());
    }

    #[test]
    fn test_socket_notification_shapes() {
        let as_string = json!({
            "type": "in_app",
            "data": json!({"results": [
                {"messageId": "m1", "filterId": "f1", "template": {"style": {"code": "banner", "html": "<p/>"}}},
                {"template": {"style": {"code": "banner", "html": ""}}}
            ]}).to_string()
        });
        let payloads = parse_socket_notification(&as_string);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].message_id, "m1");
        assert_eq!(payloads[0].delivery, Delivery::Socket);

        let single = json!({"type": "in_app", "data": {"html": "<p/>", "type": ""}});
        let payloads = parse_socket_notification(&single);
        assert_eq!(payloads[0].layout_code, "roadblock");

        assert!(parse_socket_notification(&json!({"type": "push", "data": {}})).is_empty());
        assert!(parse_socket_notification(&json!({"type": "in_app", "data": "{bad"})).is_empty());
    }

    #[test]
    fn test_decode_html_text() {
        assert_eq!(decode_html_text("<i>&amp;</i> &lt;3 &#x1F600;"), "& <3 \u{1F600}");
        assert_eq!(decode_html_text("a & b"), "a & b");
        assert_eq!(decode_html_text("&bogus;"), "&bogus;");
    }
}
