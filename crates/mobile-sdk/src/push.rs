//! Remote push data classification.
//!
//! Push payloads arrive as flat string maps. Three shapes are recognised:
//! live activities (`message1..3`), standard notifications (`title` and
//! `body`) and everything else, which is silent data.

use std::collections::HashMap;

use serde::Serialize;

pub type PushData = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveActivity {
    pub activity_id: String,
    pub title: String,
    pub message: String,
    pub tap_text: String,
    /// 0..=100
    pub progress: i32,
    pub title_color: String,
    pub message_color: String,
    pub tap_text_color: String,
    pub progress_color: String,
    pub background_color: String,
    pub image_url: Option<String>,
    pub gradient: Option<String>,
    pub gradient_direction: Option<String>,
    pub align: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationAction {
    pub title: String,
    pub action_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardNotification {
    pub activity_id: String,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    pub click_token: Option<String>,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushKind {
    LiveActivity(LiveActivity),
    Standard(StandardNotification),
    Silent,
}

impl PushKind {
    pub fn label(&self) -> &'static str {
        match self {
            PushKind::LiveActivity(_) => "live_activity",
            PushKind::Standard(_) => "standard",
            PushKind::Silent => "silent",
        }
    }
}

fn field(data: &PushData, key: &str) -> Option<String> {
    data.get(key).filter(|v| !v.trim().is_empty()).cloned()
}

fn activity_id(data: &PushData) -> String {
    field(data, "activity_id")
        .unwrap_or_else(|| format!("activity_{}", chrono::Utc::now().timestamp_millis()))
}

pub fn classify(data: &PushData) -> PushKind {
    let is_live = ["message1", "message2", "message3"]
        .iter()
        .all(|k| data.contains_key(*k));
    if is_live {
        return PushKind::LiveActivity(live_activity(data));
    }

    match (field(data, "title"), field(data, "body")) {
        (Some(title), Some(body)) => PushKind::Standard(standard(data, title, body)),
        _ => PushKind::Silent,
    }
}

fn live_activity(data: &PushData) -> LiveActivity {
    let text = |k: &str| data.get(k).cloned().unwrap_or_default();
    let color = |k: &str, default: &str| field(data, k).unwrap_or_else(|| default.to_string());
    let progress = data
        .get("progressPercent")
        .and_then(|p| p.trim().parse::<f64>().ok())
        .unwrap_or(0.0);

    LiveActivity {
        activity_id: activity_id(data),
        title: text("message1"),
        message: text("message2"),
        tap_text: text("message3"),
        progress: (progress * 100.0) as i32,
        title_color: color("message1FontColorHex", "#FF0000"),
        message_color: color("message2FontColorHex", "#000000"),
        tap_text_color: color("message3FontColorHex", "#CCCCCC"),
        progress_color: color("progressColorHex", "#00FF00"),
        background_color: color("backgroundColorHex", "#FFFFFF"),
        image_url: field(data, "imageUrl"),
        gradient: field(data, "bg_color_gradient"),
        gradient_direction: field(data, "bg_color_gradient_dir"),
        align: field(data, "align"),
    }
}

fn standard(data: &PushData, title: String, body: String) -> StandardNotification {
    let click_token = field(data, "click_token");
    let actions = if click_token.is_some() {
        (1..=2)
            .filter_map(|n| {
                Some(NotificationAction {
                    title: field(data, &format!("title{n}"))?,
                    action_id: field(data, &format!("action{n}"))?,
                    url: field(data, &format!("url{n}"))?,
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    StandardNotification {
        activity_id: activity_id(data),
        title,
        body,
        image_url: field(data, "image"),
        click_token,
        actions,
    }
}
