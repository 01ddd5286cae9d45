use serde::{Deserialize, Serialize};
use std::fmt;

/// How an in-app payload reached the device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Returned by the in-app poll endpoint; acked and tracked.
    #[default]
    Polled,
    /// Pushed over the realtime socket; shown without ack or tracking.
    Socket,
}

/// A single in-app message ready for the display queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InAppPayload {
    pub message_id: String,
    pub filter_id: String,
    pub layout_code: String,
    pub html: String,
    #[serde(default)]
    pub vertical_align: Option<String>,
    #[serde(default)]
    pub horizontal_align: Option<String>,
    #[serde(default)]
    pub draggable: bool,
    #[serde(default)]
    pub placeholder_id: Option<String>,
    #[serde(default)]
    pub delivery: Delivery,
}

impl InAppPayload {
    /// Returns the name of the first required field that is empty.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.html.is_empty() {
            Some("html")
        } else if self.message_id.is_empty() {
            Some("messageId")
        } else if self.filter_id.is_empty() {
            Some("filterId")
        } else {
            None
        }
    }

    pub fn layout(&self) -> Option<LayoutKind> {
        LayoutKind::from_code(&self.layout_code)
    }

    pub fn alignment(&self) -> Alignment {
        match (&self.vertical_align, &self.horizontal_align) {
            (Some(v), Some(h)) => Alignment::from_flex(v, h),
            _ => Alignment::default(),
        }
    }
}

/// Renderer family selected from a payload's layout code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    Roadblock,
    Banner,
    PictureInPicture,
    Floater,
    BottomSheet,
    Inline,
    Tooltip,
}

impl LayoutKind {
    /// Case-insensitive substring match. Earlier entries win, so a code such
    /// as `banner-roadblock` resolves to a roadblock.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.to_ascii_lowercase();
        let table: [(&[&str], LayoutKind); 7] = [
            (&["roadblock"], LayoutKind::Roadblock),
            (&["banner"], LayoutKind::Banner),
            (&["picture-in-picture"], LayoutKind::PictureInPicture),
            (&["floater"], LayoutKind::Floater),
            (
                &["bottomsheet", "bottom-sheet", "bottom_sheet"],
                LayoutKind::BottomSheet,
            ),
            (&["inline"], LayoutKind::Inline),
            (&["tooltip"], LayoutKind::Tooltip),
        ];
        table
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| code.contains(n)))
            .map(|(_, kind)| *kind)
    }

    /// Overlays occupy the single exclusive display slot.
    pub fn is_overlay(self) -> bool {
        !matches!(self, LayoutKind::Inline | LayoutKind::Tooltip)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAnchor {
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAnchor {
    Left,
    Center,
    Right,
}

/// One of nine compass positions, e.g. `top-left` or `center-center`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alignment {
    pub vertical: VerticalAnchor,
    pub horizontal: HorizontalAnchor,
}

impl Default for Alignment {
    fn default() -> Self {
        Self {
            vertical: VerticalAnchor::Bottom,
            horizontal: HorizontalAnchor::Right,
        }
    }
}

impl Alignment {
    /// Map CSS flexbox alignment values onto a compass position.
    pub fn from_flex(vertical: &str, horizontal: &str) -> Self {
        let vertical = match vertical {
            "flex-start" => VerticalAnchor::Top,
            "center" => VerticalAnchor::Center,
            _ => VerticalAnchor::Bottom,
        };
        let horizontal = match horizontal {
            "flex-start" => HorizontalAnchor::Left,
            "center" => HorizontalAnchor::Center,
            _ => HorizontalAnchor::Right,
        };
        Self {
            vertical,
            horizontal,
        }
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = match self.vertical {
            VerticalAnchor::Top => "top",
            VerticalAnchor::Center => "center",
            VerticalAnchor::Bottom => "bottom",
        };
        let h = match self.horizontal {
            HorizontalAnchor::Left => "left",
            HorizontalAnchor::Center => "center",
            HorizontalAnchor::Right => "right",
        };
        write!(f, "{v}-{h}")
    }
}

/// Styled text tooltip as served by the in-app poll endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TooltipStyle {
    pub title: String,
    pub message: String,
    pub icon: Option<String>,
    pub bg_color: Option<String>,
    pub width_percent: u32,
    pub line1_font_size: u32,
    pub line2_font_size: u32,
    pub line1_font_color: Option<String>,
    pub line2_font_color: Option<String>,
}

impl Default for TooltipStyle {
    fn default() -> Self {
        Self {
            title: String::new(),
            message: String::new(),
            icon: None,
            bg_color: None,
            width_percent: 60,
            line1_font_size: 14,
            line2_font_size: 12,
            line1_font_color: None,
            line2_font_color: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TooltipContent {
    Styled(TooltipStyle),
    Html { html: String },
}

/// Interaction reported to the in-app track endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEvent {
    Dismissed,
    Cta { cta_id: String },
}

impl TrackEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TrackEvent::Dismissed => "dismissed",
            TrackEvent::Cta { .. } => "cta",
        }
    }

    pub fn cta_id(&self) -> Option<&str> {
        match self {
            TrackEvent::Dismissed => None,
            TrackEvent::Cta { cta_id } => Some(cta_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(code: &str) -> InAppPayload {
        InAppPayload {
            message_id: "m1".into(),
            filter_id: "f1".into(),
            layout_code: code.into(),
            html: "<p>hi</p>".into(),
            vertical_align: None,
            horizontal_align: None,
            draggable: false,
            placeholder_id: None,
            delivery: Delivery::Polled,
        }
    }

    #[test]
    fn test_layout_code_matching() {
        assert_eq!(LayoutKind::from_code("ROADBLOCK_v2"), Some(LayoutKind::Roadblock));
        assert_eq!(LayoutKind::from_code("top-Banner"), Some(LayoutKind::Banner));
        assert_eq!(
            LayoutKind::from_code("picture-in-picture"),
            Some(LayoutKind::PictureInPicture)
        );
        assert_eq!(LayoutKind::from_code("BottomSheet"), Some(LayoutKind::BottomSheet));
        assert_eq!(LayoutKind::from_code("bottom-sheet"), Some(LayoutKind::BottomSheet));
        assert_eq!(LayoutKind::from_code("inline_card"), Some(LayoutKind::Inline));
        assert_eq!(LayoutKind::from_code("carousel"), None);
        // Precedence follows the table order.
        assert_eq!(
            LayoutKind::from_code("banner-roadblock"),
            Some(LayoutKind::Roadblock)
        );
    }

    #[test]
    fn test_overlay_classification() {
        assert!(LayoutKind::Floater.is_overlay());
        assert!(!LayoutKind::Inline.is_overlay());
        assert!(!LayoutKind::Tooltip.is_overlay());
    }

    #[test]
    fn test_alignment_mapping() {
        assert_eq!(
            Alignment::from_flex("flex-start", "flex-start").to_string(),
            "top-left"
        );
        assert_eq!(
            Alignment::from_flex("center", "center").to_string(),
            "center-center"
        );
        assert_eq!(
            Alignment::from_flex("space-around", "bogus").to_string(),
            "bottom-right"
        );

        let mut p = payload("picture-in-picture");
        assert_eq!(p.alignment().to_string(), "bottom-right");
        p.vertical_align = Some("flex-start".into());
        // One axis alone is not enough to override the default.
        assert_eq!(p.alignment().to_string(), "bottom-right");
        p.horizontal_align = Some("center".into());
        assert_eq!(p.alignment().to_string(), "top-center");
    }

    #[test]
    fn test_missing_field() {
        assert_eq!(payload("banner").missing_field(), None);
        let mut p = payload("banner");
        p.filter_id.clear();
        assert_eq!(p.missing_field(), Some("filterId"));
        p.html.clear();
        assert_eq!(p.missing_field(), Some("html"));
    }
}
