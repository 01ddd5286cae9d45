//! Host rendering seam.
//!
//! The SDK decides *what* to show; the host decides *how*. Renderer calls are
//! made with no SDK lock held, so implementations may report a close
//! synchronously from inside `show_overlay`.

use parking_lot::Mutex;
use pushapp_core::types::{Alignment, InAppPayload, LayoutKind, TooltipContent};
use serde::Serialize;

use crate::registry::{PlaceholderRegistration, TooltipTarget};

/// Everything a host needs to present one overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayRequest {
    pub payload: InAppPayload,
    pub kind: LayoutKind,
    pub alignment: Alignment,
}

impl OverlayRequest {
    pub fn message_id(&self) -> &str {
        &self.payload.message_id
    }
}

pub trait Renderer: Send + Sync {
    /// Present an overlay. The host reports its close through
    /// `PushApp::on_overlay_closed` or `PushApp::on_bridge_message`.
    fn show_overlay(&self, request: &OverlayRequest);

    /// Load HTML into a registered placeholder view.
    fn load_placeholder(&self, registration: &PlaceholderRegistration, html: &str);

    /// Show a floating tooltip anchored at `target`.
    fn show_tooltip(&self, target: &TooltipTarget, content: &TooltipContent);
}

/// What a `RecordingRenderer` was asked to draw.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Overlay(OverlayRequest),
    Placeholder { placeholder_id: String, html: String },
    Tooltip { target_id: String, content: TooltipContent },
}

/// Renderer that captures every request; for tests and headless hosts.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    rendered: Mutex<Vec<Rendered>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> Vec<Rendered> {
        self.rendered.lock().clone()
    }

    pub fn overlays(&self) -> Vec<OverlayRequest> {
        self.rendered
            .lock()
            .iter()
            .filter_map(|r| match r {
                Rendered::Overlay(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_overlay(&self) -> Option<OverlayRequest> {
        self.overlays().pop()
    }

    pub fn len(&self) -> usize {
        self.rendered.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Renderer for RecordingRenderer {
    fn show_overlay(&self, request: &OverlayRequest) {
        self.rendered.lock().push(Rendered::Overlay(request.clone()));
    }

    fn load_placeholder(&self, registration: &PlaceholderRegistration, html: &str) {
        self.rendered.lock().push(Rendered::Placeholder {
            placeholder_id: registration.placeholder_id.clone(),
            html: html.to_string(),
        });
    }

    fn show_tooltip(&self, target: &TooltipTarget, content: &TooltipContent) {
        self.rendered.lock().push(Rendered::Tooltip {
            target_id: target.target_id.clone(),
            content: content.clone(),
        });
    }
}
