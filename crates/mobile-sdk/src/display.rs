//! In-app display queue.
//!
//! A pure state machine: `Idle → Showing → Idle`. Feeding it a
//! `DisplayEvent` mutates the queue and returns the `DisplayCommand`s the
//! driver must carry out (ack, render, route, track). It performs no I/O, so
//! the driver can run commands after releasing whatever lock guards it.

use std::collections::VecDeque;

use pushapp_core::types::{Delivery, InAppPayload, LayoutKind, TrackEvent};
use tracing::{debug, error, info, warn};

use crate::renderer::OverlayRequest;

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayState {
    Idle,
    Showing(OverlayRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    Enqueue(Vec<InAppPayload>),
    /// The visible overlay was closed by the user or a CTA.
    Closed(TrackEvent),
    /// Picture-in-picture asked to go full screen.
    Maximize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayCommand {
    Ack {
        message_id: String,
    },
    Render(OverlayRequest),
    /// Hand HTML to the placeholder registry.
    RoutePlaceholder {
        placeholder_id: String,
        message_id: String,
        html: String,
    },
    /// Hand HTML to the tooltip-target lookup.
    RouteTooltip {
        target_id: String,
        message_id: String,
        html: String,
    },
    Track {
        message_id: String,
        filter_id: String,
        event: TrackEvent,
    },
}

#[derive(Debug)]
pub struct DisplayQueue {
    queue: VecDeque<InAppPayload>,
    state: DisplayState,
}

impl Default for DisplayQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayQueue {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            state: DisplayState::Idle,
        }
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn current(&self) -> Option<&OverlayRequest> {
        match &self.state {
            DisplayState::Showing(req) => Some(req),
            _ => None,
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn handle(&mut self, event: DisplayEvent) -> Vec<DisplayCommand> {
        let mut commands = Vec::new();
        match event {
            DisplayEvent::Enqueue(items) => {
                debug!(count = items.len(), pending = self.queue.len(), "Enqueue in-app items");
                self.queue.extend(items);
                self.show_next(&mut commands);
            }
            DisplayEvent::Closed(track) => self.close(track, &mut commands),
            DisplayEvent::Maximize => self.maximize(&mut commands),
        }
        commands
    }

    fn close(&mut self, track: TrackEvent, commands: &mut Vec<DisplayCommand>) {
        let DisplayState::Showing(request) = std::mem::replace(&mut self.state, DisplayState::Idle)
        else {
            warn!("Close reported with no overlay showing");
            return;
        };

        let payload = request.payload;
        info!(
            message_id = %payload.message_id,
            event = track.name(),
            "In-app overlay closed"
        );
        if payload.delivery == Delivery::Polled {
            commands.push(DisplayCommand::Track {
                message_id: payload.message_id,
                filter_id: payload.filter_id,
                event: track,
            });
        }

        self.show_next(commands);
    }

    fn maximize(&mut self, commands: &mut Vec<DisplayCommand>) {
        match &mut self.state {
            DisplayState::Showing(request) if request.kind == LayoutKind::PictureInPicture => {
                request.kind = LayoutKind::Roadblock;
                debug!(message_id = %request.payload.message_id, "Maximizing picture-in-picture");
                commands.push(DisplayCommand::Render(request.clone()));
            }
            _ => debug!("Maximize ignored: no picture-in-picture showing"),
        }
    }

    fn skip(payload: &InAppPayload, reason: &'static str) {
        metrics::counter!("inapp.skipped", "reason" => reason).increment(1);
        debug!(message_id = %payload.message_id, reason, "Skipping in-app item");
    }

    fn show_next(&mut self, commands: &mut Vec<DisplayCommand>) {
        while matches!(self.state, DisplayState::Idle) {
            let Some(payload) = self.queue.pop_front() else {
                return;
            };

            if let Some(field) = payload.missing_field() {
                error!(message_id = %payload.message_id, field, "Invalid in-app content");
                Self::skip(&payload, "invalid");
                continue;
            }

            if payload.delivery == Delivery::Polled {
                commands.push(DisplayCommand::Ack {
                    message_id: payload.message_id.clone(),
                });
            }

            let Some(kind) = payload.layout() else {
                warn!(layout = %payload.layout_code, "Unknown layout type");
                Self::skip(&payload, "unknown_layout");
                continue;
            };

            let placeholder_id = payload
                .placeholder_id
                .clone()
                .filter(|id| !id.is_empty());

            match (kind, placeholder_id) {
                (LayoutKind::Tooltip, Some(target_id)) => {
                    commands.push(DisplayCommand::RouteTooltip {
                        target_id,
                        message_id: payload.message_id,
                        html: payload.html,
                    });
                }
                (_, Some(placeholder_id)) => {
                    commands.push(DisplayCommand::RoutePlaceholder {
                        placeholder_id,
                        message_id: payload.message_id,
                        html: payload.html,
                    });
                }
                (LayoutKind::Inline | LayoutKind::Tooltip, None) => {
                    warn!(layout = %payload.layout_code, "No target id for in-place item");
                    Self::skip(&payload, "no_target");
                }
                (kind, None) => {
                    metrics::counter!("inapp.displayed", "layout" => format!("{kind:?}"))
                        .increment(1);
                    let request = OverlayRequest {
                        alignment: payload.alignment(),
                        kind,
                        payload,
                    };
                    commands.push(DisplayCommand::Render(request.clone()));
                    self.state = DisplayState::Showing(request);
                }
            }
        }
    }
}
