//! `PushApp`: the SDK facade the host talks to.
//!
//! Owns the session, REST client, event buffer, placeholder registry, display
//! queue and realtime channel, and wires them together. Display state sits
//! behind a `parking_lot` mutex that is released before any renderer call or
//! await; acks and tracks are spawned and never block display.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pushapp_core::config::PollPolicy;
use pushapp_core::types::{TooltipContent, TrackEvent};
use pushapp_core::{SdkConfig, SdkError, SdkResult};
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, PushEvent};
use crate::backend::{Backend, Headers, HttpBackend};
use crate::bridge::BridgeMessage;
use crate::device::{persistent_device_id, DeviceInfo};
use crate::display::{DisplayCommand, DisplayEvent, DisplayQueue, DisplayState};
use crate::events::EventBuffer;
use crate::geometry::ViewportRect;
use crate::inbox::{parse_poll_response, parse_socket_notification, InboundItem, TooltipEvent};
use crate::push::{classify, PushData, PushKind};
use crate::realtime::{RealtimeChannel, SocketMessage};
use crate::registry::{DispatchTarget, TargetRegistry, TooltipTarget, ViewHandle};
use crate::renderer::{OverlayRequest, Renderer};
use crate::session::{Identifier, Session, SessionIdentity};
use crate::storage::{FileStore, KeyValueStore, MemoryStore, KEY_PUSH_TOKEN, KEY_REGISTERED, KEY_USER_ID};

const TOOLTIP_CHANNEL_CAPACITY: usize = 64;

pub struct PushApp {
    config: SdkConfig,
    runtime: Handle,
    store: Arc<dyn KeyValueStore>,
    session: Arc<Session>,
    api: Arc<ApiClient>,
    buffer: EventBuffer,
    registry: TargetRegistry,
    display: Mutex<DisplayQueue>,
    renderer: Arc<dyn Renderer>,
    socket: Mutex<Option<RealtimeChannel>>,
    tooltips: broadcast::Sender<TooltipEvent>,
    last_push: Mutex<Option<PushData>>,
}

impl PushApp {
    /// Must be called from within a tokio runtime; background work is
    /// spawned onto it.
    pub fn new(
        config: SdkConfig,
        device: DeviceInfo,
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn Backend>,
        renderer: Arc<dyn Renderer>,
    ) -> SdkResult<Arc<Self>> {
        let runtime = Handle::try_current()
            .map_err(|e| SdkError::Internal(anyhow::anyhow!("no tokio runtime: {e}")))?;
        let device_id = persistent_device_id(store.as_ref(), &device);
        let session = Arc::new(Session::new(device_id));
        let api = Arc::new(ApiClient::new(
            backend,
            session.clone(),
            device,
            config.network.api_prefix.clone(),
        ));
        let (tooltips, _) = broadcast::channel(TOOLTIP_CHANNEL_CAPACITY);

        Ok(Arc::new(Self {
            buffer: EventBuffer::new(store.clone()),
            config,
            runtime,
            store,
            session,
            api,
            registry: TargetRegistry::new(),
            display: Mutex::new(DisplayQueue::new()),
            renderer,
            socket: Mutex::new(None),
            tooltips,
            last_push: Mutex::new(None),
        }))
    }

    /// Production wiring: reqwest backend, file store when a path is configured.
    pub fn from_config(
        config: SdkConfig,
        device: DeviceInfo,
        renderer: Arc<dyn Renderer>,
    ) -> SdkResult<Arc<Self>> {
        let store: Arc<dyn KeyValueStore> = match &config.storage.path {
            Some(path) => Arc::new(FileStore::open(path)),
            None => Arc::new(MemoryStore::new()),
        };
        Self::new(config, device, store, Arc::new(HttpBackend::new()), renderer)
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Bind to `tenant$channelId`. A second call is a no-op.
    pub async fn initialize(self: &Arc<Self>, identifier: &str, sandbox: bool) -> SdkResult<()> {
        let id: Identifier = identifier.parse()?;
        if !self.session.configure(&id, sandbox, &self.config.network)? {
            debug!("PushApp already initialized");
            return Ok(());
        }
        let snapshot = self.session.snapshot();
        info!(
            tenant = %id.tenant,
            channel_id = %id.channel_id,
            server_url = %snapshot.server_url,
            sandbox,
            "PushApp initialized"
        );

        if let Some(user_id) = self.store.get(KEY_USER_ID).filter(|u| !u.is_empty()) {
            info!(user_id = %user_id, "Restored user id from storage");
            self.session.set_user_id(user_id);
            self.flush_buffered_events().await;
            self.spawn_socket_connect();
        }
        Ok(())
    }

    /// Register or refresh the push token.
    pub async fn handle_device_token(self: &Arc<Self>, token: &str) -> SdkResult<()> {
        if !self.session.is_initialized() {
            return Err(SdkError::NotInitialized);
        }
        let last = self.store.get(KEY_PUSH_TOKEN);

        match last.as_deref() {
            Some(previous) if previous != token => {
                info!("Push token changed, updating");
                self.api.update_token(token).await?;
                self.store.set(KEY_PUSH_TOKEN, token.to_string())?;
                self.store.set_bool(KEY_REGISTERED, true)?;
            }
            _ => {
                if self.store.get_bool(KEY_REGISTERED) {
                    debug!("Device already registered, skipping registration");
                    return Ok(());
                }
                let platform = self.api.device().platform;
                let guest_id = self.api.register_device(platform, token).await?;
                self.store.set_bool(KEY_REGISTERED, true)?;
                self.store.set(KEY_PUSH_TOKEN, token.to_string())?;
                info!(guest_id = ?guest_id, "Device registered");
                self.session.set_guest_id(guest_id);

                self.flush_buffered_events().await;
                if let Err(e) = self.send_event("app_open", json!({})).await {
                    warn!(error = %e, "app_open not sent");
                }
            }
        }
        Ok(())
    }

    pub async fn login(self: &Arc<Self>, user_id: &str) -> SdkResult<()> {
        if !self.session.is_initialized() {
            return Err(SdkError::NotInitialized);
        }
        self.api.register_user(user_id).await?;
        self.store.set(KEY_USER_ID, user_id.to_string())?;
        self.session.set_user_id(user_id.to_string());
        info!(user_id = %user_id, "Logged in");

        self.flush_buffered_events().await;
        self.spawn_socket_connect();
        Ok(())
    }

    pub fn session(&self) -> SessionIdentity {
        self.session.snapshot()
    }

    pub fn device_headers(&self) -> Headers {
        self.api.device_headers()
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Send an event, or buffer it until an identity is known. A delivered
    /// event schedules an in-app poll per the configured `PollPolicy`.
    pub async fn send_event(self: &Arc<Self>, name: &str, data: Value) -> SdkResult<()> {
        let snapshot = self.session.snapshot();
        let user_id = match snapshot.resolved_id() {
            Some(id) if self.session.is_initialized() => id.to_string(),
            _ => {
                debug!(event = %name, "No identity yet, buffering event");
                return self.buffer.push(name, data);
            }
        };

        self.api.send_event(&user_id, name, &data).await?;
        debug!(event = %name, user_id = %user_id, "Event sent");
        self.schedule_poll(&self.config.poll);
        Ok(())
    }

    /// Replay buffered events in order. No-op without an identity.
    pub async fn flush_buffered_events(self: &Arc<Self>) {
        if !self.session.has_identity() {
            return;
        }
        let pending = self.buffer.drain();
        if pending.is_empty() {
            return;
        }
        info!(count = pending.len(), "Flushing buffered events");
        for event in pending {
            if let Err(e) = self.send_event(&event.event_name, event.event_data).await {
                warn!(event = %event.event_name, error = %e, "Buffered event not delivered");
            }
        }
    }

    pub fn buffered_events(&self) -> usize {
        self.buffer.len()
    }

    pub async fn set_page_name(self: &Arc<Self>, page: &str) -> SdkResult<()> {
        self.send_event("page_open", json!({ "page": page })).await
    }

    pub async fn destroy_page_name(self: &Arc<Self>, page: &str) -> SdkResult<()> {
        self.send_event("page_closed", json!({ "page": page })).await
    }

    pub async fn ping(&self) -> SdkResult<()> {
        self.api.ping().await
    }

    pub async fn update_customer_profile(
        &self,
        cohorts: &Value,
        additional_info: &Value,
    ) -> SdkResult<()> {
        self.api.update_customer_profile(cohorts, additional_info).await
    }

    // ------------------------------------------------------------------
    // In-app polling and display
    // ------------------------------------------------------------------

    fn schedule_poll(self: &Arc<Self>, policy: &PollPolicy) {
        if !policy.enabled {
            return;
        }
        let delay = policy.delay();
        let app = self.clone();
        self.runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = app.poll_now().await {
                warn!(error = %e, "Poll in-app failed");
            }
        });
    }

    /// Poll for in-app content right away. Returns the number of items received.
    pub async fn poll_now(self: &Arc<Self>) -> SdkResult<usize> {
        let raw = self.api.poll_in_app().await?;
        let items = parse_poll_response(&raw);
        let count = items.len();
        self.handle_inbound(items);
        Ok(count)
    }

    fn handle_inbound(&self, items: Vec<InboundItem>) {
        let mut overlays = Vec::new();
        for item in items {
            match item {
                InboundItem::Overlay(payload) => overlays.push(payload),
                InboundItem::Placeholder {
                    placeholder_id,
                    message_id,
                    html,
                } => {
                    self.spawn_ack(message_id);
                    self.dispatch_placeholder_content(&placeholder_id, &html);
                }
                InboundItem::Tooltip(tooltip) => {
                    self.spawn_ack(tooltip.message_id.clone());
                    match self.registry.tooltip_target(&tooltip.target) {
                        Some(target) => {
                            debug!(target_id = %tooltip.target, "Showing tooltip at registered target");
                            self.renderer
                                .show_tooltip(&target, &TooltipContent::Styled(tooltip.style));
                        }
                        None => {
                            debug!(target_id = %tooltip.target, "No tooltip target, broadcasting");
                            // Nobody listening is fine.
                            let _ = self.tooltips.send(TooltipEvent {
                                target: tooltip.target,
                                style: tooltip.style,
                            });
                        }
                    }
                }
            }
        }

        if overlays.is_empty() {
            debug!("No in-app overlays to display");
        } else {
            self.drive(DisplayEvent::Enqueue(overlays));
        }
    }

    /// Feed the display state machine and carry out what it asks for.
    fn drive(&self, event: DisplayEvent) {
        let commands = self.display.lock().handle(event);
        for command in commands {
            self.execute(command);
        }
    }

    fn execute(&self, command: DisplayCommand) {
        match command {
            DisplayCommand::Ack { message_id } => self.spawn_ack(message_id),
            DisplayCommand::Render(request) => {
                info!(
                    message_id = %request.payload.message_id,
                    layout = ?request.kind,
                    alignment = %request.alignment,
                    "Displaying in-app"
                );
                self.renderer.show_overlay(&request);
            }
            DisplayCommand::RoutePlaceholder {
                placeholder_id,
                html,
                ..
            } => {
                self.dispatch_placeholder_content(&placeholder_id, &html);
            }
            DisplayCommand::RouteTooltip {
                target_id, html, ..
            } => match self.registry.tooltip_target(&target_id) {
                Some(target) => self
                    .renderer
                    .show_tooltip(&target, &TooltipContent::Html { html }),
                None => warn!(target_id = %target_id, "Tooltip target not registered, dropping"),
            },
            DisplayCommand::Track {
                message_id,
                filter_id,
                event,
            } => {
                let api = self.api.clone();
                self.runtime.spawn(async move {
                    if let Err(e) = api.track_in_app(&message_id, Some(&filter_id), &event).await {
                        warn!(message_id = %message_id, error = %e, "In-app track failed");
                    }
                });
            }
        }
    }

    fn spawn_ack(&self, message_id: String) {
        metrics::counter!("inapp.acked").increment(1);
        let api = self.api.clone();
        self.runtime.spawn(async move {
            if let Err(e) = api.ack_in_app(&message_id).await {
                warn!(message_id = %message_id, error = %e, "In-app ack failed");
            }
        });
    }

    /// Host callback: the visible overlay was dismissed.
    pub fn on_overlay_closed(&self, event: TrackEvent) {
        self.drive(DisplayEvent::Closed(event));
    }

    /// Host callback: the overlay's HTML posted a bridge message.
    pub fn on_bridge_message(&self, raw: &str) {
        match BridgeMessage::parse(raw) {
            Ok(message) => match message.close_event() {
                Some(event) => self.drive(DisplayEvent::Closed(event)),
                None => debug!(event = ?message.event, "Bridge message without CTA"),
            },
            Err(e) => warn!(error = %e, message = %raw, "Failed to parse bridge message"),
        }
    }

    /// Host callback: picture-in-picture maximize button.
    pub fn maximize_overlay(&self) {
        self.drive(DisplayEvent::Maximize);
    }

    pub fn current_overlay(&self) -> Option<OverlayRequest> {
        self.display.lock().current().cloned()
    }

    pub fn is_showing(&self) -> bool {
        matches!(self.display.lock().state(), DisplayState::Showing(_))
    }

    pub fn subscribe_tooltips(&self) -> broadcast::Receiver<TooltipEvent> {
        self.tooltips.subscribe()
    }

    // ------------------------------------------------------------------
    // Placeholders and tooltip targets
    // ------------------------------------------------------------------

    fn density(&self) -> f64 {
        self.api.device().density as f64
    }

    fn announce_widget(self: &Arc<Self>, id: &str) {
        let app = self.clone();
        let id = id.to_string();
        self.runtime.spawn(async move {
            if let Err(e) = app.send_event("widget_open", json!({ "compare": id })).await {
                warn!(compare = %id, error = %e, "widget_open not sent");
            }
        });
    }

    /// Register a placeholder view. `rect` is the view's viewport frame when
    /// the host creates it from web coordinates.
    pub fn register_placeholder(
        self: &Arc<Self>,
        placeholder_id: &str,
        rect: Option<ViewportRect>,
    ) -> ViewHandle {
        let pixels = rect.map(|r| r.to_device_pixels(self.density()));
        let handle = self.registry.register_placeholder(placeholder_id, pixels);
        self.announce_widget(placeholder_id);
        handle
    }

    pub fn unregister_placeholder(&self, placeholder_id: &str) -> Option<ViewHandle> {
        self.registry.unregister_placeholder(placeholder_id)
    }

    pub fn register_tooltip_target(self: &Arc<Self>, target_id: &str, rect: ViewportRect) -> TooltipTarget {
        let pixels = rect.to_device_pixels(self.density());
        let target = self.registry.register_tooltip_target(target_id, pixels);
        self.announce_widget(target_id);
        target
    }

    pub fn unregister_tooltip_target(&self, target_id: &str) -> Option<TooltipTarget> {
        self.registry.unregister_tooltip_target(target_id)
    }

    /// Load `html` into the placeholder registered as `id`, falling back to a
    /// tooltip target. Returns false when neither is registered.
    pub fn dispatch_placeholder_content(&self, id: &str, html: &str) -> bool {
        match self.registry.dispatch_target(id) {
            DispatchTarget::Placeholder(registration) => {
                debug!(placeholder_id = %id, "Loading content into placeholder");
                self.renderer.load_placeholder(&registration, html);
                true
            }
            DispatchTarget::Tooltip(target) => {
                debug!(target_id = %id, "Showing placeholder content as tooltip");
                self.renderer.show_tooltip(
                    &target,
                    &TooltipContent::Html {
                        html: html.to_string(),
                    },
                );
                true
            }
            DispatchTarget::Unregistered => {
                warn!(placeholder_id = %id, "No placeholder or tooltip target registered, dropping content");
                false
            }
        }
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Realtime
    // ------------------------------------------------------------------

    /// Connect the realtime channel for the current identity, replacing any
    /// existing connection.
    pub async fn connect_socket(self: &Arc<Self>) -> SdkResult<()> {
        let snapshot = self.session.snapshot();
        let user_id = snapshot
            .resolved_id()
            .ok_or(SdkError::NoIdentity)?
            .to_string();

        if let Some(old) = self.socket.lock().take() {
            old.disconnect();
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let channel = RealtimeChannel::connect(
            &snapshot.socket_url,
            &user_id,
            Arc::new(move |message: SocketMessage| {
                if let Some(app) = weak.upgrade() {
                    app.handle_socket_message(message);
                }
            }),
        )
        .await?;
        *self.socket.lock() = Some(channel);
        Ok(())
    }

    /// Connect in the background; the handshake never holds up the caller.
    fn spawn_socket_connect(self: &Arc<Self>) {
        let app = self.clone();
        self.runtime.spawn(async move {
            if let Err(e) = app.connect_socket().await {
                warn!(error = %e, "Realtime connect failed");
            }
        });
    }

    pub fn disconnect_socket(&self) {
        if let Some(channel) = self.socket.lock().take() {
            channel.disconnect();
        }
    }

    pub fn handle_socket_message(self: &Arc<Self>, message: SocketMessage) {
        match message {
            SocketMessage::RuleTriggered { rule_id } => {
                info!(rule_id = ?rule_id, "Rule triggered, polling");
                self.schedule_poll(&PollPolicy::immediate());
            }
            SocketMessage::Notification(frame) => {
                let payloads = parse_socket_notification(&frame);
                if !payloads.is_empty() {
                    self.drive(DisplayEvent::Enqueue(payloads));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    /// Classify incoming push data and keep it for later inspection.
    pub fn handle_push(&self, data: PushData) -> PushKind {
        let kind = classify(&data);
        debug!(kind = kind.label(), "Push received");
        *self.last_push.lock() = Some(data);
        kind
    }

    pub fn last_notification_data(&self) -> Option<PushData> {
        self.last_push.lock().clone()
    }

    pub async fn handle_notification_click(
        &self,
        click_token: &str,
        action_id: Option<&str>,
    ) -> SdkResult<()> {
        let action_id = action_id.filter(|a| !a.is_empty());
        let event = match action_id {
            Some(_) => PushEvent::Cta,
            None => PushEvent::Opened,
        };
        self.api.track_push(click_token, event, action_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::endpoints;
    use crate::backend::RecordingBackend;
    use crate::renderer::{RecordingRenderer, Rendered};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn app_with(poll: PollPolicy) -> (Arc<PushApp>, Arc<RecordingBackend>, Arc<RecordingRenderer>) {
        let backend = Arc::new(RecordingBackend::new());
        let renderer = Arc::new(RecordingRenderer::new());
        let config = SdkConfig {
            poll,
            ..Default::default()
        };
        let device = DeviceInfo {
            density: 2.0,
            ..Default::default()
        };
        let app = PushApp::new(
            config,
            device,
            Arc::new(MemoryStore::new()),
            backend.clone(),
            renderer.clone(),
        )
        .unwrap();
        (app, backend, renderer)
    }

    fn no_poll() -> PollPolicy {
        PollPolicy {
            enabled: false,
            delay_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_initialize_validates_identifier() {
        let (app, _, _) = app_with(no_poll());
        assert!(matches!(
            app.initialize("no-dollar", false).await,
            Err(SdkError::InvalidIdentifier(_))
        ));
        app.initialize("acme$ch1", true).await.unwrap();
        assert_eq!(app.session().server_url, "https://acme.pushapp.com");
        // Second call is ignored.
        app.initialize("other$ch2", false).await.unwrap();
        assert_eq!(app.session().tenant, "acme");
    }

    #[tokio::test]
    async fn test_events_buffer_until_registration() {
        let (app, backend, _) = app_with(no_poll());
        app.send_event("early", json!({"n": 1})).await.unwrap();
        app.initialize("acme$ch1", false).await.unwrap();
        app.send_event("later", json!({"n": 2})).await.unwrap();
        assert_eq!(app.buffered_events(), 2);
        assert_eq!(backend.count(endpoints::EVENT), 0);

        backend.respond(endpoints::REGISTER, json!({"device": {"user_id": "guest-1"}}));
        app.handle_device_token("tok").await.unwrap();

        let names: Vec<_> = backend
            .calls_to(endpoints::EVENT)
            .iter()
            .map(|c| c.body["event_name"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, ["early", "later", "app_open"]);
        assert_eq!(app.buffered_events(), 0);
        assert_eq!(app.session().guest_id.as_deref(), Some("guest-1"));
    }

    #[tokio::test]
    async fn test_token_change_updates() {
        let (app, backend, _) = app_with(no_poll());
        app.initialize("acme$ch1", false).await.unwrap();
        backend.respond(endpoints::REGISTER, json!({"device": {"user_id": "g"}}));
        app.handle_device_token("tok-1").await.unwrap();
        app.handle_device_token("tok-1").await.unwrap();
        assert_eq!(backend.count(endpoints::REGISTER), 1);

        app.handle_device_token("tok-2").await.unwrap();
        let update = &backend.calls_to(endpoints::UPDATE_TOKEN)[0];
        assert_eq!(update.body["token"], "tok-2");
        assert!(update.body["contact_id"].as_str().unwrap().starts_with("g_"));
    }

    #[tokio::test]
    async fn test_send_event_schedules_poll() {
        let (app, backend, renderer) = app_with(PollPolicy {
            enabled: true,
            delay_ms: 10,
        });
        app.initialize("acme$ch1", false).await.unwrap();
        app.session.set_user_id("u1".into());
        backend.respond(
            endpoints::IN_APP_POLL,
            json!({"success": true, "results": [{
                "messageId": "m1", "filterId": "f1",
                "template": {"style": {"code": "roadblock", "html": "<p/>"}}
            }]}),
        );

        app.set_page_name("home").await.unwrap();
        assert!(backend.wait_for(endpoints::IN_APP_ACK, 1, WAIT).await);
        assert_eq!(renderer.overlays()[0].payload.message_id, "m1");
        assert_eq!(
            backend.calls_to(endpoints::EVENT)[0].body["event_data"],
            json!({"page": "home"})
        );

        app.on_bridge_message(r#"{"event":"click","data":{"value":"shop"}}"#);
        assert!(backend.wait_for(endpoints::IN_APP_TRACK, 1, WAIT).await);
        let track = &backend.calls_to(endpoints::IN_APP_TRACK)[0];
        assert_eq!(track.body["data"]["ctaId"], "shop");
        assert!(!app.is_showing());
    }

    #[tokio::test]
    async fn test_malformed_bridge_message_keeps_overlay() {
        let (app, _, renderer) = app_with(no_poll());
        app.handle_socket_message(SocketMessage::Notification(json!({
            "type": "in_app",
            "data": {"messageId": "s1", "filterId": "f", "code": "banner", "html": "<p/>"}
        })));
        assert_eq!(renderer.overlays().len(), 1);

        app.on_bridge_message("{not json");
        app.on_bridge_message(r#"{"event":"view","data":{"value":""}}"#);
        assert!(app.is_showing());
        app.on_overlay_closed(TrackEvent::Dismissed);
        assert!(!app.is_showing());
    }

    #[tokio::test]
    async fn test_registration_announces_widget() {
        let (app, backend, renderer) = app_with(no_poll());
        app.initialize("acme$ch1", false).await.unwrap();
        app.session.set_user_id("u1".into());

        let target = app.register_tooltip_target("cta", ViewportRect::new(10.0, 20.5, 30.0, 40.0));
        assert_eq!((target.x, target.y, target.width, target.height), (20, 41, 60, 80));
        app.register_placeholder("slot", None);

        assert!(backend.wait_for(endpoints::EVENT, 2, WAIT).await);
        let compares: Vec<_> = backend
            .calls_to(endpoints::EVENT)
            .iter()
            .map(|c| c.body["event_data"]["compare"].clone())
            .collect();
        assert!(compares.contains(&json!("cta")));
        assert!(compares.contains(&json!("slot")));

        assert!(app.dispatch_placeholder_content("slot", "<b>x</b>"));
        assert!(app.dispatch_placeholder_content("cta", "<i>y</i>"));
        assert!(!app.dispatch_placeholder_content("nope", "<i>z</i>"));
        assert_eq!(
            renderer.rendered(),
            vec![
                Rendered::Placeholder {
                    placeholder_id: "slot".into(),
                    html: "<b>x</b>".into()
                },
                Rendered::Tooltip {
                    target_id: "cta".into(),
                    content: TooltipContent::Html { html: "<i>y</i>".into() }
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_unmatched_tooltip_is_broadcast() {
        let (app, backend, renderer) = app_with(no_poll());
        app.initialize("acme$ch1", false).await.unwrap();
        app.session.set_user_id("u1".into());
        let mut tooltips = app.subscribe_tooltips();
        backend.respond(
            endpoints::IN_APP_POLL,
            json!({"success": true, "results": [{
                "messageId": "t1", "filterId": "f1",
                "template": {"code": "fab", "style": {"code": "tooltip", "line_1": "Hi"}}
            }]}),
        );

        assert_eq!(app.poll_now().await.unwrap(), 1);
        let event = tooltips.try_recv().unwrap();
        assert_eq!(event.target, "fab");
        assert_eq!(event.style.title, "Hi");
        assert!(renderer.is_empty());
        assert!(backend.wait_for(endpoints::IN_APP_ACK, 1, WAIT).await);
    }

    #[tokio::test]
    async fn test_push_click_tracking() {
        let (app, backend, _) = app_with(no_poll());
        app.initialize("acme$ch1", false).await.unwrap();
        let data: PushData = [("title", "Hi"), ("body", "there")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(matches!(app.handle_push(data.clone()), PushKind::Standard(_)));
        assert_eq!(app.last_notification_data(), Some(data));

        app.handle_notification_click("ct", None).await.unwrap();
        app.handle_notification_click("ct", Some("buy")).await.unwrap();
        let tracks = backend.calls_to(endpoints::PUSH_TRACK);
        assert_eq!(tracks[0].body, json!({"t": "ct", "event": "opened"}));
        assert_eq!(
            tracks[1].body,
            json!({"t": "ct", "event": "cta", "data": {"ctaId": "buy"}})
        );
    }

    #[tokio::test]
    async fn test_numeric_cta_value_closes_overlay() {
        let (app, backend, _) = app_with(no_poll());
        app.initialize("acme$ch1", false).await.unwrap();
        app.session.set_user_id("u1".into());
        backend.respond(
            endpoints::IN_APP_POLL,
            json!({"success": true, "results": [{
                "messageId": "m1", "filterId": "f1",
                "template": {"style": {"code": "banner", "html": "<p/>"}}
            }]}),
        );
        app.poll_now().await.unwrap();
        assert!(app.is_showing());

        app.on_bridge_message(r#"{"event":"click","timestamp":"1717000000000","data":{"label":"Buy","value":1}}"#);
        assert!(!app.is_showing());
        assert!(backend.wait_for(endpoints::IN_APP_TRACK, 1, WAIT).await);
        assert_eq!(backend.calls_to(endpoints::IN_APP_TRACK)[0].body["data"]["ctaId"], "1");
    }

    #[tokio::test]
    async fn test_rule_triggered_frame_polls_immediately() {
        // Poll-after-event is off, so only the rule can trigger a poll.
        let (app, backend, renderer) = app_with(no_poll());
        app.initialize("acme$ch1", false).await.unwrap();
        app.session.set_user_id("u1".into());
        backend.respond(
            endpoints::IN_APP_POLL,
            json!({"success": true, "results": [{
                "messageId": "r1", "filterId": "f1",
                "template": {"style": {"code": "roadblock", "html": "<p/>"}}
            }]}),
        );

        let frame = crate::realtime::parse_frame(
            br#"{"data":{"message_type":"rule_triggered","rule_id":9}}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            SocketMessage::RuleTriggered {
                rule_id: Some("9".into())
            }
        );
        app.handle_socket_message(frame);

        assert!(backend.wait_for(endpoints::IN_APP_POLL, 1, WAIT).await);
        let poll = &backend.calls_to(endpoints::IN_APP_POLL)[0];
        assert!(poll.body["contact_id"].as_str().unwrap().starts_with("u1_"));
        assert!(backend.wait_for(endpoints::IN_APP_ACK, 1, WAIT).await);
        assert_eq!(renderer.last_overlay().unwrap().message_id(), "r1");
    }

    /// Accepts TCP connections and never answers the WebSocket handshake.
    async fn silent_socket_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        format!("ws://{addr}/pushapp")
    }

    fn app_on(store: Arc<dyn KeyValueStore>, socket_endpoint: &str) -> (Arc<PushApp>, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::new());
        let mut config = SdkConfig {
            poll: no_poll(),
            ..Default::default()
        };
        config.network.socket_endpoint = Some(socket_endpoint.to_string());
        let app = PushApp::new(
            config,
            DeviceInfo::default(),
            store,
            backend.clone(),
            Arc::new(RecordingRenderer::new()),
        )
        .unwrap();
        (app, backend)
    }

    #[tokio::test]
    async fn test_login_flushes_and_survives_restart() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let socket = silent_socket_endpoint().await;

        let (app, backend) = app_on(store.clone(), &socket);
        app.initialize("acme$ch1", false).await.unwrap();
        app.send_event("cart_view", json!({"items": 2})).await.unwrap();
        assert_eq!(app.buffered_events(), 1);

        // The socket handshake never completes; login must not wait for it.
        tokio::time::timeout(WAIT, app.login("u1"))
            .await
            .expect("login blocked on the realtime handshake")
            .unwrap();
        assert_eq!(backend.count(endpoints::REGISTER_USER), 1);
        assert_eq!(store.get(KEY_USER_ID).as_deref(), Some("u1"));
        assert_eq!(app.session().user_id.as_deref(), Some("u1"));
        assert_eq!(app.buffered_events(), 0);
        let sent = &backend.calls_to(endpoints::EVENT)[0];
        assert_eq!(sent.body["event_name"], "cart_view");
        assert_eq!(sent.body["user_id"], "u1");

        // A fresh instance on the same store restores the user and flushes.
        let (restarted, backend) = app_on(store, &socket);
        restarted.send_event("early", json!({})).await.unwrap();
        assert_eq!(restarted.buffered_events(), 1);
        tokio::time::timeout(WAIT, restarted.initialize("acme$ch1", false))
            .await
            .expect("initialize blocked on the realtime handshake")
            .unwrap();
        assert_eq!(restarted.session().user_id.as_deref(), Some("u1"));
        assert_eq!(restarted.buffered_events(), 0);
        assert_eq!(backend.calls_to(endpoints::EVENT)[0].body["event_name"], "early");
    }

    #[tokio::test]
    async fn test_failed_login_keeps_identity_unset() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let (app, backend) = app_on(store.clone(), "ws://127.0.0.1:1/pushapp");
        app.initialize("acme$ch1", false).await.unwrap();
        backend.fail(endpoints::REGISTER_USER, 500);

        assert!(matches!(
            app.login("u1").await,
            Err(SdkError::Http { status: 500, .. })
        ));
        assert_eq!(store.get(KEY_USER_ID), None);
        assert_eq!(app.session().user_id, None);
    }
}
