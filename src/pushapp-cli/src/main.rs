//! PushApp CLI: drives the SDK against a live backend with a logging
//! renderer, for manual verification of registration, events, polling and
//! the realtime channel.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pushapp_core::types::{LayoutKind, TooltipContent, TrackEvent};
use pushapp_core::SdkConfig;
use pushapp_mobile_sdk::geometry::{floater_frame, pip_frame, place_tooltip, PixelRect, Screen};
use pushapp_mobile_sdk::registry::{PlaceholderRegistration, TooltipTarget};
use pushapp_mobile_sdk::{DeviceInfo, OverlayRequest, PushApp, Renderer};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "pushapp")]
#[command(about = "Drive the PushApp SDK against a live backend")]
#[command(version)]
struct Cli {
    /// `tenant$channelId`
    #[arg(long, env = "PUSHAPP_IDENTIFIER")]
    identifier: String,

    /// Use the sandbox domain
    #[arg(long, default_value_t = false)]
    sandbox: bool,

    /// JSON file for persisted SDK state (overrides config)
    #[arg(long, env = "PUSHAPP__STORAGE__PATH")]
    store: Option<String>,

    /// Delay between a delivered event and the in-app poll (overrides config)
    #[arg(long, env = "PUSHAPP__POLL__DELAY_MS")]
    poll_delay_ms: Option<u64>,

    /// Simulated user dismiss delay for displayed overlays
    #[arg(long, default_value_t = 3000)]
    dismiss_after_ms: u64,

    /// How long to keep processing after the command finishes
    #[arg(long, default_value_t = 5000)]
    linger_ms: u64,

    #[arg(long, default_value_t = 1080)]
    screen_width: u32,

    #[arg(long, default_value_t = 2400)]
    screen_height: u32,

    #[arg(long, default_value_t = 2.75)]
    density: f32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a push token
    Register {
        #[arg(long)]
        token: String,
    },
    /// Log a user in and open the realtime channel
    Login {
        #[arg(long)]
        user_id: String,
    },
    /// Send an event (JSON object data)
    SendEvent {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "{}")]
        data: String,
    },
    /// Poll for in-app content now
    Poll,
    /// Log in and keep the realtime channel open
    Listen {
        #[arg(long)]
        user_id: String,
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
    Ping,
    /// Print the device headers
    Headers,
}

/// Logs what a real host would draw, with the frames it would use.
struct LogRenderer {
    screen: Screen,
    shown: mpsc::UnboundedSender<String>,
}

impl LogRenderer {
    fn overlay_frame(&self, request: &OverlayRequest) -> PixelRect {
        match request.kind {
            LayoutKind::PictureInPicture => pip_frame(&self.screen, request.alignment),
            LayoutKind::Floater => floater_frame(&self.screen),
            _ => PixelRect::new(0, 0, self.screen.width, self.screen.height),
        }
    }
}

impl Renderer for LogRenderer {
    fn show_overlay(&self, request: &OverlayRequest) {
        let frame = self.overlay_frame(request);
        info!(
            message_id = %request.message_id(),
            layout = ?request.kind,
            alignment = %request.alignment,
            draggable = request.payload.draggable,
            x = frame.x,
            y = frame.y,
            width = frame.width,
            height = frame.height,
            html_len = request.payload.html.len(),
            "Overlay shown"
        );
        let _ = self.shown.send(request.message_id().to_string());
    }

    fn load_placeholder(&self, registration: &PlaceholderRegistration, html: &str) {
        info!(
            placeholder_id = %registration.placeholder_id,
            html_len = html.len(),
            "Placeholder loaded"
        );
    }

    fn show_tooltip(&self, target: &TooltipTarget, content: &TooltipContent) {
        let width_percent = match content {
            TooltipContent::Styled(style) => style.width_percent,
            TooltipContent::Html { .. } => 60,
        };
        let placement = place_tooltip(&target.rect(), &self.screen, width_percent, self.screen.dp(60));
        info!(
            target_id = %target.target_id,
            arrow = ?placement.arrow,
            x = placement.frame.x,
            y = placement.frame.y,
            width = placement.frame.width,
            "Tooltip shown"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pushapp=info,pushapp_mobile_sdk=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = SdkConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        SdkConfig::default()
    });
    if let Some(path) = cli.store.clone() {
        config.storage.path = Some(path);
    }
    if let Some(delay) = cli.poll_delay_ms {
        config.poll.delay_ms = delay;
    }

    let device = DeviceInfo {
        screen_width: cli.screen_width,
        screen_height: cli.screen_height,
        density: cli.density,
        ..Default::default()
    };
    let (shown_tx, mut shown_rx) = mpsc::unbounded_channel();
    let renderer = Arc::new(LogRenderer {
        screen: Screen {
            width: cli.screen_width as i32,
            height: cli.screen_height as i32,
            density: cli.density as f64,
        },
        shown: shown_tx,
    });

    let app = PushApp::from_config(config, device, renderer)?;
    app.initialize(&cli.identifier, cli.sandbox).await?;

    let mut tooltips = app.subscribe_tooltips();
    tokio::spawn(async move {
        while let Ok(event) = tooltips.recv().await {
            info!(target_id = %event.target, title = %event.style.title, "Unclaimed tooltip");
        }
    });

    let mut linger = Duration::from_millis(cli.linger_ms);
    match cli.command {
        Command::Register { token } => app.handle_device_token(&token).await?,
        Command::Login { user_id } => app.login(&user_id).await?,
        Command::SendEvent { name, data } => {
            let data: serde_json::Value = serde_json::from_str(&data)?;
            app.send_event(&name, data).await?;
        }
        Command::Poll => {
            let count = app.poll_now().await?;
            info!(count, "Poll complete");
        }
        Command::Listen { user_id, seconds } => {
            app.login(&user_id).await?;
            linger = Duration::from_secs(seconds);
        }
        Command::Ping => app.ping().await?,
        Command::Headers => {
            for (name, value) in app.device_headers() {
                println!("{name}: {value}");
            }
        }
    }

    let dismiss_after = Duration::from_millis(cli.dismiss_after_ms);
    let deadline = tokio::time::Instant::now() + linger;
    while let Ok(Some(message_id)) = tokio::time::timeout_at(deadline, shown_rx.recv()).await {
        tokio::time::sleep(dismiss_after).await;
        info!(message_id = %message_id, "Dismissing overlay");
        app.on_overlay_closed(TrackEvent::Dismissed);
    }

    app.disconnect_socket();
    info!("PushApp CLI done");
    Ok(())
}
