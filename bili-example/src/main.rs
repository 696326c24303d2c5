use std::time::Duration;

use anyhow::{Context, Result};
use bili_api::{LiveApiClient, RoomId};
use bili_stream::{logging, AudioStream, ByteStream, ClientConfig, StreamClient, StreamEvent};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Bilibili live room example
///
/// Looks up each room through the web API, then watches them and captures
/// audio whenever one goes live.
#[derive(Parser, Debug)]
#[command(name = "bili-example")]
#[command(about = "Watch Bilibili live rooms and capture their audio")]
#[command(version)]
pub struct Args {
    /// Room ids (short ids are resolved)
    #[arg(required = true)]
    pub room_ids: Vec<i64>,

    /// Polling interval in seconds
    #[arg(short, long, default_value = "15")]
    pub interval_secs: u64,

    /// SESSDATA cookie for authenticated requests
    #[arg(long, env = "BILI_SESSDATA")]
    pub cookie: Option<String>,

    /// Only report live/offline transitions
    #[arg(long)]
    pub no_capture: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(anyhow::anyhow!("Polling interval must be positive"));
        }

        match self.log_level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            _ => Err(anyhow::anyhow!(
                "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
                self.log_level
            )),
        }
    }

    fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new()
            .with_interval(Duration::from_secs(self.interval_secs))
            .with_auto_capture(!self.no_capture);

        match &self.cookie {
            Some(cookie) => config.with_cookie(cookie.as_str()),
            None => config,
        }
    }
}

/// Initialize tracing with the given level unless `RUST_LOG` is set
///
/// `BILI_LOG_MODE` selects one of the library's logging presets instead.
fn init_tracing(log_level: &str) -> Result<()> {
    if std::env::var_os("BILI_LOG_MODE").is_some() {
        return logging::init_logging_from_env().context("Failed to initialize logging");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_lowercase())),
        )
        .init();

    Ok(())
}

/// Resolve short ids and print what the API knows about each room.
///
/// Rooms that cannot be resolved are watched under the id given.
async fn lookup_rooms(api: &LiveApiClient, ids: &[i64]) -> Vec<RoomId> {
    let mut rooms = Vec::with_capacity(ids.len());

    for &id in ids {
        let room_id = match api.resolve_room_id(id).await {
            Ok(room_id) => {
                info!(input = id, real_id = room_id.as_i64(), "resolved room");
                room_id
            }
            Err(e) => {
                error!(id, error = %e, "resolve room id");
                RoomId::new(id)
            }
        };

        match api.get_room_info(room_id).await {
            Ok(room) => info!(
                room_id = room.room_id.as_i64(),
                title = %room.title,
                live_status = ?room.live_status,
                uid = room.uid,
                "room info"
            ),
            Err(e) => error!(room_id = room_id.as_i64(), error = %e, "get room info"),
        }

        if !rooms.contains(&room_id) {
            rooms.push(room_id);
        }
    }

    rooms
}

/// Read one chunk of PCM to show the capture works, then release it.
async fn sample_audio(audio: AudioStream) {
    let room_id = audio.room_id().as_i64();
    let Some(mut reader) = audio.take_reader() else {
        warn!(room_id, "audio already claimed");
        return;
    };

    let mut buffer = vec![0u8; 4096];
    match reader.read(&mut buffer).await {
        Ok(bytes) => info!(room_id, bytes, "received audio data"),
        Err(e) => error!(room_id, error = %e, "read audio"),
    }

    if let Err(e) = reader.close().await {
        warn!(room_id, error = %e, "close audio stream");
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.client_config();

    let api = match &config.monitor.cookie {
        Some(cookie) => LiveApiClient::builder().with_cookie(cookie.as_str()).build(),
        None => LiveApiClient::new(),
    }
    .context("Failed to create API client")?;

    info!("=== API lookup ===");
    let rooms = lookup_rooms(&api, &args.room_ids).await;

    info!("=== StreamClient ===");
    let client = StreamClient::new(config).context("Failed to create stream client")?;

    let scope = CancellationToken::new();
    let mut events = client
        .subscribe(&scope, rooms)
        .context("Failed to subscribe to rooms")?;

    let ctrl_c = scope.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
        }
        ctrl_c.cancel();
    });

    info!("subscribed, waiting for events... (Ctrl+C to stop)");

    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Live { room_id, title } => {
                info!(room_id = room_id.as_i64(), title = %title, "LIVE");
            }
            StreamEvent::Offline { room_id, .. } => {
                info!(room_id = room_id.as_i64(), "OFFLINE");
            }
            StreamEvent::AudioReady { room_id, audio, .. } => {
                info!(room_id = room_id.as_i64(), "AUDIO READY");
                tokio::spawn(sample_audio(audio));
            }
            StreamEvent::Error { room_id, error, .. } => {
                error!(room_id = room_id.as_i64(), error = %error, "ERROR");
            }
        }
    }

    info!("Event stream closed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    args.validate()?;
    init_tracing(&args.log_level)?;

    run(args).await
}
