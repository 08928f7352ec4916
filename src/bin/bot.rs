//! Arena Bot - headless client for soak testing a running server
//!
//! Connects over WebSocket, joins, and plays with scripted movement while
//! running the same prediction, reconciliation and interpolation pipeline
//! a graphical client would.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_server::client::{ClientError, ClientSession, FrameInput, RenderedPlayer};
use arena_server::config::BotConfig;
use arena_server::game::constants::{MAX_INPUT_DT, PING_INTERVAL_MS};
use arena_server::util::time::{unix_millis, FrameClock};
use arena_server::ws::protocol::{encode, ClientMsg};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = BotConfig::from_env()?;
    init_tracing(&config.log_level);

    info!(url = %config.server_url, nickname = %config.nickname, "Starting Arena Bot");

    tokio::select! {
        result = run(config) => result?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, disconnecting"),
    }

    Ok(())
}

async fn run(config: BotConfig) -> Result<(), ClientError> {
    let (stream, _) = connect_async(config.server_url.as_str()).await?;
    info!("WebSocket connected");

    let (mut write, mut read) = stream.split();
    let session = Arc::new(Mutex::new(ClientSession::new(
        config.nickname.clone(),
        config.character_id,
    )));

    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(e) = write.send(Message::Text(text)).await {
                warn!("Failed to send message: {}", e);
                break;
            }
        }
    });

    let reader_session = session.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Err(e) = reader_session.lock().handle_text(&text, unix_millis()) {
                        debug!("Dropping server message: {}", e);
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket read error: {}", e);
                    break;
                }
            }
        }
    });

    let join = session.lock().join_message();
    send(&out_tx, &join).await;

    let mut frames = interval(FRAME_INTERVAL);
    let mut pings = interval(Duration::from_millis(PING_INTERVAL_MS));
    let mut stats = interval(STATS_INTERVAL);
    for timer in [&mut frames, &mut pings, &mut stats] {
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    }

    let mut clock = FrameClock::new();
    let mut elapsed = 0.0_f32;

    let result = loop {
        tokio::select! {
            _ = frames.tick() => {
                let dt = clock.delta(MAX_INPUT_DT);
                elapsed += dt;

                let now = unix_millis();
                let msg = {
                    let mut session = session.lock();
                    let rendered = session.render(now);
                    let input = steer(elapsed, &rendered);
                    session.frame(input, dt, now as f64)
                };
                if let Some(msg) = msg {
                    send(&out_tx, &msg).await;
                }
            }
            _ = pings.tick() => {
                let ping = session.lock().ping_message(unix_millis() as f64);
                if let Some(ping) = ping {
                    send(&out_tx, &ping).await;
                }
            }
            _ = stats.tick() => {
                let session = session.lock();
                let predicted = session.predicted();
                info!(
                    player_id = ?session.player_id(),
                    rtt_ms = ?session.clock().rtt_ms(),
                    buffered = session.buffer().len(),
                    hp = predicted.health,
                    kills = predicted.kills,
                    deaths = predicted.deaths,
                    "Bot stats"
                );
            }
            _ = &mut reader => {
                break Err(ClientError::Closed);
            }
        }
    };

    session.lock().on_close();
    writer.abort();
    info!("Disconnected");
    result
}

/// Circle the arena, aim at the nearest live opponent and fire when one exists
fn steer(elapsed: f32, rendered: &[RenderedPlayer]) -> FrameInput {
    let heading = elapsed * 0.8;
    let mut input = FrameInput {
        move_x: heading.cos(),
        move_y: heading.sin(),
        aim_angle: heading,
        shoot: false,
    };

    let Some(me) = rendered.iter().find(|p| p.is_local) else {
        return input;
    };
    let nearest = rendered
        .iter()
        .filter(|p| !p.is_local && p.alive)
        .min_by(|a, b| {
            let da = (a.x - me.x).hypot(a.y - me.y);
            let db = (b.x - me.x).hypot(b.y - me.y);
            da.total_cmp(&db)
        });

    if let Some(target) = nearest {
        input.aim_angle = (target.y - me.y).atan2(target.x - me.x);
        input.shoot = me.alive;
    }
    input
}

async fn send(out_tx: &mpsc::Sender<String>, msg: &ClientMsg) {
    match encode(msg) {
        Ok(text) => {
            if out_tx.send(text).await.is_err() {
                debug!("Writer closed, dropping message");
            }
        }
        Err(e) => warn!("Failed to encode message: {}", e),
    }
}

fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
