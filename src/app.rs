//! The main event loop: one `tokio::select!` multiplexing the serial byte
//! channel, the MQTT event loop, the liveness deadline, and termination
//! signals. Grounded on `nmea0183tomqtt.c`'s `main()` poll loop, which
//! multiplexes the same three descriptors (input, MQTT socket, signalfd)
//! with a `poll(2)` instead of `select!`.

use log::{error, info};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use crate::cache::FL_RETAIN;
use crate::config::RuntimeConfig;
use crate::control;
use crate::error::Result;
use crate::framer::Framer;
use crate::mqtt::Mqtt;
use crate::state::State;

pub async fn run(config: RuntimeConfig, source: String, mut input_rx: mpsc::Receiver<Vec<u8>>, mut mqtt: Mqtt) -> Result<()> {
    let mut state = State::new(config);
    let mut framer = Framer::new();

    let mut startup = Vec::new();
    state.cache.publish(&state.config, None, "src", FL_RETAIN, source.clone(), false, &mut startup);
    startup.extend(state.cache.flush(false));
    mqtt.publish_all(&startup).await?;

    let mut sigint = signal(SignalKind::interrupt()).map_err(crate::error::AppError::Io)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(crate::error::AppError::Io)?;

    info!("gnss2mqtt: reading from {source}");

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }

            chunk = input_rx.recv() => {
                match chunk {
                    Some(bytes) => {
                        framer.feed(&bytes);
                        for frame in framer.drain() {
                            let pubs = state.handle_frame(frame, &source);
                            if let Err(e) = mqtt.publish_all(&pubs).await {
                                error!("mqtt publish failed: {e}");
                                return Err(e);
                            }
                        }
                    }
                    None => {
                        info!("input closed, shutting down");
                        break;
                    }
                }
            }

            msg = mqtt.poll() => {
                match msg {
                    Ok(Some(cfg_msg)) => {
                        let mut out = Vec::new();
                        control::handle(
                            &cfg_msg.sub,
                            &cfg_msg.payload,
                            &mut state.config,
                            &mut state.tracker,
                            &mut state.cache,
                            &mut out,
                        );
                        if let Err(e) = mqtt.publish_all(&out).await {
                            error!("mqtt publish failed: {e}");
                            return Err(e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("mqtt connection error: {e}");
                        return Err(e);
                    }
                }
            }

            _ = tokio::time::sleep_until(state.liveness.deadline()) => {
                let mut out = Vec::new();
                state.liveness.on_timeout(&state.config, &mut state.cache, &mut out);
                if let Err(e) = mqtt.publish_all(&out).await {
                    error!("mqtt publish failed: {e}");
                    return Err(e);
                }
            }
        }
    }

    shutdown(&mut state, &mut mqtt).await
}

async fn shutdown(state: &mut State, mqtt: &mut Mqtt) -> Result<()> {
    let mut out = state.cache.erase(true);
    state.tracker.clear_gsvs(&state.config, &mut state.cache, &mut out);
    out.extend(state.cache.flush(false));
    mqtt.publish_all(&out).await?;

    mqtt.self_sync().await?;
    mqtt.disconnect().await?;
    info!("shutdown complete");
    Ok(())
}
