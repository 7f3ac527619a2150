//! MQTT transport: connect, last-will, control-topic subscription, publish,
//! and the shutdown self-sync handshake.
//!
//! Follows `usp/mtp/mqtt.rs`'s `MqttOptions`/`AsyncClient`/
//! `event_loop.poll()` drive loop, generalized from TR-369 USP records
//! to plain retained MQTT publishes, and `nmea0183tomqtt.c`'s
//! `send_self_sync` / main-loop MQTT servicing.

use std::time::Duration;

use log::{debug, info};
use rand::Rng;
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};

use crate::cache::PendingPublish;
use crate::error::{AppError, Result};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const SELF_SYNC_TOPIC_SUFFIX: &str = "selfsync";

pub struct Mqtt {
    client: AsyncClient,
    event_loop: rumqttc::EventLoop,
    prefix: String,
}

/// A decoded inbound `cfg/<sub>` message.
pub struct ConfigMessage {
    pub sub: String,
    pub payload: String,
}

impl Mqtt {
    pub async fn connect(host: &str, port: u16, client_id: &str, prefix: &str) -> Result<Self> {
        let mut opts = MqttOptions::new(client_id, host, port);
        opts.set_keep_alive(KEEP_ALIVE);
        opts.set_last_will(LastWill::new(
            format!("{prefix}alive"),
            "crashed",
            QoS::AtLeastOnce,
            true,
        ));

        let (client, event_loop) = AsyncClient::new(opts, 64);
        let cfg_topic = format!("{prefix}cfg/#");
        client.subscribe(&cfg_topic, QoS::AtLeastOnce).await?;
        info!("mqtt: connecting to {host}:{port}, subscribed to {cfg_topic}");

        Ok(Self { client, event_loop, prefix: prefix.to_string() })
    }

    pub async fn publish(&self, p: &PendingPublish) -> Result<()> {
        let retain = p.retain;
        debug!("publish {} retain={retain} payload={:?}", p.topic, p.payload);
        self.client
            .publish(&p.topic, QoS::AtLeastOnce, retain, p.payload.clone())
            .await?;
        Ok(())
    }

    pub async fn publish_all(&self, pubs: &[PendingPublish]) -> Result<()> {
        for p in pubs {
            self.publish(p).await?;
        }
        Ok(())
    }

    /// Block until the next broker event, decoding inbound `cfg/#` messages.
    /// Returns `None` for events that carry no control message (acks,
    /// pings, non-`cfg` publishes).
    pub async fn poll(&mut self) -> Result<Option<ConfigMessage>> {
        loop {
            let event = self.event_loop.poll().await.map_err(AppError::MqttConnection)?;
            if let Event::Incoming(Packet::Publish(msg)) = event {
                let cfg_prefix = format!("{}cfg/", self.prefix);
                if let Some(sub) = msg.topic.strip_prefix(&cfg_prefix) {
                    let payload = String::from_utf8_lossy(&msg.payload).into_owned();
                    return Ok(Some(ConfigMessage { sub: sub.to_string(), payload }));
                }
                return Ok(None);
            }
            return Ok(None);
        }
    }

    /// Self-sync handshake: publish a unique token to a well-known topic
    /// and wait for it to echo back, proving every prior publish at
    /// QoS >= 1 has reached the broker (ordering guarantee of a single
    /// publisher/session).
    pub async fn self_sync(&mut self) -> Result<()> {
        let topic = format!("{}{SELF_SYNC_TOPIC_SUFFIX}", self.prefix);
        self.client.subscribe(&topic, QoS::AtLeastOnce).await?;

        let token = format!("{}-{}-{}", std::process::id(), now_secs(), rand::thread_rng().gen::<u32>());
        self.client.publish(&topic, QoS::AtLeastOnce, false, token.clone()).await?;

        loop {
            let event = self.event_loop.poll().await.map_err(AppError::MqttConnection)?;
            if let Event::Incoming(Packet::Publish(msg)) = event {
                if msg.topic == topic && msg.payload == token.as_bytes() {
                    return Ok(());
                }
            }
        }
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_sync_token_contains_pid() {
        let pid = std::process::id();
        let token = format!("{pid}-{}-{}", now_secs(), 42u32);
        assert!(token.starts_with(&pid.to_string()));
    }
}
