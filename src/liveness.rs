//! Port liveness: tri-state {unknown, dead, alive} driven by an
//! input-silence deadline.
//!
//! Grounded on `nmea0183tomqtt.c`'s SIGALRM handler and the `alive`
//! publish/erase logic in `main()`. The deadline itself is driven by
//! `tokio::time::sleep_until` from the event loop (`app.rs`) rather than a
//! real signal, since the single-threaded `select!` loop already owns
//! timing.

use std::time::Duration;

use tokio::time::Instant;

use crate::cache::{Cache, PendingPublish};
use crate::config::RuntimeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unknown,
    Dead,
    Alive,
}

pub struct Liveness {
    state: State,
    deadline: Instant,
}

impl Liveness {
    pub fn new(deaddelay: u64) -> Self {
        Self {
            state: State::Unknown,
            deadline: Instant::now() + Duration::from_secs(deaddelay),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Call on every successful read. Resets the deadline and, if the
    /// state wasn't already alive, publishes retained `alive=1`.
    pub fn on_input(&mut self, config: &RuntimeConfig, cache: &mut Cache, out: &mut Vec<PendingPublish>) {
        self.deadline = Instant::now() + Duration::from_secs(config.deaddelay);
        if self.state != State::Alive {
            self.state = State::Alive;
            cache.publish(config, None, "alive", crate::cache::FL_RETAIN, "1", false, out);
            out.extend(cache.flush(false));
        }
    }

    /// Call when the deadline fires. If not already dead, publishes
    /// retained `alive=0` and erases every non-control (data) topic in the
    /// same flush pass. Reschedules the next deadline regardless.
    pub fn on_timeout(&mut self, config: &RuntimeConfig, cache: &mut Cache, out: &mut Vec<PendingPublish>) {
        if self.state != State::Dead {
            self.state = State::Dead;
            cache.publish(config, None, "alive", crate::cache::FL_RETAIN, "0", false, out);
            out.extend(cache.erase(false));
        }
        self.deadline = Instant::now() + Duration::from_secs(config.deaddelay);
    }

    pub fn state(&self) -> State {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RuntimeConfig {
        RuntimeConfig::new_for_test("gps/", Some("gp"))
    }

    #[tokio::test]
    async fn first_input_transitions_unknown_to_alive() {
        let mut liveness = Liveness::new(10);
        let mut cache = Cache::new();
        let config = cfg();
        let mut out = Vec::new();
        liveness.on_input(&config, &mut cache, &mut out);
        assert_eq!(liveness.state(), State::Alive);
        assert!(out.iter().any(|p| p.topic == "gps/alive" && p.payload == "1"));
    }

    #[tokio::test]
    async fn repeated_input_while_already_alive_is_silent() {
        let mut liveness = Liveness::new(10);
        let mut cache = Cache::new();
        let config = cfg();
        let mut out = Vec::new();
        liveness.on_input(&config, &mut cache, &mut out);
        out.clear();
        liveness.on_input(&config, &mut cache, &mut out);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn timeout_publishes_dead_and_erases_data_topics() {
        let mut liveness = Liveness::new(10);
        let mut cache = Cache::new();
        let config = cfg();
        let mut out = Vec::new();
        liveness.on_input(&config, &mut cache, &mut out);
        out.clear();
        cache.publish(&config, Some("gp"), "lat", crate::cache::FL_RETAIN | crate::cache::FL_IGN_DEF_TALKER, "48.0", true, &mut out);
        out.extend(cache.flush(false));
        out.clear();

        liveness.on_timeout(&config, &mut cache, &mut out);
        assert_eq!(liveness.state(), State::Dead);
        assert!(out.iter().any(|p| p.topic == "gps/alive" && p.payload == "0"));
        assert!(out.iter().any(|p| p.topic == "gps/gp/lat" && p.payload.is_empty()));
    }

    #[tokio::test]
    async fn repeated_timeout_while_already_dead_is_silent() {
        let mut liveness = Liveness::new(10);
        let mut cache = Cache::new();
        let config = cfg();
        let mut out = Vec::new();
        liveness.on_timeout(&config, &mut cache, &mut out);
        out.clear();
        liveness.on_timeout(&config, &mut cache, &mut out);
        assert!(out.is_empty());
    }
}
