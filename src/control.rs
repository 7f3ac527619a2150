//! Config listener: handles inbound messages on `<prefix>cfg/#`.
//!
//! Grounded on `nmea0183tomqtt.c`'s `my_mqtt_msg` callback. Each handler
//! mutates [`RuntimeConfig`] in place and logs a notice; `cfg/msgs`
//! additionally triggers [`SatTracker::clear_gsvs`] when GSV transitions
//! from enabled to disabled.

use log::info;

use crate::cache::{Cache, PendingPublish};
use crate::config::{merge_nmea_use, RuntimeConfig};
use crate::tracker::SatTracker;

/// Dispatch one inbound `cfg/<sub>` message. `sub` is the topic suffix
/// after `cfg/`; `payload` is the raw (UTF-8 lossy) message body.
pub fn handle(
    sub: &str,
    payload: &str,
    config: &mut RuntimeConfig,
    tracker: &mut SatTracker,
    cache: &mut Cache,
    out: &mut Vec<PendingPublish>,
) {
    match sub {
        "msgs" => handle_msgs(payload, config, tracker, cache, out),
        "always" => handle_always(payload, config),
        "deadtime" => handle_deadtime(payload, config),
        "default" => handle_default(payload, config),
        _ => {}
    }
}

fn handle_msgs(
    payload: &str,
    config: &mut RuntimeConfig,
    tracker: &mut SatTracker,
    cache: &mut Cache,
    out: &mut Vec<PendingPublish>,
) {
    if payload.is_empty() {
        return;
    }
    let gsv_was_enabled = config.use_sentence("GSV");
    merge_nmea_use(&mut config.nmea_use, payload);
    info!("cfg/msgs: {payload}");
    if gsv_was_enabled && !config.use_sentence("GSV") {
        tracker.clear_gsvs(config, cache, out);
    }
}

fn handle_always(payload: &str, config: &mut RuntimeConfig) {
    let val: i64 = payload.trim().parse().unwrap_or(0);
    config.always = val != 0;
    info!("cfg/always: {}", config.always);
}

fn handle_deadtime(payload: &str, config: &mut RuntimeConfig) {
    if let Ok(secs) = payload.trim().parse::<u64>() {
        config.deaddelay = secs;
        info!("cfg/deadtime: {secs}");
    }
}

fn handle_default(payload: &str, config: &mut RuntimeConfig) {
    config.def_talker_override = if payload.is_empty() {
        None
    } else {
        Some(payload.to_ascii_lowercase())
    };
    info!("cfg/default: {payload}");
}
