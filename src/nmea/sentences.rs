//! Sentence handlers: GGA, GNS, GSA, GSV, VTG, ZDA, TXT.
//!
//! Each handler is invoked only once the caller has confirmed
//! `config.use_sentence(code)` (TXT is always handled). Every handler
//! operates in "data sentence scope" — cache writes are tagged
//! `is_control=false` — and the caller flushes the cache once the handler
//! returns. Grounded on `nmea0183tomqtt.c`'s `recvd_gga_gns`, `recvd_gsa`,
//! `recvd_vtg`, `recvd_zda`, `recvd_txt`.

use chrono::{Local, NaiveDate, TimeZone};
use log::{log, Level};

use crate::cache::{Cache, FL_IGN_DEF_TALKER, FL_NO_CACHE, FL_RETAIN};
use crate::config::RuntimeConfig;
use crate::nmea::{apply_hemisphere, nmea_deg, to_double, Sentence};
use crate::tracker::SatTracker;

const QUALITY: &[&str] = &[
    "none", "gps", "dgps", "pps", "rtk", "float-rtk", "estimated", "manual input", "simulation",
];
const GSA_MODE: &[&str] = &["", "no fix", "2D", "3D"];
const GNS_MODE_CHARS: &str = "NADPRFEMS";
const GNS_TALKERS: &[&str] = &["gp", "gl", "gb", "ga"];

fn quality_str(idx: usize) -> &'static str {
    QUALITY.get(idx).copied().unwrap_or("")
}

/// GGA / GNS: position, fix quality (or per-talker mode), sats-in-use,
/// HDOP, altitude, geoid separation, differential age/id.
pub fn recvd_gga_gns(
    s: &mut Sentence,
    is_gga: bool,
    talker: &str,
    cache: &mut Cache,
    config: &RuntimeConfig,
    tracker: &mut SatTracker,
    out: &mut Vec<crate::cache::PendingPublish>,
) {
    s.skip(); // UTC within day

    let mut lat = nmea_deg(s.tok());
    lat = apply_hemisphere(lat, s.tok());
    cache.publish(config, Some(talker), "lat", FL_RETAIN, fmt7(lat), true, out);

    let mut lon = nmea_deg(s.tok());
    lon = apply_hemisphere(lon, s.tok());
    cache.publish(config, Some(talker), "lon", FL_RETAIN, fmt7(lon), true, out);

    if is_gga {
        let quality: usize = s.tok().parse().unwrap_or(0);
        cache.publish(config, Some(talker), "quality", FL_RETAIN, quality_str(quality), true, out);
    } else {
        let modes = s.tok();
        for (ch, gns_talker) in modes.chars().zip(GNS_TALKERS.iter()) {
            let idx = GNS_MODE_CHARS
                .find(ch.to_ascii_uppercase())
                .unwrap_or(0);
            cache.publish(config, Some(gns_talker), "mode", FL_RETAIN, quality_str(idx), true, out);
        }
    }

    let satuse: i32 = s.tok().parse().unwrap_or(0);
    cache.publish(
        config,
        Some(talker),
        "satuse",
        FL_RETAIN | FL_IGN_DEF_TALKER,
        satuse.to_string(),
        true,
        out,
    );
    tracker.satuse_updated(talker, satuse, config, cache, out);

    let hdop = to_double(s.tok());
    if !config.use_sentence("GSA") {
        cache.publish(config, Some(talker), "hdop", FL_RETAIN, fmt1(hdop), true, out);
    }

    let alt = to_double(s.tok());
    cache.publish(config, Some(talker), "alt", FL_RETAIN, fmt1(alt), true, out);
    s.skip(); // unit, always "M"

    let geoid = to_double(s.tok());
    cache.publish(config, Some(talker), "geoid", FL_RETAIN, fmt1(geoid), true, out);
    if is_gga {
        s.skip(); // unit "M"
    }

    let diff_age = s.tok();
    cache.publish(config, Some(talker), "diff/age", FL_RETAIN, diff_age, true, out);
    let diff_id = s.tok();
    cache.publish(config, Some(talker), "diff/id", FL_RETAIN, diff_id, true, out);
}

/// GSA: selection mode skipped, fix mode, 12 satellite-ID fields skipped,
/// PDOP/HDOP/VDOP, optional packet number (defaults to 1).
pub fn recvd_gsa(
    s: &mut Sentence,
    talker: &str,
    cache: &mut Cache,
    config: &RuntimeConfig,
    out: &mut Vec<crate::cache::PendingPublish>,
) {
    s.skip(); // selection mode
    let mode: usize = s.tok().parse().unwrap_or(0);
    for _ in 0..12 {
        s.skip();
    }
    let pdop = to_double(s.tok());
    let hdop = to_double(s.tok());
    let vdop = to_double(s.tok());
    let pktnr: u32 = s.tok_opt().unwrap_or("1").parse().unwrap_or(1);

    if pktnr == 1 {
        let mode_str = GSA_MODE.get(mode).copied().unwrap_or("");
        cache.publish(config, Some(talker), "mode", FL_RETAIN, mode_str, true, out);
        cache.publish(config, Some(talker), "pdop", FL_RETAIN, fmt1(pdop), true, out);
        cache.publish(config, Some(talker), "hdop", FL_RETAIN, fmt1(hdop), true, out);
        cache.publish(config, Some(talker), "vdop", FL_RETAIN, fmt1(vdop), true, out);
    }
}

/// VTG: true heading, magnetic heading, speed. The three skipped fields
/// between magnetic heading and speed are the "M" unit, speed-in-knots and
/// its "N" unit — `speed` publishes the speed-over-ground in km/h.
pub fn recvd_vtg(
    s: &mut Sentence,
    talker: &str,
    cache: &mut Cache,
    config: &RuntimeConfig,
    out: &mut Vec<crate::cache::PendingPublish>,
) {
    let true_heading = to_double(s.tok());
    cache.publish(config, Some(talker), "heading", FL_RETAIN, fmt2(true_heading), true, out);
    s.skip(); // 'T'
    let mag_heading = to_double(s.tok());
    cache.publish(
        config,
        Some(talker),
        "heading/magnetic",
        FL_RETAIN,
        fmt2(mag_heading),
        true,
        out,
    );
    for _ in 0..3 {
        s.skip(); // 'M', speed (knots), 'N'
    }
    let speed = to_double(s.tok());
    cache.publish(config, Some(talker), "speed", FL_RETAIN, fmt2(speed), true, out);
}

/// GSV: packet count/index, sats-in-view, up to 4 (prn, elv, azm, snr)
/// tuples. Hands off to the satellite tracker, which owns the block
/// protocol and the retained `sat/*`/`satview`/`sattrack` publishing.
pub fn recvd_gsv(
    s: &mut Sentence,
    talker: &str,
    cache: &mut Cache,
    config: &RuntimeConfig,
    tracker: &mut SatTracker,
    out: &mut Vec<crate::cache::PendingPublish>,
) {
    let msgcnt: u32 = s.tok().parse().unwrap_or(0);
    let msgidx: u32 = s.tok().parse().unwrap_or(0);
    let nsat: i32 = s.tok().parse().unwrap_or(0);

    let mut tuples = Vec::with_capacity(4);
    for _ in 0..4 {
        let prn_tok = s.tok();
        if prn_tok.is_empty() {
            break;
        }
        let prn: u32 = prn_tok.parse().unwrap_or(0);
        let elv: i32 = s.tok().parse().unwrap_or(0);
        let azm: i32 = s.tok().parse().unwrap_or(0);
        let snr: i32 = s.tok_opt().and_then(|t| t.parse().ok()).unwrap_or(-1);
        tuples.push(crate::tracker::SatTuple { prn, elv, azm, snr });
    }

    tracker.recvd_gsv(talker, msgcnt, msgidx, nsat, &tuples, config, cache, out);
}

/// ZDA: HHMMSS, DD, MM, YYYY -> UTC epoch + localized datetime string.
pub fn recvd_zda(
    s: &mut Sentence,
    talker: &str,
    cache: &mut Cache,
    config: &RuntimeConfig,
    out: &mut Vec<crate::cache::PendingPublish>,
) {
    let time_field = s.tok();
    let day: u32 = s.tok().parse().unwrap_or(1);
    let month: u32 = s.tok().parse().unwrap_or(1);
    let year: i32 = s.tok().parse().unwrap_or(1970);

    let val: u64 = time_field.parse().unwrap_or(0);
    let sec = (val % 100) as u32;
    let val = val / 100;
    let min = (val % 100) as u32;
    let hour = (val / 100) as u32;

    let epoch = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, min, sec))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0);

    cache.publish(config, Some(talker), "utc", FL_RETAIN, epoch.to_string(), true, out);

    // "datetime" is localtime, matching recvd_zda's localtime(&tim); "utc" above is the epoch.
    let dt = Local.timestamp_opt(epoch, 0).single();
    let formatted = dt
        .map(|dt| dt.format("%a %d %b %Y %H:%M:%S").to_string())
        .unwrap_or_default();
    cache.publish(config, Some(talker), "datetime", FL_RETAIN, formatted, true, out);
}

/// TXT: logs the receiver's own diagnostic text at a mapped level. Never
/// publishes to MQTT.
pub fn recvd_txt(s: &mut Sentence, talker: &str, source: &str) {
    s.skip();
    s.skip();
    let severity: u32 = s.tok().parse().unwrap_or(u32::MAX);
    let msg = s.tok_opt();
    let level = match severity {
        0 => Some(Level::Error),
        1 => Some(Level::Warn),
        2 => Some(Level::Info), // NOTICE has no direct `log` equivalent; Info is the closest non-debug level
        7 => Some(Level::Info),
        _ => None,
    };
    if let (Some(level), Some(msg)) = (level, msg) {
        log!(
            level,
            "{source} {}{}TXT '{msg}'",
            talker.chars().next().unwrap_or(' ').to_ascii_uppercase(),
            talker.chars().nth(1).unwrap_or(' ').to_ascii_uppercase()
        );
    }
}

fn fmt7(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        format!("{v:.7}")
    }
}

fn fmt1(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        format!("{v:.1}")
    }
}

fn fmt2(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        format!("{v:.2}")
    }
}

// Re-exported so tracker.rs's GSV handling can reuse the same cache flags
// without duplicating the constant imports.
pub(crate) const GSV_FLAGS: u8 = FL_RETAIN | FL_NO_CACHE | FL_IGN_DEF_TALKER;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PendingPublish;
    use crate::config::RuntimeConfig;
    use crate::tracker::SatTracker;

    fn cfg() -> RuntimeConfig {
        RuntimeConfig::new_for_test("gps/", Some("gp"))
    }

    fn flush(cache: &mut Cache, out: &mut Vec<PendingPublish>) {
        out.extend(cache.flush(false));
    }

    #[test]
    fn gga_basic_fix() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
        let mut s = Sentence::parse(line).unwrap().unwrap();
        let mut cache = Cache::new();
        let mut tracker = SatTracker::new();
        let config = cfg();
        let mut out = Vec::new();
        recvd_gga_gns(&mut s, true, "gp", &mut cache, &config, &mut tracker, &mut out);
        flush(&mut cache, &mut out);

        let find = |topic: &str| out.iter().find(|p| p.topic == topic).map(|p| p.payload.clone());
        assert_eq!(find("gps/lat"), Some("48.1173000".to_string()));
        assert_eq!(find("gps/lon"), Some("11.5166667".to_string()));
        assert_eq!(find("gps/quality"), Some("gps".to_string()));
        assert_eq!(find("gps/gp/satuse"), Some("8".to_string()));
        assert_eq!(find("gps/hdop"), Some("0.9".to_string()));
        assert_eq!(find("gps/alt"), Some("545.4".to_string()));
        assert_eq!(find("gps/geoid"), Some("46.9".to_string()));
        assert_eq!(find("gps/diff/age"), Some(String::new()));
        assert_eq!(find("gps/diff/id"), Some(String::new()));
    }

    #[test]
    fn identical_second_line_produces_no_publishes() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
        let mut cache = Cache::new();
        let mut tracker = SatTracker::new();
        let config = cfg();
        let mut out = Vec::new();
        let mut s1 = Sentence::parse(line).unwrap().unwrap();
        recvd_gga_gns(&mut s1, true, "gp", &mut cache, &config, &mut tracker, &mut out);
        out.extend(cache.flush(false));

        let mut out2 = Vec::new();
        let mut s2 = Sentence::parse(line).unwrap().unwrap();
        recvd_gga_gns(&mut s2, true, "gp", &mut cache, &config, &mut tracker, &mut out2);
        out2.extend(cache.flush(false));
        assert!(out2.is_empty());
    }

    #[test]
    fn gga_publishes_hdop_only_when_gsa_disabled() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
        let mut s = Sentence::parse(line).unwrap().unwrap();
        let mut cache = Cache::new();
        let mut tracker = SatTracker::new();
        let mut config = cfg();
        config.nmea_use.insert("GSA".to_string(), true);
        let mut out = Vec::new();
        recvd_gga_gns(&mut s, true, "gp", &mut cache, &config, &mut tracker, &mut out);
        flush(&mut cache, &mut out);
        assert!(!out.iter().any(|p| p.topic == "gps/hdop"));
    }

    #[test]
    fn vtg_fields() {
        // speed-over-ground differs between the knots field (005.5) and the
        // km/h field (010.2) so the test fails if the skip count regresses.
        let line = "$GPVTG,054.7,T,034.4,M,005.5,N,010.2,K*48";
        let mut s = Sentence::parse(line).unwrap().unwrap();
        let mut cache = Cache::new();
        let config = cfg();
        let mut out = Vec::new();
        recvd_vtg(&mut s, "gp", &mut cache, &config, &mut out);
        flush(&mut cache, &mut out);
        let find = |topic: &str| out.iter().find(|p| p.topic == topic).map(|p| p.payload.clone());
        assert_eq!(find("gps/heading"), Some("54.70".to_string()));
        assert_eq!(find("gps/heading/magnetic"), Some("34.40".to_string()));
        assert_eq!(find("gps/speed"), Some("10.20".to_string()));
    }

    #[test]
    fn gsa_only_publishes_on_first_packet() {
        let line = "$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1,1*24";
        let mut s = Sentence::parse(line).unwrap().unwrap();
        let mut cache = Cache::new();
        let config = cfg();
        let mut out = Vec::new();
        recvd_gsa(&mut s, "gp", &mut cache, &config, &mut out);
        flush(&mut cache, &mut out);
        assert!(out.iter().any(|p| p.topic == "gps/pdop"));
    }

    #[test]
    fn txt_never_publishes() {
        let line = "$GPTXT,01,01,02,ANTENNA OPEN*26";
        let mut s = Sentence::parse(line).unwrap().unwrap();
        recvd_txt(&mut s, "gp", "<stdin>");
        // No cache interaction at all is the assertion here: nothing to check
        // beyond "doesn't panic", since recvd_txt takes no cache reference.
    }
}
