//! Per-talker satellite tracker driven by GSV blocks.
//!
//! Grounded on `nmea0183tomqtt.c`'s `struct gsv`/`struct sat`, `find_gsv`,
//! `recvd_gsv`, `clear_sat`, `clear_gsvs` and `satuse_updated`. The PRN
//! space is a sparse `HashMap<u32, SatRecord>` rather than a realloc'd
//! array — see DESIGN.md for why that's the idiomatic substitution for the
//! C growable-array-rounded-to-128 pattern, with identical observable
//! behavior.

use std::collections::HashMap;

use crate::cache::{Cache, PendingPublish, FL_IGN_DEF_TALKER, FL_NO_CACHE, FL_RETAIN};
use crate::config::RuntimeConfig;

const GSV_FLAGS: u8 = FL_RETAIN | FL_NO_CACHE | FL_IGN_DEF_TALKER;

#[derive(Debug, Default, Clone, Copy)]
struct SatRecord {
    snr: i32, // -1 = no signal
    elv: i32,
    azm: i32,
    recvd_this_block: bool,
    published: bool,
}

#[derive(Debug, Default, Clone)]
struct GsvState {
    satmin: u32,
    satmax: u32,
    satview: i32,
    sattrack: i32,
    sattrack_saved: i32,
    satuse: i32,
    new: bool,
}

impl GsvState {
    fn fresh() -> Self {
        Self {
            new: true,
            ..Default::default()
        }
    }
}

/// A single (prn, elv, azm, snr) tuple from one GSV sentence.
#[derive(Debug, Clone, Copy)]
pub struct SatTuple {
    pub prn: u32,
    pub elv: i32,
    pub azm: i32,
    pub snr: i32,
}

pub struct SatTracker {
    gsvs: HashMap<String, GsvState>,
    sats: HashMap<(String, u32), SatRecord>,
    /// Latch: once the receiver itself reports `satuse` for talker "gn",
    /// stop computing the aggregate ourselves.
    gn_satuse_emitted: bool,
}

impl SatTracker {
    pub fn new() -> Self {
        Self {
            gsvs: HashMap::new(),
            sats: HashMap::new(),
            gn_satuse_emitted: false,
        }
    }

    fn gsv_mut(&mut self, talker: &str) -> &mut GsvState {
        self.gsvs
            .entry(talker.to_string())
            .or_insert_with(GsvState::fresh)
    }

    /// Process one GSV sentence (one packet of a possibly multi-packet
    /// block). `tuples` holds the up-to-4 satellite readings actually
    /// present in this packet (iteration in the caller already stopped at
    /// the first empty PRN field).
    pub fn recvd_gsv(
        &mut self,
        talker: &str,
        msgcnt: u32,
        msgidx: u32,
        nsat: i32,
        tuples: &[SatTuple],
        config: &RuntimeConfig,
        cache: &mut Cache,
        out: &mut Vec<PendingPublish>,
    ) {
        self.gsv_mut(talker); // ensure state exists even for an empty/zero-count block

        if msgidx == 1 {
            let (satmin, satmax) = {
                let gsv = self.gsv_mut(talker);
                gsv.sattrack = 0;
                (gsv.satmin, gsv.satmax)
            };
            for prn in satmin..=satmax {
                if let Some(rec) = self.sats.get_mut(&(talker.to_string(), prn)) {
                    rec.recvd_this_block = false;
                }
            }
        }

        for t in tuples {
            let rec = self
                .sats
                .entry((talker.to_string(), t.prn))
                .or_insert_with(SatRecord::default);

            let changed_elv = config.always || !rec.published || t.elv != rec.elv;
            let changed_azm = config.always || !rec.published || t.azm != rec.azm;
            let changed_snr = config.always || !rec.published || t.snr != rec.snr;

            if changed_elv {
                cache.publish(
                    config,
                    Some(talker),
                    &format!("sat/{}/elv", t.prn),
                    GSV_FLAGS,
                    t.elv.to_string(),
                    true,
                    out,
                );
            }
            if changed_azm {
                cache.publish(
                    config,
                    Some(talker),
                    &format!("sat/{}/azm", t.prn),
                    GSV_FLAGS,
                    t.azm.to_string(),
                    true,
                    out,
                );
            }
            if changed_snr {
                let payload = if t.snr < 0 { String::new() } else { t.snr.to_string() };
                cache.publish(
                    config,
                    Some(talker),
                    &format!("sat/{}/snr", t.prn),
                    GSV_FLAGS,
                    payload,
                    true,
                    out,
                );
            }

            rec.elv = t.elv;
            rec.azm = t.azm;
            rec.snr = t.snr;
            rec.recvd_this_block = true;
            rec.published = true;

            let gsv = self.gsv_mut(talker);
            if t.snr >= 0 {
                gsv.sattrack += 1;
            }
            if t.prn < gsv.satmin || gsv.satmax == 0 {
                gsv.satmin = t.prn;
            }
            if t.prn > gsv.satmax {
                gsv.satmax = t.prn;
            }
        }

        if msgidx == msgcnt {
            self.end_of_block(talker, nsat, config, cache, out);
        }
    }

    fn end_of_block(
        &mut self,
        talker: &str,
        nsat: i32,
        config: &RuntimeConfig,
        cache: &mut Cache,
        out: &mut Vec<PendingPublish>,
    ) {
        let (satmin, satmax) = {
            let gsv = self.gsvs.get(talker).expect("gsv state exists by end of block");
            (gsv.satmin, gsv.satmax)
        };
        for prn in satmin..satmax {
            let sent = self
                .sats
                .get(&(talker.to_string(), prn))
                .map(|r| r.published && !r.recvd_this_block)
                .unwrap_or(false);
            if sent {
                self.clear_sat(talker, prn, config, cache, out);
            }
        }

        let gsv = self.gsv_mut(talker);
        if config.always || gsv.new || nsat != gsv.satview {
            cache.publish(
                config,
                Some(talker),
                "satview",
                FL_IGN_DEF_TALKER,
                nsat.to_string(),
                true,
                out,
            );
        }
        gsv.satview = nsat;
        if config.always || gsv.new || gsv.sattrack != gsv.sattrack_saved {
            cache.publish(
                config,
                Some(talker),
                "sattrack",
                FL_RETAIN | FL_IGN_DEF_TALKER,
                gsv.sattrack.to_string(),
                true,
                out,
            );
        }
        gsv.sattrack_saved = gsv.sattrack;
        gsv.new = false;

        let total_satview: i32 = self.gsvs.values().map(|g| g.satview).sum();
        let total_sattrack: i32 = self.gsvs.values().map(|g| g.sattrack_saved).sum();
        cache.publish(
            config,
            Some("gn"),
            "satview",
            FL_RETAIN | FL_IGN_DEF_TALKER,
            total_satview.to_string(),
            true,
            out,
        );
        cache.publish(
            config,
            Some("gn"),
            "sattrack",
            FL_RETAIN | FL_IGN_DEF_TALKER,
            total_sattrack.to_string(),
            true,
            out,
        );
    }

    fn clear_sat(
        &mut self,
        talker: &str,
        prn: u32,
        config: &RuntimeConfig,
        cache: &mut Cache,
        out: &mut Vec<PendingPublish>,
    ) {
        let was_published = self
            .sats
            .get(&(talker.to_string(), prn))
            .map(|r| r.published)
            .unwrap_or(false);
        if was_published {
            for field in ["elv", "azm", "snr"] {
                cache.publish(
                    config,
                    Some(talker),
                    &format!("sat/{prn}/{field}"),
                    GSV_FLAGS,
                    "",
                    true,
                    out,
                );
            }
        }
        self.sats.remove(&(talker.to_string(), prn));
    }

    /// Called on shutdown and when GSV transitions from enabled to
    /// disabled at runtime: clears every tracked satellite and the
    /// per-talker `satview`/`sattrack`, then forgets all tracker state.
    pub fn clear_gsvs(&mut self, config: &RuntimeConfig, cache: &mut Cache, out: &mut Vec<PendingPublish>) {
        let talkers: Vec<String> = self.gsvs.keys().cloned().collect();
        for talker in &talkers {
            let (satmin, satmax) = {
                let gsv = &self.gsvs[talker];
                (gsv.satmin, gsv.satmax)
            };
            for prn in satmin..=satmax {
                self.clear_sat(talker, prn, config, cache, out);
            }
            cache.publish(config, Some(talker.as_str()), "satview", GSV_FLAGS, "", true, out);
            cache.publish(config, Some(talker.as_str()), "sattrack", GSV_FLAGS, "", true, out);
        }
        self.gsvs.clear();
        self.sats.clear();
    }

    /// GNS/GGA feed sats-in-use here. If the receiver itself ever emits
    /// `satuse` for talker "gn", that one-way latches and suppresses our
    /// own aggregation from then on.
    pub fn satuse_updated(
        &mut self,
        talker: &str,
        satuse: i32,
        config: &RuntimeConfig,
        cache: &mut Cache,
        out: &mut Vec<PendingPublish>,
    ) {
        if talker == "gn" {
            self.gn_satuse_emitted = true;
            return;
        }
        if self.gn_satuse_emitted {
            return;
        }

        let changed = {
            let gsv = self.gsv_mut(talker);
            let changed = config.always || gsv.satuse != satuse;
            gsv.satuse = satuse;
            changed
        };
        if changed {
            let total: i32 = self.gsvs.values().map(|g| g.satuse).sum();
            cache.publish(
                config,
                Some("gn"),
                "satuse",
                FL_RETAIN | FL_IGN_DEF_TALKER,
                total.to_string(),
                true,
                out,
            );
        }
    }
}

impl Default for SatTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    fn cfg() -> RuntimeConfig {
        RuntimeConfig::new_for_test("gps/", Some("gp"))
    }

    #[test]
    fn two_packet_block_produces_six_sat_triples_and_terminator() {
        let mut tracker = SatTracker::new();
        let mut cache = Cache::new();
        let config = cfg();
        let mut out = Vec::new();

        let first = [
            SatTuple { prn: 1, elv: 10, azm: 20, snr: 30 },
            SatTuple { prn: 2, elv: 11, azm: 21, snr: -1 },
            SatTuple { prn: 3, elv: 12, azm: 22, snr: 32 },
            SatTuple { prn: 4, elv: 13, azm: 23, snr: 33 },
        ];
        tracker.recvd_gsv("gp", 2, 1, 6, &first, &config, &mut cache, &mut out);

        let second = [
            SatTuple { prn: 5, elv: 14, azm: 24, snr: 34 },
            SatTuple { prn: 6, elv: 15, azm: 25, snr: -1 },
        ];
        tracker.recvd_gsv("gp", 2, 2, 6, &second, &config, &mut cache, &mut out);
        out.extend(cache.flush(false));

        let sat_publishes = out.iter().filter(|p| p.topic.contains("/sat/")).count();
        assert_eq!(sat_publishes, 6 * 3);

        let satview = out.iter().find(|p| p.topic == "gps/gp/satview").unwrap();
        assert_eq!(satview.payload, "6");
        let sattrack = out.iter().find(|p| p.topic == "gps/gp/sattrack").unwrap();
        assert_eq!(sattrack.payload, "4"); // snr >= 0 for prn 1,3,4,5

        let gn_satview = out.iter().find(|p| p.topic == "gps/gn/satview").unwrap();
        assert_eq!(gn_satview.payload, "6");
        let gn_sattrack = out.iter().find(|p| p.topic == "gps/gn/sattrack").unwrap();
        assert_eq!(gn_sattrack.payload, "4");
    }

    #[test]
    fn msgcnt_zero_does_not_underflow_and_still_emits_terminator() {
        let mut tracker = SatTracker::new();
        let mut cache = Cache::new();
        let config = cfg();
        let mut out = Vec::new();
        tracker.recvd_gsv("gp", 0, 0, 0, &[], &config, &mut cache, &mut out);
        assert!(out.iter().any(|p| p.topic == "gps/gp/satview" && p.payload == "0"));
    }

    #[test]
    fn clear_gsvs_deletes_all_retained_sat_topics() {
        let mut tracker = SatTracker::new();
        let mut cache = Cache::new();
        let config = cfg();
        let mut out = Vec::new();
        let tuples = [SatTuple { prn: 7, elv: 1, azm: 2, snr: 3 }];
        tracker.recvd_gsv("gp", 1, 1, 1, &tuples, &config, &mut cache, &mut out);
        out.clear();

        tracker.clear_gsvs(&config, &mut cache, &mut out);
        let cleared: Vec<_> = out.iter().filter(|p| p.topic.starts_with("gps/gp/sat/7")).collect();
        assert_eq!(cleared.len(), 3);
        assert!(cleared.iter().all(|p| p.payload.is_empty()));
    }

    #[test]
    fn gn_satuse_latches_and_suppresses_aggregation() {
        let mut tracker = SatTracker::new();
        let mut cache = Cache::new();
        let config = cfg();
        let mut out = Vec::new();

        tracker.satuse_updated("gp", 8, &config, &mut cache, &mut out);
        out.extend(cache.flush(false));
        assert!(out.iter().any(|p| p.topic == "gps/gn/satuse" && p.payload == "8"));

        out.clear();
        tracker.satuse_updated("gn", 99, &config, &mut cache, &mut out);
        out.extend(cache.flush(false));
        assert!(out.is_empty());

        out.clear();
        tracker.satuse_updated("gl", 3, &config, &mut cache, &mut out);
        out.extend(cache.flush(false));
        assert!(out.is_empty(), "aggregation must stay suppressed after the receiver emits gn");
    }
}
