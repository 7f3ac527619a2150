//! Composite stream-processor state and sentence dispatch.
//!
//! Owns everything the single-threaded event loop mutates: the retained
//! cache, the satellite tracker, the runtime configuration and the
//! liveness timer. Mirrors `nmea0183tomqtt.c`'s `recvd_line` dispatch
//! switch plus the top-level statics it closed over.

use log::warn;

use crate::cache::{Cache, PendingPublish};
use crate::config::RuntimeConfig;
use crate::framer::Frame;
use crate::liveness::Liveness;
use crate::nmea::sentences;
use crate::nmea::Sentence;
use crate::tracker::SatTracker;

pub struct State {
    pub config: RuntimeConfig,
    pub cache: Cache,
    pub tracker: SatTracker,
    pub liveness: Liveness,
}

impl State {
    pub fn new(config: RuntimeConfig) -> Self {
        let deaddelay = config.deaddelay;
        Self {
            config,
            cache: Cache::new(),
            tracker: SatTracker::new(),
            liveness: Liveness::new(deaddelay),
        }
    }

    /// Process one framed unit, returning the publishes it produced.
    pub fn handle_frame(&mut self, frame: Frame, source: &str) -> Vec<PendingPublish> {
        let mut out = Vec::new();
        self.liveness.on_input(&self.config, &mut self.cache, &mut out);
        match frame {
            Frame::Nmea(line) => self.handle_line(&line, source, &mut out),
            Frame::Ublox { class, id, payload } => {
                log::debug!("u-blox frame class={class:#04x} id={id:#04x} len={}", payload.len());
            }
        }
        out
    }

    fn handle_line(&mut self, line: &str, source: &str, out: &mut Vec<PendingPublish>) {
        let mut sentence = match Sentence::parse(line) {
            Ok(Some(s)) => s,
            Ok(None) => return,
            Err(e) => {
                warn!("{source}: dropping sentence, {e:?}: {line}");
                return;
            }
        };

        let talker = sentence.talker.clone();
        let code = sentence.code.clone();

        if code == "TXT" {
            sentences::recvd_txt(&mut sentence, &talker, source);
            return;
        }

        if !self.config.use_sentence(&code) {
            return;
        }

        match code.as_str() {
            "GGA" => sentences::recvd_gga_gns(
                &mut sentence,
                true,
                &talker,
                &mut self.cache,
                &self.config,
                &mut self.tracker,
                out,
            ),
            "GNS" => sentences::recvd_gga_gns(
                &mut sentence,
                false,
                &talker,
                &mut self.cache,
                &self.config,
                &mut self.tracker,
                out,
            ),
            "GSA" => sentences::recvd_gsa(&mut sentence, &talker, &mut self.cache, &self.config, out),
            "GSV" => sentences::recvd_gsv(
                &mut sentence,
                &talker,
                &mut self.cache,
                &self.config,
                &mut self.tracker,
                out,
            ),
            "VTG" => sentences::recvd_vtg(&mut sentence, &talker, &mut self.cache, &self.config, out),
            "ZDA" => sentences::recvd_zda(&mut sentence, &talker, &mut self.cache, &self.config, out),
            _ => return,
        }

        out.extend(self.cache.flush(self.config.always));
    }
}
