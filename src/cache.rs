//! Retained-publication cache.
//!
//! Handlers never talk to the MQTT client directly. They call
//! [`Cache::publish`] with a relative topic and a set of flag bits; the
//! cache resolves the fully qualified topic(s), decides whether the write
//! is retained-and-coherent or fire-and-forget, and (for the coherent case)
//! only surfaces it to the caller once [`Cache::flush`] is called at the end
//! of a sentence.
//!
//! This mirrors `nmea0183tomqtt.c`'s `publish_topicrt` / `publish_cache` /
//! `flush_pending_topics`, but instead of calling `mosquitto_publish`
//! in-place it returns the publishes that need to happen, as plain data, so
//! the async MQTT client can be driven from the caller without threading a
//! client handle through every parser function.

use std::collections::HashMap;

use crate::config::RuntimeConfig;

/// Publish as retained on the broker (persists after this one message).
pub const FL_RETAIN: u8 = 1 << 0;
/// Suppress the un-talker-prefixed duplicate even when `talker == def_talker`.
pub const FL_IGN_DEF_TALKER: u8 = 1 << 1;
/// Bypass the coherent cache; publish immediately.
pub const FL_NO_CACHE: u8 = 1 << 2;

/// A publish that must actually be sent to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPublish {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

struct CacheEntry {
    topic: String,
    payload: String,
    written: bool,
    is_control: bool,
    /// False until the first value lands; lets an entry whose first payload
    /// happens to be empty (e.g. a NaN field) still count as a change.
    initialized: bool,
}

/// Change-detecting retained cache with coherent, per-sentence flushing.
#[derive(Default)]
pub struct Cache {
    entries: Vec<CacheEntry>,
    index: HashMap<String, usize>,
    ndirty: usize,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `topic` (relative) under `talker` (or no talker, for control
    /// topics such as `src`/`alive`). Resolves to one or two fully qualified
    /// topics per `resolve_topics`, and routes each through the cache or
    /// straight to `out` depending on `flags`.
    pub fn publish(
        &mut self,
        config: &RuntimeConfig,
        talker: Option<&str>,
        topic: &str,
        flags: u8,
        value: impl Into<String>,
        in_data_sentence: bool,
        out: &mut Vec<PendingPublish>,
    ) {
        let mut value = value.into();
        // NaN policy: any formatted value equal to "nan" becomes empty.
        if value.eq_ignore_ascii_case("nan") {
            value.clear();
        }
        for full_topic in resolve_topics(config, talker, topic, flags) {
            self.publish_one(full_topic, value.clone(), flags, in_data_sentence, out);
        }
    }

    fn publish_one(
        &mut self,
        full_topic: String,
        value: String,
        flags: u8,
        in_data_sentence: bool,
        out: &mut Vec<PendingPublish>,
    ) {
        if flags & FL_RETAIN == 0 || flags & FL_NO_CACHE != 0 {
            out.push(PendingPublish {
                topic: full_topic,
                payload: value,
                retain: flags & FL_RETAIN != 0,
            });
            return;
        }

        let idx = match self.index.get(&full_topic) {
            Some(&i) => i,
            None => {
                let i = self.entries.len();
                self.entries.push(CacheEntry {
                    topic: full_topic.clone(),
                    payload: String::new(),
                    written: false,
                    is_control: !in_data_sentence,
                    initialized: false,
                });
                self.index.insert(full_topic, i);
                i
            }
        };
        let entry = &mut self.entries[idx];
        entry.written = true;
        if !entry.initialized || entry.payload != value {
            entry.payload = value;
            entry.initialized = true;
            self.ndirty += 1;
        }
    }

    /// Coherent flush: if anything changed (or `always` forces it), publish
    /// every entry touched since the last flush, in insertion order, then
    /// reset the dirty/written bookkeeping.
    pub fn flush(&mut self, always: bool) -> Vec<PendingPublish> {
        let mut out = Vec::new();
        if self.ndirty > 0 || always {
            for entry in &mut self.entries {
                if entry.written {
                    out.push(PendingPublish {
                        topic: entry.topic.clone(),
                        payload: entry.payload.clone(),
                        retain: true,
                    });
                }
                entry.written = false;
            }
        } else {
            for entry in &mut self.entries {
                entry.written = false;
            }
        }
        self.ndirty = 0;
        out
    }

    /// Empty every non-empty retained topic (retained delete), skipping
    /// control topics unless `clear_control` is set, then flush.
    pub fn erase(&mut self, clear_control: bool) -> Vec<PendingPublish> {
        for entry in &mut self.entries {
            if entry.is_control && !clear_control {
                continue;
            }
            if entry.payload.is_empty() {
                continue;
            }
            entry.payload.clear();
            entry.written = true;
            self.ndirty += 1;
        }
        // `always` doesn't matter here: ndirty already reflects the erase.
        self.flush(false)
    }
}

/// Resolve a relative topic to the fully qualified topic(s) it must be
/// published under, given the current talker and default-talker rules.
fn resolve_topics(config: &RuntimeConfig, talker: Option<&str>, topic: &str, flags: u8) -> Vec<String> {
    let prefix = &config.topicprefix;
    match talker {
        Some(t)
            if flags & FL_IGN_DEF_TALKER != 0
                || config.effective_default_talker() != Some(t) =>
        {
            vec![format!("{prefix}{t}/{topic}")]
        }
        Some(t) => vec![format!("{prefix}{t}/{topic}"), format!("{prefix}{topic}")],
        None => vec![format!("{prefix}{topic}")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RuntimeConfig {
        RuntimeConfig::new_for_test("gps/", Some("gp"))
    }

    #[test]
    fn immediate_publish_bypasses_cache() {
        let mut cache = Cache::new();
        let mut out = Vec::new();
        cache.publish(&cfg(), None, "src", FL_RETAIN, "/dev/ttyUSB0", true, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].topic, "gps/src");
        assert!(out[0].retain);
    }

    #[test]
    fn cached_publish_only_surfaces_on_flush() {
        let mut cache = Cache::new();
        let mut out = Vec::new();
        cache.publish(&cfg(), Some("gp"), "lat", FL_RETAIN | FL_IGN_DEF_TALKER, "48.1", true, &mut out);
        assert!(out.is_empty());
        let flushed = cache.flush(false);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].topic, "gps/gp/lat");
        assert_eq!(flushed[0].payload, "48.1");
    }

    #[test]
    fn unchanged_value_produces_no_flush() {
        let mut cache = Cache::new();
        let mut out = Vec::new();
        cache.publish(&cfg(), Some("gp"), "lat", FL_RETAIN | FL_IGN_DEF_TALKER, "48.1", true, &mut out);
        cache.flush(false);
        cache.publish(&cfg(), Some("gp"), "lat", FL_RETAIN | FL_IGN_DEF_TALKER, "48.1", true, &mut out);
        let flushed = cache.flush(false);
        assert!(flushed.is_empty());
    }

    #[test]
    fn default_talker_duplicates_when_not_ignored() {
        let mut cache = Cache::new();
        let mut out = Vec::new();
        cache.publish(&cfg(), Some("gp"), "quality", FL_RETAIN, "gps", true, &mut out);
        let flushed = cache.flush(false);
        let mut topics: Vec<_> = flushed.iter().map(|p| p.topic.as_str()).collect();
        topics.sort();
        assert_eq!(topics, vec!["gps/gp/quality", "gps/quality"]);
    }

    #[test]
    fn non_default_talker_is_not_duplicated() {
        let mut cache = Cache::new();
        let mut out = Vec::new();
        cache.publish(&cfg(), Some("gl"), "quality", FL_RETAIN, "gps", true, &mut out);
        let flushed = cache.flush(false);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].topic, "gps/gl/quality");
    }

    #[test]
    fn nan_payload_is_rewritten_empty() {
        let mut cache = Cache::new();
        let mut out = Vec::new();
        cache.publish(&cfg(), Some("gp"), "hdop", FL_RETAIN | FL_IGN_DEF_TALKER, "nan", true, &mut out);
        let flushed = cache.flush(false);
        assert_eq!(flushed[0].payload, "");
    }

    #[test]
    fn erase_clears_non_control_topics_only() {
        let mut cache = Cache::new();
        let mut out = Vec::new();
        cache.publish(&cfg(), Some("gp"), "lat", FL_RETAIN | FL_IGN_DEF_TALKER, "48.1", true, &mut out);
        cache.flush(false);
        cache.publish(&cfg(), None, "src", FL_RETAIN, "/dev/ttyUSB0", false, &mut out);
        cache.flush(false);

        let erased = cache.erase(false);
        assert_eq!(erased.len(), 1);
        assert_eq!(erased[0].topic, "gps/gp/lat");
        assert_eq!(erased[0].payload, "");

        let erased_all = cache.erase(true);
        assert_eq!(erased_all.len(), 1);
        assert_eq!(erased_all[0].topic, "gps/src");
    }
}
