//! CLI surface and runtime-mutable configuration.
//!
//! `Cli` is parsed once at startup via `clap`. [`RuntimeConfig`] seeds from
//! it, then the config listener (`control.rs`) mutates it for the life of
//! the process in response to `cfg/#` messages — see `nmea0183tomqtt.c`'s
//! `merge_nmea_use` / `my_mqtt_msg` for the behaviour this generalizes.

use std::collections::HashMap;

use clap::Parser;

const DEFAULT_DEADDELAY: u64 = 10;
const DEFAULT_PREFIX: &str = "gps/";

/// The set of sentence codes this crate knows how to handle (besides TXT,
/// which is always handled regardless of `nmea_use`).
pub const KNOWN_SENTENCES: &[&str] = &["GGA", "GNS", "GSA", "GSV", "VTG", "ZDA"];

#[derive(Debug, Parser)]
#[command(
    name = "gnss2mqtt",
    version,
    about = "Propagate NMEA-0183 (+ u-blox binary) input to MQTT"
)]
pub struct Cli {
    /// MQTT host[:port], default localhost:1883.
    #[arg(short = 'h', long = "host", default_value = "localhost")]
    pub host: String,

    /// Sentences to forward: GGA[,ZDA...] (absolute) or +GGA,-GSA,... (delta).
    /// Default: GGA,VTG,ZDA.
    #[arg(short = 'n', long = "nmea")]
    pub nmea: Option<String>,

    /// Prefix MQTT topics, including the final slash.
    #[arg(short = 'p', long = "prefix", default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    /// Publish everything on reception, always (even unchanged).
    #[arg(short = 'a', long = "always")]
    pub always: bool,

    /// Consider the port dead after this many seconds of silence.
    #[arg(short = 'd', long = "deadtime", default_value_t = DEFAULT_DEADDELAY)]
    pub deadtime: u64,

    /// Default talker (GP, GL, GB, GA, GN, ...). Set to "0" for none.
    #[arg(short = 'D', long = "default", default_value = "gp")]
    pub default_talker: String,

    /// Increase verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log to stderr instead of syslog.
    #[arg(long)]
    pub stderr: bool,

    /// Input FILE or DEVICE. Defaults to standard input.
    pub input: Option<String>,
}

impl Cli {
    /// Split `-h HOST[:PORT]` into (host, port), default port 1883.
    pub fn host_port(&self) -> (String, u16) {
        match self.host.rsplit_once(':') {
            Some((h, p)) if !h.is_empty() => match p.parse() {
                Ok(port) => (h.to_string(), port),
                Err(_) => (self.host.clone(), 1883),
            },
            _ => (self.host.clone(), 1883),
        }
    }
}

/// Mutable configuration state, shared by the parser, tracker, cache and
/// liveness timer, and mutated by the MQTT config listener at runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub nmea_use: HashMap<String, bool>,
    pub always: bool,
    pub deaddelay: u64,
    pub topicprefix: String,
    /// Talker configured on the command line (`None` if `-D 0`).
    pub def_talker_cli: Option<String>,
    /// Talker set at runtime via `cfg/default` (`None` = not overridden).
    pub def_talker_override: Option<String>,
}

impl RuntimeConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        let mut nmea_use: HashMap<String, bool> = KNOWN_SENTENCES
            .iter()
            .map(|&s| (s.to_string(), matches!(s, "GGA" | "VTG" | "ZDA")))
            .collect();
        if let Some(spec) = &cli.nmea {
            merge_nmea_use(&mut nmea_use, spec);
        }

        let def_talker_cli = if cli.default_talker == "0" {
            None
        } else {
            Some(cli.default_talker.to_ascii_lowercase())
        };

        Self {
            nmea_use,
            always: cli.always,
            deaddelay: cli.deadtime,
            topicprefix: cli.prefix.clone(),
            def_talker_cli,
            def_talker_override: None,
        }
    }

    #[cfg(test)]
    pub fn new_for_test(prefix: &str, def_talker: Option<&str>) -> Self {
        let nmea_use: HashMap<String, bool> = KNOWN_SENTENCES
            .iter()
            .map(|&s| (s.to_string(), matches!(s, "GGA" | "VTG" | "ZDA")))
            .collect();
        Self {
            nmea_use,
            always: false,
            deaddelay: DEFAULT_DEADDELAY,
            topicprefix: prefix.to_string(),
            def_talker_cli: def_talker.map(|s| s.to_string()),
            def_talker_override: None,
        }
    }

    pub fn use_sentence(&self, code: &str) -> bool {
        self.nmea_use.get(code).copied().unwrap_or(false)
    }

    pub fn effective_default_talker(&self) -> Option<&str> {
        self.def_talker_override
            .as_deref()
            .or(self.def_talker_cli.as_deref())
    }
}

/// Merge a `--nmea`/`cfg/msgs`-style token list into `nmea_use`.
///
/// If the first token doesn't start with `+`/`-`, this is absolute mode:
/// every known sentence is disabled first. Each token `[+|-]CODE` then sets
/// that code's enabled bit; a bare `CODE` defaults to `+`.
pub fn merge_nmea_use(nmea_use: &mut HashMap<String, bool>, spec: &str) {
    let absolute = !spec.starts_with(['+', '-']);
    if absolute {
        for v in nmea_use.values_mut() {
            *v = false;
        }
    }
    for tok in spec.split(',') {
        let tok = tok.trim();
        if tok.is_empty() {
            continue;
        }
        let (sign, code) = match tok.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => match tok.strip_prefix('-') {
                Some(rest) => (false, rest),
                None => (true, tok),
            },
        };
        let code = code.to_ascii_uppercase();
        if let Some(v) = nmea_use.get_mut(&code) {
            *v = sign;
        } else {
            nmea_use.insert(code, sign);
        }
    }
}
