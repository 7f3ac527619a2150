//! nmea-snr: a read-only viewer of the SNR topics `gnss2mqtt` publishes.
//!
//! Subscribes to `<prefix>+/sat/+/snr`, `<prefix>+/satview` and
//! `<prefix>alive`; prints one tab-separated line per GSV block
//! terminator. Grounded on `original_source/nmea-snr.c`'s `my_mqtt_msg`
//! and `print_snr`.

use std::collections::HashMap;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};

#[derive(Debug, Parser)]
#[command(name = "nmea-snr", about = "show NMEA SNRs from MQTT")]
struct Cli {
    #[arg(short = 'h', long = "host", default_value = "localhost")]
    host: String,

    #[arg(short = 'p', long = "prefix", default_value = "gps/")]
    prefix: String,

    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn host_port(&self) -> (String, u16) {
        match self.host.rsplit_once(':') {
            Some((h, p)) if !h.is_empty() => match p.parse() {
                Ok(port) => (h.to_string(), port),
                Err(_) => (self.host.clone(), 1883),
            },
            _ => (self.host.clone(), 1883),
        }
    }
}

#[derive(Default, Clone, Copy)]
struct Sat {
    snr: i32,
    recvd: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env().filter_level(level).init();

    let (host, port) = cli.host_port();
    let client_id = format!("nmea-snr-{}", std::process::id());
    let mut opts = MqttOptions::new(client_id, &host, port);
    opts.set_keep_alive(Duration::from_secs(10));

    let (client, mut event_loop) = AsyncClient::new(opts, 64);

    for sub in [
        format!("{}+/sat/+/snr", cli.prefix),
        format!("{}+/satview", cli.prefix),
        format!("{}alive", cli.prefix),
    ] {
        if let Err(e) = client.subscribe(&sub, QoS::AtLeastOnce).await {
            warn!("subscribe {sub} failed: {e}");
            continue;
        }
        info!("subscribed to {sub}");
    }

    let mut sats: HashMap<(String, u32), Sat> = HashMap::new();
    let mut changed = false;

    loop {
        let event = match event_loop.poll().await {
            Ok(e) => e,
            Err(e) => {
                warn!("mqtt connection error: {e}");
                continue;
            }
        };
        let Event::Incoming(Packet::Publish(msg)) = event else { continue };
        let Some(leaf) = msg.topic.rsplit('/').next() else { continue };

        match leaf {
            "alive" => {
                let alive: u32 = String::from_utf8_lossy(&msg.payload).trim().parse().unwrap_or(0);
                warn!("gps {}", if alive != 0 { "alive" } else { "dead" });
            }
            "satview" if !msg.retained => {
                print_snr(&sats, &mut changed);
            }
            "snr" => {
                let Some(rest) = msg.topic.strip_prefix(cli.prefix.as_str()) else { continue };
                let mut parts = rest.splitn(4, '/');
                let Some(talker) = parts.next() else { continue };
                parts.next(); // "sat"
                let prn: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
                let snr: i32 = String::from_utf8_lossy(&msg.payload).trim().parse().unwrap_or(-1);
                let recvd = snr >= 0;
                let key = (talker.to_string(), prn);
                let entry = sats.entry(key).or_default();
                if entry.snr != snr || entry.recvd != recvd {
                    changed = true;
                }
                entry.snr = snr;
                entry.recvd = recvd;
            }
            _ => {}
        }
    }
}

fn print_snr(sats: &HashMap<(String, u32), Sat>, changed: &mut bool) {
    if !*changed {
        return;
    }
    let mut rows: Vec<_> = sats.iter().filter(|(_, s)| s.recvd).collect();
    rows.sort_by_key(|((talker, prn), _)| (talker.clone(), *prn));

    if rows.is_empty() {
        println!("no satellites");
    } else {
        let line: Vec<String> = rows
            .iter()
            .map(|((talker, prn), sat)| format!("{talker}{prn}:{}", sat.snr))
            .collect();
        println!("{}", line.join("\t"));
    }
    *changed = false;
}
