//! gnss2mqtt — propagate NMEA-0183 (+ u-blox binary) input to MQTT.
//!
//! Usage:
//!   gnss2mqtt -h broker:1883 -p gps/ /dev/ttyUSB0
//!   gnss2mqtt --stderr -v < recorded.nmea

mod app;
mod cache;
mod config;
mod control;
mod error;
mod framer;
mod liveness;
mod mqtt;
mod nmea;
mod serial;
mod state;
mod tracker;

use std::process;

use clap::Parser;
use log::{error, LevelFilter};

use config::{Cli, RuntimeConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.stderr, cli.verbose);

    let (host, port) = cli.host_port();
    let config = RuntimeConfig::from_cli(&cli);

    let (source, input_rx) = match serial::open(cli.input.as_deref(), 9600) {
        Ok(v) => v,
        Err(e) => {
            error!("cannot open input: {e}");
            process::exit(1);
        }
    };

    let client_id = format!("gnss2mqtt-{}", process::id());
    let mqtt = match mqtt::Mqtt::connect(&host, port, &client_id, &config.topicprefix).await {
        Ok(m) => m,
        Err(e) => {
            error!("cannot connect to MQTT broker {host}:{port}: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = app::run(config, source, input_rx, mqtt).await {
        error!("fatal: {e}");
        process::exit(1);
    }
}

/// stderr ladder mirrors the original's Notice -> Info -> Debug verbosity
/// steps; syslog is fixed at Info regardless of `-v`.
fn setup_logging(use_stderr: bool, verbosity: u8) {
    if use_stderr {
        let level = match verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        };
        env_logger::Builder::from_default_env().filter_level(level).init();
    } else {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_DAEMON,
            hostname: None,
            process: "gnss2mqtt".into(),
            pid: process::id(),
        };
        match syslog::unix(formatter) {
            Ok(logger) => {
                let _ = log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
                    .map(|()| log::set_max_level(LevelFilter::Info));
            }
            Err(e) => {
                eprintln!("gnss2mqtt: syslog connect failed, falling back to stderr: {e}");
                env_logger::Builder::from_default_env().filter_level(LevelFilter::Info).init();
            }
        }
    }
}
