//! Input source: a serial device (configured to raw mode) or standard
//! input when no device path is given. Reads raw byte chunks on a blocking
//! task and forwards them over a channel so the async event loop never
//! blocks on I/O.
//!
//! Follows `gnss.rs`'s `configure_serial` and `spawn_blocking` reader
//! pattern, generalized from a fixed 9600-baud line reader to raw-mode
//! byte chunks at a caller-chosen baud.

use std::fs;
use std::io::{self, Read};

use log::warn;
use nix::sys::termios::{self, BaudRate, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg};
use tokio::sync::mpsc;

use crate::error::{AppError, Result};

/// Opens `path` (or stdin if `None`), returning the display name to publish
/// at `src` and a channel of raw byte chunks fed by a background reader.
pub fn open(path: Option<&str>, baud: u32) -> Result<(String, mpsc::Receiver<Vec<u8>>)> {
    let (tx, rx) = mpsc::channel(64);
    match path {
        Some(device) => {
            let file = fs::OpenOptions::new().read(true).open(device)?;
            if is_terminal(&file) {
                configure_serial(&file, baud)?;
            }
            let device = device.to_string();
            tokio::task::spawn_blocking(move || reader_loop(file, tx));
            Ok((device, rx))
        }
        None => {
            tokio::task::spawn_blocking(move || reader_loop(io::stdin(), tx));
            Ok(("-".to_string(), rx))
        }
    }
}

fn is_terminal(file: &fs::File) -> bool {
    termios::tcgetattr(file).is_ok()
}

fn reader_loop<R: Read>(mut reader: R, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; 4096];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("input read error: {e}");
                break;
            }
        };
        if tx.blocking_send(buf[..n].to_vec()).is_err() {
            break;
        }
    }
}

/// Configure the serial port for raw NMEA/u-blox reading: 8N1, no echo, no
/// canonical processing, no flow control, no signal generation.
fn configure_serial(file: &fs::File, baud: u32) -> Result<()> {
    let mut t = termios::tcgetattr(file).map_err(AppError::Termios)?;

    t.local_flags &= !(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ECHOE | LocalFlags::ISIG);
    t.output_flags &= !OutputFlags::OPOST;
    t.input_flags &= !(InputFlags::IXON
        | InputFlags::IXOFF
        | InputFlags::IXANY
        | InputFlags::ISTRIP
        | InputFlags::INPCK);
    t.control_flags |= ControlFlags::CS8 | ControlFlags::CREAD | ControlFlags::CLOCAL;
    t.control_flags &= !(ControlFlags::CSIZE | ControlFlags::CSTOPB | ControlFlags::PARENB);

    t.control_chars[termios::SpecialCharacterIndices::VMIN as usize] = 1;
    t.control_chars[termios::SpecialCharacterIndices::VTIME as usize] = 0;

    let baud_rate = match baud {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        _ => BaudRate::B9600,
    };

    termios::cfsetospeed(&mut t, baud_rate).map_err(AppError::Termios)?;
    termios::cfsetispeed(&mut t, baud_rate).map_err(AppError::Termios)?;
    termios::tcsetattr(file, SetArg::TCSANOW, &t).map_err(AppError::Termios)?;

    Ok(())
}
