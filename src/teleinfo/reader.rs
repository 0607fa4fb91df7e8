//! Serial line reader
//!
//! Opens the teleinfo port with its line settings (1200 baud 7E1 by default)
//! and forwards every line to the controller. Whenever the stream ends or
//! fails the port is reopened right away; there is no retry limit and no
//! backoff. Reads block, so the loop runs on the blocking pool.

use crate::config::{SerialConfig, SerialParity};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use std::io::{self, BufRead, BufReader, Read};
use std::time::Duration;
use tokio::sync::mpsc;

/// Teleinfo frame delimiters that may prefix or suffix a line
const STX: char = '\u{2}';
const ETX: char = '\u{3}';

/// Upper bound on one blocking read, so a silent line still notices shutdown
const READ_TIMEOUT: Duration = Duration::from_secs(1);

type Opener = fn(&SerialConfig) -> io::Result<Box<dyn Read + Send>>;

fn clean_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .trim_matches([STX, ETX])
        .to_string()
}

fn data_bits(bits: u8) -> io::Result<serialport::DataBits> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported data bits: {}", other),
        )),
    }
}

fn stop_bits(bits: u8) -> io::Result<serialport::StopBits> {
    match bits {
        1 => Ok(serialport::StopBits::One),
        2 => Ok(serialport::StopBits::Two),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported stop bits: {}", other),
        )),
    }
}

fn parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

fn open_serial(settings: &SerialConfig) -> io::Result<Box<dyn Read + Send>> {
    let port = serialport::new(settings.device.as_str(), settings.baud_rate)
        .data_bits(data_bits(settings.data_bits)?)
        .parity(parity(settings.parity))
        .stop_bits(stop_bits(settings.stop_bits)?)
        .flow_control(serialport::FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()?;
    Ok(Box::new(port))
}

/// How one connection ended
#[derive(Debug, PartialEq, Eq)]
enum Pump {
    /// End of stream or read error; reopen
    Ended,
    /// Nobody receives lines anymore
    ConsumerGone,
}

/// Reconnecting reader for one serial device
pub struct LineReader {
    settings: SerialConfig,
    open: Opener,
    logger: StructuredLogger,
}

impl LineReader {
    /// Reader for `device` with the default teleinfo line settings
    pub fn new<P: Into<String>>(device: P) -> Self {
        Self::from_config(&SerialConfig {
            device: device.into(),
            ..SerialConfig::default()
        })
    }

    pub fn from_config(settings: &SerialConfig) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("teleinfo").with_field("device", settings.device.clone()),
        );
        Self {
            settings: settings.clone(),
            open: open_serial,
            logger,
        }
    }

    /// Forward lines into `lines` until the receiving side goes away
    pub async fn run(self, lines: mpsc::Sender<String>) {
        // Blocking pool threads do not inherit a scoped subscriber
        let dispatch = tracing::dispatcher::get_default(|d| d.clone());
        let result = tokio::task::spawn_blocking(move || {
            tracing::dispatcher::with_default(&dispatch, || self.read_loop(&lines))
        })
        .await;
        if let Err(e) = result {
            tracing::error!("Serial reader task failed: {}", e);
        }
    }

    fn read_loop(&self, lines: &mpsc::Sender<String>) {
        let mut connects: u64 = 0;
        let mut failures: u64 = 0;
        loop {
            if lines.is_closed() {
                self.logger.debug("Line consumer gone; stopping reader");
                return;
            }

            let port = match (self.open)(&self.settings) {
                Ok(port) => port,
                Err(e) => {
                    failures += 1;
                    if failures == 1 {
                        self.logger
                            .warn(&format!("Failed to open serial device: {}", e));
                    } else {
                        self.logger.trace(&format!(
                            "Serial device still unavailable (attempt {}): {}",
                            failures, e
                        ));
                    }
                    std::thread::yield_now();
                    continue;
                }
            };
            connects += 1;
            if failures > 0 {
                self.logger.info(&format!(
                    "Serial device opened after {} failed attempts",
                    failures
                ));
                failures = 0;
            } else if connects == 1 {
                self.logger.info("Serial device opened");
            } else {
                self.logger
                    .debug(&format!("Serial device reopened (#{})", connects));
            }

            if self.pump(BufReader::new(port), lines) == Pump::ConsumerGone {
                self.logger.debug("Line consumer gone; stopping reader");
                return;
            }
        }
    }

    fn pump<R: BufRead>(&self, mut reader: R, lines: &mpsc::Sender<String>) -> Pump {
        let mut buf = Vec::with_capacity(64);
        loop {
            if lines.is_closed() {
                return Pump::ConsumerGone;
            }
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => {
                    self.logger.debug("Serial stream ended; reconnecting");
                    return Pump::Ended;
                }
                Ok(_) => {
                    if lines.blocking_send(clean_line(&buf)).is_err() {
                        return Pump::ConsumerGone;
                    }
                    buf.clear();
                }
                // Quiet line; bytes read so far stay in `buf`
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => {
                    self.logger
                        .warn(&format!("Serial read failed: {}; reconnecting", e));
                    return Pump::Ended;
                }
            }
        }
    }
}
