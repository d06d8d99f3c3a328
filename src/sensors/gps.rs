//! # GPS Receive Path
//!
//! Byte-level buffering between the receiver's serial line and the GPS
//! driver.
//!
//! The polling interrupt fires at a fixed rate (1000 Hz by default) and does
//! the minimum possible work: it takes at most one byte from the source and
//! appends it to the sentence buffer inside the critical section. Sentence
//! assembly completes on `\n`; the main loop later takes the newest complete
//! sentence.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::critical_section::CriticalSection;

/// Longest line kept; NMEA 0183 caps sentences at 82 characters
pub const MAX_SENTENCE_LEN: usize = 120;

/// Whether a sentence carries position data (GGA or RMC)
///
/// The address field is `$` + two-character talker + three-character type,
/// e.g. `$GPGGA` or `$GNRMC`.
///
/// # Examples
///
/// ```
/// use flight_telemetry::sensors::gps::is_position_sentence;
///
/// assert!(is_position_sentence("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47"));
/// assert!(!is_position_sentence("$GPGSV,3,1,11*74"));
/// ```
pub fn is_position_sentence(sentence: &str) -> bool {
    let sentence = sentence.trim_start();
    let Some(address) = sentence.strip_prefix('$') else {
        return false;
    };

    matches!(address.get(2..5), Some("GGA") | Some("RMC"))
}

#[derive(Debug, Default)]
struct RxState {
    line: Vec<u8>,
    last_sentence: Option<String>,
    new_sentence: bool,
    overflows: u32,
}

/// Sentence buffer shared by the polling interrupt and the GPS driver
#[derive(Debug, Clone, Default)]
pub struct GpsRxBuffer {
    state: Arc<Mutex<RxState>>,
}

impl GpsRxBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one received byte
    pub fn push_byte(&self, byte: u8) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        match byte {
            b'\n' => {
                if state.line.last() == Some(&b'\r') {
                    state.line.pop();
                }
                if !state.line.is_empty() {
                    let sentence = String::from_utf8_lossy(&state.line).into_owned();
                    state.last_sentence = Some(sentence);
                    state.new_sentence = true;
                }
                state.line.clear();
            }
            b'$' => {
                state.line.clear();
                state.line.push(byte);
            }
            _ if state.line.len() < MAX_SENTENCE_LEN => state.line.push(byte),
            _ => {
                state.line.clear();
                state.overflows = state.overflows.saturating_add(1);
            }
        }
    }

    /// Whether a complete sentence arrived since the last take
    pub fn has_new_sentence(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .new_sentence
    }

    /// Takes the newest complete sentence and clears the new-sentence flag
    pub fn take_sentence(&self) -> Option<String> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.new_sentence = false;
        state.last_sentence.take()
    }

    /// Lines discarded for exceeding `MAX_SENTENCE_LEN`
    pub fn overflows(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .overflows
    }
}

/// Non-blocking source of received GPS bytes
pub trait ByteSource {
    /// Next received byte, if one is waiting
    fn read_byte(&mut self) -> Option<u8>;
}

impl ByteSource for mpsc::Receiver<u8> {
    fn read_byte(&mut self) -> Option<u8> {
        self.try_recv().ok()
    }
}

/// Interrupt body: move at most one byte into the buffer
pub fn service_interrupt<S: ByteSource>(
    source: &mut S,
    buffer: &GpsRxBuffer,
    critical: &CriticalSection,
) {
    critical.with(|| {
        if let Some(byte) = source.read_byte() {
            buffer.push_byte(byte);
        }
    });
}

/// Starts the GPS polling interrupt at `hz` on the tokio runtime
pub fn spawn_gps_interrupt<S>(
    mut source: S,
    buffer: GpsRxBuffer,
    critical: CriticalSection,
    hz: u32,
) -> JoinHandle<()>
where
    S: ByteSource + Send + 'static,
{
    let period = Duration::from_micros(1_000_000 / u64::from(hz.max(1)));

    tokio::spawn(async move {
        debug!("GPS polling interrupt running every {:?}", period);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            service_interrupt(&mut source, &buffer, &critical);
        }
    })
}
