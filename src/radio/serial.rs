//! # Serial Radio Modem
//!
//! Drives a UART-attached radio modem that transmits whatever bytes it is
//! given. A writer task owns the port; `send` hands it one frame and returns
//! at once. The link reads as Transmitting until the task has written and
//! flushed that frame.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use super::{RadioDriver, RadioMode};
use crate::error::{FlightError, Result};

/// State shared between the driver and its writer task
#[derive(Debug, Default)]
struct LinkShared {
    busy: AtomicBool,
    sent: AtomicU16,
}

/// Open link: frame channel plus the task draining it
struct RadioLink {
    frames: mpsc::Sender<Vec<u8>>,
    shared: Arc<LinkShared>,
    writer: JoinHandle<()>,
}

impl RadioLink {
    fn spawn<W>(port: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        // One slot: the gatekeeper never has more than one frame in flight
        let (frames, rx) = mpsc::channel(1);
        let shared = Arc::new(LinkShared::default());
        let writer = tokio::spawn(write_frames(port, rx, shared.clone()));

        Self {
            frames,
            shared,
            writer,
        }
    }
}

impl Drop for RadioLink {
    fn drop(&mut self) {
        self.writer.abort();
    }
}

async fn write_frames<W>(mut port: W, mut rx: mpsc::Receiver<Vec<u8>>, shared: Arc<LinkShared>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let result = match port.write_all(&frame).await {
            Ok(()) => port.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                shared.sent.fetch_add(1, Ordering::Relaxed);
                debug!("Radio wrote frame ({} bytes)", frame.len());
            }
            Err(e) => warn!("Radio write failed: {}", e),
        }

        shared.busy.store(false, Ordering::Release);
    }

    debug!("Radio writer stopped");
}

/// Open a serial device as 8N1
///
/// Shared by the radio modem and the GPS receiver. Must be called from within
/// a Tokio runtime.
///
/// # Errors
///
/// Returns `FlightError::Serial` if the device cannot be opened
pub fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| FlightError::Serial(format!("Failed to open {}: {}", path, e)))?;

    Ok(port)
}

/// Serial-attached radio modem
pub struct SerialRadio {
    path: String,
    baud_rate: u32,
    frequency_mhz: f32,
    tx_power_dbm: i8,
    link: Option<RadioLink>,
}

impl std::fmt::Debug for SerialRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialRadio")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.link.is_some())
            .finish_non_exhaustive()
    }
}

impl SerialRadio {
    /// Radio on a serial device; the port is opened by `init`
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            frequency_mhz: super::DEFAULT_FREQUENCY_MHZ,
            tx_power_dbm: super::DEFAULT_TX_POWER_DBM,
            link: None,
        }
    }

    /// Radio over an already-open byte stream
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_writer<W>(port: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            path: String::from("<stream>"),
            baud_rate: 0,
            frequency_mhz: super::DEFAULT_FREQUENCY_MHZ,
            tx_power_dbm: super::DEFAULT_TX_POWER_DBM,
            link: Some(RadioLink::spawn(port)),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Carrier frequency last requested
    pub fn frequency_mhz(&self) -> f32 {
        self.frequency_mhz
    }

    /// Transmit power last requested
    pub fn tx_power_dbm(&self) -> i8 {
        self.tx_power_dbm
    }
}

impl RadioDriver for SerialRadio {
    fn init(&mut self) -> bool {
        if self.link.is_some() {
            return true;
        }

        match open_port(&self.path, self.baud_rate) {
            Ok(port) => {
                info!("Opened radio modem at {} ({} baud)", self.path, self.baud_rate);
                self.link = Some(RadioLink::spawn(port));
                true
            }
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    fn set_frequency(&mut self, mhz: f32) -> bool {
        if !(137.0..=1020.0).contains(&mhz) {
            return false;
        }
        self.frequency_mhz = mhz;
        self.link.is_some()
    }

    fn set_power(&mut self, dbm: i8) {
        self.tx_power_dbm = dbm;
    }

    fn current_mode(&self) -> RadioMode {
        match &self.link {
            Some(link) if link.shared.busy.load(Ordering::Acquire) => RadioMode::Transmitting,
            _ => RadioMode::Idle,
        }
    }

    fn send(&mut self, frame: &[u8]) {
        let Some(link) = &self.link else {
            warn!("Radio send with no open port");
            return;
        };

        link.shared.busy.store(true, Ordering::Release);
        if let Err(e) = link.frames.try_send(frame.to_vec()) {
            link.shared.busy.store(false, Ordering::Release);
            warn!("Radio writer not accepting frames: {}", e);
        }
    }

    fn sent_packet_count(&self) -> u16 {
        self.link
            .as_ref()
            .map(|link| link.shared.sent.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}
