//! Serial barcode scanner for the create page.
//!
//! **Rules:**
//! - One reader at a time; `start` while running is refused.
//! - A stopped reader is joined before the port is opened again.
//! - Barcodes are newline terminated and 3..=50 characters after trimming.
//! - The pending line buffer never grows past `MAX_LINE_BUFFER` bytes.
//! - Open failures are classified so the page can show a specific message.

use serde::Serialize;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ScannerError;

pub const MIN_BARCODE_LEN: usize = 3;
pub const MAX_BARCODE_LEN: usize = 50;
pub const MAX_LINE_BUFFER: usize = 512;
const READ_TIMEOUT: Duration = Duration::from_millis(200);
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedBarcode {
    pub barcode: String,
    pub source: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerStatus {
    pub connected: bool,
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub last_scan: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    pub name: String,
    pub port_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

// ---------------------------------------------------------------------------
// Line buffer
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct BarcodeLineBuffer {
    pending: String,
}

impl BarcodeLineBuffer {
    /// Feed raw text; returns every complete, plausible barcode.
    pub fn push(&mut self, data: &str) -> Vec<String> {
        self.pending.push_str(data);
        let mut out = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let barcode = self.pending[..pos].trim().to_string();
            self.pending.drain(..=pos);
            if (MIN_BARCODE_LEN..=MAX_BARCODE_LEN).contains(&barcode.len()) {
                out.push(barcode);
            }
        }
        if self.pending.len() > MAX_LINE_BUFFER {
            self.pending.clear();
        }
        out
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

pub fn classify_open_error(port: &str, err: &serialport::Error) -> ScannerError {
    let description = err.description.to_lowercase();
    match err.kind() {
        serialport::ErrorKind::NoDevice => ScannerError::NotFound(port.to_string()),
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            ScannerError::PermissionDenied(port.to_string())
        }
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
            ScannerError::NotFound(port.to_string())
        }
        _ if description.contains("busy") || description.contains("in use") => {
            ScannerError::Busy(port.to_string())
        }
        _ if description.contains("permission") || description.contains("access is denied") => {
            ScannerError::PermissionDenied(port.to_string())
        }
        _ if description.contains("no such file") || description.contains("not found") => {
            ScannerError::NotFound(port.to_string())
        }
        _ => ScannerError::Other(err.description.clone()),
    }
}

pub fn list_ports() -> Result<Vec<PortInfo>, ScannerError> {
    let ports =
        serialport::available_ports().map_err(|e| ScannerError::Other(e.description))?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let (port_type, product) = match p.port_type {
                serialport::SerialPortType::UsbPort(usb) => ("usb", usb.product),
                serialport::SerialPortType::BluetoothPort => ("bluetooth", None),
                serialport::SerialPortType::PciPort => ("pci", None),
                serialport::SerialPortType::Unknown => ("unknown", None),
            };
            PortInfo {
                name: p.port_name,
                port_type,
                product,
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// One reader thread and the token that stops it. Every `start` gets its own
/// pair, so stopping one reader never affects a later one.
struct Reader {
    cancel: CancellationToken,
    alive: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

pub struct BarcodeScanner {
    tx: mpsc::UnboundedSender<ScannedBarcode>,
    reader: Option<Reader>,
    /// Reader that was told to stop but may still hold the port.
    stopping: Option<JoinHandle<()>>,
    last_scan: Arc<Mutex<Option<String>>>,
    last_error: Option<String>,
    port: Option<String>,
    baud_rate: Option<u32>,
}

impl BarcodeScanner {
    pub fn new(tx: mpsc::UnboundedSender<ScannedBarcode>) -> Self {
        Self {
            tx,
            reader: None,
            stopping: None,
            last_scan: Arc::new(Mutex::new(None)),
            last_error: None,
            port: None,
            baud_rate: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.reader
            .as_ref()
            .is_some_and(|r| r.alive.load(Ordering::SeqCst))
    }

    /// Open `port` and start forwarding barcodes. A previously stopped reader
    /// is joined first so its handle on the port is closed.
    pub async fn start(&mut self, port: &str, baud_rate: u32) -> Result<(), ScannerError> {
        if self.is_running() {
            return Err(ScannerError::AlreadyRunning);
        }
        // A reader that ended on its own still has a handle to collect.
        self.stop();
        self.wait_stopped().await;

        self.port = Some(port.to_string());
        self.baud_rate = Some(baud_rate);

        let serial = match serialport::new(port, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
        {
            Ok(serial) => serial,
            Err(e) => {
                let err = classify_open_error(port, &e);
                warn!(port, baud = baud_rate, error = %e, "failed to open scanner");
                self.last_error = Some(err.to_string());
                return Err(err);
            }
        };

        self.last_error = None;
        info!(port, baud = baud_rate, "scanner reader started");
        self.attach(port, serial);
        Ok(())
    }

    fn attach<R: Read + Send + 'static>(&mut self, port: &str, serial: R) {
        let cancel = CancellationToken::new();
        let alive = Arc::new(AtomicBool::new(true));

        let token = cancel.clone();
        let flag = Arc::clone(&alive);
        let last_scan = Arc::clone(&self.last_scan);
        let tx = self.tx.clone();
        let port_name = port.to_string();
        let task = tokio::task::spawn_blocking(move || {
            read_loop(serial, &token, &last_scan, &tx);
            flag.store(false, Ordering::SeqCst);
            info!(port = %port_name, "scanner reader stopped");
        });

        self.reader = Some(Reader {
            cancel,
            alive,
            task,
        });
    }

    /// Signal the reader to stop. It notices within one read timeout; the
    /// next `start` or `retry` waits for it.
    pub fn stop(&mut self) -> bool {
        let Some(reader) = self.reader.take() else {
            return false;
        };
        let was_running = reader.alive.load(Ordering::SeqCst);
        reader.cancel.cancel();
        // An older stopping reader, if any, was cancelled too and exits on its own.
        self.stopping = Some(reader.task);
        if was_running {
            info!("scanner stopped");
        }
        was_running
    }

    async fn wait_stopped(&mut self) {
        if let Some(task) = self.stopping.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "scanner reader ended abnormally");
            }
        }
    }

    /// Re-open the last port after a device error.
    pub async fn retry(&mut self) -> Result<(), ScannerError> {
        let (port, baud) = match (self.port.clone(), self.baud_rate) {
            (Some(port), Some(baud)) => (port, baud),
            _ => return Err(ScannerError::NeverStarted),
        };
        self.stop();
        self.start(&port, baud).await
    }

    pub fn status(&self) -> ScannerStatus {
        ScannerStatus {
            connected: self.is_running(),
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            last_scan: self
                .last_scan
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            last_error: self.last_error.clone(),
        }
    }
}

impl Drop for BarcodeScanner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop<R: Read>(
    mut serial: R,
    cancel: &CancellationToken,
    last_scan: &Mutex<Option<String>>,
    tx: &mpsc::UnboundedSender<ScannedBarcode>,
) {
    let mut lines = BarcodeLineBuffer::default();
    let mut buf = [0u8; 256];

    while !cancel.is_cancelled() {
        match serial.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                for barcode in lines.push(&text) {
                    info!(barcode = %barcode, "barcode scanned");
                    *last_scan.lock().unwrap_or_else(|e| e.into_inner()) = Some(barcode.clone());
                    let event = ScannedBarcode {
                        barcode,
                        source: "serial",
                        timestamp: chrono::Utc::now().to_rfc3339(),
                    };
                    if tx.send(event).is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                warn!(error = %e, "scanner read error");
                backoff(cancel);
            }
        }
    }
}

/// Sleep `READ_ERROR_BACKOFF`, waking early once cancelled.
fn backoff(cancel: &CancellationToken) {
    let mut waited = Duration::ZERO;
    while waited < READ_ERROR_BACKOFF && !cancel.is_cancelled() {
        std::thread::sleep(READ_TIMEOUT);
        waited += READ_TIMEOUT;
    }
}
