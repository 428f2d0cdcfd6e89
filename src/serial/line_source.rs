/// Line-oriented reading from a serial device
use async_trait::async_trait;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::unix::pipe;

use crate::error::SensorError;

const DEVICE_DIR: &str = "/dev/";

/// A blocking stream of newline-terminated lines
#[async_trait]
pub trait LineSource: Send {
    /// Identifier of the underlying device, for logging
    fn name(&self) -> &str;

    /// Read the next raw line including its terminator
    ///
    /// Returns an empty line when the read timeout elapses and
    /// `SensorError::Disconnected` once the stream has ended.
    async fn read_line(&mut self) -> Result<Vec<u8>, SensorError>;

    /// Release the transport. Calling it again does nothing.
    async fn close(&mut self);
}

/// Serial port opened as a non-blocking character device
///
/// Port settings (baud rate etc.) are expected to be configured by the
/// system; this only reads bytes and frames them on `\n`. Reads wait on the
/// reactor rather than a blocking thread, so cancelling one and closing the
/// source releases the device immediately.
pub struct SerialLineSource<R = pipe::Receiver> {
    name: String,
    reader: Option<BufReader<R>>,
    // Bytes of a line that was cut short by a timeout
    pending: Vec<u8>,
    timeout: Option<Duration>,
}

impl SerialLineSource<pipe::Receiver> {
    /// Open `/dev/<device_name>` for reading
    pub async fn open(device_name: &str, timeout: Option<Duration>) -> Result<Self, SensorError> {
        Self::open_path(&Path::new(DEVICE_DIR).join(device_name), timeout).await
    }

    /// Open a tty or FIFO at `path` for reading
    pub async fn open_path(path: &Path, timeout: Option<Duration>) -> Result<Self, SensorError> {
        info!("Opening serial connection to {}", path.display());
        // Ttys are not FIFOs, so skip the file type check
        let receiver = pipe::OpenOptions::new()
            .unchecked(true)
            .open_receiver(path)
            .map_err(|source| SensorError::DeviceUnavailable {
                path: PathBuf::from(path),
                source,
            })?;
        Ok(Self::from_reader(path.display().to_string(), receiver, timeout))
    }
}

impl<R: AsyncRead + Unpin + Send> SerialLineSource<R> {
    pub fn from_reader(name: impl Into<String>, reader: R, timeout: Option<Duration>) -> Self {
        Self {
            name: name.into(),
            reader: Some(BufReader::new(reader)),
            pending: Vec::new(),
            timeout,
        }
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> LineSource for SerialLineSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_line(&mut self) -> Result<Vec<u8>, SensorError> {
        let limit = self.timeout;
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| SensorError::Disconnected(self.name.clone()))?;

        // read_until keeps partial input in `pending` if the timeout fires
        let read = reader.read_until(b'\n', &mut self.pending);
        let count = match limit {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(result) => result?,
                Err(_) => {
                    debug!("Read timed out on {}", self.name);
                    return Ok(Vec::new());
                }
            },
            None => read.await?,
        };

        if count == 0 && self.pending.is_empty() {
            return Err(SensorError::Disconnected(self.name.clone()));
        }
        Ok(std::mem::take(&mut self.pending))
    }

    async fn close(&mut self) {
        if self.reader.take().is_some() {
            info!("Closing serial connection to {}", self.name);
            self.pending.clear();
        }
    }
}
