use crate::config::SerialConfig;
use crate::error::BridgeError;
use crate::event_store::EventStore;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Opens the device once. There is no reconnect: if this fails the service runs without live events.
pub fn open(config: &SerialConfig) -> Result<SerialStream, BridgeError> {
    let port = tokio_serial::new(&config.port, config.baud_rate)
        .timeout(config.read_timeout())
        .open_native_async()?;

    info!("Connected to serial port: {}", config.port);
    Ok(port)
}

/// Reads newline-delimited JSON from the device and feeds it into the event store.
pub struct SerialListener {
    store: Arc<EventStore>,
    read_timeout: Duration,
}

impl SerialListener {
    pub fn new(store: Arc<EventStore>, read_timeout: Duration) -> Self {
        Self {
            store,
            read_timeout,
        }
    }

    /// Runs until `shutdown` flips to true. Read and parse failures only cost the current line.
    pub async fn run<R>(self, mut reader: R, mut shutdown: watch::Receiver<bool>)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line_buffer = Vec::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            // read_until keeps partial bytes in the buffer when the timeout cancels it
            let result = tokio::select! {
                _ = shutdown.changed() => break,
                result = timeout(self.read_timeout, reader.read_until(b'\n', &mut line_buffer)) => result,
            };

            match result {
                Err(_elapsed) => continue,
                Ok(Ok(0)) => {
                    if !line_buffer.is_empty() {
                        self.handle_line(&line_buffer).await;
                        line_buffer.clear();
                    }
                    error!("{}", BridgeError::SerialRead("device closed the connection".to_string()));
                    if self.pause(&mut shutdown).await {
                        break;
                    }
                }
                Ok(Ok(_)) => {
                    self.handle_line(&line_buffer).await;
                    line_buffer.clear();
                }
                Ok(Err(e)) => {
                    error!("{}", BridgeError::SerialRead(e.to_string()));
                    line_buffer.clear();
                    if self.pause(&mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!("Serial listener stopped");
    }

    async fn handle_line(&self, bytes: &[u8]) {
        let line = match std::str::from_utf8(bytes) {
            Ok(line) => line.trim(),
            Err(e) => {
                error!("{}", BridgeError::SerialRead(format!("invalid UTF-8: {}", e)));
                return;
            }
        };

        if line.is_empty() {
            return;
        }

        debug!("Received line from serial: {}", line);
        match self.store.append(line).await {
            Ok(event) => match serde_json::to_string(&*event) {
                Ok(json) => info!("ESP32 → {}", json),
                Err(_) => info!("ESP32 → event {}", event.id),
            },
            Err(e) => warn!("{}", e),
        }
    }

    /// Waits one read timeout before the next attempt. Returns true if shutdown was requested meanwhile.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = shutdown.changed() => true,
            _ = sleep(self.read_timeout) => false,
        }
    }
}
