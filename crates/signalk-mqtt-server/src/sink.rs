//! Channel delivery sink and delta forwarder.
//!
//! The engine hands deltas to a [`ChannelSink`] without blocking; a separate
//! task drains the channel and writes each delta as one line of JSON to
//! stdout or to a TCP endpoint such as a Signal K server's delta input.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use signalk_mqtt_core::{Delta, DeliverySink, SinkError};

/// Default capacity of the delivery channel.
pub const DELIVERY_CHANNEL_CAPACITY: usize = 1024;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Sink feeding a bounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Delta>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Delta>) -> Self {
        Self { tx }
    }
}

impl DeliverySink for ChannelSink {
    fn send(&self, delta: Delta) -> Result<(), SinkError> {
        self.tx.try_send(delta).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Unavailable("delivery channel full".to_string()),
            TrySendError::Closed(_) => {
                SinkError::Unavailable("delivery channel closed".to_string())
            }
        })
    }
}

/// Create a sink and the receiver that drains it.
pub fn delivery_channel(capacity: usize) -> (ChannelSink, mpsc::Receiver<Delta>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelSink::new(tx), rx)
}

/// Where forwarded deltas are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOutput {
    Stdout,
    /// `host:port` of a TCP delta input.
    Tcp(String),
}

impl DeltaOutput {
    /// Parse `stdout` or `tcp://host:port`.
    pub fn parse(output: &str) -> Result<Self, ForwardError> {
        let output = output.trim();
        if output.is_empty() || output.eq_ignore_ascii_case("stdout") {
            return Ok(DeltaOutput::Stdout);
        }
        match output.strip_prefix("tcp://") {
            Some(addr) if !addr.is_empty() => Ok(DeltaOutput::Tcp(addr.to_string())),
            _ => Err(ForwardError::InvalidOutput(output.to_string())),
        }
    }
}

/// Errors raised by the forwarder.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid output '{0}', expected 'stdout' or 'tcp://host:port'")]
    InvalidOutput(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serialize one delta as a newline-terminated JSON line.
pub fn encode_line(delta: &Delta) -> Result<Vec<u8>, ForwardError> {
    let mut line = serde_json::to_vec(delta)?;
    line.push(b'\n');
    Ok(line)
}

/// Write every received delta to `writer` until the channel closes.
pub async fn forward_to_writer<W>(
    mut rx: mpsc::Receiver<Delta>,
    mut writer: W,
) -> Result<(), ForwardError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(delta) = rx.recv().await {
        writer.write_all(&encode_line(&delta)?).await?;
        writer.flush().await?;
    }
    Ok(())
}

async fn forward_to_tcp(mut rx: mpsc::Receiver<Delta>, addr: String) -> Result<(), ForwardError> {
    let mut stream: Option<TcpStream> = None;

    while let Some(delta) = rx.recv().await {
        let line = encode_line(&delta)?;

        if stream.is_none() {
            match TcpStream::connect(&addr).await {
                Ok(s) => {
                    info!("Connected to delta output {}", addr);
                    stream = Some(s);
                }
                Err(e) => {
                    error!("Failed to connect to delta output {}: {}", addr, e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            }
        }

        if let Some(s) = stream.as_mut() {
            if let Err(e) = s.write_all(&line).await {
                warn!("Delta output {} write failed, dropping connection: {}", addr, e);
                stream = None;
            }
        }
    }

    debug!("delivery channel closed, forwarder stopping");
    Ok(())
}

/// Drain the delivery channel into `output`.
pub async fn run_forwarder(
    rx: mpsc::Receiver<Delta>,
    output: DeltaOutput,
) -> Result<(), ForwardError> {
    match output {
        DeltaOutput::Stdout => forward_to_writer(rx, tokio::io::stdout()).await,
        DeltaOutput::Tcp(addr) => forward_to_tcp(rx, addr).await,
    }
}

/// A spawned [`run_forwarder`] task.
#[derive(Debug)]
pub struct ForwarderTask {
    handle: JoinHandle<Result<(), ForwardError>>,
}

/// Spawn the forwarder on the current runtime.
pub fn spawn_forwarder(rx: mpsc::Receiver<Delta>, output: DeltaOutput) -> ForwarderTask {
    ForwarderTask {
        handle: tokio::spawn(run_forwarder(rx, output)),
    }
}

impl ForwarderTask {
    /// Wait for queued deltas to be written out.
    ///
    /// The forwarder only stops once every sink has been dropped. After
    /// `grace` the task is aborted and `false` returned.
    pub async fn finish(mut self, grace: Duration) -> bool {
        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(Ok(Ok(()))) => true,
            Ok(Ok(Err(e))) => {
                error!("Delta forwarder error: {}", e);
                true
            }
            Ok(Err(e)) => {
                error!("Delta forwarder task failed: {}", e);
                true
            }
            Err(_) => {
                warn!("Delta forwarder did not drain within {:?}, aborting", grace);
                self.handle.abort();
                false
            }
        }
    }
}
