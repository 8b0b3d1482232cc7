//! Message channels.
//!
//! The client core never performs I/O itself. It asks a [`Connector`] for a
//! [`Channel`], queues outbound payloads with [`Channel::send`] and drains
//! [`ChannelEvent`]s at its own poll points. Anything slow (connecting,
//! socket reads and writes) happens behind the channel.

use bytes::Bytes;
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use tracing::{debug, warn};

use crate::net::{read_frame, write_frame, TransportError};

/// Something the transport reports back to the owner of a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The connection is established; sends are now delivered.
    Opened,
    /// One complete inbound message.
    Message(Bytes),
    /// A transport failure. A `Closed` event normally follows.
    Error(TransportError),
    /// The connection is gone.
    Closed { reason: String },
}

/// A message-oriented duplex connection.
pub trait Channel {
    /// Queues one message for delivery.
    fn send(&mut self, payload: Bytes) -> Result<(), TransportError>;

    /// Returns the next pending event without blocking.
    fn poll_event(&mut self) -> Option<ChannelEvent>;

    /// Requests shutdown. Calling it again has no effect.
    fn close(&mut self);
}

/// Opens channels to a URL.
pub trait Connector {
    /// Starts a connection attempt.
    ///
    /// Only immediately detectable problems (such as an unparsable address)
    /// are returned here; everything else arrives later as channel events.
    fn open(&mut self, url: &str) -> Result<Box<dyn Channel>, TransportError>;
}

/// Strips an optional `tcp://` scheme and checks for `host:port`.
pub fn parse_tcp_url(url: &str) -> Result<String, TransportError> {
    let addr = url.trim();
    let addr = addr.strip_prefix("tcp://").unwrap_or(addr);
    let addr = addr.trim_end_matches('/');
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(addr.to_string())
        }
        _ => Err(TransportError::InvalidAddress(url.to_string())),
    }
}

/// Opens framed TCP channels on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    runtime: Handle,
}

impl TcpConnector {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Uses the runtime the caller is running on.
    pub fn from_current() -> anyhow::Result<Self> {
        Ok(Self::new(Handle::try_current()?))
    }
}

impl Connector for TcpConnector {
    fn open(&mut self, url: &str) -> Result<Box<dyn Channel>, TransportError> {
        let addr = parse_tcp_url(url)?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        self.runtime.spawn(run_tcp_channel(addr, event_tx, out_rx));

        Ok(Box::new(TcpChannel {
            outbound: Some(out_tx),
            events: event_rx,
        }))
    }
}

/// Channel half held by the client; the socket lives in a background task.
#[derive(Debug)]
pub struct TcpChannel {
    outbound: Option<UnboundedSender<Bytes>>,
    events: UnboundedReceiver<ChannelEvent>,
}

impl Channel for TcpChannel {
    fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        let tx = self.outbound.as_ref().ok_or(TransportError::NotOpen)?;
        tx.send(payload).map_err(|_| TransportError::Closed)
    }

    fn poll_event(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }

    fn close(&mut self) {
        // Dropping the sender lets the writer flush what is queued, then shut down.
        self.outbound.take();
    }
}

async fn run_tcp_channel(
    addr: String,
    events: UnboundedSender<ChannelEvent>,
    mut outbound: UnboundedReceiver<Bytes>,
) {
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(addr = %addr, error = %e, "TCP connect failed");
            let _ = events.send(ChannelEvent::Error(TransportError::ConnectFailed(
                e.to_string(),
            )));
            let _ = events.send(ChannelEvent::Closed {
                reason: "connect failed".to_string(),
            });
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    debug!(addr = %addr, "TCP channel open");
    let _ = events.send(ChannelEvent::Opened);

    let (mut reader, mut writer) = stream.into_split();

    let reader_events = events.clone();
    let reader_task = tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(payload) => {
                    if reader_events.send(ChannelEvent::Message(payload)).is_err() {
                        return;
                    }
                }
                Err(TransportError::Closed) => {
                    let _ = reader_events.send(ChannelEvent::Closed {
                        reason: "peer closed".to_string(),
                    });
                    return;
                }
                Err(e) => {
                    let _ = reader_events.send(ChannelEvent::Error(e.clone()));
                    let _ = reader_events.send(ChannelEvent::Closed {
                        reason: e.to_string(),
                    });
                    return;
                }
            }
        }
    });

    while let Some(payload) = outbound.recv().await {
        if let Err(e) = write_frame(&mut writer, &payload).await {
            warn!(addr = %addr, error = %e, "TCP write failed");
            let _ = events.send(ChannelEvent::Error(e.clone()));
            let _ = events.send(ChannelEvent::Closed {
                reason: e.to_string(),
            });
            reader_task.abort();
            return;
        }
    }

    let _ = writer.shutdown().await;
    reader_task.abort();
    debug!(addr = %addr, "TCP channel closed locally");
}
