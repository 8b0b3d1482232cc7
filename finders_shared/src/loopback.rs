//! Scripted in-memory channel.
//!
//! Lets hosts and tests drive the client without sockets: queue transport
//! events (open, inbound messages, errors, close) and inspect what the client
//! sent. Every `open` starts a fresh link; the helpers on
//! [`LoopbackConnector`] act on the most recent one.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use bytes::Bytes;

use crate::{
    channel::{Channel, ChannelEvent, Connector},
    net::{ClientIntent, ServerEvent, TransportError},
};

#[derive(Debug, Default)]
struct Link {
    url: String,
    pending: VecDeque<ChannelEvent>,
    sent: Vec<Bytes>,
    closed: bool,
}

#[derive(Debug, Default)]
struct LoopbackState {
    links: Vec<Rc<RefCell<Link>>>,
    fail_next_open: Option<String>,
}

/// Connector handing out [`LoopbackChannel`]s.
///
/// Clones share state, so a test can keep one clone and give the other to
/// the client.
#[derive(Debug, Clone, Default)]
pub struct LoopbackConnector {
    state: Rc<RefCell<LoopbackState>>,
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `open` fail with [`TransportError::ConnectFailed`].
    pub fn fail_next_open(&self, reason: &str) {
        self.state.borrow_mut().fail_next_open = Some(reason.to_string());
    }

    /// Number of channels opened so far.
    pub fn open_count(&self) -> usize {
        self.state.borrow().links.len()
    }

    /// URLs passed to `open`, oldest first.
    pub fn opened_urls(&self) -> Vec<String> {
        self.state
            .borrow()
            .links
            .iter()
            .map(|l| l.borrow().url.clone())
            .collect()
    }

    /// Whether the channel from the `index`-th `open` has been closed.
    pub fn is_closed(&self, index: usize) -> bool {
        self.state
            .borrow()
            .links
            .get(index)
            .map(|l| l.borrow().closed)
            .unwrap_or(false)
    }

    fn with_current<R>(&self, f: impl FnOnce(&mut Link) -> R) -> Option<R> {
        let state = self.state.borrow();
        let link = state.links.last()?;
        let mut link = link.borrow_mut();
        Some(f(&mut link))
    }

    fn push(&self, event: ChannelEvent) {
        self.with_current(|link| link.pending.push_back(event));
    }

    pub fn push_open(&self) {
        self.push(ChannelEvent::Opened);
    }

    pub fn push_raw(&self, payload: &[u8]) {
        self.push(ChannelEvent::Message(Bytes::copy_from_slice(payload)));
    }

    /// Queues a server message in its wire form.
    pub fn push_server(&self, event: &ServerEvent) {
        match serde_json::to_vec(event) {
            Ok(payload) => self.push(ChannelEvent::Message(Bytes::from(payload))),
            Err(e) => tracing::warn!(error = %e, "loopback cannot encode server event"),
        }
    }

    pub fn push_error(&self, error: TransportError) {
        self.push(ChannelEvent::Error(error));
    }

    pub fn push_close(&self, reason: &str) {
        self.push(ChannelEvent::Closed {
            reason: reason.to_string(),
        });
    }

    /// Raw payloads sent on the current channel.
    pub fn sent(&self) -> Vec<Bytes> {
        self.with_current(|link| link.sent.clone())
            .unwrap_or_default()
    }

    /// Payloads sent on the current channel, parsed back into intents.
    pub fn sent_intents(&self) -> Vec<ClientIntent> {
        self.sent()
            .iter()
            .filter_map(|p| serde_json::from_slice(p).ok())
            .collect()
    }
}

impl Connector for LoopbackConnector {
    fn open(&mut self, url: &str) -> Result<Box<dyn Channel>, TransportError> {
        let mut state = self.state.borrow_mut();
        if let Some(reason) = state.fail_next_open.take() {
            return Err(TransportError::ConnectFailed(reason));
        }
        let link = Rc::new(RefCell::new(Link {
            url: url.to_string(),
            ..Link::default()
        }));
        state.links.push(Rc::clone(&link));
        Ok(Box::new(LoopbackChannel { link }))
    }
}

/// Client side of a loopback link.
#[derive(Debug)]
pub struct LoopbackChannel {
    link: Rc<RefCell<Link>>,
}

impl Channel for LoopbackChannel {
    fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        let mut link = self.link.borrow_mut();
        if link.closed {
            return Err(TransportError::Closed);
        }
        link.sent.push(payload);
        Ok(())
    }

    fn poll_event(&mut self) -> Option<ChannelEvent> {
        let mut link = self.link.borrow_mut();
        if link.closed {
            return None;
        }
        link.pending.pop_front()
    }

    fn close(&mut self) {
        self.link.borrow_mut().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::encode;

    #[test]
    fn scripted_events_arrive_in_order() {
        let mut connector = LoopbackConnector::new();
        let mut channel = connector.open("loop://a").unwrap();

        connector.push_open();
        connector.push_raw(b"{}");
        connector.push_close("bye");

        assert_eq!(channel.poll_event(), Some(ChannelEvent::Opened));
        assert!(matches!(channel.poll_event(), Some(ChannelEvent::Message(_))));
        assert!(matches!(channel.poll_event(), Some(ChannelEvent::Closed { .. })));
        assert_eq!(channel.poll_event(), None);
    }

    #[test]
    fn records_sends_until_closed() {
        let mut connector = LoopbackConnector::new();
        let mut channel = connector.open("loop://a").unwrap();

        channel.send(encode(&ClientIntent::Leave)).unwrap();
        assert_eq!(connector.sent_intents(), vec![ClientIntent::Leave]);

        channel.close();
        assert!(connector.is_closed(0));
        assert_eq!(
            channel.send(encode(&ClientIntent::Leave)),
            Err(TransportError::Closed)
        );
    }

    #[test]
    fn fail_next_open_applies_once() {
        let mut connector = LoopbackConnector::new();
        connector.fail_next_open("refused");
        assert!(connector.open("loop://a").is_err());
        assert!(connector.open("loop://a").is_ok());
        assert_eq!(connector.open_count(), 1);
        assert_eq!(connector.opened_urls(), vec!["loop://a".to_string()]);
    }
}
