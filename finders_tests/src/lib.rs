//! Helpers shared by the integration tests.
//!
//! - [`ScriptedPeer`]: a bare TCP listener speaking the framed protocol, so a
//!   test can play the server side message by message.
//! - [`EventLog`]: records everything a client publishes.
//! - [`pump_until`]: ticks a client until a condition holds.

use std::{
    cell::RefCell,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    rc::Rc,
    time::{Duration, Instant},
};

use anyhow::Context;
use finders_client::{
    events::{
        Connected, DiagnosticError, DiagnosticSource, Disconnected, PlayerJoined, PlayerLeft,
        PlayerMoved, RosterReset,
    },
    GameClient,
};
use finders_shared::{
    math::Vec3,
    net::{FramedConn, PlayerId},
};
use tokio::net::TcpListener;
use tracing::debug;

/// Installs a test-friendly subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Server stand-in bound to an ephemeral localhost port.
pub struct ScriptedPeer {
    listener: TcpListener,
}

impl ScriptedPeer {
    pub async fn bind() -> anyhow::Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    /// Address to hand to the client.
    pub fn url(&self) -> anyhow::Result<String> {
        Ok(self.listener.local_addr()?.to_string())
    }

    pub async fn accept(&self) -> anyhow::Result<FramedConn> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        debug!(peer = %addr, "Scripted peer accepted client");
        Ok(FramedConn::new(stream))
    }
}

/// Everything a client published, flattened for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Connected(String),
    Disconnected,
    RosterReset,
    Joined { id: PlayerId, is_local: bool },
    Left(PlayerId),
    Moved(PlayerId, Vec3),
    Diagnostic(DiagnosticSource),
}

/// Subscribes to every client event type and keeps them in order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Rc<RefCell<Vec<Recorded>>>,
}

impl EventLog {
    pub fn attach(client: &mut GameClient) -> Self {
        let log = EventLog::default();

        let l = log.clone();
        client
            .events
            .subscribe(move |e: &Connected| l.push(Recorded::Connected(e.url.clone())));
        let l = log.clone();
        client
            .events
            .subscribe(move |_: &Disconnected| l.push(Recorded::Disconnected));
        let l = log.clone();
        client
            .events
            .subscribe(move |_: &RosterReset| l.push(Recorded::RosterReset));
        let l = log.clone();
        client.events.subscribe(move |e: &PlayerJoined| {
            l.push(Recorded::Joined {
                id: e.record.id.clone(),
                is_local: e.is_local,
            })
        });
        let l = log.clone();
        client
            .events
            .subscribe(move |e: &PlayerLeft| l.push(Recorded::Left(e.player_id.clone())));
        let l = log.clone();
        client.events.subscribe(move |e: &PlayerMoved| {
            l.push(Recorded::Moved(e.player_id.clone(), e.position))
        });
        let l = log.clone();
        client
            .events
            .subscribe(move |e: &DiagnosticError| l.push(Recorded::Diagnostic(e.source)));

        log
    }

    fn push(&self, entry: Recorded) {
        self.entries.borrow_mut().push(entry);
    }

    pub fn entries(&self) -> Vec<Recorded> {
        self.entries.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Recorded) -> bool) -> usize {
        self.entries.borrow().iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

/// Ticks `client` every few milliseconds until `done` holds.
pub async fn pump_until(
    client: &mut GameClient,
    timeout: Duration,
    mut done: impl FnMut(&GameClient) -> bool,
) -> anyhow::Result<()> {
    let step = Duration::from_millis(5);
    let start = Instant::now();
    loop {
        client.update(step);
        if done(client) {
            return Ok(());
        }
        if start.elapsed() > timeout {
            anyhow::bail!("condition not reached within {timeout:?}");
        }
        tokio::time::sleep(step).await;
    }
}
