//! Client implementation.
//!
//! The client maintains:
//! - One channel to the server, owned by the current session
//! - The roster of known players and which one is ours
//! - Interpolation state for every remote player
//! - Local prediction and send throttling for our own player
//! - An event bus presentation code subscribes to
//!
//! Everything runs on the host's tick. The channel does its I/O in the
//! background and is drained at [`GameClient::poll_network`]; each inbound
//! message is fully applied before the next one is read.

use std::time::{Duration, Instant};

use finders_shared::{
    channel::{Channel, ChannelEvent, Connector},
    config::ClientConfig,
    event::EventBus,
    math::Vec3,
    net::{decode, encode, ClientIntent, PlayerId, ServerEvent},
};
use tracing::{debug, info, warn};

use crate::{
    events::{
        Connected, DiagnosticError, DiagnosticSource, Disconnected, PlayerJoined, PlayerLeft,
        PlayerMoved, RosterReset,
    },
    input::{LocalPrediction, SendThrottler},
    interp::MotionSmoother,
    roster::{PlayerRecord, Roster},
};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// Channel requested, waiting for the transport to open it.
    Connecting,
    /// Connected; `Join` has been sent.
    Open,
    /// Local shutdown in progress.
    Closing,
    /// Session over. `connect` may be called again.
    Closed,
}

/// One connection attempt and everything bound to it.
struct Session {
    url: String,
    player_name: String,
    channel: Box<dyn Channel>,
    /// Set once, on the first spawn whose name matches `player_name`.
    self_id: Option<PlayerId>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.channel.close();
    }
}

/// High-level game client.
pub struct GameClient {
    cfg: ClientConfig,
    connector: Box<dyn Connector>,
    state: ConnectionState,
    session: Option<Session>,

    roster: Roster,
    motion: MotionSmoother,
    prediction: LocalPrediction,
    throttler: SendThrottler,

    /// Lifecycle and roster notifications.
    pub events: EventBus,
}

impl GameClient {
    pub fn new(cfg: ClientConfig, connector: impl Connector + 'static) -> Self {
        Self {
            motion: MotionSmoother::new(cfg.smooth_rate, cfg.smoothing),
            prediction: LocalPrediction::new(cfg.local_smooth_time),
            throttler: SendThrottler::from_config(&cfg),
            cfg,
            connector: Box::new(connector),
            state: ConnectionState::Idle,
            session: None,
            roster: Roster::new(),
            events: EventBus::new(),
        }
    }

    /// Connects using the configured server and player name.
    pub fn start(&mut self) {
        let url = self.cfg.server_url.clone();
        let name = self.cfg.player_name.clone();
        self.connect(&url, &name);
    }

    /// Ends the session and releases the channel.
    pub fn shutdown(&mut self) {
        self.close();
    }

    /// Starts a new session. Any existing session is torn down first.
    ///
    /// Completion is reported later through [`Connected`] or
    /// [`DiagnosticError`] + [`Disconnected`].
    pub fn connect(&mut self, url: &str, player_name: &str) {
        if self.session.is_some() {
            self.teardown("reconnecting");
        }

        info!(url = %url, player_name = %player_name, "Connecting to server");
        self.set_state(ConnectionState::Connecting);

        match self.connector.open(url) {
            Ok(channel) => {
                self.session = Some(Session {
                    url: url.to_string(),
                    player_name: player_name.to_string(),
                    channel,
                    self_id: None,
                });
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to open channel");
                self.diagnostic(DiagnosticSource::Transport, e.to_string());
                self.set_state(ConnectionState::Closed);
            }
        }
    }

    /// Closes the session. Safe to call at any time, any number of times.
    pub fn close(&mut self) {
        if self.session.is_none() {
            return;
        }
        if self.state == ConnectionState::Open {
            self.send_intent(ClientIntent::Leave);
        }
        self.set_state(ConnectionState::Closing);
        self.teardown("closed locally");
    }

    /// Drains the channel, then advances remote smoothing by `dt`.
    pub fn update(&mut self, dt: Duration) {
        self.poll_network(Instant::now());
        self.motion.step(dt.as_secs_f32());
    }

    /// Applies every event the channel has ready, in delivery order.
    pub fn poll_network(&mut self, now: Instant) {
        loop {
            let Some(session) = self.session.as_mut() else {
                break;
            };
            let Some(event) = session.channel.poll_event() else {
                break;
            };
            self.handle_channel_event(event, now);
        }
    }

    /// Feeds one frame of local movement.
    ///
    /// Advances the predicted position and sends it when the throttler says
    /// so. Returns whether an update was actually transmitted. Ignored until
    /// our own player has been identified.
    pub fn submit_local_displacement(
        &mut self,
        displacement: Vec3,
        dt: f32,
        now: Instant,
    ) -> bool {
        if self.roster.local().is_none() {
            return false;
        }

        let pos = self.prediction.apply(displacement, dt);
        if !self.throttler.is_due(pos, now) {
            return false;
        }

        let sent = self.send_intent(ClientIntent::update_position(pos));
        // Recorded even when dropped; see `SendThrottler::mark_sent`.
        self.throttler.mark_sent(pos, now);
        sent
    }

    /// Sends a message if the connection is open. Otherwise it is dropped.
    pub fn send_intent(&mut self, intent: ClientIntent) -> bool {
        if self.state != ConnectionState::Open {
            debug!(state = ?self.state, ?intent, "Dropping send; connection not open");
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        match session.channel.send(encode(&intent)) {
            Ok(()) => {
                debug!(?intent, "Sent");
                true
            }
            Err(e) => {
                warn!(error = %e, "Send failed");
                self.diagnostic(DiagnosticSource::Transport, e.to_string());
                false
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn local_player_id(&self) -> Option<&PlayerId> {
        self.session.as_ref().and_then(|s| s.self_id.as_ref())
    }

    pub fn server_url(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.url.as_str())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.cfg
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn motion(&self) -> &MotionSmoother {
        &self.motion
    }

    /// Locally predicted position of our own player.
    pub fn local_position(&self) -> Vec3 {
        self.prediction.position()
    }

    /// Where a player should be drawn: predicted for us, smoothed for others.
    pub fn render_position(&self, id: &PlayerId) -> Option<Vec3> {
        if self.roster.is_local(id) {
            Some(self.prediction.position())
        } else {
            self.motion.rendered_position(id)
        }
    }

    /// Remote players that have not moved recently.
    pub fn stale_players(&self, now: Instant) -> Vec<PlayerId> {
        self.motion.stale(now, self.cfg.stale_after())
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Connection state");
            self.state = next;
        }
    }

    fn diagnostic(&mut self, source: DiagnosticSource, message: String) {
        self.events.publish(DiagnosticError { source, message });
    }

    /// Drops the session and everything learned during it.
    fn teardown(&mut self, reason: &str) {
        let Some(session) = self.session.take() else {
            return;
        };
        info!(url = %session.url, reason = %reason, "Disconnected");
        drop(session);

        self.roster.clear();
        self.motion.clear();
        self.set_state(ConnectionState::Closed);
        self.events.publish(Disconnected);
    }

    fn handle_channel_event(&mut self, event: ChannelEvent, now: Instant) {
        match event {
            ChannelEvent::Opened => {
                if self.state != ConnectionState::Connecting {
                    debug!(state = ?self.state, "Ignoring open on inactive channel");
                    return;
                }
                self.set_state(ConnectionState::Open);
                let Some(session) = self.session.as_ref() else {
                    return;
                };
                let url = session.url.clone();
                let player_name = session.player_name.clone();
                info!(url = %url, "Connected to server");
                self.events.publish(Connected { url });
                self.send_intent(ClientIntent::Join { player_name });
            }
            ChannelEvent::Message(payload) => {
                if self.state != ConnectionState::Open {
                    debug!(state = ?self.state, "Ignoring message before open");
                    return;
                }
                match decode(&payload) {
                    Ok(msg) => self.dispatch(msg, now),
                    Err(e) => {
                        warn!(error = %e, "Discarding inbound message");
                        self.diagnostic(DiagnosticSource::Decode, e.to_string());
                    }
                }
            }
            ChannelEvent::Error(e) => {
                warn!(error = %e, "Transport error");
                self.diagnostic(DiagnosticSource::Transport, e.to_string());
                self.teardown("transport error");
            }
            ChannelEvent::Closed { reason } => {
                self.teardown(&reason);
            }
        }
    }

    fn dispatch(&mut self, msg: ServerEvent, now: Instant) {
        match msg {
            ServerEvent::GameState { players } => {
                debug!(players = players.len(), "Applying game state");
                self.roster.clear();
                self.motion.clear();
                self.events.publish(RosterReset);

                let mut order = Vec::with_capacity(players.len());
                for p in &players {
                    if !order.contains(&p.id) {
                        order.push(p.id.clone());
                    }
                    self.admit(PlayerRecord::from(p), now);
                }
                for id in order {
                    self.announce(&id);
                }
            }
            ServerEvent::PlayerJoined {
                player_id,
                player_name,
                x,
                y,
                z,
            } => {
                let record = PlayerRecord::new(player_id.clone(), player_name, Vec3::new(x, y, z));
                self.admit(record, now);
                self.announce(&player_id);
            }
            ServerEvent::PlayerMoved { player_id, x, y, z } => {
                let position = Vec3::new(x, y, z);
                if self.roster.update_position(&player_id, position) {
                    if self.roster.is_local(&player_id) {
                        // Local prediction is never overwritten by the server.
                        debug!(player_id = %player_id, "Ignoring server move for local player");
                    } else {
                        self.motion.set_target(&player_id, position, now);
                    }
                }
                self.events.publish(PlayerMoved {
                    player_id,
                    position,
                });
            }
            ServerEvent::PlayerLeft { player_id } => {
                if self.roster.remove(&player_id).is_some() {
                    info!(player_id = %player_id, "Player left");
                }
                self.motion.remove(&player_id);
                self.events.publish(PlayerLeft { player_id });
            }
            ServerEvent::Error { message } => {
                warn!(message = %message, "Server error");
                self.diagnostic(DiagnosticSource::Server, message);
            }
            ServerEvent::Unknown { kind } => {
                warn!(kind = %kind, "Unknown message type");
                self.diagnostic(
                    DiagnosticSource::UnknownMessage,
                    format!("unknown message type: {kind}"),
                );
            }
        }
    }

    /// Upserts a record and binds it as ours if it is the first name match.
    fn admit(&mut self, record: PlayerRecord, now: Instant) {
        let id = record.id.clone();
        let name_match = self
            .session
            .as_ref()
            .map(|s| s.player_name == record.display_name)
            .unwrap_or(false);
        let position = record.position;
        self.roster.upsert(record);

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let is_local = if session.self_id.is_some() {
            session.self_id.as_ref() == Some(&id)
        } else if name_match {
            session.self_id = Some(id.clone());
            info!(player_id = %id, "Identified local player");
            self.prediction.reset(position);
            self.throttler.reset(position);
            true
        } else {
            false
        };

        if is_local {
            self.roster.set_local(&id);
            self.motion.remove(&id);
        } else {
            self.motion.spawn(id, position, now);
        }
    }

    fn announce(&mut self, id: &PlayerId) {
        let Some(record) = self.roster.get(id).cloned() else {
            return;
        };
        let is_local = self.roster.is_local(id);
        debug!(player_id = %id, name = %record.display_name, is_local, "Spawn");
        self.events.publish(PlayerJoined { record, is_local });
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        match tokens[0] {
            "connect" => {
                let url = tokens
                    .get(1)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| self.cfg.server_url.clone());
                let name = self.cfg.player_name.clone();
                self.connect(&url, &name);
                vec![format!("Connecting to {url} as {name}")]
            }
            "disconnect" => {
                self.close();
                vec!["Disconnected".to_string()]
            }
            "name" => match tokens.get(1) {
                Some(name) => {
                    self.cfg.player_name = tokens[1..].join(" ");
                    debug!(name = %name, "Player name changed");
                    vec![format!(
                        "Name set to {} (applies on next connect)",
                        self.cfg.player_name
                    )]
                }
                None => vec![format!("Name: {}", self.cfg.player_name)],
            },
            "status" => {
                let mut out = Vec::new();
                out.push(format!("State: {:?}", self.state));
                if let Some(url) = self.server_url() {
                    out.push(format!("Server: {url}"));
                }
                match self.local_player_id() {
                    Some(id) => out.push(format!("Local player: {id}")),
                    None => out.push("Local player: <unassigned>".to_string()),
                }
                out.push(format!("Players: {}", self.roster.len()));
                out.push(format!("Position: {}", self.local_position()));
                out
            }
            "players" => {
                let mut records: Vec<&PlayerRecord> = self.roster.iter().collect();
                records.sort_by(|a, b| a.id.cmp(&b.id));
                records
                    .into_iter()
                    .map(|r| {
                        let marker = if self.roster.is_local(&r.id) { "*" } else { " " };
                        let drawn = self.render_position(&r.id).unwrap_or(r.position);
                        format!("{marker} {} {} at {}", r.id, r.display_name, drawn)
                    })
                    .collect()
            }
            other => vec![format!("Unknown command: {other}")],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finders_shared::{loopback::LoopbackConnector, net::PlayerSnapshot};
    use std::{cell::RefCell, rc::Rc};

    fn snapshot(id: &str, name: &str, x: f32) -> PlayerSnapshot {
        PlayerSnapshot {
            id: PlayerId::from(id),
            name: name.to_string(),
            x,
            y: 0.0,
            z: 0.0,
        }
    }

    fn open_client(name: &str) -> (GameClient, LoopbackConnector) {
        let loopback = LoopbackConnector::new();
        let cfg = ClientConfig {
            player_name: name.to_string(),
            ..ClientConfig::default()
        };
        let mut client = GameClient::new(cfg, loopback.clone());
        client.start();
        loopback.push_open();
        client.poll_network(Instant::now());
        (client, loopback)
    }

    #[test]
    fn open_sends_join_first() {
        let (client, loopback) = open_client("Alice");
        assert_eq!(client.state(), ConnectionState::Open);
        assert_eq!(
            loopback.sent_intents(),
            vec![ClientIntent::Join {
                player_name: "Alice".to_string()
            }]
        );
    }

    #[test]
    fn sends_are_dropped_unless_open() {
        let loopback = LoopbackConnector::new();
        let mut client = GameClient::new(ClientConfig::default(), loopback.clone());
        assert!(!client.send_intent(ClientIntent::Leave));

        client.start();
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert!(!client.send_intent(ClientIntent::Leave));
        assert!(loopback.sent().is_empty());
    }

    #[test]
    fn later_name_match_is_remote() {
        let (mut client, loopback) = open_client("Alice");
        loopback.push_server(&ServerEvent::GameState {
            players: vec![snapshot("p1", "Alice", 0.0)],
        });
        loopback.push_server(&ServerEvent::PlayerJoined {
            player_id: PlayerId::from("p9"),
            player_name: "Alice".to_string(),
            x: 0.0,
            y: 0.0,
            z: 0.0,
        });
        client.poll_network(Instant::now());

        assert_eq!(client.local_player_id(), Some(&PlayerId::from("p1")));
        assert!(!client.roster().is_local(&PlayerId::from("p9")));
        assert!(client.motion().contains(&PlayerId::from("p9")));
        assert!(!client.motion().contains(&PlayerId::from("p1")));
    }

    #[test]
    fn local_flag_survives_snapshot_replacement() {
        let (mut client, loopback) = open_client("Alice");
        loopback.push_server(&ServerEvent::GameState {
            players: vec![snapshot("p1", "Alice", 0.0)],
        });
        loopback.push_server(&ServerEvent::GameState {
            players: vec![snapshot("p0", "Alice", 0.0), snapshot("p1", "Alice", 2.0)],
        });
        client.poll_network(Instant::now());

        assert_eq!(client.roster().local().unwrap().id, PlayerId::from("p1"));
        assert!(!client.roster().is_local(&PlayerId::from("p0")));
    }

    #[test]
    fn server_moves_do_not_override_local_prediction() {
        let (mut client, loopback) = open_client("Alice");
        loopback.push_server(&ServerEvent::GameState {
            players: vec![snapshot("p1", "Alice", 1.0)],
        });
        loopback.push_server(&ServerEvent::PlayerMoved {
            player_id: PlayerId::from("p1"),
            x: 9.0,
            y: 0.0,
            z: 0.0,
        });
        client.poll_network(Instant::now());

        assert_eq!(client.local_position(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(
            client.roster().local().unwrap().position,
            Vec3::new(9.0, 0.0, 0.0)
        );
    }

    #[test]
    fn local_input_is_suppressed_until_identified() {
        let (mut client, loopback) = open_client("Alice");
        loopback.push_server(&ServerEvent::GameState {
            players: vec![snapshot("p2", "Bob", 0.0)],
        });
        client.poll_network(Instant::now());

        let moved = client.submit_local_displacement(Vec3::new(1.0, 0.0, 0.0), 0.016, Instant::now());
        assert!(!moved);
        assert_eq!(loopback.sent_intents().len(), 1);
    }

    #[test]
    fn local_input_is_throttled() {
        let (mut client, loopback) = open_client("Alice");
        loopback.push_server(&ServerEvent::GameState {
            players: vec![snapshot("p1", "Alice", 0.0)],
        });
        client.poll_network(Instant::now());

        let t0 = Instant::now();
        assert!(client.submit_local_displacement(Vec3::ZERO, 0.016, t0));
        assert!(!client.submit_local_displacement(
            Vec3::ZERO,
            0.016,
            t0 + Duration::from_millis(10)
        ));
        assert!(client.submit_local_displacement(
            Vec3::ZERO,
            0.016,
            t0 + Duration::from_millis(61)
        ));

        let updates = loopback
            .sent_intents()
            .into_iter()
            .filter(|i| matches!(i, ClientIntent::UpdatePosition { .. }))
            .count();
        assert_eq!(updates, 2);
    }

    #[test]
    fn decode_errors_and_unknown_kinds_are_diagnostics_only() {
        let (mut client, loopback) = open_client("Alice");
        let diagnostics = Rc::new(RefCell::new(Vec::new()));
        let d = Rc::clone(&diagnostics);
        client
            .events
            .subscribe(move |e: &DiagnosticError| d.borrow_mut().push(e.source));

        loopback.push_raw(br#"{"type":"PlayerMoved","player_id":"p2"}"#);
        loopback.push_raw(br#"{"type":"Teleported","player_id":"p2"}"#);
        loopback.push_server(&ServerEvent::Error {
            message: "Player ID p1 is already in use".to_string(),
        });
        client.poll_network(Instant::now());

        assert_eq!(
            *diagnostics.borrow(),
            vec![
                DiagnosticSource::Decode,
                DiagnosticSource::UnknownMessage,
                DiagnosticSource::Server
            ]
        );
        assert_eq!(client.state(), ConnectionState::Open);
        assert!(client.roster().is_empty());
    }

    #[test]
    fn graceful_close_sends_leave() {
        let (mut client, loopback) = open_client("Alice");
        client.close();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(loopback.sent_intents().last(), Some(&ClientIntent::Leave));
        assert!(loopback.is_closed(0));
    }

    #[test]
    fn reconnect_closes_previous_channel() {
        let (mut client, loopback) = open_client("Alice");
        client.connect("127.0.0.1:9999", "Alice");
        assert_eq!(loopback.open_count(), 2);
        assert!(loopback.is_closed(0));
        assert!(!loopback.is_closed(1));
        assert_eq!(client.state(), ConnectionState::Connecting);
    }

    #[test]
    fn immediate_open_failure_reports_and_closes() {
        let loopback = LoopbackConnector::new();
        loopback.fail_next_open("refused");
        let mut client = GameClient::new(ClientConfig::default(), loopback.clone());
        let diagnostics = Rc::new(RefCell::new(0));
        let d = Rc::clone(&diagnostics);
        client
            .events
            .subscribe(move |_: &DiagnosticError| *d.borrow_mut() += 1);

        client.start();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(*diagnostics.borrow(), 1);

        client.start();
        assert_eq!(client.state(), ConnectionState::Connecting);
    }

    #[test]
    fn console_reports_status_and_players() {
        let (mut client, loopback) = open_client("Alice");
        loopback.push_server(&ServerEvent::GameState {
            players: vec![snapshot("p1", "Alice", 0.0), snapshot("p2", "Bob", 1.0)],
        });
        client.poll_network(Instant::now());

        let status = client.exec_console("status");
        assert!(status.contains(&"State: Open".to_string()));
        assert!(status.contains(&"Local player: p1".to_string()));

        let players = client.exec_console("players");
        assert_eq!(players.len(), 2);
        assert!(players[0].starts_with("* p1 Alice"));

        client.exec_console("name Carol");
        assert_eq!(client.config().player_name, "Carol");
        client.exec_console("disconnect");
        assert!(!client.is_connected());
    }
}
