use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use gridclaim::net::unix_time_ms;
use gridclaim::{
    ClientEnvelope, ClientMessage, Direction, FixedTimestep, GamePayload, GridPosition,
    InputCommand, JoinResponse, NetworkStats, PlayerId, ServerEnvelope, ServerMessage, Tick,
    TickClock, Transport, TransportError, TransportEvent,
};

use super::config::ClientConfig;
use super::events::ClientEvent;
use super::interpolation::InterpolatedState;
use super::session::{SessionStore, StoredSession};
use super::sync::StateSyncController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Joining,
    Reconnecting,
    InRoom,
    InGame,
}

pub struct GameClient {
    config: ClientConfig,
    transport: Transport,
    sync: StateSyncController,
    timestep: FixedTimestep,
    clock: TickClock,
    state: ClientState,
    state_since: Instant,
    session_store: Option<SessionStore>,
    player_id: Option<PlayerId>,
    room_code: Option<String>,
    last_ping: Instant,
    ping_interval: Duration,
    last_sent_direction: Direction,
    running: Arc<AtomicBool>,
    pending_events: VecDeque<ClientEvent>,
}

impl GameClient {
    pub fn new(config: ClientConfig) -> Self {
        let mut sync = StateSyncController::new(&config.prediction, config.interpolation.clone());
        sync.set_tick_rate(config.tick_rate);

        Self {
            transport: Transport::new(config.transport.clone()),
            sync,
            timestep: FixedTimestep::new(config.tick_rate),
            clock: TickClock::new(),
            state: ClientState::Disconnected,
            state_since: Instant::now(),
            session_store: config.session_file.clone().map(SessionStore::new),
            player_id: None,
            room_code: None,
            last_ping: Instant::now(),
            ping_interval: Duration::from_secs_f32(config.ping_interval_secs.max(0.01)),
            last_sent_direction: Direction::None,
            running: Arc::new(AtomicBool::new(true)),
            pending_events: VecDeque::new(),
            config,
        }
    }

    /// Connects and either resumes a stored session or joins a room.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        if self.transport.is_connected() {
            self.process_transport();
            self.transport.disconnect();
            self.process_transport();
        }

        log::info!("Connecting to {}:{}", host, port);
        self.transport.connect(host, port)?;
        self.sync.reset();
        self.last_ping = Instant::now();

        match self.load_session() {
            Some(session) => self.reconnect(session),
            None => self.join(self.config.room_code.clone()),
        }
    }

    fn load_session(&self) -> Option<StoredSession> {
        let store = self.session_store.as_ref()?;
        match store.load() {
            Ok(session) => session,
            Err(e) => {
                log::warn!("Ignoring unreadable session file: {:#}", e);
                None
            }
        }
    }

    pub fn join(&mut self, room_code: Option<String>) -> Result<(), TransportError> {
        match &room_code {
            Some(code) => log::info!("Joining room {} as {}", code, self.config.player_name),
            None => log::info!("Requesting a new room as {}", self.config.player_name),
        }

        self.set_state(ClientState::Joining);
        self.send_message(ClientMessage::JoinRoom {
            room_code,
            player_name: self.config.player_name.clone(),
        })
    }

    pub fn reconnect(&mut self, session: StoredSession) -> Result<(), TransportError> {
        log::info!("Reconnecting to room {}", session.room_code);

        self.set_state(ClientState::Reconnecting);
        self.send_message(ClientMessage::Reconnect {
            room_code: session.room_code,
            token: session.reconnect_token,
        })
    }

    pub fn ready(&mut self) -> Result<(), TransportError> {
        if self.state != ClientState::InRoom {
            return Ok(());
        }
        self.send_message(ClientMessage::Ready)
    }

    pub fn leave(&mut self) -> Result<(), TransportError> {
        if matches!(self.state, ClientState::InRoom | ClientState::InGame) {
            self.send_message(ClientMessage::LeaveRoom)?;
        }
        self.clear_session();
        self.transport.disconnect();
        Ok(())
    }

    /// Records the direction for prediction and sends it, but only when it changed.
    pub fn send_input(&mut self, direction: Direction) -> Result<(), TransportError> {
        if self.state != ClientState::InGame || direction == self.last_sent_direction {
            return Ok(());
        }

        let tick = self.clock.estimated();
        self.sync.prediction_mut().record_input(direction, tick);
        self.last_sent_direction = direction;

        match InputCommand::new(tick, direction).serialize() {
            Ok(bytes) => self.send_message(ClientMessage::GameInput(bytes)),
            Err(e) => {
                log::error!("Failed to encode input: {}", e);
                Ok(())
            }
        }
    }

    pub fn update(&mut self, delta_time: f32) {
        self.process_transport();
        self.check_timeouts();

        if self.state == ClientState::InGame {
            self.timestep.accumulate(delta_time);
            while self.timestep.consume_tick() {
                let tick = self.clock.advance();
                self.sync.prediction_mut().advance(tick);
            }
        }

        if self.transport.is_connected() && self.last_ping.elapsed() >= self.ping_interval {
            self.last_ping = Instant::now();
            let _ = self.send_message(ClientMessage::Ping {
                timestamp_ms: unix_time_ms(),
            });
        }
    }

    fn process_transport(&mut self) {
        for event in self.transport.poll_events() {
            match event {
                TransportEvent::Datagram(data) => self.handle_datagram(&data),
                TransportEvent::Error { kind, message } => {
                    log::warn!("Transport error ({:?}): {}", kind, message);
                    self.pending_events
                        .push_back(ClientEvent::TransportError { message });
                }
                TransportEvent::Disconnected => {
                    self.sync.reset();
                    self.timestep.reset();
                    self.clock.reset();
                    self.player_id = None;
                    self.set_state(ClientState::Disconnected);
                    self.pending_events.push_back(ClientEvent::Disconnected);
                }
            }
        }
    }

    fn check_timeouts(&mut self) {
        let elapsed = self.state_since.elapsed().as_secs_f32();

        match self.state {
            ClientState::Reconnecting if elapsed > self.config.reconnect_timeout_secs => {
                self.fall_back_to_join("no response from server".to_string());
            }
            ClientState::Joining if elapsed > self.config.join_timeout_secs => {
                log::warn!("Join timed out after {:.1}s", elapsed);
                self.pending_events.push_back(ClientEvent::JoinTimedOut);
                self.transport.disconnect();
            }
            _ => {}
        }
    }

    fn fall_back_to_join(&mut self, reason: String) {
        log::warn!("Reconnect failed ({}), joining fresh", reason);
        self.clear_session();
        self.pending_events
            .push_back(ClientEvent::ReconnectFailed { reason });
        let _ = self.join(self.config.room_code.clone());
    }

    fn handle_datagram(&mut self, data: &[u8]) {
        let envelope = match ServerEnvelope::deserialize(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("Dropping malformed datagram ({} bytes): {}", data.len(), e);
                return;
            }
        };

        if !self
            .transport
            .update_received_sequence(envelope.sequence())
            .is_accepted()
        {
            return;
        }

        self.handle_message(envelope.payload);
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::RoomJoined {
                room_code,
                player_id,
                reconnect_token,
            } => {
                log::info!("In room {} as player {}", room_code, player_id);
                self.player_id = Some(player_id);
                self.room_code = Some(room_code.clone());
                self.set_state(ClientState::InRoom);
                self.store_session(StoredSession {
                    room_code: room_code.clone(),
                    reconnect_token,
                    player_name: self.config.player_name.clone(),
                });
                self.pending_events
                    .push_back(ClientEvent::RoomJoined {
                        room_code,
                        player_id,
                    });
            }
            ServerMessage::RoomUpdate { room_code, players } => {
                self.pending_events
                    .push_back(ClientEvent::RoomUpdated { room_code, players });
            }
            ServerMessage::GameStarting { countdown_secs } => {
                log::info!("Game starting in {}s", countdown_secs);
                self.pending_events
                    .push_back(ClientEvent::GameStarting { countdown_secs });
            }
            ServerMessage::GameEnded { winner_id } => {
                log::info!("Game ended, winner {:?}", winner_id);
                self.sync.reset();
                self.timestep.reset();
                self.clear_session();
                if self.state == ClientState::InGame {
                    self.set_state(ClientState::InRoom);
                }
                self.pending_events
                    .push_back(ClientEvent::GameEnded { winner_id });
            }
            ServerMessage::PlayerLeft { player_id } => {
                self.pending_events
                    .push_back(ClientEvent::PlayerLeft { player_id });
            }
            ServerMessage::PlayerDisconnected { player_id } => {
                self.pending_events
                    .push_back(ClientEvent::PlayerDisconnected { player_id });
            }
            ServerMessage::PlayerReconnected { player_id } => {
                self.pending_events
                    .push_back(ClientEvent::PlayerReconnected { player_id });
            }
            ServerMessage::Error { message } => {
                if self.state == ClientState::Reconnecting {
                    self.fall_back_to_join(message);
                } else {
                    log::warn!("Server error: {}", message);
                    self.pending_events
                        .push_back(ClientEvent::ServerError { message });
                }
            }
            ServerMessage::Pong { timestamp_ms } => {
                let rtt = unix_time_ms().saturating_sub(timestamp_ms);
                self.transport.stats_mut().record_rtt(rtt as f32);
                log::trace!("Ping RTT: {} ms", rtt);
            }
            ServerMessage::GameMessage(bytes) => self.handle_game_message(&bytes),
        }
    }

    fn handle_game_message(&mut self, bytes: &[u8]) {
        let payload = match GamePayload::deserialize(bytes) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Dropping malformed game message: {}", e);
                return;
            }
        };

        match payload {
            GamePayload::JoinResponse(response) => self.handle_join_response(response),
            GamePayload::State(snapshot) => {
                let tick = snapshot.tick;
                if self.sync.apply_state(snapshot) {
                    self.clock.observe_server_tick(tick);
                }
            }
        }

        for event in self.sync.drain_events() {
            self.pending_events.push_back(ClientEvent::Sync(event));
        }
    }

    fn handle_join_response(&mut self, response: JoinResponse) {
        let tick_rate = response.tick_rate.max(1);
        let tick = response.state.tick;

        self.player_id = Some(response.player_id);
        self.timestep = FixedTimestep::new(tick_rate);
        self.clock.reset();
        self.clock.observe_server_tick(tick);
        self.last_sent_direction = Direction::None;
        self.sync.handle_join_response(response);
        self.set_state(ClientState::InGame);
    }

    fn send_message(&mut self, message: ClientMessage) -> Result<(), TransportError> {
        let envelope = ClientEnvelope::new(self.transport.next_send_sequence(), message);
        let bytes = match envelope.serialize() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Failed to encode {:?}: {}", envelope.payload, e);
                return Ok(());
            }
        };
        self.transport.send(&bytes)?;
        Ok(())
    }

    fn set_state(&mut self, state: ClientState) {
        if self.state != state {
            log::debug!("Client state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.state_since = Instant::now();
        }
    }

    fn store_session(&self, session: StoredSession) {
        if let Some(store) = &self.session_store
            && let Err(e) = store.save(&session)
        {
            log::warn!("Could not save session: {:#}", e);
        }
    }

    fn clear_session(&self) {
        if let Some(store) = &self.session_store
            && let Err(e) = store.clear()
        {
            log::warn!("Could not clear session: {:#}", e);
        }
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ClientEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn interpolated(&self, player_id: PlayerId) -> Option<InterpolatedState> {
        self.sync.buffer(player_id)?.sample(self.timestep.alpha())
    }

    pub fn predicted_position(&self) -> GridPosition {
        self.sync.prediction().predicted_position()
    }

    pub fn predicted_direction(&self) -> Direction {
        self.sync.prediction().predicted_direction()
    }

    pub fn sync(&self) -> &StateSyncController {
        &self.sync
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room_code.as_deref()
    }

    pub fn estimated_server_tick(&self) -> Tick {
        self.clock.estimated()
    }

    pub fn stats(&self) -> &NetworkStats {
        self.transport.stats()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.transport.disconnect();
        self.sync.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::sync::atomic::AtomicU16;
    use std::thread;

    use gridclaim::{PlayerState, WorldSnapshot};

    use crate::net::sync::SyncEvent;

    static PORT_COUNTER: AtomicU16 = AtomicU16::new(43000);

    struct FakeServer {
        socket: UdpSocket,
        port: u16,
        client: Option<SocketAddr>,
        sequence: u32,
    }

    impl FakeServer {
        fn bind() -> Self {
            let port = PORT_COUNTER.fetch_add(10, Ordering::SeqCst);
            let socket = UdpSocket::bind(("127.0.0.1", port)).unwrap();
            socket
                .set_read_timeout(Some(Duration::from_millis(300)))
                .unwrap();
            Self {
                socket,
                port,
                client: None,
                sequence: 0,
            }
        }

        /// Next message from the client, skipping pings.
        fn recv(&mut self) -> Option<ClientMessage> {
            let mut buffer = [0u8; 2048];
            loop {
                let (size, from) = self.socket.recv_from(&mut buffer).ok()?;
                self.client = Some(from);
                let envelope = ClientEnvelope::deserialize(&buffer[..size]).unwrap();
                if !matches!(envelope.payload, ClientMessage::Ping { .. }) {
                    return Some(envelope.payload);
                }
            }
        }

        fn send(&mut self, message: ServerMessage) {
            self.sequence += 1;
            let envelope = ServerEnvelope::new(self.sequence, message);
            self.socket
                .send_to(&envelope.serialize().unwrap(), self.client.unwrap())
                .unwrap();
        }

        fn send_game(&mut self, payload: GamePayload) {
            self.send(ServerMessage::GameMessage(payload.serialize().unwrap()));
        }
    }

    fn test_config() -> ClientConfig {
        let mut config = ClientConfig {
            player_name: "tester".to_string(),
            ping_interval_secs: 60.0,
            ..Default::default()
        };
        config.transport.receive_timeout = Duration::from_millis(20);
        config
    }

    fn pump_until(client: &mut GameClient, mut done: impl FnMut(&GameClient) -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(2) {
            client.update(0.0);
            if done(client) {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn join_response(player_id: PlayerId) -> GamePayload {
        let mut state = WorldSnapshot::full(5, 10, 10);
        state.players.push(PlayerState {
            id: player_id,
            name: "tester".to_string(),
            position: GridPosition::new(4, 4),
            direction: Direction::Up,
            alive: true,
            score: 0,
            color: 0,
        });
        GamePayload::JoinResponse(JoinResponse {
            player_id,
            tick_rate: 10,
            move_interval_ticks: 2,
            state,
        })
    }

    #[test]
    fn test_client_creation() {
        let client = GameClient::new(ClientConfig::default());
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(client.interpolated(1).is_none());
    }

    #[test]
    fn test_join_and_enter_game() {
        let mut server = FakeServer::bind();
        let mut client = GameClient::new(test_config());

        client.connect("127.0.0.1", server.port).unwrap();
        assert_eq!(client.state(), ClientState::Joining);
        assert_eq!(
            server.recv(),
            Some(ClientMessage::JoinRoom {
                room_code: None,
                player_name: "tester".to_string(),
            })
        );

        server.send(ServerMessage::RoomJoined {
            room_code: "ROOM".to_string(),
            player_id: 7,
            reconnect_token: "t".to_string(),
        });
        assert!(pump_until(&mut client, |c| c.state() == ClientState::InRoom));
        assert_eq!(client.room_code(), Some("ROOM"));

        server.send_game(join_response(7));
        assert!(pump_until(&mut client, |c| c.state() == ClientState::InGame));

        let events: Vec<ClientEvent> = client.drain_events().collect();
        assert!(events.contains(&ClientEvent::Sync(SyncEvent::JoinedGame { player_id: 7 })));
        assert_eq!(client.predicted_position(), GridPosition::new(4, 4));
        assert_eq!(client.estimated_server_tick(), 5);
        assert!(client.interpolated(7).is_some());
    }

    #[test]
    fn test_input_sent_only_on_change() {
        let mut server = FakeServer::bind();
        let mut client = GameClient::new(test_config());
        client.connect("127.0.0.1", server.port).unwrap();
        server.recv();

        server.send_game(join_response(3));
        assert!(pump_until(&mut client, |c| c.state() == ClientState::InGame));

        client.send_input(Direction::Left).unwrap();
        client.send_input(Direction::Left).unwrap();

        let Some(ClientMessage::GameInput(bytes)) = server.recv() else {
            panic!("expected game input");
        };
        let command = InputCommand::deserialize(&bytes).unwrap();
        assert_eq!(command.direction, Direction::Left);
        assert_eq!(command.tick, 5);
        assert_eq!(server.recv(), None);

        assert_eq!(client.predicted_direction(), Direction::Left);
        assert_eq!(client.sync().prediction().pending_input_count(), 1);
    }

    #[test]
    fn test_reconnect_rejected_falls_back_to_join() {
        let session_path = std::env::temp_dir().join(format!(
            "gridclaim-client-session-{}.json",
            std::process::id()
        ));
        let store = SessionStore::new(session_path.clone());
        store
            .save(&StoredSession {
                room_code: "OLD1".to_string(),
                reconnect_token: "stale".to_string(),
                player_name: "tester".to_string(),
            })
            .unwrap();

        let mut server = FakeServer::bind();
        let mut client = GameClient::new(ClientConfig {
            session_file: Some(session_path.clone()),
            ..test_config()
        });

        client.connect("127.0.0.1", server.port).unwrap();
        assert_eq!(client.state(), ClientState::Reconnecting);
        assert_eq!(
            server.recv(),
            Some(ClientMessage::Reconnect {
                room_code: "OLD1".to_string(),
                token: "stale".to_string(),
            })
        );

        server.send(ServerMessage::Error {
            message: "unknown token".to_string(),
        });
        assert!(pump_until(&mut client, |c| c.state() == ClientState::Joining));

        let events: Vec<ClientEvent> = client.drain_events().collect();
        assert!(events.contains(&ClientEvent::ReconnectFailed {
            reason: "unknown token".to_string(),
        }));
        assert!(matches!(server.recv(), Some(ClientMessage::JoinRoom { .. })));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_malformed_datagram_ignored() {
        let mut server = FakeServer::bind();
        let mut client = GameClient::new(test_config());
        client.connect("127.0.0.1", server.port).unwrap();
        server.recv();

        server
            .socket
            .send_to(&[1, 2, 3, 4, 5], server.client.unwrap())
            .unwrap();
        server.send(ServerMessage::GameStarting { countdown_secs: 3 });

        assert!(pump_until(&mut client, |c| c.stats().packets_received >= 2));
        let events: Vec<ClientEvent> = client.drain_events().collect();
        assert_eq!(events, vec![ClientEvent::GameStarting { countdown_secs: 3 }]);
        assert_eq!(client.state(), ClientState::Joining);
    }

    #[test]
    fn test_pong_updates_rtt() {
        let mut server = FakeServer::bind();
        let mut client = GameClient::new(test_config());
        client.connect("127.0.0.1", server.port).unwrap();
        server.recv();

        server.send(ServerMessage::Pong {
            timestamp_ms: unix_time_ms().saturating_sub(40),
        });

        assert!(pump_until(&mut client, |c| c.stats().rtt_ms > 0.0));
        assert!(client.stats().rtt_ms >= 40.0);
    }

    #[test]
    fn test_reconnect_reports_previous_connection() {
        let mut server = FakeServer::bind();
        let mut client = GameClient::new(test_config());
        client.connect("127.0.0.1", server.port).unwrap();
        server.recv();
        server.send(ServerMessage::RoomJoined {
            room_code: "ROOM".to_string(),
            player_id: 3,
            reconnect_token: "t".to_string(),
        });
        thread::sleep(Duration::from_millis(100));

        client.connect("127.0.0.1", server.port).unwrap();

        assert_eq!(client.state(), ClientState::Joining);
        let events: Vec<ClientEvent> = client.drain_events().collect();
        assert_eq!(
            events,
            vec![
                ClientEvent::RoomJoined {
                    room_code: "ROOM".to_string(),
                    player_id: 3,
                },
                ClientEvent::Disconnected,
            ]
        );
        assert_eq!(client.player_id(), None);
        assert!(matches!(server.recv(), Some(ClientMessage::JoinRoom { .. })));
    }

    #[test]
    fn test_shutdown_disconnects() {
        let mut server = FakeServer::bind();
        let mut client = GameClient::new(test_config());
        client.connect("127.0.0.1", server.port).unwrap();
        server.recv();

        let running = client.running();
        client.shutdown();
        client.update(0.0);

        assert!(!running.load(Ordering::SeqCst));
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(client.drain_events().any(|e| e.is_terminal()));
    }
}
