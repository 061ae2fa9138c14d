use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::net::{Autopilot, ClientEvent, ClientState, GameClient, SyncEvent};

/// A piece of the client that is stepped once per frame and torn down on exit.
pub trait Subsystem {
    fn update(&mut self, dt: f32);
    fn dispose(&mut self);
}

impl Subsystem for GameClient {
    fn update(&mut self, dt: f32) {
        GameClient::update(self, dt);
    }

    fn dispose(&mut self) {
        self.shutdown();
    }
}

pub struct App {
    client: GameClient,
    autopilot: Autopilot,
    frame_time: Duration,
    run_for: Option<Duration>,
    running: Arc<AtomicBool>,
    session_over: bool,
}

impl App {
    pub fn new(
        client: GameClient,
        autopilot: Autopilot,
        frame_rate: u32,
        run_for: Option<Duration>,
    ) -> Self {
        let running = client.running();
        Self {
            client,
            autopilot,
            frame_time: Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64),
            run_for,
            running,
            session_over: false,
        }
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn run(&mut self) {
        let started = Instant::now();
        let mut last_frame = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            let dt = now.duration_since(last_frame).as_secs_f32();
            last_frame = now;

            self.frame(dt);

            if self.session_over {
                log::info!("Session over");
                break;
            }
            if self.run_for.is_some_and(|limit| started.elapsed() >= limit) {
                log::info!("Run time elapsed");
                break;
            }

            let spent = now.elapsed();
            if spent < self.frame_time {
                thread::sleep(self.frame_time - spent);
            }
        }

        let stats = self.client.stats();
        log::info!(
            "Sent {} / received {} packets, {:.1}% lost, rtt {:.0} ms",
            stats.packets_sent,
            stats.packets_received,
            stats.packet_loss_percent(),
            stats.rtt_ms
        );

        Subsystem::dispose(&mut self.client);
    }

    fn frame(&mut self, dt: f32) {
        Subsystem::update(&mut self.client, dt);
        self.handle_events();

        if self.client.state() == ClientState::InGame {
            let direction = self
                .autopilot
                .direction_at(self.client.estimated_server_tick());
            if let Err(e) = self.client.send_input(direction) {
                log::warn!("Failed to send input: {}", e);
            }
        }
    }

    fn handle_events(&mut self) {
        let events: Vec<ClientEvent> = self.client.drain_events().collect();

        for event in events {
            match event {
                ClientEvent::RoomJoined {
                    room_code,
                    player_id,
                } => {
                    log::info!("Joined room {} as player {}, ready", room_code, player_id);
                    if let Err(e) = self.client.ready() {
                        log::warn!("Failed to send ready: {}", e);
                    }
                }
                ClientEvent::RoomUpdated { room_code, players } => {
                    let ready = players.iter().filter(|p| p.ready).count();
                    log::info!("Room {}: {}/{} ready", room_code, ready, players.len());
                }
                ClientEvent::GameEnded { winner_id } => {
                    match winner_id {
                        Some(id) if Some(id) == self.client.player_id() => {
                            log::info!("We won")
                        }
                        Some(id) => log::info!("Player {} won", id),
                        None => log::info!("Game ended without a winner"),
                    }
                    self.session_over = true;
                }
                ClientEvent::ReconnectFailed { reason } => {
                    log::warn!("Reconnect failed: {}", reason);
                }
                ClientEvent::Sync(event) => self.handle_sync_event(event),
                event if event.is_terminal() => {
                    log::info!("Connection closed: {:?}", event);
                    self.session_over = true;
                }
                event => log::debug!("{:?}", event),
            }
        }
    }

    fn handle_sync_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::TerritoryChanged(changes) => {
                let Some(local) = self.client.player_id() else {
                    return;
                };
                if let Some(grid) = self.client.sync().grid() {
                    log::debug!(
                        "{} cells changed, we own {:.1}%",
                        changes.len(),
                        grid.get_ownership_percentage(local)
                    );
                }
            }
            SyncEvent::PlayerEliminated { player_id } => {
                log::info!("Player {} eliminated", player_id);
            }
            SyncEvent::PlayerRespawned { player_id } => {
                log::info!("Player {} respawned", player_id);
            }
            SyncEvent::StateProcessed(snapshot) => {
                log::trace!(
                    "State {} ({:?}, {} players)",
                    snapshot.tick,
                    snapshot.kind,
                    snapshot.players.len()
                );
            }
            event => log::debug!("{:?}", event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ClientConfig;

    #[test]
    fn test_stops_after_run_time() {
        let client = GameClient::new(ClientConfig::default());
        let mut app = App::new(client, Autopilot::new(4), 200, Some(Duration::from_millis(50)));

        let started = Instant::now();
        app.run();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!app.running().load(Ordering::SeqCst));
    }

    #[test]
    fn test_cleared_flag_stops_loop() {
        let client = GameClient::new(ClientConfig::default());
        let mut app = App::new(client, Autopilot::new(4), 200, None);

        app.running().store(false, Ordering::SeqCst);
        app.run();

        assert!(!app.running().load(Ordering::SeqCst));
    }
}
