//! Republishes player state to observers and remote surfaces.

use std::sync::Arc;
use std::thread::JoinHandle;

use aurora_audio::{PlayerEvent, PlayerHandle};
use aurora_core::{Error, PlaybackSnapshot, Result};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::command::{CommandStatus, RemoteCommand, RemoteCommander};
use crate::now_playing::{NowPlaying, RemoteSurface};

#[derive(Default)]
struct Outlets {
    observers: Vec<Sender<PlaybackSnapshot>>,
    surfaces: Vec<Box<dyn RemoteSurface>>,
}

struct Shared {
    latest: RwLock<PlaybackSnapshot>,
    outlets: Mutex<Outlets>,
}

impl Shared {
    /// Push a snapshot to every outlet, dropping observers that hung up.
    fn republish(&self, snapshot: PlaybackSnapshot) {
        *self.latest.write() = snapshot.clone();
        let now_playing = NowPlaying::from_snapshot(&snapshot);

        let mut outlets = self.outlets.lock();
        outlets
            .observers
            .retain(|observer| observer.send(snapshot.clone()).is_ok());
        for surface in &mut outlets.surfaces {
            if let Err(e) = surface.publish(now_playing.as_ref()) {
                warn!("Remote surface update failed: {e}");
            }
        }
    }
}

/// Consolidated read-only view of playback for UI observers and system
/// remote-control surfaces, plus the inbound command path from them.
pub struct TransportBridge {
    commander: RemoteCommander,
    shared: Arc<Shared>,
    stop_tx: Mutex<Option<Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TransportBridge {
    /// Subscribe to the player and start republishing.
    pub fn start(player: PlayerHandle) -> Result<Self> {
        let events = player.subscribe()?;
        let shared = Arc::new(Shared {
            latest: RwLock::new(player.snapshot()),
            outlets: Mutex::new(Outlets::default()),
        });
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let worker = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("transport-bridge".to_string())
            .spawn(move || run(&worker, &events, &stop_rx))
            .map_err(|e| Error::Internal(format!("Failed to spawn transport bridge: {e}")))?;

        info!("Transport bridge started");
        Ok(Self {
            commander: RemoteCommander::new(player),
            shared,
            stop_tx: Mutex::new(Some(stop_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Receive every snapshot from now on, starting with the current one.
    pub fn observe(&self) -> Receiver<PlaybackSnapshot> {
        let (tx, rx) = unbounded();
        // Hold the outlets lock so no update slips in between.
        let mut outlets = self.shared.outlets.lock();
        let _ = tx.send(self.shared.latest.read().clone());
        outlets.observers.push(tx);
        rx
    }

    /// Attach a system surface and show it the current track right away.
    pub fn attach_surface(&self, mut surface: Box<dyn RemoteSurface>) -> Result<()> {
        let mut outlets = self.shared.outlets.lock();
        let now_playing = NowPlaying::from_snapshot(&self.shared.latest.read());
        surface.publish(now_playing.as_ref())?;
        outlets.surfaces.push(surface);
        Ok(())
    }

    /// Latest republished snapshot.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.shared.latest.read().clone()
    }

    /// Forward a remote command to the player.
    pub fn handle(&self, command: RemoteCommand) -> CommandStatus {
        self.commander.handle(command)
    }

    /// A cloneable command path for surfaces that deliver commands from
    /// their own threads.
    pub fn commander(&self) -> RemoteCommander {
        self.commander.clone()
    }

    /// Stop republishing. Safe to call more than once.
    pub fn shutdown(&self) {
        self.stop_tx.lock().take();
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                warn!("Transport bridge thread panicked");
            }
        }
    }
}

impl Drop for TransportBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: &Shared, events: &Receiver<PlayerEvent>, stop: &Receiver<()>) {
    loop {
        select! {
            recv(events) -> msg => match msg {
                Ok(PlayerEvent::StateChanged(snapshot)) => shared.republish(snapshot),
                Ok(PlayerEvent::Position { elapsed, duration }) => {
                    let mut snapshot = shared.latest.read().clone();
                    snapshot.state.elapsed = elapsed;
                    snapshot.state.duration = duration;
                    shared.republish(snapshot);
                }
                Ok(_) => {}
                Err(_) => {
                    debug!("Player event stream closed");
                    break;
                }
            },
            recv(stop) -> _ => break,
        }
    }
    info!("Transport bridge stopped");
}
