pub mod actor;
pub mod color;
pub mod interaction;
pub mod population;
pub mod session;
pub mod station;

use std::sync::{
    Arc, Mutex as StdMutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::{Mutex, RwLock, watch};
use tracing::{info, warn};

use crate::{
    bus::{Bus, BusError},
    config::{AppConfig, GameMode},
    error::ServiceError,
    state::{
        population::Population,
        session::{SessionEvent, SessionPhase, SessionStateMachine},
        station::StationDirectory,
    },
};

pub type SharedState = Arc<AppState>;

/// Central application state: configuration, the bus handle, live players and session phase.
pub struct AppState {
    config: Arc<AppConfig>,
    bus: RwLock<Option<Arc<dyn Bus>>>,
    population: Arc<Population>,
    session: StdMutex<SessionStateMachine>,
    phase: watch::Sender<SessionPhase>,
    registered: AtomicBool,
    registration_gate: Mutex<()>,
    http: reqwest::Client,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The session starts disconnected until a bus is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (phase_tx, _rx) = watch::channel(SessionPhase::Disconnected);
        Arc::new(Self {
            config: Arc::new(config),
            bus: RwLock::new(None),
            population: Population::new(),
            session: StdMutex::new(SessionStateMachine::new()),
            phase: phase_tx,
            registered: AtomicBool::new(false),
            registration_gate: Mutex::new(()),
            http: reqwest::Client::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn game_id(&self) -> &str {
        &self.config.game.id
    }

    pub fn mode(&self) -> GameMode {
        self.config.game.mode
    }

    pub fn stations(&self) -> &StationDirectory {
        &self.config.stations
    }

    pub fn population(&self) -> &Arc<Population> {
        &self.population
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Current bus handle, failing when no session is connected.
    pub async fn bus(&self) -> Result<Arc<dyn Bus>, ServiceError> {
        let guard = self.bus.read().await;
        guard
            .as_ref()
            .cloned()
            .ok_or(ServiceError::Bus(BusError::Closed))
    }

    /// Install the bus of a freshly joined session.
    pub async fn install_bus(&self, bus: Arc<dyn Bus>) {
        let mut guard = self.bus.write().await;
        *guard = Some(bus);
    }

    /// Drop the bus handle once the session is over.
    pub async fn clear_bus(&self) {
        let mut guard = self.bus.write().await;
        guard.take();
    }

    /// Snapshot the current session phase.
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Subscribe to session phase updates.
    pub fn phase_watcher(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Feed `event` to the session state machine and broadcast the new phase.
    ///
    /// Rejected events are logged and leave the phase unchanged.
    pub fn apply_session_event(&self, event: SessionEvent) -> Option<SessionPhase> {
        let mut sm = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        match sm.apply(event) {
            Ok(next) => {
                info!(phase = next.as_str(), version = sm.version(), "session phase changed");
                self.phase.send_replace(next);
                Some(next)
            }
            Err(err) => {
                warn!(error = %err, "ignoring session event");
                None
            }
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::Release);
    }

    /// Serializes registration attempts.
    pub fn registration_gate(&self) -> &Mutex<()> {
        &self.registration_gate
    }
}
