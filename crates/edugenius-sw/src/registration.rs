//! Deployment adoption.
//!
//! A `Registration` owns the installing, waiting and active workers of one
//! application. `update` runs a new deployment through the whole lifecycle:
//! install, skip waiting, activate, claim clients. A failed install leaves
//! the active worker serving.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CacheConfig;
use crate::controller::CacheController;
use crate::fetch::Fetcher;
use crate::request::{Request, Response};
use crate::storage::SharedCacheStorage;
use crate::SwError;

// ==================== Types ====================

/// Unique identifier for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Created, not yet installing.
    #[default]
    Parsed,
    /// Precaching.
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Deleting stale generations.
    Activating,
    /// Active and controlling clients.
    Activated,
    /// Replaced or install failed.
    Redundant,
}

/// One deployed version.
struct ServiceWorker<F: Fetcher> {
    id: ServiceWorkerId,
    state: ServiceWorkerState,
    controller: CacheController<F>,
}

impl<F: Fetcher> ServiceWorker<F> {
    fn new(controller: CacheController<F>) -> Self {
        Self {
            id: ServiceWorkerId::new(),
            state: ServiceWorkerState::Parsed,
            controller,
        }
    }

    fn version(&self) -> &str {
        self.controller.version()
    }

    fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
    }
}

struct Slots<F: Fetcher> {
    installing: Option<ServiceWorker<F>>,
    waiting: Option<ServiceWorker<F>>,
    active: Option<ServiceWorker<F>>,
}

/// Result of [`Registration::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The active worker already runs this configuration.
    Unchanged,
    /// The new version took over.
    Activated {
        version: String,
        /// Stale generations deleted during activation.
        deleted: Vec<String>,
    },
}

/// Registration events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// A new version started installing.
    UpdateFound { version: String },
    /// A worker changed state.
    StateChange {
        worker_id: ServiceWorkerId,
        version: String,
        state: ServiceWorkerState,
    },
    /// A client is now controlled by a different version.
    ControllerChange { client_id: String, version: String },
}

// ==================== Clients ====================

/// An open application instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: String,
    pub url: Url,
    /// Version controlling this client, if any.
    pub controller: Option<String>,
}

/// Open application instances.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// All clients, ordered by ID.
    pub fn match_all(&self) -> Vec<&Client> {
        let mut clients: Vec<&Client> = self.clients.values().collect();
        clients.sort_by(|a, b| a.id.cmp(&b.id));
        clients
    }

    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Put every client under `version`. Returns the IDs whose controller
    /// changed.
    pub fn claim(&mut self, version: &str) -> Vec<String> {
        let mut changed: Vec<String> = self
            .clients
            .values_mut()
            .filter(|c| c.controller.as_deref() != Some(version))
            .map(|c| {
                c.controller = Some(version.to_string());
                c.id.clone()
            })
            .collect();
        changed.sort();
        changed
    }
}

// ==================== Registration ====================

/// Lifecycle owner for one application.
pub struct Registration<F: Fetcher> {
    storage: SharedCacheStorage,
    fetcher: Arc<F>,
    slots: RwLock<Slots<F>>,
    clients: RwLock<Clients>,
    update_lock: Mutex<()>,
    next_client: AtomicU64,
    event_tx: mpsc::UnboundedSender<RegistrationEvent>,
}

impl<F: Fetcher> Registration<F> {
    /// Create a registration with no workers.
    pub fn new(
        storage: SharedCacheStorage,
        fetcher: Arc<F>,
    ) -> (Self, mpsc::UnboundedReceiver<RegistrationEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                storage,
                fetcher,
                slots: RwLock::new(Slots {
                    installing: None,
                    waiting: None,
                    active: None,
                }),
                clients: RwLock::new(Clients::new()),
                update_lock: Mutex::new(()),
                next_client: AtomicU64::new(1),
                event_tx,
            },
            event_rx,
        )
    }

    pub fn storage(&self) -> &SharedCacheStorage {
        &self.storage
    }

    /// Version of the active worker.
    pub async fn active_version(&self) -> Option<String> {
        let slots = self.slots.read().await;
        slots.active.as_ref().map(|w| w.version().to_string())
    }

    /// Controller of the active worker.
    pub async fn active_controller(&self) -> Option<CacheController<F>> {
        let slots = self.slots.read().await;
        slots.active.as_ref().map(|w| w.controller.clone())
    }

    /// Whether a worker is installing or waiting.
    pub async fn has_pending(&self) -> bool {
        let slots = self.slots.read().await;
        slots.installing.is_some() || slots.waiting.is_some()
    }

    /// Adopt a deployment.
    ///
    /// Installs `config` as a new worker and, once installed, activates it
    /// immediately. If installation fails the new worker is discarded and
    /// the error returned; the active worker keeps serving.
    pub async fn update(&self, config: CacheConfig) -> Result<UpdateOutcome, SwError> {
        let _guard = self.update_lock.lock().await;

        if let Some(active) = self.slots.read().await.active.as_ref() {
            if active.controller.config() == &config {
                debug!(version = %config.version, "Deployment unchanged");
                return Ok(UpdateOutcome::Unchanged);
            }
        }

        let controller =
            CacheController::new(config, Arc::clone(&self.storage), Arc::clone(&self.fetcher))?;
        let version = controller.version().to_string();
        let mut worker = ServiceWorker::new(controller.clone());

        self.emit(RegistrationEvent::UpdateFound {
            version: version.clone(),
        });
        worker.set_state(ServiceWorkerState::Installing);
        self.emit_state(&worker);
        self.slots.write().await.installing = Some(worker);

        let installed = controller.install().await;

        let mut slots = self.slots.write().await;
        let Some(mut worker) = slots.installing.take() else {
            return Err(SwError::StateError(format!(
                "installing worker for {} disappeared",
                version
            )));
        };

        if let Err(err) = installed {
            worker.set_state(ServiceWorkerState::Redundant);
            self.emit_state(&worker);
            warn!(version = %version, error = %err, "Update rejected, keeping active worker");
            return Err(err);
        }

        worker.set_state(ServiceWorkerState::Installed);
        self.emit_state(&worker);
        slots.waiting = Some(worker);

        // Skip waiting: take over without waiting for clients to close.
        let deleted = self.activate_waiting(&mut slots).await?;
        drop(slots);

        self.claim().await;

        Ok(UpdateOutcome::Activated { version, deleted })
    }

    async fn activate_waiting(&self, slots: &mut Slots<F>) -> Result<Vec<String>, SwError> {
        let mut worker = slots
            .waiting
            .take()
            .ok_or_else(|| SwError::StateError("no waiting worker".to_string()))?;

        worker.set_state(ServiceWorkerState::Activating);
        self.emit_state(&worker);

        let deleted = match worker.controller.activate().await {
            Ok(deleted) => deleted,
            Err(err) => {
                warn!(version = %worker.version(), error = %err, "Activation failed");
                worker.set_state(ServiceWorkerState::Redundant);
                self.emit_state(&worker);
                return Err(err);
            }
        };

        if let Some(mut old) = slots.active.take() {
            old.set_state(ServiceWorkerState::Redundant);
            self.emit_state(&old);
        }

        worker.set_state(ServiceWorkerState::Activated);
        self.emit_state(&worker);
        info!(version = %worker.version(), "Now controlling");
        slots.active = Some(worker);

        Ok(deleted)
    }

    /// Put every open client under the active version.
    pub async fn claim(&self) {
        let Some(version) = self.active_version().await else {
            return;
        };
        let changed = self.clients.write().await.claim(&version);
        for client_id in changed {
            self.emit(RegistrationEvent::ControllerChange {
                client_id,
                version: version.clone(),
            });
        }
    }

    /// Register an open application instance. It is controlled by the
    /// active version, if there is one.
    pub async fn add_client(&self, url: Url) -> String {
        let id = format!("client-{}", self.next_client.fetch_add(1, Ordering::Relaxed));
        let controller = self.active_version().await;
        self.clients.write().await.add(Client {
            id: id.clone(),
            url,
            controller,
        });
        id
    }

    pub async fn remove_client(&self, id: &str) -> Option<Client> {
        self.clients.write().await.remove(id)
    }

    pub async fn client(&self, id: &str) -> Option<Client> {
        self.clients.read().await.get(id).cloned()
    }

    /// Route a request through the active controller. Without one the
    /// request goes straight to the network.
    pub async fn handle(&self, request: Request) -> Result<Response, SwError> {
        match self.active_controller().await {
            Some(controller) => controller.handle(request).await,
            None => self.fetcher.fetch(&request).await,
        }
    }

    fn emit(&self, event: RegistrationEvent) {
        let _ = self.event_tx.send(event);
    }

    fn emit_state(&self, worker: &ServiceWorker<F>) {
        debug!(
            worker = worker.id.raw(),
            version = %worker.version(),
            state = ?worker.state,
            "Worker state changed"
        );
        self.emit(RegistrationEvent::StateChange {
            worker_id: worker.id,
            version: worker.version().to_string(),
            state: worker.state,
        });
    }
}
