//! Accessory driver
//!
//! The [`Driver`] composes the registry, dispatcher, event bus and scheduler,
//! owns the persisted identity and drives the server lifecycle:
//!
//! ```text
//! CREATED → RUNNING → STOPPING → STOPPED
//! ```
//!
//! [`Driver::start`] blocks the calling thread on the control loop until
//! [`Driver::stop`] is called, from anywhere, including jobs running under
//! the driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use hap_runtime::{Job, Scheduler, Work};
use hap_types::{
    AccessoriesResponse, Aid, Category, Iid, ReadResponse, Value, WriteRequest, WriteResponse,
};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::advertiser::{AdvertisementInfo, Advertiser, NullAdvertiser};
use crate::config::DriverConfig;
use crate::dispatch::Dispatcher;
use crate::error::{DriverError, RegistryError, StateError};
use crate::events::EventBus;
use crate::model::{Accessory, Behaviour, Bridge, Registry, Routine};
use crate::state::{ClientPublicKey, State};
use crate::transport::{ClientAddr, NullTransport, Transport};

// ─────────────────────────────────────────────────────────────────────────────
// Driver State
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriverState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl DriverState {
    /// Convert from u8
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverState::Created => write!(f, "created"),
            DriverState::Running => write!(f, "running"),
            DriverState::Stopping => write!(f, "stopping"),
            DriverState::Stopped => write!(f, "stopped"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a [`Driver`]
pub struct DriverBuilder {
    config: DriverConfig,
    transport: Option<Arc<dyn Transport>>,
    advertiser: Option<Arc<dyn Advertiser>>,
    state: Option<State>,
}

impl DriverBuilder {
    /// Use a network transport; defaults to [`NullTransport`]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use an externally managed advertiser
    ///
    /// The driver advertises and withdraws through it but never closes it.
    pub fn with_advertiser(mut self, advertiser: Arc<dyn Advertiser>) -> Self {
        self.advertiser = Some(advertiser);
        self
    }

    /// Use an identity instead of loading or generating one
    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    pub fn build(self) -> Result<Driver, DriverError> {
        self.config.validate()?;

        let state = match self.state {
            Some(state) => state,
            None => bootstrap_state(&self.config)?,
        };
        let scheduler = Scheduler::new(self.config.scheduler())?;

        let transport = self.transport.unwrap_or_else(|| Arc::new(NullTransport));
        let owns_advertiser = self.advertiser.is_none();
        let advertiser = self.advertiser.unwrap_or_else(|| Arc::new(NullAdvertiser));

        let registry = Arc::new(RwLock::new(Registry::new()));
        let events = EventBus::new(transport.clone());
        let dispatcher = Dispatcher::new(registry.clone(), events.clone());

        tracing::debug!(mac = %state.mac, paired = state.is_paired(), "Driver created");

        Ok(Driver {
            inner: Arc::new(DriverInner {
                config: self.config,
                state: RwLock::new(state),
                registry,
                dispatcher,
                events,
                scheduler,
                transport,
                advertiser,
                owns_advertiser,
                lifecycle: AtomicU8::new(DriverState::Created as u8),
                routines_live: AtomicBool::new(false),
            }),
        })
    }
}

/// Load the persisted identity, or generate and persist a new one
fn bootstrap_state(config: &DriverConfig) -> Result<State, StateError> {
    let path = &config.persist_file;
    if path.exists() {
        tracing::info!(path = %path.display(), "Loading accessory state");
        return State::load(path);
    }

    let mut state = State::generate();
    if let Some(mac) = &config.mac {
        state = state.with_mac(mac.clone());
    }
    if let Some(pincode) = &config.pincode {
        state = state.with_pincode(pincode.clone());
    }
    state.save(path)?;
    tracing::info!(path = %path.display(), mac = %state.mac, "Generated new accessory identity");
    Ok(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

/// Accessory server driver
///
/// Cheap to clone; clones share the same server.
#[derive(Clone)]
pub struct Driver {
    inner: Arc<DriverInner>,
}

struct DriverInner {
    config: DriverConfig,
    state: RwLock<State>,
    registry: Arc<RwLock<Registry>>,
    dispatcher: Dispatcher,
    events: EventBus,
    scheduler: Scheduler,
    transport: Arc<dyn Transport>,
    advertiser: Arc<dyn Advertiser>,
    /// Whether the advertiser's lifecycle is managed here
    owns_advertiser: bool,
    lifecycle: AtomicU8,
    /// Set under the registry write lock once startup has scheduled the
    /// registered routines; later registrations schedule their own
    routines_live: AtomicBool,
}

impl Driver {
    pub fn builder(config: DriverConfig) -> DriverBuilder {
        DriverBuilder {
            config,
            transport: None,
            advertiser: None,
            state: None,
        }
    }

    /// Build a driver with the default collaborators
    pub fn new(config: DriverConfig) -> Result<Self, DriverError> {
        Self::builder(config).build()
    }

    pub fn state(&self) -> DriverState {
        DriverState::from_u8(self.inner.lifecycle.load(Ordering::SeqCst))
    }

    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    fn set_state(&self, state: DriverState) {
        self.inner.lifecycle.store(state as u8, Ordering::SeqCst);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registry
    // ─────────────────────────────────────────────────────────────────────────

    /// Register an accessory
    ///
    /// The first accessory becomes the root and takes the standalone aid;
    /// later ones are bridged behind a root bridge and receive allocated
    /// aids. A rejected accessory leaves the registry unchanged.
    pub fn add_accessory(&self, accessory: Accessory) -> Result<Aid, RegistryError> {
        let routines = accessory.routines().to_vec();
        let name = accessory.display_name().to_string();
        let (aid, live) = {
            let mut registry = self.inner.registry.write();
            let aid = registry.add_accessory(accessory)?;
            (aid, self.inner.routines_live.load(Ordering::SeqCst))
        };
        tracing::info!(aid, name = %name, "Accessory added");

        if live {
            for routine in &routines {
                self.schedule_routine(aid, routine);
            }
        }
        Ok(aid)
    }

    /// Register a bridge as the root accessory
    pub fn add_bridge(&self, bridge: Bridge) -> Result<Aid, RegistryError> {
        let (aid, routines) = {
            let mut registry = self.inner.registry.write();
            let aid = registry.add_bridge(bridge)?;
            let live = self.inner.routines_live.load(Ordering::SeqCst);
            (aid, if live { registry.routines() } else { Vec::new() })
        };
        tracing::info!(aid, "Bridge added");

        for (aid, routine) in &routines {
            self.schedule_routine(*aid, routine);
        }
        Ok(aid)
    }

    /// Mark an accessory reachable or unreachable
    pub fn set_available(&self, aid: Aid, available: bool) -> Result<(), RegistryError> {
        self.inner.registry.write().set_available(aid, available)?;
        tracing::info!(aid, available, "Accessory availability changed");
        Ok(())
    }

    /// The accessory database served to controllers
    pub fn accessories(&self) -> AccessoriesResponse {
        self.inner.registry.read().to_repr()
    }

    /// Stored value of a characteristic
    pub fn value(&self, aid: Aid, iid: Iid) -> Option<Value> {
        self.inner
            .registry
            .read()
            .characteristic(aid, iid)
            .map(|c| c.value().clone())
    }

    /// Publish a value produced by accessory code to every subscriber
    pub fn update_value(&self, aid: Aid, iid: Iid, value: impl Into<Value>) -> Result<Value, RegistryError> {
        self.inner.dispatcher.update_value(aid, iid, value.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Requests
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_characteristics(&self, request: WriteRequest, origin: Option<ClientAddr>) -> WriteResponse {
        self.inner.dispatcher.set_characteristics(request, origin)
    }

    pub fn get_characteristics<K: AsRef<str>>(&self, keys: &[K]) -> ReadResponse {
        self.inner.dispatcher.get_characteristics(keys)
    }

    pub fn subscribe(&self, topic: &str, client: ClientAddr) {
        self.inner.events.subscribe(topic, client);
    }

    pub fn unsubscribe(&self, topic: &str, client: ClientAddr) {
        self.inner.events.unsubscribe(topic, client);
    }

    /// Forget a disconnected client's subscriptions
    pub fn client_disconnected(&self, client: ClientAddr) {
        self.inner.events.remove_client(client);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Jobs
    // ─────────────────────────────────────────────────────────────────────────

    /// Submit a job from any thread
    pub fn add_job(&self, job: Job) -> Result<(), DriverError> {
        Ok(self.inner.scheduler.add_job(job)?)
    }

    fn schedule_routine(&self, aid: Aid, routine: &Routine) {
        let name = format!("{aid}:{}", routine.name);
        let work = match &routine.behaviour {
            Behaviour::Blocking(f) => {
                let (f, driver) = (f.clone(), self.clone());
                Work::blocking(move || f(&driver, aid))
            }
            Behaviour::Cooperative(f) => {
                let (f, driver) = (f.clone(), self.clone());
                Work::cooperative(move || f(driver.clone(), aid))
            }
        };
        let job = match routine.interval {
            Some(interval) => Job::every(name, interval, work),
            None => Job::once(name, work),
        };

        if let Err(e) = self.inner.scheduler.add_job(job) {
            tracing::warn!(aid, routine = %routine.name, error = %e, "Failed to schedule routine");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identity & Pairing
    // ─────────────────────────────────────────────────────────────────────────

    /// Snapshot of the persisted identity
    pub fn identity(&self) -> State {
        self.inner.state.read().clone()
    }

    /// Save the identity to the configured state file
    ///
    /// Saves are serialized with identity changes, so the file always holds
    /// the latest state.
    pub fn persist(&self) -> Result<(), StateError> {
        self.inner.state.write().save(&self.inner.config.persist_file)
    }

    /// Replace the identity with the one in the configured state file
    pub fn load(&self) -> Result<(), StateError> {
        let state = State::load(&self.inner.config.persist_file)?;
        *self.inner.state.write() = state;
        Ok(())
    }

    /// Record a paired controller
    pub fn pair(&self, client_id: Uuid, public_key: ClientPublicKey) -> Result<(), DriverError> {
        {
            let mut state = self.inner.state.write();
            state.add_paired_client(client_id, public_key);
            state.save(&self.inner.config.persist_file)?;
        }
        tracing::info!(client = %client_id, "Controller paired");
        self.refresh_advertisement();
        Ok(())
    }

    /// Remove a paired controller; returns whether it was known
    pub fn unpair(&self, client_id: &Uuid) -> Result<bool, DriverError> {
        let removed = {
            let mut state = self.inner.state.write();
            let removed = state.remove_paired_client(client_id);
            if removed {
                state.save(&self.inner.config.persist_file)?;
            }
            removed
        };
        if removed {
            tracing::info!(client = %client_id, "Controller unpaired");
            self.refresh_advertisement();
        }
        Ok(removed)
    }

    /// Record that the accessory database changed
    pub fn config_changed(&self) -> Result<(), DriverError> {
        let version = {
            let mut state = self.inner.state.write();
            state.config_version = state.config_version.wrapping_add(1).max(1);
            state.save(&self.inner.config.persist_file)?;
            state.config_version
        };
        tracing::info!(config_version = version, "Configuration changed");
        self.refresh_advertisement();
        Ok(())
    }

    /// Current announcement
    pub fn advertisement(&self) -> AdvertisementInfo {
        AdvertisementInfo::new(&self.inner.config, &self.inner.state.read(), self.category())
    }

    /// Category of the root accessory, or the configured one
    fn category(&self) -> Category {
        self.inner
            .registry
            .read()
            .category()
            .unwrap_or(self.inner.config.category)
    }

    fn refresh_advertisement(&self) {
        if self.state() != DriverState::Running {
            return;
        }
        let info = self.advertisement();
        let advertiser = self.inner.advertiser.clone();
        let update = async move {
            if let Err(e) = advertiser.update(&info).await {
                tracing::warn!(error = %e, "Failed to update advertisement");
            }
        };
        if let Err(e) = self.inner.scheduler.spawn(update) {
            tracing::warn!(error = %e, "Failed to schedule advertisement update");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Run the server on the calling thread until stopped
    ///
    /// Returns once the stop sequence has completed and the control loop is
    /// halted. Must not be called from inside an async runtime.
    pub fn start(&self) -> Result<(), DriverError> {
        if let Err(current) = self.inner.lifecycle.compare_exchange(
            DriverState::Created as u8,
            DriverState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return Err(DriverError::InvalidState(DriverState::from_u8(current)));
        }

        let result = self.inner.scheduler.run(self.clone().serve());
        self.set_state(DriverState::Stopped);

        match result {
            Ok(outcome) => outcome,
            Err(e) => Err(e.into()),
        }
    }

    /// Request the driver to stop
    ///
    /// Idempotent and non-blocking; safe to call from jobs on the control
    /// loop, from worker threads and from outside. A driver that was never
    /// started is stopped immediately.
    pub fn stop(&self) {
        let created = self.inner.lifecycle.compare_exchange(
            DriverState::Created as u8,
            DriverState::Stopped as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        match created {
            Ok(_) => {
                self.inner.scheduler.halt();
                tracing::info!("Driver stopped before start");
            }
            Err(_) => self.inner.scheduler.request_stop(),
        }
    }

    /// Body of the control loop
    async fn serve(self) -> Result<(), DriverError> {
        let inner = &self.inner;
        let info = self.advertisement();

        {
            let state = inner.state.read();
            if !state.is_paired() {
                tracing::info!(
                    pincode = %state.pincode,
                    setup_uri = %state.setup_uri(self.category()),
                    "Accessory is not paired"
                );
            }
        }

        inner.advertiser.advertise(&info).await.map_err(DriverError::Advertiser)?;
        if let Err(e) = inner.transport.start().await {
            tracing::error!(error = %e, "Transport failed to start");
            self.withdraw(&info).await;
            return Err(DriverError::Transport(e));
        }

        let events = inner.events.clone();
        let stop = inner.scheduler.stop_handle();
        if let Err(e) = inner.scheduler.spawn(async move { events.pump(stop).await }) {
            self.withdraw(&info).await;
            if let Err(e) = inner.transport.stop().await {
                tracing::warn!(error = %e, "Failed to stop transport");
            }
            return Err(e.into());
        }

        let routines = {
            let registry = inner.registry.write();
            inner.routines_live.store(true, Ordering::SeqCst);
            registry.routines()
        };
        for (aid, routine) in &routines {
            self.schedule_routine(*aid, routine);
        }

        tracing::info!(
            name = %inner.config.name,
            port = inner.config.port,
            routines = routines.len(),
            "Driver started"
        );

        inner.scheduler.stopped().await;
        self.set_state(DriverState::Stopping);
        tracing::info!("Stopping driver");

        self.withdraw(&info).await;

        inner.scheduler.join().await;
        let flushed = inner.events.send_events();
        tracing::debug!(flushed, "Event queue drained");

        if let Err(e) = inner.transport.stop().await {
            tracing::warn!(error = %e, "Failed to stop transport");
        }

        tracing::info!("Driver stopped");
        Ok(())
    }

    /// Stop announcing; closes the advertiser only if it was created here
    async fn withdraw(&self, info: &AdvertisementInfo) {
        let advertiser = &self.inner.advertiser;
        if let Err(e) = advertiser.withdraw(info).await {
            tracing::warn!(error = %e, "Failed to withdraw advertisement");
        }
        if self.inner.owns_advertiser {
            if let Err(e) = advertiser.close().await {
                tracing::warn!(error = %e, "Failed to close advertiser");
            }
        }
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("name", &self.inner.config.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
