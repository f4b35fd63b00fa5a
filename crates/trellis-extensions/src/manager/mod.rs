//! The extension manager: discovery, lifecycle, and cross-process
//! synchronization.
//!
//! The manager owns the provider registry, the live instance table, and the
//! derived state (middleware chain, URL mounts, shared list settings). All
//! mutation happens under one internal lock, so concurrent `load` calls
//! from multiple threads queue rather than interleave. Durable state lives
//! behind the [`RegistrationStore`] and every write that changes it bumps
//! the shared generation counter, making the change observable to other
//! processes without polling.
//!
//! Failure isolation is a first-class goal: one broken extension must not
//! prevent any other extension (or the host) from loading. Bulk `load`
//! converts per-extension failures into retained load errors; explicit
//! `enable_extension`/`disable_extension` calls propagate their failure to
//! the caller after rolling back.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info, warn};

use trellis_config::{Config, MediaPathsError};

use crate::error::ExtensionError;
use crate::manifest::{ExtensionManifest, VersionRelation, version_relation};
use crate::media::{MediaInstallOutcome, MediaInstaller};
use crate::middleware::effective_middleware;
use crate::provider::{Extension, ExtensionProvider, ProviderRegistry};
use crate::router::{DynamicRouter, MountKind};
use crate::settings::{ExtensionSettings, SettingListWrapper};
use crate::signals::{ExtensionEvent, SignalHub};
use crate::store::{
    MemoryCache, MemoryRegistrationStore, RegistrationStore, SchemaEvolver, SharedCache,
};
use crate::sync::GenerationSynchronizer;

/// Tracing target for manager operations.
const MANAGER_TARGET: &str = "trellis_extensions::manager";

/// A live extension instance plus its loaded settings.
struct LiveExtension {
    extension: Box<dyn Extension>,
    settings: ExtensionSettings,
}

/// Process-local mutable state, guarded by the manager's lock.
struct ManagerState {
    registry: ProviderRegistry,
    /// Manifests of currently discoverable, loadable extensions.
    manifests: HashMap<String, ExtensionManifest>,
    /// Discovery order of the manifest table.
    scan_order: Vec<String>,
    /// Live instances, keyed by extension id.
    instances: HashMap<String, LiveExtension>,
    /// Enable order of live instances.
    enabled_order: Vec<String>,
    /// Retained per-extension failure diagnostics.
    load_errors: HashMap<String, String>,
    /// Ids whose retained diagnostic came from the bulk load path; a clean
    /// rescan clears these, while explicit-enable diagnostics persist.
    scan_failures: HashSet<String>,
    /// Events queued under the lock; dispatched once it is released.
    pending_events: Vec<ExtensionEvent>,
    /// Effective middleware chain, recomputed on enabled-set changes.
    middleware: Vec<String>,
    /// Static pipeline registrations: extension id to namespaced outputs.
    pipeline: HashMap<String, Vec<String>>,
    installed_apps: SettingListWrapper,
    context_processors: SettingListWrapper,
    router: DynamicRouter,
    synchronizer: GenerationSynchronizer,
}

/// Builder assembling an [`ExtensionManager`] from its collaborators.
///
/// Collaborators default to the in-memory backends, so tests and
/// single-process hosts construct a manager from a bare [`Config`].
pub struct ExtensionManagerBuilder {
    config: Config,
    store: Arc<dyn RegistrationStore>,
    cache: Arc<dyn SharedCache>,
    evolver: Option<Arc<dyn SchemaEvolver>>,
    installer: Option<MediaInstaller>,
    installed_apps: Vec<String>,
    context_processors: Vec<String>,
}

impl std::fmt::Debug for ExtensionManagerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionManagerBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExtensionManagerBuilder {
    /// Starts a builder over the given host configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: Arc::new(MemoryRegistrationStore::new()),
            cache: Arc::new(MemoryCache::new()),
            evolver: None,
            installer: None,
            installed_apps: Vec::new(),
            context_processors: Vec::new(),
        }
    }

    /// Uses the given durable registration store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RegistrationStore>) -> Self {
        self.store = store;
        self
    }

    /// Uses the given shared cache backend.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn SharedCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Attaches a schema evolver; without one, migration is skipped with a
    /// warning.
    #[must_use]
    pub fn with_evolver(mut self, evolver: Arc<dyn SchemaEvolver>) -> Self {
        self.evolver = Some(evolver);
        self
    }

    /// Overrides the media installer (tests shorten its retry schedule).
    #[must_use]
    pub fn with_installer(mut self, installer: MediaInstaller) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Seeds the host's pre-existing installed-apps list.
    #[must_use]
    pub fn with_installed_apps(mut self, apps: Vec<String>) -> Self {
        self.installed_apps = apps;
        self
    }

    /// Seeds the host's pre-existing context-processor list.
    #[must_use]
    pub fn with_context_processors(mut self, processors: Vec<String>) -> Self {
        self.context_processors = processors;
        self
    }

    /// Builds the manager.
    ///
    /// # Errors
    ///
    /// Returns a [`MediaPathsError`] when media management is enabled but
    /// the media directories cannot be prepared.
    pub fn build(self) -> Result<ExtensionManager, MediaPathsError> {
        let installer = match self.installer {
            Some(installer) => installer,
            None => MediaInstaller::from_config(&self.config)?,
        };
        let sync_key = format!("{}:extension-gen", self.config.cache_key_prefix());
        let synchronizer = GenerationSynchronizer::new(Arc::clone(&self.cache), sync_key);
        Ok(ExtensionManager {
            config: self.config,
            store: self.store,
            evolver: self.evolver,
            installer,
            hub: SignalHub::new(),
            state: Mutex::new(ManagerState {
                registry: ProviderRegistry::new(),
                manifests: HashMap::new(),
                scan_order: Vec::new(),
                instances: HashMap::new(),
                enabled_order: Vec::new(),
                load_errors: HashMap::new(),
                scan_failures: HashSet::new(),
                pending_events: Vec::new(),
                middleware: Vec::new(),
                pipeline: HashMap::new(),
                installed_apps: SettingListWrapper::new("installed apps", self.installed_apps),
                context_processors: SettingListWrapper::new(
                    "context processors",
                    self.context_processors,
                ),
                router: DynamicRouter::new(),
                synchronizer,
            }),
        })
    }
}

/// Orchestrates extension discovery, lifecycle, and synchronization for one
/// process.
pub struct ExtensionManager {
    config: Config,
    store: Arc<dyn RegistrationStore>,
    evolver: Option<Arc<dyn SchemaEvolver>>,
    installer: MediaInstaller,
    hub: SignalHub,
    state: Mutex<ManagerState>,
}

impl std::fmt::Debug for ExtensionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExtensionManager {
    /// Returns the lifecycle signal hub.
    #[must_use]
    pub const fn signals(&self) -> &SignalHub {
        &self.hub
    }

    /// Registers an extension provider; it becomes loadable on the next
    /// [`ExtensionManager::load`].
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Manifest`] for duplicate provider ids.
    pub fn register_provider(
        &self,
        provider: Arc<dyn ExtensionProvider>,
    ) -> Result<(), ExtensionError> {
        let mut state = self.lock_state();
        state.registry.register(provider)
    }

    /// Removes a provider; the extension is forgotten on the next
    /// [`ExtensionManager::load`].
    pub fn unregister_provider(&self, id: &str) -> Option<Arc<dyn ExtensionProvider>> {
        let mut state = self.lock_state();
        state.registry.unregister(id)
    }

    /// Re-scans providers and reconciles in-memory state against durable
    /// registrations.
    ///
    /// Per-extension failures are retained as load errors rather than
    /// aborting the scan. With `full_reload`, all in-process state is torn
    /// down and rebuilt first. The local generation cache is refreshed —
    /// never bumped — so a reload does not cascade to other processes.
    ///
    /// # Errors
    ///
    /// Individual extension failures never surface here; an error is only
    /// returned for systemic storage failures while saving a newly created
    /// registration record.
    pub fn load(&self, full_reload: bool) -> Result<(), ExtensionError> {
        let mut guard = self.lock_state();
        let state = &mut *guard;

        if full_reload {
            let ids: Vec<String> = state.enabled_order.iter().rev().cloned().collect();
            for id in ids {
                self.uninit_extension(state, &id);
            }
            state.manifests.clear();
            state.scan_order.clear();
        }

        self.scan_providers(state);
        let result = self.reconcile_registrations(state);
        if result.is_ok() {
            self.forget_undiscoverable(state);
            self.start_registered_enabled(state);

            state.middleware = effective_middleware(&state.enabled_order, &state.manifests);
            state.synchronizer.refresh();
        }

        let events = std::mem::take(&mut state.pending_events);
        drop(guard);
        self.dispatch_events(&events);
        result
    }

    /// Enables an extension, recursively enabling its requirements first.
    ///
    /// A no-op when already enabled. On success the durable record is
    /// enabled, the shared generation is bumped, the middleware chain is
    /// recalculated, and an [`ExtensionEvent::Enabled`] notification fires.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::InvalidExtension`] for unknown ids and
    /// [`ExtensionError::Enabling`] when a requirement cycle is detected or
    /// any initialization step fails; partially initialized state is rolled
    /// back before the error is returned.
    pub fn enable_extension(&self, id: &str) -> Result<(), ExtensionError> {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        let mut visiting = Vec::new();
        let result = self.enable_inner(state, id, &mut visiting);

        let events = std::mem::take(&mut state.pending_events);
        drop(guard);
        self.dispatch_events(&events);
        result
    }

    /// Disables an extension, disabling its enabled dependents first.
    ///
    /// A no-op when not enabled. On success installed media is removed, the
    /// durable record is disabled, the shared generation is bumped, the
    /// middleware chain is recalculated, and an
    /// [`ExtensionEvent::Disabled`] notification fires.
    ///
    /// An id that is no longer discoverable but still has a durable record
    /// is handled through that record alone, so an administrator can retire
    /// an extension whose package was removed.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::InvalidExtension`] for ids with neither a
    /// manifest nor a durable record, [`ExtensionError::Storage`] when the
    /// record cannot be read, and [`ExtensionError::Disabling`] when it
    /// cannot be updated.
    pub fn disable_extension(&self, id: &str) -> Result<(), ExtensionError> {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        let result = if state.manifests.contains_key(id) {
            self.disable_inner(state, id)
        } else {
            self.disable_orphaned_record(state, id)
        };

        let events = std::mem::take(&mut state.pending_events);
        drop(guard);
        self.dispatch_events(&events);
        result
    }

    /// Whether this process's extension state is stale relative to other
    /// processes. Host middleware checks this per request and calls
    /// [`ExtensionManager::load`] with `full_reload` when it reports true.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.lock_state().synchronizer.is_expired()
    }

    /// Clears the shared generation entry, forcing every process to treat
    /// its state as stale.
    pub fn clear_sync_cache(&self) {
        self.lock_state().synchronizer.clear();
    }

    /// Ids of currently enabled extensions, in enable order.
    #[must_use]
    pub fn enabled_extension_ids(&self) -> Vec<String> {
        self.lock_state().enabled_order.clone()
    }

    /// Whether the given extension is enabled in this process.
    #[must_use]
    pub fn is_extension_enabled(&self, id: &str) -> bool {
        self.lock_state().instances.contains_key(id)
    }

    /// Ids of all discoverable extensions, in discovery order.
    #[must_use]
    pub fn installed_extension_ids(&self) -> Vec<String> {
        self.lock_state().scan_order.clone()
    }

    /// Retained per-extension failure diagnostics from discovery and
    /// enabling.
    #[must_use]
    pub fn load_errors(&self) -> HashMap<String, String> {
        self.lock_state().load_errors.clone()
    }

    /// The effective middleware chain for the current enabled set.
    #[must_use]
    pub fn middleware(&self) -> Vec<String> {
        self.lock_state().middleware.clone()
    }

    /// Current contents of the installed-apps list.
    #[must_use]
    pub fn installed_apps(&self) -> Vec<String> {
        self.lock_state().installed_apps.items().to_vec()
    }

    /// Current contents of the context-processor list.
    #[must_use]
    pub fn context_processors(&self) -> Vec<String> {
        self.lock_state().context_processors.items().to_vec()
    }

    /// Registered static-pipeline outputs for an extension, namespaced by
    /// its id.
    #[must_use]
    pub fn pipeline_outputs(&self, id: &str) -> Vec<String> {
        self.lock_state()
            .pipeline
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// URL prefixes currently mounted for an extension.
    #[must_use]
    pub fn mounted_prefixes(&self, id: &str) -> Vec<String> {
        self.lock_state()
            .router
            .mounts_for(id)
            .into_iter()
            .map(|mount| mount.prefix().to_owned())
            .collect()
    }

    /// Loads the settings view for an extension.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Storage`] when the store fails.
    pub fn extension_settings(&self, id: &str) -> Result<ExtensionSettings, ExtensionError> {
        let state = self.lock_state();
        if let Some(live) = state.instances.get(id) {
            return Ok(live.settings.clone());
        }
        drop(state);
        let registration = self.store.get_or_create(id)?;
        Ok(ExtensionSettings::from_registration(&registration))
    }

    /// Persists an extension's settings, bumps the shared generation, and
    /// emits [`ExtensionEvent::SettingsSaved`].
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Storage`] when the store fails.
    pub fn save_extension_settings(
        &self,
        settings: &ExtensionSettings,
    ) -> Result<(), ExtensionError> {
        settings.save(self.store.as_ref())?;
        let mut state = self.lock_state();
        if let Some(live) = state.instances.get_mut(settings.extension_id()) {
            live.settings = settings.clone();
        }
        state.synchronizer.mark_updated();
        drop(state);
        self.hub.emit(&ExtensionEvent::SettingsSaved {
            id: settings.extension_id().to_owned(),
        });
        Ok(())
    }

    /// Installs static media for one extension, optionally bypassing the
    /// version stamp.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::InvalidExtension`] for unknown ids and
    /// [`ExtensionError::InstallMedia`] when installation fails.
    pub fn install_extension_media(
        &self,
        id: &str,
        force: bool,
    ) -> Result<MediaInstallOutcome, ExtensionError> {
        let state = self.lock_state();
        let manifest = state
            .manifests
            .get(id)
            .cloned()
            .ok_or_else(|| ExtensionError::InvalidExtension { id: id.to_owned() })?;
        let media_source = state.registry.get(id).and_then(|p| p.media_source());
        drop(state);

        let Some(tree) = media_source else {
            return Ok(MediaInstallOutcome::UpToDate);
        };
        self.installer.install(&manifest, &tree, force)
    }

    /// Installs static media for every enabled extension, collecting the
    /// outcome per id. Failures are collected rather than short-circuiting
    /// so one extension's bad permissions do not hide the rest.
    #[must_use]
    pub fn install_all_media(
        &self,
        force: bool,
    ) -> Vec<(String, Result<MediaInstallOutcome, ExtensionError>)> {
        let ids = self.enabled_extension_ids();
        ids.into_iter()
            .map(|id| {
                let result = self.install_extension_media(&id, force);
                (id, result)
            })
            .collect()
    }

    /// Tears down all live instances without touching durable state or
    /// installed media, for process shutdown. Other workers keep serving
    /// the shared media tree.
    pub fn shutdown(&self) {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        let ids: Vec<String> = state.enabled_order.iter().rev().cloned().collect();
        for id in ids {
            self.uninit_extension(state, &id);
        }
        state.middleware.clear();

        let events = std::mem::take(&mut state.pending_events);
        drop(guard);
        self.dispatch_events(&events);
    }

    // -- internals ---------------------------------------------------------

    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scans every registered provider, isolating per-provider failures as
    /// load errors.
    fn scan_providers(&self, state: &mut ManagerState) {
        let mut manifests = HashMap::new();
        let mut scan_order = Vec::new();
        for provider in state.registry.iter() {
            let id = provider.id().to_owned();
            match provider.manifest().and_then(|manifest| {
                manifest.validate()?;
                Ok(manifest)
            }) {
                Ok(manifest) => {
                    // A clean rescan resolves an earlier bulk-load failure.
                    if state.scan_failures.remove(&id) {
                        state.load_errors.remove(&id);
                    }
                    scan_order.push(id);
                    manifests.insert(manifest.id().to_owned(), manifest);
                }
                Err(error) => {
                    error!(
                        target: MANAGER_TARGET,
                        extension = %id,
                        error = %error,
                        "failed to load extension manifest"
                    );
                    state.scan_failures.insert(id.clone());
                    state.load_errors.insert(id, error.to_string());
                }
            }
        }
        state.manifests = manifests;
        state.scan_order = scan_order;
    }

    /// Creates registration records for newly discovered extensions,
    /// honouring the default-enabled allow-list.
    fn reconcile_registrations(&self, state: &mut ManagerState) -> Result<(), ExtensionError> {
        for id in &state.scan_order {
            match self.store.get(id) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    let mut registration = self.store.get_or_create(id)?;
                    if self.config.default_enabled().iter().any(|d| d == id) {
                        registration.set_enabled(true);
                    }
                    self.store.save(&registration)?;
                }
                Err(storage_error) => {
                    warn!(
                        target: MANAGER_TARGET,
                        extension = %id,
                        error = %storage_error,
                        "failed to reconcile extension registration"
                    );
                    state.scan_failures.insert(id.clone());
                    state
                        .load_errors
                        .insert(id.clone(), storage_error.to_string());
                }
            }
        }
        Ok(())
    }

    /// Tears down instances whose providers vanished since the last scan.
    fn forget_undiscoverable(&self, state: &mut ManagerState) {
        let gone: Vec<String> = state
            .enabled_order
            .iter()
            .filter(|id| !state.manifests.contains_key(*id))
            .cloned()
            .collect();
        for id in gone {
            info!(
                target: MANAGER_TARGET,
                extension = %id,
                "extension no longer discoverable; shutting it down"
            );
            self.uninit_extension(state, &id);
        }
    }

    /// Initializes every registered-enabled extension not yet running,
    /// catching and retaining initialization failures.
    fn start_registered_enabled(&self, state: &mut ManagerState) {
        for id in state.scan_order.clone() {
            if state.instances.contains_key(&id) {
                continue;
            }
            let enabled = match self.store.get(&id) {
                Ok(Some(registration)) => registration.enabled(),
                Ok(None) => false,
                Err(storage_error) => {
                    state.scan_failures.insert(id.clone());
                    state.load_errors.insert(id.clone(), storage_error.to_string());
                    continue;
                }
            };
            if !enabled {
                continue;
            }
            if let Err(init_error) = self.init_extension(state, &id) {
                error!(
                    target: MANAGER_TARGET,
                    extension = %id,
                    error = %init_error,
                    "failed to initialize registered-enabled extension"
                );
                state.scan_failures.insert(id.clone());
                state.load_errors.insert(id, enabling_diagnostic(&init_error));
            }
        }
    }

    /// Recursive enable walk: requirements first, with cycle rejection.
    fn enable_inner(
        &self,
        state: &mut ManagerState,
        id: &str,
        visiting: &mut Vec<String>,
    ) -> Result<(), ExtensionError> {
        if state.instances.contains_key(id) {
            return Ok(());
        }
        let manifest = state
            .manifests
            .get(id)
            .cloned()
            .ok_or_else(|| ExtensionError::InvalidExtension { id: id.to_owned() })?;

        if visiting.iter().any(|v| v == id) {
            let chain = format!("{} -> {id}", visiting.join(" -> "));
            return Err(ExtensionError::enabling(
                id,
                format!("requirement cycle detected: {chain}"),
            ));
        }
        visiting.push(id.to_owned());
        for requirement in manifest.requirements() {
            if !state.manifests.contains_key(requirement) {
                visiting.pop();
                return Err(ExtensionError::enabling(
                    id,
                    format!("requires unknown extension '{requirement}'"),
                ));
            }
            if let Err(requirement_error) = self.enable_inner(state, requirement, visiting) {
                visiting.pop();
                return Err(requirement_error);
            }
        }
        visiting.pop();

        // Mark the durable record enabled before initializing; a failure
        // below rolls this back so other processes never start a broken
        // extension.
        let mut registration = self.store.get_or_create(id)?;
        registration.set_enabled(true);
        self.store.save(&registration)?;

        if let Err(init_error) = self.init_extension(state, id) {
            registration.set_enabled(false);
            if let Err(rollback_error) = self.store.save(&registration) {
                warn!(
                    target: MANAGER_TARGET,
                    extension = %id,
                    error = %rollback_error,
                    "failed to roll back enabled flag"
                );
            }
            state
                .load_errors
                .insert(id.to_owned(), enabling_diagnostic(&init_error));
            return Err(init_error);
        }

        state.synchronizer.mark_updated();
        state.middleware = effective_middleware(&state.enabled_order, &state.manifests);
        info!(target: MANAGER_TARGET, extension = %id, "extension enabled");
        state
            .pending_events
            .push(ExtensionEvent::Enabled { id: id.to_owned() });
        Ok(())
    }

    /// Recursive disable walk: dependents first.
    fn disable_inner(&self, state: &mut ManagerState, id: &str) -> Result<(), ExtensionError> {
        let dependents: Vec<String> = state
            .enabled_order
            .iter()
            .filter(|other| {
                state
                    .manifests
                    .get(*other)
                    .is_some_and(|m| m.requirements().iter().any(|r| r == id))
            })
            .cloned()
            .collect();
        for dependent in dependents {
            self.disable_inner(state, &dependent)?;
        }

        let was_running = state.instances.contains_key(id);
        if was_running {
            self.uninit_extension(state, id);
        }

        let mut registration = self.store.get_or_create(id)?;
        let was_registered_enabled = registration.enabled();
        if !was_running && !was_registered_enabled {
            return Ok(());
        }
        registration.set_enabled(false);
        self.store
            .save(&registration)
            .map_err(|save_error| ExtensionError::Disabling {
                id: id.to_owned(),
                message: save_error.to_string(),
            })?;
        self.remove_installed_media(id);

        state.synchronizer.mark_updated();
        state.middleware = effective_middleware(&state.enabled_order, &state.manifests);
        info!(target: MANAGER_TARGET, extension = %id, "extension disabled");
        state
            .pending_events
            .push(ExtensionEvent::Disabled { id: id.to_owned() });
        Ok(())
    }

    /// Disables the durable record of an extension whose package is no
    /// longer discoverable. Nothing is running, so only the record, its
    /// installed media, and the shared generation change.
    fn disable_orphaned_record(
        &self,
        state: &mut ManagerState,
        id: &str,
    ) -> Result<(), ExtensionError> {
        let Some(mut registration) = self.store.get(id)? else {
            return Err(ExtensionError::InvalidExtension { id: id.to_owned() });
        };
        if !registration.enabled() {
            return Ok(());
        }
        registration.set_enabled(false);
        self.store
            .save(&registration)
            .map_err(|save_error| ExtensionError::Disabling {
                id: id.to_owned(),
                message: save_error.to_string(),
            })?;
        self.remove_installed_media(id);

        state.synchronizer.mark_updated();
        info!(
            target: MANAGER_TARGET,
            extension = %id,
            "undiscoverable extension disabled through its record"
        );
        state
            .pending_events
            .push(ExtensionEvent::Disabled { id: id.to_owned() });
        Ok(())
    }

    /// Ordered per-extension initialization, with rollback through the
    /// symmetric uninitialize path on any failure.
    fn init_extension(&self, state: &mut ManagerState, id: &str) -> Result<(), ExtensionError> {
        let manifest = state
            .manifests
            .get(id)
            .cloned()
            .ok_or_else(|| ExtensionError::InvalidExtension { id: id.to_owned() })?;
        let provider = state
            .registry
            .get(id)
            .cloned()
            .ok_or_else(|| ExtensionError::InvalidExtension { id: id.to_owned() })?;

        // Step 1: construct the instance and register it in the live table.
        let extension = provider
            .construct()
            .map_err(|construct_error| ExtensionError::enabling(id, construct_error.to_string()))?;
        let registration = self.store.get_or_create(id)?;
        let settings = ExtensionSettings::from_registration(&registration);
        state.instances.insert(
            id.to_owned(),
            LiveExtension {
                extension,
                settings,
            },
        );
        state.enabled_order.push(id.to_owned());

        // Steps 2–9 roll back through uninit_extension on failure.
        if let Err(step_error) = self.run_init_steps(state, &manifest, &provider) {
            self.uninit_extension(state, id);
            return Err(step_error);
        }

        state.load_errors.remove(id);
        state.scan_failures.remove(id);
        state
            .pending_events
            .push(ExtensionEvent::Initialized { id: id.to_owned() });
        Ok(())
    }

    /// Initialization steps after the instance is registered in the live
    /// table.
    fn run_init_steps(
        &self,
        state: &mut ManagerState,
        manifest: &ExtensionManifest,
        provider: &Arc<dyn ExtensionProvider>,
    ) -> Result<(), ExtensionError> {
        let id = manifest.id();

        // Step 2: admin site.
        if manifest.has_admin_site() {
            let live = state
                .instances
                .get_mut(id)
                .ok_or_else(|| ExtensionError::InvalidExtension { id: id.to_owned() })?;
            live.extension
                .register_admin_site()
                .map_err(|admin_error| ExtensionError::enabling(id, admin_error.to_string()))?;
        }

        // Step 3: dynamic URL mounts.
        if manifest.is_configurable() {
            state
                .router
                .install(id, MountKind::Config, format!("ext/{id}/config/"));
        }
        if manifest.has_admin_site() {
            state
                .router
                .install(id, MountKind::Admin, format!("ext/{id}/admin/"));
        }

        // Step 4: static pipeline registration, namespaced by id.
        let mut outputs = Vec::new();
        for bundle in manifest.css_bundles() {
            outputs.push(bundle.namespaced_output(id, "css"));
        }
        for bundle in manifest.js_bundles() {
            outputs.push(bundle.namespaced_output(id, "js"));
        }
        state.pipeline.insert(id.to_owned(), outputs);

        // Step 5: shared list settings.
        state.installed_apps.add_list(manifest.apps());
        state
            .context_processors
            .add_list(manifest.context_processors());

        // Step 6: template caches must be rebuilt.
        state
            .pending_events
            .push(ExtensionEvent::TemplateCachesStale { id: id.to_owned() });

        // Step 7: static media.
        if let Some(source) = provider.media_source() {
            self.installer.install(manifest, &source, false)?;
        }

        // Step 8: schema evolution, gated on the recorded version.
        self.evolve_if_needed(state, manifest)?;

        // Step 9: first-time installed flag.
        let mut registration = self.store.get_or_create(id)?;
        if !registration.installed() {
            registration.set_installed(true);
            self.store.save(&registration)?;
        }
        Ok(())
    }

    /// Runs schema evolution when the recorded version is older than the
    /// manifest's, then records the new version.
    fn evolve_if_needed(
        &self,
        state: &mut ManagerState,
        manifest: &ExtensionManifest,
    ) -> Result<(), ExtensionError> {
        let id = manifest.id();
        let live = state
            .instances
            .get_mut(id)
            .ok_or_else(|| ExtensionError::InvalidExtension { id: id.to_owned() })?;
        let stored = live.settings.installed_version().map(ToOwned::to_owned);

        match version_relation(stored.as_deref(), manifest.version()) {
            VersionRelation::Current => Ok(()),
            VersionRelation::Downgrade => {
                warn!(
                    target: MANAGER_TARGET,
                    extension = %id,
                    stored = stored.as_deref().unwrap_or(""),
                    current = manifest.version(),
                    "stored version is newer than the manifest; skipping schema evolution"
                );
                Ok(())
            }
            VersionRelation::Upgrade => {
                if manifest.apps().is_empty() {
                    // Nothing contributes models; just record the version.
                } else if let Some(evolver) = &self.evolver {
                    evolver
                        .evolve(id, manifest.apps())
                        .map_err(|evolve_error| {
                            ExtensionError::enabling(id, evolve_error.to_string())
                        })?;
                } else {
                    warn!(
                        target: MANAGER_TARGET,
                        extension = %id,
                        "no schema evolver configured; skipping schema evolution"
                    );
                }
                live.settings.set_installed_version(manifest.version());
                live.settings.save(self.store.as_ref())
            }
        }
    }

    /// Symmetric teardown of one live instance; never fails, logging any
    /// cleanup problems instead, so rollback paths cannot be skipped.
    fn uninit_extension(&self, state: &mut ManagerState, id: &str) {
        let Some(mut live) = state.instances.remove(id) else {
            return;
        };
        state.enabled_order.retain(|existing| existing != id);
        live.extension.shutdown();

        // Installed media is shared with other workers; only the disable
        // flow removes it.
        state.router.remove_owner(id);
        state.pipeline.remove(id);

        if let Some(manifest) = state.manifests.get(id).cloned() {
            release_list_items(&mut state.installed_apps, manifest.apps(), id);
            release_list_items(
                &mut state.context_processors,
                manifest.context_processors(),
                id,
            );
        }

        state
            .pending_events
            .push(ExtensionEvent::TemplateCachesStale { id: id.to_owned() });
        state
            .pending_events
            .push(ExtensionEvent::Uninitialized { id: id.to_owned() });
    }

    /// Dispatches queued lifecycle events. The state lock is released by
    /// the time this runs, so receivers may call back into the manager.
    fn dispatch_events(&self, events: &[ExtensionEvent]) {
        for event in events {
            self.hub.emit(event);
        }
    }

    /// Removes an extension's installed media during the disable flow; a
    /// failure is logged rather than propagated so the disable is not left
    /// half-done.
    fn remove_installed_media(&self, id: &str) {
        if let Err(media_error) = self.installer.uninstall(id) {
            warn!(
                target: MANAGER_TARGET,
                extension = %id,
                error = %media_error,
                "failed to uninstall extension media"
            );
        }
    }
}

/// Formats an enabling failure for the retained load-error table, appending
/// the captured backtrace when one is available.
fn enabling_diagnostic(error: &ExtensionError) -> String {
    error
        .retained_backtrace()
        .map_or_else(|| error.to_string(), |trace| format!("{error}\n{trace}"))
}

/// Releases a batch of list entries, logging rather than propagating
/// untracked-item errors (teardown must not fail).
fn release_list_items(wrapper: &mut SettingListWrapper, items: &[String], id: &str) {
    if let Err(release_error) = wrapper.remove_list(items) {
        warn!(
            target: MANAGER_TARGET,
            extension = %id,
            list = wrapper.display_name(),
            error = %release_error,
            "failed to release shared list entries"
        );
    }
}
