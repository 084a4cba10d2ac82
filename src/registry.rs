/*!
 * Provider Registry
 * Scheme-to-provider routing, registration events and lazy activation
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::capability::ProviderCapabilities;
use crate::events::{Disposable, EventBroadcaster};
use crate::provider::FileSystemProvider;
use crate::types::{
    CapabilityChangeEvent, FileChangesEvent, FsError, FsResult, ProviderRegistrationEvent,
};
use crate::uri::Uri;

/// Hook invoked when a scheme without a provider is about to be used; the
/// extension point by which lazy providers register themselves on first use
pub type ActivationHook = Arc<dyn Fn(&str) + Send + Sync>;

struct RegisteredProvider {
    provider: Arc<dyn FileSystemProvider>,
    stop: Arc<AtomicBool>,
}

/// Registry mapping URI schemes to providers.
///
/// Cheap to clone; clones share all state.
pub struct ProviderRegistry {
    providers: Arc<DashMap<String, RegisteredProvider, RandomState>>,
    registrations: EventBroadcaster<ProviderRegistrationEvent>,
    capability_changes: EventBroadcaster<CapabilityChangeEvent>,
    file_changes: EventBroadcaster<FileChangesEvent>,
    activation_hooks: Arc<RwLock<Vec<ActivationHook>>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: Arc::new(DashMap::with_hasher(RandomState::new())),
            registrations: EventBroadcaster::default(),
            capability_changes: EventBroadcaster::default(),
            file_changes: EventBroadcaster::default(),
            activation_hooks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a provider for a scheme.
    ///
    /// The provider's change batches are forwarded into the registry-wide
    /// stream until the returned disposable runs. Registering a scheme twice
    /// fails with `SchemeAlreadyRegistered`.
    pub fn register(
        &self,
        scheme: &str,
        provider: Arc<dyn FileSystemProvider>,
    ) -> FsResult<Disposable> {
        let scheme = scheme.to_ascii_lowercase();
        let stop = Arc::new(AtomicBool::new(false));

        match self.providers.entry(scheme.clone()) {
            Entry::Occupied(_) => {
                return Err(FsError::SchemeAlreadyRegistered(scheme));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(RegisteredProvider {
                    provider: Arc::clone(&provider),
                    stop: Arc::clone(&stop),
                });
            }
        }

        self.spawn_change_forwarder(&scheme, &provider, &stop);
        self.spawn_capability_forwarder(&scheme, &provider, &stop);

        info!("Registered filesystem provider for scheme '{scheme}'");
        self.registrations.emit(ProviderRegistrationEvent {
            added: true,
            scheme: scheme.clone(),
        });

        let providers = Arc::clone(&self.providers);
        let registrations = self.registrations.clone();
        Ok(Disposable::new(move || {
            if providers.remove(&scheme).is_some() {
                stop.store(true, Ordering::SeqCst);
                info!("Unregistered filesystem provider for scheme '{scheme}'");
                registrations.emit(ProviderRegistrationEvent {
                    added: false,
                    scheme: scheme.clone(),
                });
            }
        }))
    }

    fn spawn_change_forwarder(
        &self,
        scheme: &str,
        provider: &Arc<dyn FileSystemProvider>,
        stop: &Arc<AtomicBool>,
    ) {
        let mut rx = provider.subscribe_changes();
        let out = self.file_changes.clone();
        let stop = Arc::clone(stop);
        let scheme = scheme.to_string();
        thread::spawn(move || loop {
            match rx.blocking_recv() {
                Ok(batch) => {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    out.emit(FileChangesEvent::new(batch));
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Dropped {missed} change batches from provider '{scheme}'");
                }
                Err(RecvError::Closed) => break,
            }
        });
    }

    fn spawn_capability_forwarder(
        &self,
        scheme: &str,
        provider: &Arc<dyn FileSystemProvider>,
        stop: &Arc<AtomicBool>,
    ) {
        let mut rx = provider.subscribe_capabilities();
        let out = self.capability_changes.clone();
        let stop = Arc::clone(stop);
        let scheme = scheme.to_string();
        thread::spawn(move || loop {
            match rx.blocking_recv() {
                Ok(capabilities) => {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    out.emit(CapabilityChangeEvent {
                        scheme: scheme.clone(),
                        capabilities,
                    });
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        });
    }

    /// Register an activation hook; hooks run during [`Self::activate`] for
    /// schemes that have no provider yet
    pub fn on_will_activate(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.activation_hooks.write().push(Arc::new(hook));
    }

    /// Give lazy providers a chance to register themselves for `scheme`
    pub fn activate(&self, scheme: &str) {
        if self.providers.contains_key(scheme) {
            return;
        }
        debug!("Activating providers for scheme '{scheme}'");
        let hooks: Vec<ActivationHook> = self.activation_hooks.read().clone();
        for hook in hooks {
            hook(scheme);
        }
    }

    /// Resolve the provider serving a URI
    pub fn provider_for(&self, uri: &Uri) -> FsResult<Arc<dyn FileSystemProvider>> {
        if !uri.is_absolute_path() {
            return Err(FsError::InvalidPath(uri.to_string()));
        }
        self.activate(uri.scheme());
        self.providers
            .get(uri.scheme())
            .map(|entry| Arc::clone(&entry.provider))
            .ok_or_else(|| FsError::NoProvider(uri.scheme().to_string()))
    }

    /// Whether a provider exists for the scheme
    #[must_use]
    pub fn is_registered(&self, scheme: &str) -> bool {
        self.providers.contains_key(scheme)
    }

    /// Whether the scheme's provider, if present, carries the capability
    #[must_use]
    pub fn has_capability(&self, uri: &Uri, capability: ProviderCapabilities) -> bool {
        self.providers
            .get(uri.scheme())
            .is_some_and(|entry| entry.provider.capabilities().contains(capability))
    }

    /// Registration/unregistration events
    #[must_use]
    pub fn subscribe_registrations(&self) -> broadcast::Receiver<ProviderRegistrationEvent> {
        self.registrations.subscribe()
    }

    /// Capability-change events from all registered providers
    #[must_use]
    pub fn subscribe_capability_changes(&self) -> broadcast::Receiver<CapabilityChangeEvent> {
        self.capability_changes.subscribe()
    }

    /// Change batches from all registered providers
    #[must_use]
    pub fn subscribe_file_changes(&self) -> broadcast::Receiver<FileChangesEvent> {
        self.file_changes.subscribe()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ProviderRegistry {
    fn clone(&self) -> Self {
        Self {
            providers: Arc::clone(&self.providers),
            registrations: self.registrations.clone(),
            capability_changes: self.capability_changes.clone(),
            file_changes: self.file_changes.clone(),
            activation_hooks: Arc::clone(&self.activation_hooks),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryFs;

    #[test]
    fn test_register_and_route() {
        let registry = ProviderRegistry::new();
        let provider = Arc::new(MemoryFs::new());
        let registration = registry.register("mem", provider).unwrap();

        let uri = Uri::parse("mem:/a.txt").unwrap();
        assert!(registry.provider_for(&uri).is_ok());
        assert!(registry.has_capability(&uri, ProviderCapabilities::FILE_READ_WRITE));

        registration.dispose();
        assert!(matches!(
            registry.provider_for(&uri),
            Err(FsError::NoProvider(_))
        ));
    }

    #[test]
    fn test_duplicate_scheme_rejected() {
        let registry = ProviderRegistry::new();
        registry.register("mem", Arc::new(MemoryFs::new())).unwrap();
        assert!(matches!(
            registry.register("mem", Arc::new(MemoryFs::new())),
            Err(FsError::SchemeAlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_relative_path_rejected() {
        let registry = ProviderRegistry::new();
        registry.register("mem", Arc::new(MemoryFs::new())).unwrap();
        // A URI that parses but carries no absolute path
        let uri = Uri::parse("mem:relative.txt").unwrap();
        if uri.is_absolute_path() {
            // Path normalization made it absolute; nothing to assert here
            return;
        }
        assert!(matches!(
            registry.provider_for(&uri),
            Err(FsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_activation_hook_registers_lazily() {
        let registry = ProviderRegistry::new();
        let hook_registry = registry.clone();
        registry.on_will_activate(move |scheme| {
            if scheme == "lazy" {
                let _ = hook_registry
                    .register("lazy", Arc::new(MemoryFs::new()))
                    // Keep the provider installed beyond the hook
                    .map(std::mem::forget);
            }
        });

        let uri = Uri::parse("lazy:/x").unwrap();
        assert!(registry.provider_for(&uri).is_ok());
    }

    #[test]
    fn test_registration_events() {
        let registry = ProviderRegistry::new();
        let mut rx = registry.subscribe_registrations();

        let registration = registry.register("mem", Arc::new(MemoryFs::new())).unwrap();
        let event = rx.try_recv().unwrap();
        assert!(event.added);
        assert_eq!(event.scheme, "mem");

        registration.dispose();
        let event = rx.try_recv().unwrap();
        assert!(!event.added);
    }
}
