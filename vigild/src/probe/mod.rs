//! Backend probe adapters.
//!
//! An adapter answers one question: what does the backend currently say about
//! this session's resource? It never changes anything. A resource that does
//! not exist is a snapshot (`NotFound`), not an error; errors are reserved for
//! failing to ask.

mod command;
mod docker;
mod kubernetes;
#[cfg(test)]
pub mod mock;
mod sprites;
mod zellij;

pub use docker::DockerAdapter;
pub use kubernetes::KubernetesAdapter;
pub use sprites::SpritesAdapter;
pub use zellij::ZellijAdapter;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use vigil_common::config::ProbeConfig;
use vigil_common::{BackendKind, ProbeError, RawSnapshot, Session};

/// Queries one backend for the observed state of a session's resource.
///
/// Implementations must not block the runtime. The caller bounds every call
/// with the probe timeout and drops the future when it expires, so any child
/// process has to be spawned with `kill_on_drop`.
#[async_trait]
pub trait ProbeAdapter: Send + Sync {
    /// Backend this adapter understands.
    fn kind(&self) -> BackendKind;

    async fn probe(&self, session: &Session) -> Result<RawSnapshot, ProbeError>;
}

/// One adapter per backend kind.
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    adapters: BTreeMap<BackendKind, Arc<dyn ProbeAdapter>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the adapters for every enabled backend.
    pub fn from_config(config: &ProbeConfig) -> Result<Self, ProbeError> {
        let mut registry = Self::new();
        for kind in BackendKind::ALL {
            if !config.is_enabled(kind) {
                info!(backend = %kind, "Backend probing disabled");
                continue;
            }
            match kind {
                BackendKind::Container => {
                    registry.register(DockerAdapter::new(&config.docker_bin));
                }
                BackendKind::Pod => {
                    registry.register(KubernetesAdapter::new(
                        &config.kubectl_bin,
                        &config.kube_namespace,
                        config.kube_context.clone(),
                    ));
                }
                BackendKind::Multiplexer => {
                    registry.register(ZellijAdapter::new(&config.zellij_bin));
                }
                BackendKind::Vm => {
                    registry.register(SpritesAdapter::new(
                        &config.sprites_api_url,
                        config.sprites_token.clone(),
                        config.timeout(),
                    )?);
                }
                BackendKind::Unsupported => {}
            }
        }
        Ok(registry)
    }

    /// Register an adapter, replacing any previous one for the same kind.
    pub fn register(&mut self, adapter: impl ProbeAdapter + 'static) -> &mut Self {
        self.adapters.insert(adapter.kind(), Arc::new(adapter));
        self
    }

    #[cfg(test)]
    pub fn with(mut self, adapter: impl ProbeAdapter + 'static) -> Self {
        self.register(adapter);
        self
    }

    /// The adapter for `kind`, or `NoAdapter`.
    pub fn get(&self, kind: BackendKind) -> Result<Arc<dyn ProbeAdapter>, ProbeError> {
        self.adapters
            .get(&kind)
            .cloned()
            .ok_or(ProbeError::NoAdapter(kind))
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        self.adapters.keys().copied().collect()
    }
}

/// The session's backend resource id, required by every adapter.
pub(crate) fn backend_id(session: &Session) -> Result<&str, ProbeError> {
    session
        .backend_id
        .as_deref()
        .ok_or(ProbeError::MissingBackendId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_common::health::ContainerSnapshot;

    #[test]
    fn test_missing_adapter_is_error_not_panic() {
        let registry = ProbeRegistry::new();
        let err = registry.get(BackendKind::Vm).err().unwrap();
        assert_eq!(err, ProbeError::NoAdapter(BackendKind::Vm));
    }

    #[test]
    fn test_from_config_respects_enabled_backends() {
        let config = ProbeConfig {
            enabled_backends: vec![BackendKind::Container, BackendKind::Multiplexer],
            ..ProbeConfig::default()
        };
        let registry = ProbeRegistry::from_config(&config).unwrap();
        assert_eq!(
            registry.kinds(),
            vec![BackendKind::Container, BackendKind::Multiplexer]
        );
    }

    #[test]
    fn test_register_replaces_same_kind() {
        let registry = ProbeRegistry::new()
            .with(mock::MockAdapter::new(BackendKind::Container))
            .with(mock::MockAdapter::new(BackendKind::Container).with_default(Ok(
                RawSnapshot::Container(ContainerSnapshot::Stopped),
            )));
        assert_eq!(registry.kinds(), vec![BackendKind::Container]);
    }

    #[test]
    fn test_backend_id_required() {
        let session = Session::new("s", "s", BackendKind::Container, "/tmp");
        assert_eq!(backend_id(&session), Err(ProbeError::MissingBackendId));
        let session = session.with_backend_id("c-1");
        assert_eq!(backend_id(&session), Ok("c-1"));
    }
}
