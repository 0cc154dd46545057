//! SASL mechanism negotiation.
//!
//! A [`MechanismRegistry`] holds mechanism providers. Explicitly supplied
//! providers are asked first, then the registered ones; the first provider
//! that returns a mechanism wins. Providers that fail or panic are logged
//! and skipped.

mod operation;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

pub(crate) use operation::{SaslOperation, SaslStage};

use crate::error::SaslError;

/// Supplies the name and password used to authenticate.
pub trait CredentialCallback: Send + Sync {
    fn name(&self) -> String;
    fn password(&self) -> String;
}

/// Fixed name/password credentials.
#[derive(Clone)]
pub struct PlainCredentials {
    name: String,
    password: String,
}

impl PlainCredentials {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }
}

impl CredentialCallback for PlainCredentials {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn password(&self) -> String {
        self.password.clone()
    }
}

impl std::fmt::Debug for PlainCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainCredentials")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Client side of one SASL exchange.
pub trait SaslMechanism: Send {
    fn mechanism_name(&self) -> &str;

    /// True if the first AUTH carries a response without a challenge.
    fn has_initial_response(&self) -> bool;

    /// Compute the response to a server challenge (empty for the initial
    /// response).
    fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>, SaslError>;

    fn is_complete(&self) -> bool;
}

/// A mechanism shared between the authentication task and its operations.
pub type SharedMechanism = Arc<Mutex<Box<dyn SaslMechanism>>>;

/// Everything a provider may need to create a mechanism.
pub struct MechanismRequest<'a> {
    /// Acceptable mechanism names in preference order.
    pub mechanisms: &'a [String],
    pub authorization_id: Option<&'a str>,
    /// SASL service name, "memcached".
    pub protocol: &'a str,
    pub server_name: &'a str,
    pub properties: &'a HashMap<String, String>,
    pub credentials: &'a Arc<dyn CredentialCallback>,
}

/// Creates mechanisms.
pub trait SaslMechanismProvider: Send + Sync {
    /// Return a mechanism for one of `request.mechanisms`, or `None` if this
    /// provider supports none of them.
    fn create_mechanism(
        &self,
        request: &MechanismRequest<'_>,
    ) -> Result<Option<Box<dyn SaslMechanism>>, SaslError>;
}

/// Ordered set of mechanism providers.
#[derive(Clone, Default)]
pub struct MechanismRegistry {
    explicit: Vec<Arc<dyn SaslMechanismProvider>>,
    registered: Vec<Arc<dyn SaslMechanismProvider>>,
}

impl MechanismRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `PLAIN` provider registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PlainProvider));
        registry
    }

    /// Add a provider that is asked before any registered provider.
    pub fn with_provider(mut self, provider: Arc<dyn SaslMechanismProvider>) -> Self {
        self.explicit.push(provider);
        self
    }

    /// Register a provider, asked after the explicit ones.
    pub fn register(&mut self, provider: Arc<dyn SaslMechanismProvider>) {
        self.registered.push(provider);
    }

    /// Providers in lookup order, each provider at most once.
    pub fn providers(&self) -> Vec<Arc<dyn SaslMechanismProvider>> {
        let mut providers: Vec<Arc<dyn SaslMechanismProvider>> = Vec::new();
        for provider in self.explicit.iter().chain(&self.registered) {
            if !providers.iter().any(|p| Arc::ptr_eq(p, provider)) {
                providers.push(provider.clone());
            }
        }
        providers
    }

    /// Create a mechanism from the first provider that offers one.
    pub fn create_mechanism(
        &self,
        request: &MechanismRequest<'_>,
    ) -> Result<Box<dyn SaslMechanism>, SaslError> {
        for provider in self.providers() {
            match panic::catch_unwind(AssertUnwindSafe(|| provider.create_mechanism(request))) {
                Ok(Ok(Some(mechanism))) => return Ok(mechanism),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => trace!(error = %e, "mechanism provider failed, skipping"),
                Err(_) => trace!("mechanism provider panicked, skipping"),
            }
        }
        Err(SaslError::MechanismUnavailable)
    }
}

/// Provider for the `PLAIN` mechanism.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainProvider;

impl SaslMechanismProvider for PlainProvider {
    fn create_mechanism(
        &self,
        request: &MechanismRequest<'_>,
    ) -> Result<Option<Box<dyn SaslMechanism>>, SaslError> {
        if !request.mechanisms.iter().any(|m| m == PlainMechanism::NAME) {
            return Ok(None);
        }
        Ok(Some(Box::new(PlainMechanism {
            authorization_id: request.authorization_id.unwrap_or_default().to_string(),
            credentials: request.credentials.clone(),
            complete: false,
        })))
    }
}

/// RFC 4616 `PLAIN`: `authzid NUL authcid NUL passwd` in one message.
pub struct PlainMechanism {
    authorization_id: String,
    credentials: Arc<dyn CredentialCallback>,
    complete: bool,
}

impl PlainMechanism {
    pub const NAME: &'static str = "PLAIN";
}

impl SaslMechanism for PlainMechanism {
    fn mechanism_name(&self) -> &str {
        Self::NAME
    }

    fn has_initial_response(&self) -> bool {
        true
    }

    fn evaluate_challenge(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, SaslError> {
        if self.complete {
            return Err(SaslError::Evaluation("PLAIN exchange already complete".into()));
        }
        let name = self.credentials.name();
        let password = self.credentials.password();
        let mut response =
            Vec::with_capacity(self.authorization_id.len() + name.len() + password.len() + 2);
        response.extend_from_slice(self.authorization_id.as_bytes());
        response.push(0);
        response.extend_from_slice(name.as_bytes());
        response.push(0);
        response.extend_from_slice(password.as_bytes());
        self.complete = true;
        Ok(response)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}
