//! Ordered provider registry.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::provider::SignalProvider;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("signal provider `{0}` is already registered")]
    Duplicate(String),
}

/// Name → provider map. Registration order is evaluation order.
#[derive(Clone, Default)]
pub struct SignalProviderRegistry {
    providers: Vec<Arc<dyn SignalProvider>>,
}

impl SignalProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn SignalProvider>) -> Result<(), RegistryError> {
        if self.get(provider.name()).is_some() {
            return Err(RegistryError::Duplicate(provider.name().to_string()));
        }
        self.providers.push(provider);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, provider: Arc<dyn SignalProvider>) -> Result<Self, RegistryError> {
        self.register(provider)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn SignalProvider>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SignalProvider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for SignalProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
