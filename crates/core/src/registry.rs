//! Ordered collection of exchange clients, looked up by id.
//!
//! Polling order is registration order; the diff engine pairs exchanges in
//! that order.

use crate::traits::ExchangeClient;
use crate::types::ExchangeId;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ExchangeRegistry {
    clients: Vec<Arc<dyn ExchangeClient>>,
}

impl std::fmt::Debug for ExchangeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeRegistry")
            .field("exchanges", &self.ids())
            .finish()
    }
}

impl ExchangeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client, replacing any client already registered under the same id.
    pub fn register(&mut self, client: Arc<dyn ExchangeClient>) {
        if let Some(slot) = self.clients.iter_mut().find(|c| c.id() == client.id()) {
            tracing::warn!(exchange = %client.id(), "replacing registered exchange client");
            *slot = client;
        } else {
            self.clients.push(client);
        }
    }

    #[must_use]
    pub fn get(&self, id: &ExchangeId) -> Option<&Arc<dyn ExchangeClient>> {
        self.clients.iter().find(|c| c.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ExchangeClient>> {
        self.clients.iter()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<ExchangeId> {
        self.clients.iter().map(|c| c.id().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
