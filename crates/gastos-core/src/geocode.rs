//! Address geocoding seam
//!
//! Lookups themselves are an outside service; this module only defines the
//! contract and a cache keyed by the exact address string.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve an address, `None` when the service has no match
    async fn address_to_coordinates(&self, address: &str) -> Option<Coordinates>;
}

/// Remembers every answer, misses included
pub struct CachedGeocoder<G> {
    inner: G,
    cache: Mutex<HashMap<String, Option<Coordinates>>>,
}

impl<G: Geocoder> CachedGeocoder<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn cached(&self, address: &str) -> Option<Option<Coordinates>> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .copied()
    }
}

#[async_trait]
impl<G: Geocoder> Geocoder for CachedGeocoder<G> {
    async fn address_to_coordinates(&self, address: &str) -> Option<Coordinates> {
        if let Some(hit) = self.cached(address) {
            return hit;
        }
        let found = self.inner.address_to_coordinates(address).await;
        debug!(address = %address, found = found.is_some(), "Geocoded address");
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address.to_string(), found);
        found
    }
}
