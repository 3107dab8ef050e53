//! Reference data cache for people, categories, and locations.
//!
//! One instance is shared per session scope (`Arc`) by every consumer.
//! Entries are keyed by `(api_base, token)`; a `load` with an unchanged key
//! is a no-op, as is a `load` while another one is in flight. Collections
//! are always replaced whole, never merged.
//!
//! When the directory fetch fails the cache substitutes a fixed,
//! alphabetically-sorted list of known assignee names so the assignment UI
//! stays usable. This is deliberate degraded-service behavior: fallback
//! names carry no person id and resolve through live search at submit time.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::client::{decode_items, ApiClient};
use crate::error::Error;
use crate::models::{normalize_categories, Category, LocationRef, Person, RawCategory};

/// Known assignees shown when the directory service is unreachable.
/// Kept in alphabetical order; tests assert it stays sorted.
pub const FALLBACK_ASSIGNEES: [&str; 6] = [
    "Anna Brandt",
    "Felix Hartmann",
    "Jonas Keller",
    "Lena Schubert",
    "Miriam Vogt",
    "Tobias Werner",
];

fn cache_key(base_url: &str, token: Option<&str>) -> String {
    format!("{base_url}|{}", token.unwrap_or("anonymous"))
}

#[derive(Default)]
struct CacheState {
    key: Option<String>,
    people: Vec<Person>,
    people_names: Vec<String>,
    categories: Vec<Category>,
    locations: Vec<LocationRef>,
    error: Option<String>,
}

impl CacheState {
    fn is_empty(&self) -> bool {
        self.people_names.is_empty() && self.categories.is_empty() && self.locations.is_empty()
    }
}

/// Clears the in-flight flag when the owning load finishes or is dropped
/// mid-fetch, so an abandoned load never wedges the cache.
struct LoadPermit<'a>(&'a AtomicBool);

impl Drop for LoadPermit<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Session-scoped cache of people/category/location reference data.
#[derive(Default)]
pub struct ReferenceDataCache {
    state: RwLock<CacheState>,
    loading: AtomicBool,
}

impl ReferenceDataCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the cache for the client's `(api_base, token)` key.
    ///
    /// No-op when the key matches and the cache is non-empty, or while
    /// another load is already in flight. Directory failures degrade to the
    /// fallback assignee list rather than erroring.
    ///
    /// # Errors
    ///
    /// Currently infallible at this boundary; failures are recorded in
    /// `last_error` so the UI can surface them without losing the view.
    pub async fn load(&self, client: &ApiClient) -> Result<(), Error> {
        let token = client.current_token().await;
        let key = cache_key(client.base_url(), token.as_deref());

        {
            let state = self.state.read().await;
            if state.key.as_deref() == Some(key.as_str()) && !state.is_empty() {
                debug!("Reference data cache is current, skipping reload");
                return Ok(());
            }
        }
        if self.loading.swap(true, Ordering::SeqCst) {
            debug!("Reference data load already in flight, skipping");
            return Ok(());
        }
        let _permit = LoadPermit(&self.loading);

        let (people, categories, locations) = tokio::join!(
            fetch_people(client),
            fetch_categories(client),
            fetch_locations(client),
        );

        let mut state = self.state.write().await;
        state.key = Some(key);
        state.error = None;

        match people {
            Ok(people) => {
                state.people_names = people.iter().map(Person::full_name).collect();
                state.people = people;
            }
            Err(e) => {
                warn!(error = %e, "Directory fetch failed, using fallback assignee list");
                state.error = Some(e.to_string());
                state.people = Vec::new();
                state.people_names =
                    FALLBACK_ASSIGNEES.iter().map(ToString::to_string).collect();
            }
        }

        match categories {
            Ok(categories) => state.categories = categories,
            Err(e) => {
                warn!(error = %e, "Category fetch failed");
                if state.error.is_none() {
                    state.error = Some(e.to_string());
                }
                state.categories = Vec::new();
            }
        }

        match locations {
            Ok(locations) => state.locations = locations,
            Err(e) => {
                // Locations are optional on older backends; keep the view empty.
                warn!(error = %e, "Location fetch failed");
                state.locations = Vec::new();
            }
        }

        Ok(())
    }

    /// Reset to an empty, keyless state; the next `load` refetches
    /// regardless of key equality.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.key = None;
        state.people = Vec::new();
        state.people_names = Vec::new();
        state.categories = Vec::new();
        state.locations = Vec::new();
        state.error = None;
    }

    /// Whether a load has completed for some key (possibly degraded).
    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.key.is_some()
    }

    pub async fn people(&self) -> Vec<Person> {
        self.state.read().await.people.clone()
    }

    /// Names offered by the assignment view: live directory names, or the
    /// fallback list after a failed load.
    pub async fn people_names(&self) -> Vec<String> {
        self.state.read().await.people_names.clone()
    }

    pub async fn categories(&self) -> Vec<Category> {
        self.state.read().await.categories.clone()
    }

    pub async fn locations(&self) -> Vec<LocationRef> {
        self.state.read().await.locations.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    /// Exact case-insensitive "First Last" lookup against the live directory
    /// entries. Fallback names never match here (they carry no id).
    pub async fn person_id_by_name(&self, full_name: &str) -> Option<String> {
        self.state
            .read()
            .await
            .people
            .iter()
            .find(|p| p.full_name().eq_ignore_ascii_case(full_name))
            .map(|p| p.id.clone())
    }
}

async fn fetch_people(client: &ApiClient) -> Result<Vec<Person>, Error> {
    let value = client
        .get_json("/api/v1/persons", &[("limit", "200".to_string())])
        .await?;
    decode_items(value)
}

async fn fetch_categories(client: &ApiClient) -> Result<Vec<Category>, Error> {
    let value = client
        .get_json("/api/v1/categories", &[("limit", "100".to_string())])
        .await?;
    let raw: Vec<RawCategory> = decode_items(value)?;
    Ok(normalize_categories(raw))
}

async fn fetch_locations(client: &ApiClient) -> Result<Vec<LocationRef>, Error> {
    let value = client
        .get_json("/api/v1/locations", &[("limit", "200".to_string())])
        .await?;
    decode_items(value)
}
