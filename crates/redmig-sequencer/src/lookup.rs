//! Memoizing remote lookups (user email to account id, field name to id).

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::PublishError;

type Query<'a> = Box<dyn Fn(&str) -> Result<Option<String>, PublishError> + Send + Sync + 'a>;

/// Cache in front of a remote lookup.
///
/// Hits are served from memory. A miss runs the query; found values are
/// cached, absent ones are not, so a later call asks the remote again.
pub struct MemoLookup<'a> {
    name: &'static str,
    cache: RwLock<HashMap<String, String>>,
    query: Query<'a>,
}

impl<'a> MemoLookup<'a> {
    pub fn new(
        name: &'static str,
        query: impl Fn(&str) -> Result<Option<String>, PublishError> + Send + Sync + 'a,
    ) -> Self {
        Self {
            name,
            cache: RwLock::new(HashMap::new()),
            query: Box::new(query),
        }
    }

    /// Pre-populate the cache.
    #[must_use]
    pub fn with_entries(self, entries: impl IntoIterator<Item = (String, String)>) -> Self {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(entries);
        self
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, PublishError> {
        if let Some(value) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Ok(Some(value.clone()));
        }

        let found = (self.query)(key)?;
        match &found {
            Some(value) => {
                tracing::debug!(lookup = self.name, key, value = %value, "Cached lookup");
                self.cache
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key.to_owned(), value.clone());
            }
            None => tracing::debug!(lookup = self.name, key, "Lookup found nothing"),
        }
        Ok(found)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MemoLookup<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoLookup")
            .field("name", &self.name)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}
