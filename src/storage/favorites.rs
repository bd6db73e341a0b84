use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use super::kv::{load_json, save_json, KeyValueStore};
use super::StoreError;

pub const FAVORITES_KEY: &str = "food-favorites";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteKind {
    Cuisine,
    Dish,
}

impl fmt::Display for FavoriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FavoriteKind::Cuisine => write!(f, "cuisine"),
            FavoriteKind::Dish => write!(f, "dish"),
        }
    }
}

impl FromStr for FavoriteKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cuisine" => Ok(FavoriteKind::Cuisine),
            "dish" => Ok(FavoriteKind::Dish),
            other => Err(format!("unknown favorite kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FavoriteKind,
    pub name: String,
    #[serde(default)]
    pub image: String,
    pub added_at: DateTime<Utc>,
}

impl FavoriteItem {
    pub fn new(
        id: impl Into<String>,
        kind: FavoriteKind,
        name: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            image: image.into(),
            added_at: Utc::now(),
        }
    }

    fn is(&self, id: &str, kind: FavoriteKind) -> bool {
        self.id == id && self.kind == kind
    }
}

/// Favorite cuisines and dishes, keyed by `(id, kind)`.
pub struct FavoritesStore {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl FavoritesStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn list(&self) -> Result<Vec<FavoriteItem>, StoreError> {
        load_json(self.store.as_ref(), FAVORITES_KEY)
    }

    pub fn is_favorite(&self, id: &str, kind: FavoriteKind) -> Result<bool, StoreError> {
        Ok(self.list()?.iter().any(|f| f.is(id, kind)))
    }

    /// Returns false when the item was already a favorite.
    pub fn add(&self, item: FavoriteItem) -> Result<bool, StoreError> {
        self.rewrite(|items| {
            if items.iter().any(|f| f.is(&item.id, item.kind)) {
                return (false, false);
            }
            items.push(item);
            (true, true)
        })
    }

    /// Returns false when nothing matched.
    pub fn remove(&self, id: &str, kind: FavoriteKind) -> Result<bool, StoreError> {
        self.rewrite(|items| {
            let before = items.len();
            items.retain(|f| !f.is(id, kind));
            let removed = items.len() != before;
            (removed, removed)
        })
    }

    /// Returns whether the item is a favorite afterwards.
    pub fn toggle(&self, item: FavoriteItem) -> Result<bool, StoreError> {
        // either branch mutates, so the collection is always saved
        self.rewrite(|items| {
            match items.iter().position(|f| f.is(&item.id, item.kind)) {
                Some(index) => {
                    items.remove(index);
                    (true, false)
                }
                None => {
                    items.push(item);
                    (true, true)
                }
            }
        })
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        self.store.remove(FAVORITES_KEY)
    }

    /// Runs `mutate` under the write lock. It returns `(changed, result)`;
    /// the collection is saved only when `changed` is set.
    fn rewrite<F, T>(&self, mutate: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Vec<FavoriteItem>) -> (bool, T),
    {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut items: Vec<FavoriteItem> = load_json(self.store.as_ref(), FAVORITES_KEY)?;
        let (changed, result) = mutate(&mut items);
        if changed {
            save_json(self.store.as_ref(), FAVORITES_KEY, &items)?;
        }
        Ok(result)
    }
}
