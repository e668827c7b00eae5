//! Pipeline Domain - Asset universe definitions
//!
//! A universe defines which assets a pipeline may see on each date. Assets are
//! only visible while listed, so a run never looks ahead to an asset that has
//! not started trading and drops an asset from its delisting onwards.

use crate::asset::Asset;
use crate::types::{AssetId, SessionDate};
use hashbrown::HashSet;
use std::fmt;
use std::sync::Arc;

/// Trait for defining asset universes
pub trait Universe: Send + Sync + fmt::Debug {
    /// Human-readable name
    fn name(&self) -> &str;

    /// Every asset the universe knows, ascending by id
    fn all_assets(&self) -> Vec<Asset>;

    /// Assets listed on `date`
    fn assets_at(&self, date: SessionDate) -> Vec<Asset> {
        self.all_assets()
            .into_iter()
            .filter(|a| a.is_listed_on(date))
            .collect()
    }

    /// Assets listed on at least one day of `[start, end]`, ascending by id.
    ///
    /// The engine sorts and dedups the result by id before use.
    fn assets_between(&self, start: SessionDate, end: SessionDate) -> Vec<Asset> {
        self.all_assets()
            .into_iter()
            .filter(|a| a.is_listed_between(start, end))
            .collect()
    }

    /// Whether `asset_id` is in the universe and listed on `date`.
    ///
    /// The default scans `all_assets()` on every call; implementors with an
    /// index should override it. Runs build their listing grid from the
    /// assets of `assets_between` instead, so this must agree with
    /// [`Asset::is_listed_on`] for those assets.
    fn is_listed(&self, asset_id: AssetId, date: SessionDate) -> bool {
        self.all_assets()
            .iter()
            .any(|a| a.id == asset_id && a.is_listed_on(date))
    }
}

/// Universe over a fixed list of assets with listing dates
#[derive(Debug, Clone)]
pub struct AssetUniverse {
    name: String,
    assets: Vec<Asset>,
}

impl AssetUniverse {
    pub fn new(name: impl Into<String>, mut assets: Vec<Asset>) -> Self {
        assets.sort_by_key(|a| a.id);
        assets.dedup_by_key(|a| a.id);
        Self {
            name: name.into(),
            assets,
        }
    }

    pub fn get(&self, asset_id: AssetId) -> Option<&Asset> {
        self.assets
            .binary_search_by_key(&asset_id, |a| a.id)
            .ok()
            .map(|i| &self.assets[i])
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl Universe for AssetUniverse {
    fn name(&self) -> &str {
        &self.name
    }

    fn all_assets(&self) -> Vec<Asset> {
        self.assets.clone()
    }

    fn is_listed(&self, asset_id: AssetId, date: SessionDate) -> bool {
        self.get(asset_id).map_or(false, |a| a.is_listed_on(date))
    }
}

/// Universe restricted to an allowed subset of another universe
#[derive(Debug, Clone)]
pub struct FilteredUniverse {
    name: String,
    parent: Arc<dyn Universe>,
    allowed: HashSet<AssetId>,
}

impl FilteredUniverse {
    pub fn new(
        name: impl Into<String>,
        parent: Arc<dyn Universe>,
        allowed: impl IntoIterator<Item = AssetId>,
    ) -> Self {
        Self {
            name: name.into(),
            parent,
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl Universe for FilteredUniverse {
    fn name(&self) -> &str {
        &self.name
    }

    fn all_assets(&self) -> Vec<Asset> {
        self.parent
            .all_assets()
            .into_iter()
            .filter(|a| self.allowed.contains(&a.id))
            .collect()
    }

    fn is_listed(&self, asset_id: AssetId, date: SessionDate) -> bool {
        self.allowed.contains(&asset_id) && self.parent.is_listed(asset_id, date)
    }
}
