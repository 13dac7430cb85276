//! Read-only view of the warehouse and goods catalogues.
//!
//! Catalogue maintenance happens elsewhere. The engine only needs lookups by
//! id, and it must be able to tell "unknown" apart from "known but disabled".

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use depot_core::{DomainError, DomainResult, GoodsId, WarehouseId};
use depot_inventory::StockThresholds;

/// Outcome of a catalogue lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Disabled(T),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseInfo {
    pub id: WarehouseId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsInfo {
    pub id: GoodsId,
    pub name: String,
    pub unit: String,
    pub thresholds: StockThresholds,
}

/// Master-data collaborator.
pub trait MasterData: Send + Sync {
    fn warehouse(&self, id: WarehouseId) -> Lookup<WarehouseInfo>;

    fn goods(&self, id: GoodsId) -> Lookup<GoodsInfo>;

    /// An enabled warehouse, or `NotFound` / `Validation` (disabled).
    fn require_warehouse(&self, id: WarehouseId) -> DomainResult<WarehouseInfo> {
        match self.warehouse(id) {
            Lookup::Found(info) => Ok(info),
            Lookup::Disabled(info) => Err(DomainError::validation(format!(
                "warehouse {} ({id}) is disabled",
                info.name
            ))),
            Lookup::NotFound => Err(DomainError::not_found(format!("warehouse {id}"))),
        }
    }

    /// An enabled goods item, or `NotFound` / `Validation` (disabled).
    fn require_goods(&self, id: GoodsId) -> DomainResult<GoodsInfo> {
        match self.goods(id) {
            Lookup::Found(info) => Ok(info),
            Lookup::Disabled(info) => Err(DomainError::validation(format!(
                "goods {} ({id}) is disabled",
                info.name
            ))),
            Lookup::NotFound => Err(DomainError::not_found(format!("goods {id}"))),
        }
    }
}

impl<M: MasterData + ?Sized> MasterData for Arc<M> {
    fn warehouse(&self, id: WarehouseId) -> Lookup<WarehouseInfo> {
        (**self).warehouse(id)
    }

    fn goods(&self, id: GoodsId) -> Lookup<GoodsInfo> {
        (**self).goods(id)
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    info: T,
    enabled: bool,
}

impl<T: Clone> Entry<T> {
    fn lookup(&self) -> Lookup<T> {
        if self.enabled {
            Lookup::Found(self.info.clone())
        } else {
            Lookup::Disabled(self.info.clone())
        }
    }
}

/// In-memory catalogue for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryMasterData {
    warehouses: RwLock<HashMap<WarehouseId, Entry<WarehouseInfo>>>,
    goods: RwLock<HashMap<GoodsId, Entry<GoodsInfo>>>,
}

impl InMemoryMasterData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warehouse(&self, name: impl Into<String>) -> WarehouseId {
        let id = WarehouseId::new();
        let info = WarehouseInfo {
            id,
            name: name.into(),
        };
        self.warehouses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Entry { info, enabled: true });
        id
    }

    pub fn add_goods(
        &self,
        name: impl Into<String>,
        unit: impl Into<String>,
        thresholds: StockThresholds,
    ) -> GoodsId {
        let id = GoodsId::new();
        let info = GoodsInfo {
            id,
            name: name.into(),
            unit: unit.into(),
            thresholds,
        };
        self.goods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Entry { info, enabled: true });
        id
    }

    pub fn set_warehouse_enabled(&self, id: WarehouseId, enabled: bool) {
        if let Some(entry) = self
            .warehouses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&id)
        {
            entry.enabled = enabled;
        }
    }

    pub fn set_goods_enabled(&self, id: GoodsId, enabled: bool) {
        if let Some(entry) = self
            .goods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&id)
        {
            entry.enabled = enabled;
        }
    }
}

impl MasterData for InMemoryMasterData {
    fn warehouse(&self, id: WarehouseId) -> Lookup<WarehouseInfo> {
        self.warehouses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map_or(Lookup::NotFound, Entry::lookup)
    }

    fn goods(&self, id: GoodsId) -> Lookup<GoodsInfo> {
        self.goods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map_or(Lookup::NotFound, Entry::lookup)
    }
}
