use rust_decimal::Decimal;
use sluice::{AsValue, Cache, Entity, MemoryCache, Result, Value, ValueEnum};
use std::{
    collections::HashMap,
    sync::{
        LazyLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use time::{OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

#[derive(ValueEnum, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    #[default]
    Active = 1,
    Suspended = 2,
    Closed = 9,
}

#[derive(Entity, Default, Debug, Clone, PartialEq)]
#[sluice(table = "FD_BaseData", rename_all = "PascalCase")]
pub struct BaseData {
    pub id: i64,
    pub code: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub status: RowStatus,
    pub deleted: bool,
    pub created: Option<PrimitiveDateTime>,
    /// Computed by the server.
    #[sluice(result)]
    pub total: Option<i32>,
}

impl BaseData {
    pub fn new(id: i64, code: &str) -> Self {
        Self {
            id,
            code: code.into(),
            ..Default::default()
        }
    }
}

#[derive(Entity, Default, Debug, Clone, PartialEq)]
#[sluice(table = "FD_BaseDataGroup", rename_all = "PascalCase")]
pub struct BaseDataGroup {
    #[sluice(name = "ID")]
    pub id: i32,
    pub name: String,
    #[sluice(child)]
    pub items: Vec<BaseDataGroupItem>,
    #[sluice(child, foreign_key = "OwnerGroupID")]
    pub notes: Option<Vec<GroupNote>>,
}

#[derive(Entity, Default, Debug, Clone, PartialEq)]
#[sluice(
    table = "FD_BaseDataGroupItem",
    rename_all = "PascalCase",
    foreign_key = "GroupID"
)]
pub struct BaseDataGroupItem {
    #[sluice(name = "ID")]
    pub id: i32,
    #[sluice(name = "GroupID")]
    pub group_id: i32,
    pub code: String,
    pub quantity: i16,
}

#[derive(Entity, Default, Debug, Clone, PartialEq)]
#[sluice(table = "FD_GroupNote", rename_all = "PascalCase")]
pub struct GroupNote {
    #[sluice(name = "ID")]
    pub id: i32,
    pub text: String,
}

/// Counts the region lookups that reached the backing store.
pub static REGION_LOADS: AtomicUsize = AtomicUsize::new(0);

static REGIONS: LazyLock<MemoryCache> = LazyLock::new(MemoryCache::new);

/// Converter reading a region id column into the region name, through a cached lookup table.
pub fn region_name(value: Value) -> Result<Value> {
    let regions = REGIONS.get_or_insert_with("regions", Duration::from_secs(300), || {
        REGION_LOADS.fetch_add(1, Ordering::Relaxed);
        HashMap::from([(1i64, "North"), (2, "South"), (3, "Islands")])
    });
    let name = match Option::<i64>::try_from_value(value)? {
        Some(id) => regions.get(&id).copied().unwrap_or("Unknown"),
        None => "Unassigned",
    };
    Ok(Value::from(name))
}

#[derive(Entity, Default, Debug, Clone, PartialEq)]
#[sluice(table = "FD_House", primary_key = "HouseID", auto_increment = false)]
pub struct HouseData {
    #[sluice(name = "HouseID")]
    pub id: Uuid,
    #[sluice(name = "Street")]
    pub street: String,
    #[sluice(name = "RegionID", result, converter = region_name)]
    pub region: String,
    #[sluice(name = "Price")]
    pub price: Option<f64>,
    #[sluice(name = "Listed")]
    pub listed: Option<OffsetDateTime>,
}
