//! Common test fixtures: two related record types and a service over a fresh registry.

use crud_kernel::filter::Predicate;
use crud_kernel::{
    EngineConfig, FieldDecl, FilterMode, HookError, LifecycleHooks, MemoryStore, OrderBy, Record, RecordService,
    TypeRegistry,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const TOKEN_MASK: &str = "****";

/// Device ids may be given as `DEV-<n>`. The name `reserved` is refused as a conflict.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub port: i64,
    pub active: bool,
    pub token: String,
}

impl Record for Device {
    const TYPE_NAME: &'static str = "Device";
    const TABLE_NAME: &'static str = "devices";
    const TITLE: &'static str = "Devices";
    const API_PATH: &'static str = "/api/device";

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::integer("ID").json("id").hidden(),
            FieldDecl::text("Name").json("name").unique(),
            FieldDecl::integer("Port").json("port"),
            FieldDecl::bool("Active").json("active"),
            FieldDecl::text("Token").json("token").sensitive(),
        ]
    }
}

impl LifecycleHooks for Device {
    fn clean_id(raw: &str) -> Option<String> {
        raw.strip_prefix("DEV-").map(str::to_string)
    }

    fn pre_update(&mut self) -> Result<(), HookError> {
        if self.name.trim().is_empty() {
            return Err(HookError::invalid("name is required"));
        }
        if self.name == "reserved" {
            return Err(HookError::conflict("name 'reserved' is taken"));
        }
        Ok(())
    }

    fn post_load(&mut self) {
        if !self.token.is_empty() {
            self.token = TOKEN_MASK.to_string();
        }
    }
}

/// Sensor attached to a device. Retired sensors are invisible.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sensor {
    pub id: i64,
    pub label: String,
    pub retired: bool,
    pub device_id: Option<i64>,
    #[serde(rename = "Device", skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
}

impl Record for Sensor {
    const TYPE_NAME: &'static str = "Sensor";
    const TABLE_NAME: &'static str = "sensors";
    const TITLE: &'static str = "Sensors";
    const API_PATH: &'static str = "/api/sensor";
    const DISPLAY_COLUMN: &'static str = "label";

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::integer("ID").json("id").hidden(),
            FieldDecl::text("Label").json("label"),
            FieldDecl::bool("Retired").json("retired").hidden(),
            FieldDecl::integer("DeviceId").json("device_id").hidden(),
            FieldDecl::relation("Device", "Device", "device_id"),
        ]
    }
}

impl LifecycleHooks for Sensor {
    fn pre_fetch_conditions() -> Option<Predicate> {
        Some(Predicate::eq("retired", false))
    }

    fn pre_fetch_sort() -> Vec<OrderBy> {
        vec![OrderBy::asc("label")]
    }
}

/// Declared but never registered.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Gauge {
    pub id: i64,
}

impl Record for Gauge {
    const TYPE_NAME: &'static str = "Gauge";
    const TABLE_NAME: &'static str = "gauges";
    const TITLE: &'static str = "Gauges";
    const API_PATH: &'static str = "/api/gauge";

    fn fields() -> Vec<FieldDecl> {
        vec![FieldDecl::integer("ID").json("id")]
    }
}

impl LifecycleHooks for Gauge {}

pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::with_builtins();
    registry.register::<Device>();
    registry.register::<Sensor>();
    registry
}

pub fn service() -> RecordService {
    RecordService::new(Arc::new(registry()), EngineConfig::default())
}

#[allow(dead_code)]
pub fn strict_service() -> RecordService {
    let config = EngineConfig {
        filter_mode: FilterMode::Strict,
        ..EngineConfig::default()
    };
    RecordService::new(Arc::new(registry()), config)
}

pub fn object(v: Value) -> serde_json::Map<String, Value> {
    match v {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn device_row(id: i64, name: &str, port: i64) -> serde_json::Map<String, Value> {
    object(json!({ "id": id, "name": name, "port": port, "active": true, "token": format!("tok-{id}") }))
}

#[allow(dead_code)]
pub fn sensor_row(id: i64, label: &str, device_id: i64, retired: bool) -> serde_json::Map<String, Value> {
    object(json!({ "id": id, "label": label, "retired": retired, "device_id": device_id }))
}

/// A store seeded with `count` devices named `dev-01`, `dev-02`, ...
#[allow(dead_code)]
pub fn seeded_devices(count: i64) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .seed("devices", (1..=count).map(|i| device_row(i, &format!("dev-{i:02}"), 1000 + i)))
        .expect("seed devices");
    store
}
