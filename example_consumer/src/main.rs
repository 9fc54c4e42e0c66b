//! Example consumer: registers a demo record type next to the built-ins, migrates, and
//! runs create / list / get against PostgreSQL.
//!
//! Run from repo root: `cargo run -p example-consumer`

use crud_kernel::{
    apply_migrations, init_tracing, DatabaseConfig, EngineConfig, FieldDecl, FieldFilter, LifecycleHooks,
    ListRequest, PgStore, Record, RecordService, TypeRegistry,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Device {
    id: i64,
    name: String,
    port: i64,
    active: bool,
    owner_id: Option<i64>,
}

impl Record for Device {
    const TYPE_NAME: &'static str = "Device";
    const TABLE_NAME: &'static str = "devices";
    const TITLE: &'static str = "Devices";
    const API_PATH: &'static str = "/api/device";

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::integer("ID").json("id").hidden(),
            FieldDecl::text("Name").json("name"),
            FieldDecl::integer("Port").json("port").extras("short-span"),
            FieldDecl::bool("Active").json("active"),
            FieldDecl::integer("OwnerId").json("owner_id").hidden(),
            FieldDecl::relation("Owner", "User", "owner_id").optional(),
        ]
    }
}

impl LifecycleHooks for Device {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("crud_kernel=info,example_consumer=info");

    let db = DatabaseConfig::from_env()?;
    let engine = EngineConfig::from_env()?;
    let store = PgStore::connect(&db).await?;

    let mut registry = TypeRegistry::with_builtins();
    registry.register::<Device>();
    apply_migrations(store.pool(), &registry).await?;
    let service = RecordService::new(Arc::new(registry), engine);

    let device: Device = service
        .create(&store, json!({ "name": "edge-gateway", "port": 8080, "active": true }))
        .await?;
    tracing::info!(id = device.id, "created device");

    let request = ListRequest::default().with_filter("port", FieldFilter::between("1024", "65535"));
    let page = service.list::<Device, _>(&store, &request).await?;
    tracing::info!(total = page.total, pages = page.total_pages, "listed devices");

    let loaded: Device = service.get(&store, &device.id.to_string()).await?;
    tracing::info!(name = %loaded.name, "loaded device");

    let schema = serde_json::to_string_pretty(service.describe("device")?)?;
    println!("{}", schema);
    Ok(())
}
