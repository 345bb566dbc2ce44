//! OR-branch queries: entities that have *either* of two component shapes.
//!
//! Run with: cargo run --example or_queries -p ecsql
//!
//! Set DATABASE_URL in .env file or environment variable.

use ecsql::query::OrBranch;
use ecsql::registry::FilterBuilderRegistry;
use ecsql::{
    create_pool, ComponentRegistry, EngineConfig, FilterOp, InMemoryComponentRegistry, PoolClient,
    Query, QueryFilter, QueryResult,
};
use serde_json::json;
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> QueryResult<()> {
    dotenvy::dotenv().ok();

    let database_url =
        env::var("DATABASE_URL").expect("DATABASE_URL must be set in .env or environment");

    let pool = create_pool(&database_url)?;
    let client = PoolClient::new(pool.get().await?);

    let components = InMemoryComponentRegistry::new();
    components.register("player".to_string(), Vec::new(), Arc::new(|v| v));
    components.register("npc".to_string(), Vec::new(), Arc::new(|v| v));
    components.register("alive".to_string(), Vec::new(), Arc::new(|v| v));

    let player_id = components.require_component_id("player")?;
    let npc_id = components.require_component_id("npc")?;
    let alive_id = components.require_component_id("alive")?;
    let components: Arc<dyn ComponentRegistry> = Arc::new(components);
    let filters = Arc::new(FilterBuilderRegistry::new());

    // ============================================
    // Every living entity that is either a named player or a hostile NPC.
    // ============================================
    println!("=== Players OR hostile NPCs, alive only ===");

    let mut query = Query::new(&client, EngineConfig::default(), components, filters);
    let entities = query
        .with(alive_id, vec![])
        .with_or(vec![
            OrBranch::new(player_id, vec![]),
            OrBranch::new(
                npc_id,
                vec![QueryFilter::new("hostile", FilterOp::Eq, json!(true))],
            ),
        ])
        .take(100)
        .exec()
        .await?;

    for entity in &entities {
        println!("{}", entity.id);
    }
    println!("\nTotal: {}", entities.len());

    Ok(())
}
