//! Cursor-based pagination: page forward through a sorted result set without
//! relying on OFFSET.
//!
//! Run with: cargo run --example cursor_pagination -p ecsql
//!
//! Set DATABASE_URL in .env file or environment variable.

use ecsql::registry::FilterBuilderRegistry;
use ecsql::{
    create_pool, ComponentRegistry, CursorDirection, EngineConfig, InMemoryComponentRegistry,
    PoolClient, Query, QueryResult, SortDirection,
};
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
    components.register("post".to_string(), Vec::new(), Arc::new(|v| v));
    let post_id = components.require_component_id("post")?;
    let components: Arc<dyn ComponentRegistry> = Arc::new(components);
    let filters = Arc::new(FilterBuilderRegistry::new());

    let page_size = 20;
    let mut cursor: Option<String> = None;
    let mut page = 1;

    loop {
        let mut query = Query::new(
            &client,
            EngineConfig::default(),
            components.clone(),
            filters.clone(),
        );
        query
            .with(post_id.clone(), vec![])
            .sort_by(post_id.clone(), "created_at", SortDirection::Desc, false)?
            .take(page_size);

        if let Some(id) = &cursor {
            query.cursor(id.clone(), CursorDirection::After)?;
        }

        let entities = query.exec().await?;
        if entities.is_empty() {
            println!("No more pages.");
            break;
        }

        println!("=== Page {page} ({} entities) ===", entities.len());
        for entity in &entities {
            println!("{}", entity.id);
        }

        if (entities.len() as i64) < page_size {
            break;
        }

        cursor = entities.last().map(|e| e.id.clone());
        page += 1;
    }

    Ok(())
}
