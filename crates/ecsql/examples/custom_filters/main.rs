//! Registering a custom filter operator and using it in a query.
//!
//! Run with: cargo run --example custom_filters -p ecsql
//!
//! Set DATABASE_URL in .env file or environment variable.

use ecsql::registry::{FilterBuilderOptions, FilterBuilderRegistry};
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
    components.register("location".to_string(), Vec::new(), Arc::new(|v| v));
    let location_id = components.require_component_id("location")?;
    let components: Arc<dyn ComponentRegistry> = Arc::new(components);

    // ============================================
    // Register a "within_radius" operator: filters rows whose JSON
    // `{lat, lng}` pair is within a given distance (in meters) of a point.
    // The filter's value is `[lat, lng, radius_m]`.
    // ============================================
    let filters = FilterBuilderRegistry::new();
    filters.register(
        "within_radius",
        Arc::new(|filter, alias, ctx| {
            let coords = filter
                .value
                .as_array()
                .ok_or_else(|| ecsql::QueryError::validation("within_radius expects [lat, lng, radius_m]"))?;
            let lat = coords[0].as_f64().unwrap_or(0.0);
            let lng = coords[1].as_f64().unwrap_or(0.0);
            let radius = coords[2].as_f64().unwrap_or(0.0);

            let lat_idx = ctx.add_param(lat);
            let lng_idx = ctx.add_param(lng);
            let radius_idx = ctx.add_param(radius);
            let sql = format!(
                "earth_distance(ll_to_earth((({alias}.data->>'lat')::double precision), \
                 (({alias}.data->>'lng')::double precision)), ll_to_earth(${lat_idx}, ${lng_idx})) <= ${radius_idx}"
            );
            Ok((sql, 3))
        }),
        FilterBuilderOptions {
            supports_lateral: true,
            requires_index: false,
            complexity_score: 6,
            validate: Some(Arc::new(|filter| filter.value.as_array().is_some_and(|a| a.len() == 3))),
        },
        "geo-filters",
        "1.0.0",
    )?;
    let filters = Arc::new(filters);

    // ============================================
    // Entities with a location within 5km of a point.
    // ============================================
    let mut query = Query::new(&client, EngineConfig::default(), components, filters);
    let entities = query
        .with(
            location_id,
            vec![QueryFilter::new(
                "lat",
                FilterOp::Custom("within_radius".to_string()),
                json!([37.7749, -122.4194, 5000.0]),
            )],
        )
        .take(50)
        .exec()
        .await?;

    println!("Entities within radius: {}", entities.len());
    for entity in &entities {
        println!("{}", entity.id);
    }

    Ok(())
}
