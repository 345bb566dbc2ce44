//! `populateComponents`: batched component hydration after the main SELECT.
//!
//! One bulk SELECT per query, keyed by `entity_id IN (…) AND type_id IN (…)`
//! — the direct partition table when exactly one type-id is requested and
//! the feature is enabled, otherwise the parent `components` table. Grounded
//! on the registry's constructor/date-property metadata (§9: prefer
//! metadata-driven decoding over per-row `typeof` checks).

use crate::client::GenericClient;
use crate::config::EngineConfig;
use crate::entity::Entity;
use crate::error::QueryResult;
use crate::registry::ComponentRegistry;
use serde_json::Value;
use tokio_postgres::types::ToSql;

fn unique_sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort_unstable();
    values.dedup();
    values
}

/// Reparses declared date properties in place: any string value under one of
/// `date_properties` that parses as RFC3339 is normalized to its RFC3339
/// rendering (so downstream consumers see a single date shape regardless of
/// what got persisted).
fn reparse_date_properties(payload: &mut Value, date_properties: &[String]) {
    let Some(obj) = payload.as_object_mut() else {
        return;
    };
    for prop in date_properties {
        let Some(Value::String(raw)) = obj.get(prop) else {
            continue;
        };
        if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(raw) {
            obj.insert(prop.clone(), Value::String(parsed.to_rfc3339()));
        }
    }
}

pub async fn populate_components(
    client: &impl GenericClient,
    registry: &dyn ComponentRegistry,
    config: &EngineConfig,
    entities: &mut [Entity],
    type_ids: &[String],
) -> QueryResult<()> {
    if entities.is_empty() || type_ids.is_empty() {
        return Ok(());
    }

    let entity_ids = unique_sorted(entities.iter().map(|e| e.id.clone()).collect());
    let type_ids: Vec<String> = unique_sorted(type_ids.to_vec());

    let use_direct_partition = type_ids.len() == 1 && config.direct_partition_available();

    let rows = if use_direct_partition {
        let table = registry.require_partition_table(&type_ids[0])?;
        let sql = format!(
            "SELECT entity_id, type_id, data FROM {table} WHERE entity_id = ANY($1) AND deleted_at IS NULL"
        );
        let params: [&(dyn ToSql + Sync); 1] = [&entity_ids];
        client.query(&sql, &params).await?
    } else {
        let sql = "SELECT entity_id, type_id, data FROM components WHERE entity_id = ANY($1) AND type_id = ANY($2) AND deleted_at IS NULL";
        let params: [&(dyn ToSql + Sync); 2] = [&entity_ids, &type_ids];
        client.query(sql, &params).await?
    };

    for row in rows {
        let entity_id: String = row.get("entity_id");
        let type_id: String = row.get("type_id");
        let mut payload: Value = row.get("data");

        if let Some(constructor) = registry.constructor(&type_id) {
            payload = constructor(payload);
        }
        reparse_date_properties(&mut payload, &registry.date_properties(&type_id));

        if let Some(entity) = entities.iter_mut().find(|e| e.id == entity_id) {
            entity.set_component(type_id, payload);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unique_sorted_dedups_and_orders() {
        let out = unique_sorted(vec!["b".to_string(), "a".to_string(), "b".to_string()]);
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn reparse_normalizes_valid_rfc3339_dates() {
        let mut payload = json!({"updated_at": "2024-01-02T03:04:05Z", "other": "x"});
        reparse_date_properties(&mut payload, &["updated_at".to_string()]);
        assert_eq!(payload["updated_at"], json!("2024-01-02T03:04:05+00:00"));
        assert_eq!(payload["other"], json!("x"));
    }

    #[test]
    fn reparse_ignores_unparsable_or_absent_properties() {
        let mut payload = json!({"updated_at": "not-a-date"});
        reparse_date_properties(&mut payload, &["updated_at".to_string(), "missing".to_string()]);
        assert_eq!(payload["updated_at"], json!("not-a-date"));
    }
}
