//! Benchmark the DAG planner and SQL renderer across plan shapes and filter
//! counts.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ecsql::query::{FilterOp, QueryContext, QueryFilter, build_basic_query};
use ecsql::registry::{FilterBuilderRegistry, type_id_for};
use ecsql::{EngineConfig, InMemoryComponentRegistry, QueryResult};
use serde_json::json;
use std::sync::Arc;

fn make_ctx(required: usize, filters_per_component: usize) -> QueryContext {
    let mut ctx = QueryContext::default();
    for i in 0..required {
        let type_id = type_id_for(&format!("component_{i}"));
        ctx.component_ids.push(type_id.clone());
        let filters = ctx.component_filters.entry(type_id).or_default();
        for j in 0..filters_per_component {
            filters.push(QueryFilter::new(
                format!("field_{j}"),
                FilterOp::Eq,
                json!(j),
            ));
        }
    }
    ctx
}

fn registry(required: usize) -> InMemoryComponentRegistry {
    let registry = InMemoryComponentRegistry::new();
    for i in 0..required {
        registry.register(format!("component_{i}"), Vec::new(), Arc::new(|v| v));
    }
    registry
}

fn bench_build_basic_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_planning/build_basic_query");

    for required in [1, 3, 5] {
        for filters_per_component in [0, 1, 3] {
            let ctx = make_ctx(required, filters_per_component);
            let label = format!("{required}req_{filters_per_component}filt");
            group.bench_with_input(BenchmarkId::from_parameter(label), &ctx, |b, ctx| {
                b.iter(|| black_box(build_basic_query(ctx)));
            });
        }
    }

    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_planning/execute");
    let config = EngineConfig::default();
    let filter_registry = FilterBuilderRegistry::new();

    for required in [1, 3, 5] {
        for filters_per_component in [0, 1, 3] {
            let component_registry = registry(required);
            let label = format!("{required}req_{filters_per_component}filt");
            group.bench_with_input(
                BenchmarkId::from_parameter(label),
                &(required, filters_per_component),
                |b, &(required, filters_per_component)| {
                    b.iter(|| -> QueryResult<()> {
                        let mut ctx = make_ctx(required, filters_per_component);
                        let dag_root = build_basic_query(&ctx);
                        let dag = ecsql::query::QueryDAG::new(dag_root);
                        let sql = dag.execute(&mut ctx, &config, &component_registry, &filter_registry)?;
                        black_box(sql);
                        Ok(())
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_build_basic_query, bench_execute);
criterion_main!(benches);
