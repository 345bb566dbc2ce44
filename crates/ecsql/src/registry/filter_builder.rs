//! Custom filter operator registry.
//!
//! Lets plugins register SQL-emitting functions for operators beyond the
//! built-in set (`=`, `!=`, `<`, `<=`, `>`, `>=`, `LIKE`, `ILIKE`, `IN`, `NOT IN`).
//! Concurrency uses a `RwLock` rather than a spin flag: writes only happen at
//! plugin-load time, reads happen on every query.

use crate::error::{QueryError, QueryResult};
use crate::query::context::QueryContext;
use crate::query::filter::QueryFilter;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// `(filter, table_alias, ctx) -> (sql_fragment, params_added)`.
///
/// The builder is expected to call `ctx.add_param(...)` for each `$n` it
/// emits and return how many it added, so the registry can verify the
/// fragment's placeholder count matches.
pub type FilterBuilder =
    Arc<dyn Fn(&QueryFilter, &str, &mut QueryContext) -> QueryResult<(String, usize)> + Send + Sync>;

/// Validation hook: `true` if the filter's value is acceptable for this operator.
pub type FilterValidator = Arc<dyn Fn(&QueryFilter) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct FilterBuilderOptions {
    pub supports_lateral: bool,
    pub requires_index: bool,
    /// 0 (trivial) to 10 (expensive); informational, not enforced by the engine.
    pub complexity_score: u8,
    pub validate: Option<FilterValidator>,
}

impl Default for FilterBuilderOptions {
    fn default() -> Self {
        Self {
            supports_lateral: false,
            requires_index: false,
            complexity_score: 0,
            validate: None,
        }
    }
}

impl std::fmt::Debug for FilterBuilderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterBuilderOptions")
            .field("supports_lateral", &self.supports_lateral)
            .field("requires_index", &self.requires_index)
            .field("complexity_score", &self.complexity_score)
            .field("validate", &self.validate.is_some())
            .finish()
    }
}

/// A `major.minor.patch` version, compared numerically (not lexically).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SemVer {
    major: u32,
    minor: u32,
    patch: u32,
}

impl SemVer {
    pub fn parse(raw: &str) -> QueryResult<Self> {
        let mut parts = raw.trim().splitn(3, '.');
        let mut next = || -> QueryResult<u32> {
            parts
                .next()
                .unwrap_or("0")
                .parse::<u32>()
                .map_err(|_| QueryError::validation(format!("invalid semver: {raw}")))
        };
        Ok(Self {
            major: next()?,
            minor: next()?,
            patch: next()?,
        })
    }
}

struct RegisteredFilter {
    builder: FilterBuilder,
    options: FilterBuilderOptions,
    plugin: String,
    version: SemVer,
    registered_at: DateTime<Utc>,
}

/// Process-wide registry of custom filter operators. Constructed explicitly
/// by the application root, not a global — `clear()` resets it for tests.
#[derive(Default)]
pub struct FilterBuilderRegistry {
    operators: RwLock<HashMap<String, RegisteredFilter>>,
}

impl FilterBuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom operator. Fails `OperatorConflict` unless the same
    /// plugin is re-registering or the supplied version is strictly newer.
    pub fn register(
        &self,
        operator: impl Into<String>,
        builder: FilterBuilder,
        options: FilterBuilderOptions,
        plugin: impl Into<String>,
        version: &str,
    ) -> QueryResult<()> {
        let operator = operator.into();
        let plugin = plugin.into();
        let version = SemVer::parse(version)?;

        let mut operators = self.operators.write().expect("filter registry poisoned");
        if let Some(existing) = operators.get(&operator) {
            let same_plugin = existing.plugin == plugin;
            let is_upgrade = version > existing.version;
            if !same_plugin && !is_upgrade {
                return Err(QueryError::OperatorConflict {
                    operator,
                    existing_plugin: existing.plugin.clone(),
                });
            }
            if same_plugin && version <= existing.version && version != existing.version {
                return Err(QueryError::OperatorConflict {
                    operator,
                    existing_plugin: existing.plugin.clone(),
                });
            }
        }

        operators.insert(
            operator,
            RegisteredFilter {
                builder,
                options,
                plugin,
                version,
                registered_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn unregister(&self, operator: &str) -> bool {
        self.operators
            .write()
            .expect("filter registry poisoned")
            .remove(operator)
            .is_some()
    }

    pub fn has(&self, operator: &str) -> bool {
        self.operators
            .read()
            .expect("filter registry poisoned")
            .contains_key(operator)
    }

    pub fn get(&self, operator: &str) -> Option<FilterBuilder> {
        self.operators
            .read()
            .expect("filter registry poisoned")
            .get(operator)
            .map(|r| r.builder.clone())
    }

    pub fn get_options(&self, operator: &str) -> Option<FilterBuilderOptions> {
        self.operators
            .read()
            .expect("filter registry poisoned")
            .get(operator)
            .map(|r| r.options.clone())
    }

    pub fn list_registered(&self) -> Vec<String> {
        let operators = self.operators.read().expect("filter registry poisoned");
        let mut names: Vec<String> = operators.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registration timestamp for an operator, if registered.
    pub fn registered_at(&self, operator: &str) -> Option<DateTime<Utc>> {
        self.operators
            .read()
            .expect("filter registry poisoned")
            .get(operator)
            .map(|r| r.registered_at)
    }

    /// Test-only: drop all registrations.
    pub fn clear(&self) {
        self.operators.write().expect("filter registry poisoned").clear();
    }
}

/// `buildJsonPath`: JSON extraction for a dotted field path. `a.b.c` expands
/// to `data->'a'->'b'->>'c'`; a single segment to `data->>'field'`.
pub fn build_json_path(field: &str, alias: &str) -> String {
    let segments: Vec<&str> = field.split('.').collect();
    let mut out = String::new();
    out.push_str(alias);
    out.push_str(".data");
    for (i, seg) in segments.iter().enumerate() {
        if i + 1 == segments.len() {
            out.push_str("->>'");
        } else {
            out.push_str("->'");
        }
        out.push_str(seg);
        out.push('\'');
    }
    out
}

/// ANDs together the SQL fragments produced by a sequence of filter builders.
pub fn compose_filters(
    builders: &[FilterBuilder],
    filter: &QueryFilter,
    alias: &str,
    ctx: &mut QueryContext,
) -> QueryResult<(String, usize)> {
    let mut sql_parts = Vec::with_capacity(builders.len());
    let mut total_params = 0;
    for builder in builders {
        let (sql, added) = builder(filter, alias, ctx)?;
        sql_parts.push(sql);
        total_params += added;
    }
    Ok((sql_parts.join(" AND "), total_params))
}

/// Prefixes a builder's output with a planner hint comment: `/* INDEX: name */`.
pub fn with_index_hint(builder: FilterBuilder, hint_name: impl Into<String>) -> FilterBuilder {
    let hint_name = hint_name.into();
    Arc::new(move |filter, alias, ctx| {
        let (sql, added) = builder(filter, alias, ctx)?;
        Ok((format!("/* INDEX: {hint_name} */ {sql}"), added))
    })
}
