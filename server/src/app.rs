//! Core application

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use crate::api::types::{BatchUpdateResponse, PaginatedResponse};
use crate::core::cli::{self, Assignment, Commands, QueryArgs};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME, DEFAULT_LOG_FILTER, ENV_LOG};
use crate::data::entities::{self, EntityDef};
use crate::data::postgres::{
    BatchOptions, FetchOptions, FetchPlan, FetchQuery, PostgresService, SelectQuery, UpdateSet,
    batch_update, fetch_paginated, plan_batch_update, plan_fetch,
};
use crate::data::query::operators::allowed_operators;
use crate::data::query::{ActingIdentity, ParamValue, RuleGroup, parse_rules_json};

/// One fetched row as a JSON document
struct JsonRow(serde_json::Value);

impl<'r> FromRow<'r, PgRow> for JsonRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(row.try_get("data")?))
    }
}

/// SQL and binds for one planned statement
#[derive(Debug, Serialize)]
struct ExplainOutput<'a> {
    entity: &'a str,
    count_sql: &'a str,
    fetch_sql: &'a str,
    binds: &'a [ParamValue],
    limit: Option<i64>,
    offset: i64,
    rules: usize,
}

impl<'a> ExplainOutput<'a> {
    fn new(entity: &'a EntityDef, plan: &'a FetchPlan) -> Self {
        Self {
            entity: entity.name,
            count_sql: &plan.count_sql,
            fetch_sql: &plan.fetch_sql,
            binds: plan.binds.values(),
            limit: plan.limit,
            offset: plan.offset,
            rules: plan.rule_count,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldInfo {
    name: String,
    #[serde(rename = "type")]
    filter_type: &'static str,
    nullable: bool,
    operators: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct EntityInfo {
    name: &'static str,
    table: &'static str,
    primary_key: &'static [&'static str],
    sortable: &'static [&'static str],
    fields: Vec<FieldInfo>,
    /// Column name to PostgreSQL type, for `update --set`
    writable: serde_json::Map<String, serde_json::Value>,
}

impl EntityInfo {
    fn new(entity: &EntityDef) -> Self {
        let mut fields: Vec<FieldInfo> = entity
            .filters
            .names()
            .filter_map(|name| {
                entity.filters.get(name).map(|descriptor| FieldInfo {
                    name: name.to_string(),
                    filter_type: descriptor.filter_type.as_str(),
                    nullable: descriptor.nullable,
                    operators: allowed_operators(descriptor.filter_type)
                        .iter()
                        .map(|op| op.as_str())
                        .collect(),
                    values: descriptor.enum_values.clone(),
                })
            })
            .collect();
        fields.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            name: entity.name,
            table: entity.table,
            primary_key: entity.primary_key,
            sortable: entity.sortable,
            fields,
            writable: entity
                .columns
                .iter()
                .map(|(name, column_type)| (name.to_string(), column_type.as_sql().into()))
                .collect(),
        }
    }
}

pub struct CoreApp {
    pub config: AppConfig,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!(app = APP_NAME, "Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let app = Self {
            config: AppConfig::load(&cli_config)?,
        };

        match command {
            Commands::Explain(args) => app.explain(&args),
            Commands::Fetch(args) => app.fetch(&args).await,
            Commands::Update {
                query,
                assignments,
                dry_run,
            } => app.update(&query, &assignments, dry_run).await,
            Commands::Entities => Self::list_entities(),
        }
    }

    fn init_logging() {
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }

    async fn connect(&self) -> Result<PostgresService> {
        PostgresService::init(&self.config.database.postgres)
            .await
            .context("Failed to connect to PostgreSQL")
    }

    fn plan(
        &self,
        args: &QueryArgs,
        identity: Option<&ActingIdentity>,
    ) -> Result<(&'static EntityDef, FetchPlan)> {
        let entity = resolve_entity(&args.entity)?;
        let query = fetch_query(args)?;
        let options = FetchOptions::default()
            .with_identity(identity)
            .with_limits(self.config.query.page_limits());
        let plan = plan_fetch(entity, &query, &options)?;
        Ok((entity, plan))
    }

    fn explain(&self, args: &QueryArgs) -> Result<()> {
        let identity = acting_identity(args);
        let (entity, plan) = self.plan(args, identity.as_ref())?;
        print_json(&ExplainOutput::new(entity, &plan))
    }

    async fn fetch(&self, args: &QueryArgs) -> Result<()> {
        let entity = resolve_entity(&args.entity)?;
        let query = fetch_query(args)?;
        let identity = acting_identity(args);

        let document = format!("to_jsonb({}) AS data", entity.alias);
        let as_json = move |select: &mut SelectQuery| {
            select.select(&[document.as_str()]);
        };
        let options = FetchOptions::default()
            .with_identity(identity.as_ref())
            .with_limits(self.config.query.page_limits())
            .with_query_hook(&as_json);

        let db = self.connect().await?;
        let result = fetch_paginated::<JsonRow>(db.pool(), entity, &query, &options).await;
        db.close().await;

        let page = PaginatedResponse::from(result?.map(|row| row.0));
        print_json(&page)
    }

    async fn update(
        &self,
        args: &QueryArgs,
        assignments: &[Assignment],
        dry_run: bool,
    ) -> Result<()> {
        let entity = resolve_entity(&args.entity)?;
        let rules = update_rules(args)?;
        let identity = acting_identity(args);
        let update = assignments.iter().fold(UpdateSet::new(), |update, assignment| {
            update.set(&assignment.column, assignment.value.clone())
        });
        let options = BatchOptions {
            identity: identity.as_ref(),
            handlers: None,
            now: Some(Utc::now()),
        };

        if dry_run {
            let plan = plan_batch_update(entity, &rules, &update, false, &options)?;
            return print_json(&serde_json::json!({
                "entity": entity.name,
                "sql": plan.sql,
                "binds": plan.binds.values(),
            }));
        }

        let db = self.connect().await?;
        let result = batch_update(db.pool(), entity, &rules, &update, &options).await;
        db.close().await;

        print_json(&BatchUpdateResponse {
            affected: result?,
            ids: None,
        })
    }

    fn list_entities() -> Result<()> {
        let infos: Vec<EntityInfo> = entities::all()
            .into_iter()
            .map(EntityInfo::new)
            .collect();
        print_json(&infos)
    }
}

fn resolve_entity(name: &str) -> Result<&'static EntityDef> {
    entities::by_name(name).with_context(|| {
        format!(
            "Unknown entity '{}'. Known entities: {}",
            name,
            entities::names().join(", ")
        )
    })
}

fn parse_rules(args: &QueryArgs) -> Result<Option<RuleGroup>> {
    args.rules
        .as_deref()
        .map(parse_rules_json)
        .transpose()
        .context("Invalid --rules")
}

fn fetch_query(args: &QueryArgs) -> Result<FetchQuery> {
    Ok(FetchQuery {
        rules: parse_rules(args)?,
        sort: args.sort.clone(),
        order: args.order,
        limit: args.limit,
        offset: args.offset,
    })
}

/// Updates never default to every row; an explicit empty AND group is needed
fn update_rules(args: &QueryArgs) -> Result<RuleGroup> {
    parse_rules(args)?.with_context(|| {
        r#"update needs --rules; pass '{"condition":"AND","rules":[]}' to update every row"#
    })
}

fn acting_identity(args: &QueryArgs) -> Option<ActingIdentity> {
    args.acting_as.as_ref().map(|id| {
        if args.admin {
            ActingIdentity::admin(id.clone())
        } else {
            ActingIdentity::new(id.clone())
        }
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", output);
    Ok(())
}
