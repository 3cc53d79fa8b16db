use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub const LOGS_TABLE: &str = "execution_logs";
pub const SUMMARY_TABLE: &str = "trace_summaries";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS execution_logs (
        id              BIGSERIAL PRIMARY KEY,
        tenant_id       BIGINT NOT NULL,
        project_id      BIGINT NOT NULL,
        trace_id        TEXT NOT NULL,
        prompt_id       BIGINT,
        prompt_version  INTEGER,
        success         BOOLEAN NOT NULL,
        error_message   TEXT,
        duration_ms     BIGINT,
        provider        TEXT,
        model           TEXT,
        usage           TEXT,
        blob_path       TEXT,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS execution_logs_trace_idx
        ON execution_logs (tenant_id, project_id, trace_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS trace_summaries (
        id                 BIGSERIAL PRIMARY KEY,
        tenant_id          BIGINT NOT NULL,
        project_id         BIGINT NOT NULL,
        trace_id           TEXT NOT NULL,
        total_logs         BIGINT NOT NULL,
        success_count      BIGINT NOT NULL,
        error_count        BIGINT NOT NULL,
        total_duration_ms  BIGINT NOT NULL,
        first_log_at       TIMESTAMPTZ NOT NULL,
        last_log_at        TIMESTAMPTZ NOT NULL,
        usage_rollup       TEXT,
        snapshot_path      TEXT NOT NULL,
        marker             UUID NOT NULL,
        created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT trace_summaries_trace_key UNIQUE (tenant_id, project_id, trace_id)
    )
    "#,
];

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Create the execution-log and summary tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("Schema ensured ({}, {})", LOGS_TABLE, SUMMARY_TABLE);
    Ok(())
}

/// Count summary rows, used by the health endpoint.
pub async fn summary_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let count: Option<i64> = sqlx::query_scalar("SELECT COUNT(*)::bigint FROM trace_summaries")
        .fetch_one(pool)
        .await?;
    Ok(count.unwrap_or(0))
}
