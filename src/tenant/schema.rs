//! Schema for a single tenant's SQLite file (§6 persisted state layout).
//! Applied once per freshly opened connection, cached on the
//! [`super::TenantHandle`] for its lifetime (§9: "per-connection schema
//! compilation caches should be part of the connection handle's lifetime").

use sqlx::SqlitePool;

/// Create every tenant table if absent. Idempotent; safe to call on every
/// connect.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if any statement fails.
pub async fn init(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS pipelines (
            id TEXT PRIMARY KEY,
            tenant_code TEXT NOT NULL,
            name TEXT NOT NULL,
            is_default INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS pipelinestages (
            id TEXT PRIMARY KEY,
            tenant_code TEXT NOT NULL,
            pipeline_id TEXT NOT NULL,
            name TEXT NOT NULL,
            position INTEGER NOT NULL,
            is_default INTEGER NOT NULL,
            is_won INTEGER NOT NULL,
            is_lost INTEGER NOT NULL,
            probability INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS leads (
            id TEXT PRIMARY KEY,
            tenant_code TEXT NOT NULL,
            first_name TEXT,
            last_name TEXT,
            email TEXT,
            phone TEXT NOT NULL,
            pipeline_id TEXT NOT NULL,
            stage_id TEXT NOT NULL,
            status TEXT NOT NULL,
            deal_value REAL,
            source TEXT,
            assigned_to TEXT,
            tags TEXT NOT NULL,
            metadata_refs TEXT NOT NULL,
            metadata_extra TEXT NOT NULL,
            score_total REAL NOT NULL,
            score_recency REAL NOT NULL,
            score_engagement REAL NOT NULL,
            score_stage_depth REAL NOT NULL,
            score_deal_size REAL NOT NULL,
            score_source_quality REAL NOT NULL,
            last_contacted_at TEXT,
            converted_at TEXT,
            is_archived INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_leads_identity
         ON leads (tenant_code, phone, pipeline_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS automationrules (
            id TEXT PRIMARY KEY,
            tenant_code TEXT NOT NULL,
            trigger TEXT NOT NULL,
            trigger_config TEXT NOT NULL,
            condition_field TEXT,
            condition_operator TEXT,
            condition_value TEXT,
            actions TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            execution_count INTEGER NOT NULL,
            last_executed_at TEXT
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_automationrules_trigger
         ON automationrules (tenant_code, trigger, is_active)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS leadactivities (
            id TEXT PRIMARY KEY,
            tenant_code TEXT NOT NULL,
            lead_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            detail TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS leadnotes (
            id TEXT PRIMARY KEY,
            tenant_code TEXT NOT NULL,
            lead_id TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            tenant_code TEXT NOT NULL,
            phone TEXT NOT NULL,
            lead_id TEXT,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_phone
         ON conversations (tenant_code, phone)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            tenant_code TEXT NOT NULL,
            conversation_id TEXT NOT NULL,
            direction TEXT NOT NULL,
            status TEXT NOT NULL,
            body TEXT NOT NULL,
            provider_message_id TEXT,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS templates (
            id TEXT PRIMARY KEY,
            tenant_code TEXT NOT NULL,
            name TEXT NOT NULL,
            language TEXT NOT NULL,
            variable_mapping TEXT NOT NULL,
            empty_variable_policy TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS broadcasts (
            id TEXT PRIMARY KEY,
            tenant_code TEXT NOT NULL,
            template_id TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
