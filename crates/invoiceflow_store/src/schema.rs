//! Idempotent schema creation.
//!
//! Check constraints enforce the enumerations, unique constraints the
//! natural keys, and the cascade rules follow ownership: automations own
//! sources/exports/jobs, jobs own their export history, users own
//! automations but only soft-own audit rows (SET NULL).

use sqlx::{Pool, Sqlite};

use crate::StoreResult;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        hashed_password TEXT NOT NULL,
        language TEXT NOT NULL DEFAULT 'fr',
        timezone TEXT NOT NULL DEFAULT 'Europe/Paris',
        role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('admin', 'user')),
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS automations (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT,
        schedule TEXT,
        from_date_rule TEXT,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (user_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sources (
        id INTEGER PRIMARY KEY,
        automation_id INTEGER NOT NULL REFERENCES automations(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        type TEXT NOT NULL CHECK (type IN ('portal', 'mobile_portal', 'mailbox')),
        email_sender_from TEXT,
        email_subject_contains TEXT,
        extraction_params TEXT,
        max_results INTEGER NOT NULL DEFAULT 30,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS exports (
        id INTEGER PRIMARY KEY,
        automation_id INTEGER NOT NULL REFERENCES automations(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        type TEXT NOT NULL CHECK (type IN ('filesystem', 'cloud_drive', 'accounting')),
        configuration TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS source_export_mappings (
        id INTEGER PRIMARY KEY,
        source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
        export_id INTEGER NOT NULL REFERENCES exports(id) ON DELETE CASCADE,
        priority INTEGER NOT NULL DEFAULT 1,
        conditions TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (source_id, export_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY,
        automation_id INTEGER NOT NULL REFERENCES automations(id) ON DELETE CASCADE,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'running', 'completed', 'failed', 'cancelled')),
        from_date TEXT,
        max_results INTEGER,
        started_at TEXT,
        completed_at TEXT,
        error_message TEXT,
        stats TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS export_history (
        id INTEGER PRIMARY KEY,
        job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
        export_id INTEGER REFERENCES exports(id) ON DELETE SET NULL,
        export_type TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('success', 'failed', 'duplicate_skipped')),
        exported_at TEXT NOT NULL,
        external_reference TEXT,
        error_message TEXT,
        context TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY,
        user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
        action TEXT NOT NULL,
        resource_type TEXT,
        resource_id INTEGER,
        timestamp TEXT NOT NULL,
        ip_address TEXT,
        user_agent TEXT,
        details TEXT
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_automations_user ON automations (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_sources_automation ON sources (automation_id)",
    "CREATE INDEX IF NOT EXISTS idx_exports_automation ON exports (automation_id)",
    "CREATE INDEX IF NOT EXISTS idx_mappings_source ON source_export_mappings (source_id)",
    "CREATE INDEX IF NOT EXISTS idx_mappings_export ON source_export_mappings (export_id)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_automation ON jobs (automation_id)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status)",
    "CREATE INDEX IF NOT EXISTS idx_export_history_job ON export_history (job_id)",
    "CREATE INDEX IF NOT EXISTS idx_export_history_export ON export_history (export_id)",
    "CREATE INDEX IF NOT EXISTS idx_export_history_status ON export_history (status)",
    "CREATE INDEX IF NOT EXISTS idx_audit_log_user ON audit_log (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log (timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_audit_log_resource ON audit_log (resource_type, resource_id)",
];

pub(crate) async fn init(pool: &Pool<Sqlite>) -> StoreResult<()> {
    for statement in TABLES.iter().chain(INDEXES) {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
