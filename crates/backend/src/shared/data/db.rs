use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement};
use std::path::Path;

/// Таблицы, которые должны существовать до старта сервиса
const SCHEMA: &[(&str, &str)] = &[
    (
        "a001_product",
        r#"
        CREATE TABLE IF NOT EXISTS a001_product (
            id TEXT PRIMARY KEY NOT NULL,
            external_id INTEGER NOT NULL UNIQUE,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            price TEXT NOT NULL,
            discount_percentage TEXT NOT NULL DEFAULT '0',
            rating TEXT NOT NULL,
            stock INTEGER NOT NULL,
            brand TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL DEFAULT '',
            thumbnail TEXT NOT NULL DEFAULT '',
            images TEXT NOT NULL DEFAULT '[]',
            created_at TEXT,
            updated_at TEXT
        );
        "#,
    ),
    (
        "sys_import_jobs",
        r#"
        CREATE TABLE IF NOT EXISTS sys_import_jobs (
            -- временные метки в миллисекундах Unix
            id TEXT PRIMARY KEY NOT NULL,
            queue_name TEXT NOT NULL,
            name TEXT NOT NULL,
            payload TEXT NOT NULL,
            state TEXT NOT NULL,
            progress INTEGER NOT NULL DEFAULT 0,
            attempts_made INTEGER NOT NULL DEFAULT 0,
            options TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            processed_on INTEGER,
            finished_on INTEGER,
            delay_until INTEGER,
            locked_until INTEGER,
            lock_token TEXT,
            failed_reason TEXT,
            return_value TEXT
        );
        "#,
    ),
    (
        "idx_sys_import_jobs_queue_state",
        "CREATE INDEX IF NOT EXISTS idx_sys_import_jobs_queue_state ON sys_import_jobs (queue_name, state);",
    ),
];

/// Открывает SQLite-базу (создает файл при необходимости) и применяет схему
pub async fn initialize_database(db_file: &Path) -> anyhow::Result<DatabaseConnection> {
    if let Some(parent) = db_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let absolute_path = if db_file.is_absolute() {
        db_file.to_path_buf()
    } else {
        std::env::current_dir()?.join(db_file)
    };
    // Normalize path separators and ensure proper URL form on Windows
    let normalized = absolute_path.to_string_lossy().replace('\\', "/");
    let needs_leading_slash = !normalized.starts_with('/') && normalized.contains(':');
    let prefix = if needs_leading_slash { "/" } else { "" };
    let db_url = format!("sqlite://{}{}?mode=rwc", prefix, normalized);

    tracing::info!("Opening database at {}", absolute_path.display());
    let conn = Database::connect(&db_url).await?;
    apply_schema(&conn).await?;
    Ok(conn)
}

pub async fn apply_schema(conn: &DatabaseConnection) -> anyhow::Result<()> {
    for (name, sql) in SCHEMA {
        tracing::debug!("Ensuring schema object {}", name);
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            sql.to_string(),
        ))
        .await?;
    }
    Ok(())
}

/// Временная база для тестов
#[cfg(test)]
pub async fn test_connection() -> DatabaseConnection {
    let path = std::env::temp_dir()
        .join("catalog-sync-tests")
        .join(format!("{}.db", uuid::Uuid::new_v4()));
    initialize_database(&path)
        .await
        .expect("test database")
}
