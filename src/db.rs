use sea_orm::sea_query::TableCreateStatement;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Schema,
    Statement,
};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::entity::{
    department, department_location, department_position, location, op_log, position,
};

/// Initialize database connection and auto-migrate tables
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let database_url = config.connection_url();

    info!("Connecting to database: {}:{}/{}", config.host, config.port, config.name);

    let mut opt = ConnectOptions::new(&database_url);
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .set_schema_search_path("public");

    let db = Database::connect(opt).await?;
    info!("Database connection established");

    auto_migrate(&db).await?;

    Ok(db)
}

/// Auto-migrate database tables
async fn auto_migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    info!("Running auto-migration for all entities...");

    // 1. Independent tables first
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(department::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(location::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(position::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(op_log::Entity)).await?;

    // 2. Association tables
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(department_location::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(department_position::Entity)).await?;

    // 3. Indexes the tree queries depend on
    ensure_indexes(db, backend).await?;

    info!("Auto-migration completed successfully");
    Ok(())
}

/// Indexes for the materialized-path tree. The `text_pattern_ops` index is
/// what makes the `path LIKE 'prefix.%'` subtree selection a range scan
/// instead of a sequential scan.
async fn ensure_indexes(db: &DatabaseConnection, backend: DbBackend) -> Result<(), DbErr> {
    const INDEX_DDL: &[&str] = &[
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_org_department_path ON org_department (path)",
        "CREATE INDEX IF NOT EXISTS idx_org_department_path_prefix ON org_department (path text_pattern_ops)",
        "CREATE INDEX IF NOT EXISTS idx_org_department_parent_id ON org_department (parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_org_department_expired ON org_department (deleted_at) WHERE is_active = FALSE",
        "CREATE INDEX IF NOT EXISTS idx_org_department_location_dept ON org_department_location (department_id)",
        "CREATE INDEX IF NOT EXISTS idx_org_department_location_loc ON org_department_location (location_id)",
        "CREATE INDEX IF NOT EXISTS idx_org_department_position_dept ON org_department_position (department_id)",
        "CREATE INDEX IF NOT EXISTS idx_org_department_position_pos ON org_department_position (position_id)",
    ];

    for ddl in INDEX_DDL {
        db.execute(Statement::from_string(backend, ddl.to_string())).await?;
    }

    Ok(())
}

/// Create a table if it doesn't exist
async fn create_table_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: TableCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();

    let sql = backend.build(&stmt);

    db.execute(Statement::from_string(backend, sql.to_string())).await?;

    Ok(())
}
