use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let conn = manager.get_connection();

        let sql = match backend {
            sea_orm::DatabaseBackend::Postgres => {
                r#"
CREATE TABLE IF NOT EXISTS tenants (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    region TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    owner_type TEXT NOT NULL,
    role TEXT NOT NULL,
    status TEXT NOT NULL,
    labels JSONB NULL,
    user_groups JSONB NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tenants_region ON tenants(region);
CREATE INDEX IF NOT EXISTS idx_tenants_status ON tenants(status);
CREATE INDEX IF NOT EXISTS idx_tenants_page ON tenants(created_at DESC, id DESC);

CREATE TABLE IF NOT EXISTS systems (
    external_id TEXT NOT NULL,
    "type" TEXT NOT NULL,
    tenant_id TEXT NULL,
    labels JSONB NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (external_id, "type")
);
CREATE INDEX IF NOT EXISTS idx_systems_tenant ON systems(tenant_id);

CREATE TABLE IF NOT EXISTS regional_systems (
    external_id TEXT NOT NULL,
    "type" TEXT NOT NULL,
    region TEXT NOT NULL,
    l2_key_id TEXT NOT NULL,
    has_l1_key_claim BOOLEAN NOT NULL DEFAULT FALSE,
    status TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (external_id, "type", region),
    FOREIGN KEY (external_id, "type") REFERENCES systems(external_id, "type") ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS auths (
    external_id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    "type" TEXT NOT NULL,
    properties JSONB NULL,
    status TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_auths_tenant ON auths(tenant_id);
                "#
            }
            sea_orm::DatabaseBackend::Sqlite => {
                r#"
CREATE TABLE IF NOT EXISTS tenants (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    region TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    owner_type TEXT NOT NULL,
    role TEXT NOT NULL,
    status TEXT NOT NULL,
    labels TEXT NULL,
    user_groups TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tenants_region ON tenants(region);
CREATE INDEX IF NOT EXISTS idx_tenants_status ON tenants(status);

CREATE TABLE IF NOT EXISTS systems (
    external_id TEXT NOT NULL,
    "type" TEXT NOT NULL,
    tenant_id TEXT NULL,
    labels TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (external_id, "type")
);
CREATE INDEX IF NOT EXISTS idx_systems_tenant ON systems(tenant_id);

CREATE TABLE IF NOT EXISTS regional_systems (
    external_id TEXT NOT NULL,
    "type" TEXT NOT NULL,
    region TEXT NOT NULL,
    l2_key_id TEXT NOT NULL,
    has_l1_key_claim INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (external_id, "type", region),
    FOREIGN KEY (external_id, "type") REFERENCES systems(external_id, "type") ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS auths (
    external_id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    "type" TEXT NOT NULL,
    properties TEXT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_auths_tenant ON auths(tenant_id);
                "#
            }
            sea_orm::DatabaseBackend::MySql => {
                return Err(DbErr::Migration(
                    "unsupported backend: mysql".to_owned(),
                ))
            }
        };

        conn.execute_unprepared(sql).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();
        conn.execute_unprepared(
            "DROP TABLE IF EXISTS auths;
             DROP TABLE IF EXISTS regional_systems;
             DROP TABLE IF EXISTS systems;
             DROP TABLE IF EXISTS tenants;",
        )
        .await?;
        Ok(())
    }
}
