pub const SCHEMA: &str = r#"
-- One row per tenant database provisioned on a shared engine
CREATE TABLE IF NOT EXISTS tenant_databases (
    id TEXT PRIMARY KEY,
    flavor TEXT NOT NULL,              -- mysql | postgres
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    name TEXT NOT NULL UNIQUE,
    user TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    owner_email TEXT,
    created_at TEXT DEFAULT (datetime('now')),

    -- Quota and last measured usage, in KB
    allocated_size_kb INTEGER NOT NULL DEFAULT 1048576,
    default_storage_kb INTEGER,

    -- Access flags; admin_disabled overrides disabled, deleted is terminal
    disabled INTEGER NOT NULL DEFAULT 0,
    admin_disabled INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    write_revoked INTEGER NOT NULL DEFAULT 0,

    storage_notice TEXT NOT NULL DEFAULT 'none',  -- none | warning | breach

    -- 0 while the engine side of creation has not been confirmed
    provisioned INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_tenant_databases_owner ON tenant_databases(owner_id);
CREATE INDEX IF NOT EXISTS idx_tenant_databases_live ON tenant_databases(provisioned, deleted);
"#;
