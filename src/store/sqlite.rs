use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::{StorageNotice, TenantDatabase, TenantFilter};

const TENANT_COLUMNS: &str = "id, flavor, host, port, name, user, password, owner_id, owner_email,
     created_at, allocated_size_kb, default_storage_kb, disabled, admin_disabled, deleted,
     write_revoked, storage_notice, provisioned";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn query_tenants<P: rusqlite::Params>(
        &self,
        where_clause: &str,
        params: P,
    ) -> Result<Vec<TenantDatabase>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenant_databases WHERE {where_clause} ORDER BY created_at, id"
        ))?;

        let rows = stmt.query_map(params, row_to_tenant)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_notice(s: &str) -> StorageNotice {
    StorageNotice::parse(s).unwrap_or_else(|| {
        tracing::error!("Invalid storage notice in database: '{}'", s);
        StorageNotice::None
    })
}

fn row_to_tenant(row: &Row<'_>) -> rusqlite::Result<TenantDatabase> {
    Ok(TenantDatabase {
        id: row.get(0)?,
        flavor: row.get(1)?,
        host: row.get(2)?,
        port: row.get(3)?,
        name: row.get(4)?,
        user: row.get(5)?,
        password: row.get(6)?,
        owner_id: row.get(7)?,
        owner_email: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?),
        allocated_size_kb: row.get(10)?,
        default_storage_kb: row.get(11)?,
        disabled: row.get(12)?,
        admin_disabled: row.get(13)?,
        deleted: row.get(14)?,
        write_revoked: row.get(15)?,
        storage_notice: parse_notice(&row.get::<_, String>(16)?),
        provisioned: row.get(17)?,
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn create_tenant(&self, tenant: &TenantDatabase) -> Result<()> {
        let result = self.conn().execute(
            &format!(
                "INSERT INTO tenant_databases ({TENANT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
            ),
            params![
                tenant.id,
                tenant.flavor,
                tenant.host,
                tenant.port,
                tenant.name,
                tenant.user,
                tenant.password,
                tenant.owner_id,
                tenant.owner_email,
                format_datetime(&tenant.created_at),
                tenant.allocated_size_kb,
                tenant.default_storage_kb,
                tenant.disabled,
                tenant.admin_disabled,
                tenant.deleted,
                tenant.write_revoked,
                tenant.storage_notice.as_str(),
                tenant.provisioned,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::IdentifierCollision)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_tenant(&self, id: &str) -> Result<Option<TenantDatabase>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TENANT_COLUMNS} FROM tenant_databases WHERE id = ?1"),
            params![id],
            row_to_tenant,
        )
        .optional()
        .map_err(Error::from)
    }

    fn identifiers_in_use(&self, name: &str, user: &str) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM tenant_databases WHERE name = ?1 OR user = ?2",
            params![name, user],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_tenants(&self, filter: &TenantFilter) -> Result<Vec<TenantDatabase>> {
        self.query_tenants(
            "provisioned = 1
             AND (?1 IS NULL OR owner_id = ?1)
             AND (?2 IS NULL OR flavor = ?2)
             AND (?3 OR deleted = 0)",
            params![filter.owner_id, filter.flavor, filter.include_deleted],
        )
    }

    fn list_live_tenants(&self) -> Result<Vec<TenantDatabase>> {
        self.query_tenants("provisioned = 1 AND deleted = 0", [])
    }

    fn list_pending_tenants(&self, older_than: DateTime<Utc>) -> Result<Vec<TenantDatabase>> {
        // RFC 3339 text in UTC sorts chronologically.
        self.query_tenants(
            "provisioned = 0 AND created_at < ?1",
            params![format_datetime(&older_than)],
        )
    }

    fn update_tenant(&self, tenant: &TenantDatabase) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE tenant_databases SET
                password = ?1, owner_email = ?2, allocated_size_kb = ?3, default_storage_kb = ?4,
                disabled = ?5, admin_disabled = ?6, deleted = ?7, write_revoked = ?8,
                storage_notice = ?9, provisioned = ?10
             WHERE id = ?11",
            params![
                tenant.password,
                tenant.owner_email,
                tenant.allocated_size_kb,
                tenant.default_storage_kb,
                tenant.disabled,
                tenant.admin_disabled,
                tenant.deleted,
                tenant.write_revoked,
                tenant.storage_notice.as_str(),
                tenant.provisioned,
                tenant.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn record_storage_usage(&self, id: &str, used_kb: i64) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE tenant_databases SET default_storage_kb = ?1 WHERE id = ?2",
            params![used_kb, id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn mark_provisioned(&self, id: &str) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE tenant_databases SET provisioned = 1 WHERE id = ?1",
            params![id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_tenant(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tenant_databases WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
