use std::time::Duration;

use async_trait::async_trait;
use sqlx::Connection;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use tracing::{debug, warn};

use super::sql::{identifier, pg_literal};
use super::{
    DatabaseAdminDriver, DriverResult, StorageUsage, TenantConnection, bytes_to_kb,
};
use crate::config::AdminEndpoint;

const MAINTENANCE_DATABASE: &str = "postgres";

pub struct PostgresDriver {
    options: PgConnectOptions,
    pool: PgPool,
}

impl PostgresDriver {
    /// Builds the driver without connecting; the pool opens connections on
    /// first use.
    pub fn new(endpoint: &AdminEndpoint, acquire_timeout: Duration) -> Self {
        let options = PgConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port)
            .username(&endpoint.user)
            .password(&endpoint.password)
            .database(endpoint.database.as_deref().unwrap_or(MAINTENANCE_DATABASE));

        let pool = PgPoolOptions::new()
            .max_connections(endpoint.max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy_with(options.clone());

        Self { options, pool }
    }

    async fn execute(&self, statement: &str) -> DriverResult<()> {
        sqlx::raw_sql(statement).execute(&self.pool).await?;
        Ok(())
    }

    /// Best-effort cleanup; a failure is logged and otherwise ignored.
    async fn discard(&self, statement: &str) {
        if let Err(e) = self.execute(statement).await {
            warn!("postgres cleanup {statement:?} failed: {e}");
        }
    }

    /// Runs `statement` inside `dbname` on a short-lived admin connection.
    async fn execute_in(&self, dbname: &str, statement: &str) -> DriverResult<()> {
        let options = self.options.clone().database(dbname);
        let mut conn = PgConnection::connect_with(&options).await?;
        sqlx::Executor::execute(&mut conn, statement).await?;
        conn.close().await?;
        Ok(())
    }

    async fn terminate_database_sessions(&self, dbname: &str) -> DriverResult<()> {
        sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity
             WHERE datname = $1 AND pid <> pg_backend_pid()",
        )
        .bind(dbname)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn terminate_user_sessions(&self, user: &str) -> DriverResult<()> {
        sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity
             WHERE usename = $1 AND pid <> pg_backend_pid()",
        )
        .bind(user)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The database stays owned by the admin role; the tenant only receives
    /// grants, which can be taken away again.
    async fn create_tenant_database_grants(&self, name: &str, user: &str) -> DriverResult<()> {
        self.execute(&format!("REVOKE ALL ON DATABASE {name} FROM PUBLIC"))
            .await?;
        self.execute(&format!(
            "GRANT CONNECT, CREATE, TEMPORARY ON DATABASE {name} TO {user}"
        ))
        .await?;
        let schema_grant = format!("GRANT USAGE, CREATE ON SCHEMA public TO {user}");
        self.execute_in(name, &schema_grant).await
    }
}

/// Holds the objects a tenant created while its writes are revoked.
fn holder_role(user: &str) -> String {
    format!("{user}_frozen")
}

fn ensure_role(role: &str) -> String {
    format!(
        "DO $$ BEGIN
           IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname = '{role}') THEN
             CREATE ROLE {role} NOLOGIN;
           END IF;
         END $$"
    )
}

/// Owner rights would let a security-definer function write as its owner.
fn strip_security_definer(user: &str) -> String {
    format!(
        "DO $$ DECLARE f regprocedure; BEGIN
           FOR f IN SELECT p.oid::regprocedure FROM pg_proc p
                    JOIN pg_roles r ON r.oid = p.proowner
                    WHERE r.rolname = '{user}' AND p.prosecdef
           LOOP
             EXECUTE format('ALTER FUNCTION %s SECURITY INVOKER', f);
           END LOOP;
         END $$"
    )
}

/// Leaves `user` with read access to every non-system schema.
fn read_only_grants(user: &str) -> String {
    format!(
        "DO $$ DECLARE s name; BEGIN
           FOR s IN SELECT nspname FROM pg_namespace
                    WHERE nspname NOT LIKE 'pg\\_%' AND nspname <> 'information_schema'
           LOOP
             EXECUTE format('REVOKE CREATE ON SCHEMA %I FROM {user}', s);
             EXECUTE format('GRANT USAGE ON SCHEMA %I TO {user}', s);
             EXECUTE format('REVOKE INSERT, UPDATE, DELETE, TRUNCATE, REFERENCES, TRIGGER
                             ON ALL TABLES IN SCHEMA %I FROM {user}', s);
             EXECUTE format('GRANT SELECT ON ALL TABLES IN SCHEMA %I TO {user}', s);
             EXECUTE format('REVOKE USAGE, UPDATE ON ALL SEQUENCES IN SCHEMA %I FROM {user}', s);
             EXECUTE format('GRANT SELECT ON ALL SEQUENCES IN SCHEMA %I TO {user}', s);
           END LOOP;
         END $$"
    )
}

fn reclaim_objects(holder: &str, user: &str) -> String {
    format!(
        "DO $$ BEGIN
           IF EXISTS (SELECT FROM pg_roles WHERE rolname = '{holder}') THEN
             REASSIGN OWNED BY {holder} TO {user};
           END IF;
         END $$"
    )
}

#[async_trait]
impl DatabaseAdminDriver for PostgresDriver {
    fn login_toggle_needs_password(&self) -> bool {
        false
    }

    async fn check_connection(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!("postgres admin endpoint unreachable: {e}");
                false
            }
        }
    }

    async fn create_database(&self, name: &str, user: &str, password: &str) -> DriverResult<()> {
        let name = identifier(name)?;
        let user = identifier(user)?;

        self.execute(&format!(
            "CREATE ROLE {user} WITH LOGIN PASSWORD {}",
            pg_literal(password)
        ))
        .await?;

        if let Err(e) = self.execute(&format!("CREATE DATABASE {name}")).await {
            self.discard(&format!("DROP ROLE IF EXISTS {user}")).await;
            return Err(e);
        }
        if let Err(e) = self.create_tenant_database_grants(name, user).await {
            self.discard(&format!("DROP DATABASE IF EXISTS {name}")).await;
            self.discard(&format!("DROP ROLE IF EXISTS {user}")).await;
            return Err(e);
        }

        debug!("created postgres database {name} for {user}");
        Ok(())
    }

    async fn drop_database(&self, name: &str, user: &str) -> DriverResult<()> {
        let name = identifier(name)?;
        let user = identifier(user)?;
        let holder = holder_role(user);

        self.terminate_database_sessions(name).await?;
        self.execute(&format!("DROP DATABASE IF EXISTS {name}"))
            .await?;
        self.execute(&format!("DROP ROLE IF EXISTS {holder}"))
            .await?;
        self.execute(&format!("DROP ROLE IF EXISTS {user}")).await?;

        debug!("dropped postgres database {name} and role {user}");
        Ok(())
    }

    async fn reset_database(&self, name: &str, user: &str, _password: &str) -> DriverResult<()> {
        let name = identifier(name)?;
        let user = identifier(user)?;

        self.terminate_database_sessions(name).await?;
        self.execute(&format!("DROP DATABASE IF EXISTS {name}"))
            .await?;
        self.execute(&format!("CREATE DATABASE {name}")).await?;
        self.create_tenant_database_grants(name, user).await?;

        debug!("reset postgres database {name}");
        Ok(())
    }

    async fn create_connection(
        &self,
        user: &str,
        password: &str,
        dbname: &str,
    ) -> Option<TenantConnection> {
        let options = self
            .options
            .clone()
            .username(user)
            .password(password)
            .database(dbname);

        match PgConnection::connect_with(&options).await {
            Ok(conn) => Some(TenantConnection::Postgres(conn)),
            Err(e) => {
                debug!("tenant login to postgres database {dbname} failed: {e}");
                None
            }
        }
    }

    async fn disable_login(&self, user: &str, _password: Option<&str>) -> DriverResult<()> {
        let user = identifier(user)?;
        self.execute(&format!("ALTER ROLE {user} NOLOGIN")).await?;
        self.terminate_user_sessions(user).await
    }

    async fn enable_login(&self, user: &str, _password: Option<&str>) -> DriverResult<()> {
        let user = identifier(user)?;
        self.execute(&format!("ALTER ROLE {user} LOGIN")).await
    }

    /// Moves everything the tenant owns to a holder role and leaves it
    /// read-only grants. Owner rights would otherwise let it grant writes
    /// back to itself.
    async fn revoke_write_access(&self, dbname: &str, user: &str) -> DriverResult<()> {
        let dbname = identifier(dbname)?;
        let user = identifier(user)?;
        let holder = holder_role(user);

        self.execute(&ensure_role(&holder)).await?;
        for statement in [
            strip_security_definer(user),
            format!("REASSIGN OWNED BY {user} TO {holder}"),
            read_only_grants(user),
        ] {
            self.execute_in(dbname, &statement).await?;
        }
        self.execute(&format!(
            "REVOKE CREATE, TEMPORARY ON DATABASE {dbname} FROM {user}"
        ))
        .await?;
        self.execute(&format!(
            "ALTER ROLE {user} IN DATABASE {dbname} SET default_transaction_read_only = on"
        ))
        .await?;

        // Open sessions keep their old privileges cached until they reconnect.
        self.terminate_database_sessions(dbname).await
    }

    async fn grant_write_access(&self, dbname: &str, user: &str) -> DriverResult<()> {
        let dbname = identifier(dbname)?;
        let user = identifier(user)?;
        let holder = holder_role(user);

        for statement in [
            reclaim_objects(&holder, user),
            format!("GRANT USAGE, CREATE ON SCHEMA public TO {user}"),
        ] {
            self.execute_in(dbname, &statement).await?;
        }
        self.execute(&format!(
            "GRANT CONNECT, CREATE, TEMPORARY ON DATABASE {dbname} TO {user}"
        ))
        .await?;
        self.execute(&format!(
            "ALTER ROLE {user} IN DATABASE {dbname} RESET default_transaction_read_only"
        ))
        .await?;

        self.terminate_database_sessions(dbname).await
    }

    async fn reset_password(&self, user: &str, new_password: &str) -> DriverResult<()> {
        let user = identifier(user)?;
        self.execute(&format!(
            "ALTER ROLE {user} WITH PASSWORD {}",
            pg_literal(new_password)
        ))
        .await
    }

    async fn measure_size(
        &self,
        user: &str,
        password: &str,
        dbname: &str,
    ) -> DriverResult<StorageUsage> {
        let Some(TenantConnection::Postgres(mut conn)) =
            self.create_connection(user, password, dbname).await
        else {
            return Ok(StorageUsage::Unmeasurable);
        };

        let bytes = sqlx::query_scalar::<_, i64>("SELECT pg_database_size(current_database())")
            .fetch_one(&mut conn)
            .await?;
        conn.close().await?;

        Ok(StorageUsage::Measured(bytes_to_kb(bytes)))
    }

    async fn database_exists(&self, name: &str) -> DriverResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holder_role_is_a_valid_identifier() {
        let holder = holder_role("abcdefghijklmnop");
        assert_eq!(identifier(&holder).unwrap(), "abcdefghijklmnop_frozen");
    }

    #[test]
    fn test_read_only_grants_never_grant_writes() {
        let sql = read_only_grants("tenant");
        assert!(sql.contains("REVOKE CREATE ON SCHEMA %I FROM tenant"));
        assert!(sql.contains("GRANT SELECT ON ALL TABLES IN SCHEMA %I TO tenant"));
        assert!(!sql.contains("GRANT INSERT"));
        assert!(!sql.contains("GRANT CREATE"));
    }

    #[test]
    fn test_ownership_moves_to_holder_and_back() {
        assert!(reclaim_objects("t_frozen", "t").contains("REASSIGN OWNED BY t_frozen TO t"));
        assert!(ensure_role("t_frozen").contains("CREATE ROLE t_frozen NOLOGIN"));
        assert!(strip_security_definer("t").contains("rolname = 't'"));
    }
}
