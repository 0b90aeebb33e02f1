use std::time::Duration;

use async_trait::async_trait;
use sqlx::Connection;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
use tracing::{debug, warn};

use super::sql::{identifier, mysql_account, mysql_literal};
use super::{
    DatabaseAdminDriver, DriverError, DriverResult, StorageUsage, TenantConnection,
    bytes_to_kb,
};
use crate::config::AdminEndpoint;

pub struct MySqlDriver {
    options: MySqlConnectOptions,
    pool: MySqlPool,
}

impl MySqlDriver {
    /// Builds the driver without connecting; the pool opens connections on
    /// first use.
    pub fn new(endpoint: &AdminEndpoint, acquire_timeout: Duration) -> Self {
        let mut options = MySqlConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port)
            .username(&endpoint.user)
            .password(&endpoint.password);
        if let Some(database) = &endpoint.database {
            options = options.database(database);
        }

        let pool = MySqlPoolOptions::new()
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
            warn!("mysql cleanup {statement:?} failed: {e}");
        }
    }

    async fn kill_user_sessions(&self, user: &str) -> DriverResult<()> {
        let ids = sqlx::query_scalar::<_, u64>(
            "SELECT id FROM information_schema.processlist WHERE user = ?",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        for id in ids {
            // The session may already be gone.
            if let Err(e) = self.execute(&format!("KILL {id}")).await {
                debug!("could not kill mysql session {id}: {e}");
            }
        }
        Ok(())
    }

    async fn grant_all(&self, name: &str, account: &str) -> DriverResult<()> {
        self.execute(&format!("GRANT ALL PRIVILEGES ON {name}.* TO {account}"))
            .await
    }
}

fn require_password(password: Option<&str>) -> DriverResult<&str> {
    password.ok_or(DriverError::PasswordRequired("mysql login toggle"))
}

#[async_trait]
impl DatabaseAdminDriver for MySqlDriver {
    fn login_toggle_needs_password(&self) -> bool {
        true
    }

    async fn check_connection(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!("mysql admin endpoint unreachable: {e}");
                false
            }
        }
    }

    async fn create_database(&self, name: &str, user: &str, password: &str) -> DriverResult<()> {
        let name = identifier(name)?;
        let account = mysql_account(user)?;

        self.execute(&format!("CREATE DATABASE {name}")).await?;

        if let Err(e) = self
            .execute(&format!(
                "CREATE USER {account} IDENTIFIED BY {}",
                mysql_literal(password)
            ))
            .await
        {
            self.discard(&format!("DROP DATABASE IF EXISTS {name}")).await;
            return Err(e);
        }
        if let Err(e) = self.grant_all(name, &account).await {
            self.discard(&format!("DROP USER IF EXISTS {account}")).await;
            self.discard(&format!("DROP DATABASE IF EXISTS {name}")).await;
            return Err(e);
        }

        debug!("created mysql database {name} for {account}");
        Ok(())
    }

    async fn drop_database(&self, name: &str, user: &str) -> DriverResult<()> {
        let name = identifier(name)?;
        let account = mysql_account(user)?;

        self.execute(&format!("DROP USER IF EXISTS {account}"))
            .await?;
        self.kill_user_sessions(user).await?;
        self.execute(&format!("DROP DATABASE IF EXISTS {name}"))
            .await?;

        debug!("dropped mysql database {name} and {account}");
        Ok(())
    }

    async fn reset_database(&self, name: &str, user: &str, password: &str) -> DriverResult<()> {
        let name = identifier(name)?;
        let account = mysql_account(user)?;

        self.execute(&format!("DROP DATABASE IF EXISTS {name}"))
            .await?;
        self.execute(&format!("CREATE DATABASE {name}")).await?;
        self.execute(&format!(
            "ALTER USER {account} IDENTIFIED BY {}",
            mysql_literal(password)
        ))
        .await?;
        self.grant_all(name, &account).await?;

        debug!("reset mysql database {name}");
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

        match MySqlConnection::connect_with(&options).await {
            Ok(conn) => Some(TenantConnection::MySql(conn)),
            Err(e) => {
                debug!("tenant login to mysql database {dbname} failed: {e}");
                None
            }
        }
    }

    async fn disable_login(&self, user: &str, password: Option<&str>) -> DriverResult<()> {
        let password = require_password(password)?;
        let account = mysql_account(user)?;

        self.execute(&format!(
            "ALTER USER {account} IDENTIFIED BY {} ACCOUNT LOCK",
            mysql_literal(password)
        ))
        .await?;
        self.kill_user_sessions(user).await
    }

    async fn enable_login(&self, user: &str, password: Option<&str>) -> DriverResult<()> {
        let password = require_password(password)?;
        let account = mysql_account(user)?;

        self.execute(&format!(
            "ALTER USER {account} IDENTIFIED BY {} ACCOUNT UNLOCK",
            mysql_literal(password)
        ))
        .await
    }

    async fn revoke_write_access(&self, dbname: &str, user: &str) -> DriverResult<()> {
        let dbname = identifier(dbname)?;
        let account = mysql_account(user)?;

        self.execute(&format!("REVOKE ALL PRIVILEGES ON {dbname}.* FROM {account}"))
            .await?;
        self.execute(&format!(
            "GRANT SELECT, SHOW VIEW ON {dbname}.* TO {account}"
        ))
        .await?;
        self.kill_user_sessions(user).await
    }

    async fn grant_write_access(&self, dbname: &str, user: &str) -> DriverResult<()> {
        let dbname = identifier(dbname)?;
        let account = mysql_account(user)?;
        self.grant_all(dbname, &account).await
    }

    async fn reset_password(&self, user: &str, new_password: &str) -> DriverResult<()> {
        let account = mysql_account(user)?;
        self.execute(&format!(
            "ALTER USER {account} IDENTIFIED BY {}",
            mysql_literal(new_password)
        ))
        .await
    }

    async fn measure_size(
        &self,
        user: &str,
        password: &str,
        dbname: &str,
    ) -> DriverResult<StorageUsage> {
        let Some(TenantConnection::MySql(mut conn)) =
            self.create_connection(user, password, dbname).await
        else {
            return Ok(StorageUsage::Unmeasurable);
        };

        let bytes = sqlx::query_scalar::<_, i64>(
            "SELECT CAST(COALESCE(SUM(data_length + index_length), 0) AS SIGNED)
             FROM information_schema.tables WHERE table_schema = ?",
        )
        .bind(dbname)
        .fetch_one(&mut conn)
        .await?;
        conn.close().await?;

        Ok(StorageUsage::Measured(bytes_to_kb(bytes)))
    }

    async fn database_exists(&self, name: &str) -> DriverResult<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM information_schema.schemata WHERE schema_name = ?",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}
