use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default config (if missing) and create the tenant registry
    Init {
        /// Recreate the config file even if one exists
        #[arg(long)]
        force: bool,
    },

    /// Provision a new tenant database
    Create {
        /// Database flavor: mysql or postgres
        #[arg(long)]
        flavor: String,

        /// Owner the database is created for
        #[arg(long)]
        owner: String,

        /// Address storage notices are sent to
        #[arg(long)]
        email: Option<String>,

        /// Storage quota in KB (defaults to 1 GiB)
        #[arg(long)]
        size_kb: Option<i64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List tenant databases
    List {
        /// Only databases of this owner
        #[arg(long)]
        owner: Option<String>,

        /// Only databases of this flavor
        #[arg(long)]
        flavor: Option<String>,

        /// Include soft-deleted databases
        #[arg(long)]
        include_deleted: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one tenant database
    Show {
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the database password
    Password { id: String },

    /// Disable login (owner self-service)
    Disable { id: String },

    /// Re-enable login (owner self-service)
    Enable { id: String },

    /// Drop and recreate the database, destroying all data
    Reset {
        id: String,

        /// Confirm data loss
        #[arg(long)]
        yes: bool,
    },

    /// Set a new password, generated unless --password is given
    ResetPassword {
        id: String,

        #[arg(long)]
        password: Option<String>,
    },

    /// Soft-delete a tenant database
    Delete { id: String },

    /// Operator commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Run one capacity sweep now
    Sweep {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the capacity enforcer on its daily schedule until interrupted
    Serve,
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Lock a database; the owner cannot re-enable it
    Disable { id: String },

    /// Lift an administrator lock
    Enable { id: String },

    /// Make a database read-only
    Revoke { id: String },

    /// Restore write access
    Restore { id: String },

    /// Raise a database's storage quota
    Allocate {
        id: String,

        /// Additional quota in KB
        #[arg(long)]
        kb: i64,
    },
}
