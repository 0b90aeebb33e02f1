use serde::Serialize;

use super::{AdminCommands, Context};
use crate::lifecycle::CreateRequest;
use crate::types::{TenantDatabase, TenantFilter};

#[derive(Serialize)]
struct TenantOutput<'a> {
    #[serde(flatten)]
    tenant: &'a TenantDatabase,
    state: &'static str,
}

fn print_tenant(tenant: &TenantDatabase, json: bool) -> anyhow::Result<()> {
    if json {
        let output = TenantOutput {
            tenant,
            state: tenant.state().as_str(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("ID:          {}", tenant.id);
    println!("Flavor:      {}", tenant.flavor);
    println!("Host:        {}:{}", tenant.host, tenant.port);
    println!("Name:        {}", tenant.name);
    println!("User:        {}", tenant.user);
    println!("Owner:       {}", tenant.owner_id);
    if let Some(email) = &tenant.owner_email {
        println!("Email:       {email}");
    }
    println!("State:       {}", tenant.state());
    println!(
        "Write:       {}",
        if tenant.write_revoked { "revoked" } else { "granted" }
    );
    match tenant.default_storage_kb {
        Some(used) => println!("Storage:     {used} / {} KB", tenant.allocated_size_kb),
        None => println!("Storage:     - / {} KB", tenant.allocated_size_kb),
    }
    println!("Created:     {}", tenant.created_at.to_rfc3339());
    Ok(())
}

fn done(message: &str, tenant: &TenantDatabase) -> anyhow::Result<()> {
    println!("{message}: {} ({})", tenant.name, tenant.state());
    Ok(())
}

pub async fn run_create(
    ctx: &Context,
    flavor: String,
    owner: String,
    email: Option<String>,
    size_kb: Option<i64>,
    json: bool,
) -> anyhow::Result<()> {
    let tenant = ctx
        .lifecycle
        .create(
            &ctx.actor,
            CreateRequest {
                flavor,
                owner_id: owner,
                owner_email: email,
                allocated_size_kb: size_kb,
            },
        )
        .await?;

    if json {
        return print_tenant(&tenant, true);
    }
    println!("Created database {}", tenant.id);
    println!();
    print_tenant(&tenant, false)?;
    println!();
    println!("Password (also available via 'tenantdb password'):");
    println!("  {}", tenant.password);
    Ok(())
}

pub fn run_list(
    ctx: &Context,
    owner: Option<String>,
    flavor: Option<String>,
    include_deleted: bool,
    json: bool,
) -> anyhow::Result<()> {
    let filter = TenantFilter {
        owner_id: owner,
        flavor,
        include_deleted,
    };
    let tenants = ctx.lifecycle.list(&ctx.actor, &filter)?;

    if json {
        let output: Vec<_> = tenants
            .iter()
            .map(|tenant| TenantOutput {
                tenant,
                state: tenant.state().as_str(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if tenants.is_empty() {
        println!("No databases found.");
    } else {
        println!(
            "{:<36}  {:<8}  {:<24}  {:<14}  {:>12}",
            "ID", "FLAVOR", "NAME", "STATE", "USED KB"
        );
        for t in &tenants {
            let used = t
                .default_storage_kb
                .map_or_else(|| "-".to_string(), |kb| kb.to_string());
            println!(
                "{:<36}  {:<8}  {:<24}  {:<14}  {:>12}",
                t.id,
                t.flavor,
                t.name,
                t.state().as_str(),
                used
            );
        }
    }
    Ok(())
}

pub fn run_show(ctx: &Context, id: &str, json: bool) -> anyhow::Result<()> {
    let tenant = ctx.lifecycle.get(id, &ctx.actor)?;
    print_tenant(&tenant, json)
}

pub fn run_password(ctx: &Context, id: &str) -> anyhow::Result<()> {
    println!("{}", ctx.lifecycle.password(id, &ctx.actor)?);
    Ok(())
}

pub async fn run_disable(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let tenant = ctx.lifecycle.user_disable(id, &ctx.actor).await?;
    done("Disabled", &tenant)
}

pub async fn run_enable(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let tenant = ctx.lifecycle.user_enable(id, &ctx.actor).await?;
    done("Enabled", &tenant)
}

pub async fn run_reset(ctx: &Context, id: &str, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("Reset destroys all data in the database. Re-run with --yes to confirm.");
    }
    let tenant = ctx.lifecycle.reset(id, &ctx.actor).await?;
    done("Reset", &tenant)
}

pub async fn run_reset_password(
    ctx: &Context,
    id: &str,
    password: Option<String>,
) -> anyhow::Result<()> {
    let generated = password.is_none();
    let tenant = ctx
        .lifecycle
        .reset_password(id, &ctx.actor, password)
        .await?;

    println!("Password reset for {}", tenant.name);
    if generated {
        println!("  {}", tenant.password);
    }
    Ok(())
}

pub async fn run_delete(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let tenant = ctx.lifecycle.delete(id, &ctx.actor).await?;
    done("Deleted", &tenant)
}

pub async fn run_admin(ctx: &Context, command: AdminCommands) -> anyhow::Result<()> {
    let lifecycle = &ctx.lifecycle;
    let actor = &ctx.actor;

    match command {
        AdminCommands::Disable { id } => {
            done("Locked", &lifecycle.admin_disable(&id, actor).await?)
        }
        AdminCommands::Enable { id } => {
            done("Unlocked", &lifecycle.admin_enable(&id, actor).await?)
        }
        AdminCommands::Revoke { id } => {
            done("Write access revoked", &lifecycle.revoke_write(&id, actor).await?)
        }
        AdminCommands::Restore { id } => {
            done("Write access restored", &lifecycle.restore_write(&id, actor).await?)
        }
        AdminCommands::Allocate { id, kb } => {
            let tenant = lifecycle.allocate_storage(&id, actor, kb).await?;
            println!(
                "Quota for {} is now {} KB",
                tenant.name, tenant.allocated_size_kb
            );
            Ok(())
        }
    }
}
