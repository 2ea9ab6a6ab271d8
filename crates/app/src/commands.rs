//! Subcommand implementations
//!
//! One-shot commands write a short human-readable report to stdout; logs go
//! through tracing.

#![allow(clippy::print_stdout)]

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use servertide_core::reconcile::decide;
use servertide_core::ResourceDriver;
use servertide_domain::{ActualState, ResourceId};
use servertide_infra::scheduling::SchedulerError;
use tracing::{error, info, warn};

use crate::context::AppContext;

/// Run the reconciliation loop until a signal arrives or a fatal error stops it.
pub async fn run(ctx: &AppContext) -> Result<()> {
    let mut scheduler = ctx.scheduler();
    scheduler.start().await?;

    tokio::select! {
        _ = scheduler.finished() => {}
        signal = shutdown_signal() => {
            info!(%signal, "shutdown requested, finishing current tick");
        }
    }

    match scheduler.stop().await {
        Ok(()) => {
            info!("servertide stopped");
            Ok(())
        }
        Err(SchedulerError::Aborted(e)) => {
            error!(error = %e, kind = e.label(), "reconciliation loop aborted");
            Err(anyhow!(e).context("reconciliation loop aborted"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Desired state, observed state and the action the next tick would take.
pub async fn status(ctx: &AppContext) -> Result<()> {
    let now = ctx.service.now();
    let plan = ctx.service.plan(now).await.context("evaluating schedule")?;
    let observed = ctx.driver.query_actual_state(ctx.identity()).await?;
    let action = decide(&plan.desired, &observed);
    let tz = ctx.service.settings().timezone;

    println!("identity:  {}", ctx.identity());
    println!("now:       {}", now.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z"));
    if plan.desired.active {
        println!("desired:   active ({})", display_variant(&plan.desired.variant));
    } else {
        println!("desired:   inactive");
    }
    println!("observed:  {}", describe(&observed));
    println!("action:    {action}");
    Ok(())
}

/// Print the active slots of the current grid.
pub async fn grid(ctx: &AppContext) -> Result<()> {
    let plan = ctx.service.plan(ctx.service.now()).await.context("evaluating schedule")?;
    let tz = ctx.service.settings().timezone;
    let format = |instant: i64| -> String {
        DateTime::<Utc>::from_timestamp(instant, 0)
            .map(|t| t.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| instant.to_string())
    };

    println!(
        "grid {} .. {} ({} slots, {} active)",
        plan.grid.first_instant().map(format).unwrap_or_default(),
        plan.grid.last_instant().map(format).unwrap_or_default(),
        plan.grid.len(),
        plan.grid.active_count()
    );
    for slot in plan.grid.slots().filter(|slot| slot.active) {
        println!("{}  {}", format(slot.instant), display_variant(slot.variant));
    }
    Ok(())
}

/// Bring the server up now, regardless of the calendar.
pub async fn start(ctx: &AppContext, variant: Option<String>) -> Result<()> {
    let variant = variant.unwrap_or_default();
    let id = ctx.driver.activate(ctx.identity(), &variant).await?;
    println!("server {id} active");
    Ok(())
}

/// Power off, snapshot, prune and delete the server now.
pub async fn stop(ctx: &AppContext) -> Result<()> {
    ctx.driver.deactivate(ctx.identity()).await?;
    println!("server deactivated");
    Ok(())
}

pub async fn snapshot(ctx: &AppContext) -> Result<()> {
    let id = existing_server(ctx).await?;
    let snapshot = ctx.driver.create_snapshot(ctx.identity(), id).await?;
    println!("snapshot {} created from server {id}", snapshot.id);
    Ok(())
}

pub async fn shutdown(ctx: &AppContext) -> Result<()> {
    let id = existing_server(ctx).await?;
    ctx.driver.power_off(id).await?;
    println!("server {id} is off");
    Ok(())
}

/// Delete old snapshots; the newest one survives unless `all` is set.
pub async fn prune_snapshots(ctx: &AppContext, all: bool) -> Result<()> {
    let keep = if all {
        None
    } else {
        ctx.driver.list_active_snapshots(ctx.identity()).await?.into_iter().next()
    };
    if let Some(keep) = &keep {
        info!(snapshot = keep.id, "keeping newest snapshot");
    }

    let deleted = ctx.driver.prune_snapshots(ctx.identity(), keep.as_ref()).await?;
    println!("deleted {deleted} snapshot(s)");
    Ok(())
}

pub async fn assign_ip(ctx: &AppContext) -> Result<()> {
    match ctx.driver.assign_floating_ip_to_current(ctx.identity()).await? {
        Some(ip) => println!("floating IP {ip} assigned"),
        None => {
            warn!("no floating IP carries the identity label");
            println!("no floating IP to assign");
        }
    }
    Ok(())
}

async fn existing_server(ctx: &AppContext) -> Result<ResourceId> {
    let observed = ctx.driver.query_actual_state(ctx.identity()).await?;
    observed
        .resource_id
        .ok_or_else(|| anyhow!("no server labelled '{}'", ctx.identity()))
}

fn describe(state: &ActualState) -> String {
    match state.resource_id {
        Some(id) => format!("{} {} (id {id})", state.phase, state.variant),
        None => state.phase.to_string(),
    }
}

fn display_variant(variant: &str) -> &str {
    if variant.is_empty() {
        "default"
    } else {
        variant
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => tokio::select! {
            signal = ctrl_c() => signal,
            _ = sigterm.recv() => "SIGTERM",
        },
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM, only Ctrl-C stops the loop");
            ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    ctrl_c().await
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves,
/// so the loop keeps running instead of stopping right after start.
async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
