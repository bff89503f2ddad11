use crate::output::UserOutput;
use anyhow::{anyhow, bail};
use swap_orchestrator::{
    BuyRequest, BuyerSessionManager, Context, Engine, SessionReport, SwapSession, SwapStatus,
};
use std::sync::Arc;
use tokio::sync::broadcast;

pub async fn run_buy(
    ctx: Context,
    engine: Arc<dyn Engine>,
    request: BuyRequest,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let buyer = BuyerSessionManager::new(ctx.clone(), engine);
    if let Some(entry) = buyer.incomplete_swap().await? {
        bail!(
            "Swap {} is still {}; resume it with `swapd resume {}` before starting another",
            entry.swap_id,
            entry.status,
            entry.swap_id
        );
    }

    let reports = buyer.subscribe();
    let updates = ctx.tracker.subscribe();
    let session = buyer.start_buy(request).await?;
    out.status(&format!("Started swap {}", session.swap_id));
    follow(&buyer, &session.swap_id, reports, updates, out).await
}

pub async fn run_resume(
    ctx: Context,
    engine: Arc<dyn Engine>,
    swap_id: &str,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let buyer = BuyerSessionManager::new(ctx.clone(), engine);
    let reports = buyer.subscribe();
    let updates = ctx.tracker.subscribe();
    let session = buyer.start_resume(swap_id).await?;
    out.status(&format!(
        "Resuming swap {} from account {}",
        session.swap_id, session.account_index
    ));
    follow(&buyer, &session.swap_id, reports, updates, out).await
}

/// Print progress until the swap ends or Ctrl-C cancels it.
async fn follow(
    buyer: &BuyerSessionManager,
    swap_id: &str,
    mut reports: broadcast::Receiver<SessionReport>,
    mut updates: broadcast::Receiver<SwapSession>,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let mut last_status = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                out.warning("Interrupted, stopping swap");
                buyer.shutdown().await;
                return Ok(());
            }
            update = updates.recv() => match update {
                Ok(session) if session.swap_id == swap_id && last_status != Some(session.status) => {
                    last_status = Some(session.status);
                    out.status(&format!("Swap {} is {}", swap_id, session.status));
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {}
            },
            report = reports.recv() => match report {
                Ok(report) if report.swap_id() == swap_id => {
                    if let Some(result) = conclude(&report, out) {
                        return result;
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(anyhow!("session reports closed before swap {} ended", swap_id));
                }
            },
        }
    }
}

/// Print a report. Returns the command's result once the session has ended.
fn conclude(report: &SessionReport, out: &dyn UserOutput) -> Option<anyhow::Result<()>> {
    match report {
        SessionReport::Resuming { swap_id, reason } => {
            out.warning(&format!("Swap {} hit {}, resuming", swap_id, reason));
            None
        }
        SessionReport::Finished { swap_id, status } => {
            if status.is_terminal_success() {
                out.success(&format!("Swap {} finished: {}", swap_id, status));
            } else {
                out.warning(&format!("Swap {} ended: {}", swap_id, status));
            }
            Some(Ok(()))
        }
        SessionReport::Disconnected { swap_id, message } => {
            out.warning(&format!(
                "Swap {} lost the seller ({}). Funds are safe; run `swapd resume {}`",
                swap_id, message, swap_id
            ));
            Some(Ok(()))
        }
        SessionReport::Failed {
            swap_id,
            kind,
            message,
        } => Some(Err(anyhow!("Swap {} failed with {}: {}", swap_id, kind, message))),
        SessionReport::Stopped { swap_id, status } => {
            out.status(&format!("Swap {} stopped at {}", swap_id, status));
            Some(Ok(()))
        }
    }
}

pub async fn run_cancel_refund(
    ctx: Context,
    engine: Arc<dyn Engine>,
    swap_id: &str,
    root_key: &str,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let buyer = BuyerSessionManager::new(ctx, engine);
    let response = buyer.cancel_and_refund(swap_id, root_key).await?;
    let status = SwapStatus::parse(&response.status);
    let txid = response.txid.as_deref().unwrap_or("-");
    if status == SwapStatus::Refunded {
        out.success(&format!("Swap {} refunded in {}", response.swap_id, txid));
    } else {
        out.status(&format!("Swap {} is {} ({})", response.swap_id, response.status, txid));
    }
    Ok(())
}

pub async fn run_history(
    ctx: Context,
    engine: Arc<dyn Engine>,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let buyer = BuyerSessionManager::new(ctx, engine);
    let entries = buyer.history().await?;
    if json {
        out.data(&serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        out.status("No swaps yet");
        return Ok(());
    }
    for entry in &entries {
        let marker = if entry.status().is_incomplete() { "*" } else { " " };
        out.data(&format!(
            "{} {:<36}  {:<26}  btc {}  xmr {}",
            marker,
            entry.swap_id,
            entry.status,
            entry.btc_lock_txid.as_deref().unwrap_or("-"),
            entry.xmr_lock_txid.as_deref().unwrap_or("-"),
        ));
    }
    Ok(())
}

pub async fn run_sellers(
    ctx: Context,
    engine: Arc<dyn Engine>,
    rendezvous: Option<&str>,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let buyer = BuyerSessionManager::new(ctx, engine);
    let sellers = buyer.list_sellers(rendezvous).await?;
    if json {
        out.data(&serde_json::to_string_pretty(&sellers)?);
        return Ok(());
    }
    let online: Vec<_> = sellers.iter().filter(|s| !s.status.offline).collect();
    if online.is_empty() {
        out.status(&format!("No online sellers ({} offline)", sellers.len()));
        return Ok(());
    }
    for seller in online {
        out.data(&format!(
            "{}  price {}  min {}  max {}",
            seller.multiaddr,
            seller.status.price.as_deref().unwrap_or("?"),
            seller.status.min_quantity.as_deref().unwrap_or("?"),
            seller.status.max_quantity.as_deref().unwrap_or("?"),
        ));
    }
    Ok(())
}
