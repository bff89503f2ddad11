use crate::output::UserOutput;
use swap_orchestrator::process::WalletRpcLauncher;
use swap_orchestrator::{Context, PriceFeed};

/// Print every price the ticker reports until Ctrl-C.
pub async fn run_price(ctx: Context, out: &dyn UserOutput) -> anyhow::Result<()> {
    let feed = PriceFeed::new(&ctx.settings, ctx.supervisor.clone());
    let mut prices = feed.subscribe();
    feed.start().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = prices.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(price) = *prices.borrow_and_update() {
                    out.data(&format!("1 XMR = {} BTC", price));
                }
            }
        }
    }
    feed.stop().await;
    Ok(())
}

/// Kill every pid the last run recorded and clear the table.
pub async fn run_kill_orphans(ctx: Context, out: &dyn UserOutput) -> anyhow::Result<()> {
    let killed = ctx.supervisor.kill_all_recorded();
    let removed = WalletRpcLauncher::from_settings(&ctx.settings).remove_monitoring_wallets();
    if killed.is_empty() {
        out.status("No orphaned processes");
    }
    for (role, pid) in killed {
        out.status(&format!("Killed {} (pid {})", role, pid));
    }
    if removed > 0 {
        out.status(&format!("Removed {} monitoring wallet files", removed));
    }
    Ok(())
}
