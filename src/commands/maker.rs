use crate::output::UserOutput;
use swap_orchestrator::events::MakerEvent;
use swap_orchestrator::{Context, ExitAction, MakerSessionManager, MakerUpdate};
use tokio::sync::broadcast;

/// Run the maker until Ctrl-C, starting it again whenever the engine exits
/// on its own.
pub async fn run_maker(ctx: Context, out: &dyn UserOutput) -> anyhow::Result<()> {
    let maker = MakerSessionManager::new(ctx);
    let mut updates = maker.subscribe();
    maker.start().await?;
    out.status("Maker starting, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                out.status("Stopping maker...");
                maker.stop().await;
                out.success("Maker stopped");
                return Ok(());
            }
            action = maker.wait_exit() => match action {
                ExitAction::Restart => {
                    out.warning("Maker engine exited, restarting");
                    maker.restart().await?;
                }
                ExitAction::Exit(0) => return Ok(()),
                ExitAction::Exit(code) => anyhow::bail!("maker exited with code {}", code),
                ExitAction::KeepRunning => {}
            },
            update = updates.recv() => match update {
                Ok(update) => print_update(&update, out),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {} maker updates", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}

fn print_update(update: &MakerUpdate, out: &dyn UserOutput) {
    match update {
        MakerUpdate::Event(MakerEvent::Initialized {
            peer_id, multiaddr, ..
        }) => out.success(&format!("Maker online as {} ({})", peer_id, multiaddr)),
        MakerUpdate::Event(MakerEvent::XmrBalance(balance)) => out.status(&format!(
            "XMR balance {} (unlocked {})",
            piconero_to_xmr(balance.total),
            piconero_to_xmr(balance.unlocked)
        )),
        MakerUpdate::Event(MakerEvent::EarnedBtc { amount }) => {
            out.success(&format!("Earned {} sats", amount))
        }
        MakerUpdate::Event(MakerEvent::Swap { swap_id, progress }) => {
            out.status(&format!("Swap {}: {:?}", swap_id, progress))
        }
        MakerUpdate::Restarting { reason } => out.warning(&format!("Maker restarting: {}", reason)),
        MakerUpdate::Event(_) | MakerUpdate::Started | MakerUpdate::Stopped => {}
    }
}

fn piconero_to_xmr(piconero: u64) -> String {
    format!("{}.{:012}", piconero / 1_000_000_000_000, piconero % 1_000_000_000_000)
}
