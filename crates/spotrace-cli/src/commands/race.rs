use std::path::Path;

use anyhow::{Context, bail};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use spotrace_core::{CandidateStatus, RaceSnapshot, RaceStatus, SpotraceConfig, load_offers};
use spotrace_engine::{RaceEngine, RaceError};

use crate::provider;

pub async fn run(config_path: &Path, offers_path: &Path, dry_run: bool) -> anyhow::Result<()> {
    let file = SpotraceConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let race_config = file.race_config()?;
    let offers = load_offers(offers_path)
        .with_context(|| format!("loading {}", offers_path.display()))?;
    let provider = provider::build(file.provider.as_ref(), dry_run)?;

    info!(
        offers = offers.len(),
        per_round = race_config.max_candidates_per_round,
        max_rounds = race_config.max_rounds,
        dry_run,
        "starting race"
    );

    let engine = RaceEngine::new(provider, race_config)?;
    let reporter = tokio::spawn(report(engine.subscribe()));
    engine.start_race(offers).await?;

    let outcome = tokio::select! {
        result = engine.wait_for_terminal() => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling race");
            match engine.cancel_race().await {
                // The race ended on its own while the signal was handled.
                Ok(()) | Err(RaceError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            engine.snapshot()
        }
    };
    reporter.abort();

    match outcome.state.status {
        RaceStatus::Completed => {
            let winner = engine.complete_race().await?;
            println!("{}", serde_json::to_string_pretty(&winner)?);
            Ok(())
        }
        RaceStatus::Failed => match outcome.state.error {
            Some(failure) => bail!("race failed: {failure}"),
            None => bail!("race failed"),
        },
        RaceStatus::Cancelled => bail!("race cancelled"),
        status => bail!("race stopped in unexpected state {status}"),
    }
}

/// Log race and candidate transitions as snapshots arrive.
async fn report(mut rx: watch::Receiver<RaceSnapshot>) {
    let mut status = RaceStatus::Idle;
    let mut round = 0;
    let mut seen: Vec<(CandidateStatus, u8)> = Vec::new();

    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        let state = &snapshot.state;

        if state.current_round != round {
            seen.clear();
        }
        if state.status != status || state.current_round != round {
            info!(
                status = %state.status,
                round = state.current_round,
                elapsed = ?state.elapsed,
                "race state changed"
            );
            status = state.status;
            round = state.current_round;
        }

        for c in &snapshot.candidates {
            let now = (c.status, c.progress);
            if seen.get(c.index) == Some(&now) {
                continue;
            }
            debug!(
                index = c.index,
                offer = %c.offer.id,
                status = %c.status,
                progress = c.progress,
                instance = c.instance_id.as_deref().unwrap_or("-"),
                error = c.error_message.as_deref().unwrap_or(""),
                "candidate"
            );
        }
        seen = snapshot
            .candidates
            .iter()
            .map(|c| (c.status, c.progress))
            .collect();
    }
}
