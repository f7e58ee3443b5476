use std::path::Path;

use anyhow::Context;

use spotrace_core::SpotraceConfig;

pub fn run(config_path: &Path) -> anyhow::Result<()> {
    let file = SpotraceConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let race = file.race_config()?;

    println!("✓ {} is valid", config_path.display());
    println!("  Candidates per round: {}", race.max_candidates_per_round);
    println!("  Max rounds:           {}", race.max_rounds);
    println!("  Poll interval:        {:?}", race.poll_interval);
    println!("  Round timeout:        {:?}", race.timeout);
    println!("  Create delay:         {:?}", race.create_delay);

    match &file.provider {
        Some(provider) => {
            println!("  Provider:             {:?}", provider.kind);
            if let Some(url) = &provider.base_url {
                println!("  Base URL:             {url}");
            }
        }
        None => println!("  Provider:             none (use --dry-run)"),
    }
    Ok(())
}
