// route.rs — `guardrail route`: stream JSONL invocation events through the router.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::Context;
use gr_router::{route_lines, DeadLetterLog, RouteSummary};

use crate::config::GuardrailConfig;

pub fn execute(
    config: &GuardrailConfig,
    input: Option<&Path>,
    keep_dead_letters: bool,
) -> anyhow::Result<()> {
    let router = config.build_router()?;
    let channel = config.build_channel()?;
    let dead_letter = keep_dead_letters.then(|| DeadLetterLog::new(&config.dead_letter_log));

    let summary = match input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open event file {}", path.display()))?;
            route_lines(BufReader::new(file), &router, channel.as_ref(), dead_letter.as_ref())?
        }
        None => route_lines(io::stdin().lock(), &router, channel.as_ref(), dead_letter.as_ref())?,
    };

    print_summary(&summary, channel.name());
    if summary.malformed > 0 && keep_dead_letters {
        println!("  Dead letters: {}", config.dead_letter_log.display());
    }
    Ok(())
}

fn print_summary(summary: &RouteSummary, channel: &str) {
    println!("Evaluated:        {}", summary.evaluated);
    println!("Escalated:        {} (via {})", summary.escalated, channel);
    println!("Malformed:        {}", summary.malformed);
    println!("Publish failures: {}", summary.publish_failures);
}
