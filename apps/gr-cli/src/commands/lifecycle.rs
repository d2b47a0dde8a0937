// lifecycle.rs — `guardrail lifecycle`: answer one orchestrator envelope request.
//
// Reads a LifecycleRequest as JSON (file or stdin) and writes the
// LifecycleResponse to stdout. The caller owns handle persistence; the
// local handle store is not touched.

use std::io::{self, Read};
use std::path::Path;

use anyhow::Context;
use gr_reconciler::{handle_lifecycle, LifecycleRequest, ResponseStatus};
use tokio::runtime::Runtime;

use crate::config::GuardrailConfig;

pub fn execute(config: &GuardrailConfig, input: Option<&Path>) -> anyhow::Result<()> {
    let body = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut body = String::new();
            io::stdin()
                .read_to_string(&mut body)
                .context("failed to read request from stdin")?;
            body
        }
    };
    let request: LifecycleRequest =
        serde_json::from_str(&body).context("invalid lifecycle request")?;

    let reconciler = config.build_reconciler()?;
    let runtime = Runtime::new().context("failed to start async runtime")?;
    let response = runtime.block_on(handle_lifecycle(&reconciler, request));

    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.status == ResponseStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}
