// evaluate.rs — `guardrail evaluate`: check a single invocation record.

use anyhow::Context;

use crate::config::GuardrailConfig;

pub fn execute(config: &GuardrailConfig, record: &str) -> anyhow::Result<()> {
    let raw: serde_json::Value =
        serde_json::from_str(record).context("record is not valid JSON")?;
    let router = config.build_router()?;

    match router.evaluate_json(&raw)? {
        Some(notice) => println!("{}", serde_json::to_string_pretty(&notice)?),
        None => println!("No escalation."),
    }
    Ok(())
}
