//! CLI presentation: run summaries and the per-stage usage table.

use crate::pipeline::{Completion, RunOutcome};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use owo_colors::OwoColorize;

/// One row per stage that ran, plus a total row.
pub fn format_usage_table(outcome: &RunOutcome) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Stage",
        "Calls",
        "Prompt",
        "Completion",
        "Cached",
        "Total",
    ]);
    for (stage, usage) in &outcome.usage_by_stage {
        table.add_row(vec![
            stage.to_string(),
            usage.calls.to_string(),
            usage.usage.prompt_tokens.to_string(),
            usage.usage.completion_tokens.to_string(),
            usage.usage.cached_tokens.to_string(),
            usage.usage.total.to_string(),
        ]);
    }
    table.add_row(vec![
        "All".to_string(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        outcome.total_usage.to_string(),
    ]);
    table.to_string()
}

pub fn format_outcome_summary(outcome: &RunOutcome) -> String {
    let completion = format!("{:?}", outcome.completion);
    let completion = match outcome.completion {
        Completion::Accepted | Completion::Unvalidated => completion.green().to_string(),
        _ => completion.yellow().to_string(),
    };
    let mut lines = vec![
        format!("Completion: {}", completion),
        format!("Topics: {}", outcome.topics.len()),
        format!("Retries: {}", outcome.retry_count),
    ];
    if let Some(score) = outcome.score {
        lines.push(format!("Score: {}", score));
    }
    for failure in &outcome.failed_topics {
        lines.push(format!(
            "{} {} ({}): {}",
            "Failed topic".red(),
            failure.ordinal + 1,
            failure.topic,
            failure.reason
        ));
    }
    lines.join("\n")
}
