//! Mermaid rendering of the configured stage graph.

use crate::pipeline::orchestrator::RetryPolicy;

/// Which optional stages are switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphShape {
    pub validate: bool,
    pub write: bool,
    pub retry_policy: RetryPolicy,
}

/// Render the stage graph as a Mermaid flowchart.
pub fn render_mermaid(shape: GraphShape) -> String {
    let mut lines = vec![
        "flowchart TD".to_string(),
        "    start([start]) --> plan[Plan]".to_string(),
        "    plan --> research[[Research fan-out]]".to_string(),
    ];
    let accepted = if shape.write { "write[Write]" } else { "done([complete])" };

    if shape.validate {
        lines.push("    research --> validate{Validate}".to_string());
        lines.push(format!("    validate -- score above threshold --> {accepted}"));
        let retry_target = match shape.retry_policy {
            RetryPolicy::ReuseTopics => "research",
            RetryPolicy::RegenerateTopics => "plan",
        };
        lines.push(format!(
            "    validate -- retry with feedback --> {retry_target}"
        ));
        lines.push("    validate -- budget spent or failed --> done([complete])".to_string());
    } else {
        lines.push(format!("    research --> {accepted}"));
    }
    if shape.write {
        lines.push("    write --> done([complete])".to_string());
    }
    lines.join("\n")
}
