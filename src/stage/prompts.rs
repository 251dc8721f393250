//! Prompt templates for the LLM-backed stages. Placeholders are `{input_name}`.

use crate::stage::{StageInputs, StageKind};

pub const PLAN_SYSTEM: &str = "You are a meticulous research planner. You survey the latest \
developments around a subject and break a writing goal into a focused, ordered list of topics.";

pub const PLAN_TEMPLATE: &str = r#"**Initial Research**
- Understand the user's requirements as described in the Description: {description}.
- Analyze {emphasizer}'s research, work areas, and latest innovations up to {datetime}.
- Research the latest progress, developments, innovations, and news in the context of {emphasizer}'s specific areas of focus during {datetime} which are most relevant to the Description.

**Output Requirements:**
- Generate a structured list of topics covering the most relevant information relevant to the Description.
- Include source URLs for each finding.
- Do not provide fabricated or generalized information.
- Generate a list of maximum 10 topics covering all the relevant information which fulfills the Description.
- Incorporate the following feedback if present to improve the research: {feedback}

Respond with a single JSON object of the form {"topics": ["topic one", "topic two"]} and nothing else."#;

pub const RESEARCH_SYSTEM: &str = "You are a senior researcher. You write detailed, sourced \
sections about one topic at a time, staying consistent with the surrounding outline.";

pub const RESEARCH_TEMPLATE: &str = r#"### Context of Research
Below is the chronological progression of topics being researched:
{topics}

### Your Task
- Perform in-depth research on the current topic: **{topic}**, ensuring it logically extends from the previous topics.
- Only include up to date information from {datetime}.
- Include the source URLs with the information you generate so it can be verified.
- The overall goal is: {description}

### Feedback
Incorporate the following feedback if present to refine the research content: {feedback}

Rules to follow:
- Every piece of information should be the latest, produced in {datetime}.
- Do not generate generic, fabricated, or artificial information.
- Every piece of information should come from an authentic source."#;

pub const VALIDATE_SYSTEM: &str = "You are a demanding editor who grades research drafts \
against the goal they were written for.";

pub const VALIDATE_TEMPLATE: &str = r#"Grade the following research draft against this goal: {description}

Draft:
{content}

Score coverage, accuracy, sourcing and depth on a 0-10 scale and explain what is missing.
Respond with a single JSON object of the form {"score": 7, "feedback": "what to improve"} and nothing else."#;

pub const WRITE_SYSTEM: &str = "You are a technical writer who turns research notes into a \
polished, well-structured article without dropping facts or sources.";

pub const WRITE_TEMPLATE: &str = r#"Rewrite the research notes below into a complete article that fulfills this goal: {description}

Keep every fact, formula, code sample and source URL. Use clear headings and a conclusion.

Research notes:
{content}"#;

/// System and user prompt templates for `kind`.
pub fn templates(kind: StageKind) -> (&'static str, &'static str) {
    match kind {
        StageKind::Plan => (PLAN_SYSTEM, PLAN_TEMPLATE),
        StageKind::Research => (RESEARCH_SYSTEM, RESEARCH_TEMPLATE),
        StageKind::Validate => (VALIDATE_SYSTEM, VALIDATE_TEMPLATE),
        StageKind::Write => (WRITE_SYSTEM, WRITE_TEMPLATE),
    }
}

/// Substitute every `{key}` for which `inputs` has a value. Unknown braces are left alone,
/// so JSON examples in the templates survive rendering.
///
/// One left-to-right pass over the template; substituted values are never rescanned.
pub fn render(template: &str, inputs: &StageInputs) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| inputs.get(&after[..close]).map(|value| (close, value)));
        match value {
            Some((close, value)) => {
                out.push_str(&value.render());
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
