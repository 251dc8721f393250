//! Research checkpoint written during a run.

use deepflow::pipeline::{FlowSettings, ResearchCheckpoint};
use deepflow::stage::{ScriptedStage, StageKind};
use tempfile::TempDir;

use crate::integration::{echo_research, initial_state, plan_with, Script};

#[tokio::test]
async fn checkpoint_holds_latest_research_pass() {
    let dir = TempDir::new().unwrap();
    let checkpoint = ResearchCheckpoint::in_dir(dir.path());
    let script = Script::new(
        ScriptedStage::new(StageKind::Plan)
            .then_topics(&["First"], 1)
            .then_topics(&["Second"], 1),
        echo_research(),
    )
    .validate(
        ScriptedStage::new(StageKind::Validate)
            .then_verdict(1.0, "redo", 1)
            .then_verdict(9.0, "ok", 1),
    )
    .write(ScriptedStage::new(StageKind::Write).then_text("rewritten", 1));
    let settings = FlowSettings {
        retry_policy: deepflow::pipeline::RetryPolicy::RegenerateTopics,
        ..FlowSettings::default()
    };

    let outcome = script
        .flow(settings)
        .with_checkpoint(checkpoint.clone())
        .run(initial_state())
        .await
        .unwrap();

    assert_eq!(outcome.content, "rewritten");
    let saved = std::fs::read_to_string(dir.path().join("research_output.md")).unwrap();
    assert_eq!(saved, "## Second\n");
}

#[tokio::test]
async fn unwritable_checkpoint_does_not_fail_the_run() {
    let dir = TempDir::new().unwrap();
    // The target is a directory, so the write fails.
    let checkpoint = ResearchCheckpoint::new(dir.path());
    let script = Script::new(plan_with(&["A"], 1), echo_research());

    let outcome = script
        .flow(FlowSettings::default())
        .with_checkpoint(checkpoint)
        .run(initial_state())
        .await
        .unwrap();

    assert_eq!(outcome.content, "## A\n");
}
