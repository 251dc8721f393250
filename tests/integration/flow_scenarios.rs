//! End-to-end runs of the stage graph against scripted stages.

use deepflow::pipeline::{Completion, FlowSettings, FlowStep, RetryPolicy};
use deepflow::stage::{ScriptedStage, StageKind};
use deepflow::PipelineError;
use std::time::Duration;

use crate::integration::{echo_research, initial_state, plan_with, Script};

#[tokio::test]
async fn one_failed_research_task_leaves_two_sections() {
    let script = Script::new(
        plan_with(&["Architecture", "Training", "Benchmarks"], 3),
        echo_research()
            .on_topic("Architecture", "## Architecture\n", 10, Duration::from_millis(30))
            .fail_topic("Training", "upstream 502")
            .on_topic("Benchmarks", "## Benchmarks\n", 20, Duration::ZERO),
    );

    let outcome = script.flow(FlowSettings::default()).run(initial_state()).await.unwrap();

    assert_eq!(outcome.content, "## Architecture\n## Benchmarks\n");
    assert_eq!(outcome.completion, Completion::Unvalidated);
    assert_eq!(outcome.failed_topics.len(), 1);
    assert_eq!(outcome.failed_topics[0].topic, "Training");
    assert_eq!(outcome.failed_topics[0].ordinal, 1);
    assert_eq!(outcome.total_usage, 33);
    assert_eq!(script.research.call_count(), 3);
}

#[tokio::test]
async fn score_above_threshold_completes_without_retry() {
    let script = Script::new(plan_with(&["A", "B"], 1), echo_research())
        .validate(ScriptedStage::new(StageKind::Validate).then_verdict(8.0, "solid", 2));

    let outcome = script.flow(FlowSettings::default()).run(initial_state()).await.unwrap();

    assert_eq!(outcome.completion, Completion::Accepted);
    assert_eq!(outcome.retry_count, 1);
    assert_eq!(outcome.score, Some(8.0));
    assert_eq!(script.research.call_count(), 2);
    assert_eq!(
        outcome.steps,
        vec![
            FlowStep::Planning,
            FlowStep::Researching,
            FlowStep::Validating,
            FlowStep::Complete
        ]
    );
}

#[tokio::test]
async fn two_low_scores_exhaust_a_ceiling_of_two() {
    let script = Script::new(plan_with(&["A"], 1), echo_research()).validate(
        ScriptedStage::new(StageKind::Validate)
            .then_verdict(3.0, "too shallow", 1)
            .then_verdict(3.0, "still shallow", 1)
            .then_verdict(9.0, "never asked", 1),
    );
    let settings = FlowSettings {
        retry_ceiling: 2,
        ..FlowSettings::default()
    };

    let outcome = script.flow(settings).run(initial_state()).await.unwrap();

    assert_eq!(script.validate_calls(), 2);
    assert_eq!(outcome.retry_count, 2);
    assert_eq!(outcome.completion, Completion::RetryBudgetExhausted);
    assert_eq!(outcome.feedback.as_deref(), Some("still shallow"));
    assert_eq!(script.research.call_count(), 3);
    assert_eq!(script.plan.call_count(), 1);
}

#[tokio::test]
async fn retry_research_receives_validator_feedback() {
    let script = Script::new(plan_with(&["A"], 1), echo_research()).validate(
        ScriptedStage::new(StageKind::Validate)
            .then_verdict(4.0, "add benchmarks", 1)
            .then_verdict(7.0, "good", 1),
    );

    let outcome = script.flow(FlowSettings::default()).run(initial_state()).await.unwrap();

    assert_eq!(outcome.completion, Completion::Accepted);
    let calls = script.research.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].text("feedback"), None);
    assert_eq!(calls[1].text("feedback"), Some("add benchmarks"));
}

#[tokio::test]
async fn score_equal_to_threshold_retries() {
    let script = Script::new(plan_with(&["A"], 1), echo_research()).validate(
        ScriptedStage::new(StageKind::Validate)
            .then_verdict(6.0, "borderline", 1)
            .then_verdict(6.5, "ok", 1),
    );

    let outcome = script.flow(FlowSettings::default()).run(initial_state()).await.unwrap();

    assert_eq!(script.validate_calls(), 2);
    assert_eq!(outcome.retry_count, 2);
    assert_eq!(outcome.completion, Completion::Accepted);
}

#[tokio::test]
async fn zero_ceiling_never_validates() {
    let script = Script::new(plan_with(&["A"], 1), echo_research())
        .validate(ScriptedStage::new(StageKind::Validate).then_verdict(9.0, "", 1));
    let settings = FlowSettings {
        retry_ceiling: 0,
        ..FlowSettings::default()
    };

    let outcome = script.flow(settings).run(initial_state()).await.unwrap();

    assert_eq!(script.validate_calls(), 0);
    assert_eq!(outcome.retry_count, 0);
    assert_eq!(outcome.completion, Completion::RetryBudgetExhausted);
    assert_eq!(outcome.content, "## A\n");
}

#[tokio::test]
async fn plan_failure_aborts_the_run() {
    let script = Script::new(
        ScriptedStage::new(StageKind::Plan).then_err("model unavailable"),
        echo_research(),
    );

    let err = script
        .flow(FlowSettings::default())
        .run(initial_state())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::PlanFailure(_)));
    assert_eq!(script.research.call_count(), 0);
}

#[tokio::test]
async fn empty_plan_is_a_plan_failure() {
    let script = Script::new(plan_with(&[], 4), echo_research());
    let err = script
        .flow(FlowSettings::default())
        .run(initial_state())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::PlanFailure(_)));
}

#[tokio::test]
async fn validation_failure_completes_with_research_content() {
    let script = Script::new(plan_with(&["A", "B"], 1), echo_research())
        .validate(ScriptedStage::new(StageKind::Validate).then_err("timeout"))
        .write(ScriptedStage::new(StageKind::Write).then_text("polished", 1));

    let outcome = script.flow(FlowSettings::default()).run(initial_state()).await.unwrap();

    assert_eq!(outcome.completion, Completion::ValidationFailed);
    assert_eq!(outcome.content, "## A\n## B\n");
    assert_eq!(outcome.retry_count, 0);
    assert_eq!(script.write.as_ref().unwrap().call_count(), 0);
}

#[tokio::test]
async fn unparseable_verdict_still_counts_its_tokens() {
    let script = Script::new(plan_with(&["A", "B"], 3), echo_research()).validate(
        ScriptedStage::new(StageKind::Validate)
            .then_malformed("I think the score is about eight", 1000),
    );

    let outcome = script.flow(FlowSettings::default()).run(initial_state()).await.unwrap();

    assert_eq!(outcome.completion, Completion::ValidationFailed);
    assert_eq!(outcome.content, "## A\n## B\n");
    assert_eq!(outcome.score, None);
    assert_eq!(outcome.total_usage, 1005);
    let validate = outcome.usage_by_stage[&StageKind::Validate];
    assert_eq!(validate.calls, 1);
    assert_eq!(validate.usage.total, 1000);
}

#[tokio::test]
async fn write_replaces_content_after_acceptance() {
    let script = Script::new(plan_with(&["A"], 1), echo_research())
        .validate(ScriptedStage::new(StageKind::Validate).then_verdict(9.0, "great", 1))
        .write(ScriptedStage::new(StageKind::Write).then_text("# Final article\n", 5));

    let outcome = script.flow(FlowSettings::default()).run(initial_state()).await.unwrap();

    assert_eq!(outcome.content, "# Final article\n");
    let write_calls = script.write.as_ref().unwrap().calls();
    assert_eq!(write_calls[0].text("content"), Some("## A\n"));
    assert_eq!(outcome.steps.last(), Some(&FlowStep::Complete));
    assert!(outcome.steps.contains(&FlowStep::Writing));
}

#[tokio::test]
async fn write_failure_keeps_researched_content() {
    let script = Script::new(plan_with(&["A"], 1), echo_research())
        .write(ScriptedStage::new(StageKind::Write).then_err("rate limited"));

    let outcome = script.flow(FlowSettings::default()).run(initial_state()).await.unwrap();

    assert_eq!(outcome.content, "## A\n");
    assert_eq!(outcome.completion, Completion::Unvalidated);
}

#[tokio::test]
async fn total_usage_is_the_exact_sum_of_every_call() {
    let script = Script::new(
        plan_with(&["A", "B", "C"], 5),
        echo_research()
            .on_topic("A", "a", 11, Duration::from_millis(20))
            .on_topic("B", "b", 13, Duration::from_millis(5))
            .on_topic("C", "c", 17, Duration::ZERO),
    )
    .validate(
        ScriptedStage::new(StageKind::Validate)
            .then_verdict(1.0, "again", 3)
            .then_verdict(10.0, "done", 7),
    )
    .write(ScriptedStage::new(StageKind::Write).then_text("final", 19));

    let outcome = script.flow(FlowSettings::default()).run(initial_state()).await.unwrap();

    let research_pass = 11 + 13 + 17;
    assert_eq!(outcome.total_usage, 5 + 2 * research_pass + 3 + 7 + 19);
    assert_eq!(outcome.usage_by_stage[&StageKind::Research].calls, 6);
    assert_eq!(outcome.usage_by_stage[&StageKind::Validate].usage.total, 10);
    let summed: u64 = outcome.usage_by_stage.values().map(|s| s.usage.total).sum();
    assert_eq!(summed, outcome.total_usage);
}

#[tokio::test]
async fn regenerate_policy_replans_before_research() {
    let script = Script::new(
        ScriptedStage::new(StageKind::Plan)
            .then_topics(&["A"], 1)
            .then_topics(&["B", "C"], 1),
        echo_research(),
    )
    .validate(
        ScriptedStage::new(StageKind::Validate)
            .then_verdict(2.0, "wrong angle", 1)
            .then_verdict(8.0, "better", 1),
    );
    let settings = FlowSettings {
        retry_policy: RetryPolicy::RegenerateTopics,
        ..FlowSettings::default()
    };

    let outcome = script.flow(settings).run(initial_state()).await.unwrap();

    assert_eq!(outcome.content, "## B\n## C\n");
    assert_eq!(
        outcome.steps,
        vec![
            FlowStep::Planning,
            FlowStep::Researching,
            FlowStep::Validating,
            FlowStep::Planning,
            FlowStep::Researching,
            FlowStep::Validating,
            FlowStep::Complete
        ]
    );
}
