//! Fan-out results keep topic order regardless of completion order or failures.

use deepflow::pipeline::{concatenate_successes, FanOutExecutor, PipelineState, StageTask};
use deepflow::stage::{ScriptedStage, StageKind};
use proptest::prelude::*;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

/// (delay in ms, fails) per topic
fn topic_plan() -> impl Strategy<Value = Vec<(u64, bool)>> {
    prop::collection::vec((0u64..8, prop::bool::weighted(0.3)), 0..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn results_are_complete_and_ordered(plan in topic_plan(), limit in 1usize..6) {
        let mut state = PipelineState::new("d", "e", "2025");
        state.topics = (0..plan.len()).map(|i| format!("topic-{i}")).collect();

        let mut stage = ScriptedStage::new(StageKind::Research);
        for (i, (delay, fails)) in plan.iter().enumerate() {
            let topic = format!("topic-{i}");
            stage = if *fails {
                stage.fail_topic(&topic, "boom")
            } else {
                stage.on_topic(&topic, &format!("[{i}]"), 1, Duration::from_millis(*delay))
            };
        }

        let done = runtime().block_on(async {
            FanOutExecutor::new(limit)
                .run_all(StageTask::from_topics(&state.topics), &stage, &state.research_snapshot())
                .await
        }).unwrap();

        prop_assert_eq!(done.len(), plan.len());
        for (i, task) in done.iter().enumerate() {
            prop_assert_eq!(task.ordinal, i);
            prop_assert_eq!(&task.topic, &format!("topic-{i}"));
            prop_assert!(task.result.is_terminal());
        }

        let expected: String = plan
            .iter()
            .enumerate()
            .filter(|(_, (_, fails))| !fails)
            .map(|(i, _)| format!("[{i}]"))
            .collect();
        prop_assert_eq!(concatenate_successes(&done, ""), expected);
    }
}
