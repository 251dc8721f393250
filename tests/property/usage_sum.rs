//! Run totals equal the exact sum of every reported usage value.

use deepflow::pipeline::{add_usage, FlowSettings, PipelineState, ResearchFlow, StageSet, UsageMetrics};
use deepflow::stage::{ScriptedStage, StageKind};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn add_usage_is_order_independent(mut values in prop::collection::vec(0u64..1_000_000, 0..40)) {
        let mut forward = PipelineState::new("d", "e", "t");
        for v in &values {
            add_usage(&mut forward, &UsageMetrics::total_only(*v));
        }
        values.reverse();
        let mut backward = PipelineState::new("d", "e", "t");
        for v in &values {
            add_usage(&mut backward, &UsageMetrics::total_only(*v));
        }
        prop_assert_eq!(forward.total_usage, backward.total_usage);
        prop_assert_eq!(forward.total_usage, values.iter().sum::<u64>());
    }

    #[test]
    fn concurrent_research_usage_is_lossless(
        plan_usage in 0u64..500,
        research in prop::collection::vec((0u64..10_000, 0u64..6), 1..10),
        workers in 1usize..5,
    ) {
        let topics: Vec<String> = (0..research.len()).map(|i| format!("t{i}")).collect();
        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        let mut research_stage = ScriptedStage::new(StageKind::Research);
        for (topic, (usage, delay)) in topics.iter().zip(&research) {
            research_stage = research_stage.on_topic(topic, "x", *usage, Duration::from_millis(*delay));
        }
        let plan = ScriptedStage::new(StageKind::Plan).then_topics(&topic_refs, plan_usage);
        let flow = ResearchFlow::new(
            StageSet::new(Arc::new(plan), Arc::new(research_stage)).unwrap(),
            FlowSettings { worker_limit: workers, ..FlowSettings::default() },
        );

        let outcome = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(flow.run(PipelineState::new("d", "e", "2025")))
            .unwrap();

        let expected = plan_usage + research.iter().map(|(usage, _)| usage).sum::<u64>();
        prop_assert_eq!(outcome.total_usage, expected);
    }
}
