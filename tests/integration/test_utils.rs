//! Shared test utilities for integration tests
//!
//! Serializes environment mutation across tests and builds scripted stage sets.

use deepflow::pipeline::{FlowSettings, PipelineState, ResearchFlow, StageSet};
use deepflow::stage::{ScriptedStage, StageKind};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const ISOLATED_VARS: &[&str] = &["HOME", "XDG_CONFIG_HOME", "DEEPFLOW_ENV"];

/// Run `f` with HOME and XDG_CONFIG_HOME pointed into `test_dir`, restoring them afterwards.
/// `extra` variables are set for the duration and removed afterwards.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, extra: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(&str, Option<String>)> = ISOLATED_VARS
        .iter()
        .map(|name| (*name, std::env::var(name).ok()))
        .collect();

    let home = test_dir.path().join("home");
    let config_home = test_dir.path().join("xdg");
    std::fs::create_dir_all(&home).unwrap();
    std::fs::create_dir_all(&config_home).unwrap();
    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", &config_home);
    std::env::remove_var("DEEPFLOW_ENV");
    for (name, value) in extra {
        std::env::set_var(name, value);
    }

    let result = f();

    for (name, _) in extra {
        std::env::remove_var(name);
    }
    for (name, value) in saved {
        match value {
            Some(value) => std::env::set_var(name, value),
            None => std::env::remove_var(name),
        }
    }
    result
}

pub fn initial_state() -> PipelineState {
    PipelineState::new(
        "A medium article on a new multimodal model",
        "Qwen 2.5-omni model",
        "2025",
    )
}

/// Scripted stages for one run. Absent optional stages are left out of the graph.
pub struct Script {
    pub plan: Arc<ScriptedStage>,
    pub research: Arc<ScriptedStage>,
    pub validate: Option<Arc<ScriptedStage>>,
    pub write: Option<Arc<ScriptedStage>>,
}

impl Script {
    pub fn new(plan: ScriptedStage, research: ScriptedStage) -> Self {
        Self {
            plan: Arc::new(plan),
            research: Arc::new(research),
            validate: None,
            write: None,
        }
    }

    pub fn validate(mut self, validate: ScriptedStage) -> Self {
        self.validate = Some(Arc::new(validate));
        self
    }

    pub fn write(mut self, write: ScriptedStage) -> Self {
        self.write = Some(Arc::new(write));
        self
    }

    pub fn flow(&self, settings: FlowSettings) -> ResearchFlow {
        let mut stages = StageSet::new(self.plan.clone(), self.research.clone()).unwrap();
        if let Some(validate) = &self.validate {
            stages = stages.with_validate(validate.clone()).unwrap();
        }
        if let Some(write) = &self.write {
            stages = stages.with_write(write.clone()).unwrap();
        }
        ResearchFlow::new(stages, settings)
    }

    pub fn validate_calls(&self) -> usize {
        self.validate.as_ref().map(|v| v.call_count()).unwrap_or(0)
    }
}

pub fn plan_with(topics: &[&str], usage: u64) -> ScriptedStage {
    ScriptedStage::new(StageKind::Plan).then_topics(topics, usage)
}

pub fn echo_research() -> ScriptedStage {
    ScriptedStage::new(StageKind::Research)
}
