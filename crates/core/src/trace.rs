//! Per-turn decision trace.
//!
//! A lightweight append-only log of what the engine did during one turn,
//! kept for operator display and debugging. Never consulted by routing
//! logic.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
pub struct TraceStep {
    pub at: DateTime<Utc>,
    pub label: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct TurnTrace {
    pub turn_id: Uuid,
    steps: Vec<TraceStep>,
}

impl TurnTrace {
    pub fn new() -> Self {
        Self { turn_id: Uuid::new_v4(), steps: Vec::new() }
    }

    pub fn push(&mut self, label: impl Into<String>) {
        self.steps.push(TraceStep { at: Utc::now(), label: label.into() });
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    /// One line per step, oldest first.
    pub fn render(&self) -> String {
        self.steps
            .iter()
            .map(|step| format!("{} {}", step.at.format("%H:%M:%S%.3f"), step.label))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for TurnTrace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::TurnTrace;

    #[test]
    fn steps_accumulate_in_order() {
        let mut trace = TurnTrace::new();
        trace.push("intake complete");
        trace.push("consulted: product specialist");

        let labels: Vec<&str> = trace.steps().iter().map(|step| step.label.as_str()).collect();
        assert_eq!(labels, vec!["intake complete", "consulted: product specialist"]);

        let rendered = trace.render();
        assert!(rendered.lines().count() == 2);
        assert!(rendered.contains("intake complete"));
    }

    #[test]
    fn fresh_traces_get_distinct_turn_ids() {
        assert_ne!(TurnTrace::new().turn_id, TurnTrace::new().turn_id);
    }
}
