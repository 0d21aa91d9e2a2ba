//! Plain-text progress lines derived from successive session views.

use std::collections::HashMap;

use dstar_client::SessionView;
use dstar_core::{Phase, StepStatus};

/// Remembers what was last printed so each view only adds what changed.
#[derive(Debug, Default)]
pub struct ProgressPrinter {
    phase: Option<Phase>,
    iteration: Option<u32>,
    steps: HashMap<u32, StepStatus>,
    backtrack: Option<u32>,
    results: usize,
    session_announced: bool,
}

impl ProgressPrinter {
    /// Lines describing what changed since the previous view.
    pub fn lines(&mut self, view: &SessionView) -> Vec<String> {
        let mut out = Vec::new();

        if !self.session_announced {
            if let Some(id) = &view.session_id {
                out.push(format!("session {id} accepted"));
                self.session_announced = true;
            }
        }
        if view.phase.is_some() && view.phase != self.phase {
            if let Some(phase) = view.phase {
                out.push(format!("phase: {}", phase.as_str()));
            }
            self.phase = view.phase;
        }
        if view.snapshot.is_some() && self.iteration != Some(view.iteration) {
            out.push(format!("iteration {}", view.iteration));
            self.iteration = Some(view.iteration);
        }

        if let Some(snapshot) = &view.snapshot {
            // Backtracking can shrink the plan; forget steps that are gone.
            self.steps.retain(|index, _| snapshot.steps.iter().any(|s| s.index == *index));
            for step in &snapshot.steps {
                if self.steps.get(&step.index) != Some(&step.status) {
                    out.push(format!(
                        "  step {} [{}] {}",
                        step.index,
                        step.status.as_str(),
                        step.description
                    ));
                    let _ = self.steps.insert(step.index, step.status);
                }
            }
            let backtrack = snapshot.backtrack_point();
            if backtrack != self.backtrack {
                if let Some(index) = backtrack {
                    out.push(format!("  plan revised from step {index}"));
                }
                self.backtrack = backtrack;
            }
            if snapshot.execution_results.len() < self.results {
                self.results = 0;
            }
            for result in snapshot.execution_results.iter().skip(self.results) {
                let outcome = if result.success { "ok" } else { "failed" };
                out.push(format!(
                    "  execution {outcome} in {:.0}ms",
                    result.execution_time_ms
                ));
            }
            self.results = snapshot.execution_results.len();
        }
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use dstar_core::{ExecutionResult, ExecutionSnapshot, FileDescriptor, PlanStep, SessionId};

    fn view_with(steps: Vec<PlanStep>, iteration: u32) -> SessionView {
        SessionView {
            session_id: Some(SessionId::from("s1")),
            iteration,
            phase: Some(Phase::Planning),
            snapshot: Some(ExecutionSnapshot {
                file_descriptions: vec![FileDescriptor::default()],
                steps,
                iteration,
                ..ExecutionSnapshot::default()
            }),
            ..SessionView::default()
        }
    }

    fn step(index: u32, status: StepStatus) -> PlanStep {
        PlanStep {
            index,
            description: format!("step {index}"),
            status,
            created_at: None,
        }
    }

    #[test]
    fn first_view_prints_everything() {
        let mut printer = ProgressPrinter::default();
        let lines = printer.lines(&view_with(vec![step(0, StepStatus::Pending)], 0));
        assert_eq!(
            lines,
            [
                "session s1 accepted",
                "phase: planning",
                "iteration 0",
                "  step 0 [PENDING] step 0",
            ]
        );
    }

    #[test]
    fn unchanged_view_prints_nothing() {
        let mut printer = ProgressPrinter::default();
        let view = view_with(vec![step(0, StepStatus::Pending)], 1);
        let _ = printer.lines(&view);
        assert!(printer.lines(&view).is_empty());
    }

    #[test]
    fn only_changed_steps_are_printed() {
        let mut printer = ProgressPrinter::default();
        let _ = printer.lines(&view_with(
            vec![step(0, StepStatus::Completed), step(1, StepStatus::Executing)],
            1,
        ));
        let lines = printer.lines(&view_with(
            vec![step(0, StepStatus::Completed), step(1, StepStatus::Backtracked)],
            2,
        ));
        assert_eq!(
            lines,
            [
                "iteration 2",
                "  step 1 [BACKTRACKED] step 1",
                "  plan revised from step 1",
            ]
        );
    }

    #[test]
    fn new_execution_results_are_printed_once() {
        let mut printer = ProgressPrinter::default();
        let mut view = view_with(vec![], 1);
        let _ = printer.lines(&view);

        if let Some(snapshot) = view.snapshot.as_mut() {
            snapshot.execution_results.push(ExecutionResult {
                success: true,
                execution_time_ms: 12.4,
                ..ExecutionResult::default()
            });
        }
        assert_eq!(printer.lines(&view), ["  execution ok in 12ms"]);
        assert!(printer.lines(&view).is_empty());
    }
}
