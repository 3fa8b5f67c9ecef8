use std::{cmp::Ordering, fs, path::Path};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    detection::Discrepancy,
    error::{FidelityError, Result},
    scoring::{FidelityScore, ScoringWeights},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationConfig {
    pub max_iterations: u32,
    pub convergence_threshold: u32,
    /// Consecutive non-improving score steps tolerated before escalating.
    pub stall_patience: u32,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            convergence_threshold: 95,
            stall_patience: 1,
        }
    }
}

impl IterationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(FidelityError::Configuration("max_iterations must be at least 1".into()));
        }
        if self.convergence_threshold > 100 {
            return Err(FidelityError::Configuration(format!(
                "convergence_threshold must be at most 100, got {}",
                self.convergence_threshold
            )));
        }
        if self.stall_patience == 0 {
            return Err(FidelityError::Configuration("stall_patience must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IterationStatus {
    Running,
    Converged,
    Stalled,
    Escalated,
    MaxIterationsReached,
}

impl IterationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, IterationStatus::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: IterationStatus,
    pub to: IterationStatus,
    pub iteration: u32,
}

/// Append-only record of one refinement loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationState {
    pub iteration: u32,
    pub history: Vec<FidelityScore>,
    pub status: IterationStatus,
    #[serde(default)]
    pub transitions: Vec<StatusTransition>,
}

impl Default for IterationState {
    fn default() -> Self {
        Self {
            iteration: 0,
            history: Vec::new(),
            status: IterationStatus::Running,
            transitions: Vec::new(),
        }
    }
}

impl IterationState {
    pub fn latest(&self) -> Option<&FidelityScore> {
        self.history.last()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    fn transition(&mut self, to: IterationStatus) {
        self.transitions.push(StatusTransition {
            from: self.status,
            to,
            iteration: self.iteration,
        });
        self.status = to;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDiscrepancy {
    pub impact: f64,
    pub discrepancy: Discrepancy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IterationDecision {
    /// Keep refining; fix the highest-impact discrepancies first.
    Continue { ranked: Vec<RankedDiscrepancy> },
    Converged,
    MaxIterationsReached,
    Escalated { reason: String },
}

impl IterationDecision {
    pub fn status(&self) -> IterationStatus {
        match self {
            IterationDecision::Continue { .. } => IterationStatus::Running,
            IterationDecision::Converged => IterationStatus::Converged,
            IterationDecision::MaxIterationsReached => IterationStatus::MaxIterationsReached,
            IterationDecision::Escalated { .. } => IterationStatus::Escalated,
        }
    }
}

pub struct IterationController {
    config: IterationConfig,
    weights: ScoringWeights,
    state: IterationState,
}

impl IterationController {
    pub fn new(config: IterationConfig, weights: ScoringWeights) -> Result<Self> {
        Self::resume(config, weights, IterationState::default())
    }

    /// Continues a loop from persisted state.
    pub fn resume(config: IterationConfig, weights: ScoringWeights, state: IterationState) -> Result<Self> {
        config.validate()?;
        weights.validate()?;
        if state.history.len() != state.iteration as usize {
            return Err(FidelityError::Configuration(format!(
                "iteration state is inconsistent: iteration {} with {} recorded scores",
                state.iteration,
                state.history.len()
            )));
        }

        Ok(Self { config, weights, state })
    }

    pub fn config(&self) -> &IterationConfig {
        &self.config
    }

    pub fn state(&self) -> &IterationState {
        &self.state
    }

    pub fn into_state(self) -> IterationState {
        self.state
    }

    pub fn status(&self) -> IterationStatus {
        self.state.status
    }

    /// Appends a score and decides what happens next. Once the loop has left
    /// `Running`, further scores are rejected.
    pub fn record(&mut self, mut score: FidelityScore, discrepancies: &[Discrepancy]) -> Result<IterationDecision> {
        if self.state.status.is_terminal() {
            return Err(FidelityError::IterationClosed(self.state.status));
        }

        self.state.iteration += 1;
        score.iteration = self.state.iteration;
        let total = score.total;
        self.state.history.push(score);

        let iteration = self.state.iteration;
        let decision = if total >= self.config.convergence_threshold {
            self.state.transition(IterationStatus::Converged);
            info!("iteration {}: score {} reached {}, converged", iteration, total, self.config.convergence_threshold);
            IterationDecision::Converged
        } else if iteration >= self.config.max_iterations {
            self.state.transition(IterationStatus::MaxIterationsReached);
            info!("iteration {}: score {}, iteration budget exhausted", iteration, total);
            IterationDecision::MaxIterationsReached
        } else if self.is_stalled() {
            let reason = format!(
                "score has not improved for {} consecutive iteration(s) (latest {})",
                self.config.stall_patience, total
            );
            self.state.transition(IterationStatus::Stalled);
            self.state.transition(IterationStatus::Escalated);
            info!("iteration {}: {}, escalating", iteration, reason);
            IterationDecision::Escalated { reason }
        } else {
            let ranked = Self::rank_by_impact(discrepancies, &self.weights);
            info!(
                "iteration {}: score {}, continuing with {} discrepancies",
                iteration,
                total,
                ranked.len()
            );
            IterationDecision::Continue { ranked }
        };

        Ok(decision)
    }

    fn is_stalled(&self) -> bool {
        let patience = self.config.stall_patience as usize;
        let history = &self.state.history;
        if history.len() <= patience {
            return false;
        }

        history[history.len() - patience - 1..]
            .windows(2)
            .all(|w| w[1].total <= w[0].total)
    }

    /// Orders discrepancies by estimated score impact, then by the weight of
    /// their category, then by delta magnitude.
    pub fn rank_by_impact(discrepancies: &[Discrepancy], weights: &ScoringWeights) -> Vec<RankedDiscrepancy> {
        let mut ranked = discrepancies
            .iter()
            .map(|d| RankedDiscrepancy {
                impact: weights.impact(d),
                discrepancy: d.clone(),
            })
            .collect::<Vec<_>>();

        ranked.sort_by(|a, b| {
            b.impact
                .total_cmp(&a.impact)
                .then_with(|| {
                    weights
                        .category_weight(b.discrepancy.category)
                        .cmp(&weights.category_weight(a.discrepancy.category))
                })
                .then_with(|| {
                    b.discrepancy
                        .delta
                        .abs()
                        .partial_cmp(&a.discrepancy.delta.abs())
                        .unwrap_or(Ordering::Equal)
                })
        });

        ranked
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::detection::{Category, FixCategory, MeasuredValue, Severity, Signal};

    fn score(total: u32) -> FidelityScore {
        FidelityScore {
            total,
            breakdown: BTreeMap::new(),
            iteration: 0,
            timestamp: Utc::now(),
        }
    }

    fn controller() -> IterationController {
        IterationController::new(IterationConfig::default(), ScoringWeights::default()).unwrap()
    }

    fn finding(category: Category, severity: Severity, delta: f64) -> Discrepancy {
        Discrepancy {
            category,
            signal: Signal::DeltaE,
            region: None,
            measured: MeasuredValue::Number(delta),
            expected: MeasuredValue::Number(0.0),
            delta,
            severity,
            fix: FixCategory::ReviewManually,
            description: String::new(),
        }
    }

    #[test]
    fn test_initial_state() {
        let controller = controller();
        assert_eq!(controller.status(), IterationStatus::Running);
        assert_eq!(controller.state().iteration, 0);
        assert!(controller.state().history.is_empty());
    }

    #[test]
    fn test_converges_on_threshold() {
        let mut controller = controller();
        assert!(matches!(controller.record(score(80), &[]).unwrap(), IterationDecision::Continue { .. }));
        assert_eq!(controller.record(score(95), &[]).unwrap(), IterationDecision::Converged);

        let state = controller.state();
        assert_eq!(state.status, IterationStatus::Converged);
        assert_eq!(state.history.iter().map(|s| s.iteration).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            state.transitions,
            vec![StatusTransition {
                from: IterationStatus::Running,
                to: IterationStatus::Converged,
                iteration: 2,
            }]
        );
    }

    #[test]
    fn test_two_non_improving_scores_escalate() {
        let mut controller = controller();
        controller.record(score(60), &[]).unwrap();
        let decision = controller.record(score(60), &[]).unwrap();

        assert!(matches!(decision, IterationDecision::Escalated { .. }));
        assert_eq!(controller.status(), IterationStatus::Escalated);
        let path = controller.state().transitions.iter().map(|t| t.to).collect::<Vec<_>>();
        assert_eq!(path, vec![IterationStatus::Stalled, IterationStatus::Escalated]);
    }

    #[test]
    fn test_patience_allows_a_dip() {
        let config = IterationConfig {
            stall_patience: 2,
            ..Default::default()
        };
        let mut controller = IterationController::new(config, ScoringWeights::default()).unwrap();
        controller.record(score(60), &[]).unwrap();
        assert!(matches!(controller.record(score(55), &[]).unwrap(), IterationDecision::Continue { .. }));
        assert!(matches!(controller.record(score(70), &[]).unwrap(), IterationDecision::Continue { .. }));
        controller.record(score(70), &[]).unwrap();
        assert!(matches!(controller.record(score(65), &[]).unwrap(), IterationDecision::Escalated { .. }));
    }

    #[test]
    fn test_max_iterations_is_never_exceeded() {
        let config = IterationConfig {
            max_iterations: 3,
            ..Default::default()
        };
        let mut controller = IterationController::new(config, ScoringWeights::default()).unwrap();

        controller.record(score(10), &[]).unwrap();
        controller.record(score(20), &[]).unwrap();
        assert_eq!(controller.record(score(30), &[]).unwrap(), IterationDecision::MaxIterationsReached);
        assert!(matches!(
            controller.record(score(40), &[]),
            Err(FidelityError::IterationClosed(IterationStatus::MaxIterationsReached))
        ));
        assert_eq!(controller.state().history.len(), 3);
    }

    #[test]
    fn test_ranking_by_impact() {
        let found = vec![
            finding(Category::Spacing, Severity::Low, 3.0),
            finding(Category::Color, Severity::High, 5.0),
            finding(Category::Spacing, Severity::High, 2.0),
            finding(Category::Spacing, Severity::High, 12.0),
        ];

        let ranked = IterationController::rank_by_impact(&found, &ScoringWeights::default());
        let order = ranked.iter().map(|r| (r.discrepancy.category, r.discrepancy.delta)).collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                (Category::Color, 5.0),
                (Category::Spacing, 12.0),
                (Category::Spacing, 2.0),
                (Category::Spacing, 3.0),
            ]
        );
    }

    #[test]
    fn test_state_round_trip_and_resume() {
        let mut controller = controller();
        controller.record(score(40), &[]).unwrap();
        let json = controller.into_state().to_json().unwrap();

        let state = IterationState::from_json(&json).unwrap();
        let mut resumed = IterationController::resume(IterationConfig::default(), ScoringWeights::default(), state).unwrap();
        resumed.record(score(50), &[]).unwrap();
        assert_eq!(resumed.state().iteration, 2);
    }

    #[test]
    fn test_resume_rejects_inconsistent_state() {
        let state = IterationState {
            iteration: 3,
            ..Default::default()
        };
        assert!(IterationController::resume(IterationConfig::default(), ScoringWeights::default(), state).is_err());
    }
}
