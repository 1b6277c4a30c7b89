/// Weighted pass/fail over a scorecard's metrics.

use crate::schema::scorecard::{FailAction, Scorecard, WeightedScore, WeightsConfig};

/// Score = earned weight / considered weight. Metrics set to `off` or with
/// a non-positive weight are not considered. Any failed `fail` metric
/// fails the run regardless of score. A scorecard with nothing to
/// consider scores 1.0.
pub fn evaluate_weighted(scorecard: &Scorecard, weights: &WeightsConfig) -> WeightedScore {
    let mut considered = 0.0;
    let mut earned = 0.0;
    let mut hard_fail = Vec::new();
    let mut warnings = Vec::new();

    for (name, metric) in &scorecard.metrics {
        let weight = weights.weight_for(name);
        if weight.action_on_fail == FailAction::Off || weight.weight <= 0.0 {
            continue;
        }
        considered += weight.weight;
        if metric.pass {
            earned += weight.weight;
            continue;
        }
        match weight.action_on_fail {
            FailAction::Fail => hard_fail.push(name.clone()),
            FailAction::Warn => warnings.push(name.clone()),
            FailAction::Off => {}
        }
    }

    let score = if considered > 0.0 { earned / considered } else { 1.0 };
    WeightedScore {
        score,
        pass: score >= weights.pass_score && hard_fail.is_empty(),
        hard_fail,
        warnings,
    }
}
