//! Cost-benefit estimation per category.
//!
//! Each category carries an `(average_cost, average_improvement)` profile.
//! Profiles are fixed by configuration, or learned from observed rounds when
//! a learning rate is set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::config::CostConfig;
use super::round::Category;

/// Expected spend and quality gain of one more round in a category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostProfile {
    pub average_cost: f64,
    pub average_improvement: f64,
}

impl CostProfile {
    pub const fn new(average_cost: f64, average_improvement: f64) -> Self {
        Self {
            average_cost,
            average_improvement,
        }
    }

    /// Cost units per percentage point of expected improvement.
    pub fn cost_per_percent_point(&self) -> f64 {
        if self.average_improvement <= 0.0 {
            return f64::INFINITY;
        }
        self.average_cost / (self.average_improvement * 100.0)
    }
}

/// Result of a cost-benefit query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostAssessment {
    pub worth_continuing: bool,
    pub projected_quality: f64,
    pub cost_per_percent_point: f64,
}

/// Projects quality gain per category from its cost profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBenefitEstimator {
    profiles: BTreeMap<Category, CostProfile>,
    quality_target: f64,
    cost_per_percent_ceiling: f64,
    low_quality_floor: f64,
    learning_rate: f64,
}

impl CostBenefitEstimator {
    pub fn new(config: &CostConfig, quality_target: f64) -> Self {
        let profiles = Category::ALL
            .iter()
            .map(|c| (*c, config.profile(*c)))
            .collect();
        Self {
            profiles,
            quality_target,
            cost_per_percent_ceiling: config.cost_per_percent_ceiling,
            low_quality_floor: config.low_quality_floor,
            learning_rate: config.learning_rate,
        }
    }

    pub fn profile(&self, category: Category) -> CostProfile {
        self.profiles
            .get(&category)
            .copied()
            .unwrap_or(CostProfile::new(0.0, 0.0))
    }

    /// Whether another round in `category` is worth paying for.
    pub fn worth_continuing(
        &self,
        category: Category,
        current_quality: f64,
        remaining_budget: f64,
    ) -> CostAssessment {
        let profile = self.profile(category);
        let projected_quality = (current_quality + profile.average_improvement).min(1.0);
        let cost_per_percent_point = profile.cost_per_percent_point();

        let worth_continuing = if projected_quality >= self.quality_target
            && remaining_budget >= profile.average_cost
        {
            true
        } else {
            !(cost_per_percent_point > self.cost_per_percent_ceiling
                && current_quality < self.low_quality_floor)
        };

        CostAssessment {
            worth_continuing,
            projected_quality,
            cost_per_percent_point,
        }
    }

    /// Fold an observed round into the category's profile.
    /// No-op while the learning rate is zero.
    pub fn observe(&mut self, category: Category, cost: f64, improvement: f64) {
        if self.learning_rate <= 0.0 {
            return;
        }
        let rate = self.learning_rate.min(1.0);
        let profile = self
            .profiles
            .entry(category)
            .or_insert(CostProfile::new(cost, improvement.max(0.0)));
        profile.average_cost = (1.0 - rate).mul_add(profile.average_cost, rate * cost);
        profile.average_improvement =
            (1.0 - rate).mul_add(profile.average_improvement, rate * improvement.max(0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator(config: &CostConfig) -> CostBenefitEstimator {
        CostBenefitEstimator::new(config, 0.85)
    }

    #[test]
    fn test_reaching_target_is_worth_it_regardless_of_efficiency() {
        let config = CostConfig {
            generation: CostProfile::new(100_000.0, 0.10),
            ..Default::default()
        };
        let result = estimator(&config).worth_continuing(Category::Generation, 0.80, 200_000.0);
        assert!(result.worth_continuing);
        assert!((result.projected_quality - 0.90).abs() < 1e-9);
    }

    #[test]
    fn test_reaching_target_needs_budget_for_one_round() {
        let config = CostConfig {
            generation: CostProfile::new(100_000.0, 0.10),
            ..Default::default()
        };
        let result = estimator(&config).worth_continuing(Category::Generation, 0.80, 50_000.0);
        // 100k / 10pp = 10k per point > 1500, but quality 0.80 >= 0.70 floor
        assert!(result.worth_continuing);

        let result = estimator(&config).worth_continuing(Category::Generation, 0.60, 50_000.0);
        assert!(!result.worth_continuing);
    }

    #[test]
    fn test_expensive_and_far_from_target_stops() {
        let config = CostConfig {
            evaluation: CostProfile::new(20_000.0, 0.01),
            ..Default::default()
        };
        let result = estimator(&config).worth_continuing(Category::Evaluation, 0.40, 1e9);
        assert!(!result.worth_continuing);
        assert!((result.cost_per_percent_point - 20_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_defaults_are_below_ceiling() {
        let e = estimator(&CostConfig::default());
        for category in Category::ALL {
            assert!(e.worth_continuing(category, 0.1, 1e9).worth_continuing);
        }
    }

    #[test]
    fn test_zero_improvement_is_infinitely_expensive() {
        assert!(CostProfile::new(10.0, 0.0).cost_per_percent_point().is_infinite());
    }

    #[test]
    fn test_observe_is_noop_without_learning_rate() {
        let mut e = estimator(&CostConfig::default());
        let before = e.profile(Category::Generation);
        e.observe(Category::Generation, 50_000.0, 0.0);
        assert_eq!(e.profile(Category::Generation), before);
    }

    #[test]
    fn test_observe_moves_toward_observation() {
        let config = CostConfig {
            learning_rate: 0.5,
            ..Default::default()
        };
        let mut e = estimator(&config);
        e.observe(Category::Generation, 10_000.0, -0.2);
        let profile = e.profile(Category::Generation);
        assert!((profile.average_cost - 8_000.0).abs() < 1e-6);
        assert!((profile.average_improvement - 0.025).abs() < 1e-9);
    }
}
