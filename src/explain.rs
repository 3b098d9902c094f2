//! Ranking of per-feature contributions into human-readable risk factors.
//!
//! The classifier supplies a [`ContributionMap`] for one specific
//! prediction; this module orders it and renders the top entries for a
//! downstream explanation generator. Ranking is fully deterministic:
//! absolute contribution descending, ties broken by the feature's position
//! in the canonical order so identical inputs always render identically.

use crate::features::canonical_index;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Signed per-feature contributions toward the fraud class for one
/// prediction. Positive pushes toward fraud, negative away. Used only for
/// explanation, never for scoring decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributionMap {
    entries: HashMap<String, f64>,
}

impl ContributionMap {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, feature: String, contribution: f64) {
        self.entries.insert(feature, contribution);
    }

    pub fn get(&self, feature: &str) -> Option<f64> {
        self.entries.get(feature).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.entries.iter()
    }
}

impl FromIterator<(String, f64)> for ContributionMap {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Direction a contribution pushes the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increases,
    Decreases,
}

impl Direction {
    /// Zero renders as "decreases" by convention: a feature contributing
    /// nothing toward fraud is reported on the non-fraud side.
    fn from_contribution(contribution: f64) -> Self {
        if contribution > 0.0 {
            Direction::Increases
        } else {
            Direction::Decreases
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Increases => write!(f, "increases"),
            Direction::Decreases => write!(f, "decreases"),
        }
    }
}

/// One ranked risk factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFactor {
    pub feature: String,
    pub contribution: f64,
    pub direction: Direction,
}

impl RankedFactor {
    /// Render as "<factor description> increases|decreases risk".
    pub fn render(&self) -> String {
        format!("{} {} risk", describe(&self.feature), self.direction)
    }
}

/// Human-readable description for a canonical feature name. Unknown names
/// fall back to the name with underscores spaced out.
pub fn describe(feature: &str) -> String {
    match feature {
        "amount" => "Transaction amount".to_string(),
        "hour_of_day" => "Hour of day".to_string(),
        "day_of_week" => "Day of week".to_string(),
        "is_weekend" => "Weekend timing".to_string(),
        "amount_zscore" => "Deviation from the user's typical amount".to_string(),
        "velocity_1h" => "Transaction count in the last hour".to_string(),
        "velocity_24h" => "Transaction count in the last 24 hours".to_string(),
        "is_new_device" => "Unrecognized device".to_string(),
        "location_risk" => "Location risk".to_string(),
        "merchant_risk" => "Merchant category risk".to_string(),
        "account_age_days" => "Account age".to_string(),
        "avg_amount" => "User's average transaction amount".to_string(),
        "transaction_frequency" => "User's transaction frequency".to_string(),
        "refund_ratio" => "User's refund ratio".to_string(),
        "failed_attempts" => "Recent failed attempts".to_string(),
        other => other.replace('_', " "),
    }
}

fn tie_break_rank(feature: &str) -> usize {
    // Canonical features rank by position; anything else sorts after them
    canonical_index(feature).unwrap_or(usize::MAX)
}

/// Rank contributions by absolute value, descending, returning at most `k`
/// factors. Ties resolve by canonical feature position, then by name, so
/// repeated calls on identical input produce identical output.
pub fn rank_factors(map: &ContributionMap, k: usize) -> Vec<RankedFactor> {
    let mut entries: Vec<(&String, f64)> = map.iter().map(|(name, v)| (name, *v)).collect();
    entries.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| tie_break_rank(a.0).cmp(&tie_break_rank(b.0)))
            .then_with(|| a.0.cmp(b.0))
    });

    entries
        .into_iter()
        .take(k)
        .map(|(feature, contribution)| RankedFactor {
            feature: feature.clone(),
            contribution,
            direction: Direction::from_contribution(contribution),
        })
        .collect()
}

/// Top `k` factors rendered as natural-language statements.
pub fn top_factors(map: &ContributionMap, k: usize) -> Vec<String> {
    rank_factors(map, k).iter().map(|f| f.render()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(entries: &[(&str, f64)]) -> ContributionMap {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn test_orders_by_absolute_contribution() {
        let map = map_of(&[
            ("amount", 0.2),
            ("location_risk", -0.9),
            ("velocity_1h", 0.5),
        ]);

        let ranked = rank_factors(&map, 10);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].feature, "location_risk");
        assert_eq!(ranked[1].feature, "velocity_1h");
        assert_eq!(ranked[2].feature, "amount");
    }

    #[test]
    fn test_respects_k_limit() {
        let map = map_of(&[
            ("amount", 0.4),
            ("velocity_1h", 0.3),
            ("location_risk", 0.2),
            ("refund_ratio", 0.1),
        ]);

        assert_eq!(rank_factors(&map, 2).len(), 2);
        assert_eq!(top_factors(&map, 2).len(), 2);
        assert!(rank_factors(&map, 0).is_empty());
    }

    #[test]
    fn test_tie_break_uses_canonical_order() {
        // Equal absolute values: amount (index 0) sorts before
        // hour_of_day (index 1) regardless of sign
        let map = map_of(&[("hour_of_day", 0.5), ("amount", -0.5)]);

        for _ in 0..5 {
            let ranked = rank_factors(&map, 2);
            assert_eq!(ranked[0].feature, "amount");
            assert_eq!(ranked[1].feature, "hour_of_day");
        }
    }

    #[test]
    fn test_unknown_features_rank_after_canonical() {
        let map = map_of(&[("custom_signal", 0.5), ("failed_attempts", 0.5)]);
        let ranked = rank_factors(&map, 2);
        assert_eq!(ranked[0].feature, "failed_attempts");
        assert_eq!(ranked[1].feature, "custom_signal");
        assert_eq!(ranked[1].render(), "custom signal increases risk");
    }

    #[test]
    fn test_direction_rendering() {
        let map = map_of(&[("amount", 0.4), ("account_age_days", -0.6)]);
        let rendered = top_factors(&map, 2);

        assert_eq!(rendered[0], "Account age decreases risk");
        assert_eq!(rendered[1], "Transaction amount increases risk");
    }

    #[test]
    fn test_zero_contribution_decreases_by_convention() {
        let map = map_of(&[("merchant_risk", 0.0)]);
        let ranked = rank_factors(&map, 1);
        assert_eq!(ranked[0].direction, Direction::Decreases);
        assert_eq!(ranked[0].render(), "Merchant category risk decreases risk");
    }

    #[test]
    fn test_empty_map_yields_empty_ranking() {
        let map = ContributionMap::new();
        assert!(rank_factors(&map, 5).is_empty());
        assert!(top_factors(&map, 5).is_empty());
    }
}
