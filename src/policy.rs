//! Orders extracted items for surfacing by confidence, kind and age.
//!
//! Pure: the clock is an argument, nothing is read or written. Scores only
//! affect presentation order, never persistence or lifecycle.

use chrono::{DateTime, Utc};

use crate::config::RankingConfig;
use crate::extraction::model::{ExtractedItem, ItemKind};

#[derive(Debug, Clone, Default)]
pub struct ConfidencePolicy {
    config: RankingConfig,
}

impl ConfidencePolicy {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    fn variant_weight(&self, kind: ItemKind) -> f64 {
        match kind {
            ItemKind::Deadline => self.config.deadline_weight,
            ItemKind::Commitment => self.config.commitment_weight,
            ItemKind::ActionItem => self.config.action_item_weight,
        }
    }

    /// Capped linear age bonus. Future-dated items get none.
    fn age_bonus(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_days = (now - created_at).num_seconds().max(0) as f64 / 86_400.0;
        (age_days * self.config.age_weight_per_day).min(self.config.age_cap)
    }

    /// Score one item; higher surfaces first.
    pub fn rank(&self, item: &ExtractedItem, now: DateTime<Utc>) -> f64 {
        f64::from(item.confidence.weight()) * self.config.confidence_scale
            + self.variant_weight(item.kind())
            + self.age_bonus(item.created_at, now)
    }

    /// Items paired with scores, best first; ties go to the older item.
    pub fn rank_items(
        &self,
        items: Vec<ExtractedItem>,
        now: DateTime<Utc>,
    ) -> Vec<(ExtractedItem, f64)> {
        let mut scored: Vec<(ExtractedItem, f64)> = items
            .into_iter()
            .map(|item| {
                let score = self.rank(&item, now);
                (item, score)
            })
            .collect();
        scored.sort_by(|(a, sa), (b, sb)| {
            sb.total_cmp(sa).then_with(|| a.created_at.cmp(&b.created_at))
        });
        scored
    }
}
