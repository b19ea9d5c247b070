use serde::{Deserialize, Serialize};

use super::domain::{NurseId, ServiceCategory};
use super::geo::NurseCandidate;

/// Neutral rating score applied to nurses with no reviews yet, so new nurses
/// are not ranked as if they had been rated zero.
const NEUTRAL_RATING_SCORE: f32 = 0.5;

/// Relative weights of the three scoring factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub proximity: f32,
    pub rating: f32,
    pub price: f32,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            proximity: 0.4,
            rating: 0.4,
            price: 0.2,
        }
    }
}

impl RankingWeights {
    /// Scale the weights so they sum to one; a degenerate configuration
    /// falls back to the defaults.
    pub fn normalized(self) -> Self {
        let sum = self.proximity + self.rating + self.price;
        if !sum.is_finite() || sum <= 0.0 {
            return Self::default();
        }
        Self {
            proximity: self.proximity / sum,
            rating: self.rating / sum,
            price: self.price / sum,
        }
    }
}

/// Per-factor contributions retained so rankings can be audited.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub proximity: f32,
    pub rating: f32,
    pub price: f32,
}

/// A candidate with its composite score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub nurse_id: NurseId,
    pub full_name: String,
    pub distance_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<u32>,
    pub score: f32,
    pub breakdown: ScoreBreakdown,
}

/// Finite, restartable cursor over the ranked order. The coordinator stops
/// consuming after the first acceptance; rejection advances the cursor.
#[derive(Debug, Clone, Default)]
pub struct RankedCandidates {
    ordered: Vec<ScoredCandidate>,
    cursor: usize,
}

impl RankedCandidates {
    pub fn next(&mut self) -> Option<ScoredCandidate> {
        let candidate = self.ordered.get(self.cursor).cloned();
        if candidate.is_some() {
            self.cursor += 1;
        }
        candidate
    }

    pub fn peek(&self) -> Option<&ScoredCandidate> {
        self.ordered.get(self.cursor)
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn remaining(&self) -> usize {
        self.ordered.len() - self.cursor
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn as_slice(&self) -> &[ScoredCandidate] {
        &self.ordered
    }

    pub fn nurse_ids(&self) -> Vec<NurseId> {
        self.ordered
            .iter()
            .map(|candidate| candidate.nurse_id.clone())
            .collect()
    }
}

/// Produce a total order over a geo result set.
///
/// Proximity decays linearly across the query radius, rating maps 0-5 onto
/// 0-1 (neutral for unreviewed nurses), and price is normalized against the
/// candidate set's own range. Ties break lexicographically by nurse id so
/// rankings are reproducible.
pub fn rank(
    candidates: &[NurseCandidate],
    radius_km: f64,
    category: Option<ServiceCategory>,
    weights: &RankingWeights,
) -> RankedCandidates {
    let weights = weights.normalized();

    let prices: Vec<u32> = candidates
        .iter()
        .filter_map(|candidate| candidate.presence.price_for(category))
        .collect();
    let min_price = prices.iter().copied().min();
    let max_price = prices.iter().copied().max();

    let mut ordered: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|candidate| {
            let price = candidate.presence.price_for(category);
            let breakdown = ScoreBreakdown {
                proximity: proximity_score(candidate.distance_km, radius_km),
                rating: rating_score(
                    candidate.presence.average_rating,
                    candidate.presence.total_reviews,
                ),
                price: price_score(price, min_price, max_price),
            };
            let score = weights.proximity * breakdown.proximity
                + weights.rating * breakdown.rating
                + weights.price * breakdown.price;

            ScoredCandidate {
                nurse_id: candidate.presence.nurse_id.clone(),
                full_name: candidate.presence.full_name.clone(),
                distance_km: candidate.distance_km,
                price,
                score,
                breakdown,
            }
        })
        .collect();

    ordered.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.nurse_id.cmp(&b.nurse_id))
    });

    RankedCandidates { ordered, cursor: 0 }
}

fn proximity_score(distance_km: f64, radius_km: f64) -> f32 {
    if radius_km <= 0.0 {
        return 0.0;
    }
    (1.0 - distance_km / radius_km).clamp(0.0, 1.0) as f32
}

fn rating_score(average_rating: f32, total_reviews: u32) -> f32 {
    if total_reviews == 0 {
        return NEUTRAL_RATING_SCORE;
    }
    (average_rating / 5.0).clamp(0.0, 1.0)
}

fn price_score(price: Option<u32>, min_price: Option<u32>, max_price: Option<u32>) -> f32 {
    let (Some(price), Some(min), Some(max)) = (price, min_price, max_price) else {
        return 0.0;
    };
    if max == min {
        return 1.0;
    }
    (max - price) as f32 / (max - min) as f32
}
