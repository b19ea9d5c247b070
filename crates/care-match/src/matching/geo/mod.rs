//! Spatial index over nurse presence records.
//!
//! The index keeps a whole-record snapshot per nurse, bucketed into a coarse
//! lat/lon grid. Location or availability changes replace the snapshot under
//! a write lock, so queries never observe a partially patched record.

mod distance;

pub use distance::haversine_km;
use distance::bounding_box;

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    GeoPoint, NurseId, NurseProfile, ServiceCategory, ServiceOffering, ValidationError,
};

pub const MIN_RADIUS_KM: f64 = 1.0;
pub const MAX_RADIUS_KM: f64 = 50.0;
pub const DEFAULT_RADIUS_KM: f64 = 10.0;

/// Clamp a caller-supplied radius into the supported band.
pub fn clamp_radius(radius_km: f64) -> f64 {
    if !radius_km.is_finite() {
        return DEFAULT_RADIUS_KM;
    }
    radius_km.clamp(MIN_RADIUS_KM, MAX_RADIUS_KM)
}

/// Optional constraints applied on top of the radius check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ServiceCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<u32>,
    #[serde(default)]
    pub available_now: bool,
}

/// Proximity query against the index.
#[derive(Debug, Clone)]
pub struct GeoQuery {
    pub center: GeoPoint,
    pub radius_km: f64,
    pub filters: CandidateFilters,
}

/// Matching-relevant projection of a nurse profile, replaced wholesale on
/// every location, availability, or rating change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NursePresence {
    pub nurse_id: NurseId,
    pub full_name: String,
    pub point: GeoPoint,
    pub updated_at: DateTime<Utc>,
    pub available: bool,
    pub offerings: Vec<ServiceOffering>,
    pub average_rating: f32,
    pub total_reviews: u32,
}

impl NursePresence {
    pub fn from_profile(profile: &NurseProfile) -> Self {
        Self {
            nurse_id: profile.nurse_id.clone(),
            full_name: profile.full_name.clone(),
            point: profile.location.point,
            updated_at: profile.location.updated_at,
            available: profile.available,
            offerings: profile.offerings.clone(),
            average_rating: profile.average_rating,
            total_reviews: profile.total_reviews,
        }
    }

    /// Price relevant to a query: the offering for the requested category,
    /// or the cheapest offering when no category was asked for.
    pub fn price_for(&self, category: Option<ServiceCategory>) -> Option<u32> {
        match category {
            Some(category) => self.offering_for(category).map(|offering| offering.price),
            None => self.offerings.iter().map(|offering| offering.price).min(),
        }
    }

    fn offering_for(&self, category: ServiceCategory) -> Option<&ServiceOffering> {
        self.offerings
            .iter()
            .find(|offering| offering.category == category)
    }
}

/// A presence record matched by a query, with its exact distance.
#[derive(Debug, Clone, Serialize)]
pub struct NurseCandidate {
    pub presence: NursePresence,
    pub distance_km: f64,
}

const CELL_DEGREES: f64 = 0.5;

type CellKey = (i32, i32);

fn cell_for(point: GeoPoint) -> CellKey {
    (
        (point.latitude / CELL_DEGREES).floor() as i32,
        (point.longitude / CELL_DEGREES).floor() as i32,
    )
}

#[derive(Default)]
struct GeoState {
    by_nurse: HashMap<NurseId, NursePresence>,
    cells: HashMap<CellKey, BTreeSet<NurseId>>,
}

/// Read-optimized nurse location index. Rebuildable from the nurse store, so
/// the engine keeps no state that would be lost on restart.
#[derive(Default)]
pub struct GeoIndex {
    state: RwLock<GeoState>,
}

impl GeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a nurse's presence snapshot.
    pub fn upsert(&self, presence: NursePresence) {
        let mut guard = self.state.write().expect("geo index lock poisoned");
        let state = &mut *guard;
        let cell = cell_for(presence.point);

        if let Some(previous) = state.by_nurse.get(&presence.nurse_id) {
            let previous_cell = cell_for(previous.point);
            if previous_cell != cell {
                if let Some(members) = state.cells.get_mut(&previous_cell) {
                    members.remove(&presence.nurse_id);
                    if members.is_empty() {
                        state.cells.remove(&previous_cell);
                    }
                }
            }
        }

        state
            .cells
            .entry(cell)
            .or_default()
            .insert(presence.nurse_id.clone());
        state.by_nurse.insert(presence.nurse_id.clone(), presence);
    }

    pub fn remove(&self, nurse_id: &NurseId) {
        let mut state = self.state.write().expect("geo index lock poisoned");
        if let Some(previous) = state.by_nurse.remove(nurse_id) {
            let cell = cell_for(previous.point);
            if let Some(members) = state.cells.get_mut(&cell) {
                members.remove(nurse_id);
                if members.is_empty() {
                    state.cells.remove(&cell);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .expect("geo index lock poisoned")
            .by_nurse
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All nurses passing the filters whose great-circle distance from the
    /// query center is within the (clamped) radius. An empty result is not an
    /// error; only malformed coordinates are.
    pub fn query(&self, query: &GeoQuery) -> Result<Vec<NurseCandidate>, ValidationError> {
        query.center.validate()?;
        let radius_km = clamp_radius(query.radius_km);
        let bbox = bounding_box(query.center, radius_km);

        let min_cell_lat = (bbox.min_lat / CELL_DEGREES).floor() as i32;
        let max_cell_lat = (bbox.max_lat / CELL_DEGREES).floor() as i32;
        let min_cell_lon = (bbox.min_lon / CELL_DEGREES).floor() as i32;
        let max_cell_lon = (bbox.max_lon / CELL_DEGREES).floor() as i32;

        let state = self.state.read().expect("geo index lock poisoned");
        let mut matches = Vec::new();

        for cell_lat in min_cell_lat..=max_cell_lat {
            for cell_lon in min_cell_lon..=max_cell_lon {
                let Some(members) = state.cells.get(&(cell_lat, cell_lon)) else {
                    continue;
                };
                for nurse_id in members {
                    let Some(presence) = state.by_nurse.get(nurse_id) else {
                        continue;
                    };
                    if !passes_filters(presence, &query.filters) {
                        continue;
                    }
                    let distance_km = haversine_km(query.center, presence.point);
                    if distance_km <= radius_km {
                        matches.push(NurseCandidate {
                            presence: presence.clone(),
                            distance_km,
                        });
                    }
                }
            }
        }

        matches.sort_by(|a, b| a.presence.nurse_id.cmp(&b.presence.nurse_id));
        Ok(matches)
    }
}

fn passes_filters(presence: &NursePresence, filters: &CandidateFilters) -> bool {
    if filters.available_now && !presence.available {
        return false;
    }
    if let Some(category) = filters.category {
        if presence.offering_for(category).is_none() {
            return false;
        }
    }
    if let Some(max_price) = filters.max_price {
        match presence.price_for(filters.category) {
            Some(price) if price <= max_price => {}
            _ => return false,
        }
    }
    if let Some(min_rating) = filters.min_rating {
        if presence.average_rating < min_rating {
            return false;
        }
    }
    true
}
