//! Threshold fan-out matching of updates against live tracks.
//!
//! One [`MatchEngine::process_update`] call takes an observation through the
//! whole association pipeline: candidate scan, per-match Kalman fusion, path
//! advancement, particle emission, best-match long-term linking, and finally
//! archival of the consumed update. All persistent effects go through the
//! [`TrackStore`]; a store failure aborts the update so it stays pending and
//! the retry is idempotent.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::EngineContext;
use crate::domain::{
    feature, DeviceId, FeatureVector, LongTermId, LongTermState, ShortTermId, ShortTermState,
    Update,
};
use crate::error::{FeatureError, TrackError, TrackResult};
use crate::graph::{PathGraph, TrackKey};
use crate::store::TrackStore;

use super::predictor::{predict_arrivals, Particle, ParticleId};

/// What one update did to the track pool.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Short-term states the update was fused into.
    pub matched: Vec<ShortTermId>,
    /// State created when nothing matched.
    pub created: Option<ShortTermId>,
    /// Long-term links set or refreshed during this update.
    pub linked: Vec<(ShortTermId, LongTermId)>,
    /// Particles emitted.
    pub particles: usize,
    /// Candidates dropped for degenerate distances.
    pub skipped_candidates: usize,
}

/// The association engine. Stateless apart from its borrowed context and
/// store, so one instance can serve a whole drain loop.
pub struct MatchEngine<'a, S: TrackStore> {
    ctx: &'a EngineContext,
    store: &'a S,
}

impl<'a, S: TrackStore> MatchEngine<'a, S> {
    pub fn new(ctx: &'a EngineContext, store: &'a S) -> Self {
        Self { ctx, store }
    }

    /// Run the full association pipeline for one update.
    ///
    /// Candidates whose distance comes out degenerate (`NaN` or exactly
    /// zero) are skipped with a warning; the scan continues over the rest.
    /// A dimension mismatch on the update itself is unrecoverable and
    /// returned as an error without touching any state.
    pub fn process_update(
        &self,
        update: &Update,
        now: DateTime<Utc>,
    ) -> TrackResult<MatchOutcome> {
        let dim = self.ctx.config.feature_dim;
        if update.features.len() != dim {
            return Err(TrackError::Feature(FeatureError::DimensionMismatch {
                expected: dim,
                actual: update.features.len(),
            }));
        }

        let period = self.store.period()?;
        let threshold = self.ctx.config.matching_threshold;
        let mut outcome = MatchOutcome::default();

        // Candidate scan: every live track strictly below threshold matches.
        let mut matches: Vec<(ShortTermState, f64)> = Vec::new();
        for candidate in self.store.short_term_states()? {
            match feature::distance(&update.features, &candidate.mean) {
                Ok(d) if d < threshold => matches.push((candidate, d)),
                Ok(_) => {}
                Err(e) => {
                    warn!(candidate = %candidate.id, error = %e, "skipping candidate");
                    outcome.skipped_candidates += 1;
                }
            }
        }

        if matches.is_empty() {
            let state = self.create_track(update, period, &mut outcome)?;
            self.store.resolve_update(update.id, state.id, period)?;
            return Ok(outcome);
        }

        // Archive against the closest match once every fusion has landed.
        let best = matches
            .iter()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(s, _)| s.id)
            .expect("candidate scan produced at least one match");

        for (mut state, d) in matches {
            // A state that already carries this update id was fused and
            // written before a later store call failed; the retry must not
            // apply the observation again.
            if state.last_update == Some(update.id) {
                debug!(state = %state.id, "update already applied, skipping re-fusion");
                outcome.matched.push(state.id);
                continue;
            }

            match feature::fuse(&state.mean, &state.covariance, &update.features, &update.covariance)
            {
                Ok((mean, covariance)) => {
                    state.mean = mean;
                    state.covariance = covariance;
                }
                Err(e) => {
                    warn!(state = %state.id, error = %e, "fusion failed, skipping match");
                    outcome.skipped_candidates += 1;
                    continue;
                }
            }

            let path = self.advance_path(&state, update.device, period)?;
            state.update_count += 1;
            state.last_device = update.device;
            state.last_update = Some(update.id);

            self.emit_particle(&state, &path, update.device, d, now)?;
            outcome.particles += 1;

            if let Some(lts) = self.best_long_term_match(&state.mean)? {
                if state.long_term_key != Some(lts) {
                    outcome.linked.push((state.id, lts));
                }
                state.long_term_key = Some(lts);
            }

            self.store.update_short_term(&state)?;
            debug!(state = %state.id, distance = d, "update fused into track");
            outcome.matched.push(state.id);
        }

        self.store.resolve_update(update.id, best, period)?;
        Ok(outcome)
    }

    /// Drain the pending queue in arrival order. Updates with degenerate
    /// features are dropped from the queue; store failures leave the update
    /// pending and stop the drain.
    pub fn drain_pending(&self, now: DateTime<Utc>) -> TrackResult<Vec<MatchOutcome>> {
        let mut outcomes = Vec::new();
        for update in self.store.pending_updates()? {
            match self.process_update(&update, now) {
                Ok(outcome) => outcomes.push(outcome),
                Err(TrackError::Feature(e)) => {
                    warn!(update = %update.id, error = %e, "dropping malformed update");
                    self.store.delete_update(update.id)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcomes)
    }

    fn create_track(
        &self,
        update: &Update,
        period: u8,
        outcome: &mut MatchOutcome,
    ) -> TrackResult<ShortTermState> {
        // Long-term states already claimed by a live track stay out of the
        // candidate pool when seeding.
        let claimed: Vec<LongTermId> = self
            .store
            .short_term_states()?
            .iter()
            .filter_map(|s| s.long_term_key)
            .collect();
        let link = self.best_long_term_match_excluding(&update.features, &claimed)?;

        let seed = ShortTermState {
            id: ShortTermId(0),
            mean: update.features.clone(),
            covariance: update.covariance.clone(),
            update_count: 1,
            last_device: update.device,
            last_update: Some(update.id),
            long_term_key: link,
        };
        let state = self.store.create_short_term(seed)?;
        if let Some(lts) = link {
            outcome.linked.push((state.id, lts));
        }

        let mut path = PathGraph::new(
            TrackKey::Short(state.id),
            period,
            self.ctx.graph.node_count(),
        );
        path.start(update.device)?;
        self.store.put_path(path)?;

        debug!(state = %state.id, device = %update.device, "new track created");
        outcome.created = Some(state.id);
        Ok(state)
    }

    /// Load or create the track's path for `period` and record the hop to
    /// `device`.
    fn advance_path(
        &self,
        state: &ShortTermState,
        device: DeviceId,
        period: u8,
    ) -> TrackResult<PathGraph> {
        let key = TrackKey::Short(state.id);
        let mut path = match self.store.path(key, period)? {
            Some(p) => p,
            None => PathGraph::new(key, period, self.ctx.graph.node_count()),
        };
        if path.is_empty() {
            path.start(device)?;
        } else if state.last_device != device {
            path.advance(state.last_device, device)?;
        }
        self.store.put_path(path.clone())?;
        Ok(path)
    }

    fn emit_particle(
        &self,
        state: &ShortTermState,
        day_path: &PathGraph,
        device: DeviceId,
        distance: f64,
        now: DateTime<Utc>,
    ) -> TrackResult<()> {
        // Predict along the linked identity's history for this period when
        // one exists; a fresh track only has its own day path.
        let reference = match state.long_term_key {
            Some(lts) => self
                .store
                .path(TrackKey::Long(lts), day_path.period)?
                .unwrap_or_else(|| day_path.clone()),
            None => day_path.clone(),
        };
        let weight = 1.0 - distance / self.ctx.config.matching_threshold;
        let arrivals = predict_arrivals(
            &reference,
            &self.ctx.graph,
            device,
            now,
            self.ctx.config.traversal_speed,
        );
        self.store.create_particle(Particle {
            id: ParticleId::new(),
            origin: device,
            short_term: state.id,
            weight,
            arrivals,
        })?;
        Ok(())
    }

    fn best_long_term_match(&self, mean: &FeatureVector) -> TrackResult<Option<LongTermId>> {
        self.best_long_term_match_excluding(mean, &[])
    }

    /// Nearest long-term state under threshold, best-match rule. Degenerate
    /// distances skip the candidate.
    fn best_long_term_match_excluding(
        &self,
        mean: &FeatureVector,
        excluded: &[LongTermId],
    ) -> TrackResult<Option<LongTermId>> {
        let threshold = self.ctx.config.matching_threshold;
        let mut best: Option<(LongTermId, f64)> = None;
        for lts in self.store.long_term_states()? {
            if excluded.contains(&lts.id) {
                continue;
            }
            match feature::distance(mean, &lts.mean) {
                Ok(d) if d < threshold => {
                    if best.map_or(true, |(_, bd)| d < bd) {
                        best = Some((lts.id, d));
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(candidate = %lts.id, error = %e, "skipping long-term candidate");
                }
            }
        }
        Ok(best.map(|(id, _)| id))
    }
}

/// Convenience used by callers that want a linked state looked up or an
/// explicit dangling-reference error.
pub fn require_long_term<S: TrackStore>(
    store: &S,
    id: LongTermId,
) -> TrackResult<LongTermState> {
    store
        .long_term(id)?
        .ok_or(TrackError::DanglingReference {
            kind: "long-term state",
            id: id.value(),
        })
}
