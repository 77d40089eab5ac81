//! Update association and arrival prediction.

pub mod engine;
pub mod predictor;

pub use engine::{MatchEngine, MatchOutcome};
pub use predictor::{predict_arrivals, Particle, ParticleId};
