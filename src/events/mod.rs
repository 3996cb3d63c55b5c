//! Event extraction
//!
//! - Adaptive peak picking (1D signal → event stream)
//! - Beat-candidate detection (onset + flux salience)

pub mod beat_candidates;
pub mod peak_picking;

pub use beat_candidates::{detect_beat_candidates, BeatCandidate, BeatCandidateResult, CandidateSource};
pub use peak_picking::{pick_peaks, Event, EventStream};
