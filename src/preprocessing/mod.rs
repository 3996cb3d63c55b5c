//! Audio preprocessing modules
//!
//! This module contains utilities for preparing audio for analysis:
//! - Channel mixing (interleaved multi-channel to mono)
//! - Activity detection (noise-floor tracking with hysteresis)

pub mod activity;
pub mod channel_mixer;

pub use activity::{compute_activity, compute_activity_where, ActivitySignal};
pub use channel_mixer::{mix_to_mono, AudioSource, PcmBuffer};
