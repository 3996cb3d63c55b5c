//! Frequency band model
//!
//! A band is a piecewise-linear frequency region over time. Each [`FrequencySegment`]
//! interpolates its `[low, high]` bounds linearly between its start and end times.
//! Keyframes are segment boundaries: keyframe `i < n` is the start of segment `i`, keyframe
//! `n` is the end of the last segment.
//!
//! Edits are pure: every editing method returns a new, validated band and leaves `self`
//! untouched.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Slack for time comparisons, in seconds
const TIME_EPSILON: f32 = 1e-6;

/// When a band applies
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeScope {
    /// Whole timeline; bounds are held constant outside the segments
    #[default]
    Global,
    /// Only within `[start_time, end_time)`
    Sectioned {
        /// Section start in seconds
        start_time: f32,
        /// Section end in seconds (exclusive)
        end_time: f32,
    },
}

/// Where a band came from
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BandProvenance {
    /// Drawn by a user
    #[default]
    User,
    /// Suggested by an automatic method
    Proposal {
        /// Name of the proposing method
        method: String,
    },
    /// Loaded from elsewhere
    Imported,
}

/// One linear piece of a band's frequency shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencySegment {
    /// Segment start in seconds
    pub start_time: f32,
    /// Segment end in seconds
    pub end_time: f32,
    /// Lower bound at `start_time`, Hz
    pub low_hz_start: f32,
    /// Upper bound at `start_time`, Hz
    pub high_hz_start: f32,
    /// Lower bound at `end_time`, Hz
    pub low_hz_end: f32,
    /// Upper bound at `end_time`, Hz
    pub high_hz_end: f32,
}

impl FrequencySegment {
    /// Segment with the same bounds at both ends
    pub fn constant(start_time: f32, end_time: f32, low_hz: f32, high_hz: f32) -> Self {
        Self {
            start_time,
            end_time,
            low_hz_start: low_hz,
            high_hz_start: high_hz,
            low_hz_end: low_hz,
            high_hz_end: high_hz,
        }
    }

    /// Bounds at the start
    pub fn start_bounds(&self) -> (f32, f32) {
        (self.low_hz_start, self.high_hz_start)
    }

    /// Bounds at the end
    pub fn end_bounds(&self) -> (f32, f32) {
        (self.low_hz_end, self.high_hz_end)
    }

    /// Linearly interpolated bounds at `time` (clamped to the segment)
    pub fn bounds_at(&self, time: f32) -> (f32, f32) {
        let span = self.end_time - self.start_time;
        let u = if span > 0.0 {
            ((time - self.start_time) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (
            self.low_hz_start + u * (self.low_hz_end - self.low_hz_start),
            self.high_hz_start + u * (self.high_hz_end - self.high_hz_start),
        )
    }

    fn contains(&self, time: f32) -> bool {
        time >= self.start_time && time < self.end_time
    }
}

/// A frequency band over time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    /// Stable identifier
    pub id: String,
    /// Display label
    pub label: String,
    /// Identifier of the audio source the band was drawn on
    #[serde(default)]
    pub source_id: String,
    /// Disabled bands mask everything out
    pub enabled: bool,
    /// When the band applies
    #[serde(default)]
    pub time_scope: TimeScope,
    /// Segments sorted by start time, non-overlapping
    pub frequency_shape: Vec<FrequencySegment>,
    /// Display order
    #[serde(default)]
    pub sort_order: i32,
    /// Origin of the band
    #[serde(default)]
    pub provenance: BandProvenance,
}

fn invalid(msg: impl Into<String>) -> AnalysisError {
    AnalysisError::InvalidInput(msg.into())
}

fn check_bounds(low: f32, high: f32) -> Result<(), AnalysisError> {
    if !low.is_finite() || !high.is_finite() {
        return Err(invalid("Band bounds must be finite"));
    }
    if low < 0.0 {
        return Err(invalid(format!("Band lower bound must be >= 0, got {}", low)));
    }
    if low >= high {
        return Err(invalid(format!(
            "Band lower bound ({}) must be below upper bound ({})",
            low, high
        )));
    }
    Ok(())
}

impl FrequencyBand {
    /// Global band with constant bounds over `[0, duration]`
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` for invalid bounds or a non-positive duration.
    pub fn new_constant(
        id: impl Into<String>,
        label: impl Into<String>,
        low_hz: f32,
        high_hz: f32,
        duration: f32,
    ) -> Result<Self, AnalysisError> {
        let band = Self {
            id: id.into(),
            label: label.into(),
            source_id: String::new(),
            enabled: true,
            time_scope: TimeScope::Global,
            frequency_shape: vec![FrequencySegment::constant(0.0, duration, low_hz, high_hz)],
            sort_order: 0,
            provenance: BandProvenance::User,
        };
        band.validate()?;
        Ok(band)
    }

    /// Band with constant bounds that only applies within `[start_time, end_time)`
    pub fn new_sectioned(
        id: impl Into<String>,
        label: impl Into<String>,
        low_hz: f32,
        high_hz: f32,
        start_time: f32,
        end_time: f32,
    ) -> Result<Self, AnalysisError> {
        let band = Self {
            id: id.into(),
            label: label.into(),
            source_id: String::new(),
            enabled: true,
            time_scope: TimeScope::Sectioned {
                start_time,
                end_time,
            },
            frequency_shape: vec![FrequencySegment::constant(
                start_time, end_time, low_hz, high_hz,
            )],
            sort_order: 0,
            provenance: BandProvenance::User,
        };
        band.validate()?;
        Ok(band)
    }

    /// Number of keyframes (segments + 1)
    pub fn num_keyframes(&self) -> usize {
        self.frequency_shape.len() + 1
    }

    /// Check segment ordering, bounds and section coverage
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` describing the first violation found.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.frequency_shape.is_empty() {
            return Err(invalid(format!("Band '{}' has no segments", self.id)));
        }

        for (i, seg) in self.frequency_shape.iter().enumerate() {
            if !seg.start_time.is_finite() || !seg.end_time.is_finite() {
                return Err(invalid(format!("Segment {} has non-finite times", i)));
            }
            if seg.start_time >= seg.end_time {
                return Err(invalid(format!(
                    "Segment {} must have start < end (got {}..{})",
                    i, seg.start_time, seg.end_time
                )));
            }
            check_bounds(seg.low_hz_start, seg.high_hz_start)?;
            check_bounds(seg.low_hz_end, seg.high_hz_end)?;
        }

        for (i, pair) in self.frequency_shape.windows(2).enumerate() {
            if pair[1].start_time < pair[0].end_time - TIME_EPSILON {
                return Err(invalid(format!(
                    "Segments {} and {} overlap or are out of order",
                    i,
                    i + 1
                )));
            }
        }

        if let TimeScope::Sectioned {
            start_time,
            end_time,
        } = self.time_scope
        {
            if !start_time.is_finite() || !end_time.is_finite() || start_time >= end_time {
                return Err(invalid(format!(
                    "Section must have start < end (got {}..{})",
                    start_time, end_time
                )));
            }
            let first = &self.frequency_shape[0];
            let last = &self.frequency_shape[self.frequency_shape.len() - 1];
            if first.start_time > start_time + TIME_EPSILON
                || last.end_time < end_time - TIME_EPSILON
            {
                return Err(invalid("Sectioned band segments must cover the whole section"));
            }
            for pair in self.frequency_shape.windows(2) {
                if pair[1].start_time > pair[0].end_time + TIME_EPSILON {
                    return Err(invalid("Sectioned band segments must not leave gaps"));
                }
            }
        }

        Ok(())
    }

    /// Band bounds `(low_hz, high_hz)` at `time`
    ///
    /// Returns `None` outside a sectioned band's section. A global band holds its first
    /// bounds before the first segment, its last bounds after the last one, and the previous
    /// segment's end bounds inside gaps.
    pub fn bounds_at(&self, time: f32) -> Option<(f32, f32)> {
        if let TimeScope::Sectioned {
            start_time,
            end_time,
        } = self.time_scope
        {
            if time < start_time || time >= end_time {
                return None;
            }
        }

        let first = self.frequency_shape.first()?;
        if time < first.start_time {
            return Some(first.start_bounds());
        }

        let mut held = first.start_bounds();
        for seg in &self.frequency_shape {
            if seg.contains(time) {
                return Some(seg.bounds_at(time));
            }
            if time >= seg.end_time {
                held = seg.end_bounds();
            } else {
                break;
            }
        }
        Some(held)
    }

    fn edited(&self, shape: Vec<FrequencySegment>) -> Result<FrequencyBand, AnalysisError> {
        let band = FrequencyBand {
            frequency_shape: shape,
            ..self.clone()
        };
        band.validate()?;
        Ok(band)
    }

    /// Split the segment containing `time` into two at `time`
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` if `time` is not strictly inside a segment.
    pub fn split_at(&self, time: f32) -> Result<FrequencyBand, AnalysisError> {
        let idx = self
            .frequency_shape
            .iter()
            .position(|s| time > s.start_time + TIME_EPSILON && time < s.end_time - TIME_EPSILON)
            .ok_or_else(|| invalid(format!("No segment strictly contains t={}", time)))?;

        let seg = self.frequency_shape[idx];
        let (low, high) = seg.bounds_at(time);
        let left = FrequencySegment {
            end_time: time,
            low_hz_end: low,
            high_hz_end: high,
            ..seg
        };
        let right = FrequencySegment {
            start_time: time,
            low_hz_start: low,
            high_hz_start: high,
            ..seg
        };

        let mut shape = self.frequency_shape.clone();
        shape.splice(idx..=idx, [left, right]);
        self.edited(shape)
    }

    /// Merge segments `first..=last` into one spanning their union
    ///
    /// The merged segment keeps the start bounds of `first` and the end bounds of `last`.
    pub fn merge_segments(&self, first: usize, last: usize) -> Result<FrequencyBand, AnalysisError> {
        let n = self.frequency_shape.len();
        if first > last || last >= n {
            return Err(invalid(format!(
                "Cannot merge segments {}..={} of {}",
                first, last, n
            )));
        }
        if first == last {
            return Ok(self.clone());
        }

        let a = self.frequency_shape[first];
        let b = self.frequency_shape[last];
        let merged = FrequencySegment {
            start_time: a.start_time,
            end_time: b.end_time,
            low_hz_start: a.low_hz_start,
            high_hz_start: a.high_hz_start,
            low_hz_end: b.low_hz_end,
            high_hz_end: b.high_hz_end,
        };

        let mut shape = self.frequency_shape.clone();
        shape.splice(first..=last, [merged]);
        self.edited(shape)
    }

    /// Move keyframe `index` to `time`
    ///
    /// Interior keyframes move the shared boundary of two segments and must stay strictly
    /// between their neighbours. The outer keyframes can only move on a global band.
    pub fn move_keyframe(&self, index: usize, time: f32) -> Result<FrequencyBand, AnalysisError> {
        let n = self.frequency_shape.len();
        if index > n {
            return Err(invalid(format!("Keyframe {} out of range (0..={})", index, n)));
        }
        if !time.is_finite() {
            return Err(invalid("Keyframe time must be finite"));
        }
        let is_edge = index == 0 || index == n;
        if is_edge && self.time_scope != TimeScope::Global {
            return Err(invalid("Outer keyframes of a sectioned band are fixed to the section"));
        }

        let mut shape = self.frequency_shape.clone();
        if index > 0 {
            let prev = &mut shape[index - 1];
            if time <= prev.start_time {
                return Err(invalid(format!(
                    "Keyframe {} cannot move to {} (before its segment start {})",
                    index, time, prev.start_time
                )));
            }
            prev.end_time = time;
        }
        if index < n {
            let next = &mut shape[index];
            if time >= next.end_time {
                return Err(invalid(format!(
                    "Keyframe {} cannot move to {} (after its segment end {})",
                    index, time, next.end_time
                )));
            }
            next.start_time = time;
        }
        self.edited(shape)
    }

    /// Set the bounds held at keyframe `index`
    pub fn set_keyframe_bounds(
        &self,
        index: usize,
        low_hz: f32,
        high_hz: f32,
    ) -> Result<FrequencyBand, AnalysisError> {
        let n = self.frequency_shape.len();
        if index > n {
            return Err(invalid(format!("Keyframe {} out of range (0..={})", index, n)));
        }
        check_bounds(low_hz, high_hz)?;

        let mut shape = self.frequency_shape.clone();
        if index > 0 {
            shape[index - 1].low_hz_end = low_hz;
            shape[index - 1].high_hz_end = high_hz;
        }
        if index < n {
            shape[index].low_hz_start = low_hz;
            shape[index].high_hz_start = high_hz;
        }
        self.edited(shape)
    }

    /// Remove interior keyframe `index`, merging the two segments around it
    pub fn remove_keyframe(&self, index: usize) -> Result<FrequencyBand, AnalysisError> {
        let n = self.frequency_shape.len();
        if index == 0 || index >= n {
            return Err(invalid(format!(
                "Only interior keyframes (1..{}) can be removed, got {}",
                n, index
            )));
        }
        self.merge_segments(index - 1, index)
    }
}
