//! Boundary refinement against the audio energy envelope.
//!
//! Each start/end timestamp moves to the quietest frame within a symmetric
//! search window, clamped so segments never cross their neighbours or the
//! end of the file. Refined segments then get word timing, and char timing
//! for CJK text.

use crate::audio::{EnergyEnvelope, Waveform};
use crate::config::RefineConfig;
use crate::error::Result;
use crate::pipeline::component::{Enhancer, PipelineContext};
use crate::pipeline::error::ComponentError;
use crate::segment::{EnhancedSegment, TAG_REFINE};
use crate::timing::{self, TimingScores};
use std::collections::BTreeMap;
use std::path::Path;

const EPS: f64 = 1e-6;
/// Refined segments keep at least this much duration.
const MIN_SEGMENT_SECS: f64 = 0.02;

#[derive(Debug, Default, Clone, PartialEq)]
struct RefineCounters {
    refined: usize,
    skipped: usize,
    boundaries_adjusted: usize,
    total_shift: f64,
    max_shift: f64,
}

pub struct TimestampRefiner {
    config: RefineConfig,
    counters: RefineCounters,
}

impl TimestampRefiner {
    pub fn new(config: RefineConfig) -> Self {
        Self {
            config,
            counters: RefineCounters::default(),
        }
    }

    fn window(&self) -> f64 {
        self.config.search_window_ms as f64 / 1000.0
    }

    fn scores(&self) -> TimingScores {
        TimingScores {
            word: self.config.default_word_score,
            char: self.config.default_char_score,
        }
    }

    /// Validates and loads `audio_path`, then refines.
    ///
    /// Unsafe or missing paths are rejected before any segment is touched.
    pub fn refine_file(
        &mut self,
        segments: &[EnhancedSegment],
        audio_path: &Path,
        language: Option<&str>,
    ) -> Result<Vec<EnhancedSegment>> {
        let waveform = Waveform::load(audio_path)?;
        Ok(self.refine(segments, &waveform, language))
    }

    /// Refines every valid segment against `waveform`.
    ///
    /// Malformed segments pass through untouched. The envelope is computed
    /// once for the whole list.
    pub fn refine(
        &mut self,
        segments: &[EnhancedSegment],
        waveform: &Waveform,
        language: Option<&str>,
    ) -> Vec<EnhancedSegment> {
        self.counters = RefineCounters::default();
        let envelope =
            EnergyEnvelope::compute(waveform, self.config.frame_length, self.config.hop_length);
        let duration = waveform.duration();
        let window = self.window();
        let scores = self.scores();

        let mut out = Vec::with_capacity(segments.len());
        let mut prev_end = 0.0f64;

        for (i, original) in segments.iter().enumerate() {
            if let Err(reason) = original.validate() {
                tracing::debug!(index = i, %reason, "skipping malformed segment");
                self.counters.skipped += 1;
                out.push(original.clone());
                continue;
            }

            let next_start = segments[i + 1..]
                .iter()
                .find(|s| s.is_valid())
                .map_or(duration, |s| s.start.min(duration));

            let start_lo = (original.start - window).max(prev_end).max(0.0);
            let start_hi = (original.start + window).min(original.end - MIN_SEGMENT_SECS);
            let start = self.pick_boundary(&envelope, original.start, start_lo, start_hi);

            let end_lo = (original.end - window).max(start + MIN_SEGMENT_SECS);
            let end_hi = (original.end + window).min(next_start.max(original.end.min(duration)));
            let end = self.pick_boundary(&envelope, original.end, end_lo, end_hi);

            let mut segment = original.clone();
            if end - start >= MIN_SEGMENT_SECS {
                segment.start = start;
                segment.end = end;
            }
            prev_end = prev_end.max(segment.end);

            let source = timing::populate(&mut segment, language, scores);
            segment.alignment_model = Some(source.alignment_tag().to_string());
            segment.mark_enhanced(TAG_REFINE);
            self.counters.refined += 1;
            out.push(segment);
        }

        tracing::debug!(
            refined = self.counters.refined,
            adjusted = self.counters.boundaries_adjusted,
            skipped = self.counters.skipped,
            "boundaries refined"
        );
        out
    }

    /// Quietest frame time in `[lo, hi]`, or `target` when the window is empty
    /// or the candidate would move the boundary further than the window.
    fn pick_boundary(&mut self, envelope: &EnergyEnvelope, target: f64, lo: f64, hi: f64) -> f64 {
        let window = self.window();
        let candidate = envelope
            .quietest_near(target, lo, hi)
            .map(|(time, _)| time)
            .filter(|time| (time - target).abs() <= window + EPS);

        match candidate {
            Some(time) => {
                let shift = (time - target).abs();
                if shift > EPS {
                    self.counters.boundaries_adjusted += 1;
                    self.counters.total_shift += shift;
                    self.counters.max_shift = self.counters.max_shift.max(shift);
                }
                time
            }
            None => target,
        }
    }
}

impl Enhancer for TimestampRefiner {
    fn name(&self) -> &'static str {
        "refine"
    }

    fn requires_audio(&self) -> bool {
        true
    }

    fn process(
        &mut self,
        segments: &[EnhancedSegment],
        ctx: &mut PipelineContext<'_>,
    ) -> std::result::Result<Vec<EnhancedSegment>, ComponentError> {
        let waveform = ctx.require_waveform(self.name())?;
        Ok(self.refine(segments, waveform, ctx.language()))
    }

    fn metrics(&self) -> BTreeMap<String, f64> {
        let c = &self.counters;
        let avg_shift_ms = if c.boundaries_adjusted > 0 {
            c.total_shift * 1000.0 / c.boundaries_adjusted as f64
        } else {
            0.0
        };
        BTreeMap::from([
            ("segments_refined".to_string(), c.refined as f64),
            ("segments_skipped".to_string(), c.skipped as f64),
            ("boundaries_adjusted".to_string(), c.boundaries_adjusted as f64),
            ("avg_shift_ms".to_string(), avg_shift_ms),
            ("max_shift_ms".to_string(), c.max_shift * 1000.0),
        ])
    }
}
