//! Readability splitting and merging.
//!
//! Long segments are split recursively, preferring punctuation nearest the
//! middle, then an upstream pause hint, then a forced cut at the character
//! limit. A single greedy pass then merges runs of very short neighbours.
//! Char and word timing is sliced or concatenated alongside the text so
//! children always reconstruct their parent.

use crate::config::SplitConfig;
use crate::pipeline::component::{Enhancer, PipelineContext};
use crate::pipeline::error::ComponentError;
use crate::segment::{EnhancedSegment, TAG_SPLIT};
use crate::text::{self, BreakStrength};
use crate::timing::{self, TimingScores};
use std::collections::BTreeMap;

const EPS: f64 = 1e-6;

#[derive(Debug, Default, Clone, PartialEq)]
struct SplitCounters {
    segments_before: usize,
    segments_after: usize,
    splits: usize,
    merges: usize,
    skipped: usize,
    unsplittable: usize,
}

/// Why a split point was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitReason {
    Punctuation,
    PauseHint,
    Forced,
}

pub struct SegmentSplitter {
    config: SplitConfig,
    scores: TimingScores,
    counters: SplitCounters,
}

impl SegmentSplitter {
    pub fn new(config: SplitConfig) -> Self {
        Self {
            config,
            scores: TimingScores::default(),
            counters: SplitCounters::default(),
        }
    }

    /// Scores given to char timings generated for CJK segments that lack them.
    pub fn with_scores(mut self, scores: TimingScores) -> Self {
        self.scores = scores;
        self
    }

    /// Splits over-long segments, then merges short neighbours.
    ///
    /// `pause_hints` are candidate split times (seconds) used when a segment
    /// has no usable punctuation.
    pub fn split_and_merge(
        &mut self,
        segments: &[EnhancedSegment],
        pause_hints: &[f64],
        language: Option<&str>,
    ) -> Vec<EnhancedSegment> {
        self.counters = SplitCounters {
            segments_before: segments.len(),
            ..Default::default()
        };

        let mut split = Vec::with_capacity(segments.len());
        for segment in segments {
            if !segment.is_valid() {
                self.counters.skipped += 1;
                split.push(segment.clone());
                continue;
            }
            let mut segment = segment.clone();
            self.ensure_cjk_chars(&mut segment, language);
            self.split_recursive(segment, pause_hints, language, &mut split);
        }

        let out = if self.config.merge_enabled {
            self.merge_pass(split, language)
        } else {
            split
        };
        self.counters.segments_after = out.len();

        tracing::debug!(
            before = self.counters.segments_before,
            after = self.counters.segments_after,
            splits = self.counters.splits,
            merges = self.counters.merges,
            "segments split and merged"
        );
        out
    }

    fn needs_split(&self, segment: &EnhancedSegment) -> bool {
        segment.duration() > self.config.max_duration + EPS
            || segment.char_count() > self.config.max_chars
    }

    /// CJK segments always carry chars once they leave the splitter.
    fn ensure_cjk_chars(&self, segment: &mut EnhancedSegment, language: Option<&str>) {
        if segment.chars.is_some() || !text::is_cjk_context(language, &segment.text) {
            return;
        }
        let from_words = segment
            .words
            .as_deref()
            .and_then(|words| timing::chars_from_words(&segment.text, words, self.scores.char));
        segment.chars = Some(from_words.unwrap_or_else(|| {
            timing::proportional_chars(&segment.text, segment.start, segment.end, self.scores.char)
        }));
    }

    fn split_recursive(
        &mut self,
        segment: EnhancedSegment,
        pause_hints: &[f64],
        language: Option<&str>,
        out: &mut Vec<EnhancedSegment>,
    ) {
        if !self.needs_split(&segment) {
            out.push(segment);
            return;
        }

        let candidates = self.split_candidates(&segment, pause_hints, language);
        let chosen = candidates
            .into_iter()
            .find_map(|(k, reason)| split_segment(&segment, k).map(|halves| (halves, reason)));

        match chosen {
            Some(((left, right), reason)) => {
                tracing::trace!(?reason, at = left.end, "segment split");
                self.counters.splits += 1;
                self.split_recursive(left, pause_hints, language, out);
                self.split_recursive(right, pause_hints, language, out);
            }
            None => {
                self.counters.unsplittable += 1;
                out.push(segment);
            }
        }
    }

    /// Visible-character indices to split before, best first.
    ///
    /// Punctuation marks nearest the middle come first, then the pause hint
    /// nearest the middle, then a forced cut at the length limit.
    fn split_candidates(
        &self,
        segment: &EnhancedSegment,
        pause_hints: &[f64],
        language: Option<&str>,
    ) -> Vec<(usize, SplitReason)> {
        let visible: Vec<char> = segment.text.chars().filter(|c| !c.is_whitespace()).collect();
        let n = visible.len();
        if n < 2 {
            return Vec::new();
        }
        let cjk = text::is_cjk_context(language, &segment.text);

        let mut candidates: Vec<(usize, SplitReason)> = punctuation_candidates(&visible)
            .into_iter()
            .map(|k| (k, SplitReason::Punctuation))
            .collect();

        let middle = (segment.start + segment.end) / 2.0;
        let hint = pause_hints
            .iter()
            .copied()
            .filter(|&t| t > segment.start + EPS && t < segment.end - EPS)
            .min_by(|a, b| (a - middle).abs().total_cmp(&(b - middle).abs()));
        if let Some(k) = hint
            .map(|t| timing::visible_index_at_time(segment, t))
            .and_then(|k| if cjk { Some(k) } else { nearest_word_start(&segment.text, k) })
            .filter(|&k| k > 0 && k < n)
        {
            candidates.push((k, SplitReason::PauseHint));
        }

        let estimated = n as f64 * self.config.seconds_per_char;
        if n > self.config.max_chars || estimated > self.config.max_duration + EPS {
            let by_duration = (self.config.max_duration / self.config.seconds_per_char) as usize;
            let limit = self.config.max_chars.min(by_duration).clamp(1, n - 1);
            let k = if cjk {
                limit
            } else {
                word_boundary_before(&segment.text, limit).unwrap_or(limit)
            };
            candidates.push((k, SplitReason::Forced));
        }

        candidates
    }

    fn merge_pass(
        &mut self,
        segments: Vec<EnhancedSegment>,
        language: Option<&str>,
    ) -> Vec<EnhancedSegment> {
        let mut merged: Vec<EnhancedSegment> = Vec::with_capacity(segments.len());
        for segment in segments {
            if let Some(last) = merged.last_mut()
                && self.can_merge(last, &segment)
            {
                merge_into(last, segment, language, self.scores);
                self.counters.merges += 1;
                continue;
            }
            merged.push(segment);
        }
        merged
    }

    fn can_merge(&self, left: &EnhancedSegment, right: &EnhancedSegment) -> bool {
        if !left.is_valid() || !right.is_valid() || left.speaker != right.speaker {
            return false;
        }
        let gap = right.start - left.end;
        if gap < -EPS || gap > self.config.merge_gap + EPS {
            return false;
        }
        let merged_duration = right.end - left.start;
        let merged_chars = left.char_count() + right.char_count();
        let has_short_side = left.duration() < self.config.min_duration
            || right.duration() < self.config.min_duration;
        has_short_side
            && merged_duration < self.config.max_duration
            && merged_chars < self.config.max_chars
    }
}

/// Split indices after each punctuation mark, nearest the middle first.
///
/// Ties go to the stronger break. Marks at the very end never qualify since
/// both halves must be non-empty.
fn punctuation_candidates(visible: &[char]) -> Vec<usize> {
    let n = visible.len();
    let middle = n as f64 / 2.0;
    let mut marks: Vec<(usize, BreakStrength)> = visible
        .iter()
        .enumerate()
        .filter_map(|(i, &ch)| text::break_strength(ch).map(|s| (i + 1, s)))
        .filter(|&(k, _)| k < n && !visible[k..].iter().all(|&c| text::is_punct(c)))
        .collect();
    marks.sort_by(|a, b| {
        let da = (a.0 as f64 - middle).abs();
        let db = (b.0 as f64 - middle).abs();
        da.total_cmp(&db).then_with(|| b.1.cmp(&a.1))
    });
    marks.into_iter().map(|(k, _)| k).collect()
}

/// Visible index of the last word start at or before `limit`, for Latin text.
fn word_boundary_before(text_value: &str, limit: usize) -> Option<usize> {
    text::word_starts(text_value)
        .into_iter()
        .take_while(|&k| k <= limit)
        .last()
}

/// Word start nearest to visible index `target`, for Latin text.
fn nearest_word_start(text_value: &str, target: usize) -> Option<usize> {
    text::word_starts(text_value)
        .into_iter()
        .min_by_key(|&k| k.abs_diff(target))
}

/// Splits before visible character `visible_index`.
///
/// Returns `None` if the split time would produce an empty half.
fn split_segment(
    segment: &EnhancedSegment,
    visible_index: usize,
) -> Option<(EnhancedSegment, EnhancedSegment)> {
    let split_time = timing::time_at_visible_index(segment, visible_index);
    if split_time <= segment.start + EPS || split_time >= segment.end - EPS {
        return None;
    }

    let (left_text, right_text) = text::split_at_char(
        &segment.text,
        text::char_index_of_visible(&segment.text, visible_index),
    );
    if left_text.is_empty() || right_text.is_empty() {
        return None;
    }

    let parts = timing::split(segment, visible_index, split_time);

    let mut left = segment.clone();
    left.end = split_time;
    left.text = left_text;
    left.chars = parts.left_chars;
    left.words = parts.left_words;
    left.mark_enhanced(TAG_SPLIT);

    let mut right = segment.clone();
    right.start = split_time;
    right.text = right_text;
    right.chars = parts.right_chars;
    right.words = parts.right_words;
    right.mark_enhanced(TAG_SPLIT);

    Some((left, right))
}

fn weighted(a: Option<f32>, b: Option<f32>, wa: usize, wb: usize) -> Option<f32> {
    match (a, b) {
        (Some(a), Some(b)) if wa + wb > 0 => {
            Some((a * wa as f32 + b * wb as f32) / (wa + wb) as f32)
        }
        (Some(a), Some(_)) => Some(a),
        (a, b) => a.or(b),
    }
}

/// Appends `right` onto `left`.
///
/// When only one side carries a timing array, the other side's array is
/// generated proportionally so the union still covers the merged text.
fn merge_into(
    left: &mut EnhancedSegment,
    right: EnhancedSegment,
    language: Option<&str>,
    scores: TimingScores,
) {
    let (wl, wr) = (left.char_count(), right.char_count());

    let chars = match (left.chars.take(), right.chars.as_deref()) {
        (None, None) => None,
        (l, r) => {
            let mut l = l.unwrap_or_else(|| {
                timing::proportional_chars(&left.text, left.start, left.end, scores.char)
            });
            let r = r.map(<[_]>::to_vec).unwrap_or_else(|| {
                timing::proportional_chars(&right.text, right.start, right.end, scores.char)
            });
            l.extend(r);
            Some(l)
        }
    };

    let words = match (left.words.take(), right.words.as_deref()) {
        (None, None) => None,
        (l, r) => {
            let mut l = l.unwrap_or_else(|| {
                timing::proportional_words(&left.text, left.start, left.end, scores.word, language)
            });
            let r = r.map(<[_]>::to_vec).unwrap_or_else(|| {
                timing::proportional_words(&right.text, right.start, right.end, scores.word, language)
            });
            l.extend(r);
            Some(l)
        }
    };

    left.text = text::join_texts(&left.text, &right.text);
    left.end = right.end;
    left.chars = chars;
    left.words = words;
    left.confidence = weighted(left.confidence, right.confidence, wl, wr);
    left.avg_logprob = weighted(left.avg_logprob, right.avg_logprob, wl, wr);
    left.no_speech_prob = weighted(left.no_speech_prob, right.no_speech_prob, wl, wr);
    if left.alignment_model.is_none() {
        left.alignment_model = right.alignment_model;
    }
    for tag in &right.enhancements_applied {
        left.mark_enhanced(tag);
    }
    left.mark_enhanced(TAG_SPLIT);
}

impl Enhancer for SegmentSplitter {
    fn name(&self) -> &'static str {
        "split"
    }

    fn requires_audio(&self) -> bool {
        false
    }

    fn process(
        &mut self,
        segments: &[EnhancedSegment],
        ctx: &mut PipelineContext<'_>,
    ) -> Result<Vec<EnhancedSegment>, ComponentError> {
        Ok(self.split_and_merge(segments, &ctx.pause_hints, ctx.language()))
    }

    fn metrics(&self) -> BTreeMap<String, f64> {
        let c = &self.counters;
        BTreeMap::from([
            ("segments_before".to_string(), c.segments_before as f64),
            ("segments_after".to_string(), c.segments_after as f64),
            ("split_count".to_string(), c.splits as f64),
            ("merge_count".to_string(), c.merges as f64),
            ("segments_skipped".to_string(), c.skipped as f64),
            ("unsplittable".to_string(), c.unsplittable as f64),
        ])
    }
}
