//! Character and word timing: proportional distribution, clamping and
//! slicing.
//!
//! Char arrays map one-to-one onto the visible (non-whitespace) characters of
//! the owning segment's text. Word arrays are ordered and may come from the
//! recognizer, in which case their text is trusted as-is.

use crate::defaults;
use crate::segment::{CharTiming, EnhancedSegment, WordTiming};
use crate::text;

const EPS: f64 = 1e-6;

/// Scores used when no model-provided confidence exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingScores {
    pub word: f32,
    pub char: f32,
}

impl Default for TimingScores {
    fn default() -> Self {
        Self {
            word: defaults::DEFAULT_WORD_SCORE,
            char: defaults::DEFAULT_CHAR_SCORE,
        }
    }
}

/// Distributes `[start, end]` across the words of `text`, weighted by the
/// visible character count of each word.
pub fn proportional_words(
    text_value: &str,
    start: f64,
    end: f64,
    score: f32,
    language: Option<&str>,
) -> Vec<WordTiming> {
    let words = text::tokenize_words(text_value);
    let total: usize = words.iter().map(|w| text::visible_len(w)).sum();
    if words.is_empty() || total == 0 || end <= start {
        return Vec::new();
    }

    let duration = end - start;
    let mut consumed = 0usize;
    words
        .into_iter()
        .map(|word| {
            let w_start = start + duration * consumed as f64 / total as f64;
            consumed += text::visible_len(&word);
            let w_end = if consumed == total {
                end
            } else {
                start + duration * consumed as f64 / total as f64
            };
            WordTiming {
                word,
                start: w_start,
                end: w_end,
                score,
                language: language.map(str::to_string),
            }
        })
        .collect()
}

/// Spreads `[start, end]` evenly across the visible characters of `text`.
pub fn proportional_chars(text_value: &str, start: f64, end: f64, score: f32) -> Vec<CharTiming> {
    let chars: Vec<char> = text_value.chars().filter(|c| !c.is_whitespace()).collect();
    even_chars(&chars, start, end, score)
}

fn even_chars(chars: &[char], start: f64, end: f64, score: f32) -> Vec<CharTiming> {
    if chars.is_empty() || end < start {
        return Vec::new();
    }
    let step = (end - start) / chars.len() as f64;
    chars
        .iter()
        .enumerate()
        .map(|(i, &ch)| CharTiming {
            ch,
            start: start + step * i as f64,
            end: if i + 1 == chars.len() {
                end
            } else {
                start + step * (i + 1) as f64
            },
            score,
        })
        .collect()
}

/// Subdivides each word span evenly across its characters.
///
/// Returns `None` when the words do not cover exactly the visible characters
/// of `text`, since the resulting chars could not be mapped back onto it.
pub fn chars_from_words(
    text_value: &str,
    words: &[WordTiming],
    default_score: f32,
) -> Option<Vec<CharTiming>> {
    let expected = text::visible_len(text_value);
    if expected == 0 || !words_cover_text(text_value, words) {
        return None;
    }

    let mut chars = Vec::with_capacity(expected);
    for word in words {
        let word_chars: Vec<char> = word.word.chars().filter(|c| !c.is_whitespace()).collect();
        let score = if word.score > 0.0 {
            word.score
        } else {
            default_score
        };
        chars.extend(even_chars(&word_chars, word.start, word.end, score));
    }
    Some(chars)
}

/// Clamps word timings into `[start, end]` and removes overlaps between
/// neighbours, preserving order.
pub fn clamp_words(words: &mut [WordTiming], start: f64, end: f64) {
    let mut floor = start;
    for word in words.iter_mut() {
        word.start = word.start.clamp(floor, end);
        word.end = word.end.clamp(word.start, end);
        floor = word.end;
    }
}

/// Clamps char timings into `[start, end]` and removes overlaps.
pub fn clamp_chars(chars: &mut [CharTiming], start: f64, end: f64) {
    let mut floor = start;
    for ch in chars.iter_mut() {
        ch.start = ch.start.clamp(floor, end);
        ch.end = ch.end.clamp(ch.start, end);
        floor = ch.end;
    }
}

/// Which strategy produced a segment's timing arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingSource {
    /// Words came from the recognizer.
    ModelProvided,
    /// Everything was derived by proportional distribution.
    Proportional,
}

impl TimingSource {
    pub fn alignment_tag(self) -> &'static str {
        match self {
            TimingSource::ModelProvided => defaults::ALIGNMENT_MODEL_PROVIDED,
            TimingSource::Proportional => defaults::ALIGNMENT_PROPORTIONAL,
        }
    }
}

/// Fills in `words`, and `chars` for CJK text, from the segment's current bounds.
///
/// Recognizer-supplied words are kept and only clamped to the bounds.
/// Existing chars are kept when they still match the text.
pub fn populate(
    segment: &mut EnhancedSegment,
    language: Option<&str>,
    scores: TimingScores,
) -> TimingSource {
    let source = match segment.words.as_mut() {
        Some(words) if !words.is_empty() => {
            clamp_words(words, segment.start, segment.end);
            TimingSource::ModelProvided
        }
        _ => {
            segment.words = Some(proportional_words(
                &segment.text,
                segment.start,
                segment.end,
                scores.word,
                language,
            ));
            TimingSource::Proportional
        }
    };

    if text::is_cjk_context(language, &segment.text) {
        let chars_match = segment
            .chars
            .as_ref()
            .is_some_and(|c| c.len() == segment.char_count());
        if chars_match {
            if let Some(chars) = segment.chars.as_mut() {
                clamp_chars(chars, segment.start, segment.end);
            }
        } else {
            let words = segment.words.as_deref().unwrap_or_default();
            let derived = chars_from_words(&segment.text, words, scores.char).map(|mut chars| {
                // Proportional words carry the word default, not a real score.
                if source == TimingSource::Proportional {
                    chars.iter_mut().for_each(|c| c.score = scores.char);
                }
                chars
            });
            let chars = derived.unwrap_or_else(|| {
                proportional_chars(&segment.text, segment.start, segment.end, scores.char)
            });
            segment.chars = Some(chars);
        }
    }

    source
}

/// Timing arrays of the two halves of a split.
#[derive(Debug, Default)]
pub struct SplitTiming {
    pub left_chars: Option<Vec<CharTiming>>,
    pub right_chars: Option<Vec<CharTiming>>,
    pub left_words: Option<Vec<WordTiming>>,
    pub right_words: Option<Vec<WordTiming>>,
}

/// Slices a segment's timing arrays before visible character `visible_index`,
/// with the halves meeting at `split_time`.
///
/// Chars are sliced by index. Words that cover the segment text exactly are
/// sliced by visible characters too: a word straddling the cut is divided,
/// the left piece ending and the right piece starting at `split_time`.
/// Words that do not match the text are assigned by time instead.
pub fn split(segment: &EnhancedSegment, visible_index: usize, split_time: f64) -> SplitTiming {
    let (left_chars, right_chars) = match segment.chars.as_deref() {
        Some(chars) => {
            let at = visible_index.min(chars.len());
            (Some(chars[..at].to_vec()), Some(chars[at..].to_vec()))
        }
        None => (None, None),
    };

    let (left_words, right_words) = match segment.words.as_deref() {
        Some(words) => {
            let (mut left, mut right) = if words_cover_text(&segment.text, words) {
                split_words_at_index(words, visible_index, split_time)
            } else {
                split_words_at_time(words, split_time)
            };
            clamp_words(&mut left, segment.start, split_time);
            clamp_words(&mut right, split_time, segment.end);
            (Some(left), Some(right))
        }
        None => (None, None),
    };

    SplitTiming {
        left_chars,
        right_chars,
        left_words,
        right_words,
    }
}

fn visible_chars<'a>(values: impl Iterator<Item = &'a str>) -> impl Iterator<Item = char> {
    values.flat_map(str::chars).filter(|c| !c.is_whitespace())
}

/// Whether the words spell out exactly the visible characters of `text_value`.
pub fn words_cover_text(text_value: &str, words: &[WordTiming]) -> bool {
    visible_chars(std::iter::once(text_value))
        .eq(visible_chars(words.iter().map(|w| w.word.as_str())))
}

fn split_words_at_index(
    words: &[WordTiming],
    visible_index: usize,
    split_time: f64,
) -> (Vec<WordTiming>, Vec<WordTiming>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut consumed = 0usize;
    for word in words {
        let len = text::visible_len(&word.word);
        if consumed + len <= visible_index {
            left.push(word.clone());
        } else if consumed >= visible_index {
            right.push(word.clone());
        } else {
            let at = text::char_index_of_visible(&word.word, visible_index - consumed);
            let (head, tail) = text::split_at_char(&word.word, at);
            let cut = split_time.max(word.start).min(word.end);
            left.push(WordTiming {
                word: head,
                end: cut,
                ..word.clone()
            });
            right.push(WordTiming {
                word: tail,
                start: cut,
                ..word.clone()
            });
        }
        consumed += len;
    }
    (left, right)
}

/// A word goes left only if it ends at or before the split.
fn split_words_at_time(words: &[WordTiming], split_time: f64) -> (Vec<WordTiming>, Vec<WordTiming>) {
    let boundary = words
        .iter()
        .position(|w| w.end > split_time + EPS)
        .unwrap_or(words.len());
    (words[..boundary].to_vec(), words[boundary..].to_vec())
}

/// Time at which the visible character `visible_index` begins.
///
/// Uses char timings when present, otherwise distributes the segment duration
/// proportionally over the visible characters.
pub fn time_at_visible_index(segment: &EnhancedSegment, visible_index: usize) -> f64 {
    if let Some(chars) = segment.chars.as_ref().filter(|c| !c.is_empty()) {
        if visible_index == 0 {
            return segment.start;
        }
        if visible_index >= chars.len() {
            return segment.end;
        }
        let left = chars[visible_index - 1].end;
        let right = chars[visible_index].start;
        return ((left + right) / 2.0).clamp(segment.start, segment.end);
    }
    let total = segment.char_count();
    if total == 0 {
        return segment.start;
    }
    segment.start + segment.duration() * visible_index.min(total) as f64 / total as f64
}

/// Inverse of [`time_at_visible_index`]: the visible character index nearest `time`.
pub fn visible_index_at_time(segment: &EnhancedSegment, time: f64) -> usize {
    if let Some(chars) = segment.chars.as_ref().filter(|c| !c.is_empty()) {
        return chars
            .iter()
            .position(|c| (c.start + c.end) / 2.0 >= time)
            .unwrap_or(chars.len());
    }
    let total = segment.char_count();
    if segment.duration() <= 0.0 {
        return 0;
    }
    let ratio = ((time - segment.start) / segment.duration()).clamp(0.0, 1.0);
    (ratio * total as f64).round() as usize
}
