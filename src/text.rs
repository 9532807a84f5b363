//! Script detection, punctuation classes and tokenization.

/// Returns true for CJK ideographs, kana and hangul syllables.
pub fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x4E00..=0x9FFF       // CJK Unified Ideographs
        | 0x3400..=0x4DBF     // Extension A
        | 0x20000..=0x2A6DF   // Extension B
        | 0xF900..=0xFAFF     // Compatibility Ideographs
        | 0x3040..=0x30FF     // Hiragana + Katakana
        | 0xAC00..=0xD7AF     // Hangul syllables
    )
}

/// Returns true for CJK and fullwidth punctuation.
pub fn is_cjk_punct(ch: char) -> bool {
    matches!(ch as u32, 0x3000..=0x303F | 0xFF00..=0xFF0F | 0xFF1A..=0xFF20 | 0xFF3B..=0xFF40 | 0xFF5B..=0xFF65)
}

/// Any punctuation character, Latin or CJK.
pub fn is_punct(ch: char) -> bool {
    ch.is_ascii_punctuation() || is_cjk_punct(ch) || matches!(ch, '…' | '—' | '“' | '”' | '‘' | '’')
}

/// How good a split point the punctuation mark makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BreakStrength {
    /// Comma, semicolon, colon.
    Clause,
    /// Full stop, exclamation, question mark.
    Sentence,
}

/// Classifies a character as a split-worthy punctuation mark.
pub fn break_strength(ch: char) -> Option<BreakStrength> {
    match ch {
        '。' | '！' | '？' | '.' | '!' | '?' | '…' => Some(BreakStrength::Sentence),
        '，' | '；' | '：' | '、' | ',' | ';' | ':' => Some(BreakStrength::Clause),
        _ => None,
    }
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// True when the language code names a CJK language, or when the language is
/// unknown/"auto" and the text itself contains CJK characters.
pub fn is_cjk_context(language: Option<&str>, text: &str) -> bool {
    match language.map(|l| l.to_ascii_lowercase()) {
        Some(lang) if lang != crate::defaults::AUTO_LANGUAGE && !lang.is_empty() => {
            ["zh", "ja", "ko", "yue", "cmn"]
                .iter()
                .any(|prefix| lang.starts_with(prefix))
                || contains_cjk(text)
        }
        _ => contains_cjk(text),
    }
}

/// Number of non-whitespace characters.
pub fn visible_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Character index of the `visible_index`-th non-whitespace character, or the
/// text length when there are fewer.
pub fn char_index_of_visible(text: &str, visible_index: usize) -> usize {
    text.chars()
        .enumerate()
        .filter(|(_, c)| !c.is_whitespace())
        .nth(visible_index)
        .map_or(text.chars().count(), |(i, _)| i)
}

/// Visible indices at which a whitespace-separated word begins, excluding 0.
pub fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut visible = 0usize;
    let mut prev_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            prev_space = true;
            continue;
        }
        if prev_space && visible > 0 {
            starts.push(visible);
        }
        prev_space = false;
        visible += 1;
    }
    starts
}

/// Splits `text` at a character index, trimming whitespace at the seam.
pub fn split_at_char(text: &str, char_index: usize) -> (String, String) {
    let byte_index = text
        .char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let (left, right) = text.split_at(byte_index);
    (left.trim_end().to_string(), right.trim_start().to_string())
}

/// Tokenizes text into words.
///
/// Latin text splits on whitespace. Tokens containing CJK characters are
/// further broken after every punctuation mark, so a Chinese sentence yields
/// one token per clause. Punctuation stays attached to the preceding token.
pub fn tokenize_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    for token in text.split_whitespace() {
        if !contains_cjk(token) {
            words.push(token.to_string());
            continue;
        }
        let mut current = String::new();
        for ch in token.chars() {
            current.push(ch);
            if is_punct(ch) {
                words.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            words.push(current);
        }
    }
    words
}

/// Joins two segment texts, inserting a space only between non-CJK text.
pub fn join_texts(left: &str, right: &str) -> String {
    let left = left.trim_end();
    let right = right.trim_start();
    if left.is_empty() {
        return right.to_string();
    }
    if right.is_empty() {
        return left.to_string();
    }
    let left_tail = left.chars().next_back().is_some_and(|c| is_cjk(c) || is_cjk_punct(c));
    let right_head = right.chars().next().is_some_and(|c| is_cjk(c) || is_cjk_punct(c));
    if left_tail || right_head {
        format!("{left}{right}")
    } else {
        format!("{left} {right}")
    }
}

/// Lowercases, removes punctuation and collapses whitespace.
pub fn normalize_for_scoring(text: &str) -> String {
    text.chars()
        .map(|c| if is_punct(c) { ' ' } else { c })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
