//! Punctuation context rules for inline markup recognition.
//!
//! Inline start-strings are only recognized after whitespace, an opening
//! punctuation character or a delimiter; end-strings only before whitespace,
//! punctuation that can close, or a delimiter. A start-string enclosed in a
//! matching punctuation pair ("quoted") is not markup at all.

/// Opening/closing pairs, including typographic quote variants that are
/// accepted as matching each other.
const PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\'', '\''),
    ('(', ')'),
    ('<', '>'),
    ('[', ']'),
    ('{', '}'),
    ('\'', '\u{2019}'),
    ('\u{2018}', '\u{2019}'),
    ('\u{2018}', '\u{201a}'),
    ('\u{201a}', '\u{2018}'),
    ('\u{201a}', '\u{2019}'),
    ('\u{201c}', '\u{201d}'),
    ('\u{201c}', '\u{201e}'),
    ('\u{201e}', '\u{201c}'),
    ('\u{201e}', '\u{201d}'),
    ('\u{2039}', '\u{203a}'),
    ('\u{00ab}', '\u{00bb}'),
    ('\u{00bb}', '\u{00ab}'),
    ('\u{00a1}', '!'),
    ('\u{00bf}', '?'),
    ('\u{300c}', '\u{300d}'),
    ('\u{300e}', '\u{300f}'),
    ('\u{ff08}', '\u{ff09}'),
    ('\u{3008}', '\u{3009}'),
    ('\u{300a}', '\u{300b}'),
    ('\u{3010}', '\u{3011}'),
    ('\u{3014}', '\u{3015}'),
    ('\u{3016}', '\u{3017}'),
];

const DELIMITERS: &[char] = &[
    '-', '/', ':', '\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}',
    '\u{2015}', '\u{2212}', '\u{301c}', '\u{3030}',
];

const CLOSING_DELIMITERS: &[char] = &['\\', '.', ',', ';', '!', '?'];

pub fn is_opener(c: char) -> bool {
    PAIRS.iter().any(|&(open, _)| open == c)
}

pub fn is_closer(c: char) -> bool {
    PAIRS.iter().any(|&(_, close)| close == c)
}

pub fn is_delimiter(c: char) -> bool {
    DELIMITERS.contains(&c)
}

pub fn is_closing_delimiter(c: char) -> bool {
    CLOSING_DELIMITERS.contains(&c)
}

/// Whether a start-string may begin given the preceding character.
pub fn valid_start_context(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(c) => c.is_whitespace() || is_opener(c) || is_delimiter(c),
    }
}

/// Whether an end-string may finish given the following character.
/// `\x00` marks an escaped character, which also terminates markup.
pub fn valid_end_context(next: Option<char>) -> bool {
    match next {
        None => true,
        Some(c) => {
            c.is_whitespace()
                || c == '\0'
                || is_closing_delimiter(c)
                || is_delimiter(c)
                || is_closer(c)
        }
    }
}

/// Whether `prev`/`post` form a matching punctuation pair around a
/// start-string, making it "quoted" rather than markup.
pub fn match_chars(prev: char, post: char) -> bool {
    PAIRS.iter().any(|&(open, close)| open == prev && close == post)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_context() {
        assert!(valid_start_context(None));
        assert!(valid_start_context(Some(' ')));
        assert!(valid_start_context(Some('(')));
        assert!(valid_start_context(Some('-')));
        assert!(!valid_start_context(Some('a')));
        assert!(!valid_start_context(Some(')')));
    }

    #[test]
    fn end_context() {
        assert!(valid_end_context(None));
        assert!(valid_end_context(Some('.')));
        assert!(valid_end_context(Some(')')));
        assert!(valid_end_context(Some('\0')));
        assert!(!valid_end_context(Some('a')));
    }

    #[test]
    fn quoting_pairs() {
        assert!(match_chars('(', ')'));
        assert!(match_chars('"', '"'));
        assert!(match_chars('\u{2018}', '\u{2019}'));
        assert!(!match_chars('(', ']'));
    }
}
