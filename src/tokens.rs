//! Flat markdown-it style token stream, the lowering target.
//!
//! Paired tokens carry `nesting` +1/-1 and self-closing ones 0. Inline
//! content lives in the `children` of an `"inline"` token that follows each
//! `paragraph_open`/`heading_open`/`th_open`/`td_open`.

/// Extra token data that has no dedicated field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenMeta {
    /// Footnote label (`footnote_open`, `footnote_ref`).
    pub label: Option<String>,
    /// Role or directive name (`myst_role`, `directive`).
    pub name: Option<String>,
    /// Directive implementation id, used by the serializer's special cases.
    pub module: Option<String>,
    /// Directive options in source order; `None` values are flags.
    pub options: Vec<(String, Option<String>)>,
    /// Front-matter key path (`front_matter_entry`).
    pub key_path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub ttype: &'static str,
    pub tag: &'static str,
    /// +1 opening, -1 closing, 0 self-closing.
    pub nesting: i8,
    pub content: String,
    pub markup: String,
    pub info: String,
    pub attrs: Vec<(String, String)>,
    pub meta: TokenMeta,
    /// Hidden tokens render nothing themselves (tight-list paragraphs).
    pub hidden: bool,
    /// `"inline"` and container tokens (`directive`, front matter) carry
    /// children; everything else leaves this `None`.
    pub children: Option<Vec<Token>>,
}

impl Token {
    pub fn new(ttype: &'static str, tag: &'static str, nesting: i8) -> Self {
        Self {
            ttype,
            tag,
            nesting,
            content: String::new(),
            markup: String::new(),
            info: String::new(),
            attrs: Vec::new(),
            meta: TokenMeta::default(),
            hidden: false,
            children: None,
        }
    }

    pub fn with_content(ttype: &'static str, tag: &'static str, content: impl Into<String>) -> Self {
        let mut token = Self::new(ttype, tag, 0);
        token.content = content.into();
        token
    }

    /// An empty `"inline"` container token.
    pub fn inline() -> Self {
        let mut token = Self::new("inline", "", 0);
        token.children = Some(Vec::new());
        token
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.attrs.push((name.to_string(), value.into()));
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Sum of nesting over a stream (0 for a balanced one). Checks children too.
pub fn nesting_balance(tokens: &[Token]) -> i32 {
    tokens
        .iter()
        .map(|t| {
            i32::from(t.nesting)
                + t.children
                    .as_deref()
                    .map(nesting_balance)
                    .unwrap_or(0)
        })
        .sum()
}

/// Whether every inline-capturing open token is followed by exactly one
/// `"inline"` token before its matching close.
pub fn inline_capture_holds(tokens: &[Token]) -> bool {
    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        let captures = matches!(
            token.ttype,
            "paragraph_open" | "heading_open" | "th_open" | "td_open" | "dt_open"
        );
        if captures && iter.peek().is_none_or(|next| next.ttype != "inline") {
            return false;
        }
        if !captures && token.ttype == "inline" {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_of_paired_stream_is_zero() {
        let tokens = vec![
            Token::new("paragraph_open", "p", 1),
            Token::inline(),
            Token::new("paragraph_close", "p", -1),
        ];
        assert_eq!(nesting_balance(&tokens), 0);
        assert!(inline_capture_holds(&tokens));
    }

    #[test]
    fn unbalanced_stream_detected() {
        let tokens = vec![Token::new("blockquote_open", "blockquote", 1)];
        assert_eq!(nesting_balance(&tokens), 1);
    }

    #[test]
    fn missing_inline_detected() {
        let tokens = vec![
            Token::new("paragraph_open", "p", 1),
            Token::new("paragraph_close", "p", -1),
        ];
        assert!(!inline_capture_holds(&tokens));
    }

    #[test]
    fn stray_inline_detected() {
        let tokens = vec![Token::inline()];
        assert!(!inline_capture_holds(&tokens));
    }
}
