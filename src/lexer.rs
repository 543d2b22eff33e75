//! Tokenizer for hex vector files using logos
//!
//! Accepts the `$readmemh`-style text the testbenches consume:
//! - Hex words in either case: `7F`, `ffffff80`
//! - Line breaks (tracked for error reporting)
//! - Blanks and `//` comments, skipped

use logos::Logos;

/// Token types of a hex vector file
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"([ \t\r\f]+|//[^\n]*)")]
pub enum HexToken<'source> {
    #[regex(r"[0-9a-fA-F]+", |lex| lex.slice())]
    Word(&'source str),

    #[token("\n")]
    Newline,
}

impl std::fmt::Display for HexToken<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HexToken::Word(s) => write!(f, "{}", s),
            HexToken::Newline => write!(f, "\\n"),
        }
    }
}

/// A hex word and the 1-based line it was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexWordToken<'source> {
    pub line: usize,
    pub text: &'source str,
}

/// Stream of hex words with line tracking
pub struct HexScanner<'source> {
    inner: logos::Lexer<'source, HexToken<'source>>,
    line: usize,
}

impl<'source> HexScanner<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: HexToken::lexer(source),
            line: 1,
        }
    }

    /// Current line in the source
    pub fn line(&self) -> usize {
        self.line
    }
}

impl<'source> Iterator for HexScanner<'source> {
    /// `Err` carries the line and offending text of an unrecognised token
    type Item = Result<HexWordToken<'source>, (usize, &'source str)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(HexToken::Newline) => self.line += 1,
                Ok(HexToken::Word(text)) => {
                    return Some(Ok(HexWordToken {
                        line: self.line,
                        text,
                    }))
                }
                Err(()) => return Some(Err((self.line, self.inner.slice()))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_and_lines() {
        let source = "7F\nff\n\n00000080\n";
        let words: Vec<_> = HexScanner::new(source).filter_map(Result::ok).collect();
        assert_eq!(
            words,
            vec![
                HexWordToken { line: 1, text: "7F" },
                HexWordToken { line: 2, text: "ff" },
                HexWordToken { line: 4, text: "00000080" },
            ]
        );
    }

    #[test]
    fn test_comments_and_crlf() {
        let source = "// header\r\n0A // ten\r\n  0b\t\r\n";
        let words: Vec<_> = HexScanner::new(source)
            .filter_map(Result::ok)
            .map(|w| w.text)
            .collect();
        assert_eq!(words, vec!["0A", "0b"]);
    }

    #[test]
    fn test_invalid_token_reports_line() {
        let source = "01\n02\nzz\n";
        let errors: Vec<_> = HexScanner::new(source).filter_map(Result::err).collect();
        assert_eq!(errors[0].0, 3);
    }
}
