//! Tokenizer for the scene text format.
//!
//! The grammar needs five token kinds: identifiers, numbers (optionally
//! signed, optional fraction and exponent), quoted strings with `\"` and
//! `\\` escapes, the single-character tokens `{` `}` `;`, and the reserved
//! word `null` for unset reference fields. The same tokenizer parses scene
//! files and the hot-reload snapshot buffer.

use super::error::SceneError;

/// One lexical token. Identifier and number tokens borrow from the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    Ident(&'a str),
    Number(&'a str),
    Str(String),
    LBrace,
    RBrace,
    Semi,
    Null,
}

impl Token<'_> {
    /// Short description used in parse error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("identifier '{s}'"),
            Token::Number(s) => format!("number '{s}'"),
            Token::Str(_) => "string".to_string(),
            Token::LBrace => "'{'".to_string(),
            Token::RBrace => "'}'".to_string(),
            Token::Semi => "';'".to_string(),
            Token::Null => "'null'".to_string(),
        }
    }
}

/// Streaming tokenizer with single-token lookahead and line tracking.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    peeked: Option<Option<Token<'a>>>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            peeked: None,
        }
    }

    /// Line number of the most recently scanned position, for diagnostics.
    pub fn line(&self) -> u32 {
        self.line
    }

    fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    fn skip_whitespace(&mut self) {
        let bytes = self.bytes();
        while let Some(&b) = bytes.get(self.pos) {
            match b {
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' => self.pos += 1,
                _ => break,
            }
        }
    }

    /// Returns the next token without consuming it.
    pub fn peek(&mut self) -> Result<Option<&Token<'a>>, SceneError> {
        if self.peeked.is_none() {
            let tok = self.scan()?;
            self.peeked = Some(tok);
        }
        Ok(self.peeked.as_ref().unwrap().as_ref())
    }

    /// Returns and consumes the next token, or `None` at end of input.
    pub fn next(&mut self) -> Result<Option<Token<'a>>, SceneError> {
        if let Some(tok) = self.peeked.take() {
            return Ok(tok);
        }
        self.scan()
    }

    fn scan(&mut self) -> Result<Option<Token<'a>>, SceneError> {
        self.skip_whitespace();
        let bytes = self.bytes();
        let Some(&b) = bytes.get(self.pos) else {
            return Ok(None);
        };

        match b {
            b'{' => {
                self.pos += 1;
                Ok(Some(Token::LBrace))
            }
            b'}' => {
                self.pos += 1;
                Ok(Some(Token::RBrace))
            }
            b';' => {
                self.pos += 1;
                Ok(Some(Token::Semi))
            }
            b'"' => self.scan_string().map(Some),
            b'-' | b'+' | b'0'..=b'9' => self.scan_number().map(Some),
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => Ok(Some(self.scan_ident())),
            _ => Err(SceneError::parse(
                self.line,
                format!("unexpected character '{}'", b as char),
            )),
        }
    }

    fn scan_ident(&mut self) -> Token<'a> {
        let start = self.pos;
        let bytes = self.bytes();
        while let Some(&b) = bytes.get(self.pos) {
            if b == b'_' || b.is_ascii_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        if text == "null" {
            Token::Null
        } else {
            Token::Ident(text)
        }
    }

    fn scan_number(&mut self) -> Result<Token<'a>, SceneError> {
        let start = self.pos;
        let bytes = self.bytes();
        if matches!(bytes.get(self.pos), Some(b'-' | b'+')) {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while matches!(bytes.get(self.pos), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            return Err(SceneError::parse(self.line, "sign with no digits"));
        }
        if matches!(bytes.get(self.pos), Some(b'.')) {
            self.pos += 1;
            while matches!(bytes.get(self.pos), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        // Exponent part: float printing can emit it for very small/large values.
        if matches!(bytes.get(self.pos), Some(b'e' | b'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(bytes.get(self.pos), Some(b'-' | b'+')) {
                self.pos += 1;
            }
            let exp_start = self.pos;
            while matches!(bytes.get(self.pos), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
            if self.pos == exp_start {
                // Not an exponent after all; leave the 'e' for the next token.
                self.pos = mark;
            }
        }
        Ok(Token::Number(&self.src[start..self.pos]))
    }

    fn scan_string(&mut self) -> Result<Token<'a>, SceneError> {
        let bytes = self.bytes();
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            match bytes.get(self.pos) {
                None => return Err(SceneError::parse(self.line, "unterminated string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(Token::Str(out));
                }
                Some(b'\\') => match bytes.get(self.pos + 1) {
                    Some(b'"') => {
                        out.push('"');
                        self.pos += 2;
                    }
                    Some(b'\\') => {
                        out.push('\\');
                        self.pos += 2;
                    }
                    other => {
                        return Err(SceneError::parse(
                            self.line,
                            format!(
                                "invalid escape '\\{}'",
                                other.map(|&b| b as char).unwrap_or(' ')
                            ),
                        ))
                    }
                },
                Some(b'\n') => return Err(SceneError::parse(self.line, "unterminated string")),
                Some(_) => {
                    // Strings are UTF-8; copy whole code points.
                    let rest = &self.src[self.pos..];
                    let ch = rest.chars().next().unwrap();
                    out.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(src: &str) -> Vec<Token<'_>> {
        let mut lex = Lexer::new(src);
        let mut out = Vec::new();
        while let Some(tok) = lex.next().unwrap() {
            out.push(tok);
        }
        out
    }

    #[test]
    fn punctuation_and_idents() {
        assert_eq!(
            all_tokens("entity { speed 1; }"),
            vec![
                Token::Ident("entity"),
                Token::LBrace,
                Token::Ident("speed"),
                Token::Number("1"),
                Token::Semi,
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            all_tokens("1 -2.5 +0.125 3. 1e-7 2.5E3"),
            vec![
                Token::Number("1"),
                Token::Number("-2.5"),
                Token::Number("+0.125"),
                Token::Number("3."),
                Token::Number("1e-7"),
                Token::Number("2.5E3"),
            ]
        );
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(
            all_tokens(r#""plain" "with \"quotes\"" "back\\slash""#),
            vec![
                Token::Str("plain".into()),
                Token::Str("with \"quotes\"".into()),
                Token::Str("back\\slash".into()),
            ]
        );
    }

    #[test]
    fn null_is_reserved() {
        assert_eq!(
            all_tokens("null nullable"),
            vec![Token::Null, Token::Ident("nullable")]
        );
    }

    #[test]
    fn line_tracking() {
        let mut lex = Lexer::new("a\nb\n\nc");
        lex.next().unwrap();
        assert_eq!(lex.line(), 1);
        lex.next().unwrap();
        assert_eq!(lex.line(), 2);
        lex.next().unwrap();
        assert_eq!(lex.line(), 4);
    }

    #[test]
    fn unterminated_string_errors() {
        let mut lex = Lexer::new("\"oops");
        assert!(matches!(lex.next(), Err(SceneError::Parse { .. })));
    }

    #[test]
    fn stray_character_errors() {
        let mut lex = Lexer::new("@");
        assert!(matches!(lex.next(), Err(SceneError::Parse { .. })));
    }

    #[test]
    fn peek_does_not_consume() {
        let mut lex = Lexer::new("abc");
        assert_eq!(lex.peek().unwrap(), Some(&Token::Ident("abc")));
        assert_eq!(lex.next().unwrap(), Some(Token::Ident("abc")));
        assert_eq!(lex.next().unwrap(), None);
    }
}
