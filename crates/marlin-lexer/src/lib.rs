//! Lexical analysis for Marlin source text.
//!
//! The scanner is cursor-based rather than table-driven: several of the
//! language's lexical rules need lookahead that regular tokenizers cannot
//! express, such as `0w` falling back to the two tokens `0` `w` when no
//! digit follows, or an unterminated comment being reported as incomplete
//! input instead of a plain error so an interactive host can ask for more.

use smol_str::SmolStr;
use std::iter::Peekable;
use std::str::Chars;

/// Source span as byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Span of a generated node with no source position.
    pub const SYNTHETIC: Span = Span {
        start: u32::MAX,
        end: u32::MAX,
    };

    pub fn is_synthetic(self) -> bool {
        self.start == u32::MAX
    }

    pub fn merge(self, other: Span) -> Span {
        if self.is_synthetic() {
            return other;
        }
        if other.is_synthetic() {
            return self;
        }
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Smallest and largest representable integer (31-bit core).
pub const MININT: i64 = -1_073_741_824;
pub const MAXINT: i64 = 1_073_741_823;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    /// Malformed token; retrying with more input cannot help.
    Malformed,
    /// Input ended inside a string, character, or comment; the host may
    /// append more input and lex again.
    Incomplete,
}

#[derive(Debug, Clone)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.span.start, self.span.end, self.message)
    }
}

impl std::error::Error for LexError {}

#[derive(Debug, Clone, Default)]
pub struct LexerOptions {
    /// Accept non-ASCII content in string and character literals, and
    /// `\uHHHH` escapes above `0xFF`.
    pub allow_unicode: bool,
    /// Accept alphabetic non-ASCII characters in type variable names.
    pub allow_unicode_type_variables: bool,
    /// Accept `_` digit separators inside numeric literals.
    pub allow_successor_ml: bool,
}

/// A lexical token. Every variant that came from literal text keeps that
/// text so diagnostics can echo the source spelling.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Reserved word, alphabetic (`val`, `fn`, ...) or symbolic
    /// (`(`, `|`, `=>`, `...`, ...).
    Keyword(SmolStr),
    /// Nonnegative plain decimal constant; also usable as a record label
    /// when it has no leading zero.
    Numeric { text: SmolStr, value: i64 },
    Int { text: SmolStr, value: i64 },
    Real { text: SmolStr, value: f64 },
    Word { text: SmolStr, value: i64 },
    Char { text: SmolStr, value: char },
    Str { text: SmolStr, value: String },
    AlphaId(SmolStr),
    SymbolicId(SmolStr),
    TyVar(SmolStr),
    EqTyVar(SmolStr),
    /// `*` on its own; a symbolic identifier everywhere except in type
    /// expressions and record labels, where it is special.
    Star,
    /// `=`; reserved, but also the polymorphic equality operator.
    Equals,
    LongId {
        qualifiers: Vec<SmolStr>,
        name: SmolStr,
        symbolic: bool,
    },
}

impl Token {
    /// Identifier text usable in value position, if any.
    pub fn identifier_text(&self) -> Option<&str> {
        match self {
            Token::AlphaId(s) | Token::SymbolicId(s) => Some(s.as_str()),
            Token::Star => Some("*"),
            Token::Equals => Some("="),
            _ => None,
        }
    }

    pub fn is_keyword(&self, text: &str) -> bool {
        matches!(self, Token::Keyword(k) if k.as_str() == text)
    }
}

const ALPHA_KEYWORDS: &[&str] = &[
    "abstype", "and", "andalso", "as", "case", "datatype", "do", "else", "end",
    "exception", "fn", "fun", "handle", "if", "in", "infix", "infixr", "let",
    "local", "nonfix", "of", "op", "open", "orelse", "raise", "rec", "then",
    "type", "val", "while", "with", "withtype", "_",
];

const SYMBOLIC_KEYWORDS: &[&str] = &[":", "|", "=>", "->", "#", ":>"];

fn is_alpha_keyword(text: &str) -> bool {
    ALPHA_KEYWORDS.contains(&text)
}

fn is_symbolic_char(c: char) -> bool {
    matches!(
        c,
        '!' | '%' | '&' | '$' | '#' | '+' | '-' | '/' | ':' | '<' | '=' | '>'
            | '?' | '@' | '\\' | '~' | '`' | '^' | '|' | '*'
    )
}

fn is_alnum_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '\'' || c == '_'
}

fn is_ws_char(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0c' | '\r')
}

/// Lex `source` into a token sequence, failing on the first lexical error.
pub fn lex(source: &str, options: &LexerOptions) -> Result<Vec<(Token, Span)>, LexError> {
    let mut lexer = Lexer::new(source, options);
    let mut tokens = Vec::new();
    while let Some(item) = lexer.next_token()? {
        tokens.push(item);
    }
    Ok(tokens)
}

struct Lexer<'src> {
    src: &'src str,
    iter: Peekable<Chars<'src>>,
    cursor: u32,
    start: u32,
    options: &'src LexerOptions,
}

impl<'src> Lexer<'src> {
    fn new(src: &'src str, options: &'src LexerOptions) -> Self {
        Self {
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            start: 0,
            options,
        }
    }

    // ── Cursor helpers ───────────────────────────────────────────

    fn peek(&mut self) -> Option<char> {
        self.iter.peek().copied()
    }

    fn peek2(&self) -> Option<char> {
        let rest = &self.src[self.cursor as usize..];
        let mut chars = rest.chars();
        chars.next();
        chars.next()
    }

    fn peek3(&self) -> Option<char> {
        let rest = &self.src[self.cursor as usize..];
        let mut chars = rest.chars();
        chars.next();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.iter.next()?;
        self.cursor += c.len_utf8() as u32;
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn span(&self) -> Span {
        Span::new(self.start, self.cursor)
    }

    fn text(&self) -> &str {
        &self.src[self.start as usize..self.cursor as usize]
    }

    fn malformed<T>(&self, message: impl Into<String>) -> Result<T, LexError> {
        Err(LexError {
            kind: LexErrorKind::Malformed,
            message: message.into(),
            span: self.span(),
        })
    }

    fn incomplete<T>(&self, message: impl Into<String>) -> Result<T, LexError> {
        Err(LexError {
            kind: LexErrorKind::Incomplete,
            message: message.into(),
            span: self.span(),
        })
    }

    // ── Top-level scan ───────────────────────────────────────────

    fn next_token(&mut self) -> Result<Option<(Token, Span)>, LexError> {
        loop {
            self.start = self.cursor;
            let c = match self.peek() {
                Some(c) => c,
                None => return Ok(None),
            };
            if is_ws_char(c) {
                self.advance();
                continue;
            }
            if c == '(' && self.peek2() == Some('*') {
                self.skip_comment()?;
                continue;
            }
            let token = self.scan_token(c)?;
            return Ok(Some((token, self.span())));
        }
    }

    fn scan_token(&mut self, c: char) -> Result<Token, LexError> {
        match c {
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | ';' => {
                self.advance();
                Ok(Token::Keyword(SmolStr::new(self.text())))
            }
            '.' => self.scan_dots(),
            '"' => {
                self.advance();
                let value = self.scan_string_body()?;
                Ok(Token::Str {
                    text: SmolStr::new(self.text()),
                    value,
                })
            }
            '\'' => self.scan_type_variable(),
            '~' if self.peek2().is_some_and(|d| d.is_ascii_digit()) => {
                self.advance();
                self.scan_number(true)
            }
            '#' if self.peek2() == Some('"') => {
                self.advance();
                self.advance();
                let value = self.scan_string_body()?;
                let mut chars = value.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => Ok(Token::Char {
                        text: SmolStr::new(self.text()),
                        value: ch,
                    }),
                    _ => self.malformed(
                        "character constant must contain exactly one character",
                    ),
                }
            }
            '#' if self.peek2() == Some('[') => {
                self.advance();
                self.advance();
                Ok(Token::Keyword(SmolStr::new("#[")))
            }
            c if c.is_ascii_digit() => self.scan_number(false),
            c if is_symbolic_char(c) => self.scan_symbolic(),
            c if is_alnum_char(c) => self.scan_alphanumeric(),
            _ => {
                self.advance();
                self.malformed(format!("invalid character `{}`", c))
            }
        }
    }

    fn scan_dots(&mut self) -> Result<Token, LexError> {
        self.advance();
        if self.eat('.') && self.eat('.') {
            Ok(Token::Keyword(SmolStr::new("...")))
        } else {
            self.malformed("expected `...`")
        }
    }

    // ── Comments ─────────────────────────────────────────────────

    /// Skips a `(* ... *)` comment. Comments nest.
    fn skip_comment(&mut self) -> Result<(), LexError> {
        self.advance();
        self.advance();
        let mut depth = 1usize;
        loop {
            match self.advance() {
                Some('(') if self.peek() == Some('*') => {
                    self.advance();
                    depth += 1;
                }
                Some('*') if self.peek() == Some(')') => {
                    self.advance();
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => {}
                None => return self.incomplete("unterminated comment"),
            }
        }
    }

    // ── Numbers ──────────────────────────────────────────────────

    fn scan_number(&mut self, negative: bool) -> Result<Token, LexError> {
        let first = self.advance().expect("digit");
        debug_assert!(first.is_ascii_digit());

        if first == '0' && !negative && self.peek() == Some('w') {
            // `0w` word prefix, only when digits actually follow;
            // otherwise fall back to `0` and let `w` start an identifier.
            if self.peek2() == Some('x') && self.peek3().is_some_and(|d| d.is_ascii_hexdigit()) {
                self.advance();
                self.advance();
                let value = self.scan_digits(16)?;
                return Ok(Token::Word {
                    text: SmolStr::new(self.text()),
                    value,
                });
            }
            if self.peek2().is_some_and(|d| d.is_ascii_digit()) {
                self.advance();
                let value = self.scan_digits(10)?;
                return Ok(Token::Word {
                    text: SmolStr::new(self.text()),
                    value,
                });
            }
            return Ok(Token::Numeric {
                text: SmolStr::new(self.text()),
                value: 0,
            });
        }

        if first == '0'
            && self.peek() == Some('x')
            && self.peek2().is_some_and(|d| d.is_ascii_hexdigit())
        {
            self.advance();
            let magnitude = self.scan_digits(16)?;
            return self.integer_token(negative, magnitude, false);
        }

        let mut magnitude = first.to_digit(10).unwrap() as i64;
        while let Some(d) = self.peek() {
            if d.is_ascii_digit() {
                self.advance();
                magnitude = magnitude
                    .checked_mul(10)
                    .and_then(|m| m.checked_add(d.to_digit(10).unwrap() as i64))
                    .unwrap_or(i64::MAX);
            } else if d == '_' && self.options.allow_successor_ml {
                self.advance();
            } else {
                break;
            }
        }

        let mut is_real = false;
        if self.peek() == Some('.') {
            if !self.peek2().is_some_and(|d| d.is_ascii_digit()) {
                self.advance();
                return self.malformed("missing digits after `.` in real constant");
            }
            self.advance();
            is_real = true;
            while self.peek().is_some_and(|d| d.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let after = self.peek2();
            let exp_digit = match after {
                Some('~') => self.peek3().is_some_and(|d| d.is_ascii_digit()),
                Some(d) => d.is_ascii_digit(),
                None => false,
            };
            if !exp_digit {
                self.advance();
                return self.malformed("missing digits after exponent in real constant");
            }
            self.advance();
            self.eat('~');
            is_real = true;
            while self.peek().is_some_and(|d| d.is_ascii_digit()) {
                self.advance();
            }
        }

        if is_real {
            let cleaned: String = self
                .text()
                .chars()
                .filter(|&c| c != '_')
                .map(|c| if c == '~' { '-' } else { c })
                .collect();
            let value: f64 = cleaned
                .parse()
                .map_err(|_| LexError {
                    kind: LexErrorKind::Malformed,
                    message: format!("invalid real constant `{}`", self.text()),
                    span: self.span(),
                })?;
            return Ok(Token::Real {
                text: SmolStr::new(self.text()),
                value,
            });
        }

        self.integer_token(negative, magnitude, !negative)
    }

    fn integer_token(
        &mut self,
        negative: bool,
        magnitude: i64,
        plain_decimal: bool,
    ) -> Result<Token, LexError> {
        let value = if negative { -magnitude } else { magnitude };
        if value < MININT || value > MAXINT {
            return self.malformed(format!(
                "integer constant `{}` out of range",
                self.text()
            ));
        }
        let text = SmolStr::new(self.text());
        if plain_decimal {
            Ok(Token::Numeric { text, value })
        } else {
            Ok(Token::Int { text, value })
        }
    }

    /// Scans a digit run in the given radix, with optional `_` separators.
    fn scan_digits(&mut self, radix: u32) -> Result<i64, LexError> {
        let mut value: i64 = 0;
        let mut overflow = false;
        loop {
            match self.peek() {
                Some(d) if d.is_digit(radix) => {
                    self.advance();
                    value = match value
                        .checked_mul(radix as i64)
                        .and_then(|v| v.checked_add(d.to_digit(radix).unwrap() as i64))
                    {
                        Some(v) => v,
                        None => {
                            overflow = true;
                            0
                        }
                    };
                }
                Some('_') if self.options.allow_successor_ml => {
                    self.advance();
                }
                _ => break,
            }
        }
        if overflow || value > MAXINT {
            return self.malformed(format!("constant `{}` out of range", self.text()));
        }
        Ok(value)
    }

    // ── Strings and characters ───────────────────────────────────

    /// Scans a string body after the opening quote, through the closing one.
    fn scan_string_body(&mut self) -> Result<String, LexError> {
        let mut value = String::new();
        loop {
            let c = match self.advance() {
                Some(c) => c,
                None => return self.incomplete("unterminated string constant"),
            };
            match c {
                '"' => return Ok(value),
                '\\' => {
                    if let Some(escaped) = self.scan_escape()? {
                        value.push(escaped);
                    }
                }
                c if (c as u32) < 0x20 => {
                    return self.malformed(
                        "control character in string constant must be escaped",
                    );
                }
                c if !c.is_ascii() && !self.options.allow_unicode => {
                    return self.malformed(
                        "non-ASCII character in string constant (enable unicode support)",
                    );
                }
                c => value.push(c),
            }
        }
    }

    /// Scans one escape sequence after the backslash. Returns `None` for the
    /// whitespace-continuation escape, which contributes no character.
    fn scan_escape(&mut self) -> Result<Option<char>, LexError> {
        let c = match self.advance() {
            Some(c) => c,
            None => return self.incomplete("unterminated string constant"),
        };
        let escaped = match c {
            'a' => '\x07',
            'b' => '\x08',
            't' => '\t',
            'n' => '\n',
            'v' => '\x0b',
            'f' => '\x0c',
            'r' => '\r',
            '"' => '"',
            '\\' => '\\',
            '^' => {
                let ctrl = match self.advance() {
                    Some(c) => c,
                    None => return self.incomplete("unterminated string constant"),
                };
                let code = ctrl as u32;
                if !(64..=95).contains(&code) {
                    return self.malformed(format!("invalid control escape `\\^{}`", ctrl));
                }
                char::from_u32(code - 64).unwrap()
            }
            d if d.is_ascii_digit() => {
                let mut code = d.to_digit(10).unwrap();
                for _ in 0..2 {
                    match self.advance() {
                        Some(d) if d.is_ascii_digit() => {
                            code = code * 10 + d.to_digit(10).unwrap();
                        }
                        Some(_) => {
                            return self.malformed("`\\ddd` escape needs three digits")
                        }
                        None => return self.incomplete("unterminated string constant"),
                    }
                }
                if code > 255 {
                    return self.malformed(format!("escape `\\{}` out of range", code));
                }
                char::from_u32(code).unwrap()
            }
            'u' => {
                let mut code: u32 = 0;
                for _ in 0..4 {
                    match self.advance() {
                        Some(h) if h.is_ascii_hexdigit() => {
                            code = code * 16 + h.to_digit(16).unwrap();
                        }
                        Some(_) => {
                            return self.malformed("`\\uHHHH` escape needs four hex digits")
                        }
                        None => return self.incomplete("unterminated string constant"),
                    }
                }
                if code > 0xFF && !self.options.allow_unicode {
                    return self.malformed(
                        "unicode escape above \\u00FF (enable unicode support)",
                    );
                }
                match char::from_u32(code) {
                    Some(c) => c,
                    None => return self.malformed("invalid unicode escape"),
                }
            }
            c if is_ws_char(c) => {
                // Whitespace continuation: `\  <ws>  \` joins source lines.
                loop {
                    match self.advance() {
                        Some(c) if is_ws_char(c) => {}
                        Some('\\') => return Ok(None),
                        Some(_) => {
                            return self.malformed(
                                "expected `\\` to end a whitespace continuation",
                            )
                        }
                        None => return self.incomplete("unterminated string constant"),
                    }
                }
            }
            c => return self.malformed(format!("invalid escape `\\{}`", c)),
        };
        Ok(Some(escaped))
    }

    // ── Identifiers ──────────────────────────────────────────────

    fn scan_type_variable(&mut self) -> Result<Token, LexError> {
        self.advance();
        let equality = self.eat('\'');
        let body_start = self.cursor;
        while let Some(c) = self.peek() {
            let unicode_ok =
                self.options.allow_unicode_type_variables && c.is_alphabetic() && !c.is_ascii();
            if is_alnum_char(c) || unicode_ok {
                self.advance();
            } else {
                break;
            }
        }
        if self.cursor == body_start {
            return self.malformed("type variable needs a name after the prime");
        }
        let text = SmolStr::new(self.text());
        if equality {
            Ok(Token::EqTyVar(text))
        } else {
            Ok(Token::TyVar(text))
        }
    }

    fn scan_alnum_run(&mut self) -> SmolStr {
        while self.peek().is_some_and(is_alnum_char) {
            self.advance();
        }
        SmolStr::new(self.text())
    }

    fn scan_alphanumeric(&mut self) -> Result<Token, LexError> {
        self.advance();
        let text = self.scan_alnum_run();
        if is_alpha_keyword(&text) {
            return Ok(Token::Keyword(text));
        }
        if self.peek() == Some('.') {
            return self.scan_long_identifier(text);
        }
        Ok(Token::AlphaId(text))
    }

    fn scan_symbolic(&mut self) -> Result<Token, LexError> {
        self.advance();
        while self.peek().is_some_and(is_symbolic_char) {
            self.advance();
        }
        let text = self.text();
        match text {
            "=" => Ok(Token::Equals),
            "*" => Ok(Token::Star),
            _ if SYMBOLIC_KEYWORDS.contains(&text) => Ok(Token::Keyword(SmolStr::new(text))),
            _ => Ok(Token::SymbolicId(SmolStr::new(text))),
        }
    }

    /// Continues a qualified name after its first segment. Qualifiers must be
    /// alphanumeric; the last segment may be symbolic but never `=`, and the
    /// dots tolerate no whitespace.
    fn scan_long_identifier(&mut self, first: SmolStr) -> Result<Token, LexError> {
        let mut qualifiers = vec![first];
        loop {
            self.advance(); // the dot
            let seg_start = self.cursor;
            match self.peek() {
                Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                    self.advance();
                    while self.peek().is_some_and(is_alnum_char) {
                        self.advance();
                    }
                    let seg = SmolStr::new(&self.src[seg_start as usize..self.cursor as usize]);
                    if is_alpha_keyword(&seg) {
                        return self
                            .malformed(format!("reserved word `{}` in qualified name", seg));
                    }
                    if self.peek() == Some('.') {
                        qualifiers.push(seg);
                        continue;
                    }
                    return Ok(Token::LongId {
                        qualifiers,
                        name: seg,
                        symbolic: false,
                    });
                }
                Some(c) if is_symbolic_char(c) => {
                    self.advance();
                    while self.peek().is_some_and(is_symbolic_char) {
                        self.advance();
                    }
                    let seg = &self.src[seg_start as usize..self.cursor as usize];
                    if seg == "=" {
                        return self.malformed("`=` cannot end a qualified name");
                    }
                    return Ok(Token::LongId {
                        qualifiers,
                        name: SmolStr::new(seg),
                        symbolic: true,
                    });
                }
                _ => return self.malformed("expected an identifier after `.`"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_tokens(source: &str) -> Vec<Token> {
        lex(source, &LexerOptions::default())
            .expect("unexpected lex error")
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    fn lex_err(source: &str) -> LexError {
        lex(source, &LexerOptions::default()).expect_err("expected a lex error")
    }

    fn kw(text: &str) -> Token {
        Token::Keyword(SmolStr::new(text))
    }

    fn num(text: &str, value: i64) -> Token {
        Token::Numeric {
            text: SmolStr::new(text),
            value,
        }
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            lex_tokens("val x = fn y => y"),
            vec![
                kw("val"),
                Token::AlphaId("x".into()),
                Token::Equals,
                kw("fn"),
                Token::AlphaId("y".into()),
                kw("=>"),
                Token::AlphaId("y".into()),
            ]
        );
    }

    #[test]
    fn symbolic_identifiers_use_maximal_munch() {
        assert_eq!(
            lex_tokens("a ==> b || c"),
            vec![
                Token::AlphaId("a".into()),
                Token::SymbolicId("==>".into()),
                Token::AlphaId("b".into()),
                Token::SymbolicId("||".into()),
                Token::AlphaId("c".into()),
            ]
        );
        assert_eq!(lex_tokens("|"), vec![kw("|")]);
        assert_eq!(lex_tokens("*"), vec![Token::Star]);
        assert_eq!(lex_tokens(":="), vec![Token::SymbolicId(":=".into())]);
        assert_eq!(lex_tokens(":>"), vec![kw(":>")]);
    }

    #[test]
    fn integers_and_words() {
        assert_eq!(lex_tokens("42"), vec![num("42", 42)]);
        assert_eq!(
            lex_tokens("~42"),
            vec![Token::Int {
                text: "~42".into(),
                value: -42
            }]
        );
        assert_eq!(
            lex_tokens("0x1f"),
            vec![Token::Int {
                text: "0x1f".into(),
                value: 31
            }]
        );
        assert_eq!(
            lex_tokens("0w13"),
            vec![Token::Word {
                text: "0w13".into(),
                value: 13
            }]
        );
        assert_eq!(
            lex_tokens("0wx1f"),
            vec![Token::Word {
                text: "0wx1f".into(),
                value: 31
            }]
        );
    }

    #[test]
    fn numeric_fallbacks_split_into_two_tokens() {
        assert_eq!(
            lex_tokens("0w"),
            vec![num("0", 0), Token::AlphaId("w".into())]
        );
        assert_eq!(
            lex_tokens("~0x"),
            vec![
                Token::Int {
                    text: "~0".into(),
                    value: 0
                },
                Token::AlphaId("x".into()),
            ]
        );
        assert_eq!(
            lex_tokens("0X4a"),
            vec![num("0", 0), Token::AlphaId("X4a".into())]
        );
    }

    #[test]
    fn reals() {
        assert_eq!(
            lex_tokens("3.25"),
            vec![Token::Real {
                text: "3.25".into(),
                value: 3.25
            }]
        );
        assert_eq!(
            lex_tokens("~1.0e~2"),
            vec![Token::Real {
                text: "~1.0e~2".into(),
                value: -0.01
            }]
        );
        assert_eq!(
            lex_tokens("1E3"),
            vec![Token::Real {
                text: "1E3".into(),
                value: 1000.0
            }]
        );
    }

    #[test]
    fn real_missing_digits_is_an_error() {
        assert_eq!(lex_err("1.").kind, LexErrorKind::Malformed);
        assert_eq!(lex_err("1.e5").kind, LexErrorKind::Malformed);
        assert_eq!(lex_err("1e").kind, LexErrorKind::Malformed);
        assert_eq!(lex_err("1e~").kind, LexErrorKind::Malformed);
    }

    #[test]
    fn integer_overflow_is_an_error() {
        assert_eq!(lex_err("1073741824").kind, LexErrorKind::Malformed);
        assert_eq!(lex_tokens("1073741823"), vec![num("1073741823", MAXINT)]);
        assert_eq!(
            lex_tokens("~1073741824"),
            vec![Token::Int {
                text: "~1073741824".into(),
                value: MININT
            }]
        );
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(
            lex_tokens(r#""hej\nsan""#),
            vec![Token::Str {
                text: r#""hej\nsan""#.into(),
                value: "hej\nsan".into()
            }]
        );
        assert_eq!(
            lex_tokens(r#""\^I\065\u0041""#),
            vec![Token::Str {
                text: r#""\^I\065\u0041""#.into(),
                value: "\tAA".into()
            }]
        );
    }

    #[test]
    fn string_whitespace_continuation() {
        assert_eq!(
            lex_tokens("\"ab\\ \n \\cd\""),
            vec![Token::Str {
                text: "\"ab\\ \n \\cd\"".into(),
                value: "abcd".into()
            }]
        );
    }

    #[test]
    fn bad_strings() {
        assert_eq!(lex_err("\"ab").kind, LexErrorKind::Incomplete);
        assert_eq!(lex_err("\"a\tb\"").kind, LexErrorKind::Malformed);
        assert_eq!(lex_err(r#""\q""#).kind, LexErrorKind::Malformed);
    }

    #[test]
    fn characters() {
        assert_eq!(
            lex_tokens("#\"a\""),
            vec![Token::Char {
                text: "#\"a\"".into(),
                value: 'a'
            }]
        );
        assert_eq!(
            lex_tokens("#\"\\n\""),
            vec![Token::Char {
                text: "#\"\\n\"".into(),
                value: '\n'
            }]
        );
        assert_eq!(lex_err("#\"ab\"").kind, LexErrorKind::Malformed);
        assert_eq!(lex_err("#\"\"").kind, LexErrorKind::Malformed);
    }

    #[test]
    fn type_variables() {
        assert_eq!(lex_tokens("'a"), vec![Token::TyVar("'a".into())]);
        assert_eq!(lex_tokens("''eq"), vec![Token::EqTyVar("''eq".into())]);
        assert_eq!(lex_err("'").kind, LexErrorKind::Malformed);
    }

    #[test]
    fn nested_comments() {
        assert_eq!(
            lex_tokens("1 (* yes (* deeply *) nested *) 2"),
            vec![num("1", 1), num("2", 2)]
        );
        assert_eq!(lex_err("(* open (* closed *)").kind, LexErrorKind::Incomplete);
    }

    #[test]
    fn long_identifiers() {
        assert_eq!(
            lex_tokens("Math.sqrt"),
            vec![Token::LongId {
                qualifiers: vec!["Math".into()],
                name: "sqrt".into(),
                symbolic: false,
            }]
        );
        assert_eq!(
            lex_tokens("A.B.+"),
            vec![Token::LongId {
                qualifiers: vec!["A".into(), "B".into()],
                name: "+".into(),
                symbolic: true,
            }]
        );
        assert_eq!(lex_err("A.=").kind, LexErrorKind::Malformed);
        assert_eq!(lex_err("A.val").kind, LexErrorKind::Malformed);
    }

    #[test]
    fn dots_must_come_in_threes() {
        assert_eq!(lex_tokens("{x, ...}").len(), 5);
        assert_eq!(lex_err("..").kind, LexErrorKind::Malformed);
    }

    #[test]
    fn negative_literal_wins_over_symbolic_run() {
        assert_eq!(
            lex_tokens("~~5"),
            vec![Token::SymbolicId("~~".into()), num("5", 5)]
        );
    }

    #[test]
    fn successor_ml_digit_separators() {
        let options = LexerOptions {
            allow_successor_ml: true,
            ..LexerOptions::default()
        };
        let tokens = lex("1_000_000", &options).unwrap();
        assert_eq!(
            tokens[0].0,
            Token::Numeric {
                text: "1_000_000".into(),
                value: 1_000_000
            }
        );
        // Without the flag the separator starts a fresh identifier token.
        assert_eq!(
            lex_tokens("1_000"),
            vec![num("1", 1), Token::AlphaId("_000".into())]
        );
    }

    #[test]
    fn unicode_gate() {
        assert_eq!(lex_err("\"å\"").kind, LexErrorKind::Malformed);
        let options = LexerOptions {
            allow_unicode: true,
            ..LexerOptions::default()
        };
        let tokens = lex("\"å\"", &options).unwrap();
        assert_eq!(
            tokens[0].0,
            Token::Str {
                text: "\"å\"".into(),
                value: "å".into()
            }
        );
    }

    #[test]
    fn spans_are_byte_offsets() {
        let tokens = lex("val x = 1", &LexerOptions::default()).unwrap();
        assert_eq!(tokens[0].1, Span::new(0, 3));
        assert_eq!(tokens[1].1, Span::new(4, 5));
        assert_eq!(tokens[2].1, Span::new(6, 7));
        assert_eq!(tokens[3].1, Span::new(8, 9));
    }
}
