use crate::diagnostics::{Diagnostic, DiagnosticKind, SourceSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Var,
    Const,
    Fn,
    Class,
    Enum,
    Static,
    Public,
    Private,
    Protected,
    Internal,
    If,
    Else,
    While,
    For,
    In,
    Switch,
    Case,
    Default,
    Try,
    Catch,
    Finally,
    Throw,
    Break,
    Continue,
    Return,
    True,
    False,
    Null,
    This,
    Super,
    Import,
    From,
    As,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    InterpolatedString,
    Keyword(Keyword),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    DotDot,
    Ellipsis,
    Colon,
    Semicolon,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pipe,
    DoubleAmpersand,
    DoublePipe,
    Bang,
    BangEqual,
    EqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Unknown,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: SourceSpan,
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: std::str::CharIndices<'a>,
    current: usize,
    line: usize,
    peeked: Option<(usize, char)>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::starting_at_line(source, 1)
    }

    /// Lexer for a fragment embedded at `line` of a larger source, used for
    /// the expressions inside interpolated strings.
    pub fn starting_at_line(source: &'a str, line: usize) -> Self {
        Self {
            source,
            chars: source.char_indices(),
            current: 0,
            line,
            peeked: None,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = if let Some((idx, ch)) = self.peeked.take() {
            Some((idx, ch))
        } else {
            self.chars.next()
        };
        if let Some((idx, ch)) = next {
            self.current = idx + ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
            }
            Some((idx, ch))
        } else {
            None
        }
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    /// The character after the peeked one.
    fn peek_second(&mut self) -> Option<char> {
        self.peek();
        self.chars.clone().next().map(|(_, ch)| ch)
    }

    fn match_next(&mut self, expected: char) -> bool {
        match self.peek() {
            Some((_, ch)) if ch == expected => {
                self.bump();
                true
            }
            _ => false,
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            let mut progressed = false;

            while let Some((_, ch)) = self.peek() {
                if ch.is_whitespace() {
                    self.bump();
                    progressed = true;
                } else {
                    break;
                }
            }

            if let Some((_, '/')) = self.peek() {
                match self.peek_second() {
                    Some('/') => {
                        while let Some((_, ch)) = self.peek() {
                            if ch == '\n' {
                                break;
                            }
                            self.bump();
                        }
                        progressed = true;
                    }
                    Some('*') => {
                        self.bump();
                        self.bump();
                        let mut depth = 1;
                        while let Some((_, ch)) = self.bump() {
                            if ch == '/' && self.match_next('*') {
                                depth += 1;
                            } else if ch == '*' && self.match_next('/') {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                        }
                        progressed = true;
                    }
                    _ => {}
                }
            }

            if !progressed {
                break;
            }
        }
    }

    fn identifier_or_keyword(&mut self, start: usize, line: usize) -> Token {
        while let Some((_, ch)) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.current;
        let lexeme = self.source[start..end].to_string();
        let kind = keyword_for(&lexeme).unwrap_or(TokenKind::Identifier);
        Token {
            kind,
            lexeme,
            span: SourceSpan::new(start, end, line),
        }
    }

    fn number_literal(&mut self, start: usize, line: usize) -> Token {
        let mut seen_dot = false;
        while let Some((_, ch)) = self.peek() {
            match ch {
                '0'..='9' | '_' => {
                    self.bump();
                }
                // `1..5` is a range, not a float
                '.' if !seen_dot && matches!(self.peek_second(), Some('0'..='9')) => {
                    seen_dot = true;
                    self.bump();
                }
                'e' | 'E' => {
                    self.bump();
                    if let Some((_, '+' | '-')) = self.peek() {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
        // type suffixes: `2d` is a decimal, `2f` a float
        if let Some((_, 'd' | 'D' | 'f' | 'F')) = self.peek() {
            let next = self.peek_second();
            if !next.is_some_and(|ch| ch.is_alphanumeric() || ch == '_') {
                self.bump();
            }
        }
        let end = self.current;
        Token {
            kind: TokenKind::Number,
            lexeme: self.source[start..end].to_string(),
            span: SourceSpan::new(start, end, line),
        }
    }

    fn string_literal(&mut self, start: usize, line: usize) -> Result<Token, Diagnostic> {
        let mut value = String::new();
        while let Some((_, ch)) = self.bump() {
            match ch {
                '"' => {
                    return Ok(Token {
                        kind: TokenKind::String,
                        lexeme: value,
                        span: SourceSpan::new(start, self.current, line),
                    });
                }
                '\\' => match self.bump() {
                    Some((_, esc)) => value.push(unescape_char(esc)),
                    None => break,
                },
                _ => value.push(ch),
            }
        }
        Err(
            Diagnostic::new(DiagnosticKind::Lexer, "unterminated string literal")
                .with_span(SourceSpan::new(start, self.current, line)),
        )
    }

    /// `$"..."`: the raw body is kept; the parser splits text from `{expr}` holes.
    fn interpolated_string(&mut self, start: usize, line: usize) -> Result<Token, Diagnostic> {
        self.bump(); // opening quote
        let body_start = self.current;
        let mut depth = 0usize;
        let mut in_nested_string = false;
        while let Some((idx, ch)) = self.bump() {
            match ch {
                '\\' => {
                    self.bump();
                }
                '"' if in_nested_string => in_nested_string = false,
                '"' if depth > 0 => in_nested_string = true,
                '"' => {
                    return Ok(Token {
                        kind: TokenKind::InterpolatedString,
                        lexeme: self.source[body_start..idx].to_string(),
                        span: SourceSpan::new(start, self.current, line),
                    });
                }
                '{' if !in_nested_string => depth += 1,
                '}' if !in_nested_string => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        Err(
            Diagnostic::new(DiagnosticKind::Lexer, "unterminated interpolated string")
                .with_span(SourceSpan::new(start, self.current, line)),
        )
    }

    fn simple_token(&mut self, start: usize, line: usize, kind: TokenKind) -> Token {
        let end = self.current;
        Token {
            kind,
            lexeme: self.source[start..end].to_string(),
            span: SourceSpan::new(start, end, line),
        }
    }

    /// Emits `with_eq` when the next char is `=`, otherwise `plain`.
    fn with_equals(&mut self, start: usize, line: usize, plain: TokenKind, with_eq: TokenKind) -> Token {
        if self.match_next('=') {
            self.simple_token(start, line, with_eq)
        } else {
            self.simple_token(start, line, plain)
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let line = self.line;
            let (start, ch) = match self.bump() {
                Some(pair) => pair,
                None => {
                    tokens.push(Token {
                        kind: TokenKind::Eof,
                        lexeme: String::new(),
                        span: SourceSpan::new(self.current, self.current, line),
                    });
                    break;
                }
            };

            let token = match ch {
                'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(start, line),
                '0'..='9' => self.number_literal(start, line),
                '"' => self.string_literal(start, line)?,
                '$' if matches!(self.peek(), Some((_, '"'))) => {
                    self.interpolated_string(start, line)?
                }
                '(' => self.simple_token(start, line, TokenKind::LParen),
                ')' => self.simple_token(start, line, TokenKind::RParen),
                '{' => self.simple_token(start, line, TokenKind::LBrace),
                '}' => self.simple_token(start, line, TokenKind::RBrace),
                '[' => self.simple_token(start, line, TokenKind::LBracket),
                ']' => self.simple_token(start, line, TokenKind::RBracket),
                ',' => self.simple_token(start, line, TokenKind::Comma),
                '.' => {
                    if self.match_next('.') {
                        if self.match_next('.') {
                            self.simple_token(start, line, TokenKind::Ellipsis)
                        } else {
                            self.simple_token(start, line, TokenKind::DotDot)
                        }
                    } else {
                        self.simple_token(start, line, TokenKind::Dot)
                    }
                }
                ';' => self.simple_token(start, line, TokenKind::Semicolon),
                ':' => self.simple_token(start, line, TokenKind::Colon),
                '+' => self.with_equals(start, line, TokenKind::Plus, TokenKind::PlusAssign),
                '-' => self.with_equals(start, line, TokenKind::Minus, TokenKind::MinusAssign),
                '*' => self.with_equals(start, line, TokenKind::Star, TokenKind::StarAssign),
                '/' => self.with_equals(start, line, TokenKind::Slash, TokenKind::SlashAssign),
                '%' => self.with_equals(start, line, TokenKind::Percent, TokenKind::PercentAssign),
                '=' => self.with_equals(start, line, TokenKind::Assign, TokenKind::EqualEqual),
                '!' => self.with_equals(start, line, TokenKind::Bang, TokenKind::BangEqual),
                '<' => self.with_equals(start, line, TokenKind::Less, TokenKind::LessEqual),
                '>' => self.with_equals(start, line, TokenKind::Greater, TokenKind::GreaterEqual),
                '&' if self.match_next('&') => {
                    self.simple_token(start, line, TokenKind::DoubleAmpersand)
                }
                '|' => {
                    if self.match_next('|') {
                        self.simple_token(start, line, TokenKind::DoublePipe)
                    } else {
                        self.simple_token(start, line, TokenKind::Pipe)
                    }
                }
                _ => self.simple_token(start, line, TokenKind::Unknown),
            };
            tokens.push(token);
        }
        Ok(tokens)
    }
}

pub(crate) fn unescape_char(esc: char) -> char {
    match esc {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        '0' => '\0',
        other => other,
    }
}

fn keyword_for(ident: &str) -> Option<TokenKind> {
    use self::Keyword as Kw;
    let keyword = match ident {
        "var" => Kw::Var,
        "const" => Kw::Const,
        "fn" => Kw::Fn,
        "class" => Kw::Class,
        "enum" => Kw::Enum,
        "static" => Kw::Static,
        "public" => Kw::Public,
        "private" => Kw::Private,
        "protected" => Kw::Protected,
        "internal" => Kw::Internal,
        "if" => Kw::If,
        "else" => Kw::Else,
        "while" => Kw::While,
        "for" => Kw::For,
        "in" => Kw::In,
        "switch" => Kw::Switch,
        "case" => Kw::Case,
        "default" => Kw::Default,
        "try" => Kw::Try,
        "catch" => Kw::Catch,
        "finally" => Kw::Finally,
        "throw" => Kw::Throw,
        "break" => Kw::Break,
        "continue" => Kw::Continue,
        "return" => Kw::Return,
        "true" => Kw::True,
        "false" => Kw::False,
        "null" => Kw::Null,
        "this" => Kw::This,
        "super" => Kw::Super,
        "import" => Kw::Import,
        "from" => Kw::From,
        "as" => Kw::As,
        _ => return None,
    };
    Some(TokenKind::Keyword(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn range_is_not_a_float() {
        assert_eq!(
            kinds("1..5"),
            vec![
                TokenKind::Number,
                TokenKind::DotDot,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn decimal_suffix_stays_in_lexeme() {
        let tokens = Lexer::new("2.5d").tokenize().expect("tokenize");
        assert_eq!(tokens[0].lexeme, "2.5d");
    }

    #[test]
    fn tracks_lines() {
        let tokens = Lexer::new("a\n// note\nb").tokenize().expect("tokenize");
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[1].span.line, 3);
    }

    #[test]
    fn interpolated_string_keeps_holes() {
        let tokens = Lexer::new(r#"$"x = {f("}")}!""#).tokenize().expect("tokenize");
        assert_eq!(tokens[0].kind, TokenKind::InterpolatedString);
        assert_eq!(tokens[0].lexeme, r#"x = {f("}")}!"#);
    }
}
