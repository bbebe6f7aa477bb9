//! Stylesheet tokenizer.
//!
//! First-byte dispatch handles the common single-character tokens; the
//! multi-character productions are matched with anchored regexes built
//! once from a small macro table. Positions are 1-based line/column in
//! code points.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum TokenType {
    Error,
    Eof,
    Ident,
    AtKeyword,
    Str,
    Hash,
    Attachment,
    Class,
    Instance,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Semicolon,
    Comma,
    Plus,
    Minus,
    Multiply,
    Divide,
    Comp,
    Number,
    Percentage,
    Dimension,
    Uri,
    Whitespace,
    Comment,
    Function,
    Char,
    Bom,
}

impl TokenType {
    pub(crate) fn name(self) -> &'static str {
        match self {
            TokenType::Error => "error",
            TokenType::Eof => "EOF",
            TokenType::Ident => "IDENT",
            TokenType::AtKeyword => "ATKEYWORD",
            TokenType::Str => "STRING",
            TokenType::Hash => "HASH",
            TokenType::Attachment => "ATTACHMENT",
            TokenType::Class => "CLASS",
            TokenType::Instance => "INSTANCE",
            TokenType::LBrace => "LBRACE",
            TokenType::RBrace => "RBRACE",
            TokenType::LBracket => "LBRACKET",
            TokenType::RBracket => "RBRACKET",
            TokenType::LParen => "LPAREN",
            TokenType::RParen => "RPAREN",
            TokenType::Colon => "COLON",
            TokenType::Semicolon => "SEMICOLON",
            TokenType::Comma => "COMMA",
            TokenType::Plus => "PLUS",
            TokenType::Minus => "MINUS",
            TokenType::Multiply => "MULTIPLY",
            TokenType::Divide => "DIVIDE",
            TokenType::Comp => "COMP",
            TokenType::Number => "NUMBER",
            TokenType::Percentage => "PERCENTAGE",
            TokenType::Dimension => "DIMENSION",
            TokenType::Uri => "URI",
            TokenType::Whitespace => "S",
            TokenType::Comment => "COMMENT",
            TokenType::Function => "FUNCTION",
            TokenType::Char => "CHAR",
            TokenType::Bom => "BOM",
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Token {
    pub ttype: TokenType,
    pub value: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.chars().count() > 10 {
            let short: String = self.value.chars().take(10).collect();
            write!(
                f,
                "{} (line: {}, column: {}): {:?}...",
                self.ttype.name(),
                self.line,
                self.column,
                short
            )
        } else {
            write!(
                f,
                "{} (line: {}, column: {}): {:?}",
                self.ttype.name(),
                self.line,
                self.column,
                self.value
            )
        }
    }
}

// Macros and productions -----------------------------------------------------

/// Macros expanded into the production patterns below. Escaped specials:
/// `\.+*?()|[]{}^$`.
static MACROS: &[(&str, &str)] = &[
    ("ident", "-?{nmstart}{nmchar}*"),
    ("name", "{nmchar}+"),
    ("nmstart", "[a-zA-Z_]|{nonascii}|{escape}"),
    ("nonascii", "[\\x{0080}-\\x{D7FF}\\x{E000}-\\x{FFFD}\\x{10000}-\\x{10FFFF}]"),
    ("unicode", "\\\\[0-9a-fA-F]{1,6}{wc}?"),
    (
        "escape",
        "{unicode}|\\\\[\\x{0020}-\\x{007E}\\x{0080}-\\x{D7FF}\\x{E000}-\\x{FFFD}\\x{10000}-\\x{10FFFF}]",
    ),
    ("nmchar", "[a-zA-Z0-9_-]|{nonascii}|{escape}"),
    ("num", "-?[0-9]*\\.?[0-9]+"),
    ("string", "\"(?:{stringchar}|')*\"|'(?:{stringchar}|\")*'"),
    ("stringchar", "{urlchar}|[ ]|\\\\{nl}"),
    ("urlchar", "[\\x{0009}\\x{0021}\\x{0023}-\\x{0026}\\x{0028}-\\x{007E}]|{nonascii}|{escape}"),
    ("nl", "[\\n\\r\\x{000C}]|\\r\\n"),
    ("w", "{wc}*"),
    ("wc", "[\\t\\n\\x{000C}\\r ]"),
];

static PRODUCTIONS: &[(TokenType, &str)] = &[
    (TokenType::Ident, "{ident}"),
    (TokenType::AtKeyword, "@{ident}"),
    (TokenType::Str, "{string}"),
    (TokenType::Hash, "#{name}"),
    (TokenType::Attachment, "::{name}"),
    (TokenType::Class, "\\.{name}"),
    (TokenType::Instance, "{ident}/"),
    (TokenType::Number, "{num}"),
    (TokenType::Percentage, "{num}%"),
    (TokenType::Dimension, "{num}{ident}"),
    (TokenType::Uri, "url\\({w}(?:{string}|{urlchar}*){w}\\)"),
    (TokenType::Whitespace, "{wc}+"),
    (TokenType::Comment, "/\\*[^\\*]*[\\*]+(?:[^/][^\\*]*[\\*]+)*/"),
    (TokenType::Function, "{ident}\\("),
    (TokenType::Comp, ">=|<=|>|<|!=|=~|="),
];

/// The order to test regexps in when first-byte shortcuts don't apply.
static MATCH_ORDER: &[TokenType] = &[
    TokenType::Uri,
    TokenType::Function,
    TokenType::Instance,
    TokenType::Ident,
    TokenType::Dimension,
    TokenType::Percentage,
    TokenType::Number,
    TokenType::Comp,
];

static MACRO_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[a-z]+\}").unwrap());

/// Compiled, anchored matchers for every production.
static MATCHERS: Lazy<HashMap<TokenType, Regex>> = Lazy::new(|| {
    let macros: HashMap<&str, &str> = MACROS.iter().copied().collect();
    let mut out = HashMap::new();
    for &(ttype, src) in PRODUCTIONS {
        let mut pattern = src.to_string();
        while MACRO_REF.is_match(&pattern) {
            pattern = MACRO_REF
                .replace_all(&pattern, |caps: &regex::Captures| {
                    let name = &caps[0][1..caps[0].len() - 1];
                    format!("(?:{})", macros[name])
                })
                .into_owned();
        }
        out.insert(ttype, Regex::new(&format!("^(?:{pattern})")).unwrap());
    }
    out
});

fn find(ttype: TokenType, input: &str) -> Option<&str> {
    MATCHERS[&ttype].find(input).map(|m| m.as_str())
}

// Scanner --------------------------------------------------------------------

/// Emits tokens for an MSS source. At the end of input the token type is
/// `Eof`. Unclosed strings and block comments yield a terminal `Error`
/// token; the scanner is latched afterwards and keeps returning it.
pub(crate) struct Scanner {
    input: String,
    pos: usize,
    row: usize,
    col: usize,
    err: Option<Token>,
}

impl Scanner {
    pub fn new(input: &str) -> Scanner {
        Scanner {
            input: input.replace("\r\n", "\n"),
            pos: 0,
            row: 1,
            col: 1,
            err: None,
        }
    }

    pub fn next(&mut self) -> Token {
        if let Some(err) = &self.err {
            return err.clone();
        }
        if self.pos >= self.input.len() {
            let eof = self.token(TokenType::Eof, "");
            self.err = Some(eof.clone());
            return eof;
        }
        if self.pos == 0 && self.input.starts_with('\u{FEFF}') {
            return self.emit(TokenType::Bom, "\u{FEFF}".to_string());
        }
        let input = &self.input[self.pos..];
        // There's a lot we can guess from the first byte before trying
        // multiple regexps.
        match input.as_bytes()[0] {
            b'\t' | b'\n' | 0x0C | b'\r' | b' ' => {
                let m = find(TokenType::Whitespace, input).unwrap_or(" ").to_string();
                return self.emit(TokenType::Whitespace, m);
            }
            b'.' => {
                // Dot followed by a digit is a number/dimension/percentage
                // and is matched below; anything else is a class or a char.
                if input.len() > 1 && !input.as_bytes()[1].is_ascii_digit() {
                    if let Some(m) = find(TokenType::Class, input) {
                        let m = m.to_string();
                        return self.emit(TokenType::Class, m);
                    }
                    return self.emit(TokenType::Char, ".".to_string());
                }
            }
            b'#' => {
                if let Some(m) = find(TokenType::Hash, input) {
                    let m = m.to_string();
                    return self.emit(TokenType::Hash, m);
                }
                return self.emit(TokenType::Char, "#".to_string());
            }
            b'@' => {
                if let Some(m) = find(TokenType::AtKeyword, input) {
                    let m = m.to_string();
                    return self.emit(TokenType::AtKeyword, m);
                }
                return self.emit(TokenType::Char, "@".to_string());
            }
            b':' => {
                if let Some(m) = find(TokenType::Attachment, input) {
                    let m = m.to_string();
                    return self.emit(TokenType::Attachment, m);
                }
                return self.emit(TokenType::Colon, ":".to_string());
            }
            b'%' | b'&' => {
                let v = (input.as_bytes()[0] as char).to_string();
                return self.emit(TokenType::Char, v);
            }
            b',' => return self.emit(TokenType::Comma, ",".to_string()),
            b';' => return self.emit(TokenType::Semicolon, ";".to_string()),
            b'(' => return self.emit(TokenType::LParen, "(".to_string()),
            b')' => return self.emit(TokenType::RParen, ")".to_string()),
            b'[' => return self.emit(TokenType::LBracket, "[".to_string()),
            b']' => return self.emit(TokenType::RBracket, "]".to_string()),
            b'{' => return self.emit(TokenType::LBrace, "{".to_string()),
            b'}' => return self.emit(TokenType::RBrace, "}".to_string()),
            b'+' => return self.emit(TokenType::Plus, "+".to_string()),
            b'*' => return self.emit(TokenType::Multiply, "*".to_string()),
            b'-' => {
                if let Some(m) = find(TokenType::Number, input) {
                    let m = m.to_string();
                    return self.emit(TokenType::Number, m);
                }
                if let Some(m) = find(TokenType::Function, input) {
                    let m = m.to_string();
                    return self.emit(TokenType::Function, m);
                }
                return self.emit(TokenType::Minus, "-".to_string());
            }
            b'"' | b'\'' => {
                if let Some(m) = find(TokenType::Str, input) {
                    let m = m.to_string();
                    return self.emit(TokenType::Str, m);
                }
                let err = self.token(TokenType::Error, "unclosed quotation mark");
                self.err = Some(err.clone());
                return err;
            }
            b'/' => {
                if input.len() > 1 && input.as_bytes()[1] == b'*' {
                    if let Some(m) = find(TokenType::Comment, input) {
                        let m = m.to_string();
                        return self.emit(TokenType::Comment, m);
                    }
                    let err = self.token(TokenType::Error, "unclosed comment");
                    self.err = Some(err.clone());
                    return err;
                } else if input.len() > 1 && input.as_bytes()[1] == b'/' {
                    let end = input.find('\n').unwrap_or(input.len());
                    let m = input[..end].to_string();
                    return self.emit(TokenType::Comment, m);
                }
                return self.emit(TokenType::Divide, "/".to_string());
            }
            _ => {}
        }
        // Test the remaining productions in order.
        for &ttype in MATCH_ORDER {
            if let Some(m) = find(ttype, input) {
                let m = m.to_string();
                return self.emit(ttype, m);
            }
        }
        // Unclosed quotation marks and comments are handled above, so
        // whatever is left is a plain char.
        let ch = input.chars().next().unwrap_or('\u{FFFD}');
        self.emit(TokenType::Char, ch.to_string())
    }

    fn token(&self, ttype: TokenType, value: &str) -> Token {
        Token {
            ttype,
            value: value.to_string(),
            line: self.row,
            column: self.col,
        }
    }

    /// Build the token and advance the input coordinates past `value`.
    fn emit(&mut self, ttype: TokenType, value: String) -> Token {
        let token = Token {
            ttype,
            value: value.clone(),
            line: self.row,
            column: self.col,
        };
        let lines = value.matches('\n').count();
        self.row += lines;
        if lines == 0 {
            self.col += value.chars().count();
        } else {
            let last = value.rfind('\n').unwrap_or(0);
            self.col = value[last..].chars().count();
        }
        self.pos += value.len();
        token
    }
}
