//! Recursive-descent parser producing the raw (unevaluated) block tree.
//!
//! ```text
//! sheet       := (import | varDecl | block | comment)*
//! block       := selectorList '{' body '}'
//! selectorList:= selector (',' selector)*
//! selector    := elem (zoom | filter)*    elem := layerRef | classRef | attachmentRef | '*' | 'Map'
//! body        := (declaration ';' | varDecl | block)*
//! declaration := (instance '/')? propertyName ':' valueExpr
//! varDecl     := '@' ident ':' valueExpr ';'
//! ```

use crate::color::Color;
use crate::properties::Pos;
use crate::rule::{CompOp, Filter, Selector};
use crate::token::{Scanner, Token, TokenType};
use crate::value::{ArithOp, Value};
use crate::zoom::ZoomRange;
use crate::Error;

/// An unevaluated expression tree.
#[derive(Clone, Debug)]
pub(crate) enum Expr {
    Lit(Value),
    Var(String, Pos),
    Neg(Box<Expr>, Pos),
    BinOp(ArithOp, Box<Expr>, Box<Expr>, Pos),
    Call(String, Vec<Expr>, Pos),
    List(Vec<Expr>),
}

#[derive(Clone, Debug)]
pub(crate) struct Decl {
    pub name: String,
    pub instance: String,
    pub expr: Expr,
    pub pos: Pos,
}

#[derive(Clone, Debug)]
pub(crate) struct VarDecl {
    pub name: String,
    pub expr: Expr,
    pub pos: Pos,
}

/// A selector block before evaluation. `is_map` marks `Map { ... }`
/// blocks whose properties configure the output document instead of a
/// layer.
#[derive(Clone, Debug, Default)]
pub(crate) struct RawBlock {
    pub selectors: Vec<Selector>,
    pub decls: Vec<Decl>,
    pub vars: Vec<VarDecl>,
    pub children: Vec<RawBlock>,
    pub is_map: bool,
}

/// One parsed stylesheet: the root block plus any `@import` references.
#[derive(Clone, Debug, Default)]
pub(crate) struct Sheet {
    pub root: RawBlock,
    pub imports: Vec<String>,
}

pub(crate) struct Parser {
    scanner: Scanner,
    peeked: Option<Token>,
    next_index: u32,
}

impl Parser {
    pub fn new(src: &str, first_index: u32) -> Parser {
        Parser {
            scanner: Scanner::new(src),
            peeked: None,
            next_index: first_index,
        }
    }

    /// Index to hand to the next parser so declaration order carries
    /// across stylesheets of one compile.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    fn alloc_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn advance(&mut self) -> Result<Token, Error> {
        if let Some(tok) = self.peeked.take() {
            return Ok(tok);
        }
        loop {
            let tok = self.scanner.next();
            match tok.ttype {
                TokenType::Whitespace | TokenType::Comment | TokenType::Bom => continue,
                TokenType::Error => {
                    return Err(Error::Scan {
                        line: tok.line,
                        column: tok.column,
                        message: tok.value,
                    })
                }
                _ => return Ok(tok),
            }
        }
    }

    fn peek(&mut self) -> Result<&Token, Error> {
        if self.peeked.is_none() {
            let tok = self.advance()?;
            self.peeked = Some(tok);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    fn expect(&mut self, ttype: TokenType) -> Result<Token, Error> {
        let tok = self.advance()?;
        if tok.ttype != ttype {
            return Err(unexpected(&tok, ttype.name()));
        }
        Ok(tok)
    }

    pub fn parse_sheet(&mut self) -> Result<Sheet, Error> {
        let mut sheet = Sheet::default();
        loop {
            let tok = self.peek()?;
            match tok.ttype {
                TokenType::Eof => break,
                TokenType::Semicolon => {
                    self.advance()?;
                }
                TokenType::AtKeyword => {
                    self.parse_at_rule(&mut sheet)?;
                }
                _ => {
                    let block = self.parse_block()?;
                    sheet.root.children.push(block);
                }
            }
        }
        Ok(sheet)
    }

    /// `@import "file";` or a variable binding `@name: expr;`.
    fn parse_at_rule(&mut self, sheet: &mut Sheet) -> Result<(), Error> {
        let at = self.expect(TokenType::AtKeyword)?;
        let name = at.value[1..].to_string();
        if name == "import" {
            let path = self.expect(TokenType::Str)?;
            sheet.imports.push(strip_quotes(&path.value));
            self.expect(TokenType::Semicolon)?;
            return Ok(());
        }
        self.expect(TokenType::Colon)?;
        let expr = self.parse_expr_list()?;
        self.expect(TokenType::Semicolon)?;
        sheet.root.vars.push(VarDecl {
            name,
            expr,
            pos: Pos { line: at.line, column: at.column, index: 0 },
        });
        Ok(())
    }

    fn parse_block(&mut self) -> Result<RawBlock, Error> {
        let mut block = RawBlock::default();
        let (selectors, is_map) = self.parse_selector_list()?;
        block.selectors = selectors;
        block.is_map = is_map;
        self.expect(TokenType::LBrace)?;
        loop {
            let tok = self.peek()?;
            match tok.ttype {
                TokenType::RBrace => {
                    self.advance()?;
                    break;
                }
                TokenType::Eof => {
                    let tok = self.advance()?;
                    return Err(unexpected(&tok, "'}'"));
                }
                TokenType::Semicolon => {
                    self.advance()?;
                }
                TokenType::AtKeyword => {
                    let at = self.advance()?;
                    let name = at.value[1..].to_string();
                    self.expect(TokenType::Colon)?;
                    let expr = self.parse_expr_list()?;
                    self.expect(TokenType::Semicolon)?;
                    block.vars.push(VarDecl {
                        name,
                        expr,
                        pos: Pos { line: at.line, column: at.column, index: 0 },
                    });
                }
                TokenType::Ident | TokenType::Instance => {
                    let decl = self.parse_declaration()?;
                    block.decls.push(decl);
                }
                _ => {
                    let child = self.parse_block()?;
                    block.children.push(child);
                }
            }
        }
        Ok(block)
    }

    fn parse_declaration(&mut self) -> Result<Decl, Error> {
        let mut instance = String::new();
        if self.peek()?.ttype == TokenType::Instance {
            let tok = self.advance()?;
            instance = tok.value[..tok.value.len() - 1].to_string();
        }
        let name_tok = self.expect(TokenType::Ident)?;
        self.expect(TokenType::Colon)?;
        let expr = self.parse_expr_list()?;
        // a closing brace may directly follow the final declaration
        if self.peek()?.ttype == TokenType::Semicolon {
            self.advance()?;
        } else if self.peek()?.ttype != TokenType::RBrace {
            let tok = self.advance()?;
            return Err(unexpected(&tok, "';'"));
        }
        Ok(Decl {
            name: name_tok.value,
            instance,
            expr,
            pos: Pos {
                line: name_tok.line,
                column: name_tok.column,
                index: self.alloc_index(),
            },
        })
    }

    fn parse_selector_list(&mut self) -> Result<(Vec<Selector>, bool), Error> {
        let mut selectors = Vec::new();
        let mut is_map = false;
        loop {
            let (selector, map) = self.parse_selector()?;
            is_map = is_map || map;
            selectors.push(selector);
            if self.peek()?.ttype == TokenType::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        Ok((selectors, is_map))
    }

    fn parse_selector(&mut self) -> Result<(Selector, bool), Error> {
        let mut selector = Selector::default();
        let mut is_map = false;
        let mut parts = 0;
        loop {
            let tok = self.peek()?;
            match tok.ttype {
                TokenType::Hash => {
                    let tok = self.advance()?;
                    selector.layer = tok.value[1..].to_string();
                    parts += 1;
                }
                TokenType::Class => {
                    let tok = self.advance()?;
                    selector.class = tok.value[1..].to_string();
                    parts += 1;
                }
                TokenType::Attachment => {
                    let tok = self.advance()?;
                    selector.attachment = tok.value[2..].to_string();
                    parts += 1;
                }
                TokenType::Multiply => {
                    // the universal selector constrains nothing
                    self.advance()?;
                    parts += 1;
                }
                TokenType::Ident => {
                    let tok = self.advance()?;
                    if tok.value == "Map" {
                        is_map = true;
                        parts += 1;
                    } else {
                        return Err(Error::Parse {
                            line: tok.line,
                            column: tok.column,
                            message: format!("unknown element selector {:?}", tok.value),
                        });
                    }
                }
                TokenType::LBracket => {
                    self.advance()?;
                    self.parse_predicate(&mut selector)?;
                    parts += 1;
                }
                TokenType::Comma | TokenType::LBrace => break,
                _ => {
                    let tok = self.advance()?;
                    return Err(unexpected(&tok, "selector"));
                }
            }
        }
        if parts == 0 {
            let tok = self.advance()?;
            return Err(unexpected(&tok, "selector"));
        }
        selector.filters.sort_by(|a, b| a.field.cmp(&b.field));
        Ok((selector, is_map))
    }

    /// The inside of `[...]`: either a zoom constraint or a field filter.
    fn parse_predicate(&mut self, selector: &mut Selector) -> Result<(), Error> {
        let field_tok = self.advance()?;
        let field = match field_tok.ttype {
            TokenType::Ident => field_tok.value.clone(),
            TokenType::Str => strip_quotes(&field_tok.value),
            _ => return Err(unexpected(&field_tok, "field name")),
        };
        let op_tok = self.expect(TokenType::Comp)?;
        let op = CompOp::parse(&op_tok.value).ok_or_else(|| Error::Parse {
            line: op_tok.line,
            column: op_tok.column,
            message: format!("invalid comparator {:?}", op_tok.value),
        })?;

        if field == "zoom" {
            if op == CompOp::Regex {
                return Err(Error::Parse {
                    line: op_tok.line,
                    column: op_tok.column,
                    message: "zoom cannot be matched against a regex".to_string(),
                });
            }
            let num = self.expect(TokenType::Number)?;
            let level: f64 = num.value.parse().map_err(|_| Error::Parse {
                line: num.line,
                column: num.column,
                message: format!("invalid zoom level {:?}", num.value),
            })?;
            let zoom = ZoomRange::from_comparison(op, level);
            selector.zoom = Some(match selector.zoom {
                Some(existing) => existing.combine(zoom),
                None => zoom,
            });
        } else {
            let value_tok = self.advance()?;
            let value = match value_tok.ttype {
                TokenType::Number => Value::Num(parse_number(&value_tok)?),
                TokenType::Str => Value::Str(strip_quotes(&value_tok.value)),
                TokenType::Ident => match value_tok.value.as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    "null" => Value::Null,
                    other => Value::Str(other.to_string()),
                },
                _ => return Err(unexpected(&value_tok, "filter value")),
            };
            selector.filters.push(Filter { field, op, value });
        }
        self.expect(TokenType::RBracket)?;
        Ok(())
    }

    // Expressions ------------------------------------------------------------

    /// A declaration value: one expression, or a list built from comma
    /// or space separated expressions.
    fn parse_expr_list(&mut self) -> Result<Expr, Error> {
        let mut items = vec![self.parse_sum()?];
        loop {
            match self.peek()?.ttype {
                TokenType::Comma => {
                    self.advance()?;
                    items.push(self.parse_sum()?);
                }
                TokenType::Number
                | TokenType::Percentage
                | TokenType::Dimension
                | TokenType::Str
                | TokenType::Hash
                | TokenType::AtKeyword
                | TokenType::Uri
                | TokenType::Function
                | TokenType::Ident
                | TokenType::LBracket
                | TokenType::LParen => {
                    items.push(self.parse_sum()?);
                }
                _ => break,
            }
        }
        if items.len() == 1 {
            Ok(items.pop().unwrap())
        } else {
            Ok(Expr::List(items))
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_product()?;
        loop {
            let (op, tok) = match self.peek()?.ttype {
                TokenType::Plus => (ArithOp::Add, self.advance()?),
                TokenType::Minus => (ArithOp::Sub, self.advance()?),
                _ => break,
            };
            let right = self.parse_product()?;
            left = Expr::BinOp(
                op,
                Box::new(left),
                Box::new(right),
                Pos { line: tok.line, column: tok.column, index: 0 },
            );
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_factor()?;
        loop {
            let (op, tok) = match self.peek()?.ttype {
                TokenType::Multiply => (ArithOp::Mul, self.advance()?),
                TokenType::Divide => (ArithOp::Div, self.advance()?),
                _ => break,
            };
            let right = self.parse_factor()?;
            left = Expr::BinOp(
                op,
                Box::new(left),
                Box::new(right),
                Pos { line: tok.line, column: tok.column, index: 0 },
            );
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, Error> {
        let tok = self.advance()?;
        let pos = Pos { line: tok.line, column: tok.column, index: 0 };
        match tok.ttype {
            TokenType::Number => Ok(Expr::Lit(Value::Num(parse_number(&tok)?))),
            TokenType::Percentage => {
                let raw = &tok.value[..tok.value.len() - 1];
                let v: f64 = raw.parse().map_err(|_| Error::Parse {
                    line: tok.line,
                    column: tok.column,
                    message: format!("invalid percentage {:?}", tok.value),
                })?;
                Ok(Expr::Lit(Value::Percent(v)))
            }
            TokenType::Dimension => {
                let (v, unit) = split_dimension(&tok)?;
                Ok(Expr::Lit(Value::Dimension(v, unit)))
            }
            TokenType::Str => Ok(Expr::Lit(Value::Str(strip_quotes(&tok.value)))),
            TokenType::Hash => {
                let color = Color::parse(&tok.value).ok_or_else(|| Error::Parse {
                    line: tok.line,
                    column: tok.column,
                    message: format!("invalid color {:?}", tok.value),
                })?;
                Ok(Expr::Lit(Value::Color(color)))
            }
            TokenType::AtKeyword => Ok(Expr::Var(tok.value[1..].to_string(), pos)),
            TokenType::Uri => {
                let inner = tok.value["url(".len()..tok.value.len() - 1].trim();
                Ok(Expr::Lit(Value::Url(strip_quotes(inner))))
            }
            TokenType::Function => {
                let name = tok.value[..tok.value.len() - 1].to_string();
                let mut args = Vec::new();
                if self.peek()?.ttype == TokenType::RParen {
                    self.advance()?;
                } else {
                    loop {
                        args.push(self.parse_sum()?);
                        let next = self.advance()?;
                        match next.ttype {
                            TokenType::Comma => continue,
                            TokenType::RParen => break,
                            _ => return Err(unexpected(&next, "',' or ')'")),
                        }
                    }
                }
                Ok(Expr::Call(name, args, pos))
            }
            TokenType::LParen => {
                let inner = self.parse_sum()?;
                self.expect(TokenType::RParen)?;
                Ok(inner)
            }
            TokenType::LBracket => {
                let name = self.advance()?;
                let field = match name.ttype {
                    TokenType::Ident => name.value.clone(),
                    TokenType::Str => strip_quotes(&name.value),
                    _ => return Err(unexpected(&name, "field name")),
                };
                self.expect(TokenType::RBracket)?;
                Ok(Expr::Lit(Value::Field(format!("[{field}]"))))
            }
            TokenType::Minus => {
                let inner = self.parse_factor()?;
                Ok(Expr::Neg(Box::new(inner), pos))
            }
            TokenType::Ident => match tok.value.as_str() {
                "true" => Ok(Expr::Lit(Value::Bool(true))),
                "false" => Ok(Expr::Lit(Value::Bool(false))),
                "null" => Ok(Expr::Lit(Value::Null)),
                other => Ok(Expr::Lit(Value::Str(other.to_string()))),
            },
            _ => Err(unexpected(&tok, "value")),
        }
    }
}

fn unexpected(tok: &Token, expected: &str) -> Error {
    Error::Parse {
        line: tok.line,
        column: tok.column,
        message: format!("unexpected {}, expected {}", tok, expected),
    }
}

fn parse_number(tok: &Token) -> Result<f64, Error> {
    tok.value.parse().map_err(|_| Error::Parse {
        line: tok.line,
        column: tok.column,
        message: format!("invalid number {:?}", tok.value),
    })
}

/// Split a dimension token like `12px` into its numeric value and unit.
fn split_dimension(tok: &Token) -> Result<(f64, String), Error> {
    let bytes = tok.value.as_bytes();
    let mut end = 0;
    if bytes.first() == Some(&b'-') {
        end += 1;
    }
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    let value: f64 = tok.value[..end].parse().map_err(|_| Error::Parse {
        line: tok.line,
        column: tok.column,
        message: format!("invalid dimension {:?}", tok.value),
    })?;
    Ok((value, tok.value[end..].to_string()))
}

fn strip_quotes(s: &str) -> String {
    let b = s.as_bytes();
    if b.len() >= 2 && (b[0] == b'\'' || b[0] == b'"') && b[b.len() - 1] == b[0] {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}
