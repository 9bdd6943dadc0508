//! Tokenizer and parser for the expression inside a `{{ ... }}` block.
//!
//! ```text
//! expr    := call | path | literal
//! path    := ident ("." ident)*
//! call    := ident "(" [expr ("," expr)*] ")"
//! literal := 'single quoted' | "double quoted" | number
//! ```

use analysis_core::TemplateError;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Path(Vec<String>),
    Call { name: String, args: Vec<Expr> },
    Literal(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Dot,
    Comma,
    LParen,
    RParen,
}

/// A piece of a template: literal text or an expression block.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Block { expr: Expr, offset: usize },
}

/// Split a template into literal text and parsed `{{ }}` blocks.
pub fn parse_template(template: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = template;
    let mut consumed = 0;

    while let Some(open) = rest.find("{{") {
        if open > 0 {
            segments.push(Segment::Text(rest[..open].to_string()));
        }
        let body_start = open + 2;
        let close = find_block_end(&rest[body_start..]).ok_or_else(|| TemplateError::Syntax {
            offset: consumed + open,
            message: "unterminated `{{` block".to_string(),
        })?;
        let body = &rest[body_start..body_start + close];
        let offset = consumed + body_start;
        let expr = parse_expr(body, offset)?;
        segments.push(Segment::Block { expr, offset });

        let next = body_start + close + 2;
        consumed += next;
        rest = &rest[next..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }
    Ok(segments)
}

/// Position of the closing `}}`, skipping over quoted strings.
fn find_block_end(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'}' && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

pub fn parse_expr(source: &str, offset: usize) -> Result<Expr, TemplateError> {
    let tokens = tokenize(source, offset)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        offset,
    };
    let expr = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

fn tokenize(source: &str, offset: usize) -> Result<Vec<(Token, usize)>, TemplateError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push((Token::Dot, offset + pos));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, offset + pos));
                i += 1;
            }
            '(' => {
                tokens.push((Token::LParen, offset + pos));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, offset + pos));
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some((_, ch)) if *ch == quote => break,
                        Some((_, ch)) => value.push(*ch),
                        None => {
                            return Err(TemplateError::Syntax {
                                offset: offset + pos,
                                message: "unterminated string literal".to_string(),
                            })
                        }
                    }
                    i += 1;
                }
                i += 1;
                tokens.push((Token::Str(value), offset + pos));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut value = String::from(c);
                i += 1;
                while let Some((_, ch)) = chars.get(i) {
                    if ch.is_ascii_digit() || *ch == '.' {
                        value.push(*ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                if value == "-" || value.parse::<f64>().is_err() {
                    return Err(TemplateError::Syntax {
                        offset: offset + pos,
                        message: format!("invalid number `{value}`"),
                    });
                }
                tokens.push((Token::Number(value), offset + pos));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut value = String::from(c);
                i += 1;
                while let Some((_, ch)) = chars.get(i) {
                    if ch.is_ascii_alphanumeric() || *ch == '_' {
                        value.push(*ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Ident(value), offset + pos));
            }
            other => {
                return Err(TemplateError::Syntax {
                    offset: offset + pos,
                    message: format!("unexpected character `{other}`"),
                })
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    offset: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn error(&self, message: &str) -> TemplateError {
        let offset = self
            .tokens
            .get(self.pos)
            .map_or(self.offset, |(_, pos)| *pos);
        TemplateError::Syntax {
            offset,
            message: message.to_string(),
        }
    }

    fn expr(&mut self) -> Result<Expr, TemplateError> {
        match self.next() {
            Some(Token::Str(s)) | Some(Token::Number(s)) => Ok(Expr::Literal(s)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    self.call(name)
                } else {
                    self.path(name)
                }
            }
            None => Err(self.error("empty expression")),
            Some(_) => {
                self.pos -= 1;
                Err(self.error("expected an attribute, call or literal"))
            }
        }
    }

    fn path(&mut self, first: String) -> Result<Expr, TemplateError> {
        let mut parts = vec![first];
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            match self.next() {
                Some(Token::Ident(part)) => parts.push(part),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected attribute name after `.`"));
                }
            }
        }
        Ok(Expr::Path(parts))
    }

    fn call(&mut self, name: String) -> Result<Expr, TemplateError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(Expr::Call { name, args });
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected `,` or `)`"));
                }
            }
        }
        Ok(Expr::Call { name, args })
    }
}
