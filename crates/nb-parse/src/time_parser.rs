//! The time-expression parser: turns the token stream found inside
//! `~( … )` into a [`TimeExpr`] tree. A distinct recursive-descent pass
//! from the cell-expression parser because the time sub-language has its
//! own operator set (interval algebra, calendar functions, indexing) that
//! does not otherwise appear in cell expressions.

use crate::ast::CellExpr;
use crate::time_ast::{CalendarUnit, TimeExpr, TimeParam};
use crate::tokenizer::{Token, TokenKind};
use nb_common::NbError;

pub struct TimeParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TimeParser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_text(&mut self, text: &str) -> Result<(), NbError> {
        if self.peek().text == text {
            self.advance();
            Ok(())
        } else {
            Err(NbError::syntax(format!(
                "expected '{}', found '{}'",
                text, self.peek().text
            )))
        }
    }

    pub fn parse(mut self) -> Result<TimeExpr, NbError> {
        let expr = self.parse_or()?;
        if self.peek().kind != TokenKind::Eof {
            return Err(NbError::syntax(format!(
                "unexpected trailing token '{}' in time expression",
                self.peek().text
            )));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<TimeExpr, NbError> {
        let mut left = self.parse_and()?;
        loop {
            match self.peek().text.as_str() {
                "|" => {
                    self.advance();
                    let right = self.parse_and()?;
                    left = TimeExpr::Or(Box::new(left), Box::new(right));
                }
                "," => {
                    self.advance();
                    let right = self.parse_and()?;
                    left = TimeExpr::UnionPreserve(Box::new(left), Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<TimeExpr, NbError> {
        let mut left = self.parse_postfix()?;
        loop {
            match self.peek().text.as_str() {
                "&" => {
                    self.advance();
                    let right = self.parse_postfix()?;
                    left = TimeExpr::And(Box::new(left), Box::new(right));
                }
                "#" | "_" => {
                    self.advance();
                    let right = self.parse_postfix()?;
                    left = TimeExpr::Until(Box::new(left), Box::new(right));
                }
                "!" => {
                    self.advance();
                    let right = self.parse_postfix()?;
                    left = TimeExpr::Reject(Box::new(left), Box::new(right));
                }
                "=" | "." => {
                    self.advance();
                    let right = self.parse_postfix()?;
                    left = TimeExpr::Select(Box::new(left), Box::new(right));
                }
                "<" => {
                    self.advance();
                    let right = self.parse_postfix()?;
                    left = TimeExpr::StretchStart(Box::new(left), Box::new(right));
                }
                ">" => {
                    self.advance();
                    let right = self.parse_postfix()?;
                    left = TimeExpr::StretchStop(Box::new(left), Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> Result<TimeExpr, NbError> {
        let mut expr = self.parse_unary()?;
        while self.peek().text == "[" {
            self.advance();
            let k = self.parse_signed_int()?;
            self.expect_text("]")?;
            expr = TimeExpr::Index(Box::new(expr), k);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<TimeExpr, NbError> {
        if self.peek().text == "!" {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(TimeExpr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<TimeExpr, NbError> {
        if self.peek().text == "(" {
            self.advance();
            let e = self.parse_or()?;
            self.expect_text(")")?;
            return Ok(e);
        }
        if self.peek().kind == TokenKind::Ident {
            let name = self.advance().text;
            let unit = calendar_unit(&name).ok_or_else(|| {
                NbError::syntax(format!("unknown calendar function '{name}'"))
            })?;
            if self.peek().text == "(" {
                self.advance();
                let mut params = Vec::new();
                loop {
                    params.push(self.parse_time_param()?);
                    if self.peek().text == "," {
                        self.advance();
                        continue;
                    }
                    break;
                }
                self.expect_text(")")?;
                return Ok(TimeExpr::Complex(unit, params));
            }
            return Ok(TimeExpr::Simple(unit));
        }
        Err(NbError::syntax(format!(
            "unexpected token '{}' in time expression",
            self.peek().text
        )))
    }

    fn parse_time_param(&mut self) -> Result<TimeParam, NbError> {
        if self.peek().text == "*" {
            self.advance();
            return Ok(TimeParam::Wild);
        }
        let first = self.parse_signed_int()?;
        if self.peek().text == "_" {
            self.advance();
            let second = self.parse_signed_int()?;
            return Ok(TimeParam::Range(first, second));
        }
        Ok(TimeParam::Value(first))
    }

    fn parse_signed_int(&mut self) -> Result<i64, NbError> {
        let mut sign = 1i64;
        if self.peek().text == "-" {
            self.advance();
            sign = -1;
        }
        let tok = self.advance();
        let mut text = tok.text.clone();
        // Support `2014/06/03`-style composite date patterns by folding the
        // slash-separated fields into a single encoded value the calendar
        // layer decomposes; each field is individually parsed here and
        // re-joined so downstream casting sees one canonical integer.
        while self.peek().text == "/" {
            self.advance();
            let next = self.advance();
            text.push('/');
            text.push_str(&next.text);
        }
        if text.contains('/') {
            return encode_date_pattern(&text).map(|v| sign * v);
        }
        text.parse::<i64>()
            .map(|v| sign * v)
            .map_err(|_| NbError::syntax(format!("expected integer, found '{}'", tok.text)))
    }
}

/// Encode a `YYYY/MM/DD`-style pattern into `YYYY*10000 + MM*100 + DD` so the
/// calendar layer can decompose it without re-parsing text.
fn encode_date_pattern(text: &str) -> Result<i64, NbError> {
    let parts: Vec<&str> = text.split('/').collect();
    if parts.len() != 3 {
        return Err(NbError::syntax(format!("malformed date pattern '{text}'")));
    }
    let y: i64 = parts[0]
        .parse()
        .map_err(|_| NbError::syntax(format!("bad year in '{text}'")))?;
    let m: i64 = parts[1]
        .parse()
        .map_err(|_| NbError::syntax(format!("bad month in '{text}'")))?;
    let d: i64 = parts[2]
        .parse()
        .map_err(|_| NbError::syntax(format!("bad day in '{text}'")))?;
    Ok(y * 10000 + m * 100 + d)
}

fn calendar_unit(name: &str) -> Option<CalendarUnit> {
    Some(match name {
        "mi" => CalendarUnit::Millennium,
        "ce" => CalendarUnit::Century,
        "de" => CalendarUnit::Decade,
        "y" => CalendarUnit::Year,
        "q" => CalendarUnit::Quarter,
        "mo" => CalendarUnit::Month,
        "w" => CalendarUnit::Week,
        "d" => CalendarUnit::Day,
        "h" => CalendarUnit::Hour,
        "m" => CalendarUnit::Minute,
        "s" => CalendarUnit::Second,
        "we" => CalendarUnit::Weekend,
        "wd" => CalendarUnit::Weekday,
        "jan" => CalendarUnit::NamedMonth(0),
        "feb" => CalendarUnit::NamedMonth(1),
        "mar" => CalendarUnit::NamedMonth(2),
        "apr" => CalendarUnit::NamedMonth(3),
        "may" => CalendarUnit::NamedMonth(4),
        "jun" => CalendarUnit::NamedMonth(5),
        "jul" => CalendarUnit::NamedMonth(6),
        "aug" => CalendarUnit::NamedMonth(7),
        "sep" => CalendarUnit::NamedMonth(8),
        "oct" => CalendarUnit::NamedMonth(9),
        "nov" => CalendarUnit::NamedMonth(10),
        "dec" => CalendarUnit::NamedMonth(11),
        "sun" => CalendarUnit::NamedWeekday(0),
        "mon" => CalendarUnit::NamedWeekday(1),
        "tue" => CalendarUnit::NamedWeekday(2),
        "wed" => CalendarUnit::NamedWeekday(3),
        "thu" => CalendarUnit::NamedWeekday(4),
        "fri" => CalendarUnit::NamedWeekday(5),
        "sat" => CalendarUnit::NamedWeekday(6),
        _ => return None,
    })
}

/// Parses `~( … )`'s inner token slice (not including the outer parens,
/// which the cell-expression parser has already consumed).
pub fn parse_time_expr(tokens: &[Token]) -> Result<TimeExpr, NbError> {
    TimeParser::new(tokens).parse()
}

/// Wraps a parsed time expression as a `CellExpr`, the form the cell parser
/// embeds it in.
pub fn time_cell(expr: TimeExpr) -> CellExpr {
    CellExpr::Time(expr)
}
