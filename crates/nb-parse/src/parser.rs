//! Precedence-climbing expression parser plus the statement grammar from
//! spec.md §6:
//!
//! ```text
//! define T cell <expression> ;
//! define R on(<cell>) [<prio>] <assertions> : <command> ;
//! assert <term>=<cell> [, ...] ;
//! alert  <term>=<cell> [, ...] ;
//! show <term> ;
//! undefine <term> ;
//! ```

use crate::ast::{Assertion, BinaryOp, CellExpr, DefineBody, DelayKind, LiteralExpr, PlanStmt, RuleKind, Statement, UnaryOp};
use crate::time_ast::CalendarUnit;
use crate::time_parser::parse_time_expr;
use crate::tokenizer::{Token, TokenKind, tokenize};
use nb_common::NbError;

/// The single-letter calendar unit suffixes a plan step count takes (`3d`,
/// `1h`, `0s` for "forever"), distinct from the multi-letter spellings a
/// time-expression function uses inside `~( … )`.
fn calendar_unit_for_step_letter(letter: &str) -> Option<CalendarUnit> {
    Some(match letter {
        "y" => CalendarUnit::Year,
        "q" => CalendarUnit::Quarter,
        "n" => CalendarUnit::Month,
        "w" => CalendarUnit::Week,
        "d" => CalendarUnit::Day,
        "h" => CalendarUnit::Hour,
        "m" => CalendarUnit::Minute,
        "s" => CalendarUnit::Second,
        _ => return None,
    })
}

/// `(precedence, operator)` for an infix token, lowest-binds-loosest per
/// spec.md §6's precedence table. All operators here are left-associative.
fn infix_op(text: &str) -> Option<(u8, BinaryOp)> {
    Some(match text {
        "|" => (1, BinaryOp::Or),
        "||" => (1, BinaryOp::LazyOr),
        "|!&" => (1, BinaryOp::Xor),
        "!|" => (1, BinaryOp::Nor),
        "&" => (2, BinaryOp::And),
        "&&" => (2, BinaryOp::LazyAnd),
        "!&" => (2, BinaryOp::Nand),
        "?" => (2, BinaryOp::Default),
        "^" => (3, BinaryOp::FlipFlop),
        "then" => (3, BinaryOp::Then),
        "capture" => (3, BinaryOp::Capture),
        "=" => (4, BinaryOp::Eq),
        "<>" => (4, BinaryOp::Ne),
        "<" => (4, BinaryOp::Lt),
        "<=" => (4, BinaryOp::Le),
        ">" => (4, BinaryOp::Gt),
        ">=" => (4, BinaryOp::Ge),
        "~" => (4, BinaryOp::Match),
        "+" => (5, BinaryOp::Add),
        "-" => (5, BinaryOp::Sub),
        "*" => (6, BinaryOp::Mul),
        "/" => (6, BinaryOp::Div),
        _ => return None,
    })
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    src: String,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            src: String::new(),
        }
    }

    pub fn from_source(src: &str) -> Result<Self, NbError> {
        let tokens = tokenize(src).map_err(|e| NbError::syntax(e.message).at(location_of(e.pos)))?;
        Ok(Self {
            tokens,
            pos: 0,
            src: src.to_string(),
        })
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

    fn is_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn expect_text(&mut self, text: &str) -> Result<Token, NbError> {
        if self.peek().text == text {
            Ok(self.advance())
        } else {
            Err(NbError::syntax(format!(
                "expected '{}', found '{}'",
                text, self.peek().text
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String, NbError> {
        if self.peek().kind == TokenKind::Ident {
            Ok(self.advance().text)
        } else {
            Err(NbError::syntax(format!(
                "expected identifier, found '{}'",
                self.peek().text
            )))
        }
    }

    /// Parses one top-level statement terminated by `;`.
    pub fn parse_statement(&mut self) -> Result<Statement, NbError> {
        let keyword = self.expect_ident()?;
        let stmt = match keyword.as_str() {
            "define" => self.parse_define()?,
            "assert" => Statement::Assert(self.parse_assertion_list()?),
            "alert" => Statement::Alert(self.parse_assertion_list()?),
            "show" => Statement::Show(self.expect_ident()?),
            "undefine" => Statement::Undefine(self.expect_ident()?),
            other => return Err(NbError::syntax(format!("unknown statement keyword '{other}'"))),
        };
        self.expect_text(";")?;
        Ok(stmt)
    }

    fn parse_define(&mut self) -> Result<Statement, NbError> {
        let name = self.expect_ident()?;
        if self.peek().text == "cell" {
            self.advance();
            let expr = self.parse_expr()?;
            return Ok(Statement::Define {
                name,
                body: DefineBody::Cell(expr),
            });
        }
        let kind = match self.expect_ident()?.as_str() {
            "on" => RuleKind::On,
            "when" => RuleKind::When,
            "if" => RuleKind::If,
            other => return Err(NbError::syntax(format!("unknown rule kind '{other}'"))),
        };
        self.expect_text("(")?;
        let condition = self.parse_expr()?;
        self.expect_text(")")?;

        let mut priority: i8 = 0;
        if self.peek().text == "[" {
            self.advance();
            priority = self.parse_priority()?;
            self.expect_text("]")?;
        }

        if self.peek().text == "{" {
            let plan = self.parse_plan_body()?;
            return Ok(Statement::Define {
                name,
                body: DefineBody::Rule {
                    kind,
                    condition,
                    priority,
                    assertions: Vec::new(),
                    command: None,
                    plan: Some(plan),
                },
            });
        }

        let mut assertions = if self.peek().text == ":" || self.peek().text == ";" {
            Vec::new()
        } else {
            self.parse_assertion_list()?
        };

        // After the `:` the action tail is either an `assert`-prefixed
        // assertion list (folded into the same assertions the rule applies)
        // or a literal command string handed to the external command sink.
        let mut command = None;
        if self.peek().text == ":" {
            self.advance();
            if self.peek().text != ";" {
                if self.peek().kind == TokenKind::Ident && self.peek().text == "assert" {
                    self.advance();
                    assertions.extend(self.parse_assertion_list()?);
                } else {
                    command = Some(self.parse_command_text());
                }
            }
        }

        Ok(Statement::Define {
            name,
            body: DefineBody::Rule {
                kind,
                condition,
                priority,
                assertions,
                command,
                plan: None,
            },
        })
    }

    /// Parses a procedural rule-action body, `{ stmt, stmt, ... }`. The
    /// opening `{` is still unconsumed on entry; the closing `}` is
    /// consumed on return.
    fn parse_plan_body(&mut self) -> Result<Vec<PlanStmt>, NbError> {
        self.expect_text("{")?;
        let mut out = Vec::new();
        if self.peek().text == "}" {
            self.advance();
            return Ok(out);
        }
        loop {
            out.push(self.parse_plan_statement()?);
            if self.peek().text == "," {
                self.advance();
                continue;
            }
            break;
        }
        self.expect_text("}")?;
        Ok(out)
    }

    /// One statement of a plan body: a leading integer count dispatches to
    /// a loop, step, or align form; otherwise the statement is dispatched
    /// by its leading keyword/punctuation.
    fn parse_plan_statement(&mut self) -> Result<PlanStmt, NbError> {
        if self.peek().kind == TokenKind::Number {
            return self.parse_plan_timing_statement();
        }
        self.parse_plan_keyword_statement()
    }

    /// `N{ ... }` (loop), `Nu` (step), or `N(tcdef)` (align) — all begin
    /// with an integer count.
    fn parse_plan_timing_statement(&mut self) -> Result<PlanStmt, NbError> {
        let tok = self.advance();
        let count: i64 = tok
            .text
            .parse()
            .map_err(|_| NbError::syntax(format!("expected integer count, found '{}'", tok.text)))?;

        if self.peek().text == "{" {
            let body = self.parse_plan_body()?;
            return Ok(PlanStmt::Loop { count, body });
        }

        if self.peek().text == "(" {
            self.advance();
            let inner_tokens = self.collect_until_matching_paren()?;
            let time = parse_time_expr(&inner_tokens)?;
            return Ok(PlanStmt::Align { count, time });
        }

        if self.peek().kind == TokenKind::Ident {
            let letter = self.advance().text;
            let unit = calendar_unit_for_step_letter(&letter)
                .ok_or_else(|| NbError::syntax(format!("unknown plan step unit '{letter}'")))?;
            return Ok(PlanStmt::Step { count, unit });
        }

        Err(NbError::syntax(format!(
            "expected '{{', '(' or a step unit after plan count, found '{}'",
            self.peek().text
        )))
    }

    fn parse_plan_keyword_statement(&mut self) -> Result<PlanStmt, NbError> {
        match self.peek().text.as_str() {
            "on" | "onif" => {
                self.advance();
                self.expect_text("(")?;
                let condition = self.parse_expr()?;
                self.expect_text(")")?;
                Ok(PlanStmt::On { condition })
            }
            "if" => {
                self.advance();
                self.expect_text("(")?;
                let condition = self.parse_expr()?;
                self.expect_text(")")?;
                let then = Box::new(self.parse_plan_statement()?);
                let els = if self.peek().kind == TokenKind::Ident && self.peek().text == "else" {
                    self.advance();
                    Some(Box::new(self.parse_plan_statement()?))
                } else {
                    None
                };
                Ok(PlanStmt::If { condition, then, els })
            }
            "`" => {
                self.advance();
                let assertions = self.parse_assertion_list()?;
                self.expect_text(";")?;
                Ok(PlanStmt::Assert(assertions))
            }
            ":" => {
                self.advance();
                let cmd = self.parse_command_text();
                self.expect_text(";")?;
                Ok(PlanStmt::Command(cmd))
            }
            "/" => {
                self.advance();
                Ok(PlanStmt::SelfAssert(true))
            }
            "\\" => {
                self.advance();
                Ok(PlanStmt::SelfAssert(false))
            }
            "=" | "==" => {
                self.advance();
                let value = self.parse_expr()?;
                Ok(PlanStmt::Define { value })
            }
            other => Err(NbError::syntax(format!(
                "unexpected token '{other}' in rule plan body"
            ))),
        }
    }

    fn parse_priority(&mut self) -> Result<i8, NbError> {
        let mut sign = 1i32;
        if self.peek().text == "-" {
            self.advance();
            sign = -1;
        }
        let tok = self.advance();
        let v: i32 = tok
            .text
            .parse()
            .map_err(|_| NbError::syntax(format!("expected priority integer, found '{}'", tok.text)))?;
        let v = sign * v;
        if !(-128..=127).contains(&v) {
            return Err(NbError::syntax("priority out of 8-bit signed range"));
        }
        Ok(v as i8)
    }

    /// Consumes raw command text up to (not including) the statement's
    /// terminating `;`. The command sink interprets the text itself; the
    /// parser does not tokenize its contents beyond finding that boundary.
    fn parse_command_text(&mut self) -> String {
        let start = self.peek().start;
        let mut end = start;
        while !self.is_eof() && self.peek().text != ";" {
            end = self.advance().end;
        }
        if self.src.is_empty() {
            // Constructed directly from tokens (no source string retained):
            // fall back to whitespace-joined token text.
            return self.tokens[..self.pos]
                .iter()
                .skip_while(|t| t.start < start)
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
        }
        self.src[start..end].trim().to_string()
    }

    fn parse_assertion_list(&mut self) -> Result<Vec<Assertion>, NbError> {
        let mut out = Vec::new();
        loop {
            let term = self.expect_ident()?;
            self.expect_text("=")?;
            let value = self.parse_expr()?;
            out.push(Assertion { term, value });
            if self.peek().text == "," {
                self.advance();
                continue;
            }
            break;
        }
        Ok(out)
    }

    pub fn parse_expr(&mut self) -> Result<CellExpr, NbError> {
        self.parse_binary(1)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<CellExpr, NbError> {
        let mut left = self.parse_unary()?;
        loop {
            let text = self.peek().text.clone();
            let Some((prec, op)) = infix_op(&text) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            // `then`/`capture` are spelled as identifiers; only treat them
            // as operators, never as the start of a new primary.
            if self.peek().kind == TokenKind::Ident && !matches!(text.as_str(), "then" | "capture") {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            left = CellExpr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<CellExpr, NbError> {
        let text = self.peek().text.clone();
        let op = match text.as_str() {
            "!" => Some(UnaryOp::Not),
            "!!" => Some(UnaryOp::TrueOf),
            "?" => Some(UnaryOp::IsUnknown),
            "!?" => Some(UnaryOp::IsKnown),
            "-?" => Some(UnaryOp::AssumeFalse),
            "+?" => Some(UnaryOp::AssumeTrue),
            "-" => Some(UnaryOp::Negate),
            "~=" => Some(UnaryOp::Change),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(CellExpr::Unary(op, Box::new(inner)));
        }
        self.parse_delay_or_primary()
    }

    fn parse_delay_or_primary(&mut self) -> Result<CellExpr, NbError> {
        let primary = self.parse_primary()?;
        self.parse_delay_suffix(primary)
    }

    /// `cond ~^(schedule)`, `cond ~^!(schedule)`, `cond ~^?(schedule)`.
    fn parse_delay_suffix(&mut self, left: CellExpr) -> Result<CellExpr, NbError> {
        let kind = match self.peek().text.as_str() {
            "~^" => Some(DelayKind::True),
            "~^!" => Some(DelayKind::False),
            "~^?" => Some(DelayKind::Unknown),
            _ => None,
        };
        let Some(kind) = kind else {
            return Ok(left);
        };
        self.advance();
        self.expect_text("(")?;
        let schedule = self.parse_expr()?;
        self.expect_text(")")?;
        Ok(CellExpr::Delay(kind, Box::new(left), Box::new(schedule)))
    }

    fn parse_primary(&mut self) -> Result<CellExpr, NbError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Number => {
                self.advance();
                let v: f64 = tok
                    .text
                    .parse()
                    .map_err(|_| NbError::syntax(format!("bad number literal '{}'", tok.text)))?;
                Ok(CellExpr::Literal(LiteralExpr::Real(v)))
            }
            TokenKind::String => {
                self.advance();
                Ok(CellExpr::Literal(LiteralExpr::Str(tok.text)))
            }
            TokenKind::Ident => {
                self.advance();
                match tok.text.as_str() {
                    "true" => Ok(CellExpr::Literal(LiteralExpr::True)),
                    "false" => Ok(CellExpr::Literal(LiteralExpr::False)),
                    _ => Ok(CellExpr::Term(tok.text)),
                }
            }
            TokenKind::Punct => match tok.text.as_str() {
                "(" => {
                    self.advance();
                    let inner = self.parse_expr()?;
                    self.expect_text(")")?;
                    Ok(inner)
                }
                "$(" => {
                    self.advance();
                    let inner = self.parse_expr()?;
                    self.expect_text(")")?;
                    Ok(CellExpr::Eval(Box::new(inner)))
                }
                "~(" => {
                    self.advance();
                    let inner_tokens = self.collect_until_matching_paren()?;
                    let time = parse_time_expr(&inner_tokens)?;
                    Ok(CellExpr::Time(time))
                }
                _ => Err(NbError::syntax(format!("unexpected token '{}'", tok.text))),
            },
            TokenKind::Eof => Err(NbError::syntax("unexpected end of input")),
        }
    }

    /// After consuming the opening `(` of a `~(` group, collects the tokens
    /// up to (and consuming) the matching `)`, tracking nested parens so a
    /// time expression may itself contain parenthesized sub-groups.
    fn collect_until_matching_paren(&mut self) -> Result<Vec<Token>, NbError> {
        let mut depth = 0i32;
        let mut out = Vec::new();
        loop {
            if self.is_eof() {
                return Err(NbError::syntax("unterminated time expression"));
            }
            let t = self.peek().clone();
            if t.text == "(" {
                depth += 1;
            } else if t.text == ")" {
                if depth == 0 {
                    self.advance();
                    break;
                }
                depth -= 1;
            }
            out.push(self.advance());
        }
        out.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            start: 0,
            end: 0,
        });
        Ok(out)
    }
}

fn location_of(pos: usize) -> nb_common::SourceLocation {
    nb_common::SourceLocation::new(1, pos as u32)
}

/// Parses a single `;`-terminated statement from source text.
pub fn parse_statement(src: &str) -> Result<Statement, NbError> {
    let mut parser = Parser::from_source(src)?;
    parser.parse_statement()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, LiteralExpr};

    #[test]
    fn parses_arithmetic_precedence() {
        let expr = Parser::from_source("1+2*3").unwrap().parse_expr().unwrap();
        match expr {
            CellExpr::Binary(BinaryOp::Add, l, r) => {
                assert_eq!(*l, CellExpr::Literal(LiteralExpr::Real(1.0)));
                assert_eq!(*r, CellExpr::Binary(BinaryOp::Mul, Box::new(CellExpr::Literal(LiteralExpr::Real(2.0))), Box::new(CellExpr::Literal(LiteralExpr::Real(3.0)))));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_define_cell() {
        let stmt = parse_statement("define s cell a + b;").unwrap();
        match stmt {
            Statement::Define { name, body: DefineBody::Cell(CellExpr::Binary(BinaryOp::Add, ..)) } => {
                assert_eq!(name, "s");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_on_rule_with_priority() {
        let stmt = parse_statement("define r on(a=1)[5]: ;").unwrap();
        match stmt {
            Statement::Define { name, body: DefineBody::Rule { kind: RuleKind::On, priority: 5, .. } } => {
                assert_eq!(name, "r");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_assert_list() {
        let stmt = parse_statement("assert a=2, b=2;").unwrap();
        match stmt {
            Statement::Assert(list) => assert_eq!(list.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_time_expression() {
        let expr = Parser::from_source("~(h(8_17))").unwrap().parse_expr().unwrap();
        assert!(matches!(expr, CellExpr::Time(_)));
    }

    #[test]
    fn parses_lazy_and_right_associatively_by_precedence() {
        let expr = Parser::from_source("0 && 1 || 0").unwrap().parse_expr().unwrap();
        // `||` binds looser than `&&`, so the outer node is the Or.
        assert!(matches!(expr, CellExpr::Binary(BinaryOp::LazyOr, ..)));
    }

    #[test]
    fn parses_plan_body_with_loop_and_step() {
        let stmt = parse_statement("define r on(trigger) { 3{ 1h, `a=1; } };").unwrap();
        match stmt {
            Statement::Define { body: DefineBody::Rule { plan: Some(stmts), .. }, .. } => {
                assert_eq!(stmts.len(), 1);
                match &stmts[0] {
                    PlanStmt::Loop { count: 3, body } => {
                        assert_eq!(body.len(), 2);
                        assert!(matches!(body[0], PlanStmt::Step { count: 1, unit: CalendarUnit::Hour }));
                        assert!(matches!(body[1], PlanStmt::Assert(_)));
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_plan_body_with_on_and_if_else() {
        let stmt = parse_statement(
            "define r when(start) { on(ready), if(ok) `x=1; else `x=0; };",
        )
        .unwrap();
        match stmt {
            Statement::Define { body: DefineBody::Rule { plan: Some(stmts), .. }, .. } => {
                assert_eq!(stmts.len(), 2);
                assert!(matches!(stmts[0], PlanStmt::On { .. }));
                match &stmts[1] {
                    PlanStmt::If { els: Some(_), .. } => {}
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
