//! Recursive-descent parser for s-expression source.
//!
//! Recognized forms: `<number>`, `#t`, `#f`, `<identifier>`, `'<datum>`,
//! `(quote <datum>)`, `(define <id> <expr>)`, `(define (<id> <id>...)
//! <expr>)`, `(set! <id> <expr>)`, `(begin <expr>...)`, `(if <p> <t> <e>)`,
//! `(let ((<id> <expr>)...) <expr>)`, `(letrec ...)`, `(lambda (<id>...)
//! <expr>)`, and applications.

use crate::ast::{Datum, Expr};
use crate::error::{Error, Result};
use crate::lexer::{Token, tokenize};
use std::rc::Rc;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Parser { tokens: tokenize(source), pos: 0 }
    }

    /// Parse a whole program: a sequence of top-level forms until EOF.
    pub fn parse_program(&mut self) -> Result<Vec<Expr>> {
        let mut forms = Vec::new();
        while !self.is_at_end() {
            forms.push(self.parse_expr()?);
        }
        Ok(forms)
    }

    /// Parse a single expression.
    pub fn parse_expr(&mut self) -> Result<Expr> {
        let tok = self.current().ok_or_else(|| {
            Error::Parse("unexpected end of input, expected an expression".to_string())
        })?;
        let text = tok.text.clone();

        if text == "#t" {
            self.pos += 1;
            return Ok(Expr::Boolean(true));
        }
        if text == "#f" {
            self.pos += 1;
            return Ok(Expr::Boolean(false));
        }
        if looks_numeric(&text) {
            self.pos += 1;
            let n = parse_number(&text)?;
            return Ok(Expr::Number(n));
        }
        match text.as_str() {
            "'" => {
                self.pos += 1;
                let datum = self.parse_datum()?;
                Ok(Expr::Quote(Rc::new(datum)))
            }
            "(" => {
                self.pos += 1;
                self.parse_list_form()
            }
            ")" => Err(self.unexpected("an expression", ")")),
            "." => Err(self.unexpected("an expression", ".")),
            _ if text.starts_with('#') => {
                Err(Error::Parse(format!("unknown literal '{}'", text)))
            }
            _ => {
                self.pos += 1;
                Ok(Expr::Var(text))
            }
        }
    }

    /// Parse the remainder of a parenthesized form (the `(` is consumed).
    fn parse_list_form(&mut self) -> Result<Expr> {
        let head = self
            .current()
            .ok_or_else(|| Error::Parse("unexpected end of input inside '('".to_string()))?
            .text
            .clone();
        match head.as_str() {
            "quote" => {
                self.pos += 1;
                let datum = self.parse_datum()?;
                self.expect(")")?;
                Ok(Expr::Quote(Rc::new(datum)))
            }
            "define" => {
                self.pos += 1;
                self.parse_define()
            }
            "set!" => {
                self.pos += 1;
                let name = self.parse_identifier()?;
                let expr = self.parse_expr()?;
                self.expect(")")?;
                Ok(Expr::SetBang { name, expr: Box::new(expr) })
            }
            "begin" => {
                self.pos += 1;
                let mut exprs = Vec::new();
                while !self.check(")") {
                    exprs.push(self.parse_expr()?);
                }
                self.expect(")")?;
                Ok(Expr::Begin(exprs))
            }
            "if" => {
                self.pos += 1;
                let pred = self.parse_expr()?;
                let then = self.parse_expr()?;
                let els = self.parse_expr()?;
                self.expect(")")?;
                Ok(Expr::If {
                    pred: Box::new(pred),
                    then: Box::new(then),
                    els: Box::new(els),
                })
            }
            "let" => {
                self.pos += 1;
                let (bindings, body) = self.parse_let_like()?;
                Ok(Expr::Let { bindings, body: Box::new(body) })
            }
            "letrec" => {
                self.pos += 1;
                let (bindings, body) = self.parse_let_like()?;
                Ok(Expr::LetRec { bindings, body: Box::new(body) })
            }
            "lambda" => {
                self.pos += 1;
                self.expect("(")?;
                let mut params = Vec::new();
                while !self.check(")") {
                    params.push(self.parse_identifier()?);
                }
                self.expect(")")?;
                let body = self.parse_expr()?;
                self.expect(")")?;
                Ok(Expr::Lambda {
                    params: Rc::new(params),
                    body: Rc::new(body),
                })
            }
            ")" => Err(Error::Parse("empty application '()'".to_string())),
            _ => {
                // application
                let operator = self.parse_expr()?;
                let mut operands = Vec::new();
                while !self.check(")") {
                    operands.push(self.parse_expr()?);
                }
                self.expect(")")?;
                Ok(Expr::Apply { operator: Box::new(operator), operands })
            }
        }
    }

    /// `(define <id> <expr>)` or `(define (<id> <id>...) <expr>)`.
    fn parse_define(&mut self) -> Result<Expr> {
        if self.check("(") {
            self.pos += 1;
            let name = self.parse_identifier()?;
            let mut params = Vec::new();
            while !self.check(")") {
                params.push(self.parse_identifier()?);
            }
            self.expect(")")?;
            let body = self.parse_expr()?;
            self.expect(")")?;
            Ok(Expr::Define {
                name,
                body: Box::new(Expr::Lambda {
                    params: Rc::new(params),
                    body: Rc::new(body),
                }),
            })
        } else {
            let name = self.parse_identifier()?;
            let body = self.parse_expr()?;
            self.expect(")")?;
            Ok(Expr::Define { name, body: Box::new(body) })
        }
    }

    /// Shared shape of let and letrec after the keyword.
    fn parse_let_like(&mut self) -> Result<(Vec<(String, Expr)>, Expr)> {
        self.expect("(")?;
        let mut bindings = Vec::new();
        while !self.check(")") {
            self.expect("(")?;
            let name = self.parse_identifier()?;
            let init = self.parse_expr()?;
            self.expect(")")?;
            bindings.push((name, init));
        }
        self.expect(")")?;
        let body = self.parse_expr()?;
        self.expect(")")?;
        Ok((bindings, body))
    }

    /// Parse a quoted datum.
    pub fn parse_datum(&mut self) -> Result<Datum> {
        let tok = self.current().ok_or_else(|| {
            Error::Parse("unexpected end of input, expected a datum".to_string())
        })?;
        let text = tok.text.clone();

        if text == "#t" {
            self.pos += 1;
            return Ok(Datum::Boolean(true));
        }
        if text == "#f" {
            self.pos += 1;
            return Ok(Datum::Boolean(false));
        }
        if looks_numeric(&text) {
            self.pos += 1;
            return Ok(Datum::Number(parse_number(&text)?));
        }
        match text.as_str() {
            "(" => {
                self.pos += 1;
                let mut items = Vec::new();
                let mut tail = Datum::Nil;
                loop {
                    if self.check(")") {
                        break;
                    }
                    if self.check(".") {
                        if items.is_empty() {
                            return Err(self.unexpected("a datum", "."));
                        }
                        self.pos += 1;
                        tail = self.parse_datum()?;
                        break;
                    }
                    if self.is_at_end() {
                        return Err(Error::Parse(
                            "unexpected end of input inside quoted list".to_string(),
                        ));
                    }
                    items.push(self.parse_datum()?);
                }
                self.expect(")")?;
                Ok(items.into_iter().rev().fold(tail, |cdr, car| {
                    Datum::Pair(Rc::new(car), Rc::new(cdr))
                }))
            }
            ")" => Err(self.unexpected("a datum", ")")),
            "." => Err(self.unexpected("a datum", ".")),
            "'" => Err(Error::Parse("nested quote inside a datum".to_string())),
            _ if text.starts_with('#') => {
                Err(Error::Parse(format!("unknown literal '{}'", text)))
            }
            _ => {
                self.pos += 1;
                Ok(Datum::Symbol(text))
            }
        }
    }

    fn parse_identifier(&mut self) -> Result<String> {
        let tok = self.current().ok_or_else(|| {
            Error::Parse("unexpected end of input, expected an identifier".to_string())
        })?;
        let text = tok.text.clone();
        let bad_start = matches!(
            text.chars().next(),
            Some('(') | Some(')') | Some('\'') | Some('#') | Some('.')
        );
        if bad_start || looks_numeric(&text) {
            return Err(self.unexpected("an identifier", &text));
        }
        self.pos += 1;
        Ok(text)
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, text: &str) -> bool {
        self.current().is_some_and(|t| t.text == text)
    }

    fn expect(&mut self, text: &str) -> Result<()> {
        if self.check(text) {
            self.pos += 1;
            Ok(())
        } else {
            let got = self
                .current()
                .map(|t| t.text.clone())
                .unwrap_or_else(|| "end of input".to_string());
            Err(self.unexpected(&format!("\"{}\"", text), &got))
        }
    }

    fn unexpected(&self, expected: &str, got: &str) -> Error {
        match self.current() {
            Some(tok) => Error::Parse(format!(
                "expected {}, got '{}' at line {}, column {}",
                expected,
                got,
                tok.line + 1,
                tok.column + 1
            )),
            None => Error::Parse(format!("expected {}, got end of input", expected)),
        }
    }
}

fn looks_numeric(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

fn parse_number(text: &str) -> Result<i64> {
    text.parse::<i64>()
        .map_err(|_| Error::Parse(format!("not a valid number: '{}'", text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(src: &str) -> Expr {
        let mut p = Parser::new(src);
        let e = p.parse_expr().expect("parse failed");
        assert!(p.is_at_end(), "trailing tokens after {}", src);
        e
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_one("42"), Expr::Number(42));
        assert_eq!(parse_one("-7"), Expr::Number(-7));
        assert_eq!(parse_one("#t"), Expr::Boolean(true));
        assert_eq!(parse_one("#f"), Expr::Boolean(false));
        assert_eq!(parse_one("foo"), Expr::Var("foo".into()));
    }

    #[test]
    fn test_apply() {
        match parse_one("(+ 1 2)") {
            Expr::Apply { operator, operands } => {
                assert_eq!(*operator, Expr::Var("+".into()));
                assert_eq!(operands, vec![Expr::Number(1), Expr::Number(2)]);
            }
            other => panic!("expected apply, got {:?}", other),
        }
    }

    #[test]
    fn test_if_and_begin() {
        match parse_one("(if #t 1 2)") {
            Expr::If { pred, then, els } => {
                assert_eq!(*pred, Expr::Boolean(true));
                assert_eq!(*then, Expr::Number(1));
                assert_eq!(*els, Expr::Number(2));
            }
            other => panic!("expected if, got {:?}", other),
        }
        assert_eq!(parse_one("(begin)"), Expr::Begin(vec![]));
    }

    #[test]
    fn test_define_sugar() {
        match parse_one("(define (add1 n) (+ n 1))") {
            Expr::Define { name, body } => {
                assert_eq!(name, "add1");
                match *body {
                    Expr::Lambda { params, .. } => assert_eq!(*params, vec!["n".to_string()]),
                    other => panic!("expected lambda body, got {:?}", other),
                }
            }
            other => panic!("expected define, got {:?}", other),
        }
    }

    #[test]
    fn test_let_bindings() {
        match parse_one("(let ((x 1) (y 2)) (+ x y))") {
            Expr::Let { bindings, .. } => {
                assert_eq!(bindings.len(), 2);
                assert_eq!(bindings[0].0, "x");
                assert_eq!(bindings[1].1, Expr::Number(2));
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn test_lambda_params() {
        match parse_one("(lambda (a b c) a)") {
            Expr::Lambda { params, .. } => {
                assert_eq!(*params, vec!["a".to_string(), "b".into(), "c".into()]);
            }
            other => panic!("expected lambda, got {:?}", other),
        }
    }

    #[test]
    fn test_quote_forms() {
        let q1 = parse_one("'(1 2)");
        let q2 = parse_one("(quote (1 2))");
        assert_eq!(q1, q2);
        match q1 {
            Expr::Quote(d) => assert_eq!(*d, Datum::list(vec![Datum::Number(1), Datum::Number(2)])),
            other => panic!("expected quote, got {:?}", other),
        }
    }

    #[test]
    fn test_dotted_datum() {
        match parse_one("'(1 . 2)") {
            Expr::Quote(d) => match &*d {
                Datum::Pair(car, cdr) => {
                    assert_eq!(**car, Datum::Number(1));
                    assert_eq!(**cdr, Datum::Number(2));
                }
                other => panic!("expected pair, got {:?}", other),
            },
            other => panic!("expected quote, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_list_datum() {
        match parse_one("'()") {
            Expr::Quote(d) => assert_eq!(*d, Datum::Nil),
            other => panic!("expected quote, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(Parser::new("(").parse_expr().is_err());
        assert!(Parser::new(")").parse_expr().is_err());
        assert!(Parser::new("()").parse_expr().is_err());
        assert!(Parser::new("(if 1 2)").parse_expr().is_err());
        assert!(Parser::new("(set! 3 4)").parse_expr().is_err());
        assert!(Parser::new("(lambda (1) 1)").parse_expr().is_err());
        assert!(Parser::new("#q").parse_expr().is_err());
    }

    #[test]
    fn test_program_sequence() {
        let mut p = Parser::new("(define x 1) (+ x 2)");
        let forms = p.parse_program().unwrap();
        assert_eq!(forms.len(), 2);
    }

    #[test]
    fn test_error_carries_position() {
        let err = Parser::new("(if 1 2\n  )").parse_expr().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 2"), "message was: {}", msg);
    }
}
