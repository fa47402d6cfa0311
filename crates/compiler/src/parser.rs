//! Parser for Lama source
//!
//! Hand-written tokenizer plus recursive descent. The unit
//!
//! ```text
//! var x;
//! fun f (n) { n + 1 }
//! x := read ();
//! write (f (x))
//! ```
//!
//! parses to a single `Scope` holding the definitions and the statement
//! sequence. Lama is expression-oriented: after parsing, a normalization
//! pass decides for every node whether its value is consumed (value
//! position) or dropped (statement position) and inserts `Ignore` / a
//! trailing `0` accordingly, so that the compiler can rely on every
//! function body leaving exactly one value.

use crate::ast::{BinOp, Definition, Expr, Name, Span};

const KEYWORDS: &[&str] = &[
    "skip", "if", "then", "elif", "else", "fi", "while", "do", "od", "for", "repeat", "until",
    "var", "val", "fun",
];

/// Multi-character symbols first so the tokenizer takes the longest match.
const SYMBOLS: &[&str] = &[
    ":=", "==", "!=", "<=", ">=", "&&", "!!", "||", "(", ")", "[", "]", "{", "}", ",", ";", "=",
    "<", ">", "+", "-", "*", "/", "%", "^",
];

#[derive(Debug, Clone, PartialEq)]
enum TokKind {
    Ident(String),
    Num(i32),
    Str(String),
    Sym(&'static str),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokKind,
    line: usize,
    column: usize,
}

impl Token {
    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn describe(&self) -> String {
        match &self.kind {
            TokKind::Ident(s) => format!("'{}'", s),
            TokKind::Num(n) => format!("'{}'", n),
            TokKind::Str(_) => "string literal".to_string(),
            TokKind::Sym(s) => format!("'{}'", s),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 0;
    let mut col = 0;

    // Advance over one char, maintaining the position counters.
    macro_rules! bump {
        () => {{
            if chars[i] == '\n' {
                line += 1;
                col = 0;
            } else {
                col += 1;
            }
            i += 1;
        }};
    }

    'outer: while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            bump!();
            continue;
        }

        // Line comment: -- to end of line
        if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                bump!();
            }
            continue;
        }

        // Block comment: (* ... *), nestable
        if c == '(' && chars.get(i + 1) == Some(&'*') {
            let (start_line, start_col) = (line, col);
            bump!();
            bump!();
            let mut depth = 1;
            while depth > 0 {
                if i >= chars.len() {
                    return Err(format!(
                        "unterminated comment starting at {}",
                        Span::new(start_line, start_col)
                    ));
                }
                if chars[i] == '(' && chars.get(i + 1) == Some(&'*') {
                    depth += 1;
                    bump!();
                    bump!();
                } else if chars[i] == '*' && chars.get(i + 1) == Some(&')') {
                    depth -= 1;
                    bump!();
                    bump!();
                } else {
                    bump!();
                }
            }
            continue;
        }

        // String literal; "" inside denotes a single quote character
        if c == '"' {
            let (start_line, start_col) = (line, col);
            bump!();
            let mut text = String::new();
            loop {
                if i >= chars.len() {
                    return Err(format!(
                        "unterminated string literal starting at {}",
                        Span::new(start_line, start_col)
                    ));
                }
                if chars[i] == '"' {
                    if chars.get(i + 1) == Some(&'"') {
                        text.push('"');
                        bump!();
                        bump!();
                        continue;
                    }
                    bump!();
                    break;
                }
                text.push(chars[i]);
                bump!();
            }
            tokens.push(Token {
                kind: TokKind::Str(text),
                line: start_line,
                column: start_col,
            });
            continue;
        }

        if c.is_ascii_digit() {
            let (start_line, start_col) = (line, col);
            let mut text = String::new();
            while i < chars.len() && chars[i].is_ascii_digit() {
                text.push(chars[i]);
                bump!();
            }
            let n: i32 = text
                .parse()
                .map_err(|_| format!("integer literal '{}' out of range at {}", text, Span::new(start_line, start_col)))?;
            tokens.push(Token {
                kind: TokKind::Num(n),
                line: start_line,
                column: start_col,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let (start_line, start_col) = (line, col);
            let mut text = String::new();
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                text.push(chars[i]);
                bump!();
            }
            tokens.push(Token {
                kind: TokKind::Ident(text),
                line: start_line,
                column: start_col,
            });
            continue;
        }

        for sym in SYMBOLS {
            if chars[i..].starts_with(&sym.chars().collect::<Vec<_>>()[..]) {
                tokens.push(Token {
                    kind: TokKind::Sym(sym),
                    line,
                    column: col,
                });
                for _ in 0..sym.len() {
                    bump!();
                }
                continue 'outer;
            }
        }

        return Err(format!(
            "unexpected character '{}' at {}",
            c,
            Span::new(line, col)
        ));
    }

    Ok(tokens)
}

/// Position a subtree in statement (`value == false`) or value position.
///
/// Descends through sequencing, branches, scopes and loop bodies; inserts
/// `Ignore` around unconsumed values and appends `0` to statements whose
/// value is demanded.
fn in_position(e: Expr, value: bool) -> Expr {
    match e {
        Expr::Seq(a, b) => Expr::Seq(
            Box::new(in_position(*a, false)),
            Box::new(in_position(*b, value)),
        ),
        Expr::If(c, t, f) => Expr::If(
            c,
            Box::new(in_position(*t, value)),
            Box::new(in_position(*f, value)),
        ),
        Expr::Scope(defs, b) => Expr::Scope(defs, Box::new(in_position(*b, value))),
        Expr::While(c, b) => {
            let node = Expr::While(c, Box::new(in_position(*b, false)));
            pad_statement(node, value)
        }
        Expr::DoWhile(b, c) => {
            let node = Expr::DoWhile(Box::new(in_position(*b, false)), c);
            pad_statement(node, value)
        }
        e @ (Expr::Skip | Expr::Ignore(_)) => pad_statement(e, value),
        e => {
            if value {
                e
            } else {
                Expr::Ignore(Box::new(e))
            }
        }
    }
}

fn pad_statement(e: Expr, value: bool) -> Expr {
    if value {
        Expr::Seq(Box::new(e), Box::new(Expr::Const(0)))
    } else {
        e
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, String> {
        Ok(Parser {
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    /// Parse a whole compilation unit.
    pub fn parse(&mut self) -> Result<Expr, String> {
        let body = self.parse_scope(false)?;
        if let Some(tok) = self.tokens.get(self.pos) {
            return Err(format!(
                "expected end of input, got {} at {}",
                tok.describe(),
                tok.span()
            ));
        }
        Ok(body)
    }

    // -- token primitives --------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn check_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Some(Token { kind: TokKind::Sym(s), .. }) if *s == sym)
    }

    fn check_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token { kind: TokKind::Ident(s), .. }) if s == kw)
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if self.check_sym(sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.check_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), String> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.expectation(&format!("'{}'", sym)))
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<(), String> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.expectation(&format!("'{}'", kw)))
        }
    }

    fn expect_name(&mut self) -> Result<Name, String> {
        match self.peek() {
            Some(Token {
                kind: TokKind::Ident(s),
                ..
            }) if !KEYWORDS.contains(&s.as_str()) => {
                let tok = self.advance().unwrap();
                let span = tok.span();
                let TokKind::Ident(id) = tok.kind else {
                    unreachable!()
                };
                Ok(Name::at(id, span))
            }
            _ => Err(self.expectation("a name")),
        }
    }

    fn expectation(&self, what: &str) -> String {
        match self.peek() {
            Some(tok) => format!("expected {}, got {} at {}", what, tok.describe(), tok.span()),
            None => format!("expected {}, got end of input", what),
        }
    }

    // -- definitions and sequences -----------------------------------------

    /// `defs seq`, normalized for value (`true`) or statement position.
    fn parse_scope(&mut self, value: bool) -> Result<Expr, String> {
        let (defs, inits) = self.parse_definitions()?;
        let mut body = if self.at_sequence_end() {
            Expr::Skip
        } else {
            self.parse_seq()?
        };
        // var initializers run before the body
        for init in inits.into_iter().rev() {
            body = Expr::Seq(Box::new(init), Box::new(body));
        }
        Ok(Expr::Scope(defs, Box::new(in_position(body, value))))
    }

    fn parse_definitions(&mut self) -> Result<(Vec<Definition>, Vec<Expr>), String> {
        let mut defs = Vec::new();
        let mut inits = Vec::new();
        loop {
            if self.eat_kw("var") {
                let mut names = Vec::new();
                loop {
                    let name = self.expect_name()?;
                    if self.eat_sym("=") {
                        let e = self.parse_expr()?;
                        inits.push(Expr::Set(name.clone(), Box::new(e)));
                    }
                    names.push(name);
                    if !self.eat_sym(",") {
                        break;
                    }
                }
                self.expect_sym(";")?;
                defs.push(Definition::Vars(names));
            } else if self.eat_kw("val") {
                let mut names = Vec::new();
                loop {
                    names.push(self.expect_name()?);
                    if !self.eat_sym(",") {
                        break;
                    }
                }
                self.expect_sym(";")?;
                defs.push(Definition::Vals(names));
            } else if self.eat_kw("fun") {
                let name = self.expect_name()?;
                self.expect_sym("(")?;
                let mut args = Vec::new();
                if !self.check_sym(")") {
                    loop {
                        args.push(self.expect_name()?);
                        if !self.eat_sym(",") {
                            break;
                        }
                    }
                }
                self.expect_sym(")")?;
                self.expect_sym("{")?;
                let body = self.parse_scope(true)?;
                self.expect_sym("}")?;
                defs.push(Definition::Fun { name, args, body });
            } else {
                break;
            }
        }
        Ok((defs, inits))
    }

    fn at_sequence_end(&self) -> bool {
        match self.peek() {
            None => true,
            Some(Token {
                kind: TokKind::Sym(s),
                ..
            }) => matches!(*s, ")" | "}"),
            _ => false,
        }
    }

    /// `item (';' item)*`, right-folded into `Seq`.
    fn parse_seq(&mut self) -> Result<Expr, String> {
        let first = self.parse_item()?;
        if self.eat_sym(";") {
            let rest = self.parse_seq()?;
            Ok(Expr::Seq(Box::new(first), Box::new(rest)))
        } else {
            Ok(first)
        }
    }

    /// A sequence element: a control statement or an expression.
    fn parse_item(&mut self) -> Result<Expr, String> {
        if self.eat_kw("skip") {
            return Ok(Expr::Skip);
        }
        if self.check_kw("if") {
            return self.parse_if();
        }
        if self.eat_kw("while") {
            let cond = self.parse_expr()?;
            self.expect_kw("do")?;
            let body = self.parse_seq()?;
            self.expect_kw("od")?;
            return Ok(Expr::While(Box::new(cond), Box::new(body)));
        }
        if self.eat_kw("for") {
            let init = self.parse_item()?;
            self.expect_sym(",")?;
            let cond = self.parse_expr()?;
            self.expect_sym(",")?;
            let step = self.parse_item()?;
            self.expect_kw("do")?;
            let body = self.parse_seq()?;
            self.expect_kw("od")?;
            let loop_body = Expr::Seq(Box::new(body), Box::new(step));
            return Ok(Expr::Seq(
                Box::new(init),
                Box::new(Expr::While(Box::new(cond), Box::new(loop_body))),
            ));
        }
        if self.eat_kw("repeat") {
            let body = self.parse_seq()?;
            self.expect_kw("until")?;
            let cond = self.parse_expr()?;
            // repeat while the exit condition is still false
            return Ok(Expr::DoWhile(
                Box::new(body),
                Box::new(Expr::Binop(
                    BinOp::Eq,
                    Box::new(cond),
                    Box::new(Expr::Const(0)),
                )),
            ));
        }
        self.parse_expr()
    }

    fn parse_if(&mut self) -> Result<Expr, String> {
        self.expect_kw("if")?;
        let e = self.parse_if_tail()?;
        self.expect_kw("fi")?;
        Ok(e)
    }

    // `cond then seq (elif ... | else seq)?` without the closing `fi`
    fn parse_if_tail(&mut self) -> Result<Expr, String> {
        let cond = self.parse_expr()?;
        self.expect_kw("then")?;
        let then_branch = self.parse_seq()?;
        let else_branch = if self.eat_kw("elif") {
            self.parse_if_tail()?
        } else if self.eat_kw("else") {
            self.parse_seq()?
        } else {
            Expr::Skip
        };
        Ok(Expr::If(
            Box::new(cond),
            Box::new(then_branch),
            Box::new(else_branch),
        ))
    }

    // -- expressions -------------------------------------------------------

    /// Full expression, including assignment (right-associative).
    fn parse_expr(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_binary(0)?;
        if self.check_sym(":=") {
            let assign_span = self.peek().unwrap().span();
            self.pos += 1;
            let rhs = self.parse_expr()?;
            return match lhs {
                Expr::Var(name) => Ok(Expr::Set(name, Box::new(rhs))),
                other => match other.into_reference() {
                    Some(reference) => Ok(Expr::Assn(Box::new(reference), Box::new(rhs))),
                    None => Err(format!("invalid assignment target at {}", assign_span)),
                },
            };
        }
        Ok(lhs)
    }

    fn parse_binary(&mut self, level: usize) -> Result<Expr, String> {
        const LEVELS: &[&[(&str, BinOp)]] = &[
            &[("!!", BinOp::Or), ("||", BinOp::Or)],
            &[("&&", BinOp::And)],
            &[("^", BinOp::Xor)],
            &[
                ("==", BinOp::Eq),
                ("!=", BinOp::Neq),
                ("<=", BinOp::Leq),
                (">=", BinOp::Geq),
                ("<", BinOp::Lt),
                (">", BinOp::Gt),
            ],
            &[("+", BinOp::Plus), ("-", BinOp::Minus)],
            &[("*", BinOp::Times), ("/", BinOp::Div), ("%", BinOp::Mod)],
        ];

        if level == LEVELS.len() {
            return self.parse_postfix();
        }
        let mut lhs = self.parse_binary(level + 1)?;
        'scan: loop {
            for (sym, op) in LEVELS[level] {
                if self.eat_sym(sym) {
                    let rhs = self.parse_binary(level + 1)?;
                    lhs = Expr::Binop(*op, Box::new(lhs), Box::new(rhs));
                    continue 'scan;
                }
            }
            return Ok(lhs);
        }
    }

    /// Primary expression followed by any number of `[index]` selections.
    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut e = self.parse_primary()?;
        while self.eat_sym("[") {
            let index = self.parse_expr()?;
            self.expect_sym("]")?;
            e = Expr::Elem(Box::new(e), Box::new(index));
        }
        Ok(e)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token {
                kind: TokKind::Num(_),
                ..
            }) => {
                let tok = self.advance().unwrap();
                let TokKind::Num(n) = tok.kind else {
                    unreachable!()
                };
                Ok(Expr::Const(n))
            }
            Some(Token {
                kind: TokKind::Str(_),
                ..
            }) => {
                let tok = self.advance().unwrap();
                let TokKind::Str(s) = tok.kind else {
                    unreachable!()
                };
                Ok(Expr::String(s))
            }
            Some(Token {
                kind: TokKind::Sym("-"),
                ..
            }) => {
                self.pos += 1;
                match self.parse_postfix()? {
                    Expr::Const(n) => Ok(Expr::Const(-n)),
                    e => Ok(Expr::Binop(
                        BinOp::Minus,
                        Box::new(Expr::Const(0)),
                        Box::new(e),
                    )),
                }
            }
            Some(Token {
                kind: TokKind::Sym("("),
                ..
            }) => {
                self.pos += 1;
                let e = if self.check_kw("var") || self.check_kw("val") || self.check_kw("fun") {
                    self.parse_scope(true)?
                } else {
                    self.parse_seq()?
                };
                self.expect_sym(")")?;
                Ok(e)
            }
            Some(Token {
                kind: TokKind::Sym("["),
                ..
            }) => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.check_sym("]") {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat_sym(",") {
                            break;
                        }
                    }
                }
                self.expect_sym("]")?;
                Ok(Expr::Array(items))
            }
            Some(Token {
                kind: TokKind::Ident(s),
                ..
            }) if !KEYWORDS.contains(&s.as_str()) => {
                let is_tag = s.chars().next().is_some_and(char::is_uppercase);
                let name = self.expect_name()?;
                if is_tag {
                    let mut items = Vec::new();
                    if self.eat_sym("(") {
                        if !self.check_sym(")") {
                            loop {
                                items.push(self.parse_expr()?);
                                if !self.eat_sym(",") {
                                    break;
                                }
                            }
                        }
                        self.expect_sym(")")?;
                    }
                    return Ok(Expr::Sexp(name.id, items));
                }
                if self.eat_sym("(") {
                    let mut args = Vec::new();
                    if !self.check_sym(")") {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat_sym(",") {
                                break;
                            }
                        }
                    }
                    self.expect_sym(")")?;
                    return Ok(Expr::Call(name, args));
                }
                Ok(Expr::Var(name))
            }
            _ => Err(self.expectation("an expression")),
        }
    }
}

/// Parse a complete source text into its unit scope.
pub fn parse(source: &str) -> Result<Expr, String> {
    Parser::new(source)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(unit: Expr) -> Expr {
        match unit {
            Expr::Scope(_, body) => *body,
            e => panic!("expected unit scope, got {:?}", e),
        }
    }

    #[test]
    fn test_precedence() {
        let unit = parse("write (1 + 2 * 3)").unwrap();
        let Expr::Ignore(call) = body(unit) else {
            panic!("statement call should be ignored")
        };
        let Expr::Call(name, args) = *call else {
            panic!("expected call")
        };
        assert_eq!(name.id, "write");
        assert_eq!(
            args[0],
            Expr::Binop(
                BinOp::Plus,
                Box::new(Expr::Const(1)),
                Box::new(Expr::Binop(
                    BinOp::Times,
                    Box::new(Expr::Const(2)),
                    Box::new(Expr::Const(3)),
                )),
            )
        );
    }

    #[test]
    fn test_assignment_forms() {
        let unit = parse("var a; a := 1; a[0] := 2").unwrap();
        let Expr::Scope(defs, seq) = unit else {
            panic!()
        };
        assert_eq!(defs.len(), 1);
        let Expr::Seq(first, rest) = *seq else { panic!() };
        assert!(matches!(*first, Expr::Ignore(ref e) if matches!(**e, Expr::Set(_, _))));
        assert!(
            matches!(*rest, Expr::Ignore(ref e) if matches!(**e, Expr::Assn(ref l, _) if matches!(**l, Expr::ElemRef(_, _))))
        );
    }

    #[test]
    fn test_statement_if_defaults_to_skip() {
        let unit = parse("if 1 then skip fi").unwrap();
        let Expr::If(_, t, f) = body(unit) else {
            panic!()
        };
        assert_eq!(*t, Expr::Skip);
        assert_eq!(*f, Expr::Skip);
    }

    #[test]
    fn test_value_if_pads_missing_else() {
        let unit = parse("fun f () { if 1 then 2 fi } skip").unwrap();
        let Expr::Scope(defs, _) = unit else { panic!() };
        let Definition::Fun { body, .. } = &defs[0] else {
            panic!()
        };
        let Expr::Scope(_, fun_body) = body else {
            panic!()
        };
        let Expr::If(_, t, f) = &**fun_body else {
            panic!()
        };
        assert_eq!(**t, Expr::Const(2));
        // Skip alone produces no value; the parser pads it with 0.
        assert_eq!(
            **f,
            Expr::Seq(Box::new(Expr::Skip), Box::new(Expr::Const(0)))
        );
    }

    #[test]
    fn test_elif_chain() {
        let unit = parse("if 1 then skip elif 2 then skip else skip fi").unwrap();
        let Expr::If(_, _, f) = body(unit) else {
            panic!()
        };
        assert!(matches!(*f, Expr::If(_, _, _)));
    }

    #[test]
    fn test_for_desugars_to_while() {
        let unit = parse("var i; for i := 0, i < 3, i := i + 1 do skip od").unwrap();
        let Expr::Scope(_, seq) = unit else { panic!() };
        let Expr::Seq(init, rest) = *seq else { panic!() };
        assert!(matches!(*init, Expr::Ignore(_)));
        assert!(matches!(*rest, Expr::While(_, _)));
    }

    #[test]
    fn test_repeat_negates_condition() {
        let unit = parse("var i; repeat i := i - 1 until i").unwrap();
        let Expr::Scope(_, seq) = unit else { panic!() };
        let Expr::DoWhile(_, cond) = *seq else { panic!() };
        assert!(matches!(
            *cond,
            Expr::Binop(BinOp::Eq, _, ref z) if **z == Expr::Const(0)
        ));
    }

    #[test]
    fn test_var_initializer_desugars_to_assignment() {
        let unit = parse("var x = 5; write (x)").unwrap();
        let Expr::Scope(_, seq) = unit else { panic!() };
        let Expr::Seq(init, _) = *seq else { panic!() };
        assert!(matches!(*init, Expr::Ignore(ref e) if matches!(**e, Expr::Set(_, _))));
    }

    #[test]
    fn test_sexp_and_array_literals() {
        let unit = parse("var x; x := Cons (1, [2, 3])").unwrap();
        let Expr::Scope(_, seq) = unit else { panic!() };
        let Expr::Ignore(set) = *seq else { panic!() };
        let Expr::Set(_, rhs) = *set else { panic!() };
        let Expr::Sexp(tag, items) = *rhs else {
            panic!()
        };
        assert_eq!(tag, "Cons");
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Expr::Array(ref xs) if xs.len() == 2));
    }

    #[test]
    fn test_string_quote_escape() {
        let unit = parse(r##"var s; s := "he said ""hi""""##).unwrap();
        let Expr::Scope(_, seq) = unit else { panic!() };
        let Expr::Ignore(set) = *seq else { panic!() };
        let Expr::Set(_, rhs) = *set else { panic!() };
        assert_eq!(*rhs, Expr::String("he said \"hi\"".to_string()));
    }

    #[test]
    fn test_unary_minus() {
        let unit = parse("write (-5); write (-(1 + 2))").unwrap();
        let Expr::Seq(first, _) = body(unit) else {
            panic!()
        };
        let Expr::Ignore(call) = *first else { panic!() };
        let Expr::Call(_, args) = *call else { panic!() };
        assert_eq!(args[0], Expr::Const(-5));
    }

    #[test]
    fn test_function_body_is_value_position() {
        let unit = parse("fun f (n) { write (n); n * 2 } skip").unwrap();
        let Expr::Scope(defs, _) = unit else { panic!() };
        let Definition::Fun { body, .. } = &defs[0] else {
            panic!()
        };
        let Expr::Scope(_, seq) = body else { panic!() };
        let Expr::Seq(first, last) = &**seq else {
            panic!()
        };
        assert!(matches!(**first, Expr::Ignore(_)));
        assert!(matches!(**last, Expr::Binop(BinOp::Times, _, _)));
    }

    #[test]
    fn test_nested_comments_and_line_comments() {
        let unit = parse("-- leading\nwrite ((* one (* two *) *) 1)").unwrap();
        assert!(matches!(body(unit), Expr::Ignore(_)));
    }

    #[test]
    fn test_error_position_is_reported() {
        let err = parse("var x\nwrite (x)").unwrap_err();
        assert!(err.contains("expected ';'"), "{}", err);
        assert!(err.contains("2:1"), "{}", err);
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse("1 + 2 := 3").unwrap_err();
        assert!(err.contains("invalid assignment target"), "{}", err);
    }

    #[test]
    fn test_keyword_cannot_be_a_name() {
        assert!(parse("var while;").is_err());
    }
}
