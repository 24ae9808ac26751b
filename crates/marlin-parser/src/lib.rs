//! Recursive-descent parser for Marlin.
//!
//! Infix resolution happens during parsing: a maximal application chain is
//! collected first (application binds tighter than any operator), then the
//! chain is folded by operator precedence and associativity using the
//! fixity environment, which starts from the caller's table and grows
//! scoped overlays for `let`/`local` bodies.

use marlin_ast::fixity::{Fixity, FixityTable, ScopedFixity};
use marlin_ast::*;
use marlin_lexer::{Span, Token};
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Syntax,
    /// A construct the interpreter deliberately refuses (`withtype`,
    /// vector literals without the vector option).
    FeatureDisabled,
}

#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.span.start, self.span.end, self.message)
    }
}

impl std::error::Error for ParseError {}

type Result<T, E = ParseError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
    pub allow_vector: bool,
}

/// A fully parsed chunk: the arena plus the top-level declarations in
/// source order.
#[derive(Debug)]
pub struct Parsed {
    pub tree: SyntaxTree,
    pub decs: Vec<DecId>,
}

/// Parse a token sequence against the given fixity environment.
pub fn parse(
    tokens: &[(Token, Span)],
    fixity: &FixityTable,
    options: &ParserOptions,
) -> Result<Parsed> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        tree: SyntaxTree::new(),
        fixity: ScopedFixity::new(fixity),
        options,
    };
    let decs = parser.parse_program()?;
    Ok(Parsed {
        tree: parser.tree,
        decs,
    })
}

struct Parser<'a> {
    tokens: &'a [(Token, Span)],
    pos: usize,
    tree: SyntaxTree,
    fixity: ScopedFixity<'a>,
    options: &'a ParserOptions,
}

impl<'a> Parser<'a> {
    // ── Token helpers ─────────────────────────────────────────────

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_ahead(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| *s)
            .unwrap_or_else(|| {
                self.tokens
                    .last()
                    .map(|(_, s)| Span::new(s.end, s.end))
                    .unwrap_or(Span::new(0, 0))
            })
    }

    fn prev_span(&self) -> Span {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|(_, s)| *s)
            .unwrap_or(Span::new(0, 0))
    }

    fn advance(&mut self) -> (Token, Span) {
        let item = self.tokens[self.pos].clone();
        self.pos += 1;
        item
    }

    fn check_kw(&self, text: &str) -> bool {
        matches!(self.peek(), Some(t) if t.is_keyword(text))
    }

    fn eat_kw(&mut self, text: &str) -> bool {
        if self.check_kw(text) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, text: &str) -> Result<Span> {
        if self.check_kw(text) {
            Ok(self.advance().1)
        } else {
            self.unexpected(&format!("expected `{}`", text))
        }
    }

    fn expect_equals(&mut self) -> Result<Span> {
        if matches!(self.peek(), Some(Token::Equals)) {
            Ok(self.advance().1)
        } else {
            self.unexpected("expected `=`")
        }
    }

    fn error<T>(&self, message: impl Into<String>, span: Span) -> Result<T> {
        Err(ParseError {
            kind: ParseErrorKind::Syntax,
            message: message.into(),
            span,
        })
    }

    fn unexpected<T>(&self, wanted: &str) -> Result<T> {
        let found = match self.peek() {
            Some(t) => format!("{:?}", t),
            None => "end of input".to_string(),
        };
        self.error(format!("{}, found {}", wanted, found), self.peek_span())
    }

    fn feature_disabled<T>(&self, message: impl Into<String>, span: Span) -> Result<T> {
        Err(ParseError {
            kind: ParseErrorKind::FeatureDisabled,
            message: message.into(),
            span,
        })
    }

    // ── Allocators ────────────────────────────────────────────────

    fn alloc_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.tree.exprs.alloc(Expr { kind, span })
    }

    fn alloc_pat(&mut self, kind: PatKind, span: Span) -> PatId {
        self.tree.pats.alloc(Pat { kind, span })
    }

    fn alloc_ty(&mut self, kind: TyExprKind, span: Span) -> TyId {
        self.tree.tys.alloc(TyExpr { kind, span })
    }

    fn alloc_dec(&mut self, kind: DecKind, span: Span) -> DecId {
        self.tree.decs.alloc(Dec { kind, span })
    }

    fn expr_span(&self, id: ExprId) -> Span {
        self.tree.exprs[id].span
    }

    fn pat_span(&self, id: PatId) -> Span {
        self.tree.pats[id].span
    }

    // ── Program ───────────────────────────────────────────────────

    fn parse_program(&mut self) -> Result<Vec<DecId>> {
        let mut decs = Vec::new();
        loop {
            while self.eat_kw(";") {}
            if self.at_end() {
                return Ok(decs);
            }
            if self.starts_dec() {
                decs.push(self.parse_dec()?);
            } else {
                // Top-level expression: `e;` binds `it`.
                let span = self.peek_span();
                let expr = self.parse_exp()?;
                let pat = self.alloc_pat(
                    PatKind::Ident {
                        name: LongName::plain("it"),
                        op: false,
                    },
                    span,
                );
                let full = span.merge(self.prev_span());
                let dec = self.alloc_dec(
                    DecKind::Val {
                        ty_vars: Vec::new(),
                        rec: false,
                        binds: vec![ValBind {
                            pat,
                            expr,
                            span: full,
                        }],
                    },
                    full,
                );
                decs.push(dec);
                if !self.at_end() && !self.eat_kw(";") {
                    return self.unexpected("expected `;` after expression");
                }
            }
        }
    }

    fn starts_dec(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Keyword(k)) if matches!(
                k.as_str(),
                "val" | "fun" | "type" | "datatype" | "abstype" | "exception"
                    | "local" | "open" | "infix" | "infixr" | "nonfix"
            )
        )
    }

    // ── Declarations ──────────────────────────────────────────────

    /// Parses a run of declarations up to (not including) one of the
    /// terminator keywords, collapsing to `Empty`/the single dec/`Seq`.
    fn parse_dec_sequence(&mut self, terminators: &[&str]) -> Result<DecId> {
        let start = self.peek_span();
        let mut decs = Vec::new();
        loop {
            while self.eat_kw(";") {}
            match self.peek() {
                None => break,
                Some(Token::Keyword(k)) if terminators.contains(&k.as_str()) => break,
                _ if self.starts_dec() => decs.push(self.parse_dec()?),
                _ => break,
            }
        }
        let span = start.merge(self.prev_span());
        Ok(match decs.len() {
            0 => self.alloc_dec(DecKind::Empty, span),
            1 => decs[0],
            _ => self.alloc_dec(DecKind::Seq(decs), span),
        })
    }

    fn parse_dec(&mut self) -> Result<DecId> {
        let start = self.peek_span();
        let (token, _) = self.advance();
        let keyword = match &token {
            Token::Keyword(k) => k.clone(),
            _ => return self.error("expected a declaration", start),
        };
        match keyword.as_str() {
            "val" => self.parse_val_dec(start),
            "fun" => self.parse_fun_dec(start),
            "type" => self.parse_type_dec(start),
            "datatype" => self.parse_datatype_dec(start),
            "abstype" => self.parse_abstype_dec(start),
            "exception" => self.parse_exception_dec(start),
            "local" => {
                self.fixity.push_scope();
                let outer = self.parse_dec_sequence(&["in"])?;
                self.expect_kw("in")?;
                let inner = self.parse_dec_sequence(&["end"])?;
                let end = self.expect_kw("end")?;
                self.fixity.pop_scope();
                Ok(self.alloc_dec(DecKind::Local { outer, inner }, start.merge(end)))
            }
            "open" => {
                let mut names = Vec::new();
                loop {
                    match self.peek() {
                        Some(Token::AlphaId(name)) => {
                            let name = name.clone();
                            self.advance();
                            names.push(LongName::plain(name));
                        }
                        Some(Token::LongId {
                            qualifiers, name, ..
                        }) => {
                            let long = LongName::qualified(qualifiers.clone(), name.clone());
                            self.advance();
                            names.push(long);
                        }
                        _ => break,
                    }
                }
                if names.is_empty() {
                    return self.unexpected("expected a structure name after `open`");
                }
                Ok(self.alloc_dec(DecKind::Open(names), start.merge(self.prev_span())))
            }
            "infix" => self.parse_fixity_dec(start, false),
            "infixr" => self.parse_fixity_dec(start, true),
            "nonfix" => {
                let ids = self.parse_fixity_ids()?;
                for id in &ids {
                    self.fixity.declare(id.clone(), None);
                }
                Ok(self.alloc_dec(
                    DecKind::Fixity {
                        fixity: FixityDecl::Nonfix,
                        ids,
                    },
                    start.merge(self.prev_span()),
                ))
            }
            other => self.error(format!("`{}` cannot start a declaration", other), start),
        }
    }

    fn parse_val_dec(&mut self, start: Span) -> Result<DecId> {
        let ty_vars = self.parse_ty_var_seq()?;
        let rec = self.eat_kw("rec");
        let mut binds = Vec::new();
        loop {
            let bind_start = self.peek_span();
            let pat = self.parse_pat()?;
            self.expect_equals()?;
            let expr = self.parse_exp()?;
            let bind_span = bind_start.merge(self.prev_span());
            if rec {
                if !matches!(
                    self.tree.pats[pat].kind,
                    PatKind::Ident { ref name, .. } if !name.is_qualified()
                ) {
                    return self.error("`val rec` must bind a plain identifier", bind_span);
                }
                if !matches!(self.tree.exprs[expr].kind, ExprKind::Fn { .. }) {
                    return self
                        .error("the right-hand side of `val rec` must be `fn`", bind_span);
                }
            }
            binds.push(ValBind {
                pat,
                expr,
                span: bind_span,
            });
            if !self.eat_kw("and") {
                break;
            }
        }
        Ok(self.alloc_dec(
            DecKind::Val {
                ty_vars,
                rec,
                binds,
            },
            start.merge(self.prev_span()),
        ))
    }

    fn parse_fun_dec(&mut self, start: Span) -> Result<DecId> {
        let ty_vars = self.parse_ty_var_seq()?;
        let mut binds = Vec::new();
        loop {
            binds.push(self.parse_fun_bind()?);
            if !self.eat_kw("and") {
                break;
            }
        }
        Ok(self.alloc_dec(
            DecKind::Fun { ty_vars, binds },
            start.merge(self.prev_span()),
        ))
    }

    fn parse_fun_bind(&mut self) -> Result<FunBind> {
        let start = self.peek_span();
        let mut name: Option<SmolStr> = None;
        let mut clauses = Vec::new();
        loop {
            let clause_start = self.peek_span();
            let (clause_name, pats) = self.parse_fun_clause_head()?;
            match &name {
                None => name = Some(clause_name),
                Some(expected) if *expected == clause_name => {}
                Some(expected) => {
                    return self.error(
                        format!(
                            "clause names differ: `{}` vs `{}`",
                            expected, clause_name
                        ),
                        clause_start,
                    )
                }
            }
            if let Some(first) = clauses.first() {
                let first: &FunClause = first;
                if first.pats.len() != pats.len() {
                    return self.error(
                        format!(
                            "clause has {} arguments but earlier clauses have {}",
                            pats.len(),
                            first.pats.len()
                        ),
                        clause_start,
                    );
                }
            }
            let ret_ty = if self.eat_kw(":") {
                Some(self.parse_ty()?)
            } else {
                None
            };
            self.expect_equals()?;
            let body = self.parse_exp()?;
            clauses.push(FunClause {
                pats,
                ret_ty,
                body,
                span: clause_start.merge(self.prev_span()),
            });
            if !self.eat_kw("|") {
                break;
            }
        }
        Ok(FunBind {
            name: name.expect("at least one clause"),
            clauses,
            span: start.merge(self.prev_span()),
        })
    }

    /// A clause head is either `name atpat+`, `op name atpat+`, or the
    /// infix form `atpat name atpat` (folding the operands into a tuple).
    fn parse_fun_clause_head(&mut self) -> Result<(SmolStr, Vec<PatId>)> {
        if self.eat_kw("op") {
            let name = self.expect_value_identifier()?;
            let pats = self.parse_atpat_run()?;
            return Ok((name, pats));
        }
        if let Some(text) = self.peek().and_then(Token::identifier_text) {
            let next_is_infix = self
                .peek_ahead(1)
                .and_then(Token::identifier_text)
                .is_some_and(|t| self.fixity.infix(t).is_some());
            if self.fixity.infix(text).is_none()
                && !matches!(self.peek(), Some(Token::Equals))
                && !next_is_infix
            {
                let name = SmolStr::new(text);
                self.advance();
                let pats = self.parse_atpat_run()?;
                return Ok((name, pats));
            }
        }
        // Infix clause head: `a ++ b`.
        let lhs = self.parse_atpat()?;
        let op_span = self.peek_span();
        let name = match self.peek().and_then(Token::identifier_text) {
            Some(text) if self.fixity.infix(text).is_some() => {
                let name = SmolStr::new(text);
                self.advance();
                name
            }
            _ => return self.unexpected("expected an infix function name"),
        };
        let rhs = self.parse_atpat()?;
        let span = self.pat_span(lhs).merge(self.pat_span(rhs)).merge(op_span);
        let tuple = self.alloc_pat(PatKind::Tuple(vec![lhs, rhs]), span);
        Ok((name, vec![tuple]))
    }

    fn parse_atpat_run(&mut self) -> Result<Vec<PatId>> {
        let mut pats = Vec::new();
        while self.starts_atpat() && self.peek_infix_pat_operator().is_none() {
            pats.push(self.parse_atpat()?);
        }
        if pats.is_empty() {
            return self.unexpected("expected at least one argument pattern");
        }
        Ok(pats)
    }

    fn parse_type_dec(&mut self, start: Span) -> Result<DecId> {
        let mut binds = Vec::new();
        loop {
            let bind_start = self.peek_span();
            let ty_vars = self.parse_ty_var_seq()?;
            let name = self.expect_type_constructor_name()?;
            self.expect_equals()?;
            let ty = self.parse_ty()?;
            binds.push(TypBind {
                ty_vars,
                name,
                ty,
                span: bind_start.merge(self.prev_span()),
            });
            if !self.eat_kw("and") {
                break;
            }
        }
        Ok(self.alloc_dec(DecKind::Type(binds), start.merge(self.prev_span())))
    }

    fn parse_datatype_dec(&mut self, start: Span) -> Result<DecId> {
        let binds = self.parse_dat_binds()?;
        if self.check_kw("withtype") {
            return self.feature_disabled(
                "`withtype` in datatype declarations is not supported",
                self.peek_span(),
            );
        }
        Ok(self.alloc_dec(DecKind::Datatype(binds), start.merge(self.prev_span())))
    }

    fn parse_abstype_dec(&mut self, start: Span) -> Result<DecId> {
        let binds = self.parse_dat_binds()?;
        if self.check_kw("withtype") {
            return self.feature_disabled(
                "`withtype` in abstype declarations is not supported",
                self.peek_span(),
            );
        }
        self.expect_kw("with")?;
        let body = self.parse_dec_sequence(&["end"])?;
        let end = self.expect_kw("end")?;
        Ok(self.alloc_dec(DecKind::Abstype { binds, body }, start.merge(end)))
    }

    fn parse_dat_binds(&mut self) -> Result<Vec<DatBind>> {
        let mut binds = Vec::new();
        loop {
            let bind_start = self.peek_span();
            let ty_vars = self.parse_ty_var_seq()?;
            let name = self.expect_type_constructor_name()?;
            self.expect_equals()?;
            let mut ctors = Vec::new();
            loop {
                let ctor_start = self.peek_span();
                self.eat_kw("op");
                let ctor_name = self.expect_value_identifier()?;
                let arg = if self.eat_kw("of") {
                    Some(self.parse_ty()?)
                } else {
                    None
                };
                ctors.push(ConBind {
                    name: ctor_name,
                    arg,
                    span: ctor_start.merge(self.prev_span()),
                });
                if !self.eat_kw("|") {
                    break;
                }
            }
            binds.push(DatBind {
                ty_vars,
                name,
                ctors,
                span: bind_start.merge(self.prev_span()),
            });
            if !self.eat_kw("and") {
                break;
            }
        }
        Ok(binds)
    }

    fn parse_exception_dec(&mut self, start: Span) -> Result<DecId> {
        let mut binds = Vec::new();
        loop {
            let bind_start = self.peek_span();
            self.eat_kw("op");
            let name = self.expect_value_identifier()?;
            if matches!(self.peek(), Some(Token::Equals)) {
                self.advance();
                self.eat_kw("op");
                let target = match self.peek() {
                    Some(Token::AlphaId(n)) => {
                        let n = LongName::plain(n.clone());
                        self.advance();
                        n
                    }
                    Some(Token::LongId {
                        qualifiers, name, ..
                    }) => {
                        let n = LongName::qualified(qualifiers.clone(), name.clone());
                        self.advance();
                        n
                    }
                    _ => return self.unexpected("expected an exception name"),
                };
                binds.push(ExBind::Alias {
                    name,
                    target,
                    span: bind_start.merge(self.prev_span()),
                });
            } else {
                let arg = if self.eat_kw("of") {
                    Some(self.parse_ty()?)
                } else {
                    None
                };
                binds.push(ExBind::New {
                    name,
                    arg,
                    span: bind_start.merge(self.prev_span()),
                });
            }
            if !self.eat_kw("and") {
                break;
            }
        }
        Ok(self.alloc_dec(DecKind::Exception(binds), start.merge(self.prev_span())))
    }

    fn parse_fixity_dec(&mut self, start: Span, right: bool) -> Result<DecId> {
        let precedence = match self.peek() {
            Some(Token::Numeric { text, value }) => {
                if text.len() > 1 {
                    return self.error(
                        "fixity precedence must be a single digit",
                        self.peek_span(),
                    );
                }
                let p = *value as u8;
                self.advance();
                p
            }
            Some(Token::Int { .. }) => {
                return self.error(
                    "fixity precedence must not be negative",
                    self.peek_span(),
                )
            }
            _ => 0,
        };
        let ids = self.parse_fixity_ids()?;
        let fixity = if right {
            Fixity::right(precedence)
        } else {
            Fixity::left(precedence)
        };
        for id in &ids {
            self.fixity.declare(id.clone(), Some(fixity));
        }
        Ok(self.alloc_dec(
            DecKind::Fixity {
                fixity: if right {
                    FixityDecl::Infixr(precedence)
                } else {
                    FixityDecl::Infix(precedence)
                },
                ids,
            },
            start.merge(self.prev_span()),
        ))
    }

    fn parse_fixity_ids(&mut self) -> Result<Vec<SmolStr>> {
        let mut ids = Vec::new();
        loop {
            match self.peek() {
                Some(Token::TyVar(_)) | Some(Token::EqTyVar(_)) => {
                    return self.error(
                        "type variables cannot be given a fixity",
                        self.peek_span(),
                    )
                }
                Some(token) => match token.identifier_text() {
                    Some(text) => {
                        ids.push(SmolStr::new(text));
                        self.advance();
                    }
                    None => break,
                },
                None => break,
            }
        }
        if ids.is_empty() {
            return self.unexpected("expected at least one identifier");
        }
        Ok(ids)
    }

    /// `'a`, or `('a, 'b, ...)` when the parenthesis is followed by a type
    /// variable; otherwise nothing (the parenthesis belongs to a pattern).
    fn parse_ty_var_seq(&mut self) -> Result<Vec<SmolStr>> {
        match self.peek() {
            Some(Token::TyVar(name)) | Some(Token::EqTyVar(name)) => {
                let name = name.clone();
                self.advance();
                Ok(vec![name])
            }
            Some(Token::Keyword(k))
                if k.as_str() == "("
                    && matches!(
                        self.peek_ahead(1),
                        Some(Token::TyVar(_)) | Some(Token::EqTyVar(_))
                    ) =>
            {
                self.advance();
                let mut names = Vec::new();
                loop {
                    match self.peek() {
                        Some(Token::TyVar(name)) | Some(Token::EqTyVar(name)) => {
                            names.push(name.clone());
                            self.advance();
                        }
                        _ => return self.unexpected("expected a type variable"),
                    }
                    if !self.eat_kw(",") {
                        break;
                    }
                }
                self.expect_kw(")")?;
                Ok(names)
            }
            _ => Ok(Vec::new()),
        }
    }

    fn expect_value_identifier(&mut self) -> Result<SmolStr> {
        match self.peek() {
            Some(Token::AlphaId(name)) | Some(Token::SymbolicId(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            Some(Token::Star) => {
                self.advance();
                Ok(SmolStr::new("*"))
            }
            _ => self.unexpected("expected an identifier"),
        }
    }

    fn expect_type_constructor_name(&mut self) -> Result<SmolStr> {
        match self.peek() {
            Some(Token::AlphaId(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            Some(Token::SymbolicId(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => self.unexpected("expected a type constructor name"),
        }
    }

    // ── Expressions ───────────────────────────────────────────────

    fn starts_low_exp(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Keyword(k))
                if matches!(k.as_str(), "fn" | "case" | "if" | "while" | "raise")
        )
    }

    fn parse_exp(&mut self) -> Result<ExprId> {
        let start = self.peek_span();
        if self.eat_kw("raise") {
            let body = self.parse_exp()?;
            let span = start.merge(self.expr_span(body));
            return Ok(self.alloc_expr(ExprKind::Raise(body), span));
        }
        if self.eat_kw("fn") {
            let arms = self.parse_match()?;
            let span = start.merge(self.prev_span());
            return Ok(self.alloc_expr(ExprKind::Fn { arms }, span));
        }
        if self.eat_kw("case") {
            let scrutinee = self.parse_exp()?;
            self.expect_kw("of")?;
            let arms = self.parse_match()?;
            let span = start.merge(self.prev_span());
            return Ok(self.alloc_expr(ExprKind::Case { scrutinee, arms }, span));
        }
        if self.eat_kw("if") {
            let cond = self.parse_exp()?;
            self.expect_kw("then")?;
            let then_branch = self.parse_exp()?;
            self.expect_kw("else")?;
            let else_branch = self.parse_exp()?;
            let span = start.merge(self.expr_span(else_branch));
            return Ok(self.alloc_expr(
                ExprKind::If {
                    cond,
                    then_branch,
                    else_branch,
                },
                span,
            ));
        }
        if self.eat_kw("while") {
            let cond = self.parse_exp()?;
            self.expect_kw("do")?;
            let body = self.parse_exp()?;
            let span = start.merge(self.expr_span(body));
            return Ok(self.alloc_expr(ExprKind::While { cond, body }, span));
        }
        self.parse_handle_exp()
    }

    fn parse_handle_exp(&mut self) -> Result<ExprId> {
        let mut expr = self.parse_orelse_exp()?;
        while self.check_kw("handle") {
            self.advance();
            let arms = self.parse_match()?;
            let span = self.expr_span(expr).merge(self.prev_span());
            expr = self.alloc_expr(ExprKind::Handle { expr, arms }, span);
        }
        Ok(expr)
    }

    fn parse_orelse_exp(&mut self) -> Result<ExprId> {
        let mut lhs = self.parse_andalso_exp()?;
        while self.check_kw("orelse") {
            self.advance();
            let (rhs, stop) = if self.starts_low_exp() {
                (self.parse_exp()?, true)
            } else {
                (self.parse_andalso_exp()?, false)
            };
            let span = self.expr_span(lhs).merge(self.expr_span(rhs));
            lhs = self.alloc_expr(ExprKind::OrElse { lhs, rhs }, span);
            if stop {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_andalso_exp(&mut self) -> Result<ExprId> {
        let mut lhs = self.parse_typed_exp()?;
        while self.check_kw("andalso") {
            self.advance();
            let (rhs, stop) = if self.starts_low_exp() {
                (self.parse_exp()?, true)
            } else {
                (self.parse_typed_exp()?, false)
            };
            let span = self.expr_span(lhs).merge(self.expr_span(rhs));
            lhs = self.alloc_expr(ExprKind::AndAlso { lhs, rhs }, span);
            if stop {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_typed_exp(&mut self) -> Result<ExprId> {
        let mut expr = self.parse_infix_exp()?;
        while self.check_kw(":") {
            self.advance();
            let ty = self.parse_ty()?;
            let span = self.expr_span(expr).merge(self.prev_span());
            expr = self.alloc_expr(ExprKind::Typed { expr, ty }, span);
        }
        Ok(expr)
    }

    /// True when the next token is an identifier the fixity environment
    /// currently treats as infix.
    fn peek_infix_operator(&self) -> Option<(SmolStr, Fixity)> {
        let text = self.peek().and_then(Token::identifier_text)?;
        let fixity = self.fixity.infix(text)?;
        Some((SmolStr::new(text), fixity))
    }

    fn parse_infix_exp(&mut self) -> Result<ExprId> {
        let first = self.parse_app_exp()?;
        let mut operands = vec![first];
        let mut operators: Vec<(SmolStr, Span, Fixity)> = Vec::new();
        // Shunting-yard over the chain; a same-precedence pair with mixed
        // associativity has no defined grouping.
        while let Some((name, fixity)) = self.peek_infix_operator() {
            let op_span = self.advance().1;
            while let Some((top_name, top_span, top_fixity)) = operators.last().cloned() {
                if top_fixity.precedence > fixity.precedence
                    || (top_fixity.precedence == fixity.precedence && !fixity.right_assoc)
                {
                    if top_fixity.precedence == fixity.precedence
                        && top_fixity.right_assoc != fixity.right_assoc
                    {
                        return self.error(
                            format!(
                                "colliding associativities of `{}` and `{}`",
                                top_name, name
                            ),
                            op_span,
                        );
                    }
                    operators.pop();
                    self.reduce_exp_op(&mut operands, top_name, top_span);
                } else {
                    if top_fixity.precedence == fixity.precedence
                        && top_fixity.right_assoc != fixity.right_assoc
                    {
                        return self.error(
                            format!(
                                "colliding associativities of `{}` and `{}`",
                                top_name, name
                            ),
                            op_span,
                        );
                    }
                    break;
                }
            }
            operators.push((name, op_span, fixity));
            let rhs = if self.starts_low_exp() {
                self.parse_exp()?
            } else {
                self.parse_app_exp()?
            };
            operands.push(rhs);
        }
        while let Some((name, span, _)) = operators.pop() {
            self.reduce_exp_op(&mut operands, name, span);
        }
        debug_assert_eq!(operands.len(), 1);
        Ok(operands.pop().unwrap())
    }

    fn reduce_exp_op(&mut self, operands: &mut Vec<ExprId>, name: SmolStr, op_span: Span) {
        let rhs = operands.pop().expect("operand");
        let lhs = operands.pop().expect("operand");
        let span = self.expr_span(lhs).merge(self.expr_span(rhs));
        let func = self.alloc_expr(
            ExprKind::Ident {
                name: LongName::plain(name),
                op: false,
            },
            op_span,
        );
        let arg = self.alloc_expr(ExprKind::Tuple(vec![lhs, rhs]), span);
        operands.push(self.alloc_expr(ExprKind::App { func, arg }, span));
    }

    fn parse_app_exp(&mut self) -> Result<ExprId> {
        let mut expr = self.parse_atexp()?;
        loop {
            if self.peek_infix_operator().is_some() {
                break;
            }
            if !self.starts_atexp() {
                break;
            }
            let arg = self.parse_atexp()?;
            let span = self.expr_span(expr).merge(self.expr_span(arg));
            expr = self.alloc_expr(ExprKind::App { func: expr, arg }, span);
        }
        Ok(expr)
    }

    fn starts_atexp(&self) -> bool {
        match self.peek() {
            Some(Token::Numeric { .. })
            | Some(Token::Int { .. })
            | Some(Token::Word { .. })
            | Some(Token::Real { .. })
            | Some(Token::Char { .. })
            | Some(Token::Str { .. })
            | Some(Token::AlphaId(_))
            | Some(Token::SymbolicId(_))
            | Some(Token::Star)
            | Some(Token::Equals)
            | Some(Token::LongId { .. }) => true,
            Some(Token::Keyword(k)) => {
                matches!(k.as_str(), "(" | "[" | "{" | "#[" | "let" | "op" | "#")
            }
            _ => false,
        }
    }

    fn parse_atexp(&mut self) -> Result<ExprId> {
        let start = self.peek_span();
        match self.peek() {
            Some(Token::Numeric { value, .. }) | Some(Token::Int { value, .. }) => {
                let value = *value;
                self.advance();
                Ok(self.alloc_expr(ExprKind::Const(Constant::Int(value)), start))
            }
            Some(Token::Word { value, .. }) => {
                let value = *value;
                self.advance();
                Ok(self.alloc_expr(ExprKind::Const(Constant::Word(value)), start))
            }
            Some(Token::Real { value, .. }) => {
                let value = *value;
                self.advance();
                Ok(self.alloc_expr(ExprKind::Const(Constant::Real(value)), start))
            }
            Some(Token::Char { value, .. }) => {
                let value = *value;
                self.advance();
                Ok(self.alloc_expr(ExprKind::Const(Constant::Char(value)), start))
            }
            Some(Token::Str { value, .. }) => {
                let value = value.clone();
                self.advance();
                Ok(self.alloc_expr(ExprKind::Const(Constant::Str(value)), start))
            }
            Some(Token::AlphaId(_))
            | Some(Token::SymbolicId(_))
            | Some(Token::Star)
            | Some(Token::Equals)
            | Some(Token::LongId { .. }) => {
                let name = self.parse_long_name()?;
                Ok(self.alloc_expr(ExprKind::Ident { name, op: false }, start))
            }
            Some(Token::Keyword(k)) => match k.as_str() {
                "op" => {
                    self.advance();
                    let name = self.parse_long_name()?;
                    let span = start.merge(self.prev_span());
                    Ok(self.alloc_expr(ExprKind::Ident { name, op: true }, span))
                }
                "#" => {
                    self.advance();
                    let label = self.parse_label()?;
                    let span = start.merge(self.prev_span());
                    Ok(self.alloc_expr(ExprKind::Selector(label), span))
                }
                "#[" => {
                    if !self.options.allow_vector {
                        return self.feature_disabled(
                            "vector literals are not enabled",
                            start,
                        );
                    }
                    self.advance();
                    let mut items = Vec::new();
                    if !self.check_kw("]") {
                        loop {
                            items.push(self.parse_exp()?);
                            if !self.eat_kw(",") {
                                break;
                            }
                        }
                    }
                    let end = self.expect_kw("]")?;
                    Ok(self.alloc_expr(ExprKind::Vector(items), start.merge(end)))
                }
                "(" => self.parse_paren_exp(),
                "[" => {
                    self.advance();
                    let mut items = Vec::new();
                    if !self.check_kw("]") {
                        loop {
                            items.push(self.parse_exp()?);
                            if !self.eat_kw(",") {
                                break;
                            }
                        }
                    }
                    let end = self.expect_kw("]")?;
                    Ok(self.alloc_expr(ExprKind::List(items), start.merge(end)))
                }
                "{" => {
                    self.advance();
                    let mut rows = Vec::new();
                    if !self.check_kw("}") {
                        loop {
                            let label = self.parse_label()?;
                            self.expect_equals()?;
                            let expr = self.parse_exp()?;
                            rows.push((label, expr));
                            if !self.eat_kw(",") {
                                break;
                            }
                        }
                    }
                    let end = self.expect_kw("}")?;
                    Ok(self.alloc_expr(ExprKind::Record(rows), start.merge(end)))
                }
                "let" => {
                    self.advance();
                    self.fixity.push_scope();
                    let dec = self.parse_dec_sequence(&["in"])?;
                    self.expect_kw("in")?;
                    let mut body = vec![self.parse_exp()?];
                    while self.eat_kw(";") {
                        body.push(self.parse_exp()?);
                    }
                    let end = self.expect_kw("end")?;
                    self.fixity.pop_scope();
                    Ok(self.alloc_expr(ExprKind::Let { dec, body }, start.merge(end)))
                }
                _ => self.unexpected("expected an expression"),
            },
            _ => self.unexpected("expected an expression"),
        }
    }

    fn parse_paren_exp(&mut self) -> Result<ExprId> {
        let start = self.expect_kw("(")?;
        if self.check_kw(")") {
            let end = self.advance().1;
            return Ok(self.alloc_expr(ExprKind::Tuple(Vec::new()), start.merge(end)));
        }
        let first = self.parse_exp()?;
        if self.eat_kw(",") {
            let mut items = vec![first];
            loop {
                items.push(self.parse_exp()?);
                if !self.eat_kw(",") {
                    break;
                }
            }
            let end = self.expect_kw(")")?;
            return Ok(self.alloc_expr(ExprKind::Tuple(items), start.merge(end)));
        }
        if self.eat_kw(";") {
            let mut items = vec![first];
            loop {
                items.push(self.parse_exp()?);
                if !self.eat_kw(";") {
                    break;
                }
            }
            let end = self.expect_kw(")")?;
            return Ok(self.alloc_expr(ExprKind::Seq(items), start.merge(end)));
        }
        self.expect_kw(")")?;
        Ok(first)
    }

    fn parse_long_name(&mut self) -> Result<LongName> {
        match self.peek() {
            Some(Token::AlphaId(name)) | Some(Token::SymbolicId(name)) => {
                let name = LongName::plain(name.clone());
                self.advance();
                Ok(name)
            }
            Some(Token::Star) => {
                self.advance();
                Ok(LongName::plain("*"))
            }
            Some(Token::Equals) => {
                self.advance();
                Ok(LongName::plain("="))
            }
            Some(Token::LongId {
                qualifiers, name, ..
            }) => {
                let long = LongName::qualified(qualifiers.clone(), name.clone());
                self.advance();
                Ok(long)
            }
            _ => self.unexpected("expected an identifier"),
        }
    }

    /// Record labels: alphanumeric or symbolic identifiers, `*`, or a
    /// positive decimal numeral without a leading zero.
    fn parse_label(&mut self) -> Result<SmolStr> {
        match self.peek() {
            Some(Token::AlphaId(name)) | Some(Token::SymbolicId(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            Some(Token::Star) => {
                self.advance();
                Ok(SmolStr::new("*"))
            }
            Some(Token::Numeric { text, value }) => {
                if *value < 1 || text.starts_with('0') {
                    return self.error(
                        "record labels must be positive numerals without a leading zero",
                        self.peek_span(),
                    );
                }
                let text = text.clone();
                self.advance();
                Ok(text)
            }
            Some(Token::Equals) => {
                self.error("`=` is not a valid record label", self.peek_span())
            }
            Some(Token::TyVar(_)) | Some(Token::EqTyVar(_)) => self.error(
                "type variables are not valid record labels",
                self.peek_span(),
            ),
            _ => self.unexpected("expected a record label"),
        }
    }

    fn parse_match(&mut self) -> Result<Vec<MatchArm>> {
        let mut arms = Vec::new();
        loop {
            let pat = self.parse_pat()?;
            self.expect_kw("=>")?;
            let expr = self.parse_exp()?;
            arms.push(MatchArm { pat, expr });
            if !self.eat_kw("|") {
                break;
            }
        }
        Ok(arms)
    }

    // ── Patterns ──────────────────────────────────────────────────

    fn parse_pat(&mut self) -> Result<PatId> {
        let pat = self.parse_infix_pat()?;
        let mut ty = None;
        if self.check_kw(":") {
            self.advance();
            ty = Some(self.parse_ty()?);
        }
        if self.check_kw("as") {
            let as_span = self.advance().1;
            let var = match &self.tree.pats[pat].kind {
                PatKind::Ident { name, .. } if !name.is_qualified() => name.name.clone(),
                _ => {
                    return self.error(
                        "the left of `as` must be a plain variable",
                        as_span,
                    )
                }
            };
            let inner = self.parse_pat()?;
            let span = self.pat_span(pat).merge(self.pat_span(inner));
            return Ok(self.alloc_pat(
                PatKind::Layered {
                    var,
                    ty,
                    pat: inner,
                },
                span,
            ));
        }
        match ty {
            Some(ty) => {
                let span = self.pat_span(pat).merge(self.prev_span());
                let mut typed = self.alloc_pat(PatKind::Typed { pat, ty }, span);
                while self.check_kw(":") {
                    self.advance();
                    let ty = self.parse_ty()?;
                    let span = self.pat_span(typed).merge(self.prev_span());
                    typed = self.alloc_pat(PatKind::Typed { pat: typed, ty }, span);
                }
                Ok(typed)
            }
            None => Ok(pat),
        }
    }

    /// Infix operators in patterns resolve with the same fixity table as
    /// expressions; `=` never takes part.
    fn peek_infix_pat_operator(&self) -> Option<(SmolStr, Fixity)> {
        if matches!(self.peek(), Some(Token::Equals)) {
            return None;
        }
        self.peek_infix_operator()
    }

    fn parse_infix_pat(&mut self) -> Result<PatId> {
        let first = self.parse_conapp_pat()?;
        let mut operands = vec![first];
        let mut operators: Vec<(SmolStr, Span, Fixity)> = Vec::new();
        while let Some((name, fixity)) = self.peek_infix_pat_operator() {
            let op_span = self.advance().1;
            while let Some((top_name, top_span, top_fixity)) = operators.last().cloned() {
                if top_fixity.precedence == fixity.precedence
                    && top_fixity.right_assoc != fixity.right_assoc
                {
                    return self.error(
                        format!(
                            "colliding associativities of `{}` and `{}`",
                            top_name, name
                        ),
                        op_span,
                    );
                }
                if top_fixity.precedence > fixity.precedence
                    || (top_fixity.precedence == fixity.precedence && !fixity.right_assoc)
                {
                    operators.pop();
                    self.reduce_pat_op(&mut operands, top_name, top_span);
                } else {
                    break;
                }
            }
            operators.push((name, op_span, fixity));
            operands.push(self.parse_conapp_pat()?);
        }
        while let Some((name, span, _)) = operators.pop() {
            self.reduce_pat_op(&mut operands, name, span);
        }
        debug_assert_eq!(operands.len(), 1);
        Ok(operands.pop().unwrap())
    }

    fn reduce_pat_op(&mut self, operands: &mut Vec<PatId>, name: SmolStr, op_span: Span) {
        let rhs = operands.pop().expect("operand");
        let lhs = operands.pop().expect("operand");
        let span = self.pat_span(lhs).merge(self.pat_span(rhs));
        let arg = self.alloc_pat(PatKind::Tuple(vec![lhs, rhs]), span);
        operands.push(self.alloc_pat(
            PatKind::Con {
                name: LongName::plain(name),
                op: false,
                arg,
            },
            span.merge(op_span),
        ));
    }

    fn parse_conapp_pat(&mut self) -> Result<PatId> {
        let first = self.parse_atpat()?;
        let is_con_candidate = matches!(
            self.tree.pats[first].kind,
            PatKind::Ident { .. }
        );
        if is_con_candidate && self.starts_atpat() && self.peek_infix_pat_operator().is_none() {
            let (name, op) = match &self.tree.pats[first].kind {
                PatKind::Ident { name, op } => (name.clone(), *op),
                _ => unreachable!(),
            };
            let arg = self.parse_atpat()?;
            let span = self.pat_span(first).merge(self.pat_span(arg));
            return Ok(self.alloc_pat(PatKind::Con { name, op, arg }, span));
        }
        Ok(first)
    }

    fn starts_atpat(&self) -> bool {
        match self.peek() {
            Some(Token::Numeric { .. })
            | Some(Token::Int { .. })
            | Some(Token::Word { .. })
            | Some(Token::Real { .. })
            | Some(Token::Char { .. })
            | Some(Token::Str { .. })
            | Some(Token::AlphaId(_))
            | Some(Token::SymbolicId(_))
            | Some(Token::Star)
            | Some(Token::LongId { .. }) => true,
            Some(Token::Keyword(k)) => matches!(k.as_str(), "_" | "(" | "[" | "{" | "op"),
            _ => false,
        }
    }

    fn parse_atpat(&mut self) -> Result<PatId> {
        let start = self.peek_span();
        match self.peek() {
            Some(Token::Numeric { value, .. }) | Some(Token::Int { value, .. }) => {
                let value = *value;
                self.advance();
                Ok(self.alloc_pat(PatKind::Const(Constant::Int(value)), start))
            }
            Some(Token::Word { value, .. }) => {
                let value = *value;
                self.advance();
                Ok(self.alloc_pat(PatKind::Const(Constant::Word(value)), start))
            }
            Some(Token::Real { value, .. }) => {
                let value = *value;
                self.advance();
                Ok(self.alloc_pat(PatKind::Const(Constant::Real(value)), start))
            }
            Some(Token::Char { value, .. }) => {
                let value = *value;
                self.advance();
                Ok(self.alloc_pat(PatKind::Const(Constant::Char(value)), start))
            }
            Some(Token::Str { value, .. }) => {
                let value = value.clone();
                self.advance();
                Ok(self.alloc_pat(PatKind::Const(Constant::Str(value)), start))
            }
            Some(Token::AlphaId(_))
            | Some(Token::SymbolicId(_))
            | Some(Token::Star)
            | Some(Token::LongId { .. }) => {
                let name = self.parse_long_name()?;
                Ok(self.alloc_pat(PatKind::Ident { name, op: false }, start))
            }
            Some(Token::Keyword(k)) => match k.as_str() {
                "_" => {
                    self.advance();
                    Ok(self.alloc_pat(PatKind::Wildcard, start))
                }
                "op" => {
                    self.advance();
                    let name = self.parse_long_name()?;
                    let span = start.merge(self.prev_span());
                    Ok(self.alloc_pat(PatKind::Ident { name, op: true }, span))
                }
                "(" => {
                    self.advance();
                    if self.check_kw(")") {
                        let end = self.advance().1;
                        return Ok(
                            self.alloc_pat(PatKind::Tuple(Vec::new()), start.merge(end))
                        );
                    }
                    let first = self.parse_pat()?;
                    if self.eat_kw(",") {
                        let mut items = vec![first];
                        loop {
                            items.push(self.parse_pat()?);
                            if !self.eat_kw(",") {
                                break;
                            }
                        }
                        let end = self.expect_kw(")")?;
                        return Ok(self.alloc_pat(PatKind::Tuple(items), start.merge(end)));
                    }
                    self.expect_kw(")")?;
                    Ok(first)
                }
                "[" => {
                    self.advance();
                    let mut items = Vec::new();
                    if !self.check_kw("]") {
                        loop {
                            items.push(self.parse_pat()?);
                            if !self.eat_kw(",") {
                                break;
                            }
                        }
                    }
                    let end = self.expect_kw("]")?;
                    Ok(self.alloc_pat(PatKind::List(items), start.merge(end)))
                }
                "{" => self.parse_record_pat(start),
                _ => self.unexpected("expected a pattern"),
            },
            _ => self.unexpected("expected a pattern"),
        }
    }

    fn parse_record_pat(&mut self, start: Span) -> Result<PatId> {
        self.expect_kw("{")?;
        let mut rows = Vec::new();
        let mut flexible = false;
        if !self.check_kw("}") {
            loop {
                if self.check_kw("...") {
                    self.advance();
                    flexible = true;
                    break;
                }
                let label_span = self.peek_span();
                let label = self.parse_label()?;
                if matches!(self.peek(), Some(Token::Equals)) {
                    self.advance();
                    let pat = self.parse_pat()?;
                    rows.push((label, pat));
                } else {
                    // Punning: `{x, y}` binds the fields to their own
                    // names, with optional `: ty` and `as p`.
                    if !label.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
                        return self.error(
                            "only alphanumeric labels can be abbreviated in a record pattern",
                            label_span,
                        );
                    }
                    let ty = if self.eat_kw(":") {
                        Some(self.parse_ty()?)
                    } else {
                        None
                    };
                    let pat = if self.eat_kw("as") {
                        let inner = self.parse_pat()?;
                        let span = label_span.merge(self.pat_span(inner));
                        self.alloc_pat(
                            PatKind::Layered {
                                var: label.clone(),
                                ty,
                                pat: inner,
                            },
                            span,
                        )
                    } else {
                        let ident = self.alloc_pat(
                            PatKind::Ident {
                                name: LongName::plain(label.clone()),
                                op: false,
                            },
                            label_span,
                        );
                        match ty {
                            Some(ty) => self.alloc_pat(
                                PatKind::Typed { pat: ident, ty },
                                label_span,
                            ),
                            None => ident,
                        }
                    };
                    rows.push((label, pat));
                }
                if !self.eat_kw(",") {
                    break;
                }
            }
        }
        let end = self.expect_kw("}")?;
        Ok(self.alloc_pat(
            PatKind::Record { rows, flexible },
            start.merge(end),
        ))
    }

    // ── Types ─────────────────────────────────────────────────────

    fn parse_ty(&mut self) -> Result<TyId> {
        let dom = self.parse_tuple_ty()?;
        if self.check_kw("->") {
            self.advance();
            let cod = self.parse_ty()?;
            let span = self.tree.tys[dom].span.merge(self.tree.tys[cod].span);
            return Ok(self.alloc_ty(TyExprKind::Fun(dom, cod), span));
        }
        Ok(dom)
    }

    fn parse_tuple_ty(&mut self) -> Result<TyId> {
        let first = self.parse_app_ty()?;
        if !matches!(self.peek(), Some(Token::Star)) {
            return Ok(first);
        }
        let mut items = vec![first];
        while matches!(self.peek(), Some(Token::Star)) {
            self.advance();
            items.push(self.parse_app_ty()?);
        }
        let span = self.tree.tys[items[0]].span.merge(self.prev_span());
        Ok(self.alloc_ty(TyExprKind::Tuple(items), span))
    }

    /// Postfix type application: `int list`, `('a, 'b) pair list`.
    fn parse_app_ty(&mut self) -> Result<TyId> {
        let mut args = self.parse_atomic_ty_args()?;
        loop {
            match self.peek() {
                Some(Token::AlphaId(name)) => {
                    let name = LongName::plain(name.clone());
                    let span = self.advance().1;
                    let full = args
                        .first()
                        .map(|&t| self.tree.tys[t].span.merge(span))
                        .unwrap_or(span);
                    let ty = self.alloc_ty(TyExprKind::Con { name, args }, full);
                    args = vec![ty];
                }
                Some(Token::LongId {
                    qualifiers,
                    name,
                    symbolic: false,
                }) => {
                    let name = LongName::qualified(qualifiers.clone(), name.clone());
                    let span = self.advance().1;
                    let full = args
                        .first()
                        .map(|&t| self.tree.tys[t].span.merge(span))
                        .unwrap_or(span);
                    let ty = self.alloc_ty(TyExprKind::Con { name, args }, full);
                    args = vec![ty];
                }
                _ => break,
            }
        }
        match args.len() {
            1 => Ok(args.pop().unwrap()),
            _ => self.error(
                "a parenthesized type sequence must be followed by a type constructor",
                self.peek_span(),
            ),
        }
    }

    /// One atomic type, or a parenthesized comma-sequence of types that a
    /// following constructor will consume as its arguments.
    fn parse_atomic_ty_args(&mut self) -> Result<Vec<TyId>> {
        let start = self.peek_span();
        match self.peek() {
            Some(Token::TyVar(name)) | Some(Token::EqTyVar(name)) => {
                let name = name.clone();
                self.advance();
                Ok(vec![self.alloc_ty(TyExprKind::Var(name), start)])
            }
            Some(Token::AlphaId(name)) => {
                let name = LongName::plain(name.clone());
                self.advance();
                Ok(vec![self.alloc_ty(
                    TyExprKind::Con {
                        name,
                        args: Vec::new(),
                    },
                    start,
                )])
            }
            Some(Token::LongId {
                qualifiers,
                name,
                symbolic: false,
            }) => {
                let name = LongName::qualified(qualifiers.clone(), name.clone());
                self.advance();
                Ok(vec![self.alloc_ty(
                    TyExprKind::Con {
                        name,
                        args: Vec::new(),
                    },
                    start,
                )])
            }
            Some(Token::Keyword(k)) if k.as_str() == "{" => {
                self.advance();
                let mut rows = Vec::new();
                if !self.check_kw("}") {
                    loop {
                        let label = self.parse_label()?;
                        self.expect_kw(":")?;
                        let ty = self.parse_ty()?;
                        rows.push((label, ty));
                        if !self.eat_kw(",") {
                            break;
                        }
                    }
                }
                let end = self.expect_kw("}")?;
                Ok(vec![
                    self.alloc_ty(TyExprKind::Record(rows), start.merge(end))
                ])
            }
            Some(Token::Keyword(k)) if k.as_str() == "(" => {
                self.advance();
                let mut items = vec![self.parse_ty()?];
                while self.eat_kw(",") {
                    items.push(self.parse_ty()?);
                }
                self.expect_kw(")")?;
                Ok(items)
            }
            _ => self.unexpected("expected a type"),
        }
    }
}

#[cfg(test)]
mod tests;
