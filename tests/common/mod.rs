//! Shared builder for translation-unit facts.
//!
//! Integration tests construct the frontend's output by hand: a source
//! buffer, expression nodes spanning pieces of it, and the macro event
//! streams. Span helpers locate text so tests read as source excerpts rather
//! than offset arithmetic.

#![allow(dead_code)]

use unmacro::forest::{ArgumentEvent, ExpansionEvent, MacroKind, MacroRecord};
use unmacro::syntax::{
    BinOp, CType, Expr, ExprArena, ExprId, FunctionDef, Span, Stmt, Storage, Symbol, SymbolKind,
    TranslationUnit, VarRef,
};

pub struct Facts {
    file: String,
    source: String,
    pub arena: ExprArena,
    functions: Vec<FunctionDef>,
    symbols: Vec<Symbol>,
    macro_defs: Vec<MacroRecord>,
    expansions: Vec<ExpansionEvent>,
}

impl Facts {
    pub fn new(file: &str, source: &str) -> Self {
        Facts {
            file: file.to_string(),
            source: source.to_string(),
            arena: ExprArena::new(),
            functions: Vec::new(),
            symbols: Vec::new(),
            macro_defs: Vec::new(),
            expansions: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Span helpers
    // ------------------------------------------------------------------

    pub fn span_of(&self, pat: &str) -> Span {
        self.span_of_nth(pat, 0)
    }

    pub fn span_of_last(&self, pat: &str) -> Span {
        let start = self.source.rfind(pat).expect("pattern not in source");
        Span::new(start, start + pat.len())
    }

    pub fn span_of_nth(&self, pat: &str, n: usize) -> Span {
        let mut from = 0;
        for _ in 0..n {
            let at = self.source[from..].find(pat).expect("pattern not in source");
            from += at + 1;
        }
        let at = self.source[from..].find(pat).expect("pattern not in source");
        let start = from + at;
        Span::new(start, start + pat.len())
    }

    // ------------------------------------------------------------------
    // Macro events
    // ------------------------------------------------------------------

    pub fn define_object(&mut self, name: &str, body: &str) {
        self.define(name, MacroKind::ObjectLike, body, false);
    }

    pub fn define_object_in_std_header(&mut self, name: &str, body: &str) {
        self.define(name, MacroKind::ObjectLike, body, true);
    }

    pub fn define_unary(&mut self, name: &str, param: &str, body: &str) {
        self.define(
            name,
            MacroKind::FunctionLike {
                params: vec![param.to_string()],
            },
            body,
            false,
        );
    }

    fn define(&mut self, name: &str, kind: MacroKind, body: &str, std_header: bool) {
        let directive = format!("#define {}", name);
        let start = self
            .source
            .find(&directive)
            .expect("directive not in source");
        let line_end = self.source[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(self.source.len());
        self.macro_defs.push(MacroRecord {
            name: name.to_string(),
            kind,
            body: body.to_string(),
            span: Span::new(start, line_end),
            insertion_point: line_end,
            defined_in_std_header: std_header,
        });
    }

    pub fn expand(&mut self, name: &str, span: Span, args: Vec<ArgumentEvent>) {
        self.expansions.push(ExpansionEvent {
            name: name.to_string(),
            span,
            args,
        });
    }

    pub fn arg(name: &str, spelling: &str, span: Span) -> ArgumentEvent {
        ArgumentEvent {
            name: name.to_string(),
            spelling: spelling.to_string(),
            span,
        }
    }

    // ------------------------------------------------------------------
    // Expression nodes
    // ------------------------------------------------------------------

    pub fn num(&mut self, value: i64, span: Span) -> ExprId {
        self.arena.alloc(Expr::Num(value), CType::int(), span)
    }

    pub fn var(&mut self, name: &str, storage: Storage, span: Span) -> ExprId {
        self.typed_var(name, storage, CType::int(), span)
    }

    pub fn typed_var(&mut self, name: &str, storage: Storage, ty: CType, span: Span) -> ExprId {
        self.arena.alloc(
            Expr::Var(VarRef {
                name: name.to_string(),
                storage,
            }),
            ty,
            span,
        )
    }

    pub fn paren(&mut self, inner: ExprId, span: Span) -> ExprId {
        self.arena.alloc(Expr::Paren(inner), CType::int(), span)
    }

    pub fn add(&mut self, lhs: ExprId, rhs: ExprId, span: Span) -> ExprId {
        self.arena.alloc(
            Expr::Binary {
                op: BinOp::Add,
                lhs,
                rhs,
            },
            CType::int(),
            span,
        )
    }

    pub fn assign(&mut self, target: &str, storage: Storage, value: ExprId, span: Span) -> ExprId {
        self.arena.alloc(
            Expr::Assign {
                target: VarRef {
                    name: target.to_string(),
                    storage,
                },
                value,
            },
            CType::int(),
            span,
        )
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    pub fn global_var(&mut self, name: &str) {
        self.symbols.push(Symbol {
            name: name.to_string(),
            kind: SymbolKind::Variable,
            storage: Storage::Global,
        });
    }

    pub fn function(&mut self, name: &str, body: Stmt) {
        self.functions.push(FunctionDef {
            name: name.to_string(),
            body,
        });
    }

    pub fn build(self) -> TranslationUnit {
        TranslationUnit {
            file: self.file,
            source: self.source,
            arena: self.arena,
            functions: self.functions,
            symbols: self.symbols,
            macro_defs: self.macro_defs,
            expansions: self.expansions,
        }
    }
}
