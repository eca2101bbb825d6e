//! 主机设备能够执行的 OpenCL C 子集。
//!
//! 只支持逐元素计算的内核：`__kernel void` 函数、标量局部变量、
//! 带下标的读写、`if` 分支、算术和比较运算，以及 `get_global_id` 等少量内建函数。
//! 所有数值按 `f64` 计算。

use logos::Logos;
use rayon::prelude::*;
use std::{collections::HashMap, ops::Range};

#[derive(Logos, Clone, Debug, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+|//[^\n]*|#[^\n]*")]
enum Token {
    #[token("/*", block_comment)]
    Comment,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?[fF]?", number)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?[fF]?", number)]
    Number(f64),

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
}

/// 跳到 `*/` 之后，没有结尾时报错。
fn block_comment(lex: &mut logos::Lexer<Token>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => {
            lex.bump(lex.remainder().len());
            false
        }
    }
}

fn number(lex: &mut logos::Lexer<Token>) -> Option<f64> {
    lex.slice()
        .trim_end_matches(|c| c == 'f' || c == 'F')
        .parse()
        .ok()
}

const TYPE_WORDS: &[&str] = &[
    "__global", "global", "__constant", "constant", "const", "restrict", "__restrict",
    "volatile", "unsigned", "signed", "char", "uchar", "short", "ushort", "int", "uint",
    "long", "ulong", "size_t", "bool", "float", "double",
];

#[inline]
fn is_type_word(word: &str) -> bool {
    TYPE_WORDS.contains(&word)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(super) enum ParamKind {
    Buffer,
    Scalar,
}

#[derive(Clone, Debug)]
pub(super) struct Param {
    pub name: String,
    pub kind: ParamKind,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    fn apply(self, l: f64, r: f64) -> f64 {
        let truth = |b: bool| if b { 1. } else { 0. };
        match self {
            Self::Add => l + r,
            Self::Sub => l - r,
            Self::Mul => l * r,
            Self::Div => l / r,
            Self::Lt => truth(l < r),
            Self::Le => truth(l <= r),
            Self::Gt => truth(l > r),
            Self::Ge => truth(l >= r),
            Self::Eq => truth(l == r),
            Self::Ne => truth(l != r),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Builtin {
    GlobalId,
    GlobalSize,
    Sqrt,
    Fabs,
    Exp,
    Log,
    Sin,
    Cos,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "get_global_id" => Self::GlobalId,
            "get_global_size" => Self::GlobalSize,
            "sqrt" => Self::Sqrt,
            "fabs" => Self::Fabs,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug)]
enum Expr {
    Num(f64),
    Var(usize),
    Load(usize, Box<Expr>),
    Call(Builtin, Box<Expr>),
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Clone, Debug)]
enum Stmt {
    Set(usize, Expr),
    Store(usize, Expr, Expr),
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    Return,
}

/// 编译后的内核。参数占据帧的前几个槽位，局部变量排在其后。
#[derive(Debug)]
pub(super) struct KernelDef {
    name: String,
    params: Vec<Param>,
    slots: usize,
    body: Vec<Stmt>,
}

/// 一个参数在发射时的视图。
pub(super) enum ArgView<'a> {
    Buffer { data: &'a [f64], writable: bool },
    Scalar(f64),
}

/// 工作项对存储区的一次写入，所有工作项完成后统一落盘。
#[derive(Clone, Copy, PartialEq, Debug)]
pub(super) struct Store {
    pub param: usize,
    pub index: usize,
    pub value: f64,
}

impl KernelDef {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// 在 `global` 个工作项上执行，返回全部写入。
    pub fn execute(&self, args: &[ArgView], global: usize) -> Result<Vec<Store>, String> {
        if args.len() != self.params.len() {
            return Err(format!(
                "kernel '{}' takes {} arguments, {} given",
                self.name,
                self.params.len(),
                args.len()
            ));
        }
        for (i, (param, arg)) in self.params.iter().zip(args).enumerate() {
            match (param.kind, arg) {
                (ParamKind::Buffer, ArgView::Buffer { .. })
                | (ParamKind::Scalar, ArgView::Scalar(_)) => {}
                (kind, _) => {
                    return Err(format!(
                        "argument #{i} '{}' of kernel '{}' must be a {}",
                        param.name,
                        self.name,
                        if kind == ParamKind::Buffer { "buffer" } else { "scalar" },
                    ))
                }
            }
        }

        let stores = (0..global)
            .into_par_iter()
            .map(|gid| {
                let mut item = Item::new(self, args, gid, global);
                item.exec(&self.body)?;
                Ok(item.stores)
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(stores.into_iter().flatten().collect())
    }
}

enum Flow {
    Next,
    Return,
}

struct Item<'a> {
    def: &'a KernelDef,
    args: &'a [ArgView<'a>],
    gid: usize,
    global: usize,
    frame: Vec<f64>,
    stores: Vec<Store>,
}

impl<'a> Item<'a> {
    fn new(def: &'a KernelDef, args: &'a [ArgView<'a>], gid: usize, global: usize) -> Self {
        let mut frame = vec![0.; def.slots];
        for (slot, arg) in frame.iter_mut().zip(args) {
            if let ArgView::Scalar(v) = arg {
                *slot = *v
            }
        }
        Self {
            def,
            args,
            gid,
            global,
            frame,
            stores: Vec::new(),
        }
    }

    fn exec(&mut self, stmts: &[Stmt]) -> Result<Flow, String> {
        for stmt in stmts {
            match stmt {
                Stmt::Set(slot, e) => self.frame[*slot] = self.eval(e)?,
                Stmt::Store(param, idx, e) => {
                    let (_, index, writable) = self.locate(*param, idx)?;
                    if !writable {
                        return Err(format!(
                            "work item {}: store to read-only buffer '{}'",
                            self.gid, self.def.params[*param].name
                        ));
                    }
                    let value = self.eval(e)?;
                    self.stores.push(Store {
                        param: *param,
                        index,
                        value,
                    })
                }
                Stmt::If(cond, then, otherwise) => {
                    let branch = if self.eval(cond)? != 0. { then } else { otherwise };
                    if let Flow::Return = self.exec(branch)? {
                        return Ok(Flow::Return);
                    }
                }
                Stmt::Return => return Ok(Flow::Return),
            }
        }
        Ok(Flow::Next)
    }

    fn eval(&self, e: &Expr) -> Result<f64, String> {
        Ok(match e {
            Expr::Num(v) => *v,
            Expr::Var(slot) => self.frame[*slot],
            Expr::Load(param, idx) => {
                let (data, index, _) = self.locate(*param, idx)?;
                // 先看本工作项自己的写入
                self.stores
                    .iter()
                    .rev()
                    .find(|s| s.param == *param && s.index == index)
                    .map_or(data[index], |s| s.value)
            }
            Expr::Call(f, arg) => {
                let x = self.eval(arg)?;
                match f {
                    Builtin::GlobalId if x == 0. => self.gid as f64,
                    Builtin::GlobalId => 0.,
                    Builtin::GlobalSize if x == 0. => self.global as f64,
                    Builtin::GlobalSize => 1.,
                    Builtin::Sqrt => x.sqrt(),
                    Builtin::Fabs => x.abs(),
                    Builtin::Exp => x.exp(),
                    Builtin::Log => x.ln(),
                    Builtin::Sin => x.sin(),
                    Builtin::Cos => x.cos(),
                }
            }
            Expr::Neg(e) => -self.eval(e)?,
            Expr::Bin(op, l, r) => op.apply(self.eval(l)?, self.eval(r)?),
        })
    }

    /// 求下标并检查越界。
    fn locate(&self, param: usize, idx: &Expr) -> Result<(&'a [f64], usize, bool), String> {
        let name = &self.def.params[param].name;
        let args: &'a [ArgView<'a>] = self.args;
        let ArgView::Buffer { data, writable } = &args[param] else {
            return Err(format!("argument '{name}' is not a buffer"));
        };
        let i = self.eval(idx)?;
        if i < 0. || i.fract() != 0. || i >= data.len() as f64 {
            return Err(format!(
                "work item {}: index {i} out of bounds for '{name}' of length {}",
                self.gid,
                data.len()
            ));
        }
        Ok((*data, i as usize, *writable))
    }
}

/// 编译源码中的全部内核，失败时返回构建日志。
pub(super) fn compile(src: &str) -> Result<Vec<KernelDef>, String> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(src);
    while let Some(token) = lexer.next() {
        match token {
            Ok(Token::Comment) => {}
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                let msg = if lexer.slice().starts_with("/*") {
                    "unterminated /* comment".to_string()
                } else {
                    format!("unexpected character '{}'", lexer.slice())
                };
                return Err(diagnose(src, lexer.span().start, &msg));
            }
        }
    }

    let mut parser = Parser {
        tokens,
        end: src.len(),
        pos: 0,
        scopes: Vec::new(),
        slots: 0,
        depth: 0,
    };
    let mut kernels = Vec::<KernelDef>::new();
    while parser.peek().is_some() {
        let at = parser.at();
        let def = parser.kernel().map_err(|(at, msg)| diagnose(src, at, &msg))?;
        if kernels.iter().any(|k| k.name == def.name) {
            return Err(diagnose(src, at, &format!("redefinition of kernel '{}'", def.name)));
        }
        kernels.push(def)
    }
    Ok(kernels)
}

fn diagnose(src: &str, at: usize, msg: &str) -> String {
    let before = &src[..at];
    let line = before.matches('\n').count() + 1;
    let start = before.rfind('\n').map_or(0, |i| i + 1);
    let end = src[at..].find('\n').map_or(src.len(), |i| at + i);
    let col = src[start..at].chars().count() + 1;
    format!(
        "<kernel>:{line}:{col}: error: {msg}\n{}\n{}^",
        &src[start..end],
        " ".repeat(col - 1)
    )
}

type PResult<T> = Result<T, (usize, String)>;

/// 语句和表达式的最大嵌套深度。
const MAX_DEPTH: usize = 128;

#[derive(Clone, Copy)]
struct Var {
    slot: usize,
    buffer: bool,
}

struct Parser {
    tokens: Vec<(Token, Range<usize>)>,
    end: usize,
    pos: usize,
    /// 由外到内的作用域，参数在最外层。
    scopes: Vec<HashMap<String, Var>>,
    slots: usize,
    depth: usize,
}

impl Parser {
    #[inline]
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    #[inline]
    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    #[inline]
    fn at(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, span)| span.start)
    }

    fn error<T>(&self, msg: impl Into<String>) -> PResult<T> {
        Err((self.at(), msg.into()))
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, text: &str) -> PResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            self.error(format!("expected '{text}'"))
        }
    }

    fn ident(&mut self) -> PResult<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => self.error("expected identifier"),
        }
    }

    fn keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// 在最内层作用域声明变量。槽位只增不减，内层块结束后不复用。
    fn declare(&mut self, name: String, at: usize, buffer: bool) -> PResult<usize> {
        let Some(scope) = self.scopes.last_mut() else {
            return Err((at, format!("declaration of '{name}' outside of a kernel")));
        };
        if scope.contains_key(&name) {
            return Err((at, format!("redefinition of '{name}'")));
        }
        let slot = self.slots;
        self.slots += 1;
        scope.insert(name, Var { slot, buffer });
        Ok(slot)
    }

    fn lookup(&self, name: &str, at: usize) -> PResult<Var> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
            .ok_or_else(|| (at, format!("use of undeclared identifier '{name}'")))
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth == MAX_DEPTH {
            return self.error("nesting too deep");
        }
        self.depth += 1;
        let ans = f(self);
        self.depth -= 1;
        ans
    }

    fn kernel(&mut self) -> PResult<KernelDef> {
        if !(self.keyword("__kernel") || self.keyword("kernel")) {
            return self.error("expected '__kernel' function definition");
        }
        if !self.keyword("void") {
            return self.error("kernel function must return 'void'");
        }
        let name = self.ident()?;
        self.scopes = vec![HashMap::new()];
        self.slots = 0;
        self.depth = 0;

        self.expect(Token::LParen, "(")?;
        let mut params = Vec::new();
        let void = matches!(self.peek(), Some(Token::Ident(w)) if w == "void")
            && self.peek_at(1) == Some(&Token::RParen);
        if void {
            self.pos += 2
        } else if !self.eat(&Token::RParen) {
            loop {
                params.push(self.param()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma, ",")?;
            }
        }

        // 函数体与参数同属一个作用域
        let body = self.block(false)?;
        Ok(KernelDef {
            name,
            params,
            slots: self.slots,
            body,
        })
    }

    fn param(&mut self) -> PResult<Param> {
        let mut words = Vec::new();
        let mut pointer = false;
        loop {
            match self.peek() {
                Some(Token::Ident(word)) => {
                    words.push((word.clone(), self.at()));
                    self.pos += 1
                }
                Some(Token::Star) => {
                    pointer = true;
                    self.pos += 1
                }
                _ => break,
            }
        }
        let Some((name, at)) = words.pop() else {
            return self.error("expected parameter declarator");
        };
        if words.is_empty() || is_type_word(&name) {
            return Err((at, format!("expected type and name for parameter, got '{name}'")));
        }
        if let Some((word, at)) = words.iter().find(|(w, _)| !is_type_word(w)) {
            return Err((*at, format!("unknown type name '{word}'")));
        }
        let kind = if pointer {
            ParamKind::Buffer
        } else {
            ParamKind::Scalar
        };
        self.declare(name.clone(), at, pointer)?;
        Ok(Param { name, kind })
    }

    fn block(&mut self, scoped: bool) -> PResult<Vec<Stmt>> {
        self.expect(Token::LBrace, "{")?;
        if scoped {
            self.scopes.push(HashMap::new())
        }
        let mut stmts = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.peek().is_none() {
                return self.error("expected '}'");
            }
            stmts.extend(self.stmt()?)
        }
        if scoped {
            self.scopes.pop();
        }
        Ok(stmts)
    }

    #[inline]
    fn stmt(&mut self) -> PResult<Vec<Stmt>> {
        self.nested(Self::statement)
    }

    fn statement(&mut self) -> PResult<Vec<Stmt>> {
        match self.peek() {
            Some(Token::LBrace) => self.block(true),
            Some(Token::Semi) => {
                self.pos += 1;
                Ok(vec![])
            }
            Some(Token::Ident(word)) => match word.as_str() {
                "if" => {
                    self.pos += 1;
                    self.expect(Token::LParen, "(")?;
                    let cond = self.expr()?;
                    self.expect(Token::RParen, ")")?;
                    let then = self.stmt()?;
                    let otherwise = if self.keyword("else") {
                        self.stmt()?
                    } else {
                        vec![]
                    };
                    Ok(vec![Stmt::If(cond, then, otherwise)])
                }
                "return" => {
                    self.pos += 1;
                    self.expect(Token::Semi, ";")?;
                    Ok(vec![Stmt::Return])
                }
                w if is_type_word(w) => self.declaration(),
                _ => self.assignment().map(|s| vec![s]),
            },
            _ => self.error("expected statement"),
        }
    }

    fn declaration(&mut self) -> PResult<Vec<Stmt>> {
        while matches!(self.peek(), Some(Token::Ident(w)) if is_type_word(w)) {
            self.pos += 1
        }
        if self.peek() == Some(&Token::Star) {
            return self.error("pointer variables are not supported");
        }
        let mut stmts = Vec::new();
        loop {
            let at = self.at();
            let name = self.ident()?;
            let init = if self.eat(&Token::Assign) {
                self.expr()?
            } else {
                Expr::Num(0.)
            };
            let slot = self.declare(name, at, false)?;
            stmts.push(Stmt::Set(slot, init));
            if self.eat(&Token::Semi) {
                return Ok(stmts);
            }
            self.expect(Token::Comma, ";")?;
        }
    }

    fn assignment(&mut self) -> PResult<Stmt> {
        let at = self.at();
        let name = self.ident()?;
        let var = self.lookup(&name, at)?;
        let index = if self.eat(&Token::LBracket) {
            if !var.buffer {
                return Err((at, format!("subscripted value '{name}' is not a pointer")));
            }
            let index = self.expr()?;
            self.expect(Token::RBracket, "]")?;
            Some(index)
        } else if var.buffer {
            return Err((at, format!("pointer parameter '{name}' is not assignable")));
        } else {
            None
        };

        let op = match self.peek() {
            Some(Token::Assign) => None,
            Some(Token::PlusAssign) => Some(BinOp::Add),
            Some(Token::MinusAssign) => Some(BinOp::Sub),
            Some(Token::StarAssign) => Some(BinOp::Mul),
            Some(Token::SlashAssign) => Some(BinOp::Div),
            _ => return self.error("expected '='"),
        };
        self.pos += 1;
        let mut value = self.expr()?;
        self.expect(Token::Semi, ";")?;

        Ok(match index {
            Some(index) => {
                if let Some(op) = op {
                    let old = Expr::Load(var.slot, Box::new(index.clone()));
                    value = Expr::Bin(op, Box::new(old), Box::new(value))
                }
                Stmt::Store(var.slot, index, value)
            }
            None => {
                if let Some(op) = op {
                    value = Expr::Bin(op, Box::new(Expr::Var(var.slot)), Box::new(value))
                }
                Stmt::Set(var.slot, value)
            }
        })
    }

    #[inline]
    fn expr(&mut self) -> PResult<Expr> {
        self.nested(Self::equality)
    }

    /// 左结合的二元运算链。每多一个运算符，求值时就多一层递归，因此也计入嵌套深度。
    fn binary(
        &mut self,
        operand: fn(&mut Self) -> PResult<Expr>,
        pick: fn(&Token) -> Option<BinOp>,
    ) -> PResult<Expr> {
        let depth = self.depth;
        let mut l = operand(self)?;
        while let Some(op) = self.peek().and_then(pick) {
            if self.depth == MAX_DEPTH {
                return self.error("nesting too deep");
            }
            self.depth += 1;
            self.pos += 1;
            l = Expr::Bin(op, Box::new(l), Box::new(operand(self)?))
        }
        self.depth = depth;
        Ok(l)
    }

    fn equality(&mut self) -> PResult<Expr> {
        self.binary(Self::relational, |t| match t {
            Token::EqEq => Some(BinOp::Eq),
            Token::Ne => Some(BinOp::Ne),
            _ => None,
        })
    }

    fn relational(&mut self) -> PResult<Expr> {
        self.binary(Self::additive, |t| match t {
            Token::Lt => Some(BinOp::Lt),
            Token::Le => Some(BinOp::Le),
            Token::Gt => Some(BinOp::Gt),
            Token::Ge => Some(BinOp::Ge),
            _ => None,
        })
    }

    fn additive(&mut self) -> PResult<Expr> {
        self.binary(Self::term, |t| match t {
            Token::Plus => Some(BinOp::Add),
            Token::Minus => Some(BinOp::Sub),
            _ => None,
        })
    }

    fn term(&mut self) -> PResult<Expr> {
        self.binary(Self::unary, |t| match t {
            Token::Star => Some(BinOp::Mul),
            Token::Slash => Some(BinOp::Div),
            _ => None,
        })
    }

    fn unary(&mut self) -> PResult<Expr> {
        if self.eat(&Token::Minus) {
            Ok(Expr::Neg(Box::new(self.nested(Self::unary)?)))
        } else if self.eat(&Token::Plus) {
            self.nested(Self::unary)
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> PResult<Expr> {
        let at = self.at();
        match self.peek().cloned() {
            Some(Token::Number(v)) => {
                self.pos += 1;
                Ok(Expr::Num(v))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                if matches!(self.peek(), Some(Token::Ident(w)) if is_type_word(w)) {
                    // 类型转换，数值一律按 f64 处理
                    while matches!(self.peek(), Some(Token::Ident(w)) if is_type_word(w)) {
                        self.pos += 1
                    }
                    self.expect(Token::RParen, ")")?;
                    return self.nested(Self::unary);
                }
                let e = self.expr()?;
                self.expect(Token::RParen, ")")?;
                Ok(e)
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                if self.eat(&Token::LParen) {
                    let Some(f) = Builtin::lookup(&name) else {
                        return Err((at, format!("implicit declaration of function '{name}'")));
                    };
                    let arg = self.expr()?;
                    self.expect(Token::RParen, ")")?;
                    return Ok(Expr::Call(f, Box::new(arg)));
                }
                let var = self.lookup(&name, at)?;
                if self.eat(&Token::LBracket) {
                    if !var.buffer {
                        return Err((at, format!("subscripted value '{name}' is not a pointer")));
                    }
                    let index = self.expr()?;
                    self.expect(Token::RBracket, "]")?;
                    Ok(Expr::Load(var.slot, Box::new(index)))
                } else if var.buffer {
                    Err((at, format!("pointer parameter '{name}' used as a value")))
                } else {
                    Ok(Expr::Var(var.slot))
                }
            }
            _ => self.error("expected expression"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{compile, ArgView, ParamKind, Store};

    const VEC_MULT: &str = include_str!("../../../kernels/vec_mult.cl");

    fn run(src: &str, args: &[ArgView], global: usize) -> Result<Vec<Store>, String> {
        let kernels = compile(src).unwrap();
        kernels[0].execute(args, global)
    }

    /// 用一个工作项执行只有一个输出参数的 kernel。
    fn outputs(src: &str, len: usize) -> Vec<f64> {
        let y = vec![0.; len];
        let mut ans = y.clone();
        for s in run(src, &[ArgView::Buffer { data: &y, writable: true }], 1).unwrap() {
            ans[s.index] = s.value
        }
        ans
    }

    #[test]
    fn test_compile_signature() {
        let kernels = compile(VEC_MULT).unwrap();
        assert_eq!(kernels.len(), 1);
        let k = &kernels[0];
        assert_eq!(k.name(), "vec_mult");
        let kinds = k.params().iter().map(|p| p.kind).collect::<Vec<_>>();
        use ParamKind::*;
        assert_eq!(kinds, [Buffer, Buffer, Buffer, Scalar]);
    }

    #[test]
    fn test_execute() {
        let out = [0.; 4];
        let stores = run(
            VEC_MULT,
            &[
                ArgView::Buffer { data: &out, writable: true },
                ArgView::Buffer { data: &[0., 1., 2., 3.], writable: false },
                ArgView::Buffer { data: &[1., 1.5, 2., 2.5], writable: false },
                ArgView::Scalar(4.),
            ],
            4,
        )
        .unwrap();
        let mut ans = out;
        for Store { param, index, value } in stores {
            assert_eq!(param, 0);
            ans[index] = value
        }
        assert_eq!(ans, [0., 1.5, 4., 7.5]);
    }

    #[test]
    fn test_guard_and_operators() {
        let src = r"
            /* two entry points */
            __kernel void first(__global double *y, const uint n) { y[0] = 1; }
            kernel void axpy(global double* y, global const double* x, double a, ulong n) {
                size_t i = get_global_id(0), last = n - 1;
                if (i >= get_global_size(0) - 2) return;
                double t = (double) x[i];
                t *= a;
                y[i] += -t + 2.5e0f / 2;
                if (i == last) y[i] = sqrt(16.) - fabs(-1);
                else { y[i] -= 0; }
            }";
        let kernels = compile(src).unwrap();
        assert_eq!(kernels[1].name(), "axpy");
        let y = [10., 20., 30.];
        let stores = kernels[1]
            .execute(
                &[
                    ArgView::Buffer { data: &y, writable: true },
                    ArgView::Buffer { data: &[1., 2., 3.], writable: false },
                    ArgView::Scalar(2.),
                    ArgView::Scalar(3.),
                ],
                5,
            )
            .unwrap();
        let mut ans = y;
        for s in stores {
            ans[s.index] = s.value
        }
        assert_eq!(ans, [9.25, 17.25, 3.]);
    }

    #[test]
    fn test_block_comments() {
        let src = "/**/ __kernel void k(__global double *y) {
            /* a * b **/ y[0] = 2 /* * */ * 3;
            /*
            y[1] = 1;
            */
        }";
        assert_eq!(outputs(src, 2), [6., 0.]);

        let log = compile("__kernel void k() { }\n/* open").unwrap_err();
        assert!(log.starts_with("<kernel>:2:1:"), "{log}");
        assert!(log.contains("unterminated /* comment"), "{log}");
    }

    #[test]
    fn test_block_scopes() {
        let src = "__kernel void k(__global double *y) {
            double t = 1;
            if (t > 0) { double u = 2; y[0] = u; } else { double u = 3; y[0] = u; }
            { double t = 5; y[1] = t; }
            y[2] = t;
        }";
        assert_eq!(outputs(src, 3), [2., 5., 1.]);
    }

    #[test]
    fn test_precedence() {
        let src = "__kernel void k(__global double *y) {
            y[0] = 2 == 1 < 3;
            y[1] = 1 + 1 == 2;
            y[2] = 3 > 2 > 1;
            y[3] = 1 - 2 * 3 != -5;
        }";
        assert_eq!(outputs(src, 4), [0., 1., 0., 0.]);
    }

    #[test]
    fn test_nesting_limit() {
        let kernel = |body: String| format!("__kernel void k(__global double *y) {{ {body} }}");
        let n = 10000;
        for body in [
            format!("y[0] = {}1{};", "(".repeat(n), ")".repeat(n)),
            format!("y[0] = {}1;", "-".repeat(n)),
            format!("y[0] = {}1;", "(double)".repeat(n)),
            format!("y[0] = 1{};", " + 1".repeat(n)),
            format!("{} y[0] = 1; {}", "{".repeat(n), "}".repeat(n)),
            format!("{} y[0] = 1;", "if (1) ".repeat(n)),
        ] {
            let log = compile(&kernel(body)).unwrap_err();
            assert!(log.contains("nesting too deep"), "{log}");
        }

        let n = 32;
        let src = kernel(format!(
            "{} y[0] = {}1{} + 1 + 1; {}",
            "{".repeat(n),
            "(".repeat(n),
            ")".repeat(n),
            "}".repeat(n)
        ));
        assert_eq!(outputs(&src, 1), [3.]);
    }

    #[test]
    fn test_build_log() {
        for (src, msg, line) in [
            ("__kernel void k(__global double *y) {\n  y[0] = 1\n}", "expected ';'", 3),
            ("__kernel void k(__global double *y) {\n  z[0] = 1;\n}", "undeclared identifier 'z'", 2),
            ("__kernel void k(__global matrix *y) { }", "unknown type name 'matrix'", 1),
            ("__kernel void k(double y) {\n  y[0] = 1;\n}", "is not a pointer", 2),
            ("int k() { }", "expected '__kernel'", 1),
            ("__kernel void k() { foo(1); }", "undeclared identifier 'foo'", 1),
            ("__kernel void k(double x) { x (1); }", "expected '='", 1),
            ("__kernel void k() { double x = bar(1); }", "implicit declaration", 1),
            ("__kernel void k() { double x = 1 @ 2; }", "unexpected character '@'", 1),
            ("__kernel void k() { }\n__kernel void k() { }", "redefinition of kernel 'k'", 2),
            ("__kernel void k(__global double *y) {\n  { double t = 1; }\n  y[0] = t;\n}", "undeclared identifier 't'", 3),
            ("__kernel void k(double x) {\n  if (x > 0) { double u = 1; double u = 2; }\n}", "redefinition of 'u'", 2),
            ("__kernel void k(double x) {\n  double x = 1;\n}", "redefinition of 'x'", 2),
        ] {
            let log = compile(src).unwrap_err();
            assert!(log.contains(msg), "{log}");
            assert!(log.starts_with(&format!("<kernel>:{line}:")), "{log}");
        }
    }

    #[test]
    fn test_faults() {
        let src = "__kernel void k(__global double *y, __global const double *x) { y[get_global_id(0)] = x[get_global_id(0) + 1]; }";
        let y = [0.; 2];
        let x = [1., 2.];
        let err = run(
            src,
            &[
                ArgView::Buffer { data: &y, writable: true },
                ArgView::Buffer { data: &x, writable: false },
            ],
            2,
        )
        .unwrap_err();
        assert!(err.contains("out of bounds for 'x'"), "{err}");

        let err = run(
            src,
            &[
                ArgView::Buffer { data: &y, writable: false },
                ArgView::Buffer { data: &x, writable: false },
            ],
            1,
        )
        .unwrap_err();
        assert!(err.contains("read-only buffer 'y'"), "{err}");

        let err = run(src, &[ArgView::Scalar(1.), ArgView::Scalar(1.)], 1).unwrap_err();
        assert!(err.contains("must be a buffer"), "{err}");
    }
}
