//! Sandboxed expression evaluator behind the admin `eval` command.
//!
//! The language has literals (numbers, strings, booleans, `null`, lists), arithmetic,
//! comparison and boolean operators, indexing and a fixed set of pure functions. There are
//! no variables, no assignment, no loops and no access to anything outside the expression.
//!
//! Caps: input `MAX_INPUT_CHARS` (400), nesting `MAX_DEPTH` (32), strings
//! `MAX_STR_CHARS` (1000), lists `MAX_LIST_ITEMS` (100).

use crate::reply::one_line;

const MAX_INPUT_CHARS: usize = 400;
const MAX_DEPTH: usize = 32;
const MAX_STR_CHARS: usize = 1000;
const MAX_LIST_ITEMS: usize = 100;

const FUNCTIONS: [&str; 13] = [
    "len", "upper", "lower", "trim", "abs", "floor", "ceil", "round", "sqrt", "min", "max",
    "str", "num",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Result of an empty expression or an out-of-range index.
    Absent,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError(pub String);

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for EvalError {}

type EResult<T> = std::result::Result<T, EvalError>;

fn err<T>(msg: impl Into<String>) -> EResult<T> {
    Err(EvalError(msg.into()))
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Absent => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
        }
    }

    /// Text form used for chat output and string concatenation.
    pub fn render(&self) -> String {
        match self {
            Value::Absent => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => fmt_num(*n),
            Value::Str(s) => s.clone(),
            Value::List(_) => self.to_json().to_string(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Absent | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

fn fmt_num(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Evaluates `src` and renders the result as a single chat line.
pub fn eval_to_line(src: &str) -> EResult<String> {
    Ok(one_line(&eval(src)?.render()))
}

pub fn eval(src: &str) -> EResult<Value> {
    if src.chars().count() > MAX_INPUT_CHARS {
        return err(format!("expression longer than {MAX_INPUT_CHARS} characters"));
    }
    let toks = lex(src)?;
    if toks.is_empty() {
        return Ok(Value::Absent);
    }
    let mut p = Parser {
        toks,
        pos: 0,
        depth: 0,
    };
    let v = p.expr()?;
    match p.peek() {
        None => Ok(v),
        Some(t) => err(format!("unexpected {}", t.describe())),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Num(n) => format!("number {}", fmt_num(*n)),
            Tok::Str(_) => "string".to_string(),
            Tok::Ident(s) => format!("'{s}'"),
            Tok::Op(op) => format!("'{op}'"),
            Tok::LParen => "'('".to_string(),
            Tok::RParen => "')'".to_string(),
            Tok::LBracket => "'['".to_string(),
            Tok::RBracket => "']'".to_string(),
            Tok::Comma => "','".to_string(),
        }
    }
}

// Longest first so `**` wins over `*`.
const OPS: [&str; 15] = [
    "**", "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!",
];

fn lex(src: &str) -> EResult<Vec<Tok>> {
    let chars = src.chars().collect::<Vec<_>>();
    let mut out = Vec::new();
    let mut i = 0usize;

    'outer: while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text = chars[start..i].iter().collect::<String>();
            let n = text
                .parse::<f64>()
                .map_err(|_| EvalError(format!("bad number '{text}'")))?;
            out.push(Tok::Num(n));
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            let mut s = String::new();
            while i < chars.len() {
                let ch = chars[i];
                i += 1;
                if ch == quote {
                    out.push(Tok::Str(s));
                    continue 'outer;
                }
                if ch == '\\' {
                    let Some(&esc) = chars.get(i) else {
                        break;
                    };
                    i += 1;
                    s.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                } else {
                    s.push(ch);
                }
            }
            return err("unterminated string");
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            out.push(Tok::Ident(chars[start..i].iter().collect()));
            continue;
        }

        let simple = match c {
            '(' => Some(Tok::LParen),
            ')' => Some(Tok::RParen),
            '[' => Some(Tok::LBracket),
            ']' => Some(Tok::RBracket),
            ',' => Some(Tok::Comma),
            _ => None,
        };
        if let Some(t) = simple {
            out.push(t);
            i += 1;
            continue;
        }

        for op in OPS {
            let n = op.chars().count();
            if chars.len() - i >= n && chars[i..i + n].iter().copied().eq(op.chars()) {
                out.push(Tok::Op(op));
                i += n;
                continue 'outer;
            }
        }

        return err(format!("unexpected character '{c}'"));
    }

    Ok(out)
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Tok::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn expect(&mut self, want: &Tok) -> EResult<()> {
        match self.next() {
            Some(t) if &t == want => Ok(()),
            Some(t) => err(format!("expected {}, found {}", want.describe(), t.describe())),
            None => err(format!("expected {}, found end of input", want.describe())),
        }
    }

    fn enter(&mut self) -> EResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return err("expression nested too deeply");
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn expr(&mut self) -> EResult<Value> {
        self.enter()?;
        let v = self.or();
        self.leave();
        v
    }

    fn or(&mut self) -> EResult<Value> {
        let mut lhs = self.and()?;
        while self.eat_op(&["||"]).is_some() {
            let rhs = self.and()?;
            lhs = Value::Bool(as_bool(&lhs, "||")? || as_bool(&rhs, "||")?);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> EResult<Value> {
        let mut lhs = self.equality()?;
        while self.eat_op(&["&&"]).is_some() {
            let rhs = self.equality()?;
            lhs = Value::Bool(as_bool(&lhs, "&&")? && as_bool(&rhs, "&&")?);
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> EResult<Value> {
        let mut lhs = self.comparison()?;
        while let Some(op) = self.eat_op(&["==", "!="]) {
            let rhs = self.comparison()?;
            let eq = lhs == rhs;
            lhs = Value::Bool(if op == "==" { eq } else { !eq });
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> EResult<Value> {
        let mut lhs = self.additive()?;
        while let Some(op) = self.eat_op(&["<", "<=", ">", ">="]) {
            let rhs = self.additive()?;
            let ord = match (&lhs, &rhs) {
                (Value::Num(a), Value::Num(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                (a, b) => {
                    return err(format!(
                        "can't compare {} with {}",
                        a.type_name(),
                        b.type_name()
                    ))
                }
            };
            let r = match (op, ord) {
                (_, None) => false,
                ("<", Some(o)) => o.is_lt(),
                ("<=", Some(o)) => o.is_le(),
                (">", Some(o)) => o.is_gt(),
                (_, Some(o)) => o.is_ge(),
            };
            lhs = Value::Bool(r);
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> EResult<Value> {
        let mut lhs = self.multiplicative()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let rhs = self.multiplicative()?;
            lhs = match (op, lhs, rhs) {
                ("+", Value::Num(a), Value::Num(b)) => Value::Num(a + b),
                ("+", Value::List(mut a), Value::List(b)) => {
                    a.extend(b);
                    checked(Value::List(a))?
                }
                ("+", a @ Value::Str(_), b) | ("+", a, b @ Value::Str(_)) => {
                    checked(Value::Str(a.render() + &b.render()))?
                }
                ("-", Value::Num(a), Value::Num(b)) => Value::Num(a - b),
                (op, a, b) => return type_err(op, &a, &b),
            };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> EResult<Value> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            let rhs = self.unary()?;
            lhs = match (op, lhs, rhs) {
                ("*", Value::Num(a), Value::Num(b)) => Value::Num(a * b),
                ("*", Value::Str(s), Value::Num(n)) | ("*", Value::Num(n), Value::Str(s)) => {
                    repeat(&s, n)?
                }
                ("/", Value::Num(_), Value::Num(b)) if b == 0.0 => return err("division by zero"),
                ("/", Value::Num(a), Value::Num(b)) => Value::Num(a / b),
                ("%", Value::Num(_), Value::Num(b)) if b == 0.0 => return err("division by zero"),
                ("%", Value::Num(a), Value::Num(b)) => Value::Num(a % b),
                (op, a, b) => return type_err(op, &a, &b),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> EResult<Value> {
        if let Some(op) = self.eat_op(&["-", "!"]) {
            self.enter()?;
            let v = self.unary();
            self.leave();
            return match (op, v?) {
                ("-", Value::Num(n)) => Ok(Value::Num(-n)),
                ("!", Value::Bool(b)) => Ok(Value::Bool(!b)),
                (op, v) => err(format!("can't apply '{op}' to {}", v.type_name())),
            };
        }
        self.power()
    }

    fn power(&mut self) -> EResult<Value> {
        let base = self.postfix()?;
        if self.eat_op(&["**"]).is_none() {
            return Ok(base);
        }
        // Right-associative; the exponent may carry its own sign.
        self.enter()?;
        let exp = self.unary();
        self.leave();
        match (base, exp?) {
            (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a.powf(b))),
            (a, b) => type_err("**", &a, &b),
        }
    }

    fn postfix(&mut self) -> EResult<Value> {
        let mut v = self.primary()?;
        while matches!(self.peek(), Some(Tok::LBracket)) {
            self.pos += 1;
            let idx = self.expr()?;
            self.expect(&Tok::RBracket)?;
            v = index(v, idx)?;
        }
        Ok(v)
    }

    fn primary(&mut self) -> EResult<Value> {
        match self.next() {
            Some(Tok::Num(n)) => Ok(Value::Num(n)),
            Some(Tok::Str(s)) => checked(Value::Str(s)),
            Some(Tok::LParen) => {
                let v = self.expr()?;
                self.expect(&Tok::RParen)?;
                Ok(v)
            }
            Some(Tok::LBracket) => {
                let items = self.list_items(Tok::RBracket)?;
                checked(Value::List(items))
            }
            Some(Tok::Ident(name)) => match name.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" => Ok(Value::Null),
                "undefined" => Ok(Value::Absent),
                "pi" => Ok(Value::Num(std::f64::consts::PI)),
                _ if FUNCTIONS.contains(&name.as_str()) => {
                    self.expect(&Tok::LParen)?;
                    let args = self.list_items(Tok::RParen)?;
                    call(&name, args)
                }
                _ => err(format!("unknown name '{name}'")),
            },
            Some(t) => err(format!("unexpected {}", t.describe())),
            None => err("unexpected end of input"),
        }
    }

    /// Comma-separated expressions up to `close`, which is consumed.
    fn list_items(&mut self, close: Tok) -> EResult<Vec<Value>> {
        let mut items = Vec::new();
        if self.peek() == Some(&close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.expr()?);
            if items.len() > MAX_LIST_ITEMS {
                return err(format!("more than {MAX_LIST_ITEMS} items"));
            }
            match self.next() {
                Some(Tok::Comma) => continue,
                Some(t) if t == close => return Ok(items),
                Some(t) => return err(format!("expected ',' or {}, found {}", close.describe(), t.describe())),
                None => return err(format!("expected {}, found end of input", close.describe())),
            }
        }
    }
}

fn as_bool(v: &Value, op: &str) -> EResult<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        other => err(format!("'{op}' needs booleans, got {}", other.type_name())),
    }
}

fn type_err<T>(op: &str, a: &Value, b: &Value) -> EResult<T> {
    err(format!(
        "can't apply '{op}' to {} and {}",
        a.type_name(),
        b.type_name()
    ))
}

fn checked(v: Value) -> EResult<Value> {
    match &v {
        Value::Str(s) if s.chars().count() > MAX_STR_CHARS => {
            err(format!("string longer than {MAX_STR_CHARS} characters"))
        }
        Value::List(items) if items.len() > MAX_LIST_ITEMS => {
            err(format!("list longer than {MAX_LIST_ITEMS} items"))
        }
        _ => Ok(v),
    }
}

fn as_count(n: f64) -> Option<usize> {
    if n.fract() != 0.0 || n < 0.0 || !n.is_finite() {
        return None;
    }
    // Anything this large already blows the size caps.
    if n > 1e9 {
        return Some(usize::MAX);
    }
    Some(n as usize)
}

fn repeat(s: &str, n: f64) -> EResult<Value> {
    let Some(count) = as_count(n) else {
        return err("repeat count must be a non-negative whole number");
    };
    let len = s.chars().count();
    if len.saturating_mul(count) > MAX_STR_CHARS {
        return err(format!("string longer than {MAX_STR_CHARS} characters"));
    }
    Ok(Value::Str(s.repeat(count)))
}

fn index(v: Value, idx: Value) -> EResult<Value> {
    let Value::Num(n) = idx else {
        return err(format!("index must be a number, got {}", idx.type_name()));
    };
    let Some(i) = as_count(n) else {
        return Ok(Value::Absent);
    };
    match v {
        Value::List(items) => Ok(items.into_iter().nth(i).unwrap_or(Value::Absent)),
        Value::Str(s) => Ok(s
            .chars()
            .nth(i)
            .map(|c| Value::Str(c.to_string()))
            .unwrap_or(Value::Absent)),
        other => err(format!("can't index into {}", other.type_name())),
    }
}

fn call(name: &str, args: Vec<Value>) -> EResult<Value> {
    let one = |args: &[Value]| -> EResult<Value> {
        match args {
            [v] => Ok(v.clone()),
            _ => err(format!("{name}() takes exactly one argument")),
        }
    };
    let num = |args: &[Value]| -> EResult<f64> {
        match one(args)? {
            Value::Num(n) => Ok(n),
            other => err(format!("{name}() needs a number, got {}", other.type_name())),
        }
    };
    let text = |args: &[Value]| -> EResult<String> {
        match one(args)? {
            Value::Str(s) => Ok(s),
            other => err(format!("{name}() needs a string, got {}", other.type_name())),
        }
    };

    match name {
        "len" => match one(&args)? {
            Value::Str(s) => Ok(Value::Num(s.chars().count() as f64)),
            Value::List(items) => Ok(Value::Num(items.len() as f64)),
            other => err(format!("len() needs a string or list, got {}", other.type_name())),
        },
        "upper" => checked(Value::Str(text(&args)?.to_uppercase())),
        "lower" => checked(Value::Str(text(&args)?.to_lowercase())),
        "trim" => Ok(Value::Str(text(&args)?.trim().to_string())),
        "abs" => Ok(Value::Num(num(&args)?.abs())),
        "floor" => Ok(Value::Num(num(&args)?.floor())),
        "ceil" => Ok(Value::Num(num(&args)?.ceil())),
        "round" => Ok(Value::Num(num(&args)?.round())),
        "sqrt" => Ok(Value::Num(num(&args)?.sqrt())),
        "min" | "max" => {
            if args.is_empty() {
                return err(format!("{name}() needs at least one argument"));
            }
            let mut best: Option<f64> = None;
            for a in &args {
                let Value::Num(n) = a else {
                    return err(format!("{name}() needs numbers, got {}", a.type_name()));
                };
                best = Some(match best {
                    None => *n,
                    Some(b) if name == "min" => b.min(*n),
                    Some(b) => b.max(*n),
                });
            }
            Ok(Value::Num(best.unwrap_or(f64::NAN)))
        }
        "str" => checked(Value::Str(one(&args)?.render())),
        "num" => match one(&args)? {
            Value::Num(n) => Ok(Value::Num(n)),
            Value::Bool(b) => Ok(Value::Num(if b { 1.0 } else { 0.0 })),
            Value::Str(s) => Ok(Value::Num(s.trim().parse::<f64>().unwrap_or(f64::NAN))),
            other => err(format!("num() can't convert {}", other.type_name())),
        },
        _ => err(format!("unknown function '{name}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(src: &str) -> String {
        eval_to_line(src).unwrap_or_else(|e| panic!("{src}: {e}"))
    }

    fn fails(src: &str) -> String {
        match eval(src) {
            Ok(v) => panic!("{src} evaluated to {v:?}"),
            Err(e) => e.0,
        }
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(line("1 + 2 * 3"), "7");
        assert_eq!(line("(1 + 2) * 3"), "9");
        assert_eq!(line("2 ** 3 ** 2"), "512");
        assert_eq!(line("-2 ** 2"), "-4");
        assert_eq!(line("7 % 3"), "1");
        assert_eq!(line("1 / 4"), "0.25");
        assert_eq!(line("1e3 + .5"), "1000.5");
    }

    #[test]
    fn renders_each_type() {
        assert_eq!(line("'a\\tb' + \"\\nc\""), "a b c");
        assert_eq!(line("1 < 2 && !false"), "true");
        assert_eq!(line("[1, 'two', [true, null]]"), r#"[1,"two",[true,null]]"#);
        assert_eq!(line("null"), "null");
        assert_eq!(line(""), "undefined");
        assert_eq!(line("[1, 2][5]"), "undefined");
        assert_eq!(line("sqrt(-1)"), "NaN");
    }

    #[test]
    fn strings_and_functions() {
        assert_eq!(line("'ab' * 3"), "ababab");
        assert_eq!(line("'n=' + 4"), "n=4");
        assert_eq!(line("upper('crown') + lower('KEEPER')"), "CROWNkeeper");
        assert_eq!(line("len('héllo') + len([1, 2])"), "7");
        assert_eq!(line("max(3, 9, 4) - min(3, 9, 4)"), "6");
        assert_eq!(line("round(pi * 100) / 100"), "3.14");
        assert_eq!(line("num('41') + 1"), "42");
        assert_eq!(line("'abc'[1]"), "b");
        assert_eq!(line("[1] + [2, 3]"), "[1,2,3]");
    }

    #[test]
    fn comparisons_and_equality() {
        assert_eq!(line("'a' < 'b'"), "true");
        assert_eq!(line("[1, 2] == [1, 2]"), "true");
        assert_eq!(line("1 == '1'"), "false");
        assert_eq!(line("3 >= 3 || false"), "true");
    }

    #[test]
    fn errors_are_reported_not_raised() {
        assert_eq!(fails("1 / 0"), "division by zero");
        assert_eq!(fails("process"), "unknown name 'process'");
        assert_eq!(fails("1 +"), "unexpected end of input");
        assert_eq!(fails("'open"), "unterminated string");
        assert_eq!(fails("1 < 'a'"), "can't compare number with string");
        assert_eq!(fails("1 && true"), "'&&' needs booleans, got number");
        assert_eq!(fails("1 2"), "unexpected number 2");
        assert_eq!(fails("a + 1"), "unknown name 'a'");
        assert_eq!(fails("a = 1"), "unexpected character '='");
        assert_eq!(fails("len(1, 2)"), "len() takes exactly one argument");
    }

    #[test]
    fn sandbox_caps_hold() {
        assert!(fails("'x' * 5000").contains("string longer"));
        assert_eq!(line("len(upper('ß' * 500))"), "1000");
        assert!(fails("upper('ß' * 501)").contains("string longer"));
        assert!(fails(&"(".repeat(100)).contains("nested too deeply"));
        assert!(fails(&"1+".repeat(300)).contains("longer than"));
        assert!(fails("-'x'").contains("can't apply '-'"));
    }
}
