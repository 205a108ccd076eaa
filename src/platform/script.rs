//! Lightweight syntax layer over minified player script
//!
//! This is not a JavaScript parser. It understands just enough of the
//! language to pull named functions and object literals out of a script
//! and to turn their short bodies into statement shapes that the cipher
//! matchers can inspect: identifiers, literals, member and index access,
//! calls, simple arithmetic, `var`, assignment and `return`. Anything
//! outside that subset is kept as [`StatementKind::Other`].

use crate::Result;
use regex::Regex;
use std::collections::HashMap;

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Number(i64),
    Str(String),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Binary {
        op: char,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Identifier name, if this is a bare identifier
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Receiver and arguments of `receiver.method(args)`
    pub fn as_method_call(&self, method: &str) -> Option<(&Expr, &[Expr])> {
        match self {
            Expr::Call { callee, args } => match callee.as_ref() {
                Expr::Member { object, property } if property == method => {
                    Some((object.as_ref(), args.as_slice()))
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Check for `object[index]` where object is the named identifier
    pub fn as_index_of(&self, array: &str) -> Option<&Expr> {
        match self {
            Expr::Index { object, index } if object.as_ident() == Some(array) => Some(index),
            _ => None,
        }
    }
}

/// Statement shapes found in helper and entry bodies
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Expr(Expr),
    Assign { target: Expr, value: Expr },
    Var { name: String, value: Option<Expr> },
    Return(Option<Expr>),
    Other,
}

/// Parsed statement together with the text it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub source: String,
    pub kind: StatementKind,
}

/// A function recovered from the script
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
    pub source: String,
}

impl FunctionDef {
    pub fn new(name: &str, params: &str, body: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            params: params
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            body: parse_body(body),
            source: source.to_string(),
        }
    }

    /// Position of a parameter by name
    pub fn param_position(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p == name)
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Find the index of the bracket closing the one at `open`.
///
/// String literals are skipped so brackets inside them do not count.
pub fn find_matching(source: &str, open: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    if !matches!(bytes.get(open)?, b'(' | b'[' | b'{') {
        return None;
    }

    let mut stack: Vec<u8> = Vec::new();
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' | b'`' => {
                i = skip_string(bytes, i)?;
                continue;
            }
            b @ (b'(' | b'[' | b'{') => stack.push(b),
            b @ (b')' | b']' | b'}') => {
                let expected = match b {
                    b')' => b'(',
                    b']' => b'[',
                    _ => b'{',
                };
                if stack.pop()? != expected {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index just past the closing quote of the literal starting at `start`
fn skip_string(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Split on a separator that is not nested in brackets or strings
pub fn split_top_level(source: &str, separator: u8) -> Vec<&str> {
    let bytes = source.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' | b'`' => {
                i = skip_string(bytes, i).unwrap_or(bytes.len());
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b if b == separator && depth == 0 => {
                parts.push(source[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(source[start..].trim());

    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Parse a function body into statements.
///
/// Comma sequences outside `var` declarations are flattened.
pub fn parse_body(body: &str) -> Vec<Statement> {
    let mut statements = Vec::new();
    for part in split_top_level(body, b';') {
        let is_declaration = ["var ", "let ", "const "]
            .iter()
            .any(|kw| part.starts_with(kw));
        if is_declaration {
            statements.push(parse_statement(part));
        } else {
            statements.extend(split_top_level(part, b',').into_iter().map(parse_statement));
        }
    }
    statements
}

/// Parse a single statement, falling back to [`StatementKind::Other`]
pub fn parse_statement(text: &str) -> Statement {
    let kind = tokenize(text)
        .and_then(|tokens| Parser::new(tokens).statement())
        .unwrap_or(StatementKind::Other);
    Statement {
        source: text.trim().to_string(),
        kind,
    }
}

/// Locate a named function defined as `name=function(..){..}` or
/// `function name(..){..}`
pub fn find_function(source: &str, name: &str) -> Result<Option<FunctionDef>> {
    let escaped = regex::escape(name);
    let patterns = [
        format!(r"(?:^|[^\w$.])({})\s*=\s*function\s*\(([^)]*)\)\s*\{{", escaped),
        format!(r"function\s+({})\s*\(([^)]*)\)\s*\{{", escaped),
    ];

    for pattern in &patterns {
        let regex = Regex::new(pattern)?;
        for captures in regex.captures_iter(source) {
            let (Some(whole), Some(ident), Some(params)) =
                (captures.get(0), captures.get(1), captures.get(2))
            else {
                continue;
            };
            let open = whole.end() - 1;
            if let Some(close) = find_matching(source, open) {
                return Ok(Some(FunctionDef::new(
                    name,
                    params.as_str(),
                    &source[open + 1..close],
                    &source[ident.start()..=close],
                )));
            }
        }
    }

    Ok(None)
}

/// Locate an object literal `name={...}` and return its function members
pub fn find_object(source: &str, name: &str) -> Result<Option<HashMap<String, FunctionDef>>> {
    let object_regex = Regex::new(&format!(
        r"(?:^|[^\w$.]){}\s*=\s*\{{",
        regex::escape(name)
    ))?;
    let member_regex = Regex::new(r#"^\s*["']?([\w$]+)["']?\s*:\s*function\s*\(([^)]*)\)\s*\{"#)?;

    for whole in object_regex.find_iter(source) {
        let open = whole.end() - 1;
        let Some(close) = find_matching(source, open) else {
            continue;
        };

        let mut members = HashMap::new();
        for member in split_top_level(&source[open + 1..close], b',') {
            let Some(captures) = member_regex.captures(member) else {
                continue;
            };
            let (Some(head), Some(key), Some(params)) =
                (captures.get(0), captures.get(1), captures.get(2))
            else {
                continue;
            };
            let body_open = head.end() - 1;
            if let Some(body_close) = find_matching(member, body_open) {
                members.insert(
                    key.as_str().to_string(),
                    FunctionDef::new(
                        key.as_str(),
                        params.as_str(),
                        &member[body_open + 1..body_close],
                        member,
                    ),
                );
            }
        }

        if !members.is_empty() {
            return Ok(Some(members));
        }
    }

    Ok(None)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(i64),
    Str(String),
    Punct(char),
}

fn tokenize(text: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i < chars.len() && (chars[i] == '.' || is_ident_char(chars[i])) {
                return None;
            }
            let digits: String = chars[start..i].iter().collect();
            tokens.push(Token::Number(digits.parse().ok()?));
        } else if is_ident_char(c) {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c == '"' || c == '\'' {
            let mut value = String::new();
            i += 1;
            loop {
                match chars.get(i)? {
                    '\\' => {
                        value.push(*chars.get(i + 1)?);
                        i += 2;
                    }
                    q if *q == c => {
                        i += 1;
                        break;
                    }
                    other => {
                        value.push(*other);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Str(value));
        } else {
            tokens.push(Token::Punct(c));
            i += 1;
        }
    }

    Some(tokens)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, punct: char) -> bool {
        if self.peek() == Some(&Token::Punct(punct)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn statement(mut self) -> Option<StatementKind> {
        let kind = match self.peek()? {
            Token::Ident(kw) if kw == "var" || kw == "let" || kw == "const" => {
                self.pos += 1;
                let Token::Ident(name) = self.next()? else {
                    return None;
                };
                let value = if self.eat('=') {
                    Some(self.expr()?)
                } else {
                    None
                };
                StatementKind::Var { name, value }
            }
            Token::Ident(kw) if kw == "return" => {
                self.pos += 1;
                if self.at_end() {
                    StatementKind::Return(None)
                } else {
                    StatementKind::Return(Some(self.expr()?))
                }
            }
            _ => {
                let target = self.expr()?;
                if self.eat('=') {
                    let value = self.expr()?;
                    StatementKind::Assign { target, value }
                } else {
                    StatementKind::Expr(target)
                }
            }
        };

        self.at_end().then_some(kind)
    }

    fn expr(&mut self) -> Option<Expr> {
        let mut lhs = self.term()?;
        while let Some(Token::Punct(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Some(lhs)
    }

    fn term(&mut self) -> Option<Expr> {
        let mut lhs = self.postfix()?;
        while let Some(Token::Punct(op @ ('%' | '*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.postfix()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Some(lhs)
    }

    fn postfix(&mut self) -> Option<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat('.') {
                let Token::Ident(property) = self.next()? else {
                    return None;
                };
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat('[') {
                let index = self.expr()?;
                if !self.eat(']') {
                    return None;
                }
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat('(') {
                let mut args = Vec::new();
                if !self.eat(')') {
                    loop {
                        args.push(self.expr()?);
                        if self.eat(')') {
                            break;
                        }
                        if !self.eat(',') {
                            return None;
                        }
                    }
                }
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Some(expr);
            }
        }
    }

    fn primary(&mut self) -> Option<Expr> {
        match self.next()? {
            Token::Ident(name) => Some(Expr::Ident(name)),
            Token::Number(n) => Some(Expr::Number(n)),
            Token::Str(s) => Some(Expr::Str(s)),
            Token::Punct('(') => {
                let inner = self.expr()?;
                self.eat(')').then_some(inner)
            }
            Token::Punct(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_matching_skips_strings() {
        let source = r#"f(a,"(}",[1,{b:2}])+1"#;
        assert_eq!(find_matching(source, 1), Some(source.len() - 3));
        assert_eq!(find_matching("{(})", 0), None);
        assert_eq!(find_matching("abc", 0), None);
    }

    #[test]
    fn test_split_top_level() {
        let parts = split_top_level(r#"a=a.split("");Xy.cD(a,2);s=";";return a.join("")"#, b';');
        assert_eq!(
            parts,
            vec![r#"a=a.split("")"#, "Xy.cD(a,2)", r#"s=";""#, r#"return a.join("")"#]
        );
    }

    #[test]
    fn test_parse_split_statement() {
        let statement = parse_statement(r#"a=a.split("")"#);
        let StatementKind::Assign { target, value } = statement.kind else {
            panic!("expected assignment");
        };
        assert_eq!(target, Expr::Ident("a".to_string()));
        let (receiver, args) = value.as_method_call("split").unwrap();
        assert_eq!(receiver.as_ident(), Some("a"));
        assert_eq!(args, &[Expr::Str(String::new())]);
    }

    #[test]
    fn test_parse_swap_statements() {
        let body = parse_body("var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c");
        assert_eq!(body.len(), 3);
        assert!(matches!(body[0].kind, StatementKind::Var { ref name, .. } if name == "c"));
        let StatementKind::Assign { ref value, .. } = body[1].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(
            value.as_index_of("a"),
            Some(Expr::Binary { op: '%', .. })
        ));
    }

    #[test]
    fn test_unsupported_statement_is_other() {
        assert_eq!(parse_statement("if(a)b()").kind, StatementKind::Other);
        assert_eq!(parse_statement("a==b").kind, StatementKind::Other);
        assert_eq!(parse_statement("x=1.5").kind, StatementKind::Other);
    }

    #[test]
    fn test_comma_sequences_are_flattened() {
        let body = parse_body("Xy.a(a,1),Xy.b(a,2);var q=1,r=2");
        assert_eq!(body.len(), 3);
        assert_eq!(body[2].kind, StatementKind::Other);
    }

    #[test]
    fn test_find_function_variants() {
        let source = r#"var xQ=function(a){a.reverse()};function Ab$(a,b){return a.slice(b)};var q=xQ;"#;

        let assigned = find_function(source, "xQ").unwrap().unwrap();
        assert_eq!(assigned.params, vec!["a"]);
        assert_eq!(assigned.body.len(), 1);

        let declared = find_function(source, "Ab$").unwrap().unwrap();
        assert_eq!(declared.arity(), 2);
        assert!(declared.source.starts_with("Ab$(a,b)"));

        assert!(find_function(source, "Q").unwrap().is_none());
    }

    #[test]
    fn test_find_object_members() {
        let source = r#"var Xy={Ab:function(a){a.reverse()},"cD":function(a,b){a.splice(0,b)},
            e$:function(a,b){var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c}};"#;
        let members = find_object(source, "Xy").unwrap().unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(members["cD"].param_position("b"), Some(1));
        assert_eq!(members["e$"].body.len(), 3);
        assert!(find_object(source, "Zz").unwrap().is_none());
    }
}
