//! Cipher program extraction from player script source
//!
//! The entry function is located through a list of call-site and
//! structural patterns. Each call in its body is resolved to a helper
//! function, and the helper is classified by shape through a set of
//! [`CipherHelperMatcher`] strategies. Helper names are renamed on every
//! build, so nothing here depends on them.

use crate::error::ResolveError;
use crate::platform::cipher::{CipherOperation, CipherProgram, PlayerVersionKey};
use crate::platform::script::{self, Expr, FunctionDef, Statement, StatementKind};
use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Maximum length of a script fragment carried in an error
const FRAGMENT_LIMIT: usize = 240;

/// Call sites that hand the ciphered signature to the entry function
const ENTRY_CALL_PATTERNS: &[&str] = &[
    r"\b[cs]\s*&&\s*[adf]\.set\([^,]+\s*,\s*(?:encodeURIComponent\s*\()?\s*([a-zA-Z0-9$]+)\(",
    r"\.sig\|\|([a-zA-Z0-9$]+)\(",
    r#""signature"\s*,\s*([a-zA-Z0-9$]+)\("#,
    r"\bm=([a-zA-Z0-9$]{2,})\(decodeURIComponent\(h\.s\)\)",
];

/// Definitions shaped like `F=function(a){a=a.split("")`.
///
/// Groups: function name, parameter, assigned name, split receiver.
const ENTRY_SHAPE_PATTERNS: &[&str] = &[
    r#"([a-zA-Z0-9$_]+)\s*=\s*function\s*\(\s*([a-zA-Z0-9$_]+)\s*\)\s*\{\s*([a-zA-Z0-9$_]+)\s*=\s*([a-zA-Z0-9$_]+)\.split\(\s*""\s*\)"#,
    r#"function\s+([a-zA-Z0-9$_]+)\s*\(\s*([a-zA-Z0-9$_]+)\s*\)\s*\{\s*([a-zA-Z0-9$_]+)\s*=\s*([a-zA-Z0-9$_]+)\.split\(\s*""\s*\)"#,
];

/// Classifies one helper shape
pub trait CipherHelperMatcher: Send + Sync {
    /// Matcher name for diagnostics
    fn name(&self) -> &'static str;

    /// Return the operation performed by `helper` when called with `args`,
    /// or `None` if the helper does not have this matcher's shape
    fn recognize(&self, helper: &FunctionDef, args: &[Expr]) -> Option<CipherOperation>;
}

/// `function(a){a.reverse()}`
pub struct ReverseMatcher;

/// `function(a,b){a.splice(0,b)}` or `function(a,b){return a.slice(b)}`
pub struct SpliceMatcher;

/// `function(a,b){var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c}`
pub struct SwapMatcher;

/// Body of a single-statement helper, unwrapping a `return`
fn sole_expression(helper: &FunctionDef) -> Option<&Expr> {
    match helper.body.as_slice() {
        [statement] => match &statement.kind {
            StatementKind::Expr(expr) | StatementKind::Return(Some(expr)) => Some(expr),
            _ => None,
        },
        _ => None,
    }
}

/// Resolve an operand inside a helper to the numeric call-site value
fn operand_value(operand: &Expr, helper: &FunctionDef, args: &[Expr]) -> Option<usize> {
    match operand {
        Expr::Number(n) => usize::try_from(*n).ok(),
        Expr::Ident(name) => match args.get(helper.param_position(name)?)? {
            Expr::Number(n) => usize::try_from(*n).ok(),
            _ => None,
        },
        _ => None,
    }
}

impl CipherHelperMatcher for ReverseMatcher {
    fn name(&self) -> &'static str {
        "reverse"
    }

    fn recognize(&self, helper: &FunctionDef, _args: &[Expr]) -> Option<CipherOperation> {
        let array = helper.params.first()?;
        let (receiver, call_args) = sole_expression(helper)?.as_method_call("reverse")?;
        (receiver.as_ident() == Some(array.as_str()) && call_args.is_empty())
            .then_some(CipherOperation::Reverse)
    }
}

impl CipherHelperMatcher for SpliceMatcher {
    fn name(&self) -> &'static str {
        "splice"
    }

    fn recognize(&self, helper: &FunctionDef, args: &[Expr]) -> Option<CipherOperation> {
        let array = helper.params.first()?;
        let expr = sole_expression(helper)?;

        let count = if let Some((receiver, call_args)) = expr.as_method_call("splice") {
            if receiver.as_ident() != Some(array.as_str()) {
                return None;
            }
            match call_args {
                [Expr::Number(0), count] => count,
                _ => return None,
            }
        } else {
            let (receiver, call_args) = expr.as_method_call("slice")?;
            if receiver.as_ident() != Some(array.as_str()) {
                return None;
            }
            match call_args {
                [count] => count,
                _ => return None,
            }
        };

        operand_value(count, helper, args).map(CipherOperation::SpliceFromIndex)
    }
}

impl SwapMatcher {
    /// `k` from `b%a.length` or plain `b`
    fn swap_index(index: &Expr, array: &str, helper: &FunctionDef, args: &[Expr]) -> Option<usize> {
        match index {
            Expr::Binary { op: '%', lhs, rhs } => match rhs.as_ref() {
                Expr::Member { object, property }
                    if property == "length" && object.as_ident() == Some(array) =>
                {
                    operand_value(lhs, helper, args)
                }
                _ => None,
            },
            other => operand_value(other, helper, args),
        }
    }
}

impl CipherHelperMatcher for SwapMatcher {
    fn name(&self) -> &'static str {
        "swap"
    }

    fn recognize(&self, helper: &FunctionDef, args: &[Expr]) -> Option<CipherOperation> {
        let array = helper.params.first()?.as_str();
        let [first, second, third] = helper.body.as_slice() else {
            return None;
        };

        let StatementKind::Var {
            name: temp,
            value: Some(saved),
        } = &first.kind
        else {
            return None;
        };
        if saved.as_index_of(array) != Some(&Expr::Number(0)) {
            return None;
        }

        let StatementKind::Assign { target, value } = &second.kind else {
            return None;
        };
        if target.as_index_of(array) != Some(&Expr::Number(0)) {
            return None;
        }
        let k = Self::swap_index(value.as_index_of(array)?, array, helper, args)?;

        let StatementKind::Assign { target, value } = &third.kind else {
            return None;
        };
        if value.as_ident() != Some(temp.as_str()) {
            return None;
        }
        let k_back = Self::swap_index(target.as_index_of(array)?, array, helper, args)?;

        (k == k_back).then_some(CipherOperation::SwapAt(k))
    }
}

/// Recovers cipher programs from player script source
pub struct CipherExtractor {
    entry_calls: Vec<Regex>,
    entry_shapes: Vec<Regex>,
    matchers: Vec<Box<dyn CipherHelperMatcher>>,
}

impl CipherExtractor {
    /// Create an extractor with the built-in patterns and matchers
    pub fn new() -> Result<Self> {
        Ok(Self {
            entry_calls: ENTRY_CALL_PATTERNS
                .iter()
                .map(|p| Regex::new(p))
                .collect::<std::result::Result<_, _>>()?,
            entry_shapes: ENTRY_SHAPE_PATTERNS
                .iter()
                .map(|p| Regex::new(p))
                .collect::<std::result::Result<_, _>>()?,
            matchers: vec![
                Box::new(ReverseMatcher),
                Box::new(SpliceMatcher),
                Box::new(SwapMatcher),
            ],
        })
    }

    /// Register an additional helper matcher
    pub fn with_matcher(mut self, matcher: Box<dyn CipherHelperMatcher>) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// Names of the registered matchers, in match order
    pub fn matcher_names(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|m| m.name()).collect()
    }

    /// Extract the cipher program from `source`
    pub fn extract(&self, source: &str, version: &PlayerVersionKey) -> Result<CipherProgram> {
        let entry = self
            .locate_entry(source)?
            .ok_or_else(|| ResolveError::CipherProgramNotFound {
                version: version.to_string(),
            })?;
        debug!("Cipher entry function for player {}: {}", version, entry.name);

        let param = entry.params[0].as_str();
        let last = entry.body.len() - 1;
        let mut objects: HashMap<String, HashMap<String, FunctionDef>> = HashMap::new();
        let mut operations = Vec::new();

        for (index, statement) in entry.body.iter().enumerate() {
            if index == 0 || index == last {
                continue;
            }

            let (callee, args) = Self::helper_call(statement, param)
                .ok_or_else(|| unrecognized(version, &statement.source))?;

            let helper = match callee {
                Expr::Member { object, property } => {
                    self.object_member(source, object, property, &mut objects)?
                }
                Expr::Index { object, index } => match index.as_ref() {
                    Expr::Str(property) => {
                        self.object_member(source, object, property, &mut objects)?
                    }
                    _ => None,
                },
                Expr::Ident(name) => script::find_function(source, name)?,
                _ => None,
            }
            .ok_or_else(|| unrecognized(version, &statement.source))?;

            let operation = self
                .matchers
                .iter()
                .find_map(|matcher| matcher.recognize(&helper, args))
                .ok_or_else(|| {
                    warn!(
                        "No matcher recognized helper {} in player {}",
                        helper.name, version
                    );
                    unrecognized(version, &format!("{} => {}", statement.source, helper.source))
                })?;
            operations.push(operation);
        }

        let program = CipherProgram::new(operations);
        debug!("Extracted cipher program for player {}: {}", version, program);
        Ok(program)
    }

    /// Find the entry function, preferring call sites over bare shapes
    fn locate_entry(&self, source: &str) -> Result<Option<FunctionDef>> {
        for regex in &self.entry_calls {
            for captures in regex.captures_iter(source) {
                let Some(name) = captures.get(1) else {
                    continue;
                };
                if let Some(function) = script::find_function(source, name.as_str())? {
                    if Self::has_entry_shape(&function) {
                        return Ok(Some(function));
                    }
                }
            }
        }

        for regex in &self.entry_shapes {
            for captures in regex.captures_iter(source) {
                let names: Vec<&str> = (1..=4)
                    .filter_map(|i| captures.get(i).map(|m| m.as_str()))
                    .collect();
                let [name, param, assigned, receiver] = names.as_slice() else {
                    continue;
                };
                if param != assigned || param != receiver {
                    continue;
                }
                if let Some(function) = script::find_function(source, name)? {
                    if Self::has_entry_shape(&function) {
                        return Ok(Some(function));
                    }
                }
            }
        }

        Ok(None)
    }

    /// `a=a.split("") ... return a.join("")`
    fn has_entry_shape(function: &FunctionDef) -> bool {
        let Some(param) = function.params.first() else {
            return false;
        };
        let (Some(first), Some(last)) = (function.body.first(), function.body.last()) else {
            return false;
        };
        if function.body.len() < 2 {
            return false;
        }

        let splits = match &first.kind {
            StatementKind::Assign { target, value } if target.as_ident() == Some(param) => value
                .as_method_call("split")
                .is_some_and(|(receiver, args)| {
                    receiver.as_ident() == Some(param) && args == [Expr::Str(String::new())]
                }),
            _ => false,
        };
        let joins = match &last.kind {
            StatementKind::Return(Some(value)) => value
                .as_method_call("join")
                .is_some_and(|(receiver, args)| {
                    receiver.as_ident() == Some(param) && args == [Expr::Str(String::new())]
                }),
            _ => false,
        };

        splits && joins
    }

    /// `Obj.f(a,N)`, `a=Obj.f(a,N)`, `f(a,N)` where the first argument is the token
    fn helper_call<'a>(statement: &'a Statement, param: &str) -> Option<(&'a Expr, &'a [Expr])> {
        let call = match &statement.kind {
            StatementKind::Expr(expr) => expr,
            StatementKind::Assign { target, value } if target.as_ident() == Some(param) => value,
            _ => return None,
        };
        match call {
            Expr::Call { callee, args } if args.first().and_then(Expr::as_ident) == Some(param) => {
                Some((callee.as_ref(), args.as_slice()))
            }
            _ => None,
        }
    }

    fn object_member(
        &self,
        source: &str,
        object: &Expr,
        property: &str,
        objects: &mut HashMap<String, HashMap<String, FunctionDef>>,
    ) -> Result<Option<FunctionDef>> {
        let Some(name) = object.as_ident() else {
            return Ok(None);
        };
        if !objects.contains_key(name) {
            let members = script::find_object(source, name)?.unwrap_or_default();
            objects.insert(name.to_string(), members);
        }
        Ok(objects
            .get(name)
            .and_then(|members| members.get(property))
            .cloned())
    }
}

fn unrecognized(version: &PlayerVersionKey, fragment: &str) -> ResolveError {
    let fragment: String = fragment.chars().take(FRAGMENT_LIMIT).collect();
    ResolveError::CipherOperationUnrecognized {
        version: version.to_string(),
        fragment,
    }
}
