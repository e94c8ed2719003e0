//! Optics over immutable values
//!
//! An [`Optic`] pairs an [`OpticAst`] with its compiled accessors. The
//! interpreter compiles every node to a `get`/`set` pair and infers the
//! optic's kind:
//!
//! | outer \ inner | Iso      | Lens     | Prism    | Optional |
//! |---------------|----------|----------|----------|----------|
//! | Iso           | Iso      | Lens     | Prism    | Optional |
//! | Lens          | Lens     | Lens     | Optional | Optional |
//! | Prism         | Prism    | Optional | Prism    | Optional |
//! | Optional      | Optional | Optional | Optional | Optional |
//!
//! Iso and Lens reads never fail; Iso and Prism writes do not need the old
//! whole. Writes copy only the containers along the accessed path, so
//! untouched siblings stay shared. A write that changes nothing may still
//! allocate.

pub mod ast;

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

pub use ast::{compose, OpticAst, OpticNode};

use crate::ast::{self as schema, Check};
use crate::issue::Formatter;
use crate::memo::IdentityMemo;
use crate::parser::{self, ParseOptions};
use crate::value::{PropertyKey, Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpticTag {
    Iso,
    Lens,
    Prism,
    Optional,
}

impl OpticTag {
    pub fn join(self, inner: OpticTag) -> OpticTag {
        use OpticTag::*;
        match (self, inner) {
            (Iso, x) | (x, Iso) => x,
            (Lens, Lens) => Lens,
            (Prism, Prism) => Prism,
            _ => Optional,
        }
    }

    /// Whether `get` can fail
    pub fn is_partial(self) -> bool {
        matches!(self, OpticTag::Prism | OpticTag::Optional)
    }

    /// Whether `set` ignores the current whole
    fn builds_whole(self) -> bool {
        matches!(self, OpticTag::Iso | OpticTag::Prism)
    }
}

type Get = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;
type Set = Arc<dyn Fn(Value, &Value) -> Result<Value, String> + Send + Sync>;

struct Compiled {
    tag: OpticTag,
    get: Get,
    set: Set,
}

static OPTIC_MEMO: Lazy<IdentityMemo<OpticNode, Arc<Compiled>>> = Lazy::new(IdentityMemo::new);

fn go(ast: &OpticAst) -> Arc<Compiled> {
    OPTIC_MEMO.get_or_insert_with(ast.arc(), || {
        trace!(node = ast.tag(), "compiling optic");
        Arc::new(compile(ast))
    })
}

fn compile(ast: &OpticAst) -> Compiled {
    match ast.node() {
        OpticNode::Identity => Compiled {
            tag: OpticTag::Iso,
            get: Arc::new(|s| Ok(s.clone())),
            set: Arc::new(|a, _| Ok(a)),
        },
        OpticNode::Iso { get, set } => {
            let (get, set) = (get.clone(), set.clone());
            Compiled {
                tag: OpticTag::Iso,
                get: Arc::new(move |s| Ok(get(s))),
                set: Arc::new(move |a, _| Ok(set(a))),
            }
        }
        OpticNode::Lens { get, replace } => {
            let (get, replace) = (get.clone(), replace.clone());
            Compiled {
                tag: OpticTag::Lens,
                get: Arc::new(move |s| Ok(get(s))),
                set: Arc::new(move |a, s| Ok(replace(a, s))),
            }
        }
        OpticNode::Prism { get_result, set } => {
            let set = set.clone();
            Compiled {
                tag: OpticTag::Prism,
                get: get_result.clone(),
                set: Arc::new(move |a, _| Ok(set(a))),
            }
        }
        OpticNode::Optional {
            get_result,
            replace_result,
        } => Compiled {
            tag: OpticTag::Optional,
            get: get_result.clone(),
            set: replace_result.clone(),
        },
        OpticNode::Path(keys) => {
            let read = keys.clone();
            let write = keys.clone();
            Compiled {
                tag: OpticTag::Lens,
                get: Arc::new(move |s| Ok(get_path(s, &read))),
                set: Arc::new(move |a, s| Ok(replace_path(s, &write, a))),
            }
        }
        OpticNode::Checks(checks) => {
            let target = schema::unknown().with_checks(checks.clone());
            Compiled {
                tag: OpticTag::Prism,
                get: Arc::new(move |s| {
                    parser::validate_unknown_result(&target, s.clone(), &ParseOptions::default())
                        .map_err(|issue| Formatter::default().format(&issue))
                }),
                set: Arc::new(|a, _| Ok(a)),
            }
        }
        OpticNode::Composition(nodes) => {
            let mut compiled = nodes.iter().map(go);
            let first = compiled.next().unwrap_or_else(|| go(&OpticAst::identity()));
            compiled.fold((*first).clone_parts(), |outer, inner| compose_compiled(outer, &inner))
        }
    }
}

impl Compiled {
    fn clone_parts(&self) -> Compiled {
        Compiled {
            tag: self.tag,
            get: self.get.clone(),
            set: self.set.clone(),
        }
    }
}

fn compose_compiled(outer: Compiled, inner: &Compiled) -> Compiled {
    let tag = outer.tag.join(inner.tag);
    let (outer_get, outer_set) = (outer.get, outer.set);
    let (inner_get, inner_set) = (inner.get.clone(), inner.set.clone());
    let get: Get = {
        let outer_get = outer_get.clone();
        let inner_get = inner_get.clone();
        Arc::new(move |s| outer_get(s).and_then(|a| inner_get(&a)))
    };
    let set: Set = if inner.tag.builds_whole() {
        Arc::new(move |b, s| outer_set(inner_set(b, &Value::Undefined)?, s))
    } else {
        Arc::new(move |b, s| {
            let a = outer_get(s)?;
            let a = inner_set(b, &a)?;
            outer_set(a, s)
        })
    };
    Compiled { tag, get, set }
}

fn get_path(s: &Value, keys: &[PropertyKey]) -> Value {
    let mut current = s;
    for key in keys {
        match current.get(key) {
            Some(next) => current = next,
            None => return Value::Undefined,
        }
    }
    current.clone()
}

/// Copy-on-write along `keys`; containers off the path keep their identity
fn replace_path(s: &Value, keys: &[PropertyKey], a: Value) -> Value {
    let Some((key, rest)) = keys.split_first() else {
        return a;
    };
    match (s, key) {
        (Value::Object(record), _) => {
            let child = record.get(key).cloned().unwrap_or(Value::Undefined);
            let mut out = (**record).clone();
            out.insert(key.clone(), replace_path(&child, rest, a));
            Value::Object(Arc::new(out))
        }
        (Value::Array(items), PropertyKey::Index(i)) if *i < items.len() => {
            let mut out = (**items).clone();
            out[*i] = replace_path(&items[*i], rest, a);
            Value::Array(Arc::new(out))
        }
        _ => s.clone(),
    }
}

// =============================================================================
// Optic
// =============================================================================

/// A compiled accessor over [`Value`]s
#[derive(Clone)]
pub struct Optic {
    ast: OpticAst,
    compiled: Arc<Compiled>,
}

impl std::fmt::Debug for Optic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({:?})", self.tag(), self.ast)
    }
}

impl Optic {
    pub fn make(ast: OpticAst) -> Self {
        let compiled = go(&ast);
        Self { ast, compiled }
    }

    pub fn id() -> Self {
        Self::make(OpticAst::identity())
    }

    pub fn iso<G, S>(get: G, set: S) -> Self
    where
        G: Fn(&Value) -> Value + Send + Sync + 'static,
        S: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::make(OpticAst::new(OpticNode::Iso {
            get: Arc::new(get),
            set: Arc::new(set),
        }))
    }

    pub fn lens<G, R>(get: G, replace: R) -> Self
    where
        G: Fn(&Value) -> Value + Send + Sync + 'static,
        R: Fn(Value, &Value) -> Value + Send + Sync + 'static,
    {
        Self::make(OpticAst::new(OpticNode::Lens {
            get: Arc::new(get),
            replace: Arc::new(replace),
        }))
    }

    pub fn prism<G, S>(get_result: G, set: S) -> Self
    where
        G: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
        S: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::make(OpticAst::new(OpticNode::Prism {
            get_result: Arc::new(get_result),
            set: Arc::new(set),
        }))
    }

    pub fn optional<G, R>(get_result: G, replace_result: R) -> Self
    where
        G: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
        R: Fn(Value, &Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self::make(OpticAst::new(OpticNode::Optional {
            get_result: Arc::new(get_result),
            replace_result: Arc::new(replace_result),
        }))
    }

    pub fn ast(&self) -> &OpticAst {
        &self.ast
    }

    pub fn tag(&self) -> OpticTag {
        self.compiled.tag
    }

    pub fn get_result(&self, s: &Value) -> Result<Value, String> {
        (self.compiled.get)(s)
    }

    pub fn get_option(&self, s: &Value) -> Option<Value> {
        self.get_result(s).ok()
    }

    pub fn replace_result(&self, a: Value, s: &Value) -> Result<Value, String> {
        (self.compiled.set)(a, s)
    }

    /// Write `a` into `s`; when the focus cannot be reached `s` comes back
    /// unchanged
    pub fn replace(&self, a: Value, s: &Value) -> Value {
        self.replace_result(a, s).unwrap_or_else(|_| s.clone())
    }

    /// Build a whole from a part; only Iso and Prism optics can
    pub fn set(&self, a: Value) -> Result<Value, String> {
        if self.tag().builds_whole() {
            self.replace_result(a, &Value::Undefined)
        } else {
            Err(format!("a {:?} cannot build a value without a source", self.tag()))
        }
    }

    pub fn modify<F>(&self, s: &Value, f: F) -> Value
    where
        F: FnOnce(Value) -> Value,
    {
        match self.get_result(s) {
            Ok(a) => self.replace(f(a), s),
            Err(_) => s.clone(),
        }
    }

    pub fn compose(&self, inner: &Optic) -> Optic {
        Self::make(compose(&self.ast, &inner.ast))
    }

    /// Focus on a property; absent keys read as `undefined`
    pub fn key(&self, key: impl Into<PropertyKey>) -> Optic {
        self.compose(&Self::make(OpticAst::path(vec![key.into()])))
    }

    /// Focus on a property that must exist
    pub fn at(&self, key: impl Into<PropertyKey>) -> Optic {
        let key = key.into();
        let read = key.clone();
        self.compose(&Self::optional(
            move |s| {
                s.get(&read)
                    .cloned()
                    .ok_or_else(|| format!("Key {} not found", read))
            },
            move |a, s| {
                if s.get(&key).is_none() {
                    return Err(format!("Key {} not found", key));
                }
                Ok(replace_path(s, std::slice::from_ref(&key), a))
            },
        ))
    }

    /// Narrow to values whose `_tag` is `tag`
    pub fn tagged(&self, tag: &str) -> Optic {
        let tag = tag.to_string();
        let discriminant = PropertyKey::from("_tag");
        self.compose(&Self::prism(
            move |s| match s.get(&discriminant).and_then(Value::as_str) {
                Some(found) if found == tag => Ok(s.clone()),
                Some(found) => Err(format!("Expected _tag {:?}, got {:?}", tag, found)),
                None => Err(format!("Expected _tag {:?}, got no tag", tag)),
            },
            |a| a,
        ))
    }

    /// Narrow to values passing every check
    pub fn check(&self, checks: Vec<Check>) -> Optic {
        self.compose(&Self::make(OpticAst::checks(checks)))
    }

    pub fn refine(&self, check: Check) -> Optic {
        self.check(vec![check])
    }

    /// A lens onto a struct holding only `keys`
    pub fn pick(&self, keys: &[&str]) -> Optic {
        let picked: Arc<Vec<PropertyKey>> = Arc::new(keys.iter().map(|k| PropertyKey::from(*k)).collect());
        let written = picked.clone();
        self.compose(&Self::lens(
            move |s| {
                let record = s.as_object().cloned().unwrap_or_default();
                Value::Object(Arc::new(
                    picked
                        .iter()
                        .filter_map(|k| record.get(k).map(|v| (k.clone(), v.clone())))
                        .collect(),
                ))
            },
            move |a, s| {
                let mut out: Record = s.as_object().cloned().unwrap_or_default();
                for key in written.iter() {
                    match a.get(key) {
                        Some(v) => {
                            out.insert(key.clone(), v.clone());
                        }
                        None => {
                            out.shift_remove(key);
                        }
                    }
                }
                Value::Object(Arc::new(out))
            },
        ))
    }

    /// A lens onto a struct without `keys`
    pub fn omit(&self, keys: &[&str]) -> Optic {
        let omitted: Arc<HashSet<PropertyKey>> = Arc::new(keys.iter().map(|k| PropertyKey::from(*k)).collect());
        let kept = omitted.clone();
        self.compose(&Self::lens(
            move |s| {
                let record = s.as_object().cloned().unwrap_or_default();
                Value::Object(Arc::new(
                    record.into_iter().filter(|(k, _)| !omitted.contains(k)).collect(),
                ))
            },
            move |a, s| {
                let mut out: Record = a.as_object().cloned().unwrap_or_default();
                out.retain(|k, _| !kept.contains(k));
                if let Some(record) = s.as_object() {
                    for (k, v) in record.iter().filter(|(k, _)| kept.contains(*k)) {
                        out.insert(k.clone(), v.clone());
                    }
                }
                Value::Object(Arc::new(out))
            },
        ))
    }

    /// Lift `element` over every item of the array in focus.
    ///
    /// Reading collects the sub-focus of each item where `element` reads;
    /// writing needs exactly one replacement per such item, in order.
    pub fn for_each(&self, element: &Optic) -> Optic {
        let read = element.clone();
        let write = element.clone();
        self.compose(&Self::optional(
            move |s| {
                let items = s.as_array().ok_or_else(|| format!("Expected an array, got {}", s))?;
                Ok(Value::array(
                    items.iter().filter_map(|item| read.get_option(item)).collect(),
                ))
            },
            move |a, s| {
                let items = s.as_array().ok_or_else(|| format!("Expected an array, got {}", s))?;
                let replacements = a.as_array().ok_or_else(|| format!("Expected an array, got {}", a))?;
                let focused: Vec<usize> = items
                    .iter()
                    .enumerate()
                    .filter(|(_, item)| write.get_result(item).is_ok())
                    .map(|(i, _)| i)
                    .collect();
                if focused.len() != replacements.len() {
                    return Err(format!(
                        "Expected {} replacement values, got {}",
                        focused.len(),
                        replacements.len()
                    ));
                }
                let mut out = items.to_vec();
                for (i, replacement) in focused.into_iter().zip(replacements.iter()) {
                    out[i] = write.replace_result(replacement.clone(), &items[i])?;
                }
                Ok(Value::array(out))
            },
        ))
    }
}

/// Shorthand for `Optic::id().key(key)`
pub fn key(key: impl Into<PropertyKey>) -> Optic {
    Optic::id().key(key)
}

/// Shorthand for `Optic::id().at(key)`
pub fn at(key: impl Into<PropertyKey>) -> Optic {
    Optic::id().at(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::check;

    fn sample() -> Value {
        Value::object([
            ("a", Value::object([("b", Value::from(1)), ("c", Value::from("x"))])),
            ("d", Value::array(vec![Value::from(1), Value::from(2)])),
        ])
    }

    #[test]
    fn test_key_composition_reads_through() {
        let s = sample();
        let ab = key("a").key("b");
        assert_eq!(ab.tag(), OpticTag::Lens);
        assert_eq!(ab.get_result(&s).unwrap(), Value::from(1));
        assert!(matches!(ab.ast().node(), OpticNode::Path(keys) if keys.len() == 2));
    }

    #[test]
    fn test_replace_shares_untouched_siblings() {
        let s = sample();
        let out = key("a").key("b").replace(Value::from(5), &s);
        assert_eq!(get_path(&out, &[PropertyKey::from("a"), PropertyKey::from("b")]), Value::from(5));
        let before = s.get(&PropertyKey::from("d")).unwrap();
        let after = out.get(&PropertyKey::from("d")).unwrap();
        assert!(Value::ptr_eq(before, after));
    }

    #[test]
    fn test_optional_replace_is_noop_on_failure() {
        let s = sample();
        let missing = at("zz").key("b");
        assert_eq!(missing.tag(), OpticTag::Optional);
        assert_eq!(missing.replace(Value::from(1), &s), s);
        assert!(missing.replace_result(Value::from(1), &s).is_err());
    }

    #[test]
    fn test_join_table() {
        assert_eq!(OpticTag::Iso.join(OpticTag::Prism), OpticTag::Prism);
        assert_eq!(OpticTag::Lens.join(OpticTag::Iso), OpticTag::Lens);
        assert_eq!(OpticTag::Lens.join(OpticTag::Prism), OpticTag::Optional);
        assert_eq!(OpticTag::Prism.join(OpticTag::Prism), OpticTag::Prism);
        assert_eq!(OpticTag::Prism.join(OpticTag::Lens), OpticTag::Optional);
    }

    #[test]
    fn test_checks_fail_with_message() {
        let positive = key("a").key("b").refine(check::is_greater_than(1.0));
        let err = positive.get_result(&sample()).unwrap_err();
        assert!(err.contains("greater than 1"), "{}", err);
        assert!(positive.replace_result(Value::from(3), &sample()).is_ok());
    }

    #[test]
    fn test_prism_set_builds_whole() {
        let tagged = Optic::id().tagged("A");
        let whole = Value::object([("_tag", Value::from("A"))]);
        assert_eq!(tagged.set(whole.clone()).unwrap(), whole);
        assert!(tagged.get_result(&Value::object([("_tag", Value::from("B"))])).is_err());
        assert!(key("a").set(Value::Null).is_err());
    }

    #[test]
    fn test_for_each_requires_matching_arity() {
        let items = Value::array(vec![
            Value::object([("n", Value::from(1))]),
            Value::object([("m", Value::from(2))]),
            Value::object([("n", Value::from(3))]),
        ]);
        let each = Optic::id().for_each(&at("n"));
        assert_eq!(each.get_result(&items).unwrap(), Value::array(vec![Value::from(1), Value::from(3)]));
        let out = each
            .replace_result(Value::array(vec![Value::from(10), Value::from(30)]), &items)
            .unwrap();
        assert_eq!(
            out.as_array().unwrap()[2].get(&PropertyKey::from("n")),
            Some(&Value::from(30))
        );
        assert_eq!(out.as_array().unwrap()[1], items.as_array().unwrap()[1]);
        assert!(each.replace_result(Value::array(vec![Value::from(1)]), &items).is_err());
    }

    #[test]
    fn test_pick_and_omit() {
        let s = sample();
        let picked = Optic::id().pick(&["d"]).get_result(&s).unwrap();
        assert_eq!(picked.as_object().unwrap().len(), 1);
        let omitted = Optic::id().omit(&["d"]);
        let rest = omitted.get_result(&s).unwrap();
        assert!(rest.get(&PropertyKey::from("d")).is_none());
        assert_eq!(omitted.replace(rest, &s), s);
    }

    #[test]
    fn test_modify() {
        let s = sample();
        let out = key("a").key("b").modify(&s, |v| Value::from(v.as_f64().unwrap_or(0.0) + 1.0));
        assert_eq!(get_path(&out, &[PropertyKey::from("a"), PropertyKey::from("b")]), Value::from(2));
    }
}
