//! Optic AST
//!
//! A small tree describing an accessor, independent of the schema AST.
//! [`compose`] flattens and normalizes: identities vanish, adjacent `Path`
//! nodes fuse into one key sequence, adjacent `Checks` fuse into one check
//! list.

use std::fmt;
use std::sync::Arc;

use crate::ast::Check;
use crate::value::{PropertyKey, Value};

pub type GetFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub type GetResultFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;
/// Rebuild a whole from a part alone (`Iso`, `Prism`)
pub type SetFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;
/// Write a part into an existing whole (`Lens`)
pub type ReplaceFn = Arc<dyn Fn(Value, &Value) -> Value + Send + Sync>;
pub type ReplaceResultFn = Arc<dyn Fn(Value, &Value) -> Result<Value, String> + Send + Sync>;

pub enum OpticNode {
    Identity,
    Iso { get: GetFn, set: SetFn },
    Lens { get: GetFn, replace: ReplaceFn },
    Prism { get_result: GetResultFn, set: SetFn },
    Optional {
        get_result: GetResultFn,
        replace_result: ReplaceResultFn,
    },
    /// Property access along a non-empty key sequence
    Path(Vec<PropertyKey>),
    /// Non-empty list of refinements
    Checks(Vec<Check>),
    /// Normalized sequence of two or more nodes, outermost first
    Composition(Vec<OpticAst>),
}

/// A shared optic node
#[derive(Clone)]
pub struct OpticAst(Arc<OpticNode>);

impl OpticAst {
    pub fn new(node: OpticNode) -> Self {
        OpticAst(Arc::new(node))
    }

    pub fn node(&self) -> &OpticNode {
        &self.0
    }

    pub(crate) fn arc(&self) -> &Arc<OpticNode> {
        &self.0
    }

    pub fn ptr_eq(a: &OpticAst, b: &OpticAst) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub fn identity() -> Self {
        Self::new(OpticNode::Identity)
    }

    pub fn path(keys: Vec<PropertyKey>) -> Self {
        if keys.is_empty() {
            return Self::identity();
        }
        Self::new(OpticNode::Path(keys))
    }

    pub fn checks(checks: Vec<Check>) -> Self {
        if checks.is_empty() {
            return Self::identity();
        }
        Self::new(OpticNode::Checks(checks))
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.node(), OpticNode::Identity)
    }

    pub fn tag(&self) -> &'static str {
        match self.node() {
            OpticNode::Identity => "Identity",
            OpticNode::Iso { .. } => "Iso",
            OpticNode::Lens { .. } => "Lens",
            OpticNode::Prism { .. } => "Prism",
            OpticNode::Optional { .. } => "Optional",
            OpticNode::Path(_) => "Path",
            OpticNode::Checks(_) => "Checks",
            OpticNode::Composition(_) => "Composition",
        }
    }
}

impl fmt::Debug for OpticAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            OpticNode::Path(keys) => {
                write!(f, "Path(")?;
                for key in keys {
                    write!(f, "[{}]", key)?;
                }
                write!(f, ")")
            }
            OpticNode::Checks(checks) => write!(f, "Checks({})", checks.len()),
            OpticNode::Composition(nodes) => f.debug_list().entries(nodes.iter()).finish(),
            _ => write!(f, "{}", self.tag()),
        }
    }
}

/// `outer` then `inner`, normalized
pub fn compose(outer: &OpticAst, inner: &OpticAst) -> OpticAst {
    if inner.is_identity() {
        return outer.clone();
    }
    if outer.is_identity() {
        return inner.clone();
    }
    let mut nodes: Vec<OpticAst> = Vec::new();
    for node in flatten(outer).into_iter().chain(flatten(inner)) {
        push_normalized(&mut nodes, node);
    }
    match nodes.len() {
        0 => OpticAst::identity(),
        1 => nodes.remove(0),
        _ => OpticAst::new(OpticNode::Composition(nodes)),
    }
}

fn flatten(ast: &OpticAst) -> Vec<OpticAst> {
    match ast.node() {
        OpticNode::Composition(nodes) => nodes.clone(),
        _ => vec![ast.clone()],
    }
}

fn push_normalized(nodes: &mut Vec<OpticAst>, node: OpticAst) {
    if node.is_identity() {
        return;
    }
    let fused = match (nodes.last().map(OpticAst::node), node.node()) {
        (Some(OpticNode::Path(a)), OpticNode::Path(b)) => {
            Some(OpticAst::path(a.iter().chain(b.iter()).cloned().collect()))
        }
        (Some(OpticNode::Checks(a)), OpticNode::Checks(b)) => {
            Some(OpticAst::checks(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ => None,
    };
    match fused {
        Some(fused) => {
            nodes.pop();
            nodes.push(fused);
        }
        None => nodes.push(node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::check;

    fn key(k: &str) -> OpticAst {
        OpticAst::path(vec![PropertyKey::from(k)])
    }

    #[test]
    fn test_adjacent_paths_fuse() {
        let composed = compose(&key("a"), &key("b"));
        match composed.node() {
            OpticNode::Path(keys) => assert_eq!(keys, &vec![PropertyKey::from("a"), PropertyKey::from("b")]),
            _ => panic!("expected a fused path, got {:?}", composed),
        }
    }

    #[test]
    fn test_identity_vanishes() {
        let a = key("a");
        assert!(OpticAst::ptr_eq(&compose(&OpticAst::identity(), &a), &a));
        assert!(OpticAst::ptr_eq(&compose(&a, &OpticAst::identity()), &a));
    }

    #[test]
    fn test_checks_fuse_across_compositions() {
        let checks = OpticAst::checks(vec![check::is_int()]);
        let left = compose(&key("a"), &checks);
        let right = compose(&OpticAst::checks(vec![check::is_finite()]), &key("b"));
        let composed = compose(&left, &right);
        match composed.node() {
            OpticNode::Composition(nodes) => {
                let tags: Vec<&str> = nodes.iter().map(OpticAst::tag).collect();
                assert_eq!(tags, vec!["Path", "Checks", "Path"]);
                match nodes[1].node() {
                    OpticNode::Checks(checks) => assert_eq!(checks.len(), 2),
                    _ => unreachable!(),
                }
            }
            _ => panic!("expected a composition, got {:?}", composed),
        }
    }
}
