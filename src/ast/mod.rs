//! Schema AST
//!
//! The AST is an immutable, `Arc`-shared tree describing a type. Every node
//! carries annotations, checks and an optional *encoding*: a chain of
//! [`Link`]s, root to innermost, each pairing a transformation with the node
//! it transforms from. Decoding runs the chain innermost first; encoding
//! parses the [`flip`]ped node.
//!
//! Mutators never touch a node in place. They return a new node and reuse
//! unchanged children, so identity-keyed memoization (`flip`, `type_ast`,
//! parser compilation) stays valid for every node a caller still holds.
//!
//! ```text
//! decode:  encoded ──L1.to──▶ t1.decode ──L0.to──▶ t0.decode ──▶ node
//! encode:  flip(node) runs the same chain backwards with flipped links
//! ```

pub mod annotations;
pub mod builtins;
pub mod check;
pub mod format;

use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

pub use annotations::{Annotation, Annotations};
pub use check::{Check, CheckMeta, Filter, FilterGroup};

use crate::effect::SchemaResult;
use crate::memo::IdentityMemo;
use crate::parser::ParseOptions;
use crate::transformation::{Link, Transformation};
use crate::value::{format_number, quote, PropertyKey, Symbol, TypeTag, Value};

// =============================================================================
// Node
// =============================================================================

/// A shared, immutable schema node
#[derive(Clone)]
pub struct Ast(Arc<AstNode>);

/// Held by compiled parsers that need their own node for issues and checks.
/// The memo entry of a node must not keep that node alive.
#[derive(Clone)]
pub struct WeakAst(Weak<AstNode>);

impl WeakAst {
    /// The node, or `Never` once it has been dropped
    pub fn upgrade(&self) -> Ast {
        self.0.upgrade().map(Ast).unwrap_or_else(never)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

#[derive(Clone)]
pub struct AstNode {
    pub kind: AstKind,
    pub annotations: Annotations,
    pub checks: Vec<Check>,
    /// Root to innermost; never empty when present
    pub encoding: Option<Vec<Link>>,
    /// Key-level information when the node sits in a tuple element or property
    pub context: Option<Context>,
}

/// Key-level information: optionality, mutability, constructor default
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub is_optional: bool,
    pub is_mutable: bool,
    pub default_value: Option<Value>,
    pub annotations: Annotations,
}

#[derive(Clone)]
pub enum AstKind {
    Null,
    Undefined,
    Void,
    Never,
    Unknown,
    Any,
    String,
    Number,
    Boolean,
    BigInt,
    Symbol,
    ObjectKeyword,
    Literal(Literal),
    UniqueSymbol(Symbol),
    Enums(Vec<(String, Literal)>),
    TemplateLiteral(TemplateLiteral),
    Tuple(Tuple),
    TypeLiteral(TypeLiteral),
    Union(Union),
    Declaration(Declaration),
    Suspend(Suspend),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
    BigInt(i128),
}

#[derive(Clone)]
pub struct TemplateLiteral {
    pub head: String,
    pub spans: Vec<TemplateSpan>,
}

#[derive(Clone)]
pub struct TemplateSpan {
    pub ast: Ast,
    pub literal: String,
}

#[derive(Clone)]
pub struct Tuple {
    pub elements: Vec<Ast>,
    /// Empty, or a variadic head followed by fixed tail elements
    pub rest: Vec<Ast>,
    pub is_mutable: bool,
}

#[derive(Clone)]
pub struct PropertySignature {
    pub name: PropertyKey,
    pub ty: Ast,
}

/// Combines a duplicate key's existing value with the incoming one
pub type Combiner = Arc<dyn Fn(&Value, Value) -> Value + Send + Sync>;

#[derive(Clone)]
pub struct KeyValueCombiner {
    pub decode: Combiner,
    pub encode: Combiner,
}

impl KeyValueCombiner {
    pub fn flip(&self) -> Self {
        Self {
            decode: self.encode.clone(),
            encode: self.decode.clone(),
        }
    }
}

#[derive(Clone)]
pub struct IndexSignature {
    pub parameter: Ast,
    pub ty: Ast,
    pub merge: Option<KeyValueCombiner>,
}

#[derive(Clone)]
pub struct TypeLiteral {
    pub property_signatures: Vec<PropertySignature>,
    pub index_signatures: Vec<IndexSignature>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnionMode {
    #[serde(rename = "anyOf")]
    AnyOf,
    #[serde(rename = "oneOf")]
    OneOf,
}

#[derive(Clone)]
pub struct Union {
    pub types: Vec<Ast>,
    pub mode: UnionMode,
}

/// Parses a declaration's input with its (possibly flipped) type parameters
pub type DeclarationParser = Arc<dyn Fn(&Value, &Ast, &ParseOptions) -> SchemaResult<Value> + Send + Sync>;
pub type DeclarationRun = Arc<dyn Fn(&[Ast]) -> DeclarationParser + Send + Sync>;

#[derive(Clone)]
pub struct Declaration {
    pub type_parameters: Vec<Ast>,
    pub run: DeclarationRun,
}

/// A lazily evaluated node; the thunk runs at most once
#[derive(Clone)]
pub struct Suspend {
    pub thunk: Arc<dyn Fn() -> Ast + Send + Sync>,
    cell: Arc<OnceCell<Ast>>,
}

impl Suspend {
    pub fn new(thunk: Arc<dyn Fn() -> Ast + Send + Sync>) -> Self {
        Self {
            thunk,
            cell: Arc::new(OnceCell::new()),
        }
    }

    pub fn resolve(&self) -> Ast {
        self.cell.get_or_init(|| (self.thunk)()).clone()
    }
}

impl Deref for Ast {
    type Target = AstNode;

    fn deref(&self) -> &AstNode {
        &self.0
    }
}

impl Ast {
    pub fn new(kind: AstKind) -> Self {
        Ast(Arc::new(AstNode {
            kind,
            annotations: Annotations::new(),
            checks: Vec::new(),
            encoding: None,
            context: None,
        }))
    }

    pub fn from_node(node: AstNode) -> Self {
        Ast(Arc::new(node))
    }

    pub(crate) fn arc(&self) -> &Arc<AstNode> {
        &self.0
    }

    /// Identity of the underlying node
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(a: &Ast, b: &Ast) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// A handle that does not keep the node alive
    pub fn downgrade(&self) -> WeakAst {
        WeakAst(Arc::downgrade(&self.0))
    }

    /// Copy the node, apply `f`, and wrap the result
    pub fn with_node(&self, f: impl FnOnce(&mut AstNode)) -> Ast {
        let mut node = (*self.0).clone();
        f(&mut node);
        Ast(Arc::new(node))
    }

    pub fn tag(&self) -> &'static str {
        match &self.kind {
            AstKind::Null => "Null",
            AstKind::Undefined => "Undefined",
            AstKind::Void => "Void",
            AstKind::Never => "Never",
            AstKind::Unknown => "Unknown",
            AstKind::Any => "Any",
            AstKind::String => "String",
            AstKind::Number => "Number",
            AstKind::Boolean => "Boolean",
            AstKind::BigInt => "BigInt",
            AstKind::Symbol => "Symbol",
            AstKind::ObjectKeyword => "ObjectKeyword",
            AstKind::Literal(_) => "Literal",
            AstKind::UniqueSymbol(_) => "UniqueSymbol",
            AstKind::Enums(_) => "Enums",
            AstKind::TemplateLiteral(_) => "TemplateLiteral",
            AstKind::Tuple(_) => "Tuple",
            AstKind::TypeLiteral(_) => "TypeLiteral",
            AstKind::Union(_) => "Union",
            AstKind::Declaration(_) => "Declaration",
            AstKind::Suspend(_) => "Suspend",
        }
    }

    pub fn is_optional(&self) -> bool {
        self.context.as_ref().map_or(false, |c| c.is_optional)
    }

    pub fn is_mutable_key(&self) -> bool {
        self.context.as_ref().map_or(false, |c| c.is_mutable)
    }

    pub fn identifier(&self) -> Option<&str> {
        self.annotations.get_str(annotations::IDENTIFIER)
    }

    /// Node annotations overlaid with key-level annotations
    pub fn key_annotations(&self) -> Annotations {
        match &self.context {
            Some(context) => self.annotations.merge(&context.annotations),
            None => self.annotations.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Mutators
    // -------------------------------------------------------------------------

    pub fn annotate(&self, annotations: Annotations) -> Ast {
        self.with_node(|node| node.annotations = node.annotations.merge(&annotations))
    }

    /// Annotate the key this node sits under (e.g. `messageMissingKey`)
    pub fn annotate_key(&self, annotations: Annotations) -> Ast {
        self.with_context(|context| context.annotations = context.annotations.merge(&annotations))
    }

    /// Append checks after the existing ones
    pub fn with_checks(&self, checks: Vec<Check>) -> Ast {
        self.with_node(|node| node.checks.extend(checks))
    }

    pub fn check(&self, check: Check) -> Ast {
        self.with_checks(vec![check])
    }

    /// Mark the key optional; an encoded node's innermost source is marked too
    pub fn optional_key(&self) -> Ast {
        let mut out = self.with_context(|context| context.is_optional = true);
        if let Some(links) = &self.encoding {
            let mut links = links.clone();
            if let Some(last) = links.last_mut() {
                last.to = last.to.optional_key();
            }
            out = out.with_node(|node| node.encoding = Some(links));
        }
        out
    }

    pub fn mutable_key(&self) -> Ast {
        self.with_context(|context| context.is_mutable = true)
    }

    /// Value used by `parser::make` when the key is absent
    pub fn with_constructor_default(&self, value: Value) -> Ast {
        self.with_context(|context| context.default_value = Some(value))
    }

    pub fn brand(&self, brand: &str) -> Ast {
        let mut brands = self
            .annotations
            .get_json(annotations::BRANDS)
            .and_then(|b| b.as_array().cloned())
            .unwrap_or_default();
        brands.push(serde_json::Value::String(brand.to_string()));
        self.annotate(Annotations::new().with(annotations::BRANDS, brands))
    }

    /// `self` decodes into `to` through `transformation`
    pub fn decode_to(&self, to: &Ast, transformation: Transformation) -> Ast {
        let link = Link::new(self.clone(), transformation);
        let encoding = match &to.encoding {
            Some(links) => links.iter().cloned().chain(std::iter::once(link)).collect(),
            None => vec![link],
        };
        to.replace_encoding(Some(encoding))
    }

    /// `to` encodes into `self` through `transformation`
    pub fn encode_to(&self, to: &Ast, transformation: Transformation) -> Ast {
        to.decode_to(self, transformation.flip())
    }

    pub fn replace_encoding(&self, encoding: Option<Vec<Link>>) -> Ast {
        let encoding = encoding.filter(|links| !links.is_empty());
        self.with_node(|node| node.encoding = encoding)
    }

    pub fn replace_checks(&self, checks: Vec<Check>) -> Ast {
        self.with_node(|node| node.checks = checks)
    }

    pub fn replace_context(&self, context: Option<Context>) -> Ast {
        self.with_node(|node| node.context = context)
    }

    /// Mutable arrays and tuples; other nodes are returned unchanged
    pub fn mutable(&self) -> Ast {
        match &self.kind {
            AstKind::Tuple(tuple) if !tuple.is_mutable => {
                let mut tuple = tuple.clone();
                tuple.is_mutable = true;
                self.with_node(|node| node.kind = AstKind::Tuple(tuple))
            }
            _ => self.clone(),
        }
    }

    fn with_context(&self, f: impl FnOnce(&mut Context)) -> Ast {
        self.with_node(|node| {
            let mut context = node.context.clone().unwrap_or_default();
            f(&mut context);
            node.context = Some(context);
        })
    }
}

impl fmt::Debug for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format::format(self))
    }
}

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format::format(self))
    }
}

// =============================================================================
// Literal
// =============================================================================

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::String(s) => Value::String(s.clone()),
            Literal::Number(n) => Value::Number(*n),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::BigInt(n) => Value::BigInt(*n),
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Literal::String(s.clone())),
            Value::Number(n) => Some(Literal::Number(*n)),
            Value::Boolean(b) => Some(Literal::Boolean(*b)),
            Value::BigInt(n) => Some(Literal::BigInt(*n)),
            _ => None,
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Literal::String(_) => TypeTag::String,
            Literal::Number(_) => TypeTag::Number,
            Literal::Boolean(_) => TypeTag::Boolean,
            Literal::BigInt(_) => TypeTag::BigInt,
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Literal::String(a), Value::String(b)) => a == b,
            (Literal::Number(a), Value::Number(b)) => a == b,
            (Literal::Boolean(a), Value::Boolean(b)) => a == b,
            (Literal::BigInt(a), Value::BigInt(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{}", quote(s)),
            Literal::Number(n) => write!(f, "{}", format_number(*n)),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::BigInt(n) => write!(f, "{}n", n),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Number(n)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Boolean(b)
    }
}

impl Serialize for Literal {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Literal::String(s) => serializer.serialize_str(s),
            Literal::Number(n) => serializer.serialize_f64(*n),
            Literal::Boolean(b) => serializer.serialize_bool(*b),
            Literal::BigInt(n) => serde_json::json!({ "bigint": n.to_string() }).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Literal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        match json {
            serde_json::Value::String(s) => Ok(Literal::String(s)),
            serde_json::Value::Bool(b) => Ok(Literal::Boolean(b)),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Literal::Number)
                .ok_or_else(|| serde::de::Error::custom("literal number out of range")),
            serde_json::Value::Object(map) => map
                .get("bigint")
                .and_then(|b| b.as_str())
                .and_then(|b| b.parse().ok())
                .map(Literal::BigInt)
                .ok_or_else(|| serde::de::Error::custom("expected {\"bigint\": \"<digits>\"}")),
            other => Err(serde::de::Error::custom(format!("invalid literal: {}", other))),
        }
    }
}

// =============================================================================
// Constructors
// =============================================================================

macro_rules! keyword {
    ($($name:ident => $kind:ident),* $(,)?) => {
        $(
            pub fn $name() -> Ast {
                Ast::new(AstKind::$kind)
            }
        )*
    };
}

keyword! {
    null => Null,
    undefined => Undefined,
    void => Void,
    never => Never,
    unknown => Unknown,
    any => Any,
    string => String,
    number => Number,
    boolean => Boolean,
    bigint => BigInt,
    symbol => Symbol,
    object_keyword => ObjectKeyword,
}

pub fn literal(literal: impl Into<Literal>) -> Ast {
    Ast::new(AstKind::Literal(literal.into()))
}

pub fn bigint_literal(n: i128) -> Ast {
    Ast::new(AstKind::Literal(Literal::BigInt(n)))
}

pub fn unique_symbol(symbol: Symbol) -> Ast {
    Ast::new(AstKind::UniqueSymbol(symbol))
}

pub fn enums(members: Vec<(String, Literal)>) -> Ast {
    Ast::new(AstKind::Enums(members))
}

pub fn template_literal(head: impl Into<String>, spans: Vec<(Ast, String)>) -> Ast {
    Ast::new(AstKind::TemplateLiteral(TemplateLiteral {
        head: head.into(),
        spans: spans
            .into_iter()
            .map(|(ast, literal)| TemplateSpan { ast, literal })
            .collect(),
    }))
}

pub fn tuple(elements: Vec<Ast>) -> Ast {
    tuple_with_rest(elements, Vec::new())
}

pub fn tuple_with_rest(elements: Vec<Ast>, rest: Vec<Ast>) -> Ast {
    Ast::new(AstKind::Tuple(Tuple {
        elements,
        rest,
        is_mutable: false,
    }))
}

/// A readonly array of `item`
pub fn array(item: Ast) -> Ast {
    tuple_with_rest(Vec::new(), vec![item])
}

/// A readonly array with at least one `item`
pub fn non_empty_array(item: Ast) -> Ast {
    tuple_with_rest(vec![item.clone()], vec![item])
}

pub fn type_literal(
    property_signatures: Vec<PropertySignature>,
    index_signatures: Vec<IndexSignature>,
) -> Ast {
    Ast::new(AstKind::TypeLiteral(TypeLiteral {
        property_signatures,
        index_signatures,
    }))
}

pub fn property(name: impl Into<PropertyKey>, ty: Ast) -> PropertySignature {
    PropertySignature {
        name: name.into(),
        ty,
    }
}

pub fn index_signature(parameter: Ast, ty: Ast) -> IndexSignature {
    IndexSignature {
        parameter,
        ty,
        merge: None,
    }
}

/// A struct with the given fields, in order
pub fn struct_<K: Into<PropertyKey>>(fields: Vec<(K, Ast)>) -> Ast {
    type_literal(
        fields.into_iter().map(|(name, ty)| property(name, ty)).collect(),
        Vec::new(),
    )
}

/// `{ [key: K]: V }`
pub fn record(key: Ast, value: Ast) -> Ast {
    type_literal(Vec::new(), vec![index_signature(key, value)])
}

pub fn union(types: Vec<Ast>) -> Ast {
    union_with_mode(types, UnionMode::AnyOf)
}

pub fn one_of(types: Vec<Ast>) -> Ast {
    union_with_mode(types, UnionMode::OneOf)
}

pub fn union_with_mode(types: Vec<Ast>, mode: UnionMode) -> Ast {
    Ast::new(AstKind::Union(Union { types, mode }))
}

/// Union of literals
pub fn literals(values: Vec<Literal>) -> Ast {
    union(values.into_iter().map(literal).collect())
}

pub fn declaration(type_parameters: Vec<Ast>, run: DeclarationRun) -> Ast {
    Ast::new(AstKind::Declaration(Declaration {
        type_parameters,
        run,
    }))
}

pub fn suspend<F>(thunk: F) -> Ast
where
    F: Fn() -> Ast + Send + Sync + 'static,
{
    Ast::new(AstKind::Suspend(Suspend::new(Arc::new(thunk))))
}

// =============================================================================
// Structural traversal
// =============================================================================

/// Map `items`, returning `None` when every result is the original node
pub(crate) fn map_or_same(items: &[Ast], f: impl Fn(&Ast) -> Ast) -> Option<Vec<Ast>> {
    let mut changed = false;
    let out: Vec<Ast> = items
        .iter()
        .map(|item| {
            let mapped = f(item);
            if !Ast::ptr_eq(item, &mapped) {
                changed = true;
            }
            mapped
        })
        .collect();
    changed.then_some(out)
}

/// Rebuild `ast` with `f` applied to every direct child. Suspend children
/// are mapped lazily. Returns `ast` itself when nothing changed.
pub(crate) fn map_children(ast: &Ast, f: &'static (dyn Fn(&Ast) -> Ast + Send + Sync), flip_merge: bool) -> Ast {
    let kind = match &ast.kind {
        AstKind::TemplateLiteral(t) => {
            let asts: Vec<Ast> = t.spans.iter().map(|s| s.ast.clone()).collect();
            map_or_same(&asts, f).map(|mapped| {
                AstKind::TemplateLiteral(TemplateLiteral {
                    head: t.head.clone(),
                    spans: mapped
                        .into_iter()
                        .zip(t.spans.iter())
                        .map(|(ast, s)| TemplateSpan {
                            ast,
                            literal: s.literal.clone(),
                        })
                        .collect(),
                })
            })
        }
        AstKind::Tuple(t) => {
            let elements = map_or_same(&t.elements, f);
            let rest = map_or_same(&t.rest, f);
            (elements.is_some() || rest.is_some()).then(|| {
                AstKind::Tuple(Tuple {
                    elements: elements.unwrap_or_else(|| t.elements.clone()),
                    rest: rest.unwrap_or_else(|| t.rest.clone()),
                    is_mutable: t.is_mutable,
                })
            })
        }
        AstKind::TypeLiteral(t) => {
            let types: Vec<Ast> = t.property_signatures.iter().map(|p| p.ty.clone()).collect();
            let properties = map_or_same(&types, f);
            let mut index_changed = flip_merge && t.index_signatures.iter().any(|s| s.merge.is_some());
            let index_signatures: Vec<IndexSignature> = t
                .index_signatures
                .iter()
                .map(|s| {
                    let parameter = f(&s.parameter);
                    let ty = f(&s.ty);
                    if !Ast::ptr_eq(&parameter, &s.parameter) || !Ast::ptr_eq(&ty, &s.ty) {
                        index_changed = true;
                    }
                    IndexSignature {
                        parameter,
                        ty,
                        merge: if flip_merge {
                            s.merge.as_ref().map(KeyValueCombiner::flip)
                        } else {
                            s.merge.clone()
                        },
                    }
                })
                .collect();
            (properties.is_some() || index_changed).then(|| {
                AstKind::TypeLiteral(TypeLiteral {
                    property_signatures: match properties {
                        Some(mapped) => mapped
                            .into_iter()
                            .zip(t.property_signatures.iter())
                            .map(|(ty, p)| PropertySignature {
                                name: p.name.clone(),
                                ty,
                            })
                            .collect(),
                        None => t.property_signatures.clone(),
                    },
                    index_signatures,
                })
            })
        }
        AstKind::Union(u) => map_or_same(&u.types, f).map(|types| {
            AstKind::Union(Union {
                types,
                mode: u.mode,
            })
        }),
        AstKind::Declaration(d) => map_or_same(&d.type_parameters, f).map(|type_parameters| {
            AstKind::Declaration(Declaration {
                type_parameters,
                run: d.run.clone(),
            })
        }),
        AstKind::Suspend(s) => {
            let source = s.clone();
            Some(AstKind::Suspend(Suspend::new(Arc::new(move || f(&source.resolve())))))
        }
        _ => None,
    };
    match kind {
        Some(kind) => ast.with_node(|node| node.kind = kind),
        None => ast.clone(),
    }
}

/// A memoized node rewrite. `Same` stands for the key itself, which the
/// entry must not hold strongly.
#[derive(Clone)]
pub(crate) enum Rewrite {
    Same,
    Node(Ast),
}

pub(crate) type RewriteMemo = IdentityMemo<AstNode, Rewrite>;

pub(crate) fn memo_rewrite(memo: &RewriteMemo, ast: &Ast, compute: impl FnOnce() -> Ast) -> Ast {
    let rewrite = memo.get_or_insert_with(ast.arc(), || {
        let out = compute();
        if Ast::ptr_eq(&out, ast) {
            Rewrite::Same
        } else {
            Rewrite::Node(out)
        }
    });
    match rewrite {
        Rewrite::Same => ast.clone(),
        Rewrite::Node(out) => out,
    }
}

static FLIP_MEMO: Lazy<RewriteMemo> = Lazy::new(IdentityMemo::new);
static TYPE_AST_MEMO: Lazy<RewriteMemo> = Lazy::new(IdentityMemo::new);
static ENCODED_AST_MEMO: Lazy<RewriteMemo> = Lazy::new(IdentityMemo::new);

/// The node for the opposite parse direction
pub fn flip(ast: &Ast) -> Ast {
    memo_rewrite(&FLIP_MEMO, ast, || match &ast.encoding {
        Some(links) => flip_encoding(ast, links),
        None => map_children(ast, &flip, true),
    })
}

fn flip_encoding(ast: &Ast, links: &[Link]) -> Ast {
    let n = links.len();
    let bare = ast.replace_encoding(None);
    let mut chain = Vec::with_capacity(n);
    chain.push(Link::new(flip(&bare), links[0].transformation.flip()));
    for i in 1..n {
        chain.insert(
            0,
            Link::new(flip(&links[i - 1].to), links[i].transformation.flip()),
        );
    }
    let root = flip(&links[n - 1].to);
    let encoding = match &root.encoding {
        Some(existing) => existing.iter().cloned().chain(chain).collect(),
        None => chain,
    };
    root.replace_encoding(Some(encoding))
}

/// The decoded type only: every encoding stripped, recursively
pub fn type_ast(ast: &Ast) -> Ast {
    memo_rewrite(&TYPE_AST_MEMO, ast, || {
        if ast.encoding.is_some() {
            return type_ast(&ast.replace_encoding(None));
        }
        map_children(ast, &type_ast, false)
    })
}

/// The wire shape: the type of the flipped node
pub fn encoded_ast(ast: &Ast) -> Ast {
    memo_rewrite(&ENCODED_AST_MEMO, ast, || type_ast(&flip(ast)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformation;

    #[test]
    fn test_mutators_return_new_nodes() {
        let base = string();
        let annotated = base.annotate(Annotations::new().with(annotations::TITLE, "Name"));
        assert!(!Ast::ptr_eq(&base, &annotated));
        assert!(base.annotations.is_empty());
        assert_eq!(annotated.annotations.get_str("title"), Some("Name"));
    }

    #[test]
    fn test_map_or_same_keeps_identity() {
        let members = vec![string(), number()];
        assert!(map_or_same(&members, |a| a.clone()).is_none());
        let s = struct_(vec![("a", string())]);
        assert!(Ast::ptr_eq(&type_ast(&s), &s));
    }

    #[test]
    fn test_type_ast_strips_encoding() {
        let n = string().decode_to(&number(), transformation::number_from_string());
        assert!(n.encoding.is_some());
        let t = type_ast(&n);
        assert!(t.encoding.is_none());
        assert_eq!(t.tag(), "Number");
        assert_eq!(encoded_ast(&n).tag(), "String");
    }

    #[test]
    fn test_flip_reroots_chain() {
        let n = string().decode_to(&number(), transformation::number_from_string());
        let flipped = flip(&n);
        assert_eq!(flipped.tag(), "String");
        let links = flipped.encoding.as_ref().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].to.tag(), "Number");
        let back = flip(&flipped);
        assert_eq!(back.tag(), "Number");
        assert_eq!(back.encoding.as_ref().unwrap()[0].to.tag(), "String");
    }

    #[test]
    fn test_optional_key_marks_encoded_side() {
        let n = string()
            .decode_to(&number(), transformation::number_from_string())
            .optional_key();
        assert!(n.is_optional());
        assert!(n.encoding.as_ref().unwrap()[0].to.is_optional());
        assert!(flip(&n).is_optional());
    }

    #[test]
    fn test_suspend_thunk_runs_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let s = suspend(|| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            string()
        });
        let AstKind::Suspend(inner) = &s.kind else { panic!("not a suspend") };
        inner.resolve();
        inner.resolve();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unchanged_rewrites_do_not_pin_the_node() {
        let s = struct_(vec![("a", string()), ("b", array(number()))]);
        assert!(Ast::ptr_eq(&flip(&s), &s));
        assert!(Ast::ptr_eq(&type_ast(&s), &s));
        assert!(Ast::ptr_eq(&encoded_ast(&s), &s));
        let weak = s.downgrade();
        drop(s);
        assert!(!weak.is_alive());
        assert_eq!(weak.upgrade().tag(), "Never");
    }

    #[test]
    fn test_brand_accumulates() {
        let b = number().brand("Int").brand("Positive");
        assert_eq!(
            b.annotations.get_json("brands"),
            Some(&serde_json::json!(["Int", "Positive"]))
        );
    }
}
