//! This module resolves a schema tree into an executable graph.
//!
//! Resolution does two jobs in two passes:
//!
//! 1. **Collect**: every named definition (from `definitions` nodes
//!    anywhere in the tree) is moved into a flat arena, and the
//!    `definitions` wrappers are stripped.
//! 2. **Link**: every `definition-ref` is rewritten to an index into that
//!    arena, and build-time structural checks run (bounds sanity, field
//!    default conflicts, on_error admissibility, empty unions, ...).
//!
//! Recursive schemas therefore become graphs with integer back-edges
//! instead of infinite trees; indices are plain data, so ownership cycles
//! never arise.

use crate::errors::SchemaError;
use crate::schema::*;
use std::collections::BTreeMap;

/// The executable form of a schema: a root node plus the shared
/// definitions arena.  Built once, immutable thereafter.
#[derive(Debug)]
pub(crate) struct Resolved {
    pub(crate) defs: Vec<SchemaNode>,
    pub(crate) root: SchemaNode,
}

pub(crate) fn resolve(schema: SchemaNode) -> Result<Resolved, SchemaError> {
    let mut resolver = Resolver::default();
    let root = resolver.collect(schema)?;
    let defs = resolver
        .defs
        .into_iter()
        .map(|d| d.expect("definition collected"))
        .collect::<Vec<_>>();
    let linker = Linker {
        names: resolver.names,
    };
    let defs = defs
        .into_iter()
        .map(|d| linker.link(d))
        .collect::<Result<Vec<_>, _>>()?;
    let root = linker.link(root)?;
    Ok(Resolved { defs, root })
}

/// Rebuild a node, applying `f` to each direct child schema.
fn map_children<F>(node: SchemaNode, f: &mut F) -> Result<SchemaNode, SchemaError>
where
    F: FnMut(SchemaNode) -> Result<SchemaNode, SchemaError>,
{
    use SchemaNode::*;
    let node = match node {
        Any | None | Bool(_) | Int(_) | Float(_) | Str(_) | Bytes(_) | Literal(_)
        | DefinitionRef(_) | FunctionPlain(_) => node,
        List(seq) => List(map_seq(seq, f)?),
        Set(seq) => Set(map_seq(seq, f)?),
        Tuple(t) => Tuple(TupleSchema {
            items: t
                .items
                .into_iter()
                .map(|n| f(n))
                .collect::<Result<Vec<_>, _>>()?,
            variadic_item: map_boxed(t.variadic_item, f)?,
            strict: t.strict,
        }),
        Dict(d) => Dict(DictSchema {
            key: map_boxed(d.key, f)?,
            value: map_boxed(d.value, f)?,
            min_length: d.min_length,
            max_length: d.max_length,
            strict: d.strict,
        }),
        Union(u) => Union(UnionSchema {
            choices: u
                .choices
                .into_iter()
                .map(|n| f(n))
                .collect::<Result<Vec<_>, _>>()?,
            mode: u.mode,
        }),
        TaggedUnion(tu) => TaggedUnion(TaggedUnionSchema {
            discriminator: tu.discriminator,
            choices: tu
                .choices
                .into_iter()
                .map(|(tag, n)| Ok((tag, f(n)?)))
                .collect::<Result<Vec<_>, SchemaError>>()?,
        }),
        Model(m) => {
            let fields = m
                .fields
                .into_iter()
                .map(|field| {
                    Ok(Field {
                        schema: f(field.schema)?,
                        ..field
                    })
                })
                .collect::<Result<Vec<_>, SchemaError>>()?;
            let extra_schema = map_boxed(m.extra_schema, f)?;
            Model(ModelSchema {
                fields,
                extra_schema,
                ..m
            })
        }
        Chain(c) => Chain(ChainSchema {
            steps: c
                .steps
                .into_iter()
                .map(|n| f(n))
                .collect::<Result<Vec<_>, _>>()?,
        }),
        Nullable(inner) => Nullable(Box::new(f(*inner)?)),
        WithDefault(w) => WithDefault(WithDefaultSchema {
            schema: Box::new(f(*w.schema)?),
            ..w
        }),
        CustomError(c) => CustomError(CustomErrorSchema {
            schema: Box::new(f(*c.schema)?),
            message: c.message,
        }),
        FunctionBefore(fs) => FunctionBefore(FunctionSchema {
            schema: Box::new(f(*fs.schema)?),
            function: fs.function,
        }),
        FunctionAfter(fs) => FunctionAfter(FunctionSchema {
            schema: Box::new(f(*fs.schema)?),
            function: fs.function,
        }),
        FunctionWrap(ws) => FunctionWrap(WrapSchema {
            schema: Box::new(f(*ws.schema)?),
            function: ws.function,
        }),
        CustomSer(cs) => CustomSer(CustomSerSchema {
            schema: Box::new(f(*cs.schema)?),
            function: cs.function,
        }),
        // Callers handle `definitions` before recursing.
        Definitions(d) => Definitions(DefinitionsSchema {
            definitions: d.definitions,
            schema: Box::new(f(*d.schema)?),
        }),
    };
    Ok(node)
}

fn map_seq<F>(seq: SeqSchema, f: &mut F) -> Result<SeqSchema, SchemaError>
where
    F: FnMut(SchemaNode) -> Result<SchemaNode, SchemaError>,
{
    Ok(SeqSchema {
        item: map_boxed(seq.item, f)?,
        min_length: seq.min_length,
        max_length: seq.max_length,
        strict: seq.strict,
    })
}

fn map_boxed<F>(
    node: Option<Box<SchemaNode>>,
    f: &mut F,
) -> Result<Option<Box<SchemaNode>>, SchemaError>
where
    F: FnMut(SchemaNode) -> Result<SchemaNode, SchemaError>,
{
    match node {
        Some(inner) => Ok(Some(Box::new(f(*inner)?))),
        Option::None => Ok(Option::None),
    }
}

/// Pass 1: moves definitions into the arena and strips their wrappers.
#[derive(Default)]
struct Resolver {
    defs: Vec<Option<SchemaNode>>,
    names: BTreeMap<String, usize>,
}

impl Resolver {
    fn collect(&mut self, node: SchemaNode) -> Result<SchemaNode, SchemaError> {
        match node {
            SchemaNode::Definitions(d) => {
                // Register every name first, so definitions can reference
                // each other (and themselves) regardless of order.
                let mut indices = Vec::with_capacity(d.definitions.len());
                for (name, _) in &d.definitions {
                    if self.names.contains_key(name) {
                        return Err(SchemaError::DuplicateRef(name.clone()));
                    }
                    let index = self.defs.len();
                    self.defs.push(Option::None);
                    self.names.insert(name.clone(), index);
                    indices.push(index);
                }
                for ((_, def_node), index) in d.definitions.into_iter().zip(indices) {
                    let collected = self.collect(def_node)?;
                    self.defs[index] = Some(collected);
                }
                self.collect(*d.schema)
            }
            other => map_children(other, &mut |child| self.collect(child)),
        }
    }
}

/// Pass 2: rewrites references to indices and runs build-time checks.
struct Linker {
    names: BTreeMap<String, usize>,
}

impl Linker {
    fn link(&self, node: SchemaNode) -> Result<SchemaNode, SchemaError> {
        check_node(&node)?;
        match node {
            SchemaNode::DefinitionRef(r) => match self.names.get(&r.name) {
                Some(&index) => Ok(SchemaNode::DefinitionRef(DefRef {
                    name: r.name,
                    index: Some(index),
                })),
                Option::None => Err(SchemaError::DanglingRef(r.name)),
            },
            other => map_children(other, &mut |child| self.link(child)),
        }
    }
}

fn check_lengths(
    min: Option<usize>,
    max: Option<usize>,
    what: &str,
) -> Result<(), SchemaError> {
    if let (Some(lo), Some(hi)) = (min, max) {
        if lo > hi {
            return Err(SchemaError::InvalidBounds(format!(
                "{} min_length {} exceeds max_length {}",
                what, lo, hi
            )));
        }
    }
    Ok(())
}

fn check_numeric(bounds: &NumberBounds) -> Result<(), SchemaError> {
    let entries = [
        ("ge", &bounds.ge),
        ("gt", &bounds.gt),
        ("le", &bounds.le),
        ("lt", &bounds.lt),
        ("multiple_of", &bounds.multiple_of),
    ];
    for (name, bound) in &entries {
        if let Some(v) = bound {
            if !v.is_number() {
                return Err(SchemaError::InvalidBounds(format!(
                    "{} bound must be a number, got {}",
                    name,
                    v.type_name()
                )));
            }
        }
    }
    Ok(())
}

fn check_node(node: &SchemaNode) -> Result<(), SchemaError> {
    match node {
        SchemaNode::Int(s) => check_numeric(&s.bounds),
        SchemaNode::Float(s) => check_numeric(&s.bounds),
        SchemaNode::Str(s) => check_lengths(s.min_length, s.max_length, "str"),
        SchemaNode::Bytes(s) => check_lengths(s.min_length, s.max_length, "bytes"),
        SchemaNode::List(s) | SchemaNode::Set(s) => {
            check_lengths(s.min_length, s.max_length, node.kind_str())
        }
        SchemaNode::Dict(s) => check_lengths(s.min_length, s.max_length, "dict"),
        SchemaNode::Literal(s) => {
            if s.expected.is_empty() {
                return Err(SchemaError::InvalidKey {
                    key: "expected",
                    reason: "literal requires at least one expected value".into(),
                });
            }
            Ok(())
        }
        SchemaNode::Union(u) => {
            if u.choices.is_empty() {
                return Err(SchemaError::InvalidKey {
                    key: "choices",
                    reason: "union requires at least one choice".into(),
                });
            }
            Ok(())
        }
        SchemaNode::TaggedUnion(tu) => {
            if tu.choices.is_empty() {
                return Err(SchemaError::InvalidKey {
                    key: "choices",
                    reason: "tagged union requires at least one choice".into(),
                });
            }
            let mut seen = std::collections::BTreeSet::new();
            for (tag, _) in &tu.choices {
                if !seen.insert(tag) {
                    return Err(SchemaError::InvalidKey {
                        key: "choices",
                        reason: format!("duplicate tag '{}'", tag),
                    });
                }
            }
            Ok(())
        }
        SchemaNode::Chain(c) => {
            if c.steps.is_empty() {
                return Err(SchemaError::InvalidKey {
                    key: "steps",
                    reason: "chain requires at least one step".into(),
                });
            }
            Ok(())
        }
        SchemaNode::Model(m) => check_model(m),
        SchemaNode::WithDefault(w) => {
            if w.default.is_some() && w.default_factory.is_some() {
                return Err(SchemaError::DefaultConflict("<with-default>".into()));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_model(model: &ModelSchema) -> Result<(), SchemaError> {
    let mut seen = std::collections::BTreeSet::new();
    for field in &model.fields {
        if !seen.insert(&field.name) {
            return Err(SchemaError::InvalidKey {
                key: "fields",
                reason: format!("duplicate field name '{}'", field.name),
            });
        }
        if field.default.is_some() && field.default_factory.is_some() {
            return Err(SchemaError::DefaultConflict(field.name.clone()));
        }
        match field.on_error {
            OnError::Raise => {}
            OnError::Omit => {
                if field.required {
                    return Err(SchemaError::InvalidOnError {
                        field: field.name.clone(),
                        reason: "'omit' requires a non-required field".into(),
                    });
                }
            }
            OnError::FallbackOnDefault => {
                if !field.has_default() {
                    return Err(SchemaError::InvalidOnError {
                        field: field.name.clone(),
                        reason: "'fallback_on_default' requires a default".into(),
                    });
                }
            }
        }
    }
    Ok(())
}
