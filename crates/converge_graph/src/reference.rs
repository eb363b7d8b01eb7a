//! `${kind.name.attribute}` references inside attribute values.
//!
//! A string that is exactly one token resolves to the referenced value with
//! its JSON type intact. A token embedded in a longer string is interpolated
//! as text. Tokens are found recursively inside arrays and objects.

use core::fmt;

use serde_json::Value;

use crate::attributes::Attributes;
use crate::error::GraphError;
use crate::resource::ResourceId;

const OPEN: &str = "${";
const CLOSE: char = '}';

/// A reference from one resource's attribute to another resource's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// The resource being referenced.
    pub target: ResourceId,
    /// Attribute path on the target; dots select nested object fields.
    pub attribute: String,
}

impl Reference {
    /// Parses the inside of a token (`kind.name.attribute`).
    ///
    /// Returns `None` for text that is not a well-formed reference.
    #[must_use]
    pub fn parse(inner: &str) -> Option<Self> {
        let mut parts = inner.trim().splitn(3, '.');
        let kind = parts.next()?;
        let name = parts.next()?;
        let attribute = parts.next()?;
        if attribute.is_empty() || attribute.split('.').any(str::is_empty) {
            return None;
        }
        let target = ResourceId::new(kind, name).ok()?;
        Some(Self {
            target,
            attribute: attribute.to_string(),
        })
    }

    /// Collects every reference in a value, in document order.
    #[must_use]
    pub fn parse_all(value: &Value) -> Vec<Reference> {
        let mut found = Vec::new();
        collect(value, &mut found);
        found
    }

    /// Collects every reference across an attribute map.
    #[must_use]
    pub fn parse_attributes(attributes: &Attributes) -> Vec<(String, Reference)> {
        attributes
            .iter()
            .flat_map(|(name, value)| {
                Self::parse_all(value)
                    .into_iter()
                    .map(move |reference| (name.clone(), reference))
            })
            .collect()
    }

    /// Reads this reference's attribute path out of the target's attributes.
    #[must_use]
    pub fn lookup_in(&self, attributes: &Attributes) -> Option<Value> {
        let mut segments = self.attribute.split('.');
        let mut current = attributes.get(segments.next()?)?;
        for segment in segments {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}}}", self.target, self.attribute)
    }
}

/// Returns true if the value contains at least one reference.
#[must_use]
pub fn contains_references(value: &Value) -> bool {
    !Reference::parse_all(value).is_empty()
}

/// Substitutes every reference in `value` using `lookup`.
///
/// # Errors
///
/// Returns [`GraphError::UnresolvedReference`] for the first reference
/// `lookup` cannot answer.
pub fn resolve<F>(value: &Value, lookup: &F) -> Result<Value, GraphError>
where
    F: Fn(&Reference) -> Option<Value>,
{
    match value {
        Value::String(text) => resolve_string(text, lookup),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve(item, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(key, item)| Ok((key.clone(), resolve(item, lookup)?)))
            .collect::<Result<serde_json::Map<_, _>, GraphError>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

/// Substitutes references across an attribute map.
///
/// # Errors
///
/// Same as [`resolve`].
pub fn resolve_attributes<F>(attributes: &Attributes, lookup: &F) -> Result<Attributes, GraphError>
where
    F: Fn(&Reference) -> Option<Value>,
{
    attributes
        .iter()
        .map(|(name, value)| Ok((name.clone(), resolve(value, lookup)?)))
        .collect()
}

fn collect(value: &Value, found: &mut Vec<Reference>) {
    match value {
        Value::String(text) => {
            for token in tokens(text) {
                if let Some(reference) = token.reference {
                    found.push(reference);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect(item, found)),
        Value::Object(map) => map.values().for_each(|item| collect(item, found)),
        _ => {}
    }
}

fn resolve_string<F>(text: &str, lookup: &F) -> Result<Value, GraphError>
where
    F: Fn(&Reference) -> Option<Value>,
{
    let tokens = tokens(text);

    // Whole-string reference keeps the referenced value's type.
    if let [token] = tokens.as_slice()
        && token.start == 0
        && token.end == text.len()
        && let Some(reference) = &token.reference
    {
        return lookup(reference).ok_or_else(|| GraphError::UnresolvedReference(reference.to_string()));
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for token in &tokens {
        let Some(reference) = &token.reference else {
            continue;
        };
        out.push_str(&text[cursor..token.start]);
        let value = lookup(reference)
            .ok_or_else(|| GraphError::UnresolvedReference(reference.to_string()))?;
        match value {
            Value::String(s) => out.push_str(&s),
            other => out.push_str(&other.to_string()),
        }
        cursor = token.end;
    }
    out.push_str(&text[cursor..]);
    Ok(Value::String(out))
}

struct Token {
    start: usize,
    end: usize,
    reference: Option<Reference>,
}

fn tokens(text: &str) -> Vec<Token> {
    let mut found = Vec::new();
    let mut offset = 0;
    while let Some(open) = text[offset..].find(OPEN) {
        let start = offset + open;
        let inner_start = start + OPEN.len();
        let Some(close) = text[inner_start..].find(CLOSE) else {
            break;
        };
        let end = inner_start + close + 1;
        found.push(Token {
            start,
            end,
            reference: Reference::parse(&text[inner_start..end - 1]),
        });
        offset = end;
    }
    found
}
