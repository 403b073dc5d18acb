//! Filter and sort evaluation over row attributes.
//!
//! Rows expose their attributes through [`FieldAccess`]. The implementation
//! for `serde_json::Value` resolves dotted paths (`"address.city"`) into
//! nested objects.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::DataResult;
use crate::types::{
    AttributeOperator, CompoundOperator, FilterCriterion, SortCriterion, SortDirection,
};

/// Attribute access for filtering, sorting and projection.
pub trait FieldAccess {
    /// The value of the attribute at a dotted path.
    fn field(&self, path: &str) -> Option<Value>;

    /// String values searched by text filters.
    fn text_fields(&self) -> Vec<String> {
        Vec::new()
    }

    /// A copy restricted to `attributes`.
    fn project(&self, attributes: &[String]) -> Self
    where
        Self: Sized + Clone,
    {
        let _ = attributes;
        self.clone()
    }
}

impl FieldAccess for Value {
    fn field(&self, path: &str) -> Option<Value> {
        path.split('.')
            .try_fold(self, |current, segment| current.as_object()?.get(segment))
            .cloned()
    }

    fn text_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        collect_strings(self, &mut fields);
        fields
    }

    fn project(&self, attributes: &[String]) -> Self {
        let Some(object) = self.as_object() else {
            return self.clone();
        };
        let projected: Map<String, Value> = object
            .iter()
            .filter(|(name, _)| attributes.iter().any(|attribute| attribute == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Value::Object(projected)
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) => out.push(text.clone()),
        Value::Array(values) => values.iter().for_each(|value| collect_strings(value, out)),
        Value::Object(object) => object.values().for_each(|value| collect_strings(value, out)),
        _ => {}
    }
}

/// A filter criterion with its patterns compiled, for evaluation over many rows.
#[derive(Debug)]
pub struct CompiledFilter<'a> {
    node: Node<'a>,
}

#[derive(Debug)]
enum Node<'a> {
    Attribute {
        op: AttributeOperator,
        attribute: &'a str,
        value: &'a Value,
        pattern: Option<Regex>,
    },
    All(Vec<Node<'a>>),
    Any(Vec<Node<'a>>),
    Text(String),
}

impl<'a> CompiledFilter<'a> {
    /// Compile `criterion`; invalid patterns are rejected.
    pub fn compile(criterion: &'a FilterCriterion) -> DataResult<Self> {
        Ok(Self {
            node: Node::compile(criterion)?,
        })
    }

    /// Whether `row` satisfies the criterion.
    pub fn matches<T: FieldAccess + ?Sized>(&self, row: &T) -> bool {
        self.node.matches(row)
    }
}

impl<'a> Node<'a> {
    fn compile(criterion: &'a FilterCriterion) -> DataResult<Self> {
        Ok(match criterion {
            FilterCriterion::Attribute { op, attribute, value } => {
                let pattern = match (op, value.as_str()) {
                    (AttributeOperator::Regex, Some(pattern)) => Some(Regex::new(pattern)?),
                    _ => None,
                };
                Node::Attribute {
                    op: *op,
                    attribute,
                    value,
                    pattern,
                }
            }
            FilterCriterion::Compound { op, criteria } => {
                let nodes = criteria.iter().map(Node::compile).collect::<DataResult<Vec<_>>>()?;
                match op {
                    CompoundOperator::And => Node::All(nodes),
                    CompoundOperator::Or => Node::Any(nodes),
                }
            }
            FilterCriterion::Text { text } => Node::Text(text.to_lowercase()),
        })
    }

    fn matches<T: FieldAccess + ?Sized>(&self, row: &T) -> bool {
        match self {
            Node::Attribute {
                op,
                attribute,
                value,
                pattern,
            } => matches_attribute(row.field(attribute).as_ref(), *op, value, pattern.as_ref()),
            Node::All(nodes) => nodes.iter().all(|node| node.matches(row)),
            Node::Any(nodes) => nodes.iter().any(|node| node.matches(row)),
            Node::Text(needle) => row
                .text_fields()
                .iter()
                .any(|field| field.to_lowercase().contains(needle.as_str())),
        }
    }
}

/// Reject criteria that cannot be evaluated, such as invalid patterns.
pub fn validate(criterion: &FilterCriterion) -> DataResult<()> {
    CompiledFilter::compile(criterion).map(|_| ())
}

/// Whether `row` satisfies `criterion`; an invalid criterion matches nothing.
///
/// Patterns are compiled on every call. Use [`CompiledFilter`] to evaluate
/// many rows.
pub fn matches<T: FieldAccess + ?Sized>(row: &T, criterion: &FilterCriterion) -> bool {
    CompiledFilter::compile(criterion).is_ok_and(|filter| filter.matches(row))
}

fn matches_attribute(
    actual: Option<&Value>,
    op: AttributeOperator,
    expected: &Value,
    pattern: Option<&Regex>,
) -> bool {
    let null = Value::Null;
    let actual = actual.unwrap_or(&null);
    let order = || comparable(actual, expected).then(|| compare_values(actual, expected));
    match op {
        AttributeOperator::Eq => actual == expected,
        AttributeOperator::Ne => actual != expected,
        AttributeOperator::Lt => order() == Some(Ordering::Less),
        AttributeOperator::Le => order().is_some_and(Ordering::is_le),
        AttributeOperator::Gt => order() == Some(Ordering::Greater),
        AttributeOperator::Ge => order().is_some_and(Ordering::is_ge),
        AttributeOperator::Contains => string_test(actual, expected, |a, e| a.contains(e)),
        AttributeOperator::StartsWith => string_test(actual, expected, |a, e| a.starts_with(e)),
        AttributeOperator::EndsWith => string_test(actual, expected, |a, e| a.ends_with(e)),
        AttributeOperator::Present => !actual.is_null(),
        AttributeOperator::Regex => match (actual.as_str(), pattern) {
            (Some(actual), Some(pattern)) => pattern.is_match(actual),
            _ => false,
        },
    }
}

/// Ordering comparisons only hold between values of the same kind.
fn comparable(a: &Value, b: &Value) -> bool {
    rank(a) == rank(b) && !a.is_null()
}

fn string_test(actual: &Value, expected: &Value, test: impl Fn(&str, &str) -> bool) -> bool {
    match (actual.as_str(), expected.as_str()) {
        (Some(actual), Some(expected)) => test(&actual.to_lowercase(), &expected.to_lowercase()),
        _ => false,
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(a, b)| compare_values(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Compare two rows by a list of sort criteria.
pub fn compare_rows<T: FieldAccess + ?Sized>(a: &T, b: &T, criteria: &[SortCriterion]) -> Ordering {
    for criterion in criteria {
        let left = a.field(&criterion.attribute).unwrap_or(Value::Null);
        let right = b.field(&criterion.attribute).unwrap_or(Value::Null);
        let ordering = compare_values(&left, &right);
        let ordering = match criterion.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering.is_ne() {
            return ordering;
        }
    }
    Ordering::Equal
}
