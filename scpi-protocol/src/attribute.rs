//! Device-independent attribute requests and responses.
use std::{cmp::Ordering, fmt::Display};

use crate::{block::BlockData, definition::FieldType, ordered::OrderedMap};

/// The value of an attribute, or an argument of a set operation.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Block(BlockData),
}

impl AttributeValue {
    /// Whether the value counts as "set" when written to a flag bit.
    pub fn is_truthy(&self) -> bool {
        match self {
            AttributeValue::Bool(b) => *b,
            AttributeValue::Int(i) => *i != 0,
            AttributeValue::Float(f) => *f != 0.0,
            AttributeValue::Str(s) => !s.is_empty(),
            AttributeValue::Block(block) => !block.is_empty(),
        }
    }

    /// Parses user supplied text as a value for a binding of `field_type`.
    ///
    /// Booleans accept `1`/`0`, `true`/`false` and `on`/`off`; blocks are comma separated
    /// numbers. Untyped (command) bindings keep the text as a string.
    pub fn parse(text: &str, field_type: Option<FieldType>) -> Option<AttributeValue> {
        let text = text.trim();
        match field_type {
            Some(FieldType::Bool | FieldType::Bit(_)) => match text.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" => Some(AttributeValue::Bool(true)),
                "0" | "false" | "off" => Some(AttributeValue::Bool(false)),
                _ => None,
            },
            Some(FieldType::Int) => text.parse().ok().map(AttributeValue::Int),
            Some(FieldType::Float | FieldType::PacketItem(_)) => {
                text.parse().ok().map(AttributeValue::Float)
            }
            Some(FieldType::ArbitraryBlock(data_type)) => text
                .split(',')
                .filter(|item| !item.trim().is_empty())
                .map(|item| item.trim().parse::<f64>().ok())
                .collect::<Option<Vec<_>>>()
                .map(|values| AttributeValue::Block(BlockData::from_f64s(data_type, &values))),
            Some(FieldType::Str) | None => Some(AttributeValue::Str(text.to_string())),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as a float; integers are converted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&BlockData> {
        match self {
            AttributeValue::Block(block) => Some(block),
            _ => None,
        }
    }
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Str(s) => f.write_str(s),
            AttributeValue::Block(block) => write!(f, "{}", block),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Str(value)
    }
}

impl From<BlockData> for AttributeValue {
    fn from(value: BlockData) -> Self {
        AttributeValue::Block(value)
    }
}

/// A set operation: the attribute to write (or command to invoke) and its arguments.
pub type Setop<V> = (String, Vec<V>);

/// A request for attribute values ("queries") and attribute writes or commands ("setops").
///
/// Queries form an ordered set. Setops form an ordered multiset; a setop without arguments
/// invokes a command.
///
/// Two requests are equal when their query sets and setop multisets are equal, regardless of
/// order. A request is greater than or equal to another when it *subsumes* it: marshalling a
/// query on one boolean of a flag field and unmarshalling it again yields queries on every
/// boolean of that field, so a round trip is only guaranteed to subsume the original.
///
/// ```
/// use scpi_protocol::AttributeRequest;
///
/// let mut original = AttributeRequest::new();
/// original.set_queries(["overripe"]);
///
/// let mut roundtrip = AttributeRequest::new();
/// roundtrip.set_queries(["overripe", "under-ripe", "chilled"]);
///
/// assert!(roundtrip >= original);
/// assert!(roundtrip != original);
/// ```
#[derive(Clone, Debug, Default)]
pub struct AttributeRequest {
    queries: OrderedMap<String, ()>,
    setops: Vec<Setop<AttributeValue>>,
}

impl AttributeRequest {
    pub fn new() -> AttributeRequest {
        AttributeRequest::default()
    }

    /// Replaces the set of attributes to query.
    pub fn set_queries<I, S>(&mut self, attributes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queries.clear();
        for attribute in attributes {
            self.add_query(attribute);
        }
    }

    pub fn add_query(&mut self, attribute: impl Into<String>) {
        self.queries.insert(attribute.into(), ());
    }

    /// Adds a set operation. For an attribute write there is exactly one argument.
    pub fn add_setop<I, V>(&mut self, attribute: impl Into<String>, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        self.setops
            .push((attribute.into(), args.into_iter().map(Into::into).collect()));
    }

    /// Adds a command invocation without arguments.
    pub fn add_command(&mut self, attribute: impl Into<String>) {
        self.setops.push((attribute.into(), Vec::new()));
    }

    pub fn clear_setops(&mut self) {
        self.setops.clear();
    }

    pub fn queries(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }

    pub fn has_query(&self, attribute: &str) -> bool {
        self.queries.contains_key(attribute)
    }

    pub fn setops(&self) -> &[Setop<AttributeValue>] {
        &self.setops
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.setops.is_empty()
    }

    /// Whether every query and every setop (with multiplicity) of `other` is also in `self`.
    pub fn subsumes(&self, other: &AttributeRequest) -> bool {
        other.queries.keys().all(|query| self.queries.contains_key(query))
            && multiset_includes(&self.setops, &other.setops)
    }
}

fn multiset_includes<T: PartialEq>(outer: &[T], inner: &[T]) -> bool {
    let count = |items: &[T], item: &T| items.iter().filter(|other| *other == item).count();
    inner
        .iter()
        .all(|item| count(inner, item) <= count(outer, item))
}

impl PartialEq for AttributeRequest {
    fn eq(&self, other: &Self) -> bool {
        self.queries == other.queries
            && self.setops.len() == other.setops.len()
            && multiset_includes(&self.setops, &other.setops)
    }
}

impl PartialOrd for AttributeRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.subsumes(other), other.subsumes(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => None,
        }
    }
}

/// Values of queried attributes. The last value added for an attribute wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeResponse {
    responses: OrderedMap<String, AttributeValue>,
}

impl AttributeResponse {
    pub fn new() -> AttributeResponse {
        AttributeResponse::default()
    }

    pub fn add_query_response(
        &mut self,
        attribute: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) {
        self.responses.insert(attribute.into(), value.into());
    }

    pub fn get(&self, attribute: &str) -> Option<&AttributeValue> {
        self.responses.get(attribute)
    }

    /// Responses in the order in which the attributes were first added.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.responses.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn request(queries: &[&str], setops: &[(&str, bool)]) -> AttributeRequest {
        let mut request = AttributeRequest::new();
        request.set_queries(queries.iter().copied());
        for (attribute, value) in setops {
            request.add_setop(*attribute, [*value]);
        }
        request
    }

    #[test]
    fn equality_ignores_order() {
        let a = request(&["a", "b"], &[("x", true), ("y", false)]);
        let b = request(&["b", "a"], &[("y", false), ("x", true)]);
        assert_eq!(a, b);
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Equal));
    }

    #[test]
    fn setops_are_a_multiset() {
        let once = request(&[], &[("x", true)]);
        let twice = request(&[], &[("x", true), ("x", true)]);
        assert_ne!(once, twice);
        assert!(twice > once);
        assert!(!(once >= twice));
    }

    #[test]
    fn incomparable_requests() {
        let a = request(&["a"], &[]);
        let b = request(&["b"], &[]);
        assert_eq!(a.partial_cmp(&b), None);
    }

    #[test]
    fn set_queries_replaces_and_deduplicates() {
        let mut request = AttributeRequest::new();
        request.set_queries(["a", "b"]);
        request.set_queries(["c", "c", "d"]);
        assert_eq!(request.queries().collect::<Vec<_>>(), vec!["c", "d"]);
    }

    #[test]
    fn last_response_wins() {
        let mut response = AttributeResponse::new();
        response.add_query_response("a", 1);
        response.add_query_response("b", "x");
        response.add_query_response("a", 2.5);
        assert_eq!(response.len(), 2);
        assert_eq!(response.get("a"), Some(&AttributeValue::Float(2.5)));
        assert_eq!(response.iter().next().map(|(k, _)| k), Some("a"));
    }

    #[test]
    fn truthiness() {
        assert!(AttributeValue::from(true).is_truthy());
        assert!(!AttributeValue::from(0).is_truthy());
        assert!(AttributeValue::from(0.5).is_truthy());
        assert!(!AttributeValue::from("").is_truthy());
    }

    #[test]
    fn parse_by_field_type() {
        assert_eq!(
            AttributeValue::parse("ON", Some(FieldType::Bit(3))),
            Some(AttributeValue::Bool(true))
        );
        assert_eq!(
            AttributeValue::parse("42", Some(FieldType::Int)),
            Some(AttributeValue::Int(42))
        );
        assert_eq!(AttributeValue::parse("4.2.1", Some(FieldType::Float)), None);
        assert_eq!(
            AttributeValue::parse(
                "1, 2,3",
                Some(FieldType::ArbitraryBlock(crate::block::BlockDataType::UInt8))
            ),
            Some(AttributeValue::Block(BlockData::UInt8(vec![1, 2, 3])))
        );
        assert_eq!(
            AttributeValue::parse("hello", None),
            Some(AttributeValue::Str("hello".to_string()))
        );
    }
}
