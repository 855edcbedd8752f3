//! SCPI-level requests and responses, expressed in terms of field names.
use std::collections::HashMap;

use bytes::Bytes;

use crate::{attribute::Setop, ordered::OrderedMap};

/// A SCPI request: fields to query and field set operations with string arguments.
#[derive(Clone, Debug, Default)]
pub struct ScpiRequest {
    queries: OrderedMap<String, ()>,
    setops: Vec<Setop<String>>,
    // Position of the first setop for each field.
    setop_index: HashMap<String, usize>,
}

impl ScpiRequest {
    pub fn new() -> ScpiRequest {
        ScpiRequest::default()
    }

    /// Adds a field to query. Fields are queried once, in the order first added.
    pub fn add_query(&mut self, field: impl Into<String>) {
        self.queries.insert(field.into(), ());
    }

    /// Appends a set operation.
    pub fn add_setop(&mut self, field: impl Into<String>, args: Vec<String>) {
        let field = field.into();
        self.setop_index
            .entry(field.clone())
            .or_insert(self.setops.len());
        self.setops.push((field, args));
    }

    /// Overwrites the arguments of the existing set operation on `field` in place, or appends
    /// a new one when there is none.
    pub fn replace_setop(&mut self, field: impl Into<String>, args: Vec<String>) {
        let field = field.into();
        match self.setop_index.get(&field) {
            Some(&pos) => self.setops[pos].1 = args,
            None => self.add_setop(field, args),
        }
    }

    /// Arguments of the first set operation on `field`.
    pub fn setop_args(&self, field: &str) -> Option<&[String]> {
        self.setop_index
            .get(field)
            .map(|&pos| self.setops[pos].1.as_slice())
    }

    pub fn queries(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }

    pub fn num_queries(&self) -> usize {
        self.queries.len()
    }

    pub fn setops(&self) -> &[Setop<String>] {
        &self.setops
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.setops.is_empty()
    }
}

impl PartialEq for ScpiRequest {
    fn eq(&self, other: &Self) -> bool {
        self.queries == other.queries && self.setops == other.setops
    }
}

/// Raw values of queried fields, in the order the fields were first added.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScpiResponse {
    responses: OrderedMap<String, Bytes>,
}

impl ScpiResponse {
    pub fn new() -> ScpiResponse {
        ScpiResponse::default()
    }

    /// Sets the value of a field, replacing an earlier value without changing its position.
    pub fn add_query_response(&mut self, field: impl Into<String>, value: impl Into<Bytes>) {
        self.responses.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Bytes> {
        self.responses.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.responses.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Reorders the response so that `fields` come first, in the given order.
    /// Fields not listed keep their relative order after them.
    pub fn ordered_by<'a>(self, fields: impl IntoIterator<Item = &'a str>) -> ScpiResponse {
        let mut remaining = self.responses;
        let mut ordered = OrderedMap::new();
        for field in fields {
            if let Some(value) = remaining.get(field) {
                ordered.insert(field.to_string(), value.clone());
            }
        }
        remaining = remaining
            .into_iter()
            .filter(|(field, _)| !ordered.contains_key(field.as_str()))
            .collect();
        ordered.extend(remaining);
        ScpiResponse { responses: ordered }
    }
}
