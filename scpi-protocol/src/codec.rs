//! Conversion between SCPI requests/responses and the text units sent over the wire.
use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    block::{HeaderScan, scan_header},
    error::{Error, Result},
    scpi::{ScpiRequest, ScpiResponse},
};

const COMMAND_SEPARATOR: u8 = b';';
const QUERY_SUFFIX: char = '?';
const QUOTE: u8 = b'"';

/// Renders SCPI requests as units and parses units back.
///
/// ```
/// use scpi_protocol::{ScpiCodec, ScpiRequest};
///
/// let codec = ScpiCodec::new(true, " ");
/// let mut request = ScpiRequest::new();
/// request.add_setop("PEEL", vec!["1".to_string()]);
/// request.add_setop("FLAGS", vec!["128".to_string()]);
/// request.add_query("NAME");
/// request.add_query("JUIC");
///
/// assert_eq!(codec.marshal_setops(&request), vec!["PEEL 1;FLAGS 128"]);
/// assert_eq!(codec.marshal_queries(&request), vec!["NAME?;JUIC?"]);
/// ```
#[derive(Clone, Debug)]
pub struct ScpiCodec {
    chain: bool,
    argument_separator: String,
}

impl Default for ScpiCodec {
    fn default() -> Self {
        ScpiCodec::new(true, " ")
    }
}

impl ScpiCodec {
    pub fn new(chain: bool, argument_separator: impl Into<String>) -> ScpiCodec {
        ScpiCodec {
            chain,
            argument_separator: argument_separator.into(),
        }
    }

    /// One unit per set operation, or a single unit if commands are chained.
    pub fn marshal_setops(&self, request: &ScpiRequest) -> Vec<Bytes> {
        let commands = request.setops().iter().map(|(field, args)| {
            let mut command = field.clone();
            for arg in args {
                command.push_str(&self.argument_separator);
                command.push_str(arg);
            }
            command
        });
        self.join_commands(commands)
    }

    /// One unit per queried field, or a single unit if commands are chained.
    pub fn marshal_queries(&self, request: &ScpiRequest) -> Vec<Bytes> {
        self.join_commands(request.queries().map(|field| format!("{field}{QUERY_SUFFIX}")))
    }

    fn join_commands(&self, commands: impl Iterator<Item = String>) -> Vec<Bytes> {
        if self.chain {
            let joined = commands.collect::<Vec<_>>().join(";");
            if joined.is_empty() {
                Vec::new()
            } else {
                vec![Bytes::from(joined)]
            }
        } else {
            commands.map(Bytes::from).collect()
        }
    }

    /// Zips the values found in the received units onto the queried `fields`.
    ///
    /// A value that is a whole quoted string loses its outer quotes and doubled inner
    /// quotes collapse to one.
    pub fn unmarshal_response(&self, units: &[Bytes], fields: &[String]) -> Result<ScpiResponse> {
        let values: Vec<Bytes> = units
            .iter()
            .flat_map(|unit| {
                split_values(unit)
                    .into_iter()
                    .map(|range| unquote(unit.slice(range)))
            })
            .collect();
        if values.len() != fields.len() {
            return Err(Error::CountMismatch {
                values: values
                    .iter()
                    .map(|value| String::from_utf8_lossy(value).to_string())
                    .collect(),
                fields: fields.to_vec(),
            });
        }
        let mut response = ScpiResponse::new();
        for (field, value) in fields.iter().zip(values) {
            response.add_query_response(field.as_str(), value);
        }
        Ok(response)
    }

    /// Parses a unit received by an instrument (or simulator) into a request.
    pub fn unmarshal_request(&self, unit: &[u8]) -> Result<ScpiRequest> {
        let mut request = ScpiRequest::new();
        for range in split_values(unit) {
            let command = str::from_utf8(&unit[range])?;
            if let Some(field) = command.strip_suffix(QUERY_SUFFIX) {
                request.add_query(field.trim_end());
                continue;
            }
            match command.split_once(self.argument_separator.as_str()) {
                Some((field, args)) => request.add_setop(
                    field,
                    args.split(self.argument_separator.as_str())
                        .filter(|arg| !arg.is_empty())
                        .map(str::to_string)
                        .collect(),
                ),
                None => request.add_setop(command, Vec::new()),
            }
        }
        Ok(request)
    }

    /// Joins the values of a response into one unit.
    ///
    /// Text values containing `;` or `"` are wrapped in double quotes, with inner quotes
    /// doubled, so that they survive tokenization on the other end.
    pub fn marshal_response(&self, response: &ScpiResponse) -> Bytes {
        let mut unit = BytesMut::new();
        for (i, (_, value)) in response.iter().enumerate() {
            if i > 0 {
                unit.put_u8(COMMAND_SEPARATOR);
            }
            if needs_quotes(value) {
                unit.put_u8(QUOTE);
                for &byte in value.iter() {
                    if byte == QUOTE {
                        unit.put_u8(QUOTE);
                    }
                    unit.put_u8(byte);
                }
                unit.put_u8(QUOTE);
            } else {
                unit.put_slice(value);
            }
        }
        unit.freeze()
    }
}

fn needs_quotes(value: &[u8]) -> bool {
    let is_block = matches!(scan_header(value), HeaderScan::Block(_));
    !is_block && value.iter().any(|&b| b == COMMAND_SEPARATOR || b == QUOTE)
}

fn unquote(value: Bytes) -> Bytes {
    let is_block = matches!(scan_header(&value), HeaderScan::Block(_));
    if is_block || value.len() < 2 || value[0] != QUOTE || value[value.len() - 1] != QUOTE {
        return value;
    }
    let inner = &value[1..value.len() - 1];
    let mut unquoted = BytesMut::with_capacity(inner.len());
    let mut bytes = inner.iter().peekable();
    while let Some(&byte) = bytes.next() {
        if byte == QUOTE && bytes.peek() == Some(&&QUOTE) {
            bytes.next();
        }
        unquoted.put_u8(byte);
    }
    unquoted.freeze()
}

/// Splits a unit into the ranges of its `;` separated values.
///
/// Separators inside double quoted text do not split, and neither do bytes inside an
/// arbitrary block that starts a value: the block payload is skipped by its declared length.
/// Values are trimmed of ASCII whitespace (never inside a block payload) and empty values are
/// dropped.
///
/// ```
/// use scpi_protocol::codec::split_values;
///
/// let unit = b" 1;\"a;b\";;#13x;y\r\n";
/// let values: Vec<&[u8]> = split_values(unit).into_iter().map(|r| &unit[r]).collect();
/// assert_eq!(values, vec![&b"1"[..], b"\"a;b\"", b"#13x;y"]);
/// ```
pub fn split_values(unit: &[u8]) -> Vec<Range<usize>> {
    let mut values = Vec::new();
    let mut pos = 0;
    while pos < unit.len() {
        while pos < unit.len() && unit[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let start = pos;
        // Bytes before this position belong to a block payload and are never trimmed.
        let mut protected_end = start;
        if let HeaderScan::Block(header) = scan_header(&unit[start..]) {
            protected_end = (start + header.block_len()).min(unit.len());
            pos = protected_end;
        }
        let mut in_quotes = false;
        while pos < unit.len() {
            match unit[pos] {
                QUOTE => in_quotes = !in_quotes,
                COMMAND_SEPARATOR if !in_quotes => break,
                _ => {}
            }
            pos += 1;
        }
        let mut end = pos;
        while end > protected_end && unit[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        if end > start {
            values.push(start..end);
        }
        pos += 1;
    }
    values
}
