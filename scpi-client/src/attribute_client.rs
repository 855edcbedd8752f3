use std::{net::ToSocketAddrs, str};

use bytes::Bytes;
use scpi_protocol::{
    AttributeDefinition, AttributeDefinitions, AttributeRequest, AttributeResponse, AttributeValue,
    Error, FieldEntry, FieldMap, FieldType, InterfaceDefinition, Result, ScpiRequest, ScpiResponse,
    block::decode_block,
};

use crate::{
    scpi_client::ScpiClient,
    transport::{TcpTransport, Transport},
};

/// Reads and writes instrument attributes by name.
///
/// Attribute requests are translated into SCPI requests using the attribute definitions, sent
/// with a [`ScpiClient`], and the SCPI response is translated back into attribute values.
#[derive(Debug)]
pub struct AttributeClient<T> {
    scpi_client: ScpiClient<T>,
    attributes: AttributeDefinitions,
    fields: FieldMap,
}

impl AttributeClient<TcpTransport> {
    /// Connects to the instrument at `addr` using the timeout and sentinel of `definition`.
    pub fn connect(
        addr: impl ToSocketAddrs,
        definition: &InterfaceDefinition,
    ) -> Result<AttributeClient<TcpTransport>> {
        let transport = TcpTransport::connect(
            addr,
            definition.timeout,
            definition.sentinel_string.as_bytes(),
        )?;
        AttributeClient::from_definition(transport, definition)
    }
}

impl<T: Transport> AttributeClient<T> {
    pub fn new(
        scpi_client: ScpiClient<T>,
        attributes: AttributeDefinitions,
    ) -> Result<AttributeClient<T>> {
        let fields = FieldMap::from_definitions(&attributes)?;
        Ok(AttributeClient {
            scpi_client,
            attributes,
            fields,
        })
    }

    pub fn from_definition(
        transport: T,
        definition: &InterfaceDefinition,
    ) -> Result<AttributeClient<T>> {
        AttributeClient::new(
            ScpiClient::from_definition(transport, definition),
            definition.attributes.clone(),
        )
    }

    pub fn scpi_client(&mut self) -> &mut ScpiClient<T> {
        &mut self.scpi_client
    }

    /// Applies the set operations of `request`, then returns the values of its queries.
    ///
    /// Any failure aborts the whole request; no partial response is returned.
    pub fn send_receive(&mut self, request: &AttributeRequest) -> Result<AttributeResponse> {
        let scpi_request = self.marshal_request(request)?;
        let scpi_response = self.scpi_client.send_receive(&scpi_request)?;
        self.unmarshal_response(&scpi_response)
    }

    /// Translates an attribute request into a SCPI request.
    ///
    /// Boolean writes to bits of one flag field are combined into a single write of the field.
    pub fn marshal_request(&self, request: &AttributeRequest) -> Result<ScpiRequest> {
        let mut scpi_request = ScpiRequest::new();
        for attribute in request.queries() {
            let binding = self
                .definition(attribute)?
                .read()
                .ok_or_else(|| Error::NotReadable(attribute.to_string()))?;
            scpi_request.add_query(binding.field());
        }

        for (attribute, args) in request.setops() {
            let binding = self
                .definition(attribute)?
                .write()
                .ok_or_else(|| Error::NotWritable(attribute.clone()))?;
            let field = binding.field();
            match binding.field_type() {
                Some(FieldType::Bit(bit)) => {
                    let set = args
                        .first()
                        .ok_or_else(|| Error::MissingArgument(attribute.clone()))?
                        .is_truthy();
                    let flags = scpi_request
                        .setop_args(field)
                        .and_then(|args| args.first())
                        .and_then(|value| value.parse::<u128>().ok())
                        .unwrap_or(0);
                    let mask = 1u128 << bit;
                    let flags = if set { flags | mask } else { flags & !mask };
                    scpi_request.replace_setop(field, vec![flags.to_string()]);
                }
                Some(FieldType::Bool) => scpi_request.add_setop(
                    field,
                    args.iter()
                        .map(|arg| (if arg.is_truthy() { "1" } else { "0" }).to_string())
                        .collect(),
                ),
                _ => scpi_request.add_setop(field, args.iter().map(ToString::to_string).collect()),
            }
        }
        Ok(scpi_request)
    }

    /// Translates the field values of a SCPI response into attribute values.
    pub fn unmarshal_response(&self, response: &ScpiResponse) -> Result<AttributeResponse> {
        let mut attribute_response = AttributeResponse::new();
        for (field, value) in response.iter() {
            let entry = self
                .fields
                .read_or_write(field)
                .ok_or_else(|| Error::UnknownField(field.to_string()))?;
            unmarshal_field(field, value, entry, &mut attribute_response)?;
        }
        Ok(attribute_response)
    }

    fn definition(&self, attribute: &str) -> Result<&AttributeDefinition> {
        self.attributes
            .get(attribute)
            .ok_or_else(|| Error::UnknownAttribute(attribute.to_string()))
    }
}

fn unmarshal_field(
    field: &str,
    value: &Bytes,
    entry: &FieldEntry,
    response: &mut AttributeResponse,
) -> Result<()> {
    let invalid = |expected: &str| Error::InvalidValue {
        field: field.to_string(),
        value: String::from_utf8_lossy(value).to_string(),
        expected: expected.to_string(),
    };
    match entry {
        FieldEntry::Block {
            attribute,
            data_type,
        } => {
            response.add_query_response(
                attribute.as_str(),
                decode_block(field, value, *data_type)?,
            );
        }
        FieldEntry::Bits(bits) => {
            let flags: u128 = text(value)?.parse().map_err(|_| invalid("bit"))?;
            for (bit, attribute) in bits {
                response.add_query_response(attribute.as_str(), flags >> bit & 1 == 1);
            }
        }
        FieldEntry::PacketItems(items) => {
            let packet: Vec<&str> = text(value)?.split_whitespace().collect();
            for (&item, attribute) in items {
                let number: f64 = packet
                    .get(item)
                    .and_then(|token| token.parse().ok())
                    .ok_or_else(|| invalid("packet_item"))?;
                response.add_query_response(attribute.as_str(), number);
            }
        }
        FieldEntry::Scalar {
            attribute,
            field_type,
        } => {
            let text = text(value)?;
            let value = match field_type {
                FieldType::Bool => AttributeValue::Bool(text == "1"),
                FieldType::Int => AttributeValue::Int(text.parse().map_err(|_| invalid("int"))?),
                FieldType::Float => {
                    AttributeValue::Float(text.parse().map_err(|_| invalid("float"))?)
                }
                _ => AttributeValue::Str(text.to_string()),
            };
            response.add_query_response(attribute.as_str(), value);
        }
        FieldEntry::Command { attribute } => {
            response.add_query_response(attribute.as_str(), text(value)?);
        }
    }
    Ok(())
}

fn text(value: &[u8]) -> Result<&str> {
    Ok(str::from_utf8(value)?.trim())
}
