use std::collections::BTreeMap;

use bytes::Bytes;
use scpi_protocol::{
    AttributeDefinitions, AttributeRequest, AttributeResponse, AttributeValue, Error, FieldEntry,
    FieldMap, FieldType, InterfaceDefinition, Result, ScpiCodec, ScpiRequest, ScpiResponse,
    block::encode_block,
};

use crate::AttributeServer;

/// Serves SCPI requests by translating them into attribute requests for an [`AttributeServer`].
///
/// Fields that are not part of the interface definition are skipped with a warning.
#[derive(Debug)]
pub struct ScpiServer<S> {
    attribute_server: S,
    attributes: AttributeDefinitions,
    fields: FieldMap,
}

impl<S: AttributeServer> ScpiServer<S> {
    pub fn new(attribute_server: S, attributes: AttributeDefinitions) -> Result<ScpiServer<S>> {
        let fields = FieldMap::from_definitions(&attributes)?;
        Ok(ScpiServer {
            attribute_server,
            attributes,
            fields,
        })
    }

    pub fn attribute_server(&mut self) -> &mut S {
        &mut self.attribute_server
    }

    pub fn receive_send(&mut self, request: &ScpiRequest) -> Result<ScpiResponse> {
        let attribute_request = self.unmarshal_request(request)?;
        log::debug!("Attribute request: {:?}", attribute_request);
        let attribute_response = self.attribute_server.receive_send(&attribute_request)?;
        let response = self.marshal_response(&attribute_response)?;
        Ok(response.ordered_by(request.queries()))
    }

    /// Translates a SCPI request into the attribute request it stands for.
    ///
    /// A query of a flag (or packet) field queries every attribute stored in it, and a write of a
    /// flag field writes every bit registered for it.
    pub fn unmarshal_request(&self, request: &ScpiRequest) -> Result<AttributeRequest> {
        let mut attribute_request = AttributeRequest::new();
        for field in request.queries() {
            match self.fields.read(field) {
                Some(entry) => {
                    for attribute in entry.attributes() {
                        attribute_request.add_query(attribute);
                    }
                }
                None => log::warn!("Skipping query of unknown field {}", field),
            }
        }

        for (field, args) in request.setops() {
            let Some(entry) = self.fields.write(field) else {
                log::warn!("Skipping write of unknown field {}", field);
                continue;
            };
            let invalid = |arg: &str, expected: &str| Error::InvalidValue {
                field: field.clone(),
                value: arg.to_string(),
                expected: expected.to_string(),
            };
            match entry {
                FieldEntry::Bits(bits) => {
                    let arg = args
                        .first()
                        .ok_or_else(|| Error::MissingArgument(field.clone()))?;
                    let flags: u128 = arg.parse().map_err(|_| invalid(arg, "bit"))?;
                    for (bit, attribute) in bits {
                        attribute_request.add_setop(attribute.as_str(), [flags >> bit & 1 == 1]);
                    }
                }
                FieldEntry::Command { attribute } => {
                    attribute_request
                        .add_setop(attribute.as_str(), args.iter().map(String::as_str));
                }
                FieldEntry::Scalar {
                    attribute,
                    field_type,
                } => {
                    let values = args
                        .iter()
                        .map(|arg| match field_type {
                            FieldType::Bool => Ok(AttributeValue::Bool(arg == "1")),
                            FieldType::Int => arg
                                .parse()
                                .map(AttributeValue::Int)
                                .map_err(|_| invalid(arg, "int")),
                            FieldType::Float => arg
                                .parse()
                                .map(AttributeValue::Float)
                                .map_err(|_| invalid(arg, "float")),
                            _ => Ok(AttributeValue::Str(arg.clone())),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    attribute_request.add_setop(attribute.as_str(), values);
                }
                FieldEntry::PacketItems(items) => {
                    return Err(Error::UnsupportedFieldType {
                        field: field.clone(),
                        field_type: FieldType::PacketItem(
                            items.keys().next().copied().unwrap_or_default(),
                        ),
                    });
                }
                FieldEntry::Block { data_type, .. } => {
                    return Err(Error::UnsupportedFieldType {
                        field: field.clone(),
                        field_type: FieldType::ArbitraryBlock(*data_type),
                    });
                }
            }
        }
        Ok(attribute_request)
    }

    /// Translates attribute values into the field values that carry them.
    pub fn marshal_response(&self, response: &AttributeResponse) -> Result<ScpiResponse> {
        let mut scpi_response = ScpiResponse::new();
        let mut packets: BTreeMap<&str, BTreeMap<usize, String>> = BTreeMap::new();
        for (attribute, value) in response.iter() {
            let binding = self
                .attributes
                .get(attribute)
                .ok_or_else(|| Error::UnknownAttribute(attribute.to_string()))?
                .primary()
                .ok_or_else(|| Error::NotReadable(attribute.to_string()))?;
            let field = binding.field();
            let rendered: Bytes = match binding.field_type() {
                Some(FieldType::Bit(bit)) => {
                    let mut flags = scpi_response
                        .get(field)
                        .and_then(|flags| str::from_utf8(flags).ok())
                        .and_then(|flags| flags.parse::<u128>().ok())
                        .unwrap_or(0);
                    if value.is_truthy() {
                        flags |= 1u128 << bit;
                    }
                    flags.to_string().into()
                }
                Some(FieldType::Bool) => {
                    Bytes::from_static(if value.is_truthy() { b"1" } else { b"0" })
                }
                Some(FieldType::PacketItem(item)) => {
                    packets
                        .entry(field)
                        .or_default()
                        .insert(item, value.to_string());
                    continue;
                }
                Some(FieldType::ArbitraryBlock(data_type)) => match value.as_block() {
                    Some(block) if block.data_type() == data_type => encode_block(block)?.into(),
                    _ => {
                        return Err(Error::InvalidValue {
                            field: field.to_string(),
                            value: value.to_string(),
                            expected: format!("arbitrary_block of {}", data_type),
                        });
                    }
                },
                _ => value.to_string().into(),
            };
            scpi_response.add_query_response(field, rendered);
        }
        for (field, items) in packets {
            let packet = items.into_values().collect::<Vec<_>>().join(" ");
            scpi_response.add_query_response(field, packet);
        }
        Ok(scpi_response)
    }
}

/// Serves whole units: parses them, answers them with a [`ScpiServer`] and renders the reply.
#[derive(Debug)]
pub struct ScpiBytesServer<S> {
    scpi_server: ScpiServer<S>,
    codec: ScpiCodec,
    return_response: bool,
}

impl<S: AttributeServer> ScpiBytesServer<S> {
    /// # Arguments
    ///
    /// * `argument_separator` - Text between a field and its arguments
    /// * `return_response` - Acknowledge units without queries with an empty unit
    pub fn new(
        scpi_server: ScpiServer<S>,
        argument_separator: impl Into<String>,
        return_response: bool,
    ) -> ScpiBytesServer<S> {
        ScpiBytesServer {
            scpi_server,
            codec: ScpiCodec::new(true, argument_separator),
            return_response,
        }
    }

    pub fn from_definition(
        attribute_server: S,
        definition: &InterfaceDefinition,
    ) -> Result<ScpiBytesServer<S>> {
        Ok(ScpiBytesServer::new(
            ScpiServer::new(attribute_server, definition.attributes.clone())?,
            definition.argument_separator.as_str(),
            definition.return_response,
        ))
    }

    pub fn scpi_server(&mut self) -> &mut ScpiServer<S> {
        &mut self.scpi_server
    }

    /// Handles one received unit. Returns the reply unit, if one should be sent.
    pub fn receive_send(&mut self, unit: &[u8]) -> Result<Option<Bytes>> {
        let request = self.codec.unmarshal_request(unit)?;
        let response = self.scpi_server.receive_send(&request)?;
        if request.num_queries() > 0 {
            Ok(Some(self.codec.marshal_response(&response)))
        } else if self.return_response {
            Ok(Some(Bytes::new()))
        } else {
            Ok(None)
        }
    }
}
