//! Interface definitions: how device-independent attributes map onto SCPI fields.
//!
//! Definitions are usually loaded from YAML:
//!
//! ```
//! use scpi_protocol::definition::{FieldType, InterfaceDefinition};
//!
//! let definition = InterfaceDefinition::from_yaml_str(
//!     r#"
//! model: fruit
//! attributes:
//!   juiciness:
//!     read_write: {field: JUIC, field_type: float}
//!   chilled:
//!     read_write: {field: FLAGS, field_type: bit, bit: 7}
//! "#,
//! )
//! .unwrap();
//!
//! let chilled = definition.attribute("chilled").unwrap();
//! assert_eq!(chilled.read().unwrap().field_type(), Some(FieldType::Bit(7)));
//! assert_eq!(chilled.read(), chilled.write());
//! ```
use std::{fmt::Display, fs::File, io::Read, path::Path, time::Duration};

use serde::Deserialize;

use crate::{
    attribute::AttributeValue,
    block::{BlockData, BlockDataType},
    error::{Error, Result},
    ordered::OrderedMap,
};

/// Attribute definitions keyed by attribute name, in definition order.
pub type AttributeDefinitions = OrderedMap<String, AttributeDefinition>;

/// How the value of a SCPI field is interpreted.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    Str,
    /// A boolean stored as one bit of an integer flag field.
    Bit(u32),
    /// One float in a space separated list of values.
    PacketItem(usize),
    /// An IEEE 488.2 arbitrary block of the given element type.
    ArbitraryBlock(BlockDataType),
}

impl FieldType {
    /// Highest bit index that fits the flag fields handled by this crate.
    pub const MAX_BIT: u32 = 127;

    /// The name used for this type in interface definitions.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Str => "str",
            FieldType::Bit(_) => "bit",
            FieldType::PacketItem(_) => "packet_item",
            FieldType::ArbitraryBlock(_) => "arbitrary_block",
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Binds one direction (read or write) of an attribute to a SCPI field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldBinding {
    field: String,
    field_type: Option<FieldType>,
    value: Option<AttributeValue>,
}

impl FieldBinding {
    /// A binding to a typed field.
    pub fn new(field: impl Into<String>, field_type: FieldType) -> FieldBinding {
        FieldBinding {
            field: field.into(),
            field_type: Some(field_type),
            value: None,
        }
    }

    /// A binding to an untyped field, i.e. a command.
    pub fn command(field: impl Into<String>) -> FieldBinding {
        FieldBinding {
            field: field.into(),
            field_type: None,
            value: None,
        }
    }

    /// Sets the initial value a simulator should report for the attribute.
    pub fn with_value(mut self, value: impl Into<AttributeValue>) -> FieldBinding {
        self.value = Some(value.into());
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// The field type, or `None` for commands.
    pub fn field_type(&self) -> Option<FieldType> {
        self.field_type
    }

    pub fn value(&self) -> Option<&AttributeValue> {
        self.value.as_ref()
    }
}

/// The read and write bindings of a single attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeDefinition {
    read: Option<FieldBinding>,
    write: Option<FieldBinding>,
}

impl AttributeDefinition {
    pub fn new(read: Option<FieldBinding>, write: Option<FieldBinding>) -> AttributeDefinition {
        AttributeDefinition { read, write }
    }

    pub fn read_only(binding: FieldBinding) -> AttributeDefinition {
        AttributeDefinition::new(Some(binding), None)
    }

    pub fn write_only(binding: FieldBinding) -> AttributeDefinition {
        AttributeDefinition::new(None, Some(binding))
    }

    /// Uses the same binding for both directions.
    pub fn read_write(binding: FieldBinding) -> AttributeDefinition {
        AttributeDefinition::new(Some(binding.clone()), Some(binding))
    }

    pub fn read(&self) -> Option<&FieldBinding> {
        self.read.as_ref()
    }

    pub fn write(&self) -> Option<&FieldBinding> {
        self.write.as_ref()
    }

    /// The read binding if there is one, the write binding otherwise.
    pub fn primary(&self) -> Option<&FieldBinding> {
        self.read.as_ref().or(self.write.as_ref())
    }
}

/// Everything needed to talk to one instrument model.
#[derive(Clone, Debug)]
pub struct InterfaceDefinition {
    pub model: String,
    /// Whether several commands may be sent in one unit, separated by `;`.
    pub supports_chains: bool,
    /// Transport read/write timeout.
    pub timeout: Duration,
    /// How often a timed out query is retried before giving up.
    pub timeout_retries: u32,
    pub sentinel_string: String,
    pub argument_separator: String,
    /// Whether the instrument acknowledges set operations with a response unit.
    pub return_response: bool,
    pub attributes: AttributeDefinitions,
}

impl Default for InterfaceDefinition {
    fn default() -> Self {
        Self {
            model: String::new(),
            supports_chains: true,
            timeout: Duration::from_secs(3),
            timeout_retries: 2,
            sentinel_string: "\r\n".to_string(),
            argument_separator: " ".to_string(),
            return_response: false,
            attributes: AttributeDefinitions::new(),
        }
    }
}

impl InterfaceDefinition {
    pub fn from_yaml_str(yaml: &str) -> Result<InterfaceDefinition> {
        serde_yaml::from_str::<RawInterfaceDefinition>(yaml)?.try_into()
    }

    pub fn from_yaml_reader(reader: impl Read) -> Result<InterfaceDefinition> {
        serde_yaml::from_reader::<_, RawInterfaceDefinition>(reader)?.try_into()
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<InterfaceDefinition> {
        InterfaceDefinition::from_yaml_reader(File::open(path)?)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.get(name)
    }

    /// Adds (or replaces) the definition of an attribute.
    pub fn add_attribute(&mut self, name: impl Into<String>, definition: AttributeDefinition) {
        self.attributes.insert(name.into(), definition);
    }
}

#[derive(Deserialize)]
struct RawInterfaceDefinition {
    #[serde(default)]
    model: String,
    supports_chains: Option<bool>,
    timeout: Option<f64>,
    timeout_retries: Option<u32>,
    sentinel_string: Option<String>,
    argument_separator: Option<String>,
    return_response: Option<bool>,
    attributes: OrderedMap<String, RawAttributeDefinition>,
}

#[derive(Deserialize)]
struct RawAttributeDefinition {
    read: Option<RawBinding>,
    write: Option<RawBinding>,
    read_write: Option<RawBinding>,
}

// Range metadata (min_value, max_value, ...) is accepted and ignored.
#[derive(Deserialize)]
struct RawBinding {
    field: String,
    field_type: Option<String>,
    bit: Option<u32>,
    packet_item: Option<usize>,
    block_data_type: Option<String>,
    value: Option<serde_yaml::Value>,
}

impl TryFrom<RawInterfaceDefinition> for InterfaceDefinition {
    type Error = Error;

    fn try_from(raw: RawInterfaceDefinition) -> Result<InterfaceDefinition> {
        let defaults = InterfaceDefinition::default();
        let timeout = match raw.timeout {
            Some(seconds) => Duration::try_from_secs_f64(seconds).map_err(|_| {
                Error::Definition(format!("Invalid timeout of {} seconds", seconds))
            })?,
            None => defaults.timeout,
        };
        let mut attributes = AttributeDefinitions::new();
        for (name, definition) in raw.attributes {
            let definition = definition.into_definition(&name)?;
            attributes.insert(name, definition);
        }
        Ok(InterfaceDefinition {
            model: raw.model,
            supports_chains: raw.supports_chains.unwrap_or(defaults.supports_chains),
            timeout,
            timeout_retries: raw.timeout_retries.unwrap_or(defaults.timeout_retries),
            sentinel_string: raw.sentinel_string.unwrap_or(defaults.sentinel_string),
            argument_separator: raw
                .argument_separator
                .unwrap_or(defaults.argument_separator),
            return_response: raw.return_response.unwrap_or(defaults.return_response),
            attributes,
        })
    }
}

impl RawAttributeDefinition {
    fn into_definition(self, attribute: &str) -> Result<AttributeDefinition> {
        match (self.read_write, self.read, self.write) {
            (Some(binding), None, None) => {
                Ok(AttributeDefinition::read_write(binding.into_binding()?))
            }
            (Some(_), _, _) => Err(Error::Definition(format!(
                "Attribute {} declares read_write together with read or write",
                attribute
            ))),
            (None, None, None) => Err(Error::Definition(format!(
                "Attribute {} declares neither read nor write",
                attribute
            ))),
            (None, read, write) => Ok(AttributeDefinition::new(
                read.map(RawBinding::into_binding).transpose()?,
                write.map(RawBinding::into_binding).transpose()?,
            )),
        }
    }
}

impl RawBinding {
    fn into_binding(self) -> Result<FieldBinding> {
        let field_type = match self.field_type.as_deref() {
            None => None,
            Some("bool") => Some(FieldType::Bool),
            Some("int") => Some(FieldType::Int),
            Some("float") => Some(FieldType::Float),
            Some("str") => Some(FieldType::Str),
            Some("bit") => Some(FieldType::Bit(self.bit.ok_or_else(|| {
                Error::Definition(format!("Bit field {} has no bit index", self.field))
            })?)),
            Some("packet_item") => Some(FieldType::PacketItem(self.packet_item.ok_or_else(
                || Error::Definition(format!("Packet field {} has no item index", self.field)),
            )?)),
            Some("arbitrary_block") => {
                let data_type = self.block_data_type.as_deref().ok_or_else(|| {
                    Error::Definition(format!(
                        "Arbitrary block field {} has no block_data_type",
                        self.field
                    ))
                })?;
                Some(FieldType::ArbitraryBlock(data_type.parse()?))
            }
            Some(other) => {
                return Err(Error::UnknownFieldType {
                    field: self.field,
                    field_type: other.to_string(),
                });
            }
        };
        let value = self
            .value
            .map(|value| value_from_yaml(&self.field, &value, field_type))
            .transpose()?;
        Ok(FieldBinding {
            field: self.field,
            field_type,
            value,
        })
    }
}

fn value_from_yaml(
    field: &str,
    value: &serde_yaml::Value,
    field_type: Option<FieldType>,
) -> Result<AttributeValue> {
    use serde_yaml::Value;

    let invalid = || Error::InvalidValue {
        field: field.to_string(),
        value: format!("{:?}", value),
        expected: field_type.map_or("command", |t| t.name()).to_string(),
    };
    match (value, field_type) {
        (Value::Bool(b), _) => Ok(AttributeValue::Bool(*b)),
        (Value::Number(n), Some(FieldType::Float | FieldType::PacketItem(_))) => {
            n.as_f64().map(AttributeValue::Float).ok_or_else(invalid)
        }
        (Value::Number(n), Some(FieldType::Bool | FieldType::Bit(_))) => {
            Ok(AttributeValue::Bool(n.as_f64() != Some(0.0)))
        }
        (Value::Number(n), _) => match n.as_i64() {
            Some(i) => Ok(AttributeValue::Int(i)),
            None => n.as_f64().map(AttributeValue::Float).ok_or_else(invalid),
        },
        (Value::String(s), _) => AttributeValue::parse(s, field_type).ok_or_else(invalid),
        (Value::Sequence(items), Some(FieldType::ArbitraryBlock(data_type))) => {
            let numbers = items
                .iter()
                .map(Value::as_f64)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(invalid)?;
            Ok(AttributeValue::Block(BlockData::from_f64s(data_type, &numbers)))
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const FRUIT: &str = r#"
model: fruit
poll_rate: 0.1
timeout: 0.5
supports_chains: true
attributes:
  name:
    read: {field: NAME, field_type: str, value: orange}
  juiciness:
    read_write: {field: JUIC, field_type: float, min_value: 0.0, max_value: 100.0}
  overripe:
    read_write: {field: FLAGS, field_type: bit, bit: 0}
  boiled:
    read: {field: PROCESS, field_type: packet_item, packet_item: 0}
    write: {field: BOIL, field_type: float}
  trace:
    read: {field: TRAC, field_type: arbitrary_block, block_data_type: int16, value: [1, 2, 3]}
  reset:
    write: {field: "*RST"}
sentinel_string: "\n"
"#;

    #[test]
    fn load_fruit() {
        let definition = InterfaceDefinition::from_yaml_str(FRUIT).unwrap();
        assert_eq!(definition.model, "fruit");
        assert_eq!(definition.timeout, Duration::from_millis(500));
        assert_eq!(definition.sentinel_string, "\n");
        assert_eq!(definition.argument_separator, " ");
        assert_eq!(definition.timeout_retries, 2);
        assert!(!definition.return_response);

        let names: Vec<_> = definition.attributes.keys().cloned().collect();
        assert_eq!(
            names,
            vec!["name", "juiciness", "overripe", "boiled", "trace", "reset"]
        );

        let name = definition.attribute("name").unwrap();
        assert!(name.write().is_none());
        assert_eq!(
            name.read().unwrap().value(),
            Some(&AttributeValue::Str("orange".to_string()))
        );

        let overripe = definition.attribute("overripe").unwrap();
        assert_eq!(overripe.read(), overripe.write());
        assert_eq!(
            overripe.read().unwrap().field_type(),
            Some(FieldType::Bit(0))
        );

        let boiled = definition.attribute("boiled").unwrap();
        assert_eq!(boiled.read().unwrap().field(), "PROCESS");
        assert_eq!(boiled.write().unwrap().field(), "BOIL");

        let trace = definition.attribute("trace").unwrap().read().unwrap();
        assert_eq!(
            trace.field_type(),
            Some(FieldType::ArbitraryBlock(BlockDataType::Int16))
        );
        assert_eq!(
            trace.value(),
            Some(&AttributeValue::Block(BlockData::Int16(vec![1, 2, 3])))
        );

        let reset = definition.attribute("reset").unwrap().write().unwrap();
        assert_eq!(reset.field_type(), None);
    }

    #[test]
    fn unknown_field_type_names_field_and_type() {
        let yaml = "attributes:\n  level:\n    read: {field: LEV, field_type: complex}\n";
        match InterfaceDefinition::from_yaml_str(yaml) {
            Err(Error::UnknownFieldType { field, field_type }) => {
                assert_eq!(field, "LEV");
                assert_eq!(field_type, "complex");
            }
            other => panic!("expected UnknownFieldType, got {:?}", other),
        }
    }

    #[test]
    fn bit_without_index() {
        let yaml = "attributes:\n  flag:\n    read: {field: FLG, field_type: bit}\n";
        assert!(matches!(
            InterfaceDefinition::from_yaml_str(yaml),
            Err(Error::Definition(_))
        ));
    }

    #[test]
    fn conflicting_bindings() {
        let yaml = r#"
attributes:
  x:
    read_write: {field: X, field_type: int}
    read: {field: Y, field_type: int}
"#;
        assert!(matches!(
            InterfaceDefinition::from_yaml_str(yaml),
            Err(Error::Definition(_))
        ));
    }

    #[test]
    fn negative_timeout() {
        let yaml = "timeout: -1.0\nattributes: {}\n";
        assert!(matches!(
            InterfaceDefinition::from_yaml_str(yaml),
            Err(Error::Definition(_))
        ));
    }
}
