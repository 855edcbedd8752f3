//! The inverse view of a set of attribute definitions: what each SCPI field means.
use std::collections::BTreeMap;

use crate::{
    block::BlockDataType,
    definition::{AttributeDefinitions, FieldBinding, FieldType},
    error::{Error, Result},
    ordered::OrderedMap,
};

/// The meaning of a field for one access direction.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldEntry {
    /// An untyped field, i.e. a command.
    Command { attribute: String },
    /// A field holding a single `bool`, `int`, `float` or `str` value.
    Scalar {
        attribute: String,
        field_type: FieldType,
    },
    /// A field holding an arbitrary block.
    Block {
        attribute: String,
        data_type: BlockDataType,
    },
    /// An integer flag field, each bit of which is a boolean attribute.
    Bits(BTreeMap<u32, String>),
    /// A whitespace separated list of floats, each of which is an attribute.
    PacketItems(BTreeMap<usize, String>),
}

impl FieldEntry {
    /// The attributes carried by this field, in bit or item order for group entries.
    pub fn attributes(&self) -> Vec<&str> {
        match self {
            FieldEntry::Command { attribute }
            | FieldEntry::Scalar { attribute, .. }
            | FieldEntry::Block { attribute, .. } => vec![attribute.as_str()],
            FieldEntry::Bits(bits) => bits.values().map(String::as_str).collect(),
            FieldEntry::PacketItems(items) => items.values().map(String::as_str).collect(),
        }
    }
}

/// Read and write meaning of a field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldAccess {
    pub read: Option<FieldEntry>,
    pub write: Option<FieldEntry>,
}

/// Maps every SCPI field referenced by an interface definition to the attributes it carries.
///
/// Several `bit` (or `packet_item`) bindings on one field are aggregated into a single
/// [`FieldEntry::Bits`] (or [`FieldEntry::PacketItems`]) entry. If a field is bound with
/// different semantics for the same access direction, the binding declared last wins.
#[derive(Clone, Debug, Default)]
pub struct FieldMap {
    fields: OrderedMap<String, FieldAccess>,
}

impl FieldMap {
    pub fn from_definitions(attributes: &AttributeDefinitions) -> Result<FieldMap> {
        let mut fields: OrderedMap<String, FieldAccess> = OrderedMap::new();
        for (attribute, definition) in attributes.iter() {
            if let Some(binding) = definition.read() {
                let access =
                    fields.get_or_insert_with(binding.field().to_string(), FieldAccess::default);
                record(&mut access.read, attribute, binding)?;
            }
            if let Some(binding) = definition.write() {
                let access =
                    fields.get_or_insert_with(binding.field().to_string(), FieldAccess::default);
                record(&mut access.write, attribute, binding)?;
            }
        }
        Ok(FieldMap { fields })
    }

    pub fn get(&self, field: &str) -> Option<&FieldAccess> {
        self.fields.get(field)
    }

    pub fn read(&self, field: &str) -> Option<&FieldEntry> {
        self.get(field).and_then(|access| access.read.as_ref())
    }

    pub fn write(&self, field: &str) -> Option<&FieldEntry> {
        self.get(field).and_then(|access| access.write.as_ref())
    }

    /// The read entry of a field, falling back to its write entry.
    pub fn read_or_write(&self, field: &str) -> Option<&FieldEntry> {
        self.get(field)
            .and_then(|access| access.read.as_ref().or(access.write.as_ref()))
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

fn record(slot: &mut Option<FieldEntry>, attribute: &str, binding: &FieldBinding) -> Result<()> {
    let attribute = attribute.to_string();
    let entry = match binding.field_type() {
        None => FieldEntry::Command { attribute },
        Some(FieldType::Bit(bit)) => {
            if bit > FieldType::MAX_BIT {
                return Err(Error::Definition(format!(
                    "Bit {} of field {} exceeds the maximum bit index {}",
                    bit,
                    binding.field(),
                    FieldType::MAX_BIT
                )));
            }
            if let Some(FieldEntry::Bits(bits)) = slot {
                if let Some(existing) = bits.get(&bit) {
                    return Err(Error::Definition(format!(
                        "Attributes {} and {} both use bit {} of field {}",
                        existing,
                        attribute,
                        bit,
                        binding.field()
                    )));
                }
                bits.insert(bit, attribute);
                return Ok(());
            }
            FieldEntry::Bits(BTreeMap::from([(bit, attribute)]))
        }
        Some(FieldType::PacketItem(item)) => {
            if let Some(FieldEntry::PacketItems(items)) = slot {
                if let Some(existing) = items.get(&item) {
                    return Err(Error::Definition(format!(
                        "Attributes {} and {} both use item {} of field {}",
                        existing,
                        attribute,
                        item,
                        binding.field()
                    )));
                }
                items.insert(item, attribute);
                return Ok(());
            }
            FieldEntry::PacketItems(BTreeMap::from([(item, attribute)]))
        }
        Some(FieldType::ArbitraryBlock(data_type)) => FieldEntry::Block {
            attribute,
            data_type,
        },
        Some(field_type) => FieldEntry::Scalar {
            attribute,
            field_type,
        },
    };
    *slot = Some(entry);
    Ok(())
}
