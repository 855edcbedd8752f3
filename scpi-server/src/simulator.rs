use std::{collections::HashMap, fmt};

use scpi_protocol::{
    AttributeRequest, AttributeResponse, AttributeValue, Error, InterfaceDefinition, Result,
};

use crate::AttributeServer;

/// Invoked for a set operation on an attribute, with the arguments of the operation.
pub type CommandHandler = Box<dyn FnMut(&[AttributeValue]) -> Result<()> + Send>;
/// Invoked to compute the value of a queried attribute.
pub type QueryHandler = Box<dyn FnMut() -> Result<AttributeValue> + Send>;

/// A simulated instrument that stores a value per attribute.
///
/// Set operations store their first argument, unless a command handler is registered for the
/// attribute. Queries return the stored value, unless a query handler is registered.
///
/// ```
/// use scpi_protocol::{AttributeRequest, AttributeValue};
/// use scpi_server::{AttributeServer, simulator::Simulator};
///
/// let mut simulator = Simulator::new();
/// simulator.set_value("juiciness", 98.7);
/// simulator.register_query("name", || Ok(AttributeValue::from("orange")));
///
/// let mut request = AttributeRequest::new();
/// request.set_queries(["name", "juiciness"]);
/// let response = simulator.receive_send(&request).unwrap();
/// assert_eq!(response.get("name"), Some(&AttributeValue::from("orange")));
/// assert_eq!(response.get("juiciness"), Some(&AttributeValue::Float(98.7)));
/// ```
#[derive(Default)]
pub struct Simulator {
    values: HashMap<String, AttributeValue>,
    commands: HashMap<String, CommandHandler>,
    queries: HashMap<String, QueryHandler>,
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("values", &self.values)
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("queries", &self.queries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Simulator {
    pub fn new() -> Simulator {
        Simulator::default()
    }

    /// Creates a simulator holding the initial `value` of every binding in the definition.
    pub fn from_definition(definition: &InterfaceDefinition) -> Simulator {
        let mut simulator = Simulator::new();
        for (name, attribute) in definition.attributes.iter() {
            let value = attribute
                .read()
                .and_then(|binding| binding.value())
                .or_else(|| attribute.write().and_then(|binding| binding.value()));
            if let Some(value) = value {
                simulator.set_value(name.as_str(), value.clone());
            }
        }
        simulator
    }

    pub fn set_value(&mut self, attribute: impl Into<String>, value: impl Into<AttributeValue>) {
        self.values.insert(attribute.into(), value.into());
    }

    pub fn value(&self, attribute: &str) -> Option<&AttributeValue> {
        self.values.get(attribute)
    }

    pub fn register_command(
        &mut self,
        attribute: impl Into<String>,
        handler: impl FnMut(&[AttributeValue]) -> Result<()> + Send + 'static,
    ) {
        self.commands.insert(attribute.into(), Box::new(handler));
    }

    pub fn register_query(
        &mut self,
        attribute: impl Into<String>,
        handler: impl FnMut() -> Result<AttributeValue> + Send + 'static,
    ) {
        self.queries.insert(attribute.into(), Box::new(handler));
    }
}

impl AttributeServer for Simulator {
    fn receive_send(&mut self, request: &AttributeRequest) -> Result<AttributeResponse> {
        for (attribute, args) in request.setops() {
            if let Some(handler) = self.commands.get_mut(attribute) {
                log::debug!("Invoking command {} with {} argument(s)", attribute, args.len());
                handler(args)?;
            } else if let Some(value) = args.first() {
                log::debug!("Setting {} to {}", attribute, value);
                self.values.insert(attribute.clone(), value.clone());
            } else {
                return Err(Error::Handler(format!(
                    "{} has neither arguments nor a command handler",
                    attribute
                )));
            }
        }

        let mut response = AttributeResponse::new();
        for attribute in request.queries() {
            let value = match self.queries.get_mut(attribute) {
                Some(handler) => handler()?,
                None => self
                    .values
                    .get(attribute)
                    .cloned()
                    .ok_or_else(|| Error::Handler(format!("{} has no value", attribute)))?,
            };
            response.add_query_response(attribute, value);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[test]
    fn seeded_from_definition() {
        let definition = InterfaceDefinition::from_yaml_str(
            r#"
attributes:
  name:
    read: {field: NAME, field_type: str, value: orange}
  juiciness:
    read_write: {field: JUIC, field_type: float, value: 98.7}
  boiled:
    read: {field: PROCESS, field_type: packet_item, packet_item: 0}
    write: {field: BOIL, field_type: float, value: 0.5}
"#,
        )
        .unwrap();
        let simulator = Simulator::from_definition(&definition);
        assert_eq!(
            simulator.value("name"),
            Some(&AttributeValue::from("orange"))
        );
        assert_eq!(
            simulator.value("juiciness"),
            Some(&AttributeValue::Float(98.7))
        );
        assert_eq!(simulator.value("boiled"), Some(&AttributeValue::Float(0.5)));
    }

    #[test]
    fn setops_are_applied_before_queries() {
        let mut simulator = Simulator::new();
        simulator.set_value("peeled", false);
        let mut request = AttributeRequest::new();
        request.add_setop("peeled", [true]);
        request.set_queries(["peeled"]);
        let response = simulator.receive_send(&request).unwrap();
        assert_eq!(response.get("peeled"), Some(&AttributeValue::Bool(true)));
    }

    #[test]
    fn command_handler() {
        let resets = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&resets);
        let mut simulator = Simulator::new();
        simulator.register_command("reset", move |args| {
            assert!(args.is_empty());
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let mut request = AttributeRequest::new();
        request.add_command("reset");
        request.add_command("reset");
        simulator.receive_send(&request).unwrap();
        assert_eq!(resets.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn command_without_handler() {
        let mut request = AttributeRequest::new();
        request.add_command("reset");
        assert!(matches!(
            Simulator::new().receive_send(&request),
            Err(Error::Handler(_))
        ));
    }

    #[test]
    fn query_without_value() {
        let mut request = AttributeRequest::new();
        request.add_query("name");
        assert!(matches!(
            Simulator::new().receive_send(&request),
            Err(Error::Handler(_))
        ));
    }

    #[test]
    fn query_handler_errors_propagate() {
        let mut simulator = Simulator::new();
        simulator.register_query("temperature", || Err(Error::Handler("sensor offline".into())));
        let mut request = AttributeRequest::new();
        request.add_query("temperature");
        assert!(simulator.receive_send(&request).is_err());
    }
}
