//! # SCPI Instrument Simulator
//!
//! Serves a simulated instrument over TCP. The instrument is described by the same YAML
//! interface definition that clients use, so any client of the real instrument can be pointed
//! at the simulator instead.
//!
//! Attribute values start out as the `value` given in the definition and can be overridden on
//! the command line:
//!
//! ```text
//! scpi-simulator fruit.yaml --port 5025 --set juiciness=98.7 --set peeled=on
//! ```
use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use scpi_protocol::{AttributeValue, InterfaceDefinition};
use scpi_server::{
    server::{Config, Server},
    simulator::Simulator,
};

#[derive(Parser)]
#[command(
    about = "Simulates an SCPI instrument described by an interface definition",
    long_about = None
)]
struct Args {
    #[arg(short, long, default_value = "5025")]
    port: u16,

    #[arg(short, long, default_value = "127.0.0.1")]
    ip: IpAddr,

    #[arg(
        short,
        long,
        help = "Close a connection after this many seconds without a request",
        default_value = "30"
    )]
    timeout_s: u64,

    #[arg(
        short,
        long = "set",
        value_name = "ATTRIBUTE=VALUE",
        help = "Initial value of an attribute; may be repeated"
    )]
    set: Vec<String>,

    /// The YAML interface definition of the simulated instrument
    definition: PathBuf,
}

/// Parses an `attribute=value` assignment using the field type the attribute is bound to.
fn parse_assignment(
    definition: &InterfaceDefinition,
    assignment: &str,
) -> Result<(String, AttributeValue), String> {
    let (name, text) = assignment
        .split_once('=')
        .ok_or_else(|| format!("Expected ATTRIBUTE=VALUE, got '{}'", assignment))?;
    let name = name.trim();
    let attribute = definition
        .attribute(name)
        .ok_or_else(|| format!("Unknown attribute '{}'", name))?;
    let field_type = attribute.primary().and_then(|binding| binding.field_type());
    let value = AttributeValue::parse(text, field_type).ok_or_else(|| {
        format!(
            "'{}' is not a valid {} value for {}",
            text.trim(),
            field_type.map_or("command", |ty| ty.name()),
            name
        )
    })?;
    Ok((name.to_string(), value))
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    log::info!("Starting SCPI simulator");

    let args = Args::parse();
    log::debug!(
        "Parsed arguments: ip={}, port={}, definition={}",
        args.ip,
        args.port,
        args.definition.display()
    );

    let definition = InterfaceDefinition::from_yaml_file(&args.definition)?;
    log::info!(
        "Loaded definition of '{}' with {} attributes",
        definition.model,
        definition.attributes.len()
    );

    let mut simulator = Simulator::from_definition(&definition);
    for assignment in &args.set {
        let (name, value) = parse_assignment(&definition, assignment)?;
        log::info!("Initial value of {} is {}", name, value);
        simulator.set_value(name, value);
    }

    let config = Config {
        read_write_timeout: Duration::from_secs(args.timeout_s),
        ..Config::from_definition(&definition)
    };
    log::debug!(
        "Server config: sentinel={:?}, max_unit_size={}",
        config.sentinel,
        config.max_unit_size
    );

    let addr = SocketAddr::new(args.ip, args.port);
    log::info!("Binding to address: {}", addr);
    let mut server = Server::new(simulator, definition.attributes.clone(), config)?;
    server.listen(addr)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn definition() -> InterfaceDefinition {
        InterfaceDefinition::from_yaml_str(
            r#"
model: fruit
attributes:
  juiciness:
    read_write: {field: JUIC, field_type: float}
  peeled:
    read_write: {field: PEEL, field_type: bool}
  chilled:
    read_write: {field: FLAGS, field_type: bit, bit: 7}
"#,
        )
        .unwrap()
    }

    #[test]
    fn assignments_use_the_field_type() {
        let definition = definition();
        assert_eq!(
            parse_assignment(&definition, "juiciness=98.7").unwrap(),
            ("juiciness".to_string(), AttributeValue::Float(98.7))
        );
        assert_eq!(
            parse_assignment(&definition, "peeled = on").unwrap(),
            ("peeled".to_string(), AttributeValue::Bool(true))
        );
        assert_eq!(
            parse_assignment(&definition, "chilled=0").unwrap(),
            ("chilled".to_string(), AttributeValue::Bool(false))
        );
    }

    #[test]
    fn invalid_assignments() {
        let definition = definition();
        assert!(parse_assignment(&definition, "juiciness").is_err());
        assert!(parse_assignment(&definition, "colour=orange").is_err());
        assert!(parse_assignment(&definition, "juiciness=very").is_err());
    }
}
