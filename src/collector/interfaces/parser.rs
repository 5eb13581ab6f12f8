use crate::collector::{parse_number, CollectError, CollectResult, Domain, OsDialect};
use crate::ifname;
use crate::textfsm::{Record, Template, TemplateResult};
use std::collections::HashMap;

pub const SHOW_INTERFACE: &str = "show interface";
pub const SHOW_VLANS: &str = "show vlans";

const IOS_TEMPLATE: &str = include_str!("templates/show_interface_ios.textfsm");
const NXOS_TEMPLATE: &str = include_str!("templates/show_interface_nxos.textfsm");
const VLANS_TEMPLATE: &str = include_str!("templates/show_vlans.textfsm");

/// State and counters of one interface
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interface {
    pub name: String,
    pub description: String,
    pub mac_address: String,
    pub admin_status: String,
    pub oper_status: String,
    pub input_bytes: f64,
    pub input_errors: f64,
    pub input_drops: f64,
    pub input_broadcast: f64,
    pub input_multicast: f64,
    pub output_bytes: f64,
    pub output_errors: f64,
    pub output_drops: f64,
    /// Negotiated speed in bits per second
    pub speed: f64,
}

impl Interface {
    fn from_record(record: &Record) -> Self {
        // Only an explicit administrative shutdown marks the interface down
        let admin_status = match record.get("ADMIN_STATUS") {
            "" => "up".to_string(),
            status => status.to_ascii_lowercase(),
        };

        Self {
            name: ifname::canonical(record.get("NAME")),
            description: record.get("DESCRIPTION").to_string(),
            mac_address: record.get("MAC").to_string(),
            admin_status,
            oper_status: record.get("OPER_STATUS").to_ascii_lowercase(),
            input_bytes: parse_number(record.get("INPUT_BYTES")),
            input_errors: parse_number(record.get("INPUT_ERRORS")),
            input_drops: parse_number(record.get("INPUT_DROPS")),
            input_broadcast: parse_number(record.get("INPUT_BROADCAST")),
            input_multicast: parse_number(record.get("INPUT_MULTICAST")),
            output_bytes: parse_number(record.get("OUTPUT_BYTES")),
            output_errors: parse_number(record.get("OUTPUT_ERRORS")),
            output_drops: parse_number(record.get("OUTPUT_DROPS")),
            speed: parse_speed(record.get("SPEED")),
        }
    }

    pub fn admin_up(&self) -> bool {
        self.admin_status == "up"
    }

    pub fn oper_up(&self) -> bool {
        self.oper_status == "up"
    }

    /// Administrative and operational status disagree
    pub fn error_status(&self) -> bool {
        self.admin_status != self.oper_status
    }
}

/// Convert `1000Mb/s`, `10 Gb/s` or `100Mbps` to bits per second
fn parse_speed(text: &str) -> f64 {
    let text = text.trim();
    let digits_end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let value = parse_number(&text[..digits_end]);
    let multiplier = match text[digits_end..].trim_start().chars().next() {
        Some('K') | Some('k') => 1e3,
        Some('M') => 1e6,
        Some('G') => 1e9,
        _ => 1.0,
    };
    value * multiplier
}

/// `show interface` prints one block per interface, starting at a column 0
/// line `<name> is ...`
fn is_block_header(line: &str) -> bool {
    if line.starts_with(char::is_whitespace) {
        return false;
    }
    line.split_once(' ')
        .is_some_and(|(name, rest)| !name.is_empty() && rest.starts_with("is "))
}

fn split_blocks(output: &str) -> Vec<String> {
    let mut blocks: Vec<String> = Vec::new();
    for line in output.lines() {
        if is_block_header(line) {
            blocks.push(String::new());
        }
        if let Some(block) = blocks.last_mut() {
            block.push_str(line);
            block.push('\n');
        }
    }
    blocks
}

/// Parsed interface templates, one per supported dialect
pub struct Templates {
    ios: Template,
    nxos: Template,
    vlans: Template,
}

impl Templates {
    pub fn load() -> TemplateResult<Self> {
        Ok(Self {
            ios: Template::parse(IOS_TEMPLATE)?,
            nxos: Template::parse(NXOS_TEMPLATE)?,
            vlans: Template::parse(VLANS_TEMPLATE)?,
        })
    }

    fn show_interface(&self, dialect: OsDialect) -> CollectResult<&Template> {
        Domain::Interfaces.ensure_supported(dialect)?;
        Ok(match dialect {
            OsDialect::Ios | OsDialect::IosXe => &self.ios,
            OsDialect::NxOs => &self.nxos,
        })
    }

    /// One record per interface block of `show interface`
    pub fn parse_interfaces(&self, dialect: OsDialect, output: &str) -> CollectResult<Vec<Record>> {
        let template = self.show_interface(dialect)?;
        let records: Vec<Record> = split_blocks(output)
            .iter()
            .flat_map(|block| template.extract(block))
            .collect();

        if records.is_empty() {
            return Err(CollectError::ParseMismatch {
                command: SHOW_INTERFACE.to_string(),
                reason: "no interfaces found".to_string(),
            });
        }
        Ok(records)
    }

    pub fn parse_vlans(&self, output: &str) -> Vec<Record> {
        self.vlans.extract(output)
    }
}

/// Build one [`Interface`] per canonical name. `show interface` records
/// seed the set (first occurrence wins); `show vlans` records override the
/// byte counters of interfaces already in the set and are otherwise ignored.
pub fn correlate(primary: &[Record], vlans: &[Record]) -> Vec<Interface> {
    let mut interfaces: Vec<Interface> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in primary {
        let interface = Interface::from_record(record);
        if interface.name.is_empty() || index.contains_key(&interface.name) {
            continue;
        }
        index.insert(interface.name.clone(), interfaces.len());
        interfaces.push(interface);
    }

    for record in vlans {
        let name = ifname::canonical(record.get("INTERFACE"));
        let Some(&idx) = index.get(&name) else {
            continue;
        };
        let interface = &mut interfaces[idx];
        if !record.get("INPUT_BYTES").is_empty() {
            interface.input_bytes = parse_number(record.get("INPUT_BYTES"));
        }
        if !record.get("OUTPUT_BYTES").is_empty() {
            interface.output_bytes = parse_number(record.get("OUTPUT_BYTES"));
        }
    }

    interfaces
}
