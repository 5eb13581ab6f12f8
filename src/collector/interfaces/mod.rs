mod parser;

pub use parser::Templates;

use crate::collector::{CollectResult, Collector, Domain, OsDialect, Session};
use crate::dynamic_labels::{DynamicLabels, FIXED_KEYS};
use crate::metrics::{Desc, MetricBatch, ValueType};
use async_trait::async_trait;
use parser::{correlate, Interface, SHOW_INTERFACE, SHOW_VLANS};
use regex::Regex;
use std::sync::Arc;

const PREFIX: &str = "cisco_interface_";

fn gauge(name: &str, help: &str, dynamic_keys: &[String]) -> Arc<Desc> {
    let name = format!("{}{}", PREFIX, name);
    Arc::new(Desc::new(&name, help, ValueType::Gauge, &FIXED_KEYS).with_labels(dynamic_keys))
}

/// Interface state and traffic counters. Built per device because the
/// label set carries the keys of that device's description regex.
pub struct InterfaceCollector {
    templates: Arc<Templates>,
    description_regex: Option<Regex>,
    receive_bytes: Arc<Desc>,
    receive_errors: Arc<Desc>,
    receive_drops: Arc<Desc>,
    receive_broadcast: Arc<Desc>,
    receive_multicast: Arc<Desc>,
    transmit_bytes: Arc<Desc>,
    transmit_errors: Arc<Desc>,
    transmit_drops: Arc<Desc>,
    admin_up: Arc<Desc>,
    up: Arc<Desc>,
    error_status: Arc<Desc>,
    speed: Arc<Desc>,
}

impl InterfaceCollector {
    pub fn new(templates: Arc<Templates>, description_regex: Option<Regex>) -> Self {
        let keys = DynamicLabels::keys_for(description_regex.as_ref());

        Self {
            templates,
            description_regex,
            receive_bytes: gauge("receive_bytes", "Received data in bytes", &keys),
            receive_errors: gauge("receive_errors", "Number of errors caused by incoming packets", &keys),
            receive_drops: gauge("receive_drops", "Number of dropped incoming packets", &keys),
            receive_broadcast: gauge("receive_broadcast", "Received broadcast packets", &keys),
            receive_multicast: gauge("receive_multicast", "Received multicast packets", &keys),
            transmit_bytes: gauge("transmit_bytes", "Transmitted data in bytes", &keys),
            transmit_errors: gauge("transmit_errors", "Number of errors caused by outgoing packets", &keys),
            transmit_drops: gauge("transmit_drops", "Number of dropped outgoing packets", &keys),
            admin_up: gauge("admin_up", "Admin operational status", &keys),
            up: gauge("up", "Interface operational status", &keys),
            error_status: gauge("error_status", "Admin and operational status differ", &keys),
            speed: gauge("speed", "Interface speed in bits per second", &keys),
        }
    }

    fn emit(&self, target: &str, interface: &Interface, batch: &mut MetricBatch) -> CollectResult<()> {
        let dynamic = DynamicLabels::parse(&interface.description, self.description_regex.as_ref());
        let mut labels = vec![
            target.to_string(),
            interface.name.clone(),
            interface.description.clone(),
            interface.mac_address.clone(),
        ];
        labels.extend(dynamic.values());

        let flag = |set: bool| if set { 1.0 } else { 0.0 };
        let series = [
            (&self.receive_bytes, interface.input_bytes),
            (&self.receive_errors, interface.input_errors),
            (&self.receive_drops, interface.input_drops),
            (&self.receive_broadcast, interface.input_broadcast),
            (&self.receive_multicast, interface.input_multicast),
            (&self.transmit_bytes, interface.output_bytes),
            (&self.transmit_errors, interface.output_errors),
            (&self.transmit_drops, interface.output_drops),
            (&self.admin_up, flag(interface.admin_up())),
            (&self.up, flag(interface.oper_up())),
            (&self.error_status, flag(interface.error_status())),
            (&self.speed, interface.speed),
        ];
        for (desc, value) in series {
            batch.push(desc, value, labels.clone())?;
        }
        Ok(())
    }
}

#[async_trait]
impl Collector for InterfaceCollector {
    fn domain(&self) -> Domain {
        Domain::Interfaces
    }

    async fn collect(&self, session: &mut Session<'_>, batch: &mut MetricBatch) -> CollectResult<()> {
        let dialect = session.dialect();
        Domain::Interfaces.ensure_supported(dialect)?;

        let output = session.run(SHOW_INTERFACE).await?;
        let records = self.templates.parse_interfaces(dialect, &output)?;

        // Subinterface counters of IOS-XE routers are only accurate in `show vlans`
        let vlans = if dialect == OsDialect::IosXe {
            let output = session.run(SHOW_VLANS).await?;
            self.templates.parse_vlans(&output)
        } else {
            Vec::new()
        };

        let interfaces = correlate(&records, &vlans);
        tracing::debug!("{}: {} interfaces", session.target(), interfaces.len());

        for interface in &interfaces {
            self.emit(session.target(), interface, batch)?;
        }
        Ok(())
    }
}
