mod parser;

pub use parser::Templates;

use crate::collector::{CollectResult, Collector, Domain, Session};
use crate::metrics::{Desc, MetricBatch};
use async_trait::async_trait;
use parser::{classify, show_idprom, SHOW_INTERFACES_STATS, SHOW_INVENTORY};
use std::sync::Arc;

/// Hardware inventory and transceiver details, one series per part with
/// value 1
pub struct InventoryCollector {
    templates: Arc<Templates>,
    item: Arc<Desc>,
    transceiver: Arc<Desc>,
}

impl InventoryCollector {
    pub fn new(templates: Arc<Templates>) -> Self {
        Self {
            templates,
            item: Desc::gauge(
                "cisco_inventory_item",
                "Hardware inventory info",
                &["target", "name", "description", "part_number", "serial_number"],
            ),
            transceiver: Desc::gauge(
                "cisco_interface_transceiver",
                "Transceiver inventory info",
                &[
                    "target",
                    "name",
                    "description",
                    "vendor_name",
                    "vendor_part_number",
                    "serial_number",
                ],
            ),
        }
    }
}

#[async_trait]
impl Collector for InventoryCollector {
    fn domain(&self) -> Domain {
        Domain::Inventory
    }

    async fn collect(&self, session: &mut Session<'_>, batch: &mut MetricBatch) -> CollectResult<()> {
        Domain::Inventory.ensure_supported(session.dialect())?;

        let output = session.run(SHOW_INTERFACES_STATS).await?;
        let known = self.templates.known_interfaces(&output);

        let output = session.run(SHOW_INVENTORY).await?;
        let classified = classify(self.templates.parse_inventory(&output)?, &known);
        tracing::debug!(
            "{}: {} inventory items, {} transceivers",
            session.target(),
            classified.items.len(),
            classified.transceivers.len()
        );

        let target = session.target().to_string();
        for entry in &classified.transceivers {
            let output = session.run(&show_idprom(&entry.name)).await?;
            let transceiver = self.templates.parse_idprom(entry, &output);
            batch.push(
                &self.transceiver,
                1.0,
                vec![
                    target.clone(),
                    transceiver.name,
                    transceiver.description,
                    transceiver.vendor,
                    transceiver.part_number,
                    transceiver.serial_number,
                ],
            )?;
        }

        for item in classified.items {
            batch.push(
                &self.item,
                1.0,
                vec![
                    target.clone(),
                    item.name,
                    item.description,
                    item.part_number,
                    item.serial_number,
                ],
            )?;
        }
        Ok(())
    }
}
