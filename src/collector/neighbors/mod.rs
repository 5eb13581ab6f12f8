mod parser;

pub use parser::Templates;

use crate::collector::{CollectResult, Collector, Domain, Session};
use crate::metrics::{Desc, MetricBatch};
use async_trait::async_trait;
use parser::{
    aggregate, NeighborCounts, Protocol, SHOW_ARP_DETAIL, SHOW_IPV6_INTERFACE_BRIEF,
    SHOW_IPV6_NEIGHBORS, SHOW_IP_INTERFACE_BRIEF,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const LABELS: [&str; 3] = ["target", "name", "protocol"];

/// ARP and IPv6 neighbor table sizes per L3 interface
pub struct NeighborsCollector {
    templates: Arc<Templates>,
    reachable: Arc<Desc>,
    stale: Arc<Desc>,
    incomplete: Arc<Desc>,
}

impl NeighborsCollector {
    pub fn new(templates: Arc<Templates>) -> Self {
        Self {
            templates,
            reachable: Desc::gauge("cisco_neighbors_reachable", "Number of reachable neighbors", &LABELS),
            stale: Desc::gauge("cisco_neighbors_stale", "Number of stale neighbors", &LABELS),
            incomplete: Desc::gauge(
                "cisco_neighbors_incomplete",
                "Number of neighbors with incomplete resolution",
                &LABELS,
            ),
        }
    }

    fn emit(
        &self,
        target: &str,
        protocol: Protocol,
        counts: &BTreeMap<String, NeighborCounts>,
        batch: &mut MetricBatch,
    ) -> CollectResult<()> {
        for (name, count) in counts {
            let labels = vec![target.to_string(), name.clone(), protocol.to_string()];
            batch.push(&self.reachable, count.reachable, labels.clone())?;
            batch.push(&self.stale, count.stale, labels.clone())?;
            batch.push(&self.incomplete, count.incomplete, labels)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Collector for NeighborsCollector {
    fn domain(&self) -> Domain {
        Domain::Neighbors
    }

    async fn collect(&self, session: &mut Session<'_>, batch: &mut MetricBatch) -> CollectResult<()> {
        Domain::Neighbors.ensure_supported(session.dialect())?;

        let output = session.run(SHOW_IP_INTERFACE_BRIEF).await?;
        let ipv4_seed = self.templates.ipv4_interfaces(&output);
        let output = session.run(SHOW_IPV6_INTERFACE_BRIEF).await?;
        let ipv6_seed = self.templates.ipv6_interfaces(&output);

        let output = session.run(SHOW_ARP_DETAIL).await?;
        let ipv4 = aggregate(&ipv4_seed, &self.templates.ipv4_neighbors(&output));
        let output = session.run(SHOW_IPV6_NEIGHBORS).await?;
        let ipv6 = aggregate(&ipv6_seed, &self.templates.ipv6_neighbors(&output));

        let target = session.target().to_string();
        self.emit(&target, Protocol::Ipv4, &ipv4, batch)?;
        self.emit(&target, Protocol::Ipv6, &ipv6, batch)?;
        Ok(())
    }
}
