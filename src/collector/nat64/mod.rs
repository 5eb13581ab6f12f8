use crate::collector::{parse_number, CollectError, CollectResult, Collector, Domain, Session};
use crate::metrics::{Desc, MetricBatch};
use crate::textfsm::{Template, TemplateResult};
use async_trait::async_trait;
use std::sync::Arc;

const SHOW_NAT64_STATISTICS: &str = "show nat64 statistics global";
const TEMPLATE: &str = include_str!("templates/show_nat64_statistics.textfsm");
const PREFIX: &str = "cisco_nat64_";

/// Global stateful NAT64 counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Nat64Stats {
    pub translations_active: f64,
    pub translations_expired: f64,
    pub sessions_found: f64,
    pub sessions_created: f64,
    pub packets_translated_4to6: f64,
    pub packets_translated_6to4: f64,
}

pub struct Templates {
    statistics: Template,
}

impl Templates {
    pub fn load() -> TemplateResult<Self> {
        Ok(Self {
            statistics: Template::parse(TEMPLATE)?,
        })
    }

    pub fn parse_statistics(&self, output: &str) -> CollectResult<Nat64Stats> {
        let records = self.statistics.extract(output);
        let Some(record) = records.first() else {
            return Err(CollectError::ParseMismatch {
                command: SHOW_NAT64_STATISTICS.to_string(),
                reason: "no statistics found".to_string(),
            });
        };

        Ok(Nat64Stats {
            translations_active: parse_number(record.get("ACTIVE")),
            translations_expired: parse_number(record.get("EXPIRED")),
            sessions_found: parse_number(record.get("FOUND")),
            sessions_created: parse_number(record.get("CREATED")),
            packets_translated_4to6: parse_number(record.get("V4_TO_V6")),
            packets_translated_6to4: parse_number(record.get("V6_TO_V4")),
        })
    }
}

pub struct Nat64Collector {
    templates: Arc<Templates>,
    translations_active: Arc<Desc>,
    translations_expired: Arc<Desc>,
    sessions_found: Arc<Desc>,
    sessions_created: Arc<Desc>,
    packets_translated_4to6: Arc<Desc>,
    packets_translated_6to4: Arc<Desc>,
}

impl Nat64Collector {
    pub fn new(templates: Arc<Templates>) -> Self {
        let labels = ["target"];
        let counter = |name: &str, help: &str| Desc::counter(&format!("{}{}", PREFIX, name), help, &labels);

        Self {
            templates,
            translations_active: Desc::gauge(
                &format!("{}translations_active", PREFIX),
                "Currently active NAT64 translations",
                &labels,
            ),
            translations_expired: counter(
                "translations_expired",
                "Total number of NAT64 translations removed from session table",
            ),
            sessions_found: counter(
                "sessions_found",
                "Count of packets that matched existing session in NAT64 session table",
            ),
            sessions_created: counter(
                "sessions_created",
                "Count of new sessions created in NAT64 session table",
            ),
            packets_translated_4to6: counter(
                "packets_translated_4to6",
                "Count of packets translated from IPv4 to IPv6",
            ),
            packets_translated_6to4: counter(
                "packets_translated_6to4",
                "Count of packets translated from IPv6 to IPv4",
            ),
        }
    }
}

#[async_trait]
impl Collector for Nat64Collector {
    fn domain(&self) -> Domain {
        Domain::Nat64
    }

    async fn collect(&self, session: &mut Session<'_>, batch: &mut MetricBatch) -> CollectResult<()> {
        Domain::Nat64.ensure_supported(session.dialect())?;

        let output = session.run(SHOW_NAT64_STATISTICS).await?;
        let stats = self.templates.parse_statistics(&output)?;

        let labels = vec![session.target().to_string()];
        let series = [
            (&self.translations_active, stats.translations_active),
            (&self.translations_expired, stats.translations_expired),
            (&self.sessions_found, stats.sessions_found),
            (&self.sessions_created, stats.sessions_created),
            (&self.packets_translated_4to6, stats.packets_translated_4to6),
            (&self.packets_translated_6to4, stats.packets_translated_6to4),
        ];
        for (desc, value) in series {
            batch.push(desc, value, labels.clone())?;
        }
        Ok(())
    }
}
