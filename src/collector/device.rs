use super::{interfaces, inventory, nat64, neighbors};
use super::{CollectError, Collector, Domain, OsDialect, Session};
use crate::config::{split_target, Config, ConfigResult, EffectiveConfig};
use crate::metrics::{Desc, MetricBatch, MetricsResult};
use crate::ssh::{CommandRunner, SshClient, SshResult};
use crate::textfsm::TemplateResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

const SHOW_VERSION: &str = "show version";

/// Opens a command session to a device
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        config: &EffectiveConfig,
    ) -> SshResult<Box<dyn CommandRunner>>;
}

/// Connects over SSH
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        config: &EffectiveConfig,
    ) -> SshResult<Box<dyn CommandRunner>> {
        let client = SshClient::connect(host, port, config).await?;
        Ok(Box::new(client))
    }
}

/// Exporter level series, shared by every device
struct ScrapeDescs {
    up: Arc<Desc>,
    collect_duration: Arc<Desc>,
    collector_duration: Arc<Desc>,
    collector_success: Arc<Desc>,
}

impl ScrapeDescs {
    fn new() -> Self {
        Self {
            up: Desc::gauge("cisco_up", "Scrape of target was successful", &["target"]),
            collect_duration: Desc::gauge(
                "cisco_collect_duration_seconds",
                "Duration of a scrape by target",
                &["target"],
            ),
            collector_duration: Desc::gauge(
                "cisco_collector_duration_seconds",
                "Duration of a collector scrape for one target",
                &["target", "collector"],
            ),
            collector_success: Desc::gauge(
                "cisco_collector_success",
                "Collector of target was successful",
                &["target", "collector"],
            ),
        }
    }
}

/// Templates of every domain, parsed once. A domain whose templates fail
/// to parse stays disabled for the lifetime of the process.
struct DomainTemplates {
    interfaces: Option<Arc<interfaces::Templates>>,
    inventory: Option<Arc<inventory::Templates>>,
    neighbors: Option<Arc<neighbors::Templates>>,
    nat64: Option<Arc<nat64::Templates>>,
}

fn load<T>(domain: Domain, templates: TemplateResult<T>) -> Option<Arc<T>> {
    match templates {
        Ok(templates) => Some(Arc::new(templates)),
        Err(e) => {
            tracing::error!("Disabling {} collector, template error: {}", domain, e);
            None
        }
    }
}

impl DomainTemplates {
    fn load() -> Self {
        Self {
            interfaces: load(Domain::Interfaces, interfaces::Templates::load()),
            inventory: load(Domain::Inventory, inventory::Templates::load()),
            neighbors: load(Domain::Neighbors, neighbors::Templates::load()),
            nat64: load(Domain::Nat64, nat64::Templates::load()),
        }
    }
}

/// One scrape target and the collectors enabled for it
struct Device {
    target: String,
    host: String,
    port: u16,
    config: Arc<EffectiveConfig>,
    collectors: Vec<Arc<dyn Collector>>,
}

impl Device {
    /// Connect, identify and run every collector. Never fails: an
    /// unreachable device reports `cisco_up 0`.
    async fn collect(&self, connector: &dyn Connector, descs: &ScrapeDescs) -> MetricBatch {
        let started = Instant::now();
        let mut batch = MetricBatch::new();

        let up = match connector.connect(&self.host, self.port, &self.config).await {
            Ok(mut runner) => {
                let up = self.run_collectors(runner.as_mut(), descs, &mut batch).await;
                if let Err(e) = runner.close().await {
                    tracing::debug!("Failed to close session to {}: {}", self.target, e);
                }
                up
            }
            Err(e) => {
                tracing::warn!("Failed to connect to {}: {}", self.target, e);
                false
            }
        };

        let target = vec![self.target.clone()];
        log_push(batch.push(&descs.up, if up { 1.0 } else { 0.0 }, target.clone()));
        log_push(batch.push(
            &descs.collect_duration,
            started.elapsed().as_secs_f64(),
            target,
        ));
        batch
    }

    /// Returns whether the device was identified
    async fn run_collectors(
        &self,
        runner: &mut dyn CommandRunner,
        descs: &ScrapeDescs,
        batch: &mut MetricBatch,
    ) -> bool {
        let dialect = match runner.run(SHOW_VERSION).await {
            Ok(output) => match OsDialect::identify(&output) {
                Some(dialect) => dialect,
                None => {
                    tracing::warn!("Could not identify the OS of {}", self.target);
                    return false;
                }
            },
            Err(e) => {
                tracing::warn!("{:?} failed on {}: {}", SHOW_VERSION, self.target, e);
                return false;
            }
        };
        if self.config.debug {
            tracing::debug!("{} identified as {}", self.target, dialect);
        }

        let mut session = Session::new(runner, dialect, &self.target);
        for collector in &self.collectors {
            let domain = collector.domain();
            let started = Instant::now();

            // Samples only reach the scrape when the whole domain succeeded
            let mut domain_batch = MetricBatch::new();
            let success = match collector.collect(&mut session, &mut domain_batch).await {
                Ok(()) => {
                    batch.merge(domain_batch);
                    true
                }
                Err(e) => {
                    log_collect_error(&self.target, domain, &e);
                    false
                }
            };

            let labels = vec![self.target.clone(), domain.name().to_string()];
            log_push(batch.push(
                &descs.collector_duration,
                started.elapsed().as_secs_f64(),
                labels.clone(),
            ));
            log_push(batch.push(
                &descs.collector_success,
                if success { 1.0 } else { 0.0 },
                labels,
            ));
        }
        true
    }
}

fn log_collect_error(target: &str, domain: Domain, error: &CollectError) {
    match error {
        CollectError::UnsupportedPlatform { .. } => {
            tracing::debug!("{} collector skipped for {}: {}", domain, target, error)
        }
        CollectError::Transport(_) | CollectError::ParseMismatch { .. } => {
            tracing::warn!("{} collector failed for {}: {}", domain, target, error)
        }
        CollectError::Metrics(_) => {
            tracing::error!("{} collector failed for {}: {}", domain, target, error)
        }
    }
}

fn log_push(result: MetricsResult<()>) {
    if let Err(e) = result {
        tracing::error!("Dropping exporter sample: {}", e);
    }
}

/// All configured devices. Each scrape connects to every device in
/// parallel and collects a fresh set of samples.
pub struct Exporter {
    devices: Vec<Arc<Device>>,
    connector: Arc<dyn Connector>,
    descs: Arc<ScrapeDescs>,
}

impl Exporter {
    pub fn new(config: &Config, targets: &[String], connector: Arc<dyn Connector>) -> ConfigResult<Self> {
        let templates = DomainTemplates::load();

        let inventory: Option<Arc<dyn Collector>> = templates
            .inventory
            .as_ref()
            .map(|t| Arc::new(inventory::InventoryCollector::new(Arc::clone(t))) as Arc<dyn Collector>);
        let neighbors: Option<Arc<dyn Collector>> = templates
            .neighbors
            .as_ref()
            .map(|t| Arc::new(neighbors::NeighborsCollector::new(Arc::clone(t))) as Arc<dyn Collector>);
        let nat64: Option<Arc<dyn Collector>> = templates
            .nat64
            .as_ref()
            .map(|t| Arc::new(nat64::Nat64Collector::new(Arc::clone(t))) as Arc<dyn Collector>);

        let mut devices = Vec::with_capacity(targets.len());
        for target in targets.iter().map(|t| t.trim()) {
            let (host, port) = split_target(target)?;
            let effective = config.resolve(target);
            let features = effective.features;

            let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();
            if features.interfaces {
                // Label keys depend on this device's description regex
                if let Some(t) = &templates.interfaces {
                    collectors.push(Arc::new(interfaces::InterfaceCollector::new(
                        Arc::clone(t),
                        effective.description_regex.clone(),
                    )));
                }
            }
            let shared = [
                (features.inventory, &inventory),
                (features.neighbors, &neighbors),
                (features.nat64, &nat64),
            ];
            for (enabled, collector) in shared {
                if let (true, Some(collector)) = (enabled, collector) {
                    collectors.push(Arc::clone(collector));
                }
            }

            tracing::info!(
                "Target {} ({}:{}), collectors: {}",
                target,
                host,
                port,
                collectors
                    .iter()
                    .map(|c| c.domain().name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            devices.push(Arc::new(Device {
                target: target.to_string(),
                host,
                port,
                config: Arc::new(effective),
                collectors,
            }));
        }

        Ok(Self {
            devices,
            connector,
            descs: Arc::new(ScrapeDescs::new()),
        })
    }

    pub fn targets(&self) -> Vec<&str> {
        self.devices.iter().map(|d| d.target.as_str()).collect()
    }

    /// Collect every device concurrently. Samples are merged in target order.
    pub async fn scrape(&self) -> MetricBatch {
        let mut tasks = JoinSet::new();
        for (idx, device) in self.devices.iter().enumerate() {
            let device = Arc::clone(device);
            let connector = Arc::clone(&self.connector);
            let descs = Arc::clone(&self.descs);
            tasks.spawn(async move { (idx, device.collect(connector.as_ref(), &descs).await) });
        }

        let mut results: Vec<Option<MetricBatch>> = (0..self.devices.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, batch)) => results[idx] = Some(batch),
                Err(e) => tracing::error!("Device collection task failed: {}", e),
            }
        }

        let mut batch = MetricBatch::new();
        for device_batch in results.into_iter().flatten() {
            batch.merge(device_batch);
        }
        batch
    }
}
