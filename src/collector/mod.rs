//! Metric domains and the per-device collection that drives them.
//!
//! Each domain issues its commands through a [`Session`], extracts records
//! with its templates, correlates them into domain objects and pushes
//! samples into a [`MetricBatch`]. Which domains exist for which OS dialect
//! is decided by [`Domain::supports`].

mod device;
mod interfaces;
mod inventory;
mod nat64;
mod neighbors;

pub use device::{Connector, Exporter, SshConnector};

use crate::metrics::{MetricBatch, MetricsError};
use crate::ssh::{CommandRunner, SshError};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Operating system family of a Cisco device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsDialect {
    Ios,
    IosXe,
    NxOs,
}

impl OsDialect {
    /// Identify the dialect from `show version` output
    pub fn identify(show_version: &str) -> Option<Self> {
        if show_version.contains("IOS XE") || show_version.contains("IOS-XE") {
            Some(OsDialect::IosXe)
        } else if show_version.contains("NX-OS") {
            Some(OsDialect::NxOs)
        } else if show_version.contains("IOS Software") {
            Some(OsDialect::Ios)
        } else {
            None
        }
    }
}

impl fmt::Display for OsDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OsDialect::Ios => "IOS",
            OsDialect::IosXe => "IOS-XE",
            OsDialect::NxOs => "NX-OS",
        })
    }
}

/// A metric family with its own commands, templates and correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Interfaces,
    Inventory,
    Neighbors,
    Nat64,
}

impl Domain {
    pub fn name(self) -> &'static str {
        match self {
            Domain::Interfaces => "interfaces",
            Domain::Inventory => "inventory",
            Domain::Neighbors => "neighbors",
            Domain::Nat64 => "nat64",
        }
    }

    /// Capability table: dialects this domain has templates for
    pub fn supports(self, dialect: OsDialect) -> bool {
        match self {
            Domain::Interfaces => true,
            Domain::Inventory => matches!(dialect, OsDialect::Ios | OsDialect::IosXe),
            Domain::Neighbors | Domain::Nat64 => dialect == OsDialect::IosXe,
        }
    }

    pub fn ensure_supported(self, dialect: OsDialect) -> CollectResult<()> {
        if self.supports(dialect) {
            Ok(())
        } else {
            Err(CollectError::UnsupportedPlatform {
                domain: self,
                dialect,
            })
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("{domain} is not supported on {dialect}")]
    UnsupportedPlatform { domain: Domain, dialect: OsDialect },
    #[error("unexpected output from {command:?}: {reason}")]
    ParseMismatch { command: String, reason: String },
    #[error("transport failure: {0}")]
    Transport(#[from] SshError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

pub type CollectResult<T> = Result<T, CollectError>;

/// An identified device connection, shared by the domains of one scrape
pub struct Session<'a> {
    runner: &'a mut dyn CommandRunner,
    dialect: OsDialect,
    target: &'a str,
}

impl<'a> Session<'a> {
    pub fn new(runner: &'a mut dyn CommandRunner, dialect: OsDialect, target: &'a str) -> Self {
        Self {
            runner,
            dialect,
            target,
        }
    }

    pub fn dialect(&self) -> OsDialect {
        self.dialect
    }

    /// Value of the `target` label
    pub fn target(&self) -> &str {
        self.target
    }

    pub async fn run(&mut self, command: &str) -> CollectResult<String> {
        self.runner.run(command).await.map_err(|e| {
            tracing::debug!("{:?} failed on {}: {}", command, self.target, e);
            CollectError::Transport(e)
        })
    }
}

/// One metric domain for one device configuration
#[async_trait]
pub trait Collector: Send + Sync {
    fn domain(&self) -> Domain;

    async fn collect(&self, session: &mut Session<'_>, batch: &mut MetricBatch) -> CollectResult<()>;
}

/// Parse a counter captured by a template; empty or malformed text is zero
pub(crate) fn parse_number(text: &str) -> f64 {
    text.trim().parse().unwrap_or(0.0)
}
