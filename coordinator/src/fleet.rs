//! The coordinator's view of its simulation servers

use log::info;
use shared::Phase;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("expected HOST:PORT, got {0:?}")]
    MissingPort(String),
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
}

/// Host and port of a simulation server, exactly as configured
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for ServerAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .filter(|(host, _)| !host.is_empty())
            .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?;

        let port = port
            .parse::<u16>()
            .ok()
            .filter(|port| *port > 0)
            .ok_or_else(|| AddressParseError::InvalidPort(s.to_string()))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Last thing we heard from a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Unresponsive,
    Reported(Phase),
}

#[derive(Debug, Clone)]
pub struct FleetEntry {
    pub address: ServerAddress,
    pub status: ServerStatus,
}

/// Fixed, ordered set of simulation servers. Entries are updated, never removed.
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    entries: Vec<FleetEntry>,
}

impl Fleet {
    pub fn new(addresses: impl IntoIterator<Item = ServerAddress>) -> Self {
        let mut entries: Vec<FleetEntry> = Vec::new();

        for address in addresses {
            if entries.iter().any(|entry| entry.address == address) {
                info!("Ignoring duplicate server address {}", address);
                continue;
            }
            entries.push(FleetEntry {
                address,
                status: ServerStatus::Unresponsive,
            });
        }

        Self { entries }
    }

    pub fn addresses(&self) -> Vec<ServerAddress> {
        self.entries
            .iter()
            .map(|entry| entry.address.clone())
            .collect()
    }

    pub fn update(&mut self, address: &ServerAddress, status: ServerStatus) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|entry| &entry.address == address)
        {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    pub fn status(&self, address: &ServerAddress) -> Option<ServerStatus> {
        self.entries
            .iter()
            .find(|entry| &entry.address == address)
            .map(|entry| entry.status)
    }

    /// First server in configured order that last reported itself idle
    pub fn first_waiting(&self) -> Option<&ServerAddress> {
        self.entries
            .iter()
            .find(|entry| entry.status == ServerStatus::Reported(Phase::Waiting))
            .map(|entry| &entry.address)
    }

    pub fn waiting_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == ServerStatus::Reported(Phase::Waiting))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
