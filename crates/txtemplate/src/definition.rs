//! Transaction settings: propagation, isolation, read-only flag and timeout

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use txtemplate_core::ConfigError;

/// How a unit of work relates to a transaction that is already running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
    /// Join the current transaction, or begin one if none exists
    #[default]
    Required,
    /// Join the current transaction, or run without one
    Supports,
    /// Join the current transaction; fail if none exists
    Mandatory,
    /// Suspend the current transaction and always begin a new one
    RequiresNew,
    /// Suspend the current transaction and run without one
    NotSupported,
    /// Run without a transaction; fail if one exists
    Never,
    /// Run inside a savepoint of the current transaction, or begin one
    Nested,
}

impl Propagation {
    pub const ALL: [Propagation; 7] = [
        Propagation::Required,
        Propagation::Supports,
        Propagation::Mandatory,
        Propagation::RequiresNew,
        Propagation::NotSupported,
        Propagation::Never,
        Propagation::Nested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Propagation::Required => "REQUIRED",
            Propagation::Supports => "SUPPORTS",
            Propagation::Mandatory => "MANDATORY",
            Propagation::RequiresNew => "REQUIRES_NEW",
            Propagation::NotSupported => "NOT_SUPPORTED",
            Propagation::Never => "NEVER",
            Propagation::Nested => "NESTED",
        }
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Propagation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        Propagation::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| {
                ConfigError::invalid_value(
                    "propagation",
                    s,
                    "REQUIRED, SUPPORTS, MANDATORY, REQUIRES_NEW, NOT_SUPPORTED, NEVER or NESTED",
                )
            })
    }
}

/// Isolation level requested from the database engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Isolation {
    /// Use the engine's default isolation level
    #[default]
    Default,
    /// Dirty reads, non-repeatable reads and phantom reads can occur
    ReadUncommitted,
    /// Dirty reads are prevented
    ReadCommitted,
    /// Dirty and non-repeatable reads are prevented
    RepeatableRead,
    /// Dirty reads, non-repeatable reads and phantom reads are prevented
    Serializable,
}

impl Isolation {
    pub const ALL: [Isolation; 5] = [
        Isolation::Default,
        Isolation::ReadUncommitted,
        Isolation::ReadCommitted,
        Isolation::RepeatableRead,
        Isolation::Serializable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Isolation::Default => "DEFAULT",
            Isolation::ReadUncommitted => "READ_UNCOMMITTED",
            Isolation::ReadCommitted => "READ_COMMITTED",
            Isolation::RepeatableRead => "REPEATABLE_READ",
            Isolation::Serializable => "SERIALIZABLE",
        }
    }

    /// SQL phrase for `ISOLATION LEVEL ...`, `None` for the engine default
    pub fn as_sql(&self) -> Option<&'static str> {
        match self {
            Isolation::Default => None,
            Isolation::ReadUncommitted => Some("READ UNCOMMITTED"),
            Isolation::ReadCommitted => Some("READ COMMITTED"),
            Isolation::RepeatableRead => Some("REPEATABLE READ"),
            Isolation::Serializable => Some("SERIALIZABLE"),
        }
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Isolation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        Isolation::ALL
            .into_iter()
            .find(|i| i.as_str() == normalized)
            .ok_or_else(|| {
                ConfigError::invalid_value(
                    "isolation",
                    s,
                    "DEFAULT, READ_UNCOMMITTED, READ_COMMITTED, REPEATABLE_READ or SERIALIZABLE",
                )
            })
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_uppercase().replace(['-', ' '], "_")
}

/// Process-wide defaults used when a caller does not pick a setting
pub struct DefaultTransactionSettings;

impl DefaultTransactionSettings {
    pub const PROPAGATION: Propagation = Propagation::Required;
    pub const ISOLATION: Isolation = Isolation::Default;
    pub const READ_ONLY: bool = false;
    /// No deadline; the engine's own statement timeouts apply
    pub const TIMEOUT: Option<Duration> = None;

    pub const fn settings() -> TransactionSettings {
        TransactionSettings {
            read_only: Self::READ_ONLY,
            propagation: Self::PROPAGATION,
            isolation: Self::ISOLATION,
            timeout: Self::TIMEOUT,
        }
    }
}

/// Transaction semantics for one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionSettings {
    pub read_only: bool,
    pub propagation: Propagation,
    pub isolation: Isolation,
    pub timeout: Option<Duration>,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        DefaultTransactionSettings::settings()
    }
}

impl TransactionSettings {
    pub fn new(
        read_only: bool,
        propagation: Propagation,
        isolation: Isolation,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            read_only,
            propagation,
            isolation,
            timeout,
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}
