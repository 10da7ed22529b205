//! Simulation scenarios.

use serde::{Serialize, Serializer};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// A steady trickle of new locations
    SteadyStream,

    /// Mostly repeated locations
    DuplicateFlood,

    /// A share of payloads that are not location messages
    MalformedPayloads,

    /// The broker goes away mid-run and comes back
    BrokerOutage,

    /// The view is unmounted and mounted again mid-run
    Remount,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyStream,
            ScenarioId::DuplicateFlood,
            ScenarioId::MalformedPayloads,
            ScenarioId::BrokerOutage,
            ScenarioId::Remount,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyStream => "steady_stream",
            ScenarioId::DuplicateFlood => "duplicate_flood",
            ScenarioId::MalformedPayloads => "malformed_payloads",
            ScenarioId::BrokerOutage => "broker_outage",
            ScenarioId::Remount => "remount",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyStream => "New location every 250ms, every one becomes an arc",
            ScenarioId::DuplicateFlood => "80% repeated locations, registry stays deduplicated",
            ScenarioId::MalformedPayloads => {
                "30% garbage payloads, dropped without touching the registry"
            }
            ScenarioId::BrokerOutage => {
                "Broker offline for 3s mid-run, listener reconnects with backoff"
            }
            ScenarioId::Remount => "Unmount at half time, markers reset, remount resumes",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_stream" | "steadystream" | "steady" => Ok(ScenarioId::SteadyStream),
            "duplicate_flood" | "duplicateflood" | "duplicates" => Ok(ScenarioId::DuplicateFlood),
            "malformed_payloads" | "malformedpayloads" | "malformed" => {
                Ok(ScenarioId::MalformedPayloads)
            }
            "broker_outage" | "brokeroutage" | "outage" => Ok(ScenarioId::BrokerOutage),
            "remount" => Ok(ScenarioId::Remount),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

impl Serialize for ScenarioId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
    }

    #[test]
    fn test_unknown_scenario() {
        assert!("split_brain".parse::<ScenarioId>().is_err());
        assert_eq!("OUTAGE".parse::<ScenarioId>(), Ok(ScenarioId::BrokerOutage));
    }
}
