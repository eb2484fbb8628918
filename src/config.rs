// Runtime configuration for trackers and nodes

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Leading hex zeros every mined block hash must carry
pub const DEFAULT_DIFFICULTY: usize = 3;
/// Share of a transfer paid to the miner
pub const DEFAULT_REWARD_RATE: f64 = 0.1;
/// Balance of an address with no chain activity
pub const DEFAULT_INITIAL_BALANCE: f64 = 1000.0;
/// Well-known tracker port
pub const DEFAULT_TRACKER_PORT: u16 = 50007;

/// Consensus constants. There is no negotiation: every node in a network
/// must be started with the same values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub difficulty: usize,
    pub reward_rate: f64,
    pub initial_balance: f64,
}

impl ConsensusParams {
    /// What a payer is charged for sending `amount` (transfer plus reward)
    pub fn transfer_cost(&self, amount: f64) -> f64 {
        amount * (1.0 + self.reward_rate)
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            reward_rate: DEFAULT_REWARD_RATE,
            initial_balance: DEFAULT_INITIAL_BALANCE,
        }
    }
}

/// Tracker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub listen: SocketAddr,
    /// Budget for writing one reply or relayed line; a client that does not
    /// drain its socket within it is dropped
    pub reply_timeout: Duration,
}

impl TrackerConfig {
    pub fn new(listen: SocketAddr) -> Self {
        Self {
            listen,
            ..Self::default()
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_TRACKER_PORT)),
            reply_timeout: Duration::from_secs(5),
        }
    }
}

/// Node settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Local address for the peer listener (port 0 picks a free port)
    pub listen: SocketAddr,
    /// Host part of the address announced to the tracker
    pub advertise_host: String,
    /// Tracker to register with
    pub tracker: SocketAddr,
    pub consensus: ConsensusParams,
    /// Connect + send budget for each broadcast target
    pub broadcast_timeout: Duration,
    /// Budget for one tracker round trip
    pub tracker_timeout: Duration,
    /// Registration attempts before giving up
    pub registration_attempts: u32,
    pub registration_backoff: Duration,
    /// How long the miner waits on an empty mempool before re-checking
    /// the stop flag
    pub mempool_poll: Duration,
}

impl NodeConfig {
    pub fn new(listen: SocketAddr, tracker: SocketAddr) -> Self {
        Self {
            listen,
            tracker,
            ..Self::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            advertise_host: "127.0.0.1".to_string(),
            tracker: SocketAddr::from(([127, 0, 0, 1], DEFAULT_TRACKER_PORT)),
            consensus: ConsensusParams::default(),
            broadcast_timeout: Duration::from_secs(5),
            tracker_timeout: Duration::from_secs(5),
            registration_attempts: 3,
            registration_backoff: Duration::from_millis(500),
            mempool_poll: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_consensus() {
        let params = ConsensusParams::default();
        assert_eq!(params.difficulty, 3);
        assert_eq!(params.initial_balance, 1000.0);
        assert!((params.transfer_cost(100.0) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_node_config_new_keeps_defaults() {
        let listen: SocketAddr = "127.0.0.1:6001".parse().unwrap();
        let tracker: SocketAddr = "127.0.0.1:6000".parse().unwrap();
        let config = NodeConfig::new(listen, tracker);

        assert_eq!(config.listen, listen);
        assert_eq!(config.tracker, tracker);
        assert_eq!(config.broadcast_timeout, Duration::from_secs(5));
        assert_eq!(config.registration_attempts, 3);
    }
}
