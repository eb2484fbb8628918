// CLI commands

use crate::config::{DEFAULT_DIFFICULTY, DEFAULT_TRACKER_PORT, NodeConfig, TrackerConfig};
use crate::network::{Node, Tracker};
use crate::storage::Blockchain;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "chimchain")]
#[command(about = "Peer-to-peer proof-of-work ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the tracker that nodes register with
    Tracker {
        /// Address to listen on
        #[arg(short, long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_TRACKER_PORT)))]
        listen: SocketAddr,
    },

    /// Run a node with an interactive console
    Node {
        /// Tracker address
        #[arg(short, long)]
        tracker: SocketAddr,
        /// Address for the peer listener (port 0 picks a free port)
        #[arg(short, long, default_value = "0.0.0.0:0")]
        listen: SocketAddr,
        /// Host announced to the tracker
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Leading hex zeros required of block hashes
        #[arg(short, long, default_value_t = DEFAULT_DIFFICULTY)]
        difficulty: usize,
    },
}

/// One line typed into the node console
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Balance(Option<String>),
    Send { amount: f64, recipient: String },
    Peers,
    Chain,
    Status,
    Disconnect,
    Reconnect,
    Help,
    Quit,
}

/// Parse a console line. `Ok(None)` for a blank line.
pub fn parse_console_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((command, args)) = parts.split_first() else {
        return Ok(None);
    };

    let parsed = match (*command, args) {
        ("balance", []) => ConsoleCommand::Balance(None),
        ("balance", [address]) => ConsoleCommand::Balance(Some(address.to_string())),
        ("send", [amount, recipient]) => ConsoleCommand::Send {
            amount: amount
                .parse()
                .map_err(|_| format!("Invalid amount: {}", amount))?,
            recipient: recipient.to_string(),
        },
        ("send", _) => return Err("Usage: send AMOUNT RECIPIENT".to_string()),
        ("peers", []) => ConsoleCommand::Peers,
        ("chain", []) => ConsoleCommand::Chain,
        ("status", []) => ConsoleCommand::Status,
        ("disconnect", []) => ConsoleCommand::Disconnect,
        ("reconnect", []) => ConsoleCommand::Reconnect,
        ("help", []) => ConsoleCommand::Help,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        _ => return Err(format!("Unknown command: {}", line.trim())),
    };
    Ok(Some(parsed))
}

const HELP: &str = "Commands:
  balance [ADDRESS]       Balance of this node or ADDRESS
  send AMOUNT RECIPIENT   Transfer AMOUNT to RECIPIENT (host:port or host)
  peers                   Ask the tracker who is online
  chain                   Print the local chain
  status                  Node summary
  disconnect              Leave the network
  reconnect               Rejoin the network
  quit                    Stop the node";

/// CLI handler
pub struct CliHandler;

impl CliHandler {
    pub fn handle(cli: Cli) -> Result<(), String> {
        match cli.command {
            Commands::Tracker { listen } => {
                // One thread: registry state never crosses threads
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| format!("Failed to start runtime: {}", e))?;
                runtime.block_on(Self::run_tracker(TrackerConfig::new(listen)))
            }
            Commands::Node { tracker, listen, host, difficulty } => {
                let mut config = NodeConfig::new(listen, tracker);
                config.advertise_host = host;
                config.consensus.difficulty = difficulty;

                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| format!("Failed to start runtime: {}", e))?;
                runtime.block_on(Self::run_node(config))
            }
        }
    }

    async fn run_tracker(config: TrackerConfig) -> Result<(), String> {
        let tracker = Tracker::bind(&config).await.map_err(|e| e.to_string())?;
        tokio::select! {
            _ = tracker.run() => {}
            result = tokio::signal::ctrl_c() => {
                result.map_err(|e| format!("Failed to wait for Ctrl+C: {}", e))?;
                log::info!("Tracker shutting down");
            }
        }
        Ok(())
    }

    async fn run_node(config: NodeConfig) -> Result<(), String> {
        let node = Node::start(config).await.map_err(|e| e.to_string())?;
        println!("Node running at {}", node.address());
        println!("{}", HELP);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.map_err(|e| format!("Failed to read input: {}", e))?,
                result = tokio::signal::ctrl_c() => {
                    result.map_err(|e| format!("Failed to wait for Ctrl+C: {}", e))?;
                    None
                }
            };
            let Some(line) = line else {
                break;
            };

            match parse_console_line(&line) {
                Ok(Some(ConsoleCommand::Quit)) => break,
                Ok(Some(command)) => {
                    if let Err(e) = Self::execute(&node, command).await {
                        println!("Error: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => println!("{}", e),
            }
        }

        node.shutdown().await;
        Ok(())
    }

    async fn execute(node: &Node, command: ConsoleCommand) -> Result<(), String> {
        match command {
            ConsoleCommand::Balance(address) => {
                let address = address.unwrap_or_else(|| node.address().to_string());
                let balance = node.balance(&address).await.map_err(|e| e.to_string())?;
                println!("Balance for {}: {}", address, balance);
            }
            ConsoleCommand::Send { amount, recipient } => {
                let tx = node
                    .submit_transaction(amount, &recipient)
                    .await
                    .map_err(|e| e.to_string())?;
                println!("Transaction queued: {}", tx);
            }
            ConsoleCommand::Peers => {
                let peers = if node.is_active() {
                    node.request_attendance().await
                } else {
                    println!("Not connected; showing the last known attendance");
                    node.known_peers().await
                };
                println!("Online nodes ({}):", peers.len());
                for peer in peers {
                    let marker = if peer.address() == node.address() { " (this node)" } else { "" };
                    println!("  {}{}", peer.address(), marker);
                }
            }
            ConsoleCommand::Chain => {
                let chain = node.chain().await.map_err(|e| e.to_string())?;
                Self::print_chain(&chain);
            }
            ConsoleCommand::Status => {
                let status = node.status().await.map_err(|e| e.to_string())?;
                println!("Node {}:", status.address);
                println!("  Connected: {}", status.active);
                println!("  Syncing: {}", status.syncing);
                println!("  Chain length: {}", status.chain_length);
                println!("  Pending transactions: {}", status.pending_transactions);
                println!("  Inbound peers: {}", status.inbound_peers);
                for peer in node.inbound_peers().await {
                    let age = peer.connected_at.elapsed().unwrap_or_default();
                    println!("    {} (connected {}s ago)", peer.addr, age.as_secs());
                }
            }
            ConsoleCommand::Disconnect => {
                node.disconnect().await;
                println!("Disconnected from the network");
            }
            ConsoleCommand::Reconnect => {
                node.reconnect().await.map_err(|e| e.to_string())?;
                println!("Reconnected as {}", node.address());
            }
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }

    fn print_chain(chain: &Blockchain) {
        println!("Blockchain ({} blocks, difficulty {}):", chain.len(), chain.difficulty);
        for (height, block) in chain.chain.iter().enumerate() {
            println!("  [{}] {}", height, block.hash());
            println!("      Previous: {}", block.previous_block_hash);
            println!("      Timestamp: {}", block.timestamp);
            println!("      Nonce: {}", block.nonce);
            println!("      Transaction: {}", block.transaction);
            println!("      Reward: {}", block.transaction_reward);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_console_commands() {
        assert_eq!(parse_console_line("   ").unwrap(), None);
        assert_eq!(parse_console_line("balance").unwrap(), Some(ConsoleCommand::Balance(None)));
        assert_eq!(
            parse_console_line("balance 10.0.0.1:7000").unwrap(),
            Some(ConsoleCommand::Balance(Some("10.0.0.1:7000".to_string())))
        );
        assert_eq!(
            parse_console_line("send 12.5 10.0.0.1").unwrap(),
            Some(ConsoleCommand::Send { amount: 12.5, recipient: "10.0.0.1".to_string() })
        );
        assert_eq!(parse_console_line("exit").unwrap(), Some(ConsoleCommand::Quit));
    }

    #[test]
    fn test_parse_console_errors() {
        assert!(parse_console_line("send ten bob").is_err());
        assert!(parse_console_line("send 10").is_err());
        assert!(parse_console_line("peers now").is_err());
        assert!(parse_console_line("mine").is_err());
    }

    #[test]
    fn test_cli_parses_node_args() {
        let cli = Cli::parse_from(["chimchain", "node", "--tracker", "127.0.0.1:50007", "--difficulty", "2"]);
        match cli.command {
            Commands::Node { tracker, listen, host, difficulty } => {
                assert_eq!(tracker.port(), 50007);
                assert_eq!(listen.port(), 0);
                assert_eq!(host, "127.0.0.1");
                assert_eq!(difficulty, 2);
            }
            _ => panic!("Expected node command"),
        }
    }

    #[test]
    fn test_cli_tracker_default_port() {
        let cli = Cli::parse_from(["chimchain", "tracker"]);
        match cli.command {
            Commands::Tracker { listen } => assert_eq!(listen.port(), DEFAULT_TRACKER_PORT),
            _ => panic!("Expected tracker command"),
        }
    }
}
