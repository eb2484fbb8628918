// Mining worker - drains the mempool into blocks

use crate::consensus::Miner;
use crate::core::Transaction;
use crate::network::{Message, Node};
use crate::storage::MempoolReceiver;
use std::sync::atomic::Ordering;

/// Rounds of mining one transaction before it is dropped
const MAX_MINING_ROUNDS: usize = 8;

/// Mine queued transactions one at a time until the node's stop flag is set
pub(crate) async fn run(node: Node, mut mempool: MempoolReceiver) {
    let stop = node.stop_flag();
    let miner = Miner::with_stop_flag(node.consensus().difficulty, stop.clone());
    log::info!("Miner started for {} (difficulty {})", node.address(), miner.difficulty);

    while !stop.load(Ordering::SeqCst) {
        let transaction = match tokio::time::timeout(node.mempool_poll(), mempool.recv()).await {
            Ok(Some(transaction)) => transaction,
            Ok(None) => break,
            Err(_) => continue,
        };
        mine_transaction(&node, &miner, transaction).await;
    }

    log::info!("Miner stopped for {}", node.address());
}

/// Seal `transaction` into a block on the current tail. A block that lost
/// the race against a received chain is mined again on the new tail, up to
/// [`MAX_MINING_ROUNDS`] times.
async fn mine_transaction(node: &Node, miner: &Miner, transaction: Transaction) {
    let chain = node.chain_handle();
    let reward_rate = node.consensus().reward_rate;
    log::info!("Mining transaction {}", transaction);

    for round in 1..=MAX_MINING_ROUNDS {
        let block = match chain.prepare_block(transaction.clone(), node.address(), reward_rate).await {
            Ok(block) => block,
            Err(e) => {
                log::error!("{}", e);
                return;
            }
        };

        let worker = miner.clone();
        let mined = tokio::task::spawn_blocking(move || {
            let mut block = block;
            let result = worker.mine(&mut block);
            (block, result)
        })
        .await;
        let (block, result) = match mined {
            Ok(mined) => mined,
            Err(e) => {
                log::error!("Mining task failed: {}", e);
                return;
            }
        };

        if !result.success {
            log::info!("Mining abandoned after {} attempts", result.attempts);
            return;
        }
        log::info!(
            "Block mined: nonce {} hash {} ({} attempts, {:.1} KH/s)",
            result.nonce,
            result.hash,
            result.attempts,
            result.hash_rate() / 1000.0
        );

        match chain.commit_block(block, result.hash).await {
            Ok(Ok(Some(snapshot))) => {
                let peers = node.request_attendance().await;
                let report = node.broadcast(&peers, &Message::UpdatedBlockchain(snapshot)).await;
                log::info!("Blockchain broadcast to {} peers ({} failed)", report.delivered, report.failed);
                match node.own_balance().await {
                    Ok(balance) => log::info!("Balance of {}: {}", node.address(), balance),
                    Err(e) => log::error!("{}", e),
                }
                return;
            }
            Ok(Ok(None)) => {
                log::info!("Chain sync in progress; block kept locally without broadcast");
                return;
            }
            Ok(Err(e)) => {
                log::warn!(
                    "Mined block rejected ({}); round {}/{} on the new tail",
                    e,
                    round,
                    MAX_MINING_ROUNDS
                );
            }
            Err(e) => {
                log::error!("{}", e);
                return;
            }
        }
    }

    log::error!("Dropping transaction {} after {} rejected blocks", transaction, MAX_MINING_ROUNDS);
}
