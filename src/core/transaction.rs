// Transaction value object

use serde::{Deserialize, Serialize};
use std::fmt;

/// A transfer of `amount` from `payer` to `payee`.
///
/// Addresses are node addresses (`host:port`). Amount validity is checked by
/// whoever creates the transaction, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub amount: f64,
    pub payer: String,
    pub payee: String,
}

impl Transaction {
    pub fn new(amount: f64, payer: impl Into<String>, payee: impl Into<String>) -> Self {
        Self {
            amount,
            payer: payer.into(),
            payee: payee.into(),
        }
    }

    /// Reward paid by this transaction's payer to the miner that includes it
    pub fn reward(&self, miner: &str, rate: f64) -> Transaction {
        Transaction::new(self.amount * rate, self.payer.clone(), miner)
    }

    /// Signed effect of this transaction on `address`. The payer side is
    /// checked first, so a self-payment counts as a debit.
    pub fn delta_for(&self, address: &str) -> f64 {
        if self.payer == address {
            -self.amount
        } else if self.payee == address {
            self.amount
        } else {
            0.0
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Amount={}, Payer={}, Payee={}", self.amount, self.payer, self.payee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_derivation() {
        let tx = Transaction::new(100.0, "10.0.0.1:5000", "10.0.0.2:5000");
        let reward = tx.reward("10.0.0.3:5000", 0.1);

        assert_eq!(reward.amount, 10.0);
        assert_eq!(reward.payer, "10.0.0.1:5000");
        assert_eq!(reward.payee, "10.0.0.3:5000");
    }

    #[test]
    fn test_delta_for() {
        let tx = Transaction::new(25.0, "a", "b");
        assert_eq!(tx.delta_for("a"), -25.0);
        assert_eq!(tx.delta_for("b"), 25.0);
        assert_eq!(tx.delta_for("c"), 0.0);

        let self_payment = Transaction::new(5.0, "a", "a");
        assert_eq!(self_payment.delta_for("a"), -5.0);
    }

    #[test]
    fn test_wire_shape() {
        let tx = Transaction::new(1.5, "a", "b");
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value, serde_json::json!({"amount": 1.5, "payer": "a", "payee": "b"}));
    }
}
