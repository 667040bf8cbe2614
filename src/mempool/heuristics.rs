//! Heuristic Engine
//!
//! Purpose:
//!     Pure classification of pending transactions as benign or suspicious.
//!     No I/O; same transaction in, same verdict out.
//!
//! Created: 2026-10-07
//!
//! Rules (evaluated in order, all of them, every time):
//!     known-target-liquidation — call to a watch-set pool whose payload decodes as liquidate
//!     large-value              — transferred value >= threshold (inclusive)
//!
//! The verdict reason is every firing rule name joined by '+'; the extracted
//! call is the first firing rule's decode.

use super::decoder::decode_liquidate;
use crate::config::SentinelConfig;
use crate::types::{DecodedCall, PendingTransaction, Verdict};
use alloy::primitives::{Address, U256};
use std::collections::HashSet;

pub const KNOWN_TARGET_LIQUIDATION: &str = "known-target-liquidation";
pub const LARGE_VALUE: &str = "large-value";

pub trait HeuristicRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Some(call) when the rule fires.
    fn evaluate(&self, tx: &PendingTransaction) -> Option<DecodedCall>;
}

pub struct KnownTargetRule {
    watch_set: HashSet<Address>,
}

impl KnownTargetRule {
    pub fn new(watch_set: HashSet<Address>) -> Self {
        Self { watch_set }
    }
}

impl HeuristicRule for KnownTargetRule {
    fn name(&self) -> &'static str {
        KNOWN_TARGET_LIQUIDATION
    }

    fn evaluate(&self, tx: &PendingTransaction) -> Option<DecodedCall> {
        let to = tx.to?;
        if !self.watch_set.contains(&to) {
            return None;
        }
        decode_liquidate(&tx.input)
    }
}

pub struct LargeValueRule {
    threshold: U256,
}

impl LargeValueRule {
    pub fn new(threshold: U256) -> Self {
        Self { threshold }
    }
}

impl HeuristicRule for LargeValueRule {
    fn name(&self) -> &'static str {
        LARGE_VALUE
    }

    fn evaluate(&self, tx: &PendingTransaction) -> Option<DecodedCall> {
        (tx.value >= self.threshold).then_some(DecodedCall::LargeValueTransfer { value: tx.value })
    }
}

pub struct HeuristicEngine {
    rules: Vec<Box<dyn HeuristicRule>>,
}

impl HeuristicEngine {
    pub fn new(rules: Vec<Box<dyn HeuristicRule>>) -> Self {
        Self { rules }
    }

    /// Known-target liquidation first, then large-value.
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self::new(vec![
            Box::new(KnownTargetRule::new(config.lending_pools.iter().copied().collect())),
            Box::new(LargeValueRule::new(config.value_threshold)),
        ])
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn evaluate(&self, tx: &PendingTransaction) -> Verdict {
        let mut fired: Vec<&'static str> = Vec::new();
        let mut extracted: Option<DecodedCall> = None;

        for rule in &self.rules {
            if let Some(call) = rule.evaluate(tx) {
                fired.push(rule.name());
                extracted.get_or_insert(call);
            }
        }

        match extracted {
            Some(extracted) => Verdict::Suspicious {
                reason: fired.join("+"),
                extracted,
            },
            None => Verdict::Benign,
        }
    }
}
