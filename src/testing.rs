// In-memory ChainReader / ResponseSubmitter doubles for unit tests.

use crate::chain::{ChainReader, ResponseSubmitter};
use crate::contracts::ILendingPool;
use crate::error::{ChainError, SubmissionError};
use crate::types::{GasParams, PendingTransaction};
use alloy::eips::BlockId;
use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn hash(n: u8) -> TxHash {
    B256::repeat_byte(n)
}

pub fn addr(n: u8) -> Address {
    Address::repeat_byte(n)
}

pub fn pending_tx(hash: TxHash, to: Option<Address>, input: Bytes, value: U256) -> PendingTransaction {
    PendingTransaction {
        hash,
        from: addr(0xee),
        to,
        input,
        value,
        nonce: 7,
        gas: GasParams {
            gas_limit: 500_000,
            gas_price: None,
            max_fee_per_gas: Some(40_000_000_000),
            max_priority_fee_per_gas: Some(1_000_000_000),
        },
        block_number: None,
    }
}

pub fn liquidate_calldata(collateral: Address, user: Address, debt_to_cover: U256) -> Bytes {
    ILendingPool::liquidateCall {
        collateral,
        user,
        debtToCover: debt_to_cover,
    }
    .abi_encode()
    .into()
}

/// Encoded `getUserAccountData` return with the given total debt.
pub fn account_data_return(total_debt: U256) -> Bytes {
    let ret = ILendingPool::getUserAccountDataReturn {
        totalCollateralETH: U256::from(10u64).pow(U256::from(19u64)),
        totalDebtETH: total_debt,
        availableBorrowsETH: U256::ZERO,
        currentLiquidationThreshold: U256::from(8000u64),
        ltv: U256::from(7500u64),
        healthFactor: U256::from(9u64) * U256::from(10u64).pow(U256::from(17u64)),
    };
    ILendingPool::getUserAccountDataCall::abi_encode_returns(&ret).into()
}

#[derive(Default)]
pub struct MockChainReader {
    txs: Mutex<HashMap<TxHash, Result<PendingTransaction, ChainError>>>,
    call_results: Mutex<HashMap<TxHash, Result<Bytes, ChainError>>>,
    state: Mutex<HashMap<Address, Result<Bytes, ChainError>>>,
    /// Transient fetch failures to serve before the real answer
    flaky_fetches: Mutex<HashMap<TxHash, usize>>,
    call_delay: Duration,
    pub fetches: AtomicUsize,
    pub calls: AtomicUsize,
    pub state_reads: AtomicUsize,
}

impl MockChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tx(self, tx: PendingTransaction) -> Self {
        self.txs.lock().unwrap().insert(tx.hash, Ok(tx));
        self
    }

    pub fn with_fetch_error(self, hash: TxHash, err: ChainError) -> Self {
        self.txs.lock().unwrap().insert(hash, Err(err));
        self
    }

    pub fn with_flaky_fetch(self, hash: TxHash, failures: usize) -> Self {
        self.flaky_fetches.lock().unwrap().insert(hash, failures);
        self
    }

    pub fn with_call_result(self, hash: TxHash, result: Result<Bytes, ChainError>) -> Self {
        self.call_results.lock().unwrap().insert(hash, result);
        self
    }

    /// Serve `getUserAccountData` on `pool` with the given debt.
    pub fn with_debt(self, pool: Address, total_debt: U256) -> Self {
        self.state
            .lock()
            .unwrap()
            .insert(pool, Ok(account_data_return(total_debt)));
        self
    }

    pub fn with_state_error(self, pool: Address, err: ChainError) -> Self {
        self.state.lock().unwrap().insert(pool, Err(err));
        self
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    pub fn chain_accesses(&self) -> usize {
        self.fetches.load(Ordering::SeqCst) + self.calls.load(Ordering::SeqCst) + self.state_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn fetch_transaction(&self, hash: TxHash) -> Result<PendingTransaction, ChainError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        {
            let mut flaky = self.flaky_fetches.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(&hash) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ChainError::Unavailable("flaky node".to_string()));
                }
            }
        }
        self.txs
            .lock()
            .unwrap()
            .get(&hash)
            .cloned()
            .unwrap_or(Err(ChainError::NotFound))
    }

    async fn call(&self, tx: &PendingTransaction, _at: BlockId) -> Result<Bytes, ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        self.call_results
            .lock()
            .unwrap()
            .get(&tx.hash)
            .cloned()
            .unwrap_or_else(|| Ok(Bytes::new()))
    }

    async fn read_contract_state(&self, address: Address, _calldata: Bytes) -> Result<Bytes, ChainError> {
        self.state_reads.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .get(&address)
            .cloned()
            .unwrap_or_else(|| Err(ChainError::Revert(None)))
    }
}

/// Records every payload; serves scripted results, then succeeds.
pub struct MockSubmitter {
    script: Mutex<VecDeque<Result<TxHash, SubmissionError>>>,
    confirmation: Mutex<Result<bool, SubmissionError>>,
    delay: Duration,
    pub payloads: Mutex<Vec<Bytes>>,
    pub submissions: AtomicUsize,
}

impl Default for MockSubmitter {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            confirmation: Mutex::new(Ok(true)),
            delay: Duration::ZERO,
            payloads: Mutex::new(Vec::new()),
            submissions: AtomicUsize::new(0),
        }
    }
}

impl MockSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, result: Result<TxHash, SubmissionError>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    pub fn with_confirmation(self, result: Result<bool, SubmissionError>) -> Self {
        *self.confirmation.lock().unwrap() = result;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResponseSubmitter for MockSubmitter {
    async fn submit(&self, payload: Bytes, _gas_limit: u64) -> Result<TxHash, SubmissionError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(B256::with_last_byte(0x80 | (n as u8 & 0x7f))))
    }

    async fn await_confirmation(&self, _response_tx: TxHash, _timeout: Duration) -> Result<bool, SubmissionError> {
        self.confirmation.lock().unwrap().clone()
    }
}
