//! In-process ledger for tests: enforces per-sender nonce order, records
//! broadcasts and serves scripted logs, receipts and failures.

use super::{LedgerClient, LedgerError, LedgerResult, SignedTx};
use async_trait::async_trait;
use ethers::types::{Address, Log, TransactionReceipt, H256, U256, U64};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    chain_id: u64,
    head: u64,
    fee: U256,
    nonces: HashMap<Address, U256>,
    balances: HashMap<Address, U256>,
    sent: Vec<SignedTx>,
    send_failures: VecDeque<LedgerError>,
    fee_failures: VecDeque<LedgerError>,
    log_failures: VecDeque<LedgerError>,
    log_failure_at: Option<(u64, LedgerError)>,
    logs: Vec<Log>,
    receipts: HashMap<H256, TransactionReceipt>,
    log_queries: Vec<(u64, u64)>,
    fee_delay: Option<Duration>,
}

pub struct MockLedger {
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                chain_id: 31337,
                fee: U256::from(1_000_000_000u64),
                ..Default::default()
            }),
        }
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().head = head;
    }

    pub fn set_balance(&self, address: Address, wei: U256) {
        self.state.lock().balances.insert(address, wei);
    }

    /// Simulates transactions sent with this key outside the pool.
    pub fn bump_nonce(&self, address: Address, by: u64) {
        let mut state = self.state.lock();
        let nonce = state.nonces.entry(address).or_default();
        *nonce += U256::from(by);
    }

    pub fn fail_next_send(&self, err: LedgerError) {
        self.state.lock().send_failures.push_back(err);
    }

    pub fn fail_next_fee(&self, err: LedgerError) {
        self.state.lock().fee_failures.push_back(err);
    }

    /// Makes every fee quote take `delay`, holding submissions mid-flight.
    pub fn delay_fees(&self, delay: Duration) {
        self.state.lock().fee_delay = Some(delay);
    }

    pub fn fail_next_logs(&self, err: LedgerError) {
        self.state.lock().log_failures.push_back(err);
    }

    /// Fails the first log query that starts at `from_block`.
    pub fn fail_logs_at(&self, from_block: u64, err: LedgerError) {
        self.state.lock().log_failure_at = Some((from_block, err));
    }

    pub fn push_log(&self, log: Log) {
        self.state.lock().logs.push(log);
    }

    pub fn set_receipt(&self, hash: H256, receipt: TransactionReceipt) {
        self.state.lock().receipts.insert(hash, receipt);
    }

    pub fn sent(&self) -> Vec<SignedTx> {
        self.state.lock().sent.clone()
    }

    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.state.lock().log_queries.clone()
    }

    /// Mined receipt with the given status and logs.
    pub fn receipt(hash: H256, from: Address, status: u64, logs: Vec<Log>) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: hash,
            from,
            status: Some(U64::from(status)),
            block_number: Some(U64::from(1u64)),
            logs,
            ..Default::default()
        }
    }

    /// Builds a mint `Transfer` log from the zero account.
    pub fn mint_log(contract: Address, to: Address, block: u64, tx: u8, index: u64) -> Log {
        Self::transfer_log(contract, Address::zero(), to, block, tx, index)
    }

    pub fn transfer_log(
        contract: Address,
        from: Address,
        to: Address,
        block: u64,
        tx: u8,
        index: u64,
    ) -> Log {
        Log {
            address: contract,
            topics: vec![super::transfer_topic(), H256::from(from), H256::from(to), H256::from_low_u64_be(index)],
            block_number: Some(U64::from(block)),
            transaction_hash: Some(H256::repeat_byte(tx)),
            log_index: Some(U256::from(index)),
            ..Default::default()
        }
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn chain_id(&self) -> LedgerResult<u64> {
        Ok(self.state.lock().chain_id)
    }

    async fn pending_nonce(&self, address: Address) -> LedgerResult<U256> {
        Ok(self.state.lock().nonces.get(&address).copied().unwrap_or_default())
    }

    async fn fee_price(&self) -> LedgerResult<U256> {
        let delay = self.state.lock().fee_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        match state.fee_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(state.fee),
        }
    }

    async fn balance(&self, address: Address) -> LedgerResult<U256> {
        Ok(self.state.lock().balances.get(&address).copied().unwrap_or_default())
    }

    async fn send_transaction(&self, tx: &SignedTx) -> LedgerResult<H256> {
        let mut state = self.state.lock();
        if let Some(err) = state.send_failures.pop_front() {
            return Err(err);
        }

        let expected = state.nonces.get(&tx.from).copied().unwrap_or_default();
        if tx.nonce < expected {
            return Err(LedgerError::classify("nonce too low"));
        }
        if tx.nonce > expected {
            return Err(LedgerError::classify("nonce too high"));
        }

        state.nonces.insert(tx.from, expected + 1);
        state.sent.push(tx.clone());
        Ok(tx.hash)
    }

    async fn receipt(&self, hash: H256) -> LedgerResult<Option<TransactionReceipt>> {
        Ok(self.state.lock().receipts.get(&hash).cloned())
    }

    async fn filter_logs(
        &self,
        contract: Address,
        topic: H256,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<Log>> {
        let mut state = self.state.lock();
        state.log_queries.push((from_block, to_block));
        if let Some(err) = state.log_failures.pop_front() {
            return Err(err);
        }
        if matches!(&state.log_failure_at, Some((at, _)) if *at == from_block) {
            if let Some((_, err)) = state.log_failure_at.take() {
                return Err(err);
            }
        }

        Ok(state
            .logs
            .iter()
            .filter(|log| log.address == contract)
            .filter(|log| log.topics.first() == Some(&topic))
            .filter(|log| {
                let block = log.block_number.map(|b| b.as_u64()).unwrap_or_default();
                block >= from_block && block <= to_block
            })
            .cloned()
            .collect())
    }

    async fn block_height(&self) -> LedgerResult<u64> {
        Ok(self.state.lock().head)
    }
}
