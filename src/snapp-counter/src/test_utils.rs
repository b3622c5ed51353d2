//! In-memory collaborators for tests
//!
//! [`MockChain`] runs a small model of the counter contract and the STRK token
//! and serves reads and events. [`MockWallet`] records every bundle it is
//! asked to broadcast and, when attached to a chain, executes it there.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy_primitives::U256;
use async_trait::async_trait;
use futures::{
    StreamExt,
    channel::mpsc,
    stream::BoxStream,
};
use starknet_core::{
    types::{Felt, FunctionCall},
    utils::get_selector_from_name,
};

use crate::abi::Abi;
use crate::amount::RESET_PAYMENT_AMOUNT;
use crate::bundle::TransactionBundle;
use crate::calldata::{decode_event, felt_to_u256, split_u256};
use crate::change::COUNTER_CHANGED;
use crate::embedded_abis::COUNTER_CONTRACT_ABI;
use crate::events::{BlockMeta, EventFilter, EventPosition, RawEvent, TransactionMeta};
use crate::network::{ChainAddress, ChainId, TransactionId};
use crate::provider::{
    ChainReader, EventLogSource, ProviderError, WalletConnector, WalletError, WalletState,
    WalletStatus,
};
use crate::reason::ReasonVariant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn selector(name: &str) -> Felt {
    get_selector_from_name(name).unwrap_or_default()
}

#[derive(Debug, Clone)]
struct ChainState {
    counter: u32,
    owner: ChainAddress,
    balances: HashMap<ChainAddress, U256>,
    allowances: HashMap<(ChainAddress, ChainAddress), U256>,
    block_number: u64,
    events: Vec<RawEvent>,
}

/// Counter contract plus STRK token, executed in memory
pub struct MockChain {
    counter_address: ChainAddress,
    strk_address: ChainAddress,
    abi: Abi,
    state: Mutex<ChainState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Result<RawEvent, ProviderError>>>>,
    query_failures: Mutex<VecDeque<ProviderError>>,
    call_failures: Mutex<VecDeque<ProviderError>>,
}

impl MockChain {
    pub fn new(counter_address: ChainAddress, strk_address: ChainAddress, owner: ChainAddress) -> Self {
        Self {
            counter_address,
            strk_address,
            abi: Abi::from_json(COUNTER_CONTRACT_ABI).unwrap_or_default(),
            state: Mutex::new(ChainState {
                counter: 0,
                owner,
                balances: HashMap::new(),
                allowances: HashMap::new(),
                block_number: 0,
                events: Vec::new(),
            }),
            subscribers: Mutex::new(Vec::new()),
            query_failures: Mutex::new(VecDeque::new()),
            call_failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn counter_address(&self) -> ChainAddress {
        self.counter_address
    }

    pub fn strk_address(&self) -> ChainAddress {
        self.strk_address
    }

    pub fn counter(&self) -> u32 {
        lock(&self.state).counter
    }

    pub fn set_counter_value(&self, value: u32) {
        lock(&self.state).counter = value;
    }

    pub fn set_balance(&self, account: ChainAddress, amount: U256) {
        lock(&self.state).balances.insert(account, amount);
    }

    pub fn balance(&self, account: ChainAddress) -> U256 {
        lock(&self.state).balances.get(&account).copied().unwrap_or_default()
    }

    pub fn block_number(&self) -> u64 {
        lock(&self.state).block_number
    }

    /// Every event emitted so far, in order
    pub fn events(&self) -> Vec<RawEvent> {
        lock(&self.state).events.clone()
    }

    /// The next event query fails with `error`
    pub fn fail_next_query(&self, error: ProviderError) {
        lock(&self.query_failures).push_back(error);
    }

    /// The next read call fails with `error`
    pub fn fail_next_call(&self, error: ProviderError) {
        lock(&self.call_failures).push_back(error);
    }

    /// Delivers `event` to live subscribers without recording it
    pub fn announce(&self, event: RawEvent) {
        lock(&self.subscribers).retain(|sender| sender.unbounded_send(Ok(event.clone())).is_ok());
    }

    /// Closes every live subscription
    pub fn close_subscriptions(&self) {
        lock(&self.subscribers).clear();
    }

    /// Executes every call of `bundle` from `sender` atomically
    ///
    /// On failure nothing is applied and the revert message is returned.
    pub fn execute(&self, sender: ChainAddress, bundle: &TransactionBundle) -> Result<TransactionId, String> {
        let mut state = lock(&self.state);
        let mut next = state.clone();
        next.block_number += 1;

        let transaction_hash = Felt::from(next.block_number) + Felt::from(0x7000u32);
        let mut emitted = Vec::new();
        for call in bundle.calls() {
            if let Some((old_value, new_value, reason)) =
                self.apply(&mut next, sender, call.target, call.selector, &call.calldata)?
            {
                let position = EventPosition {
                    block_number: next.block_number,
                    event_index: emitted.len() as u64,
                };
                emitted.push(self.change_event(
                    position,
                    transaction_hash,
                    sender,
                    old_value,
                    new_value,
                    reason,
                )?);
            }
        }

        next.events.extend(emitted.iter().cloned());
        *state = next;
        drop(state);

        for event in emitted {
            self.announce(event);
        }
        Ok(transaction_hash)
    }

    fn apply(
        &self,
        state: &mut ChainState,
        sender: ChainAddress,
        target: ChainAddress,
        entrypoint: Felt,
        calldata: &[Felt],
    ) -> Result<Option<(u32, u32, ReasonVariant)>, String> {
        if target == self.strk_address {
            if entrypoint != selector("approve") {
                return Err("Entry point not found in contract".to_string());
            }
            let [spender, low, high] = calldata else {
                return Err("Failed to deserialize param #1".to_string());
            };
            let amount = felt_to_u256(high) << 128 | felt_to_u256(low);
            state.allowances.insert((sender, *spender), amount);
            return Ok(None);
        }

        if target != self.counter_address {
            return Err(format!("Contract not found: {}", target.to_hex_string()));
        }

        let old_value = state.counter;
        let (new_value, reason) = if entrypoint == selector("increase_counter") {
            (old_value + 1, ReasonVariant::Increase)
        } else if entrypoint == selector("decrease_counter") {
            let Some(value) = old_value.checked_sub(1) else {
                return Err("Transaction execution has failed: 'Counter cannot be less than 0'".to_string());
            };
            (value, ReasonVariant::Decrease)
        } else if entrypoint == selector("reset_counter") {
            let allowance = state
                .allowances
                .get(&(sender, self.counter_address))
                .copied()
                .unwrap_or_default();
            let balance = state.balances.get(&sender).copied().unwrap_or_default();
            if allowance < RESET_PAYMENT_AMOUNT {
                return Err("ERC20: insufficient allowance".to_string());
            }
            if balance < RESET_PAYMENT_AMOUNT {
                return Err("ERC20: transfer amount exceeds balance".to_string());
            }
            state.balances.insert(sender, balance - RESET_PAYMENT_AMOUNT);
            let owner = state.owner;
            *state.balances.entry(owner).or_default() += RESET_PAYMENT_AMOUNT;
            state
                .allowances
                .insert((sender, self.counter_address), allowance - RESET_PAYMENT_AMOUNT);
            (0, ReasonVariant::Reset)
        } else if entrypoint == selector("set_counter") {
            if sender != state.owner {
                return Err("Caller is not the owner".to_string());
            }
            let [value] = calldata else {
                return Err("Failed to deserialize param #1".to_string());
            };
            let value = u32::try_from(felt_to_u256(value).as_limbs()[0])
                .map_err(|_| "Failed to deserialize param #1".to_string())?;
            (value, ReasonVariant::Set)
        } else {
            return Err("Entry point not found in contract".to_string());
        };

        state.counter = new_value;
        Ok(Some((old_value, new_value, reason)))
    }

    fn change_event(
        &self,
        position: EventPosition,
        transaction_hash: TransactionId,
        caller: ChainAddress,
        old_value: u32,
        new_value: u32,
        reason: ReasonVariant,
    ) -> Result<RawEvent, String> {
        let reason_index: u8 = match reason {
            ReasonVariant::Increase => 0,
            ReasonVariant::Decrease => 1,
            ReasonVariant::Reset => 2,
            ReasonVariant::Set | ReasonVariant::Unknown => 3,
        };
        let keys = [selector(COUNTER_CHANGED), caller];
        let data = [
            Felt::from(old_value),
            Felt::from(new_value),
            Felt::from(reason_index),
        ];
        let parsed_args =
            decode_event(&self.abi, COUNTER_CHANGED, &keys, &data).map_err(|e| e.to_string())?;

        Ok(RawEvent {
            position,
            transaction_hash: Some(transaction_hash),
            block: Some(BlockMeta {
                block_number: position.block_number,
                block_hash: Felt::from(position.block_number) + Felt::from(0xb000u32),
                timestamp: 1_700_000_000 + position.block_number,
            }),
            transaction: Some(TransactionMeta {
                transaction_hash,
                sender_address: Some(caller),
            }),
            parsed_args,
        })
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn call(&self, request: &FunctionCall) -> Result<Vec<Felt>, ProviderError> {
        if let Some(error) = lock(&self.call_failures).pop_front() {
            return Err(error);
        }

        let state = lock(&self.state);
        let entrypoint = request.entry_point_selector;
        if request.contract_address == self.counter_address {
            if entrypoint == selector("get_counter") {
                return Ok(vec![Felt::from(state.counter)]);
            }
            if entrypoint == selector("owner") {
                return Ok(vec![state.owner]);
            }
        } else if request.contract_address == self.strk_address {
            if entrypoint == selector("balance_of") {
                let [account] = request.calldata.as_slice() else {
                    return Err(ProviderError::Rpc("Failed to deserialize param #1".to_string()));
                };
                let balance = state.balances.get(account).copied().unwrap_or_default();
                let (low, high) = split_u256(balance);
                return Ok(vec![low, high]);
            }
        } else {
            return Err(ProviderError::Rpc("Contract not found".to_string()));
        }
        Err(ProviderError::Rpc("Entry point not found in contract".to_string()))
    }
}

#[async_trait]
impl EventLogSource for MockChain {
    async fn query(&self, filter: &EventFilter) -> Result<Vec<RawEvent>, ProviderError> {
        if let Some(error) = lock(&self.query_failures).pop_front() {
            return Err(error);
        }
        if filter.address != self.counter_address || filter.event_name != COUNTER_CHANGED {
            return Ok(Vec::new());
        }
        Ok(lock(&self.state)
            .events
            .iter()
            .filter(|event| event.position.block_number >= filter.from_block)
            .cloned()
            .collect())
    }

    fn subscribe(&self, _filter: &EventFilter) -> BoxStream<'static, Result<RawEvent, ProviderError>> {
        let (sender, receiver) = mpsc::unbounded();
        lock(&self.subscribers).push(sender);
        receiver.boxed()
    }
}

/// Wallet with scripted connection state and failures
pub struct MockWallet {
    state: Mutex<WalletState>,
    failures: Mutex<VecDeque<WalletError>>,
    broadcasts: Mutex<Vec<TransactionBundle>>,
    chain: Option<Arc<MockChain>>,
}

impl MockWallet {
    pub fn new(state: WalletState) -> Self {
        Self {
            state: Mutex::new(state),
            failures: Mutex::new(VecDeque::new()),
            broadcasts: Mutex::new(Vec::new()),
            chain: None,
        }
    }

    pub fn connected(address: ChainAddress, chain_id: ChainId) -> Self {
        Self::new(WalletState::connected(address, chain_id))
    }

    /// Executes broadcast bundles on `chain`
    pub fn with_chain(mut self, chain: Arc<MockChain>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn set_state(&self, state: WalletState) {
        *lock(&self.state) = state;
    }

    /// The next broadcast fails with `error`
    pub fn fail_next(&self, error: WalletError) {
        lock(&self.failures).push_back(error);
    }

    /// Every bundle handed to the wallet, including failed ones
    pub fn broadcasts(&self) -> Vec<TransactionBundle> {
        lock(&self.broadcasts).clone()
    }

    pub fn broadcast_count(&self) -> usize {
        lock(&self.broadcasts).len()
    }
}

#[async_trait]
impl WalletConnector for MockWallet {
    fn state(&self) -> WalletState {
        *lock(&self.state)
    }

    async fn sign_and_broadcast(&self, bundle: &TransactionBundle) -> Result<TransactionId, WalletError> {
        let state = self.state();
        let (WalletStatus::Connected, Some(sender)) = (state.status, state.address) else {
            return Err(WalletError::NotConnected);
        };

        lock(&self.broadcasts).push(bundle.clone());
        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }

        match &self.chain {
            Some(chain) => chain.execute(sender, bundle).map_err(WalletError::Failed),
            None => Ok(Felt::from(0x7000u32 + self.broadcast_count() as u32)),
        }
    }
}
