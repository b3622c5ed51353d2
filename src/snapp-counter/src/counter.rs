//! Caller-facing surface of the counter app
//!
//! Reads counter state, submits the four counter actions and streams decoded
//! `CounterChanged` events with running per-reason counts.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::U256;
use futures::{StreamExt, future, stream::BoxStream};
use serde_json::Value;
use starknet_core::types::FunctionCall;
use tracing::{error, info, warn};

use crate::amount::RESET_PAYMENT_AMOUNT;
use crate::bundle::{CallRequest, TransactionBundle};
use crate::calldata::{ScalarOrAddress, decode_outputs};
use crate::change::{COUNTER_CHANGED, ChangeEvent, ReasonCounts};
use crate::classify::ErrorClassifier;
use crate::context::SessionContext;
use crate::embedded_abis::{COUNTER_CONTRACT, STRK};
use crate::error::TxError;
use crate::events::{EventFilter, EventHistoryService, EventPosition, HistoryUpdate};
use crate::network::{ChainAddress, parse_felt};
use crate::provider::{ChainReader, EventLogSource, WalletConnector};
use crate::submission::{TransactionResult, TransactionSubmitter};

/// A user intent against the counter contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAction {
    Increase,
    Decrease,
    /// Costs [`RESET_PAYMENT_AMOUNT`], approved in the same transaction
    Reset,
    /// Owner only
    Set(u64),
}

impl CounterAction {
    pub fn entrypoint(&self) -> &'static str {
        match self {
            Self::Increase => "increase_counter",
            Self::Decrease => "decrease_counter",
            Self::Reset => "reset_counter",
            Self::Set(_) => "set_counter",
        }
    }

    /// Phrase used in failure messages, e.g. "decrease counter"
    pub fn description(&self) -> &'static str {
        match self {
            Self::Increase => "increase counter",
            Self::Decrease => "decrease counter",
            Self::Reset => "reset counter",
            Self::Set(_) => "set counter",
        }
    }

    /// Validates the owner panel's free-text value
    pub fn parse_set_value(input: &str) -> Result<u64, TxError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TxError::invalid_arguments("set_counter", "Please enter a valid number"));
        }
        if input.starts_with('-') {
            return Err(TxError::invalid_arguments(
                "set_counter",
                "Counter value cannot be negative",
            ));
        }
        input
            .parse()
            .map_err(|_| TxError::invalid_arguments("set_counter", "Please enter a valid number"))
    }
}

impl fmt::Display for CounterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set(value) => write!(f, "set counter to {value}"),
            other => write!(f, "{}", other.description()),
        }
    }
}

/// Decoded history with per-reason counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeHistory {
    pub events: Vec<ChangeEvent>,
    pub counts: ReasonCounts,
    /// Raw events whose payload could not be projected
    pub invalid: usize,
    pub error: Option<String>,
}

/// One item of the live change stream
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeUpdate {
    Applied {
        event: ChangeEvent,
        counts: ReasonCounts,
    },
    /// Delivered but not a well-formed `CounterChanged` payload
    Skipped { position: EventPosition },
    FetchFailed { message: String },
}

pub struct CounterClient {
    context: Arc<SessionContext>,
    wallet: Arc<dyn WalletConnector>,
    reader: Arc<dyn ChainReader>,
    history: EventHistoryService,
    submitter: TransactionSubmitter,
}

impl CounterClient {
    pub fn new(
        context: Arc<SessionContext>,
        wallet: Arc<dyn WalletConnector>,
        reader: Arc<dyn ChainReader>,
        events: Arc<dyn EventLogSource>,
    ) -> Self {
        let submitter = TransactionSubmitter::new(Arc::clone(&context), Arc::clone(&wallet));
        Self {
            context,
            wallet,
            reader,
            history: EventHistoryService::new(events),
            submitter,
        }
    }

    /// Replaces the failure classification rules
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.submitter = TransactionSubmitter::with_classifier(
            Arc::clone(&self.context),
            Arc::clone(&self.wallet),
            classifier,
        );
        self
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub async fn counter_value(&self) -> Result<u64, TxError> {
        let outputs = self.read(COUNTER_CONTRACT, "get_counter", vec![]).await?;
        outputs
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| unexpected_output("get_counter", &outputs))
    }

    pub async fn owner(&self) -> Result<ChainAddress, TxError> {
        let outputs = self.read(COUNTER_CONTRACT, "owner", vec![]).await?;
        outputs
            .first()
            .and_then(Value::as_str)
            .and_then(|owner| parse_felt(owner).ok())
            .ok_or_else(|| unexpected_output("owner", &outputs))
    }

    /// STRK balance of `account`, in FRI
    pub async fn strk_balance(&self, account: ChainAddress) -> Result<U256, TxError> {
        let outputs = self
            .read(STRK, "balance_of", vec![ScalarOrAddress::Address(account)])
            .await?;
        outputs
            .first()
            .and_then(Value::as_str)
            .and_then(|balance| balance.parse::<U256>().ok())
            .ok_or_else(|| unexpected_output("balance_of", &outputs))
    }

    /// Whether the connected account owns the counter; false when disconnected
    pub async fn is_owner(&self) -> Result<bool, TxError> {
        let Some(address) = self.wallet.state().connected_address() else {
            return Ok(false);
        };
        Ok(self.owner().await? == address)
    }

    /// Runs the guard and the action's client-side checks, then submits
    pub async fn submit(&self, action: CounterAction) -> TransactionResult {
        let result = self.try_submit(action).await;
        match &result {
            Ok(hash) => info!(%action, transaction_hash = %hash.to_hex_string(), "counter action submitted"),
            Err(err) => warn!(%action, kind = %err.kind(), message = %err.user_message(action.description()), "counter action failed"),
        }
        result
    }

    async fn try_submit(&self, action: CounterAction) -> TransactionResult {
        let wallet = self.wallet.state();
        self.context.guard(COUNTER_CONTRACT, &wallet)?;
        let bundle = self.plan(action).await?;
        self.submitter.submit(&bundle).await
    }

    async fn plan(&self, action: CounterAction) -> Result<TransactionBundle, TxError> {
        let counter_call = |args: Vec<ScalarOrAddress>| {
            self.context
                .build_call(COUNTER_CONTRACT, action.entrypoint(), args)
        };

        match action {
            CounterAction::Increase => Ok(TransactionBundle::single(counter_call(vec![])?)),
            CounterAction::Decrease => {
                if self.counter_value().await? == 0 {
                    return Err(TxError::CounterAtZero);
                }
                Ok(TransactionBundle::single(counter_call(vec![])?))
            }
            CounterAction::Reset => {
                let wallet = self.wallet.state();
                self.context.guard(STRK, &wallet)?;
                let account = wallet
                    .connected_address()
                    .ok_or(TxError::WalletDisconnected)?;

                let balance = self.strk_balance(account).await?;
                if balance < RESET_PAYMENT_AMOUNT {
                    return Err(TxError::InsufficientBalance {
                        required: Some(RESET_PAYMENT_AMOUNT),
                    });
                }
                reset_bundle(&self.context)
            }
            CounterAction::Set(value) => {
                if !self.is_owner().await? {
                    return Err(TxError::NotOwner);
                }
                Ok(TransactionBundle::single(counter_call(vec![value.into()])?))
            }
        }
    }

    /// Decoded `CounterChanged` history from `from_block`
    pub async fn history(&self, from_block: u64) -> Result<ChangeHistory, TxError> {
        let filter = self.change_filter(from_block)?;
        let raw = self.history.fetch(&filter).await;

        let mut history = ChangeHistory {
            error: raw.error,
            ..ChangeHistory::default()
        };
        for event in &raw.events {
            match ChangeEvent::from_raw(event) {
                Some(change) => history.events.push(change),
                None => history.invalid += 1,
            }
        }
        history.counts = history.events.iter().collect();
        Ok(history)
    }

    /// History from `from_block` followed by live changes, with running counts
    pub fn watch(&self, from_block: u64) -> Result<BoxStream<'static, ChangeUpdate>, TxError> {
        let filter = self.change_filter(from_block)?;
        let stream = self
            .history
            .watch(filter)
            .scan(ReasonCounts::default(), |counts, update| {
                let update = match update {
                    HistoryUpdate::Event(raw) => match ChangeEvent::from_raw(&raw) {
                        Some(event) => {
                            counts.record(event.reason);
                            ChangeUpdate::Applied {
                                event,
                                counts: *counts,
                            }
                        }
                        None => ChangeUpdate::Skipped {
                            position: raw.position,
                        },
                    },
                    HistoryUpdate::Error(message) => ChangeUpdate::FetchFailed { message },
                };
                future::ready(Some(update))
            })
            .boxed();
        Ok(stream)
    }

    fn change_filter(&self, from_block: u64) -> Result<EventFilter, TxError> {
        let counter = self
            .context
            .resolve(COUNTER_CONTRACT)
            .ok_or_else(|| TxError::NotDeployed(COUNTER_CONTRACT.to_string()))?;
        Ok(EventFilter::new(counter.address, COUNTER_CHANGED, from_block).with_metadata(true, true))
    }

    async fn read(
        &self,
        contract: &str,
        entrypoint: &str,
        args: Vec<ScalarOrAddress>,
    ) -> Result<Vec<Value>, TxError> {
        let deployment = self
            .context
            .resolve(contract)
            .ok_or_else(|| TxError::NotDeployed(contract.to_string()))?;
        let call = deployment.populate(entrypoint, args)?;

        let felts = self
            .reader
            .call(&FunctionCall::from(&call))
            .await
            .map_err(|err| {
                error!(contract, entrypoint, error = %err, "contract read failed");
                self.submitter.classifier().classify(&err.to_string(), contract)
            })?;

        let function = deployment
            .abi
            .function(entrypoint)
            .map_err(|e| TxError::invalid_arguments(entrypoint, e.to_string()))?;
        decode_outputs(&deployment.abi, function, &felts)
            .map_err(|e| TxError::Unclassified(format!("Failed to decode `{entrypoint}` output: {e}")))
    }
}

/// `[Strk.approve(counter, 1 STRK), CounterContract.reset_counter()]`
pub fn reset_bundle(context: &SessionContext) -> Result<TransactionBundle, TxError> {
    let counter = context
        .resolve(COUNTER_CONTRACT)
        .ok_or_else(|| TxError::NotDeployed(COUNTER_CONTRACT.to_string()))?;
    context.bundle(&[
        CallRequest::new(
            STRK,
            "approve",
            vec![
                ScalarOrAddress::Address(counter.address),
                ScalarOrAddress::Uint(RESET_PAYMENT_AMOUNT),
            ],
        ),
        CallRequest::new(COUNTER_CONTRACT, CounterAction::Reset.entrypoint(), vec![]),
    ])
}

/// The bundle an action submits, without reads or balance checks
pub fn plan_offline(context: &SessionContext, action: CounterAction) -> Result<TransactionBundle, TxError> {
    match action {
        CounterAction::Reset => reset_bundle(context),
        CounterAction::Set(value) => Ok(TransactionBundle::single(context.build_call(
            COUNTER_CONTRACT,
            action.entrypoint(),
            vec![value.into()],
        )?)),
        CounterAction::Increase | CounterAction::Decrease => Ok(TransactionBundle::single(
            context.build_call(COUNTER_CONTRACT, action.entrypoint(), vec![])?,
        )),
    }
}

fn unexpected_output(entrypoint: &str, outputs: &[Value]) -> TxError {
    TxError::Unclassified(format!("Unexpected `{entrypoint}` output: {outputs:?}"))
}
