//! Transaction composition, submission and event decoding for the counter contract
#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod abi;
pub mod amount;
pub mod builder;
pub mod bundle;
pub mod calldata;
pub mod change;
pub mod classify;
pub mod config;
pub mod context;
pub mod counter;
pub mod embedded_abis;
pub mod error;
pub mod events;
pub mod guard;
pub mod network;
pub mod provider;
pub mod reason;
pub mod registry;
pub mod submission;
pub mod test_utils;

pub use builder::{CallDescriptor, build_call};
pub use bundle::{CallRequest, TransactionBundle, bundle_calls};
pub use calldata::ScalarOrAddress;
pub use change::{ChangeEvent, ReasonCounts};
pub use classify::ErrorClassifier;
pub use config::SessionConfig;
pub use context::SessionContext;
pub use counter::{ChangeHistory, ChangeUpdate, CounterAction, CounterClient};
pub use error::{ErrorKind, TxError};
pub use network::{ChainAddress, ChainId, TargetNetwork, TransactionId};
pub use reason::{ReasonVariant, decode_reason};
pub use registry::{ContractRegistry, DeployedContractInfo, StaticContractRegistry};
pub use submission::{TransactionResult, TransactionSubmitter};
