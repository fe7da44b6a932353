// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![warn(missing_docs)]
//! # Relayer Utils Module 🕸️
//!
//! Common error types and small utilities shared by every crate of the
//! bridge relayer.

/// A module used for debugging relayer lifecycle, sync state, leader
/// election, or other relayer state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered during the
/// execution of the bridge relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config file parsing error.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    /// Error while parsing the config files, with the offending path.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<toml::de::Error>),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Reqwest error
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWalletError(#[from] ethers::signers::WalletError),
    /// Ethereum signature decoding/recovery errors.
    #[error(transparent)]
    EthersSignature(#[from] ethers::types::SignatureError),
    /// ABI encoding/decoding error.
    #[error(transparent)]
    EthersAbi(#[from] ethers::abi::Error),
    /// Hex decoding error.
    #[error(transparent)]
    FromHex(#[from] hex::FromHexError),

    /// A provided value is outside its accepted domain.
    #[error("invalid value {}", _0)]
    InvalidValue(String),
    /// A required configuration section or key is absent.
    #[error("missing config: {}", _0)]
    MissingConfig(String),
    /// The remote chain client did not make progress or errored.
    #[error("client unavailable: {}", _0)]
    ClientUnavailable(String),
    /// An HTTP request did not finish within its allotted time.
    #[error("request timed out")]
    RequestTimeout,

    /// The gas price oracle has no successfully fetched value yet.
    #[error("latest gas prices were not fetched")]
    LatestGasPricesWereNotFetched,
    /// The fetched gas price exceeds the configured maximum.
    #[error(
        "gas price is higher than the maximum set, maximum value: {maximum}, \
         fetched value: {fetched}, gas price selector: {selector}"
    )]
    GasPriceIsHigherThanTheMaximumSet {
        /// The configured maximum gas price.
        maximum: u64,
        /// The value received from the gas price feed.
        fetched: u64,
        /// The configured gas price selector.
        selector: String,
    },
    /// The configured gas price selector is not one of the accepted values.
    #[error("invalid gas price selector: {:?}", _0)]
    InvalidGasPriceSelector(String),

    /// The multisig contract is paused; no execution may be submitted.
    #[error("multisig contract paused")]
    MultisigContractPaused,
    /// The relayer's native-token balance can not cover the transaction fee.
    #[error("insufficient balance, existing: {existing}, required: {required}")]
    InsufficientBalance {
        /// The relayer's current balance.
        existing: String,
        /// The minimum balance required for the fee.
        required: String,
    },
    /// The safe's ERC20 balance can not cover the batch value.
    #[error(
        "insufficient ERC20 balance, existing: {existing}, required: {required} \
         for ERC20 token {token}"
    )]
    InsufficientErc20Balance {
        /// The safe's current token balance.
        existing: String,
        /// The cumulated batch value for the token.
        required: String,
        /// The token address.
        token: String,
    },
    /// The deposits count declared by the batch header does not match the
    /// number of deposits fetched.
    #[error(
        "deposits and batch deposits count differ, batch deposits count: \
         {declared}, fetched deposits len: {fetched}"
    )]
    DepositsAndBatchDepositsCountDiffer {
        /// The count declared by the batch header.
        declared: u64,
        /// The number of deposits actually returned.
        fetched: u64,
    },
    /// The queried statuses are not final yet on the remote chain.
    #[error("status is not final")]
    StatusIsNotFinal,
    /// Fewer signatures are available than the required quorum.
    #[error("quorum not reached, num signatures: {num_signatures}, quorum: {quorum}")]
    QuorumNotReached {
        /// The number of signatures currently held.
        num_signatures: usize,
        /// The required quorum.
        quorum: usize,
    },

    /// The provided address bytes do not form a valid chain-native address.
    #[error("invalid address bytes: {}", _0)]
    InvalidAddressBytes(String),
    /// The recovered signer address is not part of the relayer whitelist.
    #[error("address is not whitelisted: {}", _0)]
    AddressIsNotWhitelisted(String),
    /// The signature does not verify against the message hash.
    #[error("invalid signature")]
    InvalidSignature,
    /// The public key could not be cast into the expected representation.
    #[error("error casting public key")]
    PublicKeyCast,

    /// The call-data buffer ended before the protocol marker.
    #[error("buffer too short for protocol marker")]
    BufferTooShortForMarker,
    /// The call-data buffer ended inside a length prefix.
    #[error("buffer too short while extracting the length")]
    BufferTooShortForLength,
    /// The call-data buffer ended inside a string payload.
    #[error("buffer too short while extracting the string data")]
    BufferTooShortForString,
    /// The call-data buffer ended inside the gas limit field.
    #[error("buffer too short for gas limit")]
    BufferTooShortForGasLimit,
    /// The call-data buffer ended inside the arguments count field.
    #[error("buffer too short for num arguments length")]
    BufferTooShortForNumArgs,
    /// The call-data protocol marker is neither 0x00 nor 0x01.
    #[error("unexpected protocol marker: {}", _0)]
    UnexpectedMarker(u8),

    /// The token setup makes the transfer impossible to reconcile.
    #[error("invalid setup: {}", _0)]
    InvalidSetup(String),
    /// A deposit nonce is not consecutive with the last executed one.
    #[error("invalid deposit nonce for deposit {deposit}, expected: {expected}")]
    InvalidDepositNonce {
        /// A displayable rendering of the offending deposit.
        deposit: String,
        /// The nonce that was expected at this position.
        expected: u64,
    },
    /// An executor verb was invoked with no batch in the working set.
    #[error("no batch stored")]
    NoStoredBatch,
    /// The requested batch could not be found on the source chain.
    #[error(
        "batch not found, requested nonce: {requested}, fetched nonce: \
         {fetched}, num deposits: {num_deposits}"
    )]
    BatchNotFound {
        /// The nonce the relayer asked for.
        requested: u64,
        /// The nonce the chain answered with.
        fetched: u64,
        /// The number of deposits in the answer.
        num_deposits: usize,
    },

    /// Two steps registered under the same identifier.
    #[error("duplicated step identifier: {}", _0)]
    DuplicatedStepIdentifier(String),
    /// A step referenced an identifier missing from the step table.
    #[error("step not found for identifier '{}'", _0)]
    StepNotFound(String),

    /// A peer message was dropped by the antiflood quotas.
    #[error("system busy: message dropped for peer {}", _0)]
    SystemBusy(String),
    /// A peer message carried an already-seen nonce.
    #[error("nonce too low in received message")]
    NonceTooLowInReceivedMessage,
    /// The sender of a peer message is not whitelisted.
    #[error("peer not whitelisted: {}", _0)]
    PeerNotWhitelisted(String),

    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
}

impl Error {
    /// Returns `true` if the error makes the current batch unsafe to
    /// progress: the state machine routes such batches to the
    /// status-report phase with every deposit rejected instead of
    /// retrying.
    pub fn rejects_batch(&self) -> bool {
        matches!(
            self,
            Error::MultisigContractPaused
                | Error::InsufficientBalance { .. }
                | Error::InsufficientErc20Balance { .. }
        )
    }
}

/// A type alias for the result for the bridge relayer, that uses the
/// [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;
