//! Error types for the Custodia settlement engine.
//!
//! All errors use the `CD_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Deposit errors
//! - 2xx: Balance / ledger errors
//! - 3xx: Escrow errors
//! - 4xx: Withdrawal errors
//! - 5xx: Sweep errors
//! - 6xx: External client errors
//! - 7xx: Key vault errors
//! - 8xx: Configuration errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    Coin, DepositId, DepositStatus, EntryId, EntryStatus, EscrowStatus, HoldingId, TxHash,
    WithdrawalId, WithdrawalStatus,
};

/// Central error enum for all Custodia operations.
#[derive(Debug, Error)]
pub enum CustodiaError {
    // =================================================================
    // Deposit Errors (1xx)
    // =================================================================
    /// The requested deposit request was not found.
    #[error("CD_ERR_100: Deposit request not found: {0}")]
    DepositNotFound(DepositId),

    /// A user may hold at most one active deposit request per coin.
    #[error("CD_ERR_101: User already has an active deposit request for {coin}")]
    ActiveDepositExists { coin: Coin },

    /// The deposit request is not in the status the transition requires.
    #[error("CD_ERR_102: Deposit status conflict: expected {expected}, got {actual}")]
    DepositStatusConflict {
        expected: DepositStatus,
        actual: DepositStatus,
    },

    // =================================================================
    // Balance / Ledger Errors (2xx)
    // =================================================================
    /// Not enough available balance to perform the operation.
    #[error("CD_ERR_200: Insufficient available balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// A ledger entry with this external transaction hash already exists.
    /// This is the system-wide exactly-once guard for on-chain credits.
    #[error("CD_ERR_201: Transaction already recorded in ledger: {0}")]
    DuplicateTransaction(TxHash),

    /// The referenced ledger entry was not found.
    #[error("CD_ERR_202: Ledger entry not found: {0}")]
    EntryNotFound(EntryId),

    /// The ledger entry is not in the status the transition requires.
    #[error("CD_ERR_203: Ledger entry status conflict: expected {expected}, got {actual}")]
    EntryStatusConflict {
        expected: EntryStatus,
        actual: EntryStatus,
    },

    // =================================================================
    // Escrow Errors (3xx)
    // =================================================================
    /// The requested escrow holding was not found.
    #[error("CD_ERR_300: Escrow holding not found: {0}")]
    HoldingNotFound(HoldingId),

    /// Release and refund are mutually exclusive: the holding already left
    /// the `held` state.
    #[error("CD_ERR_301: Escrow status conflict: expected {expected}, got {actual}")]
    HoldingStatusConflict {
        expected: EscrowStatus,
        actual: EscrowStatus,
    },

    /// The fee/seller split does not add back up to the gross amount.
    #[error("CD_ERR_302: Escrow split mismatch: total {total}, seller {seller} + fee {fee}")]
    SplitMismatch {
        total: Decimal,
        seller: Decimal,
        fee: Decimal,
    },

    // =================================================================
    // Withdrawal Errors (4xx)
    // =================================================================
    /// The requested withdrawal was not found.
    #[error("CD_ERR_400: Withdrawal request not found: {0}")]
    WithdrawalNotFound(WithdrawalId),

    /// The requested fiat amount is below the coin's configured minimum.
    #[error("CD_ERR_401: Withdrawal below minimum for {coin}: requested {requested}, minimum {minimum}")]
    BelowMinimumWithdrawal {
        coin: Coin,
        requested: Decimal,
        minimum: Decimal,
    },

    /// The destination address is not a valid address for the coin.
    #[error("CD_ERR_402: Invalid {coin} address: {reason}")]
    InvalidAddress { coin: Coin, reason: String },

    /// Platform withdrawal velocity limits were exceeded.
    #[error("CD_ERR_403: Withdrawal limit exceeded: {reason}")]
    WithdrawalLimitExceeded { reason: String },

    /// The shared pool's live on-chain balance cannot cover the payout.
    /// High-severity operational alert — the platform is short on liquidity.
    #[error("CD_ERR_404: Insufficient pool liquidity for {coin}: need {needed}, pool has {available}")]
    InsufficientPoolLiquidity {
        coin: Coin,
        needed: Decimal,
        available: Decimal,
    },

    /// The withdrawal is not in the status the transition requires.
    #[error("CD_ERR_405: Withdrawal status conflict: expected {expected}, got {actual}")]
    WithdrawalStatusConflict {
        expected: WithdrawalStatus,
        actual: WithdrawalStatus,
    },

    // =================================================================
    // Sweep Errors (5xx)
    // =================================================================
    /// The deposit address was not found in the address book.
    #[error("CD_ERR_500: Deposit address not found: {0}")]
    AddressNotFound(String),

    /// The deposit address has already been swept.
    #[error("CD_ERR_501: Address already swept: {0}")]
    AlreadySwept(String),

    // =================================================================
    // External Client Errors (6xx)
    // =================================================================
    /// The price oracle is unreachable or returned an error.
    #[error("CD_ERR_600: Price oracle unavailable: {reason}")]
    OracleUnavailable { reason: String },

    /// The chain data client is unreachable or returned an error.
    #[error("CD_ERR_601: Chain data unavailable: {reason}")]
    ChainUnavailable { reason: String },

    /// The broadcast vendor rejected the transaction.
    #[error("CD_ERR_602: Broadcast rejected: {reason}")]
    BroadcastRejected { reason: String },

    /// Chain data could not be parsed into the expected shape.
    #[error("CD_ERR_603: Malformed chain data: {reason}")]
    MalformedChainData { reason: String },

    // =================================================================
    // Key Vault Errors (7xx)
    // =================================================================
    /// Encrypting a custodial key failed.
    #[error("CD_ERR_700: Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decrypting a custodial key failed (wrong key or corrupted data).
    #[error("CD_ERR_701: Decryption failed: {0}")]
    DecryptionFailed(String),

    /// The stored ciphertext is structurally invalid.
    #[error("CD_ERR_702: Malformed ciphertext: {reason}")]
    MalformedCiphertext { reason: String },

    // =================================================================
    // Configuration Errors (8xx)
    // =================================================================
    /// Configuration error (missing fields, invalid values, etc.).
    /// Fatal for the whole job pass.
    #[error("CD_ERR_800: Configuration error: {0}")]
    Configuration(String),

    /// No pool address is configured for the coin. Fatal for the job pass.
    #[error("CD_ERR_801: No pool address configured for {0}")]
    PoolNotConfigured(Coin),

    /// The coin string is not one the platform settles.
    #[error("CD_ERR_802: Unsupported coin: {0}")]
    UnsupportedCoin(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CD_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CD_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// I/O error (disk, network).
    #[error("CD_ERR_902: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, CustodiaError>;

// Conversion from std::io::Error
impl From<std::io::Error> for CustodiaError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = CustodiaError::DepositNotFound(DepositId::new());
        let msg = format!("{err}");
        assert!(msg.starts_with("CD_ERR_100"), "Got: {msg}");
    }

    #[test]
    fn insufficient_balance_display() {
        let err = CustodiaError::InsufficientBalance {
            needed: Decimal::new(100, 0),
            available: Decimal::new(50, 0),
        };
        let msg = format!("{err}");
        assert!(msg.contains("CD_ERR_200"));
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn duplicate_transaction_names_the_hash() {
        let err = CustodiaError::DuplicateTransaction(TxHash::new("cafebabe"));
        let msg = format!("{err}");
        assert!(msg.contains("CD_ERR_201"));
        assert!(msg.contains("cafebabe"));
    }

    #[test]
    fn all_errors_have_cd_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(CustodiaError::ActiveDepositExists { coin: Coin::Btc }),
            Box::new(CustodiaError::HoldingNotFound(HoldingId::new())),
            Box::new(CustodiaError::PoolNotConfigured(Coin::Xmr)),
            Box::new(CustodiaError::DecryptionFailed("test".into())),
            Box::new(CustodiaError::Internal("test".into())),
            Box::new(CustodiaError::InsufficientPoolLiquidity {
                coin: Coin::Ltc,
                needed: Decimal::ONE,
                available: Decimal::ZERO,
            }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("CD_ERR_"),
                "Error missing CD_ERR_ prefix: {msg}"
            );
        }
    }
}
