//! # custodia-ledger
//!
//! The bookkeeping core: an append-only ledger that is the *only* place
//! wallet balances change, plus the record books for deposits, escrow
//! holdings, withdrawals, addresses, and pool wallets.
//!
//! ## Architecture
//!
//! 1. **`Ledger`**: entries, balances, and the external-hash idempotency
//!    set live under one lock, so a credit is atomically
//!    "dedup-check + entry insert + balance move" — an on-chain
//!    transaction can be credited at most once no matter how many job
//!    passes observe it.
//! 2. **Record books**: per-model registries whose status transitions are
//!    compare-and-swap guarded. A transition from the wrong state returns
//!    a typed conflict error instead of silently overwriting.
//! 3. **`EscrowAuditLog`**: append-only trail of escrow resolutions,
//!    recording who resolved each holding and the split that applied.
//!
//! Everything here is in-memory and synchronous; callers never hold a
//! lock across an `await`.

pub mod audit;
pub mod books;
pub mod ledger;

pub use audit::EscrowAuditLog;
pub use books::{AddressBook, DepositBook, EscrowBook, PoolRegistry, WithdrawalBook};
pub use ledger::Ledger;
