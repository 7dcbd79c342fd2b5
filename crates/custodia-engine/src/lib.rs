//! # custodia-engine
//!
//! The settlement engine: four stateless, idempotent batch jobs over the
//! ledger and record books, wired to the external world through the client
//! seams.
//!
//! ## Jobs
//!
//! 1. **Deposit matcher** (`matcher`): watches custodial addresses and the
//!    per-coin pool, attributes observed payments to open deposit requests
//!    by address, amount fingerprint, or amount window, and credits exactly
//!    once per external transaction hash.
//! 2. **Escrow state machine** (`escrow`): holds checkout funds per
//!    (order, seller), releases with a fee split computed at release time,
//!    or refunds the buyer; release and refund are mutually exclusive.
//! 3. **Withdrawal pipeline** (`withdrawal`): validates, deducts, then
//!    broadcasts — and compensates the deduction whenever the broadcast
//!    leg fails.
//! 4. **Sweep job** (`sweep`): drains completed deposit addresses into the
//!    per-coin pool in small, rate-limited batches.
//!
//! Every job tolerates per-item failures: one bad address, holding, or
//! broadcast never aborts the rest of a pass. Two overlapping passes of
//! the same job settle each payment once — the ledger's transaction-hash
//! uniqueness and the books' status guards carry the idempotency, not any
//! in-memory job state.

pub mod engine;
pub mod escrow;
pub mod matcher;
pub mod sweep;
pub mod withdrawal;

pub use engine::SettlementEngine;
pub use escrow::ReleaseSummary;
pub use matcher::MatcherSummary;
pub use sweep::SweepSummary;
