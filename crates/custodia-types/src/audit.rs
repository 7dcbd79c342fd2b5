//! Escrow audit records.
//!
//! Every escrow money movement must be independently reconstructable, so
//! each release or refund appends a record capturing who acted, the status
//! transition, and the amounts involved.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EscrowStatus, HoldingId, UserId};

/// Who triggered an escrow transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditActor {
    /// An explicit buyer or admin action.
    User(UserId),
    /// The time-based auto-release pass.
    AutoRelease,
}

impl fmt::Display for AuditActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::AutoRelease => write!(f, "auto_release"),
        }
    }
}

/// One append-only audit record for an escrow transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowAuditRecord {
    pub holding_id: HoldingId,
    pub actor: AuditActor,
    pub previous_status: EscrowStatus,
    pub new_status: EscrowStatus,
    /// Amount credited to the seller (crypto units), zero for refunds.
    pub seller_crypto: Decimal,
    /// Fee collected by the platform (crypto units), zero for refunds.
    pub fee_crypto: Decimal,
    pub recorded_at: DateTime<Utc>,
}

impl EscrowAuditRecord {
    #[must_use]
    pub fn new(
        holding_id: HoldingId,
        actor: AuditActor,
        previous_status: EscrowStatus,
        new_status: EscrowStatus,
        seller_crypto: Decimal,
        fee_crypto: Decimal,
    ) -> Self {
        Self {
            holding_id,
            actor,
            previous_status,
            new_status,
            seller_crypto,
            fee_crypto,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_display() {
        assert_eq!(AuditActor::AutoRelease.to_string(), "auto_release");
        let id = UserId::new();
        assert_eq!(AuditActor::User(id).to_string(), format!("user:{id}"));
    }

    #[test]
    fn record_captures_transition() {
        let rec = EscrowAuditRecord::new(
            HoldingId::new(),
            AuditActor::AutoRelease,
            EscrowStatus::Held,
            EscrowStatus::Released,
            Decimal::new(96, 3),
            Decimal::new(4, 3),
        );
        assert_eq!(rec.previous_status, EscrowStatus::Held);
        assert_eq!(rec.new_status, EscrowStatus::Released);
    }
}
