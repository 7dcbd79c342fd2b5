//! Append-only escrow audit trail.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::info;

use custodia_types::{EscrowAuditRecord, HoldingId};

/// Append-only log of escrow resolutions. Records are never edited or
/// removed.
#[derive(Default)]
pub struct EscrowAuditLog {
    records: Mutex<Vec<EscrowAuditRecord>>,
}

impl EscrowAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EscrowAuditRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, record: EscrowAuditRecord) {
        info!(
            holding = %record.holding_id,
            actor = %record.actor,
            from = %record.previous_status,
            to = %record.new_status,
            "escrow audit"
        );
        self.lock().push(record);
    }

    /// All records for one holding, in append order.
    #[must_use]
    pub fn for_holding(&self, id: HoldingId) -> Vec<EscrowAuditRecord> {
        self.lock()
            .iter()
            .filter(|r| r.holding_id == id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_types::{AuditActor, EscrowStatus, UserId};
    use rust_decimal::Decimal;

    #[test]
    fn records_are_queryable_per_holding() {
        let log = EscrowAuditLog::new();
        let holding = HoldingId::new();
        log.record(EscrowAuditRecord::new(
            holding,
            AuditActor::User(UserId::new()),
            EscrowStatus::Held,
            EscrowStatus::Released,
            Decimal::new(96, 3),
            Decimal::new(4, 3),
        ));
        log.record(EscrowAuditRecord::new(
            HoldingId::new(),
            AuditActor::AutoRelease,
            EscrowStatus::Held,
            EscrowStatus::Released,
            Decimal::ONE,
            Decimal::ZERO,
        ));

        assert_eq!(log.len(), 2);
        let records = log.for_holding(holding);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].new_status, EscrowStatus::Released);
    }
}
