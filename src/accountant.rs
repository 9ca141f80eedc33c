//! Payment accounting for dispersals
//!
//! The accountant decides, per blob, whether the dispersal rides a prepaid
//! **reservation** (bandwidth budgeted into fixed-length periods) or an
//! **on-demand** payment (a monotonically increasing cumulative wei
//! counter), and owns the mutable state both regimes need.
//!
//! ## Invariants
//!
//! - **Decision order.** Reservation first; overflow of the current period
//!   may spill into the *next* period's bin, each capped at
//!   `symbols_per_second · interval`; only then is on-demand considered;
//!   otherwise the allocation fails with `InsufficientFunds`.
//! - **Bins.** Three period records per reservation form a circular buffer
//!   keyed `period_index mod 3`. A slot whose stored index does not match
//!   the requested period is re-keyed with usage 0 before charging.
//! - **Monotonicity.** `cumulative_payment` never decreases: successful
//!   on-demand allocations advance it by `symbols · price_per_symbol`, and
//!   a server resync can only push it forward (drift recovery).
//! - **Atomicity.** Every allocation hands back a [`CommitId`]; `rollback`
//!   restores all bins and the cumulative counter to their pre-allocation
//!   values, `commit` discards the undo record. The dispersal client holds
//!   one allocation outstanding at a time (it serializes on a single lock),
//!   and rollback relies on that.
//!
//! Two accounting modes exist, dispatched at construction: a single
//! account-wide reservation, or one reservation per quorum. In per-quorum
//! mode every requested quorum is charged the full symbol count against its
//! own bins; if any quorum cannot absorb the charge the whole attempt is
//! rolled back before on-demand is tried.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::BYTES_PER_SYMBOL;

/// Server-advertised pricing and period constants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Price of one symbol in wei (on-demand mode).
    pub price_per_symbol: u64,
    /// Minimum number of symbols charged per blob.
    pub min_num_symbols: u64,
    /// Length of one reservation period, in seconds.
    pub reservation_period_interval: u64,
}

impl ProtocolParams {
    /// Billable symbols for an encoded blob of `encoded_len` bytes:
    /// `max(min_num_symbols, ceil(encoded_len / 32))`.
    pub fn blob_symbols(&self, encoded_len: usize) -> u64 {
        (encoded_len.div_ceil(BYTES_PER_SYMBOL) as u64).max(self.min_num_symbols)
    }

    /// On-demand cost of `symbols` in wei.
    pub fn blob_cost(&self, symbols: u64) -> U256 {
        U256::from(symbols) * U256::from(self.price_per_symbol)
    }

    /// Period index containing `now_ns`: `floor(now_s / interval)`.
    ///
    /// Requires `reservation_period_interval > 0`.
    pub fn period_index(&self, now_ns: i64) -> u32 {
        let interval_ns = self.reservation_period_interval as i128 * 1_000_000_000;
        (now_ns as i128 / interval_ns) as u32
    }
}

/// A prepaid bandwidth allocation, valid over `[start_ns, end_ns)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Sustained bandwidth in symbols per second.
    pub symbols_per_second: u64,
    /// Start of validity, Unix nanoseconds, inclusive.
    pub start_ns: i64,
    /// End of validity, Unix nanoseconds, exclusive.
    pub end_ns: i64,
    /// Quorums this reservation may serve.
    pub quorum_numbers: BTreeSet<u8>,
    /// Revenue split between quorums, percent summing to 100. Not consulted
    /// by admission.
    pub quorum_splits: BTreeMap<u8, u8>,
}

impl Reservation {
    /// Whether the reservation is live at `now_ns`.
    #[inline]
    pub fn is_active_at(&self, now_ns: i64) -> bool {
        self.start_ns <= now_ns && now_ns < self.end_ns
    }

    /// Whether every requested quorum is covered.
    pub fn covers(&self, quorums: &[u8]) -> bool {
        quorums.iter().all(|q| self.quorum_numbers.contains(q))
    }

    /// Symbol capacity of one period under `params`.
    #[inline]
    pub fn period_capacity(&self, params: &ProtocolParams) -> u64 {
        self.symbols_per_second.saturating_mul(params.reservation_period_interval)
    }

    /// Check that the quorum splits, when present, sum to 100.
    pub fn validate(&self) -> Result<(), AccountantError> {
        if self.quorum_splits.is_empty() {
            return Ok(());
        }
        let total: u16 = self.quorum_splits.values().map(|&v| v as u16).sum();
        if total != 100 {
            return Err(AccountantError::InvalidQuorumSplits(total));
        }
        Ok(())
    }
}

/// Usage counter for one reservation period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRecord {
    /// Period index (`floor(t_seconds / interval)`).
    pub index: u32,
    /// Symbols charged to this period so far.
    pub usage_symbols: u64,
}

/// One reservation plus its three-slot period buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ReservationBins {
    reservation: Reservation,
    records: [PeriodRecord; 3],
}

impl ReservationBins {
    fn from_snapshot(reservation: Reservation, records: &[PeriodRecord]) -> Self {
        let mut bins = Self { reservation, records: [PeriodRecord::default(); 3] };
        for record in records {
            bins.records[(record.index % 3) as usize] = *record;
        }
        bins
    }

    /// Re-key the slot for `period_index` if it still holds an older period.
    fn rekey(&mut self, period_index: u32) {
        let slot = (period_index % 3) as usize;
        if self.records[slot].index != period_index {
            self.records[slot] = PeriodRecord { index: period_index, usage_symbols: 0 };
        }
    }

    /// Charge `symbols` to the period containing `period_index`, spilling
    /// overflow into the next period's bin. Returns false (leaving `self`
    /// untouched except for re-keying) when even the spill does not fit.
    fn charge(&mut self, params: &ProtocolParams, symbols: u64, period_index: u32) -> bool {
        let capacity = self.reservation.period_capacity(params);
        if capacity == 0 {
            return false;
        }
        self.rekey(period_index);
        let current = (period_index % 3) as usize;
        if self.records[current].usage_symbols.saturating_add(symbols) <= capacity {
            self.records[current].usage_symbols += symbols;
            return true;
        }

        let room = capacity.saturating_sub(self.records[current].usage_symbols);
        let overflow = symbols - room;
        self.rekey(period_index + 1);
        let next = ((period_index + 1) % 3) as usize;
        if self.records[next].usage_symbols.saturating_add(overflow) > capacity {
            return false;
        }
        self.records[current].usage_symbols = capacity;
        self.records[next].usage_symbols += overflow;
        true
    }
}

/// Which regime paid for a blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentMethod {
    /// A reservation absorbed the symbols; the wire payment is empty.
    Reservation,
    /// On-demand: the new cumulative total to put on the wire.
    OnDemand {
        /// Cumulative payment after this blob.
        cumulative_payment: U256,
    },
}

/// Handle for rolling back or committing one allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommitId(u64);

/// Outcome of a successful [`Accountant::allocate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// The paying regime.
    pub method: PaymentMethod,
    /// Undo handle; pass to `commit` or `rollback`.
    pub commit_id: CommitId,
}

impl Allocation {
    /// Cumulative payment to embed in the payment metadata (zero when a
    /// reservation pays).
    pub fn cumulative_payment(&self) -> U256 {
        match &self.method {
            PaymentMethod::Reservation => U256::ZERO,
            PaymentMethod::OnDemand { cumulative_payment } => *cumulative_payment,
        }
    }
}

/// Accountant failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountantError {
    /// Neither a reservation nor the on-chain deposit can cover the blob
    /// (a fully exhausted reservation folds into this).
    #[error("insufficient funds: blob needs cumulative payment {required}, on-chain deposit is {available}")]
    InsufficientFunds {
        /// Cumulative total the blob would require.
        required: U256,
        /// On-chain deposit known to the accountant.
        available: U256,
    },
    /// Reservation quorum splits do not sum to 100.
    #[error("reservation quorum splits must sum to 100, got {0}")]
    InvalidQuorumSplits(u16),
}

/// Accounting mode, fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountingMode {
    /// One account-wide reservation.
    Simple,
    /// One reservation per quorum.
    PerQuorum,
}

#[derive(Clone, Debug)]
enum ReservationLedger {
    Simple { bins: Option<ReservationBins> },
    PerQuorum { bins: BTreeMap<u8, ReservationBins> },
}

/// Key of a bins set inside an undo record: `None` for the account-wide
/// reservation, `Some(quorum)` in per-quorum mode.
type BinKey = Option<u8>;

#[derive(Debug)]
struct Undo {
    cumulative_payment: U256,
    bins: Vec<(BinKey, [PeriodRecord; 3])>,
}

/// Server payment-state snapshot (account-wide form).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentStateSnapshot {
    /// Pricing and period constants.
    pub params: ProtocolParams,
    /// Total deposited on chain for this account.
    pub onchain_cumulative_payment: U256,
    /// Cumulative payment the server has counted so far.
    pub cumulative_payment: U256,
    /// Account-wide reservation, if any.
    pub reservation: Option<Reservation>,
    /// Server-side period usage records.
    pub period_records: Vec<PeriodRecord>,
}

/// Per-quorum slice of a payment-state snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuorumPaymentSnapshot {
    /// This quorum's reservation, if any.
    pub reservation: Option<Reservation>,
    /// This quorum's period usage records.
    pub period_records: Vec<PeriodRecord>,
}

/// Server payment-state snapshot, per-quorum form.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AllQuorumsPaymentSnapshot {
    /// Pricing and period constants.
    pub params: ProtocolParams,
    /// Total deposited on chain for this account.
    pub onchain_cumulative_payment: U256,
    /// Cumulative payment the server has counted so far.
    pub cumulative_payment: U256,
    /// Reservation state by quorum.
    pub quorums: BTreeMap<u8, QuorumPaymentSnapshot>,
}

/// The payment state machine.
#[derive(Debug)]
pub struct Accountant {
    params: ProtocolParams,
    onchain_cumulative_payment: U256,
    cumulative_payment: U256,
    ledger: ReservationLedger,
    next_commit_id: u64,
    pending: BTreeMap<u64, Undo>,
}

impl Accountant {
    /// Account-wide accounting.
    pub fn new(params: ProtocolParams) -> Self {
        Self {
            params,
            onchain_cumulative_payment: U256::ZERO,
            cumulative_payment: U256::ZERO,
            ledger: ReservationLedger::Simple { bins: None },
            next_commit_id: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Per-quorum accounting.
    pub fn new_per_quorum(params: ProtocolParams) -> Self {
        Self { ledger: ReservationLedger::PerQuorum { bins: BTreeMap::new() }, ..Self::new(params) }
    }

    /// Accounting mode chosen at construction.
    pub fn mode(&self) -> AccountingMode {
        match self.ledger {
            ReservationLedger::Simple { .. } => AccountingMode::Simple,
            ReservationLedger::PerQuorum { .. } => AccountingMode::PerQuorum,
        }
    }

    /// Current pricing/period constants.
    #[inline]
    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// Cumulative on-demand total counted locally.
    #[inline]
    pub fn cumulative_payment(&self) -> U256 {
        self.cumulative_payment
    }

    /// Adopt the server's account-wide payment state.
    ///
    /// Reservations, records, and constants are replaced wholesale (the
    /// server is authoritative and the client is stateless across
    /// restarts); the cumulative counter only moves **forward**. A server
    /// total above the local one means payments the client counted as
    /// failed actually landed, and the local view silently syncs up.
    pub fn sync(&mut self, snapshot: PaymentStateSnapshot) {
        self.params = snapshot.params;
        self.onchain_cumulative_payment = snapshot.onchain_cumulative_payment;
        self.adopt_cumulative(snapshot.cumulative_payment);
        if let ReservationLedger::Simple { bins } = &mut self.ledger {
            *bins = snapshot
                .reservation
                .map(|r| ReservationBins::from_snapshot(r, &snapshot.period_records));
        }
    }

    /// Adopt the server's per-quorum payment state.
    pub fn sync_all_quorums(&mut self, snapshot: AllQuorumsPaymentSnapshot) {
        self.params = snapshot.params;
        self.onchain_cumulative_payment = snapshot.onchain_cumulative_payment;
        self.adopt_cumulative(snapshot.cumulative_payment);
        if let ReservationLedger::PerQuorum { bins } = &mut self.ledger {
            bins.clear();
            for (quorum, state) in snapshot.quorums {
                if let Some(reservation) = state.reservation {
                    bins.insert(
                        quorum,
                        ReservationBins::from_snapshot(reservation, &state.period_records),
                    );
                }
            }
        }
    }

    fn adopt_cumulative(&mut self, server_total: U256) {
        if server_total > self.cumulative_payment {
            warn!(
                local = %self.cumulative_payment,
                server = %server_total,
                "cumulative payment drift detected, adopting server total"
            );
            self.cumulative_payment = server_total;
        }
    }

    /// Allocate payment for a blob of `symbols` billable symbols targeting
    /// `quorums`, at time `now_ns`.
    pub fn allocate(
        &mut self,
        symbols: u64,
        quorums: &[u8],
        now_ns: i64,
    ) -> Result<Allocation, AccountantError> {
        if let Some(bin_undo) = self.try_reservation(symbols, quorums, now_ns) {
            debug!(symbols, ?quorums, "blob charged to reservation");
            let undo = Undo { cumulative_payment: self.cumulative_payment, bins: bin_undo };
            return Ok(self.register(undo, PaymentMethod::Reservation));
        }

        let cost = self.params.blob_cost(symbols);
        let new_total = self.cumulative_payment.saturating_add(cost);
        if new_total <= self.onchain_cumulative_payment {
            let undo = Undo { cumulative_payment: self.cumulative_payment, bins: Vec::new() };
            self.cumulative_payment = new_total;
            debug!(symbols, %new_total, "blob charged on demand");
            return Ok(
                self.register(undo, PaymentMethod::OnDemand { cumulative_payment: new_total })
            );
        }

        Err(AccountantError::InsufficientFunds {
            required: new_total,
            available: self.onchain_cumulative_payment,
        })
    }

    /// Discard the undo record of a published allocation.
    pub fn commit(&mut self, id: CommitId) {
        self.pending.remove(&id.0);
    }

    /// Restore all state touched by an allocation that failed to publish.
    pub fn rollback(&mut self, id: CommitId) {
        let Some(undo) = self.pending.remove(&id.0) else { return };
        self.cumulative_payment = undo.cumulative_payment;
        for (key, records) in undo.bins {
            match (&mut self.ledger, key) {
                (ReservationLedger::Simple { bins: Some(b) }, None) => b.records = records,
                (ReservationLedger::PerQuorum { bins }, Some(quorum)) => {
                    if let Some(b) = bins.get_mut(&quorum) {
                        b.records = records;
                    }
                }
                _ => {}
            }
        }
    }

    /// Try the reservation path; `Some(undo)` on success with the bins'
    /// pre-charge snapshots, `None` if on-demand should be tried.
    fn try_reservation(
        &mut self,
        symbols: u64,
        quorums: &[u8],
        now_ns: i64,
    ) -> Option<Vec<(BinKey, [PeriodRecord; 3])>> {
        if self.params.reservation_period_interval == 0 || quorums.is_empty() {
            return None;
        }
        let params = self.params;
        let period_index = params.period_index(now_ns);
        match &mut self.ledger {
            ReservationLedger::Simple { bins: Some(b) } => {
                if !b.reservation.is_active_at(now_ns) || !b.reservation.covers(quorums) {
                    return None;
                }
                let snapshot = b.records;
                b.charge(&params, symbols, period_index).then(|| vec![(None, snapshot)])
            }
            ReservationLedger::Simple { bins: None } => None,
            ReservationLedger::PerQuorum { bins } => {
                if !quorums.iter().all(|q| {
                    bins.get(q).is_some_and(|b| b.reservation.is_active_at(now_ns))
                }) {
                    return None;
                }
                let mut undo: Vec<(BinKey, [PeriodRecord; 3])> = Vec::with_capacity(quorums.len());
                for quorum in quorums {
                    let b = bins.get_mut(quorum).expect("checked above");
                    let snapshot = b.records;
                    if b.charge(&params, symbols, period_index) {
                        undo.push((Some(*quorum), snapshot));
                    } else {
                        // Undo the quorums already charged before giving up.
                        for (key, records) in undo {
                            if let Some(q) = key {
                                if let Some(prev) = bins.get_mut(&q) {
                                    prev.records = records;
                                }
                            }
                        }
                        return None;
                    }
                }
                Some(undo)
            }
        }
    }

    fn register(&mut self, undo: Undo, method: PaymentMethod) -> Allocation {
        let id = CommitId(self.next_commit_id);
        self.next_commit_id += 1;
        self.pending.insert(id.0, undo);
        Allocation { method, commit_id: id }
    }

    #[cfg(test)]
    fn record(&self, quorum: BinKey, period_index: u32) -> Option<PeriodRecord> {
        let bins = match (&self.ledger, quorum) {
            (ReservationLedger::Simple { bins }, None) => bins.as_ref(),
            (ReservationLedger::PerQuorum { bins }, Some(q)) => bins.get(&q),
            _ => None,
        }?;
        let record = bins.records[(period_index % 3) as usize];
        (record.index == period_index).then_some(record)
    }
}

// ============================================================================
// Tests
// ============================================================================
