use crate::core::ids::{ContractId, InstitutionId, ObligationId};
use serde::{Deserialize, Serialize};

/// What settles when an obligation is fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ObligationKind {
    /// Repay part of a loan or repo whose funding the lender pulled.
    PullFunding { loan: ContractId },
    /// Pay out redeemed fund shares at the NAV prevailing at settlement.
    RedeemShares { shares: ContractId, n_shares: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObligationStatus {
    Pending,
    Fulfilled,
    /// The underlying contract was liquidated before settlement.
    Cancelled,
}

/// A deferred payment promise from `payer` to `payee`.
///
/// Created when an action defers its settlement. The payer must settle it
/// at `time_to_pay`; the cash reaches the payee at `time_to_receive`, one
/// tick later.
///
/// # Examples
///
/// ```
/// use contagion_engine::core::ids::{ContractId, InstitutionId};
/// use contagion_engine::core::obligation::{Obligation, ObligationKind};
///
/// let obligation = Obligation::new(
///     ObligationKind::PullFunding { loan: ContractId::new(0) },
///     InstitutionId::new(1),
///     InstitutionId::new(0),
///     25.0,
///     3,
///     2,
/// );
/// assert_eq!(obligation.time_to_pay(), 5);
/// assert_eq!(obligation.time_to_receive(), 6);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obligation {
    kind: ObligationKind,
    payer: InstitutionId,
    payee: InstitutionId,
    /// Amount at creation. Share redemptions are re-priced at settlement.
    amount: f64,
    created_at: u64,
    time_to_pay: u64,
    status: ObligationStatus,
}

impl Obligation {
    /// Create an obligation due `delay` ticks after `now`.
    ///
    /// # Panics
    ///
    /// Panics if `amount` is not positive or `delay` is zero.
    pub fn new(
        kind: ObligationKind,
        payer: InstitutionId,
        payee: InstitutionId,
        amount: f64,
        now: u64,
        delay: u32,
    ) -> Self {
        assert!(
            amount > 0.0,
            "Obligation amount must be positive, got {}",
            amount
        );
        assert!(delay > 0, "Obligation must mature after its creation");
        Self {
            kind,
            payer,
            payee,
            amount,
            created_at: now,
            time_to_pay: now + delay as u64,
            status: ObligationStatus::Pending,
        }
    }

    pub fn kind(&self) -> ObligationKind {
        self.kind
    }

    pub fn payer(&self) -> InstitutionId {
        self.payer
    }

    pub fn payee(&self) -> InstitutionId {
        self.payee
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn time_to_pay(&self) -> u64 {
        self.time_to_pay
    }

    pub fn time_to_receive(&self) -> u64 {
        self.time_to_pay + 1
    }

    pub fn status(&self) -> ObligationStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == ObligationStatus::Pending
    }

    pub fn is_matured(&self, now: u64) -> bool {
        self.is_pending() && self.time_to_pay <= now
    }

    /// The contract this obligation settles.
    pub fn contract(&self) -> ContractId {
        match self.kind {
            ObligationKind::PullFunding { loan } => loan,
            ObligationKind::RedeemShares { shares, .. } => shares,
        }
    }

    pub(crate) fn set_fulfilled(&mut self) {
        self.status = ObligationStatus::Fulfilled;
    }

    pub(crate) fn cancel(&mut self) {
        if self.is_pending() {
            self.status = ObligationStatus::Cancelled;
        }
    }
}

/// Arena of every obligation ever issued in a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObligationBook {
    obligations: Vec<Obligation>,
}

impl ObligationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, obligation: Obligation) -> ObligationId {
        self.obligations.push(obligation);
        ObligationId::new(self.obligations.len() - 1)
    }

    pub fn get(&self, id: ObligationId) -> &Obligation {
        &self.obligations[id.index()]
    }

    pub fn get_mut(&mut self, id: ObligationId) -> &mut Obligation {
        &mut self.obligations[id.index()]
    }

    pub fn len(&self) -> usize {
        self.obligations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obligations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObligationId, &Obligation)> {
        self.obligations
            .iter()
            .enumerate()
            .map(|(i, o)| (ObligationId::new(i), o))
    }

    /// Cancel every pending obligation attached to `contract`; returns the
    /// ids cancelled.
    pub fn cancel_for_contract(&mut self, contract: ContractId) -> Vec<ObligationId> {
        let mut cancelled = Vec::new();
        for (i, obligation) in self.obligations.iter_mut().enumerate() {
            if obligation.is_pending() && obligation.contract() == contract {
                obligation.cancel();
                cancelled.push(ObligationId::new(i));
            }
        }
        cancelled
    }

    /// Total pending amount across all obligations.
    pub fn pending_total(&self) -> f64 {
        self.obligations
            .iter()
            .filter(|o| o.is_pending())
            .map(|o| o.amount())
            .sum()
    }
}

/// Per-institution view of the obligations it is party to.
///
/// Newly received obligations sit unopened until the start of the next
/// tick, so no institution reacts within the tick an obligation was sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mailbox {
    unopened: Vec<ObligationId>,
    /// Obligations this institution has to pay.
    inbox: Vec<ObligationId>,
    /// Obligations owed to this institution.
    outbox: Vec<ObligationId>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn receive(&mut self, id: ObligationId) {
        self.unopened.push(id);
    }

    pub(crate) fn record_sent(&mut self, id: ObligationId) {
        self.outbox.push(id);
    }

    /// Move unopened obligations into the inbox and drop settled ones.
    pub(crate) fn open(&mut self, book: &ObligationBook) {
        self.inbox.append(&mut self.unopened);
        self.inbox.retain(|id| book.get(*id).is_pending());
        self.outbox.retain(|id| book.get(*id).is_pending());
    }

    /// Forget a settled obligation.
    pub(crate) fn discard(&mut self, id: ObligationId) {
        self.unopened.retain(|o| *o != id);
        self.inbox.retain(|o| *o != id);
        self.outbox.retain(|o| *o != id);
    }

    pub fn inbox(&self) -> &[ObligationId] {
        &self.inbox
    }

    pub fn outbox(&self) -> &[ObligationId] {
        &self.outbox
    }

    pub fn unopened(&self) -> &[ObligationId] {
        &self.unopened
    }

    /// Pending obligations to pay that are due at or before `now`.
    pub fn matured(&self, book: &ObligationBook, now: u64) -> Vec<ObligationId> {
        self.inbox
            .iter()
            .copied()
            .filter(|id| book.get(*id).is_matured(now))
            .collect()
    }
}
