use crate::actions::AvailableActions;
use crate::core::default::{DefaultReason, Status};
use crate::core::ids::{ContractId, InstitutionId};
use crate::core::ledger::Ledger;
use crate::core::obligation::Mailbox;
use crate::core::params::RwaWeights;
use serde::{Deserialize, Serialize};

/// Regulatory calibration of a bank.
///
/// Optional thresholds override the global ones in
/// [`Parameters`](crate::core::params::Parameters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankProfile {
    /// Additional tier 1 capital.
    pub at1e: f64,
    /// Tier 2 capital.
    pub t2c: f64,
    /// Regulatory deductions from common equity.
    pub delta_e: f64,
    /// Assets excluded from the leverage exposure.
    pub delta_a: f64,
    pub rwa_weights: RwaWeights,
    pub rwcr_min: Option<f64>,
    pub rwcr_buffer: Option<f64>,
    pub rwcr_target: Option<f64>,
    pub leverage_buffer: Option<f64>,
    pub leverage_target: Option<f64>,
    /// LCR outflow weight of this bank's `Other` liabilities.
    pub lcr_weight_other: Option<f64>,
    /// LCR denominator fixed at initialisation.
    pub lcr_den_initial: f64,
}

impl Default for BankProfile {
    fn default() -> Self {
        Self {
            at1e: 0.0,
            t2c: 0.0,
            delta_e: 0.0,
            delta_a: 0.0,
            rwa_weights: RwaWeights::default(),
            rwcr_min: None,
            rwcr_buffer: None,
            rwcr_target: None,
            leverage_buffer: None,
            leverage_target: None,
            lcr_weight_other: None,
            lcr_den_initial: 0.0,
        }
    }
}

/// State a hedge fund calibrates against at initialisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HedgefundProfile {
    pub leverage_initial: f64,
    pub uec_fraction_initial: f64,
}

/// Redemption bookkeeping of an asset manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundProfile {
    /// Shares contracts this fund has issued. They are kept off the
    /// fund's own ledger so that NAV is equity per share.
    pub issued_shares: Vec<ContractId>,
    pub nav_initial: f64,
    pub nav_previous: f64,
    /// Relative NAV loss seen at the previous act phase.
    pub nav_lr_previous: f64,
    pub n_shares_initial: f64,
    pub n_shares_extra_previous: f64,
    pub cash_fraction_initial: f64,
}

/// Capability tag of an institution; behaviour differences are match arms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstitutionKind {
    Bank(BankProfile),
    Hedgefund(HedgefundProfile),
    AssetManager(FundProfile),
}

/// A balance sheet in the network: a bank, hedge fund or asset manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    id: InstitutionId,
    name: String,
    pub kind: InstitutionKind,
    status: Status,
    pub(crate) ledger: Ledger,
    pub(crate) mailbox: Mailbox,
    equity_at_default: f64,
    /// Defaulted but not unwound yet.
    pub(crate) pending_unwind: bool,
    /// Loss given default computed from this institution's own unwind.
    pub(crate) endogenous_lgd: Option<f64>,
    #[serde(skip)]
    pub(crate) available_actions: AvailableActions,
}

impl Institution {
    pub fn new(id: InstitutionId, name: impl Into<String>, kind: InstitutionKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            status: Status::Alive,
            ledger: Ledger::new(),
            mailbox: Mailbox::new(),
            equity_at_default: 0.0,
            pending_unwind: false,
            endogenous_lgd: None,
            available_actions: AvailableActions::new(),
        }
    }

    pub fn id(&self) -> InstitutionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn available_actions(&self) -> &AvailableActions {
        &self.available_actions
    }

    pub fn equity_at_default(&self) -> f64 {
        self.equity_at_default
    }

    pub fn endogenous_lgd(&self) -> Option<f64> {
        self.endogenous_lgd
    }

    pub fn is_bank(&self) -> bool {
        matches!(self.kind, InstitutionKind::Bank(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            InstitutionKind::Bank(_) => "bank",
            InstitutionKind::Hedgefund(_) => "hedge fund",
            InstitutionKind::AssetManager(_) => "asset manager",
        }
    }

    pub fn bank_profile(&self) -> Option<&BankProfile> {
        match &self.kind {
            InstitutionKind::Bank(p) => Some(p),
            _ => None,
        }
    }

    pub fn bank_profile_mut(&mut self) -> Option<&mut BankProfile> {
        match &mut self.kind {
            InstitutionKind::Bank(p) => Some(p),
            _ => None,
        }
    }

    pub fn hedgefund_profile(&self) -> Option<&HedgefundProfile> {
        match &self.kind {
            InstitutionKind::Hedgefund(p) => Some(p),
            _ => None,
        }
    }

    pub fn fund_profile(&self) -> Option<&FundProfile> {
        match &self.kind {
            InstitutionKind::AssetManager(p) => Some(p),
            _ => None,
        }
    }

    pub fn fund_profile_mut(&mut self) -> Option<&mut FundProfile> {
        match &mut self.kind {
            InstitutionKind::AssetManager(p) => Some(p),
            _ => None,
        }
    }

    /// Terminal transition. Later calls are ignored.
    pub(crate) fn mark_defaulted(&mut self, reason: DefaultReason, time: u64, equity: f64) {
        if !self.is_alive() {
            return;
        }
        self.status = Status::Defaulted { reason, time };
        self.equity_at_default = equity;
        self.pending_unwind = true;
        self.available_actions.clear();
    }
}
