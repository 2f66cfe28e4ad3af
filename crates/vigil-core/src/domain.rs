//! # Compliance Domains & the RAG State Lattice
//!
//! [`ComplianceDomain`] is the closed set of regulatory categories Vigil
//! tracks. The upstream product modeled these as open string-keyed maps;
//! here an unknown domain is a compile-time error, not a silent no-op.
//!
//! [`RagState`] is the traffic-light state computed per domain and per
//! entity. States form a severity lattice:
//!
//! ```text
//! Ordering (best → worst): Green < Amber < Red
//!
//! worst(a, b) = max(a, b)  — pessimistic (one red domain reddens the entity)
//! ```
//!
//! `Red` is absorbing under `worst`: no aggregation path can report an
//! entity greener than its worst domain.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ComplianceDomain
// ---------------------------------------------------------------------------

/// A regulatory domain under which obligations are grouped.
///
/// Declaration order doubles as the deterministic tie-break priority used
/// when two obligations share a due date: `TaxGst` outranks `TaxIncome`,
/// which outranks `Corporate`, and so on. [`ComplianceDomain::priority_rank`]
/// exposes the rank explicitly; `Ord` follows the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceDomain {
    /// Goods & Services Tax filings (returns, annual reconciliation).
    TaxGst,
    /// Income tax filings (advance tax, TDS, annual return).
    TaxIncome,
    /// Corporate / registrar filings (board, AGM, annual accounts).
    Corporate,
    /// Labour-law filings (PF, ESI, professional tax).
    Labour,
    /// Foreign-exchange filings (FLA returns, ODI/FDI reporting).
    Fema,
    /// Licenses and registrations with renewal cycles.
    Licenses,
}

impl ComplianceDomain {
    /// All domains, in tie-break priority order.
    pub fn all() -> &'static [ComplianceDomain; 6] {
        &[
            Self::TaxGst,
            Self::TaxIncome,
            Self::Corporate,
            Self::Labour,
            Self::Fema,
            Self::Licenses,
        ]
    }

    /// Tie-break priority rank. Lower is higher priority.
    pub fn priority_rank(self) -> u8 {
        match self {
            Self::TaxGst => 0,
            Self::TaxIncome => 1,
            Self::Corporate => 2,
            Self::Labour => 3,
            Self::Fema => 4,
            Self::Licenses => 5,
        }
    }

    /// Stable snake_case identifier, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaxGst => "tax_gst",
            Self::TaxIncome => "tax_income",
            Self::Corporate => "corporate",
            Self::Labour => "labour",
            Self::Fema => "fema",
            Self::Licenses => "licenses",
        }
    }
}

impl fmt::Display for ComplianceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RagState
// ---------------------------------------------------------------------------

/// The red/amber/green compliance state for a domain or an entity.
///
/// `Ord` follows severity: `Green < Amber < Red`. Aggregation uses
/// [`RagState::worst`] (lattice join toward `Red`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagState {
    /// No open risk: nothing overdue, nothing inside the risk window.
    Green,
    /// At risk: an obligation is due within the risk window, or a workflow
    /// step is approaching trouble.
    Amber,
    /// Non-compliant: an obligation is overdue or a workflow is stalled.
    Red,
}

impl RagState {
    fn severity(self) -> u8 {
        match self {
            Self::Green => 0,
            Self::Amber => 1,
            Self::Red => 2,
        }
    }

    /// Pessimistic composition: the more severe of the two states.
    ///
    /// # Invariant
    ///
    /// `Red` is absorbing: `worst(x, Red) == Red` for all x. An entity is
    /// never reported greener than its worst domain.
    pub fn worst(self, other: Self) -> Self {
        if self.severity() >= other.severity() {
            self
        } else {
            other
        }
    }

    /// True when no action is required.
    pub fn is_green(self) -> bool {
        matches!(self, Self::Green)
    }
}

impl PartialOrd for RagState {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RagState {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.severity().cmp(&other.severity())
    }
}

impl fmt::Display for RagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Green => write!(f, "green"),
            Self::Amber => write!(f, "amber"),
            Self::Red => write!(f, "red"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
