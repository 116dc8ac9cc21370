//! Conformance status values and their reduction algebra.
//!
//! A leaf check derives its status from its tally of conformant and
//! non-conformant exchanges; inner nodes fold their children's statuses with
//! [`ConformanceStatus::reduce`]. The reduction is commutative and
//! associative, so rollup order never affects a report.

use serde::{Deserialize, Serialize};

/// Per-node conformance verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConformanceStatus {
    NoTraffic,
    NonConformant,
    PartiallyConformant,
    Conformant,
}

impl ConformanceStatus {
    /// Leaf base case: derive a status from exchange tallies.
    pub fn for_exchange_counts(conformant: usize, non_conformant: usize) -> Self {
        if non_conformant > 0 {
            ConformanceStatus::NonConformant
        } else if conformant > 0 {
            ConformanceStatus::Conformant
        } else {
            ConformanceStatus::NoTraffic
        }
    }

    /// Combine two statuses.
    ///
    /// `NonConformant` absorbs everything; `PartiallyConformant` absorbs
    /// everything else; `Conformant` next to `NoTraffic` means part of the
    /// tree saw no traffic, which is only partial conformance.
    pub fn reduce(self, other: Self) -> Self {
        use ConformanceStatus as S;
        match (self, other) {
            (S::NonConformant, _) | (_, S::NonConformant) => S::NonConformant,
            (S::PartiallyConformant, _) | (_, S::PartiallyConformant) => S::PartiallyConformant,
            (S::Conformant, S::Conformant) => S::Conformant,
            (S::NoTraffic, S::NoTraffic) => S::NoTraffic,
            _ => S::PartiallyConformant,
        }
    }

    /// Fold statuses; `None` when the iterator is empty.
    pub fn reduce_all(statuses: impl IntoIterator<Item = Self>) -> Option<Self> {
        statuses.into_iter().reduce(Self::reduce)
    }

    /// Stable label used in serialized reports and log output.
    pub fn as_str(self) -> &'static str {
        match self {
            ConformanceStatus::NoTraffic => "NO_TRAFFIC",
            ConformanceStatus::NonConformant => "NON_CONFORMANT",
            ConformanceStatus::PartiallyConformant => "PARTIALLY_CONFORMANT",
            ConformanceStatus::Conformant => "CONFORMANT",
        }
    }
}
