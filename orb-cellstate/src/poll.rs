//! Poll round bookkeeping.
//!
//! A round fans out one request per [`PollKind`] and counts completions down. Every
//! completion carries the [`RoundSeq`] it was issued under, and anything not matching
//! the outstanding round is dropped.

use crate::{
    modem::{ChannelError, SelectionMode},
    service_state::{Domain, OperatorName, RegistrationInfo, Transport},
};
use derive_more::Display;

/// Identifies a poll round. Strictly increasing over the tracker's lifetime.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("round#{_0}")]
pub struct RoundSeq(pub u64);

impl RoundSeq {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollKind {
    #[display("operator")]
    Operator,
    #[display("registration({_0}, {_1})")]
    Registration(Domain, Transport),
    #[display("selection-mode")]
    SelectionMode,
}

/// A completed sub-query.
#[derive(Debug, Clone, PartialEq)]
pub enum SubResult {
    Operator(Result<OperatorName, ChannelError>),
    Registration {
        domain: Domain,
        transport: Transport,
        result: Result<RegistrationInfo, ChannelError>,
    },
    SelectionMode(Result<SelectionMode, ChannelError>),
}

impl SubResult {
    pub fn kind(&self) -> PollKind {
        match self {
            SubResult::Operator(_) => PollKind::Operator,
            SubResult::Registration {
                domain, transport, ..
            } => PollKind::Registration(*domain, *transport),
            SubResult::SelectionMode(_) => PollKind::SelectionMode,
        }
    }

    pub fn error(&self) -> Option<&ChannelError> {
        match self {
            SubResult::Operator(r) => r.as_ref().err(),
            SubResult::Registration { result, .. } => result.as_ref().err(),
            SubResult::SelectionMode(r) => r.as_ref().err(),
        }
    }
}

/// The round currently in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRound {
    pub seq: RoundSeq,
    pub outstanding: usize,
    pub forced: bool,
}

impl PollRound {
    pub fn new(seq: RoundSeq, forced: bool) -> Self {
        Self {
            seq,
            outstanding: 0,
            forced,
        }
    }

    /// Accounts for one completion. Returns true once nothing is outstanding.
    pub fn complete_one(&mut self) -> bool {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.outstanding == 0
    }
}

/// Sub-queries issued for a round.
pub fn plan(iwlan_available: bool, gsm: bool) -> Vec<PollKind> {
    let mut kinds = vec![
        PollKind::Operator,
        PollKind::Registration(Domain::Ps, Transport::Wwan),
        PollKind::Registration(Domain::Cs, Transport::Wwan),
    ];

    if iwlan_available {
        kinds.push(PollKind::Registration(Domain::Ps, Transport::Wlan));
    }

    if gsm {
        kinds.push(PollKind::SelectionMode);
    }

    kinds
}
