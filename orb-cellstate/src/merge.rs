//! Folds completed sub-queries into the pending snapshot.
//!
//! Every merge writes only the fields owned by its own [`PollKind`], and never reads a
//! field written by another one, so sub-results can be applied in any order.

use crate::{
    modem::SelectionMode,
    poll::{PollKind, SubResult},
    service_state::{Domain, OperatorName, RegistrationInfo, ServiceState, Transport},
    sim::SimRecords,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("operator numeric {0:?} is not 5 or 6 digits")]
    BadNumeric(String),
    #[error("{kind} answered with a record for ({domain}, {transport})")]
    WrongSlot {
        kind: PollKind,
        domain: Domain,
        transport: Transport,
    },
}

/// Applies an `Ok` sub-result to `pending`. Errors are handled by the caller.
pub fn merge_sub_result(
    pending: &mut ServiceState,
    result: &SubResult,
    sim: &SimRecords,
) -> Result<(), MergeError> {
    match result {
        SubResult::Operator(Ok(op)) => merge_operator(pending, op, sim),
        SubResult::Registration {
            domain,
            transport,
            result: Ok(info),
        } => merge_registration(pending, *domain, *transport, info),
        SubResult::SelectionMode(Ok(mode)) => {
            pending.manual_selection = *mode == SelectionMode::Manual;
            Ok(())
        }
        _ => Ok(()),
    }
}

fn merge_operator(
    pending: &mut ServiceState,
    op: &OperatorName,
    sim: &SimRecords,
) -> Result<(), MergeError> {
    if let Some(numeric) = &op.numeric
        && !is_valid_numeric(numeric)
    {
        return Err(MergeError::BadNumeric(numeric.clone()));
    }

    let mut op = op.clone();
    if let Some(brand) = sim.brand_override() {
        op.long = Some(brand.to_string());
        op.short = Some(brand.to_string());
    }
    pending.operator = op;

    Ok(())
}

fn is_valid_numeric(numeric: &str) -> bool {
    (5..=6).contains(&numeric.len()) && numeric.bytes().all(|b| b.is_ascii_digit())
}

fn merge_registration(
    pending: &mut ServiceState,
    domain: Domain,
    transport: Transport,
    info: &RegistrationInfo,
) -> Result<(), MergeError> {
    let wrong_slot = || MergeError::WrongSlot {
        kind: PollKind::Registration(domain, transport),
        domain: info.domain,
        transport: info.transport,
    };

    if info.domain != domain || info.transport != transport {
        return Err(wrong_slot());
    }

    let slot = pending
        .registration_slot(domain, transport)
        .ok_or_else(wrong_slot)?;
    *slot = Some(info.clone());

    Ok(())
}
