//! Keeps the reported RAT from flickering down while camped on the same cell.

use crate::service_state::{Domain, Rat, RegistrationInfo, ServiceState, Transport};
use tracing::debug;

/// Applies the ratchet to `new` in place, using `old` as the committed snapshot.
///
/// Within one family a lower RAT is replaced by the previously reported higher one as
/// long as both snapshots are in service on the same serving cell. Any cell change or
/// loss of service resets it.
pub fn ratchet(old: &ServiceState, new: &mut ServiceState, families: &[Vec<Rat>]) {
    let same_cell = match (old.cell_identity(), new.cell_identity()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    if !same_cell {
        return;
    }

    for domain in [Domain::Cs, Domain::Ps] {
        let Some(prev) = old.registration(domain, Transport::Wwan) else {
            continue;
        };
        let Some(Some(next)) = new.registration_slot(domain, Transport::Wwan) else {
            continue;
        };

        ratchet_record(prev, next, families);
    }

    if old.data_in_service_on(Transport::Wwan)
        && new.data_in_service_on(Transport::Wwan)
        && bandwidth(&old.cell_bandwidths_khz) > bandwidth(&new.cell_bandwidths_khz)
    {
        new.cell_bandwidths_khz = old.cell_bandwidths_khz.clone();
        if let Some(data) = new.ps_wwan.as_mut().and_then(|r| r.data.as_mut()) {
            data.cell_bandwidths_khz = old.cell_bandwidths_khz.clone();
        }
    }
}

fn ratchet_record(prev: &RegistrationInfo, next: &mut RegistrationInfo, families: &[Vec<Rat>]) {
    if !prev.is_in_service() || !next.is_in_service() {
        return;
    }

    let Some(family) = families
        .iter()
        .find(|f| f.contains(&prev.rat) && f.contains(&next.rat))
    else {
        return;
    };

    let rank = |rat: Rat| family.iter().position(|r| *r == rat);
    if rank(next.rat) < rank(prev.rat) {
        debug!(domain = %next.domain, from = %next.rat, to = %prev.rat, "ratcheting RAT");
        next.rat = prev.rat;
    }
}

fn bandwidth(cells: &[u32]) -> u64 {
    cells.iter().map(|b| u64::from(*b)).sum()
}
