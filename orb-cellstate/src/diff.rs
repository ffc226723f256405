//! Pure comparison of two committed snapshots.

use crate::service_state::{Domain, RegState, ServiceState, Transport};
use std::ops::{Index, IndexMut};

/// One flag per [`Transport`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransportFlags {
    pub wwan: bool,
    pub wlan: bool,
}

impl TransportFlags {
    fn from_fn(f: impl Fn(Transport) -> bool) -> Self {
        Self {
            wwan: f(Transport::Wwan),
            wlan: f(Transport::Wlan),
        }
    }

    pub fn any(&self) -> bool {
        self.wwan || self.wlan
    }
}

impl Index<Transport> for TransportFlags {
    type Output = bool;

    fn index(&self, t: Transport) -> &bool {
        match t {
            Transport::Wwan => &self.wwan,
            Transport::Wlan => &self.wlan,
        }
    }
}

impl IndexMut<Transport> for TransportFlags {
    fn index_mut(&mut self, t: Transport) -> &mut bool {
        match t {
            Transport::Wwan => &mut self.wwan,
            Transport::Wlan => &mut self.wlan,
        }
    }
}

/// Everything that changed between two snapshots. Each flag gates its own effect.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub has_registered: bool,
    pub has_deregistered: bool,
    pub has_voice_reg_state_changed: bool,
    pub has_voice_rat_changed: bool,
    pub has_data_attached: TransportFlags,
    pub has_data_detached: TransportFlags,
    pub has_data_reg_state_changed: TransportFlags,
    pub has_data_rat_changed: TransportFlags,
    pub has_voice_roaming_on: bool,
    pub has_voice_roaming_off: bool,
    pub has_data_roaming_on: bool,
    pub has_data_roaming_off: bool,
    pub has_location_changed: bool,
    pub has_nr_state_changed: bool,
    pub has_nr_frequency_range_changed: bool,
    pub has_css_indicator_changed: bool,
    pub has_reject_cause_changed: bool,
    pub has_operator_changed: bool,
    pub has_airplane_mode_on: bool,
    /// Any field differs at all.
    pub has_changed: bool,
}

pub fn diff(old: &ServiceState, new: &ServiceState) -> ChangeSet {
    let in_service = |ss: &ServiceState| ss.voice_reg_state.is_in_service();
    let ps = |ss: &ServiceState, t| ss.registration(Domain::Ps, t).cloned();

    ChangeSet {
        has_registered: !in_service(old) && in_service(new),
        has_deregistered: in_service(old) && !in_service(new),
        has_voice_reg_state_changed: old.voice_reg_state != new.voice_reg_state,
        has_voice_rat_changed: old.voice_rat() != new.voice_rat(),
        has_data_attached: TransportFlags::from_fn(|t| {
            !old.data_in_service_on(t) && new.data_in_service_on(t)
        }),
        has_data_detached: TransportFlags::from_fn(|t| {
            old.data_in_service_on(t) && !new.data_in_service_on(t)
        }),
        has_data_reg_state_changed: TransportFlags::from_fn(|t| {
            ps(old, t).map(|r| r.reg_state) != ps(new, t).map(|r| r.reg_state)
        }),
        has_data_rat_changed: TransportFlags::from_fn(|t| {
            ps(old, t).map(|r| r.rat) != ps(new, t).map(|r| r.rat)
        }),
        has_voice_roaming_on: !old.voice_roaming && new.voice_roaming,
        has_voice_roaming_off: old.voice_roaming && !new.voice_roaming,
        has_data_roaming_on: !old.data_roaming && new.data_roaming,
        has_data_roaming_off: old.data_roaming && !new.data_roaming,
        has_location_changed: old.cell_identity() != new.cell_identity(),
        has_nr_state_changed: old.nr_state() != new.nr_state(),
        has_nr_frequency_range_changed: old.nr_frequency_range() != new.nr_frequency_range(),
        has_css_indicator_changed: old.css_indicator != new.css_indicator,
        has_reject_cause_changed: old.voice_reject_cause() != new.voice_reject_cause(),
        has_operator_changed: old.operator != new.operator,
        has_airplane_mode_on: old.voice_reg_state != RegState::PowerOff
            && new.voice_reg_state == RegState::PowerOff,
        has_changed: old != new,
    }
}
