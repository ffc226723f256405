//! Named notification lists.
//!
//! Subscribers register a [`flume::Sender`] under a [`Category`] with an opaque
//! [`Token`] that is echoed back in every [`Notice`]. Senders whose receiver is gone
//! are pruned on the next notification.

use crate::{
    display::DisplayTuple,
    restriction::{RestrictedState, RestrictionNotice},
    service_state::{CellIdentity, NetworkRegState, NrState, Rat, ServiceState, Transport},
};
use derive_more::Display;
use flume::Sender;
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    #[display("network-attached")]
    NetworkAttached,
    #[display("network-detached")]
    NetworkDetached,
    #[display("data-attached({_0})")]
    DataAttached(Transport),
    #[display("data-detached({_0})")]
    DataDetached(Transport),
    #[display("voice-reg-or-rat-changed")]
    VoiceRegOrRatChanged,
    #[display("data-reg-or-rat-changed({_0})")]
    DataRegOrRatChanged(Transport),
    #[display("voice-roaming-on")]
    VoiceRoamingOn,
    #[display("voice-roaming-off")]
    VoiceRoamingOff,
    #[display("data-roaming-on")]
    DataRoamingOn,
    #[display("data-roaming-off")]
    DataRoamingOff,
    #[display("location-changed")]
    LocationChanged,
    #[display("nr-state-changed")]
    NrStateChanged,
    #[display("css-indicator-changed")]
    CssIndicatorChanged,
    #[display("ps-restrict-enabled")]
    PsRestrictEnabled,
    #[display("ps-restrict-disabled")]
    PsRestrictDisabled,
    #[display("spn-display-changed")]
    SpnDisplayChanged,
    #[display("restriction-notice")]
    RestrictionNotice,
    #[display("airplane-mode-on")]
    AirplaneModeOn,
    #[display("radio-disabled-by-carrier")]
    RadioDisabledByCarrier,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display("token#{_0}")]
pub struct Token(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    None,
    RegAndRat { reg_state: NetworkRegState, rat: Rat },
    Bool(bool),
    NrState(NrState),
    Location(Option<CellIdentity>),
    Display(DisplayTuple),
    Restriction(RestrictionNotice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub category: Category,
    pub token: Token,
    pub payload: Payload,
}

#[derive(Debug, Clone)]
pub struct Registrant {
    pub tx: Sender<Notice>,
    pub token: Token,
}

impl Registrant {
    pub fn new(tx: Sender<Notice>, token: Token) -> Self {
        Self { tx, token }
    }
}

#[derive(Debug, Default)]
pub struct Registrants {
    lists: HashMap<Category, Vec<Registrant>>,
}

impl Registrants {
    pub fn add(&mut self, category: Category, registrant: Registrant) {
        self.lists.entry(category).or_default().push(registrant);
    }

    pub fn remove(&mut self, category: Category, token: Token) {
        if let Some(list) = self.lists.get_mut(&category) {
            list.retain(|r| r.token != token);
        }
    }

    /// Sends to every registrant of `category`, in registration order.
    pub fn notify(&mut self, category: Category, payload: Payload) {
        let Some(list) = self.lists.get_mut(&category) else {
            return;
        };

        list.retain(|r| {
            let notice = Notice {
                category,
                token: r.token,
                payload: payload.clone(),
            };

            let alive = r.tx.send(notice).is_ok();
            if !alive {
                trace!(%category, token = %r.token, "pruning dead registrant");
            }

            alive
        });
    }
}

/// Synthetic notice for a late registrant whose condition already holds.
///
/// Only level triggered categories are backfilled.
pub fn backfill(
    category: Category,
    ss: &ServiceState,
    restricted: &RestrictedState,
) -> Option<Payload> {
    let holds = match category {
        Category::NetworkAttached => ss.voice_reg_state.is_in_service(),
        Category::NetworkDetached => !ss.voice_reg_state.is_in_service(),
        Category::DataAttached(t) => ss.data_in_service_on(t),
        Category::DataDetached(t) => !ss.data_in_service_on(t),
        Category::VoiceRoamingOn => ss.voice_roaming,
        Category::VoiceRoamingOff => !ss.voice_roaming,
        Category::DataRoamingOn => ss.data_roaming,
        Category::DataRoamingOff => !ss.data_roaming,
        Category::PsRestrictEnabled => restricted.ps,
        Category::PsRestrictDisabled => !restricted.ps,
        Category::VoiceRegOrRatChanged
        | Category::DataRegOrRatChanged(_)
        | Category::LocationChanged
        | Category::NrStateChanged
        | Category::CssIndicatorChanged
        | Category::SpnDisplayChanged
        | Category::RestrictionNotice
        | Category::AirplaneModeOn
        | Category::RadioDisabledByCarrier => false,
    };

    holds.then_some(Payload::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifies_in_order_and_prunes_dead_receivers() {
        let mut regs = Registrants::default();
        let (tx1, rx1) = flume::unbounded();
        let (tx2, rx2) = flume::unbounded();
        regs.add(Category::LocationChanged, Registrant::new(tx1, Token(1)));
        regs.add(Category::LocationChanged, Registrant::new(tx2, Token(2)));
        drop(rx2);

        regs.notify(Category::LocationChanged, Payload::Location(None));

        let notice = rx1.try_recv().unwrap();
        assert_eq!(notice.token, Token(1));
        assert_eq!(notice.category, Category::LocationChanged);
        assert_eq!(regs.lists[&Category::LocationChanged].len(), 1);
    }

    #[test]
    fn remove_by_token() {
        let mut regs = Registrants::default();
        let (tx, rx) = flume::unbounded();
        regs.add(Category::DataRoamingOn, Registrant::new(tx.clone(), Token(1)));
        regs.add(Category::DataRoamingOn, Registrant::new(tx, Token(2)));

        regs.remove(Category::DataRoamingOn, Token(1));
        regs.notify(Category::DataRoamingOn, Payload::None);

        assert_eq!(rx.try_recv().unwrap().token, Token(2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn backfill_only_for_level_triggered_conditions() {
        let ss = ServiceState::out_of_service();
        let rs = RestrictedState::default();

        assert_eq!(
            backfill(Category::DataDetached(Transport::Wwan), &ss, &rs),
            Some(Payload::None)
        );
        assert_eq!(backfill(Category::DataAttached(Transport::Wwan), &ss, &rs), None);
        assert_eq!(backfill(Category::NetworkDetached, &ss, &rs), Some(Payload::None));
        assert_eq!(backfill(Category::PsRestrictEnabled, &ss, &rs), None);
        assert_eq!(backfill(Category::LocationChanged, &ss, &rs), None);
    }
}
