//! Carrier name display.
//!
//! [`resolve`] picks what the status bar shows from the committed snapshot, the SIM
//! records, and the carrier configuration. Brand override beats everything. An empty SPN
//! falls back to PLMN only. Otherwise the SIM display condition bits pick SPN and/or
//! PLMN depending on whether the device is roaming.

use crate::{
    config::CarrierConfig,
    service_state::{PhoneType, RegState, ServiceState, Transport},
    sim::SimRecords,
};
use serde::{Deserialize, Serialize};

pub const SHOW_SPN: u8 = 0x01;
pub const SHOW_PLMN: u8 = 0x02;

pub const NO_SERVICE: &str = "No service";
pub const EMERGENCY_ONLY: &str = "Emergency calls only";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayTuple {
    pub show_plmn: bool,
    pub plmn: Option<String>,
    pub show_spn: bool,
    pub spn: Option<String>,
    pub data_spn: Option<String>,
}

/// Name of the service provider, by precedence.
pub fn service_provider_name<'a>(config: &'a CarrierConfig, sim: &'a SimRecords) -> Option<&'a str> {
    sim.brand_override()
        .or_else(|| config.carrier_name())
        .or_else(|| sim.spn())
}

/// SHOW_SPN / SHOW_PLMN bitmask.
pub fn display_rule(ss: &ServiceState, config: &CarrierConfig, sim: &SimRecords) -> u8 {
    if sim.brand_override().is_some() {
        return SHOW_SPN;
    }

    if service_provider_name(config, sim).is_none() {
        return SHOW_PLMN;
    }

    let roaming = if config.spn_display_rule_use_roaming_from_service_state {
        ss.roaming()
    } else {
        ss.operator
            .numeric
            .as_deref()
            .is_none_or(|n| !sim.is_home_numeric(n))
    };

    if roaming {
        SHOW_PLMN
            | if sim.show_spn_in_roaming() {
                SHOW_SPN
            } else {
                0
            }
    } else {
        SHOW_SPN
            | if sim.show_plmn_in_home() {
                SHOW_PLMN
            } else {
                0
            }
    }
}

pub fn resolve(
    ss: &ServiceState,
    phone: PhoneType,
    config: &CarrierConfig,
    sim: &SimRecords,
) -> DisplayTuple {
    let combined = ss.combined_reg_state();
    let in_service = combined == RegState::InService;

    let plmn = if in_service {
        ss.operator.long.clone().filter(|p| !p.is_empty())
    } else if ss.is_emergency_only() {
        Some(EMERGENCY_ONLY.to_string())
    } else {
        Some(NO_SERVICE.to_string())
    };

    if phone == PhoneType::Cdma {
        return DisplayTuple {
            show_plmn: plmn.is_some(),
            plmn,
            ..Default::default()
        };
    }

    let rule = display_rule(ss, config, sim);
    let show_plmn = plmn.is_some() && (!in_service || rule & SHOW_PLMN != 0);

    let spn = service_provider_name(config, sim).map(str::to_string);
    let mut tuple = DisplayTuple {
        show_plmn,
        plmn,
        show_spn: in_service && spn.is_some() && rule & SHOW_SPN != 0,
        data_spn: spn.clone(),
        spn,
    };

    if in_service
        && ss.data_rat() == crate::service_state::Rat::Iwlan
        && ss.data_in_service_on(Transport::Wlan)
        && let Some(spn) = tuple.spn.clone()
    {
        let fmt = |f: &Option<String>| {
            f.as_deref()
                .filter(|f| !f.is_empty())
                .map_or_else(|| spn.clone(), |f| f.replace("%s", &spn))
        };

        tuple.spn = Some(fmt(&config.wfc_spn_format));
        tuple.data_spn = Some(fmt(&config.wfc_data_spn_format));
        tuple.show_spn = true;
        tuple.show_plmn = false;
    }

    tuple
}

/// Emits a tuple only when it differs from the last one emitted.
#[derive(Debug, Default, Clone)]
pub struct DisplayPublisher {
    last: Option<DisplayTuple>,
}

impl DisplayPublisher {
    /// Seeds deduplication with the tuple persisted by a previous run.
    pub fn with_last(last: Option<DisplayTuple>) -> Self {
        Self { last }
    }

    /// Returns the tuple if it must be published.
    pub fn publish(&mut self, tuple: DisplayTuple) -> Option<DisplayTuple> {
        if self.last.as_ref() == Some(&tuple) {
            return None;
        }

        self.last = Some(tuple.clone());
        Some(tuple)
    }
}
