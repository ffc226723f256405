//! Roaming corrections applied to a pending snapshot before it is diffed.

use crate::{
    config::CarrierConfig,
    service_state::{PhoneType, ServiceState},
    sim::SimRecords,
};
use tracing::debug;

/// ERI: roaming icon on.
pub const ERI_ON: u32 = 0;
/// ERI: roaming icon off.
pub const ERI_OFF: u32 = 1;
/// ERI: roaming icon flashing.
pub const ERI_FLASH: u32 = 2;

pub fn apply(ss: &mut ServiceState, phone: PhoneType, config: &CarrierConfig, sim: &SimRecords) {
    match phone {
        PhoneType::Gsm => apply_gsm(ss, config, sim),
        PhoneType::Cdma => apply_cdma(ss, config, sim),
    }
}

fn apply_gsm(ss: &mut ServiceState, config: &CarrierConfig, sim: &SimRecords) {
    let numeric = ss.operator.numeric.clone().unwrap_or_default();
    let mut roaming = ss.voice_roaming || ss.data_roaming;

    if roaming
        && !matches_prefix(&config.gsm_roaming_networks, &numeric)
        && (is_same_named_operator(ss, sim) || sim.is_home_numeric(&numeric))
    {
        debug!(%numeric, "operator matches the SIM, not roaming");
        roaming = false;
    }

    if ss.combined_reg_state().is_in_service() {
        roaming = config_override(
            roaming,
            config.force_home_network,
            &config.gsm_nonroaming_networks,
            &config.gsm_roaming_networks,
            &numeric,
        );
    }

    ss.voice_roaming = roaming;
    ss.data_roaming = roaming && !ss.iwlan_overlays_cellular();
}

fn apply_cdma(ss: &mut ServiceState, config: &CarrierConfig, sim: &SimRecords) {
    let network_indicator = ss.cdma.roaming_indicator;
    let in_prl = ss
        .cs_wwan
        .as_ref()
        .and_then(|r| r.voice.as_ref())
        .is_some_and(|v| v.system_is_in_prl);
    let nam_match = ss
        .cdma
        .system_id
        .is_some_and(|sid| sim.is_cdma_home_system(sid));

    let indicator = match (nam_match, in_prl) {
        (false, false) => ss.cdma.default_roaming_indicator,
        (true, false) => {
            if ss.voice_rat().is_ps_only() {
                debug!("voice is on {}, turning the roaming indicator off", ss.voice_rat());
                ERI_OFF
            } else {
                ERI_FLASH
            }
        }
        (false, true) => {
            if network_indicator <= ERI_FLASH {
                ERI_FLASH
            } else {
                network_indicator
            }
        }
        (true, true) => network_indicator,
    };

    ss.cdma.eri_icon_index = indicator;
    ss.cdma.eri_icon_flashing = indicator == ERI_FLASH;

    let mut roaming = ss.voice_roaming;
    if config.cdma_home_roaming_indicators.contains(&indicator) {
        roaming = false;
    }

    if ss.combined_reg_state().is_in_service() {
        let numeric = ss.operator.numeric.clone().unwrap_or_default();
        roaming = config_override(
            roaming,
            config.force_home_network,
            &config.cdma_nonroaming_networks,
            &config.cdma_roaming_networks,
            &numeric,
        );
    }

    ss.voice_roaming = roaming;
    ss.data_roaming = roaming && !ss.iwlan_overlays_cellular();
}

fn config_override(
    roaming: bool,
    force_home: bool,
    nonroaming: &[String],
    always_roaming: &[String],
    numeric: &str,
) -> bool {
    if force_home || matches_prefix(nonroaming, numeric) {
        false
    } else if matches_prefix(always_roaming, numeric) {
        true
    } else {
        roaming
    }
}

fn matches_prefix(prefixes: &[String], numeric: &str) -> bool {
    !numeric.is_empty() && prefixes.iter().any(|p| !p.is_empty() && numeric.starts_with(p.as_str()))
}

/// The network name matches the SIM SPN and the MCC matches the SIM's.
fn is_same_named_operator(ss: &ServiceState, sim: &SimRecords) -> bool {
    let Some(spn) = sim.spn() else {
        return false;
    };

    let sim_mcc = sim.operator_numeric.as_deref().and_then(|n| n.get(..3));
    let same_mcc = sim_mcc.is_some() && sim_mcc == ss.operator.mcc();

    let named = [&ss.operator.long, &ss.operator.short]
        .into_iter()
        .flatten()
        .any(|name| name.eq_ignore_ascii_case(spn));

    same_mcc && named
}
