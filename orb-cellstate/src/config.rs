//! Per-subscription carrier configuration and tracker settings.

use crate::service_state::Rat;
use color_eyre::{Result, eyre::WrapErr as _};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{path::Path, time::Duration};
use tokio::fs;

/// Carrier configuration bundle. Re-read on every config change and applied to the
/// next poll round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierConfig {
    /// Numeric prefixes always treated as roaming on GSM phones.
    pub gsm_roaming_networks: Vec<String>,
    /// Numeric prefixes never treated as roaming on GSM phones.
    pub gsm_nonroaming_networks: Vec<String>,
    pub cdma_roaming_networks: Vec<String>,
    pub cdma_nonroaming_networks: Vec<String>,
    /// Every network is home.
    pub force_home_network: bool,
    /// CDMA roaming indicators that still mean "home".
    pub cdma_home_roaming_indicators: Vec<u32>,
    /// Families inside which the reported RAT is never downgraded on the same cell.
    /// Each family is ordered from lowest to highest capability.
    pub ratchet_rat_families: Vec<Vec<Rat>>,
    /// Take roaming from the service state instead of the SIM home list when picking
    /// the carrier name display rule.
    pub spn_display_rule_use_roaming_from_service_state: bool,
    pub carrier_name_override: bool,
    pub carrier_name: Option<String>,
    /// Wi-Fi calling SPN format, `%s` is replaced by the SPN.
    pub wfc_spn_format: Option<String>,
    pub wfc_data_spn_format: Option<String>,
    /// Do not raise user notices for circuit-switched restrictions.
    pub disable_voice_barring_notification: bool,
    /// Do not raise a notice when the carrier turns the radio off.
    pub disable_carrier_power_off_notification: bool,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            gsm_roaming_networks: vec![],
            gsm_nonroaming_networks: vec![],
            cdma_roaming_networks: vec![],
            cdma_nonroaming_networks: vec![],
            force_home_network: false,
            cdma_home_roaming_indicators: vec![],
            ratchet_rat_families: default_ratchet_families(),
            spn_display_rule_use_roaming_from_service_state: false,
            carrier_name_override: false,
            carrier_name: None,
            wfc_spn_format: None,
            wfc_data_spn_format: None,
            disable_voice_barring_notification: false,
            disable_carrier_power_off_notification: false,
        }
    }
}

fn default_ratchet_families() -> Vec<Vec<Rat>> {
    vec![
        vec![Rat::Umts, Rat::Hsdpa, Rat::Hsupa, Rat::Hspa, Rat::Hspap],
        vec![Rat::Evdo0, Rat::EvdoA, Rat::EvdoB, Rat::Ehrpd],
        vec![Rat::Lte, Rat::LteCa],
    ]
}

impl CarrierConfig {
    pub fn carrier_name(&self) -> Option<&str> {
        if !self.carrier_name_override {
            return None;
        }

        self.carrier_name.as_deref().filter(|n| !n.is_empty())
    }
}

/// Tracker tunables. The defaults match what the radio stack has always shipped with.
#[derive(Debug, Clone, bon::Builder)]
pub struct Settings {
    /// How long a deferred power-off waits for data teardown before forcing it.
    #[builder(default = Duration::from_secs(30))]
    pub power_off_timeout: Duration,
    /// Cell info younger than this is served from cache.
    #[builder(default = Duration::from_secs(2))]
    pub cell_info_min_interval: Duration,
    /// Delay before re-driving the radio after a rejected power command.
    #[builder(default = Duration::from_secs(5))]
    pub radio_power_retry: Duration,
    /// How long to wait for the modem to answer a cell info request.
    #[builder(default = Duration::from_secs(2))]
    pub cell_info_query_timeout: Duration,
    /// Whether the device can register over IWLAN at all.
    #[builder(default = false)]
    pub iwlan_available: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self::builder().build()
    }
}

pub async fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .await
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;

    serde_json::from_str(&contents)
        .wrap_err_with(|| format!("failed to parse {}", path.display()))
}
