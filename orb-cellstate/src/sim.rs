use serde::{Deserialize, Serialize};

/// Data read from the SIM that the tracker needs for roaming and display decisions.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimRecords {
    /// False until the records have been read from the card.
    pub loaded: bool,
    /// Service provider name (EF_SPN).
    pub spn: Option<String>,
    /// Display condition bits, see [`SimRecords::SHOW_PLMN_IN_HOME`] and
    /// [`SimRecords::SHOW_SPN_IN_ROAMING`].
    pub display_condition: u8,
    /// Numerics treated as home: HPLMN, EHPLMN and SPDI entries.
    pub home_numerics: Vec<String>,
    /// MCC + MNC of the subscription, derived from the IMSI.
    pub operator_numeric: Option<String>,
    /// Brand name set for this card. Wins over every other name source.
    pub brand_override: Option<String>,
    /// Home system ids for CDMA (RUIM/NV).
    pub cdma_home_system_ids: Vec<u32>,
}

impl SimRecords {
    /// Show the PLMN next to the SPN while registered on a home network.
    pub const SHOW_PLMN_IN_HOME: u8 = 0x01;
    /// Show the SPN next to the PLMN while roaming.
    pub const SHOW_SPN_IN_ROAMING: u8 = 0x02;

    pub fn show_plmn_in_home(&self) -> bool {
        self.display_condition & Self::SHOW_PLMN_IN_HOME != 0
    }

    pub fn show_spn_in_roaming(&self) -> bool {
        self.display_condition & Self::SHOW_SPN_IN_ROAMING != 0
    }

    pub fn brand_override(&self) -> Option<&str> {
        self.brand_override.as_deref().filter(|b| !b.is_empty())
    }

    pub fn spn(&self) -> Option<&str> {
        self.spn.as_deref().filter(|s| !s.is_empty())
    }

    pub fn is_home_numeric(&self, numeric: &str) -> bool {
        self.home_numerics.iter().any(|h| h == numeric)
    }

    /// True when every configured home system id is zero, i.e. no usable list.
    pub fn cdma_sids_all_zero(&self) -> bool {
        self.cdma_home_system_ids.iter().all(|sid| *sid == 0)
    }

    pub fn is_cdma_home_system(&self, sid: u32) -> bool {
        !self.cdma_sids_all_zero() && self.cdma_home_system_ids.contains(&sid)
    }
}
