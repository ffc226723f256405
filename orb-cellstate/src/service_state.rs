//! The committed view of the device's registration with the network.
//!
//! A [`ServiceState`] is built field by field while a poll round is outstanding and is
//! only published once the round completes. Registration records are kept per
//! (domain, transport) slot, see [`RegistrationInfo`].

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Service state as seen by consumers of the tracker.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegState {
    #[display("in-service")]
    InService,
    #[default]
    #[display("out-of-service")]
    OutOfService,
    #[display("emergency-only")]
    EmergencyOnly,
    #[display("power-off")]
    PowerOff,
}

impl RegState {
    pub fn is_in_service(self) -> bool {
        matches!(self, RegState::InService)
    }
}

/// Radio technology family the phone runs as. Switching family resets the snapshot.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhoneType {
    #[default]
    #[display("gsm")]
    Gsm,
    #[display("cdma")]
    Cdma,
}

/// Registration state as reported by the modem for a single domain/transport.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkRegState {
    #[default]
    #[display("not-registered")]
    NotRegistered,
    #[display("home")]
    Home,
    #[display("searching")]
    Searching,
    #[display("denied")]
    Denied,
    #[display("unknown")]
    Unknown,
    #[display("roaming")]
    Roaming,
}

impl NetworkRegState {
    pub fn is_in_service(self) -> bool {
        matches!(self, NetworkRegState::Home | NetworkRegState::Roaming)
    }

    pub fn is_roaming(self) -> bool {
        matches!(self, NetworkRegState::Roaming)
    }
}

/// Circuit-switched (voice) or packet-switched (data) registration domain.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    #[display("cs")]
    Cs,
    #[display("ps")]
    Ps,
}

/// Transport carrying a registration: the cellular radio (WWAN) or Wi-Fi (IWLAN).
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    #[display("wwan")]
    Wwan,
    #[display("wlan")]
    Wlan,
}

impl Transport {
    pub const ALL: [Transport; 2] = [Transport::Wwan, Transport::Wlan];
}

/// Radio Access Technology.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rat {
    #[default]
    Unknown,
    Gsm,
    Gprs,
    Edge,
    Umts,
    Hsdpa,
    Hsupa,
    Hspa,
    Hspap,
    TdScdma,
    Is95,
    OneXRtt,
    Evdo0,
    EvdoA,
    EvdoB,
    Ehrpd,
    Lte,
    LteCa,
    Nr,
    Iwlan,
}

impl Rat {
    pub fn as_str(self) -> &'static str {
        match self {
            Rat::Unknown => "unknown",
            Rat::Gsm => "gsm",
            Rat::Gprs => "gprs",
            Rat::Edge => "edge",
            Rat::Umts => "umts",
            Rat::Hsdpa => "hsdpa",
            Rat::Hsupa => "hsupa",
            Rat::Hspa => "hspa",
            Rat::Hspap => "hspap",
            Rat::TdScdma => "td-scdma",
            Rat::Is95 => "is95",
            Rat::OneXRtt => "1xrtt",
            Rat::Evdo0 => "evdo-0",
            Rat::EvdoA => "evdo-a",
            Rat::EvdoB => "evdo-b",
            Rat::Ehrpd => "ehrpd",
            Rat::Lte => "lte",
            Rat::LteCa => "lte-ca",
            Rat::Nr => "nr",
            Rat::Iwlan => "iwlan",
        }
    }

    /// Technologies of the 3GPP2 (CDMA) family.
    pub fn is_cdma(self) -> bool {
        matches!(
            self,
            Rat::Is95
                | Rat::OneXRtt
                | Rat::Evdo0
                | Rat::EvdoA
                | Rat::EvdoB
                | Rat::Ehrpd
        )
    }

    /// Technologies that carry no circuit-switched voice.
    pub fn is_ps_only(self) -> bool {
        matches!(self, Rat::Lte | Rat::LteCa | Rat::Nr | Rat::Iwlan)
    }

    /// Coarse generation, used for metrics tags.
    pub fn generation(self) -> &'static str {
        match self {
            Rat::Unknown => "unknown",
            Rat::Gsm | Rat::Gprs | Rat::Edge | Rat::Is95 | Rat::OneXRtt => "2g",
            Rat::Umts
            | Rat::Hsdpa
            | Rat::Hsupa
            | Rat::Hspa
            | Rat::Hspap
            | Rat::TdScdma
            | Rat::Evdo0
            | Rat::EvdoA
            | Rat::EvdoB
            | Rat::Ehrpd => "3g",
            Rat::Lte | Rat::LteCa => "4g",
            Rat::Nr => "5g",
            Rat::Iwlan => "iwlan",
        }
    }
}

impl fmt::Display for Rat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// NR (5G) secondary-cell connectivity as seen while camped on LTE.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NrState {
    #[default]
    #[display("none")]
    None,
    #[display("restricted")]
    Restricted,
    #[display("not-restricted")]
    NotRestricted,
    #[display("connected")]
    Connected,
}

#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrequencyRange {
    #[default]
    #[display("unknown")]
    Unknown,
    #[display("low")]
    Low,
    #[display("mid")]
    Mid,
    #[display("high")]
    High,
    #[display("mmwave")]
    MmWave,
}

/// Identity of the serving cell. 3GPP cells fill `plmn`, `area_code` and `cell_id`,
/// CDMA cells fill the `cdma_*` fields.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIdentity {
    pub plmn: Option<String>,
    /// LAC for GSM/UMTS, TAC for LTE/NR.
    pub area_code: Option<u32>,
    pub cell_id: Option<u64>,
    pub cdma_system_id: Option<u32>,
    pub cdma_network_id: Option<u32>,
    pub cdma_base_station_id: Option<u32>,
}

/// Circuit-switched specifics of a registration.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceRegInfo {
    /// Concurrent services (voice + data) support indicator.
    pub css_supported: bool,
    pub roaming_indicator: u32,
    pub system_is_in_prl: bool,
    pub default_roaming_indicator: u32,
}

/// Packet-switched specifics of a registration.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRegInfo {
    pub nr_state: NrState,
    pub nr_frequency_range: FrequencyRange,
    pub carrier_aggregation: bool,
    pub cell_bandwidths_khz: Vec<u32>,
    pub channel_number: Option<u32>,
}

/// One registration record, for a single domain on a single transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationInfo {
    pub domain: Domain,
    pub transport: Transport,
    pub reg_state: NetworkRegState,
    pub rat: Rat,
    pub reject_cause: u32,
    pub emergency_enabled: bool,
    pub cell_identity: Option<CellIdentity>,
    pub voice: Option<VoiceRegInfo>,
    pub data: Option<DataRegInfo>,
}

impl RegistrationInfo {
    pub fn new(domain: Domain, transport: Transport) -> Self {
        Self {
            domain,
            transport,
            reg_state: NetworkRegState::NotRegistered,
            rat: Rat::Unknown,
            reject_cause: 0,
            emergency_enabled: false,
            cell_identity: None,
            voice: None,
            data: None,
        }
    }

    pub fn is_in_service(&self) -> bool {
        self.reg_state.is_in_service()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorName {
    pub long: Option<String>,
    pub short: Option<String>,
    /// MCC + MNC, e.g. `26202`.
    pub numeric: Option<String>,
}

impl OperatorName {
    pub fn mcc(&self) -> Option<&str> {
        self.numeric.as_deref().and_then(|n| n.get(..3))
    }
}

/// CDMA specific fields. Only meaningful while on a CDMA phone type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdmaInfo {
    pub system_id: Option<u32>,
    pub network_id: Option<u32>,
    pub roaming_indicator: u32,
    pub default_roaming_indicator: u32,
    pub eri_icon_index: u32,
    pub eri_icon_flashing: bool,
}

impl Default for CdmaInfo {
    fn default() -> Self {
        Self {
            system_id: None,
            network_id: None,
            roaming_indicator: crate::roaming::ERI_OFF,
            default_roaming_indicator: crate::roaming::ERI_OFF,
            eri_icon_index: crate::roaming::ERI_OFF,
            eri_icon_flashing: false,
        }
    }
}

/// Snapshot of the device's registration.
///
/// `voice_reg_state`, `data_reg_state`, the roaming flags and the CDMA block are
/// derived from the registration records when a round is finalised.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    pub voice_reg_state: RegState,
    pub data_reg_state: RegState,
    pub cs_wwan: Option<RegistrationInfo>,
    pub ps_wwan: Option<RegistrationInfo>,
    pub ps_wlan: Option<RegistrationInfo>,
    pub voice_roaming: bool,
    pub data_roaming: bool,
    pub operator: OperatorName,
    pub manual_selection: bool,
    pub css_indicator: bool,
    pub iwlan_preferred: bool,
    pub cdma: CdmaInfo,
    pub channel_number: Option<u32>,
    pub cell_bandwidths_khz: Vec<u32>,
}

impl ServiceState {
    /// Fresh template used at the start of every round.
    pub fn out_of_service() -> Self {
        Self::default()
    }

    pub fn power_off() -> Self {
        Self {
            voice_reg_state: RegState::PowerOff,
            data_reg_state: RegState::PowerOff,
            ..Self::default()
        }
    }

    pub fn registration(
        &self,
        domain: Domain,
        transport: Transport,
    ) -> Option<&RegistrationInfo> {
        match (domain, transport) {
            (Domain::Cs, Transport::Wwan) => self.cs_wwan.as_ref(),
            (Domain::Ps, Transport::Wwan) => self.ps_wwan.as_ref(),
            (Domain::Ps, Transport::Wlan) => self.ps_wlan.as_ref(),
            (Domain::Cs, Transport::Wlan) => None,
        }
    }

    pub(crate) fn registration_slot(
        &mut self,
        domain: Domain,
        transport: Transport,
    ) -> Option<&mut Option<RegistrationInfo>> {
        match (domain, transport) {
            (Domain::Cs, Transport::Wwan) => Some(&mut self.cs_wwan),
            (Domain::Ps, Transport::Wwan) => Some(&mut self.ps_wwan),
            (Domain::Ps, Transport::Wlan) => Some(&mut self.ps_wlan),
            (Domain::Cs, Transport::Wlan) => None,
        }
    }

    pub fn voice_rat(&self) -> Rat {
        self.cs_wwan.as_ref().map_or(Rat::Unknown, |r| r.rat)
    }

    /// Data RAT, taking the IWLAN record when it overlays cellular.
    pub fn data_rat(&self) -> Rat {
        if self.iwlan_overlays_cellular() {
            return Rat::Iwlan;
        }

        self.ps_wwan.as_ref().map_or(Rat::Unknown, |r| r.rat)
    }

    /// IWLAN is used for data when it is in service and either cellular data is not,
    /// or IWLAN is the preferred transport.
    pub fn iwlan_overlays_cellular(&self) -> bool {
        let wlan_in_service = self.ps_wlan.as_ref().is_some_and(|r| r.is_in_service());
        let wwan_in_service = self.ps_wwan.as_ref().is_some_and(|r| r.is_in_service());

        wlan_in_service && (!wwan_in_service || self.iwlan_preferred)
    }

    pub fn data_in_service_on(&self, transport: Transport) -> bool {
        self.registration(Domain::Ps, transport)
            .is_some_and(|r| r.is_in_service())
    }

    /// Voice state, except that an in-service data registration wins over an
    /// out-of-service or emergency-only voice registration.
    pub fn combined_reg_state(&self) -> RegState {
        match self.voice_reg_state {
            RegState::OutOfService | RegState::EmergencyOnly
                if self.data_reg_state == RegState::InService =>
            {
                RegState::InService
            }
            state => state,
        }
    }

    pub fn is_emergency_only(&self) -> bool {
        self.voice_reg_state == RegState::EmergencyOnly
    }

    pub fn roaming(&self) -> bool {
        self.voice_roaming || self.data_roaming
    }

    /// Serving cell identity, preferring the CS record.
    pub fn cell_identity(&self) -> Option<&CellIdentity> {
        self.cs_wwan
            .as_ref()
            .and_then(|r| r.cell_identity.as_ref())
            .or_else(|| self.ps_wwan.as_ref().and_then(|r| r.cell_identity.as_ref()))
    }

    pub fn nr_state(&self) -> NrState {
        self.ps_wwan
            .as_ref()
            .and_then(|r| r.data.as_ref())
            .map_or(NrState::None, |d| d.nr_state)
    }

    pub fn nr_frequency_range(&self) -> FrequencyRange {
        self.ps_wwan
            .as_ref()
            .and_then(|r| r.data.as_ref())
            .map_or(FrequencyRange::Unknown, |d| d.nr_frequency_range)
    }

    pub fn voice_reject_cause(&self) -> u32 {
        self.cs_wwan.as_ref().map_or(0, |r| r.reject_cause)
    }

    /// Derives the service level fields from the registration records.
    ///
    /// Only reads fields written by the sub-merges, so it is order independent.
    pub fn derive_from_registrations(&mut self) {
        self.voice_reg_state = match &self.cs_wwan {
            Some(r) if r.is_in_service() => RegState::InService,
            Some(r) if r.emergency_enabled => RegState::EmergencyOnly,
            _ => RegState::OutOfService,
        };

        self.data_reg_state = if self.data_in_service_on(Transport::Wwan)
            || self.iwlan_overlays_cellular()
        {
            RegState::InService
        } else {
            RegState::OutOfService
        };

        self.voice_roaming = self.cs_wwan.as_ref().is_some_and(|r| r.reg_state.is_roaming());
        self.data_roaming = if self.iwlan_overlays_cellular() {
            false
        } else {
            self.ps_wwan.as_ref().is_some_and(|r| r.reg_state.is_roaming())
        };

        let voice = self.cs_wwan.as_ref().and_then(|r| r.voice.as_ref());
        self.css_indicator = voice.is_some_and(|v| v.css_supported);
        if let Some(voice) = voice {
            self.cdma.roaming_indicator = voice.roaming_indicator;
            self.cdma.default_roaming_indicator = voice.default_roaming_indicator;
        }

        if let Some(cell) = self.cs_wwan.as_ref().and_then(|r| r.cell_identity.as_ref()) {
            self.cdma.system_id = cell.cdma_system_id;
            self.cdma.network_id = cell.cdma_network_id;
        }

        let data = self.ps_wwan.as_ref().and_then(|r| r.data.as_ref());
        self.channel_number = data.and_then(|d| d.channel_number);
        self.cell_bandwidths_khz = data.map(|d| d.cell_bandwidths_khz.clone()).unwrap_or_default();
    }
}
