use super::{CellInfo, ChannelError, DataSessions, ModemChannel, RadioState, SelectionMode};
use crate::{
    roaming::{ERI_OFF, ERI_ON},
    service_state::{
        CellIdentity, DataRegInfo, Domain, NetworkRegState, NrState, OperatorName, Rat,
        RegistrationInfo, Transport, VoiceRegInfo,
    },
    utils::run_cmd,
};
use async_trait::async_trait;
use color_eyre::{Result, eyre::OptionExt as _};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{error, warn};

/// [`ModemChannel`] backed by ModemManager's `mmcli`.
#[derive(Debug, Clone)]
pub struct MmcliChannel {
    modem_id: String,
}

impl MmcliChannel {
    pub fn new(modem_id: impl Into<String>) -> Self {
        Self {
            modem_id: modem_id.into(),
        }
    }

    /// Picks the first modem ModemManager knows about.
    pub async fn discover() -> Result<Self> {
        let output = run_cmd("mmcli", &["-L"]).await?;
        let modem_id = parse_mmcli_modem_list(&output)
            .into_iter()
            .next()
            .ok_or_eyre("couldn't find a modem")?;

        Ok(Self::new(modem_id))
    }

    pub fn modem_id(&self) -> &str {
        &self.modem_id
    }

    async fn mmcli(&self, args: &[&str]) -> Result<String, ChannelError> {
        let mut full = vec!["-m", self.modem_id.as_str()];
        full.extend_from_slice(args);

        run_cmd("mmcli", &full).await.map_err(|e| {
            let msg = e.to_string();
            if msg.contains("couldn't find modem") || msg.contains("not found") {
                ChannelError::RadioNotAvailable
            } else {
                ChannelError::Other(msg)
            }
        })
    }

    async fn modem_json(&self) -> Result<Value, ChannelError> {
        let output = self.mmcli(&["-J"]).await?;
        serde_json::from_str(&output).map_err(|e| ChannelError::Malformed(e.to_string()))
    }

    async fn serving_cell(&self) -> Option<CellIdentity> {
        let output = self
            .mmcli(&["--location-get", "--output-json"])
            .await
            .inspect_err(|e| warn!("mmcli --location-get failed: {e}"))
            .ok()?;

        parse_location(&output)
            .inspect_err(|e| warn!("could not parse mmcli location: {e}"))
            .ok()
    }
}

#[async_trait]
impl ModemChannel for MmcliChannel {
    async fn operator_name(&self) -> Result<OperatorName, ChannelError> {
        let json = self.modem_json().await?;
        ensure_not_failed(&json)?;

        Ok(parse_operator(&json))
    }

    async fn registration_info(
        &self,
        domain: Domain,
        transport: Transport,
    ) -> Result<RegistrationInfo, ChannelError> {
        if transport == Transport::Wlan {
            return Err(ChannelError::RequestNotSupported);
        }

        let json = self.modem_json().await?;
        ensure_not_failed(&json)?;

        let mut info = parse_registration(&json, domain)?;
        info.cell_identity = self.serving_cell().await.map(|mut cell| {
            cell.cdma_system_id = info.cell_identity.as_ref().and_then(|c| c.cdma_system_id);
            cell.cdma_network_id = info.cell_identity.as_ref().and_then(|c| c.cdma_network_id);
            cell
        });

        Ok(info)
    }

    async fn network_selection_mode(&self) -> Result<SelectionMode, ChannelError> {
        Err(ChannelError::RequestNotSupported)
    }

    async fn set_radio_power(&self, on: bool) -> Result<(), ChannelError> {
        if on {
            self.mmcli(&["--set-power-state-on"]).await?;
            self.mmcli(&["--enable"]).await?;
        } else {
            self.mmcli(&["--disable"]).await?;
            self.mmcli(&["--set-power-state-low"]).await?;
        }

        Ok(())
    }

    async fn request_shutdown(&self) -> Result<(), ChannelError> {
        self.mmcli(&["--set-power-state-off"]).await?;
        Ok(())
    }

    async fn radio_state(&self) -> Result<RadioState, ChannelError> {
        match self.modem_json().await {
            Ok(json) => Ok(parse_radio_state(&json)),
            Err(ChannelError::RadioNotAvailable) => Ok(RadioState::Unavailable),
            Err(e) => Err(e),
        }
    }

    async fn cell_info_list(&self) -> Result<Vec<CellInfo>, ChannelError> {
        let json = self.modem_json().await?;
        ensure_not_failed(&json)?;
        let rat = parse_access_tech(&json);

        Ok(self
            .serving_cell()
            .await
            .map(|identity| CellInfo {
                registered: true,
                rat,
                identity,
            })
            .into_iter()
            .collect())
    }
}

#[async_trait]
impl DataSessions for MmcliChannel {
    async fn all_disconnected(&self) -> bool {
        match self.modem_json().await {
            Ok(json) => str_at(&json, &["modem", "generic", "state"]) != Some("connected"),
            Err(e) => {
                warn!("could not read modem state, assuming data is down: {e}");
                true
            }
        }
    }

    async fn tear_down_all(&self) {
        if let Err(e) = self.mmcli(&["--simple-disconnect"]).await {
            error!("mmcli --simple-disconnect failed: {e}");
        }
    }
}

/// Returns the string at `path`, treating mmcli's `--` placeholder as absent.
fn str_at<'a>(json: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(json, |v, key| v.get(key))?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "--")
}

fn ensure_not_failed(json: &Value) -> Result<(), ChannelError> {
    match str_at(json, &["modem", "generic", "state"]) {
        Some("failed") => Err(ChannelError::RadioNotAvailable),
        _ => Ok(()),
    }
}

fn parse_mmcli_modem_list(str: &str) -> Vec<String> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^/org/freedesktop/ModemManager\d+/Modem/(?P<id>\d+)\s+\[(?P<vendor>[^\]]+)]\s+(?P<model>.+)$").unwrap()
    });

    str.trim()
        .split("\n")
        .map(|line| line.trim())
        .filter(|line| line.starts_with("/org/freedesktop"))
        .filter_map(|line| Some(RE.captures(line)?.name("id")?.as_str().to_string()))
        .collect()
}

fn parse_radio_state(json: &Value) -> RadioState {
    if str_at(json, &["modem", "generic", "state"]) == Some("failed") {
        return RadioState::Unavailable;
    }

    match str_at(json, &["modem", "generic", "power-state"]) {
        Some("on") => RadioState::On,
        Some("low") | Some("off") => RadioState::Off,
        _ => RadioState::Unavailable,
    }
}

fn parse_operator(json: &Value) -> OperatorName {
    let name = str_at(json, &["modem", "3gpp", "operator-name"]).map(str::to_string);

    OperatorName {
        long: name.clone(),
        short: name,
        numeric: str_at(json, &["modem", "3gpp", "operator-code"]).map(str::to_string),
    }
}

fn access_techs(json: &Value) -> Vec<&str> {
    json["modem"]["generic"]["access-technologies"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default()
}

fn rat_from_mm(tech: &str) -> Rat {
    match tech {
        "gsm" | "gsm-compact" => Rat::Gsm,
        "gprs" => Rat::Gprs,
        "edge" => Rat::Edge,
        "umts" => Rat::Umts,
        "hsdpa" => Rat::Hsdpa,
        "hsupa" => Rat::Hsupa,
        "hspa" => Rat::Hspa,
        "hspa-plus" => Rat::Hspap,
        "1xrtt" => Rat::OneXRtt,
        "evdo0" => Rat::Evdo0,
        "evdoa" => Rat::EvdoA,
        "evdob" => Rat::EvdoB,
        "lte" | "lte-cat-m" | "lte-nb-iot" => Rat::Lte,
        "5gnr" => Rat::Nr,
        _ => Rat::Unknown,
    }
}

/// Access technology of the serving cell. With LTE anchored NR (NSA) mmcli lists
/// both, the registration itself is on LTE.
fn parse_access_tech(json: &Value) -> Rat {
    let techs = access_techs(json);
    if techs.contains(&"lte") {
        return Rat::Lte;
    }

    techs.first().map_or(Rat::Unknown, |t| rat_from_mm(t))
}

fn reg_state_from_mm(state: &str) -> (NetworkRegState, bool) {
    match state {
        "home" | "home-sms-only" | "home-csfb-not-preferred" | "registered" => {
            (NetworkRegState::Home, false)
        }
        "roaming" | "roaming-sms-only" | "roaming-csfb-not-preferred" => {
            (NetworkRegState::Roaming, false)
        }
        "searching" => (NetworkRegState::Searching, false),
        "denied" => (NetworkRegState::Denied, false),
        "idle" => (NetworkRegState::NotRegistered, false),
        "emergency-only" => (NetworkRegState::NotRegistered, true),
        _ => (NetworkRegState::Unknown, false),
    }
}

fn parse_registration(json: &Value, domain: Domain) -> Result<RegistrationInfo, ChannelError> {
    let rat = parse_access_tech(json);

    let gpp_state = str_at(json, &["modem", "3gpp", "registration-state"]);
    let cdma_state = str_at(json, &["modem", "cdma", "cdma1x-registration-state"])
        .or_else(|| str_at(json, &["modem", "cdma", "evdo-registration-state"]));

    let (mut reg_state, emergency_enabled) = match (gpp_state, cdma_state) {
        (Some(s), _) => reg_state_from_mm(s),
        (None, Some(s)) => reg_state_from_mm(s),
        (None, None) => (NetworkRegState::Unknown, false),
    };

    if domain == Domain::Ps
        && reg_state.is_in_service()
        && gpp_state.is_some()
        && str_at(json, &["modem", "3gpp", "packet-service-state"]) != Some("attached")
    {
        reg_state = NetworkRegState::Searching;
    }

    let parse_u32 = |key: &str| -> Result<Option<u32>, ChannelError> {
        str_at(json, &["modem", "cdma", key])
            .map(|v| {
                v.parse()
                    .map_err(|_| ChannelError::Malformed(format!("cdma.{key}: {v}")))
            })
            .transpose()
    };

    let sid = parse_u32("sid")?;
    let nid = parse_u32("nid")?;
    let cell_identity = (sid.is_some() || nid.is_some()).then(|| CellIdentity {
        cdma_system_id: sid,
        cdma_network_id: nid,
        ..Default::default()
    });

    let voice = (domain == Domain::Cs).then(|| VoiceRegInfo {
        css_supported: false,
        roaming_indicator: if reg_state.is_roaming() { ERI_ON } else { ERI_OFF },
        system_is_in_prl: false,
        default_roaming_indicator: ERI_OFF,
    });

    let data = (domain == Domain::Ps).then(|| {
        let techs = access_techs(json);
        DataRegInfo {
            nr_state: if techs.contains(&"lte") && techs.contains(&"5gnr") {
                NrState::Connected
            } else {
                NrState::None
            },
            ..Default::default()
        }
    });

    Ok(RegistrationInfo {
        domain,
        transport: Transport::Wwan,
        reg_state,
        rat,
        reject_cause: 0,
        emergency_enabled,
        cell_identity,
        voice,
        data,
    })
}

fn parse_location(str: &str) -> Result<CellIdentity> {
    let json: Value = serde_json::from_str(str)?;
    let loc = ["modem", "location", "3gpp"];
    let hex = |key: &str| -> Option<u64> {
        let mut path = loc.to_vec();
        path.push(key);
        str_at(&json, &path).and_then(|v| u64::from_str_radix(v, 16).ok())
    };

    let mcc = str_at(&json, &["modem", "location", "3gpp", "mcc"]);
    let mnc = str_at(&json, &["modem", "location", "3gpp", "mnc"]);
    let plmn = mcc.zip(mnc).map(|(mcc, mnc)| format!("{mcc}{mnc}"));

    let area_code = hex("tac")
        .filter(|tac| *tac != 0)
        .or_else(|| hex("lac"))
        .map(|a| a as u32);

    Ok(CellIdentity {
        plmn,
        area_code,
        cell_id: hex("cid"),
        ..Default::default()
    })
}
