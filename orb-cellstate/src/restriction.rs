//! Network imposed access restrictions and the notices raised on their transitions.

use derive_more::Display;
use serde::{Deserialize, Serialize};

pub const CS_EMERGENCY: u32 = 0x01;
pub const CS_NORMAL: u32 = 0x02;
pub const CS_ALL: u32 = 0x04;
pub const PS_ALL: u32 = 0x10;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedState {
    pub ps: bool,
    pub cs_normal: bool,
    pub cs_emergency: bool,
}

impl RestrictedState {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            ps: bits & PS_ALL != 0,
            cs_normal: bits & (CS_NORMAL | CS_ALL) != 0,
            cs_emergency: bits & (CS_EMERGENCY | CS_ALL) != 0,
        }
    }

    /// Both normal and emergency calls are barred.
    pub fn cs_all(&self) -> bool {
        self.cs_normal && self.cs_emergency
    }

    pub fn cs_any(&self) -> bool {
        self.cs_normal || self.cs_emergency
    }
}

/// A user notice. The names describe the restriction, so `CsEnabled` means all
/// voice calls have become barred.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestrictionNotice {
    #[display("ps-enabled")]
    PsEnabled,
    #[display("ps-disabled")]
    PsDisabled,
    #[display("cs-enabled")]
    CsEnabled,
    #[display("cs-disabled")]
    CsDisabled,
    #[display("cs-normal-enabled")]
    CsNormalEnabled,
    #[display("cs-emergency-enabled")]
    CsEmergencyEnabled,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transition {
    pub ps: Option<RestrictionNotice>,
    pub cs: Option<RestrictionNotice>,
}

pub fn transition(old: RestrictedState, new: RestrictedState) -> Transition {
    use RestrictionNotice::*;

    let ps = match (old.ps, new.ps) {
        (false, true) => Some(PsEnabled),
        (true, false) => Some(PsDisabled),
        _ => None,
    };

    let cs = if old.cs_all() {
        if !new.cs_any() {
            Some(CsDisabled)
        } else if !new.cs_normal {
            Some(CsEmergencyEnabled)
        } else if !new.cs_emergency {
            Some(CsNormalEnabled)
        } else {
            None
        }
    } else if old.cs_emergency && !old.cs_normal {
        if !new.cs_any() {
            Some(CsDisabled)
        } else if new.cs_all() {
            Some(CsEnabled)
        } else if new.cs_normal {
            Some(CsNormalEnabled)
        } else {
            None
        }
    } else if !old.cs_emergency && old.cs_normal {
        if !new.cs_any() {
            Some(CsDisabled)
        } else if new.cs_all() {
            Some(CsEnabled)
        } else if new.cs_emergency {
            Some(CsEmergencyEnabled)
        } else {
            None
        }
    } else if new.cs_all() {
        Some(CsEnabled)
    } else if new.cs_emergency {
        Some(CsEmergencyEnabled)
    } else if new.cs_normal {
        Some(CsNormalEnabled)
    } else {
        None
    };

    Transition { ps, cs }
}
