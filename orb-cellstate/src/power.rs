//! Radio power sequencing.
//!
//! [`PowerSequencer`] decides what to send to the modem and never does I/O itself.
//! A deferred power-off is identified by its generation. Whichever of the
//! "all data disconnected" callback and the watchdog reports that generation first
//! powers the radio off, the other one then finds nothing pending and is dropped.

use crate::modem::RadioState;
use derive_more::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    #[display("power-on")]
    PowerOn,
    /// Tear data down, then power off. Completes through
    /// [`PowerSequencer::on_all_data_disconnected`] or [`PowerSequencer::on_watchdog`].
    #[display("begin-power-off(gen={generation})")]
    BeginPowerOff { generation: u64 },
    #[display("power-off")]
    PowerOffNow,
    #[display("shutdown")]
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerSequencer {
    desired_on: bool,
    carrier_disabled: bool,
    shutting_down: bool,
    shutdown_issued: bool,
    generation: u64,
    pending_off: Option<u64>,
}

impl Default for PowerSequencer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PowerSequencer {
    pub fn new(desired_on: bool) -> Self {
        Self {
            desired_on,
            carrier_disabled: false,
            shutting_down: false,
            shutdown_issued: false,
            generation: 0,
            pending_off: None,
        }
    }

    pub fn pending_off(&self) -> Option<u64> {
        self.pending_off
    }

    pub fn set_desired(&mut self, on: bool, radio: RadioState) -> Option<PowerAction> {
        self.desired_on = on;
        self.evaluate(radio)
    }

    /// Returns whether the flag changed along with the resulting action.
    pub fn set_carrier_disabled(
        &mut self,
        disabled: bool,
        radio: RadioState,
    ) -> (bool, Option<PowerAction>) {
        let changed = self.carrier_disabled != disabled;
        self.carrier_disabled = disabled;

        (changed, self.evaluate(radio))
    }

    pub fn request_shutdown(&mut self, radio: RadioState) -> Option<PowerAction> {
        self.shutting_down = true;
        self.evaluate(radio)
    }

    /// Drives the radio towards the desired state.
    pub fn evaluate(&mut self, radio: RadioState) -> Option<PowerAction> {
        if self.shutting_down {
            self.supersede_pending_off();
            if radio == RadioState::Unavailable || self.shutdown_issued {
                return None;
            }

            self.shutdown_issued = true;
            return Some(PowerAction::Shutdown);
        }

        let want_on = self.desired_on && !self.carrier_disabled;

        match (want_on, radio) {
            (true, _) => {
                self.supersede_pending_off();
                (radio == RadioState::Off).then_some(PowerAction::PowerOn)
            }
            (false, RadioState::On) if self.pending_off.is_none() => {
                self.generation += 1;
                self.pending_off = Some(self.generation);

                Some(PowerAction::BeginPowerOff {
                    generation: self.generation,
                })
            }
            (false, _) => None,
        }
    }

    pub fn on_all_data_disconnected(&mut self, generation: u64) -> Option<PowerAction> {
        self.complete_off(generation)
    }

    pub fn on_watchdog(&mut self, generation: u64) -> Option<PowerAction> {
        self.complete_off(generation)
    }

    fn complete_off(&mut self, generation: u64) -> Option<PowerAction> {
        if self.pending_off != Some(generation) {
            return None;
        }

        self.pending_off = None;
        Some(PowerAction::PowerOffNow)
    }

    fn supersede_pending_off(&mut self) {
        if self.pending_off.take().is_some() {
            self.generation += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn powers_on_when_desired_and_off() {
        let mut seq = PowerSequencer::new(false);

        assert_eq!(seq.set_desired(true, RadioState::Off), Some(PowerAction::PowerOn));
        assert_eq!(seq.evaluate(RadioState::On), None);
        assert_eq!(seq.evaluate(RadioState::Unavailable), None);
    }

    #[test]
    fn power_off_completes_exactly_once() {
        let mut seq = PowerSequencer::new(true);

        let action = seq.set_desired(false, RadioState::On);
        assert_eq!(action, Some(PowerAction::BeginPowerOff { generation: 1 }));
        assert_eq!(seq.evaluate(RadioState::On), None);

        assert_eq!(seq.on_all_data_disconnected(1), Some(PowerAction::PowerOffNow));
        assert_eq!(seq.on_watchdog(1), None);
    }

    #[test]
    fn newer_request_supersedes_pending_off() {
        let mut seq = PowerSequencer::new(true);
        seq.set_desired(false, RadioState::On);

        assert_eq!(seq.set_desired(true, RadioState::On), None);
        assert_eq!(seq.pending_off(), None);
        assert_eq!(seq.on_watchdog(1), None);

        let action = seq.set_desired(false, RadioState::On);
        assert_eq!(action, Some(PowerAction::BeginPowerOff { generation: 3 }));
        assert_eq!(seq.on_all_data_disconnected(1), None);
        assert_eq!(seq.on_watchdog(3), Some(PowerAction::PowerOffNow));
    }

    #[test]
    fn carrier_disable_overrides_desired_on() {
        let mut seq = PowerSequencer::new(true);

        let (changed, action) = seq.set_carrier_disabled(true, RadioState::On);
        assert!(changed);
        assert_eq!(action, Some(PowerAction::BeginPowerOff { generation: 1 }));

        let (changed, _) = seq.set_carrier_disabled(true, RadioState::On);
        assert!(!changed);

        let (_, action) = seq.set_carrier_disabled(false, RadioState::Off);
        assert_eq!(action, Some(PowerAction::PowerOn));
    }

    #[test]
    fn shutdown_is_unconditional_and_cancels_pending_off() {
        let mut seq = PowerSequencer::new(true);
        seq.set_desired(false, RadioState::On);

        assert_eq!(seq.request_shutdown(RadioState::On), Some(PowerAction::Shutdown));
        assert_eq!(seq.on_all_data_disconnected(1), None);
        assert_eq!(seq.evaluate(RadioState::On), None);
        assert_eq!(seq.set_desired(true, RadioState::Off), None);
    }

    #[test]
    fn no_shutdown_when_radio_unavailable() {
        let mut seq = PowerSequencer::new(true);

        assert_eq!(seq.request_shutdown(RadioState::Unavailable), None);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Desired(bool),
        Carrier(bool),
        Disconnected,
        Watchdog,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<bool>().prop_map(Op::Desired),
            any::<bool>().prop_map(Op::Carrier),
            Just(Op::Disconnected),
            Just(Op::Watchdog),
        ]
    }

    proptest! {
        #[test]
        fn each_power_off_completes_at_most_once_and_the_watchdog_always_can(
            ops in prop::collection::vec(op(), 1..40)
        ) {
            let mut seq = PowerSequencer::new(true);
            let mut radio = RadioState::On;
            let mut begun: Vec<u64> = vec![];
            let mut completions: HashMap<u64, usize> = HashMap::new();

            for op in ops {
                let (generation, action) = match op {
                    Op::Desired(on) => (None, seq.set_desired(on, radio)),
                    Op::Carrier(d) => (None, seq.set_carrier_disabled(d, radio).1),
                    // callbacks are replayed for every generation ever begun, stale ones included
                    Op::Disconnected | Op::Watchdog => {
                        let mut fired = None;
                        for g in &begun {
                            let res = match op {
                                Op::Disconnected => seq.on_all_data_disconnected(*g),
                                _ => seq.on_watchdog(*g),
                            };
                            if res.is_some() {
                                prop_assert!(fired.is_none());
                                fired = Some((Some(*g), res));
                            }
                        }
                        fired.unwrap_or((None, None))
                    }
                };

                match action {
                    Some(PowerAction::PowerOn) => radio = RadioState::On,
                    Some(PowerAction::BeginPowerOff { generation }) => begun.push(generation),
                    Some(PowerAction::PowerOffNow) => {
                        let g = generation.unwrap_or_default();
                        *completions.entry(g).or_default() += 1;
                        radio = RadioState::Off;
                    }
                    Some(PowerAction::Shutdown) | None => {}
                }
            }

            prop_assert!(completions.values().all(|n| *n == 1));

            // the latest pending power-off is always completed by its watchdog
            if let Some(g) = seq.pending_off() {
                prop_assert_eq!(seq.on_watchdog(g), Some(PowerAction::PowerOffNow));
                prop_assert_eq!(seq.on_all_data_disconnected(g), None);
            }
        }
    }
}
