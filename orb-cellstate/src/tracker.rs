//! The service state tracker.
//!
//! One task owns all mutable state and consumes [`Event`]s from a single queue. Modem
//! requests and timers are spawned futures that post their outcome back to the same
//! queue, so nothing ever blocks the loop and every state change happens in
//! [`ServiceStateTracker::handle`].

use crate::{
    cell_info::CellInfoCache,
    config::{CarrierConfig, Settings},
    diff::{ChangeSet, diff},
    display::{self, DisplayPublisher, DisplayTuple},
    merge::merge_sub_result,
    modem::{CellInfo, ChannelError, DataSessions, ModemChannel, RadioState},
    persist::StateSink,
    poll::{self, PollKind, PollRound, RoundSeq, SubResult},
    power::{PowerAction, PowerSequencer},
    ratchet::ratchet,
    registrants::{self, Category, Notice, Payload, Registrant, Registrants, Token},
    restriction::{self, RestrictedState, RestrictionNotice},
    roaming,
    service_state::{Domain, NetworkRegState, PhoneType, Rat, ServiceState, Transport},
    sim::SimRecords,
    utils::send_after,
};
use color_eyre::{Result, eyre::eyre};
use std::sync::Arc;
use tokio::{
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender},
        oneshot, watch,
    },
    task,
    time::Instant,
};
use tracing::{debug, error, info, trace, warn};

#[derive(Debug)]
pub enum Event {
    PollState { forced: bool },
    NetworkStateChanged,
    RadioStateChanged(RadioState),
    PhoneTypeChanged(PhoneType),
    CarrierConfigChanged(CarrierConfig),
    SimRecordsChanged(SimRecords),
    IwlanPreferenceChanged(bool),
    /// Restriction bitmask as reported by the modem.
    RestrictedStateChanged(u32),

    PollResult { round: RoundSeq, result: SubResult },

    SetRadioPower(bool),
    SetRadioDisabledByCarrier(bool),
    RadioPowerDone { on: bool, result: Result<(), ChannelError> },
    RetryRadioPower,
    AllDataDisconnected { generation: u64 },
    PowerOffWatchdog { generation: u64 },
    Shutdown,
    ShutdownDone(Result<(), ChannelError>),

    Register { category: Category, registrant: Registrant },
    Unregister { category: Category, token: Token },

    RequestCellInfo(oneshot::Sender<Vec<CellInfo>>),
    CellInfoResult { request: u64, result: Result<Vec<CellInfo>, ChannelError> },
    CellInfoTimeout { request: u64 },
}

pub struct ServiceStateTracker {
    channel: Arc<dyn ModemChannel>,
    data: Arc<dyn DataSessions>,
    default_data: Option<Arc<dyn DataSessions>>,
    sink: Arc<dyn StateSink>,
    settings: Settings,
    config: CarrierConfig,
    sim: SimRecords,
    phone: PhoneType,
    radio: RadioState,
    iwlan_preferred: bool,

    committed: Arc<ServiceState>,
    pending: ServiceState,
    round: Option<PollRound>,
    last_seq: RoundSeq,

    restricted: RestrictedState,
    power: PowerSequencer,
    display: DisplayPublisher,
    registrants: Registrants,
    cell_info: CellInfoCache,

    tx: WeakUnboundedSender<Event>,
    rx: UnboundedReceiver<Event>,
    state_tx: watch::Sender<Arc<ServiceState>>,
}

#[bon::bon]
impl ServiceStateTracker {
    #[builder]
    pub fn new(
        channel: Arc<dyn ModemChannel>,
        data: Arc<dyn DataSessions>,
        // default data subscription, when it is not this one
        default_data: Option<Arc<dyn DataSessions>>,
        sink: Arc<dyn StateSink>,
        #[builder(default)] settings: Settings,
        #[builder(default)] config: CarrierConfig,
        #[builder(default)] sim: SimRecords,
        #[builder(default)] phone: PhoneType,
        #[builder(default = true)] desired_power_on: bool,
        // persisted by a previous run, seeds display deduplication
        last_display: Option<DisplayTuple>,
    ) -> (Self, TrackerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let committed = Arc::new(ServiceState::out_of_service());
        let (state_tx, state_rx) = watch::channel(committed.clone());

        let tracker = Self {
            channel,
            data,
            default_data,
            sink,
            settings,
            config,
            sim,
            phone,
            radio: RadioState::Unavailable,
            iwlan_preferred: false,
            committed,
            pending: ServiceState::out_of_service(),
            round: None,
            last_seq: RoundSeq::default(),
            restricted: RestrictedState::default(),
            power: PowerSequencer::new(desired_power_on),
            display: DisplayPublisher::with_last(last_display),
            registrants: Registrants::default(),
            cell_info: CellInfoCache::default(),
            tx: tx.downgrade(),
            rx,
            state_tx,
        };

        let handle = TrackerHandle {
            tx,
            state: state_rx,
        };

        (tracker, handle)
    }
}

impl ServiceStateTracker {
    /// Runs until every [`TrackerHandle`] and in-flight request is gone.
    pub async fn run(mut self) -> Result<()> {
        info!("service state tracker started");

        while let Some(event) = self.rx.recv().await {
            self.handle(event);
        }

        info!("service state tracker stopped");

        Ok(())
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::PollState { forced } => self.start_poll(forced),
            Event::NetworkStateChanged => self.start_poll(false),

            Event::RadioStateChanged(radio) => {
                if radio != self.radio {
                    info!("radio state {} -> {radio}", self.radio);
                }
                self.radio = radio;

                let action = self.power.evaluate(radio);
                self.execute(action);
                self.start_poll(false);
            }

            Event::PhoneTypeChanged(phone) => {
                if phone == self.phone {
                    return;
                }

                info!("phone type {} -> {phone}, resetting service state", self.phone);
                self.phone = phone;
                self.round = None;
                self.commit(ServiceState::out_of_service());
                self.start_poll(false);
            }

            Event::CarrierConfigChanged(config) => {
                debug!("carrier config changed");
                self.config = config;
                self.start_poll(false);
            }

            Event::SimRecordsChanged(sim) => {
                debug!(loaded = sim.loaded, "sim records changed");
                self.sim = sim;
                self.start_poll(false);
            }

            Event::IwlanPreferenceChanged(preferred) => {
                self.iwlan_preferred = preferred;
                self.start_poll(false);
            }

            Event::RestrictedStateChanged(bits) => self.restricted_state_changed(bits),

            Event::PollResult { round, result } => self.poll_result(round, result),

            Event::SetRadioPower(on) => {
                info!("radio power requested: {}", if on { "on" } else { "off" });
                let action = self.power.set_desired(on, self.radio);
                self.execute(action);
            }

            Event::SetRadioDisabledByCarrier(disabled) => {
                let (changed, action) = self.power.set_carrier_disabled(disabled, self.radio);
                if changed {
                    info!(disabled, "radio disabled by carrier changed");
                    if !self.config.disable_carrier_power_off_notification {
                        self.registrants
                            .notify(Category::RadioDisabledByCarrier, Payload::Bool(disabled));
                    }
                }
                self.execute(action);
            }

            Event::RadioPowerDone { on, result } => match result {
                Ok(()) => debug!(on, "radio power command acknowledged"),
                Err(e) => {
                    error!(
                        on,
                        "radio power command failed: {e}, retrying in {}s",
                        self.settings.radio_power_retry.as_secs()
                    );
                    if let Some(tx) = self.tx.upgrade() {
                        send_after(tx, self.settings.radio_power_retry, Event::RetryRadioPower);
                    }
                }
            },

            Event::RetryRadioPower => {
                let action = self.power.evaluate(self.radio);
                self.execute(action);
            }

            Event::AllDataDisconnected { generation } => {
                let action = self.power.on_all_data_disconnected(generation);
                if action.is_some() {
                    info!(generation, "data torn down, powering radio off");
                }
                self.execute(action);
            }

            Event::PowerOffWatchdog { generation } => {
                let action = self.power.on_watchdog(generation);
                if action.is_some() {
                    warn!(
                        generation,
                        "data teardown did not finish in {}s, forcing radio off",
                        self.settings.power_off_timeout.as_secs()
                    );
                }
                self.execute(action);
            }

            Event::Shutdown => {
                info!("device shutting down");
                let action = self.power.request_shutdown(self.radio);
                self.execute(action);
            }

            Event::ShutdownDone(result) => {
                if let Err(e) = result {
                    error!("modem shutdown failed: {e}");
                }
            }

            Event::Register {
                category,
                registrant,
            } => {
                if let Some(payload) =
                    registrants::backfill(category, &self.committed, &self.restricted)
                {
                    let _ = registrant.tx.send(Notice {
                        category,
                        token: registrant.token,
                        payload,
                    });
                }
                self.registrants.add(category, registrant);
            }

            Event::Unregister { category, token } => self.registrants.remove(category, token),

            Event::RequestCellInfo(reply) => {
                let request = self.cell_info.request(
                    reply,
                    Instant::now(),
                    self.settings.cell_info_min_interval,
                );
                if let Some(request) = request {
                    self.query_cell_info(request);
                }
            }

            Event::CellInfoResult { request, result } => {
                self.cell_info.on_result(request, result, Instant::now())
            }

            Event::CellInfoTimeout { request } => self.cell_info.on_timeout(request),
        }
    }

    fn start_poll(&mut self, forced: bool) {
        self.last_seq = self.last_seq.next();
        let seq = self.last_seq;
        self.round = None;
        self.pending = ServiceState::out_of_service();

        match self.radio {
            RadioState::Unavailable => {
                debug!(%seq, "radio unavailable, skipping poll");
                self.commit(ServiceState::out_of_service());
                return;
            }
            RadioState::Off
                if !forced && self.committed.data_rat() != Rat::Iwlan =>
            {
                debug!(%seq, "radio off, skipping poll");
                self.commit(ServiceState::power_off());
                return;
            }
            _ => {}
        }

        let Some(tx) = self.tx.upgrade() else {
            return;
        };

        self.pending.iwlan_preferred = self.iwlan_preferred;
        let kinds = poll::plan(self.settings.iwlan_available, self.phone == PhoneType::Gsm);
        let mut round = PollRound::new(seq, forced);

        for kind in kinds {
            round.outstanding += 1;
            let channel = self.channel.clone();
            let tx = tx.clone();

            task::spawn(async move {
                let result = match kind {
                    PollKind::Operator => SubResult::Operator(channel.operator_name().await),
                    PollKind::Registration(domain, transport) => SubResult::Registration {
                        domain,
                        transport,
                        result: channel.registration_info(domain, transport).await,
                    },
                    PollKind::SelectionMode => {
                        SubResult::SelectionMode(channel.network_selection_mode().await)
                    }
                };

                let _ = tx.send(Event::PollResult { round: seq, result });
            });
        }

        trace!(%seq, outstanding = round.outstanding, forced, "poll started");
        self.round = Some(round);
    }

    fn poll_result(&mut self, round: RoundSeq, result: SubResult) {
        match &self.round {
            Some(current) if current.seq == round => {}
            current => {
                trace!(
                    %round,
                    current = ?current.as_ref().map(|r| r.seq),
                    kind = %result.kind(),
                    "dropping stale poll result"
                );
                return;
            }
        }

        if let Some(err) = result.error() {
            if err.is_fatal() {
                warn!(%round, kind = %result.kind(), "{err}, abandoning poll round");
                self.round = None;
                self.pending = ServiceState::out_of_service();
                self.commit(ServiceState::out_of_service());
                return;
            }

            warn!(%round, kind = %result.kind(), "poll query failed: {err}");
        } else if let Err(e) = merge_sub_result(&mut self.pending, &result, &self.sim) {
            warn!(%round, kind = %result.kind(), "ignoring malformed result: {e}");
        }

        let done = self.round.as_mut().is_some_and(|r| r.complete_one());
        if done {
            self.round = None;
            let next = std::mem::take(&mut self.pending);
            self.finish_round(next);
        }
    }

    fn finish_round(&mut self, mut next: ServiceState) {
        next.derive_from_registrations();
        roaming::apply(&mut next, self.phone, &self.config, &self.sim);
        ratchet(&self.committed, &mut next, &self.config.ratchet_rat_families);

        self.commit(next);
    }

    fn commit(&mut self, next: ServiceState) {
        let old = std::mem::replace(&mut self.committed, Arc::new(next));
        self.pending = ServiceState::out_of_service();
        self.state_tx.send_replace(self.committed.clone());

        let changes = diff(&old, &self.committed);
        self.apply_effects(&old, &changes);
    }

    fn apply_effects(&mut self, old: &ServiceState, changes: &ChangeSet) {
        let new = self.committed.clone();

        if changes.has_registered {
            info!(
                operator = new.operator.numeric.as_deref().unwrap_or("-"),
                rat = %new.voice_rat(),
                roaming = new.voice_roaming,
                "registered"
            );
        }
        if changes.has_deregistered {
            info!("deregistered, now {}", new.voice_reg_state);
        }
        if changes.has_reject_cause_changed {
            info!(
                "voice reject cause {} -> {}",
                old.voice_reject_cause(),
                new.voice_reject_cause()
            );
        }
        if changes.has_operator_changed && new.voice_reg_state.is_in_service() {
            info!(
                numeric = new.operator.numeric.as_deref().unwrap_or("-"),
                "operator {} -> {}",
                old.operator.long.as_deref().unwrap_or("-"),
                new.operator.long.as_deref().unwrap_or("-"),
            );
        }

        let tuple = display::resolve(&new, self.phone, &self.config, &self.sim);
        if let Some(tuple) = self.display.publish(tuple) {
            debug!(?tuple, "carrier name display changed");
            self.sink.display(&tuple);
            self.registrants
                .notify(Category::SpnDisplayChanged, Payload::Display(tuple));
        }

        if !changes.has_changed {
            return;
        }

        self.sink.service_state(&new);

        if changes.has_registered {
            self.registrants.notify(Category::NetworkAttached, Payload::None);
        }
        if changes.has_deregistered {
            self.registrants.notify(Category::NetworkDetached, Payload::None);
        }

        for t in Transport::ALL {
            if changes.has_data_attached[t] {
                info!("data attached on {t}");
                self.registrants.notify(Category::DataAttached(t), Payload::None);
            }
            if changes.has_data_detached[t] {
                info!("data detached on {t}");
                self.registrants.notify(Category::DataDetached(t), Payload::None);
            }
        }

        if changes.has_voice_reg_state_changed || changes.has_voice_rat_changed {
            self.registrants.notify(
                Category::VoiceRegOrRatChanged,
                reg_and_rat(&new, Domain::Cs, Transport::Wwan),
            );
        }
        for t in Transport::ALL {
            if changes.has_data_reg_state_changed[t] || changes.has_data_rat_changed[t] {
                self.registrants.notify(
                    Category::DataRegOrRatChanged(t),
                    reg_and_rat(&new, Domain::Ps, t),
                );
            }
        }

        let roaming = [
            (changes.has_voice_roaming_on, Category::VoiceRoamingOn),
            (changes.has_voice_roaming_off, Category::VoiceRoamingOff),
            (changes.has_data_roaming_on, Category::DataRoamingOn),
            (changes.has_data_roaming_off, Category::DataRoamingOff),
        ];
        for (fired, category) in roaming {
            if fired {
                info!("{category}");
                self.registrants.notify(category, Payload::None);
            }
        }

        if changes.has_location_changed {
            self.registrants.notify(
                Category::LocationChanged,
                Payload::Location(new.cell_identity().cloned()),
            );
        }

        if changes.has_nr_state_changed || changes.has_nr_frequency_range_changed {
            self.registrants
                .notify(Category::NrStateChanged, Payload::NrState(new.nr_state()));
        }
        if changes.has_css_indicator_changed {
            self.registrants
                .notify(Category::CssIndicatorChanged, Payload::Bool(new.css_indicator));
        }
        if changes.has_airplane_mode_on {
            self.registrants.notify(Category::AirplaneModeOn, Payload::None);
        }
    }

    fn restricted_state_changed(&mut self, bits: u32) {
        let new = RestrictedState::from_bits(bits);
        let transition = restriction::transition(self.restricted, new);
        self.restricted = new;

        match transition.ps {
            Some(RestrictionNotice::PsEnabled) => {
                self.registrants.notify(Category::PsRestrictEnabled, Payload::None)
            }
            Some(RestrictionNotice::PsDisabled) => {
                self.registrants.notify(Category::PsRestrictDisabled, Payload::None)
            }
            _ => {}
        }

        let cs = transition
            .cs
            .filter(|_| !self.config.disable_voice_barring_notification);

        for notice in transition.ps.into_iter().chain(cs) {
            info!("restriction notice: {notice}");
            self.registrants
                .notify(Category::RestrictionNotice, Payload::Restriction(notice));
        }
    }

    fn execute(&mut self, action: Option<PowerAction>) {
        let Some(action) = action else {
            return;
        };
        let Some(tx) = self.tx.upgrade() else {
            return;
        };

        debug!(%action, "executing power action");
        let channel = self.channel.clone();

        match action {
            PowerAction::PowerOn => {
                task::spawn(async move {
                    let result = channel.set_radio_power(true).await;
                    let _ = tx.send(Event::RadioPowerDone { on: true, result });
                });
            }

            PowerAction::BeginPowerOff { generation } => {
                let own = self.data.clone();
                let default = self.default_data.clone();
                let teardown_tx = tx.clone();

                task::spawn(async move {
                    futures::join!(tear_down(own), async {
                        if let Some(default) = default {
                            tear_down(default).await
                        }
                    });
                    let _ = teardown_tx.send(Event::AllDataDisconnected { generation });
                });

                send_after(
                    tx,
                    self.settings.power_off_timeout,
                    Event::PowerOffWatchdog { generation },
                );
            }

            PowerAction::PowerOffNow => {
                task::spawn(async move {
                    let result = channel.set_radio_power(false).await;
                    let _ = tx.send(Event::RadioPowerDone { on: false, result });
                });
            }

            PowerAction::Shutdown => {
                task::spawn(async move {
                    let result = channel.request_shutdown().await;
                    let _ = tx.send(Event::ShutdownDone(result));
                });
            }
        }
    }

    fn query_cell_info(&mut self, request: u64) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };

        let channel = self.channel.clone();
        let result_tx = tx.clone();
        task::spawn(async move {
            let result = channel.cell_info_list().await;
            let _ = result_tx.send(Event::CellInfoResult { request, result });
        });

        send_after(
            tx,
            self.settings.cell_info_query_timeout,
            Event::CellInfoTimeout { request },
        );
    }
}

async fn tear_down(sessions: Arc<dyn DataSessions>) {
    if !sessions.all_disconnected().await {
        sessions.tear_down_all().await;
    }
}

fn reg_and_rat(ss: &ServiceState, domain: Domain, transport: Transport) -> Payload {
    let reg = ss.registration(domain, transport);

    Payload::RegAndRat {
        reg_state: reg.map_or(NetworkRegState::NotRegistered, |r| r.reg_state),
        rat: reg.map_or(Rat::Unknown, |r| r.rat),
    }
}

/// Cloneable entry point to a running [`ServiceStateTracker`].
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    tx: UnboundedSender<Event>,
    state: watch::Receiver<Arc<ServiceState>>,
}

impl TrackerHandle {
    pub fn send(&self, event: Event) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| eyre!("service state tracker is gone"))
    }

    /// Copy of the committed snapshot.
    pub fn service_state(&self) -> ServiceState {
        ServiceState::clone(&self.state.borrow())
    }

    /// Watches commits. Every value is a committed snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ServiceState>> {
        self.state.clone()
    }

    pub fn poll(&self, forced: bool) -> Result<()> {
        self.send(Event::PollState { forced })
    }

    pub fn set_radio_power(&self, on: bool) -> Result<()> {
        self.send(Event::SetRadioPower(on))
    }

    pub fn set_radio_disabled_by_carrier(&self, disabled: bool) -> Result<()> {
        self.send(Event::SetRadioDisabledByCarrier(disabled))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Event::Shutdown)
    }

    /// Registers for `category`. Notices arrive on the returned receiver tagged with
    /// `token`.
    pub fn register(&self, category: Category, token: Token) -> Result<flume::Receiver<Notice>> {
        let (tx, rx) = flume::unbounded();
        self.register_with(category, Registrant::new(tx, token))?;

        Ok(rx)
    }

    pub fn register_with(&self, category: Category, registrant: Registrant) -> Result<()> {
        self.send(Event::Register {
            category,
            registrant,
        })
    }

    pub fn unregister(&self, category: Category, token: Token) -> Result<()> {
        self.send(Event::Unregister { category, token })
    }

    /// Current cell info list, possibly served from cache.
    pub async fn request_cell_info(&self) -> Result<Vec<CellInfo>> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::RequestCellInfo(reply))?;

        rx.await.map_err(|_| eyre!("service state tracker is gone"))
    }
}
