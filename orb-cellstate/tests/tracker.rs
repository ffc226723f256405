use fixture::{Fixture, Network, cell, drain, operator, settle};
use orb_cellstate::{
    config::{CarrierConfig, Settings},
    display::{DisplayTuple, NO_SERVICE},
    modem::{CellInfo, ChannelError, RadioState},
    registrants::{Category, Payload, Token},
    restriction::{self, RestrictionNotice},
    service_state::{
        Domain, NetworkRegState, NrState, OperatorName, PhoneType, Rat, RegState, Transport,
    },
    sim::SimRecords,
    tracker::Event,
};
use std::time::Duration;
use tokio::time;


#[tokio::test(start_paused = true)]
async fn attaching_notifies_once_per_category() {
    // Arrange
    let fx = Fixture::builder().run().await;
    let attached = fx.handle.register(Category::NetworkAttached, Token(1)).unwrap();
    let voice = fx
        .handle
        .register(Category::VoiceRegOrRatChanged, Token(2))
        .unwrap();
    let data = fx
        .handle
        .register(Category::DataAttached(Transport::Wwan), Token(3))
        .unwrap();
    let roaming = fx.handle.register(Category::VoiceRoamingOn, Token(4)).unwrap();

    // Act
    fx.attach(&Network::home(Rat::Lte)).await;

    // Assert
    let ss = fx.handle.service_state();
    assert_eq!(ss.voice_reg_state, RegState::InService);
    assert_eq!(ss.data_reg_state, RegState::InService);
    assert_eq!(ss.operator.numeric.as_deref(), Some("26201"));
    assert!(!ss.roaming());

    assert_eq!(drain(&attached).len(), 1);
    assert_eq!(drain(&data).len(), 1);
    assert!(drain(&roaming).is_empty());

    let voice = drain(&voice);
    assert_eq!(voice.len(), 1);
    assert_eq!(voice[0].token, Token(2));
    assert_eq!(
        voice[0].payload,
        Payload::RegAndRat {
            reg_state: NetworkRegState::Home,
            rat: Rat::Lte
        }
    );

    assert_eq!(drain(&fx.persisted).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn roaming_network_raises_roaming_on() {
    let fx = Fixture::builder().run().await;
    let voice_on = fx.handle.register(Category::VoiceRoamingOn, Token(1)).unwrap();
    let data_on = fx.handle.register(Category::DataRoamingOn, Token(2)).unwrap();

    fx.attach(&Network::roaming(Rat::Lte)).await;

    assert!(fx.handle.service_state().voice_roaming);
    assert_eq!(drain(&voice_on).len(), 1);
    assert_eq!(drain(&data_on).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn same_named_operator_is_not_roaming() {
    // the visited network carries the SIM's home name
    let fx = Fixture::builder()
        .sim(SimRecords {
            loaded: true,
            operator_numeric: Some("26201".into()),
            spn: Some("Home Net".into()),
            ..Default::default()
        })
        .run()
        .await;

    let network = Network {
        operator: operator("Home Net", "26203"),
        ..Network::roaming(Rat::Lte)
    };
    fx.attach(&network).await;

    let ss = fx.handle.service_state();
    assert_eq!(ss.voice_reg_state, RegState::InService);
    assert!(!ss.voice_roaming);
}

#[tokio::test(start_paused = true)]
async fn fatal_error_mid_round_commits_out_of_service() {
    // Arrange
    let fx = Fixture::builder().run().await;
    fx.attach(&Network::home(Rat::Lte)).await;
    let detached = fx.handle.register(Category::NetworkDetached, Token(1)).unwrap();
    fx.handle.poll(false).unwrap();
    let mut round = fx.next_round().await;

    // Act
    round.operator(Ok(operator("Other Net", "26299")));
    round.registration(Domain::Cs, Transport::Wwan, Err(ChannelError::RadioNotAvailable));
    settle().await;

    // Assert
    let ss = fx.handle.service_state();
    assert_eq!(ss.voice_reg_state, RegState::OutOfService);
    assert_eq!(ss.operator, OperatorName::default());
    assert_eq!(drain(&detached).len(), 1);

    // the rest of the abandoned round is ignored
    round.answer(&Network::home(Rat::Lte));
    settle().await;

    assert_eq!(fx.handle.service_state().voice_reg_state, RegState::OutOfService);
    assert!(drain(&detached).is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_round_results_are_dropped() {
    // Arrange
    let fx = Fixture::builder().run().await;
    let attached = fx.handle.register(Category::NetworkAttached, Token(1)).unwrap();
    fx.handle
        .send(Event::RadioStateChanged(RadioState::On))
        .unwrap();
    let mut first = fx.next_round().await;
    first.operator(Ok(operator("Away Net", "20801")));
    settle().await;

    // Act
    fx.handle.poll(false).unwrap();
    let second = fx.next_round().await;
    first.answer(&Network::roaming(Rat::Lte));
    settle().await;

    // Assert
    assert_eq!(fx.handle.service_state().voice_reg_state, RegState::OutOfService);
    assert!(drain(&attached).is_empty());

    second.answer(&Network::home(Rat::Lte));
    settle().await;

    let ss = fx.handle.service_state();
    assert_eq!(ss.voice_reg_state, RegState::InService);
    assert_eq!(ss.operator.numeric.as_deref(), Some("26201"));
    assert!(!ss.voice_roaming);
    assert_eq!(drain(&attached).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn non_fatal_errors_leave_their_slot_empty() {
    let fx = Fixture::builder().run().await;
    fx.handle
        .send(Event::RadioStateChanged(RadioState::On))
        .unwrap();
    let mut round = fx.next_round().await;

    round.operator(Err(ChannelError::OpNotAllowedBeforeReg));
    round.selection_mode(Err(ChannelError::RequestNotSupported));
    round.answer(&Network::home(Rat::Lte));
    settle().await;

    let ss = fx.handle.service_state();
    assert_eq!(ss.voice_reg_state, RegState::InService);
    assert_eq!(ss.operator, OperatorName::default());
}

#[tokio::test(start_paused = true)]
async fn malformed_operator_numeric_is_ignored() {
    let fx = Fixture::builder().run().await;

    let network = Network {
        operator: operator("Home Net", "12"),
        ..Network::home(Rat::Lte)
    };
    fx.attach(&network).await;

    let ss = fx.handle.service_state();
    assert_eq!(ss.voice_reg_state, RegState::InService);
    assert_eq!(ss.operator.numeric, None);
}

#[tokio::test(start_paused = true)]
async fn identical_round_notifies_nobody() {
    // Arrange
    let fx = Fixture::builder().run().await;
    let network = Network::home(Rat::Lte);
    fx.attach(&network).await;
    drain(&fx.persisted);
    drain(&fx.displayed);

    let edges = [
        Category::VoiceRegOrRatChanged,
        Category::DataRegOrRatChanged(Transport::Wwan),
        Category::LocationChanged,
        Category::NrStateChanged,
        Category::CssIndicatorChanged,
        Category::SpnDisplayChanged,
        Category::AirplaneModeOn,
    ]
    .map(|category| fx.handle.register(category, Token(7)).unwrap());

    // Act
    fx.repoll(&network).await;

    // Assert
    for rx in &edges {
        assert!(drain(rx).is_empty());
    }
    assert!(drain(&fx.persisted).is_empty());
    assert!(drain(&fx.displayed).is_empty());
}

#[tokio::test(start_paused = true)]
async fn late_registrant_gets_level_backfill() {
    let fx = Fixture::builder().run().await;
    fx.attach(&Network::home(Rat::Lte)).await;

    let attached = fx
        .handle
        .register(Category::DataAttached(Transport::Wwan), Token(1))
        .unwrap();
    let detached = fx
        .handle
        .register(Category::DataDetached(Transport::Wwan), Token(2))
        .unwrap();
    let roaming_off = fx.handle.register(Category::VoiceRoamingOff, Token(3)).unwrap();
    let location = fx.handle.register(Category::LocationChanged, Token(4)).unwrap();
    settle().await;

    let attached = drain(&attached);
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].token, Token(1));
    assert_eq!(attached[0].payload, Payload::None);
    assert!(drain(&detached).is_empty());
    assert_eq!(drain(&roaming_off).len(), 1);
    assert!(drain(&location).is_empty());
}

#[tokio::test(start_paused = true)]
async fn unregistered_and_dropped_receivers_stop_getting_notices() {
    let fx = Fixture::builder().run().await;
    let kept = fx.handle.register(Category::LocationChanged, Token(1)).unwrap();
    let removed = fx.handle.register(Category::LocationChanged, Token(2)).unwrap();
    let dropped = fx.handle.register(Category::LocationChanged, Token(3)).unwrap();
    drop(dropped);
    fx.handle
        .unregister(Category::LocationChanged, Token(2))
        .unwrap();

    fx.attach(&Network::home(Rat::Lte)).await;

    let kept = drain(&kept);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].payload, Payload::Location(Some(cell(1))));
    assert!(drain(&removed).is_empty());
}

#[tokio::test(start_paused = true)]
async fn rat_is_not_downgraded_on_the_same_cell() {
    // Arrange
    let fx = Fixture::builder().run().await;
    fx.attach(&Network::home(Rat::Hspap).on_cell(7)).await;
    let voice = fx
        .handle
        .register(Category::VoiceRegOrRatChanged, Token(1))
        .unwrap();

    // Act
    fx.repoll(&Network::home(Rat::Umts).on_cell(7)).await;

    // Assert
    assert_eq!(fx.handle.service_state().voice_rat(), Rat::Hspap);
    assert!(drain(&voice).is_empty());

    // a new cell resets the ratchet
    fx.repoll(&Network::home(Rat::Umts).on_cell(8)).await;

    assert_eq!(fx.handle.service_state().voice_rat(), Rat::Umts);
    assert_eq!(drain(&voice).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cell_change_and_nr_change_are_reported() {
    let fx = Fixture::builder().run().await;
    fx.attach(&Network::home(Rat::Lte)).await;
    let location = fx.handle.register(Category::LocationChanged, Token(1)).unwrap();
    let nr = fx.handle.register(Category::NrStateChanged, Token(2)).unwrap();

    fx.repoll(&Network::home(Rat::Lte).on_cell(2).with_nr(NrState::Connected))
        .await;

    let location = drain(&location);
    assert_eq!(location.len(), 1);
    assert_eq!(location[0].payload, Payload::Location(Some(cell(2))));

    let nr = drain(&nr);
    assert_eq!(nr.len(), 1);
    assert_eq!(nr[0].payload, Payload::NrState(NrState::Connected));
}

#[tokio::test(start_paused = true)]
async fn radio_off_commits_power_off_without_polling() {
    // Arrange
    let fx = Fixture::builder().run().await;
    fx.attach(&Network::home(Rat::Lte)).await;
    let airplane = fx.handle.register(Category::AirplaneModeOn, Token(1)).unwrap();
    let detached = fx
        .handle
        .register(Category::DataDetached(Transport::Wwan), Token(2))
        .unwrap();

    // Act
    fx.handle
        .send(Event::RadioStateChanged(RadioState::Off))
        .unwrap();
    settle().await;

    // Assert
    let ss = fx.handle.service_state();
    assert_eq!(ss.voice_reg_state, RegState::PowerOff);
    assert_eq!(ss.data_reg_state, RegState::PowerOff);
    assert_eq!(drain(&airplane).len(), 1);
    assert_eq!(drain(&detached).len(), 1);
    assert!(fx.calls.is_empty());
}

#[tokio::test(start_paused = true)]
async fn forced_poll_queries_a_powered_off_radio() {
    let fx = Fixture::builder().run().await;
    fx.handle
        .send(Event::RadioStateChanged(RadioState::Off))
        .unwrap();
    settle().await;
    assert!(fx.calls.is_empty());

    fx.handle.poll(true).unwrap();
    fx.next_round().await.answer(&Network::searching());
    settle().await;

    assert_eq!(
        fx.handle.service_state().voice_reg_state,
        RegState::OutOfService
    );
}

async fn iwlan_fixture() -> Fixture {
    Fixture::builder()
        .settings(Settings::builder().iwlan_available(true).build())
        .run()
        .await
}

#[tokio::test(start_paused = true)]
async fn iwlan_registration_attaches_data_over_wlan() {
    // Arrange
    let fx = iwlan_fixture().await;
    let attached = fx
        .handle
        .register(Category::DataAttached(Transport::Wlan), Token(1))
        .unwrap();
    let reg_or_rat = fx
        .handle
        .register(Category::DataRegOrRatChanged(Transport::Wlan), Token(2))
        .unwrap();

    // Act
    fx.handle
        .send(Event::RadioStateChanged(RadioState::On))
        .unwrap();
    let round = fx.next_round().await;
    assert!(round.requested(Domain::Ps, Transport::Wlan));
    round.answer(&Network::searching().over_wlan());
    settle().await;

    // Assert
    let ss = fx.handle.service_state();
    assert_eq!(ss.voice_reg_state, RegState::OutOfService);
    assert_eq!(ss.data_reg_state, RegState::InService);
    assert_eq!(ss.data_rat(), Rat::Iwlan);

    assert_eq!(drain(&attached).len(), 1);
    let reg_or_rat = drain(&reg_or_rat);
    assert_eq!(reg_or_rat.len(), 1);
    assert_eq!(
        reg_or_rat[0].payload,
        Payload::RegAndRat {
            reg_state: NetworkRegState::Home,
            rat: Rat::Iwlan
        }
    );
}

#[tokio::test(start_paused = true)]
async fn radio_off_still_polls_while_data_is_on_iwlan() {
    // Arrange
    let fx = iwlan_fixture().await;
    let network = Network::searching().over_wlan();
    fx.attach(&network).await;
    assert_eq!(fx.handle.service_state().data_rat(), Rat::Iwlan);

    // Act
    fx.handle
        .send(Event::RadioStateChanged(RadioState::Off))
        .unwrap();
    let round = fx.next_round().await;
    assert!(round.requested(Domain::Ps, Transport::Wlan));
    round.answer(&network);
    settle().await;

    // Assert
    let ss = fx.handle.service_state();
    assert_ne!(ss.voice_reg_state, RegState::PowerOff);
    assert_eq!(ss.data_reg_state, RegState::InService);
    assert_eq!(ss.data_rat(), Rat::Iwlan);
}

#[tokio::test(start_paused = true)]
async fn iwlan_preference_moves_data_off_the_roaming_network() {
    // Arrange
    let fx = iwlan_fixture().await;
    let network = Network::roaming(Rat::Lte).over_wlan();
    fx.attach(&network).await;

    let ss = fx.handle.service_state();
    assert!(ss.data_roaming);
    assert_eq!(ss.data_rat(), Rat::Lte);
    let data_off = fx.handle.register(Category::DataRoamingOff, Token(1)).unwrap();

    // Act
    fx.handle
        .send(Event::IwlanPreferenceChanged(true))
        .unwrap();
    fx.next_round().await.answer(&network);
    settle().await;

    // Assert
    let ss = fx.handle.service_state();
    assert!(ss.iwlan_preferred);
    assert_eq!(ss.data_rat(), Rat::Iwlan);
    assert!(ss.voice_roaming);
    assert!(!ss.data_roaming);
    assert_eq!(drain(&data_off).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unavailable_radio_commits_out_of_service() {
    let fx = Fixture::builder().run().await;
    fx.attach(&Network::home(Rat::Lte)).await;

    fx.handle
        .send(Event::RadioStateChanged(RadioState::Unavailable))
        .unwrap();
    settle().await;

    assert_eq!(
        fx.handle.service_state().voice_reg_state,
        RegState::OutOfService
    );
    assert!(fx.calls.is_empty());
}

#[tokio::test(start_paused = true)]
async fn phone_type_change_resets_and_repolls_without_selection_mode() {
    let fx = Fixture::builder().run().await;
    fx.attach(&Network::home(Rat::Lte)).await;

    fx.handle
        .send(Event::PhoneTypeChanged(PhoneType::Cdma))
        .unwrap();
    settle().await;

    assert_eq!(
        fx.handle.service_state().voice_reg_state,
        RegState::OutOfService
    );

    // operator and two registrations, no selection mode on CDMA
    fx.next_round_of(3).await.answer(&Network::home(Rat::Ehrpd));
    settle().await;

    let ss = fx.handle.service_state();
    assert_eq!(ss.voice_reg_state, RegState::InService);
    assert!(fx.calls.is_empty());
}

#[tokio::test(start_paused = true)]
async fn carrier_config_change_applies_on_the_next_round() {
    let fx = Fixture::builder().run().await;
    fx.attach(&Network::roaming(Rat::Lte)).await;
    assert!(fx.handle.service_state().voice_roaming);
    let roaming_off = fx.handle.register(Category::VoiceRoamingOff, Token(1)).unwrap();

    fx.handle
        .send(Event::CarrierConfigChanged(CarrierConfig {
            gsm_nonroaming_networks: vec!["208".into()],
            ..Default::default()
        }))
        .unwrap();
    fx.next_round().await.answer(&Network::roaming(Rat::Lte));
    settle().await;

    assert!(!fx.handle.service_state().voice_roaming);
    assert_eq!(drain(&roaming_off).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn brand_override_wins_the_display_and_is_persisted() {
    // the brand replaces the operator name as well as the SPN
    // Arrange
    let fx = Fixture::builder()
        .sim(SimRecords {
            loaded: true,
            spn: Some("CarrierX".into()),
            brand_override: Some("Acme".into()),
            home_numerics: vec!["26201".into()],
            ..Default::default()
        })
        .run()
        .await;
    let spn = fx.handle.register(Category::SpnDisplayChanged, Token(1)).unwrap();

    // Act
    fx.attach(&Network::home(Rat::Lte)).await;

    // Assert
    let expected = DisplayTuple {
        show_plmn: false,
        plmn: Some("Acme".into()),
        show_spn: true,
        spn: Some("Acme".into()),
        data_spn: Some("Acme".into()),
    };

    let notices = drain(&spn);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].payload, Payload::Display(expected.clone()));
    assert_eq!(drain(&fx.displayed), vec![expected]);
}

#[tokio::test(start_paused = true)]
async fn display_persisted_by_previous_run_is_not_republished() {
    let last = DisplayTuple {
        show_plmn: true,
        plmn: Some(NO_SERVICE.into()),
        ..Default::default()
    };
    let fx = Fixture::builder().last_display(last).run().await;
    let spn = fx.handle.register(Category::SpnDisplayChanged, Token(1)).unwrap();

    fx.attach(&Network::searching()).await;

    assert!(drain(&spn).is_empty());
    assert!(drain(&fx.displayed).is_empty());
}

#[tokio::test(start_paused = true)]
async fn restriction_changes_raise_notices() {
    // Arrange
    let fx = Fixture::builder().run().await;
    let notices = fx
        .handle
        .register(Category::RestrictionNotice, Token(1))
        .unwrap();
    let ps = fx
        .handle
        .register(Category::PsRestrictEnabled, Token(2))
        .unwrap();

    // Act
    fx.handle
        .send(Event::RestrictedStateChanged(
            restriction::PS_ALL | restriction::CS_ALL,
        ))
        .unwrap();
    settle().await;

    // Assert
    let notices: Vec<_> = drain(&notices).into_iter().map(|n| n.payload).collect();
    assert_eq!(
        notices,
        vec![
            Payload::Restriction(RestrictionNotice::PsEnabled),
            Payload::Restriction(RestrictionNotice::CsEnabled),
        ]
    );
    assert_eq!(drain(&ps).len(), 1);

    // a late registrant sees the restriction that already holds
    let late = fx
        .handle
        .register(Category::PsRestrictEnabled, Token(3))
        .unwrap();
    settle().await;
    assert_eq!(drain(&late).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn voice_barring_notices_can_be_disabled() {
    let fx = Fixture::builder()
        .config(CarrierConfig {
            disable_voice_barring_notification: true,
            ..Default::default()
        })
        .run()
        .await;
    let notices = fx
        .handle
        .register(Category::RestrictionNotice, Token(1))
        .unwrap();

    fx.handle
        .send(Event::RestrictedStateChanged(
            restriction::PS_ALL | restriction::CS_ALL,
        ))
        .unwrap();
    settle().await;

    let notices: Vec<_> = drain(&notices).into_iter().map(|n| n.payload).collect();
    assert_eq!(
        notices,
        vec![Payload::Restriction(RestrictionNotice::PsEnabled)]
    );
}

#[tokio::test(start_paused = true)]
async fn cell_info_is_cached_then_falls_back_on_timeout() {
    // Arrange
    let fx = Fixture::builder().run().await;
    let list = vec![CellInfo {
        registered: true,
        rat: Rat::Lte,
        identity: cell(1),
    }];

    // Act: first request goes to the modem
    let handle = fx.handle.clone();
    let first = tokio::spawn(async move { handle.request_cell_info().await });
    let Ok(fixture::Call::CellInfo(reply)) = fx.calls.recv_async().await else {
        panic!("expected a cell info request");
    };
    reply.send(Ok(list.clone())).unwrap();

    // Assert
    assert_eq!(first.await.unwrap().unwrap(), list);

    // served from cache within the rate limit
    assert_eq!(fx.handle.request_cell_info().await.unwrap(), list);
    assert!(fx.calls.is_empty());

    // a modem that never answers still gets us the last known list
    time::sleep(Duration::from_secs(3)).await;
    let handle = fx.handle.clone();
    let third = tokio::spawn(async move { handle.request_cell_info().await });
    let Ok(fixture::Call::CellInfo(_hold)) = fx.calls.recv_async().await else {
        panic!("expected a cell info request");
    };

    assert_eq!(third.await.unwrap().unwrap(), list);
}
