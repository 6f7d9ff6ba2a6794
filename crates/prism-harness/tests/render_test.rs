//! Render counts of view bindings driven by SDK events.
//!
//! A binding must re-render only when the slice of state its selector reads
//! was replaced, no matter how busy the rest of the call is.

use std::{cell::Cell, rc::Rc, sync::Arc};

use prism_core::{
    CallClientConfig, StatefulCallClient, ViewBinding, create_stateful_call_client,
    sdk::{Call, CallClient},
    selectors::{
        CallProps, ParticipantListSelector, ParticipantProps, VideoGallerySelector,
        devices_selector, is_muted_selector,
    },
    state::{MediaStreamType, VideoDeviceInfo, VideoDeviceType},
    subscribe_binding,
};
use prism_harness::{SimCall, SimCallClient, SimEnv};
use prism_memo::Selector;

struct Fixture {
    sdk: Rc<SimCallClient>,
    client: StatefulCallClient<SimEnv>,
    call: Rc<SimCall>,
}

fn fixture(participants: &[&str]) -> Fixture {
    let sdk = SimCallClient::new("me");
    let client = create_stateful_call_client(
        Rc::clone(&sdk) as Rc<dyn CallClient>,
        SimEnv::with_seed(11),
        CallClientConfig::default(),
    );
    let _ = client.get_device_manager().unwrap();
    let _ = client.start_call(&[]).unwrap();
    let call = sdk.agent().unwrap().sim_calls()[0].clone();
    for id in participants {
        let _ = call.join(*id).unwrap();
    }
    Fixture { sdk, client, call }
}

fn counter() -> (Rc<Cell<u32>>, impl FnMut(&Option<bool>) + 'static) {
    let renders = Rc::new(Cell::new(0));
    let handle = Rc::clone(&renders);
    (renders, move |_: &Option<bool>| handle.set(handle.get() + 1))
}

#[test]
fn muted_binding_ignores_other_participants() {
    let fx = fixture(&["p1", "p2", "p3"]);
    let props = ParticipantProps { call_id: fx.call.id(), participant_id: "p1".to_string() };
    let (renders, on_render) = counter();
    let binding = ViewBinding::new(is_muted_selector(), props);
    let _ = subscribe_binding(fx.client.store(), binding, on_render);
    assert_eq!(renders.get(), 1);

    let p2 = fx.call.participant("p2").unwrap();
    p2.set_muted(true);
    p2.set_speaking(true);
    fx.call.set_recording(true);
    assert_eq!(renders.get(), 1);

    fx.call.participant("p1").unwrap().set_muted(true);
    assert_eq!(renders.get(), 2);

    // Speaking changes p1's node, but the muted flag stays the same.
    fx.call.participant("p1").unwrap().set_speaking(true);
    assert_eq!(renders.get(), 2);
}

#[test]
fn participant_list_rebuilds_only_changed_rows() {
    let fx = fixture(&["p1", "p2", "p3", "p4"]);
    let props = CallProps { call_id: fx.call.id() };
    let mut binding = ViewBinding::new(ParticipantListSelector::new(), props);

    let first = binding.update(&fx.client.get_state()).unwrap().unwrap().unwrap();
    fx.call.participant("p3").unwrap().set_muted(true);
    let second = binding.update(&fx.client.get_state()).unwrap().unwrap().unwrap();

    assert_eq!(binding.selector().row_stats().misses, 5);
    for (before, after) in first.iter().zip(second.iter()) {
        assert_eq!(Arc::ptr_eq(before, after), after.id != "p3");
    }
    assert!(second.iter().any(|row| row.id == "p3" && row.is_muted));
}

#[test]
fn participant_leaving_evicts_its_row() {
    let fx = fixture(&["p1", "p2"]);
    let mut binding =
        ViewBinding::new(ParticipantListSelector::new(), CallProps { call_id: fx.call.id() });
    let _ = binding.update(&fx.client.get_state()).unwrap();

    assert!(fx.call.leave("p2"));
    let rows = binding.update(&fx.client.get_state()).unwrap().unwrap().unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(binding.selector().cached_rows(), 1);
    assert_eq!(binding.selector().row_stats().evictions, 1);
}

#[test]
fn gallery_follows_screen_share() {
    let fx = fixture(&["p1", "p2"]);
    let mut binding =
        ViewBinding::new(VideoGallerySelector::new(), CallProps { call_id: fx.call.id() });
    let initial = binding.update(&fx.client.get_state()).unwrap().unwrap().unwrap();
    assert!(initial.screen_share.is_none());

    let share =
        fx.call.participant("p2").unwrap().add_stream(9, MediaStreamType::ScreenSharing).unwrap();
    let sharing = binding.update(&fx.client.get_state()).unwrap().unwrap().unwrap();
    assert_eq!(sharing.screen_share.as_ref().map(|tile| tile.participant_id.as_str()), Some("p2"));

    share.set_available(false);
    let stopped = binding.update(&fx.client.get_state()).unwrap().unwrap().unwrap();
    assert!(stopped.screen_share.is_none());
    assert_eq!(binding.renders(), 3);
}

#[test]
fn device_binding_skips_call_traffic() {
    let fx = fixture(&["p1"]);
    let mut binding = ViewBinding::new(devices_selector(), ());
    let _ = binding.update(&fx.client.get_state()).unwrap();

    fx.call.participant("p1").unwrap().set_speaking(true);
    fx.call.set_muted(true);
    assert!(binding.update(&fx.client.get_state()).unwrap().is_none());

    let usb = VideoDeviceInfo {
        id: "cam-1".to_string(),
        name: "USB Camera".to_string(),
        device_type: VideoDeviceType::UsbCamera,
    };
    let manager = fx.sdk.device_manager();
    manager.set_cameras(vec![usb.clone()]);
    let devices = binding.update(&fx.client.get_state()).unwrap().unwrap();

    assert_eq!(devices.cameras.as_slice(), &[usb]);
    assert_eq!(binding.renders(), 2);
    assert!(binding.selector().stats().is_some());
}
