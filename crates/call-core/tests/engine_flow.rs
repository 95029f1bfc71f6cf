mod common;

use std::time::Duration;

use common::{Endpoint, pump};
use h323_call_core::{CallClearReason, CallOptions, CallState, DtmfMode, EndpointDefaults, OutboundKind};
use h323_wire_core::MessageType;
use pretty_assertions::assert_eq;

const CALLEE: &str = "127.0.0.1:1721";

async fn connected_pair(defaults: EndpointDefaults) -> (Endpoint, Endpoint) {
    let mut caller = Endpoint::new(defaults.clone(), "out-1");
    let mut callee = Endpoint::new(defaults, "in-1");

    caller
        .engine
        .make_call(CALLEE, CallOptions::default().with_token("out-1"))
        .await
        .unwrap();
    pump(&mut caller, &mut callee).await;
    assert_eq!(callee.state().await, Some(CallState::Connecting));
    assert!(caller.recorder.saw("alerting"));

    callee.engine.answer_call("in-1").await.unwrap();
    pump(&mut caller, &mut callee).await;
    (caller, callee)
}

#[tokio::test(start_paused = true)]
async fn test_tunneled_fast_start_call() {
    let (mut caller, mut callee) = connected_pair(EndpointDefaults::default()).await;

    assert_eq!(caller.state().await, Some(CallState::Connected));
    assert_eq!(callee.state().await, Some(CallState::Connected));
    assert_eq!(caller.count_sent(OutboundKind::Q931(MessageType::Setup)), 1);
    // Everything H.245 went through Q.931
    assert!(caller.sent.iter().chain(callee.sent.iter()).all(|k| k.is_signaling()));

    {
        let handle = caller.engine.find_call("out-1").await.unwrap();
        let call = handle.lock().await;
        assert!(call.master_slave().state.is_decided());
        assert!(call.channels.iter().all(|c| c.is_established()));
        assert_eq!(call.channels.len(), 2);
    }
    {
        let callee_handle = callee.engine.find_call("in-1").await.unwrap();
        let caller_handle = caller.engine.find_call("out-1").await.unwrap();
        let (a, b) = (caller_handle.lock().await, callee_handle.lock().await);
        assert_ne!(a.is_master(), b.is_master());
    }

    caller.engine.end_call("out-1", None, None).await.unwrap();
    pump(&mut caller, &mut callee).await;

    assert_eq!(callee.state().await, Some(CallState::Removed));
    {
        let handle = callee.engine.find_call("in-1").await.unwrap();
        assert_eq!(handle.lock().await.end_reason(), CallClearReason::RemoteCleared);
    }
    // Our end-session goes unanswered; the session timer finishes the call
    assert_eq!(caller.state().await, Some(CallState::ClearReleaseSent));
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(caller.state().await, Some(CallState::Removed));

    assert_eq!(caller.engine.reap().await, 1);
    assert_eq!(callee.engine.reap().await, 1);
    assert_eq!(caller.count_sent(OutboundKind::Q931(MessageType::ReleaseComplete)), 1);
    assert_eq!(callee.count_sent(OutboundKind::Q931(MessageType::ReleaseComplete)), 0);

    assert_eq!(
        caller.recorder.events(),
        vec!["new_call", "outgoing", "alerting", "established", "cleared"]
    );
    assert_eq!(
        callee.recorder.events(),
        vec!["new_call", "incoming", "established", "cleared"]
    );
}

#[tokio::test]
async fn test_dtmf_over_h245() {
    let mut defaults = EndpointDefaults::default();
    defaults.dtmf.modes = vec![DtmfMode::H245Alphanumeric];
    let (mut caller, mut callee) = connected_pair(defaults).await;

    caller.engine.send_dtmf("out-1", "123#").await.unwrap();
    pump(&mut caller, &mut callee).await;
    assert!(callee.recorder.saw("dtmf:123#"));
}

#[tokio::test]
async fn test_dtmf_without_common_mode_fails() {
    let (caller, _callee) = connected_pair(EndpointDefaults::default()).await;
    assert!(caller.engine.send_dtmf("out-1", "5").await.is_err());
}

#[tokio::test]
async fn test_destination_extension_from_alias() {
    let mut caller = Endpoint::new(EndpointDefaults::default(), "out-1");
    let mut callee = Endpoint::new(EndpointDefaults::default(), "in-1");
    caller
        .engine
        .make_call("support@127.0.0.1:1721", CallOptions::default().with_token("out-1"))
        .await
        .unwrap();
    pump(&mut caller, &mut callee).await;

    let handle = callee.engine.find_call("in-1").await.unwrap();
    let call = handle.lock().await;
    assert_eq!(call.called_party_number, None);
    assert_eq!(call.destination_extension(), "support");
}

#[tokio::test]
async fn test_repeated_end_sends_one_release() {
    let mut caller = Endpoint::new(EndpointDefaults::default(), "out-1");
    let mut callee = Endpoint::new(EndpointDefaults::default(), "call-9");
    caller
        .engine
        .make_call(CALLEE, CallOptions::default().with_token("out-1"))
        .await
        .unwrap();
    pump(&mut caller, &mut callee).await;

    callee.engine.end_call("call-9", Some(CallClearReason::LocalBusy), None).await.unwrap();
    callee.engine.end_call("call-9", None, None).await.unwrap();
    pump(&mut caller, &mut callee).await;

    assert_eq!(callee.count_sent(OutboundKind::Q931(MessageType::ReleaseComplete)), 1);
    let handle = caller.engine.find_call("out-1").await.unwrap();
    let call = handle.lock().await;
    assert_eq!(call.state(), CallState::Removed);
    assert_eq!(call.end_reason(), CallClearReason::RemoteBusy);
}

#[tokio::test]
async fn test_forwarded_call() {
    let (mut caller, mut callee) = connected_pair(EndpointDefaults::default()).await;
    callee.engine.forward_call("in-1", "3000@10.0.0.9").await.unwrap();
    pump(&mut caller, &mut callee).await;

    assert!(caller.recorder.saw("forwarded"));
    assert!(!caller.recorder.saw("cleared"));
    let handle = caller.engine.find_call("out-1").await.unwrap();
    let call = handle.lock().await;
    let forward = call.forward.clone().unwrap();
    assert!(forward.forwarded_by_remote);
    assert_eq!(forward.aliases[0].value, "3000");
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_call_times_out() {
    let mut caller = Endpoint::new(EndpointDefaults::default(), "out-1");
    let mut callee = Endpoint::new(EndpointDefaults::default(), "in-1");
    caller
        .engine
        .make_call(CALLEE, CallOptions::default().with_token("out-1"))
        .await
        .unwrap();
    pump(&mut caller, &mut callee).await;

    tokio::time::sleep(Duration::from_secs(61)).await;
    pump(&mut caller, &mut callee).await;
    // Either side may still be waiting out its end-session timer
    tokio::time::sleep(Duration::from_secs(16)).await;
    pump(&mut caller, &mut callee).await;

    let handle = caller.engine.find_call("out-1").await.unwrap();
    assert_eq!(handle.lock().await.end_reason(), CallClearReason::RemoteNoAnswer);
    assert!(caller.recorder.saw("cleared"));
    assert!(callee.recorder.saw("cleared"));
}

#[tokio::test]
async fn test_transport_loss_cleans_call() {
    let (mut caller, mut callee) = connected_pair(EndpointDefaults::default()).await;
    callee.engine.transport_closed("in-1").await.unwrap();
    pump(&mut caller, &mut callee).await;

    assert!(callee.transport_closed);
    assert_eq!(callee.state().await, Some(CallState::Removed));
    assert_eq!(callee.count_sent(OutboundKind::Q931(MessageType::ReleaseComplete)), 0);
    let handle = callee.engine.find_call("in-1").await.unwrap();
    assert_eq!(handle.lock().await.end_reason(), CallClearReason::TransportFailure);
}
