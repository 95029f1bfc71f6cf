use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use h323_call_core::{
    AdmissionRequest, CallClearReason, CallDirection, CallEngine, CallOptions, CallState, EndpointContext,
    EndpointDefaults, EngineEvent, GatekeeperClient, OutboundKind,
};
use h323_wire_core::{AliasKind, MessageType, TransportAddress};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

#[derive(Default)]
struct MockGatekeeper {
    requests: Mutex<Vec<AdmissionRequest>>,
    cleaned: Mutex<Vec<String>>,
}

#[async_trait]
impl GatekeeperClient for MockGatekeeper {
    fn is_registered(&self) -> bool {
        true
    }

    async fn request_admission(&self, request: AdmissionRequest) -> anyhow::Result<()> {
        self.requests.lock().push(request);
        Ok(())
    }

    async fn cleanup_call(&self, token: &str) -> anyhow::Result<()> {
        self.cleaned.lock().push(token.to_string());
        Ok(())
    }
}

fn engine(gk: Arc<MockGatekeeper>) -> (CallEngine, mpsc::UnboundedReceiver<EngineEvent>) {
    let ctx = Arc::new(EndpointContext::new(EndpointDefaults::default()).unwrap());
    CallEngine::builder(ctx).gatekeeper(gk).build()
}

async fn wait_for_admission_request(engine: &CallEngine) {
    for _ in 0..100 {
        if engine.stats().await.pending_admissions == 1 {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("no admission request");
}

#[tokio::test]
async fn test_granted_call_sends_setup_to_routed_address() {
    let gk = Arc::new(MockGatekeeper::default());
    let (engine, mut rx) = engine(gk.clone());

    let placing = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.make_call("5551000", CallOptions::default().with_token("gk-1")).await })
    };
    wait_for_admission_request(&engine).await;
    {
        let handle = engine.find_call("gk-1").await.unwrap();
        assert_eq!(handle.lock().await.state(), CallState::WaitingAdmission);
    }

    let routed = TransportAddress::new("10.1.1.1".parse().unwrap(), 1720);
    engine.admission_granted("gk-1", Some(routed)).unwrap();
    assert_eq!(placing.await.unwrap().unwrap(), "gk-1");

    let request = gk.requests.lock()[0].clone();
    assert_eq!(request.direction, CallDirection::Outgoing);
    assert_eq!(request.destination_aliases[0].kind, AliasKind::DialedDigits);
    assert_eq!(request.destination_aliases[0].value, "5551000");

    match rx.recv().await.unwrap() {
        EngineEvent::Outbound(msg) => assert_eq!(msg.kind, OutboundKind::Q931(MessageType::Setup)),
        other => panic!("unexpected {:?}", other),
    }
    let handle = engine.find_call("gk-1").await.unwrap();
    let call = handle.lock().await;
    assert_eq!(call.state(), CallState::Connecting);
    assert_eq!(call.remote_address, Some(routed));
    assert_eq!(call.called_party_number.as_deref(), Some("5551000"));
}

#[tokio::test]
async fn test_denied_call_clears_without_signaling() {
    let gk = Arc::new(MockGatekeeper::default());
    let (engine, mut rx) = engine(gk.clone());

    let placing = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.make_call("alice", CallOptions::default().with_token("gk-2")).await })
    };
    wait_for_admission_request(&engine).await;
    engine.admission_denied("gk-2", CallClearReason::GkNoCalledUser).unwrap();
    placing.await.unwrap().unwrap();

    {
        let handle = engine.find_call("gk-2").await.unwrap();
        let call = handle.lock().await;
        assert_eq!(call.state(), CallState::Removed);
        assert_eq!(call.end_reason(), CallClearReason::GkNoCalledUser);
    }
    // Nothing but the transport close
    assert!(matches!(rx.try_recv(), Ok(EngineEvent::CloseTransport { .. })));
    assert!(rx.try_recv().is_err());

    assert_eq!(engine.reap().await, 1);
    assert!(gk.cleaned.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_silent_gatekeeper_times_out() {
    let gk = Arc::new(MockGatekeeper::default());
    let (engine, _rx) = engine(gk.clone());

    let placing = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.make_call("10.0.0.2", CallOptions::default().with_token("gk-3")).await })
    };
    tokio::time::sleep(Duration::from_secs(25)).await;
    placing.await.unwrap().unwrap();

    let handle = engine.find_call("gk-3").await.unwrap();
    assert_eq!(handle.lock().await.end_reason(), CallClearReason::GkUnreachable);
    assert_eq!(engine.stats().await.pending_admissions, 0);
}

#[tokio::test]
async fn test_admitted_call_released_at_gatekeeper() {
    let gk = Arc::new(MockGatekeeper::default());
    let (engine, _rx) = engine(gk.clone());

    let placing = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.make_call("10.0.0.3", CallOptions::default().with_token("gk-4")).await })
    };
    wait_for_admission_request(&engine).await;
    engine.admission_granted("gk-4", None).unwrap();
    placing.await.unwrap().unwrap();

    engine.end_call("gk-4", None, None).await.unwrap();
    assert_eq!(engine.reap().await, 1);
    assert_eq!(*gk.cleaned.lock(), vec!["gk-4".to_string()]);
    assert!(engine.find_call("gk-4").await.is_none());
}
