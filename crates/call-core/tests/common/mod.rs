//! Two engines wired back to back through their transport channels

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use h323_call_core::{
    Call, CallCallbacks, CallEngine, CallState, EndpointContext, EndpointDefaults, EngineEvent, OutboundKind,
};
use h323_wire_core::tpkt;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Callbacks that remember what fired
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn saw(&self, name: &str) -> bool {
        self.events.lock().iter().any(|e| e == name)
    }

    fn push(&self, name: impl Into<String>) {
        self.events.lock().push(name.into());
    }
}

#[async_trait]
impl CallCallbacks for Recorder {
    async fn on_new_call_created(&self, _call: &mut Call) -> anyhow::Result<()> {
        self.push("new_call");
        Ok(())
    }

    async fn on_alerting(&self, _call: &mut Call) -> anyhow::Result<()> {
        self.push("alerting");
        Ok(())
    }

    async fn on_incoming_call(&self, _call: &mut Call) -> anyhow::Result<()> {
        self.push("incoming");
        Ok(())
    }

    async fn on_outgoing_call(&self, _call: &mut Call) -> anyhow::Result<()> {
        self.push("outgoing");
        Ok(())
    }

    async fn on_call_established(&self, _call: &mut Call) -> anyhow::Result<()> {
        self.push("established");
        Ok(())
    }

    async fn on_call_forwarded(&self, _call: &mut Call) -> anyhow::Result<()> {
        self.push("forwarded");
        Ok(())
    }

    async fn on_call_cleared(&self, _call: &mut Call) -> anyhow::Result<()> {
        self.push("cleared");
        Ok(())
    }

    async fn on_received_dtmf(&self, _call: &mut Call, digits: &str) -> anyhow::Result<()> {
        self.push(format!("dtmf:{}", digits));
        Ok(())
    }
}

pub struct Endpoint {
    pub engine: CallEngine,
    pub rx: mpsc::UnboundedReceiver<EngineEvent>,
    pub recorder: Arc<Recorder>,
    /// Token of this side's call
    pub token: String,
    /// Everything this side put on the wire, in order
    pub sent: Vec<OutboundKind>,
    pub transport_closed: bool,
}

impl Endpoint {
    pub fn new(defaults: EndpointDefaults, token: &str) -> Self {
        let ctx = Arc::new(EndpointContext::new(defaults).unwrap());
        let recorder = Arc::new(Recorder::default());
        let (engine, rx) = CallEngine::builder(ctx).callbacks(recorder.clone()).build();
        Self {
            engine,
            rx,
            recorder,
            token: token.to_string(),
            sent: Vec::new(),
            transport_closed: false,
        }
    }

    pub async fn state(&self) -> Option<CallState> {
        let handle = self.engine.find_call(&self.token).await?;
        let state = handle.lock().await.state();
        Some(state)
    }

    pub fn count_sent(&self, kind: OutboundKind) -> usize {
        self.sent.iter().filter(|k| **k == kind).count()
    }
}

fn strip_tpkt(payload: &Bytes) -> Bytes {
    let mut buf = BytesMut::from(&payload[..]);
    tpkt::decode(&mut buf).unwrap().unwrap()
}

/// Move everything one side sent to the other
async fn drain(from: &mut Endpoint, to: &Endpoint) -> bool {
    let mut moved = false;
    while let Ok(event) = from.rx.try_recv() {
        moved = true;
        match event {
            EngineEvent::Outbound(msg) => {
                from.sent.push(msg.kind);
                let frame = strip_tpkt(&msg.payload);
                let _ = if msg.kind.is_signaling() {
                    to.engine.handle_incoming(&to.token, frame).await
                } else {
                    to.engine.handle_h245(&to.token, frame).await
                };
            }
            EngineEvent::CloseTransport { .. } => from.transport_closed = true,
            EngineEvent::ConnectH245 { .. } | EngineEvent::CloseH245 { .. } => {}
        }
    }
    moved
}

/// Exchange messages until both sides go quiet
pub async fn pump(a: &mut Endpoint, b: &mut Endpoint) {
    for _ in 0..64 {
        let from_a = drain(a, b).await;
        let from_b = drain(b, a).await;
        if !from_a && !from_b {
            return;
        }
    }
    panic!("signaling did not settle");
}
