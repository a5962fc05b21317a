//! Common test utilities for API tests.

use std::sync::Arc;

use busbridge_api::ServerState;
use busbridge_core::{BridgeConfig, ControllerSpec, LoopbackTransport, Topology};
use busbridge_drivers::Bridge;

/// Server state over a loopback bus with one controller (2) and two zones.
pub async fn create_test_server_state(echo: bool) -> (Arc<LoopbackTransport>, ServerState) {
    let transport = Arc::new(if echo {
        LoopbackTransport::with_echo()
    } else {
        LoopbackTransport::new()
    });
    let config = BridgeConfig {
        topology: Topology::new(vec![ControllerSpec::new(2, 2)]),
        ..BridgeConfig::default()
    };
    let bridge = Bridge::start(config, transport.clone())
        .await
        .expect("bridge should start on loopback");
    (transport, ServerState::new(Arc::new(bridge)))
}
