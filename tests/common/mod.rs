//! Common test utilities shared by the integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use camlink::actuator::ActuatorController;
use camlink::control::{ControlClient, ControlServer};

pub const POLL: Duration = Duration::from_millis(50);
pub const ACK_TIMEOUT: Duration = Duration::from_secs(1);
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Control server on an ephemeral loopback port with mock actuators.
pub async fn start_server(pins: &[u32]) -> (ControlServer, Arc<ActuatorController>) {
    let actuators = Arc::new(ActuatorController::mock(pins));
    let server = ControlServer::bind("127.0.0.1:0", Arc::clone(&actuators), POLL)
        .await
        .expect("bind control server");
    (server, actuators)
}

pub fn client_for(server: &ControlServer) -> ControlClient {
    ControlClient::new(server.local_addr().to_string())
}

/// Minimal sysfs GPIO tree with the given lines already exported.
pub fn fake_sysfs(lines: &[u32]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    fs::write(dir.path().join("export"), "").expect("write export");
    fs::write(dir.path().join("unexport"), "").expect("write unexport");
    for line in lines {
        let line_dir = dir.path().join(format!("gpio{line}"));
        fs::create_dir(&line_dir).expect("create line dir");
        fs::write(line_dir.join("direction"), "in").expect("write direction");
        fs::write(line_dir.join("value"), "0").expect("write value");
    }
    dir
}

pub fn read_line_file(root: &Path, line: u32, file: &str) -> String {
    fs::read_to_string(root.join(format!("gpio{line}")).join(file)).expect("read line file")
}
