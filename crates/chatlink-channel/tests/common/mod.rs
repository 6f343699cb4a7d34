//! Shared helpers for integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::sync::Arc;

use chatlink_channel::testing::{MockPlatform, MockRuntime};
use chatlink_channel::Bridge;
use chatlink_types::{BridgeConfig, ShellConfig, SlackConfig, Target};

pub const INSTANCE_ID: u16 = 4242;

/// Config for a bridge attached to `target` (`#name` for a channel).
pub fn config(target: &str) -> BridgeConfig {
    BridgeConfig {
        slack: SlackConfig {
            bot_token: "xoxb-test".into(),
            app_token: None,
            target: Target::parse(target).expect("valid target"),
            source_user: None,
        },
        agent: Default::default(),
        poll: Default::default(),
        shell: ShellConfig::default(),
    }
}

/// A platform with channel `#ops` (C1) and user `alice` (U1).
pub fn platform() -> Arc<MockPlatform> {
    Arc::new(
        MockPlatform::new()
            .with_channel("C1", "ops")
            .with_user("U1", "alice")
            .with_user("U2", "bob")
            .echoing_posts(),
    )
}

/// A started bridge plus handles to its doubles.
pub async fn started_bridge(
    config: &BridgeConfig,
    platform: Arc<MockPlatform>,
) -> (Bridge<MockPlatform, MockRuntime>, Arc<MockRuntime>) {
    let runtime = Arc::new(MockRuntime::new());
    let mut bridge = Bridge::new(config, platform, runtime.clone(), INSTANCE_ID);
    bridge.start("startup").await;
    (bridge, runtime)
}
