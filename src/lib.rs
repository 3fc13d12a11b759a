// ABOUTME: Gitter puppet adapter: provider client, event bridge, and the PuppetGitter facade
// ABOUTME: The provider-independent contract and raw cache live in puppet-core

pub mod bridge;
pub mod config;
pub mod gitter;
pub mod logging;
pub mod parsers;
pub mod puppet;

pub use bridge::{handle_room_message, BridgeOutcome, EventBridge, GitterRawCache};
pub use config::Config;
pub use puppet::{PuppetGitter, PUPPET_NAME};

// Re-export the core so binaries and tests need one dependency
pub use puppet_core;
pub use puppet_core::{Puppet, PuppetError, PuppetEvent};
