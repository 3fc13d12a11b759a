// ABOUTME: Provider-agnostic puppet core: host framework contract and raw payload cache
// ABOUTME: Adapters implement the Puppet trait and keep provider payloads in a RawCache

pub mod cache;
pub mod error;
pub mod events;
pub mod metrics;
pub mod paths;
pub mod state;
pub mod traits;

pub use cache::{CacheConfig, CacheNamespace, KvStore, MessageCache, RawCache};
pub use error::{PayloadKind, PuppetError, Result};
pub use events::{EventEmitter, EventStream, PuppetEvent};
pub use state::{LifecycleState, StateSwitch};
pub use traits::{
    ContactGender, ContactPayload, ContactType, MessagePayload, MessageType, Puppet, RoomPayload,
};
