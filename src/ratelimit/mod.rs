//! Rate limiting logic and state management.

mod backend;
mod clock;
mod counter;
mod key;
mod local;
#[cfg(any(test, feature = "test-util"))]
pub mod mocks;
mod policy;
mod shared;
mod window;

pub use backend::{BackendKind, CounterBackend, Decision};
pub use clock::{Clock, SystemClock};
pub use counter::CounterEntry;
pub use key::{CounterKey, Identifier};
pub use local::{LocalBackend, DEFAULT_SWEEP_INTERVAL};
pub use policy::{Category, Policy, PolicyOverride, PolicyRegistry, POLICY_TABLE_VERSION};
pub use shared::RedisBackend;
pub use window::{parse_window, try_parse_window, WindowUnit, DEFAULT_WINDOW, MAX_WINDOW};
