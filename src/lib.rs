mod allocation;
mod api;
mod console;
mod error;
mod gate;
mod session;
mod store;

use std::time::Duration;

pub use allocation::AllocationTracker;
pub use api::{Allocation, PoolClient, ProxyRecord, ProxyStatsRecord, TokenResponse};
pub use console::run;
pub use error::ApiError;
pub use gate::{route, GateState, View};
pub use session::SessionStore;
pub use store::{PolledStore, QueryState, RefreshHandle};

/// Fixed cadence for background pool refreshes. Freshness is time-driven
/// only; there is no activity- or focus-driven refetch.
pub const POLL_INTERVAL: Duration = Duration::from_millis(5000);
