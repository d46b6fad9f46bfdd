mod bus;

pub use bus::{SyncBus, SyncEvent, SyncState};
