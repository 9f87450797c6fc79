pub mod snapshot;
pub mod store;
pub mod types;

pub use store::{CycleStore, PostgresCycleStore};
pub use types::{Cycle, CycleMatch, CycleStatus, Moneyline, OverUnder};
