mod address;
mod error;
mod events;

pub use address::{BackpointerMap, Direction, GlobalAddress, StreamId};
pub use error::{err, Error, Result, RuntimeError};
pub use events::{EventBus, Subscription};
