pub mod waiters;
pub mod writer;

pub use waiters::{ConsumerId, LocationFound, LocationWaiters};
pub use writer::{LookupSource, ObservationWriter};
