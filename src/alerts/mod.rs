//! Real-time incident notifications

mod broadcaster;
mod event;


pub use broadcaster::{AlertBroadcaster, AlertStats, AlertSubscription, SubscriberId};
pub use event::{AlertEvent, AlertKind};
