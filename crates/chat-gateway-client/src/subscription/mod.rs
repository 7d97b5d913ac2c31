//! Guild, DM and member-list subscriptions plus member lookups

mod manager;
mod ranges;

pub use manager::{MemberBatch, MemberLookup, SubscriptionManager};
pub use ranges::{MemberRange, RangeSet};
