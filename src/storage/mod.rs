mod items;
mod schema;
mod subscriptions;
mod types;

pub use schema::Database;
pub use types::{DatabaseError, Item, Subscription, Tag};
