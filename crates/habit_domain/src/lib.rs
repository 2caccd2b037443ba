pub mod api;
pub mod date;
pub mod error;
pub mod habit;
pub mod optimistic;
pub mod single_flight;
pub mod store;

pub use crate::api::HabitApi;
pub use crate::error::HabitError;
pub use crate::store::{HabitStore, StoreSnapshot};
