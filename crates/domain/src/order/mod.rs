//! Order aggregate and its status rollup.

mod aggregate;
mod state;

pub use aggregate::{LineItem, LineItemPatch, Order, apply_patch, rollup_status};
pub use state::{ItemStatus, OrderStatus};
