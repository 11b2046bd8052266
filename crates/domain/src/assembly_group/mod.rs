//! Assembly group aggregate and related types.

mod aggregate;
mod state;

pub use aggregate::{
    AssemblyGroup, ChangeContext, Fulfillment, FulfillmentSource, GroupTransition, Guard,
    PlannedDebit, RequiredComponent, StatusChange,
};
pub use state::GroupStatus;
