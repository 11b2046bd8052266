//! Domain layer for the production engine.
//!
//! This crate provides:
//! - the product catalog and the BOM resolver expanding it
//! - the append-only stock ledger and derived balances
//! - the assembly group aggregate and its state machine
//! - the order aggregate with its pure status rollup
//! - the packaging queue entry
//!
//! Aggregates are plain documents loaded and saved through a
//! [`doc_store::Transaction`]; handlers in the engine crate compose them.

pub mod aggregate;
pub mod assembly_group;
pub mod bom;
pub mod catalog;
pub mod collections;
pub mod error;
pub mod ledger;
pub mod order;
pub mod packaging;

pub use aggregate::{Aggregate, AggregateStore};
pub use assembly_group::{
    AssemblyGroup, ChangeContext, Fulfillment, FulfillmentSource, GroupStatus, GroupTransition,
    Guard, PlannedDebit, RequiredComponent, StatusChange,
};
pub use bom::{BomExpansion, BomResolver, BomWarning, ComponentRef, ResolvedComponent};
pub use catalog::{Catalog, InMemoryCatalog, ProductDefinition, ProductType, SupplyRequirement};
pub use error::DomainError;
pub use ledger::{
    EntryIds, LedgerItem, LocationAllocation, MovementType, ServiceKind, ServiceTimeEntry,
    StockBalance, StockMovement, SupplyMovement,
};
pub use order::{
    ItemStatus, LineItem, LineItemPatch, Order, OrderStatus, apply_patch, rollup_status,
};
pub use packaging::{PackagingEntry, PackagingStatus};
