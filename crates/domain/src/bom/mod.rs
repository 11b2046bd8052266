//! Bill-of-materials expansion.

mod reference;
mod resolver;

pub use reference::{ComponentRef, RefIssue, normalize};
pub use resolver::{
    BomExpansion, BomResolver, BomWarning, DEFAULT_MAX_DEPTH, IntegrityIssue, ROOT_NODE,
    ResolvedComponent,
};
