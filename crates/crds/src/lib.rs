//! machine-api resource definitions
//!
//! Typed views of the `machine.openshift.io/v1beta1` resources the node metadata
//! operator reads and updates. The CRDs themselves belong to machine-api; these
//! types only model them, so no schema is generated.

pub mod machine;
pub mod machine_set;

pub use machine::*;
pub use machine_set::*;
