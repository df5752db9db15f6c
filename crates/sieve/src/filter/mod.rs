//! Filter types, values and the registry that ties them together.

pub mod codec;
pub mod handlers;
pub mod registry;
pub mod value;

pub use registry::{FilterHandler, FilterRegistry, FilterTypeDeclaration};
pub use value::{FilterMap, FilterValue, FormPayload, RawInput};
