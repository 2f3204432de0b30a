pub mod augment;
pub mod divergence;
pub mod field_set;
pub mod key;

pub use divergence::{Divergence, MacDivergence};
pub use field_set::FieldSet;
pub use key::{Axis, FieldKey};
