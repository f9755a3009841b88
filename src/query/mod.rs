pub mod build;
pub mod predicate;
pub mod render;

pub use build::{DeleteQuery, InsertQuery, Order, SelectQuery, UpdateQuery};
pub use predicate::{CmpOp, Operand, Predicate, col, lit};
pub use render::SqlRenderer;
