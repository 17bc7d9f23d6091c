mod operation;
mod product;
mod receipt;

pub use operation::*;
pub use product::*;
pub use receipt::*;
