mod binary_op;
mod compiler;
mod expr;
mod unary_op;

pub use binary_op::*;
pub use compiler::*;
pub use expr::*;
pub use unary_op::*;
