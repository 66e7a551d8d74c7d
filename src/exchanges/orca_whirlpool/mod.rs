pub mod adapter;
pub mod instruction;
pub mod parser;
pub mod swap_math;

pub use adapter::{ComputeBudget, OrcaWhirlpoolAdapter};
pub use parser::{OrcaWhirlpoolParser, WhirlpoolSnapshot};
