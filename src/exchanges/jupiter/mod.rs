pub mod adapter;

pub use adapter::JupiterAdapter;
