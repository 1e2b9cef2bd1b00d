pub mod adapter;
pub mod api;
