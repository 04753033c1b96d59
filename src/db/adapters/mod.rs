pub mod basic;
pub mod ignite;
