//! Shared fixtures for the integration tests.

pub mod eip8;
pub mod two_node;

pub use two_node::TwoNodeFixture;
