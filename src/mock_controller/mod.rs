#[allow(clippy::module_inception)]
pub mod mock_controller;
