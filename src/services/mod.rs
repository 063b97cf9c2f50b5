pub mod engine;
pub mod gateways;
pub mod runner;
pub mod session;
pub mod validation;
