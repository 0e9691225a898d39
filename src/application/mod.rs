// Application layer - use cases orchestrating the domain pipeline
pub mod channel;
pub mod error;
pub mod lab_service;
pub mod notes;
pub mod periodic;
pub mod tutor;
