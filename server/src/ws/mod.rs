pub mod actor;
pub mod bootstrap;
pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod topics;
