pub mod common;
pub mod configs;
pub mod engine;
pub mod player;
pub mod protocol;
pub mod server;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
