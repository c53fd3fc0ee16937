#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod gateway;
pub mod reconcile;
pub mod settlement;
