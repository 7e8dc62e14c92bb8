pub mod domain;
pub mod events;
pub mod rotation;
pub mod router;
pub mod service;
pub mod session;

#[macro_use]
extern crate num_derive;
