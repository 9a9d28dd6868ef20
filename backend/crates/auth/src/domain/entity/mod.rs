//! Entity Module

pub mod profile;
pub mod snapshot;
pub mod token;
pub mod user;
pub mod user_event;
pub mod verify_email;
