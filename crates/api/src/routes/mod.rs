//! Route handlers

pub mod frames;
pub mod notifications;
pub mod session;
pub mod settings;
