//! Riddle quiz client with a client-side answer lockout
//!
//! A wrong answer locks the riddle for the duration the quiz service asks for
//! (or a configured fallback). The unlock time is kept in local storage so the
//! lock outlives restarts.

pub mod cli;
pub mod commands;
pub mod config;
pub mod lockout;
pub mod platform;
pub mod service;
pub mod session;
