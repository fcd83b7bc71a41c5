//! Subcommand implementations, one module per `coderaft` verb.

pub mod doctor_ping;
pub mod down;
pub mod exec;
pub mod list;
pub mod up;
