//! Background workers.

pub mod command_worker;
