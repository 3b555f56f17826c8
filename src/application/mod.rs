pub mod bootstrap;
pub mod cascade;
pub mod commands;
