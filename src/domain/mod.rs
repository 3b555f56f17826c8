pub mod calendar;
pub mod models;
pub mod schedule;
pub mod status;
