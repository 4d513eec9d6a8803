//! API request and response types.

pub mod meetings;
pub mod uploads;
