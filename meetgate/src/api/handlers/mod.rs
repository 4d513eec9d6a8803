pub mod meetings;
pub mod proxy;
pub mod static_assets;
pub mod uploads;
