pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod geolocate;
pub mod histogram;
pub mod providers;
pub mod quota;
pub mod service;
