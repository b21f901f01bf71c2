pub mod api;
pub mod config;
pub mod db;
pub mod fetch_error;
pub mod fetcher;
pub mod normalize;
pub mod parse_error;
pub mod series;
pub mod services;
pub mod station_directory;
