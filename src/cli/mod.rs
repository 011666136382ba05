pub mod config_cmd;
pub mod index;
pub mod repos;
pub mod style;
