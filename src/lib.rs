pub mod config;
pub mod ecoapi;
pub mod ecobot;
pub mod ecodb;
pub mod gamify;
pub mod models;
