pub mod cluster;
pub mod config;
pub mod frame;
pub mod run;
