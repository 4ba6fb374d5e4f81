pub mod config_cmd;
pub mod preflight;
pub mod run;
