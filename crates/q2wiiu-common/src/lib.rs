pub mod q_shared;
pub mod cvar;
pub mod config;
