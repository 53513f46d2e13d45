pub mod config;
pub mod drizzle;
pub mod run;
