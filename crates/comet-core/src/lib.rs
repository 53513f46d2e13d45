pub mod config;
pub mod consts;
pub mod drizzle;
pub mod error;
pub mod frame;
pub mod homography;
pub mod image;
pub mod interpolation;
pub mod io;
pub mod job;
pub mod linear_fit;
pub mod loader;
pub mod output;
pub mod progress;
pub mod resample;
pub mod scheduler;
