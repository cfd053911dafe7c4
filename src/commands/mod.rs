mod capture;
mod clean;
mod clone;

pub use capture::run_capture;
pub use clean::run_clean;
pub use clone::run_clone;
