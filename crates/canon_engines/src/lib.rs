#![forbid(unsafe_code)]

pub mod calib;
pub mod integrity;
pub mod route;
pub mod signal;
