pub mod job;
pub mod ports;
pub mod subscription;
