pub mod event_publisher;
pub mod job_supervisor;
pub mod media_probe;
pub mod recordings;
pub mod subscription_gateway;
