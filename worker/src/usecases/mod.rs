pub mod capture_pipeline;
pub mod channel_notifications;
pub mod retention_cleanup;
pub mod startup_repair;
