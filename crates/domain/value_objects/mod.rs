pub mod basename;
pub mod channel_config;
pub mod chapters;
pub mod enums;
pub mod jobs;
pub mod lifecycle_events;
pub mod notifications;
pub mod recording_document;
pub mod recordings;
pub mod retention;
