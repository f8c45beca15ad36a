pub mod recording_files;
pub mod unsubscribe_outbox;
