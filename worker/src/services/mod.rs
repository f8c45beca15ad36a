pub mod event_journal;
pub mod notification_inbox;
pub mod shutdown;
