pub mod broadcast_bus;
pub mod debouncer;
