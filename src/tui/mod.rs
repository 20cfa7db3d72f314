pub mod app;
pub mod event;
pub mod message;
pub mod radio_task;
pub mod ui;
