use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyEvent};
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::relay::RELAY_INTERVAL_MS;

use super::message::RadioEvent;

/// Everything the console loop reacts to.
#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Radio(RadioEvent),
    /// Drives the inbound relay and redraws.
    Tick,
    Resize(u16, u16),
}

/// Feeds the console loop from the keyboard, the radio worker and the relay
/// timer, so the UI task only ever waits on one channel.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl EventHandler {
    pub fn new(radio_rx: mpsc::UnboundedReceiver<RadioEvent>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        // Keys and resizes; other terminal events are not used.
        let tx_term = tx.clone();
        tokio::spawn(async move {
            let mut reader = EventStream::new();
            while let Some(Ok(event)) = reader.next().await {
                let app_event = match event {
                    Event::Key(key) => AppEvent::Key(key),
                    Event::Resize(w, h) => AppEvent::Resize(w, h),
                    _ => continue,
                };
                if tx_term.send(app_event).is_err() {
                    break;
                }
            }
        });

        // Outcomes of radio commands, in the order the worker ran them.
        let tx_radio = tx.clone();
        tokio::spawn(async move {
            let mut radio_rx = radio_rx;
            while let Some(event) = radio_rx.recv().await {
                if tx_radio.send(AppEvent::Radio(event)).is_err() {
                    break;
                }
            }
        });

        // Relay tick. A slow frame skips ticks rather than bursting to catch up.
        let tx_tick = tx;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(RELAY_INTERVAL_MS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx_tick.send(AppEvent::Tick).is_err() {
                    break;
                }
            }
        });

        Self { rx }
    }

    /// `None` once every source has hung up.
    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}
