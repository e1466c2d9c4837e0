//! Event types and the main event loop driver for the distance badge.
//!
//! This module defines the [`Event`] enum (keyboard input, ticks, resolution
//! outcomes, country enrichment and animation redraws) and the
//! [`EventHandler`], which runs a background task that polls crossterm for key
//! events and emits periodic [`Event::Tick`]s. Background work spawned by
//! [`App`](crate::app::App) posts its results through [`EventHandler::tx`], so
//! every state change is applied on the main loop in the order it was sent.

use crate::models::ResolvedPosition;
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::warn;

/// Events processed by the application event loop.
#[derive(Debug)]
pub enum Event {
    /// Periodic tick used for UI refresh.
    Tick,
    /// User key press from the terminal.
    Input(KeyEvent),
    /// Outcome of the resolution strategy; `None` means every resolver failed.
    Resolved(Option<ResolvedPosition>),
    /// Outcome of reverse geocoding; `None` when enrichment failed.
    Country(Option<String>),
    /// The route animation advanced and the map needs repainting.
    Redraw,
}

/// Multiplexes terminal input and ticks into a single event stream.
///
/// The sender ([`tx`](EventHandler::tx)) can be cloned and handed to other
/// tasks; the receiver is consumed by [`next`](EventHandler::next).
pub struct EventHandler {
    pub tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
    /// Creates the channel. Nothing is polled until [`start`](EventHandler::start).
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Spawns the input/tick poller.
    ///
    /// crossterm's `poll` blocks, so the poller runs on the blocking pool. It
    /// exits on the first terminal read error or once the receiver is gone.
    ///
    /// # Arguments
    ///
    /// * `tick_rate_ms` - Interval in milliseconds between [`Event::Tick`] emissions.
    pub fn start(&self, tick_rate_ms: u64) {
        let event_tx = self.tx.clone();

        tokio::task::spawn_blocking(move || {
            let tick_rate = Duration::from_millis(tick_rate_ms);
            let mut last_tick = Instant::now();
            while !event_tx.is_closed() {
                let timeout = tick_rate
                    .checked_sub(last_tick.elapsed())
                    .unwrap_or(Duration::from_secs(0));
                match event::poll(timeout) {
                    Ok(true) => match event::read() {
                        Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => {
                            event_tx.send(Event::Input(key)).ok();
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Terminal read failed: {}", e);
                            break;
                        }
                    },
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Terminal poll failed: {}", e);
                        break;
                    }
                }
                if last_tick.elapsed() >= tick_rate {
                    event_tx.send(Event::Tick).ok();
                    last_tick = Instant::now();
                }
            }
        });
    }

    /// Receives the next event from the channel.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}
