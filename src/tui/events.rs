//! Input pump for the TUI: merges terminal input, the render tick, and
//! termination signals into one ordered stream.

use crossterm::event::{Event as TermEvent, EventStream, KeyEvent, KeyEventKind};
use futures::{FutureExt, StreamExt};
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub enum Event {
    Tick,
    Key(KeyEvent),
    Resize(u16, u16),
    Shutdown,
}

/// Owns the pump task; dropping or calling [`EventHandler::shutdown`]
/// stops it.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    pump: Option<JoinHandle<()>>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump(tick_rate, tx));
        Self {
            rx,
            pump: Some(pump),
        }
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn shutdown(mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn pump(tick_rate: Duration, tx: mpsc::UnboundedSender<Event>) {
    let mut input = EventStream::new();
    let mut tick = tokio::time::interval(tick_rate);
    // A stalled draw loop should not be chased by a burst of ticks.
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut sigint = try_signal(SignalKind::interrupt());
    let mut sigterm = try_signal(SignalKind::terminate());

    loop {
        let event = tokio::select! {
            _ = recv_signal(&mut sigint) => Event::Shutdown,
            _ = recv_signal(&mut sigterm) => Event::Shutdown,
            _ = tick.tick() => Event::Tick,
            Some(Ok(term_event)) = input.next().fuse() => {
                match term_event {
                    // Key repeats and releases (kitty protocol terminals)
                    // would double-fire every binding.
                    TermEvent::Key(key) if key.kind == KeyEventKind::Press => Event::Key(key),
                    TermEvent::Resize(w, h) => Event::Resize(w, h),
                    _ => continue,
                }
            }
        };

        let shutdown = matches!(event, Event::Shutdown);
        if tx.send(event).is_err() || shutdown {
            break;
        }
    }
}

fn try_signal(kind: SignalKind) -> Option<Signal> {
    match signal(kind) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!("No signal handler for {:?} ({}); use 'q' to quit", kind, e);
            None
        }
    }
}

async fn recv_signal(s: &mut Option<Signal>) -> Option<()> {
    match s {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}
