pub mod polling;
pub mod store;

#[cfg(test)]
pub mod test_support;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::watch;
use tracing::debug;

use crate::chart::{self, ChartGeometry};
use crate::theme::Theme;
use crate::types::{SharedSnapshot, TaskId};

use self::polling::{PollState, PollingController};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Key(KeyEvent),
    Tick,
    Resize(u16, u16),
}

/// State behind the task detail view.
///
/// Snapshots arrive through the store's watch channel and are picked up on
/// [`Message::Tick`]; chart geometry is derived once per observed snapshot.
pub struct App {
    controller: PollingController,
    snapshots: watch::Receiver<Option<SharedSnapshot>>,
    snapshot: Option<SharedSnapshot>,
    geometry: Option<ChartGeometry>,
    theme: Theme,
    should_quit: bool,
}

impl App {
    pub fn new(controller: PollingController, theme: Theme) -> Self {
        let snapshots = controller.store().subscribe();
        Self {
            controller,
            snapshots,
            snapshot: None,
            geometry: None,
            theme,
            should_quit: false,
        }
    }

    /// Starts polling `task_id`. Must be called from within a tokio runtime.
    pub fn watch(&mut self, task_id: TaskId) {
        self.controller.bind(task_id);
        self.sync_snapshot();
    }

    pub fn update(&mut self, message: Message) -> Result<()> {
        match message {
            Message::Key(key) => self.handle_key(key),
            Message::Tick => self.sync_snapshot(),
            // The layout is recomputed from the frame area on the next draw.
            Message::Resize(..) => {}
        }
        Ok(())
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn snapshot(&self) -> Option<&SharedSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn geometry(&self) -> Option<&ChartGeometry> {
        self.geometry.as_ref()
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn poll_state(&self) -> PollState {
        self.controller.state()
    }

    pub fn failure_count(&self) -> u32 {
        self.controller.failure_count()
    }

    pub fn poll_interval_secs(&self) -> f64 {
        self.controller.interval().as_secs_f64()
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => self.quit(),
            KeyCode::Char('r') => {
                debug!("manual refresh requested");
                self.controller.refresh_now();
            }
            _ => {}
        }
    }

    fn quit(&mut self) {
        self.controller.teardown();
        self.should_quit = true;
    }

    fn sync_snapshot(&mut self) {
        if !self.snapshots.has_changed().unwrap_or(false) {
            return;
        }

        let snapshot = self.snapshots.borrow_and_update().clone();
        self.geometry = snapshot
            .as_ref()
            .map(|snapshot| chart::render(&snapshot.analytics));
        self.snapshot = snapshot;
    }
}
