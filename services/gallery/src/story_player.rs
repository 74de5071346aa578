//! Timer-driven playback of a [`StoryViewer`].
//!
//! The repeating timer lives in a spawned task. Inputs reach it through a
//! command channel, state leaves it through a watch channel, and the task is
//! torn down by a cancellation token that [`StoryHandle`] cancels on close
//! and on drop. Natural closure (past the last image, or Escape) is reported
//! once through a oneshot channel carrying the final index.

use crate::viewer::{Sequencer, Step, StoryViewer, ViewerCommand};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Snapshot of a playing story
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoryState {
    pub index: usize,
    pub progress: u8,
    pub closed: bool,
}

impl StoryState {
    fn of(viewer: &StoryViewer) -> Self {
        Self {
            index: viewer.index(),
            progress: viewer.progress(),
            closed: viewer.is_closed(),
        }
    }
}

/// Handle to a playing story; dropping it stops the timer
#[derive(Debug)]
pub struct StoryHandle {
    commands: mpsc::UnboundedSender<ViewerCommand>,
    state: watch::Receiver<StoryState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StoryHandle {
    /// Forward a keyboard/swipe/button command; false once playback ended
    pub fn send(&self, command: ViewerCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Latest published state
    pub fn state(&self) -> StoryState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<StoryState> {
        self.state.clone()
    }

    /// Stop playback and wait for the timer task to finish
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for StoryHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Default progress tick: 100 ticks per image, about 3 seconds
pub const STORY_TICK: Duration = Duration::from_millis(30);

/// Start playing `viewer`, ticking every `tick`
pub fn play(viewer: StoryViewer, tick: Duration, on_close: oneshot::Sender<usize>) -> StoryHandle {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (state_tx, state) = watch::channel(StoryState::of(&viewer));
    let cancel = CancellationToken::new();

    let task = tokio::spawn(run(viewer, tick, command_rx, state_tx, cancel.clone(), on_close));

    StoryHandle {
        commands,
        state,
        cancel,
        task: Some(task),
    }
}

async fn run(
    mut viewer: StoryViewer,
    tick: Duration,
    mut commands: mpsc::UnboundedReceiver<ViewerCommand>,
    state: watch::Sender<StoryState>,
    cancel: CancellationToken,
    on_close: oneshot::Sender<usize>,
) {
    let mut interval = interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let step = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(index = viewer.index(), "Story playback cancelled");
                return;
            }
            _ = interval.tick() => viewer.tick(),
            command = commands.recv() => match command {
                Some(command) => {
                    let step = viewer.apply(command);
                    if matches!(step, Step::Moved(_)) {
                        // Manual navigation restarts the countdown
                        interval.reset();
                    }
                    step
                }
                None => return,
            },
        };

        trace!(index = viewer.index(), progress = viewer.progress(), "Story step");
        state.send_replace(StoryState::of(&viewer));

        if step == Step::Closed {
            debug!(index = viewer.index(), "Story closed");
            let _ = on_close.send(viewer.index());
            return;
        }
    }
}
