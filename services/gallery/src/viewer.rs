//! Image viewer sequencing.
//!
//! Two sequencers share one shape: [`ManualViewer`] pages cyclically through
//! the list, [`StoryViewer`] advances on a timer and closes after the last
//! image. Both only track state; the story timer is driven by
//! [`crate::story_player`].

use thiserror::Error;

/// Progress value at which a story image is complete
pub const STORY_PROGRESS_MAX: u8 = 100;

/// Default minimum horizontal distance of a swipe
pub const SWIPE_THRESHOLD: f32 = 50.0;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ViewerError {
    #[error("Cannot open a viewer on an empty image list")]
    Empty,

    #[error("Start index {start} out of range for {len} images")]
    StartOutOfRange { start: usize, len: usize },
}

/// User intent, whatever input it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerCommand {
    Close,
    Previous,
    Next,
}

impl ViewerCommand {
    /// Map a keyboard key name to a command
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "Escape" => Some(ViewerCommand::Close),
            "ArrowLeft" => Some(ViewerCommand::Previous),
            "ArrowRight" => Some(ViewerCommand::Next),
            _ => None,
        }
    }

    /// Map a horizontal touch gesture to a command.
    ///
    /// Swiping left (start right of end) goes forward; moves no longer than
    /// `threshold` are ignored.
    pub fn from_swipe(start_x: f32, end_x: f32, threshold: f32) -> Option<Self> {
        let diff = start_x - end_x;
        if diff.abs() <= threshold {
            None
        } else if diff > 0.0 {
            Some(ViewerCommand::Next)
        } else {
            Some(ViewerCommand::Previous)
        }
    }
}

/// Result of one navigation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Current index changed
    Moved(usize),
    /// Nothing observable changed index-wise
    Stayed,
    /// The viewer closed; reported once
    Closed,
}

/// Common contract of both viewer variants
pub trait Sequencer {
    fn index(&self) -> usize;

    fn len(&self) -> usize;

    fn is_closed(&self) -> bool;

    fn previous(&mut self) -> Step;

    fn next(&mut self) -> Step;

    fn close(&mut self) -> Step;

    fn apply(&mut self, command: ViewerCommand) -> Step {
        match command {
            ViewerCommand::Close => self.close(),
            ViewerCommand::Previous => self.previous(),
            ViewerCommand::Next => self.next(),
        }
    }
}

fn check_bounds(len: usize, start: usize) -> Result<(), ViewerError> {
    if len == 0 {
        return Err(ViewerError::Empty);
    }
    if start >= len {
        return Err(ViewerError::StartOutOfRange { start, len });
    }
    Ok(())
}

/// Full-image viewer paging cyclically in both directions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualViewer {
    index: usize,
    len: usize,
    closed: bool,
}

impl ManualViewer {
    pub fn new(len: usize, start: usize) -> Result<Self, ViewerError> {
        check_bounds(len, start)?;
        Ok(Self {
            index: start,
            len,
            closed: false,
        })
    }

    /// 1-based position label, e.g. "3 / 12"
    pub fn position_label(&self) -> String {
        format!("{} / {}", self.index + 1, self.len)
    }
}

impl Sequencer for ManualViewer {
    fn index(&self) -> usize {
        self.index
    }

    fn len(&self) -> usize {
        self.len
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn previous(&mut self) -> Step {
        if self.closed {
            return Step::Stayed;
        }
        self.index = if self.index == 0 { self.len - 1 } else { self.index - 1 };
        Step::Moved(self.index)
    }

    fn next(&mut self) -> Step {
        if self.closed {
            return Step::Stayed;
        }
        self.index = if self.index == self.len - 1 { 0 } else { self.index + 1 };
        Step::Moved(self.index)
    }

    fn close(&mut self) -> Step {
        if std::mem::replace(&mut self.closed, true) {
            Step::Stayed
        } else {
            Step::Closed
        }
    }
}

/// Auto-advancing story viewer; never wraps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryViewer {
    index: usize,
    len: usize,
    progress: u8,
    closed: bool,
}

impl StoryViewer {
    pub fn new(len: usize, start: usize) -> Result<Self, ViewerError> {
        check_bounds(len, start)?;
        Ok(Self {
            index: start,
            len,
            progress: 0,
            closed: false,
        })
    }

    /// Progress of the current image, 0 to [`STORY_PROGRESS_MAX`]
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// One timer tick: grow progress, or advance once it is full
    pub fn tick(&mut self) -> Step {
        if self.closed {
            return Step::Stayed;
        }
        if self.progress >= STORY_PROGRESS_MAX {
            return self.next();
        }
        self.progress += 1;
        Step::Stayed
    }

    /// Fill state of each segment of the progress bar, 0 to 100
    pub fn segments(&self) -> Vec<u8> {
        (0..self.len)
            .map(|i| match i.cmp(&self.index) {
                std::cmp::Ordering::Less => STORY_PROGRESS_MAX,
                std::cmp::Ordering::Equal => self.progress,
                std::cmp::Ordering::Greater => 0,
            })
            .collect()
    }
}

impl Sequencer for StoryViewer {
    fn index(&self) -> usize {
        self.index
    }

    fn len(&self) -> usize {
        self.len
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn previous(&mut self) -> Step {
        if self.closed || self.index == 0 {
            return Step::Stayed;
        }
        self.index -= 1;
        self.progress = 0;
        Step::Moved(self.index)
    }

    fn next(&mut self) -> Step {
        if self.closed {
            return Step::Stayed;
        }
        if self.index + 1 >= self.len {
            return self.close();
        }
        self.index += 1;
        self.progress = 0;
        Step::Moved(self.index)
    }

    fn close(&mut self) -> Step {
        if std::mem::replace(&mut self.closed, true) {
            Step::Stayed
        } else {
            Step::Closed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_rejected() {
        assert_eq!(ManualViewer::new(0, 0), Err(ViewerError::Empty));
        assert_eq!(
            StoryViewer::new(3, 3),
            Err(ViewerError::StartOutOfRange { start: 3, len: 3 })
        );
    }

    #[test]
    fn test_manual_next_cycles_back_to_start() {
        let mut viewer = ManualViewer::new(4, 0).unwrap();
        for _ in 0..4 {
            viewer.next();
        }
        assert_eq!(viewer.index(), 0);
    }

    #[test]
    fn test_manual_previous_wraps_to_last() {
        let mut viewer = ManualViewer::new(4, 0).unwrap();
        assert_eq!(viewer.previous(), Step::Moved(3));
        assert_eq!(viewer.position_label(), "4 / 4");
    }

    #[test]
    fn test_manual_single_image_stays_put() {
        let mut viewer = ManualViewer::new(1, 0).unwrap();
        assert_eq!(viewer.next(), Step::Moved(0));
        assert_eq!(viewer.previous(), Step::Moved(0));
    }

    #[test]
    fn test_manual_close_reported_once() {
        let mut viewer = ManualViewer::new(2, 1).unwrap();
        assert_eq!(viewer.apply(ViewerCommand::Close), Step::Closed);
        assert_eq!(viewer.apply(ViewerCommand::Close), Step::Stayed);
        assert_eq!(viewer.next(), Step::Stayed);
        assert_eq!(viewer.index(), 1);
    }

    #[test]
    fn test_story_next_from_last_closes_once() {
        let mut viewer = StoryViewer::new(3, 2).unwrap();

        assert_eq!(viewer.next(), Step::Closed);
        assert_eq!(viewer.index(), 2);
        assert_eq!(viewer.next(), Step::Stayed);
        assert_eq!(viewer.tick(), Step::Stayed);
        assert!(viewer.is_closed());
    }

    #[test]
    fn test_story_previous_at_start_is_noop() {
        let mut viewer = StoryViewer::new(3, 0).unwrap();
        viewer.tick();

        assert_eq!(viewer.previous(), Step::Stayed);
        assert_eq!(viewer.index(), 0);
        assert_eq!(viewer.progress(), 1);
    }

    #[test]
    fn test_story_manual_navigation_resets_progress() {
        let mut viewer = StoryViewer::new(3, 1).unwrap();
        for _ in 0..40 {
            viewer.tick();
        }
        assert_eq!(viewer.progress(), 40);

        assert_eq!(viewer.apply(ViewerCommand::Next), Step::Moved(2));
        assert_eq!(viewer.progress(), 0);

        for _ in 0..10 {
            viewer.tick();
        }
        assert_eq!(viewer.apply(ViewerCommand::Previous), Step::Moved(1));
        assert_eq!(viewer.progress(), 0);
    }

    #[test]
    fn test_story_ticks_advance_after_full_progress() {
        let mut viewer = StoryViewer::new(2, 0).unwrap();

        for _ in 0..STORY_PROGRESS_MAX {
            assert_eq!(viewer.tick(), Step::Stayed);
        }
        assert_eq!(viewer.progress(), STORY_PROGRESS_MAX);
        assert_eq!(viewer.tick(), Step::Moved(1));
        assert_eq!(viewer.progress(), 0);

        for _ in 0..STORY_PROGRESS_MAX {
            viewer.tick();
        }
        assert_eq!(viewer.tick(), Step::Closed);
        assert_eq!(viewer.index(), 1);
    }

    #[test]
    fn test_story_segments() {
        let mut viewer = StoryViewer::new(3, 1).unwrap();
        for _ in 0..25 {
            viewer.tick();
        }
        assert_eq!(viewer.segments(), vec![100, 25, 0]);
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(ViewerCommand::from_key("Escape"), Some(ViewerCommand::Close));
        assert_eq!(ViewerCommand::from_key("ArrowLeft"), Some(ViewerCommand::Previous));
        assert_eq!(ViewerCommand::from_key("ArrowRight"), Some(ViewerCommand::Next));
        assert_eq!(ViewerCommand::from_key("Enter"), None);
    }

    #[test]
    fn test_swipe_mapping() {
        assert_eq!(ViewerCommand::from_swipe(300.0, 200.0, SWIPE_THRESHOLD), Some(ViewerCommand::Next));
        assert_eq!(ViewerCommand::from_swipe(200.0, 300.0, SWIPE_THRESHOLD), Some(ViewerCommand::Previous));
        assert_eq!(ViewerCommand::from_swipe(200.0, 250.0, SWIPE_THRESHOLD), None);
        assert_eq!(ViewerCommand::from_swipe(200.0, 170.0, SWIPE_THRESHOLD), None);
    }
}
