use super::{ConnectionMatrix, Cursor};
use crate::input::{Button, ButtonEvent, Press};
use crate::topology::{PortId, PortTopologySource, TopologyError};

use std::sync::Arc;

/// Why a select did nothing. Both are expected races with what the user
/// sees on screen, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Cursor is on the diagonal; a port cannot feed itself.
    SelfConnection,
    /// Matrix is empty or shrank under the cursor.
    NoTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    Subscribed { sender: PortId, dest: PortId },
    Unsubscribed { sender: PortId, dest: PortId },
    Rejected(Rejection),
}

/// What a button event did to the navigation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Moved(Cursor),
    Selected(SelectOutcome),
    /// Trailing release of a hold gesture.
    Swallowed,
    /// Move on an empty matrix.
    Unchanged,
}

/// A toggle the controller decided on, not yet sent to the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggle {
    pub sender: PortId,
    pub dest: PortId,
    /// State of the jack when the decision was made.
    pub connected: bool,
}

impl Toggle {
    /// Asks `midi` to subscribe or unsubscribe. A port that vanished since
    /// the matrix was built rejects the toggle as `NoTarget`.
    pub fn apply<S: PortTopologySource + ?Sized>(
        self,
        midi: &S,
    ) -> Result<SelectOutcome, TopologyError> {
        let Toggle {
            sender,
            dest,
            connected,
        } = self;
        let sent = if connected {
            midi.unsubscribe(sender, dest)
        } else {
            midi.subscribe(sender, dest)
        };
        match sent {
            Ok(()) if connected => Ok(SelectOutcome::Unsubscribed { sender, dest }),
            Ok(()) => Ok(SelectOutcome::Subscribed { sender, dest }),
            Err(TopologyError::UnknownPort(_)) => Ok(SelectOutcome::Rejected(Rejection::NoTarget)),
            Err(err) => Err(err),
        }
    }
}

/// A button event applied to the navigation state only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Done(InputOutcome),
    /// A hold picked a jack; the outcome depends on the sequencer.
    Request(Toggle),
}

/// Cursor, pending-gesture flag, and the handle used to toggle jacks.
///
/// Commands only: callers render after each call.
pub struct NavigationController<S: PortTopologySource + ?Sized> {
    cursor: Cursor,
    pending: bool,
    midi: Arc<S>,
}

impl<S: PortTopologySource + ?Sized> NavigationController<S> {
    pub fn new(midi: Arc<S>) -> NavigationController<S> {
        NavigationController {
            cursor: Cursor::default(),
            pending: false,
            midi,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Moves with column carry; a cursor stranded by a shrink is first
    /// clamped back into the `n`×`n` grid.
    pub fn move_cursor(&mut self, d_row: isize, d_col: isize, n: usize) -> Cursor {
        if n > 0 {
            self.cursor = self.cursor.clamped(n).stepped(d_row, d_col, n);
        }
        self.cursor
    }

    /// Picks the jack under the cursor, clamping a cursor stranded by a
    /// shrink onto the cell the screen shows. Sets the pending flag even
    /// when nothing can be toggled.
    pub fn target(&mut self, matrix: &ConnectionMatrix) -> Result<Toggle, Rejection> {
        self.pending = true;

        let n = matrix.len();
        if n == 0 {
            return Err(Rejection::NoTarget);
        }
        self.cursor = self.cursor.clamped(n);
        let Cursor { row, col } = self.cursor;
        if row == col {
            return Err(Rejection::SelfConnection);
        }
        match (
            matrix.is_connected(row, col),
            matrix.port_id(row),
            matrix.port_id(col),
        ) {
            (Some(connected), Some(sender), Some(dest)) => Ok(Toggle {
                sender,
                dest,
                connected,
            }),
            _ => Err(Rejection::NoTarget),
        }
    }

    /// Toggles the jack under the cursor by asking the sequencer to
    /// subscribe or unsubscribe. The matrix is left untouched: the change
    /// shows up once the sequencer announces it.
    pub fn select(&mut self, matrix: &ConnectionMatrix) -> Result<SelectOutcome, TopologyError> {
        match self.target(matrix) {
            Ok(toggle) => toggle.apply(&*self.midi),
            Err(why) => Ok(SelectOutcome::Rejected(why)),
        }
    }

    /// Applies one button report to the cursor and flag without talking
    /// to the sequencer: releases move (previous goes back, select goes
    /// forward), holds pick a jack. The release that ends a hold is
    /// swallowed.
    pub fn step(&mut self, event: ButtonEvent, matrix: &ConnectionMatrix) -> Step {
        match event.press {
            Press::Held => match self.target(matrix) {
                Ok(toggle) => Step::Request(toggle),
                Err(why) => Step::Done(InputOutcome::Selected(SelectOutcome::Rejected(why))),
            },
            Press::Released if self.pending => {
                self.pending = false;
                Step::Done(InputOutcome::Swallowed)
            }
            Press::Released => {
                if matrix.is_empty() {
                    return Step::Done(InputOutcome::Unchanged);
                }
                let d_col = match event.button {
                    Button::Previous => -1,
                    Button::Select => 1,
                };
                Step::Done(InputOutcome::Moved(self.move_cursor(0, d_col, matrix.len())))
            }
        }
    }

    /// `step`, then sends any picked toggle.
    pub fn handle(
        &mut self,
        event: ButtonEvent,
        matrix: &ConnectionMatrix,
    ) -> Result<InputOutcome, TopologyError> {
        match self.step(event, matrix) {
            Step::Done(outcome) => Ok(outcome),
            Step::Request(toggle) => Ok(InputOutcome::Selected(toggle.apply(&*self.midi)?)),
        }
    }
}
