use super::{DisplayError, DisplaySink, Primitive};

use embedded_graphics::geometry::Size;

use crossbeam::channel;

/// Display that keeps every frame it is asked to paint and forwards a copy
/// on a channel, so another thread can wait for paints.
pub struct RecordingDisplay {
    size: Size,
    frames: Vec<Vec<Primitive>>,
    released: bool,
    painted: channel::Sender<Vec<Primitive>>,
}

impl RecordingDisplay {
    pub fn new(size: Size) -> (RecordingDisplay, channel::Receiver<Vec<Primitive>>) {
        let (painted, rx) = channel::unbounded();
        (
            RecordingDisplay {
                size,
                frames: Vec::new(),
                released: false,
                painted,
            },
            rx,
        )
    }

    pub fn frames(&self) -> &[Vec<Primitive>] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&Vec<Primitive>> {
        self.frames.last()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl DisplaySink for RecordingDisplay {
    fn size(&self) -> Size {
        self.size
    }

    fn paint(&mut self, primitives: &[Primitive]) -> Result<(), DisplayError> {
        if self.released {
            return Err(DisplayError::Io("display already released".to_string()));
        }
        self.frames.push(primitives.to_vec());
        let _ = self.painted.send(primitives.to_vec());
        Ok(())
    }

    fn release(&mut self) -> Result<(), DisplayError> {
        self.released = true;
        Ok(())
    }
}
