//! Pipeline
//!
//! Keeps the display in step with the port graph and the buttons. Two
//! kinds of producers feed it:
//! - the topology listener, a dedicated thread parked in
//!   `PortTopologySource::wait_event`, which rebuilds the matrix on every
//!   port or subscription change;
//! - input threads, one per `InputSource`, which drive the
//!   `NavigationController`.
//!
//! Each producer takes a snapshot of matrix and cursor under the scene
//! lock, renders it outside the lock, and sends the frame to the paint
//! owner (the thread calling `Pipeline::run`), the only code that touches
//! the display. Frames carry the generation of their snapshot; the paint
//! owner only ever paints forward.
//!
//! Note: the library does not log. Pass a status queue to `Pipeline::new`
//! to observe what it is doing.

mod listener;

use crate::grid::{
    ConnectionMatrix, Cursor, InputOutcome, NavigationController, Rejection, SelectOutcome, Step,
};
use crate::input::{ButtonEvent, InputError, InputSource, Press};
use crate::topology::{PortId, PortTopologySource, TopologyError, TopologySnapshot};
use crate::view::{render, DisplayError, DisplaySink, Layout, Primitive};

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam::channel;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// What the pipeline is busy with. Informational only: the topology and
/// input paths run concurrently and both update it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum State {
    Idle,
    Refreshing,
    Navigating,
    Toggling,
    ShuttingDown,
}

/// Status event sent back to an optional user specified channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Matrix rebuilt after a topology change.
    Refreshed { ports: usize },
    /// Event from the source that cannot change the matrix.
    EventIgnored,
    CursorMoved(Cursor),
    /// Release that ended a hold gesture.
    GestureSwallowed,
    SelectRejected(Rejection),
    SubscribeRequested { sender: PortId, dest: PortId },
    UnsubscribeRequested { sender: PortId, dest: PortId },
    Painted { generation: u64 },
    /// The topology source will deliver no more events.
    SourceClosed,
    FatalError(String),
    ShuttingDown,
}

#[derive(Debug)]
pub enum PipelineError {
    Topology(TopologyError),
    Display(DisplayError),
    Input(InputError),
    Spawn(io::Error),
}

impl From<TopologyError> for PipelineError {
    fn from(e: TopologyError) -> Self {
        PipelineError::Topology(e)
    }
}

impl From<DisplayError> for PipelineError {
    fn from(e: DisplayError) -> Self {
        PipelineError::Display(e)
    }
}

impl From<InputError> for PipelineError {
    fn from(e: InputError) -> Self {
        PipelineError::Input(e)
    }
}

impl From<io::Error> for PipelineError {
    fn from(e: io::Error) -> Self {
        PipelineError::Spawn(e)
    }
}

struct StatusQueue {
    dest: Option<channel::Sender<Event>>,
}

impl StatusQueue {
    fn send(&self, event: Event) {
        if let Some(dest) = &self.dest {
            // a slow observer loses status, never stalls the pipeline
            let _ = dest.try_send(event);
        }
    }
}

struct Frame {
    generation: u64,
    primitives: Vec<Primitive>,
}

enum PaintRequest {
    Frame(Frame),
    Failed(PipelineError),
}

/// Matrix and cursor as of one generation.
struct Snapshot {
    generation: u64,
    matrix: Arc<ConnectionMatrix>,
    cursor: Cursor,
}

struct Scene<S: PortTopologySource + ?Sized> {
    matrix: Arc<ConnectionMatrix>,
    nav: NavigationController<S>,
    generation: u64,
}

impl<S: PortTopologySource + ?Sized> Scene<S> {
    fn snapshot(&mut self) -> Snapshot {
        self.generation += 1;
        Snapshot {
            generation: self.generation,
            matrix: self.matrix.clone(),
            cursor: self.nav.cursor().clamped(self.matrix.len()),
        }
    }
}

struct Shared<S: PortTopologySource + ?Sized> {
    scene: Mutex<Scene<S>>,
    source: Arc<S>,
    layout: Layout,
    frames: channel::Sender<PaintRequest>,
    status: StatusQueue,
    state: AtomicU8,
    shutting_down: AtomicBool,
}

impl<S: PortTopologySource + ?Sized> Shared<S> {
    fn set_state(&self, state: State) {
        if !self.is_shutting_down() {
            self.state.store(state.into(), Ordering::SeqCst);
        }
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn frame(&self, snapshot: Snapshot) -> Frame {
        Frame {
            generation: snapshot.generation,
            primitives: render(&snapshot.matrix, snapshot.cursor, &self.layout),
        }
    }

    fn publish(&self, snapshot: Snapshot) {
        if self.is_shutting_down() {
            return;
        }
        let _ = self.frames.send(PaintRequest::Frame(self.frame(snapshot)));
    }

    fn fail(&self, err: PipelineError) {
        self.status.send(Event::FatalError(format!("{:?}", err)));
        let _ = self.frames.send(PaintRequest::Failed(err));
    }

    /// Captures the topology, builds a new matrix and swaps it in.
    fn rebuild(&self) -> Result<Snapshot, TopologyError> {
        self.set_state(State::Refreshing);
        let matrix = ConnectionMatrix::build(&TopologySnapshot::capture(&*self.source)?);
        let ports = matrix.len();
        let snapshot = {
            let mut scene = self.scene.lock().unwrap();
            scene.matrix = Arc::new(matrix);
            scene.snapshot()
        };
        self.status.send(Event::Refreshed { ports });
        self.set_state(State::Idle);
        Ok(snapshot)
    }

    fn refresh(&self) -> Result<(), TopologyError> {
        let snapshot = self.rebuild()?;
        self.publish(snapshot);
        Ok(())
    }

    fn dispatch(&self, event: ButtonEvent) -> Result<InputOutcome, TopologyError> {
        if self.is_shutting_down() {
            return Ok(InputOutcome::Unchanged);
        }
        self.set_state(match event.press {
            Press::Released => State::Navigating,
            Press::Held => State::Toggling,
        });
        let step = {
            let mut guard = self.scene.lock().unwrap();
            let scene = &mut *guard;
            scene.nav.step(event, &scene.matrix)
        };
        // request outside the scene lock
        let outcome = match step {
            Step::Done(outcome) => outcome,
            Step::Request(toggle) => InputOutcome::Selected(toggle.apply(&*self.source)?),
        };
        let snapshot = self.scene.lock().unwrap().snapshot();
        let status = match outcome {
            InputOutcome::Moved(cursor) => Some(Event::CursorMoved(cursor)),
            InputOutcome::Swallowed => Some(Event::GestureSwallowed),
            InputOutcome::Unchanged => None,
            InputOutcome::Selected(SelectOutcome::Rejected(why)) => {
                Some(Event::SelectRejected(why))
            }
            InputOutcome::Selected(SelectOutcome::Subscribed { sender, dest }) => {
                Some(Event::SubscribeRequested { sender, dest })
            }
            InputOutcome::Selected(SelectOutcome::Unsubscribed { sender, dest }) => {
                Some(Event::UnsubscribeRequested { sender, dest })
            }
        };
        if let Some(event) = status {
            self.status.send(event);
        }
        self.publish(snapshot);
        self.set_state(State::Idle);
        Ok(outcome)
    }
}

/// Feeds button events into a running pipeline from any thread.
pub struct InputHandle<S: PortTopologySource + ?Sized> {
    shared: Arc<Shared<S>>,
}

impl<S: PortTopologySource + ?Sized> Clone for InputHandle<S> {
    fn clone(&self) -> Self {
        InputHandle {
            shared: self.shared.clone(),
        }
    }
}

impl<S: PortTopologySource + ?Sized> InputHandle<S> {
    /// Applies the event and queues a repaint. A sequencer failure while
    /// toggling is returned and is fatal for the pipeline.
    pub fn dispatch(&self, event: ButtonEvent) -> Result<InputOutcome, PipelineError> {
        Ok(self.shared.dispatch(event)?)
    }

    /// Stops the pipeline with `err`; `Pipeline::run` returns it.
    pub fn fail(&self, err: PipelineError) {
        self.shared.fail(err);
    }
}

pub struct Pipeline<S: PortTopologySource + ?Sized + 'static> {
    shared: Arc<Shared<S>>,
    paint_queue: channel::Receiver<PaintRequest>,
    listening: AtomicBool,
}

impl<S: PortTopologySource + ?Sized + 'static> Pipeline<S> {
    /// Nothing runs until `run`; input attached before then sees an empty
    /// matrix.
    pub fn new(
        source: Arc<S>,
        layout: Layout,
        status_queue: Option<channel::Sender<Event>>,
    ) -> Pipeline<S> {
        let (frames, paint_queue) = channel::unbounded();
        let shared = Arc::new(Shared {
            scene: Mutex::new(Scene {
                matrix: Arc::new(ConnectionMatrix::empty()),
                nav: NavigationController::new(source.clone()),
                generation: 0,
            }),
            source,
            layout,
            frames,
            status: StatusQueue { dest: status_queue },
            state: AtomicU8::new(State::Idle.into()),
            shutting_down: AtomicBool::new(false),
        });
        Pipeline {
            shared,
            paint_queue,
            listening: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> State {
        State::try_from(self.shared.state.load(Ordering::SeqCst)).unwrap_or(State::Idle)
    }

    pub fn input(&self) -> InputHandle<S> {
        InputHandle {
            shared: self.shared.clone(),
        }
    }

    /// Runs `source` on its own thread until it is exhausted or fails.
    pub fn attach_input<I: InputSource + 'static>(&self, mut source: I) -> io::Result<()> {
        let handle = self.input();
        thread::Builder::new()
            .name("input".to_string())
            .spawn(move || loop {
                match source.next_event() {
                    Ok(Some(event)) => {
                        if let Err(err) = handle.dispatch(event) {
                            handle.fail(err);
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(err) => {
                        handle.fail(err.into());
                        return;
                    }
                }
            })?;
        Ok(())
    }

    /// Paints the current topology, starts the topology listener and then
    /// paints frames until `shutdown` fires or a collaborator fails. The
    /// display is released before returning, in both cases.
    pub fn run<D: DisplaySink>(
        &self,
        display: &mut D,
        shutdown: &channel::Receiver<()>,
    ) -> Result<(), PipelineError> {
        let result = self.paint_loop(display, shutdown);
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        self.shared
            .state
            .store(State::ShuttingDown.into(), Ordering::SeqCst);
        self.shared.status.send(Event::ShuttingDown);
        let released = display.release();
        result?;
        Ok(released?)
    }

    fn paint_loop<D: DisplaySink>(
        &self,
        display: &mut D,
        shutdown: &channel::Receiver<()>,
    ) -> Result<(), PipelineError> {
        let first = self.shared.rebuild()?;
        let mut painted = first.generation;
        display.paint(&self.shared.frame(first).primitives)?;
        self.shared.status.send(Event::Painted {
            generation: painted,
        });

        if !self.listening.swap(true, Ordering::SeqCst) {
            listener::spawn(self.shared.clone())?;
        }

        loop {
            crossbeam::select! {
                recv(self.paint_queue) -> req => {
                    let Ok(req) = req else {
                        // unreachable while `shared` holds the sender
                        return Ok(());
                    };
                    let mut newest = None;
                    for req in std::iter::once(req).chain(self.paint_queue.try_iter()) {
                        match req {
                            PaintRequest::Failed(err) => return Err(err),
                            PaintRequest::Frame(frame) => {
                                if newest.as_ref().map_or(true, |n: &Frame| frame.generation > n.generation) {
                                    newest = Some(frame);
                                }
                            }
                        }
                    }
                    if let Some(frame) = newest {
                        if frame.generation > painted {
                            display.paint(&frame.primitives)?;
                            painted = frame.generation;
                            self.shared.status.send(Event::Painted { generation: painted });
                        }
                    }
                }
                recv(shutdown) -> _ => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Button;
    use crate::topology::{Capability, MemoryTopology, Port, PortId, TopologyEvent};

    use std::time::Duration;

    use embedded_graphics::geometry::Size;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn pipeline(n: usize) -> (Arc<MemoryTopology>, Pipeline<MemoryTopology>) {
        let topo = Arc::new(MemoryTopology::new());
        for i in 0..n {
            topo.add_port(&format!("p{}", i), Capability::DUPLEX);
        }
        let p = Pipeline::new(topo.clone(), Layout::new(Size::new(128, 64)), None);
        (topo, p)
    }

    #[test]
    fn snapshot_clamps_stranded_cursor() {
        let (topo, p) = pipeline(4);
        p.shared.refresh().unwrap();
        {
            let mut scene = p.shared.scene.lock().unwrap();
            scene.nav.move_cursor(3, 0, 4);
        }
        let ids: Vec<_> = topo.ports().unwrap().iter().map(|p| p.id).collect();
        topo.remove_port(ids[3]).unwrap();
        let snap = p.shared.rebuild().unwrap();
        assert_eq!(snap.matrix.len(), 3);
        assert_eq!(snap.cursor, Cursor::new(2, 0));
    }

    #[test]
    fn generations_increase() {
        let (_topo, p) = pipeline(2);
        let a = p.shared.rebuild().unwrap();
        let b = p.shared.rebuild().unwrap();
        assert!(b.generation > a.generation);
    }

    #[test]
    fn paint_loop_drops_stale_frames() {
        let (_topo, p) = pipeline(2);
        let (shutdown_tx, shutdown) = channel::bounded(1);
        let (mut display, painted) = crate::view::RecordingDisplay::new(Size::new(128, 64));

        // older than the startup paint
        p.shared.frames.send(PaintRequest::Frame(Frame {
            generation: 0,
            primitives: vec![],
        })).unwrap();
        shutdown_tx.send(()).unwrap();
        p.run(&mut display, &shutdown).unwrap();

        assert!(display.frames().iter().all(|f| !f.is_empty()));
        assert!(display.is_released());
        assert_eq!(painted.try_iter().count(), display.frames().len());
        assert_eq!(p.state(), State::ShuttingDown);
    }

    #[test]
    fn hold_on_vanished_port_is_not_fatal() {
        let (topo, p) = pipeline(3);
        p.shared.refresh().unwrap();
        let input = p.input();
        let release = ButtonEvent::new(Button::Select, Press::Released);
        input.dispatch(release).unwrap();
        input.dispatch(release).unwrap();

        // port leaves before the listener gets to rebuild
        let ids: Vec<_> = topo.ports().unwrap().iter().map(|p| p.id).collect();
        topo.remove_port(ids[2]).unwrap();
        let outcome = input
            .dispatch(ButtonEvent::new(Button::Select, Press::Held))
            .unwrap();
        assert_eq!(
            outcome,
            InputOutcome::Selected(SelectOutcome::Rejected(Rejection::NoTarget))
        );
        assert_eq!(
            input.dispatch(release).unwrap(),
            InputOutcome::Swallowed
        );
    }

    /// Holds every subscribe until the test lets it through.
    struct Gated {
        inner: MemoryTopology,
        entered: channel::Sender<()>,
        release: channel::Receiver<()>,
    }

    impl PortTopologySource for Gated {
        fn ports(&self) -> Result<Vec<Port>, TopologyError> {
            self.inner.ports()
        }

        fn subscribers(&self, sender: PortId) -> Result<Vec<PortId>, TopologyError> {
            self.inner.subscribers(sender)
        }

        fn subscribe(&self, sender: PortId, dest: PortId) -> Result<(), TopologyError> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            self.inner.subscribe(sender, dest)
        }

        fn unsubscribe(&self, sender: PortId, dest: PortId) -> Result<(), TopologyError> {
            self.inner.unsubscribe(sender, dest)
        }

        fn wait_event(&self) -> Result<TopologyEvent, TopologyError> {
            self.inner.wait_event()
        }
    }

    #[test]
    fn slow_subscribe_does_not_block_rebuild() {
        let (entered, entered_rx) = channel::unbounded();
        let (release_tx, release) = channel::unbounded();
        let topo = Arc::new(Gated {
            inner: MemoryTopology::new(),
            entered,
            release,
        });
        topo.inner.add_port("a", Capability::DUPLEX);
        topo.inner.add_port("b", Capability::DUPLEX);
        let p = Pipeline::new(topo.clone(), Layout::new(Size::new(128, 64)), None);
        p.shared.refresh().unwrap();

        let input = p.input();
        input
            .dispatch(ButtonEvent::new(Button::Select, Press::Released))
            .unwrap();
        let holder = input.clone();
        let held = std::thread::spawn(move || {
            holder.dispatch(ButtonEvent::new(Button::Select, Press::Held))
        });
        entered_rx.recv_timeout(TIMEOUT).unwrap();

        let shared = p.shared.clone();
        let (done_tx, done) = channel::bounded(1);
        std::thread::spawn(move || {
            let _ = done_tx.send(shared.rebuild().map(|s| s.matrix.len()).ok());
        });
        assert_eq!(done.recv_timeout(TIMEOUT).unwrap(), Some(2));

        release_tx.send(()).unwrap();
        assert!(matches!(
            held.join().unwrap(),
            Ok(InputOutcome::Selected(SelectOutcome::Subscribed { .. }))
        ));
    }
}
