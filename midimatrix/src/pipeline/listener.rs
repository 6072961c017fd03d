//! Topology listener
//!
//! Parks in `wait_event` and turns every port or subscription change into
//! a rebuilt matrix and a new frame. Runs until the source closes, the
//! pipeline shuts down, or the source fails; a failure is handed to the
//! paint owner, which ends the run with it.

use super::{Event, Shared};
use crate::topology::{PortTopologySource, TopologyError};

use std::io;
use std::sync::Arc;
use std::thread;

pub(super) fn spawn<S>(shared: Arc<Shared<S>>) -> io::Result<()>
where
    S: PortTopologySource + ?Sized + 'static,
{
    thread::Builder::new()
        .name("topology".to_string())
        .spawn(move || listen(&shared))?;
    Ok(())
}

fn listen<S: PortTopologySource + ?Sized>(shared: &Shared<S>) {
    loop {
        let event = match shared.source.wait_event() {
            Ok(event) => event,
            Err(TopologyError::Closed) => {
                shared.status.send(Event::SourceClosed);
                return;
            }
            Err(err) => {
                shared.fail(err.into());
                return;
            }
        };
        if shared.is_shutting_down() {
            return;
        }
        if !event.changes_topology() {
            shared.status.send(Event::EventIgnored);
            continue;
        }
        if let Err(err) = shared.refresh() {
            shared.fail(err.into());
            return;
        }
    }
}
