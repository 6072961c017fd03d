//! ALSA sequencer topology source.
//!
//! Two sequencer handles are opened under the same client name: `control`
//! for enumeration and subscription requests, and `listener`, whose only
//! port is subscribed to `System:Announce` and which parks in a blocking
//! read for the next announcement. Keeping them apart lets the input path
//! issue requests while the listener thread is blocked.

use super::{
    port_label, Capability, Port, PortId, PortTopologySource, TopologyError, TopologyEvent,
};

use std::ffi::CString;
use std::sync::Mutex;

use ::alsa::seq::{
    Addr, ClientIter, Connect, EventType, PortCap, PortIter, PortSubscribe, PortSubscribeIter,
    PortType, QuerySubsType, Seq,
};
use ::alsa::Direction;

/// `SND_SEQ_CLIENT_SYSTEM`
const SYSTEM_CLIENT: i32 = 0;
/// `SND_SEQ_PORT_SYSTEM_ANNOUNCE`
const ANNOUNCE_PORT: i32 = 1;
/// The kernel loopback client; it is always present and never a device.
const THROUGH_CLIENT_NAME: &str = "Midi Through";

pub struct AlsaTopology {
    control: Mutex<Seq>,
    listener: Mutex<Seq>,
    own_clients: [i32; 2],
}

impl AlsaTopology {
    /// Opens the sequencer and subscribes to system announcements.
    pub fn open(client_name: &str) -> Result<AlsaTopology, TopologyError> {
        let name = CString::new(client_name)
            .map_err(|_| TopologyError::Unavailable(format!("bad client name {:?}", client_name)))?;

        let control = Seq::open(None, None, false)
            .map_err(|e| TopologyError::Unavailable(format!("opening sequencer: {}", e)))?;
        control.set_client_name(&name)?;

        let listener = Seq::open(None, Some(Direction::Capture), false)
            .map_err(|e| TopologyError::Unavailable(format!("opening sequencer: {}", e)))?;
        listener.set_client_name(&name)?;
        let announce_name = CString::new(format!("{} announce", client_name))
            .map_err(|_| TopologyError::Unavailable(format!("bad client name {:?}", client_name)))?;
        let port = listener.create_simple_port(
            &announce_name,
            PortCap::WRITE | PortCap::NO_EXPORT,
            PortType::MIDI_GENERIC | PortType::APPLICATION,
        )?;

        let mut subs = PortSubscribe::empty()?;
        subs.set_sender(Addr {
            client: SYSTEM_CLIENT,
            port: ANNOUNCE_PORT,
        });
        subs.set_dest(Addr {
            client: listener.client_id()?,
            port,
        });
        listener.subscribe_port(&subs)?;

        let own_clients = [control.client_id()?, listener.client_id()?];
        Ok(AlsaTopology {
            control: Mutex::new(control),
            listener: Mutex::new(listener),
            own_clients,
        })
    }

    fn capability(caps: PortCap) -> Capability {
        Capability {
            source: caps.contains(PortCap::READ | PortCap::SUBS_READ),
            sink: caps.contains(PortCap::WRITE | PortCap::SUBS_WRITE),
        }
    }

    fn require(seq: &Seq, id: PortId) -> Result<(), TopologyError> {
        seq.get_any_port_info(Self::addr(id))
            .map(|_| ())
            .map_err(|_| TopologyError::UnknownPort(id))
    }

    fn addr(id: PortId) -> Addr {
        Addr {
            client: id.client,
            port: id.port,
        }
    }

    fn id(addr: Addr) -> PortId {
        PortId::new(addr.client, addr.port)
    }
}

impl PortTopologySource for AlsaTopology {
    fn ports(&self) -> Result<Vec<Port>, TopologyError> {
        let seq = self.control.lock().unwrap();
        let mut ports = Vec::new();
        for client in ClientIter::new(&seq) {
            let cid = client.get_client();
            if cid == SYSTEM_CLIENT || self.own_clients.contains(&cid) {
                continue;
            }
            let client_name = client.get_name().unwrap_or("?").to_string();
            if client_name == THROUGH_CLIENT_NAME {
                continue;
            }
            let mut kept = Vec::new();
            for info in PortIter::new(&seq, cid) {
                let caps = info.get_capability();
                if caps.contains(PortCap::NO_EXPORT) {
                    continue;
                }
                let capability = Self::capability(caps);
                if !capability.source && !capability.sink {
                    continue;
                }
                let name = info.get_name().unwrap_or("").to_string();
                kept.push((info.get_port(), name, capability));
            }
            let shared = kept.len() > 1;
            for (port, name, capability) in kept {
                ports.push(Port::new(
                    PortId::new(cid, port),
                    &port_label(&client_name, &name, port, shared),
                    capability,
                ));
            }
        }
        Ok(ports)
    }

    // Subscriptions are read from the sender's side: READ subscribers of
    // an output port are the ports it is feeding.
    fn subscribers(&self, sender: PortId) -> Result<Vec<PortId>, TopologyError> {
        let seq = self.control.lock().unwrap();
        Self::require(&seq, sender)?;
        Ok(
            PortSubscribeIter::new(&seq, Self::addr(sender), QuerySubsType::READ)
                .map(|subs| Self::id(subs.get_dest()))
                .collect(),
        )
    }

    fn subscribe(&self, sender: PortId, dest: PortId) -> Result<(), TopologyError> {
        let seq = self.control.lock().unwrap();
        Self::require(&seq, sender)?;
        Self::require(&seq, dest)?;
        let mut subs = PortSubscribe::empty()?;
        subs.set_sender(Self::addr(sender));
        subs.set_dest(Self::addr(dest));
        seq.subscribe_port(&subs)?;
        Ok(())
    }

    fn unsubscribe(&self, sender: PortId, dest: PortId) -> Result<(), TopologyError> {
        let seq = self.control.lock().unwrap();
        Self::require(&seq, sender)?;
        Self::require(&seq, dest)?;
        seq.unsubscribe_port(Self::addr(sender), Self::addr(dest))?;
        Ok(())
    }

    fn wait_event(&self) -> Result<TopologyEvent, TopologyError> {
        let seq = self.listener.lock().unwrap();
        let mut input = seq.input();
        let ev = input.event_input()?;
        let event = match ev.get_type() {
            EventType::PortStart => ev
                .get_data::<Addr>()
                .map_or(TopologyEvent::Other, |a| {
                    TopologyEvent::PortAppeared(Self::id(a))
                }),
            EventType::PortExit => ev
                .get_data::<Addr>()
                .map_or(TopologyEvent::Other, |a| {
                    TopologyEvent::PortDisappeared(Self::id(a))
                }),
            EventType::PortSubscribed => ev
                .get_data::<Connect>()
                .map_or(TopologyEvent::Other, |c| TopologyEvent::SubscriptionAdded {
                    sender: Self::id(c.sender),
                    dest: Self::id(c.dest),
                }),
            EventType::PortUnsubscribed => ev
                .get_data::<Connect>()
                .map_or(TopologyEvent::Other, |c| {
                    TopologyEvent::SubscriptionRemoved {
                        sender: Self::id(c.sender),
                        dest: Self::id(c.dest),
                    }
                }),
            _ => TopologyEvent::Other,
        };
        Ok(event)
    }
}
