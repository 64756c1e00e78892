use log::{debug, info, trace, warn};

use crate::{
    config::{Config, Role},
    event::{EventKind, Listeners},
    frame::{CanFrame, MessageKind, NODE_ID_MASK, PDO_ID_RANGE},
    nmt::{encode_heartbeat, NmtCommand, NmtFrame, OperatingState},
    sdo::SdoFrame,
    transport::{Clock, Filter, Transport},
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_NODE_ID,
};

/// Counters for everything the node drops instead of reporting. Protocol
/// input errors never surface as `Err`, these are the only trace they leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    pub frames_received: u32,
    /// Inbound frames that were not for us, malformed, or arrived before `begin`
    pub frames_dropped: u32,
    /// Outbound requests rejected by validation (bad PDO, NMT from a slave)
    pub sends_rejected: u32,
    /// Frames the transport refused to take
    pub transport_errors: u32,
    pub heartbeats_sent: u32,
}

/// A CANopen master or slave bound to one physical CAN controller.
///
/// Build one per controller and hand it to whatever composes the system. The
/// receive interrupt of the controller calls [`Node::receive`] for each
/// accepted frame; the main loop calls [`Node::tick`] more often than the
/// heartbeat interval. When both contexts share the node, wrap it in a
/// critical-section mutex: the node itself does no locking and no queueing,
/// and listeners run inside `receive`.
pub struct Node<T, C> {
    transport: T,
    clock: C,
    role: Role,
    node_id: u8,
    state: OperatingState,
    started: bool,
    heartbeat_interval_ms: u32,
    last_heartbeat_ms: u64,
    state_listeners: Listeners<OperatingState>,
    pdo_listeners: Listeners<CanFrame>,
    sdo_request_listeners: Listeners<SdoFrame>,
    sdo_reply_listeners: Listeners<SdoFrame>,
    diagnostics: Diagnostics,
}

impl<T: Transport, C: Clock> Node<T, C> {
    pub fn new(transport: T, clock: C) -> Self {
        Self {
            transport,
            clock,
            role: Role::default(),
            node_id: DEFAULT_NODE_ID,
            state: OperatingState::BootUp,
            started: false,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            last_heartbeat_ms: 0,
            state_listeners: Listeners::new(),
            pdo_listeners: Listeners::new(),
            sdo_request_listeners: Listeners::new(),
            sdo_reply_listeners: Listeners::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Picks master or slave behaviour. Takes effect on the next `begin`.
    pub fn configure(&mut self, role: Role) {
        self.role = role;
    }

    /// Starts the transport and enters the initial state of the configured
    /// role. Masters go straight to operational and listen to everything.
    /// Slaves filter for their own node ID plus broadcast NMT, enter boot-up
    /// and announce themselves with a boot-up heartbeat.
    ///
    /// Calling it again re-initialises the node; listeners and diagnostics
    /// are kept.
    pub fn begin(&mut self, bitrate: impl Into<u32>, node_id: u8) {
        let bitrate = bitrate.into();

        self.node_id = node_id & NODE_ID_MASK as u8;
        self.started = true;
        self.last_heartbeat_ms = self.clock.now_millis();

        if let Err(err) = self.transport.begin(bitrate) {
            self.transport_failed("begin", &err);
        }

        match self.role {
            Role::Master => {
                self.state = OperatingState::Operational;
                self.watch_for(Filter::AcceptAll);
            }
            Role::Slave => {
                self.state = OperatingState::BootUp;

                // Low 7 bits carry the node ID, the function code above them is free
                self.watch_for(Filter::Match {
                    id: self.node_id as u16,
                    mask: NODE_ID_MASK,
                });
                self.watch_for(Filter::Match {
                    id: 0,
                    mask: NODE_ID_MASK,
                });
            }
        }

        info!(
            "[node {:#04x}] Started as {:?} at {} bit/s in {:?}",
            self.node_id, self.role, bitrate, self.state
        );

        if self.role == Role::Slave {
            self.send_heartbeat();
        }
    }

    /// Applies a whole [`Config`] and calls [`Node::begin`]
    pub fn begin_with(&mut self, config: &Config) {
        self.configure(config.role);
        self.set_heartbeat_interval(config.heartbeat_interval_ms);
        self.begin(config.bit_rate, config.node_id.as_raw());
    }

    /// Periodic housekeeping: sends the heartbeat when it is due and ends the
    /// boot-up phase. Does nothing before `begin`.
    pub fn tick(&mut self) {
        if !self.started {
            return;
        }

        let elapsed = self.clock.now_millis().wrapping_sub(self.last_heartbeat_ms);

        if elapsed >= self.heartbeat_interval_ms as u64 {
            self.send_heartbeat();
        }

        if self.state == OperatingState::BootUp {
            self.state = OperatingState::PreOperational;
            info!("[node {:#04x}] Boot-up complete, now {:?}", self.node_id, self.state);
        }
    }

    /// Sets the heartbeat period. Zero is raised to 1 ms so a fast polling
    /// loop cannot flood the bus.
    pub fn set_heartbeat_interval(&mut self, interval_ms: u32) {
        self.heartbeat_interval_ms = interval_ms.max(1);
    }

    pub fn send_heartbeat(&mut self) {
        let frame = encode_heartbeat(self.node_id, self.state);

        trace!("[node {:#04x}] Heartbeat {:?}", self.node_id, self.state);

        self.emit(&frame);
        self.last_heartbeat_ms = self.clock.now_millis();
        self.diagnostics.heartbeats_sent = self.diagnostics.heartbeats_sent.wrapping_add(1);
    }

    /* NMT */

    /// Sends an NMT command to `target` (0 addresses every node). Only a
    /// master may do this, on a slave the call is dropped.
    pub fn send_nmt(&mut self, command: NmtCommand, target: u8) {
        if self.role != Role::Master {
            debug!(
                "[node {:#04x}] Dropped NMT {:?}: only a master sends NMT commands",
                self.node_id, command
            );
            self.reject_send();
            return;
        }

        let frame = NmtFrame::new(command, target);

        debug!(
            "[node {:#04x}] NMT {:?} to {:#04x}",
            self.node_id, frame.command, frame.target
        );

        self.emit(&frame.encode());
    }

    pub fn send_node_start(&mut self, target: u8) {
        self.send_nmt(NmtCommand::Start, target);
    }

    pub fn send_node_preop(&mut self, target: u8) {
        self.send_nmt(NmtCommand::EnterPreOperational, target);
    }

    pub fn send_node_reset(&mut self, target: u8) {
        self.send_nmt(NmtCommand::ResetNode, target);
    }

    pub fn send_node_stop(&mut self, target: u8) {
        self.send_nmt(NmtCommand::Stop, target);
    }

    /* PDO */

    /// Sends a process data object. The ID must lie in 0x180..=0x57F and the
    /// payload must fit in one frame, otherwise the call is dropped.
    pub fn send_pdo(&mut self, id: u16, data: &[u8]) {
        if !PDO_ID_RANGE.contains(&id) {
            debug!("[node {:#04x}] Dropped PDO: ID {:#05x} out of range", self.node_id, id);
            self.reject_send();
            return;
        }

        match CanFrame::from_raw(id, data) {
            Some(frame) => self.emit(&frame),
            None => {
                debug!(
                    "[node {:#04x}] Dropped PDO {:#05x}: {} bytes do not fit a frame",
                    self.node_id,
                    id,
                    data.len()
                );
                self.reject_send();
            }
        }
    }

    /* SDO */

    /// Sends an expedited SDO request to the server `sdo.node_id()`. Payloads
    /// over 4 bytes cannot be built, see [`SdoFrame::new`].
    pub fn send_sdo_request(&mut self, sdo: &SdoFrame) {
        self.emit(&sdo.encode_request());
    }

    /// Sends an expedited SDO response on behalf of server `sdo.node_id()`
    pub fn send_sdo_response(&mut self, sdo: &SdoFrame) {
        self.emit(&sdo.encode_response());
    }

    /* Receiving */

    /// Classifies one inbound frame, updates the state and notifies the
    /// matching listeners. Runs entirely in the caller's context.
    pub fn receive(&mut self, frame: &CanFrame) {
        self.diagnostics.frames_received = self.diagnostics.frames_received.wrapping_add(1);

        if !self.started {
            self.drop_frame(frame, "node not started");
            return;
        }

        match MessageKind::classify(frame.raw_id(), self.node_id) {
            MessageKind::Nmt => self.receive_nmt(frame),
            MessageKind::Pdo => {
                let count = self.pdo_listeners.dispatch(frame);
                self.trace_dispatch(EventKind::Pdo, count);
            }
            MessageKind::SdoRequest => self.receive_sdo(frame, EventKind::SdoRequest),
            MessageKind::SdoResponse => self.receive_sdo(frame, EventKind::SdoResponse),
            MessageKind::Heartbeat | MessageKind::Other => self.drop_frame(frame, "not handled"),
        }
    }

    fn receive_nmt(&mut self, frame: &CanFrame) {
        if self.role == Role::Master {
            self.drop_frame(frame, "masters do not obey NMT");
            return;
        }

        let nmt = match NmtFrame::decode(frame) {
            Ok(nmt) => nmt,
            Err(err) => {
                debug!("[node {:#04x}] Dropped NMT frame: {}", self.node_id, err);
                self.count_dropped();
                return;
            }
        };

        if !nmt.addresses(self.node_id) {
            self.drop_frame(frame, "NMT for another node");
            return;
        }

        let previous = self.state;
        self.state = nmt.command.target_state();

        info!(
            "[node {:#04x}] NMT {:?}: {:?} -> {:?}",
            self.node_id, nmt.command, previous, self.state
        );

        let count = self.state_listeners.dispatch(&self.state);
        self.trace_dispatch(EventKind::StateChange, count);
    }

    fn receive_sdo(&mut self, frame: &CanFrame, kind: EventKind) {
        let sdo = match SdoFrame::decode(frame, self.node_id) {
            Ok(sdo) => sdo,
            Err(err) => {
                debug!("[node {:#04x}] Dropped SDO frame: {}", self.node_id, err);
                self.count_dropped();
                return;
            }
        };

        let count = match kind {
            EventKind::SdoRequest => self.sdo_request_listeners.dispatch(&sdo),
            _ => self.sdo_reply_listeners.dispatch(&sdo),
        };

        self.trace_dispatch(kind, count);
    }

    /* Listener registration */

    pub fn set_state_change_callback(
        &mut self,
        listener: impl FnMut(&OperatingState) + Send + 'static,
    ) {
        self.state_listeners.register(listener);
    }

    pub fn set_pdo_callback(&mut self, listener: impl FnMut(&CanFrame) + Send + 'static) {
        self.pdo_listeners.register(listener);
    }

    pub fn set_sdo_request_callback(&mut self, listener: impl FnMut(&SdoFrame) + Send + 'static) {
        self.sdo_request_listeners.register(listener);
    }

    pub fn set_sdo_reply_callback(&mut self, listener: impl FnMut(&SdoFrame) + Send + 'static) {
        self.sdo_reply_listeners.register(listener);
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::StateChange => self.state_listeners.len(),
            EventKind::Pdo => self.pdo_listeners.len(),
            EventKind::SdoRequest => self.sdo_request_listeners.len(),
            EventKind::SdoResponse => self.sdo_reply_listeners.len(),
        }
    }

    /* Accessors */

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn state(&self) -> OperatingState {
        self.state
    }

    pub fn heartbeat_interval(&self) -> u32 {
        self.heartbeat_interval_ms
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /* Internals */

    fn emit(&mut self, frame: &CanFrame) {
        if let Err(err) = self.transport.send_frame(frame) {
            self.transport_failed("send", &err);
        }
    }

    fn watch_for(&mut self, filter: Filter) {
        if let Err(err) = self.transport.watch_for(filter) {
            self.transport_failed("watch_for", &err);
        }
    }

    fn transport_failed(&mut self, operation: &str, err: &T::Error) {
        warn!(
            "[node {:#04x}] Transport {} failed: {:?}",
            self.node_id, operation, err
        );
        self.diagnostics.transport_errors = self.diagnostics.transport_errors.wrapping_add(1);
    }

    fn drop_frame(&mut self, frame: &CanFrame, reason: &str) {
        trace!(
            "[node {:#04x}] Ignored frame {:#05x}: {}",
            self.node_id,
            frame.raw_id(),
            reason
        );
        self.count_dropped();
    }

    fn count_dropped(&mut self) {
        self.diagnostics.frames_dropped = self.diagnostics.frames_dropped.wrapping_add(1);
    }

    fn reject_send(&mut self) {
        self.diagnostics.sends_rejected = self.diagnostics.sends_rejected.wrapping_add(1);
    }

    fn trace_dispatch(&self, kind: EventKind, count: usize) {
        trace!(
            "[node {:#04x}] {:?} event delivered to {} listener(s)",
            self.node_id,
            kind,
            count
        );
    }
}
