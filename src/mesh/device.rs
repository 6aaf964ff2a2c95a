//! The per-device protocol engine.
//!
//! A [`NetworkDevice`] owns one node's view of the tree: its ID, parent,
//! children and routing tables, the discovery and benchmark state machines
//! and the fragment reassembly buffers. It is driven by calling
//! [`update`](NetworkDevice::update) repeatedly; each call advances the
//! timers and handles at most one received frame.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use bytes::Bytes;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use super::benchmark::{BenchmarkResult, ConnectionBenchmarkWrapper};
use super::config::DeviceConfig;
use super::discovery::{Discovery, FoundDevice};
use super::link::{Clock, LinkAdapter};
use super::routing::Routes;
use super::timer::Timer;
use crate::protocol::metrics::{FrameDirection, Metrics};
use crate::protocol::{
    AddRemoveToGroupMessage, CommandMessage, DISCOVERY_CHANNEL, DISCOVERY_PROBE, DataMessage,
    ErrorMessage, Frame, HUB_ID, Message, MessageBuilder, MetricsSnapshot, PingMessage,
    ReDisconnectMessage, RegistrationMessage, RegistrationType, Result, decode, encode,
};

/// A data or command message fully received by this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPayload {
    /// Device that sent the message.
    pub origin: u8,
    /// Command byte, for command messages.
    pub command: Option<u8>,
    /// Group the message was addressed to, for group messages.
    pub group: Option<u8>,
    /// Reassembled content, including trailing slot padding.
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy)]
struct PendingPing {
    target: u8,
    timer: Timer,
    response_time: Option<u32>,
}

/// Hub-side check whether the current holder of a requested ID is alive.
#[derive(Debug, Clone, Copy)]
struct RegistrationPing {
    new_device_id: u8,
    ping_id: u8,
    temp_id: u32,
    timer: Timer,
}

/// One node of the tree network.
pub struct NetworkDevice<L, C> {
    link: L,
    clock: C,
    config: DeviceConfig,
    id: u8,
    is_hub: bool,
    registered: bool,
    hierarchy_level: u8,
    temp_id: u32,
    pending_parent: Option<FoundDevice>,
    routes: Routes,
    groups: BTreeSet<u8>,
    next_message_id: u8,
    pings: HashMap<u8, PendingPing>,
    registration_pings: Vec<RegistrationPing>,
    builder: MessageBuilder,
    last_payload: Option<ReceivedPayload>,
    discovery: Option<Discovery>,
    benchmark: Option<ConnectionBenchmarkWrapper>,
    benchmark_results: Vec<BenchmarkResult>,
    metrics: Metrics,
}

impl<L, C> fmt::Debug for NetworkDevice<L, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkDevice")
            .field("id", &self.id)
            .field("is_hub", &self.is_hub)
            .field("registered", &self.registered)
            .field("hierarchy_level", &self.hierarchy_level)
            .field("routes", &self.routes)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

/// Random non-zero temporary ID.
fn fresh_temp_id() -> u32 {
    let bytes = Uuid::new_v4().into_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).max(1)
}

impl<L: LinkAdapter, C: Clock> NetworkDevice<L, C> {
    /// Create an ordinary device and start discovery.
    ///
    /// `id` 0 asks the hub for a new ID; any other value asks for that ID
    /// back.
    pub fn new(id: u8, link: L, clock: C) -> Self {
        Self::with_config(id, link, clock, DeviceConfig::default())
    }

    /// Like [`new`](Self::new) with explicit tunables.
    pub fn with_config(id: u8, link: L, clock: C, config: DeviceConfig) -> Self {
        let temp_id = fresh_temp_id();
        let discovery = Discovery::new(config.discovery_timeout_ms, temp_id);
        Self {
            discovery: Some(discovery),
            ..Self::blank(id, link, clock, config, temp_id)
        }
    }

    /// Create the hub: ID 0, root of the tree, registered from the start.
    pub fn hub(link: L, clock: C) -> Self {
        Self::hub_with_config(link, clock, DeviceConfig::default())
    }

    /// Like [`hub`](Self::hub) with explicit tunables.
    pub fn hub_with_config(link: L, clock: C, config: DeviceConfig) -> Self {
        Self {
            is_hub: true,
            registered: true,
            hierarchy_level: 0,
            ..Self::blank(HUB_ID, link, clock, config, fresh_temp_id())
        }
    }

    fn blank(id: u8, link: L, clock: C, config: DeviceConfig, temp_id: u32) -> Self {
        Self {
            link,
            clock,
            config,
            id,
            is_hub: false,
            registered: false,
            hierarchy_level: u8::MAX,
            temp_id,
            pending_parent: None,
            routes: Routes::new(),
            groups: BTreeSet::new(),
            next_message_id: 0,
            pings: HashMap::new(),
            registration_pings: Vec::new(),
            builder: MessageBuilder::new(),
            last_payload: None,
            discovery: None,
            benchmark: None,
            benchmark_results: Vec::new(),
            metrics: Metrics::default(),
        }
    }

    /// Device ID (0 until a non-hub device is accepted).
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// Whether this device is the tree root.
    pub const fn is_hub(&self) -> bool {
        self.is_hub
    }

    /// Whether the device currently belongs to the tree.
    pub const fn is_registered(&self) -> bool {
        self.registered
    }

    /// Depth in the tree, hub = 0.
    pub const fn hierarchy_level(&self) -> u8 {
        self.hierarchy_level
    }

    /// Temporary ID used by the current discovery and registration.
    pub const fn temp_id(&self) -> u32 {
        self.temp_id
    }

    /// Parent device, `None` for the hub and before registration.
    pub const fn parent(&self) -> Option<u8> {
        self.routes.parent()
    }

    /// Direct children.
    pub fn children(&self) -> Vec<u8> {
        self.routes.children().collect()
    }

    /// Next hop stored for `device`, if it is a known descendant.
    pub fn route_to(&self, device: u8) -> Option<u8> {
        self.routes.route(device)
    }

    /// Next hop stored for a device known only by its temporary ID.
    pub fn temp_route_to(&self, temp_id: u32) -> Option<u8> {
        self.routes.temp_route(temp_id)
    }

    /// Timeouts and benchmark settings in use.
    pub const fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Underlying link adapter.
    pub const fn link(&self) -> &L {
        &self.link
    }

    /// Mutable access to the link adapter.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Frame counters of this device.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.totals()
    }

    /// Whether discovery is running.
    pub const fn is_discovering(&self) -> bool {
        self.discovery.is_some()
    }

    /// Whether a connection benchmark is running.
    pub const fn is_benchmarking(&self) -> bool {
        self.benchmark.is_some()
    }

    /// Results of the last completed benchmark.
    pub fn benchmark_results(&self) -> &[BenchmarkResult] {
        &self.benchmark_results
    }

    /// Last message fully received by this device.
    pub const fn receive(&self) -> Option<&ReceivedPayload> {
        self.last_payload.as_ref()
    }

    /// Run discovery again.
    ///
    /// An unregistered device registers with the best responder afterwards;
    /// a registered one benchmarks the responders instead.
    pub fn start_discovery(&mut self) {
        if self.is_hub {
            debug!("hub does not discover");
            return;
        }
        self.temp_id = fresh_temp_id();
        self.discovery = Some(Discovery::new(self.config.discovery_timeout_ms, self.temp_id));
        debug!(temp_id = self.temp_id, "discovery started");
    }

    /// Advance timers and handle at most one received frame.
    ///
    /// Returns `true` when a data or command message addressed to this
    /// device (or one of its groups) was completed; read it with
    /// [`receive`](Self::receive).
    #[instrument(level = "trace", skip(self), fields(id = self.id))]
    pub fn update(&mut self) -> bool {
        let now = self.clock.now();
        self.advance_discovery(now);
        self.advance_benchmark(now);
        self.expire_registration_pings(now);
        self.expire_pings(now);

        if !self.link.frame_available() {
            return false;
        }
        let Some((frame, sender)) = self.link.read() else {
            return false;
        };
        let message = match decode(&frame) {
            Ok(message) => message,
            Err(err) => {
                debug!(sender, %err, "dropping undecodable frame");
                self.metrics.record_drop();
                return false;
            }
        };
        self.metrics
            .record_frame(FrameDirection::Received, message.message_type());
        trace!(
            sender,
            receiver = message.receiver(),
            msg_type = %message.message_type(),
            "frame read"
        );
        self.route_inbound(message, sender)
    }

    /// Send `data` to `receiver`.
    ///
    /// `Ok(false)` means no next hop was known or the link refused a frame.
    #[instrument(level = "trace", skip(self, data), fields(id = self.id))]
    pub fn send(&mut self, receiver: u8, data: impl Into<Bytes>) -> Result<bool> {
        let message_id = u16::from(self.next_message_id());
        let message = DataMessage::new(receiver, self.id, message_id, data);
        self.send_checked(&message.into())
    }

    /// Flood `data` to every member of `group`.
    #[instrument(level = "trace", skip(self, data), fields(id = self.id))]
    pub fn send_to_group(&mut self, group: u8, data: impl Into<Bytes>) -> Result<bool> {
        let message_id = u16::from(self.next_message_id());
        let message = DataMessage::to_group(group, self.id, message_id, data);
        self.send_checked(&message.into())
    }

    /// Send a command with optional argument bytes to `receiver`.
    pub fn send_command(
        &mut self,
        receiver: u8,
        command: u8,
        data: impl Into<Bytes>,
    ) -> Result<bool> {
        let message_id = u16::from(self.next_message_id());
        let message = CommandMessage::new(receiver, command, self.id, message_id, data);
        self.send_checked(&message.into())
    }

    /// Ping `target` and return the ping ID to poll with
    /// [`check_ping`](Self::check_ping).
    pub fn ping(&mut self, target: u8) -> u8 {
        let ping_id = self.next_message_id();
        let now = self.clock.now();
        self.pings.insert(
            ping_id,
            PendingPing {
                target,
                timer: Timer::started(self.config.ping_timeout_ms, now),
                response_time: None,
            },
        );
        let ping = PingMessage::request(target, ping_id, self.id, now);
        self.send_internal(&ping.into(), None);
        ping_id
    }

    /// Round-trip time of an answered ping, in milliseconds.
    ///
    /// A returned result is consumed; unanswered pings return `None` until
    /// they are answered or time out.
    pub fn check_ping(&mut self, ping_id: u8) -> Option<u32> {
        let response_time = self.pings.get(&ping_id)?.response_time?;
        self.pings.remove(&ping_id);
        Some(response_time)
    }

    /// Add this device to `group` locally.
    pub fn join_group(&mut self, group: u8) {
        self.groups.insert(group);
    }

    /// Remove this device from `group` locally.
    pub fn leave_group(&mut self, group: u8) {
        self.groups.remove(&group);
    }

    /// Group 0 contains every device.
    pub fn is_in_group(&self, group: u8) -> bool {
        group == 0 || self.groups.contains(&group)
    }

    /// Add `target` to or remove it from `group`.
    pub fn set_group_membership(&mut self, target: u8, group: u8, add: bool) -> bool {
        if target == self.id {
            self.apply_membership(group, add);
            return true;
        }
        let message = AddRemoveToGroupMessage::new(target, group, add);
        self.send_internal(&message.into(), None)
    }

    /// Report an error to the hub, quoting (up to 28 bytes of) `offending`.
    pub fn send_error(&mut self, code: u8, offending: &[u8]) -> bool {
        let message = ErrorMessage::new(code, offending);
        if self.is_hub {
            self.link.report_error(code, &message.erroneous_message);
            return true;
        }
        self.send_internal(&message.into(), None)
    }

    /// Tell the ancestors that this device is now reached through its
    /// current parent.
    pub fn announce_reconnect(&mut self) -> bool {
        let message = ReDisconnectMessage::new(self.id, false);
        self.send_internal(&message.into(), None)
    }

    fn next_message_id(&mut self) -> u8 {
        let id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);
        id
    }

    fn send_checked(&mut self, message: &Message) -> Result<bool> {
        let frames = encode(message)?;
        Ok(self.send_frames(message, &frames, None))
    }

    /// Route a message: unicast to its next hop, groups to every neighbour
    /// except `sender`.
    fn send_internal(&mut self, message: &Message, sender: Option<u8>) -> bool {
        match encode(message) {
            Ok(frames) => self.send_frames(message, &frames, sender),
            Err(err) => {
                warn!(%err, "message could not be encoded");
                false
            }
        }
    }

    fn send_frames(&mut self, message: &Message, frames: &[Frame], sender: Option<u8>) -> bool {
        if !message.is_group() {
            let receiver = message.receiver();
            let Some(next_hop) = self.routes.next_hop(receiver) else {
                debug!(receiver, "no route and no parent");
                return false;
            };
            return self.write_frames(frames, next_hop, message);
        }

        let mut delivered = true;
        for next_hop in self.routes.flood_targets(sender) {
            delivered &= self.write_frames(frames, next_hop, message);
        }
        delivered
    }

    /// Write a message to one neighbour without consulting the routes.
    fn write_message(&mut self, message: &Message, next_hop: u8) -> bool {
        match encode(message) {
            Ok(frames) => self.write_frames(&frames, next_hop, message),
            Err(err) => {
                warn!(%err, "message could not be encoded");
                false
            }
        }
    }

    fn write_frames(&mut self, frames: &[Frame], next_hop: u8, message: &Message) -> bool {
        let msg_type = message.message_type();
        for frame in frames {
            self.metrics.record_frame(FrameDirection::Sent, msg_type);
            if !self.link.write(frame, next_hop) {
                self.metrics.record_write_failure();
                warn!(next_hop, %msg_type, "link refused frame");
                return false;
            }
            trace!(next_hop, %msg_type, "frame written");
        }
        true
    }

    fn route_inbound(&mut self, message: Message, sender: u8) -> bool {
        if message.is_group() {
            if !self.routes.flood_targets(Some(sender)).is_empty() {
                self.metrics.record_forward();
                self.send_internal(&message, Some(sender));
            }
            if self.is_in_group(message.receiver()) {
                return self.dispatch(message, sender);
            }
            return false;
        }

        if !message.message_type().is_hop_processed() && message.receiver() != self.id {
            self.metrics.record_forward();
            if !self.send_internal(&message, Some(sender)) {
                self.metrics.record_drop();
            }
            return false;
        }
        self.dispatch(message, sender)
    }

    fn dispatch(&mut self, message: Message, sender: u8) -> bool {
        match message {
            Message::Partial(fragment) => match self.builder.submit(fragment) {
                Some(complete) => self.deliver(complete),
                None => false,
            },
            Message::Data(_) | Message::Command(_) => self.deliver(message),
            Message::Registration(registration) => {
                self.on_registration(registration, sender);
                false
            }
            Message::Ping(ping) => {
                self.on_ping(ping);
                false
            }
            Message::AddRemoveToGroup(change) => {
                self.apply_membership(change.group_id, change.is_add_to_group);
                false
            }
            Message::Error(report) => {
                self.on_error(report);
                false
            }
            Message::ReDisconnect(notice) => {
                self.on_re_disconnect(notice, sender);
                false
            }
        }
    }

    fn deliver(&mut self, message: Message) -> bool {
        let payload = match message {
            Message::Data(data) => ReceivedPayload {
                origin: data.origin,
                command: None,
                group: data.header.is_group().then_some(data.header.receiver),
                data: data.content,
            },
            Message::Command(command) => ReceivedPayload {
                origin: command.origin,
                command: Some(command.command),
                group: command.header.is_group().then_some(command.header.receiver),
                data: command.content,
            },
            other => {
                debug!(msg_type = %other.message_type(), "not a payload");
                return false;
            }
        };
        debug!(origin = payload.origin, len = payload.data.len(), "payload received");
        self.metrics.record_payload();
        self.last_payload = Some(payload);
        true
    }

    fn apply_membership(&mut self, group: u8, add: bool) {
        debug!(group, add, "group membership changed");
        if add {
            self.join_group(group);
        } else {
            self.leave_group(group);
        }
    }

    fn on_registration(&mut self, message: RegistrationMessage, sender: u8) {
        match message.registration_type {
            RegistrationType::Discover => self.on_discover(message, sender),
            RegistrationType::Register => self.on_register(message),
            RegistrationType::RouteCreation => self.on_route_creation(message, sender),
            RegistrationType::AcceptReject => self.on_accept_reject(message, sender),
        }
    }

    /// Probes are answered towards the prober's link address, which is
    /// [`DISCOVERY_CHANNEL`] for a device without an ID.
    fn on_discover(&mut self, mut message: RegistrationMessage, sender: u8) {
        if message.extra_field != DISCOVERY_PROBE {
            if message.temp_id != self.temp_id {
                trace!(temp_id = message.temp_id, "answer for another device");
                return;
            }
            if let Some(discovery) = self.discovery.as_mut() {
                discovery.on_answer(message.new_device_id, message.extra_field);
            }
            return;
        }

        if !self.registered || message.header.receiver != self.id {
            return;
        }
        if !self.routes.has_free_child_slot() {
            debug!("child table full, probe not answered");
            return;
        }
        message.header.receiver = sender;
        message.new_device_id = self.id;
        message.extra_field = self.hierarchy_level.min(DISCOVERY_PROBE - 1);
        self.write_message(&message.into(), sender);
    }

    fn on_register(&mut self, mut message: RegistrationMessage) {
        if !self.registered || message.header.receiver != self.id {
            return;
        }
        if !self.routes.has_free_child_slot() {
            debug!(temp_id = message.temp_id, "child table full, registration not relayed");
            self.metrics.record_drop();
            return;
        }
        debug!(temp_id = message.temp_id, "registration request from a neighbour");
        self.routes.reserve_temp(message.temp_id, DISCOVERY_CHANNEL);
        message.header.receiver = HUB_ID;
        message.registration_type = RegistrationType::RouteCreation;
        self.on_route_creation(message, DISCOVERY_CHANNEL);
    }

    fn on_route_creation(&mut self, message: RegistrationMessage, sender: u8) {
        self.routes.reserve_temp(message.temp_id, sender);
        if !self.is_hub {
            self.send_internal(&message.into(), Some(sender));
            return;
        }

        let requested = message.new_device_id;
        if requested == 0 || self.routes.route(requested).is_none() {
            let decision = match self.routes.lowest_unused_id() {
                Some(id) => {
                    info!(id, temp_id = message.temp_id, "assigning device id");
                    RegistrationMessage::decision(id, id, message.temp_id, true)
                }
                None => {
                    warn!(temp_id = message.temp_id, "device id space exhausted");
                    RegistrationMessage::decision(0, 0, message.temp_id, false)
                }
            };
            self.conclude_registration(decision);
            return;
        }

        // someone still holds the id: it has to stay silent to lose it
        let now = self.clock.now();
        let ping_id = self.next_message_id();
        self.registration_pings.push(RegistrationPing {
            new_device_id: requested,
            ping_id,
            temp_id: message.temp_id,
            timer: Timer::started(self.config.registration_ping_timeout_ms, now),
        });
        debug!(device = requested, ping_id, "checking current holder of requested id");
        let ping = PingMessage::request(requested, ping_id, self.id, now);
        self.send_internal(&ping.into(), None);
    }

    fn on_accept_reject(&mut self, message: RegistrationMessage, sender: u8) {
        let Some(parent) = self.pending_parent else {
            self.conclude_registration(message);
            return;
        };
        if message.temp_id != self.temp_id {
            self.conclude_registration(message);
            return;
        }

        self.pending_parent = None;
        if !message.is_accepted() {
            info!(temp_id = self.temp_id, "registration rejected");
            return;
        }
        if parent.id != sender {
            debug!(parent = parent.id, sender, "decision relayed by another neighbour");
        }
        let parent_id = parent.id;
        self.id = message.new_device_id;
        self.registered = true;
        self.hierarchy_level = parent.hierarchy_level.saturating_add(1);
        self.routes.set_parent(Some(parent_id));
        info!(
            id = self.id,
            parent = parent_id,
            level = self.hierarchy_level,
            "registered"
        );
    }

    /// Carry an accept/reject one hop further towards the registering device.
    ///
    /// The temporary route becomes the permanent one; a rejection rolls the
    /// permanent entry back afterwards. A direct neighbour is only accepted
    /// into a free child slot.
    fn conclude_registration(&mut self, mut message: RegistrationMessage) {
        let Some(next_hop) = self.routes.take_temp(message.temp_id) else {
            debug!(temp_id = message.temp_id, "no temporary route, decision dropped");
            self.metrics.record_drop();
            return;
        };
        let device = message.new_device_id;

        if next_hop == DISCOVERY_CHANNEL {
            if message.is_accepted() && !self.routes.add_child(device) {
                warn!(device, temp_id = message.temp_id, "child table full, rejecting");
                message.extra_field = 0;
            }
            self.write_message(&message.into(), DISCOVERY_CHANNEL);
            if message.is_accepted() {
                self.routes.set_route(device, device);
                info!(device, "child joined");
            }
            return;
        }

        let previous = self.routes.set_route(device, next_hop);
        self.send_internal(&message.into(), None);
        if !message.is_accepted() {
            self.routes.restore_route(device, previous);
        }
    }

    fn on_ping(&mut self, mut ping: PingMessage) {
        if ping.header.receiver != self.id {
            debug!(receiver = ping.header.receiver, "ping for another device");
            return;
        }

        if !ping.is_response {
            ping.is_response = true;
            ping.header.receiver = ping.sender_id;
            ping.sender_id = self.id;
            self.send_internal(&ping.into(), None);
            return;
        }

        let rtt = Timer::elapsed(ping.timestamp, self.clock.now());
        if let Some(pos) = self
            .registration_pings
            .iter()
            .position(|p| p.ping_id == ping.ping_id && p.new_device_id == ping.sender_id)
        {
            let holder = self.registration_pings.remove(pos);
            info!(device = holder.new_device_id, "current holder answered, rejecting newcomer");
            let decision = RegistrationMessage::decision(
                holder.new_device_id,
                holder.new_device_id,
                holder.temp_id,
                false,
            );
            self.conclude_registration(decision);
            return;
        }

        if let Some(pending) = self.pings.get_mut(&ping.ping_id) {
            if pending.target == ping.sender_id && pending.response_time.is_none() {
                pending.response_time = Some(rtt);
                return;
            }
        }

        match self.benchmark.as_mut() {
            Some(benchmark) if benchmark.is_candidate(ping.sender_id) => {
                let rtt = u16::try_from(rtt).unwrap_or(u16::MAX);
                benchmark.on_answer(ping.sender_id, rtt);
            }
            _ => debug!(ping_id = ping.ping_id, "unsolicited ping response"),
        }
    }

    fn on_error(&mut self, report: ErrorMessage) {
        if self.is_hub {
            self.link
                .report_error(report.error_code, &report.erroneous_message);
            return;
        }
        self.send_internal(&report.into(), None);
    }

    fn on_re_disconnect(&mut self, notice: ReDisconnectMessage, sender: u8) {
        let device = notice.header.receiver;
        if device == self.id {
            if notice.is_disconnect && !self.is_hub {
                info!(id = self.id, "disconnected by the network");
                self.registered = false;
            }
            return;
        }

        if notice.is_disconnect {
            self.disconnect_old_path(device);
            return;
        }

        match self.routes.route(device) {
            Some(old_hop) if old_hop != sender => {
                if old_hop == device {
                    self.routes.remove_child(device);
                }
                debug!(device, old_hop, "tearing down stale path");
                let stale = ReDisconnectMessage::new(device, true);
                self.write_message(&stale.into(), old_hop);
            }
            _ => {
                self.send_internal(&notice.into(), Some(sender));
            }
        }
        self.routes.set_route(device, sender);
    }

    /// Remove the path to `device` and pass a disconnect down it.
    fn disconnect_old_path(&mut self, device: u8) {
        let Some(next_hop) = self.routes.remove_route(device) else {
            debug!(device, "no path to disconnect");
            return;
        };
        if next_hop == device {
            self.routes.remove_child(device);
        }
        let notice = ReDisconnectMessage::new(device, true);
        self.write_message(&notice.into(), next_hop);
    }

    fn advance_discovery(&mut self, now: u32) {
        let Some(discovery) = self.discovery.as_mut() else {
            return;
        };
        let (finished, probe) = discovery.update(now);
        if let Some(probe) = probe {
            self.write_probe(&probe);
        }
        if !finished {
            return;
        }

        let Some(discovery) = self.discovery.take() else {
            return;
        };
        info!(found = discovery.found_devices().len(), "discovery complete");
        if self.registered {
            self.start_benchmark(&discovery, now);
        } else {
            self.register_with_best_parent(&discovery);
        }
    }

    /// Most probed IDs do not exist, so refused probes are not failures.
    fn write_probe(&mut self, probe: &Message) {
        let candidate = probe.receiver();
        let Ok(frames) = encode(probe) else {
            return;
        };
        for frame in &frames {
            self.metrics
                .record_frame(FrameDirection::Sent, probe.message_type());
            if !self.link.write(frame, candidate) {
                trace!(candidate, "probe refused");
            }
        }
    }

    fn register_with_best_parent(&mut self, discovery: &Discovery) {
        let Some(parent) = discovery.best_parent() else {
            info!("no parent found");
            return;
        };
        self.pending_parent = Some(parent);
        let request = RegistrationMessage::new(
            parent.id,
            RegistrationType::Register,
            self.id,
            self.temp_id,
            0,
        );
        debug!(parent = parent.id, level = parent.hierarchy_level, "registering");
        self.write_message(&request.into(), parent.id);
    }

    fn start_benchmark(&mut self, discovery: &Discovery, now: u32) {
        let mut devices: Vec<u8> = Vec::new();
        for found in discovery.found_devices() {
            if found.id != self.id && !devices.contains(&found.id) {
                devices.push(found.id);
            }
        }
        debug!(candidates = devices.len(), "benchmark started");
        self.benchmark = Some(ConnectionBenchmarkWrapper::new(
            devices,
            self.config.benchmark_pings,
            self.config.benchmark_timeout_ms,
            now,
            self.id,
        ));
    }

    fn advance_benchmark(&mut self, now: u32) {
        let Some(benchmark) = self.benchmark.as_mut() else {
            return;
        };
        let (finished, ping) = benchmark.update(now);
        if let Some(ping) = ping {
            let candidate = ping.receiver();
            self.write_message(&ping, candidate);
        }
        if !finished {
            return;
        }

        let Some(benchmark) = self.benchmark.take() else {
            return;
        };
        self.benchmark_results = benchmark.results();
        let best = self
            .benchmark_results
            .iter()
            .filter(|r| r.received_count > 0)
            .min_by_key(|r| r.average_rtt);
        match best {
            Some(best) => info!(
                device = best.device,
                rtt = best.average_rtt,
                answers = best.received_count,
                "benchmark complete"
            ),
            None => info!("benchmark complete, no candidate answered"),
        }
    }

    fn expire_registration_pings(&mut self, now: u32) {
        if self.registration_pings.is_empty() {
            return;
        }
        let (expired, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.registration_pings)
            .into_iter()
            .partition(|p| p.timer.expired(now));
        self.registration_pings = waiting;

        for holder in expired {
            info!(device = holder.new_device_id, "current holder silent, reassigning id");
            self.disconnect_old_path(holder.new_device_id);
            let decision = RegistrationMessage::decision(
                holder.new_device_id,
                holder.new_device_id,
                holder.temp_id,
                true,
            );
            self.conclude_registration(decision);
        }
    }

    fn expire_pings(&mut self, now: u32) {
        self.pings.retain(|ping_id, ping| {
            let keep = ping.response_time.is_some() || !ping.timer.expired(now);
            if !keep {
                debug!(ping_id, target = ping.target, "ping timed out");
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;
    use crate::protocol::{ERRONEOUS_MESSAGE_SIZE, Error, FIRST_DATA_SLOTS};

    #[derive(Default)]
    struct Wire {
        inbox: VecDeque<(Frame, u8)>,
        written: Vec<(Frame, u8)>,
        errors: Vec<(u8, [u8; ERRONEOUS_MESSAGE_SIZE])>,
        refuse: bool,
    }

    #[derive(Clone, Default)]
    struct MockLink(Rc<RefCell<Wire>>);

    impl MockLink {
        fn inject(&self, message: impl Into<Message>, sender: u8) {
            let frames = encode(&message.into()).unwrap();
            let mut wire = self.0.borrow_mut();
            for frame in frames {
                wire.inbox.push_back((frame, sender));
            }
        }

        fn take_written(&self) -> Vec<(Message, u8)> {
            self.0
                .borrow_mut()
                .written
                .drain(..)
                .map(|(frame, hop)| (decode(&frame).unwrap(), hop))
                .collect()
        }
    }

    impl LinkAdapter for MockLink {
        fn write(&mut self, frame: &Frame, next_hop: u8) -> bool {
            let mut wire = self.0.borrow_mut();
            if wire.refuse {
                return false;
            }
            wire.written.push((*frame, next_hop));
            true
        }

        fn read(&mut self) -> Option<(Frame, u8)> {
            self.0.borrow_mut().inbox.pop_front()
        }

        fn frame_available(&self) -> bool {
            !self.0.borrow().inbox.is_empty()
        }

        fn report_error(&mut self, code: u8, frame: &[u8; ERRONEOUS_MESSAGE_SIZE]) {
            self.0.borrow_mut().errors.push((code, *frame));
        }
    }

    #[derive(Clone, Default)]
    struct MockClock(Rc<Cell<u32>>);

    impl MockClock {
        fn advance(&self, ms: u32) {
            self.0.set(self.0.get().wrapping_add(ms));
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> u32 {
            self.0.get()
        }
    }

    type TestDevice = NetworkDevice<MockLink, MockClock>;

    fn hub() -> (TestDevice, MockLink, MockClock) {
        let link = MockLink::default();
        let clock = MockClock::default();
        (NetworkDevice::hub(link.clone(), clock.clone()), link, clock)
    }

    /// A device already attached below `parent`, without running discovery.
    fn attached(id: u8, parent: u8) -> (TestDevice, MockLink, MockClock) {
        let link = MockLink::default();
        let clock = MockClock::default();
        let mut device = NetworkDevice::new(id, link.clone(), clock.clone());
        device.discovery = None;
        device.registered = true;
        device.hierarchy_level = 1;
        device.routes.set_parent(Some(parent));
        (device, link, clock)
    }

    fn drain(device: &mut TestDevice) -> bool {
        let mut received = false;
        while device.link().frame_available() {
            received |= device.update();
        }
        received
    }

    fn discovery_answer(id: u8, temp_id: u32, level: u8) -> RegistrationMessage {
        RegistrationMessage::new(
            DISCOVERY_CHANNEL,
            RegistrationType::Discover,
            id,
            temp_id,
            level,
        )
    }

    fn register(temp_id: u32, requested: u8) -> RegistrationMessage {
        RegistrationMessage::new(HUB_ID, RegistrationType::Register, requested, temp_id, 0)
    }

    #[test]
    fn hub_assigns_lowest_free_id_to_direct_neighbour() {
        let (mut hub, link, _) = hub();
        link.inject(register(11, 0), DISCOVERY_CHANNEL);
        drain(&mut hub);

        let written = link.take_written();
        assert_eq!(written.len(), 1);
        let (Message::Registration(decision), hop) = &written[0] else {
            panic!("expected a registration message");
        };
        assert_eq!(*hop, DISCOVERY_CHANNEL);
        assert_eq!(decision.registration_type, RegistrationType::AcceptReject);
        assert_eq!(decision.new_device_id, 1);
        assert_eq!(decision.temp_id, 11);
        assert!(decision.is_accepted());
        assert_eq!(hub.route_to(1), Some(1));
        assert_eq!(hub.children(), vec![1]);
        assert_eq!(hub.temp_route_to(11), None);
    }

    #[test]
    fn hub_routes_new_id_through_child() {
        let (mut hub, link, _) = hub();
        link.inject(register(11, 0), DISCOVERY_CHANNEL);
        drain(&mut hub);
        link.take_written();

        let creation =
            RegistrationMessage::new(HUB_ID, RegistrationType::RouteCreation, 0, 22, 0);
        link.inject(creation, 1);
        drain(&mut hub);

        let written = link.take_written();
        assert_eq!(written.len(), 1);
        let (Message::Registration(decision), hop) = &written[0] else {
            panic!("expected a registration message");
        };
        assert_eq!(*hop, 1);
        assert_eq!(decision.header.receiver, 2);
        assert_eq!(decision.new_device_id, 2);
        assert_eq!(decision.temp_id, 22);
        assert!(decision.is_accepted());
        assert_eq!(hub.route_to(2), Some(1));
    }

    #[test]
    fn hub_rejects_when_ids_run_out() {
        let (mut hub, link, _) = hub();
        for id in 1..=254 {
            hub.routes.set_route(id, 1);
        }
        link.inject(register(5, 0), DISCOVERY_CHANNEL);
        drain(&mut hub);

        let written = link.take_written();
        let (Message::Registration(decision), hop) = &written[0] else {
            panic!("expected a registration message");
        };
        assert_eq!(*hop, DISCOVERY_CHANNEL);
        assert!(!decision.is_accepted());
        assert_eq!(decision.new_device_id, 0);
        assert!(hub.children().is_empty());
    }

    #[test]
    fn fifth_neighbour_is_not_accepted_into_full_child_table() {
        let (mut hub, link, _) = hub();
        for temp_id in 101..=105 {
            link.inject(register(temp_id, 0), DISCOVERY_CHANNEL);
        }
        drain(&mut hub);

        let accepted: Vec<u32> = link
            .take_written()
            .into_iter()
            .filter_map(|(message, _)| match message {
                Message::Registration(m) if m.is_accepted() => Some(m.temp_id),
                _ => None,
            })
            .collect();
        assert_eq!(accepted, vec![101, 102, 103, 104]);
        assert_eq!(hub.children(), vec![1, 2, 3, 4]);
        assert_eq!(hub.route_to(5), None);
        assert_eq!(hub.temp_route_to(105), None);
        assert_eq!(hub.routes.flood_targets(None), vec![1, 2, 3, 4]);
    }

    #[test]
    fn full_child_table_turns_direct_accept_into_reject() {
        let (mut hub, link, _) = hub();
        for child in 1..=4 {
            hub.routes.set_route(child, child);
            hub.routes.add_child(child);
        }
        hub.routes.reserve_temp(77, DISCOVERY_CHANNEL);
        hub.conclude_registration(RegistrationMessage::decision(5, 5, 77, true));

        let written = link.take_written();
        assert_eq!(written.len(), 1);
        let (Message::Registration(decision), hop) = &written[0] else {
            panic!("expected a registration message");
        };
        assert_eq!(*hop, DISCOVERY_CHANNEL);
        assert_eq!(decision.temp_id, 77);
        assert!(!decision.is_accepted());
        assert_eq!(hub.route_to(5), None);
        assert_eq!(hub.children(), vec![1, 2, 3, 4]);
    }

    fn hub_with_holder() -> (TestDevice, MockLink, MockClock) {
        let (mut hub, link, clock) = hub();
        hub.routes.set_route(1, 1);
        hub.routes.add_child(1);
        hub.routes.set_route(2, 1);
        (hub, link, clock)
    }

    fn registration_ping(link: &MockLink) -> PingMessage {
        let written = link.take_written();
        assert_eq!(written.len(), 1);
        match &written[0] {
            (Message::Ping(ping), 1) => *ping,
            other => panic!("expected ping towards 1, got {other:?}"),
        }
    }

    #[test]
    fn answering_holder_keeps_its_id() {
        let (mut hub, link, _) = hub_with_holder();
        link.inject(register(33, 2), DISCOVERY_CHANNEL);
        drain(&mut hub);

        let ping = registration_ping(&link);
        assert_eq!(ping.header.receiver, 2);
        assert!(!ping.is_response);

        let mut answer = ping;
        answer.is_response = true;
        answer.header.receiver = HUB_ID;
        answer.sender_id = 2;
        link.inject(answer, 1);
        drain(&mut hub);

        let written = link.take_written();
        let (Message::Registration(decision), hop) = &written[0] else {
            panic!("expected a registration message");
        };
        assert_eq!(*hop, DISCOVERY_CHANNEL);
        assert_eq!(decision.temp_id, 33);
        assert!(!decision.is_accepted());
        assert_eq!(hub.route_to(2), Some(1));
        assert_eq!(hub.children(), vec![1]);
    }

    #[test]
    fn silent_holder_loses_its_id() {
        let (mut hub, link, clock) = hub_with_holder();
        link.inject(register(33, 2), DISCOVERY_CHANNEL);
        drain(&mut hub);
        registration_ping(&link);

        clock.advance(hub.config().registration_ping_timeout_ms);
        hub.update();
        assert!(link.take_written().is_empty());

        clock.advance(1);
        hub.update();
        let written = link.take_written();
        assert_eq!(written.len(), 2);
        match &written[0] {
            (Message::ReDisconnect(notice), 1) => {
                assert!(notice.is_disconnect);
                assert_eq!(notice.header.receiver, 2);
            }
            other => panic!("expected disconnect down the old path, got {other:?}"),
        }
        match &written[1] {
            (Message::Registration(decision), DISCOVERY_CHANNEL) => {
                assert!(decision.is_accepted());
                assert_eq!(decision.new_device_id, 2);
            }
            other => panic!("expected accept on the discovery channel, got {other:?}"),
        }
        assert_eq!(hub.route_to(2), Some(2));
        assert_eq!(hub.children(), vec![1, 2]);
    }

    #[test]
    fn unregistered_device_registers_with_best_responder() {
        let link = MockLink::default();
        let clock = MockClock::default();
        let config = DeviceConfig {
            discovery_timeout_ms: 5,
            ..DeviceConfig::default()
        };
        let mut device = NetworkDevice::with_config(0, link.clone(), clock.clone(), config);
        let temp_id = device.temp_id();

        for _ in 0..=254 {
            device.update();
        }
        assert_eq!(link.take_written().len(), 255);

        for (id, level) in [(7, 2), (3, 1)] {
            link.inject(discovery_answer(id, temp_id, level), id);
        }
        link.inject(discovery_answer(0, temp_id ^ 1, 0), 0);
        drain(&mut device);

        clock.advance(6);
        device.update();
        let written = link.take_written();
        assert_eq!(written.len(), 1);
        let (Message::Registration(request), hop) = &written[0] else {
            panic!("expected a registration request");
        };
        assert_eq!(*hop, 3);
        assert_eq!(request.registration_type, RegistrationType::Register);
        assert_eq!(request.temp_id, temp_id);

        link.inject(RegistrationMessage::decision(9, 9, temp_id, true), 3);
        drain(&mut device);
        assert!(device.is_registered());
        assert_eq!(device.id(), 9);
        assert_eq!(device.parent(), Some(3));
        assert_eq!(device.hierarchy_level(), 2);
    }

    #[test]
    fn registered_device_relays_register_as_route_creation() {
        let (mut device, link, _) = attached(1, HUB_ID);
        let mut request = register(44, 0);
        request.header.receiver = 1;
        link.inject(request, DISCOVERY_CHANNEL);
        drain(&mut device);

        let written = link.take_written();
        let (Message::Registration(creation), hop) = &written[0] else {
            panic!("expected route creation");
        };
        assert_eq!(*hop, HUB_ID);
        assert_eq!(creation.registration_type, RegistrationType::RouteCreation);
        assert_eq!(creation.header.receiver, HUB_ID);
        assert_eq!(device.temp_route_to(44), Some(DISCOVERY_CHANNEL));

        link.inject(RegistrationMessage::decision(2, 2, 44, true), HUB_ID);
        drain(&mut device);
        let written = link.take_written();
        assert!(matches!(written[0], (Message::Registration(_), DISCOVERY_CHANNEL)));
        assert_eq!(device.route_to(2), Some(2));
        assert_eq!(device.children(), vec![2]);
    }

    #[test]
    fn relayed_rejection_rolls_route_back() {
        let (mut device, link, _) = attached(1, HUB_ID);
        device.routes.set_route(2, 4);
        device.routes.reserve_temp(55, 3);

        link.inject(RegistrationMessage::decision(2, 2, 55, false), HUB_ID);
        drain(&mut device);

        let written = link.take_written();
        assert!(matches!(written[0], (Message::Registration(_), 3)));
        assert_eq!(device.route_to(2), Some(4));
    }

    #[test]
    fn probes_answered_only_with_free_slot() {
        let (mut device, link, _) = attached(4, HUB_ID);
        let probe =
            RegistrationMessage::new(4, RegistrationType::Discover, 4, 99, DISCOVERY_PROBE);
        link.inject(probe, DISCOVERY_CHANNEL);
        drain(&mut device);

        let written = link.take_written();
        let (Message::Registration(answer), hop) = &written[0] else {
            panic!("expected a discovery answer");
        };
        assert_eq!(*hop, DISCOVERY_CHANNEL);
        assert_eq!(answer.new_device_id, 4);
        assert_eq!(answer.extra_field, 1);
        assert_eq!(answer.temp_id, 99);

        for child in 10..14 {
            device.routes.add_child(child);
        }
        link.inject(probe, DISCOVERY_CHANNEL);
        drain(&mut device);
        assert!(link.take_written().is_empty());
    }

    #[test]
    fn foreign_unicast_is_forwarded_not_delivered() {
        let (mut device, link, _) = attached(1, HUB_ID);
        device.routes.set_route(9, 4);
        link.inject(DataMessage::new(9, HUB_ID, 1, &b"hi"[..]), HUB_ID);

        assert!(!drain(&mut device));
        let written = link.take_written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].1, 4);
        assert!(device.receive().is_none());
        assert_eq!(device.metrics().frames_forwarded, 1);
    }

    #[test]
    fn fragmented_payload_is_delivered() {
        let (mut device, link, _) = attached(1, HUB_ID);
        let content = vec![0x5A; FIRST_DATA_SLOTS + 3];
        link.inject(DataMessage::new(1, HUB_ID, 7, content.clone()), HUB_ID);

        assert!(drain(&mut device));
        let payload = device.receive().unwrap();
        assert_eq!(payload.origin, HUB_ID);
        assert_eq!(payload.command, None);
        assert_eq!(&payload.data[..content.len()], &content[..]);
        assert_eq!(device.metrics().payloads_completed, 1);
    }

    #[test]
    fn command_carries_command_byte() {
        let (mut device, link, _) = attached(1, HUB_ID);
        link.inject(CommandMessage::new(1, 0x42, HUB_ID, 3, &b"on"[..]), HUB_ID);

        assert!(drain(&mut device));
        let payload = device.receive().unwrap();
        assert_eq!(payload.command, Some(0x42));
        assert_eq!(&payload.data[..2], b"on");
    }

    #[test]
    fn group_message_floods_and_delivers_to_members() {
        let (mut device, link, _) = attached(1, HUB_ID);
        device.routes.add_child(4);
        device.routes.add_child(5);
        link.inject(DataMessage::to_group(7, 4, 1, &b"all"[..]), 4);

        assert!(!drain(&mut device));
        let hops: Vec<u8> = link.take_written().into_iter().map(|(_, hop)| hop).collect();
        assert_eq!(hops, vec![5, HUB_ID]);

        device.join_group(7);
        link.inject(DataMessage::to_group(7, 4, 2, &b"all"[..]), 4);
        assert!(drain(&mut device));
        assert_eq!(device.receive().unwrap().group, Some(7));
    }

    #[test]
    fn local_group_send_reaches_parent() {
        let (mut device, link, _) = attached(1, HUB_ID);
        assert!(device.send_to_group(3, &b"x"[..]).unwrap());
        let written = link.take_written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].1, HUB_ID);
    }

    #[test]
    fn unicast_without_route_or_parent_is_not_sent() {
        let (mut hub, link, _) = hub();
        assert!(!hub.send(9, &b"lost"[..]).unwrap());
        assert!(link.take_written().is_empty());
    }

    #[test]
    fn oversized_payload_is_an_error() {
        let (mut device, _, _) = attached(1, HUB_ID);
        let result = device.send(HUB_ID, vec![0u8; 10_000]);
        assert!(matches!(result, Err(Error::PayloadTooLarge { .. })));
    }

    #[test]
    fn refused_write_is_reported() {
        let (mut device, link, _) = attached(1, HUB_ID);
        link.0.borrow_mut().refuse = true;
        assert!(!device.send(HUB_ID, &b"x"[..]).unwrap());
        assert_eq!(device.metrics().write_failures, 1);
    }

    #[test]
    fn ping_round_trip() {
        let (mut hub, link, clock) = hub();
        hub.routes.set_route(1, 1);
        clock.advance(100);
        let ping_id = hub.ping(1);

        let written = link.take_written();
        let (Message::Ping(request), 1) = &written[0] else {
            panic!("expected ping towards 1");
        };
        assert_eq!(hub.check_ping(ping_id), None);

        let mut answer = *request;
        answer.is_response = true;
        answer.header.receiver = HUB_ID;
        answer.sender_id = 1;
        clock.advance(30);
        link.inject(answer, 1);
        drain(&mut hub);

        assert_eq!(hub.check_ping(ping_id), Some(30));
        assert_eq!(hub.check_ping(ping_id), None);
    }

    #[test]
    fn ping_request_is_answered_towards_sender() {
        let (mut device, link, _) = attached(1, HUB_ID);
        link.inject(PingMessage::request(1, 8, HUB_ID, 500), HUB_ID);
        drain(&mut device);

        let written = link.take_written();
        let (Message::Ping(answer), HUB_ID) = &written[0] else {
            panic!("expected answer to the hub");
        };
        assert!(answer.is_response);
        assert_eq!(answer.sender_id, 1);
        assert_eq!(answer.ping_id, 8);
        assert_eq!(answer.timestamp, 500);
    }

    #[test]
    fn unanswered_pings_expire() {
        let (mut hub, _, clock) = hub();
        hub.routes.set_route(1, 1);
        let ping_id = hub.ping(1);
        clock.advance(hub.config().ping_timeout_ms + 1);
        hub.update();
        assert!(!hub.pings.contains_key(&ping_id));
    }

    #[test]
    fn errors_travel_to_hub_sink() {
        let (mut device, link, _) = attached(1, HUB_ID);
        assert!(device.send_error(3, &[1, 2, 3]));
        let written = link.take_written();
        let (Message::Error(report), HUB_ID) = &written[0] else {
            panic!("expected error towards the hub");
        };

        let (mut hub, hub_link, _) = hub();
        hub_link.inject(*report, 1);
        drain(&mut hub);
        let wire = hub_link.0.borrow();
        let errors = &wire.errors;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, 3);
        assert_eq!(&errors[0].1[..3], &[1, 2, 3]);
    }

    #[test]
    fn membership_change_applies_at_target() {
        let (mut device, link, _) = attached(1, HUB_ID);
        link.inject(AddRemoveToGroupMessage::new(1, 12, true), HUB_ID);
        drain(&mut device);
        assert!(device.is_in_group(12));

        link.inject(AddRemoveToGroupMessage::new(1, 12, false), HUB_ID);
        drain(&mut device);
        assert!(!device.is_in_group(12));
        assert!(device.is_in_group(0));
    }

    #[test]
    fn disconnect_in_transit_follows_old_path() {
        let (mut device, link, _) = attached(1, HUB_ID);
        device.routes.set_route(9, 9);
        device.routes.add_child(9);
        link.inject(ReDisconnectMessage::new(9, true), HUB_ID);
        drain(&mut device);

        let written = link.take_written();
        assert!(matches!(written[0], (Message::ReDisconnect(_), 9)));
        assert_eq!(device.route_to(9), None);
        assert!(device.children().is_empty());
    }

    #[test]
    fn reconnect_tears_down_stale_path() {
        let (mut device, link, _) = attached(1, HUB_ID);
        device.routes.set_route(9, 4);
        link.inject(ReDisconnectMessage::new(9, false), 5);
        drain(&mut device);

        let written = link.take_written();
        assert_eq!(written.len(), 1);
        let (Message::ReDisconnect(notice), 4) = &written[0] else {
            panic!("expected disconnect down the stale path");
        };
        assert!(notice.is_disconnect);
        assert_eq!(device.route_to(9), Some(5));
    }

    #[test]
    fn reconnect_without_old_path_moves_up() {
        let (mut device, link, _) = attached(1, HUB_ID);
        link.inject(ReDisconnectMessage::new(9, false), 5);
        drain(&mut device);

        let written = link.take_written();
        assert!(matches!(written[0], (Message::ReDisconnect(_), HUB_ID)));
        assert_eq!(device.route_to(9), Some(5));
    }

    #[test]
    fn disconnect_for_self_unregisters() {
        let (mut device, link, _) = attached(1, HUB_ID);
        link.inject(ReDisconnectMessage::new(1, true), HUB_ID);
        drain(&mut device);
        assert!(!device.is_registered());
    }

    #[test]
    fn garbage_frame_is_dropped() {
        let (mut device, link, _) = attached(1, HUB_ID);
        let mut frame = [0u8; crate::protocol::FRAME_SIZE];
        frame[0] = 9;
        link.0.borrow_mut().inbox.push_back((frame, HUB_ID));
        assert!(!device.update());
        assert_eq!(device.metrics().frames_dropped, 1);
    }

    #[test]
    fn rediscovery_benchmarks_responders() {
        let link = MockLink::default();
        let clock = MockClock::default();
        let config = DeviceConfig {
            discovery_timeout_ms: 1,
            benchmark_pings: 2,
            benchmark_timeout_ms: 10,
            ..DeviceConfig::default()
        };
        let mut device = NetworkDevice::with_config(1, link.clone(), clock.clone(), config);
        device.discovery = None;
        device.registered = true;
        device.routes.set_parent(Some(HUB_ID));

        device.start_discovery();
        let temp_id = device.temp_id();
        for _ in 0..=254 {
            device.update();
        }
        link.inject(discovery_answer(HUB_ID, temp_id, 0), HUB_ID);
        drain(&mut device);
        link.take_written();

        clock.advance(2);
        device.update();
        assert!(device.is_benchmarking());

        device.update();
        device.update();
        let pings: Vec<PingMessage> = link
            .take_written()
            .into_iter()
            .filter_map(|(msg, _)| match msg {
                Message::Ping(ping) => Some(ping),
                _ => None,
            })
            .collect();
        assert_eq!(pings.len(), 2);

        for ping in pings {
            let mut answer = ping;
            answer.is_response = true;
            answer.header.receiver = 1;
            answer.sender_id = HUB_ID;
            link.inject(answer, HUB_ID);
        }
        clock.advance(4);
        drain(&mut device);

        clock.advance(20);
        device.update();
        assert!(!device.is_benchmarking());
        assert_eq!(
            device.benchmark_results(),
            &[BenchmarkResult {
                device: HUB_ID,
                received_count: 2,
                average_rtt: 4
            }]
        );
    }
}
