use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, error, info, trace, warn};
use prost::Message;

use crate::error::{LinkError, Result};
use crate::framing::{Chunk, Deframer, START2, encode_frame};
use crate::nodes::NodeDb;
use crate::proto::{
    AdminMessage, BROADCAST_ADDR, Data, FromRadio, MeshPacket, PortNum, Position, ToRadio, User,
    admin_message, from_radio, mesh_packet, to_radio,
};
use crate::transport::Transport;

/// Largest application payload carried in one mesh packet.
pub const DATA_PAYLOAD_LEN: usize = 233;

/// Number of `START2` bytes written to wake the device before the handshake.
const WAKE_BYTES: usize = 32;

/// Called on the reader thread for every mesh packet the device delivers.
///
/// The node registry is passed alongside so the callback can resolve names.
pub type ReceiveCallback = Box<dyn Fn(&MeshPacket, &NodeDb) + Send + 'static>;

/// An open session with a Meshtastic device.
pub trait MeshInterface: Send {
    /// Node number of the attached device, once the config dump reported it.
    fn local_node_num(&self) -> Option<u32>;

    /// Install the receive callback, replacing any previous one.
    fn set_receive_callback(&mut self, callback: ReceiveCallback);

    /// Broadcast a text message on the primary channel.
    fn send_text(&mut self, text: &str) -> Result<()>;

    /// Set the owner long and short names of the attached device.
    fn set_owner(&mut self, long_name: &str, short_name: &str) -> Result<()>;

    /// Broadcast our position so peers pick up node changes.
    fn send_position(&mut self) -> Result<()>;

    /// `false` once the reader has lost the device.
    fn is_alive(&self) -> bool;

    /// Tell the device we are leaving and release the port.
    fn close(&mut self) -> Result<()>;
}

/// Configuration for a serial session.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Read timeout for the reader thread. Bounds how long `close` waits.
    pub read_timeout: Duration,
    /// Pause after the wake-up bytes.
    pub wake_delay: Duration,
    /// How long to wait for the config dump to complete.
    pub config_timeout: Duration,
    /// Hop limit stamped on outgoing packets.
    pub hop_limit: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(100),
            wake_delay: Duration::from_millis(100),
            config_timeout: Duration::from_secs(10),
            hop_limit: 3,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the interface and its reader thread.
struct Shared {
    nodes: RwLock<NodeDb>,
    my_node_num: Mutex<Option<u32>>,
    config_complete: Mutex<Option<u32>>,
    config_cv: Condvar,
    callback: Mutex<Option<ReceiveCallback>>,
    running: AtomicBool,
    alive: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            nodes: RwLock::new(NodeDb::new()),
            my_node_num: Mutex::new(None),
            config_complete: Mutex::new(None),
            config_cv: Condvar::new(),
            callback: Mutex::new(None),
            running: AtomicBool::new(true),
            alive: AtomicBool::new(true),
        }
    }

    fn handle_from_radio(&self, msg: FromRadio) {
        match msg.payload_variant {
            Some(from_radio::PayloadVariant::MyInfo(info)) => {
                info!("local node is {}", info.my_node_num);
                *lock(&self.my_node_num) = Some(info.my_node_num);
            }
            Some(from_radio::PayloadVariant::NodeInfo(info)) => {
                trace!("node info for {}", info.num);
                self.nodes
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .update_from_node_info(&info);
            }
            Some(from_radio::PayloadVariant::ConfigCompleteId(id)) => {
                debug!("config complete (id {id:#010x})");
                *lock(&self.config_complete) = Some(id);
                self.config_cv.notify_all();
            }
            Some(from_radio::PayloadVariant::Packet(packet)) => self.handle_packet(packet),
            Some(from_radio::PayloadVariant::Rebooted(_)) => warn!("device reported a reboot"),
            None => trace!("FromRadio without a known payload (id {})", msg.id),
        }
    }

    fn handle_packet(&self, packet: MeshPacket) {
        if packet.port() == Some(PortNum::NodeinfoApp)
            && let Some(data) = packet.decoded()
        {
            match User::decode(data.payload.as_slice()) {
                Ok(user) => self
                    .nodes
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .update_user(packet.from, &user),
                Err(e) => debug!("bad node info from {}: {e}", packet.from),
            }
        }

        let callback = lock(&self.callback);
        if let Some(cb) = callback.as_ref() {
            let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
            cb(&packet, &nodes);
        }
    }
}

/// A Meshtastic session over a byte transport, normally a USB serial port.
///
/// A reader thread owns a cloned handle to the transport; it decodes
/// everything the device sends and runs the receive callback.
pub struct SerialInterface {
    writer: Box<dyn Transport>,
    shared: Arc<Shared>,
    reader: Option<JoinHandle<()>>,
    config: LinkConfig,
    closed: bool,
}

impl SerialInterface {
    /// Open a serial port and complete the config handshake.
    #[cfg(feature = "serial")]
    pub fn open(port_name: &str, config: LinkConfig) -> Result<Self> {
        let transport =
            crate::transport::serial::open_port(port_name, config.baud_rate, config.read_timeout)?;
        if let Err(e) = transport.clear() {
            debug!("could not clear {port_name}: {e}");
        }
        Self::with_transport(Box::new(transport), config)
    }

    /// Start a session over an already-open transport.
    pub fn with_transport(mut writer: Box<dyn Transport>, config: LinkConfig) -> Result<Self> {
        let mut reader_transport = writer.try_clone_box()?;
        reader_transport.set_read_timeout(config.read_timeout)?;

        writer.write_all(&[START2; WAKE_BYTES])?;
        writer.flush()?;
        thread::sleep(config.wake_delay);

        let shared = Arc::new(Shared::new());
        let reader_shared = Arc::clone(&shared);
        let reader = thread::Builder::new()
            .name("mesh-link-reader".into())
            .spawn(move || reader_loop(reader_transport, reader_shared))?;

        let mut iface = Self {
            writer,
            shared,
            reader: Some(reader),
            config,
            closed: false,
        };
        iface.request_config()?;
        Ok(iface)
    }

    /// Snapshot of the node registry.
    pub fn nodes(&self) -> NodeDb {
        self.shared
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn request_config(&mut self) -> Result<()> {
        let nonce = rand::random::<u32>().max(1);
        debug!("requesting config (want_config_id {nonce:#010x})");
        self.send_to_radio(ToRadio {
            payload_variant: Some(to_radio::PayloadVariant::WantConfigId(nonce)),
        })?;

        let deadline = Instant::now() + self.config.config_timeout;
        let mut complete = lock(&self.shared.config_complete);
        while *complete != Some(nonce) {
            if !self.shared.alive.load(Ordering::Acquire) {
                return Err(LinkError::Closed);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("timeout waiting for config complete");
                return Err(LinkError::Timeout);
            }
            complete = self
                .shared
                .config_cv
                .wait_timeout(complete, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        info!(
            "config complete, {} node(s) known",
            self.shared
                .nodes
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        );
        Ok(())
    }

    fn send_to_radio(&mut self, msg: ToRadio) -> Result<()> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        let bytes = encode_frame(&msg.encode_to_vec())?;
        trace!("TX: {:02X?}", bytes);
        self.writer.write_all(&bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    fn send_data(&mut self, to: u32, port: PortNum, payload: Vec<u8>, want_response: bool) -> Result<()> {
        if payload.len() > DATA_PAYLOAD_LEN {
            return Err(LinkError::PayloadTooLarge(payload.len()));
        }
        let packet = MeshPacket {
            to,
            id: rand::random::<u32>().max(1),
            hop_limit: self.config.hop_limit,
            payload_variant: Some(mesh_packet::PayloadVariant::Decoded(Data {
                portnum: port as i32,
                payload,
                want_response,
                ..Default::default()
            })),
            ..Default::default()
        };
        debug!("sending {:?} packet {:#010x} to {:#010x}", port, packet.id, to);
        self.send_to_radio(ToRadio {
            payload_variant: Some(to_radio::PayloadVariant::Packet(packet)),
        })
    }

    fn stop_reader(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.reader.take()
            && handle.join().is_err()
        {
            error!("reader thread panicked");
        }
    }
}

impl MeshInterface for SerialInterface {
    fn local_node_num(&self) -> Option<u32> {
        *lock(&self.shared.my_node_num)
    }

    fn set_receive_callback(&mut self, callback: ReceiveCallback) {
        *lock(&self.shared.callback) = Some(callback);
    }

    fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_data(
            BROADCAST_ADDR,
            PortNum::TextMessageApp,
            text.as_bytes().to_vec(),
            false,
        )
    }

    fn set_owner(&mut self, long_name: &str, short_name: &str) -> Result<()> {
        let local = self.local_node_num().ok_or(LinkError::NotConfigured)?;
        let admin = AdminMessage {
            payload_variant: Some(admin_message::PayloadVariant::SetOwner(User {
                long_name: long_name.to_string(),
                short_name: short_name.to_string(),
                ..Default::default()
            })),
        };
        self.send_data(local, PortNum::AdminApp, admin.encode_to_vec(), true)
    }

    fn send_position(&mut self) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let position = Position {
            time: now,
            ..Default::default()
        };
        self.send_data(
            BROADCAST_ADDR,
            PortNum::PositionApp,
            position.encode_to_vec(),
            false,
        )
    }

    fn is_alive(&self) -> bool {
        !self.closed && self.shared.alive.load(Ordering::Acquire)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.send_to_radio(ToRadio {
            payload_variant: Some(to_radio::PayloadVariant::Disconnect(true)),
        });
        self.closed = true;
        self.stop_reader();
        info!("interface closed");
        result
    }
}

impl Drop for SerialInterface {
    fn drop(&mut self) {
        self.closed = true;
        self.stop_reader();
    }
}

fn reader_loop(mut transport: Box<dyn Transport>, shared: Arc<Shared>) {
    let mut deframer = Deframer::new();
    let mut buf = [0u8; 256];

    while shared.running.load(Ordering::Acquire) {
        match transport.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                trace!("RX {} bytes", n);
                deframer.push(&buf[..n]);
                while let Some(chunk) = deframer.next_chunk() {
                    match chunk {
                        Chunk::Frame(bytes) => match FromRadio::decode(bytes.as_slice()) {
                            Ok(msg) => shared.handle_from_radio(msg),
                            Err(e) => warn!("dropping malformed FromRadio: {e}"),
                        },
                        Chunk::Text(text) => {
                            debug!("device: {}", String::from_utf8_lossy(&text).trim_end())
                        }
                    }
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                error!("serial read failed: {e}");
                break;
            }
        }
    }

    shared.alive.store(false, Ordering::Release);
    shared.config_cv.notify_all();
    debug!("reader thread exiting");
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::mpsc;

    use super::*;
    use crate::proto::{MyNodeInfo, NodeInfo};

    const LOCAL: u32 = 0x1234;

    #[derive(Default)]
    struct Wire {
        written: Vec<u8>,
        to_host: VecDeque<u8>,
        respond_to_config: bool,
        fail_reads: bool,
    }

    /// In-memory device: answers want_config and records what we send.
    #[derive(Clone)]
    struct MockTransport {
        wire: Arc<Mutex<Wire>>,
    }

    impl MockTransport {
        fn new(respond_to_config: bool) -> Self {
            Self {
                wire: Arc::new(Mutex::new(Wire {
                    respond_to_config,
                    ..Wire::default()
                })),
            }
        }

        fn inject(&self, msg: FromRadio) {
            let bytes = encode_frame(&msg.encode_to_vec()).unwrap();
            self.wire.lock().unwrap().to_host.extend(bytes);
        }

        fn sent(&self) -> Vec<ToRadio> {
            let wire = self.wire.lock().unwrap();
            let mut d = Deframer::new();
            d.push(&wire.written);
            let mut out = Vec::new();
            while let Some(chunk) = d.next_chunk() {
                if let Chunk::Frame(bytes) = chunk {
                    out.push(ToRadio::decode(bytes.as_slice()).unwrap());
                }
            }
            out
        }
    }

    impl Transport for MockTransport {
        fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
            let mut wire = self.wire.lock().unwrap();
            wire.written.extend_from_slice(buf);
            if !wire.respond_to_config {
                return Ok(());
            }
            let mut d = Deframer::new();
            d.push(buf);
            while let Some(chunk) = d.next_chunk() {
                let Chunk::Frame(bytes) = chunk else { continue };
                let msg = ToRadio::decode(bytes.as_slice()).unwrap();
                if let Some(to_radio::PayloadVariant::WantConfigId(id)) = msg.payload_variant {
                    for reply in config_dump(id) {
                        let frame = encode_frame(&reply.encode_to_vec()).unwrap();
                        wire.to_host.extend(frame);
                    }
                }
            }
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut wire = self.wire.lock().unwrap();
            if wire.fail_reads {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
            }
            if wire.to_host.is_empty() {
                drop(wire);
                thread::sleep(Duration::from_millis(2));
                return Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"));
            }
            let n = buf.len().min(wire.to_host.len());
            for (slot, byte) in buf.iter_mut().zip(wire.to_host.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }

        fn set_read_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }

        fn try_clone_box(&self) -> io::Result<Box<dyn Transport>> {
            Ok(Box::new(self.clone()))
        }
    }

    fn config_dump(id: u32) -> Vec<FromRadio> {
        vec![
            FromRadio {
                id: 1,
                payload_variant: Some(from_radio::PayloadVariant::MyInfo(MyNodeInfo {
                    my_node_num: LOCAL,
                })),
            },
            FromRadio {
                id: 2,
                payload_variant: Some(from_radio::PayloadVariant::NodeInfo(NodeInfo {
                    num: 77,
                    user: Some(User {
                        long_name: "Ridge Relay".into(),
                        short_name: "RDG1".into(),
                        ..Default::default()
                    }),
                    ..Default::default()
                })),
            },
            FromRadio {
                id: 3,
                payload_variant: Some(from_radio::PayloadVariant::ConfigCompleteId(id)),
            },
        ]
    }

    fn test_config() -> LinkConfig {
        LinkConfig {
            wake_delay: Duration::ZERO,
            config_timeout: Duration::from_secs(2),
            ..LinkConfig::default()
        }
    }

    fn packet_of(msg: &ToRadio) -> &MeshPacket {
        match &msg.payload_variant {
            Some(to_radio::PayloadVariant::Packet(p)) => p,
            other => panic!("expected packet, got {other:?}"),
        }
    }

    #[test]
    fn test_handshake_learns_local_node_and_peers() {
        let mock = MockTransport::new(true);
        let mut iface = SerialInterface::with_transport(Box::new(mock.clone()), test_config()).unwrap();

        assert_eq!(iface.local_node_num(), Some(LOCAL));
        let nodes = iface.nodes();
        assert_eq!(nodes.get(77).unwrap().long_name.as_deref(), Some("Ridge Relay"));

        let written = mock.wire.lock().unwrap().written.clone();
        assert!(written[..WAKE_BYTES].iter().all(|&b| b == START2));
        iface.close().unwrap();
    }

    #[test]
    fn test_config_timeout_when_device_is_silent() {
        let mock = MockTransport::new(false);
        let config = LinkConfig {
            config_timeout: Duration::from_millis(50),
            ..test_config()
        };
        let result = SerialInterface::with_transport(Box::new(mock), config);
        assert!(matches!(result, Err(LinkError::Timeout)));
    }

    #[test]
    fn test_send_text_is_broadcast_text_packet() {
        let mock = MockTransport::new(true);
        let mut iface = SerialInterface::with_transport(Box::new(mock.clone()), test_config()).unwrap();
        iface.send_text("hello mesh").unwrap();

        let sent = mock.sent();
        let packet = packet_of(sent.last().unwrap());
        assert_eq!(packet.to, BROADCAST_ADDR);
        assert_eq!(packet.hop_limit, 3);
        assert_ne!(packet.id, 0);
        assert_eq!(packet.port(), Some(PortNum::TextMessageApp));
        assert_eq!(packet.decoded().unwrap().payload, b"hello mesh");
    }

    #[test]
    fn test_send_text_rejects_oversize_payload() {
        let mock = MockTransport::new(true);
        let mut iface = SerialInterface::with_transport(Box::new(mock), test_config()).unwrap();
        let text = "x".repeat(DATA_PAYLOAD_LEN + 1);
        assert!(matches!(
            iface.send_text(&text),
            Err(LinkError::PayloadTooLarge(234))
        ));
    }

    #[test]
    fn test_set_owner_goes_to_local_node() {
        let mock = MockTransport::new(true);
        let mut iface = SerialInterface::with_transport(Box::new(mock.clone()), test_config()).unwrap();
        iface.set_owner("Hilltop Base", "HTB1").unwrap();

        let sent = mock.sent();
        let packet = packet_of(sent.last().unwrap());
        assert_eq!(packet.to, LOCAL);
        assert_eq!(packet.port(), Some(PortNum::AdminApp));
        let admin = AdminMessage::decode(packet.decoded().unwrap().payload.as_slice()).unwrap();
        match admin.payload_variant {
            Some(admin_message::PayloadVariant::SetOwner(user)) => {
                assert_eq!(user.long_name, "Hilltop Base");
                assert_eq!(user.short_name, "HTB1");
            }
            None => panic!("missing set_owner"),
        }
    }

    #[test]
    fn test_send_position_broadcasts() {
        let mock = MockTransport::new(true);
        let mut iface = SerialInterface::with_transport(Box::new(mock.clone()), test_config()).unwrap();
        iface.send_position().unwrap();

        let sent = mock.sent();
        let packet = packet_of(sent.last().unwrap());
        assert_eq!(packet.to, BROADCAST_ADDR);
        assert_eq!(packet.port(), Some(PortNum::PositionApp));
        let position = Position::decode(packet.decoded().unwrap().payload.as_slice()).unwrap();
        assert!(position.time > 0);
    }

    #[test]
    fn test_callback_sees_packets_and_node_updates() {
        let mock = MockTransport::new(true);
        let mut iface = SerialInterface::with_transport(Box::new(mock.clone()), test_config()).unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        iface.set_receive_callback(Box::new(move |packet, nodes| {
            let name = nodes.get(packet.from).and_then(|n| n.long_name.clone());
            let _ = tx.lock().unwrap().send((packet.from, packet.port(), name));
        }));

        let user = User {
            long_name: "Valley Node".into(),
            short_name: "VAL1".into(),
            ..Default::default()
        };
        mock.inject(FromRadio {
            id: 10,
            payload_variant: Some(from_radio::PayloadVariant::Packet(MeshPacket {
                from: 55,
                payload_variant: Some(mesh_packet::PayloadVariant::Decoded(Data {
                    portnum: PortNum::NodeinfoApp as i32,
                    payload: user.encode_to_vec(),
                    ..Default::default()
                })),
                ..Default::default()
            })),
        });

        let (from, port, name) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(from, 55);
        assert_eq!(port, Some(PortNum::NodeinfoApp));
        assert_eq!(name.as_deref(), Some("Valley Node"));
        iface.close().unwrap();
    }

    #[test]
    fn test_close_sends_disconnect_and_blocks_sends() {
        let mock = MockTransport::new(true);
        let mut iface = SerialInterface::with_transport(Box::new(mock.clone()), test_config()).unwrap();
        iface.close().unwrap();

        let sent = mock.sent();
        assert_eq!(
            sent.last().unwrap().payload_variant,
            Some(to_radio::PayloadVariant::Disconnect(true))
        );
        assert!(!iface.is_alive());
        assert!(matches!(iface.send_text("late"), Err(LinkError::Closed)));
        assert!(iface.close().is_ok());
    }

    #[test]
    fn test_read_failure_marks_interface_dead() {
        let mock = MockTransport::new(true);
        let iface = SerialInterface::with_transport(Box::new(mock.clone()), test_config()).unwrap();
        mock.wire.lock().unwrap().fail_reads = true;

        let deadline = Instant::now() + Duration::from_secs(2);
        while iface.is_alive() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!iface.is_alive());
    }
}
