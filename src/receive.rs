//! Turns packets delivered by the radio reader into console lines.

use chrono::Local;
use log::{debug, error};
use mesh_link::{MeshPacket, NodeDb, PortNum, ReceiveCallback};

use crate::error::ConsoleError;
use crate::inbound::InboundQueue;

/// `HH:MM:SS` in local time, the prefix of every console line.
pub fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Best-effort display name: long name, then short name with the id, then
/// the bare id.
pub fn sender_label(sender: u32, nodes: &NodeDb) -> String {
    if let Some(node) = nodes.get(sender) {
        if let Some(long) = node.long_name.as_deref() {
            return long.to_string();
        }
        if let Some(short) = node.short_name.as_deref() {
            return format!("{short} (Node {sender})");
        }
    }
    format!("Node {sender}")
}

pub fn format_inbound(timestamp: &str, sender: &str, text: &str) -> String {
    format!("[{timestamp}] < {sender}: {text}")
}

/// Decode a text message packet into a console line.
///
/// Returns `Ok(None)` for packets on any other port.
pub fn decode_text_message(
    packet: &MeshPacket,
    nodes: &NodeDb,
    timestamp: &str,
) -> Result<Option<String>, ConsoleError> {
    if packet.port() != Some(PortNum::TextMessageApp) {
        return Ok(None);
    }
    let Some(data) = packet.decoded() else {
        return Ok(None);
    };
    let text = std::str::from_utf8(&data.payload)
        .map_err(|e| ConsoleError::Decode(format!("text from Node {}: {e}", packet.from)))?;
    let sender = sender_label(packet.from, nodes);
    Ok(Some(format_inbound(timestamp, &sender, text)))
}

/// Build the callback handed to the radio interface.
///
/// Runs on the reader thread, so it only formats and queues; failures become
/// inline records instead of propagating.
pub fn receive_callback(queue: InboundQueue) -> ReceiveCallback {
    Box::new(move |packet, nodes| {
        let ts = timestamp();
        match decode_text_message(packet, nodes, &ts) {
            Ok(Some(line)) => {
                debug!("formatted message: {line}");
                queue.push(line);
            }
            Ok(None) => {}
            Err(e) => {
                error!("{e}");
                queue.push(format!("[{ts}] {e}"));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use mesh_link::proto::{Data, NodeInfo, User, mesh_packet};

    use super::*;

    fn text_packet(from: u32, payload: &[u8]) -> MeshPacket {
        MeshPacket {
            from,
            payload_variant: Some(mesh_packet::PayloadVariant::Decoded(Data {
                portnum: PortNum::TextMessageApp as i32,
                payload: payload.to_vec(),
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    fn db_with(num: u32, long: &str, short: &str) -> NodeDb {
        let mut db = NodeDb::new();
        db.update_from_node_info(&NodeInfo {
            num,
            user: Some(User {
                long_name: long.into(),
                short_name: short.into(),
                ..Default::default()
            }),
            ..Default::default()
        });
        db
    }

    #[test]
    fn test_unknown_sender_uses_node_id() {
        let line = decode_text_message(&text_packet(123, b"hello"), &NodeDb::new(), "12:34:56")
            .unwrap()
            .unwrap();
        assert_eq!(line, "[12:34:56] < Node 123: hello");
    }

    #[test]
    fn test_long_name_wins() {
        let db = db_with(5, "Fire Tower", "FT01");
        assert_eq!(sender_label(5, &db), "Fire Tower");
    }

    #[test]
    fn test_short_name_fallback() {
        let db = db_with(5, "", "FT01");
        assert_eq!(sender_label(5, &db), "FT01 (Node 5)");
    }

    #[test]
    fn test_known_node_without_names() {
        let db = db_with(5, "", "");
        assert_eq!(sender_label(5, &db), "Node 5");
    }

    #[test]
    fn test_other_ports_are_ignored() {
        let mut packet = text_packet(1, b"x");
        if let Some(mesh_packet::PayloadVariant::Decoded(data)) = &mut packet.payload_variant {
            data.portnum = PortNum::PositionApp as i32;
        }
        assert!(decode_text_message(&packet, &NodeDb::new(), "00:00:00").unwrap().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let err = decode_text_message(&text_packet(9, &[0xFF, 0xFE]), &NodeDb::new(), "00:00:00")
            .unwrap_err();
        assert!(matches!(err, ConsoleError::Decode(_)));
        assert!(err.to_string().starts_with("Receive error: text from Node 9"));
    }

    #[test]
    fn test_callback_queues_lines_and_errors() {
        let queue = InboundQueue::new();
        let cb = receive_callback(queue.clone());
        let db = db_with(42, "Summit", "SMT1");

        cb(&text_packet(42, b"first"), &db);
        cb(&text_packet(42, &[0xC0]), &db);
        cb(&text_packet(7, b"third"), &db);

        let lines = queue.drain();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("] < Summit: first"));
        assert!(lines[1].contains("Receive error"));
        assert!(lines[2].ends_with("] < Node 7: third"));
    }

    #[test]
    fn test_timestamp_shape() {
        let ts = timestamp();
        assert_eq!(ts.len(), 8);
        assert_eq!(&ts[2..3], ":");
        assert_eq!(&ts[5..6], ":");
    }
}
