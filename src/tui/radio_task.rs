use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc as tokio_mpsc;

use crate::connection::{ConnectionManager, Connector};
use crate::error::ConsoleError;

use super::message::{Failure, RadioCommand, RadioEvent};

/// How often an idle task checks that the reader still has the device.
const LINK_CHECK_INTERVAL: Duration = Duration::from_millis(500);

impl From<&ConsoleError> for Failure {
    fn from(e: &ConsoleError) -> Self {
        Self {
            title: e.title(),
            message: e.to_string(),
            log: !e.is_validation(),
        }
    }
}

/// Run the connection manager on a blocking thread.
///
/// Every call into the radio (open, send, set owner, close) blocks, so they
/// all happen here rather than on the UI task. Commands arrive on `cmd_rx`;
/// outcomes go back on `event_tx`. The session is closed on `Quit` or when
/// the UI hangs up.
pub fn radio_loop<C: Connector>(
    mut manager: ConnectionManager<C>,
    cmd_rx: std_mpsc::Receiver<RadioCommand>,
    event_tx: tokio_mpsc::UnboundedSender<RadioEvent>,
) {
    loop {
        let cmd = match cmd_rx.recv_timeout(LINK_CHECK_INTERVAL) {
            Ok(cmd) => cmd,
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                if !check_link(&mut manager, &event_tx) {
                    return;
                }
                continue;
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                manager.disconnect();
                return;
            }
        };

        if !check_link(&mut manager, &event_tx) {
            return;
        }

        if cmd == RadioCommand::Quit {
            if manager.disconnect() {
                let _ = event_tx.send(RadioEvent::Disconnected);
            }
            debug!("radio task exiting");
            return;
        }

        if !execute_command(&mut manager, cmd, &event_tx) {
            return;
        }
    }
}

/// Drop a session whose reader died. Returns `false` if the UI is gone.
fn check_link<C: Connector>(
    manager: &mut ConnectionManager<C>,
    event_tx: &tokio_mpsc::UnboundedSender<RadioEvent>,
) -> bool {
    if manager.is_connected() && !manager.is_alive() {
        warn!("lost the device on {}", manager.port().unwrap_or("?"));
        manager.disconnect();
        return event_tx.send(RadioEvent::LinkLost).is_ok();
    }
    true
}

/// Execute one command. Returns `false` if the UI is gone.
fn execute_command<C: Connector>(
    manager: &mut ConnectionManager<C>,
    cmd: RadioCommand,
    event_tx: &tokio_mpsc::UnboundedSender<RadioEvent>,
) -> bool {
    let event = match cmd {
        RadioCommand::RefreshPorts => match manager.list_ports() {
            Ok(ports) => RadioEvent::Ports(ports),
            Err(e) => RadioEvent::Failed(Failure::from(&e)),
        },
        RadioCommand::Connect(port) => {
            if event_tx.send(RadioEvent::Connecting(port.clone())).is_err() {
                return false;
            }
            match manager.connect(&port) {
                Ok(connected) => RadioEvent::Connected {
                    port: connected.port,
                    node_id: connected.node_id,
                },
                Err(e) => RadioEvent::Failed(Failure::from(&e)),
            }
        }
        RadioCommand::Disconnect => {
            if manager.disconnect() {
                RadioEvent::Disconnected
            } else {
                RadioEvent::Failed(Failure::from(&ConsoleError::NotConnected))
            }
        }
        RadioCommand::SendText(text) => match manager.send(&text) {
            Ok(Some(sent)) => RadioEvent::Sent(sent),
            Ok(None) => return true,
            Err(e) => RadioEvent::Failed(Failure::from(&e)),
        },
        RadioCommand::SetIdentity {
            long_name,
            short_name,
        } => match manager.set_identity(&long_name, &short_name) {
            Ok(()) => RadioEvent::IdentityUpdated {
                long_name,
                short_name,
            },
            Err(e) => RadioEvent::Failed(Failure::from(&e)),
        },
        RadioCommand::Quit => return true,
    };
    event_tx.send(event).is_ok()
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::connection::tests::{Call, MockConnector};
    use crate::inbound::InboundQueue;

    fn spawn() -> (
        std_mpsc::Sender<RadioCommand>,
        tokio_mpsc::UnboundedReceiver<RadioEvent>,
        MockConnector,
        thread::JoinHandle<()>,
    ) {
        let mock = MockConnector::default();
        let manager = ConnectionManager::new(mock.clone(), InboundQueue::new());
        let (cmd_tx, cmd_rx) = std_mpsc::channel();
        let (event_tx, event_rx) = tokio_mpsc::unbounded_channel();
        let handle = thread::spawn(move || radio_loop(manager, cmd_rx, event_tx));
        (cmd_tx, event_rx, mock, handle)
    }

    #[test]
    fn test_connect_send_quit() {
        let (cmd_tx, mut events, mock, handle) = spawn();
        cmd_tx.send(RadioCommand::Connect("COM3".into())).unwrap();
        cmd_tx.send(RadioCommand::SendText("hello".into())).unwrap();
        cmd_tx.send(RadioCommand::SendText("   ".into())).unwrap();
        cmd_tx.send(RadioCommand::Quit).unwrap();
        handle.join().unwrap();

        assert_eq!(events.blocking_recv(), Some(RadioEvent::Connecting("COM3".into())));
        assert_eq!(
            events.blocking_recv(),
            Some(RadioEvent::Connected {
                port: "COM3".into(),
                node_id: Some(0xDEAD_BEEF)
            })
        );
        assert_eq!(events.blocking_recv(), Some(RadioEvent::Sent("hello".into())));
        assert_eq!(events.blocking_recv(), Some(RadioEvent::Disconnected));
        assert_eq!(events.blocking_recv(), None);

        assert_eq!(
            mock.calls(),
            vec![
                Call::Open("COM3".into()),
                Call::SendText("hello".into()),
                Call::Close
            ]
        );
    }

    #[test]
    fn test_connect_failure_is_logged_failure() {
        let (cmd_tx, mut events, mock, handle) = spawn();
        mock.state.lock().unwrap().open_error = Some("device busy".into());
        cmd_tx.send(RadioCommand::Connect("COM3".into())).unwrap();
        cmd_tx.send(RadioCommand::Quit).unwrap();
        handle.join().unwrap();

        assert_eq!(events.blocking_recv(), Some(RadioEvent::Connecting("COM3".into())));
        assert_eq!(
            events.blocking_recv(),
            Some(RadioEvent::Failed(Failure {
                title: "Connection Error",
                message: "Connection failed: device busy".into(),
                log: true,
            }))
        );
        assert_eq!(events.blocking_recv(), None);
    }

    #[test]
    fn test_validation_failure_is_not_logged() {
        let (cmd_tx, mut events, _mock, handle) = spawn();
        cmd_tx
            .send(RadioCommand::SetIdentity {
                long_name: "Base".into(),
                short_name: "BASE".into(),
            })
            .unwrap();
        cmd_tx.send(RadioCommand::Quit).unwrap();
        handle.join().unwrap();

        assert_eq!(
            events.blocking_recv(),
            Some(RadioEvent::Failed(Failure {
                title: "Error",
                message: "Not connected to device".into(),
                log: false,
            }))
        );
    }

    #[test]
    fn test_refresh_ports() {
        let (cmd_tx, mut events, mock, handle) = spawn();
        mock.state.lock().unwrap().ports = vec!["COM1".into(), "COM3".into()];
        cmd_tx.send(RadioCommand::RefreshPorts).unwrap();
        cmd_tx.send(RadioCommand::Quit).unwrap();
        handle.join().unwrap();

        assert_eq!(
            events.blocking_recv(),
            Some(RadioEvent::Ports(vec!["COM1".into(), "COM3".into()]))
        );
    }

    #[test]
    fn test_hang_up_closes_session() {
        let (cmd_tx, mut events, mock, handle) = spawn();
        cmd_tx.send(RadioCommand::Connect("COM3".into())).unwrap();
        assert_eq!(events.blocking_recv(), Some(RadioEvent::Connecting("COM3".into())));
        assert!(matches!(events.blocking_recv(), Some(RadioEvent::Connected { .. })));
        drop(cmd_tx);
        handle.join().unwrap();
        assert_eq!(mock.calls().last(), Some(&Call::Close));
    }
}
