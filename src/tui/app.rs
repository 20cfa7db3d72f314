use std::sync::mpsc as std_mpsc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::warn;

use crate::inbound::InboundQueue;
use crate::receive::timestamp;
use crate::relay::{self, DisplayLog};

use super::message::{Failure, RadioCommand, RadioEvent};

/// Lines moved per PgUp/PgDn.
const SCROLL_PAGE: usize = 10;

/// Which panel receives key input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Port,
    Message,
    LongName,
    ShortName,
}

const FOCUS_CYCLE: [Focus; 4] = [Focus::Port, Focus::Message, Focus::LongName, Focus::ShortName];

impl Focus {
    pub fn next(self) -> Self {
        let idx = FOCUS_CYCLE.iter().position(|f| *f == self).unwrap_or(0);
        FOCUS_CYCLE[(idx + 1) % FOCUS_CYCLE.len()]
    }

    pub fn prev(self) -> Self {
        let idx = FOCUS_CYCLE.iter().position(|f| *f == self).unwrap_or(0);
        FOCUS_CYCLE[(idx + FOCUS_CYCLE.len() - 1) % FOCUS_CYCLE.len()]
    }
}

/// Link state shown in the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// A modal message, dismissed with Esc or Enter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

/// Application state.
pub struct App {
    pub link: LinkState,
    /// Port of the open session, or of the one being opened.
    pub link_port: Option<String>,
    pub ports: Vec<String>,
    /// `None` renders as "Select port".
    pub port_index: Option<usize>,
    pub focus: Focus,
    pub message_input: String,
    pub long_name_input: String,
    pub short_name_input: String,
    pub log: DisplayLog,
    /// Lines scrolled up from the tail; 0 follows new output.
    pub scroll_back: usize,
    pub notification: Option<Notification>,
    pub should_quit: bool,

    /// Text handed to the radio task and not yet confirmed.
    pending_send: Option<String>,
    inbound: InboundQueue,
    cmd_tx: std_mpsc::Sender<RadioCommand>,
}

impl App {
    pub fn new(cmd_tx: std_mpsc::Sender<RadioCommand>, inbound: InboundQueue) -> Self {
        let app = Self {
            link: LinkState::Disconnected,
            link_port: None,
            ports: Vec::new(),
            port_index: None,
            focus: Focus::Port,
            message_input: String::new(),
            long_name_input: String::new(),
            short_name_input: String::new(),
            log: DisplayLog::new(),
            scroll_back: 0,
            notification: None,
            should_quit: false,
            pending_send: None,
            inbound,
            cmd_tx,
        };
        app.send(RadioCommand::RefreshPorts);
        app
    }

    pub fn connected(&self) -> bool {
        self.link == LinkState::Connected
    }

    pub fn selected_port(&self) -> Option<&str> {
        self.port_index
            .and_then(|i| self.ports.get(i))
            .map(String::as_str)
    }

    /// Records dropped by the inbound queue since start.
    pub fn inbound_dropped(&self) -> u64 {
        self.inbound.dropped()
    }

    /// Periodic relay of inbound messages into the console log.
    pub fn on_tick(&mut self) {
        let added = relay::relay_step(self.connected(), &self.inbound, &mut self.log);
        // Keep a scrolled-back view anchored on the same lines.
        if self.scroll_back > 0 {
            self.scroll_back += added;
        }
    }

    fn send(&self, cmd: RadioCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            warn!("radio task is gone");
        }
    }

    fn log_line(&mut self, text: &str) {
        self.log.push(format!("[{}] {text}", timestamp()));
    }

    fn notify(&mut self, title: &str, message: impl Into<String>) {
        self.notification = Some(Notification {
            title: title.to_string(),
            message: message.into(),
        });
    }

    /// Handle a radio event from the radio task.
    pub fn handle_radio_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Ports(ports) => {
                let keep = self.selected_port().map(str::to_string);
                self.ports = ports;
                self.port_index = keep.and_then(|p| self.ports.iter().position(|x| *x == p));
            }
            RadioEvent::Connecting(port) => {
                self.link = LinkState::Connecting;
                self.link_port = Some(port);
            }
            RadioEvent::Connected { port, node_id } => {
                self.link = LinkState::Connected;
                self.log.clear();
                self.scroll_back = 0;
                self.log_line(&format!("Connected to {port}"));
                if let Some(id) = node_id {
                    self.log_line(&format!("Node ID: {id}"));
                }
                self.link_port = Some(port);
            }
            RadioEvent::Disconnected => {
                self.link = LinkState::Disconnected;
                self.link_port = None;
                self.pending_send = None;
                self.log_line("Connection closed");
            }
            RadioEvent::LinkLost => {
                self.link = LinkState::Disconnected;
                self.link_port = None;
                self.pending_send = None;
                self.log_line("Connection lost");
                self.notify("Connection Error", "Lost connection to device");
            }
            RadioEvent::Sent(text) => {
                // Drop only the confirmed text; anything typed since stays.
                if let Some(pending) = self.pending_send.take()
                    && let Some(rest) = self.message_input.strip_prefix(pending.as_str())
                {
                    self.message_input = rest.to_string();
                }
                self.log_line(&format!("> You: {text}"));
            }
            RadioEvent::IdentityUpdated {
                long_name,
                short_name,
            } => {
                self.log_line(&format!("Name updated: {long_name} ({short_name})"));
            }
            RadioEvent::Failed(failure) => self.handle_failure(failure),
        }
    }

    fn handle_failure(&mut self, failure: Failure) {
        self.pending_send = None;
        if self.link == LinkState::Connecting {
            // Only a connect is in flight while connecting; a failed connect
            // leaves no session, even if one was open before.
            self.link = LinkState::Disconnected;
            self.link_port = None;
        }
        if failure.log {
            self.log_line(&failure.message);
        }
        self.notify(failure.title, failure.message);
    }

    /// Handle a key event.
    pub fn handle_key(&mut self, key: KeyEvent) {
        // Ctrl+C always quits.
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit();
            return;
        }

        if self.notification.is_some() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter) {
                self.notification = None;
            }
            return;
        }

        match key.code {
            KeyCode::Tab => {
                self.focus = self.focus.next();
                return;
            }
            KeyCode::BackTab => {
                self.focus = self.focus.prev();
                return;
            }
            KeyCode::PageUp => {
                self.scroll_back = (self.scroll_back + SCROLL_PAGE).min(self.log.len());
                return;
            }
            KeyCode::PageDown => {
                self.scroll_back = self.scroll_back.saturating_sub(SCROLL_PAGE);
                return;
            }
            _ => {}
        }

        match self.focus {
            Focus::Port => self.handle_port_key(key.code),
            Focus::Message => {
                if key.code == KeyCode::Enter {
                    self.send_message();
                } else {
                    edit_field(&mut self.message_input, key.code);
                }
            }
            Focus::LongName | Focus::ShortName => {
                if key.code == KeyCode::Enter {
                    self.apply_identity();
                } else if self.focus == Focus::LongName {
                    edit_field(&mut self.long_name_input, key.code);
                } else {
                    edit_field(&mut self.short_name_input, key.code);
                }
            }
        }
    }

    fn handle_port_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Char('Q') => self.quit(),
            KeyCode::Char('r') | KeyCode::Char('R') => self.send(RadioCommand::RefreshPorts),
            KeyCode::Char('d') | KeyCode::Char('D') => self.send(RadioCommand::Disconnect),
            KeyCode::Enter | KeyCode::Char('c') | KeyCode::Char('C') => self.connect(),
            KeyCode::Left | KeyCode::Up => {
                self.port_index = match self.port_index {
                    None | Some(0) => None,
                    Some(i) => Some(i - 1),
                };
            }
            KeyCode::Right | KeyCode::Down => {
                let next = self.port_index.map_or(0, |i| i + 1);
                if next < self.ports.len() {
                    self.port_index = Some(next);
                }
            }
            _ => {}
        }
    }

    fn connect(&mut self) {
        if self.link == LinkState::Connecting {
            return;
        }
        match self.selected_port() {
            Some(port) => {
                let port = port.to_string();
                self.link = LinkState::Connecting;
                self.link_port = Some(port.clone());
                self.send(RadioCommand::Connect(port));
            }
            None => self.notify("Error", "No serial port selected"),
        }
    }

    fn send_message(&mut self) {
        // One send in flight at a time; blank input never leaves the UI.
        if self.pending_send.is_some() || self.message_input.trim().is_empty() {
            return;
        }
        let text = self.message_input.clone();
        self.pending_send = Some(text.clone());
        self.send(RadioCommand::SendText(text));
    }

    fn apply_identity(&mut self) {
        self.send(RadioCommand::SetIdentity {
            long_name: self.long_name_input.trim().to_string(),
            short_name: self.short_name_input.trim().to_string(),
        });
    }

    fn quit(&mut self) {
        self.send(RadioCommand::Quit);
        self.should_quit = true;
    }
}

fn edit_field(field: &mut String, code: KeyCode) {
    match code {
        KeyCode::Char(c) => field.push(c),
        KeyCode::Backspace => {
            field.pop();
        }
        KeyCode::Delete => field.clear(),
        _ => {}
    }
}
