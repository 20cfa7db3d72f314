/// Commands sent from the TUI to the radio task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCommand {
    RefreshPorts,
    Connect(String),
    Disconnect,
    SendText(String),
    SetIdentity { long_name: String, short_name: String },
    Quit,
}

/// A failed command, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub title: &'static str,
    pub message: String,
    /// Also write the failure to the console log.
    pub log: bool,
}

/// Events sent from the radio task to the TUI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    Ports(Vec<String>),
    Connecting(String),
    Connected { port: String, node_id: Option<u32> },
    Disconnected,
    /// The session ended without being asked to.
    LinkLost,
    Sent(String),
    IdentityUpdated { long_name: String, short_name: String },
    Failed(Failure),
}
