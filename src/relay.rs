use crate::inbound::InboundQueue;

/// How often the UI runs [`relay_step`].
pub const RELAY_INTERVAL_MS: u64 = 100;

/// Append-only list of console lines.
#[derive(Debug, Clone, Default)]
pub struct DisplayLog {
    lines: Vec<String>,
}

impl DisplayLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Move inbound records into the display log.
///
/// No-op while disconnected. Otherwise takes exactly the records queued at
/// this moment, oldest first, and never waits for more. Returns how many
/// lines were appended.
pub fn relay_step(connected: bool, queue: &InboundQueue, log: &mut DisplayLog) -> usize {
    if !connected {
        return 0;
    }
    let records = queue.drain();
    let n = records.len();
    for record in records {
        log.push(record);
    }
    n
}
