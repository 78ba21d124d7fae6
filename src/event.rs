//! Event and command classification.
//!
//! JS8Call names every API message with a dotted `type`. Some of those are
//! events we act on, some are echoes of our own commands that we ignore, and
//! the rest are commands from client applications to relay to a radio.

use std::fmt;

use crate::text::contains_ignore_case;

/// Informational echoes that carry nothing to log.
pub const ECHO_TYPES: &[&str] = &[
    "INBOX.MESSAGE",
    "INBOX.MESSAGES",
    "MODE.SPEED",
    "RIG.PTT",
    "RX.BAND_ACTIVITY",
    "RX.CALL_ACTIVITY",
    "RX.CALL_SELECTED",
    "RX.SPOT",
    "RX.TEXT",
    "STATION.CALLSIGN",
    "STATION.GRID",
    "STATION.INFO",
    "STATION.STATUS",
    "TX.FRAME",
    "TX.TEXT",
];

/// Commands a client may ask us to relay to a radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    InboxGetMessages,
    InboxStoreMessage,
    ModeGetSpeed,
    ModeSetSpeed,
    RigGetFreq,
    RigSetFreq,
    RxGetBandActivity,
    RxGetCallActivity,
    RxGetCallSelected,
    RxGetText,
    StationGetCallsign,
    StationGetGrid,
    StationSetGrid,
    StationGetInfo,
    StationSetInfo,
    StationGetStatus,
    StationSetStatus,
    TxSetText,
    TxSendMessage,
    /// Client connectivity test; logged, never sent to a radio.
    Test,
}

impl CommandKind {
    /// Every command, in catalog order.
    pub const ALL: [CommandKind; 20] = [
        CommandKind::InboxGetMessages,
        CommandKind::InboxStoreMessage,
        CommandKind::ModeGetSpeed,
        CommandKind::ModeSetSpeed,
        CommandKind::RigGetFreq,
        CommandKind::RigSetFreq,
        CommandKind::RxGetBandActivity,
        CommandKind::RxGetCallActivity,
        CommandKind::RxGetCallSelected,
        CommandKind::RxGetText,
        CommandKind::StationGetCallsign,
        CommandKind::StationGetGrid,
        CommandKind::StationSetGrid,
        CommandKind::StationGetInfo,
        CommandKind::StationSetInfo,
        CommandKind::StationGetStatus,
        CommandKind::StationSetStatus,
        CommandKind::TxSetText,
        CommandKind::TxSendMessage,
        CommandKind::Test,
    ];

    /// The API type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::InboxGetMessages => "INBOX.GET_MESSAGES",
            CommandKind::InboxStoreMessage => "INBOX.STORE_MESSAGE",
            CommandKind::ModeGetSpeed => "MODE.GET_SPEED",
            CommandKind::ModeSetSpeed => "MODE.SET_SPEED",
            CommandKind::RigGetFreq => "RIG.GET_FREQ",
            CommandKind::RigSetFreq => "RIG.SET_FREQ",
            CommandKind::RxGetBandActivity => "RX.GET_BAND_ACTIVITY",
            CommandKind::RxGetCallActivity => "RX.GET_CALL_ACTIVITY",
            CommandKind::RxGetCallSelected => "RX.GET_CALL_SELECTED",
            CommandKind::RxGetText => "RX.GET_TEXT",
            CommandKind::StationGetCallsign => "STATION.GET_CALLSIGN",
            CommandKind::StationGetGrid => "STATION.GET_GRID",
            CommandKind::StationSetGrid => "STATION.SET_GRID",
            CommandKind::StationGetInfo => "STATION.GET_INFO",
            CommandKind::StationSetInfo => "STATION.SET_INFO",
            CommandKind::StationGetStatus => "STATION.GET_STATUS",
            CommandKind::StationSetStatus => "STATION.SET_STATUS",
            CommandKind::TxSetText => "TX.SET_TEXT",
            CommandKind::TxSendMessage => "TX.SEND_MESSAGE",
            CommandKind::Test => "TEST.TEST",
        }
    }

    /// Human description for the activity log.
    pub fn description(&self) -> &'static str {
        match self {
            CommandKind::InboxGetMessages => "Inbox get message request",
            CommandKind::InboxStoreMessage => "Inbox store message request",
            CommandKind::ModeGetSpeed => "Get speed request",
            CommandKind::ModeSetSpeed => "Set speed request",
            CommandKind::RigGetFreq => "Get frequency request",
            CommandKind::RigSetFreq => "Set frequency request",
            CommandKind::RxGetBandActivity => "Get band activity request",
            CommandKind::RxGetCallActivity => "Get call activity request",
            CommandKind::RxGetCallSelected => "Get call selected request",
            CommandKind::RxGetText => "Get text request",
            CommandKind::StationGetCallsign => "Get station callsign request",
            CommandKind::StationGetGrid => "Get station grid request",
            CommandKind::StationSetGrid => "Set station grid request",
            CommandKind::StationGetInfo => "Get station info request",
            CommandKind::StationSetInfo => "Set station info request",
            CommandKind::StationGetStatus => "Get station status request",
            CommandKind::StationSetStatus => "Set station status request",
            CommandKind::TxSetText => "TX set text request",
            CommandKind::TxSendMessage => "TX send message request",
            CommandKind::Test => "Test message",
        }
    }

    /// Look up a command by its API type name.
    pub fn from_type(kind: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == kind)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an inbound message type means to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// An informational echo; logged and ignored.
    Echo,
    RigFreq,
    Close,
    LogQso,
    Ping,
    RxActivity,
    RxDirected,
    Command(CommandKind),
    Unknown,
}

impl EventKind {
    pub fn from_type(kind: &str) -> Self {
        match kind {
            "RIG.FREQ" => EventKind::RigFreq,
            "CLOSE" => EventKind::Close,
            "LOG.QSO" => EventKind::LogQso,
            "PING" => EventKind::Ping,
            "RX.ACTIVITY" => EventKind::RxActivity,
            "RX.DIRECTED" => EventKind::RxDirected,
            echo if ECHO_TYPES.contains(&echo) => EventKind::Echo,
            other => CommandKind::from_type(other)
                .map(EventKind::Command)
                .unwrap_or(EventKind::Unknown),
        }
    }
}

/// Handling branch for a directed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectedBranch {
    /// A question; resolved and logged but never forwarded.
    Query,
    Cq,
    Heartbeat,
    Snr,
    Info,
    Status,
    /// Anything else: a plain QSO.
    Qso,
}

impl DirectedBranch {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectedBranch::Query => "query",
            DirectedBranch::Cq => "cq",
            DirectedBranch::Heartbeat => "heartbeat",
            DirectedBranch::Snr => "snr",
            DirectedBranch::Info => "info",
            DirectedBranch::Status => "status",
            DirectedBranch::Qso => "qso",
        }
    }
}

impl fmt::Display for DirectedBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command tokens, tested in this order. The first one found wins, so a
/// query about SNR is still a query and a CQ that mentions SNR is a CQ.
const DIRECTED_RULES: &[(&str, DirectedBranch)] = &[
    ("?", DirectedBranch::Query),
    ("CQ", DirectedBranch::Cq),
    ("HEARTBEAT", DirectedBranch::Heartbeat),
    ("SNR", DirectedBranch::Snr),
    ("INFO", DirectedBranch::Info),
    ("STATUS", DirectedBranch::Status),
];

/// Pick the branch for a directed message's command text.
///
/// # Example
///
/// ```
/// use js8_monitor::event::{DirectedBranch, classify_directed};
///
/// assert_eq!(classify_directed(" SNR?"), DirectedBranch::Query);
/// assert_eq!(classify_directed(" CQ SNR"), DirectedBranch::Cq);
/// assert_eq!(classify_directed(" MSG"), DirectedBranch::Qso);
/// ```
pub fn classify_directed(command: &str) -> DirectedBranch {
    DIRECTED_RULES
        .iter()
        .find(|(token, _)| contains_ignore_case(command, token))
        .map(|(_, branch)| *branch)
        .unwrap_or(DirectedBranch::Qso)
}
