//! Transition tables for the session and shard machines.
//!
//! The tables are pure: they only decide whether an event is legal from a state
//! and where it leads. Persisting, message selection and scope cancellation are
//! done by the machine objects after a transition is accepted.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("event {event} inappropriate in current state {state}")]
pub struct TransitionError {
    pub state: String,
    pub event: String,
}

impl TransitionError {
    fn new(state: impl fmt::Display, event: impl fmt::Display) -> Self {
        Self {
            state: state.to_string(),
            event: event.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Init,
    Submit,
    Contract,
    ContractFileMetaSigned,
    ContractFileMetaAdded,
    WaitUpload,
    WaitUploadReqSigned,
    Pay,
    Complete,
    Error,
}

impl SessionState {
    pub const ALL: [SessionState; 10] = [
        SessionState::Init,
        SessionState::Submit,
        SessionState::Contract,
        SessionState::ContractFileMetaSigned,
        SessionState::ContractFileMetaAdded,
        SessionState::WaitUpload,
        SessionState::WaitUploadReqSigned,
        SessionState::Pay,
        SessionState::Complete,
        SessionState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Init => "init",
            SessionState::Submit => "submit",
            SessionState::Contract => "contract",
            SessionState::ContractFileMetaSigned => "contract:file-meta-signed",
            SessionState::ContractFileMetaAdded => "contract:file-meta-added",
            SessionState::WaitUpload => "wait-upload",
            SessionState::WaitUploadReqSigned => "wait-upload:req-signed",
            SessionState::Pay => "pay",
            SessionState::Complete => "complete",
            SessionState::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|state| state.as_str() == s)
    }

    /// Sub-states such as `contract:file-meta-signed` share their prefix's base.
    pub fn base(&self) -> &'static str {
        let name = self.as_str();
        match name.find(':') {
            Some(pos) => &name[..pos],
            None => name,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    ToSubmit,
    ToContract,
    ToFileMetaSigned,
    ToFileMetaAdded,
    ToWaitUpload,
    ToWaitUploadReqSigned,
    ToPay,
    ToComplete,
    ToError,
}

impl SessionEvent {
    pub const ALL: [SessionEvent; 9] = [
        SessionEvent::ToSubmit,
        SessionEvent::ToContract,
        SessionEvent::ToFileMetaSigned,
        SessionEvent::ToFileMetaAdded,
        SessionEvent::ToWaitUpload,
        SessionEvent::ToWaitUploadReqSigned,
        SessionEvent::ToPay,
        SessionEvent::ToComplete,
        SessionEvent::ToError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEvent::ToSubmit => "toSubmit",
            SessionEvent::ToContract => "toContract",
            SessionEvent::ToFileMetaSigned => "toFileMetaSigned",
            SessionEvent::ToFileMetaAdded => "toFileMetaAdded",
            SessionEvent::ToWaitUpload => "toWaitUpload",
            SessionEvent::ToWaitUploadReqSigned => "toWaitUploadReqSigned",
            SessionEvent::ToPay => "toPay",
            SessionEvent::ToComplete => "toComplete",
            SessionEvent::ToError => "toError",
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTransition {
    pub from: SessionState,
    pub to: SessionState,
    /// Reaching `complete` or `error` ends the session's execution scope.
    pub cancel_scope: bool,
}

pub fn apply_session_event(
    state: SessionState,
    event: SessionEvent,
) -> Result<SessionTransition, TransitionError> {
    use SessionEvent as E;
    use SessionState as S;

    let to = match (state, event) {
        (S::Init, E::ToSubmit) => S::Submit,
        (S::Submit, E::ToContract) => S::Contract,
        (S::Contract, E::ToFileMetaSigned) => S::ContractFileMetaSigned,
        (S::ContractFileMetaSigned, E::ToFileMetaAdded) => S::ContractFileMetaAdded,
        (S::ContractFileMetaAdded, E::ToWaitUpload) => S::WaitUpload,
        (S::WaitUpload, E::ToWaitUploadReqSigned) => S::WaitUploadReqSigned,
        (S::WaitUploadReqSigned, E::ToPay) => S::Pay,
        (S::Pay, E::ToComplete) => S::Complete,
        (s, E::ToError) if !s.is_terminal() => S::Error,
        (s, e) => return Err(TransitionError::new(s, e)),
    };

    Ok(SessionTransition {
        from: state,
        to,
        cancel_scope: to.is_terminal(),
    })
}

/// Human-readable progress line stored with each status record.
pub fn progress_message(state: SessionState) -> &'static str {
    match state.base() {
        "init" => "Initializing.",
        "submit" => "Searching for recommended hosts...",
        "contract" => "Preparing meta-data and add to blockchain.",
        "wait-upload" => "Waiting for hosts to confirm storage.",
        "pay" => "Paying hosts for confirmed storage.",
        "complete" => "Upload complete.",
        _ => "Upload failed.",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenterShardState {
    Init,
    Contract,
    Error,
}

impl RenterShardState {
    pub const ALL: [RenterShardState; 3] = [
        RenterShardState::Init,
        RenterShardState::Contract,
        RenterShardState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RenterShardState::Init => "init",
            RenterShardState::Contract => "contract",
            RenterShardState::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|state| state.as_str() == s)
    }
}

impl fmt::Display for RenterShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenterShardEvent {
    ToContract,
    ToError,
}

impl fmt::Display for RenterShardEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RenterShardEvent::ToContract => "toContract",
            RenterShardEvent::ToError => "toError",
        })
    }
}

pub fn apply_renter_shard_event(
    state: RenterShardState,
    event: RenterShardEvent,
) -> Result<RenterShardState, TransitionError> {
    match (state, event) {
        (RenterShardState::Init, RenterShardEvent::ToContract) => Ok(RenterShardState::Contract),
        (RenterShardState::Init, RenterShardEvent::ToError) => Ok(RenterShardState::Error),
        (s, e) => Err(TransitionError::new(s, e)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostShardState {
    Init,
    Contract,
    Paid,
    Complete,
    Error,
}

impl HostShardState {
    pub const ALL: [HostShardState; 5] = [
        HostShardState::Init,
        HostShardState::Contract,
        HostShardState::Paid,
        HostShardState::Complete,
        HostShardState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HostShardState::Init => "init",
            HostShardState::Contract => "contract",
            HostShardState::Paid => "paid",
            HostShardState::Complete => "complete",
            HostShardState::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|state| state.as_str() == s)
    }
}

impl fmt::Display for HostShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostShardEvent {
    ToContract,
    ToPaid,
    ToComplete,
    ToError,
}

impl fmt::Display for HostShardEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HostShardEvent::ToContract => "toContract",
            HostShardEvent::ToPaid => "toPaid",
            HostShardEvent::ToComplete => "toComplete",
            HostShardEvent::ToError => "toError",
        })
    }
}

pub fn apply_host_shard_event(
    state: HostShardState,
    event: HostShardEvent,
) -> Result<HostShardState, TransitionError> {
    use HostShardEvent as E;
    use HostShardState as S;

    match (state, event) {
        (S::Init, E::ToContract) => Ok(S::Contract),
        (S::Contract, E::ToPaid) => Ok(S::Paid),
        (S::Paid, E::ToComplete) => Ok(S::Complete),
        (S::Init | S::Contract, E::ToError) => Ok(S::Error),
        (s, e) => Err(TransitionError::new(s, e)),
    }
}
