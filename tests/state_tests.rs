#[cfg(test)]
mod tests {
    use shard_market::config::Config;
    use shard_market::session::states::{
        apply_host_shard_event, apply_renter_shard_event, apply_session_event, progress_message,
        HostShardEvent, HostShardState, RenterShardEvent, RenterShardState, SessionEvent,
        SessionState,
    };

    const FORWARD: [(SessionState, SessionEvent, SessionState); 8] = [
        (SessionState::Init, SessionEvent::ToSubmit, SessionState::Submit),
        (SessionState::Submit, SessionEvent::ToContract, SessionState::Contract),
        (
            SessionState::Contract,
            SessionEvent::ToFileMetaSigned,
            SessionState::ContractFileMetaSigned,
        ),
        (
            SessionState::ContractFileMetaSigned,
            SessionEvent::ToFileMetaAdded,
            SessionState::ContractFileMetaAdded,
        ),
        (
            SessionState::ContractFileMetaAdded,
            SessionEvent::ToWaitUpload,
            SessionState::WaitUpload,
        ),
        (
            SessionState::WaitUpload,
            SessionEvent::ToWaitUploadReqSigned,
            SessionState::WaitUploadReqSigned,
        ),
        (SessionState::WaitUploadReqSigned, SessionEvent::ToPay, SessionState::Pay),
        (SessionState::Pay, SessionEvent::ToComplete, SessionState::Complete),
    ];

    fn expected_session_target(state: SessionState, event: SessionEvent) -> Option<SessionState> {
        if event == SessionEvent::ToError {
            return (!state.is_terminal()).then_some(SessionState::Error);
        }
        FORWARD
            .iter()
            .find(|(from, ev, _)| *from == state && *ev == event)
            .map(|(_, _, to)| *to)
    }

    #[test]
    fn test_session_table_is_exhaustive() {
        for state in SessionState::ALL {
            for event in SessionEvent::ALL {
                let result = apply_session_event(state, event);
                match expected_session_target(state, event) {
                    Some(to) => {
                        let transition = result.unwrap();
                        assert_eq!(transition.from, state);
                        assert_eq!(transition.to, to);
                        assert_eq!(transition.cancel_scope, to.is_terminal());
                    }
                    None => {
                        let err = result.unwrap_err();
                        assert_eq!(err.state, state.as_str());
                        assert_eq!(err.event, event.as_str());
                    }
                }
            }
        }
    }

    #[test]
    fn test_terminal_events_are_rejected_twice() {
        for terminal in [SessionState::Complete, SessionState::Error] {
            assert!(apply_session_event(terminal, SessionEvent::ToError).is_err());
            assert!(apply_session_event(terminal, SessionEvent::ToComplete).is_err());
        }
    }

    #[test]
    fn test_transition_error_message() {
        let err = apply_session_event(SessionState::Init, SessionEvent::ToPay).unwrap_err();
        assert_eq!(
            err.to_string(),
            "event toPay inappropriate in current state init"
        );
    }

    #[test]
    fn test_state_names_round_trip() {
        for state in SessionState::ALL {
            assert_eq!(SessionState::parse(state.as_str()), Some(state));
        }
        assert_eq!(SessionState::parse("paid"), None);
        assert_eq!(SessionState::ContractFileMetaAdded.base(), "contract");
        assert_eq!(SessionState::WaitUploadReqSigned.base(), "wait-upload");
    }

    #[test]
    fn test_sub_states_share_progress_message() {
        assert_eq!(
            progress_message(SessionState::ContractFileMetaSigned),
            progress_message(SessionState::Contract)
        );
        assert_eq!(
            progress_message(SessionState::Contract),
            "Preparing meta-data and add to blockchain."
        );
        assert_eq!(
            progress_message(SessionState::Submit),
            "Searching for recommended hosts..."
        );
    }

    #[test]
    fn test_renter_shard_table() {
        use RenterShardEvent as E;
        use RenterShardState as S;
        assert_eq!(apply_renter_shard_event(S::Init, E::ToContract), Ok(S::Contract));
        assert_eq!(apply_renter_shard_event(S::Init, E::ToError), Ok(S::Error));
        for state in [S::Contract, S::Error] {
            assert!(apply_renter_shard_event(state, E::ToContract).is_err());
            assert!(apply_renter_shard_event(state, E::ToError).is_err());
        }
    }

    #[test]
    fn test_host_shard_table_only_moves_forward() {
        use HostShardEvent as E;
        use HostShardState as S;
        let events = [E::ToContract, E::ToPaid, E::ToComplete, E::ToError];
        for state in S::ALL {
            for event in events {
                let expected = match (state, event) {
                    (S::Init, E::ToContract) => Some(S::Contract),
                    (S::Contract, E::ToPaid) => Some(S::Paid),
                    (S::Paid, E::ToComplete) => Some(S::Complete),
                    (S::Init | S::Contract, E::ToError) => Some(S::Error),
                    _ => None,
                };
                assert_eq!(apply_host_shard_event(state, event).ok(), expected);
            }
        }
    }

    #[test]
    fn test_quorum_threshold() {
        let config = Config::default();
        for n in 0..=20 {
            assert_eq!(config.quorum_threshold(n), n);
        }
        for n in [21, 50, 1000] {
            assert_eq!(config.quorum_threshold(n), 20);
        }
    }
}
