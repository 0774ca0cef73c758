use serde::Serialize;

use crate::flow::observer::SessionSnapshot;

/// Which screen the auth entry point should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    Checking,
    NeedsSignIn,
    NeedsConnect,
    /// Terminal: the browser is sent to the dashboard.
    Redirecting,
}

/// Page-level state machine for one landing on the auth entry point.
///
/// Decisions are made from the snapshot passed to [`FlowController::observe`],
/// never from a session remembered earlier.
#[derive(Debug, Clone)]
pub struct FlowController {
    state: FlowState,
    connect_requested: bool,
    token_landing: bool,
    exchange_in_flight: bool,
    connected: bool,
    signed_in_during_visit: bool,
}

impl FlowController {
    /// `connect_requested` is the `gmailConnect=true` flag; `token_landing`
    /// says the fragment carried a usable access token.
    pub fn new(connect_requested: bool, token_landing: bool) -> Self {
        Self {
            state: FlowState::Checking,
            connect_requested,
            token_landing,
            exchange_in_flight: false,
            connected: false,
            signed_in_during_visit: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state == FlowState::Redirecting
    }

    /// The fragment's tokens are being exchanged and stored.
    pub fn begin_token_exchange(&mut self) {
        self.exchange_in_flight = true;
    }

    /// The exchange finished; `connected` is true when the record was stored.
    pub fn finish_token_exchange(&mut self, connected: bool) {
        self.exchange_in_flight = false;
        self.connected = connected;
    }

    /// Re-evaluates the state against the latest session snapshot.
    pub fn observe(&mut self, snapshot: &SessionSnapshot) -> FlowState {
        self.state = self.next_state(snapshot);
        self.state
    }

    fn next_state(&mut self, snapshot: &SessionSnapshot) -> FlowState {
        if self.is_terminal() || self.connected {
            return FlowState::Redirecting;
        }

        if snapshot.is_loading || self.exchange_in_flight {
            return self.state;
        }

        if !snapshot.is_authenticated() {
            return FlowState::NeedsSignIn;
        }

        if self.state == FlowState::NeedsSignIn {
            self.signed_in_during_visit = true;
        }

        let already_authenticated = !self.signed_in_during_visit;
        if already_authenticated && !self.token_landing && !self.connect_requested {
            FlowState::Redirecting
        } else {
            FlowState::NeedsConnect
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{Session, SessionUser};
    use uuid::Uuid;

    fn loading() -> SessionSnapshot {
        SessionSnapshot {
            session: None,
            is_loading: true,
        }
    }

    fn signed_out() -> SessionSnapshot {
        SessionSnapshot {
            session: None,
            is_loading: false,
        }
    }

    fn signed_in() -> SessionSnapshot {
        let user = SessionUser {
            id: Uuid::new_v4(),
            email: None,
        };
        SessionSnapshot {
            session: Some(Session::new(user, chrono::Duration::hours(1))),
            is_loading: false,
        }
    }

    #[test]
    fn checking_while_loading() {
        let mut controller = FlowController::new(false, false);
        assert_eq!(controller.observe(&loading()), FlowState::Checking);
    }

    #[test]
    fn no_session_needs_sign_in() {
        let mut controller = FlowController::new(false, false);
        controller.observe(&loading());
        assert_eq!(controller.observe(&signed_out()), FlowState::NeedsSignIn);
    }

    #[test]
    fn existing_session_redirects() {
        let mut controller = FlowController::new(false, false);
        assert_eq!(controller.observe(&signed_in()), FlowState::Redirecting);
    }

    #[test]
    fn connect_flag_suppresses_redirect() {
        let mut controller = FlowController::new(true, false);
        assert_eq!(controller.observe(&signed_in()), FlowState::NeedsConnect);
    }

    #[test]
    fn sign_in_during_visit_moves_to_connect() {
        let mut controller = FlowController::new(false, false);
        assert_eq!(controller.observe(&signed_out()), FlowState::NeedsSignIn);
        assert_eq!(controller.observe(&signed_in()), FlowState::NeedsConnect);
        assert_eq!(controller.observe(&signed_in()), FlowState::NeedsConnect);
    }

    #[test]
    fn sign_out_from_connect_prompt_needs_sign_in() {
        let mut controller = FlowController::new(true, false);
        controller.observe(&signed_in());
        assert_eq!(controller.observe(&signed_out()), FlowState::NeedsSignIn);
    }

    #[test]
    fn successful_exchange_redirects_and_stays_terminal() {
        let mut controller = FlowController::new(false, true);
        controller.begin_token_exchange();
        assert_eq!(controller.observe(&signed_in()), FlowState::Checking);

        controller.finish_token_exchange(true);
        assert_eq!(controller.observe(&signed_in()), FlowState::Redirecting);
        assert_eq!(controller.observe(&signed_out()), FlowState::Redirecting);
        assert!(controller.is_terminal());
    }

    #[test]
    fn failed_exchange_never_redirects() {
        let mut controller = FlowController::new(false, true);
        controller.begin_token_exchange();
        controller.finish_token_exchange(false);

        assert_eq!(controller.observe(&signed_in()), FlowState::NeedsConnect);
        assert_eq!(controller.observe(&signed_out()), FlowState::NeedsSignIn);
    }
}
