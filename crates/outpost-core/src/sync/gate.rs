use crate::auth::AuthSnapshot;

/// Everything the gate depends on, captured at one moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateInputs {
    pub auth: AuthSnapshot,
    pub online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedReason {
    SignedOut,
    NotAdmin,
    Offline,
}

impl std::fmt::Display for ClosedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClosedReason::SignedOut => write!(f, "signed out"),
            ClosedReason::NotAdmin => write!(f, "not an admin"),
            ClosedReason::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Auth provider has not finished loading
    AwaitingAuth,
    Closed(ClosedReason),
    Open,
}

impl GateInputs {
    pub fn new(auth: AuthSnapshot, online: bool) -> Self {
        Self { auth, online }
    }

    pub fn decide(&self) -> GateDecision {
        if !self.auth.is_loaded {
            GateDecision::AwaitingAuth
        } else if !self.auth.is_signed_in {
            GateDecision::Closed(ClosedReason::SignedOut)
        } else if !self.auth.is_admin() {
            GateDecision::Closed(ClosedReason::NotAdmin)
        } else if !self.online {
            GateDecision::Closed(ClosedReason::Offline)
        } else {
            GateDecision::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.decide() == GateDecision::Open
    }
}
