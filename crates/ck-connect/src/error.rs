use ck_api_types::{ChainId, WalletId};
use ck_wallet_core::{RegistryError, WalletError};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] RegistryError),

    /// Failure reported by the wallet; the message is shown as-is.
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("a connection attempt is already in progress")]
    InProgress,

    #[error("connection attempt was cancelled")]
    Cancelled,

    #[error("no wallet is connected")]
    NotConnected,

    #[error("unknown wallet: {0}")]
    UnknownWallet(WalletId),

    #[error("chain {0} is not supported")]
    UnsupportedChain(ChainId),

    #[error("{0} is not a wrapper wallet")]
    NotWrapper(WalletId),

    #[error("{0} requires a connected personal wallet")]
    PersonalWalletRequired(WalletId),

    /// A wrapper is live on top of the personal session.
    #[error("{0} is connected; disconnect it before choosing another personal wallet")]
    WrapperActive(WalletId),

    /// Phase A of a wrapper connection failed; nothing is connected.
    #[error("{0}")]
    PersonalWallet(#[source] Box<ConnectError>),

    /// Phase B failed; the personal wallet stays connected.
    #[error("{0}")]
    WrapperFinalize(#[source] Box<ConnectError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPhase {
    Personal,
    Finalize,
}

impl ConnectPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for ConnectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConnectError {
    pub fn phase(&self) -> Option<ConnectPhase> {
        match self {
            Self::PersonalWallet(_) => Some(ConnectPhase::Personal),
            Self::WrapperFinalize(_) => Some(ConnectPhase::Finalize),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::PersonalWallet(inner) | Self::WrapperFinalize(inner) => inner.is_cancelled(),
            _ => false,
        }
    }

    pub(crate) fn in_phase(self, phase: ConnectPhase) -> Self {
        match self {
            Self::Cancelled | Self::InProgress => self,
            other if other.phase().is_some() => other,
            other => match phase {
                ConnectPhase::Personal => Self::PersonalWallet(Box::new(other)),
                ConnectPhase::Finalize => Self::WrapperFinalize(Box::new(other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_errors_show_the_wallet_message() {
        let err = ConnectError::from(WalletError::Sdk("User rejected".to_owned()))
            .in_phase(ConnectPhase::Finalize);
        assert_eq!(err.to_string(), "User rejected");
        assert_eq!(err.phase(), Some(ConnectPhase::Finalize));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn cancellation_is_never_wrapped() {
        let err = ConnectError::Cancelled.in_phase(ConnectPhase::Personal);
        assert!(matches!(err, ConnectError::Cancelled));
        assert_eq!(err.phase(), None);
    }
}
