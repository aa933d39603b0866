//! Wallet connection flow: the session slot, screen navigation, the two-phase
//! wrapper protocol and the modal / embed shell hosting them.

mod error;
mod navigator;
mod session;
mod shell;
mod wrapper;

pub use error::{ConnectError, ConnectPhase};
pub use navigator::{Screen, ScreenNavigator};
pub use session::{ActiveWallet, ConnectionSession, LastConnected, SessionEvent};
pub use shell::{ConnectShell, DEFAULT_CLOSE_DELAY, ShellOutcome, ShellVariant, View};
pub use wrapper::{WrapperFlow, WrapperPhase};
