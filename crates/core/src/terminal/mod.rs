//! Terminal multiplexer: PTY Host (C1), External Session Adapter (C2),
//! Window Registry (C3), Output Fanout (C4), and Attachment Coordinator (C5).

pub mod coordinator;
pub mod fanout;
pub mod ids;
pub mod pty_host;
pub mod registry;
pub mod scrollback;
pub mod session_adapter;
pub mod traits;
pub mod window;

pub use coordinator::Coordinator;
pub use fanout::{ControlEvent, Fanout, FanoutMsg};
pub use ids::WindowId;
pub use pty_host::DirectPty;
pub use registry::{CreateSpec, Registry};
pub use scrollback::Scrollback;
pub use session_adapter::{MultiplexedPty, TmuxControl};
pub use traits::{ExitStatus, Host, MockHost, TerminalConfig};
pub use window::{Source, Window, WindowState, WindowSummary};
