pub mod config;
pub mod segment;
pub mod tcb;

pub use config::TcpConfig;
pub use segment::{TcpFlags, TcpOption, TcpSegment};
pub use tcb::{seq_cmp, RetransmitItem, SackBlock, SynQueueItem, Tcb, TcbEvent, TcpState};
