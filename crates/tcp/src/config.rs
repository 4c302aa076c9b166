/// Compile-time sizing knobs from §6, modeled as `pub const`s rather than
/// Cargo features.
pub const TCP_TICK_INTERVAL_MS: u64 = 100;

pub const TCP_MAX_MSS: u16 = 1430;
pub const TCP_MIN_MSS: u16 = 128;
pub const TCP_DEFAULT_MSS: u16 = 536;
pub const TCP_MAX_HEADER_LENGTH: usize = 60;

pub const TCP_DEFAULT_TX_BUFFER_SIZE: usize = 2860;
pub const TCP_MAX_TX_BUFFER_SIZE: usize = 11440;
pub const TCP_DEFAULT_RX_BUFFER_SIZE: usize = 2860;
pub const TCP_MAX_RX_BUFFER_SIZE: usize = 11440;

pub const TCP_SYN_QUEUE_SIZE: usize = 4;

pub const TCP_MAX_RETRIES: u32 = 5;
pub const TCP_INITIAL_RTO_MS: u64 = 1000;
pub const TCP_MIN_RTO_MS: u64 = 1000;
pub const TCP_MAX_RTO_MS: u64 = 60000;

pub const TCP_FAST_RETRANSMIT_THRES: u32 = 3;
/// Congestion window after the handshake completes, in units of `mss`.
pub const TCP_INITIAL_WINDOW: u32 = 3;
/// Congestion window after an RTO-detected loss, in units of `mss`.
pub const TCP_LOSS_WINDOW: u32 = 1;

pub const TCP_DEFAULT_PROBE_INTERVAL_MS: u64 = 1000;
pub const TCP_MAX_PROBE_INTERVAL_MS: u64 = 60000;

pub const TCP_FIN_WAIT_2_TIMER_MS: u64 = 4000;
pub const TCP_2MSL_TIMER_MS: u64 = 4000;

/// Open Question decision (§12): SACK is a runtime-configurable, default-on
/// `TcpConfig` flag rather than a compiled-in/out feature.
pub const TCP_SACK_SUPPORT_DEFAULT: bool = true;
pub const TCP_MAX_SACK_BLOCKS: usize = 4;

/// Runtime-tunable subset of the above, gathered per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpConfig {
    pub tx_buffer_size: usize,
    pub rx_buffer_size: usize,
    pub max_retries: u32,
    pub sack_enabled: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            tx_buffer_size: TCP_DEFAULT_TX_BUFFER_SIZE,
            rx_buffer_size: TCP_DEFAULT_RX_BUFFER_SIZE,
            max_retries: TCP_MAX_RETRIES,
            sack_enabled: TCP_SACK_SUPPORT_DEFAULT,
        }
    }
}
