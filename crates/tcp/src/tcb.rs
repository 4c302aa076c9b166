/// TCP control block and finite state machine (§4.7), grounded on
/// `cyclone_tcp/core/tcp.h`'s `TcpControlBlock`/`TcpState` and
/// `cyclone_tcp/core/tcp_ip_stack.c`'s tick-driven timer processing.
use crate::config::{TcpConfig, TCP_FAST_RETRANSMIT_THRES, TCP_MAX_PROBE_INTERVAL_MS, TCP_MAX_RTO_MS,
    TCP_MIN_RTO_MS, TCP_SYN_QUEUE_SIZE};
use crate::segment::{TcpFlags, TcpOption, TcpSegment};
use common::StackError;

/// Wrap-safe sequence comparison, `cyclone_tcp`'s `TCP_CMP_SEQ(a, b)`.
/// Positive when `a` is ahead of `b` modulo 2^32.
pub fn seq_cmp(a: u32, b: u32) -> i32 {
    a.wrapping_sub(b) as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    CloseWait,
    LastAck,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SackBlock {
    pub left_edge: u32,
    pub right_edge: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitItem {
    pub seq: u32,
    pub length: u32,
    pub retransmitted: bool,
    pub sacked: bool,
    pub ttl: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynQueueItem {
    pub src_port: u16,
    pub isn: u32,
    pub mss: u16,
}

/// Outcome of feeding a segment into the state machine, used by the
/// socket facade to decide whether to wake blocked callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcbEvent {
    None,
    EstablishedConnection,
    DataAvailable(usize),
    PeerClosed,
    Reset(StackError),
    Closed,
}

/// TCP Control Block.
#[derive(Debug, Clone)]
pub struct Tcb {
    pub state: TcpState,
    pub config: TcpConfig,

    pub mss: u16,
    pub iss: u32,
    pub irs: u32,

    pub snd_una: u32,
    pub snd_nxt: u32,
    pub snd_wnd: u16,
    pub max_snd_wnd: u16,
    pub snd_wl1: u32,
    pub snd_wl2: u32,

    pub rcv_nxt: u32,
    pub rcv_wnd: u16,

    pub rtt_busy: bool,
    pub rtt_seq_num: u32,
    pub rtt_start_ms: u64,
    pub srtt: Option<u64>,
    pub rttvar: u64,
    pub rto_ms: u64,

    pub cwnd: u32,
    pub ssthresh: u32,
    pub dup_ack_count: u32,
    pub n: u32,

    pub retransmit_queue: Vec<RetransmitItem>,
    pub retransmit_count: u32,

    pub syn_queue: Vec<SynQueueItem>,

    pub wnd_probe_count: u32,
    pub wnd_probe_interval_ms: u64,

    pub sack_permitted: bool,
    pub sack_blocks: [SackBlock; 4],
    pub sack_block_count: usize,
}

impl Tcb {
    fn base(config: TcpConfig, mss: u16) -> Self {
        Self {
            state: TcpState::Closed,
            config,
            mss,
            iss: 0,
            irs: 0,
            snd_una: 0,
            snd_nxt: 0,
            snd_wnd: 0,
            max_snd_wnd: 0,
            snd_wl1: 0,
            snd_wl2: 0,
            rcv_nxt: 0,
            rcv_wnd: crate::config::TCP_DEFAULT_RX_BUFFER_SIZE as u16,
            rtt_busy: false,
            rtt_seq_num: 0,
            rtt_start_ms: 0,
            srtt: None,
            rttvar: 0,
            rto_ms: crate::config::TCP_INITIAL_RTO_MS,
            cwnd: crate::config::TCP_INITIAL_WINDOW * mss as u32,
            ssthresh: u32::MAX,
            dup_ack_count: 0,
            n: 0,
            retransmit_queue: Vec::new(),
            retransmit_count: 0,
            syn_queue: Vec::new(),
            wnd_probe_count: 0,
            wnd_probe_interval_ms: crate::config::TCP_DEFAULT_PROBE_INTERVAL_MS,
            sack_permitted: false,
            sack_blocks: [SackBlock::default(); 4],
            sack_block_count: 0,
        }
    }

    /// Active open: send SYN with `iss`, enter SYN-SENT.
    pub fn new_active_open(iss: u32, mss: u16, config: TcpConfig) -> Self {
        let mut tcb = Self::base(config, mss);
        tcb.state = TcpState::SynSent;
        tcb.iss = iss;
        tcb.snd_una = iss;
        tcb.snd_nxt = iss.wrapping_add(1);
        tcb
    }

    /// Passive open: enter LISTEN, waiting for SYNs into the bounded SYN
    /// queue.
    pub fn new_listener(config: TcpConfig) -> Self {
        let mut tcb = Self::base(config, crate::config::TCP_DEFAULT_MSS);
        tcb.state = TcpState::Listen;
        tcb
    }

    /// Promote a queued SYN into its own control block: the SYN-ACK has
    /// already been sent, so this starts in SYN-RECEIVED waiting for the
    /// handshake-completing ACK.
    pub fn new_passive_child(iss: u32, irs: u32, mss: u16, config: TcpConfig) -> Self {
        let mut tcb = Self::base(config, mss);
        tcb.state = TcpState::SynReceived;
        tcb.iss = iss;
        tcb.irs = irs;
        tcb.snd_una = iss;
        tcb.snd_nxt = iss.wrapping_add(1);
        tcb.rcv_nxt = irs.wrapping_add(1);
        tcb
    }

    /// §4.7: a segment is acceptable iff its sequence range overlaps
    /// `[rcvNxt, rcvNxt + rcvWnd)`.
    pub fn is_segment_acceptable(&self, seg_seq: u32, seg_len: u32) -> bool {
        let wnd = self.rcv_wnd as u32;
        if seg_len == 0 {
            if wnd == 0 {
                return seg_seq == self.rcv_nxt;
            }
            return seq_cmp(seg_seq, self.rcv_nxt) >= 0
                && seq_cmp(seg_seq, self.rcv_nxt.wrapping_add(wnd)) < 0;
        }
        if wnd == 0 {
            return false;
        }
        let seg_end = seg_seq.wrapping_add(seg_len - 1);
        let in_range = |s: u32| {
            seq_cmp(s, self.rcv_nxt) >= 0 && seq_cmp(s, self.rcv_nxt.wrapping_add(wnd)) < 0
        };
        in_range(seg_seq) || in_range(seg_end)
    }

    /// Passive-open SYN receipt: queue the handshake attempt if the SYN
    /// queue has room, return the initial sequence number chosen for the
    /// (not-yet-promoted) child.
    pub fn enqueue_syn(&mut self, item: SynQueueItem) -> Result<(), StackError> {
        if self.syn_queue.len() >= TCP_SYN_QUEUE_SIZE {
            return Err(StackError::OutOfResources);
        }
        self.syn_queue.push(item);
        Ok(())
    }

    /// Process an incoming segment against the current state. Returns the
    /// event the socket layer should surface to a blocked caller.
    pub fn process_segment(&mut self, seg: &TcpSegment, now_ms: u64) -> Result<TcbEvent, StackError> {
        if seg.flags.has(TcpFlags::RST) {
            return self.handle_rst();
        }

        match self.state {
            TcpState::Closed | TcpState::Listen => Ok(TcbEvent::None),
            TcpState::SynSent => self.process_syn_sent(seg, now_ms),
            TcpState::SynReceived => self.process_syn_received(seg, now_ms),
            TcpState::Established
            | TcpState::CloseWait
            | TcpState::FinWait1
            | TcpState::FinWait2
            | TcpState::Closing
            | TcpState::LastAck => self.process_data_state(seg, now_ms),
            TcpState::TimeWait => Ok(TcbEvent::None),
        }
    }

    fn handle_rst(&mut self) -> Result<TcbEvent, StackError> {
        let err = match self.state {
            TcpState::SynSent | TcpState::SynReceived => StackError::ConnectionRefused,
            _ => StackError::ConnectionReset,
        };
        self.state = TcpState::Closed;
        Ok(TcbEvent::Reset(err))
    }

    fn process_syn_sent(&mut self, seg: &TcpSegment, now_ms: u64) -> Result<TcbEvent, StackError> {
        if !seg.flags.has(TcpFlags::SYN) {
            return Ok(TcbEvent::None);
        }
        if seg.flags.has(TcpFlags::ACK) && seg.ack_num != self.snd_nxt {
            return Ok(TcbEvent::None);
        }

        self.irs = seg.seq_num;
        self.rcv_nxt = seg.seq_num.wrapping_add(1);
        self.apply_options(&seg.options);
        self.complete_rtt_sample(seg.ack_num, now_ms);

        if seg.flags.has(TcpFlags::ACK) {
            self.snd_una = seg.ack_num;
            self.state = TcpState::Established;
            self.cwnd = crate::config::TCP_INITIAL_WINDOW * self.mss as u32;
            Ok(TcbEvent::EstablishedConnection)
        } else {
            self.state = TcpState::SynReceived;
            Ok(TcbEvent::None)
        }
    }

    fn process_syn_received(&mut self, seg: &TcpSegment, now_ms: u64) -> Result<TcbEvent, StackError> {
        if seg.flags.has(TcpFlags::ACK) && seg.ack_num == self.snd_nxt {
            self.snd_una = seg.ack_num;
            self.complete_rtt_sample(seg.ack_num, now_ms);
            self.state = TcpState::Established;
            self.cwnd = crate::config::TCP_INITIAL_WINDOW * self.mss as u32;
            return Ok(TcbEvent::EstablishedConnection);
        }
        Ok(TcbEvent::None)
    }

    fn process_data_state(&mut self, seg: &TcpSegment, now_ms: u64) -> Result<TcbEvent, StackError> {
        if !self.is_segment_acceptable(seg.seq_num, seg.payload.len() as u32) {
            return Ok(TcbEvent::None); // caller is responsible for sending a challenge ACK
        }

        self.apply_options(&seg.options);

        let mut event = TcbEvent::None;

        if seg.flags.has(TcpFlags::ACK) {
            event = self.process_ack(seg, now_ms)?;
        }

        if !seg.payload.is_empty() && seq_cmp(seg.seq_num, self.rcv_nxt) == 0 {
            self.rcv_nxt = self.rcv_nxt.wrapping_add(seg.payload.len() as u32);
            event = TcbEvent::DataAvailable(seg.payload.len());
        }

        if seg.flags.has(TcpFlags::FIN) {
            self.rcv_nxt = self.rcv_nxt.wrapping_add(1);
            self.state = match self.state {
                TcpState::Established => TcpState::CloseWait,
                TcpState::FinWait1 => TcpState::Closing,
                TcpState::FinWait2 => TcpState::TimeWait,
                other => other,
            };
            event = TcbEvent::PeerClosed;
        }

        Ok(event)
    }

    fn process_ack(&mut self, seg: &TcpSegment, now_ms: u64) -> Result<TcbEvent, StackError> {
        if seq_cmp(seg.ack_num, self.snd_una) <= 0 {
            // Old or duplicate ACK.
            if seg.ack_num == self.snd_una && seg.payload.is_empty() {
                self.on_duplicate_ack();
            }
            return Ok(TcbEvent::None);
        }
        if seq_cmp(seg.ack_num, self.snd_nxt) > 0 {
            return Ok(TcbEvent::None); // ACKs something not yet sent
        }

        let acked = seg.ack_num.wrapping_sub(self.snd_una);
        self.snd_una = seg.ack_num;
        self.dup_ack_count = 0;
        self.retransmit_queue.retain(|item| {
            seq_cmp(item.seq.wrapping_add(item.length), seg.ack_num) > 0
        });
        self.complete_rtt_sample(seg.ack_num, now_ms);
        self.on_new_data_acked(acked);

        if seq_cmp(seg.seq_num, self.snd_wl1) > 0
            || (seg.seq_num == self.snd_wl1 && seq_cmp(seg.ack_num, self.snd_wl2) >= 0)
        {
            self.snd_wnd = seg.window;
            self.max_snd_wnd = self.max_snd_wnd.max(seg.window);
            self.snd_wl1 = seg.seq_num;
            self.snd_wl2 = seg.ack_num;
        }

        match self.state {
            TcpState::LastAck if seg.ack_num == self.snd_nxt => {
                self.state = TcpState::Closed;
                Ok(TcbEvent::Closed)
            }
            TcpState::FinWait1 if seg.ack_num == self.snd_nxt => {
                self.state = TcpState::FinWait2;
                Ok(TcbEvent::None)
            }
            TcpState::Closing if seg.ack_num == self.snd_nxt => {
                self.state = TcpState::TimeWait;
                Ok(TcbEvent::None)
            }
            _ => Ok(TcbEvent::None),
        }
    }

    fn apply_options(&mut self, options: &[TcpOption]) {
        for opt in options {
            match opt {
                TcpOption::MaxSegmentSize(mss) => {
                    self.mss = (*mss).clamp(crate::config::TCP_MIN_MSS, crate::config::TCP_MAX_MSS);
                }
                TcpOption::SackPermitted if self.config.sack_enabled => {
                    self.sack_permitted = true;
                }
                TcpOption::Sack(blocks, count) if self.sack_permitted => {
                    self.record_sack_blocks(&blocks[..*count]);
                }
                _ => {}
            }
        }
    }

    /// Records the peer-reported SACK ranges and marks any covered
    /// retransmit queue entries as sacked, per §4.7's "receiver reports
    /// non-contiguous ranges; sender marks covered retransmit entries as
    /// sacked and skips them".
    fn record_sack_blocks(&mut self, blocks: &[(u32, u32)]) {
        self.sack_blocks = [SackBlock::default(); 4];
        for (slot, (left, right)) in self.sack_blocks.iter_mut().zip(blocks) {
            *slot = SackBlock { left_edge: *left, right_edge: *right };
        }

        for item in &mut self.retransmit_queue {
            let item_end = item.seq.wrapping_add(item.length);
            let covered = blocks.iter().any(|(left, right)| {
                seq_cmp(item.seq, *left) >= 0 && seq_cmp(item_end, *right) <= 0
            });
            if covered {
                item.sacked = true;
            }
        }
    }

    // ── Round-trip timing (Karn's algorithm, Jacobson/Karels) ──

    /// Begin an RTT measurement for a freshly-sent (not retransmitted)
    /// segment.
    pub fn start_rtt_sample(&mut self, seq_num: u32, now_ms: u64) {
        if !self.rtt_busy {
            self.rtt_busy = true;
            self.rtt_seq_num = seq_num;
            self.rtt_start_ms = now_ms;
        }
    }

    /// Karn's algorithm: only take a sample if the acknowledged sequence
    /// covers a segment that was never retransmitted.
    fn complete_rtt_sample(&mut self, ack_num: u32, now_ms: u64) {
        if !self.rtt_busy {
            return;
        }
        if seq_cmp(ack_num, self.rtt_seq_num) <= 0 {
            return;
        }
        let was_retransmitted = self
            .retransmit_queue
            .iter()
            .any(|item| item.seq == self.rtt_seq_num && item.retransmitted);
        self.rtt_busy = false;
        if was_retransmitted {
            return;
        }

        let sample = now_ms.saturating_sub(self.rtt_start_ms).max(1);
        self.update_rto(sample);
    }

    /// Jacobson/Karels with α = 1/8, β = 1/4.
    fn update_rto(&mut self, sample_ms: u64) {
        match self.srtt {
            None => {
                self.srtt = Some(sample_ms);
                self.rttvar = sample_ms / 2;
            }
            Some(srtt) => {
                let delta = srtt.abs_diff(sample_ms);
                self.rttvar = self.rttvar - self.rttvar / 4 + delta / 4;
                self.srtt = Some(srtt - srtt / 8 + sample_ms / 8);
            }
        }
        let srtt = self.srtt.unwrap();
        self.rto_ms = (srtt + 4 * self.rttvar).clamp(TCP_MIN_RTO_MS, TCP_MAX_RTO_MS);
    }

    /// Called by the tick task when the retransmit timer fires. Returns
    /// `Err(ConnectionClosing)` once `TCP_MAX_RETRIES` is exceeded.
    pub fn on_retransmit_timeout(&mut self) -> Result<(), StackError> {
        self.retransmit_count += 1;
        if self.retransmit_count > self.config.max_retries {
            self.state = TcpState::Closed;
            return Err(StackError::ConnectionClosing);
        }

        let flight = self.snd_nxt.wrapping_sub(self.snd_una) as u32;
        self.ssthresh = (flight / 2).max(2 * self.mss as u32);
        self.cwnd = crate::config::TCP_LOSS_WINDOW * self.mss as u32;
        self.rto_ms = (self.rto_ms * 2).min(TCP_MAX_RTO_MS);

        for item in &mut self.retransmit_queue {
            if !item.sacked {
                item.retransmitted = true;
            }
        }
        Ok(())
    }

    // ── Congestion control (slow start / congestion avoidance) ──

    fn on_new_data_acked(&mut self, acked_bytes: u32) {
        if self.cwnd < self.ssthresh {
            // Slow start: one MSS per ACK.
            self.cwnd += self.mss as u32;
        } else {
            // Congestion avoidance: one MSS per RTT, tracked via `n`.
            self.n += acked_bytes;
            if self.n >= self.cwnd {
                self.n = 0;
                self.cwnd += self.mss as u32;
            }
        }
    }

    /// §4.7: on `TCP_FAST_RETRANSMIT_THRES` duplicate ACKs, fast-retransmit
    /// the oldest unacked segment and halve `ssthresh`.
    fn on_duplicate_ack(&mut self) -> bool {
        self.dup_ack_count += 1;
        if self.dup_ack_count == TCP_FAST_RETRANSMIT_THRES {
            self.ssthresh = (self.cwnd / 2).max(2 * self.mss as u32);
            self.cwnd = self.ssthresh;
            if let Some(first) = self.retransmit_queue.iter_mut().find(|item| !item.sacked) {
                first.retransmitted = true;
            }
            return true;
        }
        false
    }

    // ── Persist timer (zero window probing) ──

    /// Peer advertised a zero window; schedule the next probe at an
    /// exponentially increasing interval capped at `TCP_MAX_PROBE_INTERVAL`.
    pub fn on_zero_window(&mut self) {
        self.wnd_probe_count += 1;
        self.wnd_probe_interval_ms =
            (self.wnd_probe_interval_ms * 2).min(TCP_MAX_PROBE_INTERVAL_MS);
    }

    pub fn reset_persist_timer(&mut self) {
        self.wnd_probe_count = 0;
        self.wnd_probe_interval_ms = crate::config::TCP_DEFAULT_PROBE_INTERVAL_MS;
    }

    // ── Closing sequence ──

    /// Local active close: send FIN, move from ESTABLISHED/CLOSE_WAIT into
    /// the appropriate closing branch.
    pub fn close(&mut self) -> Result<(), StackError> {
        match self.state {
            TcpState::Established => {
                self.state = TcpState::FinWait1;
                self.snd_nxt = self.snd_nxt.wrapping_add(1);
                Ok(())
            }
            TcpState::CloseWait => {
                self.state = TcpState::LastAck;
                self.snd_nxt = self.snd_nxt.wrapping_add(1);
                Ok(())
            }
            _ => Err(StackError::UnexpectedState("close() called outside an open state")),
        }
    }
}
