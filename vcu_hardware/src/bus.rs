//! Two-channel simulated CAN controller.
//!
//! Each channel has a bounded read FIFO (frames waiting for the core) and a
//! bounded write FIFO (frames the core queued). [`SimulatedBus::flush`]
//! stands in for the controller putting queued frames on the wire.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use vcu_traits::{BoxError, CanFrame, CanTransport};

use crate::error::HwError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusChannel {
    High,
    Low,
}

/// One-shot fault armed on a channel's next transmit or receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArmedFault {
    Busy,
    Stale,
}

#[derive(Debug)]
struct ChannelState {
    read_depth: usize,
    write_depth: usize,
    rx: VecDeque<CanFrame>,
    tx: VecDeque<CanFrame>,
    wire: Vec<CanFrame>,
    bus_off: bool,
    recoveries: u32,
    rx_dropped: u64,
    armed_tx: Option<ArmedFault>,
    armed_rx: Option<ArmedFault>,
}

impl ChannelState {
    fn new(read_depth: u16, write_depth: u16) -> Self {
        Self {
            read_depth: usize::from(read_depth.max(1)),
            write_depth: usize::from(write_depth.max(1)),
            rx: VecDeque::new(),
            tx: VecDeque::new(),
            wire: Vec::new(),
            bus_off: false,
            recoveries: 0,
            rx_dropped: 0,
            armed_tx: None,
            armed_rx: None,
        }
    }
}

#[derive(Debug)]
struct BusState {
    high: ChannelState,
    low: ChannelState,
}

impl BusState {
    fn ch(&mut self, which: BusChannel) -> &mut ChannelState {
        match which {
            BusChannel::High => &mut self.high,
            BusChannel::Low => &mut self.low,
        }
    }
}

/// Harness handle onto both simulated channels.
#[derive(Debug, Clone)]
pub struct SimulatedBus {
    state: Rc<RefCell<BusState>>,
}

impl SimulatedBus {
    /// FIFO depths as `(read, write)` per channel.
    pub fn new(high: (u16, u16), low: (u16, u16)) -> Self {
        Self {
            state: Rc::new(RefCell::new(BusState {
                high: ChannelState::new(high.0, high.1),
                low: ChannelState::new(low.0, low.1),
            })),
        }
    }

    /// Transport handle the core owns for one channel.
    pub fn port(&self, which: BusChannel) -> SimCanPort {
        SimCanPort {
            state: Rc::clone(&self.state),
            which,
        }
    }

    /// Deliver a frame from another node into a channel's read FIFO.
    /// Returns false (and counts a drop) when the FIFO is full.
    pub fn inject(&self, which: BusChannel, frame: CanFrame) -> bool {
        let mut s = self.state.borrow_mut();
        let ch = s.ch(which);
        if ch.rx.len() >= ch.read_depth {
            ch.rx_dropped += 1;
            return false;
        }
        ch.rx.push_back(frame);
        true
    }

    /// Move every queued outbound frame onto the wire and return them.
    pub fn flush(&self, which: BusChannel) -> Vec<CanFrame> {
        let mut s = self.state.borrow_mut();
        let ch = s.ch(which);
        let sent: Vec<CanFrame> = ch.tx.drain(..).collect();
        ch.wire.extend_from_slice(&sent);
        sent
    }

    /// Every frame that has reached the wire so far on a channel.
    pub fn wire(&self, which: BusChannel) -> Vec<CanFrame> {
        self.state.borrow_mut().ch(which).wire.clone()
    }

    pub fn clear_wire(&self, which: BusChannel) {
        self.state.borrow_mut().ch(which).wire.clear();
    }

    pub fn pending_tx(&self, which: BusChannel) -> usize {
        self.state.borrow_mut().ch(which).tx.len()
    }

    pub fn pending_rx(&self, which: BusChannel) -> usize {
        self.state.borrow_mut().ch(which).rx.len()
    }

    pub fn rx_dropped(&self, which: BusChannel) -> u64 {
        self.state.borrow_mut().ch(which).rx_dropped
    }

    /// Force a channel into bus-off; it stays there until polled.
    pub fn set_bus_off(&self, which: BusChannel) {
        self.state.borrow_mut().ch(which).bus_off = true;
    }

    pub fn is_bus_off(&self, which: BusChannel) -> bool {
        self.state.borrow_mut().ch(which).bus_off
    }

    pub fn recoveries(&self, which: BusChannel) -> u32 {
        self.state.borrow_mut().ch(which).recoveries
    }

    /// Next transmit on the channel reports the controller busy.
    pub fn fail_next_transmit(&self, which: BusChannel) {
        self.state.borrow_mut().ch(which).armed_tx = Some(ArmedFault::Busy);
    }

    /// Next receive on the channel reports stale data.
    pub fn fail_next_receive(&self, which: BusChannel) {
        self.state.borrow_mut().ch(which).armed_rx = Some(ArmedFault::Stale);
    }
}

/// One channel of the simulated controller.
#[derive(Debug)]
pub struct SimCanPort {
    state: Rc<RefCell<BusState>>,
    which: BusChannel,
}

impl SimCanPort {
    pub fn channel(&self) -> BusChannel {
        self.which
    }
}

impl CanTransport for SimCanPort {
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), BoxError> {
        let mut s = self.state.borrow_mut();
        let ch = s.ch(self.which);
        if ch.bus_off {
            return Err(Box::new(HwError::BusOff));
        }
        if ch.armed_tx.take().is_some() {
            return Err(Box::new(HwError::Busy));
        }
        if ch.tx.len() >= ch.write_depth {
            return Err(Box::new(HwError::FifoFull));
        }
        ch.tx.push_back(*frame);
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<CanFrame>, BoxError> {
        let mut s = self.state.borrow_mut();
        let ch = s.ch(self.which);
        if ch.bus_off {
            return Err(Box::new(HwError::BusOff));
        }
        if ch.armed_rx.take().is_some() {
            // the stale frame is consumed
            ch.rx.pop_front();
            return Err(Box::new(HwError::StaleData));
        }
        Ok(ch.rx.pop_front())
    }

    fn poll_status(&mut self) -> Result<(), BoxError> {
        let mut s = self.state.borrow_mut();
        let ch = s.ch(self.which);
        if ch.bus_off {
            ch.bus_off = false;
            ch.recoveries += 1;
            // bus-off recovery discards anything still queued
            ch.tx.clear();
            tracing::info!(channel = ?self.which, "bus-off recovery (simulated)");
        }
        Ok(())
    }
}
