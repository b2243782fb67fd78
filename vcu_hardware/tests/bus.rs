use rstest::rstest;
use vcu_hardware::error::HwError;
use vcu_hardware::{BusChannel, SimulatedBus};
use vcu_traits::{CanFrame, CanTransport};

fn frame(id: u16, b: u8) -> CanFrame {
    CanFrame::standard(id, &[b]).unwrap()
}

fn hw(err: &vcu_traits::BoxError) -> &HwError {
    err.downcast_ref::<HwError>().expect("typed hardware error")
}

#[rstest]
#[case(BusChannel::High)]
#[case(BusChannel::Low)]
fn write_fifo_is_bounded(#[case] ch: BusChannel) {
    let bus = SimulatedBus::new((4, 2), (4, 2));
    let mut port = bus.port(ch);
    port.transmit(&frame(0x10, 1)).unwrap();
    port.transmit(&frame(0x10, 2)).unwrap();
    let err = port.transmit(&frame(0x10, 3)).unwrap_err();
    assert!(matches!(hw(&err), HwError::FifoFull));

    let sent = bus.flush(ch);
    assert_eq!(sent.len(), 2);
    assert_eq!(bus.wire(ch), sent);
    port.transmit(&frame(0x10, 3)).unwrap();
}

#[test]
fn read_fifo_drops_when_full_and_preserves_order() {
    let bus = SimulatedBus::new((2, 1), (1, 1));
    assert!(bus.inject(BusChannel::High, frame(0x1, 0)));
    assert!(bus.inject(BusChannel::High, frame(0x2, 0)));
    assert!(!bus.inject(BusChannel::High, frame(0x3, 0)));
    assert_eq!(bus.rx_dropped(BusChannel::High), 1);

    let mut port = bus.port(BusChannel::High);
    assert_eq!(port.receive().unwrap().map(|f| f.id()), Some(0x1));
    assert_eq!(port.receive().unwrap().map(|f| f.id()), Some(0x2));
    assert_eq!(port.receive().unwrap(), None);
}

#[test]
fn bus_off_until_polled() {
    let bus = SimulatedBus::new((4, 4), (4, 4));
    let mut port = bus.port(BusChannel::High);
    port.transmit(&frame(0x20, 0)).unwrap();
    bus.set_bus_off(BusChannel::High);

    let err = port.transmit(&frame(0x20, 1)).unwrap_err();
    assert!(matches!(hw(&err), HwError::BusOff));
    assert!(port.receive().is_err());

    port.poll_status().unwrap();
    assert!(!bus.is_bus_off(BusChannel::High));
    assert_eq!(bus.recoveries(BusChannel::High), 1);
    assert_eq!(bus.pending_tx(BusChannel::High), 0);
    port.transmit(&frame(0x20, 2)).unwrap();
}

#[test]
fn armed_faults_fire_once() {
    let bus = SimulatedBus::new((4, 4), (4, 4));
    let mut port = bus.port(BusChannel::Low);
    bus.fail_next_transmit(BusChannel::Low);
    let err = port.transmit(&frame(0x30, 0)).unwrap_err();
    assert!(matches!(hw(&err), HwError::Busy));
    port.transmit(&frame(0x30, 0)).unwrap();

    bus.inject(BusChannel::Low, frame(0x31, 0));
    bus.inject(BusChannel::Low, frame(0x32, 0));
    bus.fail_next_receive(BusChannel::Low);
    let err = port.receive().unwrap_err();
    assert!(matches!(hw(&err), HwError::StaleData));
    assert_eq!(port.receive().unwrap().map(|f| f.id()), Some(0x32));
}
