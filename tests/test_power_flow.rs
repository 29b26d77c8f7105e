mod common;
use common::*;

use lux_monitor::lxp::packet::{Envelope, TcpFrameFactory, TcpFunction};
use lux_monitor::prelude::*;

#[test]
fn pv_flow_sums_three_strings() {
    let frame = Factory::frame(Factory::read_input_response(&[(7, 100), (8, 200), (9, 50)]));

    let flow = PowerFlow::from_frame(&frame).unwrap();
    assert_eq!(flow.pv_w, 350);
    assert_eq!(flow.consumption_w, 0);
}

#[test]
fn consumption_combines_inverter_and_grid_flows() {
    let frame = Factory::frame(Factory::read_input_response(&[
        (16, 500),
        (17, 20),
        (26, 100),
        (27, 350),
    ]));

    let flow = PowerFlow::from_frame(&frame).unwrap();
    // (500 - 20) + (350 - 100)
    assert_eq!(flow.consumption_w, 730);
}

#[test]
fn negative_consumption_clamps_to_zero() {
    let frame = Factory::frame(Factory::read_input_response(&[
        (16, 5),
        (17, 50),
        (26, 100),
        (27, 10),
    ]));

    let flow = PowerFlow::from_frame(&frame).unwrap();
    assert_eq!(flow.consumption_w, 0);
}

#[test]
fn pv_sum_does_not_overflow_u16() {
    let frame = Factory::frame(Factory::read_input_response(&[
        (7, 65535),
        (8, 65535),
        (9, 65535),
    ]));

    let flow = PowerFlow::from_frame(&frame).unwrap();
    assert_eq!(flow.pv_w, 3 * 65535);
}

#[test]
fn short_frame_registers_read_zero() {
    // a response carrying no register data at all
    let frame = Factory::frame(Factory::response_with_values(&[]));

    assert_eq!(frame.register(7), 0);
    assert_eq!(frame.register(1000), 0);

    let flow = PowerFlow::from_frame(&frame).unwrap();
    assert_eq!(flow.pv_w, 0);
    assert_eq!(flow.consumption_w, 0);
}

#[test]
fn other_function_codes_decode_nothing() {
    let envelope = Envelope {
        datalog: Serial::broadcast(),
        payload: vec![0],
    }
    .bytes();

    for function in [
        TcpFunction::Heartbeat,
        TcpFunction::ReadParam,
        TcpFunction::WriteParam,
    ] {
        let frame = Factory::frame(TcpFrameFactory::build(1, function, &envelope));
        assert_eq!(PowerFlow::from_frame(&frame), None);
    }
}

#[test]
fn unknown_function_code_is_ignored() {
    let mut bytes = Factory::read_input_response(&[(7, 100)]);
    bytes[7] = 0x42;

    let frame = Factory::frame(bytes);
    assert_eq!(PowerFlow::from_frame(&frame), None);
}

#[test]
fn response_frame_carries_datalog_serial() {
    let frame = Factory::frame(Factory::read_input_response(&[(7, 1)]));
    assert_eq!(frame.datalog(), Some(Serial::broadcast()));
}
