#![allow(dead_code)]

use lux_monitor::lxp::packet::{Envelope, Frame, TcpFrameFactory, TcpFunction};
use lux_monitor::prelude::*;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct Factory;

impl Factory {
    /// A complete read-input request frame for registers 0..40, exactly as
    /// the monitor puts it on the wire.
    pub fn read_input_request() -> Vec<u8> {
        TcpFrameFactory::read_input_request(1, Serial::broadcast(), Serial::unaddressed(), 0, 40)
    }

    /// A synthetic read-input response frame carrying the given register
    /// values at the given indices; every other register reads as zero.
    pub fn read_input_response(registers: &[(usize, u16)]) -> Vec<u8> {
        let count = registers.iter().map(|(index, _)| index + 1).max().unwrap_or(0);
        let mut values = vec![0u8; count * 2];
        for (index, value) in registers {
            values[index * 2..index * 2 + 2].copy_from_slice(&value.to_le_bytes());
        }

        Self::response_with_values(&values)
    }

    /// Wrap raw register bytes in response framing: device address, device
    /// function, inverter serial, start register, value length.
    pub fn response_with_values(values: &[u8]) -> Vec<u8> {
        let mut payload = vec![1u8, 4u8];
        payload.extend_from_slice(&Serial::unaddressed().data());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.push(values.len() as u8);
        payload.extend_from_slice(values);

        let envelope = Envelope {
            datalog: Serial::broadcast(),
            payload,
        };

        TcpFrameFactory::build(1, TcpFunction::TranslatedData, &envelope.bytes())
    }

    pub fn frame(bytes: Vec<u8>) -> Frame {
        Frame::new(bytes).unwrap()
    }
}
