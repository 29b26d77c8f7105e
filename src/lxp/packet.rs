use crate::prelude::*;

use nom::bytes::complete::tag;
use nom::number::complete::{le_u16, u8 as nom_u8};
use nom::IResult;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Every frame on the wire starts with these two bytes.
pub const MAGIC_PREFIX: [u8; 2] = [0xA1, 0x1A];

/// Bytes before the envelope in a TCP frame: magic (2), protocol (2),
/// length (2), frame type (1), TCP function (1).
pub const FRAME_HEADER_LENGTH: usize = 8;

/// The length field counts the envelope plus the frame-type and function
/// bytes, so a complete frame is always this much longer than it declares.
pub const FRAME_LENGTH_BIAS: usize = 6;

/// First register byte within a read-input response frame. Cumulative
/// headers before the register data: frame header (8) + datalog serial (10)
/// + envelope length (2) + device address (1) + device function (1) +
/// inverter serial (10) + start register (2) + value length (1) = 35.
pub const REGISTER_DATA_OFFSET: usize = 35;

/// Only frame type seen on this protocol generation.
pub const FRAME_TYPE: u8 = 1;

/// An 18-byte read-input command: address, function, serial, start
/// register, count, checksum.
pub const READ_INPUT_COMMAND_LENGTH: usize = 18;

// {{{ TcpFunction
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TcpFunction {
    Heartbeat = 193,
    TranslatedData = 194,
    ReadParam = 195,
    WriteParam = 196,
}
// }}}

// {{{ DeviceFunction
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum DeviceFunction {
    ReadInput = 4,
    // ReadHold = 3
    // WriteSingle = 6
    // WriteMulti = 16
}
// }}}

// {{{ FrameHeader
/// The fixed eight-byte header at the front of every TCP frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameHeader {
    pub protocol: u16,
    pub payload_length: u16,
    pub frame_type: u8,
    pub tcp_function: u8,
}

impl FrameHeader {
    pub fn parse(input: &[u8]) -> Result<Self> {
        let (_, header) = Self::nom_parse(input)
            .map_err(|_| anyhow!("frame header too short or bad prefix"))?;
        Ok(header)
    }

    fn nom_parse(input: &[u8]) -> IResult<&[u8], FrameHeader> {
        let (input, _) = tag(&MAGIC_PREFIX[..])(input)?;
        let (input, protocol) = le_u16(input)?;
        let (input, payload_length) = le_u16(input)?;
        let (input, frame_type) = nom_u8(input)?;
        let (input, tcp_function) = nom_u8(input)?;

        Ok((
            input,
            FrameHeader {
                protocol,
                payload_length,
                frame_type,
                tcp_function,
            },
        ))
    }

    /// Total byte length of the frame this header belongs to.
    pub fn frame_length(&self) -> usize {
        self.payload_length as usize + FRAME_LENGTH_BIAS
    }
}
// }}}

// {{{ Frame
/// One complete outer TCP frame, as sliced out of the stream by the decoder.
#[derive(Clone, Eq, PartialEq)]
pub struct Frame {
    header: FrameHeader,
    bytes: Vec<u8>,
}

impl Frame {
    /// `bytes` must hold exactly one frame; the decoder guarantees this and
    /// anything else is rejected here.
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        let header = FrameHeader::parse(&bytes)?;
        if bytes.len() != header.frame_length() {
            bail!(
                "frame length mismatch: declared {}, got {}",
                header.frame_length(),
                bytes.len()
            );
        }

        Ok(Self { header, bytes })
    }

    pub fn protocol(&self) -> u16 {
        self.header.protocol
    }

    pub fn frame_type(&self) -> u8 {
        self.header.frame_type
    }

    pub fn tcp_function(&self) -> u8 {
        self.header.tcp_function
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Datalog serial carried after the frame header, when the frame is
    /// long enough to have one.
    pub fn datalog(&self) -> Option<Serial> {
        if self.bytes.len() < FRAME_HEADER_LENGTH + 10 {
            return None;
        }

        Serial::new(&self.bytes[FRAME_HEADER_LENGTH..FRAME_HEADER_LENGTH + 10]).ok()
    }

    /// Input register `index` of a read-input response, little-endian.
    /// Reads past the end of the frame yield 0; a truncated response must
    /// not take the whole decode down with it.
    pub fn register(&self, index: usize) -> u16 {
        let pos = index * 2 + REGISTER_DATA_OFFSET;
        if pos + 1 >= self.bytes.len() {
            return 0;
        }

        Utils::u16ify(&self.bytes, pos)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
// }}}

// {{{ ReadInputCommand
/// Inner Modbus-style command requesting a block of input registers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadInputCommand {
    pub inverter: Serial,
    pub register: u16,
    pub count: u16,
}

impl ReadInputCommand {
    pub fn bytes(&self) -> Vec<u8> {
        let mut data = vec![0; READ_INPUT_COMMAND_LENGTH - 2];

        // data[0] is the device address; 0 targets the local device
        data[1] = DeviceFunction::ReadInput as u8;
        data[2..12].copy_from_slice(&self.inverter.data());
        data[12..14].copy_from_slice(&self.register.to_le_bytes());
        data[14..16].copy_from_slice(&self.count.to_le_bytes());

        // checksum covers every preceding byte
        let checksum = Self::checksum(&data);
        data.extend_from_slice(&checksum);

        data
    }

    fn checksum(data: &[u8]) -> [u8; 2] {
        crc16::State::<crc16::MODBUS>::calculate(data).to_le_bytes()
    }
}
// }}}

// {{{ Envelope
/// Transport envelope around a command: datalog serial, explicit payload
/// length, payload. The length field always equals `payload.len()`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    pub datalog: Serial,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(12 + self.payload.len());

        data.extend_from_slice(&self.datalog.data());
        data.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        data.extend_from_slice(&self.payload);

        data
    }
}
// }}}

pub struct TcpFrameFactory;
impl TcpFrameFactory {
    /// Wrap an envelope in the outer TCP frame.
    pub fn build(protocol: u16, function: TcpFunction, envelope: &[u8]) -> Vec<u8> {
        let payload_length = (envelope.len() + 2) as u16;

        let mut r = Vec::with_capacity(FRAME_HEADER_LENGTH + envelope.len());
        r.extend_from_slice(&MAGIC_PREFIX);
        r.extend_from_slice(&protocol.to_le_bytes());
        r.extend_from_slice(&payload_length.to_le_bytes());
        r.push(FRAME_TYPE);
        r.push(function as u8);
        r.extend_from_slice(envelope);

        r
    }

    /// The exact byte sequence written to the socket to poll a block of
    /// input registers.
    pub fn read_input_request(
        protocol: u16,
        datalog: Serial,
        inverter: Serial,
        register: u16,
        count: u16,
    ) -> Vec<u8> {
        let command = ReadInputCommand {
            inverter,
            register,
            count,
        };
        let envelope = Envelope {
            datalog,
            payload: command.bytes(),
        };

        Self::build(protocol, TcpFunction::TranslatedData, &envelope.bytes())
    }
}

// Input register indices read by the power flow derivation.
const REG_P_PV_1: usize = 7;
const REG_P_PV_2: usize = 8;
const REG_P_PV_3: usize = 9;
const REG_P_INV: usize = 16;
const REG_P_REC: usize = 17;
const REG_P_TO_GRID: usize = 26;
const REG_P_TO_USER: usize = 27;

// {{{ PowerFlow
/// Metrics derived from one read-input response; produced fresh per frame,
/// never accumulated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PowerFlow {
    pub pv_w: u32,
    pub consumption_w: u32,
}

impl PowerFlow {
    /// Decode a complete frame. Returns None for any function code other
    /// than a read-input response; those frames are valid but carry nothing
    /// we report.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        match TcpFunction::try_from(frame.tcp_function()) {
            Ok(TcpFunction::TranslatedData) => Some(Self::decode(frame)),
            _ => None,
        }
    }

    fn decode(frame: &Frame) -> Self {
        let pv_w = u32::from(frame.register(REG_P_PV_1))
            + u32::from(frame.register(REG_P_PV_2))
            + u32::from(frame.register(REG_P_PV_3));

        let p_inv = i32::from(frame.register(REG_P_INV));
        let p_rec = i32::from(frame.register(REG_P_REC));
        let p_to_grid = i32::from(frame.register(REG_P_TO_GRID));
        let p_to_user = i32::from(frame.register(REG_P_TO_USER));

        // inverter output minus rectified intake, plus grid import minus
        // grid export; a negative total is measurement noise at zero load
        let consumption = (p_inv - p_rec) + (p_to_user - p_to_grid);

        Self {
            pv_w,
            consumption_w: consumption.max(0) as u32,
        }
    }
}
// }}}
