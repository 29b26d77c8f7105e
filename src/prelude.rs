pub use std::io::Write;

pub use {
    anyhow::{anyhow, bail, Error, Result},
    log::{debug, error, info, trace, warn},
    tokio::sync::broadcast,
};

pub use crate::{
    channels::Channels,
    config::{self, Config},
    coordinator::Coordinator,
    lxp::{
        self,
        inverter::Serial,
        packet::{Frame, PowerFlow, TcpFrameFactory, TcpFunction},
    },
    options::Options,
    utils::Utils,
};
