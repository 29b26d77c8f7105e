use crate::prelude::*;

use std::sync::{Arc, Mutex};

use crate::lxp::inverter::ChannelData;

#[derive(Default)]
pub struct PacketStats {
    frames_received: u64,
    requests_sent: u64,
    read_input_responses: u64,
    ignored_frames: u64,
    disconnections: u64,
}

impl PacketStats {
    pub fn increment_requests_sent(&mut self) {
        self.requests_sent += 1;
    }

    pub fn print_summary(&self) {
        info!("Frame statistics:");
        info!("  Requests sent: {}", self.requests_sent);
        info!("  Frames received: {}", self.frames_received);
        info!("    Read-input responses: {}", self.read_input_responses);
        info!("    Ignored (other functions): {}", self.ignored_frames);
        info!("  Disconnections: {}", self.disconnections);
    }
}

/// Receives frames from the inverter connections, decodes the power flow
/// metrics and reports them.
#[derive(Clone)]
pub struct Coordinator {
    channels: Channels,
    pub stats: Arc<Mutex<PacketStats>>,
}

impl Coordinator {
    pub fn new(channels: Channels) -> Self {
        Self {
            channels,
            stats: Arc::new(Mutex::new(PacketStats::default())),
        }
    }

    pub async fn start(&self) -> Result<()> {
        self.inverter_receiver().await
    }

    pub fn stop(&self) {
        let _ = self.channels.from_inverter.send(ChannelData::Shutdown);
        let _ = self.channels.to_inverter.send(ChannelData::Shutdown);
    }

    async fn inverter_receiver(&self) -> Result<()> {
        let mut receiver = self.channels.from_inverter.subscribe();

        loop {
            match receiver.recv().await? {
                ChannelData::Shutdown => break,
                ChannelData::Connected(datalog) => {
                    info!("inverter {}: connected", datalog);
                }
                ChannelData::Disconnect(datalog) => {
                    warn!("inverter {}: disconnected", datalog);
                    if let Ok(mut stats) = self.stats.lock() {
                        stats.disconnections += 1;
                    }
                }
                ChannelData::Frame(frame) => {
                    debug!("RX frame: {:?}", frame);
                    self.handle_frame(frame);
                }
                ChannelData::ReadInput { .. } => {} // outbound only
            }
        }

        Ok(())
    }

    fn handle_frame(&self, frame: Frame) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.frames_received += 1;
        }

        match PowerFlow::from_frame(&frame) {
            Some(flow) => {
                if let Ok(mut stats) = self.stats.lock() {
                    stats.read_input_responses += 1;
                }

                info!("PV flow: {} W", flow.pv_w);
                info!("Consumption: {} W", flow.consumption_w);
            }
            None => {
                if let Ok(mut stats) = self.stats.lock() {
                    stats.ignored_frames += 1;
                }

                debug!(
                    "ignoring frame with tcp_function={}",
                    frame.tcp_function()
                );
            }
        }
    }
}
