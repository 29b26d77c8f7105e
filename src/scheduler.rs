use crate::prelude::*;

use std::sync::{Arc, Mutex};

use crate::coordinator::PacketStats;
use crate::lxp::inverter::ChannelData;

/// The polled block always starts at register zero; its size comes from the
/// inverter config and defaults to the 40 registers the power flow
/// derivation reads from.
const POLL_START_REGISTER: u16 = 0;

pub struct Scheduler {
    config: Arc<Config>,
    channels: Channels,
    stats: Arc<Mutex<PacketStats>>,
}

impl Scheduler {
    pub fn new(config: Arc<Config>, channels: Channels, stats: Arc<Mutex<PacketStats>>) -> Self {
        Self {
            config,
            channels,
            stats,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(
            self.config.poll_interval_ms(),
        ));

        loop {
            interval.tick().await;

            for inverter in self.config.enabled_inverters() {
                debug!(
                    "inverter {}: requesting {} input registers",
                    inverter.datalog(),
                    inverter.register_block_size()
                );

                let request = ChannelData::ReadInput {
                    datalog: inverter.datalog(),
                    register: POLL_START_REGISTER,
                    count: inverter.register_block_size(),
                };
                if self.channels.to_inverter.send(request).is_err() {
                    bail!("send(to_inverter) failed - channel closed?");
                }

                if let Ok(mut stats) = self.stats.lock() {
                    stats.increment_requests_sent();
                }
            }
        }
    }
}
