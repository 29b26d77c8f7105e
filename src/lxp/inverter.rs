use crate::prelude::*;

use {
    bytes::BytesMut,
    net2::TcpStreamExt,
    std::time::Duration,
    tokio::io::{AsyncReadExt, AsyncWriteExt},
    tokio_util::codec::Decoder,
};

use crate::lxp::packet_decoder::PacketDecoder;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ChannelData {
    Connected(Serial),
    Disconnect(Serial),
    /// inverter -> coordinator
    Frame(Frame),
    /// scheduler -> inverter
    ReadInput {
        datalog: Serial,
        register: u16,
        count: u16,
    },
    Shutdown,
}
pub type Sender = broadcast::Sender<ChannelData>;
pub type Receiver = broadcast::Receiver<ChannelData>;

// Serial {{{
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Serial([u8; 10]);

impl Serial {
    pub fn new(input: &[u8]) -> Result<Self> {
        Ok(Self(input.try_into()?))
    }

    /// All-0xFF datalog identifier; addresses whichever datalogger answers.
    pub fn broadcast() -> Self {
        Self([0xFF; 10])
    }

    /// All-zero inverter identifier, used when the datalogger has a single
    /// attached inverter and targeting is unnecessary.
    pub fn unaddressed() -> Self {
        Self([0; 10])
    }

    pub fn data(&self) -> [u8; 10] {
        self.0
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self::unaddressed()
    }
}

impl std::str::FromStr for Serial {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 10 {
            return Err(anyhow!("{} must be exactly 10 characters", s));
        }

        let mut r: [u8; 10] = Default::default();
        r.copy_from_slice(s.as_bytes());
        Ok(Self(r))
    }
}

impl std::fmt::Display for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // sentinel serials aren't printable text, show those as hex
        if self.0.iter().all(|b| b.is_ascii_graphic()) {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        } else {
            for b in &self.0 {
                write!(f, "{:02X}", b)?;
            }
            Ok(())
        }
    }
}

impl std::fmt::Debug for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
} // }}}

#[derive(Clone)]
pub struct Inverter {
    config: config::Inverter,
    channels: Channels,
}

const WRITE_TIMEOUT_SECS: u64 = 5; // Timeout for write operations
const RECONNECT_DELAY_SECS: u64 = 5; // Delay before reconnection attempts
const TCP_KEEPALIVE_SECS: u64 = 60; // TCP keepalive interval
const MAX_BUFFER_SIZE: usize = 65536; // 64KB max receive buffer

impl Inverter {
    pub fn new(config: config::Inverter, channels: Channels) -> Self {
        Self { config, channels }
    }

    pub async fn start(&self) -> Result<()> {
        let mut shutdown_rx = self.channels.to_inverter.subscribe();

        loop {
            // a shutdown that arrived while we were down means no reconnect
            loop {
                match shutdown_rx.try_recv() {
                    Ok(ChannelData::Shutdown) => {
                        info!("inverter {}: shutdown", self.config.datalog());
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                    Err(_) => break,
                }
            }

            match self.connect().await {
                Ok(()) => {
                    info!("inverter {}: shutdown", self.config.datalog());
                    return Ok(());
                }
                Err(e) => {
                    error!("inverter {}: {}", self.config.datalog(), e);
                    info!(
                        "inverter {}: reconnecting in {}s",
                        self.config.datalog(),
                        RECONNECT_DELAY_SECS
                    );
                    tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
                }
            }
        }
    }

    pub async fn connect(&self) -> Result<()> {
        info!(
            "connecting to inverter {} at {}:{}",
            self.config.datalog(),
            self.config.host(),
            self.config.port()
        );

        let inverter_hp = (self.config.host().to_owned(), self.config.port());

        let stream = match tokio::time::timeout(
            Duration::from_secs(WRITE_TIMEOUT_SECS * 2),
            tokio::net::TcpStream::connect(inverter_hp),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => bail!("failed to connect: {}", e),
            Err(_) => bail!("connection timeout after {} seconds", WRITE_TIMEOUT_SECS * 2),
        };

        let std_stream = stream.into_std()?;
        if let Err(e) = std_stream.set_keepalive(Some(Duration::new(TCP_KEEPALIVE_SECS, 0))) {
            warn!("failed to set TCP keepalive: {}", e);
        }

        let stream = tokio::net::TcpStream::from_std(std_stream)?;

        if self.config.use_tcp_nodelay() {
            if let Err(e) = stream.set_nodelay(true) {
                warn!("failed to set TCP_NODELAY: {}", e);
            }
        }

        let (reader, writer) = stream.into_split();

        info!("inverter {}: connected!", self.config.datalog());

        // subscribe before announcing the connection so a request sent in
        // response to Connected can't slip past the sender
        let sender_rx = self.channels.to_inverter.subscribe();
        let receiver_rx = self.channels.to_inverter.subscribe();

        let _ = self
            .channels
            .from_inverter
            .send(ChannelData::Connected(self.config.datalog()));

        let res = tokio::select! {
            res = self.sender(writer, sender_rx) => res,
            res = self.receiver(reader, receiver_rx) => res,
        };

        let _ = self
            .channels
            .from_inverter
            .send(ChannelData::Disconnect(self.config.datalog()));

        res
    }

    async fn sender(
        &self,
        mut writer: tokio::net::tcp::OwnedWriteHalf,
        mut receiver: Receiver,
    ) -> Result<()> {
        loop {
            match receiver.recv().await {
                Ok(ChannelData::Shutdown) => break,
                Ok(ChannelData::ReadInput {
                    datalog,
                    register,
                    count,
                }) => {
                    if datalog != self.config.datalog() {
                        debug!(
                            "skipping request for different datalog (expected {}, got {})",
                            self.config.datalog(),
                            datalog
                        );
                        continue;
                    }

                    let bytes = TcpFrameFactory::read_input_request(
                        self.config.protocol(),
                        self.config.datalog(),
                        self.config.serial(),
                        register,
                        count,
                    );

                    debug!("inverter {}: TX {:02x?}", self.config.datalog(), bytes);

                    match tokio::time::timeout(
                        Duration::from_secs(WRITE_TIMEOUT_SECS),
                        writer.write_all(&bytes),
                    )
                    .await
                    {
                        Ok(Ok(())) => {
                            if let Err(e) = writer.flush().await {
                                bail!("failed to flush socket: {}", e);
                            }
                        }
                        Ok(Err(e)) => bail!("failed to write request: {}", e),
                        Err(_) => bail!("write timed out after {} seconds", WRITE_TIMEOUT_SECS),
                    }
                }
                Ok(_) => {} // frames and connection notices are not ours to send
                Err(broadcast::error::RecvError::Closed) => bail!("channel closed"),
                Err(e) => {
                    warn!("error receiving from channel: {}", e);
                    continue;
                }
            }
        }

        info!("inverter {}: sender exiting", self.config.datalog());
        Ok(())
    }

    // inverter -> coordinator
    async fn receiver(
        &self,
        mut socket: tokio::net::tcp::OwnedReadHalf,
        mut to_inverter_rx: Receiver,
    ) -> Result<()> {
        use tokio::time::timeout;

        let mut buf = BytesMut::with_capacity(MAX_BUFFER_SIZE);
        let mut decoder = PacketDecoder::new();

        loop {
            if buf.len() >= MAX_BUFFER_SIZE {
                bail!(
                    "buffer overflow: {} bytes buffered without a complete frame",
                    buf.len()
                );
            }

            tokio::select! {
                msg = to_inverter_rx.recv() => {
                    match msg {
                        Ok(ChannelData::Shutdown) => {
                            // drain whatever is already buffered before exiting
                            while let Some(frame) = decoder.decode_eof(&mut buf)? {
                                if let Err(e) = self.handle_incoming_frame(frame) {
                                    warn!("failed to handle final frame: {}", e);
                                }
                            }
                            break;
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            warn!("error receiving from channel: {}", e);
                            continue;
                        }
                    }
                }

                read_result = async {
                    if self.config.read_timeout() > 0 {
                        timeout(
                            Duration::from_secs(self.config.read_timeout()),
                            socket.read_buf(&mut buf)
                        ).await
                    } else {
                        Ok(socket.read_buf(&mut buf).await)
                    }
                } => {
                    let len = match read_result {
                        Ok(Ok(n)) => n,
                        Ok(Err(e)) => bail!("read error: {}", e),
                        Err(_) => bail!("no data received for {} seconds", self.config.read_timeout()),
                    };

                    if len == 0 {
                        // flush any decodable remainder before disconnecting
                        while let Some(frame) = decoder.decode_eof(&mut buf)? {
                            if let Err(e) = self.handle_incoming_frame(frame) {
                                warn!("failed to handle final frame: {}", e);
                            }
                        }
                        bail!("connection closed by peer");
                    }

                    while let Some(frame) = decoder.decode(&mut buf)? {
                        self.compare_datalog(&frame);

                        if let Err(e) = self.handle_incoming_frame(frame) {
                            warn!("failed to handle frame: {}", e);
                            continue;
                        }
                    }
                }
            }
        }

        info!("inverter {}: receiver exiting", self.config.datalog());
        Ok(())
    }

    fn handle_incoming_frame(&self, frame: Frame) -> Result<()> {
        if self
            .channels
            .from_inverter
            .send(ChannelData::Frame(frame))
            .is_err()
        {
            bail!(
                "failed to forward frame from inverter {} - channel closed?",
                self.config.datalog()
            );
        }

        Ok(())
    }

    fn compare_datalog(&self, frame: &Frame) {
        if let (Some(expected), Some(got)) = (self.config.datalog, frame.datalog()) {
            if expected != got {
                warn!(
                    "datalog serial mismatch found; frame={}, config={} - please check config!",
                    got, expected
                );
            }
        }
    }
}
