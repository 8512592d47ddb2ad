//! TCP line server: the ingress and egress shell around the coordinator
//!
//! One task per connection. Every input line is decoded by
//! [`parse_command`]; anything malformed is answered here and never reaches
//! the ledger. Input bytes that are not UTF-8 are decoded lossily, and lines
//! longer than [`MAX_LINE_LENGTH`] are refused without being buffered.
//! Replies are followed by the prompt again.
//!
//! | Input                    | Reply                                   |
//! |--------------------------|-----------------------------------------|
//! | `72`                     | accepted block as JSON                  |
//! | `72 alice`               | same, minted by `alice`                 |
//! | `stake alice 10`         | new stake total                         |
//! | `next`                   | weighted-random eligible producer       |
//! | `chain`                  | whole chain as JSON                     |
//! | `metrics`                | Prometheus text exposition (multi-line) |
//!
//! Each connection also receives the chain as JSON every
//! `dump_interval_secs`; that timer belongs to the connection task and ends
//! with it. A single observer task logs every [`ChainEvent`].

use crate::{
    config::ServerConfig,
    coordinator::{ChainEvent, CoordinatorHandle},
    store::AppendOutcome,
    types::ProducerId,
    Result,
};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Line written after every reply
pub const PROMPT: &str = "Enter a new BPM";

/// Longest accepted input line in bytes, newline excluded
pub const MAX_LINE_LENGTH: usize = 1024;

/// A decoded input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Submit a measurement
    Submit {
        /// Measurement value
        payload: i64,
        /// Minting validator, if any
        producer: Option<ProducerId>,
    },
    /// Add validator stake
    Stake {
        /// Validator
        producer: ProducerId,
        /// Stake to add
        amount: u64,
    },
    /// Ask which validator should mint next
    Next,
    /// Dump the chain
    Chain,
    /// Render Prometheus metrics
    Metrics,
}

/// Decode one input line.
///
/// The error string is sent back to the client verbatim.
pub fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let input = line.trim();
    let mut parts = input.split_whitespace();

    match parts.next() {
        Some("chain") if parts.next().is_none() => Ok(Command::Chain),
        Some("next") if parts.next().is_none() => Ok(Command::Next),
        Some("metrics") if parts.next().is_none() => Ok(Command::Metrics),
        Some("stake") => {
            let (Some(producer), Some(amount), None) = (parts.next(), parts.next(), parts.next())
            else {
                return Err("usage: stake <producer> <amount>".to_string());
            };
            let amount: u64 = amount
                .parse()
                .map_err(|e| format!("{} not a number: {}", amount, e))?;
            Ok(Command::Stake {
                producer: ProducerId::new(producer),
                amount,
            })
        }
        Some(value) => {
            let payload: i64 = value
                .parse()
                .map_err(|e| format!("{} not a number: {}", input, e))?;
            let producer = parts.next().map(ProducerId::new);
            if parts.next().is_some() {
                return Err(format!("{} not a number: trailing input", input));
            }
            Ok(Command::Submit { payload, producer })
        }
        None => Err("empty input, try again".to_string()),
    }
}

/// Bound TCP shell
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    handle: CoordinatorHandle,
    config: ServerConfig,
}

impl Server {
    /// Bind to `config.listen_addr`
    pub async fn bind(config: ServerConfig, handle: CoordinatorHandle) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        info!(addr = %listener.local_addr()?, "Listening for producers");

        Ok(Self {
            listener,
            handle,
            config,
        })
    }

    /// Actual bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let observer = spawn_observer(&self.handle, shutdown.resubscribe());
        let dump_interval = match self.config.dump_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    let span = tracing::info_span!("connection", id = %Uuid::new_v4(), %peer);
                    let handle = self.handle.clone();
                    let shutdown = shutdown.resubscribe();
                    tokio::spawn(
                        async move {
                            let result =
                                handle_connection(stream, handle, dump_interval, shutdown).await;
                            if let Err(e) = result {
                                warn!("Connection ended with error: {}", e);
                            }
                        }
                        .instrument(span),
                    );
                }

                _ = shutdown.recv() => break,
            }
        }

        info!("Server shutting down");
        if let Err(e) = observer.await {
            warn!("Chain event observer failed: {}", e);
        }
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    handle: CoordinatorHandle,
    dump_interval: Option<Duration>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    debug!("Producer connected");
    let (reader, mut writer) = stream.into_split();
    let mut lines = LineReader::new(BufReader::new(reader));
    let mut dump = dump_interval.map(|period| {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    });

    write_line(&mut writer, PROMPT).await?;

    loop {
        tokio::select! {
            input = lines.next_line() => {
                let reply = match input? {
                    Input::Line(line) => respond(&handle, &line).await?,
                    Input::TooLong => {
                        warn!(max = MAX_LINE_LENGTH, "Input line too long");
                        format!("line longer than {} bytes, try again", MAX_LINE_LENGTH)
                    }
                    Input::Eof => break,
                };
                write_line(&mut writer, &reply).await?;
                write_line(&mut writer, PROMPT).await?;
            }

            _ = tick(&mut dump) => {
                let chain = serde_json::to_string(&handle.snapshot())?;
                write_line(&mut writer, &chain).await?;
            }

            _ = shutdown.recv() => break,
        }
    }

    debug!("Producer disconnected");
    Ok(())
}

/// Produce the reply line for one input line
async fn respond(handle: &CoordinatorHandle, line: &str) -> Result<String> {
    let command = match parse_command(line) {
        Ok(command) => command,
        Err(message) => {
            warn!("{}", message);
            return Ok(message);
        }
    };

    let reply = match command {
        Command::Submit { payload, producer } => match handle.submit(payload, producer).await? {
            AppendOutcome::Accepted(block) => serde_json::to_string(&block)?,
            AppendOutcome::Rejected(rejection) => format!("rejected: {}, try again", rejection),
        },
        Command::Stake { producer, amount } => {
            let total = handle.register_validator(producer.clone(), amount);
            format!("registered {} with stake {}", producer, total)
        }
        Command::Next => match handle.select_producer() {
            Some(producer) => format!("next producer: {}", producer),
            None => "no eligible producer".to_string(),
        },
        Command::Chain => serde_json::to_string(&handle.snapshot())?,
        Command::Metrics => handle.metrics().render()?.trim_end().to_string(),
    };

    Ok(reply)
}

/// One unit of connection input
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Line(String),
    TooLong,
    Eof,
}

/// Newline-delimited reader with a length cap.
///
/// Partial input stays in `buf`, so `next_line` is safe to cancel inside
/// `select!`. After an over-long line the rest of it is discarded up to the
/// next newline.
#[derive(Debug)]
struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
    discarding: bool,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            discarding: false,
        }
    }

    async fn next_line(&mut self) -> io::Result<Input> {
        loop {
            // One past the cap so an over-long line is detectable
            let limit = (MAX_LINE_LENGTH + 1).saturating_sub(self.buf.len()) as u64;
            let read = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.buf)
                .await?;

            if read == 0 {
                if self.buf.is_empty() || self.discarding {
                    return Ok(Input::Eof);
                }
                return Ok(Input::Line(self.take_line()));
            }

            if self.buf.last() == Some(&b'\n') {
                if self.discarding {
                    self.discarding = false;
                    self.buf.clear();
                    continue;
                }
                return Ok(Input::Line(self.take_line()));
            }

            if self.buf.len() > MAX_LINE_LENGTH {
                self.buf.clear();
                if !self.discarding {
                    self.discarding = true;
                    return Ok(Input::TooLong);
                }
            }
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        line
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn write_line<W: AsyncWriteExt + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

/// Log every chain event until shutdown
pub fn spawn_observer(
    handle: &CoordinatorHandle,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let mut subscription = handle.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = subscription.recv() => match event {
                    Some(event) => log_event(&event),
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
    })
}

fn log_event(event: &ChainEvent) {
    match event {
        ChainEvent::TipAdvanced(block) => info!(
            index = block.index,
            payload = block.payload,
            hash = %block.hash,
            producer = ?block.producer,
            "Tip advanced"
        ),
        ChainEvent::ChainReplaced { len, tip } => {
            info!(len, tip_hash = %tip.hash, "Chain replaced")
        }
        ChainEvent::Unchanged { tip_index } => debug!(tip_index, "Chain unchanged"),
    }
}
