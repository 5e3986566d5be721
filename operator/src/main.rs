use anyhow::{bail, Context, Result};
use bridge_shared::stream::{write_envelope, FrameReader};
use bridge_shared::{
    envelope::Payload, topics, CommandRequest, CommandResponse, Envelope, StatusSnapshot, Twist,
    Vector3,
};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "bridge-operator", version, about = "Operator console for the flight bridge")]
struct Cli {
    /// Bridge address
    #[arg(long, default_value = "127.0.0.1:11411")]
    addr: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Takeoff,
    Land,
    RotateCw,
    RotateCcw,
    Stop,
    /// Stream a velocity vector: linear x/y/z (m/s) and yaw rate (rad/s)
    #[command(allow_negative_numbers = true)]
    Velocity {
        x: f64,
        y: f64,
        z: f64,
        yaw_rate: f64,
        /// Send every 100 ms until interrupted
        #[arg(long)]
        repeat: bool,
    },
    /// Print status and acknowledgments until interrupted
    Monitor,
}

impl Command {
    fn service(&self) -> Option<&'static str> {
        match self {
            Command::Takeoff => Some(topics::TAKEOFF),
            Command::Land => Some(topics::LAND),
            Command::RotateCw => Some(topics::ROTATE_CW),
            Command::RotateCcw => Some(topics::ROTATE_CCW),
            Command::Stop => Some(topics::STOP),
            Command::Velocity { .. } | Command::Monitor => None,
        }
    }
}

struct Link {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    sequence_id: u64,
}

impl Link {
    async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect to {}", addr))?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(reader),
            writer,
            sequence_id: 0,
        })
    }

    async fn send(&mut self, payload: Payload) -> Result<()> {
        self.sequence_id += 1;
        write_envelope(&mut self.writer, &Envelope::new(self.sequence_id, payload)).await?;
        Ok(())
    }

    /// Next envelope, `None` once the bridge hangs up
    async fn recv(&mut self) -> Result<Option<Envelope>> {
        Ok(self.reader.recv().await?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut link = Link::connect(&cli.addr).await?;

    if let Some(service) = cli.cmd.service() {
        return call(&mut link, service).await;
    }

    match cli.cmd {
        Command::Velocity {
            x,
            y,
            z,
            yaw_rate,
            repeat,
        } => {
            let twist = Twist::new(Vector3::new(x, y, z), Vector3::new(0.0, 0.0, yaw_rate));
            velocity(&mut link, twist, repeat).await
        }
        Command::Monitor => monitor(&mut link).await,
        _ => Ok(()),
    }
}

async fn call(link: &mut Link, service: &str) -> Result<()> {
    let request = CommandRequest::new(1, service);
    println!("Calling {}", request.service);
    link.send(Payload::Request(request)).await?;

    let response = tokio::time::timeout(RESPONSE_TIMEOUT, wait_response(link, 1))
        .await
        .context("no response from bridge")??;

    if response.ok {
        println!("  ok");
        Ok(())
    } else {
        bail!("{} failed: {}", service, response.error)
    }
}

async fn wait_response(link: &mut Link, request_id: u64) -> Result<CommandResponse> {
    loop {
        match link.recv().await? {
            Some(Envelope {
                payload: Some(Payload::Response(response)),
                ..
            }) if response.request_id == request_id => return Ok(response),
            Some(_) => continue,
            None => bail!("bridge closed the connection"),
        }
    }
}

async fn velocity(link: &mut Link, twist: Twist, repeat: bool) -> Result<()> {
    println!(
        "Sending {}: linear=({}, {}, {}) yaw_rate={}",
        topics::CMD_VEL,
        twist.linear().x,
        twist.linear().y,
        twist.linear().z,
        twist.angular().z
    );
    if !repeat {
        return link.send(Payload::Velocity(twist)).await;
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            _ = ticker.tick() => link.send(Payload::Velocity(twist.clone())).await?,
            _ = tokio::signal::ctrl_c() => {
                println!("Sending zero velocity");
                return link.send(Payload::Velocity(Twist::new(Vector3::default(), Vector3::default()))).await;
            }
        }
    }
}

async fn monitor(link: &mut Link) -> Result<()> {
    println!("Monitoring {} and {}", topics::STATUS, topics::DONE);
    loop {
        let envelope = tokio::select! {
            frame = link.recv() => match frame? {
                Some(envelope) => envelope,
                None => {
                    println!("Bridge disconnected");
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };

        match envelope.payload {
            Some(Payload::Status(report)) => match report.data.parse::<StatusSnapshot>() {
                Ok(status) => println!(
                    "seq={} STATUS: battery={:.1}% connected={} motors={} flying={} altitude={:.1}m",
                    envelope.sequence_id,
                    status.battery,
                    status.is_connected,
                    status.are_motors_on,
                    status.is_flying,
                    status.altitude
                ),
                Err(e) => eprintln!("seq={} bad status {:?}: {}", envelope.sequence_id, report.data, e),
            },
            Some(Payload::Done(_)) => println!("seq={} DONE", envelope.sequence_id),
            _ => {}
        }
    }
}
