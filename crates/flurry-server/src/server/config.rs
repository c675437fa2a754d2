use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use flurry_proto::SnowflakeId;
use std::net::SocketAddr;

/// Which front end the main listener speaks.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One-byte batch requests over a raw TCP stream.
    Tcp,
    /// One batch per `POST /g`.
    Http,
    /// A 9P2000 file tree with `clone`, per-session `ctl` and data files.
    #[value(name = "9p")]
    Ninep,
}

/// Runtime configuration for the `flurryd` binary.
///
/// Every option can be given as a flag or through the environment (a `.env`
/// file in the working directory is loaded first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "flurryd",
    version,
    about = "Hands out Snowflake IDs over TCP, HTTP or 9P"
)]
pub struct CliArgs {
    /// Worker ID embedded in every issued ID (0..=31).
    ///
    /// Environment variable: `WORKER_ID`
    #[arg(short = 'w', long, env = "WORKER_ID", default_value_t = 0)]
    pub worker_id: u64,

    /// Datacenter ID embedded in every issued ID (0..=31).
    ///
    /// Environment variable: `DATACENTER_ID`
    #[arg(short = 'd', long, env = "DATACENTER_ID", default_value_t = 0)]
    pub datacenter_id: u64,

    /// Address the main front end listens on.
    ///
    /// Environment variable: `LISTEN_ADDR`
    #[arg(short = 'l', long, env = "LISTEN_ADDR", default_value_t = String::from("0.0.0.0:4444"))]
    pub listen_addr: String,

    /// Unix milliseconds of the last ID issued by a previous run.
    ///
    /// No ID is issued until the clock has passed this timestamp.
    ///
    /// Environment variable: `LAST_TIMESTAMP`
    #[arg(short = 't', long, env = "LAST_TIMESTAMP")]
    pub last_timestamp: Option<u64>,

    /// Front end served on the main listener.
    ///
    /// Environment variable: `MODE`
    #[arg(short = 'm', long, env = "MODE", value_enum, default_value_t = Mode::Tcp)]
    pub mode: Mode,

    /// Port of a second 9P listener exporting only `/stats`. 0 disables it.
    ///
    /// The listener binds the same host as `--listen-addr`.
    ///
    /// Environment variable: `STATS_PORT`
    #[arg(short = 's', long, env = "STATS_PORT", default_value_t = 0)]
    pub stats_port: u16,

    /// Largest count a single `ctl` write may ask for.
    ///
    /// Environment variable: `MAX_BATCH`
    #[arg(long, env = "MAX_BATCH", default_value_t = 1_000_000)]
    pub max_batch: u64,

    /// User reported as owner of every file in the 9P tree.
    ///
    /// Environment variable: `USER`
    #[arg(long, env = "USER", default_value_t = String::from("none"))]
    pub owner: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub worker_id: u64,
    pub datacenter_id: u64,
    pub listen_addr: SocketAddr,
    pub last_timestamp: Option<u64>,
    pub mode: Mode,
    pub stats_addr: Option<SocketAddr>,
    pub max_batch: u64,
    pub owner: String,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.worker_id > SnowflakeId::max_worker_id() {
            bail!(
                "WORKER_ID ({}) must be between 0 and {}",
                args.worker_id,
                SnowflakeId::max_worker_id()
            );
        }

        if args.datacenter_id > SnowflakeId::max_datacenter_id() {
            bail!(
                "DATACENTER_ID ({}) must be between 0 and {}",
                args.datacenter_id,
                SnowflakeId::max_datacenter_id()
            );
        }

        if args.max_batch == 0 {
            bail!("MAX_BATCH must be greater than 0");
        }

        let listen_addr: SocketAddr = args
            .listen_addr
            .parse()
            .with_context(|| format!("invalid LISTEN_ADDR {:?}", args.listen_addr))?;

        let stats_addr = match args.stats_port {
            0 => None,
            port if port == listen_addr.port() => {
                bail!("STATS_PORT ({port}) must differ from the listen port");
            }
            port => Some(SocketAddr::new(listen_addr.ip(), port)),
        };

        Ok(Self {
            worker_id: args.worker_id,
            datacenter_id: args.datacenter_id,
            listen_addr,
            last_timestamp: args.last_timestamp,
            mode: args.mode,
            stats_addr,
            max_batch: args.max_batch,
            owner: args.owner,
        })
    }
}
