mod codec;
mod events;
mod hosts;
mod paxos;
mod pool;
mod proposal;
mod router;
mod state;

#[macro_use]
extern crate log;

use {
    clap::Parser,
    env_logger::{fmt::Color, Builder},
    log::{Level, LevelFilter},
    std::{
        env,
        io::{self, Write},
        path::PathBuf,
        process::exit,
        str::FromStr,
        time::Duration,
    },
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;
const PORT: u16 = 8080;

/// Single-decree Paxos over a fixed-role cluster described by a hosts
/// manifest.
#[derive(Parser)]
#[command(name = "paxos", version = VERSION, about = "An implementation of single-decree Paxos.")]
struct Cli {
    /// Path to the hosts manifest.
    #[arg(short = 'h', value_name = "PATH")]
    hosts: PathBuf,

    /// Single-character proposal value. First character used.
    #[arg(short = 'v', value_name = "CHAR")]
    value: Option<String>,

    /// Delay, in seconds, before starting the proposer phase.
    #[arg(short = 't', value_name = "SECONDS", default_value_t = 0)]
    delay: u64,
}

fn set_up_logging() {
    Builder::new()
        .filter_module(
            module_path!(),
            LevelFilter::from_str(&env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()))
                .unwrap_or(DEFAULT_LOG_LEVEL),
        )
        .format(|buf, record| {
            let mut style = buf.style();
            style.set_bold(true);
            match record.level() {
                Level::Error => {
                    style.set_color(Color::Red);
                }
                Level::Warn => {
                    style.set_color(Color::Yellow);
                }
                Level::Info => {
                    style.set_color(Color::Green);
                }
                Level::Debug | Level::Trace => {
                    style.set_color(Color::Blue);
                }
            }
            let indent_size = record.level().to_string().len() + 3;
            let indent = &" ".repeat(indent_size);
            let options = textwrap::Options::with_termwidth()
                .initial_indent(indent)
                .subsequent_indent(indent);
            writeln!(
                buf,
                "{} {}",
                style.value(format!("[{}]", record.level())),
                &textwrap::fill(&record.args().to_string(), &options)[indent_size..],
            )
        })
        .init();
}

/// Resolve this process's own hostname, short-formed to match the names
/// that appear in the hosts manifest.
fn local_hostname() -> io::Result<String> {
    let raw = hostname::get()?
        .into_string()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "hostname is not valid UTF-8"))?;
    Ok(hosts::short_hostname(&raw).to_string())
}

fn build_state(cli: &Cli) -> io::Result<state::PeerState> {
    let manifest = hosts::Manifest::read(&cli.hosts).map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error.to_string()))?;

    let me = local_hostname()?;
    let peers = manifest.peers();
    let server_id = hosts::Manifest::peer_id_of(&me, &peers)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error.to_string()))?;
    let server_id = i32::try_from(server_id)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "server id overflowed i32"))?;

    let proposer_id = manifest.proposer_id(&me);
    let acceptors = manifest.acceptors_for(proposer_id);

    let proposal_value = cli
        .value
        .as_ref()
        .and_then(|raw| raw.chars().next())
        .map_or(0, |c| c as i32);

    Ok(state::PeerState::new(server_id, proposer_id, acceptors, proposal_value))
}

#[tokio::main]
async fn main() {
    set_up_logging();

    let cli = Cli::parse();

    let state = match build_state(&cli) {
        Ok(state) => state,
        Err(error) => {
            error!("{error}");
            exit(1);
        }
    };

    if let Err(error) = router::run(PORT, state, Duration::from_secs(cli.delay)).await {
        error!("{error}");
        exit(1);
    }
}
