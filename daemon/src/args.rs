use clap::{arg, Arg, ArgMatches, Command};
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_LISTEN_GRPC: &str = "127.0.0.1:50141";

#[derive(Debug)]
pub struct Args {
    // NOTE: it is best if property names match config file fields
    pub graph: Option<PathBuf>,
    pub database: Option<String>,
    pub workers: usize,
    pub log_level: String,
    pub log_dir: Option<String>,
    pub command: Subcommand,
}

#[derive(Debug)]
pub enum Subcommand {
    IndexEarliestTimestamps,
    IndexDirectoryMaxLeafTimestamps,
    IndexDirectoryFrontier,
    IndexRelations,
    GrpcServe { bind: SocketAddr },
    GenTestDatabase { out: PathBuf },
}

pub fn cli() -> Command {
    Command::new("provenanced")
        .about(format!("{} v{}", env!("CARGO_PKG_DESCRIPTION"), env!("CARGO_PKG_VERSION")))
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg(
            Arg::new("graph")
                .long("graph")
                .value_name("PATH")
                .env("SWH_PROVENANCE_GRAPH_PATH")
                .global(true)
                .help("Path to the graph snapshot file."),
        )
        .arg(
            Arg::new("database")
                .long("database")
                .value_name("URL")
                .env("SWH_PROVENANCE_DB_URL")
                .global(true)
                .help("Table store location (a directory path or file:// URL)."),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .value_name("N")
                .global(true)
                .help("Worker threads for builder stages and query lookups (default: all cores)."),
        )
        .arg(
            Arg::new("log_level")
                .short('d')
                .long("loglevel")
                .value_name("log_level")
                .default_value("info")
                .num_args(0..=1)
                .require_equals(true)
                .global(true)
                .help("Specify log level."),
        )
        .arg(arg!(--logdir <LOG_DIR> "Directory to log output.").global(true))
        .subcommand(
            Command::new("index")
                .about("Build the provenance tables from a graph snapshot")
                .subcommand_required(true)
                .subcommand(Command::new("earliest-timestamps").about("Stage A: per-content earliest committer dates"))
                .subcommand(
                    Command::new("directory-max-leaf-timestamps").about("Stage B: per-directory max leaf timestamps"),
                )
                .subcommand(Command::new("directory-frontier").about("Stage C: frontier directory selection"))
                .subcommand(Command::new("relations").about("Stage D: relation tables and the nodes table")),
        )
        .subcommand(
            Command::new("grpc-serve").about("Serve provenance queries over gRPC").arg(
                Arg::new("bind")
                    .long("bind")
                    .value_name("ADDR")
                    .default_value(DEFAULT_LISTEN_GRPC)
                    .help("Interface:port to listen for gRPC connections."),
            ),
        )
        .subcommand(
            Command::new("gen-test-database")
                .about("Generate a deterministic fixture graph and its tables")
                .arg(arg!(--out <PATH> "Output directory.").required(true)),
        )
}

impl Args {
    /// Parses the process arguments; exits with a usage error on bad input
    /// (argument errors are exit code 1, which clap's error exit provides).
    pub fn parse() -> Result<Args, clap::Error> {
        let matches = cli().try_get_matches()?;
        let command = match matches.subcommand() {
            Some(("index", index)) => match index.subcommand() {
                Some(("earliest-timestamps", _)) => Subcommand::IndexEarliestTimestamps,
                Some(("directory-max-leaf-timestamps", _)) => Subcommand::IndexDirectoryMaxLeafTimestamps,
                Some(("directory-frontier", _)) => Subcommand::IndexDirectoryFrontier,
                Some(("relations", _)) => Subcommand::IndexRelations,
                _ => unreachable!("subcommand is required"),
            },
            Some(("grpc-serve", serve)) => {
                let bind = serve.get_one::<String>("bind").expect("bind has a default");
                let bind = bind
                    .parse::<SocketAddr>()
                    .map_err(|e| clap::Error::raw(clap::error::ErrorKind::InvalidValue, format!("--bind {bind}: {e}\n")))?;
                Subcommand::GrpcServe { bind }
            }
            Some(("gen-test-database", generate)) => {
                Subcommand::GenTestDatabase { out: generate.get_one::<String>("out").expect("out is required").into() }
            }
            _ => unreachable!("subcommand is required"),
        };
        Ok(Self::from_matches(&matches, command))
    }

    fn from_matches(matches: &ArgMatches, command: Subcommand) -> Args {
        let workers = matches
            .get_one::<String>("workers")
            .and_then(|w| w.parse::<usize>().ok())
            .filter(|&w| w > 0)
            .unwrap_or_else(num_cpus::get);
        Args {
            graph: matches.get_one::<String>("graph").map(PathBuf::from),
            database: matches.get_one::<String>("database").cloned(),
            workers,
            log_level: matches.get_one::<String>("log_level").cloned().unwrap(),
            log_dir: matches.get_one::<String>("logdir").cloned(),
            command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_shape() {
        cli().debug_assert();
    }

    #[test]
    fn test_index_subcommands_parse() {
        for stage in ["earliest-timestamps", "directory-max-leaf-timestamps", "directory-frontier", "relations"] {
            let matches = cli()
                .try_get_matches_from(["provenanced", "index", stage, "--graph", "/g", "--database", "/d", "--workers", "4"])
                .unwrap();
            let (_, index) = matches.subcommand().unwrap();
            assert_eq!(index.subcommand().unwrap().0, stage);
        }
    }

    #[test]
    fn test_grpc_serve_default_bind() {
        let matches = cli().try_get_matches_from(["provenanced", "grpc-serve"]).unwrap();
        let (_, serve) = matches.subcommand().unwrap();
        assert_eq!(serve.get_one::<String>("bind").unwrap(), DEFAULT_LISTEN_GRPC);
    }
}
