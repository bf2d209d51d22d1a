use anyhow::bail;
use blog_tonic_core::types::DEFAULT_SERVER_ADDR;
use clap::{Parser, ValueEnum};
use core::time::Duration;

/// Persistence backend holding the blog collection.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// A MongoDB collection reached through `MONGO_URI`.
    Mongo,
    /// A process-local map. Records are lost when the server exits.
    Memory,
}

/// Console log output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-readable output.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Runtime configuration for the `blog-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults that match a local MongoDB
/// instance.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "blog-tonic-server",
    version,
    about = "A gRPC service for creating, reading, updating, deleting and listing blog posts"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/blog-uds.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from(DEFAULT_SERVER_ADDR))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Which store backs the collection.
    ///
    /// Environment variable: `STORE_BACKEND`
    #[arg(long = "store", env = "STORE_BACKEND", value_enum, default_value_t = StoreBackend::Mongo)]
    pub store: StoreBackend,

    /// Connection string of the MongoDB deployment.
    ///
    /// Environment variable: `MONGO_URI`
    #[arg(long, env = "MONGO_URI", default_value_t = String::from("mongodb://localhost:27017"))]
    pub mongo_uri: String,

    /// Database holding the blog collection.
    ///
    /// Environment variable: `MONGO_DATABASE`
    #[arg(long, env = "MONGO_DATABASE", default_value_t = String::from("blog_with_grpc"))]
    pub database: String,

    /// Collection holding one document per blog post.
    ///
    /// Environment variable: `MONGO_COLLECTION`
    #[arg(long, env = "MONGO_COLLECTION", default_value_t = String::from("blog"))]
    pub collection: String,

    /// Capacity of the buffer between the list cursor and the gRPC stream.
    ///
    /// This affects how many records can be read ahead of the client. Lower
    /// values apply backpressure to the cursor sooner.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight calls to finish during shutdown before
    /// cancelling them.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Console log format.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub store: StoreBackend,
    pub mongo_uri: String,
    pub database: String,
    pub collection: String,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.server_addr.trim().is_empty() {
            bail!("SERVER_ADDR must not be empty");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.store == StoreBackend::Mongo {
            if args.database.is_empty() {
                bail!("MONGO_DATABASE must not be empty");
            }
            if args.collection.is_empty() {
                bail!("MONGO_COLLECTION must not be empty");
            }
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            store: args.store,
            mongo_uri: args.mongo_uri,
            database: args.database,
            collection: args.collection,
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            log_format: args.log_format,
        })
    }
}

#[cfg(test)]
impl ServerConfig {
    /// A config backed by the in-memory store, for tests.
    pub fn for_memory_store() -> Self {
        Self {
            server_addr: String::from("127.0.0.1:0"),
            uds: false,
            store: StoreBackend::Memory,
            mongo_uri: String::new(),
            database: String::new(),
            collection: String::new(),
            stream_buffer_size: 4,
            shutdown_timeout: Duration::from_millis(200),
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let args = CliArgs::try_parse_from(
            core::iter::once("blog-tonic-server").chain(args.iter().copied()),
        )?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn explicit_flags_are_applied() -> anyhow::Result<()> {
        let config = parse(&[
            "--server-addr",
            "127.0.0.1:6000",
            "--store",
            "memory",
            "--stream-buffer-size",
            "16",
            "--shutdown-timeout",
            "7",
            "--log-format",
            "json",
        ])?;

        assert_eq!(config.server_addr, "127.0.0.1:6000");
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.stream_buffer_size, 16);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(7));
        assert_eq!(config.log_format, LogFormat::Json);
        Ok(())
    }

    #[test]
    fn zero_stream_buffer_is_rejected() {
        let err = parse(&["--stream-buffer-size", "0"]).unwrap_err();
        assert!(err.to_string().contains("STREAM_BUFFER_SIZE"));
    }

    #[test]
    fn empty_collection_is_rejected_for_mongo() {
        let err = parse(&["--store", "mongo", "--collection", ""]).unwrap_err();
        assert!(err.to_string().contains("MONGO_COLLECTION"));
    }

    #[test]
    fn memory_store_ignores_mongo_names() -> anyhow::Result<()> {
        let config = parse(&["--store", "memory", "--database", ""])?;
        assert_eq!(config.store, StoreBackend::Memory);
        Ok(())
    }

    #[test]
    fn unknown_backend_fails_to_parse() {
        assert!(CliArgs::try_parse_from(["blog-tonic-server", "--store", "redis"]).is_err());
    }
}
