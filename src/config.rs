use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::{ArgAction, Args, Parser, ValueEnum};

/// Hub repository of the fine-tuned BERT dark pattern classifier.
pub const DEFAULT_MODEL_ID: &str = "asquirous/bert-base-uncased-dark_patterns";
pub const DEFAULT_REVISION: &str = "main";
pub const DEFAULT_PORT: u16 = 5000;

/// Dark Pattern Detection API
#[derive(Debug, Clone, Parser)]
#[command(name = "darkpattern-detector")]
#[command(version)]
#[command(about = "Serves a BERT classifier that flags manipulative UI text")]
pub struct Config {
    /// Interface to bind
    #[arg(long, env = "DARKPATTERN_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "DARKPATTERN_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[command(flatten)]
    pub model: ModelConfig,

    /// Verbosity level (-v, -vv, -vvv); overrides RUST_LOG
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, Clone, Args)]
pub struct ModelConfig {
    /// Hugging Face model repository
    #[arg(long = "model-id", env = "DARKPATTERN_MODEL_ID", default_value = DEFAULT_MODEL_ID)]
    pub model_id: String,

    /// Repository revision (branch, tag or commit)
    #[arg(long, env = "DARKPATTERN_MODEL_REVISION", default_value = DEFAULT_REVISION)]
    pub revision: String,

    /// Compute device for the forward pass
    #[arg(long, env = "DARKPATTERN_DEVICE", value_enum, default_value_t = DeviceKind::Cpu)]
    pub device: DeviceKind,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: DEFAULT_REVISION.to_string(),
            device: DeviceKind::Cpu,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Metal,
}
