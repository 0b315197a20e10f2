use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use sharc::{Compression, Framing};
use shcore::FourCC;
use thiserror::Error;

pub const DEFAULT_INPUT_DIR: &str = "Resources/WhereWindsMeet/dx12";
pub const DEFAULT_OUTPUT_DIR: &str = "Outputs/WhereWindsMeet/shader_cache_extracted";

#[derive(Parser, Debug)]
#[command(name = "shcache")]
#[command(about = "Split DX12 shader caches into blobs and extract their shader bitcode")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split, decompress and extract every cache file in a directory
    Run(RunArgs),

    /// Extract a chunk from one decompressed DXBC container
    Extract {
        file: PathBuf,

        /// Where to write the payload, next to FILE by default
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        #[arg(short, long)]
        tag: Option<FourCC>,

        #[command(flatten)]
        tools: ToolArgs,
    },

    /// Print the blob table of a cache file or the chunks of a DXBC container
    Inspect {
        file: PathBuf,

        #[arg(long)]
        framing: Option<Framing>,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[arg(short, long)]
    pub input_dir: Option<PathBuf>,

    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Only process the cache file with this name (with or without extension)
    #[arg(long, value_name = "NAME")]
    pub single: Option<String>,

    /// Worker threads
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Chunk to extract
    #[arg(short, long)]
    pub tag: Option<FourCC>,

    #[arg(long)]
    pub framing: Option<Framing>,

    #[arg(long)]
    pub compression: Option<Compression>,

    /// Reuse decompressed parts from an earlier run instead of splitting
    #[arg(long)]
    pub skip_split: bool,

    /// Stop after decompression
    #[arg(long)]
    pub skip_extract: bool,

    #[command(flatten)]
    pub tools: ToolArgs,
}

/// Disassembler flags shared by `run` and `extract`.
#[derive(Args, Debug, Default)]
pub struct ToolArgs {
    /// Do not run any disassembler
    #[arg(long)]
    pub skip_ir: bool,

    /// Path to llvm-dis
    #[arg(long, value_name = "PATH")]
    pub llvm_dis: Option<PathBuf>,

    /// Path to dxc
    #[arg(long, value_name = "PATH")]
    pub dxc: Option<PathBuf>,

    /// Arguments passed to dxc before the container, e.g. "-dumpbin -all"
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true, value_delimiter = ' ')]
    pub dxc_args: Option<Vec<String>>,
}

// Configuration
#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub extension: Option<String>,
    pub recursive: bool,
    pub jobs: Option<usize>,

    pub tag: Option<FourCC>,
    pub framing: Option<Framing>,
    pub compression: Option<Compression>,
    pub max_decompressed_size: Option<usize>,

    pub skip_ir: bool,
    pub llvm_dis: Option<PathBuf>,
    pub dxc: Option<PathBuf>,
    pub dxc_args: Option<Vec<String>>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("input directory {0:?} does not exist")]
    MissingInput(PathBuf),
    #[error("no cache file named {0:?} in the input directory")]
    MissingSingle(String),
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let Some(path) = path else {
            return Ok(Config::default());
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved settings of a `run`.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub extension: String,
    pub recursive: bool,
    pub single: Option<String>,
    pub jobs: usize,

    pub tag: FourCC,
    pub framing: Framing,
    pub compression: Compression,
    pub max_decompressed_size: usize,

    pub skip_split: bool,
    pub skip_extract: bool,
    pub tools: ToolSettings,
}

/// Resolved disassembler settings. `dxc_args` of `None` keeps dxc's
/// fallback argument sets.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSettings {
    pub skip_ir: bool,
    pub llvm_dis: PathBuf,
    pub dxc: PathBuf,
    pub dxc_args: Option<Vec<String>>,
}

impl ToolSettings {
    pub fn resolve(args: ToolArgs, config: &Config) -> ToolSettings {
        ToolSettings {
            skip_ir: args.skip_ir || config.skip_ir,
            llvm_dis: args
                .llvm_dis
                .or_else(|| config.llvm_dis.clone())
                .unwrap_or_else(|| PathBuf::from("llvm-dis")),
            dxc: args
                .dxc
                .or_else(|| config.dxc.clone())
                .unwrap_or_else(|| PathBuf::from("dxc")),
            dxc_args: args.dxc_args.or_else(|| config.dxc_args.clone()),
        }
    }
}

pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Settings {
    /// Command line over config file over defaults.
    pub fn resolve(args: RunArgs, config: Config) -> Settings {
        let tools = ToolSettings::resolve(args.tools, &config);
        Settings {
            input_dir: args
                .input_dir
                .or(config.input_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_DIR)),
            output_dir: args
                .output_dir
                .or(config.output_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            extension: config.extension.unwrap_or_else(|| "cache".to_string()),
            recursive: config.recursive,
            single: args.single,
            jobs: args.jobs.or(config.jobs).unwrap_or_else(default_jobs).max(1),

            tag: args.tag.or(config.tag).unwrap_or(FourCC(*b"DXIL")),
            framing: args.framing.or(config.framing).unwrap_or_default(),
            compression: args.compression.or(config.compression).unwrap_or_default(),
            max_decompressed_size: config
                .max_decompressed_size
                .unwrap_or(sharc::decompress::DEFAULT_MAX_DECOMPRESSED_SIZE),

            skip_split: args.skip_split,
            skip_extract: args.skip_extract,
            tools,
        }
    }
}
