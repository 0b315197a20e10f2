use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};
use sharc::Codec;
use shcore::FourCC;
use shtool::{Chain, Disassembler, Dxc, LlvmDis};

mod artifact;
mod batch;
mod cli;
mod discover;
mod error;
mod pipeline;

use crate::batch::{run_batch, CancelToken};
use crate::cli::{Cli, Commands, Config, ConfigError, RunArgs, Settings, ToolSettings};
use crate::pipeline::{Pipeline, PipelineOptions};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Run(args) => match run(args, config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{err}");
                ExitCode::FAILURE
            }
        },
        Commands::Extract {
            file,
            out_dir,
            tag,
            tools,
        } => {
            let tag = tag.or(config.tag).unwrap_or(FourCC(*b"DXIL"));
            let settings = ToolSettings::resolve(tools, &config);
            let skip_ir = settings.skip_ir;
            let chain = disassemblers(settings);
            let tools = (!skip_ir).then_some(&chain as &dyn Disassembler);

            match pipeline::extract_container(&file, out_dir.as_deref(), tag, tools) {
                Ok(out) => {
                    info!("{tag} written to {}", out.display());
                    ExitCode::SUCCESS
                }
                Err(failure) => {
                    error!("{failure}");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Inspect { file, framing } => {
            match pipeline::inspect(&file, framing.or(config.framing).unwrap_or_default()) {
                Ok(text) => {
                    print!("{text}");
                    ExitCode::SUCCESS
                }
                Err(failure) => {
                    error!("{failure}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// llvm-dis first, dxc when llvm-dis is not installed.
fn disassemblers(settings: ToolSettings) -> Chain {
    let mut dxc = Dxc::new(settings.dxc);
    if let Some(args) = settings.dxc_args {
        dxc = dxc.with_args(args);
    }
    let tools: Vec<Box<dyn Disassembler>> = vec![
        Box::new(LlvmDis {
            program: settings.llvm_dis,
        }),
        Box::new(dxc),
    ];
    Chain::new(tools)
}

/// Only configuration problems are fatal, failed files are reported and
/// the run still succeeds.
fn run(args: RunArgs, config: Config) -> Result<(), ConfigError> {
    let settings = Settings::resolve(args, config);
    info!(
        "{} -> {} ({} framing, {} compression, tag {}, {} jobs)",
        settings.input_dir.display(),
        settings.output_dir.display(),
        settings.framing,
        settings.compression,
        settings.tag,
        settings.jobs
    );

    let mut files =
        discover::discover(&settings.input_dir, &settings.extension, settings.recursive)?;
    if let Some(name) = &settings.single {
        files = discover::select_single(files, name)?;
    }
    if files.is_empty() {
        warn!("no .{} files in {}", settings.extension, settings.input_dir.display());
        return Ok(());
    }

    let codec = Codec {
        max_decompressed_size: settings.max_decompressed_size,
        ..Codec::new(settings.compression)
    };
    let options = PipelineOptions {
        tag: settings.tag,
        framing: settings.framing,
        skip_split: settings.skip_split,
        skip_extract: settings.skip_extract,
    };

    let mut pipeline = Pipeline::new(options, Box::new(codec));
    if !settings.tools.skip_ir {
        let tools = disassemblers(settings.tools.clone());
        pipeline = pipeline.with_disassembler(Box::new(tools));
    }

    let report = run_batch(
        &pipeline,
        &settings.input_dir,
        &files,
        &settings.output_dir,
        settings.jobs,
        &CancelToken::new(),
    );

    for file in &report.completed {
        debug!(
            "{}: {} of {} blobs extracted into {}",
            file.file.display(),
            file.extracted,
            file.blobs,
            file.output_dir.display()
        );
    }
    info!("{}", report.summary());
    Ok(())
}
