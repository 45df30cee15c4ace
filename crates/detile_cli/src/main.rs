use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use detile::frame_model::{FrameLayout, REFERENCE_HEIGHT, REFERENCE_WIDTH};
use detile::{DetileOptions, Detiler, Execution};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Convert GPU tiled framebuffer dumps to raster order")]
struct Arguments {
    /// Frame to read, as raw 32-bit words.
    input: PathBuf,
    /// Where to write the converted frame.
    output: PathBuf,
    /// Frame width in pixels (multiple of 32).
    #[arg(long, default_value_t = REFERENCE_WIDTH)]
    width: usize,
    /// Frame height in pixels (multiple of 64).
    #[arg(long, default_value_t = REFERENCE_HEIGHT)]
    height: usize,
    /// Conversion direction.
    #[arg(long, value_enum, default_value = "detile")]
    mode: Mode,
    /// Decode on a pool of this many worker threads (0 picks one per core).
    #[arg(long, short = 'j')]
    jobs: Option<usize>,
    /// Raise log verbosity; RUST_LOG overrides it.
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Mode {
    /// Tiled dump to row-major raster.
    Detile,
    /// Row-major raster back to the tiled layout.
    Retile,
}

impl Mode {
    fn convert(self, detiler: &Detiler, input: &[u8], layout: FrameLayout) -> Result<Vec<u8>> {
        let output = match self {
            Mode::Detile => detiler.detile(input, layout),
            Mode::Retile => detiler.retile(input, layout),
        };
        output.with_context(|| format!("{self:?} {}x{} frame", layout.width(), layout.height()))
    }
}

fn main() -> Result<()> {
    let arguments = Arguments::parse();
    init_tracing(arguments.verbose);
    run(&arguments)
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(arguments: &Arguments) -> Result<()> {
    let layout = FrameLayout::new(arguments.width, arguments.height)
        .context("resolve frame geometry")?;
    let execution = match arguments.jobs {
        Some(_) => Execution::Parallel,
        None => Execution::Sequential,
    };
    let detiler = Detiler::new(DetileOptions { execution }).context("load placement tables")?;

    let input = fs::read(&arguments.input)
        .with_context(|| format!("read input {}", arguments.input.display()))?;
    info!(
        input = %arguments.input.display(),
        bytes = input.len(),
        width = layout.width(),
        height = layout.height(),
        mode = ?arguments.mode,
        "converting frame"
    );

    let started = Instant::now();
    let output = match arguments.jobs {
        Some(jobs) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .context("start worker pool")?;
            info!(threads = pool.current_num_threads(), "using worker pool");
            pool.install(|| arguments.mode.convert(&detiler, &input, layout))?
        }
        None => arguments.mode.convert(&detiler, &input, layout)?,
    };
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "frame converted");

    fs::write(&arguments.output, &output)
        .with_context(|| format!("write output {}", arguments.output.display()))?;
    info!(output = %arguments.output.display(), bytes = output.len(), "wrote frame");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use detile::DetileError;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("detile-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    fn arguments(input: &PathBuf, output: &PathBuf, extra: &[&str]) -> Arguments {
        let mut argv = vec![
            "detile".to_string(),
            input.display().to_string(),
            output.display().to_string(),
        ];
        argv.extend(extra.iter().map(|arg| arg.to_string()));
        Arguments::try_parse_from(argv).expect("parse arguments")
    }

    #[test]
    fn defaults_to_reference_geometry_and_detile() {
        let parsed = Arguments::try_parse_from(["detile", "cb.bin", "out.bin"]).unwrap();
        assert_eq!(parsed.width, 1280);
        assert_eq!(parsed.height, 768);
        assert_eq!(parsed.mode, Mode::Detile);
        assert_eq!(parsed.jobs, None);
        assert_eq!(parsed.verbose, 0);
    }

    #[test]
    fn requires_input_and_output_paths() {
        assert!(Arguments::try_parse_from(["detile", "cb.bin"]).is_err());
        assert!(Arguments::try_parse_from(["detile"]).is_err());
    }

    #[test]
    fn parses_geometry_mode_and_jobs() {
        let parsed = Arguments::try_parse_from([
            "detile", "in", "out", "--width", "64", "--height", "128", "--mode", "retile", "-j",
            "2", "-vv",
        ])
        .unwrap();
        assert_eq!((parsed.width, parsed.height), (64, 128));
        assert_eq!(parsed.mode, Mode::Retile);
        assert_eq!(parsed.jobs, Some(2));
        assert_eq!(parsed.verbose, 2);
    }

    #[test]
    fn retile_then_detile_restores_file() {
        let dir = scratch_dir("round-trip");
        let raster_path = dir.join("raster.bin");
        let tiled_path = dir.join("tiled.bin");
        let restored_path = dir.join("restored.bin");
        let raster: Vec<u8> = (0..64 * 128 * 4).map(|byte: usize| (byte % 251) as u8).collect();
        fs::write(&raster_path, &raster).unwrap();

        run(&arguments(
            &raster_path,
            &tiled_path,
            &["--width", "64", "--height", "128", "--mode", "retile"],
        ))
        .unwrap();
        run(&arguments(
            &tiled_path,
            &restored_path,
            &["--width", "64", "--height", "128", "-j", "2"],
        ))
        .unwrap();

        assert_ne!(fs::read(&tiled_path).unwrap(), raster);
        assert_eq!(fs::read(&restored_path).unwrap(), raster);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn wrong_input_size_fails_without_writing_output() {
        let dir = scratch_dir("short-input");
        let input_path = dir.join("short.bin");
        let output_path = dir.join("out.bin");
        fs::write(&input_path, vec![0u8; 32 * 64 * 4 - 1]).unwrap();

        let error = run(&arguments(
            &input_path,
            &output_path,
            &["--width", "32", "--height", "64"],
        ))
        .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<DetileError>(),
            Some(DetileError::InvalidInputSize { .. })
        ));
        assert!(!output_path.exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_input_reports_path() {
        let dir = scratch_dir("missing-input");
        let input_path = dir.join("absent.bin");
        let error = run(&arguments(&input_path, &dir.join("out.bin"), &[])).unwrap_err();
        assert!(format!("{error:#}").contains("absent.bin"));
        fs::remove_dir_all(&dir).ok();
    }
}
