use clap::{Args, Parser, Subcommand};
use flexi_logger::{Cleanup, Criterion, Duplicate, Naming};
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tether_capture::camera_api::Gphoto2;
use tether_capture::clock::SystemClock;
use tether_capture::config::{CaptureProfile, ConfigRecord};
use tether_capture::parameters::ParameterTables;
use tether_capture::relay::GpioRelay;
use tether_capture::rig::{self, Rig, RigSettings};
use tether_capture::timelapse::encoder::{self, ImageJMacro, StitchJob};
use tether_capture::{CaptureError, Result};

#[derive(Parser, Debug)]
#[command(name = "tether_capture", version, about = "Timed bulb exposures on a tethered DSLR")]
struct Cli {
    #[arg(long, global = true, default_value = "debug")]
    log_level: String,
    #[arg(long, global = true, default_value = "./logs")]
    log_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a capture profile against the attached camera.
    Capture(CaptureArgs),
    /// Watermark a folder of captures and encode it into a video.
    Stitch(StitchArgs),
}

#[derive(Args, Debug)]
struct CaptureArgs {
    #[arg(value_enum)]
    profile: CaptureProfile,
    /// Defaults to `<profile>.conf`.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = ".")]
    tables_dir: PathBuf,
    #[arg(long, default_value = "images")]
    images_dir: PathBuf,
    #[arg(long, default_value_t = rig::DEFAULT_RELAY_PIN)]
    relay_pin: u8,
    #[arg(long, default_value = rig::DEFAULT_CAMERA_MODEL)]
    camera_model: String,
    #[arg(long, default_value = rig::DEFAULT_LOCK_PATTERN)]
    lock_pattern: String,
    #[arg(long, default_value_t = rig::DEFAULT_SETTLE_SECS)]
    settle_secs: f64,
    #[arg(long, default_value_t = rig::DEFAULT_WARM_UP_SECS)]
    warm_up_secs: f64,
    #[arg(long, default_value_t = rig::DEFAULT_DOWNLOAD_WAIT_SECS)]
    download_wait_secs: f64,
    #[arg(long, default_value_t = rig::DEFAULT_PRE_LIGHT_BUFFER_SECS)]
    pre_light_buffer_secs: f64,
    #[arg(long, default_value_t = rig::DEFAULT_CYCLE_GUARD_SECS)]
    cycle_guard_secs: f64,
}

impl CaptureArgs {
    fn rig_settings(&self) -> Result<RigSettings> {
        Ok(RigSettings {
            relay_pin: self.relay_pin,
            camera_model: self.camera_model.clone(),
            lock_pattern: self.lock_pattern.clone(),
            settle: seconds("settle-secs", self.settle_secs)?,
            warm_up: seconds("warm-up-secs", self.warm_up_secs)?,
            download_wait: seconds("download-wait-secs", self.download_wait_secs)?,
            pre_light_buffer: seconds("pre-light-buffer-secs", self.pre_light_buffer_secs)?,
            cycle_guard: seconds("cycle-guard-secs", self.cycle_guard_secs)?,
        })
    }
}

#[derive(Args, Debug)]
struct StitchArgs {
    image_dir: PathBuf,
    #[arg(long, default_value_t = 4)]
    fps: u32,
    #[arg(long, requires_all = ["imagej_macro", "macro_name", "processed_dir"])]
    imagej_jar: Option<PathBuf>,
    #[arg(long, requires = "imagej_jar")]
    imagej_macro: Option<PathBuf>,
    #[arg(long, requires = "imagej_jar")]
    macro_name: Option<String>,
    #[arg(long, requires = "imagej_jar")]
    processed_dir: Option<PathBuf>,
}

fn seconds(flag: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| CaptureError::ConfigValue {
        key: flag.to_string(),
        value: secs.to_string(),
        reason: e.to_string(),
    })
}

fn capture(args: CaptureArgs) -> Result<()> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(args.profile.default_config_file()));
    info!("Loading {} config from {}", args.profile, config_path.display());
    let record = ConfigRecord::load(args.profile, &config_path)?;
    let profile_settings = record.settings()?;
    let tables = ParameterTables::load_dir(&args.tables_dir)?;
    let settings = args.rig_settings()?;

    let relay = GpioRelay::new(settings.relay_pin);
    let mut rig = Rig::new(Gphoto2::new(), relay, SystemClock, tables, settings);
    // SIGINT and SIGTERM end the run through closeout instead of killing the
    // process with the relay still driven
    let stop = rig.stop_flag();
    ctrlc::set_handler(move || {
        warn!("Stop signal received, finishing the current shot and switching the light off");
        stop.raise();
    })?;
    let report = rig.run(&profile_settings, &args.images_dir)?;
    info!(
        "Run finished: {} of {} cycles completed, {} images captured, {} failed{}",
        report.cycles_completed,
        report.cycles_planned,
        report.captured,
        report.failed,
        if report.aborted { " (aborted)" } else { "" }
    );
    Ok(())
}

fn stitch(args: StitchArgs) -> Result<()> {
    let imagej = match (args.imagej_jar, args.imagej_macro, args.macro_name, args.processed_dir) {
        (Some(jar), Some(macro_file), Some(name), Some(output_dir)) => Some(ImageJMacro {
            jar,
            macro_file,
            name,
            output_dir,
        }),
        _ => None,
    };
    let output = encoder::stitch(StitchJob {
        image_dir: args.image_dir,
        input_fps: args.fps,
        imagej,
    })?;
    info!(
        "Encoded {} frames into {}",
        output.frames,
        output.output_path.display()
    );
    Ok(())
}

fn main() {
    use flexi_logger::colored_opt_format;
    let cli = Cli::parse();
    let _logger = match flexi_logger::Logger::with_str(&cli.log_level)
        .format(colored_opt_format)
        .log_to_file()
        .directory(cli.log_dir.clone())
        .duplicate_to_stderr(Duplicate::All)
        .rotate(
            Criterion::Size(500_000),
            Naming::Numbers,
            Cleanup::KeepLogFiles(2),
        )
        .start()
    {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", CaptureError::from(e));
            std::process::exit(1);
        }
    };
    log_panics::init();
    info!("Starting up...");

    let result = match cli.command {
        Commands::Capture(args) => capture(args),
        Commands::Stitch(args) => stitch(args),
    };
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
