//! Webcam Capture CLI
//!
//! Command-line interface for exercising the webcam capture node outside
//! a host application.

use clap::Parser;
use rand_core::{OsRng, RngCore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use webcam_capture::{
    capture::{CaptureRequest, DeviceOpener, FileConfig, MockOpener, OutputConfig},
    metrics::{MetricsRegistry, MetricsSnapshot},
    node::NodeSchema,
    CameraFrameSource, WebcamCaptureNode,
};

#[derive(Debug, Parser)]
#[command(name = "webcam-capture", version, about = "Capture normalized frames from a webcam")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use a synthetic camera instead of real hardware
    #[arg(long)]
    mock: bool,

    /// List available cameras and exit
    #[arg(long)]
    list: bool,

    /// Print the node's input schema and exit
    #[arg(long)]
    schema: bool,

    /// Camera index
    #[arg(long)]
    cam_id: Option<u32>,

    /// Requested frame width
    #[arg(long)]
    width: Option<u32>,

    /// Requested frame height
    #[arg(long)]
    height: Option<u32>,

    /// Normalized brightness (0.0 to 1.0)
    #[arg(long)]
    brightness: Option<f64>,

    /// Exposure steps (-10 to 10)
    #[arg(long, allow_hyphen_values = true)]
    exposure: Option<i32>,

    /// Aperture f-number
    #[arg(long)]
    aperture: Option<f64>,

    /// Automatic exposure (0 or 1)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    autoexp: Option<u8>,

    /// Automatic focus (0 or 1)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    autofocus: Option<u8>,

    /// Automatic white balance (0 or 1)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    autowb: Option<u8>,

    /// Liveness token; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Number of frames to capture
    #[arg(short = 'n', long)]
    count: Option<u32>,

    /// Capture until interrupted
    #[arg(long)]
    continuous: bool,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    metrics_port: Option<u16>,
}

impl Args {
    fn apply(&self, request: &mut CaptureRequest, output: &mut OutputConfig) {
        if let Some(v) = self.cam_id {
            request.device_id = v;
        }
        if let Some(v) = self.width {
            request.width = v;
        }
        if let Some(v) = self.height {
            request.height = v;
        }
        if let Some(v) = self.brightness {
            request.brightness = v;
        }
        if let Some(v) = self.exposure {
            request.exposure = v;
        }
        if let Some(v) = self.aperture {
            request.aperture = v;
        }
        if let Some(v) = self.autoexp {
            request.auto_exposure = v != 0;
        }
        if let Some(v) = self.autofocus {
            request.autofocus = v != 0;
        }
        if let Some(v) = self.autowb {
            request.auto_white_balance = v != 0;
        }
        request.seed = self.seed.unwrap_or_else(|| OsRng.next_u64());

        if let Some(v) = self.count {
            output.frame_count = v;
        }
        if self.continuous {
            output.continuous = true;
        }
        if let Some(v) = self.metrics_port {
            output.metrics_port = v;
        }
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.schema {
        print_schema();
        return;
    }
    if args.list {
        list_devices();
        return;
    }

    let mut config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    args.apply(&mut config.request, &mut config.output);

    if let Err(e) = config.request.validate() {
        eprintln!("Invalid capture request: {}", e);
        std::process::exit(1);
    }

    info!("Webcam Capture v{}", webcam_capture::VERSION);

    let code = if args.mock {
        info!("Using synthetic camera input");
        run(MockOpener::new(), config)
    } else {
        run_native(config)
    };
    std::process::exit(code);
}

#[cfg(feature = "camera")]
fn run_native(config: FileConfig) -> i32 {
    run(webcam_capture::capture::NokhwaOpener::new(), config)
}

#[cfg(not(feature = "camera"))]
fn run_native(_config: FileConfig) -> i32 {
    eprintln!("Built without camera support; rebuild with --features camera or pass --mock");
    2
}

#[cfg(feature = "camera")]
fn list_devices() {
    match webcam_capture::capture::NokhwaOpener::list_devices() {
        Ok(devices) if devices.is_empty() => println!("No cameras found"),
        Ok(devices) => devices.iter().for_each(|d| println!("{}", d)),
        Err(e) => {
            eprintln!("Failed to query cameras: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "camera"))]
fn list_devices() {
    eprintln!("Built without camera support; rebuild with --features camera");
    std::process::exit(2);
}

fn print_schema() {
    let node = WebcamCaptureNode::new(MockOpener::new());
    match NodeSchema::of(&node).to_toml() {
        Ok(text) => print!("{}", text),
        Err(e) => {
            eprintln!("Failed to render schema: {}", e);
            std::process::exit(1);
        }
    }
}

fn run<O: DeviceOpener>(opener: O, config: FileConfig) -> i32 {
    let FileConfig {
        source: source_config,
        mut request,
        output,
    } = config;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || running.store(false, Ordering::SeqCst)) {
            warn!("Failed to install Ctrl-C handler: {}", e);
        }
    }

    let registry = match MetricsRegistry::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to create metrics registry: {}", e);
            return 1;
        }
    };
    let metrics = spawn_metrics(output.metrics_port, registry);

    let mut source = CameraFrameSource::with_config(opener, source_config);
    let mut captured = 0u32;
    let mut failed = 0u32;

    while running.load(Ordering::SeqCst)
        && (output.continuous || captured + failed < output.frame_count)
    {
        match source.capture(&request) {
            Ok(image) => {
                captured += 1;
                let [r, g, b] = image.channel_means();
                println!(
                    "{} frame {} shape {:?} mean rgb ({:.3}, {:.3}, {:.3})",
                    image.captured_at().to_rfc3339(),
                    captured,
                    image.shape(),
                    r,
                    g,
                    b
                );
            }
            Err(e) => {
                failed += 1;
                error!("Capture failed: {}", e);
                if !output.continuous {
                    break;
                }
            }
        }

        metrics.update(&MetricsSnapshot::from_source(source.state(), source.stats()));
        request.seed = request.seed.wrapping_add(1);
    }

    info!("Captured {} frames, {} failures", captured, failed);
    if failed > 0 {
        1
    } else {
        0
    }
}

/// Where capture loop snapshots go.
enum MetricsSink {
    Local(MetricsRegistry),
    #[cfg(feature = "metrics")]
    Served(Arc<webcam_capture::metrics::MetricsState>),
}

impl MetricsSink {
    fn update(&self, snapshot: &MetricsSnapshot) {
        match self {
            MetricsSink::Local(registry) => registry.update(snapshot),
            #[cfg(feature = "metrics")]
            MetricsSink::Served(state) => state.update(snapshot),
        }
    }
}

#[cfg(feature = "metrics")]
fn spawn_metrics(port: u16, registry: MetricsRegistry) -> MetricsSink {
    use webcam_capture::metrics::{MetricsServer, MetricsServerConfig};

    if port == 0 {
        return MetricsSink::Local(registry);
    }

    let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
    let state = server.state();

    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to start metrics runtime: {}", e);
                return;
            }
        };
        if let Err(e) = runtime.block_on(server.run()) {
            error!("Metrics server stopped: {}", e);
        }
    });

    MetricsSink::Served(state)
}

#[cfg(not(feature = "metrics"))]
fn spawn_metrics(port: u16, registry: MetricsRegistry) -> MetricsSink {
    if port != 0 {
        warn!("Built without the metrics feature; not serving metrics on port {}", port);
    }
    MetricsSink::Local(registry)
}
