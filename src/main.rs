use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use camlink::actuator::{ActuatorController, GpioSettings};
use camlink::config::{
    CONTROL_PORT, DEFAULT_ACK_TIMEOUT, DEFAULT_JOIN_TIMEOUT, DEFAULT_KILL_GRACE, DEFAULT_LED_PINS,
    DEFAULT_POLL_INTERVAL, DEFAULT_STATUS_POLL, NodeConfig, VIDEO_PORT, ViewerConfig,
    socket_address,
};
use camlink::control::console::{ConsoleInput, USAGE};
use camlink::control::{ControlClient, ControlServer};
use camlink::core::{FrameCache, snapshot};
use camlink::media::description::CaptureSettings;
use camlink::session::PipelineSupervisor;

/// Camera link between a capture node and a viewer:
/// - node: UDP control server driving LEDs, optional RTP/H.264 camera stream
/// - viewer: GStreamer receive pipeline plus an interactive command console
#[derive(Parser, Debug)]
#[command(name = "camlink")]
#[command(about = "📷 Stream a camera to a viewer and switch its LEDs over UDP")]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run on the camera node: control server and optional stream
    Serve(ServeArgs),
    /// Watch the stream and send commands interactively
    View(ViewArgs),
    /// Send one command; exit status 0 only when acknowledged
    Send(SendArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Interface the control server binds
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(long, default_value_t = CONTROL_PORT)]
    port: u16,

    /// Configured LED pins (BCM numbering)
    #[arg(long = "pins", value_delimiter = ',', default_values_t = DEFAULT_LED_PINS)]
    pins: Vec<u32>,

    /// Stream the camera to this viewer host
    #[arg(long, value_name = "HOST")]
    stream_to: Option<String>,

    #[arg(long, default_value_t = VIDEO_PORT)]
    video_port: u16,

    #[arg(long, default_value_t = 1920)]
    width: u32,

    #[arg(long, default_value_t = 1080)]
    height: u32,

    #[arg(long, default_value_t = 15)]
    framerate: u32,

    /// Encoder bitrate in bits per second
    #[arg(long, default_value_t = 2_000_000)]
    bitrate: u32,

    /// Never touch GPIO hardware
    #[arg(long)]
    mock_gpio: bool,

    #[arg(long, default_value = camlink::actuator::gpio::SYSFS_GPIO_ROOT)]
    gpio_root: PathBuf,

    /// Offset added to every pin number (gpiochip base)
    #[arg(long, default_value_t = 0)]
    gpio_base: u32,

    /// Receive loop poll interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    poll_ms: u64,

    /// Delay before SIGKILL when stopping the stream, in milliseconds
    #[arg(long, default_value_t = DEFAULT_KILL_GRACE.as_millis() as u64)]
    kill_grace_ms: u64,
}

impl ServeArgs {
    fn into_config(self) -> NodeConfig {
        let capture = self.stream_to.map(|host| CaptureSettings {
            width: self.width,
            height: self.height,
            framerate: self.framerate,
            bitrate: self.bitrate,
            ..CaptureSettings::new(host, self.video_port)
        });
        NodeConfig {
            bind_host: self.bind,
            control_port: self.port,
            led_pins: self.pins,
            poll_interval: Duration::from_millis(self.poll_ms),
            gpio: GpioSettings {
                sysfs_root: self.gpio_root,
                base: self.gpio_base,
                force_mock: self.mock_gpio,
            },
            capture,
            kill_grace: Duration::from_millis(self.kill_grace_ms),
        }
    }
}

#[derive(Args, Debug)]
struct ViewArgs {
    /// Node address, HOST or HOST:PORT
    #[arg(long)]
    server: String,

    #[arg(long, default_value_t = VIDEO_PORT)]
    video_port: u16,

    /// Decode into the frame cache instead of a window (enables `save`)
    #[arg(long, conflicts_with = "no_video")]
    frames: bool,

    /// Console only, no video pipeline
    #[arg(long)]
    no_video: bool,

    /// Wait for each acknowledgment, in milliseconds
    #[arg(long, default_value_t = DEFAULT_ACK_TIMEOUT.as_millis() as u64)]
    ack_timeout_ms: u64,

    /// Pipeline status poll interval, in milliseconds
    #[arg(long, default_value_t = DEFAULT_STATUS_POLL.as_millis() as u64)]
    status_poll_ms: u64,
}

impl ViewArgs {
    fn config(&self) -> ViewerConfig {
        ViewerConfig {
            server: self.server.clone(),
            video_port: self.video_port,
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            status_poll: Duration::from_millis(self.status_poll_ms),
            ..ViewerConfig::default()
        }
    }
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Node address, HOST or HOST:PORT
    #[arg(long)]
    server: String,

    #[arg(long, default_value_t = DEFAULT_ACK_TIMEOUT.as_millis() as u64)]
    ack_timeout_ms: u64,

    /// Wire command, e.g. `LED ON 17` or `SET 27 1`
    #[arg(required = true, num_args = 1..)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.mode {
        Mode::Serve(args) => serve(args).await.map(|()| ExitCode::SUCCESS),
        Mode::View(args) => view(args).await.map(|()| ExitCode::SUCCESS),
        Mode::Send(args) => send(args).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = args.into_config();
    config.validate()?;

    let actuators = Arc::new(ActuatorController::open(&config.led_pins, &config.gpio));
    let server = ControlServer::bind(
        &config.bind_address(),
        Arc::clone(&actuators),
        config.poll_interval,
    )
    .await
    .context("failed to start control server")?;
    println!(
        "🎛  Control server on {} ({} GPIO, pins {:?})",
        server.local_addr(),
        actuators.mode(),
        config.led_pins
    );

    #[cfg(unix)]
    let capture = match &config.capture {
        Some(settings) => {
            let process = camlink::capture::CaptureProcess::spawn(&settings.command_line())
                .context("failed to start camera stream")?;
            println!(
                "📡 Streaming to {}:{}",
                settings.client_host, settings.video_port
            );
            Some(process)
        }
        None => None,
    };
    #[cfg(not(unix))]
    if config.capture.is_some() {
        anyhow::bail!("camera streaming needs a unix host");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    println!("Shutting down...");

    #[cfg(unix)]
    if let Some(mut process) = capture {
        let grace = config.kill_grace;
        tokio::task::spawn_blocking(move || process.terminate(grace))
            .await
            .context("capture shutdown task failed")??;
    }

    server.stop();
    if !server.join(DEFAULT_JOIN_TIMEOUT).await {
        tracing::warn!("control server did not stop within {DEFAULT_JOIN_TIMEOUT:?}");
    }
    actuators.shutdown();
    Ok(())
}

async fn view(args: ViewArgs) -> Result<()> {
    let config = args.config();
    config.validate()?;

    let client = ControlClient::new(config.control_address());
    let cache = Arc::new(FrameCache::new());
    let supervisor = if args.no_video {
        None
    } else {
        Some(start_video(&config, args.frames, &cache)?)
    };

    println!("🎛  Sending commands to {}", client.server());
    println!("{USAGE}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut watch = tokio::time::interval(Duration::from_millis(500));
    let mut session_reported = false;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read console input")? else {
                    break;
                };
                match ConsoleInput::parse(&line) {
                    ConsoleInput::Send(command) => {
                        let delivery = client.send(&command, config.ack_timeout).await;
                        println!("{command}: {delivery}");
                    }
                    ConsoleInput::Save(path) => save_frame(&cache, path, args.frames),
                    ConsoleInput::Quit => break,
                    ConsoleInput::Empty => {}
                    ConsoleInput::Invalid => println!("{USAGE}"),
                }
            }
            _ = watch.tick() => {
                if let Some(supervisor) = &supervisor {
                    report_session_end(supervisor, &mut session_reported);
                }
            }
        }
    }

    if let Some(supervisor) = supervisor {
        supervisor.stop();
        let timeout = config.join_timeout;
        let joined = tokio::task::spawn_blocking(move || supervisor.join(timeout))
            .await
            .context("pipeline shutdown task failed")?;
        if !joined {
            tracing::warn!("pipeline thread did not exit within {timeout:?}");
        }
    }
    Ok(())
}

#[cfg(feature = "gstreamer")]
fn start_video(
    config: &ViewerConfig,
    frames: bool,
    cache: &Arc<FrameCache>,
) -> Result<PipelineSupervisor> {
    use camlink::media::MediaBackend;
    use camlink::media::description::{
        APPSINK_NAME, appsink_pipeline, display_pipeline, select_sink, sink_candidates,
    };
    use camlink::media::gst::GstBackend;

    let backend = GstBackend;
    backend.init().context("GStreamer is not available")?;
    let supervisor = PipelineSupervisor::new(Arc::new(backend), config.status_poll);

    if frames {
        let description = appsink_pipeline(config.video_port, APPSINK_NAME);
        supervisor.start_with_frames(&description, APPSINK_NAME, Arc::clone(cache))?;
    } else {
        let sink = select_sink(sink_candidates(std::env::consts::OS), |name| {
            backend.has_element(name)
        });
        supervisor.start(&display_pipeline(config.video_port, sink))?;
    }
    println!("📺 Receiving video on UDP port {}", config.video_port);
    Ok(supervisor)
}

#[cfg(not(feature = "gstreamer"))]
fn start_video(
    _config: &ViewerConfig,
    _frames: bool,
    _cache: &Arc<FrameCache>,
) -> Result<PipelineSupervisor> {
    anyhow::bail!("built without the `gstreamer` feature; run with --no-video")
}

fn report_session_end(supervisor: &PipelineSupervisor, reported: &mut bool) {
    let state = supervisor.state();
    if *reported || !state.is_terminal() {
        return;
    }
    *reported = true;
    match supervisor.last_error() {
        Some(error) => println!("⚠️  Video session ended in {state}: {}", error.message),
        None => println!("Video session ended ({state})"),
    }
}

fn save_frame(cache: &FrameCache, path: Option<PathBuf>, frames_enabled: bool) {
    let Some(frame) = cache.latest() else {
        if frames_enabled {
            println!("No frame received yet");
        } else {
            println!("No frames cached; start the viewer with --frames to save");
        }
        return;
    };
    let path = path.unwrap_or_else(snapshot::default_file_name);
    match snapshot::save_png(&frame, &path) {
        Ok(()) => println!("💾 Saved frame {} to {}", frame.sequence, path.display()),
        Err(e) => println!("❌ {e}"),
    }
}

async fn send(args: SendArgs) -> Result<ExitCode> {
    let server = socket_address(&args.server, CONTROL_PORT);
    let command = args.command.join(" ");
    let client = ControlClient::new(server);
    let delivery = client
        .send(&command, Duration::from_millis(args.ack_timeout_ms))
        .await;
    println!("{command}: {delivery}");
    Ok(if delivery.is_acknowledged() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
