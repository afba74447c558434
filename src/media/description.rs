//! Pipeline descriptions and the node's capture command line.
//!
//! The receiving side decodes RTP/H.264 arriving on a UDP port. The sending
//! side runs `rpicam-vid` piped into `gst-launch-1.0`, which packetizes and
//! sends to the viewer.

/// Name given to the display sink element.
pub const DISPLAY_SINK_NAME: &str = "videosink";
/// Name given to the appsink in the frame-cache pipeline.
pub const APPSINK_NAME: &str = "framesink";
/// Sink used when no preferred one is present.
pub const FALLBACK_SINK: &str = "autovideosink";

/// Caps of the incoming RTP stream.
pub fn rtp_caps() -> &'static str {
    "application/x-rtp, media=video, clock-rate=90000, encoding-name=H264, payload=96"
}

fn depay_decode(port: u16) -> String {
    format!(
        "udpsrc port={port} caps=\"{}\" ! rtph264depay ! h264parse ! decodebin ! videoconvert",
        rtp_caps()
    )
}

/// Receive, decode and render into `sink`.
pub fn display_pipeline(port: u16, sink: &str) -> String {
    format!(
        "{} ! {sink} name={DISPLAY_SINK_NAME} sync=false",
        depay_decode(port)
    )
}

/// Receive, decode and hand BGR frames to an appsink called `name`.
///
/// The appsink keeps a single buffer and drops older ones, matching the
/// frame cache's freshness policy.
pub fn appsink_pipeline(port: u16, name: &str) -> String {
    format!(
        "{} ! video/x-raw,format=BGR ! appsink sync=false max-buffers=1 drop=true name={name}",
        depay_decode(port)
    )
}

/// Preferred video sinks for an OS (as named by `std::env::consts::OS`).
pub fn sink_candidates(os: &str) -> &'static [&'static str] {
    match os {
        "windows" => &[
            "d3dvideosink",
            "dxgisink",
            "directdrawsink",
            "glimagesink",
            FALLBACK_SINK,
        ],
        "linux" => &["glimagesink", "xvimagesink", "ximagesink", FALLBACK_SINK],
        "macos" => &["glimagesink", FALLBACK_SINK],
        _ => &[FALLBACK_SINK],
    }
}

/// First candidate the framework has, else `autovideosink`.
pub fn select_sink<'a>(candidates: &[&'a str], available: impl Fn(&str) -> bool) -> &'a str {
    for &name in candidates {
        let found = available(name);
        tracing::debug!(sink = name, found, "video sink probe");
        if found {
            return name;
        }
    }
    tracing::info!("no preferred video sink found, using {FALLBACK_SINK}");
    FALLBACK_SINK
}

/// Camera capture parameters on the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Viewer address the RTP stream is sent to
    pub client_host: String,
    pub video_port: u16,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Encoder bitrate in bits per second
    pub bitrate: u32,
}

impl CaptureSettings {
    pub fn new(client_host: impl Into<String>, video_port: u16) -> Self {
        Self {
            client_host: client_host.into(),
            video_port,
            width: 1920,
            height: 1080,
            framerate: 15,
            bitrate: 2_000_000,
        }
    }

    /// Shell command line: camera encoder piped into the RTP sender.
    pub fn command_line(&self) -> String {
        format!(
            "rpicam-vid -t 0 --width {} --height {} --framerate {} --codec h264 --inline --bitrate {} -o - | \
             gst-launch-1.0 -v fdsrc ! h264parse ! rtph264pay config-interval=1 pt=96 ! udpsink host={} port={} sync=false",
            self.width, self.height, self.framerate, self.bitrate, self.client_host, self.video_port
        )
    }
}
