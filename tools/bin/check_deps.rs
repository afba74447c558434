use clap::{Arg, Command};
use std::env;
use std::path::Path;
use std::process::{Command as ProcessCommand, Stdio};

use camlink::actuator::gpio::SYSFS_GPIO_ROOT;
use camlink::media::description::sink_candidates;

/// Elements named by the receive pipelines.
const RECEIVE_ELEMENTS: &[&str] = &[
    "udpsrc",
    "rtph264depay",
    "h264parse",
    "decodebin",
    "videoconvert",
    "appsink",
];

/// Elements named by the node's send pipeline.
const SEND_ELEMENTS: &[&str] = &["fdsrc", "h264parse", "rtph264pay", "udpsink"];

#[derive(Debug)]
struct CheckResult {
    name: String,
    passed: bool,
    version: Option<String>,
}

impl CheckResult {
    fn pass(name: String) -> Self {
        Self {
            name,
            passed: true,
            version: None,
        }
    }

    fn pass_with_version(name: String, version: String) -> Self {
        Self {
            name,
            passed: true,
            version: Some(version),
        }
    }

    fn fail(name: String) -> Self {
        Self {
            name,
            passed: false,
            version: None,
        }
    }
}

fn check_command(name: &str, cmd: &mut ProcessCommand) -> CheckResult {
    match cmd.stdout(Stdio::null()).stderr(Stdio::null()).status() {
        Ok(status) if status.success() => CheckResult::pass(name.to_string()),
        _ => CheckResult::fail(name.to_string()),
    }
}

fn check_tool(program: &str) -> CheckResult {
    let name = format!("{program} on PATH");
    match ProcessCommand::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|line| line.trim().to_string())
                .filter(|line| !line.is_empty());
            match version {
                Some(version) => CheckResult::pass_with_version(name, version),
                None => CheckResult::pass(name),
            }
        }
        _ => CheckResult::fail(name),
    }
}

fn check_element(element: &str) -> CheckResult {
    let mut cmd = ProcessCommand::new("gst-inspect-1.0");
    cmd.arg("--exists").arg(element);
    check_command(&format!("element {element}"), &mut cmd)
}

fn check_pkgconfig(pcname: &str) -> CheckResult {
    let name = format!("pkg-config: {pcname}");
    let mut cmd = ProcessCommand::new("pkg-config");
    cmd.arg("--exists").arg(pcname);
    if !check_command(&name, &mut cmd).passed {
        return CheckResult::fail(name);
    }
    match ProcessCommand::new("pkg-config")
        .arg("--modversion")
        .arg(pcname)
        .output()
    {
        Ok(output) => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            CheckResult::pass_with_version(name, version)
        }
        Err(_) => CheckResult::pass(name),
    }
}

fn print_section(title: &str) {
    println!();
    println!("== {} ==", title);
}

fn print_result(result: &CheckResult) {
    match (&result.passed, &result.version) {
        (true, Some(version)) => println!("[OK]   {} ({})", result.name, version),
        (true, None) => println!("[OK]   {}", result.name),
        (false, _) => println!("[FAIL] {}", result.name),
    }
}

fn main() {
    let matches = Command::new("check_deps")
        .about("Checks the GStreamer tools and elements, the camera tools and GPIO access camlink needs")
        .arg(
            Arg::new("node")
                .long("node")
                .help("Also check the camera node's capture tools and GPIO")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-default-features")
                .long("no-default-features")
                .help("Skip GStreamer development header checks (control-only builds)")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let node = matches.get_flag("node");
    let headers = !matches.get_flag("no-default-features");

    let os = env::consts::OS;
    println!("Detected OS: {}", os);
    println!("Role: {}", if node { "node + viewer" } else { "viewer" });

    let mut results = Vec::new();

    print_section("GStreamer tools");
    for tool in ["gst-inspect-1.0", "gst-launch-1.0"] {
        let result = check_tool(tool);
        print_result(&result);
        results.push(result);
    }

    if headers {
        print_section("GStreamer development headers (pkg-config)");
        for pcname in ["gstreamer-1.0", "gstreamer-app-1.0", "gstreamer-video-1.0"] {
            let result = check_pkgconfig(pcname);
            print_result(&result);
            results.push(result);
        }
    }

    print_section("Receive pipeline elements");
    for element in RECEIVE_ELEMENTS {
        let result = check_element(element);
        print_result(&result);
        results.push(result);
    }

    // Only one of the preferred sinks has to be present.
    print_section("Video sinks");
    let mut sink_found = false;
    for sink in sink_candidates(os) {
        let result = check_element(sink);
        if result.passed {
            sink_found = true;
            print_result(&result);
        } else {
            println!("[--]   {} not installed", result.name);
        }
    }
    if !sink_found {
        results.push(CheckResult::fail("any video sink".to_string()));
        println!("[FAIL] no usable video sink");
    }

    if node {
        print_section("Camera node");
        let camera = check_tool("rpicam-vid");
        print_result(&camera);
        results.push(camera);

        for element in SEND_ELEMENTS {
            let result = check_element(element);
            print_result(&result);
            results.push(result);
        }

        let export = Path::new(SYSFS_GPIO_ROOT).join("export");
        if export.exists() {
            println!("[OK]   sysfs GPIO ({})", export.display());
        } else {
            println!("[WARN] {} not found; LEDs will run in mock mode", export.display());
        }
    }

    // Summary
    print_section("Summary");
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;
    println!("Passed: {}, Failed: {}", passed, failed);

    if failed > 0 {
        println!();
        println!("Some required dependencies are missing.");
        println!("Hints (Ubuntu/Debian/Raspberry Pi OS):");
        println!("  sudo apt-get install -y \\");
        println!("    gstreamer1.0-tools gstreamer1.0-plugins-base gstreamer1.0-plugins-good \\");
        println!("    gstreamer1.0-plugins-bad gstreamer1.0-libav");
        println!("  sudo apt-get install -y \\");
        println!("    libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev pkg-config");
        if node {
            println!("  sudo apt-get install -y rpicam-apps");
        }
        std::process::exit(1);
    }
}
