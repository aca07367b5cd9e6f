//! Command line: one subcommand per camera setup, plus `run` for a config file

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;

use framecast::capture::FetchMode;
use framecast::{Config, SourceConfig, StreamConfig};

/// Detector network input size
const OAK_SIZE: u32 = 640;
const OAK_FPS: u32 = 35;

#[derive(Parser, Debug)]
#[command(author, version, about = "Bridge camera frames to H.264/RTP/UDP streams")]
pub struct Cli {
    /// TOML file layered under the subcommand's arguments
    #[arg(long, global = true, env = "FRAMECAST_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream a USB camera (`/dev/video<VIDEO_NUM>`)
    Usbcam {
        video_num: u32,
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        mode: Single,
        /// Camera delivers MJPEG instead of raw frames
        #[arg(long)]
        mjpeg: bool,
    },
    /// Stream the Raspberry Pi camera
    Raspicam {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        mode: Single,
    },
    /// Stream RealSense color and colorized depth on two ports
    Realsense {
        ip: String,
        color_port: u16,
        depth_port: u16,
        color_fps: u32,
        color_width: u32,
        color_height: u32,
        depth_fps: u32,
        depth_width: u32,
        depth_height: u32,
        /// Raw depth value mapped to full intensity
        depth_scale: f32,
        #[arg(long)]
        color_device: Option<String>,
        #[arg(long)]
        depth_device: Option<String>,
    },
    /// Stream an OAK camera with detection overlays
    Oak {
        ip: String,
        port: u16,
        #[arg(long, default_value = "/dev/video0")]
        device: String,
        /// JSON-lines detection feed (stdin when omitted)
        #[arg(long)]
        detections: Option<PathBuf>,
        /// Don't wait for the detections matching each frame
        #[arg(long)]
        no_sync: bool,
    },
    /// Run the streams listed in the configuration file
    Run,
    /// List V4L2 capture devices
    #[cfg(feature = "v4l2-probe")]
    Devices,
}

#[derive(Args, Debug)]
pub struct Target {
    pub ip: String,
    pub port: u16,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Args, Debug)]
pub struct Single {
    /// Route frames through the bridge instead of a direct pipeline
    #[arg(long)]
    pub bridge: bool,
    /// Draw the measured frame rate (bridge only)
    #[arg(long)]
    pub show_fps: bool,
}

impl Target {
    fn stream(&self, name: &str, source: SourceConfig, mode: &Single) -> StreamConfig {
        StreamConfig {
            name: name.to_string(),
            port: self.port,
            width: self.width,
            height: self.height,
            fps: self.fps,
            source,
            fetch_mode: FetchMode::Blocking,
            show_fps: mode.bridge && mode.show_fps,
            relay: !mode.bridge,
        }
    }
}

#[cfg(feature = "v4l2-probe")]
fn resolve_device(device: Option<String>, role: framecast::utils::DeviceRole) -> Result<String> {
    match device {
        Some(device) => Ok(device),
        None => Ok(framecast::utils::find_device(role)?.path),
    }
}

#[cfg(not(feature = "v4l2-probe"))]
fn resolve_device(device: Option<String>, fallback: &str) -> Result<String> {
    Ok(device.unwrap_or_else(|| fallback.to_string()))
}

impl Cli {
    /// Configuration for the selected subcommand, `None` when the command
    /// does not stream.
    pub fn into_config(self) -> Result<Option<Config>> {
        let mut config = Config::layered(self.config.as_deref())?;
        match self.command {
            // Streams come from the file
            Command::Run => {}
            Command::Usbcam {
                video_num,
                target,
                mode,
                mjpeg,
            } => {
                config.sink.host = target.ip.clone();
                let source = SourceConfig::V4l2 {
                    device: format!("/dev/video{}", video_num),
                    mjpeg,
                };
                config.streams = vec![target.stream("usbcam", source, &mode)];
            }
            Command::Raspicam { target, mode } => {
                config.sink.host = target.ip.clone();
                config.streams = vec![target.stream("raspicam", SourceConfig::Libcamera, &mode)];
            }
            Command::Realsense {
                ip,
                color_port,
                depth_port,
                color_fps,
                color_width,
                color_height,
                depth_fps,
                depth_width,
                depth_height,
                depth_scale,
                color_device,
                depth_device,
            } => {
                #[cfg(feature = "v4l2-probe")]
                let (color_device, depth_device) = (
                    resolve_device(color_device, framecast::utils::DeviceRole::Color)?,
                    resolve_device(depth_device, framecast::utils::DeviceRole::Depth)?,
                );
                #[cfg(not(feature = "v4l2-probe"))]
                let (color_device, depth_device) = (
                    resolve_device(color_device, "/dev/video4")?,
                    resolve_device(depth_device, "/dev/video2")?,
                );

                config.sink.host = ip;
                config.streams = vec![
                    StreamConfig {
                        name: "color".into(),
                        port: color_port,
                        width: color_width,
                        height: color_height,
                        fps: color_fps,
                        source: SourceConfig::V4l2 {
                            device: color_device,
                            mjpeg: false,
                        },
                        fetch_mode: FetchMode::Blocking,
                        show_fps: false,
                        relay: false,
                    },
                    StreamConfig {
                        name: "depth".into(),
                        port: depth_port,
                        width: depth_width,
                        height: depth_height,
                        fps: depth_fps,
                        source: SourceConfig::Depth {
                            device: depth_device,
                            depth_scale,
                        },
                        fetch_mode: FetchMode::Blocking,
                        show_fps: false,
                        relay: false,
                    },
                ];
            }
            Command::Oak {
                ip,
                port,
                device,
                detections,
                no_sync,
            } => {
                config.sink.host = ip;
                config.streams = vec![StreamConfig {
                    name: "oak".into(),
                    port,
                    width: OAK_SIZE,
                    height: OAK_SIZE,
                    fps: OAK_FPS,
                    source: SourceConfig::Detector {
                        device,
                        feed: detections,
                    },
                    fetch_mode: if no_sync {
                        FetchMode::NonBlocking
                    } else {
                        FetchMode::Blocking
                    },
                    show_fps: true,
                    relay: false,
                }];
            }
            #[cfg(feature = "v4l2-probe")]
            Command::Devices => {
                for device in framecast::utils::probe_devices() {
                    println!(
                        "{}\t{:?}\t{}\t{}",
                        device.path,
                        device.role,
                        device.card,
                        device.formats.join(",")
                    );
                }
                return Ok(None);
            }
        }

        config.validate()?;
        Ok(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["framecast"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv).into_config().unwrap().unwrap()
    }

    #[test]
    fn usbcam_relays_unless_bridged() {
        let config = parse(&["usbcam", "2", "10.0.0.5", "5000", "30", "1280", "720"]);
        assert_eq!(config.sink.host, "10.0.0.5");
        let stream = &config.streams[0];
        assert!(stream.relay);
        assert!(!stream.show_fps);
        assert_eq!(
            stream.source,
            SourceConfig::V4l2 {
                device: "/dev/video2".into(),
                mjpeg: false
            }
        );

        let config = parse(&[
            "usbcam", "0", "10.0.0.5", "5000", "30", "640", "480", "--bridge", "--show-fps",
        ]);
        assert!(!config.streams[0].relay);
        assert!(config.streams[0].show_fps);
    }

    #[test]
    fn realsense_builds_two_streams() {
        let config = parse(&[
            "realsense",
            "10.0.0.5",
            "5000",
            "5001",
            "30",
            "1280",
            "720",
            "15",
            "848",
            "480",
            "4000",
            "--color-device",
            "/dev/video4",
            "--depth-device",
            "/dev/video2",
        ]);
        assert_eq!(config.streams.len(), 2);
        assert_eq!(config.streams[1].port, 5001);
        assert_eq!(config.streams[1].fps, 15);
        assert!(matches!(
            config.streams[1].source,
            SourceConfig::Depth { depth_scale, .. } if depth_scale == 4000.0
        ));
    }

    #[test]
    fn oak_uses_detector_geometry() {
        let config = parse(&["oak", "10.0.0.5", "5000", "--no-sync"]);
        let stream = &config.streams[0];
        assert_eq!((stream.width, stream.height, stream.fps), (640, 640, 35));
        assert_eq!(stream.fetch_mode, FetchMode::NonBlocking);
        assert!(stream.show_fps);
    }
}
