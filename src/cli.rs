use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use crate::client::{ExportFormat, NetworkType};

/// Street coverage route planner client
///
/// Draws a region (rectangle, circle or place), asks the planning service for
/// a route that covers every street in it, and plays the route back segment by
/// segment.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("region").args(["bbox", "point", "place", "route"])))]
pub struct Args {
    /// Rectangle region: two opposite corners as NORTH SOUTH EAST WEST
    #[arg(long, value_names = ["N", "S", "E", "W"], num_args = 4, allow_negative_numbers = true)]
    pub bbox: Option<Vec<f64>>,

    /// Circle region: center and radius in meters
    #[arg(long, value_names = ["LAT", "LON", "RADIUS"], num_args = 3, allow_negative_numbers = true)]
    pub point: Option<Vec<f64>>,

    /// Place name resolved by the planning service
    #[arg(long, value_name = "NAME")]
    pub place: Option<String>,

    /// Open a previously planned route by id
    #[arg(long = "route", value_name = "ID")]
    pub route: Option<String>,

    /// Street network to plan on (default from settings)
    #[arg(short = 'n', long = "network", value_name = "drive|walk|bike")]
    pub network: Option<NetworkType>,

    /// Planning API base URL, e.g. http://localhost:8000/api
    #[arg(short = 's', long = "server", value_name = "URL")]
    pub server: Option<String>,

    /// Progress WebSocket URL, e.g. ws://localhost:8000/ws ("" disables)
    #[arg(long = "ws", value_name = "URL")]
    pub ws: Option<String>,

    /// Playback speed multiplier (0.5, 1, 2, 4, 8)
    #[arg(long = "speed", value_name = "X")]
    pub speed: Option<f64>,

    /// Play the route segments after loading
    #[arg(short = 'a', long = "autoplay")]
    pub autoplay: bool,

    /// Export the route (can be specified multiple times)
    #[arg(short = 'e', long = "export", value_name = "FORMAT")]
    pub export: Vec<ExportFormat>,

    /// List routes stored on the server
    #[arg(long = "list")]
    pub list: bool,

    /// Read playback commands from stdin (space, n, p, f, b, +, -, r, q)
    #[arg(short = 'i', long = "interactive")]
    pub interactive: bool,

    /// Enable debug logging to file (default: streetplan.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl Args {
    pub fn has_work(&self) -> bool {
        self.bbox.is_some() || self.point.is_some() || self.place.is_some() || self.route.is_some() || self.list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox_with_negative_longitudes() {
        let args = Args::try_parse_from([
            "streetplan", "--bbox", "42.34", "42.33", "-71.20", "-71.22", "--network", "walk", "-e", "gpx", "-e", "csv",
        ])
        .unwrap();
        assert_eq!(args.bbox, Some(vec![42.34, 42.33, -71.20, -71.22]));
        assert_eq!(args.network, Some(NetworkType::Walk));
        assert_eq!(args.export, vec![ExportFormat::Gpx, ExportFormat::Csv]);
        assert!(args.has_work());
    }

    #[test]
    fn test_region_flags_conflict() {
        let err = Args::try_parse_from(["streetplan", "--place", "Berkeley", "--point", "1", "2", "300"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_log_flag_optional_value() {
        let args = Args::try_parse_from(["streetplan", "--list", "--log", "-vv"]).unwrap();
        assert_eq!(args.log_file, Some(None));
        assert_eq!(args.verbosity, 2);
    }
}
