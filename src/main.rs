use streetplan::cli::Args;
use streetplan::client::{HttpPlanningClient, RouteResult, RouteSummary};
use streetplan::config::{self, PathConfig, Settings};
use streetplan::core::playback_events::{
    FasterEvent, JumpEvent, PauseEvent, PlayEvent, ResetPlaybackEvent, SetSpeedEvent, SlowerEvent,
    StepEvent, TogglePlayPauseEvent,
};
use streetplan::core::{EventEmitter, JobStatus};
use streetplan::geo::{DrawingMode, EARTH_RADIUS_M, LatLon};
use streetplan::session::events::{
    AlertEvent, DownloadSavedEvent, JobChangedEvent, PlaybackChangedEvent, RouteDisplayChangedEvent,
    RoutesListedEvent,
};
use streetplan::session::{DirectoryDownloads, Session};
use streetplan::status_bar::StatusBar;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Loop period, matching a 60 Hz UI repaint.
const FRAME: Duration = Duration::from_millis(16);

fn main() -> Result<()> {
    let args = Args::parse();

    if !args.has_work() {
        use clap::CommandFactory;
        let _ = Args::command().print_help();
        println!();
        return Ok(());
    }

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {:#}", e);
    }

    init_logging(&args, &path_config)?;

    info!("streetplan {} starting", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let settings_path = config::config_file(config::SETTINGS_FILE, &path_config);
    info!("Config path: {}", settings_path.display());
    let settings = apply_overrides(Settings::load(&settings_path), &args);

    let client = HttpPlanningClient::new(&settings.api_base_url, settings.request_timeout())
        .context("Failed to create HTTP client")?;
    let downloads = DirectoryDownloads::new(settings.download_path(&path_config));
    info!("Planning service: {}", client.base_url());
    info!("Downloads: {}", downloads.dir().display());

    let mut session = Session::new(Arc::new(client), Box::new(downloads));
    session.set_network_type(settings.network_type);

    let status = Arc::new(if args.log_file.is_some() || args.verbosity > 0 {
        StatusBar::hidden()
    } else {
        StatusBar::new()
    });
    subscribe_status(&session, &status);

    if !settings.progress_url.is_empty() {
        // Progress is optional: plans still complete without it
        if let Err(e) = session.connect_progress(&settings.progress_url, settings.reconnect_policy()) {
            warn!("Live progress unavailable: {}", e);
        }
    }

    let emitter = session.emitter();
    emitter.emit(SetSpeedEvent(settings.default_speed));

    if args.list {
        session.refresh_routes();
    }
    start_plan(&mut session, &args)?;

    let quit = Arc::new(AtomicBool::new(false));
    if args.interactive {
        spawn_stdin_controller(emitter.clone(), Arc::clone(&quit))?;
    }

    // Wait for the plan (and its segments), then export and play.
    run_until(&mut session, &quit, |s| !s.is_planning() && !s.has_pending_requests());

    if let Some(job) = session.job().filter(|j| j.status == JobStatus::Error) {
        status.finish();
        bail!("Planning failed: {}", job.message);
    }

    if let Some(route) = session.route() {
        print_route(&status, route);
    }
    if session.route().is_some() {
        status.set_legend(&session.legend());
        for &format in &args.export {
            session.export(format);
        }
        if args.autoplay {
            emitter.emit(PlayEvent);
        }
    }

    let interactive = args.interactive;
    run_until(&mut session, &quit, |s| {
        !s.has_pending_requests() && !s.playback().is_playing() && !interactive
    });

    status.finish();
    session.disconnect_progress();
    info!("Done");
    Ok(())
}

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("reqwest", log::LevelFilter::Info)
            .filter_module("tungstenite", log::LevelFilter::Info)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("reqwest", log::LevelFilter::Info)
            .filter_module("tungstenite", log::LevelFilter::Info)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// CLI flags win over the settings file.
fn apply_overrides(mut settings: Settings, args: &Args) -> Settings {
    if let Some(server) = &args.server {
        settings.api_base_url = server.clone();
    }
    if let Some(ws) = &args.ws {
        settings.progress_url = ws.clone();
    }
    if let Some(network) = args.network {
        settings.network_type = network;
    }
    if let Some(speed) = args.speed {
        settings.default_speed = speed;
    }
    settings
}

/// Feed the region flags through the drawing state machine as map clicks.
fn start_plan(session: &mut Session, args: &Args) -> Result<()> {
    if let Some(b) = &args.bbox {
        let [north, south, east, west] = b[..] else {
            bail!("--bbox needs exactly four values");
        };
        session.set_mode(DrawingMode::Rectangle);
        session.on_map_click(LatLon::new(north, east));
        session.on_map_click(LatLon::new(south, west));
        session.plan_selection();
    } else if let Some(p) = &args.point {
        let [lat, lon, radius] = p[..] else {
            bail!("--point needs exactly three values");
        };
        if radius <= 0.0 {
            bail!("--point radius must be positive, got {}", radius);
        }
        session.set_mode(DrawingMode::Circle);
        session.on_map_click(LatLon::new(lat, lon));
        session.on_map_click(north_of(LatLon::new(lat, lon), radius));
        session.plan_selection();
    } else if let Some(place) = &args.place {
        session.plan_place(place);
    } else if let Some(route_id) = &args.route {
        session.open_route(route_id);
    }
    Ok(())
}

/// Point `meters` due north of `origin` (great-circle along the meridian).
fn north_of(origin: LatLon, meters: f64) -> LatLon {
    LatLon::new(origin.lat + (meters / EARTH_RADIUS_M).to_degrees(), origin.lon)
}

fn run_until<F>(session: &mut Session, quit: &AtomicBool, mut done: F)
where
    F: FnMut(&Session) -> bool,
{
    loop {
        session.pump(Instant::now());
        if quit.load(Ordering::Relaxed) || done(session) {
            return;
        }
        thread::sleep(FRAME);
    }
}

fn subscribe_status(session: &Session, status: &Arc<StatusBar>) {
    let bus = session.event_bus();

    let s = Arc::clone(status);
    bus.subscribe::<JobChangedEvent, _>(move |e| s.set_job(e.0.as_ref()));

    let s = Arc::clone(status);
    bus.subscribe::<PlaybackChangedEvent, _>(move |e| {
        info!("Segment {}/{}", e.0.current + 1, e.0.total);
        s.set_playback(&e.0);
    });

    let s = Arc::clone(status);
    bus.subscribe::<RouteDisplayChangedEvent, _>(move |e| {
        if e.segmented {
            s.println(format!("Route {}: {} segments", e.route_id, e.total_segments));
        } else {
            s.println(format!("Route {}: segments unavailable, full route only", e.route_id));
        }
    });

    let s = Arc::clone(status);
    bus.subscribe::<AlertEvent, _>(move |e| s.println(format!("! {}", e.0)));

    let s = Arc::clone(status);
    bus.subscribe::<DownloadSavedEvent, _>(move |e| {
        s.println(format!("Saved {} export to {}", e.format, e.path.display()))
    });

    let s = Arc::clone(status);
    bus.subscribe::<RoutesListedEvent, _>(move |e| {
        if e.0.is_empty() {
            s.println("No routes stored");
        }
        for route in &e.0 {
            s.println(format_summary(route));
        }
    });
}

fn format_summary(route: &RouteSummary) -> String {
    format!(
        "{}  {:<9} {:<5} {:>6} nodes {:>6} edges {:>10.0} m  {}",
        route.route_id,
        route.status,
        route.network_type.as_str(),
        route.stats.nodes,
        route.stats.edges,
        route.stats.total_distance,
        route.created_at
    )
}

fn print_route(status: &StatusBar, route: &RouteResult) {
    let area = &route.area_stats;
    status.println(format!("Route {} ({})", route.route_id, route.created_at));
    status.println(format!(
        "  area: {} nodes, {} edges, {:.0} m of street, eulerian: {}",
        area.n_nodes, area.n_edges, area.total_edge_length, area.is_eulerian
    ));
    if let Some(stats) = &route.route_stats {
        status.println(format!(
            "  route: {:.0} m, {} edges ({} repeated), coverage {:.1}%",
            stats.total_distance,
            stats.total_edges,
            stats.repeated_edges,
            stats.edge_coverage
        ));
    }
}

/// Line commands on stdin: space/t toggle, n/p step, f/b jump, +/- speed,
/// r reset, s stop, q quit.
fn spawn_stdin_controller(emitter: EventEmitter, quit: Arc<AtomicBool>) -> Result<()> {
    thread::Builder::new()
        .name("streetplan-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let cmd = line.trim();
                match cmd {
                    "" | " " | "t" => emitter.emit(TogglePlayPauseEvent),
                    "n" => emitter.emit(StepEvent(1)),
                    "p" => emitter.emit(StepEvent(-1)),
                    "f" => emitter.emit(JumpEvent(1)),
                    "b" => emitter.emit(JumpEvent(-1)),
                    "+" => emitter.emit(FasterEvent),
                    "-" => emitter.emit(SlowerEvent),
                    "r" => emitter.emit(ResetPlaybackEvent),
                    "s" => emitter.emit(PauseEvent),
                    "q" => break,
                    other => warn!("Unknown command '{}'", other),
                }
            }
            quit.store(true, Ordering::Relaxed);
        })
        .context("Failed to start stdin controller")?;
    Ok(())
}
