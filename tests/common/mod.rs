//! Fake planning service for integration tests.
//!
//! - HTTP API on `rouille`, bound to an ephemeral port under `/api`
//! - progress socket on a plain `tungstenite` accept loop

#![allow(dead_code)]

use crossbeam_channel::{Receiver, Sender, unbounded};
use rouille::{Request, Response};
use serde_json::{Value, json};
use std::io::ErrorKind;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use streetplan::Session;

#[derive(Clone, Debug, Default)]
pub struct FakeOptions {
    /// `/route/{id}/segments` answers 404.
    pub segments_missing: bool,
    /// Number of segments served per route.
    pub segments: usize,
    /// `/export/...` answers 500.
    pub exports_fail: bool,
    /// Delay before answering plan requests.
    pub plan_delay: Duration,
}

#[derive(Default)]
struct FakeState {
    requests: Mutex<Vec<String>>,
    exports: Mutex<Vec<String>>,
}

pub struct FakePlanner {
    pub base_url: String,
    state: Arc<FakeState>,
    stop: Option<std::sync::mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakePlanner {
    pub fn start(options: FakeOptions) -> Self {
        let state = Arc::new(FakeState::default());
        let handler_state = Arc::clone(&state);
        let server = rouille::Server::new("127.0.0.1:0", move |request| {
            handle(request, &options, &handler_state)
        })
        .expect("bind fake planner");
        let base_url = format!("http://{}/api", server.server_addr());
        let (handle, stop) = server.stoppable();
        Self {
            base_url,
            state,
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    /// "METHOD path" of every request served so far.
    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Export paths served so far.
    pub fn exports(&self) -> Vec<String> {
        self.state.exports.lock().unwrap().clone()
    }
}

impl Drop for FakePlanner {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn route_json(route_id: &str, n_nodes: u64) -> Value {
    json!({
        "route_id": route_id,
        "status": "completed",
        "created_at": "2024-05-01T12:00:00.123456",
        "area_stats": {
            "n_nodes": n_nodes,
            "n_edges": n_nodes * 2,
            "total_edge_length": 15234.5,
            "is_strongly_connected": true,
            "is_eulerian": false,
            "n_odd_degree_nodes": 4,
            "odd_degree_nodes": [1, 2, 3, 4]
        },
        "route_stats": {
            "total_edges": n_nodes * 2 + 3,
            "total_distance": 18012.0,
            "unique_edges": n_nodes * 2,
            "repeated_edges": 3,
            "edge_coverage": 100.0
        },
        "available_formats": ["gpx", "kml", "geojson", "csv"],
        "geojson": {"type": "FeatureCollection", "features": []}
    })
}

fn segments_json(count: usize) -> Value {
    let features: Vec<Value> = (0..count)
        .map(|i| {
            let lon = -71.22 + i as f64 * 0.001;
            json!({
                "type": "Feature",
                "properties": {"segment_index": i, "traversal": if i % 5 == 4 { 2 } else { 1 }, "length": 80.0},
                "geometry": {"type": "LineString", "coordinates": [[lon, 42.33], [lon + 0.001, 42.33]]}
            })
        })
        .collect();
    json!({"type": "FeatureCollection", "features": features})
}

fn detail(code: u16, message: &str) -> Response {
    Response::json(&json!({"detail": message})).with_status_code(code)
}

fn handle(request: &Request, options: &FakeOptions, state: &FakeState) -> Response {
    let path = request.url();
    state
        .requests
        .lock()
        .unwrap()
        .push(format!("{} {}", request.method(), path));

    if request.method() == "POST" {
        let body: Value = match rouille::input::json_input(request) {
            Ok(body) => body,
            Err(_) => return detail(422, "Invalid body"),
        };
        thread::sleep(options.plan_delay);
        return match path.as_str() {
            "/api/plan-route/bbox" => {
                let north = body["north"].as_f64().unwrap_or_default();
                let south = body["south"].as_f64().unwrap_or_default();
                if south > north {
                    return detail(400, "south must not exceed north");
                }
                Response::json(&route_json("bbox-route", 57))
            }
            "/api/plan-route/point" => Response::json(&route_json("point-route", 31)),
            "/api/plan-route/place" => match body["place_name"].as_str() {
                Some("Nowhere") => detail(500, "Could not geocode 'Nowhere'"),
                Some(_) => Response::json(&route_json("abc", 412)),
                None => detail(422, "place_name is required"),
            },
            _ => Response::empty_404(),
        };
    }

    if path == "/api/routes" {
        return Response::json(&json!({"routes": [{
            "route_id": "abc",
            "status": "completed",
            "created_at": "2024-05-01T12:00:00.123456",
            "network_type": "drive",
            "region": {"type": "place", "place_name": "Berkeley, California, USA"},
            "stats": {"nodes": 412, "edges": 824, "total_distance": 18012.0}
        }]}));
    }
    if let Some(rest) = path.strip_prefix("/api/export/") {
        let Some((route_id, format)) = rest.split_once('/') else {
            return Response::empty_404();
        };
        state.exports.lock().unwrap().push(rest.to_string());
        if options.exports_fail {
            return detail(500, "Export failed");
        }
        let body = format!("{} export of {}", format, route_id);
        return Response::from_data("application/octet-stream", body.into_bytes());
    }
    if let Some(rest) = path.strip_prefix("/api/route/") {
        if let Some(route_id) = rest.strip_suffix("/segments") {
            if options.segments_missing {
                return detail(404, &format!("No segments for route {}", route_id));
            }
            return Response::json(&segments_json(options.segments));
        }
        return match rest {
            "abc" | "bbox-route" => Response::json(&route_json(rest, 412)),
            _ => detail(404, "Route not found"),
        };
    }
    Response::empty_404()
}

enum ProgressCommand {
    Frame(String),
    Hangup,
}

/// Progress socket that pushes whatever text frames the test sends it.
///
/// Accepts any number of connections one after another; `hangup` closes the
/// current one so the client has to reconnect. Frames pushed while nobody is
/// connected go to the next connection.
pub struct FakeProgress {
    pub url: String,
    commands: Option<Sender<ProgressCommand>>,
    connections: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeProgress {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind progress socket");
        listener.set_nonblocking(true).unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let (commands, rx) = unbounded();
        let connections = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let connections = Arc::clone(&connections);
            let stop = Arc::clone(&stop);
            thread::spawn(move || serve(listener, rx, &connections, &stop))
        };
        Self {
            url,
            commands: Some(commands),
            connections,
            stop,
            handle: Some(handle),
        }
    }

    pub fn push(&self, frame: impl Into<String>) {
        self.send(ProgressCommand::Frame(frame.into()));
    }

    /// Close the current connection from the server side.
    pub fn hangup(&self) {
        self.send(ProgressCommand::Hangup);
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn send(&self, command: ProgressCommand) {
        if let Some(commands) = &self.commands {
            commands.send(command).unwrap();
        }
    }
}

impl Drop for FakeProgress {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.commands.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve(
    listener: TcpListener,
    commands: Receiver<ProgressCommand>,
    connections: &AtomicUsize,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::SeqCst) {
        let stream = match listener.accept() {
            Ok((stream, _)) => stream,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
                continue;
            }
            Err(_) => return,
        };
        let _ = stream.set_nonblocking(false);
        let Ok(mut ws) = tungstenite::accept(stream) else {
            continue;
        };
        connections.fetch_add(1, Ordering::SeqCst);

        let mut reaccept = false;
        for command in commands.iter() {
            let sent = match command {
                ProgressCommand::Frame(frame) => ws.send(tungstenite::Message::text(frame)).is_ok(),
                ProgressCommand::Hangup => false,
            };
            if !sent {
                reaccept = true;
                break;
            }
        }
        let _ = ws.close(None);
        let _ = ws.flush();
        if !reaccept {
            // Test side dropped its sender
            return;
        }
    }
}

/// Pump until `done` holds or five seconds pass. Returns whether it held.
pub fn pump_until<F>(session: &mut Session, mut done: F) -> bool
where
    F: FnMut(&Session) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        session.pump(Instant::now());
        if done(session) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Pump until every background request is delivered.
pub fn settle(session: &mut Session) -> bool {
    pump_until(session, |s| !s.has_pending_requests())
}
