//! Session metrics, rendered as Prometheus text or JSON and served over a
//! minimal HTTP endpoint (`/metrics`, `/metrics/json`, `/health`).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

/// Metrics registry for the session server
#[derive(Debug)]
pub struct Metrics {
    // Connections
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,

    // Role partitions
    pub waiting_room_participants: AtomicU64,
    pub loading_participants: AtomicU64,
    pub active_participants: AtomicU64,

    // Session lifecycle
    pub session_status: AtomicU64,
    pub transitions_total: AtomicU64,
    pub sessions_started: AtomicU64,

    // Traffic
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,

    pub tick_count: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            waiting_room_participants: AtomicU64::new(0),
            loading_participants: AtomicU64::new(0),
            active_participants: AtomicU64::new(0),
            session_status: AtomicU64::new(0),
            transitions_total: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Store the partition sizes
    pub fn set_partitions(&self, waiting_room: usize, loading: usize, active: usize) {
        self.waiting_room_participants
            .store(waiting_room as u64, Ordering::Relaxed);
        self.loading_participants.store(loading as u64, Ordering::Relaxed);
        self.active_participants.store(active as u64, Ordering::Relaxed);
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("session_connections_active", "Open transport connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("session_connections_rejected_total", "Connections rejected at admission", "counter",
            self.connections_rejected.load(Ordering::Relaxed));

        metric!("session_participants_waiting_room", "Waiting-room participants", "gauge",
            self.waiting_room_participants.load(Ordering::Relaxed));
        metric!("session_participants_loading", "Loading participants", "gauge",
            self.loading_participants.load(Ordering::Relaxed));
        metric!("session_participants_active", "Active participants", "gauge",
            self.active_participants.load(Ordering::Relaxed));

        metric!("session_status", "Session status (0=menu, 1=waiting-room, 2=loading, 3=active)", "gauge",
            self.session_status.load(Ordering::Relaxed));
        metric!("session_transitions_total", "Role transitions performed", "counter",
            self.transitions_total.load(Ordering::Relaxed));
        metric!("session_starts_total", "Session start broadcasts", "counter",
            self.sessions_started.load(Ordering::Relaxed));

        metric!("session_messages_sent_total", "Total messages sent", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("session_messages_received_total", "Total messages received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("session_tick_count", "Scheduler ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("session_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "connections": {
                "active": self.connections_active.load(Ordering::Relaxed),
                "rejected": self.connections_rejected.load(Ordering::Relaxed),
            },
            "participants": {
                "waiting_room": self.waiting_room_participants.load(Ordering::Relaxed),
                "loading": self.loading_participants.load(Ordering::Relaxed),
                "active": self.active_participants.load(Ordering::Relaxed),
            },
            "session": {
                "status": self.session_status.load(Ordering::Relaxed),
                "transitions": self.transitions_total.load(Ordering::Relaxed),
                "starts": self.sessions_started.load(Ordering::Relaxed),
                "ticks": self.tick_count.load(Ordering::Relaxed),
            },
            "network": {
                "messages_sent": self.messages_sent.load(Ordering::Relaxed),
                "messages_received": self.messages_received.load(Ordering::Relaxed),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Route a raw request line to a response
fn route(metrics: &Metrics, request: &str) -> String {
    if request.starts_with("GET /metrics/json") || request.starts_with("GET /json") {
        http_response("application/json", &metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
    } else if request.starts_with("GET /health") || request.starts_with("GET / ") {
        http_response("text/plain", "OK")
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    }
}

/// Serve metrics over HTTP until the listener fails
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Metrics endpoint on http://{}/metrics", listener.local_addr()?);

    loop {
        let (socket, peer) = listener.accept().await?;
        tokio::spawn(serve(socket, peer, metrics.clone()));
    }
}

/// Answer a single request and close
async fn serve(mut socket: TcpStream, peer: SocketAddr, metrics: Arc<Metrics>) {
    let mut request = [0u8; 1024];
    let n = match socket.read(&mut request).await {
        Ok(0) => return,
        Ok(n) => n,
        Err(e) => {
            debug!("Metrics request from {} failed: {}", peer, e);
            return;
        }
    };

    let response = route(&metrics, &String::from_utf8_lossy(&request[..n]));
    if let Err(e) = socket.write_all(response.as_bytes()).await {
        debug!("Metrics response to {} failed: {}", peer, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.connections_active.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.transitions_total.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.set_partitions(3, 2, 1);
        metrics.connections_rejected.store(4, Ordering::Relaxed);

        let output = metrics.to_prometheus();

        assert!(output.contains("session_participants_waiting_room 3"));
        assert!(output.contains("session_participants_loading 2"));
        assert!(output.contains("session_participants_active 1"));
        assert!(output.contains("session_connections_rejected_total 4"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.set_partitions(0, 5, 0);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["participants"]["loading"], 5);
        assert_eq!(value["connections"]["active"], 0);
    }

    #[test]
    fn test_routes() {
        let metrics = Metrics::new();
        assert!(route(&metrics, "GET /metrics HTTP/1.1").contains("session_status"));
        assert!(route(&metrics, "GET /metrics/json HTTP/1.1").contains("application/json"));
        assert!(route(&metrics, "GET /health HTTP/1.1").ends_with("OK"));
        assert!(route(&metrics, "POST /metrics HTTP/1.1").starts_with("HTTP/1.1 404"));
    }
}
