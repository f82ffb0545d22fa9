// Shared fixtures for tankless-core integration tests: a mock cloud and a
// scriptable fake heater speaking the local line protocol.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use secrecy::SecretString;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use url::Url;
use wiremock::MockServer;

use tankless_api::{
    CloudClient, LocalClient, LocalEndpoint, LocalTimeouts, MemoryTokenStore, SessionManager,
    TokenPair, TokenStore, TransportConfig,
};
use tankless_core::{
    CommandPreference, ConnectionMode, ConnectionStrategy, CoordinatorSettings, Device,
    DeviceCoordinator, HubEvent, RecirculationCapability, StrategySettings,
};

// ── Cloud ────────────────────────────────────────────────────────────

pub fn jwt(expires_in_secs: i64) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &json!({ "exp": Utc::now().timestamp() + expires_in_secs }),
        &jsonwebtoken::EncodingKey::from_secret(b"cloud-signing-key"),
    )
    .unwrap()
}

/// A cloud client whose session is already valid for an hour.
pub async fn cloud_client(server: &MockServer) -> CloudClient {
    let store = Arc::new(MemoryTokenStore::new());
    store
        .save(&TokenPair {
            access_token: SecretString::from(jwt(3600)),
            refresh_token: SecretString::from("refresh".to_owned()),
        })
        .unwrap();
    let session = SessionManager::new(
        Url::parse(&server.uri()).unwrap(),
        &TransportConfig::default(),
        store,
    )
    .unwrap();
    assert!(session.restore().await.unwrap());
    CloudClient::new(Arc::new(session))
}

pub fn status_body(outlet: i64, recirculating: bool) -> serde_json::Value {
    json!({
        "shadow": {
            "set_domestic_temperature": 120,
            "operation_enabled": true,
            "recirculation_enabled": recirculating
        },
        "info": {
            "m02_outlet_temperature": outlet.to_string(),
            "domestic_combustion": "false"
        }
    })
}

// ── Fake heater ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterMode {
    Healthy,
    /// Accept, then drop the connection without a word.
    Broken,
    /// Greet, read the command, never answer.
    Silent,
}

struct HeaterState {
    mode: HeaterMode,
    serial: String,
    props: BTreeMap<String, String>,
    received: Vec<String>,
}

#[derive(Clone)]
pub struct FakeHeater {
    pub endpoint: LocalEndpoint,
    state: Arc<Mutex<HeaterState>>,
    connections: Arc<AtomicUsize>,
}

impl FakeHeater {
    pub async fn start(mode: HeaterMode, serial: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let props = [
            ("domestic_temperature", "120"),
            ("set_domestic_temperature", "+120 {r/w}"),
            ("operation_enabled", "true"),
            ("recirculation_enabled", "false"),
            ("schedule_holiday", "+false {70d}"),
            ("m02_outlet_temperature", "119"),
            ("m08_inlet_temperature", "58"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        let heater = Self {
            endpoint: LocalEndpoint {
                host: "127.0.0.1".into(),
                port,
            },
            state: Arc::new(Mutex::new(HeaterState {
                mode,
                serial: serial.to_owned(),
                props,
                received: Vec::new(),
            })),
            connections: Arc::new(AtomicUsize::new(0)),
        };

        let server = heater.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                server.connections.fetch_add(1, Ordering::SeqCst);
                let server = server.clone();
                tokio::spawn(async move { server.serve(socket).await });
            }
        });
        heater
    }

    async fn serve(&self, socket: tokio::net::TcpStream) {
        let mode = self.state.lock().unwrap().mode;
        if mode == HeaterMode::Broken {
            return;
        }
        let (read, mut write) = socket.into_split();
        if write.write_all(b"heater> ").await.is_err() {
            return;
        }
        let mut line = String::new();
        if BufReader::new(read).read_line(&mut line).await.is_err() {
            return;
        }
        if mode == HeaterMode::Silent {
            tokio::time::sleep(Duration::from_secs(30)).await;
            return;
        }
        let reply = self.respond(line.trim());
        let _ = write.write_all(reply.as_bytes()).await;
    }

    fn respond(&self, command: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.received.push(command.to_owned());
        match command {
            "list" => state
                .props
                .iter()
                .map(|(k, v)| format!("{k}: {v}\n"))
                .collect(),
            "sysinfo" => format!(
                "{{\"sysinfo\":{{\"serial-number\":\"{}\",\"fw-version\":\"1.9\"}}}}\n",
                state.serial
            ),
            set if set.starts_with("set ") => {
                let mut parts = set.splitn(3, ' ').skip(1);
                let prop = parts.next().unwrap_or_default().to_owned();
                let value = parts.next().unwrap_or_default().to_owned();
                let reported = match prop.as_str() {
                    "set_operation_enabled" => "operation_enabled",
                    "set_recirculation_enabled" => "recirculation_enabled",
                    other => other,
                };
                state.props.insert(reported.to_owned(), value.clone());
                format!("#? set '{prop}' to {value}\n")
            }
            _ => "unknown command\n".to_owned(),
        }
    }

    pub fn set_mode(&self, mode: HeaterMode) {
        self.state.lock().unwrap().mode = mode;
    }

    pub fn set_prop(&self, key: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .props
            .insert(key.to_owned(), value.to_owned());
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<String> {
        self.state.lock().unwrap().received.clone()
    }

    pub fn client(&self) -> Arc<LocalClient> {
        Arc::new(LocalClient::new(self.endpoint.clone(), fast_timeouts()))
    }
}

pub fn fast_timeouts() -> LocalTimeouts {
    LocalTimeouts {
        connect: Duration::from_millis(300),
        read: Duration::from_millis(200),
        greeting: Duration::from_millis(100),
        idle: Duration::from_millis(50),
    }
}

// ── Builders ─────────────────────────────────────────────────────────

pub fn device(id: &str) -> Device {
    Device {
        id: id.to_owned(),
        serial: Some(format!("SN-{id}")),
        firmware_version: Some("1.0".into()),
        model: Some("RU199".into()),
        name: None,
        recirculation: RecirculationCapability::BuiltIn,
    }
}

pub fn strategy_settings(base_cooldown: Duration, preference: CommandPreference) -> StrategySettings {
    StrategySettings {
        failure_threshold: 3,
        base_cooldown,
        max_cooldown: base_cooldown * 8,
        command_preference: preference,
    }
}

pub fn coordinator_settings() -> CoordinatorSettings {
    CoordinatorSettings {
        poll_interval: Duration::from_secs(60),
        failure_threshold: 3,
        maintenance_interval: None,
        recirculation_default_minutes: 15,
        shutdown_timeout: Duration::from_secs(2),
    }
}

pub fn coordinator(
    mode: ConnectionMode,
    cloud: Option<CloudClient>,
    local: Option<Arc<LocalClient>>,
    settings: CoordinatorSettings,
) -> (DeviceCoordinator, broadcast::Receiver<HubEvent>) {
    let (events, rx) = broadcast::channel(32);
    let strategy = ConnectionStrategy::new(
        mode,
        "dev-1",
        cloud,
        local,
        strategy_settings(Duration::from_secs(60), CommandPreference::LocalFirst),
    )
    .unwrap();
    let coordinator = DeviceCoordinator::new(
        device("dev-1"),
        strategy,
        settings,
        events,
        tokio_util::sync::CancellationToken::new(),
    );
    (coordinator, rx)
}
