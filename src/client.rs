use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::errors::{Operation, Result, UnmanicError};
use crate::models::{
    decode, required, Application, Settings, SettingsUpdate, SystemConfiguration, TaskHistory,
    TaskQuery, TaskQueue, Worker,
};
use crate::transport::{ApiRequest, ConnectionConfig, HttpTransport, Transport};

const VERSION_READ: &str = "v2/version/read";
const SETTINGS_READ: &str = "v2/settings/read";
const SETTINGS_WRITE: &str = "v2/settings/write";
const SETTINGS_CONFIGURATION: &str = "v2/settings/configuration";
const WORKERS_STATUS: &str = "v2/workers/status";
const WORKER_PAUSE: &str = "v2/workers/worker/pause";
const WORKER_PAUSE_ALL: &str = "v2/workers/worker/pause/all";
const WORKER_RESUME: &str = "v2/workers/worker/resume";
const WORKER_RESUME_ALL: &str = "v2/workers/worker/resume/all";
const WORKER_TERMINATE: &str = "v2/workers/worker/terminate";
const PENDING_RESCAN: &str = "v1/pending/rescan";
const PENDING_TASKS: &str = "v2/pending/tasks";
const HISTORY_TASKS: &str = "v2/history/tasks";

/// Builder for constructing a [`Client`] with custom configuration.
///
/// # Example
///
/// ```no_run
/// use unmanic::ClientBuilder;
/// use std::time::Duration;
///
/// # fn example() -> unmanic::Result<()> {
/// let client = ClientBuilder::new()
///     .host("unmanic.example.com")
///     .port(443)
///     .tls(true)
///     .request_timeout(Duration::from_secs(15))
///     .header("Authorization", "Basic dXNlcjpwYXNz")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: ConnectionConfig,
    headers: Vec<(String, String)>,
    session: Option<reqwest::Client>,
    problems: Vec<String>,
}

impl ClientBuilder {
    /// Create a new builder with default settings (`http://localhost:8888/unmanic/api/`).
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::default(),
            headers: Vec::new(),
            session: None,
            problems: Vec::new(),
        }
    }

    /// Start from the `UNMANIC_HOST`, `UNMANIC_PORT`, `UNMANIC_BASE_PATH`,
    /// `UNMANIC_TLS` and `UNMANIC_TIMEOUT_SECS` environment variables.
    ///
    /// Unset variables keep their defaults. Unparsable ones make
    /// [`build`](Self::build) fail with [`UnmanicError::InvalidConfig`].
    pub fn from_env() -> Self {
        let mut builder = Self::new();

        if let Ok(host) = std::env::var("UNMANIC_HOST") {
            builder = builder.host(host);
        }
        if let Some(port) = builder.env_value::<u16>("UNMANIC_PORT") {
            builder = builder.port(port);
        }
        if let Ok(path) = std::env::var("UNMANIC_BASE_PATH") {
            builder = builder.base_path(path);
        }
        if let Ok(raw) = std::env::var("UNMANIC_TLS") {
            match parse_flag(&raw) {
                Some(tls) => builder = builder.tls(tls),
                None => builder
                    .problems
                    .push(format!("UNMANIC_TLS must be a boolean, got {raw:?}")),
            }
        }
        if let Some(secs) = builder.env_value::<u64>("UNMANIC_TIMEOUT_SECS") {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }

        builder
    }

    fn env_value<T: FromStr>(&mut self, name: &str) -> Option<T> {
        let raw = std::env::var(name).ok()?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.problems.push(format!("{name} has an invalid value {raw:?}"));
                None
            }
        }
    }

    /// Hostname or IP address of the server (defaults to `localhost`).
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Defaults to 8888.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// API prefix on the server (defaults to `/unmanic/api/`).
    pub fn base_path(mut self, path: impl Into<String>) -> Self {
        self.config.base_path = path.into();
        self
    }

    /// Upper bound on a whole request, connect through body (defaults to 8 seconds).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Talk HTTPS instead of HTTP.
    pub fn tls(mut self, tls: bool) -> Self {
        self.config.tls = tls;
        self
    }

    /// Verify the server certificate (defaults to `true`).
    ///
    /// Has no effect on a session supplied through [`session`](Self::session).
    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.config.verify_ssl = verify;
        self
    }

    /// Override the `User-Agent` header (defaults to `Unmanic-API/<version>`).
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Add a header sent with every request, e.g. credentials for a reverse proxy.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Reuse an existing `reqwest::Client`. The caller keeps ownership of it.
    pub fn session(mut self, session: reqwest::Client) -> Self {
        self.session = Some(session);
        self
    }

    /// Build the [`Client`].
    ///
    /// Returns [`UnmanicError::InvalidConfig`] for a zero timeout, an invalid
    /// header or user agent, or a bad environment variable picked up by
    /// [`from_env`](Self::from_env).
    pub fn build(self) -> Result<Client> {
        if let Some(problem) = self.problems.into_iter().next() {
            return Err(UnmanicError::InvalidConfig(problem));
        }

        let mut config = self.config;

        for (name, value) in self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| UnmanicError::InvalidConfig(format!("invalid header name {name:?}")))?;
            let header_value = HeaderValue::from_str(&value).map_err(|_| {
                UnmanicError::InvalidConfig(format!("invalid value for header {name:?}"))
            })?;
            config.headers.append(header_name, header_value);
        }

        let transport = match self.session {
            Some(session) => HttpTransport::with_session(config, session)?,
            None => HttpTransport::new(config)?,
        };
        Ok(Client::with_transport(transport))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// The Unmanic API client.
///
/// Every method maps to one API call (or, for the `*_workers_count` and
/// `get_installation_name` helpers, to a settings call). Failures come back as
/// [`UnmanicError::Operation`] naming the method, with the transport or decode
/// error as its source.
///
/// # Example
///
/// ```no_run
/// use unmanic::Client;
///
/// # async fn example() -> unmanic::Result<()> {
/// let client = Client::new("localhost")?;
///
/// println!("Unmanic {}", client.get_version().await?);
/// for worker in client.get_workers_status().await? {
///     println!("{} idle={} paused={}", worker.id, worker.idle, worker.paused);
/// }
/// client.close_session().await;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    transport: Box<dyn Transport>,
    app: Option<Application>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("transport", &"dyn Transport")
            .field("app", &self.app)
            .finish()
    }
}

impl Client {
    /// Create a client for `host` with every other setting at its default.
    ///
    /// For customization, use [`ClientBuilder`] instead.
    pub fn new(host: impl Into<String>) -> Result<Self> {
        let config = ConnectionConfig {
            host: host.into(),
            ..ConnectionConfig::default()
        };
        Ok(Self::with_transport(HttpTransport::new(config)?))
    }

    /// Drive the client through any [`Transport`] implementation.
    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            app: None,
        }
    }

    /// Server version string, e.g. `"0.1.4~655b18b"`.
    pub async fn get_version(&self) -> Result<String> {
        self.read_version()
            .await
            .map_err(|e| e.within(Operation::GetVersion))
    }

    pub async fn get_settings(&self) -> Result<Settings> {
        self.read_settings()
            .await
            .map_err(|e| e.within(Operation::GetSettings))
    }

    /// Write the fields set in `settings`. Returns the server's `success` flag.
    pub async fn set_settings(&self, settings: &SettingsUpdate) -> Result<bool> {
        self.write_settings(settings)
            .await
            .map_err(|e| e.within(Operation::SetSettings))
    }

    pub async fn get_workers_count(&self) -> Result<u32> {
        self.read_settings()
            .await
            .map(|s| s.number_of_workers)
            .map_err(|e| e.within(Operation::GetWorkersCount))
    }

    pub async fn set_workers_count(&self, number_of_workers: u32) -> Result<bool> {
        let update = SettingsUpdate {
            number_of_workers: Some(number_of_workers),
            ..Default::default()
        };
        self.write_settings(&update)
            .await
            .map_err(|e| e.within(Operation::SetWorkersCount))
    }

    pub async fn get_workers_status(&self) -> Result<Vec<Worker>> {
        self.read_workers()
            .await
            .map_err(|e| e.within(Operation::GetWorkersStatus))
    }

    /// Pause one worker by id (e.g. `"W0"`).
    pub async fn pause_worker(&self, worker_id: &str) -> Result<bool> {
        self.success(ApiRequest::post(WORKER_PAUSE).json(&json!({ "worker_id": worker_id })))
            .await
            .map_err(|e| e.within(Operation::PauseWorker))
    }

    pub async fn pause_all_workers(&self) -> Result<bool> {
        self.success(ApiRequest::post(WORKER_PAUSE_ALL))
            .await
            .map_err(|e| e.within(Operation::PauseAllWorkers))
    }

    pub async fn resume_worker(&self, worker_id: &str) -> Result<bool> {
        self.success(ApiRequest::post(WORKER_RESUME).json(&json!({ "worker_id": worker_id })))
            .await
            .map_err(|e| e.within(Operation::ResumeWorker))
    }

    pub async fn resume_all_workers(&self) -> Result<bool> {
        self.success(ApiRequest::post(WORKER_RESUME_ALL))
            .await
            .map_err(|e| e.within(Operation::ResumeAllWorkers))
    }

    /// Kill the worker's current job. The server spawns a replacement.
    pub async fn terminate_worker(&self, worker_id: &str) -> Result<bool> {
        self.success(ApiRequest::post(WORKER_TERMINATE).json(&json!({ "worker_id": worker_id })))
            .await
            .map_err(|e| e.within(Operation::TerminateWorker))
    }

    pub async fn get_installation_name(&self) -> Result<String> {
        self.read_settings()
            .await
            .map(|s| s.installation_name)
            .map_err(|e| e.within(Operation::GetInstallationName))
    }

    /// Ask the server to rescan its library for new files.
    pub async fn trigger_library_scan(&self) -> Result<bool> {
        self.success(ApiRequest::get(PENDING_RESCAN))
            .await
            .map_err(|e| e.within(Operation::TriggerLibraryScan))
    }

    /// One page of the pending queue. `None` uses [`TaskQuery::pending`].
    pub async fn get_pending_tasks(&self, query: Option<TaskQuery>) -> Result<TaskQueue> {
        let query = query.unwrap_or_else(TaskQuery::pending);
        self.read_pending_tasks(&query)
            .await
            .map_err(|e| e.within(Operation::GetPendingTasks))
    }

    /// One page of completed tasks. `None` uses [`TaskQuery::history`].
    pub async fn get_task_history(&self, query: Option<TaskQuery>) -> Result<TaskHistory> {
        let query = query.unwrap_or_else(TaskQuery::history);
        self.read_task_history(&query)
            .await
            .map_err(|e| e.within(Operation::GetTaskHistory))
    }

    pub async fn get_system_configuration(&self) -> Result<SystemConfiguration> {
        self.read_system_configuration()
            .await
            .map_err(|e| e.within(Operation::GetSystemConfiguration))
    }

    /// Refresh the cached [`Application`] snapshot and return it.
    ///
    /// Workers and settings are always fetched. The version is fetched on the
    /// first call or when `full_update` is set; otherwise the cached one is
    /// kept. The snapshot is replaced as a whole, so a failed update leaves the
    /// previous one untouched.
    pub async fn update(&mut self, full_update: bool) -> Result<&Application> {
        let app = self
            .fetch_application(full_update)
            .await
            .map_err(|e| e.within(Operation::Update))?;
        debug!(
            version = %app.version,
            workers = app.workers.len(),
            full_update,
            "refreshed application snapshot"
        );
        Ok(&*self.app.insert(app))
    }

    /// The snapshot from the last successful [`update`](Self::update).
    pub fn app(&self) -> Option<&Application> {
        self.app.as_ref()
    }

    /// Release the HTTP session if the client opened it. Safe to call more than once.
    pub async fn close_session(&self) {
        self.transport.close_session().await;
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Issue a request that must answer with a JSON object.
    async fn call(&self, request: ApiRequest) -> Result<Map<String, Value>> {
        let payload = self.transport.request(request).await?;
        Ok(payload.into_object()?)
    }

    /// Issue a request answered with `{"success": bool}`.
    async fn success(&self, request: ApiRequest) -> Result<bool> {
        let body = self.call(request).await?;
        Ok(decode("success flag", required(&body, "success")?)?)
    }

    async fn read_version(&self) -> Result<String> {
        let body = self.call(ApiRequest::get(VERSION_READ)).await?;
        Ok(decode("version", required(&body, "version")?)?)
    }

    async fn read_settings(&self) -> Result<Settings> {
        let body = self.call(ApiRequest::get(SETTINGS_READ)).await?;
        Ok(Settings::from_value(required(&body, "settings")?)?)
    }

    async fn write_settings(&self, settings: &SettingsUpdate) -> Result<bool> {
        self.success(ApiRequest::post(SETTINGS_WRITE).json(&json!({ "settings": settings })))
            .await
    }

    async fn read_workers(&self) -> Result<Vec<Worker>> {
        let body = self.call(ApiRequest::get(WORKERS_STATUS)).await?;
        Ok(Worker::list_from_value(required(&body, "workers_status")?)?)
    }

    async fn read_pending_tasks(&self, query: &TaskQuery) -> Result<TaskQueue> {
        let body = self
            .call(ApiRequest::post(PENDING_TASKS).json(&json!(query)))
            .await?;
        Ok(TaskQueue::from_value(&Value::Object(body))?)
    }

    async fn read_task_history(&self, query: &TaskQuery) -> Result<TaskHistory> {
        let body = self
            .call(ApiRequest::post(HISTORY_TASKS).json(&json!(query)))
            .await?;
        Ok(TaskHistory::from_value(&Value::Object(body))?)
    }

    async fn read_system_configuration(&self) -> Result<SystemConfiguration> {
        let body = self.call(ApiRequest::get(SETTINGS_CONFIGURATION)).await?;
        Ok(SystemConfiguration::from_value(required(&body, "configuration")?)?)
    }

    async fn fetch_application(&self, full_update: bool) -> Result<Application> {
        let workers = self.call(ApiRequest::get(WORKERS_STATUS)).await?;
        let settings = self.call(ApiRequest::get(SETTINGS_READ)).await?;

        let version = match (&self.app, full_update) {
            (Some(app), false) => Value::String(app.version.clone()),
            _ => {
                let body = self.call(ApiRequest::get(VERSION_READ)).await?;
                required(&body, "version")?.clone()
            }
        };

        let data = json!({
            "settings": required(&settings, "settings")?,
            "workers": required(&workers, "workers_status")?,
            "version": version,
        });
        Ok(Application::from_value(&data)?)
    }
}
