use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{UnixListener, UnixStream},
    sync::Mutex,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    commands::{LIVE_STATUS_ITEM, LOG_ITEM, SELF_TEST_ITEM},
    config::Settings,
    controller::{
        self_test::{SelfTestSequencer, SelfTestTiming},
        stage::XyStage,
    },
    dispatcher::CommandDispatcher,
    logging::read_log,
    models::{ApiStatus, DispatchOutcome, StatusMessage},
    system::read_cpu_temperature,
};

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    api_key: Option<String>,
    item: String,
    #[serde(default)]
    command: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Live(StatusMessage),
    Status(ApiStatus),
    Log { log: Vec<String> },
    Result { result: &'static str },
    Error { error: &'static str },
}

impl Response {
    const ACCEPTED: Response = Response::Result { result: "accepted" };
    const IGNORED: Response = Response::Result { result: "ignored" };
    const UNAUTHORISED: Response = Response::Error {
        error: "access token(s) unauthorised",
    };
    const MALFORMED: Response = Response::Error {
        error: "badly formed json message",
    };
    const LOG_UNAVAILABLE: Response = Response::Error {
        error: "log unavailable",
    };
}

/// Everything a connection needs to answer requests.
pub struct ApiContext {
    stage: Arc<XyStage>,
    dispatcher: CommandDispatcher,
    api_key: String,
    cpu_temp_path: PathBuf,
    log_path: PathBuf,
    self_test_timing: SelfTestTiming,
    self_test: Mutex<Option<JoinHandle<()>>>,
}

impl ApiContext {
    pub fn new(stage: Arc<XyStage>, dispatcher: CommandDispatcher, settings: &Settings) -> Self {
        Self {
            stage,
            dispatcher,
            api_key: settings.api_key.clone(),
            cpu_temp_path: settings.cpu_temp_path.clone(),
            log_path: settings.logging.directory.join(&settings.logging.file_name),
            self_test_timing: settings.self_test_timing(),
            self_test: Mutex::new(None),
        }
    }

    async fn live_status(&self) -> StatusMessage {
        let mut status = self.stage.status();
        status.cputemperature = match read_cpu_temperature(&self.cpu_temp_path).await {
            Ok(temperature) => Some(temperature),
            Err(e) => {
                debug!("CPU temperature unavailable: {}", e);
                None
            }
        };
        status
    }

    async fn log(&self) -> Response {
        match read_log(&self.log_path).await {
            Ok(log) => Response::Log { log },
            Err(e) => {
                warn!("Failed to read {}: {}", self.log_path.display(), e);
                Response::LOG_UNAVAILABLE
            }
        }
    }

    async fn start_self_test(&self) -> Response {
        let mut running = self.self_test.lock().await;
        if running.as_ref().is_some_and(|handle| !handle.is_finished()) {
            info!("Self test already running");
            return Response::IGNORED;
        }

        let sequencer = SelfTestSequencer::new(self.stage.clone(), self.self_test_timing);
        *running = Some(sequencer.spawn());
        Response::ACCEPTED
    }

    fn authorised(&self, api_key: Option<&str>) -> bool {
        api_key == Some(self.api_key.as_str())
    }
}

/// Answers one JSON request line.
pub async fn handle_request(ctx: &ApiContext, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Badly formed request: {}", e);
            return Response::MALFORMED;
        }
    };

    if request.item == LIVE_STATUS_ITEM {
        return Response::Live(ctx.live_status().await);
    }

    if !ctx.authorised(request.api_key.as_deref()) {
        warn!("Unauthorised request for {}", request.item);
        return Response::UNAUTHORISED;
    }

    if request.item == SELF_TEST_ITEM {
        return ctx.start_self_test().await;
    }

    if request.item == LOG_ITEM {
        return ctx.log().await;
    }

    match ctx.dispatcher.dispatch(&request.item, &request.command) {
        DispatchOutcome::Accepted => Response::ACCEPTED,
        DispatchOutcome::Ignored => Response::IGNORED,
        DispatchOutcome::Status(status) => Response::Status(status),
    }
}

/// Binds the API socket, replacing a stale socket file.
pub fn bind(socket_path: &Path) -> Result<UnixListener> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)
            .map_err(|e| anyhow!("Failed to remove existing socket file: {}", e))?;
    }

    let listener =
        UnixListener::bind(socket_path).map_err(|e| anyhow!("Failed to bind to socket: {}", e))?;
    info!("Listening on {}", socket_path.display());

    Ok(listener)
}

pub async fn run_communication_layer(listener: UnixListener, ctx: Arc<ApiContext>) -> Result<()> {
    loop {
        let (socket, _) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("Failed to accept connection: {}", e))?;

        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(socket, &ctx).await {
                warn!("Connection closed with error: {}", e);
            }
        });
    }
}

async fn serve_connection(socket: UnixStream, ctx: &ApiContext) -> Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_request(ctx, &line).await;
        let mut payload = serde_json::to_vec(&response)?;
        payload.push(b'\n');
        writer.write_all(&payload).await?;
    }

    Ok(())
}
