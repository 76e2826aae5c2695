//! In-memory stand-ins for the process, prompt and resolver seams.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::bsp::config::Endpoint;
use crate::bsp::prompt::{PromptAction, PromptRequest, PromptService};
use crate::daemon::controller::{JvmProcess, LaunchCommand, ProcessController};
use crate::daemon::protocol::{BspParams, DaemonInfo};
use crate::daemon::resolver::DaemonResolver;
use crate::utils::error::BridgeError;

pub struct FakeController {
    running: AtomicBool,
    starts_daemon: bool,
    listen_on_bsp: bool,
    version: String,
    jvm_processes: Vec<JvmProcess>,
    failing_enumeration: bool,
    exit_code: i32,
    start_calls: AtomicUsize,
    last_start: Mutex<Option<LaunchCommand>>,
    bsp_requests: Mutex<Vec<BspParams>>,
    terminated: Mutex<Vec<u32>>,
    events: Mutex<Vec<String>>,
}

impl FakeController {
    fn new(running: bool, version: &str) -> Self {
        Self {
            running: AtomicBool::new(running),
            starts_daemon: true,
            listen_on_bsp: false,
            version: version.to_string(),
            jvm_processes: Vec::new(),
            failing_enumeration: false,
            exit_code: 0,
            start_calls: AtomicUsize::new(0),
            last_start: Mutex::new(None),
            bsp_requests: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn running(version: &str) -> Self {
        Self::new(true, version)
    }

    pub fn stopped() -> Self {
        Self::new(false, "2.0.0")
    }

    pub fn never_starting(mut self) -> Self {
        self.starts_daemon = false;
        self
    }

    /// Bind a real domain socket whenever a BSP session is requested.
    pub fn listening_on_bsp(mut self) -> Self {
        self.listen_on_bsp = true;
        self
    }

    pub fn with_jvm_process(mut self, pid: u32, main_class: &str) -> Self {
        self.jvm_processes.push(JvmProcess { pid, main_class: main_class.to_string() });
        self
    }

    pub fn failing_enumeration(mut self) -> Self {
        self.failing_enumeration = true;
        self
    }

    pub fn exiting_with(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn last_start(&self) -> Option<LaunchCommand> {
        self.last_start.lock().unwrap().clone()
    }

    pub fn bsp_requests(&self) -> Vec<BspParams> {
        self.bsp_requests.lock().unwrap().clone()
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: &str) {
        self.events.lock().unwrap().push(event.to_string());
    }
}

#[async_trait]
impl ProcessController for FakeController {
    async fn check(&self, _address: &Endpoint) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn about(&self, address: &Endpoint) -> Result<DaemonInfo> {
        if !self.check(address).await {
            anyhow::bail!("no daemon at {address}");
        }
        Ok(DaemonInfo { version: self.version.clone(), jvm_options: Vec::new(), pid: None })
    }

    async fn start(&self, command: &LaunchCommand) -> Result<()> {
        self.record("start");
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_start.lock().unwrap() = Some(command.clone());
        if self.starts_daemon {
            self.set_running(true);
        }
        Ok(())
    }

    async fn open_bsp(&self, _address: &Endpoint, params: &BspParams) -> Result<()> {
        self.record("bsp");
        self.bsp_requests.lock().unwrap().push(params.clone());

        #[cfg(unix)]
        if self.listen_on_bsp {
            let listener = std::os::unix::net::UnixListener::bind(&params.socket)?;
            std::thread::spawn(move || {
                if let Ok((mut stream, _)) = listener.accept() {
                    let mut sink = Vec::new();
                    let _ = std::io::Read::read_to_end(&mut stream, &mut sink);
                }
            });
        }
        Ok(())
    }

    async fn exit(&self, _address: &Endpoint) -> i32 {
        self.record("exit");
        if self.exit_code == 0 {
            self.set_running(false);
        }
        self.exit_code
    }

    async fn jvm_processes(&self, jps: &Path) -> Result<Vec<JvmProcess>> {
        if self.failing_enumeration {
            return Err(BridgeError::ProcessEnumeration { message: jps.display().to_string() }.into());
        }
        Ok(self.jvm_processes.clone())
    }

    async fn terminate(&self, pid: u32) -> Result<()> {
        self.terminated.lock().unwrap().push(pid);
        Ok(())
    }
}

pub struct FakePrompt {
    answer: Option<PromptAction>,
    requests: Mutex<Vec<PromptRequest>>,
}

impl FakePrompt {
    pub fn answering(answer: Option<PromptAction>) -> Self {
        Self { answer, requests: Mutex::new(Vec::new()) }
    }

    pub fn asked(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<PromptRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PromptService for FakePrompt {
    async fn ask(&self, request: PromptRequest) -> Option<PromptAction> {
        self.requests.lock().unwrap().push(request);
        self.answer
    }
}

pub struct FakeResolver {
    jars: Option<Vec<PathBuf>>,
}

impl FakeResolver {
    pub fn jars(paths: &[&str]) -> Self {
        Self { jars: Some(paths.iter().map(PathBuf::from).collect()) }
    }

    pub fn missing() -> Self {
        Self { jars: None }
    }
}

#[async_trait]
impl DaemonResolver for FakeResolver {
    async fn resolve(&self, version: &str) -> Result<Vec<PathBuf>> {
        self.jars.clone().ok_or_else(|| {
            BridgeError::Resolution { version: version.to_string(), message: "not found".into() }
                .into()
        })
    }
}
