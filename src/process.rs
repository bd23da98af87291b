//! Proxy process supervision.
//!
//! The supervisor owns the child handle of any proxy it starts. When the
//! management server restarts it loses that handle, so discovery falls back to
//! the PID marker file and then to a process-name scan. Those recovered
//! processes are reported with their origin so callers can tell them apart.
//!
//! "Running" means a live process matched by the locator. Whether the proxy's
//! port accepts connections is reported separately and never required.

use crate::config::ProxyConfig;
use crate::error::ManagerError;
use crate::proxy_config::ProxyConfigFile;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, Signal, System, UpdateKind};
use tokio::process::{Child, Command};

/// How long a liveness answer is reused across requests.
const LIVENESS_TTL: Duration = Duration::from_secs(1);
const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(300);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STARTUP_LOG_TAIL_LINES: usize = 20;
const COMM_MAX: usize = 15;

/// How a running proxy was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOrigin {
    /// Spawned by this supervisor.
    Owned,
    /// Recovered from the PID marker file.
    PidFile,
    /// Recovered by scanning process names.
    Scan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub memory_bytes: Option<u64>,
    pub origin: ProcessOrigin,
}

/// Proxy status as reported by `GET /api/status`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub running: bool,
    pub pid: Option<u32>,
    #[serde(rename = "memoryMB")]
    pub memory_mb: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub port: u16,
    pub endpoint: String,
    pub endpoint_ready: bool,
    pub origin: Option<ProcessOrigin>,
}

/// Tail of the proxy log.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogTail {
    pub lines: Vec<String>,
    pub total: usize,
}

/// Starts, stops and locates the proxy binary.
pub struct Supervisor {
    settings: ProxyConfig,
    config_file: ProxyConfigFile,
    child: Mutex<Option<Child>>,
    lifecycle: tokio::sync::Mutex<()>,
    liveness: Cache<(), Option<ProcessInfo>>,
}

impl Supervisor {
    pub fn new(settings: ProxyConfig) -> Self {
        let config_file = ProxyConfigFile::new(settings.config.clone());
        Self {
            settings,
            config_file,
            child: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            liveness: Cache::builder().time_to_live(LIVENESS_TTL).build(),
        }
    }

    pub fn settings(&self) -> &ProxyConfig {
        &self.settings
    }

    pub fn config_file(&self) -> &ProxyConfigFile {
        &self.config_file
    }

    /// Proxy port: `port:` from config.yaml, else the configured default.
    pub fn proxy_port(&self) -> u16 {
        self.config_file.settings().port.unwrap_or(self.settings.port)
    }

    /// Base URL of the proxy's OpenAI-compatible API.
    pub fn proxy_base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.proxy_port())
    }

    /// Locate the running proxy. Absence is a normal state, not an error.
    pub fn find_process(&self) -> Option<ProcessInfo> {
        locate(&self.settings, self.owned_pid())
    }

    /// Cached liveness shared by status, auth-status and models handlers.
    pub async fn cached_process(&self) -> Option<ProcessInfo> {
        self.liveness
            .get_with((), async {
                let owned = self.owned_pid();
                let settings = self.settings.clone();
                tokio::task::spawn_blocking(move || locate(&settings, owned))
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "process lookup task failed");
                        None
                    })
            })
            .await
    }

    pub async fn status(&self) -> ServerStatus {
        let process = self.cached_process().await;
        let port = self.proxy_port();
        let endpoint_ready = match process {
            Some(_) => port_open(port).await,
            None => false,
        };

        ServerStatus {
            running: process.is_some(),
            pid: process.as_ref().map(|p| p.pid),
            memory_mb: process
                .as_ref()
                .and_then(|p| p.memory_bytes)
                .map(|b| (b as f64 / (1024.0 * 1024.0) * 10.0).round() / 10.0),
            start_time: process.as_ref().and_then(|p| p.start_time),
            port,
            endpoint: format!("http://127.0.0.1:{}/v1", port),
            endpoint_ready,
            origin: process.map(|p| p.origin),
        }
    }

    /// Spawn the proxy detached, with output appended to the log file.
    pub async fn start(&self) -> Result<ProcessInfo, ManagerError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.liveness.invalidate(&()).await;

        if let Some(existing) = self.find_process() {
            return Err(ManagerError::AlreadyRunning(existing.pid));
        }
        self.check_installation()?;

        let log_offset = std::fs::metadata(&self.settings.log_file)
            .map(|m| m.len())
            .unwrap_or(0);
        let mut command = self.proxy_command(&[])?;
        let child = command.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| ManagerError::Internal("spawned proxy has no pid".to_string()))?;

        *self.child.lock().unwrap_or_else(|e| e.into_inner()) = Some(child);
        if let Err(e) = write_pid_file(&self.settings, pid) {
            tracing::warn!(error = %e, "failed to write pid marker");
        }
        tracing::info!(pid, binary = %self.settings.binary.display(), "proxy spawned");

        tokio::time::sleep(Duration::from_millis(self.settings.startup_grace_ms)).await;

        if self.owned_pid().is_none() {
            let _ = std::fs::remove_file(&self.settings.pid_file);
            let tail = read_tail_from(&self.settings.log_file, log_offset, STARTUP_LOG_TAIL_LINES);
            let detail = if tail.is_empty() {
                "no output captured".to_string()
            } else {
                tail.join("\n")
            };
            tracing::warn!(pid, "proxy exited during startup");
            return Err(ManagerError::ProcessExited(detail));
        }

        self.liveness.invalidate(&()).await;
        let mut system = System::new();
        Ok(describe(&mut system, pid, ProcessOrigin::Owned))
    }

    /// Terminate gracefully, escalate to a kill after the grace period.
    pub async fn stop(&self) -> Result<u32, ManagerError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.liveness.invalidate(&()).await;

        let process = self.find_process().ok_or(ManagerError::NotRunning)?;
        let pid = process.pid;

        send_signal(pid, Signal::Term);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(self.settings.stop_grace_ms);
        while self.is_alive(pid) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        if self.is_alive(pid) {
            tracing::warn!(pid, "proxy ignored termination, killing");
            self.force_kill(pid);
        }

        let owned = self.child.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut child) = owned {
            let _ = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
        }

        let _ = std::fs::remove_file(&self.settings.pid_file);
        self.liveness.invalidate(&()).await;
        tracing::info!(pid, origin = ?process.origin, "proxy stopped");
        Ok(pid)
    }

    /// Stop (tolerating "not running") then start.
    pub async fn restart(&self) -> Result<ProcessInfo, ManagerError> {
        match self.stop().await {
            Ok(_) | Err(ManagerError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        self.start().await
    }

    /// Launch the proxy's interactive login for one provider in its own session.
    pub async fn login(&self, flag: &str) -> Result<u32, ManagerError> {
        self.check_installation()?;
        let mut command = self.proxy_command(&[flag])?;
        let child = command.spawn()?;
        let pid = child.id().unwrap_or_default();
        tracing::info!(pid, flag, "login flow launched");
        Ok(pid)
    }

    /// Last `lines` lines of the proxy log.
    pub fn logs(&self, lines: usize) -> Result<LogTail, ManagerError> {
        let content = match std::fs::read_to_string(&self.settings.log_file) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let all: Vec<&str> = content.lines().collect();
        let start = all.len().saturating_sub(lines);
        Ok(LogTail {
            lines: all[start..].iter().map(|s| s.to_string()).collect(),
            total: all.len(),
        })
    }

    fn check_installation(&self) -> Result<(), ManagerError> {
        if !self.settings.binary.is_file() {
            return Err(ManagerError::NotFound(format!(
                "proxy binary {}",
                self.settings.binary.display()
            )));
        }
        if !self.config_file.exists() {
            return Err(ManagerError::NotFound(format!(
                "config file {}",
                self.config_file.path().display()
            )));
        }
        Ok(())
    }

    fn proxy_command(&self, extra: &[&str]) -> Result<Command, ManagerError> {
        if let Some(parent) = self.settings.log_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.settings.log_file)?;
        let log_err = log.try_clone()?;

        let mut command = Command::new(&self.settings.binary);
        command
            .arg("--config")
            .arg(self.config_file.path())
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        if let Some(dir) = self.settings.binary.parent() {
            command.current_dir(dir);
        }

        #[cfg(unix)]
        command.process_group(0);

        #[cfg(windows)]
        {
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        Ok(command)
    }

    /// PID of the owned child if it is still running; reaps it otherwise.
    fn owned_pid(&self) -> Option<u32> {
        let mut guard = self.child.lock().unwrap_or_else(|e| e.into_inner());
        let child = guard.as_mut()?;
        match child.try_wait() {
            Ok(None) => child.id(),
            Ok(Some(status)) => {
                tracing::info!(%status, "owned proxy exited");
                *guard = None;
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to poll owned proxy");
                *guard = None;
                None
            }
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        if self.owned_pid() == Some(pid) {
            return true;
        }
        let mut system = System::new();
        let sys_pid = Pid::from_u32(pid);
        system.refresh_process(sys_pid) && system.process(sys_pid).is_some_and(is_live)
    }

    fn force_kill(&self, pid: u32) {
        let mut guard = self.child.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(child) = guard.as_mut().filter(|c| c.id() == Some(pid)) {
            if let Err(e) = child.start_kill() {
                tracing::warn!(pid, error = %e, "kill failed");
            }
            return;
        }
        drop(guard);
        send_signal(pid, Signal::Kill);
    }
}

/// Owned child first, then the PID marker, then a name scan.
fn locate(settings: &ProxyConfig, owned: Option<u32>) -> Option<ProcessInfo> {
    let mut system = System::new();

    if let Some(pid) = owned {
        return Some(describe(&mut system, pid, ProcessOrigin::Owned));
    }

    let wanted = wanted_names(settings);
    if let Some(pid) = read_pid_file(settings) {
        if pid_matches(&mut system, pid, &wanted) {
            return Some(describe(&mut system, pid, ProcessOrigin::PidFile));
        }
        tracing::debug!(pid, "stale pid marker removed");
        let _ = std::fs::remove_file(&settings.pid_file);
    }

    system.refresh_processes_specifics(refresh_kind());
    let found = system
        .processes()
        .iter()
        .filter(|(_, p)| is_live(p) && matches_names(p, &wanted))
        .map(|(pid, _)| pid.as_u32())
        .min()?;

    tracing::info!(pid = found, "recovered proxy by process scan");
    if let Err(e) = write_pid_file(settings, found) {
        tracing::warn!(error = %e, "failed to persist discovered pid");
    }
    Some(describe(&mut system, found, ProcessOrigin::Scan))
}

/// The default refresh leaves the command line empty.
fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::new()
        .with_cmd(UpdateKind::Always)
        .with_exe(UpdateKind::OnlyIfNotSet)
        .with_memory()
}

fn pid_matches(system: &mut System, pid: u32, wanted: &[String]) -> bool {
    let sys_pid = Pid::from_u32(pid);
    if !system.refresh_process_specifics(sys_pid, refresh_kind()) {
        return false;
    }
    system
        .process(sys_pid)
        .is_some_and(|p| is_live(p) && matches_names(p, wanted))
}

fn wanted_names(settings: &ProxyConfig) -> Vec<String> {
    let mut names: Vec<String> = settings.process_names.iter().map(|n| normalize_name(n)).collect();
    if let Some(file) = settings.binary.file_name().and_then(|f| f.to_str()) {
        names.push(normalize_name(file));
    }
    names
}

fn read_pid_file(settings: &ProxyConfig) -> Option<u32> {
    let content = std::fs::read_to_string(&settings.pid_file).ok()?;
    match content.trim().parse() {
        Ok(pid) => Some(pid),
        Err(_) => {
            tracing::warn!(path = %settings.pid_file.display(), "unreadable pid marker");
            None
        }
    }
}

fn write_pid_file(settings: &ProxyConfig, pid: u32) -> std::io::Result<()> {
    crate::persist::write_atomic(&settings.pid_file, pid.to_string().as_bytes())
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
        .trim_end_matches(".exe")
        .to_string()
}

fn base_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|f| f.to_str()).map(normalize_name)
}

fn is_live(process: &Process) -> bool {
    !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
}

/// Linux cuts the kernel process name to 15 bytes.
fn comm_matches(comm: &str, wanted: &str) -> bool {
    comm == wanted || (cfg!(target_os = "linux") && comm.len() == COMM_MAX && wanted.starts_with(comm))
}

/// Match on the process name, the executable, or the program/script path in
/// its command line.
fn matches_names(process: &Process, wanted: &[String]) -> bool {
    let comm = normalize_name(process.name());
    if wanted.iter().any(|w| comm_matches(&comm, w)) {
        return true;
    }
    let exe = process.exe().and_then(base_name);
    let args = process.cmd().iter().take(2).filter_map(|arg| base_name(Path::new(arg)));
    exe.into_iter().chain(args).any(|name| wanted.contains(&name))
}

fn describe(system: &mut System, pid: u32, origin: ProcessOrigin) -> ProcessInfo {
    let sys_pid = Pid::from_u32(pid);
    system.refresh_process_specifics(sys_pid, refresh_kind());
    let process = system.process(sys_pid);
    ProcessInfo {
        pid,
        start_time: process.and_then(|p| DateTime::from_timestamp(p.start_time() as i64, 0)),
        memory_bytes: process.map(|p| p.memory()),
        origin,
    }
}

/// Send `signal`, falling back to a hard kill where the platform lacks it.
fn send_signal(pid: u32, signal: Signal) {
    let mut system = System::new();
    let sys_pid = Pid::from_u32(pid);
    if !system.refresh_process(sys_pid) {
        return;
    }
    if let Some(process) = system.process(sys_pid) {
        if process.kill_with(signal).is_none() {
            process.kill();
        }
    }
}

/// Whether something accepts TCP connections on the local port.
pub async fn port_open(port: u16) -> bool {
    matches!(
        tokio::time::timeout(PORT_PROBE_TIMEOUT, tokio::net::TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

/// Lines written to `path` after byte `offset`, last `max` of them.
fn read_tail_from(path: &Path, offset: u64, max: usize) -> Vec<String> {
    let Ok(mut file) = std::fs::File::open(path) else {
        return Vec::new();
    };
    let mut content = String::new();
    if file.seek(SeekFrom::Start(offset)).is_err() || file.read_to_string(&mut content).is_err() {
        return Vec::new();
    }
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max);
    lines[start..].iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;

    fn test_settings(dir: &Path) -> ProxyConfig {
        let mut settings = Config::rooted_at(dir).proxy;
        settings.startup_grace_ms = 300;
        settings.stop_grace_ms = 1000;
        // Never match a real proxy that happens to run on the test machine.
        settings.process_names = vec![];
        settings.binary = dir.join("bin").join(format!("{}-fake-proxy", uuid::Uuid::new_v4().simple()));
        settings
    }

    #[cfg(unix)]
    fn install_script(settings: &ProxyConfig, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        fs::create_dir_all(settings.binary.parent().unwrap()).unwrap();
        fs::write(&settings.binary, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&settings.binary, fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(&settings.config, "port: 1\n").unwrap();
    }

    #[tokio::test]
    async fn start_fails_when_binary_missing() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(test_settings(dir.path()));

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, ManagerError::NotFound(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn start_fails_when_config_missing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        fs::create_dir_all(settings.binary.parent().unwrap()).unwrap();
        fs::write(&settings.binary, "").unwrap();
        let supervisor = Supervisor::new(settings);

        let err = supervisor.start().await.unwrap_err();
        assert!(err.to_string().contains("config file"));
    }

    #[tokio::test]
    async fn stop_when_not_running_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(test_settings(dir.path()));

        assert_eq!(supervisor.stop().await.unwrap_err(), ManagerError::NotRunning);
        assert_eq!(supervisor.stop().await.unwrap_err(), ManagerError::NotRunning);
    }

    #[tokio::test]
    async fn status_reports_stopped_proxy() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(test_settings(dir.path()));

        let status = supervisor.status().await;
        assert!(!status.running);
        assert_eq!(status.pid, None);
        assert!(!status.endpoint_ready);
    }

    #[test]
    fn proxy_port_prefers_config_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        fs::write(&settings.config, "port: 9123\n").unwrap();
        let supervisor = Supervisor::new(settings);

        assert_eq!(supervisor.proxy_port(), 9123);
        assert_eq!(supervisor.proxy_base_url(), "http://127.0.0.1:9123");
    }

    #[test]
    fn logs_returns_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        fs::create_dir_all(settings.log_file.parent().unwrap()).unwrap();
        fs::write(&settings.log_file, "one\ntwo\nthree\nfour\n").unwrap();
        let supervisor = Supervisor::new(settings);

        let tail = supervisor.logs(2).unwrap();
        assert_eq!(tail.lines, vec!["three", "four"]);
        assert_eq!(tail.total, 4);
    }

    #[test]
    fn stale_pid_marker_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        fs::write(&settings.pid_file, "999999999").unwrap();
        let pid_file = settings.pid_file.clone();
        let supervisor = Supervisor::new(settings);

        assert!(supervisor.find_process().is_none());
        assert!(!pid_file.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn start_status_stop_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        install_script(&settings, "sleep 30");
        let pid_file = settings.pid_file.clone();
        let supervisor = Supervisor::new(settings);

        let info = supervisor.start().await.unwrap();
        assert!(info.pid > 0);
        assert_eq!(info.origin, ProcessOrigin::Owned);
        assert!(pid_file.exists());

        let again = supervisor.start().await.unwrap_err();
        assert_eq!(again, ManagerError::AlreadyRunning(info.pid));

        let status = supervisor.status().await;
        assert!(status.running);
        assert_eq!(status.pid, Some(info.pid));

        assert_eq!(supervisor.stop().await.unwrap(), info.pid);
        assert!(!supervisor.status().await.running);
        assert!(!pid_file.exists());
        assert_eq!(supervisor.stop().await.unwrap_err(), ManagerError::NotRunning);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn early_exit_surfaces_log_tail() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        install_script(&settings, "echo 'fatal: bad config' >&2\nexit 1");
        let supervisor = Supervisor::new(settings);

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, ManagerError::ProcessExited(_)));
        assert!(err.to_string().contains("fatal: bad config"));
        assert!(supervisor.find_process().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn recovers_running_proxy_from_pid_marker() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        install_script(&settings, "sleep 30");
        let owner = Supervisor::new(settings.clone());
        let info = owner.start().await.unwrap();

        let recovered = Supervisor::new(settings);
        let found = recovered.find_process().unwrap();
        assert_eq!(found.pid, info.pid);
        assert_eq!(found.origin, ProcessOrigin::PidFile);

        assert_eq!(recovered.stop().await.unwrap(), info.pid);
        assert!(recovered.find_process().is_none());
        let _ = owner.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn recovers_running_proxy_by_scan() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        install_script(&settings, "sleep 30\nexit 0");
        let mut child = std::process::Command::new(&settings.binary)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let pid_file = settings.pid_file.clone();
        assert!(!pid_file.exists());
        let supervisor = Supervisor::new(settings);
        let found = supervisor.find_process().unwrap();
        assert_eq!(found.pid, child.id());
        assert_eq!(found.origin, ProcessOrigin::Scan);
        assert_eq!(fs::read_to_string(&pid_file).unwrap().trim(), child.id().to_string());

        let cached = supervisor.cached_process().await.unwrap();
        assert_eq!(cached.pid, child.id());

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_escalates_when_term_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        install_script(&settings, "trap '' TERM\nwhile true; do sleep 1; done");
        let supervisor = Supervisor::new(settings);
        let info = supervisor.start().await.unwrap();

        let started = std::time::Instant::now();
        assert_eq!(supervisor.stop().await.unwrap(), info.pid);
        assert!(started.elapsed() >= Duration::from_millis(900));
        assert!(supervisor.find_process().is_none());
        assert!(!supervisor.status().await.running);
    }

    #[test]
    fn truncated_comm_matches_long_names() {
        let wanted = "cli-proxy-api-plus";
        assert!(comm_matches("cli-proxy-api-plus", wanted));
        assert!(!comm_matches("cli-proxy", wanted));
        assert_eq!(comm_matches("cli-proxy-api-p", wanted), cfg!(target_os = "linux"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn restart_tolerates_stopped_proxy() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        install_script(&settings, "sleep 30");
        let supervisor = Supervisor::new(settings);

        let first = supervisor.restart().await.unwrap();
        let second = supervisor.restart().await.unwrap();
        assert_ne!(first.pid, second.pid);

        supervisor.stop().await.unwrap();
    }
}
