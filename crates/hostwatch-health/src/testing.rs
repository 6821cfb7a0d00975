//! Fakes for the injectable capabilities.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::alert::{AlertError, AlertMessage, Mailer};
use crate::probe::BoxFuture;
use crate::system::SystemProbe;

#[derive(Default)]
struct Channel {
    queue: VecDeque<Option<String>>,
    fallback: Option<String>,
    calls: u32,
}

impl Channel {
    fn next(&mut self) -> Option<String> {
        self.calls += 1;
        self.queue.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

#[derive(Default)]
struct Script {
    supervisor: Channel,
    container: Channel,
    service: Channel,
}

/// Answers from queued responses, then from a per-command fallback.
#[derive(Default)]
pub(crate) struct ScriptedSystem {
    script: Mutex<Script>,
    delay: Option<Duration>,
}

impl ScriptedSystem {
    /// Everything up: supervisor programs running, containers healthy, cron active.
    pub fn healthy() -> Self {
        let system = Self::default();
        system.set_supervisor_fallback(Some("web    RUNNING   pid 10, uptime 0:10:00\n"));
        system.set_container_fallback(Some("true healthy"));
        system.set_service_fallback(Some("active\n"));
        system
    }

    /// Delay every supervisor answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_supervisor(&self, output: Option<&str>) {
        self.script.lock().unwrap().supervisor.queue.push_back(output.map(str::to_string));
    }

    pub fn push_container(&self, output: Option<&str>) {
        self.script.lock().unwrap().container.queue.push_back(output.map(str::to_string));
    }

    pub fn push_service(&self, output: Option<&str>) {
        self.script.lock().unwrap().service.queue.push_back(output.map(str::to_string));
    }

    pub fn set_supervisor_fallback(&self, output: Option<&str>) {
        self.script.lock().unwrap().supervisor.fallback = output.map(str::to_string);
    }

    pub fn set_container_fallback(&self, output: Option<&str>) {
        self.script.lock().unwrap().container.fallback = output.map(str::to_string);
    }

    pub fn set_service_fallback(&self, output: Option<&str>) {
        self.script.lock().unwrap().service.fallback = output.map(str::to_string);
    }

    pub fn container_calls(&self) -> u32 {
        self.script.lock().unwrap().container.calls
    }

    pub fn service_calls(&self) -> u32 {
        self.script.lock().unwrap().service.calls
    }
}

impl SystemProbe for ScriptedSystem {
    fn supervisor_status(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script.lock().unwrap().supervisor.next()
        })
    }

    fn container_state<'a>(&'a self, _name: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move { self.script.lock().unwrap().container.next() })
    }

    fn service_state<'a>(&'a self, _service: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move { self.script.lock().unwrap().service.next() })
    }
}

/// Records every message; optionally fails for one recipient.
#[derive(Default)]
pub(crate) struct RecordingMailer {
    sent: Mutex<Vec<AlertMessage>>,
    fail_for: Option<String>,
}

impl RecordingMailer {
    pub fn failing_for(recipient: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_for: Some(recipient.to_string()),
        }
    }

    pub fn sent(&self) -> Vec<AlertMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    fn send<'a>(&'a self, message: &'a AlertMessage) -> BoxFuture<'a, Result<(), AlertError>> {
        Box::pin(async move {
            if self.fail_for.as_deref() == Some(message.to.as_str()) {
                return Err(AlertError::ExitStatus("exit status: 75".to_string()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        })
    }
}
