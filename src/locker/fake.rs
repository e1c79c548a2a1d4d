//! In-memory [`ProcessRunner`] for backend tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use super::process::{LockChild, ProcessRunner, SignalError};
use crate::core::errors::Result;

#[derive(Default)]
struct State {
    ran: Vec<String>,
    captured: Vec<String>,
    spawned: Vec<String>,
    terminated: Vec<u32>,
    exit_codes: HashMap<String, Option<i32>>,
    capture_output: HashMap<String, String>,
    stdout_lines: VecDeque<String>,
    /// Children that have not exited yet.
    children: HashMap<u32, Sender<Option<i32>>>,
    killed: Vec<u32>,
    reaped: Vec<u32>,
    terminate_error: Option<SignalError>,
    next_pid: u32,
}

#[derive(Clone, Default)]
pub struct FakeRunner {
    state: Arc<Mutex<State>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        let runner = Self::default();
        runner.state.lock().next_pid = 1_000;
        runner
    }

    pub fn set_exit_code(&self, command: &str, code: Option<i32>) {
        self.state.lock().exit_codes.insert(command.to_string(), code);
    }

    pub fn set_capture(&self, command: &str, output: &str) {
        self.state
            .lock()
            .capture_output
            .insert(command.to_string(), output.to_string());
    }

    /// Next spawned child reports this as its first stdout line.
    pub fn push_stdout_line(&self, line: &str) {
        self.state.lock().stdout_lines.push_back(line.to_string());
    }

    pub fn fail_terminate_with(&self, error: SignalError) {
        self.state.lock().terminate_error = Some(error);
    }

    /// Make the child with `pid` exit on its own.
    pub fn exit_child(&self, pid: u32, code: Option<i32>) {
        if let Some(tx) = self.state.lock().children.remove(&pid) {
            let _ = tx.send(code);
        }
    }

    pub fn ran(&self) -> Vec<String> {
        self.state.lock().ran.clone()
    }

    pub fn captured(&self) -> Vec<String> {
        self.state.lock().captured.clone()
    }

    pub fn spawned(&self) -> Vec<String> {
        self.state.lock().spawned.clone()
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.state.lock().terminated.clone()
    }

    pub fn killed(&self) -> Vec<u32> {
        self.state.lock().killed.clone()
    }

    /// Pids whose exit status has been collected with `wait`.
    pub fn reaped(&self) -> Vec<u32> {
        self.state.lock().reaped.clone()
    }

    pub fn live_children(&self) -> usize {
        self.state.lock().children.len()
    }
}

impl ProcessRunner for FakeRunner {
    fn run(&self, command: &str) -> Result<Option<i32>> {
        let mut state = self.state.lock();
        state.ran.push(command.to_string());
        Ok(state.exit_codes.get(command).copied().unwrap_or(Some(0)))
    }

    fn capture(&self, command: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.captured.push(command.to_string());
        Ok(state.capture_output.get(command).cloned().unwrap_or_default())
    }

    fn spawn(&self, command: &str) -> Result<Box<dyn LockChild>> {
        let mut state = self.state.lock();
        state.spawned.push(command.to_string());
        state.next_pid += 1;
        let pid = state.next_pid;
        let (tx, rx) = crossbeam_channel::bounded(1);
        state.children.insert(pid, tx);
        let first_line = state.stdout_lines.pop_front();
        Ok(Box::new(FakeChild {
            pid,
            exit: rx,
            first_line,
            state: Arc::clone(&self.state),
        }))
    }

    fn terminate(&self, pid: u32) -> std::result::Result<(), SignalError> {
        let mut state = self.state.lock();
        state.terminated.push(pid);
        if let Some(error) = state.terminate_error.clone() {
            return Err(error);
        }
        match state.children.remove(&pid) {
            Some(tx) => {
                let _ = tx.send(None);
                Ok(())
            }
            None => Err(SignalError::NoSuchProcess),
        }
    }
}

struct FakeChild {
    pid: u32,
    exit: Receiver<Option<i32>>,
    first_line: Option<String>,
    state: Arc<Mutex<State>>,
}

impl LockChild for FakeChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        let code = self.exit.recv().unwrap_or(None);
        self.state.lock().reaped.push(self.pid);
        Ok(code)
    }

    fn read_line(&mut self) -> io::Result<String> {
        self.first_line
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no output"))
    }

    fn kill(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.killed.push(self.pid);
        if let Some(tx) = state.children.remove(&self.pid) {
            let _ = tx.send(None);
        }
        Ok(())
    }
}

/// Poll `cond` until it holds or five seconds pass.
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
