#![allow(dead_code)]

use flightsim::{Command, LineLink, LinkError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Reply {
    Line(&'static str),
    Timeout,
    Lost,
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Reply>,
    answers: VecDeque<Vec<Reply>>,
    sent: Vec<u8>,
    reads: usize,
    discards: usize,
    close_calls: usize,
    closed: bool,
    fail_writes: bool,
}

/// In-memory board. Clones share the same script so a test can keep one
/// to inspect traffic after handing the other to the controller.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLink {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: impl IntoIterator<Item = Reply>) -> Self {
        let link = Self::new();
        link.push(replies);
        link
    }

    pub fn push(&self, replies: impl IntoIterator<Item = Reply>) {
        self.script.lock().unwrap().replies.extend(replies);
    }

    /// Queues `replies` as the board's answer to the next command, so they
    /// only become readable once that command has been sent.
    pub fn answer_next(&self, replies: impl IntoIterator<Item = Reply>) {
        let answer = replies.into_iter().collect();
        self.script.lock().unwrap().answers.push_back(answer);
    }

    pub fn fail_writes(&self) {
        self.script.lock().unwrap().fail_writes = true;
    }

    pub fn sent(&self) -> String {
        String::from_utf8(self.script.lock().unwrap().sent.clone()).unwrap()
    }

    pub fn reads(&self) -> usize {
        self.script.lock().unwrap().reads
    }

    pub fn discards(&self) -> usize {
        self.script.lock().unwrap().discards
    }

    pub fn is_closed(&self) -> bool {
        self.script.lock().unwrap().closed
    }

    pub fn close_calls(&self) -> usize {
        self.script.lock().unwrap().close_calls
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().replies.len()
    }
}

impl LineLink for ScriptedLink {
    fn send_command(&mut self, command: Command) -> Result<(), LinkError> {
        let mut script = self.script.lock().unwrap();
        if script.closed {
            return Err(LinkError::Closed);
        }
        if script.fail_writes {
            return Err(LinkError::DeviceUnavailable("write failed".to_string()));
        }
        script.sent.push(command.to_byte());
        if let Some(answer) = script.answers.pop_front() {
            script.replies.extend(answer);
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, LinkError> {
        let reply = {
            let mut script = self.script.lock().unwrap();
            if script.closed {
                return Err(LinkError::Closed);
            }
            script.reads += 1;
            script.replies.pop_front()
        };
        match reply {
            Some(Reply::Line(line)) => Ok(line.to_string()),
            Some(Reply::Lost) => Err(LinkError::DeviceUnavailable("unplugged".to_string())),
            Some(Reply::Timeout) | None => {
                // stand-in for the port's read timeout
                thread::sleep(Duration::from_millis(1));
                Err(LinkError::Timeout)
            }
        }
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        let mut script = self.script.lock().unwrap();
        script.discards += 1;
        script.replies.clear();
        Ok(())
    }

    fn close(&mut self) {
        let mut script = self.script.lock().unwrap();
        script.close_calls += 1;
        script.closed = true;
    }
}
